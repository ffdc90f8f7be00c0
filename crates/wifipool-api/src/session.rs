// Session management
//
// Cookie-based login against `/users/login`. The vendor answers with a
// `connect.sid` session cookie which must be replayed on every subsequent
// request. The token is cached until its TTL runs out or a request comes
// back 401, then lazily re-acquired on the next use.

use std::time::Duration;

use reqwest::header::SET_COOKIE;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, trace};
use url::Url;

use crate::error::{Error, excerpt};
use crate::models::{LoginRequest, LoginResponse, LoginUser};
use crate::transport::endpoint;

/// Name of the session cookie set by the vendor.
pub const SESSION_COOKIE: &str = "connect.sid";

/// Default lifetime of a cached session before a fresh login is forced.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(15 * 60);

/// Login credentials as read from the configuration store.
///
/// Both fields are optional here because absence is only an error once a
/// login is actually attempted.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub email: Option<String>,
    pub password: Option<SecretString>,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: SecretString) -> Self {
        Self {
            email: Some(email.into()),
            password: Some(password),
        }
    }

    fn require(&self) -> Result<(&str, &SecretString), Error> {
        let email = self
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty());
        let password = self
            .password
            .as_ref()
            .filter(|p| !p.expose_secret().is_empty());
        match (email, password) {
            (Some(email), Some(password)) => Ok((email, password)),
            (None, _) => Err(Error::Configuration {
                message: "email is not configured".into(),
            }),
            (_, None) => Err(Error::Configuration {
                message: "password is not configured".into(),
            }),
        }
    }
}

/// An authenticated session.
#[derive(Debug, Clone)]
pub struct Session {
    token: SecretString,
    expires_at: Instant,
    user: LoginUser,
}

impl Session {
    /// The `Cookie` header value to replay (`connect.sid=<token>`).
    pub fn cookie_header(&self) -> String {
        format!("{SESSION_COOKIE}={}", self.token.expose_secret())
    }

    /// The vendor's identifier of the logged-in user, if reported.
    pub fn user_id(&self) -> Option<&str> {
        self.user.id.as_deref()
    }

    /// The account e-mail as reported by the vendor, if any.
    pub fn identity(&self) -> Option<&str> {
        self.user.mail.as_deref()
    }

    pub fn is_valid_at(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Obtains and caches the vendor session token.
///
/// The cache lock is held across the login request, so concurrent callers
/// wait for one in-flight login instead of issuing their own.
pub struct SessionManager {
    http: reqwest::Client,
    base_url: Url,
    credentials: Credentials,
    ttl: Duration,
    current: Mutex<Option<Session>>,
}

impl SessionManager {
    pub fn new(http: reqwest::Client, base_url: Url, credentials: Credentials) -> Self {
        Self {
            http,
            base_url,
            credentials,
            ttl: DEFAULT_SESSION_TTL,
            current: Mutex::new(None),
        }
    }

    /// Override the session TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Return a valid session, logging in if none is cached or the cached
    /// one has expired.
    pub async fn acquire(&self) -> Result<Session, Error> {
        let mut guard = self.current.lock().await;
        if let Some(session) = guard.as_ref() {
            if session.is_valid_at(Instant::now()) {
                trace!("reusing cached session");
                return Ok(session.clone());
            }
            debug!("cached session expired");
        }

        let session = self.login().await?;
        *guard = Some(session.clone());
        Ok(session)
    }

    /// Drop the cached session; the next `acquire()` logs in again.
    pub async fn invalidate(&self) {
        if self.current.lock().await.take().is_some() {
            debug!("session invalidated");
        }
    }

    /// Whether a session is currently cached (valid or not).
    pub async fn has_session(&self) -> bool {
        self.current.lock().await.is_some()
    }

    async fn login(&self) -> Result<Session, Error> {
        let (email, password) = self.credentials.require()?;
        let url = endpoint(&self.base_url, "users/login")?;

        debug!(email = %mask_email(email), "POST {}", url);

        let body = LoginRequest {
            email,
            namespace: "default",
            password: password.expose_secret(),
        };

        let resp = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(Error::Transport)?;

        let status = resp.status();
        let token = extract_session_token(resp.headers());
        let text = resp.text().await.unwrap_or_default();

        if status != reqwest::StatusCode::OK {
            return Err(Error::Authentication {
                status: status.as_u16(),
                message: format!("login failed: {}", excerpt(&text, 200)),
            });
        }

        let Some(token) = token else {
            return Err(Error::Protocol {
                message: format!("login returned 200 without a {SESSION_COOKIE} cookie"),
                body: excerpt(&text, 800),
            });
        };

        let user = serde_json::from_str::<LoginResponse>(&text)
            .ok()
            .and_then(|r| r.user)
            .unwrap_or_default();

        info!(email = %mask_email(email), "login successful");

        Ok(Session {
            token: SecretString::from(token),
            expires_at: Instant::now() + self.ttl,
            user,
        })
    }
}

/// Find `connect.sid=<value>` among the response's `Set-Cookie` headers.
fn extract_session_token(headers: &reqwest::header::HeaderMap) -> Option<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|part| part.trim().strip_prefix(SESSION_COOKIE)?.strip_prefix('='))
        .find(|value| !value.is_empty())
        .map(String::from)
}

/// Mask an e-mail address for logging: `ab***@example.com`.
pub fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((user, domain)) => {
            let head: String = user.chars().take(2).collect();
            format!("{head}***@{domain}")
        }
        None => "***".into(),
    }
}
