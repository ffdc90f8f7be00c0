// Telemetry API HTTP client
//
// Wraps `reqwest::Client` with the vendor's session-cookie handling and
// status mapping. Every call obtains a session from the `SessionManager`;
// a 401 on any call drops the cached session so the next call logs in
// again. No call is retried here.

use std::sync::Arc;

use reqwest::StatusCode;
use reqwest::header::COOKIE;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

use crate::error::{Error, excerpt};
use crate::models::{GroupInfo, GroupInfoRequest, ManualIoRequest, Sample, StatsRequest};
use crate::session::{Credentials, Session, SessionManager};
use crate::transport::{TransportConfig, endpoint};

/// Longest response excerpt carried in errors and trace output.
const BODY_EXCERPT: usize = 800;

/// Raw HTTP client for the vendor's mobile telemetry API.
///
/// Cheap to clone; clones share the session cache.
#[derive(Clone)]
pub struct TelemetryClient {
    http: reqwest::Client,
    base_url: Url,
    session: Arc<SessionManager>,
}

impl TelemetryClient {
    /// Create a client from a `TransportConfig`.
    pub fn new(
        base_url: Url,
        credentials: Credentials,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(http, base_url, credentials))
    }

    /// Create a client around a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url, credentials: Credentials) -> Self {
        let session = SessionManager::new(http.clone(), base_url.clone(), credentials);
        Self {
            http,
            base_url,
            session: Arc::new(session),
        }
    }

    /// Create a client sharing an existing session manager.
    pub fn with_session(http: reqwest::Client, base_url: Url, session: Arc<SessionManager>) -> Self {
        Self {
            http,
            base_url,
            session,
        }
    }

    /// The session manager backing this client.
    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// The vendor base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Log in (or reuse the cached session) and return it.
    pub async fn login(&self) -> Result<Session, Error> {
        self.session.acquire().await
    }

    // ── Operations ──────────────────────────────────────────────────

    /// `GET /groups/accessible`. The payload shape is not fixed, so it is
    /// returned as raw JSON. A 304 is read as "no groups".
    pub async fn list_accessible_groups(&self) -> Result<Value, Error> {
        let url = endpoint(&self.base_url, "groups/accessible")?;
        let (status, body) = self.send(reqwest::Method::GET, url, None::<&()>).await?;

        if status == StatusCode::NOT_MODIFIED {
            debug!("groups/accessible answered 304");
            return Ok(Value::Array(Vec::new()));
        }
        if !status.is_success() {
            return Err(Error::Telemetry {
                status: status.as_u16(),
                body: excerpt(&body, BODY_EXCERPT),
            });
        }
        parse_json(&body, "groups/accessible")
    }

    /// `POST /groups/getInfo {domainId}`.
    pub async fn get_group_info(&self, domain: &str) -> Result<GroupInfo, Error> {
        let url = endpoint(&self.base_url, "groups/getInfo")?;
        let req = GroupInfoRequest { domain_id: domain };
        let (status, body) = self.send(reqwest::Method::POST, url, Some(&req)).await?;

        if !status.is_success() {
            return Err(Error::Telemetry {
                status: status.as_u16(),
                body: excerpt(&body, BODY_EXCERPT),
            });
        }
        parse_json(&body, "groups/getInfo").map(GroupInfo::from_value)
    }

    /// `POST /harmopool/getStats {domain, io, after}`.
    ///
    /// A 404 means the channel does not exist and yields an empty list.
    /// `after` is passed through untouched; whether it is read as seconds or
    /// milliseconds is up to the vendor, see `fetch_with_fallback` in core.
    pub async fn get_samples(
        &self,
        domain: &str,
        channel: &str,
        after: i64,
    ) -> Result<Vec<Sample>, Error> {
        let url = endpoint(&self.base_url, "harmopool/getStats")?;
        let req = StatsRequest {
            domain,
            io: channel,
            after,
        };
        let (status, body) = self.send(reqwest::Method::POST, url, Some(&req)).await?;

        if status == StatusCode::NOT_FOUND {
            trace!(channel, "getStats 404, treating as empty");
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(Error::Telemetry {
                status: status.as_u16(),
                body: excerpt(&body, BODY_EXCERPT),
            });
        }

        match parse_json(&body, "harmopool/getStats")? {
            Value::Array(items) => Ok(items
                .into_iter()
                .filter_map(|item| serde_json::from_value::<Sample>(item).ok())
                .collect()),
            Value::Null => Ok(Vec::new()),
            _ => Err(Error::Protocol {
                message: "getStats did not return an array".into(),
                body: excerpt(&body, BODY_EXCERPT),
            }),
        }
    }

    /// `POST /harmopool/setManualIO {domain, io, value}`.
    ///
    /// A 403 whose body names sensors maps to `ManualIoRejected`, a 404 to
    /// `ChannelUnavailable`. Any other failure, including a 5xx that happens
    /// to mention sensors, is a plain `Telemetry` error.
    pub async fn set_manual_value(
        &self,
        domain: &str,
        channel: &str,
        value: bool,
    ) -> Result<(), Error> {
        let url = endpoint(&self.base_url, "harmopool/setManualIO")?;
        let req = ManualIoRequest {
            domain,
            io: channel,
            value,
        };
        let (status, body) = self.send(reqwest::Method::POST, url, Some(&req)).await?;

        if status.is_success() {
            return Ok(());
        }
        if status == StatusCode::NOT_FOUND {
            return Err(Error::ChannelUnavailable {
                channel: channel.to_owned(),
            });
        }
        if is_sensor_refusal(status, &body) {
            return Err(Error::ManualIoRejected {
                channel: channel.to_owned(),
                message: excerpt(&body, 200),
            });
        }
        Err(Error::Telemetry {
            status: status.as_u16(),
            body: excerpt(&body, BODY_EXCERPT),
        })
    }

    // ── Request helper ──────────────────────────────────────────────

    /// Send one authenticated request and return status plus body text.
    ///
    /// 401 invalidates the cached session and is returned as
    /// `Error::Authentication`; every other status is left to the caller.
    async fn send<B: Serialize + Sync>(
        &self,
        method: reqwest::Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<(StatusCode, String), Error> {
        let session = self.session.acquire().await?;

        debug!("{} {}", method, url.path());

        let mut builder = self
            .http
            .request(method, url)
            .header(COOKIE, session.cookie_header());
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let resp = builder.send().await.map_err(Error::Transport)?;
        let status = resp.status();
        let text = resp.text().await.map_err(Error::Transport)?;

        trace!(status = status.as_u16(), body = %excerpt(&text, BODY_EXCERPT), "response");

        if status == StatusCode::UNAUTHORIZED {
            self.session.invalidate().await;
            return Err(Error::Authentication {
                status: 401,
                message: "session expired".into(),
            });
        }

        Ok((status, text))
    }
}

/// The vendor's refusal to drive a sensor input: 403 plus a body naming
/// sensors ("Manual IO on sensors is not allowed").
fn is_sensor_refusal(status: StatusCode, body: &str) -> bool {
    status == StatusCode::FORBIDDEN && body.to_ascii_lowercase().contains("sensor")
}

fn parse_json(body: &str, what: &str) -> Result<Value, Error> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(body).map_err(|e| Error::Protocol {
        message: format!("{what}: invalid JSON ({e})"),
        body: excerpt(body, BODY_EXCERPT),
    })
}
