//! CLI configuration: thin wrapper around `wifipool_config` shared types.
//!
//! Adds resolution that respects `GlobalOpts` flag overrides
//! (--email, --base-url, --timeout, --state-file).

use std::time::Duration;

use wifipool_config::FileSetupStore;
use wifipool_core::PoolConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

// ── Re-exports from shared crate ────────────────────────────────────

pub use wifipool_config::{Config, Profile, config_path, load_config_or_default, save_config};

// ── CLI-specific helpers ────────────────────────────────────────────

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Comma-separated profile names for error help text.
pub fn available_profiles(config: &Config) -> String {
    let mut names: Vec<_> = config.profiles.keys().cloned().collect();
    if names.is_empty() {
        return "(none)".into();
    }
    names.sort();
    names.join(", ")
}

/// Translate the active profile + global flags into a `PoolConfig`.
///
/// A missing profile is not an error: credentials may come from the
/// environment alone.
pub fn resolve_pool_config(global: &GlobalOpts, cfg: &Config) -> Result<PoolConfig, CliError> {
    let profile_name = active_profile_name(global, cfg);

    let mut profile = match cfg.profiles.get(&profile_name) {
        Some(profile) => profile.clone(),
        None if global.profile.is_some() => {
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                available: available_profiles(cfg),
            });
        }
        None => Profile::default(),
    };

    // Flag > env > profile
    if let Some(ref email) = global.email {
        profile.email = Some(email.clone());
    }
    if let Some(ref url) = global.base_url {
        profile.base_url = Some(url.clone());
    }

    let mut pool = wifipool_config::profile_to_pool_config(&profile, &profile_name, &cfg.defaults)?;
    if let Some(secs) = global.timeout {
        pool.timeout = Duration::from_secs(secs);
    }
    Ok(pool)
}

/// The setup store for the active profile.
pub fn setup_store(global: &GlobalOpts, cfg: &Config) -> FileSetupStore {
    global.state_file.as_ref().map_or_else(
        || FileSetupStore::for_profile(&active_profile_name(global, cfg)),
        |path| FileSetupStore::new(path.clone()),
    )
}
