// src/config/mod.rs
//! Startup configuration from the environment (and `.env` via dotenvy).
//!
//! Loading either yields a complete `AppConfig` or a `ConfigError`; the binary
//! decides how to exit.

pub mod cookies;
pub mod handles;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::state::StoreScope;

pub use cookies::{load_cookies_from, CookieEntry, Credentials};
pub use handles::{load_handles_from, normalize_handle};

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 30_000;
pub const DEFAULT_STAGGER_MS: u64 = 2_000;
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 20_000;
pub const DEFAULT_FETCH_COUNT: u32 = 20;
pub const DEFAULT_ALERT_THRESHOLD: u32 = 5;
pub const DEFAULT_REALERT_EVERY: u32 = 20;
pub const DEFAULT_AUTH_CHECK_EVERY: u64 = 60;

#[derive(Debug, Clone)]
pub struct DiscordConfig {
    pub bot_token: String,
    pub channel_id: String,
    pub guild_id: String,
}

/// Poll/alert policy shared by the engine, supervisor and runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub startup_offset: Duration,
    pub stagger: Duration,
    pub fetch_timeout: Duration,
    pub fetch_count: u32,
    pub alert_threshold: u32,
    pub realert_every: u32,
    pub auth_check_every: u64,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            startup_offset: Duration::ZERO,
            stagger: Duration::from_millis(DEFAULT_STAGGER_MS),
            fetch_timeout: Duration::from_millis(DEFAULT_FETCH_TIMEOUT_MS),
            fetch_count: DEFAULT_FETCH_COUNT,
            alert_threshold: DEFAULT_ALERT_THRESHOLD,
            realert_every: DEFAULT_REALERT_EVERY,
            auth_check_every: DEFAULT_AUTH_CHECK_EVERY,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub discord: DiscordConfig,
    pub handles: Vec<String>,
    pub single_handle: Option<String>,
    pub credentials: Credentials,
    pub policy: PollPolicy,
    pub state_dir: PathBuf,
    pub legacy_state_path: PathBuf,
    pub metrics_addr: Option<SocketAddr>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from an arbitrary key lookup (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).filter(|v| !v.trim().is_empty());
        let require = |k: &'static str| get(k).ok_or(ConfigError::Missing(k));

        let discord = DiscordConfig {
            bot_token: require("DISCORD_BOT_TOKEN")?,
            channel_id: require("DISCORD_CHANNEL_ID")?,
            guild_id: require("DISCORD_GUILD_ID")?,
        };

        let policy = PollPolicy {
            interval: Duration::from_millis(parse_or(
                &get,
                "POLL_INTERVAL_MS",
                DEFAULT_POLL_INTERVAL_MS,
            )?),
            startup_offset: Duration::from_millis(parse_or(&get, "POLL_OFFSET_MS", 0)?),
            stagger: Duration::from_millis(parse_or(&get, "HANDLE_STAGGER_MS", DEFAULT_STAGGER_MS)?),
            fetch_timeout: Duration::from_millis(parse_or(
                &get,
                "FETCH_TIMEOUT_MS",
                DEFAULT_FETCH_TIMEOUT_MS,
            )?),
            fetch_count: parse_or(&get, "FETCH_COUNT", DEFAULT_FETCH_COUNT)?,
            alert_threshold: parse_or(&get, "ALERT_THRESHOLD", DEFAULT_ALERT_THRESHOLD)?,
            realert_every: parse_or(&get, "REALERT_EVERY", DEFAULT_REALERT_EVERY)?,
            auth_check_every: parse_or(&get, "AUTH_CHECK_EVERY", DEFAULT_AUTH_CHECK_EVERY)?,
        };
        if policy.interval.is_zero() {
            return Err(ConfigError::Invalid {
                key: "POLL_INTERVAL_MS",
                reason: "must be greater than zero".into(),
            });
        }
        if policy.fetch_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                key: "FETCH_TIMEOUT_MS",
                reason: "must be greater than zero".into(),
            });
        }
        if policy.alert_threshold == 0 {
            return Err(ConfigError::Invalid {
                key: "ALERT_THRESHOLD",
                reason: "must be at least 1".into(),
            });
        }

        let handles_path = PathBuf::from(get("HANDLES_PATH").unwrap_or_else(|| "handles.json".into()));
        let all_handles = load_handles_from(&handles_path)?;

        let single_handle = get("HANDLE").map(|h| normalize_handle(&h)).transpose()?;
        let handles = match &single_handle {
            Some(h) => vec![h.clone()],
            None => all_handles,
        };

        let cookies_path = PathBuf::from(get("COOKIES_PATH").unwrap_or_else(|| "cookies.json".into()));
        let credentials = load_cookies_from(&cookies_path)?;

        let metrics_addr = get("METRICS_ADDR")
            .map(|v| {
                v.parse::<SocketAddr>().map_err(|e| ConfigError::Invalid {
                    key: "METRICS_ADDR",
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        Ok(Self {
            discord,
            handles,
            single_handle,
            credentials,
            policy,
            state_dir: PathBuf::from(get("STATE_DIR").unwrap_or_else(|| "state".into())),
            legacy_state_path: PathBuf::from(
                get("LEGACY_STATE_PATH").unwrap_or_else(|| "last-seen.json".into()),
            ),
            metrics_addr,
        })
    }

    /// Per-handle file in single-handle mode, the shared file otherwise.
    pub fn store_scope(&self) -> StoreScope {
        match &self.single_handle {
            Some(handle) => StoreScope::PerHandle {
                handle: handle.clone(),
                dir: self.state_dir.clone(),
                legacy_path: Some(self.legacy_state_path.clone()),
            },
            None => StoreScope::Shared {
                path: self.legacy_state_path.clone(),
            },
        }
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(v) => v.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
            key,
            reason: format!("{v:?}: {e}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;

    fn fixture_env(dir: &std::path::Path) -> HashMap<String, String> {
        fs::write(dir.join("handles.json"), r#"["@alice","bob"]"#).unwrap();
        fs::write(
            dir.join("cookies.json"),
            r#"[{"name":"auth_token","value":"a"},{"name":"ct0","value":"c"}]"#,
        )
        .unwrap();
        let mut env = HashMap::new();
        env.insert("DISCORD_BOT_TOKEN".into(), "tok".into());
        env.insert("DISCORD_CHANNEL_ID".into(), "123".into());
        env.insert("DISCORD_GUILD_ID".into(), "456".into());
        env.insert(
            "HANDLES_PATH".into(),
            dir.join("handles.json").display().to_string(),
        );
        env.insert(
            "COOKIES_PATH".into(),
            dir.join("cookies.json").display().to_string(),
        );
        env
    }

    fn load(env: &HashMap<String, String>) -> Result<AppConfig, ConfigError> {
        AppConfig::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn defaults_apply() {
        let dir = tempfile::tempdir().unwrap();
        let env = fixture_env(dir.path());
        let cfg = load(&env).unwrap();
        assert_eq!(cfg.handles, vec!["alice".to_string(), "bob".to_string()]);
        assert_eq!(cfg.policy, PollPolicy::default());
        assert!(cfg.single_handle.is_none());
        assert!(matches!(cfg.store_scope(), StoreScope::Shared { .. }));
    }

    #[test]
    fn missing_required_is_reported_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = fixture_env(dir.path());
        env.remove("DISCORD_GUILD_ID");
        let err = load(&env).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DISCORD_GUILD_ID")));
    }

    #[test]
    fn single_handle_override_selects_per_handle_scope() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = fixture_env(dir.path());
        env.insert("HANDLE".into(), "@carol".into());
        env.insert("POLL_OFFSET_MS".into(), "5000".into());
        let cfg = load(&env).unwrap();
        assert_eq!(cfg.handles, vec!["carol".to_string()]);
        assert_eq!(cfg.policy.startup_offset, Duration::from_secs(5));
        match cfg.store_scope() {
            StoreScope::PerHandle { handle, .. } => assert_eq!(handle, "carol"),
            other => panic!("unexpected scope {other:?}"),
        }
    }

    #[test]
    fn bad_number_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = fixture_env(dir.path());
        env.insert("POLL_INTERVAL_MS".into(), "soon".into());
        let err = load(&env).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "POLL_INTERVAL_MS",
                ..
            }
        ));
    }
}
