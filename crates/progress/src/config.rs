use std::str::FromStr;
use std::time::Duration;

use crate::connection::ConnectionOptions;
use crate::error::ProgressError;
use crate::reconnect::ReconnectPolicy;

/// Default WebSocket base for local development.
const DEFAULT_WS_BASE: &str = "ws://localhost:3000/ws";

/// Stream client configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ProgressConfig {
    /// WebSocket base URL that topic paths are appended to.
    pub ws_base: String,
    /// Backoff applied between reconnect attempts.
    pub reconnect: ReconnectPolicy,
    /// Recurring ping period while open. `None` sends a single ping per connection.
    pub keepalive_interval: Option<Duration>,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            ws_base: DEFAULT_WS_BASE.to_string(),
            reconnect: ReconnectPolicy::default(),
            keepalive_interval: None,
        }
    }
}

impl ProgressConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                         | Default                  |
    /// |---------------------------------|--------------------------|
    /// | `FITCHFORK_WS_BASE`             | `ws://localhost:3000/ws` |
    /// | `FITCHFORK_RECONNECT_BASE_MS`   | `500`                    |
    /// | `FITCHFORK_RECONNECT_MAX_EXP`   | `4`                      |
    /// | `FITCHFORK_RECONNECT_JITTER_MS` | `200`                    |
    /// | `FITCHFORK_KEEPALIVE_SECS`      | unset                    |
    pub fn from_env() -> Result<Self, ProgressError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ProgressError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let ws_base = lookup("FITCHFORK_WS_BASE")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.ws_base);

        let base_ms: u64 = parse_or(&lookup, "FITCHFORK_RECONNECT_BASE_MS", 500)?;
        let max_exponent: u32 = parse_or(&lookup, "FITCHFORK_RECONNECT_MAX_EXP", 4)?;
        let jitter_ms: u64 = parse_or(&lookup, "FITCHFORK_RECONNECT_JITTER_MS", 200)?;
        let keepalive_secs: Option<u64> = parse_opt(&lookup, "FITCHFORK_KEEPALIVE_SECS")?;

        Ok(Self {
            ws_base,
            reconnect: ReconnectPolicy {
                base_delay: Duration::from_millis(base_ms),
                max_exponent,
                max_jitter: Duration::from_millis(jitter_ms),
            },
            keepalive_interval: keepalive_secs.filter(|&s| s > 0).map(Duration::from_secs),
        })
    }

    pub fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            reconnect: self.reconnect.clone(),
            keepalive_interval: self.keepalive_interval,
        }
    }
}

fn parse_opt<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ProgressError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| ProgressError::Config(format!("{key} must be a number, got '{raw}': {e}"))),
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T, ProgressError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    Ok(parse_opt(lookup, key)?.unwrap_or(default))
}
