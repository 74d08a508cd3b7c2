//! Typed orchestrator settings read from the environment.
//!
//! Every knob has a default; deployments override via `SWITCHBOARD_*`
//! variables (directly, or through `.env` / XDG layering applied first by
//! [`crate::load_and_apply`]).

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("invalid {key}={value}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Orchestrator configuration. See each field for its environment variable.
#[derive(Clone, Debug)]
pub struct Settings {
    /// `SWITCHBOARD_HTTP_ADDR` — front-end HTTP bind address.
    pub http_addr: String,
    /// `SWITCHBOARD_RPC_ADDR` — tool-RPC websocket bind address (the
    /// orchestrator's own tool-server listener).
    pub rpc_addr: String,
    /// `SWITCHBOARD_DATA_DIR` — directory holding `users.json` and
    /// `sessions.json`.
    pub data_dir: PathBuf,
    /// `SWITCHBOARD_SESSION_TTL_MINUTES` — inactivity window after which a
    /// session expires.
    pub session_ttl_minutes: i64,
    /// `SWITCHBOARD_HISTORY_CAP` — per-session bound on command/response
    /// history.
    pub history_cap: usize,
    /// `SWITCHBOARD_CALL_TIMEOUT_SECS` — default deadline for tool calls.
    pub call_timeout_secs: u64,
    /// `SWITCHBOARD_HEARTBEAT_INTERVAL_SECS` — ping cadence per client.
    pub heartbeat_interval_secs: u64,
    /// `SWITCHBOARD_HEARTBEAT_WAIT_SECS` — how long to await each pong.
    pub heartbeat_wait_secs: u64,
    /// `SWITCHBOARD_RECONNECT_DELAY_SECS` — pause before a reconnection
    /// attempt.
    pub reconnect_delay_secs: u64,
    /// `SWITCHBOARD_MAX_RECONNECT_ATTEMPTS` — consecutive failures before a
    /// client gives up.
    pub max_reconnect_attempts: u32,
    /// `SWITCHBOARD_CLEANUP_INTERVAL_SECS` — session-cleanup loop cadence.
    pub cleanup_interval_secs: u64,
    /// `SWITCHBOARD_HEALTH_INTERVAL_SECS` — health-check loop cadence.
    pub health_interval_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            http_addr: "0.0.0.0:8080".into(),
            rpc_addr: "127.0.0.1:8090".into(),
            data_dir: std::env::temp_dir().join("switchboard").join("context"),
            session_ttl_minutes: 30,
            history_cap: 50,
            call_timeout_secs: 30,
            heartbeat_interval_secs: 30,
            heartbeat_wait_secs: 10,
            reconnect_delay_secs: 5,
            max_reconnect_attempts: 3,
            cleanup_interval_secs: 300,
            health_interval_secs: 60,
        }
    }
}

impl Settings {
    /// Builds settings from the process environment, falling back to the
    /// defaults above for unset keys.
    pub fn from_env() -> Result<Self, SettingsError> {
        let defaults = Settings::default();
        Ok(Self {
            http_addr: string_var("SWITCHBOARD_HTTP_ADDR", defaults.http_addr),
            rpc_addr: string_var("SWITCHBOARD_RPC_ADDR", defaults.rpc_addr),
            data_dir: std::env::var_os("SWITCHBOARD_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            session_ttl_minutes: parsed_var(
                "SWITCHBOARD_SESSION_TTL_MINUTES",
                defaults.session_ttl_minutes,
            )?,
            history_cap: parsed_var("SWITCHBOARD_HISTORY_CAP", defaults.history_cap)?,
            call_timeout_secs: parsed_var(
                "SWITCHBOARD_CALL_TIMEOUT_SECS",
                defaults.call_timeout_secs,
            )?,
            heartbeat_interval_secs: parsed_var(
                "SWITCHBOARD_HEARTBEAT_INTERVAL_SECS",
                defaults.heartbeat_interval_secs,
            )?,
            heartbeat_wait_secs: parsed_var(
                "SWITCHBOARD_HEARTBEAT_WAIT_SECS",
                defaults.heartbeat_wait_secs,
            )?,
            reconnect_delay_secs: parsed_var(
                "SWITCHBOARD_RECONNECT_DELAY_SECS",
                defaults.reconnect_delay_secs,
            )?,
            max_reconnect_attempts: parsed_var(
                "SWITCHBOARD_MAX_RECONNECT_ATTEMPTS",
                defaults.max_reconnect_attempts,
            )?,
            cleanup_interval_secs: parsed_var(
                "SWITCHBOARD_CLEANUP_INTERVAL_SECS",
                defaults.cleanup_interval_secs,
            )?,
            health_interval_secs: parsed_var(
                "SWITCHBOARD_HEALTH_INTERVAL_SECS",
                defaults.health_interval_secs,
            )?,
        })
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn heartbeat_wait(&self) -> Duration {
        Duration::from_secs(self.heartbeat_wait_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs)
    }
}

fn string_var(key: &'static str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn parsed_var<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, SettingsError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|e: T::Err| SettingsError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}
