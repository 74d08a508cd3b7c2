//! Load configuration from XDG `config.toml` and project `.env`, then apply
//! to the process environment with priority: **existing env > .env > XDG**.
//!
//! On top of the raw layering, [`Settings`] reads the orchestrator's typed
//! knobs (bind addresses, data directory, session TTL, loop intervals) out
//! of the environment, with the documented defaults.

mod layering;
mod settings;

use std::path::Path;

use thiserror::Error;

pub use settings::{Settings, SettingsError};

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("read xdg config: {0}")]
    XdgRead(std::io::Error),
    #[error("parse xdg toml: {0}")]
    XdgParse(#[from] toml::de::Error),
    #[error("read .env: {0}")]
    DotenvRead(std::io::Error),
}

/// Loads config from XDG `config.toml` and an optional project `.env`, then
/// sets environment variables only for keys that are **not** already set
/// (so existing env has highest priority).
///
/// Order of precedence when a key is missing in the process environment:
/// 1. Value from project `.env` (current directory or `override_dir` if given)
/// 2. Value from `$XDG_CONFIG_HOME/<app_name>/config.toml` `[env]` table
pub fn load_and_apply(app_name: &str, override_dir: Option<&Path>) -> Result<(), LoadError> {
    let xdg_map = layering::xdg_env_map(app_name)?;
    let dotenv_map = layering::dotenv_map(override_dir).map_err(LoadError::DotenvRead)?;

    let mut keys: std::collections::HashSet<String> = xdg_map.keys().cloned().collect();
    keys.extend(dotenv_map.keys().cloned());

    for key in keys {
        if std::env::var(&key).is_ok() {
            continue; // existing env wins
        }
        if let Some(v) = dotenv_map.get(&key).or_else(|| xdg_map.get(&key)) {
            std::env::set_var(&key, v);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn existing_env_wins() {
        std::env::set_var("SWITCHBOARD_LAYERING_TEST", "from_env");
        let _ = load_and_apply("switchboard-test-app", None);
        assert_eq!(
            std::env::var("SWITCHBOARD_LAYERING_TEST").as_deref(),
            Ok("from_env")
        );
        std::env::remove_var("SWITCHBOARD_LAYERING_TEST");
    }

    #[test]
    fn load_and_apply_without_config_is_ok() {
        let r = load_and_apply("switchboard-nonexistent-app-xyz", None);
        assert!(r.is_ok());
    }

    #[test]
    fn dotenv_values_are_applied_when_env_is_unset() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".env"),
            "SWITCHBOARD_DOTENV_TEST=from_dotenv\n",
        )
        .unwrap();
        std::env::remove_var("SWITCHBOARD_DOTENV_TEST");

        load_and_apply("switchboard-nonexistent-app-xyz", Some(dir.path())).unwrap();
        assert_eq!(
            std::env::var("SWITCHBOARD_DOTENV_TEST").as_deref(),
            Ok("from_dotenv")
        );
        std::env::remove_var("SWITCHBOARD_DOTENV_TEST");
    }
}
