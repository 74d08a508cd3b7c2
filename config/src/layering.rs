//! Raw key-value sources: project `.env` and the `[env]` table of the XDG
//! `config.toml`. Values are collected into maps here and applied in `lib`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::LoadError;

/// Minimal `.env` parser: `KEY=VALUE` lines, `#` comments, trimmed keys and
/// values, surrounding single or double quotes stripped (double quotes
/// support the `\"` escape). No multiline values.
fn parse_dotenv(content: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((k, v)) = line.split_once('=') else {
            continue;
        };
        let key = k.trim().to_string();
        if key.is_empty() {
            continue;
        }
        let value = v.trim();
        let value = if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
            value[1..value.len() - 1].replace("\\\"", "\"")
        } else if value.len() >= 2 && value.starts_with('\'') && value.ends_with('\'') {
            value[1..value.len() - 1].to_string()
        } else {
            value.to_string()
        };
        out.insert(key, value);
    }
    out
}

/// Loads `.env` from `override_dir` or the current directory. A missing
/// file yields an empty map.
pub(crate) fn dotenv_map(override_dir: Option<&Path>) -> std::io::Result<HashMap<String, String>> {
    let dir = match override_dir
        .map(Path::to_path_buf)
        .or_else(|| std::env::current_dir().ok())
    {
        Some(d) => d,
        None => return Ok(HashMap::new()),
    };
    let path = dir.join(".env");
    if !path.is_file() {
        return Ok(HashMap::new());
    }
    Ok(parse_dotenv(&std::fs::read_to_string(path)?))
}

fn xdg_config_path(app_name: &str) -> Option<PathBuf> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(dirs::config_dir)?;
    let path = base.join(app_name).join("config.toml");
    path.is_file().then_some(path)
}

#[derive(serde::Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    env: HashMap<String, String>,
}

/// Returns the `[env]` table of the app's XDG config. Missing file or
/// section yields an empty map.
pub(crate) fn xdg_env_map(app_name: &str) -> Result<HashMap<String, String>, LoadError> {
    let path = match xdg_config_path(app_name) {
        Some(p) => p,
        None => return Ok(HashMap::new()),
    };
    let content = std::fs::read_to_string(&path).map_err(LoadError::XdgRead)?;
    let config: ConfigFile = toml::from_str(&content)?;
    Ok(config.env)
}
