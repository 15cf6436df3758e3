#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::resolver::{DEFAULT_FALLBACK_LANGUAGE, DEFAULT_PREFERRED_LANGUAGE};

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_TRANSCRIPT_PORT: u16 = 8000;
pub const DEFAULT_TRANSCRIPT_HOST: &str = "127.0.0.1";
pub const DEFAULT_YT_DLP_BIN: &str = "yt-dlp";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub yt_dlp_bin: PathBuf,
    pub timeout: Duration,
    pub preferred_language: String,
    pub fallback_language: String,
    pub cookies: Option<PathBuf>,
    pub scratch_root: PathBuf,
}

/// Values given on the command line; they win over the environment and the
/// `.env` file.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub yt_dlp_bin: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub env_path: Option<PathBuf>,
}

pub fn resolve_settings(overrides: SettingsOverrides) -> Result<Settings> {
    let env_path = overrides
        .env_path
        .as_deref()
        .unwrap_or_else(|| Path::new(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(env_path)?;
    Ok(build_settings_with_overrides(
        &file_vars,
        env_var_string,
        overrides,
    ))
}

#[cfg(test)]
fn build_settings(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> Settings {
    build_settings_with_overrides(file_vars, env_lookup, SettingsOverrides::default())
}

fn build_settings_with_overrides(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: SettingsOverrides,
) -> Settings {
    let lookup = |key: &str| lookup_value(key, file_vars, &env_lookup);

    let host = overrides
        .host
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .or_else(|| lookup("TRANSCRIPT_HOST"))
        .unwrap_or_else(|| DEFAULT_TRANSCRIPT_HOST.to_string());
    let port = overrides
        .port
        .or_else(|| lookup("TRANSCRIPT_PORT").and_then(|value| value.parse::<u16>().ok()))
        .unwrap_or(DEFAULT_TRANSCRIPT_PORT);
    let yt_dlp_bin = overrides
        .yt_dlp_bin
        .or_else(|| lookup("YT_DLP_BIN").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_YT_DLP_BIN));
    let timeout_secs = overrides
        .timeout_secs
        .or_else(|| {
            lookup("TRANSCRIPT_TIMEOUT_SECS").and_then(|value| value.parse::<u64>().ok())
        })
        .filter(|secs| *secs > 0)
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    let preferred_language = lookup("TRANSCRIPT_PREFERRED_LANG")
        .unwrap_or_else(|| DEFAULT_PREFERRED_LANGUAGE.to_string());
    let fallback_language = lookup("TRANSCRIPT_FALLBACK_LANG")
        .unwrap_or_else(|| DEFAULT_FALLBACK_LANGUAGE.to_string());
    let cookies = lookup("TRANSCRIPT_COOKIES").map(PathBuf::from);
    let scratch_root = lookup("TRANSCRIPT_TMP_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(env::temp_dir);

    Settings {
        host,
        port,
        yt_dlp_bin,
        timeout: Duration::from_secs(timeout_secs),
        preferred_language,
        fallback_language,
        cookies,
        scratch_root,
    }
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key)
        .or_else(|| file_vars.get(key).cloned())
        .filter(|value| !value.trim().is_empty())
}

pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}
