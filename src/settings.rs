//! Gateway settings
//!
//! Read from an optional JSON file, then overridden by environment variables.
//! Settings are a plain value passed to whoever needs them; there is no global.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{DeskflowError, DeskflowResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub supabase_url: String,
    #[serde(default)]
    pub supabase_anon_key: String,
    /// Refresh token of the user the MCP server acts as. REST requests bring their own.
    #[serde(default)]
    pub user_refresh_token: Option<String>,
    #[serde(default = "default_rate_limit_read")]
    pub rate_limit_read: usize,
    #[serde(default = "default_rate_limit_write")]
    pub rate_limit_write: usize,
    /// Deletes that match no row fail with NotFound instead of succeeding.
    #[serde(default)]
    pub strict_deletes: bool,
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
}

fn default_rate_limit_read() -> usize {
    100
}

fn default_rate_limit_write() -> usize {
    30
}

fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_http_timeout() -> u64 {
    30
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            user_refresh_token: None,
            rate_limit_read: default_rate_limit_read(),
            rate_limit_write: default_rate_limit_write(),
            strict_deletes: false,
            bind: default_bind(),
            http_timeout_secs: default_http_timeout(),
        }
    }
}

/// `<config_dir>/deskflow/settings.json`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("deskflow").join("settings.json"))
}

impl Settings {
    /// Parse a settings file.
    pub fn from_file(path: &Path) -> DeskflowResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| DeskflowError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| DeskflowError::Config(format!("Invalid settings in {}: {}", path.display(), e)))
    }

    /// Load from `path` (must exist) or from the default location (optional),
    /// then apply the process environment.
    pub fn load(path: Option<&Path>) -> DeskflowResult<Self> {
        let mut settings = match path {
            Some(p) => Self::from_file(p)?,
            None => match default_config_path() {
                Some(p) if p.exists() => Self::from_file(&p)?,
                _ => Settings::default(),
            },
        };
        settings.apply_env(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    /// Override fields from environment-style lookups. Empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> DeskflowResult<()> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("SUPABASE_URL") {
            self.supabase_url = v;
        }
        if let Some(v) = get("SUPABASE_ANON_KEY") {
            self.supabase_anon_key = v;
        }
        if let Some(v) = get("USER_REFRESH_TOKEN") {
            self.user_refresh_token = Some(v);
        }
        if let Some(v) = get("RATE_LIMIT_READ") {
            self.rate_limit_read = parse_number("RATE_LIMIT_READ", &v)?;
        }
        if let Some(v) = get("RATE_LIMIT_WRITE") {
            self.rate_limit_write = parse_number("RATE_LIMIT_WRITE", &v)?;
        }
        if let Some(v) = get("DESKFLOW_STRICT_DELETES") {
            self.strict_deletes = matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        if let Some(v) = get("DESKFLOW_BIND") {
            self.bind = v;
        } else if let Some(port) = get("PORT") {
            let port: u16 = parse_number("PORT", &port)?;
            self.bind = format!("0.0.0.0:{}", port);
        }
        if let Some(v) = get("DESKFLOW_HTTP_TIMEOUT_SECS") {
            self.http_timeout_secs = parse_number("DESKFLOW_HTTP_TIMEOUT_SECS", &v)?;
        }
        Ok(())
    }

    /// Check what every entry point needs. The MCP server also needs a refresh token.
    pub fn validate(&self, require_refresh_token: bool) -> DeskflowResult<()> {
        if self.supabase_url.trim().is_empty() || self.supabase_anon_key.trim().is_empty() {
            return Err(DeskflowError::Config(
                "SUPABASE_URL and SUPABASE_ANON_KEY are required".to_string(),
            ));
        }
        if require_refresh_token && self.user_refresh_token.as_deref().map_or(true, |t| t.trim().is_empty()) {
            return Err(DeskflowError::Config(
                "USER_REFRESH_TOKEN is required; copy it from the DeskFlow web app".to_string(),
            ));
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Anon key for display (shows first 8 and last 4 chars)
    pub fn masked_anon_key(&self) -> String {
        let key = &self.supabase_anon_key;
        if key.len() > 12 && key.is_ascii() {
            format!("{}...{}", &key[..8], &key[key.len() - 4..])
        } else {
            "*".repeat(key.chars().count())
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> DeskflowResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| DeskflowError::Config(format!("{} must be a number, got '{}'", key, value)))
}
