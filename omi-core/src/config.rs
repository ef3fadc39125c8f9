//! Settings loaded from `settings.txt`
//!
//! One `KEY=value` pair per line. Unknown keys are ignored; keys needed only
//! by remote commands are checked when those commands run.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::storage::{OmiError, Result};

pub const SETTINGS_FILE: &str = "settings.txt";

/// Immutable tool configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// `API_ENABLED`; "0" disables every remote operation
    pub api_enabled: bool,
    /// `API_RATE_LIMIT`, enforced by the server only
    pub api_rate_limit: u32,
    /// `API_RATE_LIMIT_WINDOW` in seconds, enforced by the server only
    pub api_rate_limit_window: u32,
    /// `REPOS`: remote base URL
    pub repos: Option<String>,
    /// `CURL`: external transfer executable
    pub curl: Option<PathBuf>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// `USE_INTERNAL_HTTP`; "1" prefers the in-process client
    pub use_internal_http: bool,
    /// `HTTP_TIMEOUT` in seconds
    pub http_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_enabled: true,
            api_rate_limit: 60,
            api_rate_limit_window: 60,
            repos: None,
            curl: None,
            username: None,
            password: None,
            use_internal_http: true,
            http_timeout: Duration::from_secs(30),
        }
    }
}

impl Settings {
    /// Load settings from a file. A missing file is `ConfigMissing`.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(OmiError::ConfigMissing(format!("{} not found", path.display())));
        }
        Self::parse(&fs::read_to_string(path)?)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut values = HashMap::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                values.insert(key.trim().to_string(), value.trim().to_string());
            }
        }

        let text = |key: &str| values.get(key).filter(|v| !v.is_empty()).cloned();
        let mut settings = Settings::default();
        if let Some(v) = text("API_ENABLED") {
            settings.api_enabled = v != "0";
        }
        if let Some(v) = text("API_RATE_LIMIT") {
            settings.api_rate_limit = parse_number("API_RATE_LIMIT", &v)?;
        }
        if let Some(v) = text("API_RATE_LIMIT_WINDOW") {
            settings.api_rate_limit_window = parse_number("API_RATE_LIMIT_WINDOW", &v)?;
        }
        if let Some(v) = text("USE_INTERNAL_HTTP") {
            settings.use_internal_http = v == "1";
        }
        if let Some(v) = text("HTTP_TIMEOUT") {
            // curl reads `--max-time 0` as no limit, reqwest as an instant timeout
            let secs = parse_number("HTTP_TIMEOUT", &v)?;
            if secs == 0 {
                return Err(OmiError::ConfigMissing("HTTP_TIMEOUT must be at least 1 second".to_string()));
            }
            settings.http_timeout = Duration::from_secs(secs.into());
        }
        settings.repos = text("REPOS");
        settings.curl = text("CURL").map(PathBuf::from);
        settings.username = text("USERNAME");
        settings.password = text("PASSWORD");
        Ok(settings)
    }

    /// Fails with `RemoteDisabled` when `API_ENABLED=0`.
    pub fn ensure_remote_enabled(&self) -> Result<()> {
        if self.api_enabled { Ok(()) } else { Err(OmiError::RemoteDisabled) }
    }

    /// Remote base URL without a trailing slash
    pub fn repos_url(&self) -> Result<&str> {
        self.repos
            .as_deref()
            .map(|r| r.trim_end_matches('/'))
            .ok_or_else(|| OmiError::ConfigMissing("REPOS".to_string()))
    }

    /// `(USERNAME, PASSWORD)`, both required for push and pull
    pub fn credentials(&self) -> Result<(&str, &str)> {
        let username = self
            .username
            .as_deref()
            .ok_or_else(|| OmiError::ConfigMissing("USERNAME".to_string()))?;
        let password = self
            .password
            .as_deref()
            .ok_or_else(|| OmiError::ConfigMissing("PASSWORD".to_string()))?;
        Ok((username, password))
    }
}

fn parse_number(key: &str, value: &str) -> Result<u32> {
    value
        .parse()
        .map_err(|_| OmiError::ConfigMissing(format!("{} must be a whole number, got {:?}", key, value)))
}
