//! Local two-factor gate for remote commands
//!
//! The credential registry is the server's user file, one user per line:
//!
//! ```text
//! alice:password:otpauth://totp/Omi%20(alice)?secret=JBSWY3DPEHPK3PXP:en
//! bob:password::en
//! ```
//!
//! A non-empty third field means the user has a second factor and must
//! supply a one-time code with push and pull. The check never contacts the
//! remote.

use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use crate::storage::Result;

pub const CREDENTIAL_REGISTRY_FILE: &str = "phpusers.txt";

/// Users with a registered second factor
#[derive(Debug, Clone, Default)]
pub struct CredentialRegistry {
    otp: HashMap<String, bool>,
}

impl CredentialRegistry {
    /// Load the registry. A missing file means nobody has a second factor.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Ok(Self::default());
        }
        Ok(Self::parse(&fs::read_to_string(path)?))
    }

    pub fn parse(content: &str) -> Self {
        let mut otp = HashMap::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            // user:password:otp[:language]; otpauth URLs contain ':' themselves,
            // but only emptiness of the third field matters
            let parts: Vec<&str> = line.splitn(4, ':').collect();
            if parts.len() < 3 || parts[0].is_empty() {
                continue;
            }
            otp.insert(parts[0].to_string(), !parts[2].trim().is_empty());
        }
        Self { otp }
    }

    pub fn has_second_factor(&self, username: &str) -> bool {
        self.otp.get(username).copied().unwrap_or(false)
    }
}

/// Source of one-time codes.
pub trait OtpPrompt {
    fn one_time_code(&self, username: &str) -> Result<String>;
}

/// Prompts on stderr and reads a line from stdin.
pub struct TerminalPrompt;

impl OtpPrompt for TerminalPrompt {
    fn one_time_code(&self, username: &str) -> Result<String> {
        let mut stderr = std::io::stderr();
        write!(stderr, "Enter OTP code for {} (6 digits): ", username)?;
        stderr.flush()?;
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
        Ok(line.trim().to_string())
    }
}

/// Where the sync client looks up second factors
#[derive(Debug, Clone)]
pub struct TwoFactorGate {
    registry_path: PathBuf,
}

impl TwoFactorGate {
    pub fn new(registry_path: impl Into<PathBuf>) -> Self {
        Self { registry_path: registry_path.into() }
    }

    /// Ask for a code if `username` has a second factor; `None` otherwise.
    pub fn challenge(&self, username: &str, prompt: &dyn OtpPrompt) -> Result<Option<String>> {
        let registry = CredentialRegistry::from_file(&self.registry_path)?;
        if !registry.has_second_factor(username) {
            return Ok(None);
        }
        tracing::debug!("{} has a second factor registered", username);
        let code = prompt.one_time_code(username)?;
        Ok((!code.is_empty()).then_some(code))
    }
}
