//! Remote synchronization for omi repositories.
//!
//! The remote stores each repository as one opaque file. Push uploads the
//! local store file verbatim, pull replaces it with the server's copy. There
//! is no partial transfer and no retry; the only second chance is the
//! transport fallback.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::auth::{CREDENTIAL_REGISTRY_FILE, OtpPrompt, TerminalPrompt, TwoFactorGate};
use crate::config::Settings;
use crate::pointer::{DEFAULT_DB_NAME, RepositoryLocation};
use crate::storage::{OmiError, Result, install_store_file};
use crate::transport::{self, FormField, RemoteRequest, RemoteResponse, Transport};

/// One entry of the server's `?format=json` listing
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteRepository {
    pub name: String,
}

/// Push/pull client bound to one settings value and one transport.
pub struct SyncClient {
    settings: Settings,
    transport: Box<dyn Transport>,
    gate: TwoFactorGate,
    prompt: Box<dyn OtpPrompt>,
}

impl SyncClient {
    pub fn new(settings: Settings, transport: Box<dyn Transport>) -> Self {
        Self {
            settings,
            transport,
            gate: TwoFactorGate::new(CREDENTIAL_REGISTRY_FILE),
            prompt: Box::new(TerminalPrompt),
        }
    }

    /// Build a client with the transport the settings select.
    ///
    /// Fails with `RemoteDisabled` before touching any transport when the
    /// API is switched off.
    pub fn from_settings(settings: Settings) -> Result<Self> {
        settings.ensure_remote_enabled()?;
        let transport = transport::from_settings(&settings)?;
        tracing::debug!("using {} transport", transport.name());
        Ok(Self::new(settings, transport))
    }

    pub fn with_credential_registry(mut self, path: impl Into<PathBuf>) -> Self {
        self.gate = TwoFactorGate::new(path);
        self
    }

    pub fn with_prompt(mut self, prompt: Box<dyn OtpPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn endpoint(&self) -> Result<String> {
        Ok(format!("{}/", self.settings.repos_url()?))
    }

    /// Credentials plus the one-time code when the user has a second factor
    fn authenticate(&self) -> Result<(Vec<FormField>, Option<String>)> {
        let (username, password) = self.settings.credentials()?;
        let otp = self.gate.challenge(username, self.prompt.as_ref())?;
        let fields = vec![FormField::text("username", username), FormField::text("password", password)];
        Ok((fields, otp))
    }

    /// Upload the whole store file.
    pub fn push(&self, location: &RepositoryLocation) -> Result<()> {
        let db_path = location.db_path();
        if !db_path.is_file() {
            return Err(OmiError::FileNotFound(db_path));
        }
        self.settings.ensure_remote_enabled()?;
        let url = self.endpoint()?;

        let (mut fields, otp) = self.authenticate()?;
        fields.push(FormField::text("repo_name", location.db_name()));
        fields.push(FormField::file("repo_file", &db_path));
        if let Some(code) = otp {
            fields.push(FormField::text("otp_code", code));
        }
        fields.push(FormField::text("action", "Upload"));

        tracing::info!("pushing {} to {}", location.db_name(), url);
        let resp = self.transport.execute(&RemoteRequest::PostForm { url, fields })?;
        expect_success(resp)?;
        Ok(())
    }

    /// Replace the local store file with the server's copy.
    pub fn pull(&self, location: &RepositoryLocation) -> Result<()> {
        let db_path = location.db_path();
        if !db_path.is_file() {
            return Err(OmiError::FileNotFound(db_path));
        }
        self.settings.ensure_remote_enabled()?;
        let url = self.endpoint()?;

        let (mut fields, otp) = self.authenticate()?;
        fields.push(FormField::text("repo_name", location.db_name()));
        if let Some(code) = otp {
            fields.push(FormField::text("otp_code", code));
        }
        fields.push(FormField::text("action", "pull"));

        tracing::info!("pulling {} from {}", location.db_name(), url);
        let resp = self.transport.execute(&RemoteRequest::PostForm { url, fields })?;
        let body = expect_success(resp)?;
        install_store_file(&db_path, &body)?;
        Ok(())
    }

    /// Names of the repositories the remote holds. No credentials needed.
    pub fn list(&self) -> Result<Vec<String>> {
        self.settings.ensure_remote_enabled()?;
        let url = format!("{}?format=json", self.endpoint()?);
        let body = expect_success(self.transport.execute(&RemoteRequest::Get { url })?)?;
        let repos: Vec<RemoteRepository> = serde_json::from_slice(&body).map_err(|e| {
            OmiError::RemoteRejected { status: 200, reason: format!("invalid repository listing: {}", e) }
        })?;
        Ok(repos.into_iter().map(|r| r.name).collect())
    }

    /// Download the named repository into `root` and point `.omi` at it.
    ///
    /// `source` may be a URL or path; only its last component names the
    /// repository on the server.
    pub fn clone_remote(&self, root: &Path, source: &str) -> Result<RepositoryLocation> {
        self.settings.ensure_remote_enabled()?;
        let name = Path::new(source.trim_end_matches('/'))
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(DEFAULT_DB_NAME)
            .to_string();
        let url = reqwest::Url::parse_with_params(&self.endpoint()?, [("download", name.as_str())])
            .map_err(|e| OmiError::ConfigMissing(format!("REPOS is not a valid URL: {}", e)))?;

        tracing::info!("downloading {} from {}", name, self.settings.repos_url()?);
        let resp = self.transport.execute(&RemoteRequest::Get { url: url.to_string() })?;
        let body = expect_success(resp)?;

        let location = RepositoryLocation::new(root, name);
        install_store_file(&location.db_path(), &body)?;
        location.write_pointer()?;
        Ok(location)
    }
}

/// Body of a 200 response; anything else is `RemoteRejected`.
pub fn expect_success(resp: RemoteResponse) -> Result<Vec<u8>> {
    if resp.is_success() {
        return Ok(resp.body);
    }
    let known = match resp.status {
        401 => Some("authentication failed"),
        404 => Some("repository not found"),
        429 => Some("rate limit exceeded"),
        503 => Some("remote API disabled"),
        _ => None,
    };
    let body = String::from_utf8_lossy(&resp.body);
    let body: String = body.trim().chars().take(200).collect();
    let reason = match (known, body.is_empty()) {
        (Some(k), true) => k.to_string(),
        (Some(k), false) => format!("{} ({})", k, body),
        (None, false) => body,
        (None, true) => "unexpected response".to_string(),
    };
    Err(OmiError::RemoteRejected { status: resp.status, reason })
}
