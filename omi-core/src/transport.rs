//! Transports for talking to the remote repository server.
//!
//! Every transport takes the same [`RemoteRequest`] and returns the raw HTTP
//! status and body, so the sync client applies one success rule no matter
//! which transport carried the request.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use crate::config::Settings;
use crate::storage::{OmiError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormValue {
    Text(String),
    /// Uploaded verbatim from disk
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    pub name: String,
    pub value: FormValue,
}

impl FormField {
    pub fn text(name: &str, value: impl Into<String>) -> Self {
        Self { name: name.to_string(), value: FormValue::Text(value.into()) }
    }

    pub fn file(name: &str, path: impl Into<PathBuf>) -> Self {
        Self { name: name.to_string(), value: FormValue::File(path.into()) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteRequest {
    Get { url: String },
    /// multipart/form-data POST
    PostForm { url: String, fields: Vec<FormField> },
}

impl RemoteRequest {
    pub fn url(&self) -> &str {
        match self {
            RemoteRequest::Get { url } | RemoteRequest::PostForm { url, .. } => url,
        }
    }

    /// Text value of a form field, if present
    pub fn field(&self, name: &str) -> Option<&str> {
        match self {
            RemoteRequest::PostForm { fields, .. } => fields.iter().find_map(|f| match &f.value {
                FormValue::Text(v) if f.name == name => Some(v.as_str()),
                _ => None,
            }),
            RemoteRequest::Get { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RemoteResponse {
    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

/// Carries one request to the remote and returns its response.
///
/// Only network-level problems are `TransportFailure`; any HTTP status,
/// including errors, is a successful transport result.
pub trait Transport {
    fn name(&self) -> &'static str;
    fn execute(&self, request: &RemoteRequest) -> Result<RemoteResponse>;
}

/// In-process blocking HTTP client
pub struct HttpTransport {
    http: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OmiError::TransportFailure(format!("HTTP client unavailable: {}", e)))?;
        Ok(Self { http })
    }

    fn build_form(fields: &[FormField]) -> Result<reqwest::blocking::multipart::Form> {
        use reqwest::blocking::multipart::{Form, Part};

        let mut form = Form::new();
        for field in fields {
            form = match &field.value {
                FormValue::Text(value) => form.text(field.name.clone(), value.clone()),
                FormValue::File(path) => {
                    let file_name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| "file".to_string());
                    form.part(field.name.clone(), Part::bytes(fs::read(path)?).file_name(file_name))
                }
            };
        }
        Ok(form)
    }
}

impl Transport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    fn execute(&self, request: &RemoteRequest) -> Result<RemoteResponse> {
        let builder = match request {
            RemoteRequest::Get { url } => self.http.get(url),
            RemoteRequest::PostForm { url, fields } => {
                self.http.post(url).multipart(Self::build_form(fields)?)
            }
        };
        let failure = |e: reqwest::Error| OmiError::TransportFailure(e.to_string());
        let resp = builder.send().map_err(failure)?;
        let status = resp.status().as_u16();
        let body = resp.bytes().map_err(failure)?.to_vec();
        Ok(RemoteResponse { status, body })
    }
}

/// External transfer program (curl-compatible command line)
pub struct CurlTransport {
    program: PathBuf,
    timeout: Duration,
}

impl CurlTransport {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self { program: program.into(), timeout }
    }
}

/// Command line for one request; the body goes to `output`, the status
/// code to stdout.
pub fn curl_args(request: &RemoteRequest, output: &Path, timeout: Duration) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "--silent".into(),
        "--show-error".into(),
        "--max-time".into(),
        timeout.as_secs().to_string().into(),
        "--output".into(),
        output.into(),
        "--write-out".into(),
        "%{http_code}".into(),
    ];
    if let RemoteRequest::PostForm { fields, .. } = request {
        for field in fields {
            match &field.value {
                FormValue::Text(value) => {
                    args.push("--form-string".into());
                    args.push(format!("{}={}", field.name, value).into());
                }
                FormValue::File(path) => {
                    let mut arg = OsString::from(format!("{}=@", field.name));
                    arg.push(path);
                    args.push("-F".into());
                    args.push(arg);
                }
            }
        }
    }
    args.push(request.url().into());
    args
}

impl Transport for CurlTransport {
    fn name(&self) -> &'static str {
        "curl"
    }

    fn execute(&self, request: &RemoteRequest) -> Result<RemoteResponse> {
        let body_file = tempfile::NamedTempFile::new()?;
        let output = Command::new(&self.program)
            .args(curl_args(request, body_file.path(), self.timeout))
            .output()
            .map_err(|e| {
                OmiError::TransportFailure(format!("failed to run {}: {}", self.program.display(), e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OmiError::TransportFailure(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }

        let code = String::from_utf8_lossy(&output.stdout);
        let status = code.trim().parse::<u16>().map_err(|_| {
            OmiError::TransportFailure(format!("unexpected status output {:?}", code.trim()))
        })?;
        let body = fs::read(body_file.path())?;
        Ok(RemoteResponse { status, body })
    }
}

/// Tries `primary`, and on a transport failure retries once through
/// `fallback`.
pub struct FallbackTransport {
    primary: Box<dyn Transport>,
    fallback: Option<Box<dyn Transport>>,
}

impl FallbackTransport {
    pub fn new(primary: Box<dyn Transport>, fallback: Option<Box<dyn Transport>>) -> Self {
        Self { primary, fallback }
    }
}

impl Transport for FallbackTransport {
    fn name(&self) -> &'static str {
        self.primary.name()
    }

    fn execute(&self, request: &RemoteRequest) -> Result<RemoteResponse> {
        match self.primary.execute(request) {
            Err(OmiError::TransportFailure(reason)) => match &self.fallback {
                Some(fallback) => {
                    tracing::warn!(
                        "{} transport failed ({}), falling back to {}",
                        self.primary.name(),
                        reason,
                        fallback.name()
                    );
                    fallback.execute(request)
                }
                None => Err(OmiError::TransportFailure(reason)),
            },
            other => other,
        }
    }
}

/// Pick the transport described by the settings.
pub fn from_settings(settings: &Settings) -> Result<Box<dyn Transport>> {
    let curl = settings
        .curl
        .as_ref()
        .map(|program| Box::new(CurlTransport::new(program, settings.http_timeout)) as Box<dyn Transport>);

    if settings.use_internal_http {
        match HttpTransport::new(settings.http_timeout) {
            Ok(http) => return Ok(Box::new(FallbackTransport::new(Box::new(http), curl))),
            Err(e) => tracing::warn!("{}; using external transfer program", e),
        }
    }
    curl.ok_or_else(|| OmiError::ConfigMissing("CURL".to_string()))
}
