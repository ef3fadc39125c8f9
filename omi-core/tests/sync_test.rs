//! Sync client tests against an in-memory remote
//!
//! `FakeRemote` understands the same form fields and query strings as the
//! real server: multipart POST with `action=Upload|pull`, `GET ?format=json`
//! and `GET ?download=<name>`.

use omi_core::{
    OmiError, OtpPrompt, RemoteRequest, RemoteResponse, Repository, Result, Settings, SyncClient,
    Transport,
};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::rc::Rc;
use tempfile::TempDir;

#[derive(Default)]
struct RemoteState {
    repos: BTreeMap<String, Vec<u8>>,
    requests: Vec<RemoteRequest>,
    /// username -> required one-time code
    otp: BTreeMap<String, String>,
}

#[derive(Clone, Default)]
struct FakeRemote {
    state: Rc<RefCell<RemoteState>>,
}

impl FakeRemote {
    fn requests(&self) -> usize {
        self.state.borrow().requests.len()
    }

    fn stored(&self, name: &str) -> Option<Vec<u8>> {
        self.state.borrow().repos.get(name).cloned()
    }

    fn respond(&self, request: &RemoteRequest) -> RemoteResponse {
        let reply = |status: u16, body: Vec<u8>| RemoteResponse { status, body };
        let mut state = self.state.borrow_mut();
        match request {
            RemoteRequest::Get { url } => {
                if url.ends_with("?format=json") {
                    let names: Vec<String> =
                        state.repos.keys().map(|n| format!("{{\"name\":\"{}\",\"size\":1}}", n)).collect();
                    reply(200, format!("[{}]", names.join(",")).into_bytes())
                } else if let Some((_, name)) = url.split_once("?download=") {
                    match state.repos.get(name) {
                        Some(data) => reply(200, data.clone()),
                        None => reply(404, b"Repository not found".to_vec()),
                    }
                } else {
                    reply(400, Vec::new())
                }
            }
            RemoteRequest::PostForm { fields, .. } => {
                if request.field("username") != Some("alice") || request.field("password") != Some("pw") {
                    return reply(401, Vec::new());
                }
                if let Some(code) = state.otp.get("alice") {
                    if request.field("otp_code") != Some(code.as_str()) {
                        return reply(401, b"Invalid OTP code".to_vec());
                    }
                }
                let Some(name) = request.field("repo_name").map(str::to_string) else {
                    return reply(400, Vec::new());
                };
                match request.field("action") {
                    Some("Upload") => {
                        let file = fields.iter().find_map(|f| match &f.value {
                            omi_core::FormValue::File(path) if f.name == "repo_file" => Some(path.clone()),
                            _ => None,
                        });
                        match file.and_then(|p| fs::read(p).ok()) {
                            Some(data) => {
                                state.repos.insert(name, data);
                                reply(200, b"Uploaded".to_vec())
                            }
                            None => reply(400, Vec::new()),
                        }
                    }
                    Some("pull") => match state.repos.get(&name) {
                        Some(data) => reply(200, data.clone()),
                        None => reply(404, Vec::new()),
                    },
                    _ => reply(400, Vec::new()),
                }
            }
        }
    }
}

impl Transport for FakeRemote {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn execute(&self, request: &RemoteRequest) -> Result<RemoteResponse> {
        let resp = self.respond(request);
        self.state.borrow_mut().requests.push(request.clone());
        Ok(resp)
    }
}

struct ScriptedPrompt {
    code: &'static str,
    calls: Rc<Cell<u32>>,
}

impl OtpPrompt for ScriptedPrompt {
    fn one_time_code(&self, _username: &str) -> Result<String> {
        self.calls.set(self.calls.get() + 1);
        Ok(self.code.to_string())
    }
}

fn settings(extra: &str) -> Settings {
    Settings::parse(&format!("REPOS=http://omi.test/repos\nUSERNAME=alice\nPASSWORD=pw\n{}", extra)).unwrap()
}

fn client(dir: &Path, remote: &FakeRemote, settings: Settings) -> (SyncClient, Rc<Cell<u32>>) {
    let calls = Rc::new(Cell::new(0));
    let client = SyncClient::new(settings, Box::new(remote.clone()))
        .with_credential_registry(dir.join("phpusers.txt"))
        .with_prompt(Box::new(ScriptedPrompt { code: "424242", calls: calls.clone() }));
    (client, calls)
}

fn repo_with_commit(dir: &Path, content: &str) -> Repository {
    let mut repo = Repository::init(dir, "repo.omi").unwrap();
    fs::write(dir.join("a.txt"), content).unwrap();
    repo.add("a.txt").unwrap();
    repo.commit("work", "alice").unwrap();
    repo
}

#[test]
fn test_push_then_pull_round_trips_bytes() {
    let tmp = TempDir::new().unwrap();
    let remote = FakeRemote::default();
    let (client, _) = client(tmp.path(), &remote, settings(""));

    let mut repo = repo_with_commit(tmp.path(), "first");
    let location = repo.location().clone();
    client.push(&location).unwrap();
    let pushed = fs::read(location.db_path()).unwrap();
    assert_eq!(remote.stored("repo.omi").unwrap(), pushed);

    fs::write(tmp.path().join("a.txt"), "second").unwrap();
    repo.add("a.txt").unwrap();
    repo.commit("local only", "alice").unwrap();
    drop(repo);
    assert_ne!(fs::read(location.db_path()).unwrap(), pushed);

    client.pull(&location).unwrap();
    assert_eq!(fs::read(location.db_path()).unwrap(), pushed);
    let repo = Repository::open(tmp.path()).unwrap();
    assert_eq!(repo.log(10).unwrap().len(), 1);
}

#[test]
fn test_push_sends_expected_fields() {
    let tmp = TempDir::new().unwrap();
    let remote = FakeRemote::default();
    let (client, _) = client(tmp.path(), &remote, settings(""));
    let repo = repo_with_commit(tmp.path(), "x");

    client.push(repo.location()).unwrap();
    let state = remote.state.borrow();
    let request = &state.requests[0];
    assert_eq!(request.url(), "http://omi.test/repos/");
    assert_eq!(request.field("repo_name"), Some("repo.omi"));
    assert_eq!(request.field("action"), Some("Upload"));
    assert_eq!(request.field("otp_code"), None);
}

#[test]
fn test_push_with_api_disabled_makes_no_request() {
    let tmp = TempDir::new().unwrap();
    let remote = FakeRemote::default();
    let (client, _) = client(tmp.path(), &remote, settings("API_ENABLED=0\n"));
    let repo = repo_with_commit(tmp.path(), "x");

    assert!(matches!(client.push(repo.location()), Err(OmiError::RemoteDisabled)));
    assert!(matches!(client.pull(repo.location()), Err(OmiError::RemoteDisabled)));
    assert!(matches!(client.list(), Err(OmiError::RemoteDisabled)));
    assert_eq!(remote.requests(), 0);
}

#[test]
fn test_from_settings_rejects_disabled_api() {
    let result = SyncClient::from_settings(settings("API_ENABLED=0\nUSE_INTERNAL_HTTP=0\n"));
    assert!(matches!(result, Err(OmiError::RemoteDisabled)));
}

#[test]
fn test_push_without_store_file_fails() {
    let tmp = TempDir::new().unwrap();
    let remote = FakeRemote::default();
    let (client, _) = client(tmp.path(), &remote, settings(""));

    let location = omi_core::RepositoryLocation::new(tmp.path(), "missing.omi");
    assert!(matches!(client.push(&location), Err(OmiError::FileNotFound(_))));
    assert_eq!(remote.requests(), 0);
}

#[test]
fn test_two_factor_user_is_prompted() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("phpusers.txt"), "alice:pw:otpauth://totp/Omi?secret=ABC:en\n").unwrap();
    let remote = FakeRemote::default();
    remote.state.borrow_mut().otp.insert("alice".into(), "424242".into());
    let (client, calls) = client(tmp.path(), &remote, settings(""));
    let repo = repo_with_commit(tmp.path(), "x");

    client.push(repo.location()).unwrap();
    assert_eq!(calls.get(), 1);
    assert_eq!(remote.state.borrow().requests[0].field("otp_code"), Some("424242"));

    client.pull(repo.location()).unwrap();
    assert_eq!(calls.get(), 2);
}

#[test]
fn test_user_without_factor_is_not_prompted() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("phpusers.txt"), "alice:pw::en\n").unwrap();
    let remote = FakeRemote::default();
    let (client, calls) = client(tmp.path(), &remote, settings(""));
    let repo = repo_with_commit(tmp.path(), "x");

    client.push(repo.location()).unwrap();
    assert_eq!(calls.get(), 0);
}

#[test]
fn test_wrong_password_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let remote = FakeRemote::default();
    let bad = Settings::parse("REPOS=http://omi.test/repos\nUSERNAME=alice\nPASSWORD=nope\n").unwrap();
    let (client, _) = client(tmp.path(), &remote, bad);
    let repo = repo_with_commit(tmp.path(), "x");

    match client.push(repo.location()) {
        Err(OmiError::RemoteRejected { status, .. }) => assert_eq!(status, 401),
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[test]
fn test_failed_pull_keeps_local_file() {
    let tmp = TempDir::new().unwrap();
    let remote = FakeRemote::default();
    let (client, _) = client(tmp.path(), &remote, settings(""));
    let repo = repo_with_commit(tmp.path(), "x");
    let before = fs::read(repo.location().db_path()).unwrap();

    assert!(client.pull(repo.location()).is_err());
    assert_eq!(fs::read(repo.location().db_path()).unwrap(), before);
}

#[test]
fn test_missing_credentials_fail_fast() {
    let tmp = TempDir::new().unwrap();
    let remote = FakeRemote::default();
    let no_user = Settings::parse("REPOS=http://omi.test/repos\n").unwrap();
    let (client, _) = client(tmp.path(), &remote, no_user);
    let repo = repo_with_commit(tmp.path(), "x");

    assert!(matches!(client.push(repo.location()), Err(OmiError::ConfigMissing(k)) if k == "USERNAME"));
    assert_eq!(remote.requests(), 0);
}

#[test]
fn test_list_and_clone_remote() {
    let origin = TempDir::new().unwrap();
    let remote = FakeRemote::default();
    let (client, _) = client(origin.path(), &remote, settings(""));
    let repo = repo_with_commit(origin.path(), "shared");
    client.push(repo.location()).unwrap();

    assert_eq!(client.list().unwrap(), vec!["repo.omi".to_string()]);

    let dest = TempDir::new().unwrap();
    let location = client.clone_remote(dest.path(), "http://omi.test/repos/repo.omi").unwrap();
    assert_eq!(location.db_name(), "repo.omi");
    let cloned = Repository::open(dest.path()).unwrap();
    assert_eq!(cloned.log(1).unwrap()[0].message, "work");
}

#[test]
fn test_clone_unknown_repository() {
    let dest = TempDir::new().unwrap();
    let remote = FakeRemote::default();
    let (client, _) = client(dest.path(), &remote, settings(""));

    match client.clone_remote(dest.path(), "ghost.omi") {
        Err(OmiError::RemoteRejected { status, reason }) => {
            assert_eq!(status, 404);
            assert!(reason.contains("not found"), "got {}", reason);
        }
        other => panic!("expected 404, got {:?}", other),
    }
    assert!(!dest.path().join("ghost.omi").exists());
    assert!(!dest.path().join(".omi").exists());
}

#[test]
fn test_pull_of_non_store_body_keeps_local_file() {
    let tmp = TempDir::new().unwrap();
    let remote = FakeRemote::default();
    remote.state.borrow_mut().repos.insert("repo.omi".into(), b"<html>maintenance</html>".to_vec());
    let (client, _) = client(tmp.path(), &remote, settings(""));
    let repo = repo_with_commit(tmp.path(), "x");
    let before = fs::read(repo.location().db_path()).unwrap();

    assert!(matches!(client.pull(repo.location()), Err(OmiError::StorageCorrupt(_))));
    assert_eq!(fs::read(repo.location().db_path()).unwrap(), before);
}

#[test]
fn test_failed_clone_leaves_existing_repository() {
    let tmp = TempDir::new().unwrap();
    let remote = FakeRemote::default();
    {
        let mut state = remote.state.borrow_mut();
        state.repos.insert("repo.omi".into(), b"not a store".to_vec());
        state.repos.insert("junk.omi".into(), b"not a store either".to_vec());
    }
    let (client, _) = client(tmp.path(), &remote, settings(""));
    drop(repo_with_commit(tmp.path(), "keep me"));
    let store_before = fs::read(tmp.path().join("repo.omi")).unwrap();
    let pointer_before = fs::read(tmp.path().join(".omi")).unwrap();

    for source in ["repo.omi", "http://omi.test/repos/junk.omi"] {
        let err = client.clone_remote(tmp.path(), source).unwrap_err();
        assert!(matches!(err, OmiError::StorageCorrupt(_)), "got {:?}", err);
    }

    assert_eq!(fs::read(tmp.path().join("repo.omi")).unwrap(), store_before);
    assert_eq!(fs::read(tmp.path().join(".omi")).unwrap(), pointer_before);
    assert!(!tmp.path().join("junk.omi").exists());
    let repo = Repository::open(tmp.path()).unwrap();
    assert_eq!(repo.log(1).unwrap()[0].message, "work");
}
