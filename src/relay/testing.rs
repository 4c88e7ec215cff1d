//! In-memory stand-ins for the host, its containers and object storage

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::remote::{CopyOutcome, FileCopier, RemoteExecutor};
use crate::error::{RelayError, Result};
use crate::ssh::{validate_remote_path, CommandOutput};
use crate::storage::{ObjectStore, StoredObject, UploadCredentials, LOCAL_FILE_PLACEHOLDER};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeFile {
    pub data: Vec<u8>,
    /// Octal digits as decimal (`644`)
    pub mode: u32,
}

struct FakeContainer {
    name: String,
    running: bool,
    files: HashMap<String, FakeFile>,
}

#[derive(Default)]
struct HostState {
    files: HashMap<String, FakeFile>,
    containers: BTreeMap<u32, FakeContainer>,
    commands: Vec<String>,
    local_paths: Vec<PathBuf>,
    fail_push: bool,
    fail_exists: bool,
    fail_put: bool,
    fail_get: bool,
}

/// A host that understands the handful of shell commands the relay sends
#[derive(Default)]
pub struct FakeHost {
    state: Mutex<HostState>,
}

fn exit(code: u32, stderr: &str) -> CommandOutput {
    CommandOutput {
        stderr: stderr.to_string(),
        ..CommandOutput::with_exit_code(code)
    }
}

fn printed(stdout: String) -> CommandOutput {
    CommandOutput {
        stdout,
        ..CommandOutput::with_exit_code(0)
    }
}

/// Split a command line the way `sh` would for simple quoted words
fn tokenize(command: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = command.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                for q in chars.by_ref() {
                    if q == '\'' {
                        break;
                    }
                    current.push(q);
                }
            }
            '"' => {
                in_word = true;
                for q in chars.by_ref() {
                    if q == '"' {
                        break;
                    }
                    current.push(q);
                }
            }
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// A running container named `ct<id>`
    pub fn add_container(&self, id: u32) {
        self.add_named_container(id, &format!("ct{}", id), true);
    }

    pub fn add_named_container(&self, id: u32, name: &str, running: bool) {
        self.state.lock().unwrap().containers.insert(
            id,
            FakeContainer {
                name: name.to_string(),
                running,
                files: HashMap::new(),
            },
        );
    }

    pub fn container_running(&self, id: u32) -> Option<bool> {
        self.state.lock().unwrap().containers.get(&id).map(|c| c.running)
    }

    pub fn add_host_file(&self, path: &str, data: &[u8], mode: u32) {
        self.state.lock().unwrap().files.insert(
            path.to_string(),
            FakeFile {
                data: data.to_vec(),
                mode,
            },
        );
    }

    pub fn add_container_file(&self, id: u32, path: &str, data: &[u8], mode: u32) {
        let mut state = self.state.lock().unwrap();
        let container = state.containers.entry(id).or_insert_with(|| FakeContainer {
            name: format!("ct{}", id),
            running: true,
            files: HashMap::new(),
        });
        container.files.insert(
            path.to_string(),
            FakeFile {
                data: data.to_vec(),
                mode,
            },
        );
    }

    pub fn host_file(&self, path: &str) -> Option<FakeFile> {
        self.state.lock().unwrap().files.get(path).cloned()
    }

    pub fn host_has(&self, path: &str) -> bool {
        self.host_file(path).is_some()
    }

    pub fn container_file(&self, id: u32, path: &str) -> Option<FakeFile> {
        let state = self.state.lock().unwrap();
        state.containers.get(&id)?.files.get(path).cloned()
    }

    /// Every command passed to `execute`, in order
    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }

    /// Every relay-local path handed to `put` or `get`
    pub fn local_paths(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().local_paths.clone()
    }

    pub fn set_fail_push(&self, fail: bool) {
        self.state.lock().unwrap().fail_push = fail;
    }

    /// Make `test -f` checks error out instead of answering
    pub fn set_fail_exists(&self, fail: bool) {
        self.state.lock().unwrap().fail_exists = fail;
    }

    pub fn set_fail_put(&self, fail: bool) {
        self.state.lock().unwrap().fail_put = fail;
    }

    pub fn set_fail_get(&self, fail: bool) {
        self.state.lock().unwrap().fail_get = fail;
    }

    fn run(state: &mut HostState, words: &[&str]) -> Result<CommandOutput> {
        match words {
            ["test", "-f", path] => {
                if state.fail_exists {
                    return Err(RelayError::Timeout(10_000));
                }
                Ok(exit(u32::from(!state.files.contains_key(*path)), ""))
            }
            ["rm", "-f", path] => {
                state.files.remove(*path);
                Ok(exit(0, ""))
            }
            ["pct", "list"] => {
                let mut table = "VMID       Status     Lock         Name\n".to_string();
                for (id, container) in &state.containers {
                    let status = if container.running { "running" } else { "stopped" };
                    table.push_str(&format!(
                        "{:<10} {:<10} {:<12} {}\n",
                        id, status, "", container.name
                    ));
                }
                Ok(printed(table))
            }
            ["pct", verb, id, rest @ ..] => {
                let Ok(id) = id.parse::<u32>() else {
                    return Ok(exit(255, "invalid vmid"));
                };
                if !state.containers.contains_key(&id) {
                    let message = format!("Configuration file 'nodes/pve/lxc/{}.conf' does not exist", id);
                    return Ok(exit(2, &message));
                }
                Self::run_pct(state, verb, id, rest)
            }
            _ => Ok(exit(127, "command not found")),
        }
    }

    fn run_pct(state: &mut HostState, verb: &str, id: u32, rest: &[&str]) -> Result<CommandOutput> {
        let fail_exists = state.fail_exists;
        let fail_push = state.fail_push;
        let Some(container) = state.containers.get_mut(&id) else {
            return Ok(exit(2, "no such container"));
        };

        match (verb, rest) {
            ("status", []) => {
                let status = if container.running { "running" } else { "stopped" };
                Ok(printed(format!("status: {}\n", status)))
            }
            ("start", []) => {
                if container.running {
                    return Ok(exit(255, &format!("CT {} already running", id)));
                }
                container.running = true;
                Ok(exit(0, ""))
            }
            ("stop", []) => {
                if !container.running {
                    return Ok(exit(255, &format!("CT {} not running", id)));
                }
                container.running = false;
                Ok(exit(0, ""))
            }
            ("exec", ["--", "bash", "-c", script]) => {
                if !container.running {
                    return Ok(exit(255, &format!("CT {} not running", id)));
                }
                match script.strip_prefix("exit ") {
                    Some(code) => Ok(exit(code.trim().parse().unwrap_or(1), "")),
                    None => Ok(printed(format!("{}\n", script))),
                }
            }
            ("exec", ["--", "test", "-f", path]) => {
                if fail_exists {
                    return Err(RelayError::Timeout(10_000));
                }
                Ok(exit(u32::from(!container.files.contains_key(*path)), ""))
            }
            ("exec", ["--", "chmod", mode, path]) => {
                let mode = mode.parse::<u32>().unwrap_or(0);
                match container.files.get_mut(*path) {
                    Some(file) => {
                        file.mode = mode;
                        Ok(exit(0, ""))
                    }
                    None => Ok(exit(1, "chmod: No such file or directory")),
                }
            }
            ("push", [src, dst]) => {
                if fail_push {
                    return Ok(exit(1, "failed to push file"));
                }
                let Some(file) = state.files.get(*src).cloned() else {
                    return Ok(exit(1, "source file not found"));
                };
                let mode = container.files.get(*dst).map_or(644, |f| f.mode);
                container.files.insert(
                    dst.to_string(),
                    FakeFile {
                        data: file.data,
                        mode,
                    },
                );
                Ok(exit(0, ""))
            }
            ("pull", [src, dst]) => {
                let pulled = container.files.get(*src).cloned();
                match pulled {
                    Some(file) => {
                        state.files.insert(dst.to_string(), file);
                        Ok(exit(0, ""))
                    }
                    None => Ok(exit(1, "file not found in container")),
                }
            }
            _ => Ok(exit(127, "unsupported pct invocation")),
        }
    }
}

#[async_trait]
impl RemoteExecutor for FakeHost {
    async fn execute(&self, command: &str, _timeout: Duration) -> Result<CommandOutput> {
        let mut state = self.state.lock().unwrap();
        state.commands.push(command.to_string());
        let words = tokenize(command);
        let words: Vec<&str> = words.iter().map(String::as_str).collect();
        Self::run(&mut state, &words)
    }
}

#[async_trait]
impl FileCopier for FakeHost {
    async fn put(
        &self,
        local_path: &Path,
        remote_path: &str,
        permissions: Option<u32>,
        overwrite: bool,
    ) -> Result<CopyOutcome> {
        {
            let mut state = self.state.lock().unwrap();
            state.local_paths.push(local_path.to_path_buf());
            if state.fail_put {
                return Err(RelayError::sftp(format!(
                    "Failed to create {}: permission denied",
                    remote_path
                )));
            }
        }
        validate_remote_path(remote_path)?;
        let data = std::fs::read(local_path)?;
        let mut state = self.state.lock().unwrap();
        if state.files.contains_key(remote_path) && !overwrite {
            return Err(RelayError::sftp(format!(
                "Remote file already exists: {}",
                remote_path
            )));
        }
        let bytes = data.len() as u64;
        state.files.insert(
            remote_path.to_string(),
            FakeFile {
                data,
                mode: permissions.unwrap_or(644),
            },
        );
        Ok(CopyOutcome {
            bytes,
            message: format!("Copied to {}", remote_path),
        })
    }

    async fn get(
        &self,
        remote_path: &str,
        local_path: &Path,
        overwrite: bool,
    ) -> Result<CopyOutcome> {
        let file = {
            let mut state = self.state.lock().unwrap();
            state.local_paths.push(local_path.to_path_buf());
            if state.fail_get {
                return Err(RelayError::sftp("Connection lost during download"));
            }
            validate_remote_path(remote_path)?;
            if local_path.exists() && !overwrite {
                return Err(RelayError::invalid_params("Local file already exists"));
            }
            state
                .files
                .get(remote_path)
                .cloned()
                .ok_or_else(|| RelayError::sftp(format!("No such file: {}", remote_path)))?
        };
        if let Some(parent) = local_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(local_path, &file.data)?;
        Ok(CopyOutcome {
            bytes: file.data.len() as u64,
            message: format!("Copied from {}", remote_path),
        })
    }
}

#[derive(Default)]
struct StoreState {
    /// id -> (name, bytes)
    objects: HashMap<String, (String, Vec<u8>)>,
    deleted: Vec<String>,
    local_paths: Vec<PathBuf>,
    next_id: u32,
    fail_download: bool,
    fail_upload: bool,
    fail_credentials: bool,
}

/// Object storage kept in a map
#[derive(Default)]
pub struct FakeStore {
    state: Mutex<StoreState>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(state: &mut StoreState, name: &str, data: Vec<u8>) -> String {
        state.next_id += 1;
        let id = format!("obj-{}", state.next_id);
        state.objects.insert(id.clone(), (name.to_string(), data));
        id
    }

    /// Simulate a client upload, returning the object id
    pub fn put_object(&self, name: &str, data: &[u8]) -> String {
        Self::insert(&mut self.state.lock().unwrap(), name, data.to_vec())
    }

    /// (id, bytes) of the object with this name
    pub fn object_by_name(&self, name: &str) -> Option<(String, Vec<u8>)> {
        let state = self.state.lock().unwrap();
        state
            .objects
            .iter()
            .find(|(_, (n, _))| n == name)
            .map(|(id, (_, data))| (id.clone(), data.clone()))
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().unwrap().objects.is_empty()
    }

    /// Every relay-local path handed to `download_to` or `upload_from`
    pub fn local_paths(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().local_paths.clone()
    }

    pub fn set_fail_download(&self, fail: bool) {
        self.state.lock().unwrap().fail_download = fail;
    }

    pub fn set_fail_upload(&self, fail: bool) {
        self.state.lock().unwrap().fail_upload = fail;
    }

    /// Make credential issuing (and so the client upload command) fail
    pub fn set_fail_credentials(&self, fail: bool) {
        self.state.lock().unwrap().fail_credentials = fail;
    }

    fn url(name: &str) -> String {
        format!("https://files.example/{}", name)
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn issue_upload_credentials(&self, object_name: &str) -> Result<UploadCredentials> {
        if self.state.lock().unwrap().fail_credentials {
            return Err(RelayError::storage("Invalid signing key"));
        }
        Ok(UploadCredentials {
            token: "token".to_string(),
            expire: 1_700_000_000,
            signature: "signature".to_string(),
            public_key: "public".to_string(),
            object_name: object_name.to_string(),
        })
    }

    async fn build_client_upload_command(&self, object_name: &str) -> Result<String> {
        let credentials = self.issue_upload_credentials(object_name).await?;
        Ok(format!(
            "curl -F 'file=@{}' -F 'fileName={}' -F 'token={}' https://upload.example/",
            LOCAL_FILE_PLACEHOLDER, credentials.object_name, credentials.token
        ))
    }

    async fn fetch_object_url(&self, object_id: &str) -> Result<String> {
        let state = self.state.lock().unwrap();
        state
            .objects
            .get(object_id)
            .map(|(name, _)| Self::url(name))
            .ok_or_else(|| RelayError::storage(format!("File details failed (404): {}", object_id)))
    }

    async fn download_to(&self, object_id: &str, local_path: &Path) -> Result<u64> {
        let data = {
            let mut state = self.state.lock().unwrap();
            state.local_paths.push(local_path.to_path_buf());
            if state.fail_download {
                return Err(RelayError::storage("Download failed (503): unavailable"));
            }
            state
                .objects
                .get(object_id)
                .map(|(_, data)| data.clone())
                .ok_or_else(|| RelayError::storage(format!("Download failed (404): {}", object_id)))?
        };
        std::fs::write(local_path, &data)?;
        Ok(data.len() as u64)
    }

    async fn upload_from(&self, local_path: &Path, object_name: &str) -> Result<StoredObject> {
        {
            let mut state = self.state.lock().unwrap();
            state.local_paths.push(local_path.to_path_buf());
            if state.fail_upload {
                return Err(RelayError::storage("Upload failed (500): internal error"));
            }
        }
        let data = std::fs::read(local_path)?;
        let object_id = Self::insert(&mut self.state.lock().unwrap(), object_name, data);
        Ok(StoredObject {
            object_id,
            url: Self::url(object_name),
            name: object_name.to_string(),
        })
    }

    async fn find_by_name(&self, object_name: &str) -> Option<StoredObject> {
        self.object_by_name(object_name).map(|(object_id, _)| StoredObject {
            object_id,
            url: Self::url(object_name),
            name: object_name.to_string(),
        })
    }

    async fn delete(&self, object_id: &str) -> bool {
        let mut state = self.state.lock().unwrap();
        let existed = state.objects.remove(object_id).is_some();
        if existed {
            state.deleted.push(object_id.to_string());
        }
        existed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_handles_shell_quoting() {
        assert_eq!(
            tokenize("pct push 101 '/tmp/a b' '/it'\"'\"'s'"),
            vec!["pct", "push", "101", "/tmp/a b", "/it's"]
        );
        assert_eq!(tokenize("  rm -f   x "), vec!["rm", "-f", "x"]);
        assert_eq!(tokenize("test -f ''"), vec!["test", "-f", ""]);
    }

    #[tokio::test]
    async fn test_pct_power_commands() {
        let host = FakeHost::new();
        host.add_named_container(101, "web", false);

        let output = host.execute("pct start 101", Duration::from_secs(1)).await.unwrap();
        assert!(output.success());
        assert_eq!(host.container_running(101), Some(true));

        let output = host.execute("pct start 101", Duration::from_secs(1)).await.unwrap();
        assert_eq!(output.failure_detail(), "CT 101 already running");
    }
}
