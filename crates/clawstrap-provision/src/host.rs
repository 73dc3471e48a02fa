//! Everything the provisioner does to the machine goes through [`Host`].
//!
//! The production [`SystemHost`] spawns real processes; tests substitute an
//! in-memory fake so each phase's probe/apply/verify can run in isolation.

use async_trait::async_trait;
use clawstrap_core::AppError;
use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    /// Run as the invoking (service) account.
    User,
    /// Run as root, through `sudo -n` unless already root.
    Root,
}

/// A command to run on the host.
#[derive(Debug, Clone)]
pub struct Cmd {
    pub program: String,
    pub args: Vec<String>,
    pub privilege: Privilege,
    pub env: Vec<(String, String)>,
    pub stdin: Option<Vec<u8>>,
    /// Inherit the terminal instead of capturing output.
    pub interactive: bool,
}

impl Cmd {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            privilege: Privilege::User,
            env: Vec::new(),
            stdin: None,
            interactive: false,
        }
    }

    /// `bash -c <script>` for pipelines such as `curl … | bash`.
    pub fn bash(script: impl Into<String>) -> Self {
        Self::new("bash").arg("-c").arg(script)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn root(mut self) -> Self {
        self.privilege = Privilege::Root;
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn interactive(mut self) -> Self {
        self.interactive = true;
        self
    }

    /// Human-readable form used in logs and error messages.
    pub fn render(&self) -> String {
        let mut parts = Vec::new();
        if self.privilege == Privilege::Root {
            parts.push("sudo".to_string());
        }
        for (k, v) in &self.env {
            parts.push(format!("{k}={v}"));
        }
        parts.push(self.program.clone());
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CmdOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CmdOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

#[async_trait]
pub trait Host: Send + Sync {
    /// Run a command to completion. `Err` only when it could not be spawned;
    /// a non-zero exit is reported through [`CmdOutput::status`].
    async fn run(&self, cmd: &Cmd) -> Result<CmdOutput, AppError>;

    /// Locate an executable on PATH (plus the provisioner's extra dirs).
    fn which(&self, program: &str) -> Option<PathBuf>;

    fn exists(&self, path: &Path) -> bool;

    fn read_to_string(&self, path: &Path) -> std::io::Result<String>;

    /// Write a file owned by the invoking account and set its mode.
    fn write_file(&self, path: &Path, contents: &str, mode: u32) -> Result<(), AppError>;

    fn set_mode(&self, path: &Path, mode: u32) -> Result<(), AppError>;

    /// Bytes available to unprivileged users on the filesystem holding `path`.
    fn free_space(&self, path: &Path) -> Result<u64, AppError>;

    /// HTTP status of a GET, or `None` if nothing answered within `timeout`.
    async fn http_status(&self, url: &str, timeout: Duration) -> Option<u16>;

    async fn download(&self, url: &str, dest: &Path) -> Result<(), AppError>;

    async fn sleep(&self, duration: Duration);
}

/// The real machine.
pub struct SystemHost {
    extra_path: Vec<PathBuf>,
    /// Applied to every spawned command before its own env.
    base_env: Vec<(String, String)>,
    is_root: bool,
    http: reqwest::Client,
}

impl SystemHost {
    pub fn new(extra_path: Vec<PathBuf>) -> Self {
        Self {
            extra_path,
            base_env: Vec::new(),
            is_root: crate::identity::current_euid() == 0,
            http: reqwest::Client::new(),
        }
    }

    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.base_env = env;
        self
    }

    fn search_path(&self) -> Vec<PathBuf> {
        let mut dirs = self.extra_path.clone();
        if let Some(path) = std::env::var_os("PATH") {
            dirs.extend(std::env::split_paths(&path));
        }
        dirs
    }

    fn path_env(&self) -> String {
        std::env::join_paths(self.search_path())
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Program and argv after privilege escalation.
    fn argv(&self, cmd: &Cmd) -> (String, Vec<String>) {
        if cmd.privilege == Privilege::User || self.is_root {
            return (cmd.program.clone(), cmd.args.clone());
        }
        let mut args = vec!["-n".to_string()];
        if !cmd.env.is_empty() {
            args.push("env".to_string());
            args.extend(cmd.env.iter().map(|(k, v)| format!("{k}={v}")));
        }
        args.push(cmd.program.clone());
        args.extend(cmd.args.iter().cloned());
        ("sudo".to_string(), args)
    }
}

#[async_trait]
impl Host for SystemHost {
    async fn run(&self, cmd: &Cmd) -> Result<CmdOutput, AppError> {
        let (program, args) = self.argv(cmd);
        let mut command = tokio::process::Command::new(&program);
        command
            .args(&args)
            .env("PATH", self.path_env())
            .kill_on_drop(true);
        for (k, v) in self.base_env.iter().chain(&cmd.env) {
            command.env(k, v);
        }

        let spawn_err = |source| AppError::Spawn {
            command: cmd.render(),
            source,
        };

        if cmd.interactive {
            let status = command
                .stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .status()
                .await
                .map_err(spawn_err)?;
            return Ok(CmdOutput {
                status: status.code().unwrap_or(-1),
                ..CmdOutput::default()
            });
        }

        command
            .stdin(if cmd.stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = command.spawn().map_err(spawn_err)?;

        // Feed stdin from a task so a chatty child can't block on a full stdout pipe.
        let writer = match (child.stdin.take(), cmd.stdin.clone()) {
            (Some(mut stdin), Some(input)) => Some(tokio::spawn(async move {
                let _ = stdin.write_all(&input).await;
            })),
            _ => None,
        };

        let output = child.wait_with_output().await?;
        if let Some(writer) = writer {
            let _ = writer.await;
        }

        Ok(CmdOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn which(&self, program: &str) -> Option<PathBuf> {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        which::which_in(program, Some(self.path_env()), cwd).ok()
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_to_string(&self, path: &Path) -> std::io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn write_file(&self, path: &Path, contents: &str, mode: u32) -> Result<(), AppError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        self.set_mode(path, mode)
    }

    fn set_mode(&self, path: &Path, mode: u32) -> Result<(), AppError> {
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
        Ok(())
    }

    fn free_space(&self, path: &Path) -> Result<u64, AppError> {
        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| AppError::Other(format!("invalid path {}: {e}", path.display())))?;
        let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
        let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
        if rc != 0 {
            return Err(std::io::Error::last_os_error().into());
        }
        Ok(stat.f_bavail as u64 * stat.f_frsize as u64)
    }

    async fn http_status(&self, url: &str, timeout: Duration) -> Option<u16> {
        self.http
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .ok()
            .map(|resp| resp.status().as_u16())
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<(), AppError> {
        let resp = self.http.get(url).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(AppError::NotPublished(url.to_string()));
        }
        if !resp.status().is_success() {
            return Err(AppError::Download(format!("{url} returned {}", resp.status())));
        }
        let bytes = resp.bytes().await?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, &bytes).await?;
        Ok(())
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn which_searches_extra_path_first_and_skips_plain_files() {
        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("openclaw");
        std::fs::write(&tool, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();
        std::fs::write(dir.path().join("notes"), "").unwrap();

        let host = SystemHost::new(vec![dir.path().to_path_buf()]);
        assert_eq!(host.which("openclaw"), Some(tool.clone()));
        assert_eq!(host.which("notes"), None);
        assert_eq!(host.which(&tool.display().to_string()), Some(tool));
        assert!(host.which("sh").is_some());
    }

    #[test]
    fn render_marks_root_and_env() {
        let cmd = Cmd::new("apt-get")
            .args(["install", "-y", "jq"])
            .env("DEBIAN_FRONTEND", "noninteractive")
            .root();
        assert_eq!(
            cmd.render(),
            "sudo DEBIAN_FRONTEND=noninteractive apt-get install -y jq"
        );
    }

    #[test]
    fn sudo_argv_carries_env_through_env_binary() {
        let host = SystemHost {
            extra_path: Vec::new(),
            base_env: Vec::new(),
            is_root: false,
            http: reqwest::Client::new(),
        };
        let cmd = Cmd::new("apt-get").arg("update").env("DEBIAN_FRONTEND", "noninteractive").root();
        let (program, args) = host.argv(&cmd);
        assert_eq!(program, "sudo");
        assert_eq!(args, ["-n", "env", "DEBIAN_FRONTEND=noninteractive", "apt-get", "update"]);

        let user_cmd = Cmd::new("npm").arg("--version");
        assert_eq!(host.argv(&user_cmd), ("npm".to_string(), vec!["--version".to_string()]));
    }

    #[tokio::test]
    async fn system_host_captures_output_and_stdin() {
        let host = SystemHost::new(Vec::new());
        let out = host
            .run(&Cmd::new("cat").stdin("hello from stdin"))
            .await
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout, "hello from stdin");

        let failed = host.run(&Cmd::bash("exit 7")).await.unwrap();
        assert_eq!(failed.status, 7);
    }

    #[test]
    fn write_file_sets_owner_only_mode() {
        let dir = tempfile::tempdir().unwrap();
        let host = SystemHost::new(Vec::new());
        let path = dir.path().join("nested/openclaw.json");
        host.write_file(&path, "{}", 0o600).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
        assert!(host.free_space(dir.path()).unwrap() > 0);
    }
}
