use crate::host::{Cmd, Host};
use clawstrap_core::AppError;
use std::path::Path;

/// Run a command and fail unless it exits 0. Returns stdout.
pub async fn run_checked(host: &dyn Host, cmd: &Cmd) -> Result<String, AppError> {
    let out = host.run(cmd).await?;
    if !out.success() {
        return Err(AppError::Command {
            command: cmd.render(),
            status: out.status,
            stderr: out.stderr.trim().to_string(),
        });
    }
    Ok(out.stdout)
}

/// Probe helper: did the command run and exit 0? Spawn failures count as "no".
pub async fn succeeds(host: &dyn Host, cmd: &Cmd) -> bool {
    matches!(host.run(cmd).await, Ok(out) if out.success())
}

/// Stdout of a successful command, trimmed; `None` on any failure.
pub async fn stdout_of(host: &dyn Host, cmd: &Cmd) -> Option<String> {
    match host.run(cmd).await {
        Ok(out) if out.success() => Some(out.stdout.trim().to_string()),
        _ => None,
    }
}

/// Write a root-owned file through `sudo tee` and set its mode.
pub async fn write_root_file(
    host: &dyn Host,
    path: &str,
    contents: &str,
    mode: &str,
) -> Result<(), AppError> {
    if let Some(parent) = Path::new(path).parent() {
        run_checked(
            host,
            &Cmd::new("mkdir").arg("-p").arg(parent.display().to_string()).root(),
        )
        .await?;
    }
    run_checked(
        host,
        &Cmd::new("tee").arg(path).stdin(contents.as_bytes().to_vec()).root(),
    )
    .await?;
    run_checked(host, &Cmd::new("chmod").args([mode, path]).root()).await?;
    Ok(())
}

/// `apt-get install -y <packages>` with a non-interactive frontend.
pub fn apt_install<I, S>(packages: I) -> Cmd
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Cmd::new("apt-get")
        .args(["install", "-y", "-q"])
        .args(packages)
        .env("DEBIAN_FRONTEND", "noninteractive")
        .root()
}

pub fn apt_update() -> Cmd {
    Cmd::new("apt-get")
        .args(["update", "-q"])
        .env("DEBIAN_FRONTEND", "noninteractive")
        .root()
}

/// `systemctl --user <args>` for the service account's own manager.
pub fn systemctl_user<I, S>(args: I) -> Cmd
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Cmd::new("systemctl").arg("--user").args(args)
}

/// Shell-escape a string for use in `su -c '...'`.
pub fn shell_escape(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}
