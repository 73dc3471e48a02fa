use crate::commands::{run_checked, stdout_of, succeeds, write_root_file};
use crate::context::InstallContext;
use crate::host::{Cmd, Host};
use crate::phase::{ensure, Applied, Phase};
use async_trait::async_trait;
use clawstrap_core::config::SSHD_DROPIN;
use clawstrap_core::{Advisory, AppError};
use std::path::Path;

pub const SSHD_HARDENING: &str = "\
# Managed by clawstrap
PasswordAuthentication no
KbdInteractiveAuthentication no
PermitRootLogin prohibit-password
PubkeyAuthentication yes
";

const ROOT_KEYS: &str = "/root/.ssh/authorized_keys";

/// Whether an `authorized_keys` body holds at least one usable key.
pub fn has_public_key(authorized_keys: &str) -> bool {
    authorized_keys
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .any(|l| {
            l.split_whitespace().any(|word| {
                word.starts_with("ssh-") || word.starts_with("ecdsa-sha2-") || word.starts_with("sk-")
            })
        })
}

/// What sshd will actually enforce, after every drop-in is merged.
async fn password_login_disabled(host: &dyn Host) -> bool {
    stdout_of(host, &Cmd::new("sshd").arg("-T").root())
        .await
        .unwrap_or_default()
        .to_lowercase()
        .lines()
        .any(|l| l.trim() == "passwordauthentication no")
}

async fn key_login_possible(host: &dyn Host, ctx: &InstallContext) -> bool {
    let own = host
        .read_to_string(&ctx.paths.authorized_keys())
        .map(|text| has_public_key(&text))
        .unwrap_or(false);
    own || succeeds(
        host,
        &Cmd::new("grep")
            .args(["-qE", "^[^#]*(ssh-|ecdsa-sha2-|sk-)", ROOT_KEYS])
            .root(),
    )
    .await
}

/// Key-only SSH. Refuses to lock out the operator: without an installed
/// public key nothing is written.
pub struct SshHardening;

#[async_trait]
impl Phase for SshHardening {
    fn name(&self) -> &'static str {
        "ssh-hardening"
    }

    fn title(&self) -> &'static str {
        "Hardening SSH"
    }

    fn enabled(&self, ctx: &InstallContext) -> bool {
        ctx.hardened
    }

    async fn probe(&self, host: &dyn Host, _ctx: &InstallContext) -> Result<bool, AppError> {
        let written = host
            .read_to_string(Path::new(SSHD_DROPIN))
            .is_ok_and(|text| text == SSHD_HARDENING);
        Ok(written && password_login_disabled(host).await)
    }

    async fn apply(&self, host: &dyn Host, ctx: &InstallContext) -> Result<Applied, AppError> {
        if !key_login_possible(host, ctx).await {
            return Ok(Applied::Skipped(
                Advisory::new("SSH password login left enabled: no authorized public key found")
                    .with_command(format!(
                        "ssh-copy-id {}@<this-host>   # from your workstation",
                        ctx.user
                    ))
                    .with_command("clawstrap install --hardened"),
            ));
        }

        write_root_file(host, SSHD_DROPIN, SSHD_HARDENING, "644").await?;
        let check = host.run(&Cmd::new("sshd").arg("-t").root()).await?;
        if !check.success() {
            let _ = host
                .run(&Cmd::new("rm").args(["-f", SSHD_DROPIN]).root())
                .await;
            return Err(AppError::Provision {
                phase: self.name().to_string(),
                message: format!("sshd rejected the configuration: {}", check.stderr.trim()),
            });
        }

        // Ubuntu names the unit `ssh`; other layouts use `sshd`.
        if !succeeds(host, &Cmd::new("systemctl").args(["reload", "ssh"]).root()).await {
            run_checked(host, &Cmd::new("systemctl").args(["reload", "sshd"]).root()).await?;
        }
        Ok(Applied::Done)
    }

    async fn verify(&self, host: &dyn Host, _ctx: &InstallContext) -> Result<(), AppError> {
        ensure(
            password_login_disabled(host).await,
            self.name(),
            "PasswordAuthentication no in effective sshd config",
        )
    }
}
