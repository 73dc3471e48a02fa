use crate::commands::{run_checked, succeeds, write_root_file};
use crate::context::InstallContext;
use crate::host::{Cmd, Host};
use crate::phase::{ensure, Applied, Phase};
use async_trait::async_trait;
use clawstrap_core::config::FAIL2BAN_JAIL;
use clawstrap_core::AppError;
use std::path::Path;

pub const JAIL_LOCAL: &str = "\
# OpenClaw security hardening - SSH protection
[DEFAULT]
bantime = 3600
findtime = 600
maxretry = 5
backend = systemd

[sshd]
enabled = true
port = ssh
filter = sshd
";

async fn active(host: &dyn Host) -> bool {
    succeeds(host, &Cmd::new("systemctl").args(["is-active", "--quiet", "fail2ban"])).await
}

pub struct Fail2ban;

#[async_trait]
impl Phase for Fail2ban {
    fn name(&self) -> &'static str {
        "fail2ban"
    }

    fn title(&self) -> &'static str {
        "Configuring fail2ban"
    }

    async fn probe(&self, host: &dyn Host, _ctx: &InstallContext) -> Result<bool, AppError> {
        let jail = host.read_to_string(Path::new(FAIL2BAN_JAIL)).unwrap_or_default();
        Ok(jail == JAIL_LOCAL && active(host).await)
    }

    async fn apply(&self, host: &dyn Host, _ctx: &InstallContext) -> Result<Applied, AppError> {
        write_root_file(host, FAIL2BAN_JAIL, JAIL_LOCAL, "644").await?;
        run_checked(host, &Cmd::new("systemctl").args(["enable", "fail2ban"]).root()).await?;
        run_checked(host, &Cmd::new("systemctl").args(["restart", "fail2ban"]).root()).await?;
        Ok(Applied::Done)
    }

    async fn verify(&self, host: &dyn Host, _ctx: &InstallContext) -> Result<(), AppError> {
        ensure(active(host).await, self.name(), "running fail2ban service")
    }
}
