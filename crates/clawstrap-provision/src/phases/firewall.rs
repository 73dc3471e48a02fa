use crate::commands::{run_checked, stdout_of};
use crate::context::InstallContext;
use crate::host::{Cmd, Host};
use crate::phase::{ensure, Applied, Phase};
use async_trait::async_trait;
use clawstrap_core::config::TAILSCALE_UDP_PORT;
use clawstrap_core::AppError;

/// The parts of `ufw status` the firewall phases care about.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UfwStatus {
    pub active: bool,
    /// SSH reachable from anywhere.
    pub public_ssh: bool,
    /// SSH allowed only on the tailnet interface.
    pub vpn_ssh: bool,
    pub tailscale_udp: bool,
}

impl UfwStatus {
    pub fn parse(text: &str) -> Self {
        let mut status = Self {
            active: text.lines().any(|l| l.trim() == "Status: active"),
            ..Self::default()
        };
        for line in text.lines() {
            let target = line.split("ALLOW").next().unwrap_or("").trim();
            if target.is_empty() || !line.contains("ALLOW") {
                continue;
            }
            let target = target.trim_end_matches(" (v6)");
            let is_ssh = target.starts_with("OpenSSH")
                || target.starts_with("22/tcp")
                || target == "22"
                || target.starts_with("22 ");
            if is_ssh && target.contains("on tailscale0") {
                status.vpn_ssh = true;
            } else if is_ssh {
                status.public_ssh = true;
            }
            if target.starts_with(&format!("{TAILSCALE_UDP_PORT}/udp")) {
                status.tailscale_udp = true;
            }
        }
        status
    }

    pub fn ssh_allowed(&self) -> bool {
        self.public_ssh || self.vpn_ssh
    }
}

pub async fn ufw_status(host: &dyn Host) -> UfwStatus {
    stdout_of(host, &Cmd::new("ufw").arg("status").root())
        .await
        .map(|out| UfwStatus::parse(&out))
        .unwrap_or_default()
}

fn configured(status: &UfwStatus) -> bool {
    status.active && status.ssh_allowed() && status.tailscale_udp
}

/// Deny inbound by default, keep SSH and the Tailscale port open.
pub struct Firewall;

#[async_trait]
impl Phase for Firewall {
    fn name(&self) -> &'static str {
        "firewall"
    }

    fn title(&self) -> &'static str {
        "Configuring UFW firewall"
    }

    async fn probe(&self, host: &dyn Host, _ctx: &InstallContext) -> Result<bool, AppError> {
        Ok(configured(&ufw_status(host).await))
    }

    async fn apply(&self, host: &dyn Host, _ctx: &InstallContext) -> Result<Applied, AppError> {
        let before = ufw_status(host).await;
        let ufw = |args: &[&str]| Cmd::new("ufw").args(args.iter().copied()).root();

        run_checked(host, &ufw(&["default", "deny", "incoming"])).await?;
        run_checked(host, &ufw(&["default", "allow", "outgoing"])).await?;
        // A tailnet-only rule from an earlier hardened run already covers SSH.
        if !before.ssh_allowed() {
            run_checked(host, &ufw(&["allow", "OpenSSH"])).await?;
        }
        let udp = format!("{TAILSCALE_UDP_PORT}/udp");
        run_checked(host, &ufw(&["allow", udp.as_str(), "comment", "Tailscale"])).await?;
        run_checked(host, &ufw(&["--force", "enable"])).await?;
        Ok(Applied::Done)
    }

    async fn verify(&self, host: &dyn Host, _ctx: &InstallContext) -> Result<(), AppError> {
        let status = ufw_status(host).await;
        ensure(status.active, self.name(), "active ufw")?;
        ensure(status.ssh_allowed(), self.name(), "an SSH allow rule")?;
        ensure(
            status.tailscale_udp,
            self.name(),
            format!("{TAILSCALE_UDP_PORT}/udp allow rule"),
        )
    }
}
