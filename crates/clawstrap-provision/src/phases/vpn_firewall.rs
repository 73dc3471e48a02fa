use super::firewall::ufw_status;
use super::tailscale::connected_ip;
use crate::commands::run_checked;
use crate::context::InstallContext;
use crate::host::{Cmd, Host};
use crate::phase::{ensure, Applied, Phase};
use async_trait::async_trait;
use clawstrap_core::{Advisory, AppError};

/// SSH only over the tailnet. Needs a connected Tailscale node first,
/// otherwise the public rule stays.
pub struct VpnOnlySsh;

#[async_trait]
impl Phase for VpnOnlySsh {
    fn name(&self) -> &'static str {
        "vpn-only-ssh"
    }

    fn title(&self) -> &'static str {
        "Restricting SSH to Tailscale"
    }

    fn enabled(&self, ctx: &InstallContext) -> bool {
        ctx.hardened
    }

    async fn probe(&self, host: &dyn Host, _ctx: &InstallContext) -> Result<bool, AppError> {
        let status = ufw_status(host).await;
        Ok(status.active && status.vpn_ssh && !status.public_ssh)
    }

    async fn apply(&self, host: &dyn Host, _ctx: &InstallContext) -> Result<Applied, AppError> {
        if connected_ip(host).await.is_none() {
            return Ok(Applied::Skipped(
                Advisory::new("SSH still open to the internet: Tailscale is not connected")
                    .with_command("sudo tailscale up")
                    .with_command("clawstrap install --hardened"),
            ));
        }

        run_checked(
            host,
            &Cmd::new("ufw")
                .args(["allow", "in", "on", "tailscale0", "to", "any", "port", "22", "proto", "tcp"])
                .root(),
        )
        .await?;
        // Either form may be absent.
        for rule in ["OpenSSH", "22/tcp", "22"] {
            let _ = host
                .run(&Cmd::new("ufw").args(["delete", "allow", rule]).root())
                .await;
        }
        run_checked(host, &Cmd::new("ufw").arg("reload").root()).await?;
        Ok(Applied::Done)
    }

    async fn verify(&self, host: &dyn Host, _ctx: &InstallContext) -> Result<(), AppError> {
        let status = ufw_status(host).await;
        ensure(status.vpn_ssh, self.name(), "SSH allow rule on tailscale0")?;
        ensure(!status.public_ssh, self.name(), "removal of the public SSH rule")
    }
}
