use crate::commands::{apt_install, apt_update, run_checked, stdout_of, succeeds};
use crate::context::InstallContext;
use crate::host::{Cmd, Host};
use crate::phase::{ensure, Applied, Phase};
use async_trait::async_trait;
use clawstrap_core::AppError;

const KEYRING: &str = "/usr/share/keyrings/tailscale-archive-keyring.gpg";
const SOURCE_LIST: &str = "/etc/apt/sources.list.d/tailscale.list";

/// The node's Tailscale IPv4 address, if it has joined a tailnet.
pub async fn connected_ip(host: &dyn Host) -> Option<String> {
    stdout_of(host, &Cmd::new("tailscale").args(["ip", "-4"]))
        .await
        .and_then(|out| out.lines().next().map(str::trim).map(str::to_string))
        .filter(|ip| !ip.is_empty())
}

async fn installed(host: &dyn Host) -> bool {
    host.which("tailscale").is_some()
        && succeeds(host, &Cmd::new("systemctl").args(["is-active", "--quiet", "tailscaled"])).await
}

pub struct Tailscale;

#[async_trait]
impl Phase for Tailscale {
    fn name(&self) -> &'static str {
        "tailscale"
    }

    fn title(&self) -> &'static str {
        "Installing Tailscale VPN"
    }

    async fn probe(&self, host: &dyn Host, _ctx: &InstallContext) -> Result<bool, AppError> {
        Ok(installed(host).await)
    }

    async fn apply(&self, host: &dyn Host, ctx: &InstallContext) -> Result<Applied, AppError> {
        let codename = if ctx.os.codename.is_empty() {
            "noble"
        } else {
            ctx.os.codename.as_str()
        };
        let base = format!("https://pkgs.tailscale.com/stable/ubuntu/{codename}");

        run_checked(
            host,
            &Cmd::new("curl")
                .args(["-fsSL", &format!("{base}.noarmor.gpg"), "-o", KEYRING])
                .root(),
        )
        .await?;
        run_checked(
            host,
            &Cmd::new("curl")
                .args(["-fsSL", &format!("{base}.tailscale-keyring.list"), "-o", SOURCE_LIST])
                .root(),
        )
        .await?;
        run_checked(host, &apt_update()).await?;
        run_checked(host, &apt_install(["tailscale"])).await?;
        run_checked(
            host,
            &Cmd::new("systemctl").args(["enable", "--now", "tailscaled"]).root(),
        )
        .await?;
        Ok(Applied::Done)
    }

    async fn verify(&self, host: &dyn Host, _ctx: &InstallContext) -> Result<(), AppError> {
        ensure(host.which("tailscale").is_some(), self.name(), "tailscale binary")?;
        ensure(installed(host).await, self.name(), "running tailscaled service")
    }
}
