use crate::commands::{run_checked, succeeds, systemctl_user};
use crate::context::InstallContext;
use crate::host::{Cmd, Host};
use crate::phase::{ensure, Applied, Phase};
use async_trait::async_trait;
use clawstrap_core::config::GATEWAY_UNIT;
use clawstrap_core::AppError;

pub async fn unit_enabled(host: &dyn Host) -> bool {
    succeeds(host, &systemctl_user(["is-enabled", "--quiet", GATEWAY_UNIT])).await
}

pub async fn unit_active(host: &dyn Host) -> bool {
    succeeds(host, &systemctl_user(["is-active", "--quiet", GATEWAY_UNIT])).await
}

/// Registers the gateway with the account's user-level systemd manager.
/// Starting it is left to the post-sequence step so a restart can follow
/// an upgrade.
pub struct GatewayService;

#[async_trait]
impl Phase for GatewayService {
    fn name(&self) -> &'static str {
        "gateway-service"
    }

    fn title(&self) -> &'static str {
        "Registering gateway service"
    }

    async fn probe(&self, host: &dyn Host, ctx: &InstallContext) -> Result<bool, AppError> {
        Ok(host.exists(&ctx.paths.user_unit()) && unit_enabled(host).await)
    }

    async fn apply(&self, host: &dyn Host, _ctx: &InstallContext) -> Result<Applied, AppError> {
        run_checked(host, &Cmd::new("openclaw").args(["gateway", "install"])).await?;
        run_checked(host, &systemctl_user(["daemon-reload"])).await?;
        run_checked(host, &systemctl_user(["enable", GATEWAY_UNIT])).await?;
        Ok(Applied::Done)
    }

    async fn verify(&self, host: &dyn Host, ctx: &InstallContext) -> Result<(), AppError> {
        let unit = ctx.paths.user_unit();
        ensure(host.exists(&unit), self.name(), unit.display().to_string())?;
        ensure(
            unit_enabled(host).await,
            self.name(),
            format!("{GATEWAY_UNIT} enabled"),
        )
    }
}
