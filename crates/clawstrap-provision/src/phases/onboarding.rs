use crate::context::InstallContext;
use crate::host::{Cmd, Host};
use crate::phase::{ensure, Applied, Phase};
use async_trait::async_trait;
use clawstrap_core::{Advisory, AppError};

/// `openclaw onboard` writes the Installation Record. Attended runs hand the
/// terminal to the wizard; unattended runs try the non-interactive path and
/// defer to the operator if it can't finish.
pub struct Onboarding;

#[async_trait]
impl Phase for Onboarding {
    fn name(&self) -> &'static str {
        "onboarding"
    }

    fn title(&self) -> &'static str {
        "Onboarding OpenClaw"
    }

    async fn probe(&self, host: &dyn Host, ctx: &InstallContext) -> Result<bool, AppError> {
        Ok(host.exists(&ctx.paths.record()))
    }

    async fn apply(&self, host: &dyn Host, ctx: &InstallContext) -> Result<Applied, AppError> {
        if ctx.interactive {
            let out = host
                .run(&Cmd::new("openclaw").arg("onboard").interactive())
                .await?;
            if !out.success() {
                return Err(AppError::Provision {
                    phase: self.name().to_string(),
                    message: format!("openclaw onboard exited with status {}", out.status),
                });
            }
            return Ok(Applied::Done);
        }

        let out = host
            .run(&Cmd::new("openclaw").args(["onboard", "--non-interactive", "--accept-risk"]))
            .await?;
        if out.success() && host.exists(&ctx.paths.record()) {
            return Ok(Applied::Done);
        }
        Ok(Applied::Skipped(
            Advisory::new("Onboarding deferred: it needs answers no unattended run can give")
                .with_command("openclaw onboard"),
        ))
    }

    async fn verify(&self, host: &dyn Host, ctx: &InstallContext) -> Result<(), AppError> {
        let record = ctx.paths.record();
        ensure(host.exists(&record), self.name(), record.display().to_string())
    }
}
