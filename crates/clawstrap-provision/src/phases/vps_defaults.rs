use crate::context::InstallContext;
use crate::host::Host;
use crate::phase::{ensure, Applied, Phase};
use async_trait::async_trait;
use clawstrap_core::record::{has_browser_defaults, patch_document};
use clawstrap_core::{Advisory, AppError};

const RECORD_MODE: u32 = 0o600;
const RECORD_DIR_MODE: u32 = 0o700;

/// Headless browser settings for a machine with no display.
pub struct VpsDefaults;

#[async_trait]
impl Phase for VpsDefaults {
    fn name(&self) -> &'static str {
        "vps-defaults"
    }

    fn title(&self) -> &'static str {
        "Applying headless VPS defaults"
    }

    async fn probe(&self, host: &dyn Host, ctx: &InstallContext) -> Result<bool, AppError> {
        match host.read_to_string(&ctx.paths.record()) {
            Ok(text) => has_browser_defaults(&text),
            Err(_) => Ok(false),
        }
    }

    async fn apply(&self, host: &dyn Host, ctx: &InstallContext) -> Result<Applied, AppError> {
        let record = ctx.paths.record();
        let Ok(text) = host.read_to_string(&record) else {
            return Ok(Applied::Skipped(
                Advisory::new("Browser defaults not applied: onboarding has not written its config yet")
                    .with_command("openclaw onboard")
                    .with_command("clawstrap install"),
            ));
        };

        if let Some(patched) = patch_document(&text)? {
            host.write_file(&record, &patched, RECORD_MODE)?;
        }
        host.set_mode(&record, RECORD_MODE)?;
        host.set_mode(&ctx.paths.openclaw_dir(), RECORD_DIR_MODE)?;
        Ok(Applied::Done)
    }

    async fn verify(&self, host: &dyn Host, ctx: &InstallContext) -> Result<(), AppError> {
        let text = host.read_to_string(&ctx.paths.record())?;
        ensure(
            has_browser_defaults(&text)?,
            self.name(),
            "browser.headless and default profile in openclaw.json",
        )
    }
}
