use crate::commands::{run_checked, stdout_of};
use crate::context::InstallContext;
use crate::host::{Cmd, Host};
use crate::phase::{ensure, Applied, Phase};
use async_trait::async_trait;
use clawstrap_core::config::update_cron_line;
use clawstrap_core::AppError;

async fn current_crontab(host: &dyn Host) -> String {
    // `crontab -l` exits 1 when the account has no crontab yet.
    stdout_of(host, &Cmd::new("crontab").arg("-l"))
        .await
        .unwrap_or_default()
}

fn has_entry(crontab: &str, ctx: &InstallContext) -> bool {
    let installer = ctx.paths.installer_bin().display().to_string();
    crontab
        .lines()
        .filter(|l| !l.trim_start().starts_with('#'))
        .any(|l| l.contains(&installer) && l.contains(" update"))
}

/// Daily unattended `clawstrap update` in the service account's crontab.
pub struct UpdateSchedule;

#[async_trait]
impl Phase for UpdateSchedule {
    fn name(&self) -> &'static str {
        "update-schedule"
    }

    fn title(&self) -> &'static str {
        "Scheduling automatic updates"
    }

    async fn probe(&self, host: &dyn Host, ctx: &InstallContext) -> Result<bool, AppError> {
        Ok(has_entry(&current_crontab(host).await, ctx))
    }

    async fn apply(&self, host: &dyn Host, ctx: &InstallContext) -> Result<Applied, AppError> {
        let mut crontab = current_crontab(host).await;
        if !crontab.is_empty() && !crontab.ends_with('\n') {
            crontab.push('\n');
        }
        crontab.push_str(&update_cron_line(&ctx.paths.installer_bin()));
        crontab.push('\n');
        run_checked(host, &Cmd::new("crontab").arg("-").stdin(crontab)).await?;
        Ok(Applied::Done)
    }

    async fn verify(&self, host: &dyn Host, ctx: &InstallContext) -> Result<(), AppError> {
        ensure(
            has_entry(&current_crontab(host).await, ctx),
            self.name(),
            "crontab entry for `clawstrap update`",
        )?;
        let installer = ctx.paths.installer_bin();
        ensure(
            host.exists(&installer),
            self.name(),
            format!("{} for the scheduled update", installer.display()),
        )
    }
}
