use anyhow::{bail, Context, Result};
use clawstrap_core::config::AccountPaths;
use clawstrap_core::Logger;

/// Delete the installation record so the next install re-runs onboarding.
pub fn run(yes: bool, log: &Logger) -> Result<i32> {
    let record = AccountPaths::current()?.record();
    if !record.exists() {
        log.info(&format!("Nothing to reset: {} does not exist", record.display()));
        return Ok(0);
    }

    if !yes {
        if !console::user_attended() {
            bail!("refusing to delete {} without --yes in an unattended session", record.display());
        }
        let prompt = format!(
            "Delete {}? OpenClaw will need onboarding again",
            record.display()
        );
        if !clawstrap_ui::confirm(&prompt)? {
            log.info("Reset cancelled");
            return Ok(0);
        }
    }

    std::fs::remove_file(&record).with_context(|| format!("removing {}", record.display()))?;
    log.success(&format!("Removed {}", record.display()));
    Ok(0)
}
