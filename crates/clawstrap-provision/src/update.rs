//! Unattended `clawstrap update`: bump the OpenClaw CLI to the latest
//! published version and bounce the gateway. Runs from cron under the lock.

use crate::commands::{run_checked, stdout_of, succeeds, systemctl_user};
use crate::health::{self, HealthPolicy, HealthReport};
use crate::host::{Cmd, Host};
use crate::lock::{self, Acquire};
use crate::phases::openclaw::installed_version;
use clawstrap_core::config::{AccountPaths, GATEWAY_UNIT, LOCK_TIMEOUT, OPENCLAW_PACKAGE};
use clawstrap_core::{AppError, Logger};

#[derive(Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Another update holds the lock; nothing was done.
    Locked { holder: Option<u32> },
    /// Already on the latest version; the gateway was left alone.
    Current { version: String },
    Updated {
        from: String,
        to: String,
        health: HealthReport,
    },
}

fn npm(paths: &AccountPaths) -> Cmd {
    Cmd::new("npm").env("NPM_CONFIG_PREFIX", paths.npm_prefix().display().to_string())
}

pub async fn run(
    host: &dyn Host,
    paths: &AccountPaths,
    policy: &HealthPolicy,
    log: &Logger,
) -> Result<UpdateOutcome, AppError> {
    let _guard = match lock::acquire(&paths.update_lock(), LOCK_TIMEOUT)? {
        Acquire::Acquired(guard) => guard,
        Acquire::Held { pid } => {
            let who = pid.map_or("another process".to_string(), |p| format!("pid {p}"));
            log.info(&format!("Update already running ({who}); nothing to do"));
            return Ok(UpdateOutcome::Locked { holder: pid });
        }
    };
    update_locked(host, paths, policy, log).await
}

async fn update_locked(
    host: &dyn Host,
    paths: &AccountPaths,
    policy: &HealthPolicy,
    log: &Logger,
) -> Result<UpdateOutcome, AppError> {
    let current = installed_version(host).await.ok_or_else(|| {
        AppError::Prerequisite("openclaw is not installed; run `clawstrap install` first".into())
    })?;
    let latest = stdout_of(host, &npm(paths).args(["view", OPENCLAW_PACKAGE, "version"]))
        .await
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Other("could not query the latest openclaw version from npm".into()))?;

    if current == latest {
        log.success(&format!("OpenClaw {current} is already the latest"));
        return Ok(UpdateOutcome::Current { version: current });
    }

    log.info(&format!("Updating OpenClaw {current} -> {latest}"));
    let updated = succeeds(host, &npm(paths).args(["update", "-g", OPENCLAW_PACKAGE])).await
        && installed_version(host).await.as_deref() == Some(latest.as_str());
    if !updated {
        log.warn("npm update did not land the new version; reinstalling");
        run_checked(
            host,
            &npm(paths).args(["install", "-g", &format!("{OPENCLAW_PACKAGE}@latest")]),
        )
        .await
        .map_err(|e| AppError::provision("update", e))?;
    }
    let now = installed_version(host).await.ok_or_else(|| AppError::Verify {
        phase: "update".into(),
        missing: "openclaw CLI".into(),
    })?;
    log.success(&format!("OpenClaw is now {now}"));

    if !succeeds(host, &systemctl_user(["restart", GATEWAY_UNIT])).await {
        log.warn(&format!("systemctl --user restart {GATEWAY_UNIT} failed"));
    }
    let health = health::check(host, policy, log).await;
    if let Some(advisory) = health.advisory() {
        log.warn(&advisory.title);
    }

    Ok(UpdateOutcome::Updated {
        from: current,
        to: now,
        health,
    })
}
