use super::account_host;
use anyhow::{Context, Result};
use clawstrap_core::config::{self, FETCH_PATH};
use clawstrap_core::Logger;
use clawstrap_provision::health::HealthPolicy;
use clawstrap_provision::identity::{self, HandoffOptions, Identity, Resolution};
use clawstrap_provision::phases::install_sequence;
use clawstrap_provision::pipeline::{self, InstallOptions, InstallOutcome};
use clawstrap_provision::SystemHost;
use clawstrap_ui::InstallSummary;
use std::path::PathBuf;

pub struct InstallParams {
    pub hardened: bool,
    pub user: String,
    pub non_interactive: bool,
    pub release_url: String,
    pub gateway_port: u16,
}

/// The running binary, if it is a real file that `install` can copy.
fn locate_self() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .filter(|p| !p.starts_with("/proc") && !p.starts_with("/dev/fd"))
        .filter(|p| p.is_file())
}

pub async fn run(params: InstallParams, log: &Logger) -> Result<i32> {
    let run_id = log.start_run("install");
    log.debug(&format!("run id {run_id}"));

    let attended = !params.non_interactive && console::user_attended();
    let identity = Identity::detect(attended)?;

    let handoff = HandoffOptions {
        service_user: params.user,
        hardened: params.hardened,
        current_exe: locate_self(),
        release_url: params.release_url,
        fetch_path: PathBuf::from(FETCH_PATH),
    };
    let bootstrap_host = SystemHost::new(Vec::new());
    let account = match identity::resolve(&bootstrap_host, &identity, &handoff, log).await? {
        Resolution::Continue(account) => account,
        Resolution::Exit(code) => return Ok(code),
    };
    config::ensure_dirs(&account.paths).context("creating ~/.clawstrap")?;

    let host = account_host(&account.paths);
    let policy = HealthPolicy {
        port: params.gateway_port,
        ..HealthPolicy::default()
    };
    let opts = InstallOptions {
        hardened: params.hardened,
        interactive: attended,
    };

    let done = match pipeline::install(&host, &account, opts, &install_sequence(), &policy, log)
        .await?
    {
        InstallOutcome::Locked { .. } => return Ok(0),
        InstallOutcome::Finished(done) => done,
    };

    log.success(&format!(
        "Installation complete: {} phase(s) applied, {} advisory note(s)",
        done.report.applied(),
        done.report.advisories.len()
    ));
    clawstrap_ui::print_advisories(&done.report.advisories);

    let os = done.context.os.display_name();
    let readiness = done.health.describe();
    clawstrap_ui::print_summary(&InstallSummary {
        user: &done.context.user,
        os: &os,
        free_space: done.preflight.free_bytes,
        hardened: done.context.hardened,
        readiness: &readiness,
        port: params.gateway_port,
        instance_id: done.record.as_ref().and_then(|r| r.instance_id.as_deref()),
        tailscale_ip: done.tailscale_ip.as_deref(),
        log_path: log.path(),
    });
    Ok(0)
}
