//! The install run once identity is resolved: lock, gate, phases, gateway
//! start, readiness check. Everything after the phases is advisory.

use crate::context::InstallContext;
use crate::health::{self, HealthPolicy, HealthReport};
use crate::host::Host;
use crate::identity::Account;
use crate::lock::{self, Acquire};
use crate::phase::{Report, Sequencer};
use crate::phases::tailscale::connected_ip;
use crate::preflight::{self, Preflight};
use clawstrap_core::config::LOCK_TIMEOUT;
use clawstrap_core::record::{summarize, RecordSummary};
use clawstrap_core::{Advisory, AppError, Logger};

#[derive(Debug, Clone, Copy, Default)]
pub struct InstallOptions {
    pub hardened: bool,
    pub interactive: bool,
}

#[derive(Debug)]
pub struct Finished {
    pub context: InstallContext,
    pub preflight: Preflight,
    pub report: Report,
    pub health: HealthReport,
    pub tailscale_ip: Option<String>,
    pub record: Option<RecordSummary>,
}

#[derive(Debug)]
pub enum InstallOutcome {
    /// Another install run holds the lock.
    Locked { holder: Option<u32> },
    Finished(Box<Finished>),
}

pub async fn install(
    host: &dyn Host,
    account: &Account,
    opts: InstallOptions,
    sequencer: &Sequencer,
    policy: &HealthPolicy,
    log: &Logger,
) -> Result<InstallOutcome, AppError> {
    let _guard = match lock::acquire(&account.paths.install_lock(), LOCK_TIMEOUT)? {
        Acquire::Acquired(guard) => guard,
        Acquire::Held { pid } => {
            let who = pid.map_or("another process".to_string(), |p| format!("pid {p}"));
            log.warn(&format!("Another install is already running ({who}); exiting"));
            return Ok(InstallOutcome::Locked { holder: pid });
        }
    };

    let preflight = preflight::run(host, log).await?;
    let context = InstallContext::new(account, &preflight, opts.hardened, opts.interactive);
    let mut report = sequencer.run(host, &context, log).await?;

    health::start_gateway(host, context.service_was_running, log).await;
    let health = health::check(host, policy, log).await;
    if let Some(advisory) = health.advisory() {
        report.advise(advisory);
    }

    let tailscale_ip = connected_ip(host).await;
    if tailscale_ip.is_none() && host.which("tailscale").is_some() {
        log.warn("Tailscale is installed but not authenticated");
        report.advise(
            Advisory::new("Tailscale is installed but not authenticated")
                .with_command("sudo tailscale up"),
        );
    }

    let record = host
        .read_to_string(&context.paths.record())
        .ok()
        .and_then(|text| summarize(&text).ok());

    Ok(InstallOutcome::Finished(Box::new(Finished {
        context,
        preflight,
        report,
        health,
        tailscale_ip,
        record,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::Readiness;
    use crate::host::CmdOutput;
    use crate::testing::FakeHost;
    use clawstrap_core::config::{AccountPaths, NETWORK_PROBE_URL, OS_RELEASE};

    fn ready_host() -> FakeHost {
        let host = FakeHost::new();
        host.put_file(OS_RELEASE, "ID=ubuntu\nVERSION_ID=\"24.04\"\nVERSION_CODENAME=noble\n");
        host.http(NETWORK_PROBE_URL, 200);
        // Not running before the install; up once started.
        host.respond_seq(
            "systemctl --user is-active --quiet openclaw-gateway.service",
            vec![
                CmdOutput { status: 3, stdout: String::new(), stderr: String::new() },
                CmdOutput::default(),
            ],
        );
        host
    }

    fn account(home: &tempfile::TempDir) -> Account {
        Account {
            name: "openclaw".into(),
            paths: AccountPaths::new(home.path()),
        }
    }

    #[tokio::test]
    async fn unreachable_gateway_is_advisory_not_fatal() {
        let home = tempfile::tempdir().unwrap();
        let host = ready_host();
        host.respond_ok("pgrep -f openclaw-gateway", "4242");
        let log = Logger::console_only(true);

        let outcome = install(
            &host,
            &account(&home),
            InstallOptions::default(),
            &Sequencer::new(Vec::new()),
            &HealthPolicy::default(),
            &log,
        )
        .await
        .unwrap();

        let InstallOutcome::Finished(done) = outcome else {
            panic!("install should finish");
        };
        assert_eq!(done.health.readiness, Readiness::ProcessOnly);
        assert!(done
            .report
            .advisories
            .iter()
            .any(|a| a.title.starts_with("Gateway readiness uncertain")));
        assert!(host.called("systemctl --user start openclaw-gateway.service"));
        assert!(!account(&home).paths.install_lock().exists());
    }

    #[tokio::test]
    async fn overlapping_install_is_a_noop() {
        let home = tempfile::tempdir().unwrap();
        let acct = account(&home);
        let Acquire::Acquired(_held) = lock::acquire(&acct.paths.install_lock(), LOCK_TIMEOUT).unwrap()
        else {
            panic!("lock should be free");
        };
        let host = ready_host();

        let outcome = install(
            &host,
            &acct,
            InstallOptions::default(),
            &Sequencer::new(Vec::new()),
            &HealthPolicy::default(),
            &Logger::console_only(true),
        )
        .await
        .unwrap();
        assert!(matches!(outcome, InstallOutcome::Locked { .. }));
        assert!(host.calls().is_empty());
    }

    #[tokio::test]
    async fn failed_gate_stops_before_any_phase() {
        let home = tempfile::tempdir().unwrap();
        let host = ready_host();
        host.set_free_space(512 * 1024 * 1024);

        let err = install(
            &host,
            &account(&home),
            InstallOptions::default(),
            &crate::phases::install_sequence(),
            &HealthPolicy::default(),
            &Logger::console_only(true),
        )
        .await
        .unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("only 512 MiB free"));
        assert!(!host.called("apt-get"));
    }

    #[tokio::test]
    async fn unauthenticated_tailscale_is_flagged() {
        let home = tempfile::tempdir().unwrap();
        let host = ready_host();
        host.add_binary("tailscale");
        host.fail("tailscale ip -4");
        host.http("http://127.0.0.1:18789/health", 200);

        let InstallOutcome::Finished(done) = install(
            &host,
            &account(&home),
            InstallOptions::default(),
            &Sequencer::new(Vec::new()),
            &HealthPolicy::default(),
            &Logger::console_only(true),
        )
        .await
        .unwrap() else {
            panic!("install should finish");
        };
        assert!(done.health.confirmed());
        assert_eq!(done.report.advisories.len(), 1);
        assert_eq!(done.report.advisories[0].remediation, ["sudo tailscale up"]);
    }

    /// A host where every phase of a hardened install has already been applied.
    fn provisioned_host(paths: &AccountPaths) -> FakeHost {
        use crate::phases::{fail2ban::JAIL_LOCAL, ssh_hardening::SSHD_HARDENING};
        use clawstrap_core::config::{update_cron_line, BREW_BIN, FAIL2BAN_JAIL, SSHD_DROPIN};
        use clawstrap_core::record::patch_document;

        let host = ready_host();
        host.respond_ok("dpkg-query", "install ok installed");
        host.add_binary("tailscale");
        host.respond_ok("tailscale ip -4", "100.101.102.103\n");
        host.respond_ok("node --version", "v22.11.0\n");
        host.add_binary("npm");
        host.respond_ok("/usr/local/go/bin/go version", "go version go1.23.4 linux/amd64\n");
        host.add_binary(BREW_BIN);
        host.add_binary("google-chrome-stable");
        host.respond_ok(
            "ufw status",
            "Status: active\n\n22/tcp on tailscale0       ALLOW       Anywhere\n\
             41641/udp                  ALLOW       Anywhere\n",
        );
        host.put_file(FAIL2BAN_JAIL, JAIL_LOCAL);
        host.respond_ok("openclaw --version", "openclaw 2026.1.5\n");
        host.put_file(&paths.user_unit().display().to_string(), "[Unit]\n");
        let record = patch_document(r#"{"instanceId":"inst-1"}"#).unwrap().unwrap();
        host.put_file(&paths.record().display().to_string(), &record);
        host.respond_ok("crontab -l", &update_cron_line(&paths.installer_bin()));
        host.add_binary(&paths.installer_bin().display().to_string());
        host.put_file(SSHD_DROPIN, SSHD_HARDENING);
        host.respond_ok("sshd -T", "port 22\npasswordauthentication no\n");
        host.http("http://127.0.0.1:18789/health", 200);
        host
    }

    #[tokio::test]
    async fn provisioned_host_is_left_alone() {
        let home = tempfile::tempdir().unwrap();
        let acct = account(&home);
        let host = provisioned_host(&acct.paths);
        let opts = InstallOptions {
            hardened: true,
            interactive: false,
        };

        for _ in 0..2 {
            let InstallOutcome::Finished(done) = install(
                &host,
                &acct,
                opts,
                &crate::phases::install_sequence(),
                &HealthPolicy::default(),
                &Logger::console_only(true),
            )
            .await
            .unwrap() else {
                panic!("install should finish");
            };
            assert_eq!(done.report.applied(), 0);
            assert_eq!(done.report.phases.len(), 15);
            assert!(done
                .report
                .phases
                .iter()
                .all(|r| r.outcome == crate::phase::Outcome::Satisfied));
        }

        let calls = host.calls();
        for mutation in ["apt-get", "tee ", "ufw allow", "ufw delete", "npm install", "useradd"] {
            assert!(!calls.iter().any(|c| c.contains(mutation)), "{mutation} ran: {calls:#?}");
        }
        assert!(!calls.iter().any(|c| c.ends_with("crontab -")));
    }
}
