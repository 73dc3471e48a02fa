//! Best-effort confirmation that the gateway came up.
//!
//! Nothing here fails a run. The install already placed and registered
//! everything; a gateway that won't confirm readiness becomes an advisory
//! with recovery commands.

use crate::commands::{stdout_of, succeeds, systemctl_user};
use crate::host::{Cmd, Host};
use crate::phases::service::unit_active;
use clawstrap_core::config::{
    GATEWAY_PORT, GATEWAY_PROCESS, GATEWAY_UNIT, HTTP_PROBE_TIMEOUT, HTTP_READY_ATTEMPTS,
    POLL_INTERVAL, SUPERVISOR_WAIT_CEILING,
};
use clawstrap_core::{Advisory, Logger};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HealthPolicy {
    pub port: u16,
    pub supervisor_ceiling: Duration,
    pub http_attempts: u32,
    pub interval: Duration,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            port: GATEWAY_PORT,
            supervisor_ceiling: SUPERVISOR_WAIT_CEILING,
            http_attempts: HTTP_READY_ATTEMPTS,
            interval: POLL_INTERVAL,
        }
    }
}

/// Strongest evidence found that the gateway is serving, strongest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Serving { url: String, status: u16 },
    Listening { tool: &'static str },
    ProcessOnly,
    Unconfirmed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub supervisor_active: bool,
    pub readiness: Readiness,
}

impl HealthReport {
    pub fn confirmed(&self) -> bool {
        self.supervisor_active && matches!(self.readiness, Readiness::Serving { .. })
    }

    pub fn describe(&self) -> String {
        let state = match &self.readiness {
            Readiness::Serving { url, status } => format!("serving ({url} -> {status})"),
            Readiness::Listening { tool } => format!("listening on port (seen by {tool}), HTTP not answering"),
            Readiness::ProcessOnly => "process running, port not confirmed".to_string(),
            Readiness::Unconfirmed => "not responding".to_string(),
        };
        if self.supervisor_active {
            state
        } else {
            format!("{state}; systemd does not report it active")
        }
    }

    /// `None` when readiness is confirmed.
    pub fn advisory(&self) -> Option<Advisory> {
        if self.confirmed() {
            return None;
        }
        Some(
            Advisory::new(format!("Gateway readiness uncertain: {}", self.describe()))
                .with_command(format!("systemctl --user status {GATEWAY_UNIT}"))
                .with_command(format!("journalctl --user -u {GATEWAY_UNIT} -n 50"))
                .with_command(format!("systemctl --user restart {GATEWAY_UNIT}")),
        )
    }
}

/// Start the gateway, or restart it when it was running before the install.
/// Returns whether systemd accepted the request.
pub async fn start_gateway(host: &dyn Host, restart: bool, log: &Logger) -> bool {
    let verb = if restart { "restart" } else { "start" };
    log.info(&format!("Gateway: systemctl --user {verb} {GATEWAY_UNIT}"));
    let ok = succeeds(host, &systemctl_user([verb, GATEWAY_UNIT])).await;
    if !ok {
        log.warn(&format!("systemctl --user {verb} {GATEWAY_UNIT} failed"));
    }
    ok
}

async fn wait_for_supervisor(host: &dyn Host, policy: &HealthPolicy) -> bool {
    let mut waited = Duration::ZERO;
    loop {
        if unit_active(host).await {
            return true;
        }
        if waited >= policy.supervisor_ceiling {
            return false;
        }
        host.sleep(policy.interval).await;
        waited += policy.interval;
    }
}

async fn probe_http(host: &dyn Host, policy: &HealthPolicy) -> Option<Readiness> {
    let base = format!("http://127.0.0.1:{}", policy.port);
    for attempt in 1..=policy.http_attempts {
        for path in ["/health", "/"] {
            let url = format!("{base}{path}");
            // Anything short of a server error means something is answering.
            if let Some(status) = host.http_status(&url, HTTP_PROBE_TIMEOUT).await {
                if status < 500 {
                    return Some(Readiness::Serving { url, status });
                }
            }
        }
        if attempt < policy.http_attempts {
            host.sleep(policy.interval).await;
        }
    }
    None
}

async fn probe_socket(host: &dyn Host, port: u16) -> Option<Readiness> {
    let needle = format!(":{port}");
    let tools: [(&'static str, Cmd); 3] = [
        ("ss", Cmd::new("ss").arg("-ltnH")),
        ("netstat", Cmd::new("netstat").arg("-ltn")),
        (
            "lsof",
            Cmd::new("lsof").args(["-nP", &format!("-iTCP:{port}"), "-sTCP:LISTEN"]),
        ),
    ];
    // First tool present decides.
    let (tool, cmd) = tools.into_iter().find(|(tool, _)| host.which(tool).is_some())?;
    let out = stdout_of(host, &cmd).await?;
    out.lines()
        .any(|line| {
            line.split_whitespace()
                .any(|field| field.ends_with(&needle))
        })
        .then_some(Readiness::Listening { tool })
}

async fn probe_process(host: &dyn Host) -> Option<Readiness> {
    succeeds(host, &Cmd::new("pgrep").args(["-f", GATEWAY_PROCESS]))
        .await
        .then_some(Readiness::ProcessOnly)
}

/// Run the full fallback chain. Never fails.
pub async fn check(host: &dyn Host, policy: &HealthPolicy, log: &Logger) -> HealthReport {
    let spinner = if log.is_quiet() {
        clawstrap_ui::hidden_spinner()
    } else {
        clawstrap_ui::spinner("Waiting for the gateway to come up...")
    };

    let supervisor_active = wait_for_supervisor(host, policy).await;
    if !supervisor_active {
        log.debug("systemd never reported the gateway active");
    }

    let readiness = match probe_http(host, policy).await {
        Some(r) => r,
        None => match probe_socket(host, policy.port).await {
            Some(r) => r,
            None => probe_process(host).await.unwrap_or(Readiness::Unconfirmed),
        },
    };
    spinner.finish_and_clear();

    let report = HealthReport {
        supervisor_active,
        readiness,
    };
    if report.confirmed() {
        log.success(&format!("Gateway {}", report.describe()));
    } else {
        log.warn(&format!("Gateway {}", report.describe()));
    }
    report
}
