use super::account_host;
use anyhow::Result;
use clawstrap_core::config::AccountPaths;
use clawstrap_core::Logger;
use clawstrap_provision::health::HealthPolicy;
use clawstrap_provision::update::{self, UpdateOutcome};

/// Exit status for a run cut short by a signal (128 + SIGINT).
const EXIT_INTERRUPTED: i32 = 130;

pub async fn run(gateway_port: u16, log: &Logger) -> Result<i32> {
    log.start_run("update");
    let paths = AccountPaths::current()?;
    let host = account_host(&paths);
    let policy = HealthPolicy {
        port: gateway_port,
        ..HealthPolicy::default()
    };

    // Losing the race drops the update future, and with it the lock guard
    // and any child process.
    let outcome = tokio::select! {
        result = update::run(&host, &paths, &policy, log) => result?,
        signal = shutdown_signal() => {
            log.warn(&format!("Received {signal}; update interrupted"));
            return Ok(EXIT_INTERRUPTED);
        }
    };

    match outcome {
        UpdateOutcome::Locked { .. } => {}
        UpdateOutcome::Current { version } => log.info(&format!("No change needed ({version})")),
        UpdateOutcome::Updated { from, to, health } => {
            log.success(&format!("Updated {from} -> {to}; gateway {}", health.describe()));
        }
    }
    Ok(0)
}

async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
        "SIGINT"
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                "SIGTERM"
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<&'static str>();

    tokio::select! {
        name = ctrl_c => name,
        name = terminate => name,
    }
}
