use super::account_host;
use anyhow::Result;
use clawstrap_core::config::{AccountPaths, HTTP_PROBE_TIMEOUT};
use clawstrap_core::record::summarize;
use clawstrap_provision::phases::openclaw::installed_version;
use clawstrap_provision::phases::service::{unit_active, unit_enabled};
use clawstrap_provision::phases::tailscale::connected_ip;
use clawstrap_provision::Host;
use console::style;
use serde::Serialize;

#[derive(Debug, Default, Serialize)]
struct HostStatus {
    openclaw_version: Option<String>,
    record_path: String,
    record_present: bool,
    record_error: Option<String>,
    instance_id: Option<String>,
    headless: Option<bool>,
    default_profile: Option<String>,
    gateway_enabled: bool,
    gateway_active: bool,
    health_url: String,
    health_status: Option<u16>,
    tailscale_ip: Option<String>,
}

async fn gather(host: &dyn Host, paths: &AccountPaths, gateway_port: u16) -> HostStatus {
    let record_path = paths.record();
    let health_url = format!("http://127.0.0.1:{gateway_port}/health");
    let mut status = HostStatus {
        openclaw_version: installed_version(host).await,
        record_path: record_path.display().to_string(),
        gateway_enabled: unit_enabled(host).await,
        gateway_active: unit_active(host).await,
        health_status: host.http_status(&health_url, HTTP_PROBE_TIMEOUT).await,
        health_url,
        tailscale_ip: connected_ip(host).await,
        ..HostStatus::default()
    };

    if let Ok(text) = host.read_to_string(&record_path) {
        status.record_present = true;
        match summarize(&text) {
            Ok(summary) => {
                status.instance_id = summary.instance_id;
                status.headless = summary.headless;
                status.default_profile = summary.default_profile;
            }
            Err(e) => status.record_error = Some(e.to_string()),
        }
    }
    status
}

fn flag(ok: bool, yes: &str, no: &str) -> String {
    if ok {
        style(yes).green().to_string()
    } else {
        style(no).red().to_string()
    }
}

fn render(s: &HostStatus) {
    println!("\n  {}", style("OpenClaw host status").bold());
    println!("  {}", "-".repeat(50));
    println!(
        "  {:<18}{}",
        "OpenClaw CLI:",
        s.openclaw_version
            .clone()
            .unwrap_or_else(|| style("not installed").red().to_string())
    );

    if !s.record_present {
        println!(
            "  {:<18}{}",
            "Config:",
            style(format!("{} missing (not onboarded)", s.record_path)).yellow()
        );
    } else if let Some(err) = &s.record_error {
        println!("  {:<18}{}", "Config:", style(format!("unreadable ({err})")).red());
    } else {
        println!("  {:<18}{}", "Instance ID:", s.instance_id.as_deref().unwrap_or("(none)"));
        println!(
            "  {:<18}{}",
            "Browser profile:",
            s.default_profile.as_deref().unwrap_or("(unset)")
        );
        println!("  {:<18}{}", "Headless:", flag(s.headless == Some(true), "yes", "no"));
    }

    println!("  {:<18}{}", "Gateway unit:", flag(s.gateway_enabled, "enabled", "not enabled"));
    println!("  {:<18}{}", "Gateway process:", flag(s.gateway_active, "active", "inactive"));
    let http = match s.health_status {
        Some(code) => {
            let text = format!("{} -> {code}", s.health_url);
            flag(code < 500, &text, &text)
        }
        None => style(format!("{} not answering", s.health_url)).red().to_string(),
    };
    println!("  {:<18}{http}", "Gateway HTTP:");
    println!(
        "  {:<18}{}",
        "Tailscale:",
        match &s.tailscale_ip {
            Some(ip) => style(ip).green().to_string(),
            None => style("not connected").yellow().to_string(),
        }
    );
    println!();
}

/// Print what is installed and whether the gateway is up.
pub async fn run(gateway_port: u16, json: bool) -> Result<i32> {
    let paths = AccountPaths::current()?;
    let host = account_host(&paths);
    let status = gather(&host, &paths, gateway_port).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        render(&status);
    }
    Ok(0)
}
