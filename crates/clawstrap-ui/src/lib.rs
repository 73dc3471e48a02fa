use clawstrap_core::Advisory;
use console::style;
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

/// Create a spinner with a message.
pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(template) = ProgressStyle::default_spinner()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
        .template("{spinner:.cyan} {msg}")
    {
        pb.set_style(template);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// A spinner that draws nothing, for quiet runs.
pub fn hidden_spinner() -> ProgressBar {
    ProgressBar::hidden()
}

/// Ask a yes/no question, defaulting to "no".
pub fn confirm(prompt: &str) -> Result<bool, anyhow::Error> {
    Ok(Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()?)
}

/// Red banner printed by the top-level error handler.
pub fn print_fatal(message: &str, log_path: Option<&Path>) {
    let divider = "=".repeat(60);
    eprintln!("\n{}", style(&divider).red());
    eprintln!("  {}", style("Installation failed").red().bold());
    eprintln!("{}", style(&divider).red());
    eprintln!("  {message}");
    if let Some(path) = log_path {
        eprintln!();
        eprintln!("  Full log: {}", path.display());
    }
    eprintln!("{}\n", style(&divider).red());
}

/// Yellow banner listing advisories and the commands that resolve them.
pub fn print_advisories(advisories: &[Advisory]) {
    if advisories.is_empty() {
        return;
    }
    let divider = "-".repeat(60);
    println!("\n{}", style(&divider).yellow());
    println!("  {}", style("Needs attention").yellow().bold());
    println!("{}", style(&divider).yellow());
    for advisory in advisories {
        println!("  {} {}", style("!").yellow(), advisory.title);
        for cmd in &advisory.remediation {
            println!("      $ {cmd}");
        }
    }
    println!("{}", style(&divider).yellow());
}

/// What the final summary box shows.
pub struct InstallSummary<'a> {
    pub user: &'a str,
    pub os: &'a str,
    pub free_space: u64,
    pub hardened: bool,
    pub readiness: &'a str,
    pub port: u16,
    pub instance_id: Option<&'a str>,
    pub tailscale_ip: Option<&'a str>,
    pub log_path: Option<&'a Path>,
}

/// Print the install summary.
pub fn print_summary(summary: &InstallSummary<'_>) {
    for line in summary_lines(summary) {
        println!("{line}");
    }
}

fn summary_lines(summary: &InstallSummary<'_>) -> Vec<String> {
    let divider = "=".repeat(60);
    let port = summary.port;

    let mut lines = vec![
        format!("\n{divider}"),
        "  OpenClaw Host Ready".to_string(),
        divider.clone(),
        format!("  Service account:   {}", summary.user),
        format!("  Operating system:  {}", summary.os),
        format!("  Free space:        {}", format_bytes(summary.free_space)),
        format!(
            "  Hardened:          {}",
            if summary.hardened { "yes (SSH keys only, VPN-only SSH)" } else { "no" }
        ),
        format!("  Instance ID:       {}", summary.instance_id.unwrap_or("(not onboarded yet)")),
        format!("  Gateway:           {}", summary.readiness),
    ];
    lines.push(match summary.tailscale_ip {
        Some(ip) => format!("  Tailscale:         {ip}  (http://{ip}:{port})"),
        None => "  Tailscale:         not connected".to_string(),
    });
    if let Some(path) = summary.log_path {
        lines.push(format!("  Log file:          {}", path.display()));
    }
    lines.extend([
        divider.clone(),
        "  Next steps:".to_string(),
        "    1. systemctl --user status openclaw-gateway".to_string(),
        format!("    2. curl http://127.0.0.1:{port}/health"),
        "    3. journalctl --user -u openclaw-gateway -f".to_string(),
        format!("{divider}\n"),
    ]);
    lines
}

pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes < KB {
        format!("{bytes} B")
    } else if bytes < MB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else if bytes < GB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    }
}
