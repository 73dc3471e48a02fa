//! The fixed phase catalogue, in run order.

pub mod browser;
pub mod cron;
pub mod fail2ban;
pub mod firewall;
pub mod golang;
pub mod homebrew;
pub mod nodejs;
pub mod onboarding;
pub mod openclaw;
pub mod packages;
pub mod service;
pub mod ssh_hardening;
pub mod tailscale;
pub mod vpn_firewall;
pub mod vps_defaults;

use crate::phase::{Phase, Sequencer};

/// Every phase of a full install. Hardened-only phases disable themselves.
pub fn catalogue() -> Vec<Box<dyn Phase>> {
    vec![
        Box::new(packages::BasePackages),
        Box::new(tailscale::Tailscale),
        Box::new(nodejs::NodeJs),
        Box::new(golang::Golang),
        Box::new(homebrew::Homebrew),
        Box::new(browser::Browser),
        Box::new(firewall::Firewall),
        Box::new(fail2ban::Fail2ban),
        Box::new(openclaw::OpenClaw),
        Box::new(service::GatewayService),
        Box::new(onboarding::Onboarding),
        Box::new(vps_defaults::VpsDefaults),
        Box::new(cron::UpdateSchedule),
        Box::new(ssh_hardening::SshHardening),
        Box::new(vpn_firewall::VpnOnlySsh),
    ]
}

pub fn install_sequence() -> Sequencer {
    Sequencer::new(catalogue())
}
