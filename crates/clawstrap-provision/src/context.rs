use crate::identity::Account;
use crate::preflight::{OsRelease, Preflight};
use clawstrap_core::config::AccountPaths;

/// Read-only facts every phase sees. Built once after the pre-flight gate.
#[derive(Debug, Clone)]
pub struct InstallContext {
    pub user: String,
    pub paths: AccountPaths,
    pub os: OsRelease,
    /// `dpkg --print-architecture` naming: `amd64`, `arm64`.
    pub arch: &'static str,
    pub hardened: bool,
    pub interactive: bool,
    pub service_was_running: bool,
}

impl InstallContext {
    pub fn new(account: &Account, preflight: &Preflight, hardened: bool, interactive: bool) -> Self {
        Self {
            user: account.name.clone(),
            paths: account.paths.clone(),
            os: preflight.os.clone(),
            arch: deb_arch(std::env::consts::ARCH),
            hardened,
            interactive,
            service_was_running: preflight.service_was_running,
        }
    }

    /// Environment for user-level npm commands.
    pub fn npm_env(&self) -> Vec<(String, String)> {
        vec![(
            "NPM_CONFIG_PREFIX".to_string(),
            self.paths.npm_prefix().display().to_string(),
        )]
    }
}

pub fn deb_arch(rust_arch: &str) -> &'static str {
    match rust_arch {
        "aarch64" => "arm64",
        "arm" => "armhf",
        _ => "amd64",
    }
}

#[cfg(test)]
pub(crate) fn test_context(home: &str) -> InstallContext {
    InstallContext {
        user: "openclaw".into(),
        paths: AccountPaths::new(home),
        os: OsRelease::parse("ID=ubuntu\nVERSION_ID=\"24.04\"\nVERSION_CODENAME=noble\n"),
        arch: "amd64",
        hardened: false,
        interactive: false,
        service_was_running: false,
    }
}
