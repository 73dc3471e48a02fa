use crate::commands::{apt_install, apt_update, run_checked, stdout_of};
use crate::context::InstallContext;
use crate::host::{Cmd, Host};
use crate::phase::{ensure, Applied, Phase};
use async_trait::async_trait;
use clawstrap_core::AppError;

/// The OS baseline every later phase leans on.
pub const BASE_PACKAGES: &[&str] = &[
    "curl",
    "ca-certificates",
    "gnupg",
    "git",
    "jq",
    "unzip",
    "build-essential",
    "procps",
    "iproute2",
    "cron",
    "ufw",
    "fail2ban",
];

/// Packages from `wanted` that dpkg doesn't report as installed.
pub async fn missing_packages<'a>(host: &dyn Host, wanted: &[&'a str]) -> Vec<&'a str> {
    let mut missing = Vec::new();
    for pkg in wanted {
        let status = stdout_of(
            host,
            &Cmd::new("dpkg-query").args(["-W", "-f=${Status}", *pkg]),
        )
        .await;
        if !status.is_some_and(|s| s.contains("install ok installed")) {
            missing.push(*pkg);
        }
    }
    missing
}

pub struct BasePackages;

#[async_trait]
impl Phase for BasePackages {
    fn name(&self) -> &'static str {
        "base-packages"
    }

    fn title(&self) -> &'static str {
        "Installing base system packages"
    }

    async fn probe(&self, host: &dyn Host, _ctx: &InstallContext) -> Result<bool, AppError> {
        Ok(missing_packages(host, BASE_PACKAGES).await.is_empty())
    }

    async fn apply(&self, host: &dyn Host, _ctx: &InstallContext) -> Result<Applied, AppError> {
        let missing = missing_packages(host, BASE_PACKAGES).await;
        run_checked(host, &apt_update()).await?;
        run_checked(host, &apt_install(missing)).await?;
        Ok(Applied::Done)
    }

    async fn verify(&self, host: &dyn Host, _ctx: &InstallContext) -> Result<(), AppError> {
        let missing = missing_packages(host, BASE_PACKAGES).await;
        ensure(
            missing.is_empty(),
            self.name(),
            format!("package(s) {}", missing.join(", ")),
        )
    }
}
