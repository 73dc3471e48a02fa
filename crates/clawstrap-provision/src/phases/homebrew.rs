use crate::commands::run_checked;
use crate::context::InstallContext;
use crate::host::{Cmd, Host};
use crate::phase::{ensure, Applied, Phase};
use async_trait::async_trait;
use clawstrap_core::config::BREW_BIN;
use clawstrap_core::AppError;
use std::path::Path;

const INSTALL_SCRIPT: &str = "https://raw.githubusercontent.com/Homebrew/install/HEAD/install.sh";

/// Homebrew refuses to install as root, so this runs as the service account
/// and relies on its passwordless sudo for `/home/linuxbrew`.
pub struct Homebrew;

#[async_trait]
impl Phase for Homebrew {
    fn name(&self) -> &'static str {
        "homebrew"
    }

    fn title(&self) -> &'static str {
        "Installing Homebrew"
    }

    async fn probe(&self, host: &dyn Host, _ctx: &InstallContext) -> Result<bool, AppError> {
        Ok(host.exists(Path::new(BREW_BIN)))
    }

    async fn apply(&self, host: &dyn Host, _ctx: &InstallContext) -> Result<Applied, AppError> {
        run_checked(
            host,
            &Cmd::bash(format!("curl -fsSL {INSTALL_SCRIPT} | bash")).env("NONINTERACTIVE", "1"),
        )
        .await?;
        Ok(Applied::Done)
    }

    async fn verify(&self, host: &dyn Host, _ctx: &InstallContext) -> Result<(), AppError> {
        ensure(host.exists(Path::new(BREW_BIN)), self.name(), BREW_BIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_context;
    use crate::testing::FakeHost;

    #[tokio::test]
    async fn installs_unattended_as_service_account() {
        let host = FakeHost::new();
        host.installs("Homebrew/install/HEAD/install.sh", BREW_BIN);
        let ctx = test_context("/home/openclaw");

        assert!(!Homebrew.probe(&host, &ctx).await.unwrap());
        Homebrew.apply(&host, &ctx).await.unwrap();
        let call = &host.calls()[0];
        assert!(call.starts_with("NONINTERACTIVE=1 bash -c curl"));
        assert!(!call.starts_with("sudo"));
        Homebrew.verify(&host, &ctx).await.unwrap();
    }
}
