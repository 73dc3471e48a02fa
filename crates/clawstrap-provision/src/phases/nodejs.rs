use crate::commands::{apt_install, run_checked, stdout_of};
use crate::context::InstallContext;
use crate::host::{Cmd, Host};
use crate::phase::{ensure, Applied, Phase};
use async_trait::async_trait;
use clawstrap_core::config::NODE_MAJOR;
use clawstrap_core::AppError;

/// Major version from `node --version` output such as `v22.11.0`.
pub fn node_major(version: &str) -> Option<u32> {
    version
        .trim()
        .trim_start_matches('v')
        .split('.')
        .next()?
        .parse()
        .ok()
}

async fn current_major(host: &dyn Host) -> Option<u32> {
    stdout_of(host, &Cmd::new("node").arg("--version"))
        .await
        .as_deref()
        .and_then(node_major)
}

pub struct NodeJs;

#[async_trait]
impl Phase for NodeJs {
    fn name(&self) -> &'static str {
        "nodejs"
    }

    fn title(&self) -> &'static str {
        "Installing Node.js"
    }

    async fn probe(&self, host: &dyn Host, _ctx: &InstallContext) -> Result<bool, AppError> {
        Ok(current_major(host).await.is_some_and(|m| m >= NODE_MAJOR)
            && host.which("npm").is_some())
    }

    async fn apply(&self, host: &dyn Host, _ctx: &InstallContext) -> Result<Applied, AppError> {
        run_checked(
            host,
            &Cmd::bash(format!(
                "curl -fsSL https://deb.nodesource.com/setup_{NODE_MAJOR}.x | bash -"
            ))
            .root(),
        )
        .await?;
        run_checked(host, &apt_install(["nodejs"])).await?;
        Ok(Applied::Done)
    }

    async fn verify(&self, host: &dyn Host, _ctx: &InstallContext) -> Result<(), AppError> {
        let major = current_major(host).await;
        ensure(
            major.is_some_and(|m| m >= NODE_MAJOR),
            self.name(),
            format!(
                "node >= {NODE_MAJOR} (found {})",
                major.map_or("none".to_string(), |m| m.to_string())
            ),
        )?;
        ensure(host.which("npm").is_some(), self.name(), "npm")
    }
}
