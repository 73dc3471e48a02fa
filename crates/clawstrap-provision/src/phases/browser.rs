use crate::commands::{apt_install, apt_update, run_checked};
use crate::context::InstallContext;
use crate::host::Host;
use crate::phase::{ensure, Applied, Phase};
use async_trait::async_trait;
use clawstrap_core::AppError;
use std::path::PathBuf;

const CHROME_DEB: &str =
    "https://dl.google.com/linux/direct/google-chrome-stable_current_amd64.deb";

/// Binaries the agent's browser driver will launch, in preference order.
pub const BROWSER_BINARIES: &[&str] = &[
    "google-chrome-stable",
    "google-chrome",
    "chromium",
    "chromium-browser",
];

pub fn find_browser(host: &dyn Host) -> Option<PathBuf> {
    BROWSER_BINARIES.iter().find_map(|b| host.which(b))
}

/// Chrome on amd64; Ubuntu's Chromium elsewhere (Google ships no arm64 .deb).
pub struct Browser;

#[async_trait]
impl Phase for Browser {
    fn name(&self) -> &'static str {
        "browser"
    }

    fn title(&self) -> &'static str {
        "Installing headless browser"
    }

    async fn probe(&self, host: &dyn Host, _ctx: &InstallContext) -> Result<bool, AppError> {
        Ok(find_browser(host).is_some())
    }

    async fn apply(&self, host: &dyn Host, ctx: &InstallContext) -> Result<Applied, AppError> {
        if ctx.arch == "amd64" {
            let deb = ctx.paths.app_dir().join("staging/google-chrome-stable.deb");
            host.download(CHROME_DEB, &deb).await?;
            run_checked(host, &apt_install([deb.display().to_string()])).await?;
            let _ = std::fs::remove_file(&deb);
        } else {
            run_checked(host, &apt_update()).await?;
            run_checked(host, &apt_install(["chromium-browser"])).await?;
        }
        Ok(Applied::Done)
    }

    async fn verify(&self, host: &dyn Host, _ctx: &InstallContext) -> Result<(), AppError> {
        ensure(
            find_browser(host).is_some(),
            self.name(),
            "a Chrome or Chromium binary",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_context;
    use crate::testing::FakeHost;

    #[tokio::test]
    async fn amd64_installs_chrome_package() {
        let home = tempfile::tempdir().unwrap();
        let ctx = test_context(home.path().to_str().unwrap());
        let host = FakeHost::new();
        host.payload(CHROME_DEB, b"deb");
        host.installs("google-chrome-stable.deb", "google-chrome-stable");

        std::fs::create_dir_all(ctx.paths.app_dir().join("staging")).unwrap();
        Browser.apply(&host, &ctx).await.unwrap();
        Browser.verify(&host, &ctx).await.unwrap();
        assert!(!host.called("chromium-browser"));
    }

    #[tokio::test]
    async fn arm64_falls_back_to_chromium() {
        let host = FakeHost::new();
        host.installs("apt-get install -y -q chromium-browser", "chromium-browser");
        let mut ctx = test_context("/home/openclaw");
        ctx.arch = "arm64";

        Browser.apply(&host, &ctx).await.unwrap();
        assert_eq!(
            find_browser(&host),
            Some(PathBuf::from("/usr/bin/chromium-browser"))
        );
    }
}
