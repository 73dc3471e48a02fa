use crate::archive::unpack_tar_gz;
use crate::commands::{run_checked, stdout_of, write_root_file};
use crate::context::InstallContext;
use crate::host::{Cmd, Host};
use crate::phase::{ensure, Applied, Phase};
use async_trait::async_trait;
use clawstrap_core::config::{GO_ROOT, GO_VERSION};
use clawstrap_core::AppError;
use std::path::Path;

const PROFILE_SNIPPET: &str = "/etc/profile.d/golang.sh";

pub fn tarball_url(version: &str, arch: &str) -> String {
    format!("https://go.dev/dl/go{version}.linux-{arch}.tar.gz")
}

async fn installed_version(host: &dyn Host) -> Option<String> {
    let go = Path::new(GO_ROOT).join("bin/go");
    stdout_of(host, &Cmd::new(go.display().to_string()).arg("version")).await
}

fn is_expected(version_line: &str) -> bool {
    version_line
        .split_whitespace()
        .any(|word| word == format!("go{GO_VERSION}"))
}

pub struct Golang;

#[async_trait]
impl Phase for Golang {
    fn name(&self) -> &'static str {
        "golang"
    }

    fn title(&self) -> &'static str {
        "Installing Go toolchain"
    }

    async fn probe(&self, host: &dyn Host, _ctx: &InstallContext) -> Result<bool, AppError> {
        Ok(installed_version(host).await.is_some_and(|v| is_expected(&v)))
    }

    async fn apply(&self, host: &dyn Host, ctx: &InstallContext) -> Result<Applied, AppError> {
        let staging = ctx.paths.app_dir().join("staging/go");
        let _ = std::fs::remove_dir_all(&staging);
        std::fs::create_dir_all(&staging)?;

        let tarball = staging.join("go.tar.gz");
        host.download(&tarball_url(GO_VERSION, ctx.arch), &tarball)
            .await?;
        let tree = staging.join("tree");
        unpack_tar_gz(&tarball, &tree)?;

        run_checked(host, &Cmd::new("rm").args(["-rf", GO_ROOT]).root()).await?;
        run_checked(
            host,
            &Cmd::new("mv")
                .arg(tree.join("go").display().to_string())
                .arg(GO_ROOT)
                .root(),
        )
        .await?;
        run_checked(
            host,
            &Cmd::new("chown").args(["-R", "root:root", GO_ROOT]).root(),
        )
        .await?;
        write_root_file(
            host,
            PROFILE_SNIPPET,
            &format!("export PATH=\"$PATH:{GO_ROOT}/bin\"\n"),
            "644",
        )
        .await?;

        let _ = std::fs::remove_dir_all(&staging);
        Ok(Applied::Done)
    }

    async fn verify(&self, host: &dyn Host, ctx: &InstallContext) -> Result<(), AppError> {
        ensure(
            self.probe(host, ctx).await?,
            self.name(),
            format!("go{GO_VERSION} under {GO_ROOT}"),
        )
    }
}
