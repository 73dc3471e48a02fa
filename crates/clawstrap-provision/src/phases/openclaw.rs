use crate::commands::{run_checked, stdout_of};
use crate::context::InstallContext;
use crate::host::{Cmd, Host};
use crate::phase::{ensure, Applied, Phase};
use async_trait::async_trait;
use clawstrap_core::config::OPENCLAW_PACKAGE;
use clawstrap_core::AppError;

/// Version reported by `openclaw --version` (`openclaw 2026.1.5`, `v2026.1.5`).
pub async fn installed_version(host: &dyn Host) -> Option<String> {
    stdout_of(host, &Cmd::new("openclaw").arg("--version"))
        .await
        .as_deref()
        .and_then(parse_version)
}

pub fn parse_version(output: &str) -> Option<String> {
    output
        .lines()
        .next()?
        .split_whitespace()
        .last()
        .map(|v| v.trim_start_matches('v').to_string())
        .filter(|v| !v.is_empty())
}

/// `npm <args>` against the account's user-level prefix.
pub fn npm(ctx: &InstallContext) -> Cmd {
    ctx.npm_env()
        .into_iter()
        .fold(Cmd::new("npm"), |cmd, (k, v)| cmd.env(k, v))
}

fn path_line(ctx: &InstallContext) -> String {
    format!("export PATH=\"{}:$PATH\"", ctx.paths.npm_bin().display())
}

/// The OpenClaw CLI, installed globally under `~/.npm-global` so npm never
/// needs root.
pub struct OpenClaw;

#[async_trait]
impl Phase for OpenClaw {
    fn name(&self) -> &'static str {
        "openclaw"
    }

    fn title(&self) -> &'static str {
        "Installing OpenClaw"
    }

    async fn probe(&self, host: &dyn Host, _ctx: &InstallContext) -> Result<bool, AppError> {
        Ok(installed_version(host).await.is_some())
    }

    async fn apply(&self, host: &dyn Host, ctx: &InstallContext) -> Result<Applied, AppError> {
        let prefix = ctx.paths.npm_prefix().display().to_string();
        run_checked(host, &Cmd::new("mkdir").args(["-p", &prefix])).await?;
        run_checked(host, &npm(ctx).args(["config", "set", "prefix", &prefix])).await?;
        run_checked(
            host,
            &npm(ctx).args(["install", "-g", &format!("{OPENCLAW_PACKAGE}@latest")]),
        )
        .await?;

        // Login shells should find the CLI too.
        let bashrc = ctx.paths.home.join(".bashrc");
        let existing = host.read_to_string(&bashrc).unwrap_or_default();
        let line = path_line(ctx);
        if !existing.contains(&line) {
            let mut updated = existing;
            if !updated.is_empty() && !updated.ends_with('\n') {
                updated.push('\n');
            }
            updated.push_str(&line);
            updated.push('\n');
            host.write_file(&bashrc, &updated, 0o644)?;
        }
        Ok(Applied::Done)
    }

    async fn verify(&self, host: &dyn Host, _ctx: &InstallContext) -> Result<(), AppError> {
        ensure(
            installed_version(host).await.is_some(),
            self.name(),
            "openclaw CLI on PATH",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_context;
    use crate::testing::FakeHost;
    use std::path::Path;

    #[test]
    fn version_is_last_word() {
        assert_eq!(parse_version("openclaw 2026.1.5\n").as_deref(), Some("2026.1.5"));
        assert_eq!(parse_version("v2026.2.0").as_deref(), Some("2026.2.0"));
        assert_eq!(parse_version(""), None);
    }

    #[tokio::test]
    async fn installs_under_user_prefix_without_sudo() {
        let host = FakeHost::new();
        host.fail("openclaw --version");
        host.put_file("/home/openclaw/.bashrc", "alias ll='ls -l'");
        let ctx = test_context("/home/openclaw");

        assert!(!OpenClaw.probe(&host, &ctx).await.unwrap());
        OpenClaw.apply(&host, &ctx).await.unwrap();

        assert!(host.called(
            "NPM_CONFIG_PREFIX=/home/openclaw/.npm-global npm install -g openclaw@latest"
        ));
        assert!(host.calls().iter().all(|c| !c.starts_with("sudo")));
        let bashrc = host.file(Path::new("/home/openclaw/.bashrc")).unwrap();
        assert_eq!(
            bashrc,
            "alias ll='ls -l'\nexport PATH=\"/home/openclaw/.npm-global/bin:$PATH\"\n"
        );

        // Re-applying leaves the profile alone.
        OpenClaw.apply(&host, &ctx).await.unwrap();
        assert_eq!(host.file(Path::new("/home/openclaw/.bashrc")).unwrap(), bashrc);

        let err = OpenClaw.verify(&host, &ctx).await.unwrap_err();
        assert!(matches!(err, AppError::Verify { .. }));
        host.respond_ok("openclaw --version", "openclaw 2026.1.5");
        OpenClaw.verify(&host, &ctx).await.unwrap();
    }
}
