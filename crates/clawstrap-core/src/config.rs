use crate::error::AppError;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SERVICE_USER: &str = "openclaw";
pub const GATEWAY_PORT: u16 = 18789;
pub const GATEWAY_UNIT: &str = "openclaw-gateway.service";
pub const GATEWAY_PROCESS: &str = "openclaw-gateway";
pub const OPENCLAW_PACKAGE: &str = "openclaw";

/// Minimum free space on `/` before anything is installed.
pub const MIN_FREE_BYTES: u64 = 2 * 1024 * 1024 * 1024;
/// Outbound reachability probe used by the pre-flight gate.
pub const NETWORK_PROBE_URL: &str = "https://registry.npmjs.org/";
pub const NETWORK_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// A lock older than this is reclaimable even if its holder is alive.
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(60 * 60);

pub const SUPERVISOR_WAIT_CEILING: Duration = Duration::from_secs(30);
pub const HTTP_READY_ATTEMPTS: u32 = 10;
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const HTTP_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

pub const NODE_MAJOR: u32 = 22;
pub const GO_VERSION: &str = "1.23.4";
pub const GO_ROOT: &str = "/usr/local/go";
pub const BREW_BIN: &str = "/home/linuxbrew/.linuxbrew/bin/brew";
pub const TAILSCALE_UDP_PORT: u16 = 41641;

/// Daily at 04:00 local time.
pub const UPDATE_CRON_SCHEDULE: &str = "0 4 * * *";

/// Canonical release binary, fetched when the running executable can't be located.
pub const RELEASE_URL: &str =
    "https://github.com/openclaw/clawstrap/releases/latest/download/clawstrap-linux";
pub const FETCH_PATH: &str = "/tmp/clawstrap-install";

pub const OS_RELEASE: &str = "/etc/os-release";
pub const SUDOERS_DIR: &str = "/etc/sudoers.d";
/// sshd keeps the first value it reads, so this must sort ahead of
/// distribution drop-ins such as `50-cloud-init.conf`.
pub const SSHD_DROPIN: &str = "/etc/ssh/sshd_config.d/00-clawstrap.conf";
pub const FAIL2BAN_JAIL: &str = "/etc/fail2ban/jail.local";

/// System-wide environment defaults; `~/.clawstrap/.env` and the process env take precedence.
pub const SYSTEM_ENV_FILE: &str = "/etc/clawstrap.env";

/// ~/.clawstrap/.env for the invoking user.
pub fn user_env_file() -> Result<PathBuf, AppError> {
    Ok(AccountPaths::current()?.app_dir().join(".env"))
}

/// Every path the provisioner touches inside one account's home.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountPaths {
    pub home: PathBuf,
}

impl AccountPaths {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    /// Paths for the invoking user's own home.
    pub fn current() -> Result<Self, AppError> {
        Ok(Self::new(
            dirs::home_dir().ok_or(AppError::HomeDirNotFound)?,
        ))
    }

    pub fn app_dir(&self) -> PathBuf {
        self.home.join(".clawstrap")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.app_dir().join("logs")
    }

    pub fn install_log(&self) -> PathBuf {
        self.logs_dir().join("install.log")
    }

    pub fn update_log(&self) -> PathBuf {
        self.logs_dir().join("update.log")
    }

    pub fn install_lock(&self) -> PathBuf {
        self.app_dir().join("install.lock")
    }

    pub fn update_lock(&self) -> PathBuf {
        self.app_dir().join("update.lock")
    }

    /// ~/.openclaw/
    pub fn openclaw_dir(&self) -> PathBuf {
        self.home.join(".openclaw")
    }

    /// The Installation Record written by `openclaw onboard`.
    pub fn record(&self) -> PathBuf {
        self.openclaw_dir().join("openclaw.json")
    }

    pub fn local_bin(&self) -> PathBuf {
        self.home.join(".local/bin")
    }

    /// Where the installer copies itself for the service account.
    pub fn installer_bin(&self) -> PathBuf {
        self.local_bin().join("clawstrap")
    }

    pub fn npm_prefix(&self) -> PathBuf {
        self.home.join(".npm-global")
    }

    pub fn npm_bin(&self) -> PathBuf {
        self.npm_prefix().join("bin")
    }

    pub fn user_unit(&self) -> PathBuf {
        self.home.join(".config/systemd/user").join(GATEWAY_UNIT)
    }

    pub fn authorized_keys(&self) -> PathBuf {
        self.home.join(".ssh/authorized_keys")
    }

    /// Directories prepended to PATH for every spawned command.
    pub fn extra_path(&self) -> Vec<PathBuf> {
        vec![
            self.npm_bin(),
            self.local_bin(),
            Path::new(GO_ROOT).join("bin"),
            PathBuf::from("/home/linuxbrew/.linuxbrew/bin"),
        ]
    }
}

/// Ensure the app directories exist.
pub fn ensure_dirs(paths: &AccountPaths) -> Result<(), AppError> {
    std::fs::create_dir_all(paths.logs_dir())?;
    Ok(())
}

/// The crontab line that runs the unattended updater.
pub fn update_cron_line(installer: &Path) -> String {
    format!(
        "{UPDATE_CRON_SCHEDULE} {} update --quiet >/dev/null 2>&1",
        installer.display()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_paths_hang_off_home() {
        let paths = AccountPaths::new("/home/openclaw");
        assert_eq!(
            paths.record(),
            PathBuf::from("/home/openclaw/.openclaw/openclaw.json")
        );
        assert_eq!(
            paths.installer_bin(),
            PathBuf::from("/home/openclaw/.local/bin/clawstrap")
        );
        assert_eq!(
            paths.user_unit(),
            PathBuf::from("/home/openclaw/.config/systemd/user/openclaw-gateway.service")
        );
    }

    #[test]
    fn cron_line_points_at_absolute_installer() {
        let line = update_cron_line(Path::new("/home/openclaw/.local/bin/clawstrap"));
        assert!(line.starts_with("0 4 * * * /home/openclaw/.local/bin/clawstrap update --quiet"));
    }
}
