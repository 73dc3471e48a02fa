use crate::commands::{succeeds, systemctl_user};
use crate::host::Host;
use clawstrap_core::config::{
    GATEWAY_UNIT, MIN_FREE_BYTES, NETWORK_PROBE_TIMEOUT, NETWORK_PROBE_URL, OS_RELEASE,
};
use clawstrap_core::{AppError, Logger};
use std::collections::HashMap;
use std::path::Path;

/// Oldest Ubuntu release the phases know how to provision.
const MIN_UBUNTU: (u32, u32) = (22, 4);

/// Fields of `/etc/os-release` the installer cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OsRelease {
    pub id: String,
    pub id_like: String,
    pub pretty_name: String,
    pub version_id: String,
    pub codename: String,
}

impl OsRelease {
    pub fn parse(text: &str) -> Self {
        let fields: HashMap<&str, String> = text
            .lines()
            .filter_map(|line| line.split_once('='))
            .map(|(k, v)| (k.trim(), v.trim().trim_matches('"').to_string()))
            .collect();
        let get = |key: &str| fields.get(key).cloned().unwrap_or_default();
        Self {
            id: get("ID"),
            id_like: get("ID_LIKE"),
            pretty_name: get("PRETTY_NAME"),
            version_id: get("VERSION_ID"),
            codename: {
                let codename = get("VERSION_CODENAME");
                if codename.is_empty() {
                    get("UBUNTU_CODENAME")
                } else {
                    codename
                }
            },
        }
    }

    pub fn is_ubuntu(&self) -> bool {
        self.id == "ubuntu" || self.id_like.split_whitespace().any(|l| l == "ubuntu")
    }

    /// `(major, minor)` from `VERSION_ID`, e.g. `24.04` → `(24, 4)`.
    pub fn version(&self) -> Option<(u32, u32)> {
        let (major, minor) = self.version_id.split_once('.')?;
        Some((major.parse().ok()?, minor.parse().ok()?))
    }

    pub fn display_name(&self) -> String {
        if self.pretty_name.is_empty() {
            format!("{} {}", self.id, self.version_id)
        } else {
            self.pretty_name.clone()
        }
    }
}

/// What the gate learned; carried into the install context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preflight {
    pub os: OsRelease,
    pub free_bytes: u64,
    /// The gateway was active and has been stopped for the upgrade.
    pub service_was_running: bool,
}

/// Single pass/fail checkpoint before anything is mutated.
pub async fn run(host: &dyn Host, log: &Logger) -> Result<Preflight, AppError> {
    let text = host
        .read_to_string(Path::new(OS_RELEASE))
        .map_err(|e| AppError::Prerequisite(format!("cannot read {OS_RELEASE}: {e}")))?;
    let os = OsRelease::parse(&text);
    if !os.is_ubuntu() {
        return Err(AppError::Prerequisite(format!(
            "unsupported OS '{}'; Ubuntu {}.{:02}+ is required",
            os.display_name(),
            MIN_UBUNTU.0,
            MIN_UBUNTU.1
        )));
    }
    match os.version() {
        Some(v) if v >= MIN_UBUNTU => {}
        _ => {
            return Err(AppError::Prerequisite(format!(
                "Ubuntu {} is too old; {}.{:02}+ is required",
                os.version_id, MIN_UBUNTU.0, MIN_UBUNTU.1
            )))
        }
    }

    let free_bytes = host.free_space(Path::new("/"))?;
    if free_bytes < MIN_FREE_BYTES {
        return Err(AppError::Prerequisite(format!(
            "only {} MiB free on /; at least {} MiB is required",
            free_bytes / (1024 * 1024),
            MIN_FREE_BYTES / (1024 * 1024)
        )));
    }

    if host
        .http_status(NETWORK_PROBE_URL, NETWORK_PROBE_TIMEOUT)
        .await
        .is_none()
    {
        return Err(AppError::Prerequisite(format!(
            "no outbound network: {NETWORK_PROBE_URL} is unreachable"
        )));
    }

    let service_was_running =
        succeeds(host, &systemctl_user(["is-active", "--quiet", GATEWAY_UNIT])).await;
    if service_was_running {
        log.info("Gateway is running; stopping it for the upgrade");
        if !succeeds(host, &systemctl_user(["stop", GATEWAY_UNIT])).await {
            log.warn("Could not stop the gateway; continuing with it running");
        }
    }

    log.success(&format!(
        "Pre-flight passed: {}, {} MiB free",
        os.display_name(),
        free_bytes / (1024 * 1024)
    ));
    Ok(Preflight {
        os,
        free_bytes,
        service_was_running,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeHost;

    const NOBLE: &str = r#"PRETTY_NAME="Ubuntu 24.04.1 LTS"
NAME="Ubuntu"
VERSION_ID="24.04"
VERSION_CODENAME=noble
ID=ubuntu
ID_LIKE=debian
"#;

    fn healthy_host() -> FakeHost {
        let host = FakeHost::new();
        host.put_file(OS_RELEASE, NOBLE);
        host.http(NETWORK_PROBE_URL, 200);
        host.fail("is-active --quiet");
        host
    }

    #[test]
    fn parses_ubuntu_release() {
        let os = OsRelease::parse(NOBLE);
        assert!(os.is_ubuntu());
        assert_eq!(os.version(), Some((24, 4)));
        assert_eq!(os.codename, "noble");
        assert_eq!(os.display_name(), "Ubuntu 24.04.1 LTS");
    }

    #[tokio::test]
    async fn passes_on_healthy_host() {
        let host = healthy_host();
        let pre = run(&host, &Logger::console_only(true)).await.unwrap();
        assert!(!pre.service_was_running);
        assert_eq!(pre.os.codename, "noble");
        assert!(!host.called("stop"));
    }

    #[tokio::test]
    async fn missing_release_file_is_fatal() {
        let host = FakeHost::new();
        let err = run(&host, &Logger::console_only(true)).await.unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn low_disk_reports_measured_value() {
        let host = healthy_host();
        host.set_free_space(512 * 1024 * 1024);
        let err = run(&host, &Logger::console_only(true)).await.unwrap_err();
        assert!(err.to_string().contains("only 512 MiB free"));
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn unreachable_network_is_fatal() {
        let host = FakeHost::new();
        host.put_file(OS_RELEASE, NOBLE);
        let err = run(&host, &Logger::console_only(true)).await.unwrap_err();
        assert!(err.to_string().contains("no outbound network"));
    }

    #[tokio::test]
    async fn old_or_foreign_os_is_rejected() {
        let host = healthy_host();
        host.put_file(OS_RELEASE, "ID=ubuntu\nVERSION_ID=\"20.04\"\n");
        assert!(run(&host, &Logger::console_only(true)).await.is_err());

        host.put_file(OS_RELEASE, "ID=fedora\nVERSION_ID=\"40\"\n");
        let err = run(&host, &Logger::console_only(true)).await.unwrap_err();
        assert!(err.to_string().contains("unsupported OS"));
    }

    #[tokio::test]
    async fn running_gateway_is_stopped_and_remembered() {
        let host = healthy_host();
        host.respond_ok("is-active --quiet", "");
        let pre = run(&host, &Logger::console_only(true)).await.unwrap();
        assert!(pre.service_was_running);
        assert!(host.called("systemctl --user stop openclaw-gateway.service"));
    }
}
