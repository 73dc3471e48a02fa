//! Privilege/identity bootstrap.
//!
//! The pipeline never runs as root. A root invocation creates the service
//! account, installs this binary into its home, and then either tells the
//! operator how to continue (attended shell) or re-executes itself as that
//! account and forwards the child's exit code (containers, pipes, cloud-init).

use crate::commands::{run_checked, shell_escape, stdout_of, succeeds, write_root_file};
use crate::fetch::{fetch_verified, Checksum};
use crate::host::{Cmd, Host};
use clawstrap_core::config::{AccountPaths, SUDOERS_DIR};
use clawstrap_core::{AppError, Logger};
use std::path::{Path, PathBuf};

pub fn current_euid() -> u32 {
    unsafe { libc::geteuid() }
}

/// Who we are and what kind of session we're in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub euid: u32,
    pub user: String,
    pub home: PathBuf,
    /// A person is at the terminal and can act on printed instructions.
    pub attended: bool,
    pub container: bool,
}

impl Identity {
    pub fn detect(attended: bool) -> Result<Self, AppError> {
        let euid = current_euid();
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("LOGNAME"))
            .unwrap_or_else(|_| if euid == 0 { "root".into() } else { "unknown".into() });
        Ok(Self {
            euid,
            user,
            home: AccountPaths::current()?.home,
            attended,
            container: in_container(),
        })
    }
}

/// `XDG_RUNTIME_DIR` and the session bus address, filled in when the
/// process was started without a login session (`su -c`, cron, cloud-init)
/// so `systemctl --user` can reach the account's manager.
pub fn user_session_env() -> Vec<(String, String)> {
    let uid = unsafe { libc::getuid() };
    let runtime = std::env::var("XDG_RUNTIME_DIR").unwrap_or_else(|_| format!("/run/user/{uid}"));
    let bus = std::env::var("DBUS_SESSION_BUS_ADDRESS")
        .unwrap_or_else(|_| format!("unix:path={runtime}/bus"));
    vec![
        ("XDG_RUNTIME_DIR".to_string(), runtime),
        ("DBUS_SESSION_BUS_ADDRESS".to_string(), bus),
    ]
}

pub fn in_container() -> bool {
    Path::new("/.dockerenv").exists()
        || Path::new("/run/.containerenv").exists()
        || std::env::var_os("container").is_some()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub name: String,
    pub paths: AccountPaths,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handoff {
    /// Print how to continue as the service account, then stop.
    Instruct,
    /// Re-run the pipeline as the service account and wait for it.
    ReExec,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityState {
    Unresolved,
    NeedsHandoff(Handoff),
    Resolved(Account),
}

/// The single transition of the identity state machine.
pub fn transition(state: IdentityState, identity: &Identity) -> IdentityState {
    match state {
        IdentityState::Unresolved if identity.euid != 0 => IdentityState::Resolved(Account {
            name: identity.user.clone(),
            paths: AccountPaths::new(&identity.home),
        }),
        IdentityState::Unresolved if identity.attended && !identity.container => {
            IdentityState::NeedsHandoff(Handoff::Instruct)
        }
        IdentityState::Unresolved => IdentityState::NeedsHandoff(Handoff::ReExec),
        settled => settled,
    }
}

/// How a root invocation hands off.
pub struct HandoffOptions {
    pub service_user: String,
    pub hardened: bool,
    /// The running executable, if it could be located on disk.
    pub current_exe: Option<PathBuf>,
    pub release_url: String,
    pub fetch_path: PathBuf,
}

impl HandoffOptions {
    /// Arguments the service account's run receives.
    pub fn forwarded_args(&self) -> Vec<&'static str> {
        let mut args = vec!["install"];
        if self.hardened {
            args.push("--hardened");
        }
        args.push("--non-interactive");
        args
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Resolution {
    Continue(Account),
    Exit(i32),
}

/// Drive the identity state machine to a terminal action.
pub async fn resolve(
    host: &dyn Host,
    identity: &Identity,
    opts: &HandoffOptions,
    log: &Logger,
) -> Result<Resolution, AppError> {
    match transition(IdentityState::Unresolved, identity) {
        IdentityState::Resolved(account) => {
            if account.name != opts.service_user {
                log.info(&format!(
                    "Running as '{}'; that account will own the OpenClaw service",
                    account.name
                ));
            }
            if let Err(e) = place_own_installer(host, &account, opts, log).await {
                log.warn(&format!(
                    "Could not place {}: {e}",
                    account.paths.installer_bin().display()
                ));
            }
            Ok(Resolution::Continue(account))
        }
        IdentityState::NeedsHandoff(handoff) => {
            log.info(&format!(
                "Running as root; preparing service account '{}'",
                opts.service_user
            ));
            let account = prepare_account(host, &opts.service_user, log).await?;
            let installer = materialize_installer(host, &account, opts, log).await?;
            match handoff {
                Handoff::Instruct => {
                    print_instructions(&account, &installer, opts, log);
                    Ok(Resolution::Exit(0))
                }
                Handoff::ReExec => {
                    let code = reexec(host, &account, &installer, opts, log).await?;
                    Ok(Resolution::Exit(code))
                }
            }
        }
        IdentityState::Unresolved => Err(AppError::Other("identity left unresolved".into())),
    }
}

fn handoff_err(step: &str) -> impl Fn(AppError) -> AppError + '_ {
    move |e| AppError::Handoff {
        step: step.to_string(),
        message: e.to_string(),
    }
}

/// Create the service account if needed, grant it sudo, and fix ownership.
pub async fn prepare_account(
    host: &dyn Host,
    user: &str,
    log: &Logger,
) -> Result<Account, AppError> {
    if succeeds(host, &Cmd::new("id").args(["-u", user])).await {
        log.info(&format!("Account '{user}' already exists"));
    } else {
        run_checked(
            host,
            &Cmd::new("useradd")
                .args(["--create-home", "--shell", "/bin/bash", user])
                .root(),
        )
        .await
        .map_err(handoff_err("create account"))?;
        log.success(&format!("Created account '{user}'"));
    }

    let home = stdout_of(host, &Cmd::new("getent").args(["passwd", user]))
        .await
        .and_then(|line| line.split(':').nth(5).map(str::to_string))
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| format!("/home/{user}"));

    let sudoers = format!("{SUDOERS_DIR}/{user}");
    let grant = format!("# Managed by clawstrap\n{user} ALL=(ALL) NOPASSWD:ALL\n");
    write_root_file(host, &sudoers, &grant, "440")
        .await
        .map_err(handoff_err("sudoers"))?;
    if !succeeds(host, &Cmd::new("visudo").args(["-cf", &sudoers]).root()).await {
        let _ = host.run(&Cmd::new("rm").args(["-f", &sudoers]).root()).await;
        return Err(AppError::Handoff {
            step: "sudoers".into(),
            message: format!("{sudoers} failed visudo validation"),
        });
    }

    if !succeeds(host, &Cmd::new("loginctl").args(["enable-linger", user]).root()).await {
        log.warn("Could not enable lingering; the gateway may stop when you log out");
    }

    let local = format!("{home}/.local");
    run_checked(
        host,
        &Cmd::new("mkdir").args(["-p", &format!("{local}/bin")]).root(),
    )
    .await
    .map_err(handoff_err("ownership"))?;
    run_checked(
        host,
        &Cmd::new("chown").args(["-R", &format!("{user}:{user}"), &local]).root(),
    )
    .await
    .map_err(handoff_err("ownership"))?;

    Ok(Account {
        name: user.to_string(),
        paths: AccountPaths::new(home),
    })
}

/// Install this binary into the account's `~/.local/bin`.
///
/// When the running executable can't be found on disk, a canonical copy is
/// fetched to `fetch_path` first and installed from there.
pub async fn materialize_installer(
    host: &dyn Host,
    account: &Account,
    opts: &HandoffOptions,
    log: &Logger,
) -> Result<PathBuf, AppError> {
    let source = installer_source(host, opts, log).await?;
    let dest = account.paths.installer_bin();
    let owner = &account.name;
    run_checked(
        host,
        &Cmd::new("install")
            .args(["-o", owner, "-g", owner, "-m", "755"])
            .arg(source.display().to_string())
            .arg(dest.display().to_string())
            .root(),
    )
    .await
    .map_err(handoff_err("install binary"))?;
    log.success(&format!("Installer placed at {}", dest.display()));
    Ok(dest)
}

/// The running executable, or a freshly fetched canonical copy when it isn't on disk.
async fn installer_source(
    host: &dyn Host,
    opts: &HandoffOptions,
    log: &Logger,
) -> Result<PathBuf, AppError> {
    Ok(match opts.current_exe.as_deref().filter(|p| host.exists(p)) {
        Some(exe) => exe.to_path_buf(),
        None => {
            log.info(&format!(
                "Installer not on disk; fetching {} to {}",
                opts.release_url,
                opts.fetch_path.display()
            ));
            match fetch_verified(host, &opts.release_url, &opts.fetch_path)
                .await
                .map_err(handoff_err("fetch installer"))?
            {
                Checksum::Verified => log.success("Installer checksum verified"),
                Checksum::Unpublished => log.warn("No checksum published for the installer"),
            }
            host.set_mode(&opts.fetch_path, 0o755)?;
            opts.fetch_path.clone()
        }
    })
}

/// A non-root run places its own copy at the path the update cron entry calls.
async fn place_own_installer(
    host: &dyn Host,
    account: &Account,
    opts: &HandoffOptions,
    log: &Logger,
) -> Result<(), AppError> {
    let dest = account.paths.installer_bin();
    if opts.current_exe.as_deref() == Some(dest.as_path()) {
        return Ok(());
    }
    let source = installer_source(host, opts, log).await?;
    run_checked(
        host,
        &Cmd::new("install")
            .args(["-D", "-m", "755"])
            .arg(source.display().to_string())
            .arg(dest.display().to_string()),
    )
    .await
    .map_err(handoff_err("install binary"))?;
    log.success(&format!("Installer placed at {}", dest.display()));
    Ok(())
}

fn print_instructions(account: &Account, installer: &Path, opts: &HandoffOptions, log: &Logger) {
    let mut cmd = format!("{} install", installer.display());
    if opts.hardened {
        cmd.push_str(" --hardened");
    }
    log.info(&format!(
        "Root setup done. Continue as '{}' (do not run the rest as root):",
        account.name
    ));
    log.info(&format!("  sudo -iu {}", account.name));
    log.info(&format!("  {cmd}"));
}

async fn reexec(
    host: &dyn Host,
    account: &Account,
    installer: &Path,
    opts: &HandoffOptions,
    log: &Logger,
) -> Result<i32, AppError> {
    let mut inner = shell_escape(&installer.display().to_string());
    for arg in opts.forwarded_args() {
        inner.push(' ');
        inner.push_str(arg);
    }
    log.info(&format!("Re-running as '{}': {inner}", account.name));
    let out = host
        .run(
            &Cmd::new("su")
                .args(["-", &account.name, "-c", &inner])
                .interactive(),
        )
        .await
        .map_err(handoff_err("re-exec"))?;
    Ok(out.status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeHost;

    fn root(attended: bool, container: bool) -> Identity {
        Identity {
            euid: 0,
            user: "root".into(),
            home: "/root".into(),
            attended,
            container,
        }
    }

    fn opts(dir: &Path) -> HandoffOptions {
        HandoffOptions {
            service_user: "openclaw".into(),
            hardened: true,
            current_exe: Some(PathBuf::from("/usr/local/bin/clawstrap")),
            release_url: "https://example.test/clawstrap-linux".into(),
            fetch_path: dir.join("clawstrap-install"),
        }
    }

    #[test]
    fn non_root_resolves_in_process() {
        let me = Identity {
            euid: 1000,
            user: "openclaw".into(),
            home: "/home/openclaw".into(),
            attended: true,
            container: false,
        };
        assert_eq!(
            transition(IdentityState::Unresolved, &me),
            IdentityState::Resolved(Account {
                name: "openclaw".into(),
                paths: AccountPaths::new("/home/openclaw"),
            })
        );
    }

    #[tokio::test]
    async fn non_root_run_places_its_own_installer() {
        let dir = tempfile::tempdir().unwrap();
        let host = FakeHost::new();
        host.add_binary("/usr/local/bin/clawstrap");
        let me = Identity {
            euid: 1000,
            user: "openclaw".into(),
            home: "/home/openclaw".into(),
            attended: false,
            container: false,
        };
        let log = Logger::console_only(true);

        let res = resolve(&host, &me, &opts(dir.path()), &log).await.unwrap();
        assert!(matches!(res, Resolution::Continue(_)));
        assert!(host.called(
            "install -D -m 755 /usr/local/bin/clawstrap /home/openclaw/.local/bin/clawstrap"
        ));
        assert!(!host.called("sudo"));

        let host = FakeHost::new();
        let mut installed = opts(dir.path());
        installed.current_exe = Some(PathBuf::from("/home/openclaw/.local/bin/clawstrap"));
        resolve(&host, &me, &installed, &log).await.unwrap();
        assert!(!host.called("install"));
    }

    #[test]
    fn root_hand_off_depends_on_session() {
        assert_eq!(
            transition(IdentityState::Unresolved, &root(true, false)),
            IdentityState::NeedsHandoff(Handoff::Instruct)
        );
        assert_eq!(
            transition(IdentityState::Unresolved, &root(false, false)),
            IdentityState::NeedsHandoff(Handoff::ReExec)
        );
        assert_eq!(
            transition(IdentityState::Unresolved, &root(true, true)),
            IdentityState::NeedsHandoff(Handoff::ReExec)
        );
    }

    #[test]
    fn settled_states_do_not_move() {
        let state = IdentityState::NeedsHandoff(Handoff::Instruct);
        assert_eq!(transition(state.clone(), &root(false, true)), state);
    }

    #[tokio::test]
    async fn attended_root_prepares_account_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        let host = FakeHost::new();
        host.fail("id -u openclaw");
        host.respond_ok("getent passwd openclaw", "openclaw:x:999:999::/home/openclaw:/bin/bash\n");
        host.add_binary("/usr/local/bin/clawstrap");
        let log = Logger::console_only(true);

        let res = resolve(&host, &root(true, false), &opts(dir.path()), &log).await.unwrap();
        assert_eq!(res, Resolution::Exit(0));
        assert!(host.called("sudo useradd --create-home --shell /bin/bash openclaw"));
        assert!(host.called("sudo visudo -cf /etc/sudoers.d/openclaw"));
        assert!(host.called(
            "sudo install -o openclaw -g openclaw -m 755 /usr/local/bin/clawstrap /home/openclaw/.local/bin/clawstrap"
        ));
        assert!(!host.called("su - openclaw"));
        assert_eq!(
            host.stdin_for("tee /etc/sudoers.d/openclaw").unwrap(),
            "# Managed by clawstrap\nopenclaw ALL=(ALL) NOPASSWD:ALL\n"
        );
    }

    #[tokio::test]
    async fn container_root_reexecs_and_forwards_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let host = FakeHost::new();
        host.respond_ok("getent passwd openclaw", "openclaw:x:999:999::/home/openclaw:/bin/bash");
        host.add_binary("/usr/local/bin/clawstrap");
        host.respond("su - openclaw -c", 3, "", "");
        let log = Logger::console_only(true);

        let res = resolve(&host, &root(false, true), &opts(dir.path()), &log).await.unwrap();
        assert_eq!(res, Resolution::Exit(3));
        assert!(!host.called("useradd"));
        assert!(host.called(
            "su - openclaw -c '/home/openclaw/.local/bin/clawstrap' install --hardened --non-interactive"
        ));
    }

    #[tokio::test]
    async fn piped_installer_is_fetched_before_install() {
        let dir = tempfile::tempdir().unwrap();
        let host = FakeHost::new();
        host.respond_ok("getent passwd openclaw", "openclaw:x:999:999::/home/openclaw:/bin/bash");
        host.payload("https://example.test/clawstrap-linux", b"elf");
        let mut options = opts(dir.path());
        options.current_exe = None;
        let log = Logger::console_only(true);

        let res = resolve(&host, &root(false, false), &options, &log).await.unwrap();
        assert_eq!(res, Resolution::Exit(0));
        let fetched = dir.path().join("clawstrap-install");
        assert_eq!(std::fs::read(&fetched).unwrap(), b"elf");
        assert!(host.called(&format!(
            "-m 755 {} /home/openclaw/.local/bin/clawstrap",
            fetched.display()
        )));
    }

    #[tokio::test]
    async fn failed_account_creation_aborts_before_install() {
        let dir = tempfile::tempdir().unwrap();
        let host = FakeHost::new();
        host.fail("id -u openclaw");
        host.respond("useradd", 9, "", "useradd: cannot lock /etc/passwd");
        let log = Logger::console_only(true);

        let err = resolve(&host, &root(false, true), &opts(dir.path()), &log)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Handoff { ref step, .. } if step == "create account"));
        assert!(!host.called("install -o"));
        assert!(!host.called("su -"));
    }
}
