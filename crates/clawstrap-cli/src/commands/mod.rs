pub mod install;
pub mod reset;
pub mod status;
pub mod update;

use clawstrap_core::config::AccountPaths;
use clawstrap_provision::identity::user_session_env;
use clawstrap_provision::SystemHost;

/// A host wired for the invoking account: its tool dirs on PATH and a user
/// systemd session reachable.
pub fn account_host(paths: &AccountPaths) -> SystemHost {
    SystemHost::new(paths.extra_path()).with_env(user_session_env())
}
