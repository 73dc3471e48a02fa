mod commands;

use clap::{Parser, Subcommand};
use clawstrap_core::config::{self, AccountPaths, GATEWAY_PORT, RELEASE_URL, SERVICE_USER};
use clawstrap_core::error::EXIT_GENERAL;
use clawstrap_core::{AppError, Logger};
use commands::install::InstallParams;
use std::path::Path;
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "clawstrap",
    version,
    about = "Provision an Ubuntu host for OpenClaw and keep it updated"
)]
struct Cli {
    /// Local port the OpenClaw gateway listens on
    #[arg(long, global = true, env = "CLAWSTRAP_GATEWAY_PORT", default_value_t = GATEWAY_PORT)]
    gateway_port: u16,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install OpenClaw and its dependencies, register and start the gateway
    Install {
        /// Also disable SSH passwords and restrict SSH to the Tailscale interface
        #[arg(long)]
        hardened: bool,

        /// Service account that owns OpenClaw (used when run as root)
        #[arg(long, env = "CLAWSTRAP_USER", default_value = SERVICE_USER)]
        user: String,

        /// Never prompt; defer steps that need answers
        #[arg(long, env = "CLAWSTRAP_NON_INTERACTIVE")]
        non_interactive: bool,

        /// Where to fetch the installer when this binary can't be copied
        #[arg(long, env = "CLAWSTRAP_RELEASE_URL", default_value = RELEASE_URL)]
        release_url: String,
    },

    /// Update OpenClaw to the latest release and restart the gateway
    Update {
        /// Only errors reach the console; the log file is still written
        #[arg(long)]
        quiet: bool,
    },

    /// Show the installation record, gateway and Tailscale state
    Status {
        /// Print machine-readable JSON instead of the table
        #[arg(long)]
        json: bool,
    },

    /// Delete the OpenClaw installation record
    Reset {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

/// Process env wins over `~/.clawstrap/.env`, which wins over `/etc/clawstrap.env`.
fn load_env_files() {
    if let Ok(user_env) = config::user_env_file() {
        let _ = dotenvy::from_path(user_env);
    }
    let _ = dotenvy::from_path(config::SYSTEM_ENV_FILE);
}

fn open_log(path: &Path, quiet: bool) -> Logger {
    match Logger::open(path, quiet) {
        Ok(log) => log,
        Err(e) => {
            let log = Logger::console_only(quiet);
            log.warn(&format!("Cannot write {}: {e}; logging to console only", path.display()));
            log
        }
    }
}

/// Panics abort the run; record where before they do.
fn install_panic_hook(log: Arc<Logger>) {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unknown location".into());
        let message = info
            .payload()
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panic".into());
        log.error(&format!("Unexpected failure at {location}: {message}"));
        default_hook(info);
    }));
}

fn exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<AppError>()
        .map_or(EXIT_GENERAL, AppError::exit_code)
}

#[tokio::main]
async fn main() {
    load_env_files();
    let cli = Cli::parse();

    let paths = AccountPaths::current().ok();
    let log = Arc::new(match (&cli.command, &paths) {
        (Commands::Install { .. }, Some(p)) => open_log(&p.install_log(), false),
        (Commands::Update { quiet }, Some(p)) => open_log(&p.update_log(), *quiet),
        (Commands::Update { quiet }, None) => Logger::console_only(*quiet),
        _ => Logger::console_only(false),
    });
    install_panic_hook(Arc::clone(&log));

    let result = match cli.command {
        Commands::Install {
            hardened,
            user,
            non_interactive,
            release_url,
        } => {
            let params = InstallParams {
                hardened,
                user,
                non_interactive,
                release_url,
                gateway_port: cli.gateway_port,
            };
            commands::install::run(params, &log).await
        }
        Commands::Update { .. } => commands::update::run(cli.gateway_port, &log).await,
        Commands::Status { json } => commands::status::run(cli.gateway_port, json).await,
        Commands::Reset { yes } => commands::reset::run(yes, &log),
    };

    let code = match result {
        Ok(code) => code,
        Err(err) => {
            let message = format!("{err:#}");
            log.error(&message);
            clawstrap_ui::print_fatal(&message, log.path());
            exit_code(&err)
        }
    };
    std::process::exit(code);
}
