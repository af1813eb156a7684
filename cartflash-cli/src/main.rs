//! cartflash CLI - Command-line tool for programming flash cartridges.
//!
//! ## Features
//!
//! - Erase and program 8K-class and 16K-class cartridges
//! - Automatic or interactive serial port selection
//! - Config files and environment variables for defaults
//! - Shell completion generation

use anyhow::Result;
use cartflash::CartProfile;
use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use console::style;
use env_logger::Env;
use log::debug;
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

mod commands;
mod config;
mod serial;

use config::Config;

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Set by the Ctrl-C handler.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Check if emoji/animations should be used (TTY and colors enabled).
fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Whether the user pressed Ctrl-C.
fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::Relaxed)
}

/// Errors that select a specific exit code.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// Bad invocation or missing input (exit code 2).
    #[error("{0}")]
    Usage(String),
    /// The user aborted (exit code 130).
    #[error("{0}")]
    Cancelled(String),
}

/// cartflash - program flash cartridges through a serial programmer board.
///
/// Environment variables:
///   CARTFLASH_PORT              - Default serial port
///   CARTFLASH_BAUD              - Default baud rate (default: 115200)
///   CARTFLASH_PROFILE           - Default cartridge profile (8k, 16k)
///   CARTFLASH_NON_INTERACTIVE   - Non-interactive mode (disable prompts)
#[derive(Parser)]
#[command(name = "cartflash")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = "Examples:\n  cartflash flash\n  cartflash --profile 16k -p /dev/ttyACM0 flash games.bin\n  cartflash list-ports")]
struct Cli {
    /// Serial port to use (auto-detected if not specified).
    #[arg(short, long, global = true, env = "CARTFLASH_PORT")]
    port: Option<String>,

    /// Baud rate of the programmer link [default: 115200].
    #[arg(short, long, global = true, env = "CARTFLASH_BAUD")]
    baud: Option<u32>,

    /// Cartridge profile [default: 8k].
    #[arg(long, global = true, value_enum, env = "CARTFLASH_PROFILE")]
    profile: Option<ProfileArg>,

    /// Verbose output level (-v, -vv, -vvv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Non-interactive mode (fail instead of prompting).
    #[arg(long, global = true, env = "CARTFLASH_NON_INTERACTIVE")]
    non_interactive: bool,

    /// Offer all ports, not only likely programmer boards.
    #[arg(long, global = true)]
    list_all_ports: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Cartridge profiles selectable on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ProfileArg {
    /// 8K-class cartridge (256 KiB, 64 sectors).
    #[value(name = "8k", aliases = ["8k-class", "256k"])]
    Cart8K,
    /// 16K-class cartridge (512 KiB, 128 sectors).
    #[value(name = "16k", aliases = ["16k-class", "512k"])]
    Cart16K,
}

impl From<ProfileArg> for CartProfile {
    fn from(arg: ProfileArg) -> Self {
        match arg {
            ProfileArg::Cart8K => CartProfile::Cart8K,
            ProfileArg::Cart16K => CartProfile::Cart16K,
        }
    }
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Erase the cartridge and write an image to it.
    Flash {
        /// Image file (defaults to the profile's multicart image).
        image: Option<PathBuf>,
    },

    /// List the supported cartridge profiles.
    Profiles {
        /// Output profiles as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// List available serial ports.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type for completions.
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Map an error to the process exit code.
fn exit_code(err: &anyhow::Error) -> i32 {
    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        return match cli_err {
            CliError::Usage(_) => 2,
            CliError::Cancelled(_) => 130,
        };
    }
    if matches!(
        err.downcast_ref::<cartflash::Error>(),
        Some(cartflash::Error::Interrupted)
    ) || was_interrupted()
    {
        return 130;
    }
    1
}

fn init_logging(cli: &Cli) {
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();
}

fn install_interrupt_handler() {
    if let Err(e) = ctrlc::set_handler(|| INTERRUPTED.store(true, Ordering::Relaxed)) {
        debug!("Could not install Ctrl-C handler: {e}");
    }
    cartflash::set_interrupt_checker(was_interrupted);
}

fn run(cli: &Cli) -> Result<()> {
    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::Flash { image } => commands::flash::cmd_flash(cli, &config, image.as_deref()),
        Commands::Profiles { json } => commands::profiles::cmd_profiles(*json),
        Commands::ListPorts { json } => commands::ports::cmd_list_ports(*json),
        Commands::Completions { shell } => {
            commands::completions::cmd_completions(*shell);
            Ok(())
        },
    }
}

fn main() {
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();
    init_logging(&cli);
    install_interrupt_handler();

    debug!(
        "cartflash v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    if let Err(err) = run(&cli) {
        eprintln!("{} {err:#}", style("Error:").red().bold());
        std::process::exit(exit_code(&err));
    }
}
