//! `flash` command: erase the cartridge and write an image to it.

use anyhow::{Context, Result};
use cartflash::{CartProfile, DeviceProfile, Progress, SerialConfig, SourceImage};
use console::style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::debug;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::serial::{SerialOptions, select_serial_port};
use crate::{Cli, CliError, use_fancy_output, was_interrupted};

fn ensure_not_interrupted() -> Result<()> {
    if was_interrupted() {
        Err(CliError::Cancelled("interrupted".to_string()).into())
    } else {
        Ok(())
    }
}

/// Pick the cartridge profile: command line, then config, then 8K-class.
pub(crate) fn resolve_profile(cli_profile: Option<CartProfile>, config: &Config) -> Result<CartProfile> {
    if let Some(profile) = cli_profile {
        return Ok(profile);
    }
    match &config.flash.profile {
        Some(name) => CartProfile::from_name(name).ok_or_else(|| {
            CliError::Usage(format!(
                "unknown profile '{name}' in config (expected 8k or 16k)"
            ))
            .into()
        }),
        None => Ok(CartProfile::default()),
    }
}

/// Pick the image path: argument, then config, then the profile default.
pub(crate) fn resolve_image_path(arg: Option<&Path>, config: &Config, profile: CartProfile) -> PathBuf {
    arg.map(Path::to_path_buf)
        .or_else(|| config.flash.image.clone())
        .unwrap_or_else(|| PathBuf::from(profile.default_image()))
}

/// Pick the baud rate: command line, then config, then the firmware default.
pub(crate) fn resolve_baud(cli_baud: Option<u32>, config: &Config) -> u32 {
    cli_baud
        .or(config.port.connection.baud)
        .unwrap_or(cartflash::port::DEFAULT_BAUD)
}

fn bar(len: u64, template: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb
}

/// Renders session progress as bars on a terminal, or as plain lines.
struct ProgressView {
    erase: ProgressBar,
    write: ProgressBar,
    plain: bool,
    last_permille: Option<u64>,
}

impl ProgressView {
    fn new(quiet: bool, profile: &DeviceProfile) -> Self {
        let fancy = !quiet && use_fancy_output();
        let (erase, write) = if fancy {
            (
                bar(
                    u64::from(profile.sector_count()),
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} sectors {msg}",
                ),
                bar(
                    u64::from(profile.total_size()),
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {msg}",
                ),
            )
        } else {
            (ProgressBar::hidden(), ProgressBar::hidden())
        };
        erase.set_message("erasing");
        Self {
            erase,
            write,
            plain: !quiet && !fancy,
            last_permille: None,
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn update(&mut self, progress: Progress) {
        match progress {
            Progress::Ready => debug!("Device ready"),
            Progress::Erased { sector, total } => {
                self.erase.set_position(u64::from(sector));
                if sector == total {
                    self.erase.finish_with_message("erased");
                }
                if self.plain {
                    eprintln!("{progress}");
                }
            },
            Progress::Written { address, .. } => {
                self.write.set_position(u64::from(address));
                self.write.set_message(progress.to_string());
                // Plain output only changes at 0.1% steps.
                let permille = (progress.percent() * 10.0) as u64;
                if self.plain && self.last_permille != Some(permille) {
                    self.last_permille = Some(permille);
                    eprintln!("{progress}");
                }
            },
        }
    }

    fn finish(&self) {
        self.write.finish();
    }

    fn abandon(&self) {
        self.erase.abandon();
        self.write.abandon();
    }
}

/// Flash command implementation.
pub(crate) fn cmd_flash(cli: &Cli, config: &Config, image: Option<&Path>) -> Result<()> {
    let cart = resolve_profile(cli.profile.map(CartProfile::from), config)?;
    let profile = cart.device_profile();
    let image_path = resolve_image_path(image, config, cart);

    let image = SourceImage::load_for(&image_path, &profile)
        .map_err(|e| CliError::Usage(format!("{e} (profile {cart})")))?;

    if !cli.quiet {
        eprintln!(
            "{} Loaded {} ({} bytes) for a {cart} cartridge",
            style("📦").cyan(),
            style(image_path.display()).bold(),
            image.len()
        );
    }

    let options = SerialOptions {
        port: cli.port.clone(),
        list_all_ports: cli.list_all_ports,
        non_interactive: cli.non_interactive,
    };
    let port = select_serial_port(&options, config)?;
    let baud = resolve_baud(cli.baud, config);
    ensure_not_interrupted()?;

    if !cli.quiet {
        eprintln!(
            "{} Using {} at {baud} baud, waiting for the programmer...",
            style("🔌").cyan(),
            style(&port.name).green()
        );
    }

    let serial = SerialConfig::new(&port.name).with_baud_rate(baud);
    let mut view = ProgressView::new(cli.quiet, &profile);

    let result = cartflash::session::flash(&serial, profile, &image, |p| view.update(p));
    match result {
        Ok(state) => {
            view.finish();
            debug!("Session finished: {}", state.phase());
        },
        Err(e) => {
            view.abandon();
            return Err(e).with_context(|| format!("Programming via {} failed", port.name));
        },
    }

    if !cli.quiet {
        eprintln!("\n{} Upload complete!", style("✓").green().bold());
    }

    Ok(())
}
