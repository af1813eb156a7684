//! Serial port selection.
//!
//! Precedence is `--port`, then `port.connection.serial` from the config,
//! then discovery. Discovery narrows the list to likely programmer boards
//! unless `--list-all-ports` is given or none match. A single candidate is
//! used as is; several candidates need an interactive pick.

use {
    crate::{CliError, config::Config},
    anyhow::Result,
    cartflash::{DetectedPort, detect_ports},
    console::style,
    dialoguer::{Error as DialoguerError, Select, theme::ColorfulTheme},
    log::{debug, info},
    std::{cmp::Ordering, io::IsTerminal},
};

/// Options for serial port selection.
#[derive(Debug, Clone, Default)]
pub struct SerialOptions {
    /// Explicit port specified via CLI.
    pub port: Option<String>,
    /// Offer all ports, not only likely programmers.
    pub list_all_ports: bool,
    /// Fail instead of prompting.
    pub non_interactive: bool,
}

fn usage_err(message: &str) -> anyhow::Error {
    CliError::Usage(message.to_string()).into()
}

/// Select the port to program through.
pub fn select_serial_port(options: &SerialOptions, config: &Config) -> Result<DetectedPort> {
    if let Some(port_name) = &options.port {
        return Ok(find_port_by_name(port_name, detect_ports()));
    }

    if let Some(port_name) = &config
        .port
        .connection
        .serial
    {
        debug!("Using port from config: {port_name}");
        return Ok(find_port_by_name(port_name, detect_ports()));
    }

    let ports = detect_ports();
    if ports.is_empty() {
        return Err(usage_err("no serial ports found; connect the programmer or pass --port"));
    }

    let candidates = candidate_ports(ports, options.list_all_ports, config);

    if options.non_interactive {
        return select_non_interactive_port(candidates);
    }

    match candidates
        .len()
        .cmp(&1)
    {
        Ordering::Equal => auto_select(candidates),
        Ordering::Greater => {
            ensure_interactive_terminal()?;
            select_port_interactive(candidates, config)
        },
        Ordering::Less => Err(usage_err("no serial ports available")),
    }
}

/// Narrow discovered ports to likely programmers, unless none match.
fn candidate_ports(ports: Vec<DetectedPort>, list_all: bool, config: &Config) -> Vec<DetectedPort> {
    if list_all {
        return ports;
    }
    let known: Vec<DetectedPort> = ports
        .iter()
        .filter(|p| is_known_device(p, config))
        .cloned()
        .collect();
    if known.is_empty() { ports } else { known }
}

fn auto_select(candidates: Vec<DetectedPort>) -> Result<DetectedPort> {
    let port = candidates
        .into_iter()
        .next()
        .ok_or_else(|| usage_err("no serial ports available"))?;
    info!("Auto-selected port: {}", port.name);
    Ok(port)
}

fn select_non_interactive_port(candidates: Vec<DetectedPort>) -> Result<DetectedPort> {
    match candidates
        .len()
        .cmp(&1)
    {
        Ordering::Equal => auto_select(candidates),
        Ordering::Greater => Err(usage_err(
            "multiple serial ports found; pass --port in non-interactive mode",
        )),
        Ordering::Less => Err(usage_err("no serial ports available")),
    }
}

fn ensure_interactive_terminal() -> Result<()> {
    if std::io::stdin().is_terminal() && std::io::stderr().is_terminal() {
        Ok(())
    } else {
        Err(usage_err(
            "several serial ports found but no terminal to choose from; pass --port",
        ))
    }
}

fn map_prompt_error(err: DialoguerError) -> anyhow::Error {
    match err {
        DialoguerError::IO(io_err) => {
            if io_err.kind() == std::io::ErrorKind::Interrupted {
                CliError::Cancelled("port selection cancelled".to_string()).into()
            } else {
                usage_err(&format!("port prompt failed: {io_err}"))
            }
        },
    }
}

/// Look a port up by name, falling back to a bare entry for names the
/// enumerator does not report (e.g. symlinks).
fn find_port_by_name(name: &str, ports: Vec<DetectedPort>) -> DetectedPort {
    let mut fallback = None;
    for port in ports {
        if port.name == name {
            return port;
        }
        if fallback.is_none() && port.name.eq_ignore_ascii_case(name) {
            fallback = Some(port);
        }
    }
    fallback.unwrap_or_else(|| DetectedPort::named(name))
}

/// Check if a port looks like a programmer (built-in list or config).
fn is_known_device(port: &DetectedPort, config: &Config) -> bool {
    if port.is_likely_programmer() {
        return true;
    }
    match (port.vid, port.pid) {
        (Some(vid), Some(pid)) => config.is_configured_device(vid, pid),
        _ => false,
    }
}

fn port_label(port: &DetectedPort, config: &Config) -> String {
    let name = if is_known_device(port, config) {
        style(&port.name)
            .bold()
            .to_string()
    } else {
        port.name
            .clone()
    };

    let device_info = if port
        .device
        .is_known()
    {
        format!(" [{}]", style(port.device.name()).yellow())
    } else if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
        format!(" ({vid:04X}:{pid:04X})")
    } else {
        String::new()
    };

    let product = port
        .product
        .as_ref()
        .map(|p| format!(" - {}", style(p).dim()))
        .unwrap_or_default();

    format!("{name}{device_info}{product}")
}

fn select_port_interactive(mut ports: Vec<DetectedPort>, config: &Config) -> Result<DetectedPort> {
    eprintln!(
        "{} Found {} serial ports",
        style("ℹ").blue(),
        ports.len()
    );

    ports.sort_by_key(|p| !is_known_device(p, config));

    // Keep each label on one line in narrow terminals.
    let term_width = console::Term::stderr()
        .size()
        .1 as usize;
    let max_item_width = term_width.saturating_sub(4);
    let labels: Vec<String> = ports
        .iter()
        .map(|p| console::truncate_str(&port_label(p, config), max_item_width, "\u{2026}").into_owned())
        .collect();

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select the programmer port")
        .items(&labels)
        .default(0)
        .interact_opt()
        .map_err(map_prompt_error)?;

    match selection {
        Some(index) => ports
            .into_iter()
            .nth(index)
            .ok_or_else(|| anyhow::anyhow!("Invalid port index: {index}")),
        None => Err(CliError::Cancelled("port selection cancelled".to_string()).into()),
    }
}
