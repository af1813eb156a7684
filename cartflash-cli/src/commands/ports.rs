//! `list-ports` command.

use anyhow::{Context, Result};
use cartflash::{DetectedPort, detect_ports};
use console::style;
use serde_json::{Value, json};

fn port_json(port: &DetectedPort) -> Value {
    json!({
        "name": port.name,
        "device": port.device.name(),
        "known": port.device.is_known(),
        "likely_programmer": port.is_likely_programmer(),
        "vid": port.vid,
        "pid": port.pid,
        "manufacturer": port.manufacturer,
        "product": port.product,
        "serial": port.serial,
    })
}

/// List serial ports, marking the ones that look like programmers.
pub(crate) fn cmd_list_ports(json: bool) -> Result<()> {
    let detected = detect_ports();

    if json {
        let ports: Vec<Value> = detected
            .iter()
            .map(port_json)
            .collect();
        let out = serde_json::to_string_pretty(&ports).context("Failed to encode port list")?;
        println!("{out}");
        return Ok(());
    }

    eprintln!("{}", style("Serial ports").bold().underlined());

    if detected.is_empty() {
        eprintln!("  {}", style("(none found)").dim());
        return Ok(());
    }

    for port in &detected {
        let marker = if port.is_likely_programmer() {
            style("•").green()
        } else {
            style("•").dim()
        };
        let device_type = if port.device.is_known() {
            format!(" [{}]", style(port.device.name()).yellow())
        } else {
            String::new()
        };
        let vid_pid = match (port.vid, port.pid) {
            (Some(vid), Some(pid)) => format!(" ({vid:04X}:{pid:04X})"),
            _ => String::new(),
        };
        let product = port
            .product
            .as_deref()
            .map(|p| format!(" - {}", style(p).dim()))
            .unwrap_or_default();

        eprintln!(
            "  {marker} {}{device_type}{vid_pid}{product}",
            style(&port.name).cyan()
        );
    }

    Ok(())
}
