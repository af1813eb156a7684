//! `profiles` command.

use anyhow::{Context, Result};
use cartflash::{CartProfile, DeviceProfile};
use console::style;
use serde::Serialize;

/// One row of the profile table.
#[derive(Debug, Serialize)]
struct ProfileEntry {
    name: &'static str,
    class: String,
    default_image: &'static str,
    #[serde(flatten)]
    geometry: DeviceProfile,
}

impl From<CartProfile> for ProfileEntry {
    fn from(profile: CartProfile) -> Self {
        Self {
            name: profile.name(),
            class: profile.to_string(),
            default_image: profile.default_image(),
            geometry: profile.device_profile(),
        }
    }
}

fn entries() -> Vec<ProfileEntry> {
    CartProfile::ALL
        .into_iter()
        .map(ProfileEntry::from)
        .collect()
}

/// List the named cartridge profiles.
pub(crate) fn cmd_profiles(json: bool) -> Result<()> {
    if json {
        let out = serde_json::to_string_pretty(&entries()).context("Failed to encode profiles")?;
        println!("{out}");
        return Ok(());
    }

    for entry in entries() {
        println!(
            "{:<4} {:<10} {}  (default image: {})",
            style(entry.name).cyan().bold(),
            entry.class,
            entry.geometry,
            style(entry.default_image).dim()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_entries_json_shape() {
        let value = serde_json::to_value(entries()).unwrap();
        let rows = value.as_array().unwrap();
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0]["name"], "8k");
        assert_eq!(rows[0]["class"], "8K-class");
        assert_eq!(rows[0]["total_size"], 262_144);
        assert_eq!(rows[0]["sector_count"], 64);
        assert_eq!(rows[0]["chunk_size"], 64);
        assert_eq!(rows[0]["default_image"], "multicart.bin");

        assert_eq!(rows[1]["name"], "16k");
        assert_eq!(rows[1]["total_size"], 524_288);
        assert_eq!(rows[1]["sector_count"], 128);
    }
}
