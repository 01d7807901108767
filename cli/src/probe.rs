//! Local feature probes — thin producers of `Features` for `--discover`.
//!
//! Each probe reads one corner of procfs/sysfs and degrades to an absent
//! domain with a warning; discovery never fails the evaluation.
//!
//! Discovered features:
//!
//! - `kernel.loadedmodule` (keys) — module names from `/proc/modules`
//! - `kernel.version` (values) — `full`/`major`/`minor`/`revision` from
//!   `/proc/sys/kernel/osrelease`
//! - `storage.block` (instances) — one instance per `/sys/block` entry
//!   with `name`, `rotational`, `dax` and `zoned` attributes

use std::fs;
use std::io;
use std::path::Path;

use nodemark::{Features, InstanceFeature};

/// Probe the local node.
pub fn discover() -> Features {
    let mut features = Features::new();

    match loaded_modules() {
        Ok(modules) => features
            .domain_mut("kernel")
            .insert_keys("loadedmodule", modules),
        Err(e) => log::warn!("kernel module probe failed: {e}"),
    }

    match kernel_release() {
        Ok(release) => features
            .domain_mut("kernel")
            .insert_values("version", version_pairs(&release)),
        Err(e) => log::warn!("kernel version probe failed: {e}"),
    }

    match block_devices() {
        Ok(devices) => features
            .domain_mut("storage")
            .insert_instances("block", devices),
        Err(e) => log::warn!("block device probe failed: {e}"),
    }

    features
}

fn loaded_modules() -> io::Result<Vec<String>> {
    // One module per line, name first: "nvidia 56053760 421 ..."
    let content = fs::read_to_string("/proc/modules")?;
    Ok(content
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_owned)
        .collect())
}

fn kernel_release() -> io::Result<String> {
    let release = fs::read_to_string("/proc/sys/kernel/osrelease")?;
    Ok(release.trim().to_owned())
}

fn version_pairs(release: &str) -> Vec<(String, String)> {
    let mut pairs = vec![("full".to_owned(), release.to_owned())];

    // "6.8.4-custom" → major 6, minor 8, revision 4. Non-numeric suffixes
    // within a component ("4-custom") are stripped.
    let mut components = release.split('.');
    for name in ["major", "minor", "revision"] {
        let Some(component) = components.next() else {
            break;
        };
        let digits: String = component.chars().take_while(char::is_ascii_digit).collect();
        if digits.is_empty() {
            break;
        }
        pairs.push((name.to_owned(), digits));
    }

    pairs
}

fn block_devices() -> io::Result<Vec<InstanceFeature>> {
    let mut devices = Vec::new();

    for entry in fs::read_dir("/sys/block")? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let mut attributes = vec![("name".to_owned(), name)];

        for attribute in ["queue/rotational", "queue/dax", "queue/zoned"] {
            if let Some(value) = read_sysfs_attribute(&entry.path(), attribute) {
                let short = attribute.rsplit('/').next().unwrap_or(attribute);
                attributes.push((short.to_owned(), value));
            }
        }

        devices.push(attributes.into_iter().collect());
    }

    devices.sort_by(|a: &InstanceFeature, b: &InstanceFeature| {
        a.attribute("name").cmp(&b.attribute("name"))
    });
    Ok(devices)
}

fn read_sysfs_attribute(device: &Path, attribute: &str) -> Option<String> {
    let content = fs::read_to_string(device.join(attribute)).ok()?;
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_pairs_split_release_string() {
        let pairs = version_pairs("6.8.4-custom");
        assert!(pairs.contains(&("full".to_owned(), "6.8.4-custom".to_owned())));
        assert!(pairs.contains(&("major".to_owned(), "6".to_owned())));
        assert!(pairs.contains(&("minor".to_owned(), "8".to_owned())));
        assert!(pairs.contains(&("revision".to_owned(), "4".to_owned())));
    }

    #[test]
    fn version_pairs_stop_at_non_numeric_component() {
        let pairs = version_pairs("6.rc-custom");
        assert_eq!(pairs.len(), 2);
        assert!(pairs.contains(&("major".to_owned(), "6".to_owned())));
    }

    #[test]
    fn version_pairs_always_include_full() {
        assert_eq!(
            version_pairs(""),
            vec![("full".to_owned(), String::new())]
        );
    }
}
