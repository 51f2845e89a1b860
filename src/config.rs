// CLASSIFICATION: COMMUNITY
// Filename: config.rs v0.4
// Author: Lukas Bower
// Date Modified: 2026-04-03

//! Daemon configuration for the device manager.
//!
//! Loaded from a TOML file (default `/etc/devd.conf`, overridable via
//! `DEVD_CONF`). A missing or unparseable file falls back to built-in
//! defaults. The dev/sys roots honour `DEVD_DEV_ROOT` and
//! `DEVD_SYS_ROOT` so the whole manager can be pointed at a scratch
//! tree.

use std::env;
use std::fs;

use log::warn;
use serde::Deserialize;

use crate::devices::perms::PermRule;

/// Device manager configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DevdConfig {
    /// Root of the device hierarchy the manager materializes.
    pub dev_root: String,
    /// Root of the kernel sysfs mount.
    pub sys_root: String,
    /// Coldboot trigger paths. An entry ending in `/*` is recursed.
    pub seed_paths: Vec<String>,
    /// Platform directory the `block/bootdevice` alias points at.
    /// When set, every platform block symlink is replicated under the
    /// alias root.
    pub boot_device: Option<String>,
    /// Search roots for firmware blobs. Empty means every load request
    /// is answered with a failure, which is the shipped configuration.
    pub firmware_dirs: Vec<String>,
    /// Sysfs attribute ownership/mode fixups, applied in order.
    pub sysfs_rules: Vec<PermRule>,
    /// Device node ownership/mode rules; later entries override
    /// earlier ones.
    pub device_rules: Vec<PermRule>,
}

impl Default for DevdConfig {
    fn default() -> Self {
        Self {
            dev_root: env::var("DEVD_DEV_ROOT").unwrap_or_else(|_| "/dev".into()),
            sys_root: env::var("DEVD_SYS_ROOT").unwrap_or_else(|_| "/sys".into()),
            seed_paths: Vec::new(),
            boot_device: None,
            firmware_dirs: Vec::new(),
            sysfs_rules: Vec::new(),
            device_rules: Vec::new(),
        }
    }
}

impl DevdConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml(data: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(data)
    }
}

/// Load the daemon configuration, falling back to defaults.
pub fn load() -> DevdConfig {
    let path = env::var("DEVD_CONF").unwrap_or_else(|_| "/etc/devd.conf".into());
    match fs::read_to_string(&path)
        .ok()
        .and_then(|data| toml::from_str(&data).ok())
    {
        Some(cfg) => cfg,
        None => {
            warn!("[devd] missing or invalid {path}; using defaults");
            DevdConfig::default()
        }
    }
}
