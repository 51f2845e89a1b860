// CLASSIFICATION: COMMUNITY
// Filename: perms.rs v0.4
// Author: Lukas Bower
// Date Modified: 2026-04-03

//! Ownership and mode rules for sysfs attributes and device nodes.

use std::ffi::CString;

use log::{debug, warn};
use serde::Deserialize;

/// Composed fixup paths longer than this are skipped, never truncated.
const FIXUP_PATH_MAX: usize = 512;

/// A single ownership/mode rule. `attr` present selects the sysfs
/// attribute table; absent, the device-node table.
#[derive(Debug, Clone, Deserialize)]
pub struct PermRule {
    pub pattern: String,
    #[serde(default)]
    pub attr: Option<String>,
    pub mode: u32,
    #[serde(default)]
    pub uid: u32,
    #[serde(default)]
    pub gid: u32,
    #[serde(default)]
    pub is_prefix: bool,
}

/// The two ordered rule tables. Registration order is precedence
/// order: sysfs rules all apply in order, device rules are searched in
/// reverse so later registrations override earlier ones.
#[derive(Debug, Default)]
pub struct PermissionRules {
    sys: Vec<PermRule>,
    dev: Vec<PermRule>,
}

impl PermissionRules {
    pub fn add(&mut self, rule: PermRule) {
        if rule.attr.is_some() {
            self.sys.push(rule);
        } else {
            self.dev.push(rule);
        }
    }

    /// Sysfs attribute paths (relative to the sysfs root) that match
    /// `upath`, with the ownership to apply. Sysfs rule patterns carry
    /// a leading `/sys` which upaths from the kernel do not.
    pub fn sysfs_matches(&self, upath: &str) -> Vec<(String, u32, u32, u32)> {
        let mut out = Vec::new();
        for rule in &self.sys {
            let pat = rule
                .pattern
                .strip_prefix("/sys")
                .unwrap_or(rule.pattern.as_str());
            let matched = if rule.is_prefix {
                upath.starts_with(pat)
            } else {
                upath == pat
            };
            if !matched {
                continue;
            }
            let attr = rule.attr.as_deref().unwrap_or("");
            if upath.len() + attr.len() + 6 > FIXUP_PATH_MAX {
                continue;
            }
            out.push((format!("{upath}/{attr}"), rule.uid, rule.gid, rule.mode));
        }
        out
    }

    /// Apply every matching sysfs rule beneath `sys_root`.
    pub fn apply_sysfs_fixups(&self, sys_root: &str, upath: &str) {
        for (rel, uid, gid, mode) in self.sysfs_matches(upath) {
            let path = format!("{sys_root}{rel}");
            debug!("fixup {path} {uid} {gid} {mode:o}");
            chown_chmod(&path, uid, gid, mode);
        }
    }

    /// Resolve ownership and mode for a device node path. Last
    /// registered match wins; default 0600 root:root.
    pub fn resolve_device_perm(&self, path: &str) -> (u32, u32, u32) {
        for rule in self.dev.iter().rev() {
            let matched = if rule.is_prefix {
                path.starts_with(rule.pattern.as_str())
            } else {
                path == rule.pattern
            };
            if matched {
                return (rule.mode, rule.uid, rule.gid);
            }
        }
        (0o600, 0, 0)
    }
}

fn chown_chmod(path: &str, uid: u32, gid: u32, mode: u32) {
    let cpath = match CString::new(path) {
        Ok(c) => c,
        Err(_) => return,
    };
    unsafe {
        if libc::chown(cpath.as_ptr(), uid, gid) < 0 {
            warn!(
                "chown {path} failed: {}",
                std::io::Error::last_os_error()
            );
        }
        if libc::chmod(cpath.as_ptr(), mode as libc::mode_t) < 0 {
            warn!(
                "chmod {path} failed: {}",
                std::io::Error::last_os_error()
            );
        }
    }
}
