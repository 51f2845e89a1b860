// CLASSIFICATION: COMMUNITY
// Filename: platform.rs v0.3
// Author: Lukas Bower
// Date Modified: 2026-04-03

//! Registry of platform bus devices seen on the uevent stream.

use log::debug;

/// One registered platform bus device.
#[derive(Debug, Clone)]
pub struct PlatformNode {
    /// Path with the `/devices/` and optional `platform/` prefixes
    /// stripped; used as the symlink directory name.
    pub name: String,
    /// Full sysfs device path.
    pub path: String,
}

/// Append-ordered collection of platform devices. Lookups scan newest
/// first so a more specific (or re-announced) bus wins over a stale
/// one sharing the same prefix.
#[derive(Debug, Default)]
pub struct PlatformRegistry {
    nodes: Vec<PlatformNode>,
}

impl PlatformRegistry {
    /// Record a platform device from its `add` uevent.
    pub fn register(&mut self, path: &str) {
        let mut name = path;
        if let Some(rest) = name.strip_prefix("/devices/") {
            name = rest;
            if let Some(rest) = name.strip_prefix("platform/") {
                name = rest;
            }
        }
        debug!("adding platform device {name} ({path})");
        self.nodes.push(PlatformNode {
            name: name.to_string(),
            path: path.to_string(),
        });
    }

    /// Drop the device whose full path matches exactly. No-op when the
    /// path was never registered.
    pub fn unregister(&mut self, path: &str) {
        if let Some(pos) = self.nodes.iter().rposition(|n| n.path == path) {
            debug!("removing platform device {}", self.nodes[pos].name);
            self.nodes.remove(pos);
        }
    }

    /// Find the platform device owning `path`: the most recently
    /// registered node whose path is a proper prefix of `path` with a
    /// `/` right after it.
    pub fn find(&self, path: &str) -> Option<&PlatformNode> {
        self.nodes.iter().rev().find(|n| {
            path.len() > n.path.len()
                && path.as_bytes()[n.path.len()] == b'/'
                && path.starts_with(n.path.as_str())
        })
    }
}
