// CLASSIFICATION: COMMUNITY
// Filename: node.rs v0.6
// Author: Lukas Bower
// Date Modified: 2026-04-03

//! Device node and symlink lifecycle: mknod, chown, link, unlink.
//!
//! Every filesystem failure here is logged and skipped; one broken
//! node or link never stops the remaining work for the same event.

use std::ffi::CString;
use std::fs;
use std::io;

use log::{debug, warn};

use super::perms::PermissionRules;

/// Security labeling seam. The trampoline plugs its SELinux handle in
/// here; the default assigns no contexts.
pub trait SecurityLabeler: Send + Sync {
    /// Arm the label that the next filesystem object created at `path`
    /// should carry.
    fn set_create_label(&self, path: &str, mode: u32);
    /// Disarm any pending creation label.
    fn clear_label(&self);
}

/// Labeler that assigns no contexts.
#[derive(Debug, Default)]
pub struct NullLabeler;

impl SecurityLabeler for NullLabeler {
    fn set_create_label(&self, _path: &str, _mode: u32) {}
    fn clear_label(&self) {}
}

/// Scoped effective-gid switch. Restores the previous egid on every
/// exit path, including early returns on error.
struct EgidGuard {
    saved: libc::gid_t,
}

impl EgidGuard {
    fn switch(gid: u32) -> Self {
        let saved = unsafe { libc::getegid() };
        if unsafe { libc::setegid(gid) } < 0 {
            debug!("setegid({gid}) failed: {}", io::Error::last_os_error());
        }
        EgidGuard { saved }
    }
}

impl Drop for EgidGuard {
    fn drop(&mut self) {
        unsafe { libc::setegid(self.saved) };
    }
}

/// Create one directory, ignoring "already exists".
pub fn make_dir(labeler: &dyn SecurityLabeler, path: &str, mode: u32) {
    let cpath = match CString::new(path) {
        Ok(c) => c,
        Err(_) => return,
    };
    labeler.set_create_label(path, libc::S_IFDIR | mode);
    let rc = unsafe { libc::mkdir(cpath.as_ptr(), mode as libc::mode_t) };
    labeler.clear_label();
    if rc < 0 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EEXIST) {
            debug!("mkdir {path} failed: {err}");
        }
    }
}

/// Create every missing directory component of `path` past byte
/// offset `from`. The final component is taken to be a node or link
/// name and is not created.
pub fn make_dir_chain(labeler: &dyn SecurityLabeler, path: &str, from: usize) {
    let bytes = path.as_bytes();
    for i in from..bytes.len() {
        if bytes[i] == b'/' {
            make_dir(labeler, &path[..i], 0o755);
        }
    }
}

/// Create the device special file with resolved ownership and mode.
///
/// The gid is set by switching the effective gid around mknod so the
/// node never exists without its owning group; the uid has to follow
/// via chown since the node must exist before ownership can change.
fn make_device(
    rules: &PermissionRules,
    labeler: &dyn SecurityLabeler,
    path: &str,
    block: bool,
    major: i32,
    minor: i32,
) {
    let (perm, uid, gid) = rules.resolve_device_perm(path);
    let mode = perm | if block { libc::S_IFBLK } else { libc::S_IFCHR };
    let cpath = match CString::new(path) {
        Ok(c) => c,
        Err(_) => return,
    };
    labeler.set_create_label(path, mode);
    let dev = libc::makedev(major as libc::c_uint, minor as libc::c_uint);
    {
        let _egid = EgidGuard::switch(gid);
        if unsafe { libc::mknod(cpath.as_ptr(), mode as libc::mode_t, dev) } < 0 {
            warn!("mknod {path} failed: {}", io::Error::last_os_error());
        }
        // gid already correct; leave it untouched
        if unsafe { libc::chown(cpath.as_ptr(), uid, libc::gid_t::MAX) } < 0 {
            debug!("chown {path} failed: {}", io::Error::last_os_error());
        }
    }
    labeler.clear_label();
}

/// Symlink `link` -> `target`. Parent directories are expected to
/// exist already.
fn make_link(target: &str, link: &str) {
    if let Err(err) = std::os::unix::fs::symlink(target, link) {
        if err.kind() != io::ErrorKind::AlreadyExists {
            warn!("symlink {link} -> {target} failed: {err}");
        }
    }
}

/// Remove `link` only if it still points at `target`.
fn remove_link(target: &str, link: &str) {
    match fs::read_link(link) {
        Ok(dest) if dest.as_os_str() == target => {
            let _ = fs::remove_file(link);
        }
        _ => {}
    }
}

/// Apply one add/remove action to a device node and its symlinks.
/// Unknown actions are ignored.
pub fn handle_device(
    rules: &PermissionRules,
    labeler: &dyn SecurityLabeler,
    action: &str,
    devpath: &str,
    block: bool,
    major: i32,
    minor: i32,
    links: &[String],
) {
    if action == "add" {
        make_device(rules, labeler, devpath, block, major, minor);
        for link in links {
            make_link(devpath, link);
        }
    }

    if action == "remove" {
        for link in links {
            remove_link(devpath, link);
        }
        let _ = fs::remove_file(devpath);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn make_dir_chain_builds_all_parents() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().to_str().unwrap().to_string();
        let node = format!("{root}/bus/usb/002/003");
        make_dir_chain(&NullLabeler, &node, root.len() + 1);
        assert!(std::path::Path::new(&format!("{root}/bus/usb/002")).is_dir());
        assert!(!std::path::Path::new(&node).exists());
    }

    #[test]
    fn links_are_created_and_only_matching_links_removed() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().to_str().unwrap().to_string();
        let target = format!("{root}/mmcblk0p1");
        let link = format!("{root}/by-name-cache");
        fs::write(&target, b"").unwrap();

        make_link(&target, &link);
        assert_eq!(fs::read_link(&link).unwrap().to_str().unwrap(), target);

        // pointing elsewhere: left alone
        remove_link("/somewhere/else", &link);
        assert!(fs::symlink_metadata(&link).is_ok());

        remove_link(&target, &link);
        assert!(fs::symlink_metadata(&link).is_err());
    }

    #[test]
    fn remove_for_absent_node_is_a_quiet_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let devpath = format!("{}/nonexistent", tmp.path().to_str().unwrap());
        let rules = PermissionRules::default();
        handle_device(&rules, &NullLabeler, "remove", &devpath, false, -1, -1, &[]);
        assert!(!std::path::Path::new(&devpath).exists());
    }

    #[test]
    fn unknown_action_touches_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let devpath = format!("{}/node", tmp.path().to_str().unwrap());
        let rules = PermissionRules::default();
        handle_device(&rules, &NullLabeler, "change", &devpath, false, 1, 3, &[]);
        assert!(!std::path::Path::new(&devpath).exists());
    }
}
