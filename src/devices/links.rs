// CLASSIFICATION: COMMUNITY
// Filename: links.rs v0.6
// Author: Lukas Bower
// Date Modified: 2026-04-03

//! Canonical /dev path and symlink synthesis per subsystem.
//!
//! Symlink parents are created here, up front; the node layer only
//! ever creates the objects themselves.

use log::debug;

use crate::config::DevdConfig;

use super::node::{make_dir, make_dir_chain, SecurityLabeler};
use super::platform::PlatformRegistry;
use super::uevent::Uevent;

/// Node names longer than this are refused.
const DEVICE_NAME_MAX: usize = 64;

/// Last path component of the event's device path, usable as a node
/// name. `None` when the event carries no device node (no major/minor)
/// or the name is unusable.
pub fn device_basename<'a>(ev: &Uevent<'a>) -> Option<&'a str> {
    if ev.major < 0 || ev.minor < 0 {
        return None;
    }
    let idx = ev.path.rfind('/')?;
    let name = &ev.path[idx + 1..];
    if name.is_empty() || name.len() > DEVICE_NAME_MAX {
        return None;
    }
    Some(name)
}

/// Replace bytes unsafe in a path component; anything outside
/// `[A-Za-z0-9_.-]` becomes `_`.
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Canonical path for a block device node.
pub fn block_device_path(cfg: &DevdConfig, labeler: &dyn SecurityLabeler, name: &str) -> String {
    make_dir(labeler, &format!("{}/block", cfg.dev_root), 0o755);
    format!("{}/block/{name}", cfg.dev_root)
}

/// Stable aliases for a block device hanging off a platform bus node:
/// `by-name/<sanitized partition name>`, `by-num/p<partition number>`
/// and the raw kernel name, each under
/// `<dev_root>/block/platform/<platform-name>/` and, when the boot
/// device alias is enabled, replicated under
/// `<dev_root>/block/bootdevice/`.
pub fn platform_block_links(
    cfg: &DevdConfig,
    labeler: &dyn SecurityLabeler,
    platforms: &PlatformRegistry,
    ev: &Uevent,
) -> Vec<String> {
    let pdev = match platforms.find(ev.path) {
        Some(p) => p,
        None => return Vec::new(),
    };
    debug!("found platform device {}", pdev.name);

    let link_root = format!("{}/block/platform/{}", cfg.dev_root, pdev.name);
    let boot_root = cfg
        .boot_device
        .as_ref()
        .map(|_| format!("{}/block/bootdevice", cfg.dev_root));

    if let (Some(target), Some(alias)) = (&cfg.boot_device, &boot_root) {
        // alias root points at the owning platform directory; the
        // replicated links below resolve through it
        make_dir(labeler, &format!("{}/block", cfg.dev_root), 0o755);
        let _ = std::os::unix::fs::symlink(format!("{}/block/{target}", cfg.dev_root), alias);
    }

    let from = cfg.dev_root.len() + 1;
    let mut links = Vec::new();
    let mut push = |link: String| {
        make_dir_chain(labeler, &link, from);
        links.push(link);
    };

    if let Some(pname) = ev.partition_name {
        let clean = sanitize(pname);
        if clean != pname {
            debug!("linking partition '{pname}' as '{clean}'");
        }
        push(format!("{link_root}/by-name/{clean}"));
        if let Some(boot) = &boot_root {
            push(format!("{boot}/by-name/{clean}"));
        }
    }

    if ev.partition_num >= 0 {
        push(format!("{link_root}/by-num/p{}", ev.partition_num));
        if let Some(boot) = &boot_root {
            push(format!("{boot}/by-num/p{}", ev.partition_num));
        }
    }

    if let Some(idx) = ev.path.rfind('/') {
        let base = &ev.path[idx + 1..];
        push(format!("{link_root}/{base}"));
        if let Some(boot) = &boot_root {
            push(format!("{boot}/{base}"));
        }
    }

    links
}

/// Alias for a platform-parented USB character device, derived from
/// the interface segment two hops past the platform prefix (root hub,
/// then device). Any structural miss yields no alias.
pub fn usb_char_links(
    cfg: &DevdConfig,
    labeler: &dyn SecurityLabeler,
    platforms: &PlatformRegistry,
    ev: &Uevent,
) -> Vec<String> {
    let pdev = match platforms.find(ev.path) {
        Some(p) => p,
        None => return Vec::new(),
    };
    let rest = &ev.path[pdev.path.len()..];
    if !rest.starts_with("/usb") {
        return Vec::new();
    }

    // "/<hub>/<device>/<interface>/..." -- the interface segment must
    // be non-empty and followed by at least one more '/'
    let mut segs = rest.splitn(5, '/');
    segs.next(); // empty slot before the leading '/'
    let _hub = segs.next();
    let _device = segs.next();
    let interface = match segs.next() {
        Some(s) if !s.is_empty() => s,
        _ => return Vec::new(),
    };
    if segs.next().is_none() {
        return Vec::new();
    }

    make_dir(labeler, &format!("{}/usb", cfg.dev_root), 0o755);
    vec![format!("{}/usb/{}{interface}", cfg.dev_root, ev.subsystem)]
}

/// Canonical path for a non-block device node, creating subsystem
/// directories on demand. `None` means the event is ignored.
pub fn char_device_path(
    cfg: &DevdConfig,
    labeler: &dyn SecurityLabeler,
    ev: &Uevent,
    name: &str,
) -> Option<String> {
    let dev = &cfg.dev_root;

    if ev.subsystem.starts_with("usb") {
        // only the bare usb subsystem produces nodes
        if ev.subsystem != "usb" {
            return None;
        }
        return Some(match ev.device_name {
            Some(dn) => {
                // node name chosen by the kernel, directories included
                let devpath = format!("{dev}/{dn}");
                make_dir_chain(labeler, &devpath, dev.len() + 1);
                devpath
            }
            None => {
                // devfs-style bus numbering: minors in groups of 128
                let bus_id = ev.minor / 128 + 1;
                let device_id = ev.minor % 128 + 1;
                let devpath = format!("{dev}/bus/usb/{bus_id:03}/{device_id:03}");
                make_dir_chain(labeler, &devpath, dev.len() + 1);
                devpath
            }
        });
    }

    let (base, name) = if ev.subsystem.starts_with("graphics") {
        ("graphics", name)
    } else if ev.subsystem.starts_with("drm") {
        ("dri", name)
    } else if ev.subsystem.starts_with("oncrpc") {
        ("oncrpc", name)
    } else if ev.subsystem.starts_with("adsp") {
        ("adsp", name)
    } else if ev.subsystem.starts_with("msm_camera") {
        ("msm_camera", name)
    } else if ev.subsystem.starts_with("input") {
        ("input", name)
    } else if ev.subsystem.starts_with("mtd") {
        ("mtd", name)
    } else if ev.subsystem.starts_with("sound") {
        ("snd", name)
    } else if ev.subsystem.starts_with("misc") && name.starts_with("log_") {
        ("log", &name[4..])
    } else {
        return Some(format!("{dev}/{name}"));
    };

    make_dir(labeler, &format!("{dev}/{base}"), 0o755);
    Some(format!("{dev}/{base}/{name}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::node::NullLabeler;

    fn ev<'a>(path: &'a str, subsystem: &'a str) -> Uevent<'a> {
        Uevent {
            action: "add",
            path,
            subsystem,
            firmware: "",
            partition_name: None,
            device_name: None,
            partition_num: -1,
            major: 8,
            minor: 1,
        }
    }

    fn test_cfg() -> (tempfile::TempDir, DevdConfig) {
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = DevdConfig::default();
        cfg.dev_root = tmp.path().to_str().unwrap().to_string();
        (tmp, cfg)
    }

    #[test]
    fn sanitize_strips_unsafe_bytes() {
        assert_eq!(sanitize("SYSTEM!"), "SYSTEM_");
        assert_eq!(sanitize("boot"), "boot");
        assert_eq!(sanitize("a/b c"), "a_b_c");
        assert_eq!(sanitize("p_1-x.img"), "p_1-x.img");
    }

    #[test]
    fn basename_requires_major_minor_and_slash() {
        let mut e = ev("/devices/virtual/tty/tty0", "tty");
        assert_eq!(device_basename(&e), Some("tty0"));
        e.major = -1;
        assert_eq!(device_basename(&e), None);
        let e = ev("no-slash", "tty");
        assert_eq!(device_basename(&e), None);
        let long = format!("/devices/{}", "x".repeat(65));
        let e = ev(&long, "tty");
        assert_eq!(device_basename(&e), None);
    }

    #[test]
    fn usb_legacy_numbering_splits_minor() {
        let (_tmp, cfg) = test_cfg();
        let mut e = ev("/devices/platform/usb/002", "usb");
        e.minor = 130;
        let path = char_device_path(&cfg, &NullLabeler, &e, "002").unwrap();
        assert_eq!(path, format!("{}/bus/usb/002/003", cfg.dev_root));
        assert!(std::path::Path::new(&format!("{}/bus/usb/002", cfg.dev_root)).is_dir());
    }

    #[test]
    fn usb_kernel_device_name_is_used_verbatim() {
        let (_tmp, cfg) = test_cfg();
        let mut e = ev("/devices/platform/usb/x", "usb");
        e.device_name = Some("bus/usb/001/007");
        let path = char_device_path(&cfg, &NullLabeler, &e, "x").unwrap();
        assert_eq!(path, format!("{}/bus/usb/001/007", cfg.dev_root));
        assert!(std::path::Path::new(&format!("{}/bus/usb/001", cfg.dev_root)).is_dir());
    }

    #[test]
    fn non_bare_usb_subsystems_are_ignored() {
        let (_tmp, cfg) = test_cfg();
        let e = ev("/devices/platform/usb/x", "usb_device");
        assert!(char_device_path(&cfg, &NullLabeler, &e, "x").is_none());
    }

    #[test]
    fn subsystem_directory_table() {
        let (_tmp, cfg) = test_cfg();
        let dev = cfg.dev_root.clone();
        for (subsystem, name, want) in [
            ("graphics", "fb0", format!("{dev}/graphics/fb0")),
            ("drm", "card0", format!("{dev}/dri/card0")),
            ("input", "event3", format!("{dev}/input/event3")),
            ("sound", "pcmC0D0p", format!("{dev}/snd/pcmC0D0p")),
            ("misc", "log_main", format!("{dev}/log/main")),
            ("misc", "uinput", format!("{dev}/uinput")),
            ("tty", "tty0", format!("{dev}/tty0")),
        ] {
            let e = ev("/devices/whatever/x", subsystem);
            assert_eq!(
                char_device_path(&cfg, &NullLabeler, &e, name).as_deref(),
                Some(want.as_str())
            );
        }
    }

    #[test]
    fn platform_block_links_by_name_and_num() {
        let (_tmp, cfg) = test_cfg();
        let mut platforms = PlatformRegistry::default();
        platforms.register("/devices/platform/msm_sdcc.1");

        let mut e = ev("/devices/platform/msm_sdcc.1/mmc_host/mmcblk0p3", "block");
        e.partition_name = Some("SYSTEM!");
        e.partition_num = 3;
        let links = platform_block_links(&cfg, &NullLabeler, &platforms, &e);
        let root = format!("{}/block/platform/msm_sdcc.1", cfg.dev_root);
        assert_eq!(
            links,
            vec![
                format!("{root}/by-name/SYSTEM_"),
                format!("{root}/by-num/p3"),
                format!("{root}/mmcblk0p3"),
            ]
        );
        assert!(std::path::Path::new(&format!("{root}/by-name")).is_dir());
    }

    #[test]
    fn missing_partition_info_omits_those_links() {
        let (_tmp, cfg) = test_cfg();
        let mut platforms = PlatformRegistry::default();
        platforms.register("/devices/platform/msm_sdcc.1");
        let e = ev("/devices/platform/msm_sdcc.1/mmc_host/mmcblk0", "block");
        let links = platform_block_links(&cfg, &NullLabeler, &platforms, &e);
        assert_eq!(
            links,
            vec![format!(
                "{}/block/platform/msm_sdcc.1/mmcblk0",
                cfg.dev_root
            )]
        );
    }

    #[test]
    fn bootdevice_alias_replicates_links() {
        let (_tmp, mut cfg) = test_cfg();
        cfg.boot_device = Some("platform/msm_sdcc.1".into());
        let mut platforms = PlatformRegistry::default();
        platforms.register("/devices/platform/msm_sdcc.1");
        let mut e = ev("/devices/platform/msm_sdcc.1/mmc_host/mmcblk0p2", "block");
        e.partition_num = 2;
        let links = platform_block_links(&cfg, &NullLabeler, &platforms, &e);
        let boot = format!("{}/block/bootdevice", cfg.dev_root);
        assert!(links.contains(&format!("{boot}/by-num/p2")));
        assert!(links.contains(&format!("{boot}/mmcblk0p2")));
    }

    #[test]
    fn no_platform_parent_no_links() {
        let (_tmp, cfg) = test_cfg();
        let platforms = PlatformRegistry::default();
        let e = ev("/devices/virtual/block/loop0", "block");
        assert!(platform_block_links(&cfg, &NullLabeler, &platforms, &e).is_empty());
    }

    #[test]
    fn usb_char_alias_walks_hub_and_device_segments() {
        let (_tmp, cfg) = test_cfg();
        let mut platforms = PlatformRegistry::default();
        platforms.register("/devices/platform/msm_hsusb_host.0");
        let e = ev(
            "/devices/platform/msm_hsusb_host.0/usb1/1-1/1-1:1.0/ttyUSB0",
            "tty",
        );
        let links = usb_char_links(&cfg, &NullLabeler, &platforms, &e);
        assert_eq!(links, vec![format!("{}/usb/tty1-1:1.0", cfg.dev_root)]);
    }

    #[test]
    fn usb_char_alias_structural_misses_yield_nothing() {
        let (_tmp, cfg) = test_cfg();
        let mut platforms = PlatformRegistry::default();
        platforms.register("/devices/platform/msm_hsusb_host.0");

        // not under /usb
        let e = ev("/devices/platform/msm_hsusb_host.0/i2c/dev0", "tty");
        assert!(usb_char_links(&cfg, &NullLabeler, &platforms, &e).is_empty());

        // interface segment missing
        let e = ev("/devices/platform/msm_hsusb_host.0/usb1/1-1", "tty");
        assert!(usb_char_links(&cfg, &NullLabeler, &platforms, &e).is_empty());

        // no trailing segment after the interface
        let e = ev("/devices/platform/msm_hsusb_host.0/usb1/1-1/1-1:1.0", "tty");
        assert!(usb_char_links(&cfg, &NullLabeler, &platforms, &e).is_empty());
    }
}
