// CLASSIFICATION: COMMUNITY
// Filename: firmware.rs v0.4
// Author: Lukas Bower
// Date Modified: 2026-04-03

//! Kernel firmware load requests, answered from a forked child.
//!
//! The fork keeps the blob copy (and its allocations) out of the
//! long-lived manager process; the parent never waits on the child.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};

use log::{debug, info, warn};

use crate::config::DevdConfig;

use super::uevent::Uevent;

/// Fork off a loader for a firmware `add` event. Anything else is
/// ignored.
pub fn handle_firmware_event(cfg: &DevdConfig, ev: &Uevent) {
    if ev.subsystem != "firmware" || ev.action != "add" {
        return;
    }

    let pid = unsafe { libc::fork() };
    if pid == 0 {
        process_firmware_event(cfg, ev);
        unsafe { libc::_exit(libc::EXIT_SUCCESS) };
    } else if pid < 0 {
        warn!(
            "could not fork to process firmware event: {}",
            io::Error::last_os_error()
        );
    }
}

/// Talk the kernel's loading/data protocol: `1` starts the transfer,
/// the blob streams into `data`, `0` completes it and `-1` aborts.
fn process_firmware_event(cfg: &DevdConfig, ev: &Uevent) {
    debug!("firmware: loading '{}' for '{}'", ev.firmware, ev.path);

    let root = format!("{}{}/", cfg.sys_root, ev.path);
    let mut loading = match OpenOptions::new().write(true).open(format!("{root}loading")) {
        Ok(f) => f,
        Err(_) => return,
    };
    let mut data = match OpenOptions::new().write(true).open(format!("{root}data")) {
        Ok(f) => f,
        Err(_) => return,
    };

    let mut source = None;
    for dir in &cfg.firmware_dirs {
        if let Ok(f) = File::open(format!("{dir}/{}", ev.firmware)) {
            source = Some(f);
            break;
        }
    }

    match source {
        Some(mut fw) => {
            let _ = loading.write_all(b"1");
            match io::copy(&mut fw, &mut data) {
                Ok(_) => {
                    let _ = loading.write_all(b"0");
                    info!("firmware: copy success {{ '{root}', '{}' }}", ev.firmware);
                }
                Err(err) => {
                    let _ = loading.write_all(b"-1");
                    info!(
                        "firmware: copy failure {{ '{root}', '{}' }}: {err}",
                        ev.firmware
                    );
                }
            }
        }
        None => {
            info!("firmware: could not open '{}'", ev.firmware);
            let _ = loading.write_all(b"-1");
        }
    }
}
