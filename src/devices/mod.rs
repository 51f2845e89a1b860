// CLASSIFICATION: COMMUNITY
// Filename: mod.rs v0.8
// Author: Lukas Bower
// Date Modified: 2026-04-03

//! Uevent dispatch and the device manager lifecycle.
//!
//! `start()` runs one synchronous coldboot pass (re-announcing devices
//! that appeared before we were listening) and only then spawns the
//! polling thread, so callers never observe a partially populated
//! registry. `stop()` is observed within one poll interval.

pub mod firmware;
pub mod links;
pub mod node;
pub mod perms;
pub mod platform;
pub mod uevent;

use std::fs;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::debug;
use thiserror::Error;

use crate::config::DevdConfig;

use node::{NullLabeler, SecurityLabeler};
use perms::PermissionRules;
use platform::PlatformRegistry;
use uevent::{TransportError, Uevent, UeventSocket, UEVENT_MSG_LEN};

/// Poll cadence of the background dispatch thread.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Errors surfaced by the device manager's public lifecycle.
#[derive(Debug, Error)]
pub enum DevdError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("device manager already started")]
    AlreadyStarted,
    #[error("device manager is not running")]
    NotRunning,
}

/// State shared between the coldboot pass and the polling thread.
struct DeviceState {
    cfg: DevdConfig,
    rules: PermissionRules,
    labeler: Box<dyn SecurityLabeler>,
    platforms: Mutex<PlatformRegistry>,
}

/// The uevent-driven /dev manager.
pub struct DeviceManager {
    state: Arc<DeviceState>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    started: bool,
}

impl DeviceManager {
    /// Build a manager with no security labeling.
    pub fn new(cfg: DevdConfig) -> Self {
        Self::with_labeler(cfg, Box::new(NullLabeler))
    }

    /// Build a manager with an externally supplied labeler.
    pub fn with_labeler(cfg: DevdConfig, labeler: Box<dyn SecurityLabeler>) -> Self {
        let mut rules = PermissionRules::default();
        for rule in cfg.sysfs_rules.iter().chain(cfg.device_rules.iter()) {
            rules.add(rule.clone());
        }
        DeviceManager {
            state: Arc::new(DeviceState {
                cfg,
                rules,
                labeler,
                platforms: Mutex::new(PlatformRegistry::default()),
            }),
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
            started: false,
        }
    }

    /// Open the uevent socket, run the synchronous coldboot pass, then
    /// launch the polling thread. Callable once.
    pub fn start(&mut self) -> Result<(), DevdError> {
        if self.started {
            return Err(DevdError::AlreadyStarted);
        }

        let socket = UeventSocket::open()?;
        println!("[devd] listening for uevents");

        let mut buf = [0u8; UEVENT_MSG_LEN];
        for seed in &self.state.cfg.seed_paths {
            match seed.strip_suffix("/*") {
                Some(dir) => self.init_folder(&socket, &mut buf, dir),
                None => self.init_single_path(&socket, &mut buf, seed),
            }
        }
        let sys = self.state.cfg.sys_root.clone();
        self.init_single_path(&socket, &mut buf, &format!("{sys}/devices/virtual/mem/null"));
        self.init_single_path(&socket, &mut buf, &format!("{sys}/devices/virtual/misc/fuse"));

        self.started = true;
        self.stop.store(false, Ordering::SeqCst);
        let state = Arc::clone(&self.state);
        let stop = Arc::clone(&self.stop);
        self.worker = Some(thread::spawn(move || {
            let mut buf = [0u8; UEVENT_MSG_LEN];
            let mut pfd = libc::pollfd {
                fd: socket.raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            };
            while !stop.load(Ordering::SeqCst) {
                pfd.revents = 0;
                let nr = unsafe { libc::poll(&mut pfd, 1, 0) };
                if nr > 0 && (pfd.revents & libc::POLLIN) != 0 {
                    drain_events(&state, &socket, &mut buf);
                }
                thread::sleep(POLL_INTERVAL);
            }
            // socket closes here with the thread
        }));
        Ok(())
    }

    /// Signal the polling thread, join it and release the socket.
    /// Returns within roughly one poll interval.
    pub fn stop(&mut self) -> Result<(), DevdError> {
        let worker = self.worker.take().ok_or(DevdError::NotRunning)?;
        self.stop.store(true, Ordering::SeqCst);
        let _ = worker.join();
        println!("[devd] shutdown");
        Ok(())
    }

    /// Parse and apply one raw uevent payload. This is the same entry
    /// the dispatch loop uses; exposed for replay and testing.
    pub fn process_message(&self, msg: &[u8]) {
        if msg.len() >= UEVENT_MSG_LEN {
            return;
        }
        let ev = Uevent::parse(msg);
        handle_device_event(&self.state, &ev);
        firmware::handle_firmware_event(&self.state.cfg, &ev);
    }

    /// Ask the kernel to re-announce one device and process whatever
    /// that (and anything else pending) produced before moving on.
    fn init_single_path(
        &self,
        socket: &UeventSocket,
        buf: &mut [u8; UEVENT_MSG_LEN],
        path: &str,
    ) {
        debug!("initializing device {path}");
        match fs::OpenOptions::new()
            .write(true)
            .open(format!("{path}/uevent"))
        {
            Ok(mut trigger) => {
                let _ = trigger.write_all(b"add\n");
                drop(trigger);
                drain_events(&self.state, socket, buf);
            }
            Err(err) => debug!("failed to open uevent at {path}: {err}"),
        }
    }

    /// Re-announce a directory and everything beneath it.
    fn init_folder(&self, socket: &UeventSocket, buf: &mut [u8; UEVENT_MSG_LEN], path: &str) {
        self.init_single_path(socket, buf, path);

        let entries = match fs::read_dir(path) {
            Ok(e) => e,
            Err(err) => {
                debug!("failed to open folder {path}: {err}");
                return;
            }
        };
        for entry in entries.flatten() {
            // d_type, not stat: symlinked dirs must not be followed
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                self.init_folder(socket, buf, &format!("{path}/{name}"));
            }
        }
    }
}

/// Pull every queued datagram off the socket and dispatch it.
fn drain_events(state: &DeviceState, socket: &UeventSocket, buf: &mut [u8; UEVENT_MSG_LEN]) {
    while let Some(n) = socket.receive(buf) {
        let ev = Uevent::parse(&buf[..n]);
        handle_device_event(state, &ev);
        firmware::handle_firmware_event(&state.cfg, &ev);
    }
}

/// Route one event: sysfs fixups on add, then per-subsystem handling.
fn handle_device_event(state: &DeviceState, ev: &Uevent) {
    if ev.action == "add" {
        state
            .rules
            .apply_sysfs_fixups(&state.cfg.sys_root, ev.path);
    }

    if ev.subsystem.starts_with("block") {
        handle_block_device_event(state, ev);
    } else if ev.subsystem.starts_with("platform") {
        handle_platform_device_event(state, ev);
    } else {
        handle_generic_device_event(state, ev);
    }
}

/// Platform events only maintain the registry; they carry no node.
fn handle_platform_device_event(state: &DeviceState, ev: &Uevent) {
    let mut platforms = match state.platforms.lock() {
        Ok(g) => g,
        Err(_) => return,
    };
    if ev.action == "add" {
        platforms.register(ev.path);
    } else if ev.action == "remove" {
        platforms.unregister(ev.path);
    }
}

fn handle_block_device_event(state: &DeviceState, ev: &Uevent) {
    let name = match links::device_basename(ev) {
        Some(n) => n,
        None => return,
    };
    let labeler = &*state.labeler;
    let devpath = links::block_device_path(&state.cfg, labeler, name);

    let links = if ev.path.starts_with("/devices/") {
        match state.platforms.lock() {
            Ok(platforms) => links::platform_block_links(&state.cfg, labeler, &platforms, ev),
            Err(_) => Vec::new(),
        }
    } else {
        Vec::new()
    };

    node::handle_device(
        &state.rules,
        labeler,
        ev.action,
        &devpath,
        true,
        ev.major,
        ev.minor,
        &links,
    );
}

fn handle_generic_device_event(state: &DeviceState, ev: &Uevent) {
    let name = match links::device_basename(ev) {
        Some(n) => n,
        None => return,
    };
    let labeler = &*state.labeler;
    let devpath = match links::char_device_path(&state.cfg, labeler, ev, name) {
        Some(p) => p,
        None => {
            debug!("ignoring {} event for {}", ev.subsystem, ev.path);
            return;
        }
    };

    let links = match state.platforms.lock() {
        Ok(platforms) => links::usb_char_links(&state.cfg, labeler, &platforms, ev),
        Err(_) => Vec::new(),
    };

    node::handle_device(
        &state.rules,
        labeler,
        ev.action,
        &devpath,
        false,
        ev.major,
        ev.minor,
        &links,
    );
}
