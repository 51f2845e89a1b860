// CLASSIFICATION: COMMUNITY
// Filename: main.rs v0.3
// Author: Lukas Bower
// Date Modified: 2026-04-03

//! Entry point for the standalone devd daemon.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use trampoline_devd::{config, DeviceManager};

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

extern "C" fn on_signal(_sig: libc::c_int) {
    SHUTDOWN.store(true, Ordering::SeqCst);
}

fn main() {
    env_logger::init();

    let cfg = config::load();
    let mut manager = DeviceManager::new(cfg);
    if let Err(err) = manager.start() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }

    unsafe {
        libc::signal(libc::SIGINT, on_signal as libc::sighandler_t);
        libc::signal(libc::SIGTERM, on_signal as libc::sighandler_t);
    }
    while !SHUTDOWN.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(100));
    }

    if let Err(err) = manager.stop() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
