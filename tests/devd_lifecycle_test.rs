// CLASSIFICATION: COMMUNITY
// Filename: devd_lifecycle_test.rs v0.2
// Author: Lukas Bower
// Date Modified: 2026-04-03

//! Manager lifecycle against the real kernel socket. Needs a Linux
//! kernel and (for the full surface) root; ignored by default, run
//! with `cargo test -- --ignored`.

use std::fs;
use std::time::{Duration, Instant};

use serial_test::serial;

use trampoline_devd::config::DevdConfig;
use trampoline_devd::{DevdError, DeviceManager};

fn scratch_cfg() -> (tempfile::TempDir, DevdConfig) {
    let tmp = tempfile::tempdir().unwrap();
    let mut cfg = DevdConfig::default();
    cfg.dev_root = tmp.path().join("dev").to_str().unwrap().to_string();
    cfg.sys_root = "/sys".into();
    fs::create_dir_all(&cfg.dev_root).unwrap();
    (tmp, cfg)
}

#[test]
#[serial]
#[ignore]
fn start_runs_coldboot_and_stop_returns_within_one_interval() {
    let (_tmp, mut cfg) = scratch_cfg();
    cfg.seed_paths = vec!["/sys/devices/virtual/tty/tty0".into()];
    let mut manager = DeviceManager::new(cfg);
    manager.start().unwrap();

    let begin = Instant::now();
    manager.stop().unwrap();
    assert!(begin.elapsed() < Duration::from_millis(500));
}

#[test]
#[serial]
#[ignore]
fn lifecycle_misuse_is_reported_not_fatal() {
    let (_tmp, cfg) = scratch_cfg();
    let mut manager = DeviceManager::new(cfg);

    assert!(matches!(manager.stop(), Err(DevdError::NotRunning)));
    manager.start().unwrap();
    assert!(matches!(manager.start(), Err(DevdError::AlreadyStarted)));
    manager.stop().unwrap();
    assert!(matches!(manager.stop(), Err(DevdError::NotRunning)));
}
