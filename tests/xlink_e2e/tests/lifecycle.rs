// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Remote processor lifecycle through the public runtime
//! INTENT: Validate boot, failed boot, watchdog recovery, reset and stop
//! IDL (target): boot_remote(name, path) → connect → reset_device(freq) → stop
//! DEPS: nexus-xlink (simulated processors), xlink-e2e helpers
//! READINESS: Host backend ready
//! TESTS: Boot failure states, reset during blocked I/O, watchdog recovery, stop

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use nexus_xlink::loopback::BootBehaviour;
use nexus_xlink::{DeviceEvent, DeviceState, Error, Status, Wait, Xlink};
use xlink_e2e::{booted, firmware, patient, slices, spawn_echo, stop_echo};

#[test]
fn failed_boots_land_in_error_and_report_busy() {
    for behaviour in [BootBehaviour::FailStart, BootBehaviour::NeverReady] {
        let (xlink, remotes) = Xlink::simulated(slices(1)).expect("simulated");
        remotes[0].processor.set_behaviour(behaviour);
        let image = firmware();
        let err = xlink.boot_remote("vpu-slice-0", image.path()).expect_err("boot fails");
        assert_eq!(err.status(), Status::DeviceBusy, "{behaviour:?}");
        assert_eq!(xlink.get_device_status("vpu-slice-0").expect("status"), DeviceState::Error);
        assert!(matches!(xlink.connect("vpu-slice-0"), Err(Error::DeviceNotReady)));
    }
}

#[test]
fn reset_interrupts_blocked_reader_and_reboots() {
    let (xlink, remotes) = booted(slices(1));
    let remote = &remotes[0];
    let handle = Arc::new(xlink.connect("vpu-slice-0").expect("connect"));
    handle.open_channel(0x40).expect("open");
    let echo = spawn_echo(remote, 0x40);

    let reader = {
        let handle = Arc::clone(&handle);
        thread::spawn(move || {
            let mut buf = [0u8; 16];
            handle.read(0x40, &mut buf, Wait::Blocking)
        })
    };
    thread::sleep(Duration::from_millis(20));
    handle.reset_device(700_000_000).expect("reset");
    let err = reader.join().expect("reader").expect_err("interrupted");
    assert!(matches!(err.error, Error::ChannelClosed));

    assert_eq!(remote.processor.start_count(), 2);
    assert!(remote.processor.is_running());
    assert_eq!(xlink.get_device_frequency("vpu-slice-0").expect("freq"), Some(700_000_000));

    // the remote end survives a host-side reset; reopen and keep talking
    handle.open_channel(0x40).expect("reopen");
    handle.write_all(0x40, b"after reset", patient()).expect("write");
    let mut buf = [0u8; 11];
    handle.read(0x40, &mut buf, patient()).expect("read");
    assert_eq!(&buf, b"after reset");
    stop_echo(remote, 0x40);
    echo.join().expect("echo thread");
}

#[test]
fn reset_failure_leaves_device_in_error() {
    let (xlink, remotes) = booted(slices(1));
    let handle = xlink.connect("vpu-slice-0").expect("connect");
    remotes[0].processor.set_behaviour(BootBehaviour::NeverReady);
    let err = handle.reset_device(100).expect_err("processor never ready");
    assert!(matches!(err, Error::DeviceBusy));
    assert_eq!(xlink.get_device_status("vpu-slice-0").expect("status"), DeviceState::Error);
    assert!(matches!(handle.open_channel(0x40), Err(Error::DeviceNotReady)));

    remotes[0].processor.set_behaviour(BootBehaviour::Normal);
    handle.reset_device(100).expect("second reset recovers");
    handle.open_channel(0x40).expect("open after recovery");
}

#[test]
fn watchdog_then_reset_restores_service() {
    let (xlink, _remotes) = booted(slices(2));
    let handle = xlink.connect("vpu-slice-1").expect("connect");
    handle.open_channel(0x50).expect("open");
    let state = xlink
        .notify_device_event("vpu-slice-1", DeviceEvent::NceWatchdogTimeout)
        .expect("watchdog");
    assert_eq!(state, DeviceState::Error);
    let err = handle.write(0x50, b"x", Wait::NonBlocking).expect_err("device in error");
    assert!(matches!(err.error, Error::DeviceNotReady));
    assert_eq!(xlink.get_device_status("vpu-slice-0").expect("other device"), DeviceState::Ready);

    handle.reset_device(400_000_000).expect("reset");
    assert!(handle.open_channels().is_empty());
    handle.open_channel(0x50).expect("reopen");
}

#[test]
fn stop_and_boot_again() {
    let (xlink, remotes) = booted(slices(1));
    xlink.stop_remote("vpu-slice-0").expect("stop");
    assert_eq!(xlink.get_device_status("vpu-slice-0").expect("status"), DeviceState::Off);
    assert!(!remotes[0].processor.is_running());
    assert!(matches!(xlink.connect("vpu-slice-0"), Err(Error::DeviceNotReady)));

    let image = firmware();
    xlink.boot_remote("vpu-slice-0", image.path()).expect("boot again");
    xlink.connect("vpu-slice-0").expect("connect");
}
