// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Integer-status facade end to end
//! INTENT: Validate numeric handles, in/out sizes and status codes
//! IDL (target): connect(name,&handle) → open_channel → write_data/read_data → disconnect
//! DEPS: nexus-xlink::raw::StatusApi, xlink-e2e helpers
//! READINESS: Host backend ready
//! TESTS: Full session, error codes, device discovery limits

use nexus_xlink::raw::StatusApi;
use nexus_xlink::{OpMode, Status, Xlink};
use xlink_e2e::{firmware, slices, spawn_echo, stop_echo};

#[test]
fn full_session() {
    let (xlink, remotes) = Xlink::simulated(slices(1)).expect("simulated");
    let api = StatusApi::new(xlink);
    let image = firmware();

    let mut handle = 0;
    assert_eq!(api.connect("vpu-slice-0", &mut handle), Status::DeviceNotReady.raw());
    assert_eq!(api.boot_device("vpu-slice-0", image.path()), 0);
    assert_eq!(api.connect("vpu-slice-0", &mut handle), 0);
    assert_eq!(api.open_channel(handle, 0x300, OpMode::RxbTxb.raw(), 4096), 0);
    let echo = spawn_echo(&remotes[0], 0x300);

    let mut size = 11;
    assert_eq!(api.write_data(handle, 0x300, b"status path", &mut size, 1000), 0);
    assert_eq!(size, 11);
    let mut buf = [0u8; 32];
    let mut size = 11;
    assert_eq!(api.read_data(handle, 0x300, &mut buf, &mut size, 1000), 0);
    assert_eq!((size, &buf[..11]), (11, &b"status path"[..]));

    let mut size = 4;
    assert_eq!(api.read_data(handle, 0x300, &mut buf, &mut size, 0), Status::Timeout.raw());
    assert_eq!(size, 0);

    assert_eq!(api.write_control_data(handle, 0x300, &[0u8; 101]), Status::InvalidArgument.raw());
    assert_eq!(api.write_volatile(handle, 0x300, b"v"), 0);
    let mut size = 1;
    assert_eq!(api.read_data(handle, 0x300, &mut buf, &mut size, 1000), 0);
    assert_eq!((size, buf[0]), (1, b'v'));
    assert_eq!(api.reset_device(handle, 600_000_000), 0);
    assert_eq!(api.close_channel(handle, 0x300), Status::ChannelClosed.raw());
    assert_eq!(api.disconnect(handle), 0);

    stop_echo(&remotes[0], 0x300);
    assert_eq!(echo.join().expect("echo thread"), 12);
}

#[test]
fn error_codes_match_status_table() {
    let (xlink, _remotes) = Xlink::simulated(slices(1)).expect("simulated");
    let api = StatusApi::new(xlink);
    let mut handle = 0;
    assert_eq!(api.connect("vpu-slice-7", &mut handle), -19);
    assert_eq!(api.open_channel(42, 0x10, 0, 16), -9);
    let mut state = 0;
    assert_eq!(api.get_device_status("nope", &mut state), -19);
    assert_eq!(api.boot_device("vpu-slice-0", std::path::Path::new("/nonexistent")), -5);

    let image = firmware();
    assert_eq!(api.boot_device("vpu-slice-0", image.path()), 0);
    assert_eq!(api.connect("vpu-slice-0", &mut handle), 0);
    let mut second = 0;
    assert_eq!(api.connect("vpu-slice-0", &mut second), Status::AlreadyConnected.raw());
    assert_eq!(api.open_channel(handle, 0x1000, 0, 16), Status::InvalidChannel.raw());
    assert_eq!(api.open_channel(handle, 0x001, 0, 16), Status::InvalidChannel.raw());
}

#[test]
fn device_list_is_capped() {
    let (xlink, _remotes) = Xlink::simulated(slices(4)).expect("simulated");
    let api = StatusApi::new(xlink);
    let mut ids = [0u32; 2];
    let mut count = 0;
    assert_eq!(api.get_device_list(&mut ids, &mut count, 0), 0);
    assert_eq!(count, 2);
    let mut ids = [0u32; 16];
    assert_eq!(api.get_device_list(&mut ids, &mut count, 0), 0);
    assert_eq!(count, 4);
    assert_eq!(&ids[..4], &[0x0300_0000, 0x0300_0002, 0x0300_0004, 0x0300_0006]);
}
