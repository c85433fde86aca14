// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Runtime capability gating
//! INTENT: Disabled operations report NotSupported and leave no trace
//! IDL (target): capabilities from TOML → boot/reset/control/volatile/packet-read
//! DEPS: nexus-xlink (config + simulated devices), xlink-e2e helpers
//! READINESS: Host backend ready
//! TESTS: Each capability disabled in isolation; config-driven capability set

use nexus_xlink::{Capabilities, DeviceState, Error, Wait, Xlink, XlinkConfig};
use xlink_e2e::{booted, firmware, slices, spawn_echo, stop_echo};

fn without(capability: Capabilities) -> XlinkConfig {
    let mut config = slices(1);
    config.capabilities = Capabilities::all() - capability;
    config
}

#[test]
fn boot_disabled() {
    let (xlink, remotes) = Xlink::simulated(without(Capabilities::BOOT)).expect("simulated");
    let image = firmware();
    assert!(matches!(xlink.boot_remote("vpu-slice-0", image.path()), Err(Error::NotSupported)));
    assert!(matches!(xlink.stop_remote("vpu-slice-0"), Err(Error::NotSupported)));
    assert_eq!(xlink.get_device_status("vpu-slice-0").expect("status"), DeviceState::Off);
    assert_eq!(remotes[0].processor.start_count(), 0);
}

#[test]
fn reset_disabled_keeps_channels_open() {
    let (xlink, remotes) = booted(without(Capabilities::RESET));
    let handle = xlink.connect("vpu-slice-0").expect("connect");
    handle.open_channel(0x60).expect("open");
    assert!(matches!(handle.reset_device(100), Err(Error::NotSupported)));
    assert!(handle.is_open(0x60));
    assert_eq!(remotes[0].processor.start_count(), 1);
    assert_eq!(xlink.get_device_frequency("vpu-slice-0").expect("freq"), None);
}

#[test]
fn data_path_capabilities() {
    for capability in [Capabilities::CONTROL_DATA, Capabilities::VOLATILE, Capabilities::PACKET_READ] {
        let (xlink, remotes) = booted(without(capability));
        let handle = xlink.connect("vpu-slice-0").expect("connect");
        handle.open_channel(0x61).expect("open");
        let echo = spawn_echo(&remotes[0], 0x61);

        let result = if capability == Capabilities::CONTROL_DATA {
            handle.write_control(0x61, b"ctl", Wait::NonBlocking)
        } else if capability == Capabilities::VOLATILE {
            handle.write_volatile(0x61, b"vol", Wait::NonBlocking)
        } else {
            handle.read_packet(0x61, Wait::NonBlocking).map(drop)
        };
        assert!(matches!(result, Err(Error::NotSupported)), "{capability:?}");

        stop_echo(&remotes[0], 0x61);
        assert_eq!(echo.join().expect("echo thread"), 0, "{capability:?} moved data");
    }
}

#[test]
fn capability_list_from_toml() {
    let mut config = XlinkConfig::from_toml_str(
        r#"
        capabilities = ["boot", "packet-read"]
        [[device]]
        name = "vpu-slice-0"
        "#,
    )
    .expect("config");
    config.boot_timeout = std::time::Duration::from_millis(200);
    let (xlink, _remotes) = booted(config);
    assert_eq!(xlink.capabilities(), Capabilities::BOOT | Capabilities::PACKET_READ);
    let handle = xlink.connect("vpu-slice-0").expect("connect");
    handle.open_channel(0x62).expect("open");
    assert!(matches!(handle.write_control(0x62, b"c", Wait::NonBlocking), Err(Error::NotSupported)));
    assert!(matches!(handle.reset_device(1), Err(Error::NotSupported)));
    assert!(matches!(
        handle.read_packet(0x62, Wait::NonBlocking),
        Err(Error::WouldBlock)
    ));
}
