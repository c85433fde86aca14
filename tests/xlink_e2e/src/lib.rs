// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

use std::io::Write;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use nexus_xlink::{
    ChannelId, Deadline, DeviceConfig, Error, Interface, SimulatedDevice, Transport, Wait, Xlink,
    XlinkConfig,
};
use tempfile::NamedTempFile;

/// Configuration with `count` IPC devices named `vpu-slice-<n>`.
pub fn slices(count: u32) -> XlinkConfig {
    let mut config = XlinkConfig {
        boot_timeout: Duration::from_millis(200),
        ..XlinkConfig::default()
    };
    for vpu_id in 0..count {
        config.devices.push(DeviceConfig {
            name: format!("vpu-slice-{vpu_id}"),
            vpu_id,
            interface: Interface::Ipc,
            product_id: 0,
        });
    }
    config
}

/// Writes a non-empty firmware image to a temporary file.
pub fn firmware() -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(b"\x7fELF vpu firmware").expect("write firmware");
    file.flush().expect("flush firmware");
    file
}

/// Builds a simulated runtime and boots every device.
pub fn booted(config: XlinkConfig) -> (Xlink, Vec<SimulatedDevice>) {
    let (xlink, remotes) = Xlink::simulated(config).expect("simulated devices");
    let image = firmware();
    for remote in &remotes {
        xlink.boot_remote(&remote.config.name, image.path()).expect("boot");
    }
    (xlink, remotes)
}

/// Opens `chan` on the remote side and echoes packets until the channel closes.
pub fn spawn_echo(remote: &SimulatedDevice, chan: u32) -> JoinHandle<usize> {
    let id = ChannelId::new(chan).expect("channel id");
    let link = remote.remote.clone();
    link.open(id, 64 * 1024).expect("remote open");
    thread::spawn(move || {
        let mut echoed = 0;
        loop {
            match link.read_packet(id, &Deadline::never()) {
                Ok(packet) => {
                    link.write_packet(id, &packet, &Deadline::never()).expect("echo");
                    echoed += packet.len();
                }
                Err(Error::ChannelClosed) => return echoed,
                Err(err) => panic!("echo on {id}: {err}"),
            }
        }
    })
}

/// Closes the remote end of `chan`, stopping its echo thread.
pub fn stop_echo(remote: &SimulatedDevice, chan: u32) {
    let id = ChannelId::new(chan).expect("channel id");
    remote.remote.close(id).expect("remote close");
}

/// Bounded wait used throughout the tests.
pub fn patient() -> Wait {
    Wait::Timeout(Duration::from_secs(5))
}
