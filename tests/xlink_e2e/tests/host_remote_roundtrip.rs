// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: host ↔ remote loopback round trips
//! INTENT: Validate connect/open/write/read/close across devices and channels
//! IDL (target): connect(name) → open_channel(chan) → write/read → close_channel → disconnect
//! DEPS: nexus-xlink (simulated devices), xlink-e2e helpers
//! READINESS: Host backend ready; loopback transport established
//! TESTS: Echo per channel, many devices, partial write accounting, peer visibility

use std::sync::Arc;
use std::thread;

use nexus_xlink::{ChannelOptions, Error, OpMode, Wait};
use proptest::prelude::*;
use xlink_e2e::{booted, patient, slices, spawn_echo, stop_echo};

#[test]
fn echo_on_every_device() {
    let (xlink, remotes) = booted(slices(4));
    for remote in &remotes {
        let handle = xlink.connect(&remote.config.name).expect("connect");
        handle.open_channel(0x100).expect("open");
        let echo = spawn_echo(remote, 0x100);
        assert!(handle.is_peer_open(0x100).expect("peer"));

        let payload = format!("hello {}", remote.config.name);
        handle.write_all(0x100, payload.as_bytes(), patient()).expect("write");
        let mut buf = vec![0u8; payload.len()];
        assert_eq!(handle.read(0x100, &mut buf, patient()).expect("read"), payload.len());
        assert_eq!(buf, payload.as_bytes());

        stop_echo(remote, 0x100);
        assert_eq!(echo.join().expect("echo thread"), payload.len());
        assert!(!handle.is_peer_open(0x100).expect("peer"));
        handle.close_channel(0x100).expect("close");
        handle.disconnect().expect("disconnect");
    }
    assert_eq!(xlink.connection_count(), 0);
}

#[test]
fn channels_share_a_handle_across_threads() {
    let (xlink, remotes) = booted(slices(1));
    let remote = &remotes[0];
    let handle = Arc::new(xlink.connect("vpu-slice-0").expect("connect"));
    let channels: Vec<u32> = (0x20..0x28).collect();
    let echoes: Vec<_> = channels
        .iter()
        .map(|&chan| {
            handle.open_channel(chan).expect("open");
            spawn_echo(remote, chan)
        })
        .collect();

    let clients: Vec<_> = channels
        .iter()
        .map(|&chan| {
            let handle = Arc::clone(&handle);
            thread::spawn(move || {
                for round in 0..32u32 {
                    let message = [chan.to_le_bytes(), round.to_le_bytes()].concat();
                    handle.write_all(chan, &message, patient()).expect("write");
                    let mut reply = [0u8; 8];
                    handle.read(chan, &mut reply, patient()).expect("read");
                    assert_eq!(&reply[..], &message[..]);
                }
            })
        })
        .collect();
    for client in clients {
        client.join().expect("client thread");
    }
    for (&chan, echo) in channels.iter().zip(echoes) {
        stop_echo(remote, chan);
        assert_eq!(echo.join().expect("echo thread"), 32 * 8);
    }
}

#[test]
fn tx_non_blocking_channel_reports_back_pressure() {
    let (xlink, _remotes) = booted(slices(1));
    let handle = xlink.connect("vpu-slice-0").expect("connect");
    handle
        .open_channel_with(0x30, ChannelOptions { mode: OpMode::RxbTxn, data_size: 16 })
        .expect("open");
    assert_eq!(handle.write(0x30, &[1u8; 24], patient()).expect("first"), 16);
    let err = handle.write(0x30, &[2u8; 8], Wait::Blocking).expect_err("full");
    assert!(matches!(err.error, Error::WouldBlock));
    assert_eq!(err.transferred, 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn payloads_survive_round_trip(payload in proptest::collection::vec(any::<u8>(), 1..4096)) {
        let (xlink, remotes) = booted(slices(1));
        let handle = xlink.connect("vpu-slice-0").expect("connect");
        handle.open_channel(0x200).expect("open");
        let echo = spawn_echo(&remotes[0], 0x200);

        handle.write_all(0x200, &payload, patient()).expect("write");
        let mut back = vec![0u8; payload.len()];
        let read = handle.read(0x200, &mut back, patient()).expect("read");
        prop_assert_eq!(read, payload.len());
        prop_assert_eq!(&back, &payload);

        stop_echo(&remotes[0], 0x200);
        prop_assert_eq!(echo.join().expect("echo thread"), payload.len());
    }
}
