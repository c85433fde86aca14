// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! External collaborators: the per-device data plane and boot control plane.
//!
//! Implementations must be safe to call from several threads at once; the
//! runtime never holds its own locks across a blocking transport call.

use std::time::Duration;

use xlink_abi::ChannelId;

use crate::{Deadline, Result};

/// Byte-stream channels toward one remote device.
pub trait Transport: Send + Sync {
    /// Opens the local end of `chan`; `data_size` bounds bytes in flight toward the peer.
    fn open(&self, chan: ChannelId, data_size: u32) -> Result<()>;

    /// Closes the local end, discarding undelivered inbound data and waking
    /// blocked callers with `ChannelClosed`.
    fn close(&self, chan: ChannelId) -> Result<()>;

    /// Drops data queued in both directions of `chan`, leaving both ends as they are.
    fn purge(&self, chan: ChannelId);

    /// Returns true when the peer has its end of `chan` open.
    fn is_peer_open(&self, chan: ChannelId) -> bool;

    /// Queues up to `data.len()` bytes; may accept fewer when the peer is slow.
    ///
    /// Blocks until at least one byte fits or `deadline` expires.
    fn write(&self, chan: ChannelId, data: &[u8], deadline: &Deadline) -> Result<usize>;

    /// Queues `data` as one unit or not at all.
    fn write_packet(&self, chan: ChannelId, data: &[u8], deadline: &Deadline) -> Result<()>;

    /// Copies available bytes into `buf`, blocking until at least one arrives.
    fn read(&self, chan: ChannelId, buf: &mut [u8], deadline: &Deadline) -> Result<usize>;

    /// Removes the next queued packet as written by the peer.
    fn read_packet(&self, chan: ChannelId, deadline: &Deadline) -> Result<Vec<u8>>;
}

/// Boot control for one remote processor.
pub trait BootControl: Send + Sync {
    /// Loads `firmware` and starts the processor.
    fn start(&self, firmware: &[u8]) -> Result<()>;

    /// Blocks until the firmware reports ready.
    fn wait_for_ready(&self, timeout: Duration) -> Result<()>;

    /// Halts the processor.
    fn stop(&self) -> Result<()>;
}
