// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Integer-status facade over [`Xlink`] for callers that exchange
//! numeric handles and in/out size parameters instead of owned `Handle`s.
//!
//! Every call returns `0` on success or a negative [`Status`] code. Handle ids
//! are never reused while the facade lives, so a stale id reports
//! `InvalidHandle` rather than reaching another connection.
//!
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests (host)

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use xlink_abi::{OpMode, Status, SwDeviceId, MAX_IPC_DEVICES};

use crate::{status_of, ChannelOptions, Error, Handle, Result, Wait, Xlink};

struct HandleTable {
    /// `None` once every id has been handed out.
    next: Option<u32>,
    live: HashMap<u32, Arc<Handle>>,
}

/// Numeric-handle view of an [`Xlink`] instance.
pub struct StatusApi {
    xlink: Xlink,
    handles: Mutex<HandleTable>,
}

impl StatusApi {
    /// Wraps `xlink`.
    pub fn new(xlink: Xlink) -> Self {
        Self { xlink, handles: Mutex::new(HandleTable { next: Some(1), live: HashMap::new() }) }
    }

    /// Underlying runtime.
    pub fn xlink(&self) -> &Xlink {
        &self.xlink
    }

    fn handle(&self, id: u32) -> Result<Arc<Handle>> {
        self.handles.lock().live.get(&id).cloned().ok_or(Error::InvalidHandle)
    }

    /// Connects to `name` and stores the new handle id in `handle`.
    pub fn connect(&self, name: &str, handle: &mut u32) -> i32 {
        let connected = match self.xlink.connect(name) {
            Ok(connected) => connected,
            Err(err) => return err.status().raw(),
        };
        let mut table = self.handles.lock();
        let Some(id) = table.next else {
            return Status::TooManyConnections.raw();
        };
        table.next = id.checked_add(1);
        table.live.insert(id, Arc::new(connected));
        *handle = id;
        Status::Success.raw()
    }

    /// Opens `chan` with a raw op mode (see [`OpMode::raw`]) and data size.
    pub fn open_channel(&self, handle: u32, chan: u32, mode: u32, data_size: u32) -> i32 {
        let result = self.handle(handle).and_then(|connected| {
            let mode = OpMode::from_raw(mode).ok_or(Error::InvalidArgument("op mode"))?;
            connected.open_channel_with(chan, ChannelOptions { mode, data_size })
        });
        status_of(&result)
    }

    /// Closes `chan`.
    pub fn close_channel(&self, handle: u32, chan: u32) -> i32 {
        status_of(&self.handle(handle).and_then(|connected| connected.close_channel(chan)))
    }

    /// Reads up to `*size` bytes into `buf`; `*size` becomes the count moved.
    pub fn read_data(
        &self,
        handle: u32,
        chan: u32,
        buf: &mut [u8],
        size: &mut u32,
        timeout_ms: u32,
    ) -> i32 {
        let requested = (*size as usize).min(buf.len());
        let connected = match self.handle(handle) {
            Ok(connected) => connected,
            Err(err) => {
                *size = 0;
                return err.status().raw();
            }
        };
        match connected.read(chan, &mut buf[..requested], Wait::from_millis(timeout_ms)) {
            Ok(read) => {
                *size = read as u32;
                Status::Success.raw()
            }
            Err(err) => {
                *size = err.transferred as u32;
                err.status().raw()
            }
        }
    }

    /// Writes `*size` bytes of `buf` within the timeout; `*size` becomes the count moved.
    pub fn write_data(
        &self,
        handle: u32,
        chan: u32,
        buf: &[u8],
        size: &mut u32,
        timeout_ms: u32,
    ) -> i32 {
        let requested = (*size as usize).min(buf.len());
        let connected = match self.handle(handle) {
            Ok(connected) => connected,
            Err(err) => {
                *size = 0;
                return err.status().raw();
            }
        };
        match connected.write_all(chan, &buf[..requested], Wait::from_millis(timeout_ms)) {
            Ok(()) => {
                *size = requested as u32;
                Status::Success.raw()
            }
            Err(err) => {
                *size = err.transferred as u32;
                err.status().raw()
            }
        }
    }

    /// Sends a control message.
    pub fn write_control_data(&self, handle: u32, chan: u32, buf: &[u8]) -> i32 {
        let result = self
            .handle(handle)
            .and_then(|connected| connected.write_control(chan, buf, Wait::Blocking));
        status_of(&result)
    }

    /// Sends a volatile message.
    pub fn write_volatile(&self, handle: u32, chan: u32, buf: &[u8]) -> i32 {
        let result = self
            .handle(handle)
            .and_then(|connected| connected.write_volatile(chan, buf, Wait::Blocking));
        status_of(&result)
    }

    /// Fills `ids` with software device ids; `*count` becomes the number written.
    pub fn get_device_list(&self, ids: &mut [u32], count: &mut u32, pid: u32) -> i32 {
        let listed = self.xlink.get_device_list(pid);
        let mut written = 0;
        for (slot, id) in ids.iter_mut().zip(listed.iter().take(MAX_IPC_DEVICES)) {
            *slot = id.raw();
            written += 1;
        }
        *count = written;
        Status::Success.raw()
    }

    /// Copies the device name into `name`, zero-filling the remainder.
    pub fn get_device_name(&self, id: u32, name: &mut [u8]) -> i32 {
        match self.xlink.get_device_name(SwDeviceId::from_raw(id), name.len()) {
            Ok(found) => {
                let bytes = found.as_bytes();
                name[..bytes.len()].copy_from_slice(bytes);
                name[bytes.len()..].fill(0);
                Status::Success.raw()
            }
            Err(err) => err.status().raw(),
        }
    }

    /// Stores the raw device state in `status`.
    pub fn get_device_status(&self, name: &str, status: &mut u32) -> i32 {
        match self.xlink.get_device_status(name) {
            Ok(state) => {
                *status = state.raw();
                Status::Success.raw()
            }
            Err(err) => err.status().raw(),
        }
    }

    /// Boots `name` from the firmware at `path`.
    pub fn boot_device(&self, name: &str, path: &Path) -> i32 {
        status_of(&self.xlink.boot_remote(name, path))
    }

    /// Resets the device behind `handle`.
    pub fn reset_device(&self, handle: u32, operating_frequency: u32) -> i32 {
        status_of(
            &self.handle(handle).and_then(|connected| connected.reset_device(operating_frequency)),
        )
    }

    /// Releases `handle`; operations still in flight on it fail afterwards.
    pub fn disconnect(&self, handle: u32) -> i32 {
        match self.handles.lock().live.remove(&handle) {
            Some(connected) => {
                connected.release();
                Status::Success.raw()
            }
            None => Status::InvalidHandle.raw(),
        }
    }
}
