// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Device registry and per-device lifecycle (boot, stop, reset).
//!
//! Lifecycle operations on one device are serialised; status queries never
//! wait behind a boot in progress and observe `Busy` instead.

use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use parking_lot::Mutex;
use xlink_abi::{DeviceEvent, DeviceState, Interface, SwDeviceId, MAX_DEVICE_NAME_SIZE};

use crate::{BootControl, DeviceConfig, Error, Result, Transport};

/// Identity of a registered device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Unique name, at most `MAX_DEVICE_NAME_SIZE` bytes.
    pub name: String,
    /// Software device id reported by `get_device_list`.
    pub sw_device_id: SwDeviceId,
    /// Physical interface; decides which channels are routable.
    pub interface: Interface,
    /// Product id matched by `get_device_list`.
    pub product_id: u32,
}

impl From<&DeviceConfig> for DeviceDescriptor {
    fn from(config: &DeviceConfig) -> Self {
        Self {
            name: config.name.clone(),
            sw_device_id: config.sw_device_id(),
            interface: config.interface,
            product_id: config.product_id,
        }
    }
}

#[derive(Default)]
struct Runtime {
    state: DeviceState,
    firmware: Option<Arc<[u8]>>,
    frequency: Option<u32>,
}

/// Registered device with its collaborators.
pub(crate) struct Device {
    descriptor: DeviceDescriptor,
    transport: Arc<dyn Transport>,
    control: Arc<dyn BootControl>,
    runtime: Mutex<Runtime>,
    lifecycle: Mutex<()>,
}

impl Device {
    pub(crate) fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    pub(crate) fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub(crate) fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub(crate) fn state(&self) -> DeviceState {
        self.runtime.lock().state
    }

    pub(crate) fn frequency(&self) -> Option<u32> {
        self.runtime.lock().frequency
    }

    /// Applies an externally reported event (watchdog, ready notifications).
    pub(crate) fn notify(&self, event: DeviceEvent) -> Result<DeviceState> {
        self.apply(event)
    }

    fn apply(&self, event: DeviceEvent) -> Result<DeviceState> {
        let mut runtime = self.runtime.lock();
        let next = runtime.state.on_event(event)?;
        if next != runtime.state {
            info!("xlink: {} {} -> {} ({event:?})", self.descriptor.name, runtime.state, next);
        }
        runtime.state = next;
        Ok(next)
    }

    pub(crate) fn boot(&self, image: Arc<[u8]>, timeout: Duration) -> Result<()> {
        let _lifecycle = self.lifecycle.lock();
        self.apply(DeviceEvent::Boot)?;
        self.runtime.lock().firmware = Some(Arc::clone(&image));
        self.start(&image, timeout)
    }

    /// Starts the processor from `Busy` and waits for it to report ready.
    fn start(&self, image: &[u8], timeout: Duration) -> Result<()> {
        if let Err(err) = self.control.start(image) {
            error!("xlink: {} failed to start: {err}", self.descriptor.name);
            self.apply(DeviceEvent::BootFailed)?;
            return Err(Error::DeviceBusy);
        }
        if let Err(err) = self.control.wait_for_ready(timeout) {
            error!("xlink: {} not ready after {timeout:?}: {err}", self.descriptor.name);
            self.apply(DeviceEvent::ReadyFail)?;
            return Err(Error::DeviceBusy);
        }
        self.apply(DeviceEvent::ReadyOk)?;
        Ok(())
    }

    pub(crate) fn stop(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock();
        self.halt()
    }

    fn halt(&self) -> Result<()> {
        self.apply(DeviceEvent::Stop)?;
        if let Err(err) = self.control.stop() {
            warn!("xlink: {} stop reported {err}", self.descriptor.name);
        }
        self.apply(DeviceEvent::StopComplete)?;
        Ok(())
    }

    /// Stops the processor and boots it again from the last image.
    pub(crate) fn reset(&self, frequency: u32, timeout: Duration) -> Result<()> {
        let _lifecycle = self.lifecycle.lock();
        let image = self.runtime.lock().firmware.clone().ok_or(Error::DeviceNotReady)?;
        self.halt()?;
        self.apply(DeviceEvent::Boot)?;
        self.start(&image, timeout)?;
        self.runtime.lock().frequency = Some(frequency);
        info!("xlink: {} reset at {frequency} Hz", self.descriptor.name);
        Ok(())
    }
}

/// Table of registered devices in registration order.
pub(crate) struct DeviceRegistry {
    devices: Mutex<Vec<Arc<Device>>>,
    max_devices: usize,
}

impl DeviceRegistry {
    pub(crate) fn new(max_devices: usize) -> Self {
        Self { devices: Mutex::new(Vec::new()), max_devices }
    }

    pub(crate) fn register(
        &self,
        descriptor: DeviceDescriptor,
        transport: Arc<dyn Transport>,
        control: Arc<dyn BootControl>,
    ) -> Result<()> {
        if descriptor.name.is_empty() || descriptor.name.len() > MAX_DEVICE_NAME_SIZE {
            return Err(Error::InvalidArgument("device name length"));
        }
        let mut devices = self.devices.lock();
        if devices.len() >= self.max_devices {
            return Err(Error::InvalidArgument("device table full"));
        }
        if devices.iter().any(|device| {
            device.descriptor.name == descriptor.name
                || device.descriptor.sw_device_id == descriptor.sw_device_id
        }) {
            return Err(Error::InvalidArgument("duplicate device"));
        }
        info!(
            "xlink: registered {} id={} iface={}",
            descriptor.name,
            descriptor.sw_device_id,
            descriptor.interface.name()
        );
        devices.push(Arc::new(Device {
            descriptor,
            transport,
            control,
            runtime: Mutex::new(Runtime::default()),
            lifecycle: Mutex::new(()),
        }));
        Ok(())
    }

    pub(crate) fn lookup(&self, name: &str) -> Result<Arc<Device>> {
        self.devices
            .lock()
            .iter()
            .find(|device| device.descriptor.name == name)
            .cloned()
            .ok_or(Error::DeviceNotFound)
    }

    /// Software ids of devices matching `pid`; `0` matches every device.
    pub(crate) fn list(&self, pid: u32) -> Vec<SwDeviceId> {
        self.devices
            .lock()
            .iter()
            .filter(|device| pid == 0 || device.descriptor.product_id == pid)
            .map(|device| device.descriptor.sw_device_id)
            .collect()
    }

    /// Device name truncated to `min(name_size, MAX_DEVICE_NAME_SIZE)` bytes.
    pub(crate) fn name_of(&self, id: SwDeviceId, name_size: usize) -> Result<String> {
        let devices = self.devices.lock();
        let device = devices
            .iter()
            .find(|device| device.descriptor.sw_device_id == id)
            .ok_or(Error::DeviceNotFound)?;
        Ok(truncate(&device.descriptor.name, name_size.min(MAX_DEVICE_NAME_SIZE)).to_string())
    }

    pub(crate) fn len(&self) -> usize {
        self.devices.lock().len()
    }
}

fn truncate(name: &str, limit: usize) -> &str {
    let mut end = limit.min(name.len());
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}
