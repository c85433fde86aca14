// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Runtime context: device registry, connection table and capability gate.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use log::info;
use parking_lot::Mutex;
use xlink_abi::{Capabilities, DeviceEvent, DeviceState, SwDeviceId};

use crate::device::DeviceRegistry;
use crate::{
    BootControl, DeviceDescriptor, Error, Handle, Result, SimulatedDevice, Transport, XlinkConfig,
};

pub(crate) struct Shared {
    pub(crate) config: XlinkConfig,
    registry: DeviceRegistry,
    connections: Mutex<BTreeMap<u32, String>>,
}

impl Shared {
    pub(crate) fn require(&self, capability: Capabilities) -> Result<()> {
        if self.config.capabilities.contains(capability) {
            Ok(())
        } else {
            Err(Error::NotSupported)
        }
    }

    pub(crate) fn disconnect(&self, link_id: u32) {
        self.connections.lock().remove(&link_id);
    }
}

/// Entry point of the runtime; cheap to clone and share between threads.
#[derive(Clone)]
pub struct Xlink {
    shared: Arc<Shared>,
}

impl Xlink {
    /// Creates a runtime with an empty device table.
    pub fn new(config: XlinkConfig) -> Self {
        let registry = DeviceRegistry::new(config.max_devices);
        Self {
            shared: Arc::new(Shared { config, registry, connections: Mutex::new(BTreeMap::new()) }),
        }
    }

    /// Creates a runtime whose configured devices are backed by loopback links.
    ///
    /// Returns the remote side of every device in configuration order.
    pub fn simulated(config: XlinkConfig) -> Result<(Self, Vec<SimulatedDevice>)> {
        let devices = config.devices.clone();
        let xlink = Self::new(config);
        let mut remotes = Vec::with_capacity(devices.len());
        for device in devices {
            let descriptor = DeviceDescriptor::from(&device);
            let (host, remote) = SimulatedDevice::new(device);
            xlink.register_device(descriptor, Arc::new(host), remote.processor.clone())?;
            remotes.push(remote);
        }
        Ok((xlink, remotes))
    }

    /// Active configuration.
    pub fn config(&self) -> &XlinkConfig {
        &self.shared.config
    }

    /// Capabilities enabled for this instance.
    pub fn capabilities(&self) -> Capabilities {
        self.shared.config.capabilities
    }

    /// Adds a device reached through `transport` and booted through `control`.
    pub fn register_device(
        &self,
        descriptor: DeviceDescriptor,
        transport: Arc<dyn Transport>,
        control: Arc<dyn BootControl>,
    ) -> Result<()> {
        self.shared.registry.register(descriptor, transport, control)
    }

    /// Number of registered devices.
    pub fn device_count(&self) -> usize {
        self.shared.registry.len()
    }

    /// Software ids of devices with product id `pid`; `0` lists every device.
    pub fn get_device_list(&self, pid: u32) -> Vec<SwDeviceId> {
        self.shared.registry.list(pid)
    }

    /// Name of device `id`, truncated to `name_size` bytes.
    pub fn get_device_name(&self, id: SwDeviceId, name_size: usize) -> Result<String> {
        self.shared.registry.name_of(id, name_size)
    }

    /// Lifecycle state of device `name`.
    pub fn get_device_status(&self, name: &str) -> Result<DeviceState> {
        Ok(self.shared.registry.lookup(name)?.state())
    }

    /// Operating frequency recorded by the last reset.
    pub fn get_device_frequency(&self, name: &str) -> Result<Option<u32>> {
        Ok(self.shared.registry.lookup(name)?.frequency())
    }

    /// Loads the firmware at `path` and boots device `name`.
    pub fn boot_remote(&self, name: &str, path: impl AsRef<Path>) -> Result<()> {
        self.shared.require(Capabilities::BOOT)?;
        let device = self.shared.registry.lookup(name)?;
        let path = path.as_ref();
        let image = fs::read(path)
            .map_err(|source| Error::Firmware { path: path.to_path_buf(), source })?;
        if image.is_empty() {
            return Err(Error::InvalidArgument("empty firmware image"));
        }
        info!("xlink: booting {name} from {} ({} bytes)", path.display(), image.len());
        device.boot(Arc::from(image), self.shared.config.boot_timeout)
    }

    /// Halts device `name`; live handles fail with `DeviceNotReady` afterwards.
    pub fn stop_remote(&self, name: &str) -> Result<()> {
        self.shared.require(Capabilities::BOOT)?;
        self.shared.registry.lookup(name)?.stop()
    }

    /// Feeds an asynchronous device event (ready, watchdog) into the state machine.
    pub fn notify_device_event(&self, name: &str, event: DeviceEvent) -> Result<DeviceState> {
        self.shared.registry.lookup(name)?.notify(event)
    }

    /// Connects to a booted device.
    pub fn connect(&self, name: &str) -> Result<Handle> {
        let device = self.shared.registry.lookup(name)?;
        if device.state() != DeviceState::Ready {
            return Err(Error::DeviceNotReady);
        }
        let mut connections = self.shared.connections.lock();
        if connections.values().any(|connected| connected == name) {
            return Err(Error::AlreadyConnected);
        }
        if connections.len() >= self.shared.config.max_connections {
            return Err(Error::TooManyConnections);
        }
        let link_id = (0..=u32::MAX)
            .find(|id| !connections.contains_key(id))
            .ok_or(Error::TooManyConnections)?;
        connections.insert(link_id, name.to_string());
        drop(connections);
        info!("xlink: link {link_id} connected to {name}");
        Ok(Handle::new(link_id, device, Arc::clone(&self.shared)))
    }

    /// Number of live handles.
    pub fn connection_count(&self) -> usize {
        self.shared.connections.lock().len()
    }
}
