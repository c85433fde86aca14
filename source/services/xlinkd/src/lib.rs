// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs)]

//! CONTEXT: xlink service front-end over loopback-simulated devices
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests in `cli` + `tests/cli.rs`
//!
//! PUBLIC API:
//!   - Session: runtime plus the remote side of every configured device
//!   - execute()/run(): command-line front-end
//!   - default_config(): one IPC device named `vpu-slice-0`
//!
//! DEPENDENCIES:
//!   - nexus-xlink: runtime, loopback transport, simulated processors
//!   - tempfile: selftest firmware image

pub mod cli;
pub use cli::{execute, execute_in, help, run};

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use log::info;
use nexus_xlink::{
    ChannelId, ConfigError, Deadline, DeviceConfig, DeviceState, Handle, Interface, LinkEnd,
    SimulatedDevice, Status, SwDeviceId, Transport, Wait, Xlink, XlinkConfig,
};

/// Device created when no configuration file is given.
pub const DEFAULT_DEVICE: &str = "vpu-slice-0";

const SELFTEST_CHANNEL: u32 = 0x10;
const SELFTEST_IMAGE: &[u8] = b"xlinkd selftest firmware";
const SELFTEST_PAYLOAD: &[u8] = b"xlinkd loopback selftest payload";
const SELFTEST_TIMEOUT: Duration = Duration::from_secs(1);

/// Result alias for service operations.
pub type Result<T> = core::result::Result<T, ServiceError>;

/// Errors reported by the service front-end.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Runtime operation failed.
    #[error(transparent)]
    Xlink(#[from] nexus_xlink::Error),
    /// Command line could not be interpreted.
    #[error("usage: {0}")]
    Usage(String),
    /// Local I/O failed (selftest image, stdin).
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
    /// Selftest data came back altered.
    #[error("selftest payload mismatch")]
    SelftestMismatch,
}

impl ServiceError {
    /// Integer status printed next to the message.
    pub fn status(&self) -> i32 {
        match self {
            Self::Xlink(err) => err.status().raw(),
            Self::Config(_) | Self::Usage(_) => Status::InvalidArgument.raw(),
            Self::Io(_) => Status::Io.raw(),
            Self::SelftestMismatch => Status::CommunicationFail.raw(),
        }
    }
}

impl From<nexus_xlink::TransferError> for ServiceError {
    fn from(err: nexus_xlink::TransferError) -> Self {
        Self::Xlink(err.error)
    }
}

/// Configuration used without `--config`.
pub fn default_config() -> XlinkConfig {
    XlinkConfig {
        devices: vec![DeviceConfig {
            name: DEFAULT_DEVICE.to_string(),
            vpu_id: 0,
            interface: Interface::Ipc,
            product_id: 0,
        }],
        ..XlinkConfig::default()
    }
}

/// Runtime plus the remote ends of its simulated devices.
pub struct Session {
    xlink: Xlink,
    remotes: Vec<SimulatedDevice>,
}

impl Session {
    /// Brings up every configured device as a loopback simulation.
    pub fn new(config: XlinkConfig) -> Result<Self> {
        let (xlink, remotes) = Xlink::simulated(config)?;
        info!("xlinkd: {} device(s) registered", remotes.len());
        Ok(Self { xlink, remotes })
    }

    /// Underlying runtime.
    pub fn xlink(&self) -> &Xlink {
        &self.xlink
    }

    /// One line per device: software id, name, state.
    pub fn list(&self, pid: u32) -> Result<String> {
        let ids = self.xlink.get_device_list(pid);
        if ids.is_empty() {
            return Ok("no devices".to_string());
        }
        let mut lines = Vec::with_capacity(ids.len());
        for id in ids {
            let name = self.xlink.get_device_name(id, usize::MAX)?;
            let state = self.xlink.get_device_status(&name)?;
            lines.push(format!("{id} {name} {state}"));
        }
        Ok(lines.join("\n"))
    }

    /// Device name for a software id, truncated to `size` bytes.
    pub fn name(&self, id: u32, size: usize) -> Result<String> {
        Ok(self.xlink.get_device_name(SwDeviceId::from_raw(id), size)?)
    }

    /// Lifecycle state of `name`.
    pub fn status(&self, name: &str) -> Result<String> {
        let state = self.xlink.get_device_status(name)?;
        Ok(format!("{name}: {state} ({})", state.raw()))
    }

    /// Boots `name` from `firmware`.
    pub fn boot(&self, name: &str, firmware: &Path) -> Result<String> {
        self.xlink.boot_remote(name, firmware)?;
        self.status(name)
    }

    /// Halts `name`.
    pub fn stop(&self, name: &str) -> Result<String> {
        self.xlink.stop_remote(name)?;
        self.status(name)
    }

    /// Connects to `name`, resets it at `frequency` and disconnects.
    pub fn reset(&self, name: &str, frequency: u32) -> Result<String> {
        let handle = self.xlink.connect(name)?;
        handle.reset_device(frequency)?;
        handle.disconnect()?;
        Ok(format!("{name}: reset at {frequency} Hz"))
    }

    /// Boots the first device if needed and moves a payload both ways over a channel.
    pub fn selftest(&self) -> Result<String> {
        let remote = self
            .remotes
            .first()
            .ok_or_else(|| ServiceError::Usage("selftest needs a configured device".into()))?;
        let name = remote.config.name.as_str();
        if self.xlink.get_device_status(name)? != DeviceState::Ready {
            let mut image = tempfile::NamedTempFile::new()?;
            image.write_all(SELFTEST_IMAGE)?;
            image.flush()?;
            self.xlink.boot_remote(name, image.path())?;
        }

        let chan = ChannelId::new(SELFTEST_CHANNEL).ok_or(nexus_xlink::Error::InvalidChannel)?;
        let handle = self.xlink.connect(name)?;
        handle.open_channel(SELFTEST_CHANNEL)?;
        remote.remote.open(chan, self.xlink.config().channel.data_size)?;
        let exchanged = selftest_exchange(&handle, &remote.remote, chan);
        let closed = remote.remote.close(chan);
        exchanged?;
        closed?;
        handle.close_channel(SELFTEST_CHANNEL)?;
        handle.disconnect()?;
        Ok(format!("selftest ok: {} bytes over chan {chan} on {name}", SELFTEST_PAYLOAD.len()))
    }
}

/// Sends the payload host to remote and echoes it back.
fn selftest_exchange(handle: &Handle, remote: &LinkEnd, chan: ChannelId) -> Result<()> {
    handle.write_all(SELFTEST_CHANNEL, SELFTEST_PAYLOAD, Wait::Timeout(SELFTEST_TIMEOUT))?;
    let deadline = Deadline::new(Wait::Timeout(SELFTEST_TIMEOUT));
    let mut received = vec![0u8; SELFTEST_PAYLOAD.len()];
    let mut filled = 0;
    while filled < received.len() {
        filled += remote.read(chan, &mut received[filled..], &deadline)?;
    }
    if received != SELFTEST_PAYLOAD {
        return Err(ServiceError::SelftestMismatch);
    }

    remote.write_packet(chan, &received, &deadline)?;
    let mut echoed = vec![0u8; received.len()];
    handle.read(SELFTEST_CHANNEL, &mut echoed, Wait::Timeout(SELFTEST_TIMEOUT))?;
    if echoed != received {
        return Err(ServiceError::SelftestMismatch);
    }
    Ok(())
}
