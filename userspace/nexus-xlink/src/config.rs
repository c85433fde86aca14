// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Runtime configuration loaded from TOML
//! INTENT: Connection limits, boot timeout, capability set, channel defaults, device table
//! DEPS: serde, toml, std::fs
//! TESTS: Defaults; full document; validation failures; file loading

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use xlink_abi::{
    Capabilities, Interface, OpMode, SwDeviceId, DEFAULT_CHANNEL_DATA_SIZE, MAX_DEVICE_NAME_SIZE,
    MAX_IPC_DEVICES, SW_DEVICE_ID_VPU_ID_MASK,
};

const DEFAULT_MAX_CONNECTIONS: usize = 8;
const DEFAULT_BOOT_TIMEOUT_MS: u64 = 3000;
const INLINE_SOURCE: &str = "<inline>";

/// Options applied when a channel is opened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelOptions {
    /// Blocking behaviour per direction.
    pub mode: OpMode,
    /// Bytes this side may have in flight toward the peer.
    pub data_size: u32,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self { mode: OpMode::default(), data_size: DEFAULT_CHANNEL_DATA_SIZE }
    }
}

/// One statically described remote device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Name used by `connect`, `boot_remote` and `get_device_status`.
    pub name: String,
    /// Processor slice index encoded into the software device id.
    pub vpu_id: u32,
    /// Physical interface the device is reached through.
    pub interface: Interface,
    /// Product id matched by `get_device_list`.
    pub product_id: u32,
}

impl DeviceConfig {
    /// Software device id derived from interface and slice index.
    pub fn sw_device_id(&self) -> SwDeviceId {
        SwDeviceId::new(self.interface, self.vpu_id)
    }
}

/// Runtime configuration.
#[derive(Clone, Debug)]
pub struct XlinkConfig {
    /// Upper bound on simultaneously live handles.
    pub max_connections: usize,
    /// Upper bound on registered devices.
    pub max_devices: usize,
    /// Time a booting device has to report ready.
    pub boot_timeout: Duration,
    /// Optional operations enabled for this instance.
    pub capabilities: Capabilities,
    /// Defaults for `Handle::open_channel`.
    pub channel: ChannelOptions,
    /// Devices created at startup.
    pub devices: Vec<DeviceConfig>,
}

impl Default for XlinkConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            max_devices: MAX_IPC_DEVICES,
            boot_timeout: Duration::from_millis(DEFAULT_BOOT_TIMEOUT_MS),
            capabilities: Capabilities::default(),
            channel: ChannelOptions::default(),
            devices: Vec::new(),
        }
    }
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Configuration is not valid TOML or has unknown keys.
    #[error("failed to parse config {path}: {source}")]
    Parse {
        /// File path, or `<inline>` for string input.
        path: PathBuf,
        /// Parser error.
        #[source]
        source: toml::de::Error,
    },
    /// Values parsed but are inconsistent.
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl XlinkConfig {
    /// Reads and validates a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        Self::parse(&data, path)
    }

    /// Parses and validates a configuration document.
    pub fn from_toml_str(data: &str) -> Result<Self, ConfigError> {
        Self::parse(data, Path::new(INLINE_SOURCE))
    }

    fn parse(data: &str, path: &Path) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(data)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
        raw.into_config()
    }

    /// Checks limits and the device table for consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(invalid("max_connections must be at least 1"));
        }
        if self.max_devices == 0 {
            return Err(invalid("max_devices must be at least 1"));
        }
        if self.channel.data_size == 0 {
            return Err(invalid("channel data_size must be at least 1"));
        }
        if self.devices.len() > self.max_devices {
            return Err(ConfigError::Invalid(format!(
                "{} devices configured but max_devices is {}",
                self.devices.len(),
                self.max_devices
            )));
        }
        let mut names = BTreeSet::new();
        let mut ids = BTreeSet::new();
        for device in &self.devices {
            if device.name.is_empty() || device.name.len() > MAX_DEVICE_NAME_SIZE {
                return Err(ConfigError::Invalid(format!(
                    "device name {:?} must be 1..={MAX_DEVICE_NAME_SIZE} bytes",
                    device.name
                )));
            }
            if device.vpu_id > SW_DEVICE_ID_VPU_ID_MASK {
                return Err(ConfigError::Invalid(format!(
                    "device {} vpu_id {} exceeds {SW_DEVICE_ID_VPU_ID_MASK}",
                    device.name, device.vpu_id
                )));
            }
            if !names.insert(device.name.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate device name {}", device.name)));
            }
            if !ids.insert(device.sw_device_id()) {
                return Err(ConfigError::Invalid(format!(
                    "device {} duplicates software id {}",
                    device.name,
                    device.sw_device_id()
                )));
            }
        }
        Ok(())
    }
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::Invalid(message.to_string())
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default = "default_max_connections")]
    max_connections: usize,
    #[serde(default = "default_max_devices")]
    max_devices: usize,
    #[serde(default = "default_boot_timeout_ms")]
    boot_timeout_ms: u64,
    #[serde(default)]
    capabilities: Option<Vec<String>>,
    #[serde(default)]
    channel: RawChannel,
    #[serde(default, rename = "device")]
    devices: Vec<RawDevice>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawChannel {
    mode: Option<String>,
    data_size: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDevice {
    name: String,
    #[serde(default)]
    vpu_id: u32,
    #[serde(default)]
    interface: Option<String>,
    #[serde(default)]
    product_id: u32,
}

fn default_max_connections() -> usize {
    DEFAULT_MAX_CONNECTIONS
}

fn default_max_devices() -> usize {
    MAX_IPC_DEVICES
}

fn default_boot_timeout_ms() -> u64 {
    DEFAULT_BOOT_TIMEOUT_MS
}

impl RawConfig {
    fn into_config(self) -> Result<XlinkConfig, ConfigError> {
        let capabilities = match self.capabilities {
            None => Capabilities::default(),
            Some(names) => {
                let mut caps = Capabilities::empty();
                for name in names {
                    let flag = Capabilities::from_flag_name(name.trim()).ok_or_else(|| {
                        ConfigError::Invalid(format!("unknown capability {name:?}"))
                    })?;
                    caps |= flag;
                }
                caps
            }
        };

        let mut channel = ChannelOptions::default();
        if let Some(mode) = self.channel.mode {
            channel.mode = OpMode::from_name(&mode)
                .ok_or_else(|| ConfigError::Invalid(format!("unknown channel mode {mode:?}")))?;
        }
        if let Some(data_size) = self.channel.data_size {
            channel.data_size = data_size;
        }

        let devices = self
            .devices
            .into_iter()
            .map(|raw| {
                let interface = match raw.interface.as_deref() {
                    None => Interface::Ipc,
                    Some(name) => Interface::from_name(name).ok_or_else(|| {
                        ConfigError::Invalid(format!("device {}: unknown interface {name:?}", raw.name))
                    })?,
                };
                Ok(DeviceConfig {
                    name: raw.name,
                    vpu_id: raw.vpu_id,
                    interface,
                    product_id: raw.product_id,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let config = XlinkConfig {
            max_connections: self.max_connections,
            max_devices: self.max_devices,
            boot_timeout: Duration::from_millis(self.boot_timeout_ms),
            capabilities,
            channel,
            devices,
        };
        config.validate()?;
        Ok(config)
    }
}
