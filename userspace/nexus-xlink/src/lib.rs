// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Channel-oriented IPC runtime for remote accelerator endpoints
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests per module + integration tests under `tests/`
//!
//! PUBLIC API:
//!   - Xlink: device registry + connection table (connect, boot_remote, device queries)
//!   - Handle: caller-owned connection (open/close channel, read, write, reset)
//!   - Transport / BootControl: external collaborators (data plane / control plane)
//!   - loopback_link(), SimulatedProcessor: in-memory backends for host testing
//!   - XlinkConfig: TOML configuration
//!   - raw::StatusApi: integer-status facade with in/out size parameters
//!   - Wait / Deadline: timeout handling for blocking calls
//!
//! DEPENDENCIES:
//!   - xlink-abi: status codes, channel ids, device ids, device state machine
//!   - parking_lot: Mutex/Condvar for blocking waits
//!   - serde + toml: configuration

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs)]

mod config;
mod device;
mod error;
mod handle;
pub mod loopback;
pub mod raw;
mod transport;
mod wait;
mod xlink;

pub use config::{ChannelOptions, ConfigError, DeviceConfig, XlinkConfig};
pub use device::DeviceDescriptor;
pub use error::{status_of, Error, Result, TransferError};
pub use handle::{Handle, TransferResult};
pub use loopback::{loopback_link, LinkEnd, SimulatedDevice, SimulatedProcessor};
pub use transport::{BootControl, Transport};
pub use wait::{Deadline, Wait};
pub use xlink::Xlink;

pub use xlink_abi as abi;
pub use xlink_abi::{
    Capabilities, ChannelId, DeviceEvent, DeviceState, Interface, OpMode, Status, SwDeviceId,
};
