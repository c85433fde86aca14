// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), no_std)]
#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs)]

//! CONTEXT: Shared xlink definitions exposed to the host runtime and services
//! OWNERS: @runtime
//! PUBLIC API: Status, ChannelId, ChannelRoute, OpMode, Interface, SwDeviceId, DeviceState,
//!             DeviceEvent, Capabilities
//! DEPENDS_ON: no_std, bitflags
//! INVARIANTS: Status codes are 0 (success) or negative errno values; channel ids are below
//!             NMB_CHANNELS; the two control channels are never opened by callers

use core::fmt;

// ——— Status codes ———

/// Integer status returned across the xlink interface.
///
/// Zero means success, every failure kind maps to one fixed negative errno value.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Status {
    /// Operation completed.
    Success = 0,
    /// Transport or firmware I/O failed.
    Io = -5,
    /// Device exists but has not reached the ready state.
    DeviceNotReady = -6,
    /// Argument outside the accepted range (sizes, names).
    InvalidArgument = -7,
    /// Handle does not refer to a live connection.
    InvalidHandle = -9,
    /// Non-blocking attempt could not make progress.
    WouldBlock = -11,
    /// Device is booting, resetting or otherwise busy.
    DeviceBusy = -16,
    /// No device matches the given name or id.
    DeviceNotFound = -19,
    /// Channel id is out of range, reserved, or not open.
    InvalidChannel = -22,
    /// Connection table is full.
    TooManyConnections = -24,
    /// Channel was closed while the operation was in flight.
    ChannelClosed = -32,
    /// Peer did not answer a control request.
    CommunicationFail = -70,
    /// Capability disabled for this configuration.
    NotSupported = -95,
    /// Device already has a live connection.
    AlreadyConnected = -106,
    /// Deadline expired before the operation completed.
    Timeout = -110,
    /// Channel is already open on this handle.
    AlreadyOpen = -114,
}

impl Status {
    const ALL: [Status; 16] = [
        Status::Success,
        Status::Io,
        Status::DeviceNotReady,
        Status::InvalidArgument,
        Status::InvalidHandle,
        Status::WouldBlock,
        Status::DeviceBusy,
        Status::DeviceNotFound,
        Status::InvalidChannel,
        Status::TooManyConnections,
        Status::ChannelClosed,
        Status::CommunicationFail,
        Status::NotSupported,
        Status::AlreadyConnected,
        Status::Timeout,
        Status::AlreadyOpen,
    ];

    /// Returns the raw integer value.
    pub const fn raw(self) -> i32 {
        self as i32
    }

    /// Maps a raw integer back to a status, `None` for unknown codes.
    pub fn from_raw(raw: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|status| status.raw() == raw)
    }

    /// Returns `true` for [`Status::Success`].
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    /// Short human readable description.
    pub const fn describe(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Io => "i/o error",
            Self::DeviceNotReady => "device not ready",
            Self::InvalidArgument => "invalid argument",
            Self::InvalidHandle => "invalid handle",
            Self::WouldBlock => "operation would block",
            Self::DeviceBusy => "device busy",
            Self::DeviceNotFound => "device not found",
            Self::InvalidChannel => "invalid channel",
            Self::TooManyConnections => "too many connections",
            Self::ChannelClosed => "channel closed",
            Self::CommunicationFail => "communication failure",
            Self::NotSupported => "not supported",
            Self::AlreadyConnected => "already connected",
            Self::Timeout => "timed out",
            Self::AlreadyOpen => "channel already open",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

// ——— Channels ———

/// Number of channel ids addressable on one link.
pub const NMB_CHANNELS: u16 = 0x1000;
/// Channels below this id are carried by the on-chip IPC interface.
pub const IPC_MAX_CHANNELS: u16 = 0x400;
/// Reserved control channel towards the IP side.
pub const IP_CONTROL_CHANNEL: ChannelId = ChannelId(0x0);
/// Reserved control channel towards the VPU.
pub const VPU_CONTROL_CHANNEL: ChannelId = ChannelId(0x1);

/// Maximum packets queued per channel direction.
pub const PACKET_QUEUE_CAPACITY: usize = 64;
/// Default per-direction byte capacity of a channel.
pub const DEFAULT_CHANNEL_DATA_SIZE: u32 = 64 * 1024;
/// Upper bound for control-data writes.
pub const MAX_CONTROL_DATA_SIZE: usize = 100;
/// Upper bound for volatile writes (copied through the bounce buffer pool).
pub const MAX_VOLATILE_SIZE: usize = 128;
/// Time allowed for the peer to acknowledge an open request.
pub const OPEN_CHANNEL_TIMEOUT_MS: u32 = 5000;

/// Channel number scoped to one connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(u16);

impl ChannelId {
    /// Validates `raw` against [`NMB_CHANNELS`].
    pub const fn new(raw: u32) -> Option<Self> {
        if raw < NMB_CHANNELS as u32 {
            Some(Self(raw as u16))
        } else {
            None
        }
    }

    /// Returns the raw channel number.
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Returns `true` for the two reserved control channels.
    pub const fn is_control(self) -> bool {
        self.0 == IP_CONTROL_CHANNEL.0 || self.0 == VPU_CONTROL_CHANNEL.0
    }

    /// Returns `true` when the channel is carried by the on-chip IPC interface.
    pub const fn is_ipc_range(self) -> bool {
        self.0 < IPC_MAX_CHANNELS
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:03x}", self.0)
    }
}

// ——— Interfaces and routing ———

/// Physical interface a device is reached through.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Interface {
    /// No interface (unrouted).
    Null = 0,
    /// PCIe attached accelerator.
    Pcie = 1,
    /// USB attached accelerator.
    Usb = 2,
    /// On-chip IPC to a VPU slice.
    Ipc = 3,
    /// Ethernet attached accelerator.
    Eth = 4,
}

impl Interface {
    /// Returns the raw interface value used in software device ids.
    pub const fn raw(self) -> u32 {
        self as u32
    }

    /// Parses a raw interface value.
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Null),
            1 => Some(Self::Pcie),
            2 => Some(Self::Usb),
            3 => Some(Self::Ipc),
            4 => Some(Self::Eth),
            _ => None,
        }
    }

    /// Lower-case name used in configuration files.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Pcie => "pcie",
            Self::Usb => "usb",
            Self::Ipc => "ipc",
            Self::Eth => "eth",
        }
    }

    /// Parses a configuration name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        [Self::Null, Self::Pcie, Self::Usb, Self::Ipc, Self::Eth]
            .into_iter()
            .find(|iface| iface.name().eq_ignore_ascii_case(name.trim()))
    }
}

/// Interfaces permitted to carry a channel range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelRoute {
    /// Interface used between the remote host and the local host.
    pub remote_to_local: Interface,
    /// Interface used between the local host and the IP block.
    pub local_to_ip: Interface,
}

impl ChannelRoute {
    /// Returns `true` when a device on `iface` may use the channel.
    pub const fn permits(&self, iface: Interface) -> bool {
        match iface {
            Interface::Ipc => matches!(self.local_to_ip, Interface::Ipc),
            Interface::Null => false,
            other => self.remote_to_local as u32 == other as u32,
        }
    }
}

struct RouteEntry {
    start: u16,
    stop: u16,
    route: ChannelRoute,
}

const fn route(start: u16, stop: u16, remote_to_local: Interface, local_to_ip: Interface) -> RouteEntry {
    RouteEntry { start, stop, route: ChannelRoute { remote_to_local, local_to_ip } }
}

const CHANNEL_ROUTES: [RouteEntry; 6] = [
    route(0x000, 0x001, Interface::Pcie, Interface::Ipc),
    route(0x002, 0x009, Interface::Usb, Interface::Ipc),
    route(0x00A, 0x3FD, Interface::Pcie, Interface::Ipc),
    route(0x3FE, 0x3FF, Interface::Eth, Interface::Ipc),
    route(0x400, 0xFFE, Interface::Pcie, Interface::Null),
    route(0xFFF, 0xFFF, Interface::Eth, Interface::Null),
];

/// Looks up the routing entry for `chan`.
pub fn channel_route(chan: ChannelId) -> Option<ChannelRoute> {
    CHANNEL_ROUTES
        .iter()
        .find(|entry| chan.0 >= entry.start && chan.0 <= entry.stop)
        .map(|entry| entry.route)
}

// ——— Operating modes ———

/// Blocking behaviour of a channel, per direction.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum OpMode {
    /// Non-blocking receive, non-blocking transmit.
    RxnTxn = 0,
    /// Non-blocking receive, blocking transmit.
    RxnTxb = 1,
    /// Blocking receive, non-blocking transmit.
    RxbTxn = 2,
    /// Blocking receive, blocking transmit.
    #[default]
    RxbTxb = 3,
}

impl OpMode {
    /// Returns `true` when reads may wait for data.
    pub const fn rx_blocking(self) -> bool {
        matches!(self, Self::RxbTxn | Self::RxbTxb)
    }

    /// Returns `true` when writes may wait for space.
    pub const fn tx_blocking(self) -> bool {
        matches!(self, Self::RxnTxb | Self::RxbTxb)
    }

    /// Returns the raw mode value.
    pub const fn raw(self) -> u32 {
        self as u32
    }

    /// Parses a raw mode value.
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::RxnTxn),
            1 => Some(Self::RxnTxb),
            2 => Some(Self::RxbTxn),
            3 => Some(Self::RxbTxb),
            _ => None,
        }
    }

    /// Name used in configuration files (`rxb-txb`, ...).
    pub const fn name(self) -> &'static str {
        match self {
            Self::RxnTxn => "rxn-txn",
            Self::RxnTxb => "rxn-txb",
            Self::RxbTxn => "rxb-txn",
            Self::RxbTxb => "rxb-txb",
        }
    }

    /// Parses a configuration name (case-insensitive, `_` accepted for `-`).
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        [Self::RxnTxn, Self::RxnTxb, Self::RxbTxn, Self::RxbTxb].into_iter().find(|mode| {
            mode.name().len() == name.len()
                && mode
                    .name()
                    .bytes()
                    .zip(name.bytes())
                    .all(|(a, b)| a == b.to_ascii_lowercase() || (a == b'-' && b == b'_'))
        })
    }
}

// ——— Software device ids ———

/// Bit position of the interface field in a software device id.
pub const SW_DEVICE_ID_INTERFACE_SHIFT: u32 = 24;
/// Width mask of the interface field.
pub const SW_DEVICE_ID_INTERFACE_MASK: u32 = 0x7;
/// Bit position of the VPU slice field.
pub const SW_DEVICE_ID_VPU_ID_SHIFT: u32 = 1;
/// Width mask of the VPU slice field.
pub const SW_DEVICE_ID_VPU_ID_MASK: u32 = 0x7;
/// Maximum IPC devices (VPU slices) enumerated by one host.
pub const MAX_IPC_DEVICES: usize = 4;
/// Maximum length of a device name in bytes.
pub const MAX_DEVICE_NAME_SIZE: usize = 12;

/// Packed software device id: interface kind plus VPU slice number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SwDeviceId(u32);

impl SwDeviceId {
    /// Encodes a device id for `vpu_id` reached through `iface`.
    pub const fn new(iface: Interface, vpu_id: u32) -> Self {
        let vpu = (vpu_id & SW_DEVICE_ID_VPU_ID_MASK) << SW_DEVICE_ID_VPU_ID_SHIFT;
        let interface = (iface.raw() & SW_DEVICE_ID_INTERFACE_MASK) << SW_DEVICE_ID_INTERFACE_SHIFT;
        Self(vpu | interface)
    }

    /// Encodes the device id of an on-chip VPU slice.
    pub const fn for_ipc_slice(vpu_id: u32) -> Self {
        Self::new(Interface::Ipc, vpu_id)
    }

    /// Wraps a raw id received from a caller.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw id.
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Extracts the raw interface field.
    pub const fn interface_raw(self) -> u32 {
        (self.0 >> SW_DEVICE_ID_INTERFACE_SHIFT) & SW_DEVICE_ID_INTERFACE_MASK
    }

    /// Extracts the interface, `None` for unknown values.
    pub const fn interface(self) -> Option<Interface> {
        Interface::from_raw(self.interface_raw())
    }

    /// Extracts the VPU slice number.
    pub const fn vpu_id(self) -> u32 {
        (self.0 >> SW_DEVICE_ID_VPU_ID_SHIFT) & SW_DEVICE_ID_VPU_ID_MASK
    }
}

impl fmt::Display for SwDeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

// ——— Remote processor state ———

/// Lifecycle state of a remote processor.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum DeviceState {
    /// Powered down, no firmware loaded.
    #[default]
    Off = 0,
    /// Booting or resetting.
    Busy = 1,
    /// Firmware running and accepting channels.
    Ready = 2,
    /// Boot failed or a watchdog fired.
    Error = 3,
    /// Stop requested, not yet complete.
    Stopping = 4,
}

impl DeviceState {
    /// Returns the raw state value reported by `get_device_status`.
    pub const fn raw(self) -> u32 {
        self as u32
    }

    /// Lower-case name used by the CLI.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Busy => "busy",
            Self::Ready => "ready",
            Self::Error => "error",
            Self::Stopping => "stopping",
        }
    }

    /// Applies `event` and returns the next state.
    ///
    /// Ready shares the reset/stop transitions of Error.
    pub const fn on_event(self, event: DeviceEvent) -> Result<Self, InvalidTransition> {
        let next = match (self, event) {
            (Self::Off, DeviceEvent::Boot) => Self::Busy,
            (Self::Busy, DeviceEvent::ReadyOk) => Self::Ready,
            (Self::Busy, DeviceEvent::ReadyFail | DeviceEvent::BootFailed) => Self::Error,
            (Self::Ready, DeviceEvent::NceWatchdogTimeout | DeviceEvent::MssWatchdogTimeout) => {
                Self::Error
            }
            (Self::Ready | Self::Error, DeviceEvent::Reset) => Self::Busy,
            (Self::Ready | Self::Error, DeviceEvent::Stop) => Self::Stopping,
            (Self::Stopping, DeviceEvent::StopComplete) => Self::Off,
            (state, event) => return Err(InvalidTransition { state, event }),
        };
        Ok(next)
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Events driving [`DeviceState`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeviceEvent {
    /// Boot requested.
    Boot,
    /// Boot sequence failed.
    BootFailed,
    /// Reset requested.
    Reset,
    /// Stop requested.
    Stop,
    /// Stop finished.
    StopComplete,
    /// Compute engine watchdog expired.
    NceWatchdogTimeout,
    /// Media subsystem watchdog expired.
    MssWatchdogTimeout,
    /// Firmware reported ready.
    ReadyOk,
    /// Firmware reported a failed start.
    ReadyFail,
}

/// Event not accepted in the current state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InvalidTransition {
    /// State the event was applied to.
    pub state: DeviceState,
    /// Rejected event.
    pub event: DeviceEvent,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event {:?} not valid in state {}", self.event, self.state)
    }
}

// ——— Capabilities ———

bitflags::bitflags! {
    /// Optional operations enabled for a runtime instance.
    ///
    /// A cleared flag makes the operation fail with [`Status::NotSupported`].
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Capabilities: u32 {
        /// Firmware boot of remote processors.
        const BOOT = 1 << 0;
        /// Device reset through a connected handle.
        const RESET = 1 << 1;
        /// Small control-data writes.
        const CONTROL_DATA = 1 << 2;
        /// Volatile writes through the bounce buffer pool.
        const VOLATILE = 1 << 3;
        /// Packet-granular reads.
        const PACKET_READ = 1 << 4;
    }
}

impl Capabilities {
    /// Configuration name of a single flag.
    pub fn flag_name(self) -> Option<&'static str> {
        match self {
            flag if flag == Self::BOOT => Some("boot"),
            flag if flag == Self::RESET => Some("reset"),
            flag if flag == Self::CONTROL_DATA => Some("control-data"),
            flag if flag == Self::VOLATILE => Some("volatile"),
            flag if flag == Self::PACKET_READ => Some("packet-read"),
            _ => None,
        }
    }

    /// Parses a single flag from its configuration name.
    pub fn from_flag_name(name: &str) -> Option<Self> {
        Self::all().iter().find(|flag| flag.flag_name() == Some(name.trim()))
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrips_through_raw() {
        for status in Status::ALL {
            assert_eq!(Status::from_raw(status.raw()), Some(status));
            assert!(status.raw() <= 0);
        }
        assert_eq!(Status::from_raw(-1), None);
        assert_eq!(Status::Timeout.raw(), -110);
        assert!(Status::Success.is_success());
    }

    #[test]
    fn channel_ids_are_bounded() {
        assert!(ChannelId::new(0xFFF).is_some());
        assert!(ChannelId::new(u32::from(NMB_CHANNELS)).is_none());
        assert!(ChannelId::new(u32::MAX).is_none());
        assert!(IP_CONTROL_CHANNEL.is_control());
        assert!(VPU_CONTROL_CHANNEL.is_control());
        assert!(!ChannelId::new(0x10).unwrap().is_control());
    }

    #[test]
    fn routing_table_covers_every_channel() {
        for raw in 0..u32::from(NMB_CHANNELS) {
            let chan = ChannelId::new(raw).unwrap();
            assert!(channel_route(chan).is_some(), "channel {chan} unrouted");
        }
    }

    #[test]
    fn routing_matches_interface_columns() {
        let ipc = ChannelId::new(0x20).unwrap();
        let usb = ChannelId::new(0x5).unwrap();
        let pcie_only = ChannelId::new(0x500).unwrap();
        let eth = ChannelId::new(0xFFF).unwrap();

        assert!(channel_route(ipc).unwrap().permits(Interface::Ipc));
        assert!(channel_route(ipc).unwrap().permits(Interface::Pcie));
        assert!(!channel_route(ipc).unwrap().permits(Interface::Usb));
        assert!(channel_route(usb).unwrap().permits(Interface::Usb));
        assert!(!channel_route(pcie_only).unwrap().permits(Interface::Ipc));
        assert!(channel_route(pcie_only).unwrap().permits(Interface::Pcie));
        assert!(channel_route(eth).unwrap().permits(Interface::Eth));
        assert!(!channel_route(eth).unwrap().permits(Interface::Null));
    }

    #[test]
    fn op_mode_directions() {
        assert!(!OpMode::RxnTxn.rx_blocking() && !OpMode::RxnTxn.tx_blocking());
        assert!(!OpMode::RxnTxb.rx_blocking() && OpMode::RxnTxb.tx_blocking());
        assert!(OpMode::RxbTxn.rx_blocking() && !OpMode::RxbTxn.tx_blocking());
        assert!(OpMode::RxbTxb.rx_blocking() && OpMode::RxbTxb.tx_blocking());
        assert_eq!(OpMode::from_name("RXB_TXN"), Some(OpMode::RxbTxn));
        assert_eq!(OpMode::from_name("rxn-txb"), Some(OpMode::RxnTxb));
        assert_eq!(OpMode::from_name("rx-tx"), None);
        assert_eq!(OpMode::from_raw(4), None);
    }

    #[test]
    fn sw_device_id_layout() {
        let id = SwDeviceId::for_ipc_slice(2);
        assert_eq!(id.raw(), (3 << 24) | (2 << 1));
        assert_eq!(id.vpu_id(), 2);
        assert_eq!(id.interface(), Some(Interface::Ipc));
        // slice numbers wrap at the field width
        assert_eq!(SwDeviceId::for_ipc_slice(9).vpu_id(), 1);
        assert_eq!(SwDeviceId::from_raw(7 << 24).interface(), None);
    }

    #[test]
    fn device_state_machine() {
        let booting = DeviceState::Off.on_event(DeviceEvent::Boot).unwrap();
        assert_eq!(booting, DeviceState::Busy);
        let ready = booting.on_event(DeviceEvent::ReadyOk).unwrap();
        assert_eq!(ready, DeviceState::Ready);
        assert_eq!(ready.on_event(DeviceEvent::Reset), Ok(DeviceState::Busy));
        assert_eq!(ready.on_event(DeviceEvent::MssWatchdogTimeout), Ok(DeviceState::Error));
        assert_eq!(DeviceState::Error.on_event(DeviceEvent::Stop), Ok(DeviceState::Stopping));
        assert_eq!(
            DeviceState::Stopping.on_event(DeviceEvent::StopComplete),
            Ok(DeviceState::Off)
        );
        assert_eq!(
            DeviceState::Off.on_event(DeviceEvent::Reset),
            Err(InvalidTransition { state: DeviceState::Off, event: DeviceEvent::Reset })
        );
        assert!(DeviceState::Busy.on_event(DeviceEvent::Boot).is_err());
    }

    #[test]
    fn capability_names() {
        for flag in Capabilities::all().iter() {
            let name = flag.flag_name().unwrap();
            assert_eq!(Capabilities::from_flag_name(name), Some(flag));
        }
        assert_eq!(Capabilities::from_flag_name("shadow-stack"), None);
        assert_eq!(Capabilities::default(), Capabilities::all());
    }
}
