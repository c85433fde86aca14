// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy and its mapping onto integer status codes.

use std::io;
use std::path::PathBuf;

use xlink_abi::{InvalidTransition, Status};

/// Result alias used across the runtime.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors produced by the xlink runtime.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No device matches the requested name or id.
    #[error("device not found")]
    DeviceNotFound,
    /// Channel id out of range, reserved, or not routable for the device.
    #[error("invalid channel")]
    InvalidChannel,
    /// Deadline expired before the operation completed.
    #[error("operation timed out")]
    Timeout,
    /// Channel is closed, or was closed while the operation was blocked.
    #[error("channel closed")]
    ChannelClosed,
    /// Capability disabled for this runtime instance.
    #[error("operation not supported by this configuration")]
    NotSupported,
    /// Channel is already open on this handle.
    #[error("channel already open")]
    AlreadyOpen,
    /// Device already has a live handle.
    #[error("device already connected")]
    AlreadyConnected,
    /// Handle id does not refer to a live connection.
    #[error("invalid handle")]
    InvalidHandle,
    /// Device is booting or resetting.
    #[error("device busy")]
    DeviceBusy,
    /// Device has not been booted, or stopped.
    #[error("device not ready")]
    DeviceNotReady,
    /// Connection table is full.
    #[error("connection table full")]
    TooManyConnections,
    /// Argument rejected before any side effect.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// Remote processor did not respond.
    #[error("remote did not respond")]
    CommunicationFail,
    /// Non-blocking attempt could not make progress.
    #[error("operation would block")]
    WouldBlock,
    /// Firmware image could not be read.
    #[error("failed to read firmware {path}: {source}")]
    Firmware {
        /// Image path supplied by the caller.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Device state machine rejected the request.
    #[error("device state: {0}")]
    InvalidState(InvalidTransition),
}

impl Error {
    /// Status code reported for this error.
    pub fn status(&self) -> Status {
        match self {
            Self::DeviceNotFound => Status::DeviceNotFound,
            Self::InvalidChannel => Status::InvalidChannel,
            Self::Timeout => Status::Timeout,
            Self::ChannelClosed => Status::ChannelClosed,
            Self::NotSupported => Status::NotSupported,
            Self::AlreadyOpen => Status::AlreadyOpen,
            Self::AlreadyConnected => Status::AlreadyConnected,
            Self::InvalidHandle => Status::InvalidHandle,
            Self::DeviceBusy | Self::InvalidState(_) => Status::DeviceBusy,
            Self::DeviceNotReady => Status::DeviceNotReady,
            Self::TooManyConnections => Status::TooManyConnections,
            Self::InvalidArgument(_) => Status::InvalidArgument,
            Self::CommunicationFail => Status::CommunicationFail,
            Self::WouldBlock => Status::WouldBlock,
            Self::Firmware { .. } => Status::Io,
        }
    }
}

impl From<InvalidTransition> for Error {
    fn from(value: InvalidTransition) -> Self {
        Self::InvalidState(value)
    }
}

impl From<Error> for i32 {
    fn from(value: Error) -> Self {
        value.status().raw()
    }
}

/// Failure of a read or write after `transferred` bytes already moved.
#[derive(Debug, thiserror::Error)]
#[error("{error} after {transferred} bytes")]
pub struct TransferError {
    /// Bytes moved before the failure.
    pub transferred: usize,
    /// Failure that stopped the transfer.
    #[source]
    pub error: Error,
}

impl TransferError {
    /// Wraps `error` after `transferred` bytes.
    pub fn new(transferred: usize, error: Error) -> Self {
        Self { transferred, error }
    }

    /// Status code of the underlying error.
    pub fn status(&self) -> Status {
        self.error.status()
    }
}

impl From<Error> for TransferError {
    fn from(error: Error) -> Self {
        Self::new(0, error)
    }
}

/// Collapses a result into the integer status convention (0 or negative).
pub fn status_of<T>(result: &Result<T>) -> i32 {
    match result {
        Ok(_) => Status::Success.raw(),
        Err(err) => err.status().raw(),
    }
}
