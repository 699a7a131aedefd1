//! Error types for device registration and dispatch

use super::types::DeviceId;
use thiserror::Error;

/// Errors surfaced by the dispatch manager and native providers
///
/// None of these are retried internally; retry policy belongs to the caller.
#[derive(Debug, Error)]
pub enum JoystickError {
    /// Identifier outside the current enumeration range
    #[error("Invalid device id {id}: only {available} device(s) enumerated")]
    InvalidDeviceId { id: DeviceId, available: usize },

    /// Identifier already registered; `owner` names the current registrant
    #[error("Device {id} is already registered by '{owner}'")]
    AlreadyRegistered { id: DeviceId, owner: String },

    /// The sink is already receiving events for another device
    #[error("Sink of '{owner}' is already registered for device {id}")]
    SinkInUse { id: DeviceId, owner: String },

    /// Unregistration of an identifier that is not registered
    #[error("Device {0} is not registered")]
    NotRegistered(DeviceId),

    /// Native open call failed
    #[error("Could not open device {id}: {reason}")]
    OpenFailure { id: DeviceId, reason: String },

    /// Native device subsystem failed to initialize
    #[error("Device subsystem failed to initialize: {0}")]
    SubsystemInitFailure(String),

    /// The OS refused to start a worker thread (dispatch, pump or feeder)
    #[error("Failed to spawn thread: {0}")]
    ThreadSpawn(#[from] std::io::Error),

    /// The native event queue has no producer left
    #[error("Device event queue closed")]
    QueueClosed,
}

/// Result alias for joystick operations
pub type Result<T> = std::result::Result<T, JoystickError>;
