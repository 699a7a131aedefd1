//! Typed events delivered by the native device queue

use super::types::{DeviceId, SlotValue};

/// One event pulled from the native queue
///
/// Indices are trusted to be within the capability counts the device
/// reported when it was opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeEvent {
    /// Absolute axis position (raw native range)
    AxisMotion {
        device: DeviceId,
        axis: usize,
        value: SlotValue,
    },
    /// Relative trackball displacement since the previous event
    BallMotion {
        device: DeviceId,
        ball: usize,
        dx: SlotValue,
        dy: SlotValue,
    },
    /// Hat position as [`hat`](super::types::hat) bit flags
    HatMotion {
        device: DeviceId,
        hat: usize,
        value: SlotValue,
    },
    /// Button press or release
    Button {
        device: DeviceId,
        button: usize,
        pressed: bool,
    },
    /// Synthetic event posted to unblock a waiting consumer
    Wake,
}

impl NativeEvent {
    /// Device the event belongs to (`None` for [`NativeEvent::Wake`])
    pub fn device(&self) -> Option<DeviceId> {
        match self {
            NativeEvent::AxisMotion { device, .. }
            | NativeEvent::BallMotion { device, .. }
            | NativeEvent::HatMotion { device, .. }
            | NativeEvent::Button { device, .. } => Some(*device),
            NativeEvent::Wake => None,
        }
    }
}

/// Number the subsystem assigns to every successful `open`
///
/// Never reused within one subsystem, so an event stamped with an old
/// session cannot be mistaken for one of a later registration.
pub type Session = u64;

/// Event as pulled from the native queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedEvent {
    /// Session of the device when the event was produced; `None` if the
    /// device was not open then, and for [`NativeEvent::Wake`]
    pub session: Option<Session>,
    pub event: NativeEvent,
}

impl QueuedEvent {
    pub fn stamped(session: Session, event: NativeEvent) -> Self {
        Self {
            session: Some(session),
            event,
        }
    }

    pub fn unstamped(event: NativeEvent) -> Self {
        Self {
            session: None,
            event,
        }
    }
}
