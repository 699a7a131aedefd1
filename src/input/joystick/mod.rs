//! Joystick device dispatch
//!
//! Registers joysticks with a [`DispatchManager`], which opens them through a
//! [`NativeSubsystem`] and runs one background thread that routes native
//! events into each device's [`JoystickSlots`].
//!
//! Two subsystems are provided: [`GilrsProvider`] for real gamepads and
//! [`VirtualProvider`] for in-memory devices.

pub mod controls;
pub mod device;
pub mod diagnostics;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod provider;
pub mod registry;
pub mod slots;
pub mod subsystem;
pub mod types;
pub mod virtual_provider;

pub use device::JoystickDevice;
pub use dispatcher::{DispatchManager, DispatchStats, ManagerCell};
pub use error::{JoystickError, Result};
pub use event::{NativeEvent, QueuedEvent, Session};
pub use provider::{GilrsProvider, GilrsSettings};
pub use slots::{DeviceSink, JoystickSlots, SlotSnapshot};
pub use subsystem::{NativeSubsystem, OpenSessions};
pub use types::{DeviceCapabilities, DeviceId, SlotCategory, SlotValue};
pub use virtual_provider::{VirtualDeviceSpec, VirtualProvider};
