//! Host-facing joystick object
//!
//! A [`JoystickDevice`] owns a [`JoystickSlots`] sink and binds it to one
//! device id through the dispatch manager. Dropping the device unregisters
//! it, which closes the native handle and, for the last device, stops the
//! dispatch thread.

use std::sync::Arc;
use tracing::{debug, warn};

use super::dispatcher::DispatchManager;
use super::error::Result;
use super::slots::{DeviceSink, JoystickSlots};
use super::subsystem::NativeSubsystem;
use super::types::{DeviceCapabilities, DeviceId};

/// Joystick bound (or not yet bound) to a native device
pub struct JoystickDevice<S: NativeSubsystem> {
    manager: DispatchManager<S>,
    slots: Arc<JoystickSlots>,
    id: Option<DeviceId>,
}

impl<S: NativeSubsystem> JoystickDevice<S> {
    /// Create an unbound device
    ///
    /// # Arguments
    /// * `manager` - Manager the device registers with
    /// * `owner` - Name reported in registration diagnostics
    pub fn new(manager: &DispatchManager<S>, owner: impl Into<String>) -> Self {
        Self {
            manager: manager.clone(),
            slots: Arc::new(JoystickSlots::new(owner)),
            id: None,
        }
    }

    /// Bind to device `id` and start receiving its events
    ///
    /// A device that is already bound releases its current id first.
    /// On error the device is left unbound.
    pub fn init(&mut self, id: DeviceId) -> Result<DeviceCapabilities> {
        if let Some(current) = self.id.take() {
            debug!("'{}' rebinding from {} to {}", self.owner(), current, id);
            self.manager.unregister(current)?;
        }

        let capabilities = self.manager.register(id, self.slots.clone())?;
        self.id = Some(id);
        Ok(capabilities)
    }

    /// Release the bound device, if any
    pub fn release(&mut self) -> Result<()> {
        match self.id.take() {
            Some(id) => self.manager.unregister(id),
            None => Ok(()),
        }
    }

    pub fn id(&self) -> Option<DeviceId> {
        self.id
    }

    pub fn is_bound(&self) -> bool {
        self.id.is_some()
    }

    pub fn owner(&self) -> &str {
        self.slots.owner()
    }

    /// Slot state written by the dispatch thread
    pub fn slots(&self) -> &Arc<JoystickSlots> {
        &self.slots
    }
}

impl<S: NativeSubsystem> Drop for JoystickDevice<S> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("Failed to release joystick '{}': {}", self.owner(), e);
        }
    }
}
