//! Indexed control layout for gilrs gamepads
//!
//! gilrs names controls (`Axis::LeftStickX`, `Button::South`, ...) while the
//! dispatcher works with indexed slots. A [`ControlLayout`] fixes, per
//! device, which gilrs controls exist and at which index they live.
//!
//! - Axes are probed in [`AXIS_ORDER`]; only those the device reports a code
//!   for get a slot.
//! - Buttons are probed in [`BUTTON_ORDER`]; d-pad buttons are excluded.
//! - Any d-pad code (button or axis) gives the device one hat, fed by
//!   [`HatState`].

use gilrs::{Axis, Button};

use super::types::{hat, DeviceCapabilities, SlotValue};

/// Largest magnitude written into an axis slot
pub const AXIS_RAW_MAX: f32 = 32767.0;

/// Axes probed on every gamepad, in slot order
pub const AXIS_ORDER: [Axis; 6] = [
    Axis::LeftStickX,
    Axis::LeftStickY,
    Axis::LeftZ,
    Axis::RightStickX,
    Axis::RightStickY,
    Axis::RightZ,
];

/// Buttons probed on every gamepad, in slot order
pub const BUTTON_ORDER: [Button; 15] = [
    Button::South,
    Button::East,
    Button::North,
    Button::West,
    Button::C,
    Button::Z,
    Button::LeftTrigger,
    Button::LeftTrigger2,
    Button::RightTrigger,
    Button::RightTrigger2,
    Button::Select,
    Button::Start,
    Button::Mode,
    Button::LeftThumb,
    Button::RightThumb,
];

/// D-pad buttons, folded into hat 0
pub const DPAD_BUTTONS: [Button; 4] = [
    Button::DPadUp,
    Button::DPadDown,
    Button::DPadLeft,
    Button::DPadRight,
];

/// Which gilrs controls a device has, and their slot indices
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlLayout {
    axes: Vec<Axis>,
    buttons: Vec<Button>,
    has_hat: bool,
}

impl ControlLayout {
    /// Build a layout by probing which controls the device supports
    ///
    /// # Arguments
    /// * `has_axis` - Whether the device reports a code for an axis
    /// * `has_button` - Whether the device reports a code for a button
    pub fn probe(has_axis: impl Fn(Axis) -> bool, has_button: impl Fn(Button) -> bool) -> Self {
        let axes = AXIS_ORDER.iter().copied().filter(|&a| has_axis(a)).collect();
        let buttons = BUTTON_ORDER.iter().copied().filter(|&b| has_button(b)).collect();
        let has_hat = DPAD_BUTTONS.iter().any(|&b| has_button(b))
            || has_axis(Axis::DPadX)
            || has_axis(Axis::DPadY);

        Self {
            axes,
            buttons,
            has_hat,
        }
    }

    pub fn axis_index(&self, axis: Axis) -> Option<usize> {
        self.axes.iter().position(|&a| a == axis)
    }

    pub fn button_index(&self, button: Button) -> Option<usize> {
        self.buttons.iter().position(|&b| b == button)
    }

    pub fn has_hat(&self) -> bool {
        self.has_hat
    }

    /// Capability counts for this layout (gilrs exposes no trackballs)
    pub fn capabilities(&self, name: &str) -> DeviceCapabilities {
        DeviceCapabilities {
            axes: self.axes.len(),
            balls: 0,
            hats: usize::from(self.has_hat),
            buttons: self.buttons.len(),
            name: name.to_string(),
        }
    }
}

/// Scale a gilrs axis value (-1.0..=1.0) to the raw signed 16-bit range
pub fn scale_axis(value: f32) -> SlotValue {
    (value.clamp(-1.0, 1.0) * AXIS_RAW_MAX).round() as SlotValue
}

/// Hat bit for a d-pad button
pub fn dpad_bit(button: Button) -> Option<SlotValue> {
    match button {
        Button::DPadUp => Some(hat::UP),
        Button::DPadDown => Some(hat::DOWN),
        Button::DPadLeft => Some(hat::LEFT),
        Button::DPadRight => Some(hat::RIGHT),
        _ => None,
    }
}

/// Current d-pad position of one device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HatState {
    bits: SlotValue,
}

impl HatState {
    pub fn value(&self) -> SlotValue {
        self.bits
    }

    /// Apply a d-pad button press or release
    ///
    /// # Returns
    /// `true` if the hat value changed
    pub fn apply_button(&mut self, button: Button, pressed: bool) -> bool {
        let Some(bit) = dpad_bit(button) else {
            return false;
        };
        let before = self.bits;
        if pressed {
            self.bits |= bit;
        } else {
            self.bits &= !bit;
        }
        before != self.bits
    }

    /// Apply a d-pad axis value (`DPadX`: right positive, `DPadY`: up positive)
    ///
    /// # Returns
    /// `true` if the hat value changed
    pub fn apply_axis(&mut self, axis: Axis, value: f32) -> bool {
        let (negative, positive) = match axis {
            Axis::DPadX => (hat::LEFT, hat::RIGHT),
            Axis::DPadY => (hat::DOWN, hat::UP),
            _ => return false,
        };
        let before = self.bits;
        self.bits &= !(negative | positive);
        if value > 0.5 {
            self.bits |= positive;
        } else if value < -0.5 {
            self.bits |= negative;
        }
        before != self.bits
    }
}
