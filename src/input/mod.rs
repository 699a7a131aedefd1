//! Input device support

pub mod joystick;
