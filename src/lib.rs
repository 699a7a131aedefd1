//! Joybridge - joystick and gamepad state bridge
//!
//! Library crate exposing the device dispatch core and the application
//! building blocks used by the `joybridge` binary.

pub mod config;
pub mod input;
pub mod paths;
pub mod reporter;
