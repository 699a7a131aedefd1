//! Shared joystick types
//!
//! Device identifiers, the immutable capability model captured at
//! registration time, and the slot categories a sink exposes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Value stored in a single state slot
///
/// Axes and hats carry the raw native integer, buttons carry `0`/`1`,
/// ball slots carry the last relative displacement.
pub type SlotValue = i32;

/// Device identifier assigned by the native subsystem's enumeration order
///
/// Unique among currently registered devices; may be reused after the
/// device is unregistered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub u32);

impl DeviceId {
    /// Position of this device in the enumeration order
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for DeviceId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "joy{}", self.0)
    }
}

/// What a device exposes, queried once when it is registered
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCapabilities {
    pub axes: usize,
    pub balls: usize,
    pub hats: usize,
    pub buttons: usize,
    pub name: String,
}

impl DeviceCapabilities {
    /// Number of slots to materialize for a category
    ///
    /// Each ball contributes one `BallDx` and one `BallDy` slot.
    pub fn slot_count(&self, category: SlotCategory) -> usize {
        match category {
            SlotCategory::Axis => self.axes,
            SlotCategory::BallDx | SlotCategory::BallDy => self.balls,
            SlotCategory::Hat => self.hats,
            SlotCategory::Button => self.buttons,
        }
    }
}

/// Indexed slot families of a device sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotCategory {
    Axis,
    BallDx,
    BallDy,
    Hat,
    Button,
}

impl SlotCategory {
    /// All categories, in materialization order
    pub const ALL: [SlotCategory; 5] = [
        SlotCategory::Axis,
        SlotCategory::BallDx,
        SlotCategory::BallDy,
        SlotCategory::Hat,
        SlotCategory::Button,
    ];

    /// Prefix of the host-visible slot name (`axis0`, `ballDX0`, ...)
    pub fn prefix(self) -> &'static str {
        match self {
            SlotCategory::Axis => "axis",
            SlotCategory::BallDx => "ballDX",
            SlotCategory::BallDy => "ballDY",
            SlotCategory::Hat => "hat",
            SlotCategory::Button => "button",
        }
    }

    /// Host-visible name of the slot at `index`
    pub fn slot_name(self, index: usize) -> String {
        format!("{}{}", self.prefix(), index)
    }
}

/// Hat (d-pad) positions as bit flags; diagonals are ORed together
pub mod hat {
    pub const CENTERED: i32 = 0x00;
    pub const UP: i32 = 0x01;
    pub const RIGHT: i32 = 0x02;
    pub const DOWN: i32 = 0x04;
    pub const LEFT: i32 = 0x08;
    pub const RIGHT_UP: i32 = RIGHT | UP;
    pub const RIGHT_DOWN: i32 = RIGHT | DOWN;
    pub const LEFT_UP: i32 = LEFT | UP;
    pub const LEFT_DOWN: i32 = LEFT | DOWN;
}
