//! Device state sinks
//!
//! A sink is the per-device consumer of dispatched events. The dispatcher
//! only depends on the [`DeviceSink`] trait; [`JoystickSlots`] is the
//! concrete sink backing a [`JoystickDevice`](super::device::JoystickDevice).
//!
//! Slot layout per device:
//! - `axis0..axisN`     absolute axis positions
//! - `ballDX0..`, `ballDY0..` last relative trackball deltas
//! - `hat0..hatN`       hat bit flags
//! - `button0..buttonN` 0 / 1
//! - `name`             display name reported by the device

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

use super::types::{SlotCategory, SlotValue};

/// Consumer of dispatched device state
///
/// Note: All methods take &self (not &mut self) to support `Arc<dyn DeviceSink>`
/// shared between the registry and the host binding.
pub trait DeviceSink: Send + Sync {
    /// Identity of the object owning this sink, used in diagnostics
    fn owner(&self) -> &str;

    /// Replace the slots of `category` with `count` zeroed cells
    fn materialize_slots(&self, category: SlotCategory, count: usize);

    /// Write one slot
    fn set_slot(&self, category: SlotCategory, index: usize, value: SlotValue);

    /// Read one slot (`None` if the index was never materialized)
    fn get_slot(&self, category: SlotCategory, index: usize) -> Option<SlotValue>;

    /// Set the display name slot
    fn set_name(&self, name: &str);
}

#[derive(Debug, Default)]
struct SlotCells {
    axes: Vec<SlotValue>,
    ball_dx: Vec<SlotValue>,
    ball_dy: Vec<SlotValue>,
    hats: Vec<SlotValue>,
    buttons: Vec<SlotValue>,
}

impl SlotCells {
    fn column(&self, category: SlotCategory) -> &Vec<SlotValue> {
        match category {
            SlotCategory::Axis => &self.axes,
            SlotCategory::BallDx => &self.ball_dx,
            SlotCategory::BallDy => &self.ball_dy,
            SlotCategory::Hat => &self.hats,
            SlotCategory::Button => &self.buttons,
        }
    }

    fn column_mut(&mut self, category: SlotCategory) -> &mut Vec<SlotValue> {
        match category {
            SlotCategory::Axis => &mut self.axes,
            SlotCategory::BallDx => &mut self.ball_dx,
            SlotCategory::BallDy => &mut self.ball_dy,
            SlotCategory::Hat => &mut self.hats,
            SlotCategory::Button => &mut self.buttons,
        }
    }
}

/// Point-in-time copy of every slot of a device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSnapshot {
    pub name: String,
    pub axes: Vec<SlotValue>,
    pub ball_dx: Vec<SlotValue>,
    pub ball_dy: Vec<SlotValue>,
    pub hats: Vec<SlotValue>,
    pub buttons: Vec<bool>,
}

/// Indexed, observable state slots of one joystick
///
/// Every write takes the cell lock, so readers never see a torn slot.
/// Ball deltas are two separate writes (dx, then dy): a reader between
/// them sees a fresh dx next to the previous dy.
#[derive(Debug)]
pub struct JoystickSlots {
    owner: String,
    name: RwLock<String>,
    cells: RwLock<SlotCells>,
    /// Bumped on every write, lets readers detect changes cheaply
    revision: AtomicU64,
}

impl JoystickSlots {
    /// Create an empty sink owned by `owner`
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: RwLock::new(String::new()),
            cells: RwLock::new(SlotCells::default()),
            revision: AtomicU64::new(0),
        }
    }

    pub fn axis(&self, index: usize) -> Option<SlotValue> {
        self.get_slot(SlotCategory::Axis, index)
    }

    pub fn ball_dx(&self, index: usize) -> Option<SlotValue> {
        self.get_slot(SlotCategory::BallDx, index)
    }

    pub fn ball_dy(&self, index: usize) -> Option<SlotValue> {
        self.get_slot(SlotCategory::BallDy, index)
    }

    pub fn hat(&self, index: usize) -> Option<SlotValue> {
        self.get_slot(SlotCategory::Hat, index)
    }

    pub fn button(&self, index: usize) -> Option<bool> {
        self.get_slot(SlotCategory::Button, index).map(|v| v != 0)
    }

    pub fn name(&self) -> String {
        self.name.read().clone()
    }

    /// Number of materialized slots in a category
    pub fn slot_count(&self, category: SlotCategory) -> usize {
        self.cells.read().column(category).len()
    }

    /// Host-visible names of every materialized slot, in category order
    pub fn slot_names(&self) -> Vec<String> {
        let cells = self.cells.read();
        SlotCategory::ALL
            .iter()
            .flat_map(|&category| {
                (0..cells.column(category).len()).map(move |i| category.slot_name(i))
            })
            .chain(std::iter::once("name".to_string()))
            .collect()
    }

    /// Write counter, incremented on every slot or name update
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    /// Copy all slots
    pub fn snapshot(&self) -> SlotSnapshot {
        let cells = self.cells.read();
        SlotSnapshot {
            name: self.name(),
            axes: cells.axes.clone(),
            ball_dx: cells.ball_dx.clone(),
            ball_dy: cells.ball_dy.clone(),
            hats: cells.hats.clone(),
            buttons: cells.buttons.iter().map(|&v| v != 0).collect(),
        }
    }

    fn bump(&self) {
        self.revision.fetch_add(1, Ordering::AcqRel);
    }
}

impl DeviceSink for JoystickSlots {
    fn owner(&self) -> &str {
        &self.owner
    }

    fn materialize_slots(&self, category: SlotCategory, count: usize) {
        debug!("{}: materializing {} {} slot(s)", self.owner, count, category.prefix());
        let mut cells = self.cells.write();
        let column = cells.column_mut(category);
        column.clear();
        column.resize(count, 0);
        drop(cells);
        self.bump();
    }

    fn set_slot(&self, category: SlotCategory, index: usize, value: SlotValue) {
        let mut cells = self.cells.write();
        match cells.column_mut(category).get_mut(index) {
            Some(cell) => *cell = value,
            None => {
                trace!(
                    "{}: ignoring write to unmaterialized slot {}",
                    self.owner,
                    category.slot_name(index)
                );
                return;
            }
        }
        drop(cells);
        self.bump();
    }

    fn get_slot(&self, category: SlotCategory, index: usize) -> Option<SlotValue> {
        self.cells.read().column(category).get(index).copied()
    }

    fn set_name(&self, name: &str) {
        *self.name.write() = name.to_string();
        self.bump();
    }
}
