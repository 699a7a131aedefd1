//! Console reporter - logs joystick state changes for testing and debugging
//!
//! Each tick compares the slot revision of every tracked joystick with the
//! one seen at the previous tick and logs a JSON snapshot of those that
//! changed.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::input::joystick::{DeviceId, JoystickSlots, SlotSnapshot};

/// One changed joystick, as logged
#[derive(Debug, Clone, Serialize)]
pub struct StateReport {
    pub time: String,
    pub owner: String,
    pub device: Option<DeviceId>,
    pub revision: u64,
    pub state: SlotSnapshot,
}

struct Tracked {
    owner: String,
    device: Option<DeviceId>,
    slots: Arc<JoystickSlots>,
    last_revision: Option<u64>,
}

/// Periodic change reporter over a set of joysticks
#[derive(Default)]
pub struct Reporter {
    tracked: Vec<Tracked>,
    /// Reports emitted so far, per owner
    emitted: HashMap<String, u64>,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start watching a joystick's slots
    pub fn track(&mut self, owner: impl Into<String>, device: Option<DeviceId>, slots: Arc<JoystickSlots>) {
        self.tracked.push(Tracked {
            owner: owner.into(),
            device,
            slots,
            last_revision: None,
        });
    }

    /// Snapshots of every joystick whose slots changed since the last call
    ///
    /// The first call reports every tracked joystick.
    pub fn collect(&mut self) -> Vec<StateReport> {
        let now = chrono::Local::now().format("%H:%M:%S%.3f").to_string();
        let mut reports = Vec::new();

        for tracked in &mut self.tracked {
            let revision = tracked.slots.revision();
            if tracked.last_revision == Some(revision) {
                continue;
            }
            tracked.last_revision = Some(revision);
            *self.emitted.entry(tracked.owner.clone()).or_default() += 1;

            reports.push(StateReport {
                time: now.clone(),
                owner: tracked.owner.clone(),
                device: tracked.device,
                revision,
                state: tracked.slots.snapshot(),
            });
        }

        reports
    }

    /// Collect changes and log each as one JSON line
    pub fn tick(&mut self) {
        for report in self.collect() {
            match serde_json::to_string(&report.state) {
                Ok(json) => info!(
                    "🎮 [{}] '{}' ({}) r{} {}",
                    report.time,
                    report.owner,
                    report
                        .device
                        .map(|id| id.to_string())
                        .unwrap_or_else(|| "unbound".to_string()),
                    report.revision,
                    json
                ),
                Err(e) => warn!("Failed to serialize state of '{}': {}", report.owner, e),
            }
        }
    }

    /// Number of reports emitted for `owner`
    pub fn emitted(&self, owner: &str) -> u64 {
        self.emitted.get(owner).copied().unwrap_or(0)
    }

    /// Log a per-joystick summary
    pub fn summary(&self) {
        for tracked in &self.tracked {
            debug!(
                owner = tracked.owner,
                reports = self.emitted(&tracked.owner),
                "Reporter summary"
            );
        }
        info!("🛑 Reporter stopped ({} joystick(s) tracked)", self.tracked.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::joystick::{DeviceSink, SlotCategory};

    fn slots() -> Arc<JoystickSlots> {
        let slots = Arc::new(JoystickSlots::new("left"));
        slots.materialize_slots(SlotCategory::Axis, 2);
        slots.materialize_slots(SlotCategory::Button, 1);
        slots.set_name("Virtual Stick");
        slots
    }

    #[test]
    fn test_first_collect_reports_everything() {
        let mut reporter = Reporter::new();
        reporter.track("left", Some(DeviceId(0)), slots());

        let reports = reporter.collect();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].state.name, "Virtual Stick");
        assert_eq!(reports[0].device, Some(DeviceId(0)));
    }

    #[test]
    fn test_only_changed_devices_are_reported() {
        let left = slots();
        let right = slots();
        let mut reporter = Reporter::new();
        reporter.track("left", Some(DeviceId(0)), left.clone());
        reporter.track("right", Some(DeviceId(1)), right);
        reporter.collect();

        assert!(reporter.collect().is_empty());

        left.set_slot(SlotCategory::Axis, 1, -200);
        let reports = reporter.collect();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].owner, "left");
        assert_eq!(reports[0].state.axes, vec![0, -200]);

        assert_eq!(reporter.emitted("left"), 2);
        assert_eq!(reporter.emitted("right"), 1);
    }

    #[test]
    fn test_report_serializes_to_json() {
        let mut reporter = Reporter::new();
        reporter.track("left", None, slots());
        let report = reporter.collect().remove(0);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["owner"], "left");
        assert!(json["device"].is_null());
        assert_eq!(json["state"]["buttons"], serde_json::json!([false]));

        // Logging path must not panic
        reporter.tick();
        reporter.summary();
    }
}
