//! Tests for the dispatch manager

use super::*;
use crate::input::joystick::event::Session;
use crate::input::joystick::slots::JoystickSlots;
use crate::input::joystick::subsystem::OpenSessions;
use crate::input::joystick::types::hat;
use crate::input::joystick::virtual_provider::{VirtualDeviceSpec, VirtualProvider};
use proptest::prelude::*;
use std::sync::atomic::AtomicUsize;
use std::time::{Duration, Instant};

fn make_provider() -> VirtualProvider {
    VirtualProvider::new(vec![
        VirtualDeviceSpec::new("Stick A", 2, 1, 1, 4),
        VirtualDeviceSpec::new("Pad B", 3, 0, 1, 8),
        VirtualDeviceSpec::new("Trackball C", 0, 2, 0, 1),
    ])
}

fn make_manager() -> DispatchManager<VirtualProvider> {
    DispatchManager::new(make_provider())
}

fn wait_until(cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    cond()
}

fn assert_thread_matches_registry(manager: &DispatchManager<VirtualProvider>) {
    let occupied = !manager.registered().is_empty();
    assert_eq!(manager.is_dispatching(), occupied);
    assert_eq!(manager.live_dispatch_threads(), usize::from(occupied));
}

fn axis(device: u32, axis: usize, value: SlotValue) -> NativeEvent {
    NativeEvent::AxisMotion {
        device: DeviceId(device),
        axis,
        value,
    }
}

fn button(device: u32, button: usize, pressed: bool) -> NativeEvent {
    NativeEvent::Button {
        device: DeviceId(device),
        button,
        pressed,
    }
}

/// Subsystem whose event queue is already closed
#[derive(Default)]
struct ClosedQueue {
    sessions: OpenSessions,
    waits: AtomicUsize,
}

impl NativeSubsystem for ClosedQueue {
    type Handle = (DeviceId, Session);

    fn enumeration_count(&self) -> usize {
        2
    }

    fn open(&self, id: DeviceId) -> Result<Self::Handle> {
        let session = self.sessions.open(id).ok_or_else(|| JoystickError::OpenFailure {
            id,
            reason: "already open".to_string(),
        })?;
        Ok((id, session))
    }

    fn close(&self, handle: Self::Handle) {
        self.sessions.close(handle.0);
    }

    fn session(&self, handle: &Self::Handle) -> Session {
        handle.1
    }

    fn query_capabilities(&self, _handle: &Self::Handle) -> DeviceCapabilities {
        DeviceCapabilities {
            axes: 1,
            name: "Closed".to_string(),
            ..Default::default()
        }
    }

    fn wait_for_event(&self) -> Result<QueuedEvent> {
        self.waits.fetch_add(1, Ordering::AcqRel);
        Err(JoystickError::QueueClosed)
    }

    fn post_wake_event(&self) {}
}

fn registered_session(manager: &DispatchManager<VirtualProvider>, id: DeviceId) -> Session {
    manager.shared.registry.lock().get(id).map(|entry| entry.session).unwrap()
}

/// Sink that records every call in order
struct RecordingSink {
    owner: String,
    writes: Mutex<Vec<(SlotCategory, usize, SlotValue)>>,
}

impl RecordingSink {
    fn new(owner: &str) -> Self {
        Self {
            owner: owner.to_string(),
            writes: Mutex::new(Vec::new()),
        }
    }

    fn writes(&self) -> Vec<(SlotCategory, usize, SlotValue)> {
        self.writes.lock().clone()
    }
}

impl DeviceSink for RecordingSink {
    fn owner(&self) -> &str {
        &self.owner
    }

    fn materialize_slots(&self, _category: SlotCategory, _count: usize) {}

    fn set_slot(&self, category: SlotCategory, index: usize, value: SlotValue) {
        self.writes.lock().push((category, index, value));
    }

    fn get_slot(&self, _category: SlotCategory, _index: usize) -> Option<SlotValue> {
        None
    }

    fn set_name(&self, _name: &str) {}
}

#[test]
fn test_register_materializes_zeroed_slots() {
    let manager = make_manager();
    let slots = Arc::new(JoystickSlots::new("joystick0"));

    let caps = manager.register(DeviceId(0), slots.clone()).unwrap();
    assert_eq!((caps.axes, caps.balls, caps.hats, caps.buttons), (2, 1, 1, 4));

    assert_eq!(slots.slot_count(SlotCategory::Axis), 2);
    assert_eq!(slots.slot_count(SlotCategory::BallDx), 1);
    assert_eq!(slots.slot_count(SlotCategory::BallDy), 1);
    assert_eq!(slots.slot_count(SlotCategory::Hat), 1);
    assert_eq!(slots.slot_count(SlotCategory::Button), 4);
    assert_eq!(slots.name(), "Stick A");

    let snapshot = slots.snapshot();
    assert_eq!(snapshot.axes, vec![0, 0]);
    assert_eq!(snapshot.ball_dx, vec![0]);
    assert_eq!(snapshot.ball_dy, vec![0]);
    assert_eq!(snapshot.hats, vec![hat::CENTERED]);
    assert_eq!(snapshot.buttons, vec![false; 4]);

    manager.unregister(DeviceId(0)).unwrap();
}

#[test]
fn test_thread_starts_on_first_and_stops_on_last() {
    let manager = make_manager();
    assert_thread_matches_registry(&manager);

    manager
        .register(DeviceId(0), Arc::new(JoystickSlots::new("a")))
        .unwrap();
    assert_thread_matches_registry(&manager);

    manager
        .register(DeviceId(1), Arc::new(JoystickSlots::new("b")))
        .unwrap();
    assert_thread_matches_registry(&manager);

    manager.unregister(DeviceId(0)).unwrap();
    assert_thread_matches_registry(&manager);
    assert_eq!(manager.subsystem().wake_posts(), 0);

    // Thread is parked in a blocking wait with nothing queued
    manager.unregister(DeviceId(1)).unwrap();
    assert_thread_matches_registry(&manager);
    assert_eq!(manager.subsystem().wake_posts(), 1);
    assert_eq!(manager.subsystem().close_calls(), 2);
}

#[test]
fn test_duplicate_registration_fails_and_keeps_first_sink() {
    let manager = make_manager();
    let first = Arc::new(JoystickSlots::new("first"));
    let second = Arc::new(JoystickSlots::new("second"));

    manager.register(DeviceId(0), first.clone()).unwrap();
    manager.subsystem().inject(axis(0, 0, 1234));
    assert!(wait_until(|| first.axis(0) == Some(1234)));

    match manager.register(DeviceId(0), second.clone()) {
        Err(JoystickError::AlreadyRegistered { id, owner }) => {
            assert_eq!(id, DeviceId(0));
            assert_eq!(owner, "first");
        }
        other => panic!("expected AlreadyRegistered, got {:?}", other),
    }

    assert_eq!(first.axis(0), Some(1234));
    assert_eq!(first.slot_count(SlotCategory::Axis), 2);
    assert_eq!(second.slot_count(SlotCategory::Axis), 0);
    assert_eq!(manager.subsystem().open_calls(), 1);
    assert_thread_matches_registry(&manager);

    manager.unregister(DeviceId(0)).unwrap();
}

#[test]
fn test_invalid_id_performs_no_open() {
    let manager = make_manager();
    let slots = Arc::new(JoystickSlots::new("ghost"));

    let err = manager.register(DeviceId(3), slots.clone()).unwrap_err();
    assert!(matches!(
        err,
        JoystickError::InvalidDeviceId {
            id: DeviceId(3),
            available: 3
        }
    ));
    assert_eq!(manager.subsystem().open_calls(), 0);
    assert_eq!(slots.slot_count(SlotCategory::Axis), 0);
    assert_thread_matches_registry(&manager);
}

#[test]
fn test_open_failure_leaves_state_unchanged() {
    let manager = make_manager();
    manager.subsystem().fail_open(DeviceId(1));

    // Failure with an empty registry must not start a thread
    let err = manager
        .register(DeviceId(1), Arc::new(JoystickSlots::new("b")))
        .unwrap_err();
    assert!(matches!(err, JoystickError::OpenFailure { .. }));
    assert_thread_matches_registry(&manager);

    manager
        .register(DeviceId(0), Arc::new(JoystickSlots::new("a")))
        .unwrap();
    let err = manager
        .register(DeviceId(1), Arc::new(JoystickSlots::new("b")))
        .unwrap_err();
    assert!(matches!(err, JoystickError::OpenFailure { .. }));
    assert_eq!(manager.registered(), vec![DeviceId(0)]);
    assert_thread_matches_registry(&manager);

    manager.unregister(DeviceId(0)).unwrap();
    assert_thread_matches_registry(&manager);
}

#[test]
fn test_axis_event_updates_only_target_slot() {
    let manager = make_manager();
    let slots = Arc::new(JoystickSlots::new("joystick0"));
    manager.register(DeviceId(0), slots.clone()).unwrap();

    manager.subsystem().inject(axis(0, 1, 327));
    assert!(wait_until(|| slots.axis(1) == Some(327)));

    let snapshot = slots.snapshot();
    assert_eq!(snapshot.axes, vec![0, 327]);
    assert_eq!(snapshot.ball_dx, vec![0]);
    assert_eq!(snapshot.ball_dy, vec![0]);
    assert_eq!(snapshot.hats, vec![0]);
    assert_eq!(snapshot.buttons, vec![false; 4]);

    manager.unregister(DeviceId(0)).unwrap();
}

#[test]
fn test_ball_hat_and_button_events() {
    let manager = make_manager();
    let slots = Arc::new(JoystickSlots::new("joystick0"));
    manager.register(DeviceId(0), slots.clone()).unwrap();

    let provider = manager.subsystem();
    provider.inject(NativeEvent::BallMotion {
        device: DeviceId(0),
        ball: 0,
        dx: 5,
        dy: -3,
    });
    provider.inject(NativeEvent::BallMotion {
        device: DeviceId(0),
        ball: 0,
        dx: -1,
        dy: 2,
    });
    provider.inject(NativeEvent::HatMotion {
        device: DeviceId(0),
        hat: 0,
        value: hat::LEFT_UP,
    });
    provider.inject(button(0, 2, true));
    provider.inject(button(0, 3, true));
    provider.inject(button(0, 3, false));

    assert!(wait_until(|| manager.stats().delivered == 6));

    // Ball deltas are overwritten, never accumulated
    assert_eq!(slots.ball_dx(0), Some(-1));
    assert_eq!(slots.ball_dy(0), Some(2));
    assert_eq!(slots.hat(0), Some(hat::LEFT_UP));
    assert_eq!(slots.button(2), Some(true));
    assert_eq!(slots.button(3), Some(false));

    manager.unregister(DeviceId(0)).unwrap();
}

#[test]
fn test_ball_deltas_are_two_separate_writes() {
    // A reader can observe a fresh dx next to a stale dy between these
    // two writes; that window is accepted, this pins the write order.
    let manager = make_manager();
    let sink = Arc::new(RecordingSink::new("recorder"));
    manager.register(DeviceId(2), sink.clone()).unwrap();

    manager.subsystem().inject(NativeEvent::BallMotion {
        device: DeviceId(2),
        ball: 1,
        dx: 7,
        dy: 9,
    });
    assert!(wait_until(|| sink.writes().len() == 2));
    assert_eq!(
        sink.writes(),
        vec![(SlotCategory::BallDx, 1, 7), (SlotCategory::BallDy, 1, 9)]
    );

    manager.unregister(DeviceId(2)).unwrap();
}

#[test]
fn test_event_for_unregistered_device_is_dropped() {
    let manager = make_manager();
    let registered = Arc::new(JoystickSlots::new("joystick0"));
    let bystander = Arc::new(JoystickSlots::new("joystick1"));
    manager.register(DeviceId(0), registered.clone()).unwrap();

    manager.subsystem().inject(axis(1, 0, 99));
    manager.subsystem().inject(button(0, 3, true));

    // FIFO: once the marker lands, the foreign event has been processed
    assert!(wait_until(|| manager.stats().delivered == 1));
    assert_eq!(registered.button(3), Some(true));
    assert_eq!(registered.snapshot().axes, vec![0, 0]);
    assert_eq!(bystander.slot_count(SlotCategory::Axis), 0);
    assert_eq!(
        manager.stats(),
        DispatchStats {
            delivered: 1,
            dropped: 1,
            stale: 0,
        }
    );
    assert_thread_matches_registry(&manager);

    manager.unregister(DeviceId(0)).unwrap();
}

#[test]
fn test_wake_without_stop_is_ignored() {
    let manager = make_manager();
    let slots = Arc::new(JoystickSlots::new("joystick0"));
    manager.register(DeviceId(0), slots.clone()).unwrap();

    manager.subsystem().post_wake_event();
    manager.subsystem().inject(axis(0, 0, -200));

    assert!(wait_until(|| slots.axis(0) == Some(-200)));
    assert!(manager.is_dispatching());
    assert_eq!(manager.live_dispatch_threads(), 1);

    manager.unregister(DeviceId(0)).unwrap();
}

#[test]
fn test_no_writes_after_last_unregister_returns() {
    let manager = make_manager();
    let sink = Arc::new(RecordingSink::new("recorder"));
    manager.register(DeviceId(0), sink.clone()).unwrap();

    for i in 0..200 {
        manager.subsystem().inject(axis(0, 0, i));
    }
    manager.unregister(DeviceId(0)).unwrap();
    assert_eq!(manager.live_dispatch_threads(), 0);

    let writes_at_return = sink.writes().len();
    for i in 0..50 {
        manager.subsystem().inject(axis(0, 1, i));
    }
    thread::sleep(Duration::from_millis(50));

    assert_eq!(sink.writes().len(), writes_at_return);
    assert!(manager.subsystem().pending_events() >= 50);
}

#[test]
fn test_reregistration_yields_fresh_slots() {
    let manager = make_manager();
    let slots = Arc::new(JoystickSlots::new("joystick0"));

    manager.register(DeviceId(0), slots.clone()).unwrap();
    manager.subsystem().inject(axis(0, 0, 1000));
    manager.subsystem().inject(button(0, 1, true));
    assert!(wait_until(|| slots.button(1) == Some(true)));
    manager.unregister(DeviceId(0)).unwrap();
    assert!(!manager.subsystem().is_open(DeviceId(0)));

    manager.register(DeviceId(0), slots.clone()).unwrap();
    assert_eq!(slots.axis(0), Some(0));
    assert_eq!(slots.button(1), Some(false));
    assert!(manager.subsystem().is_open(DeviceId(0)));
    assert_thread_matches_registry(&manager);

    manager.unregister(DeviceId(0)).unwrap();
}

/// Queue a burst for `DeviceId(0)`, re-register it with a new sink and check
/// that only events queued after the re-registration reach that sink
fn assert_burst_not_replayed(keep_other_registered: bool) {
    let manager = make_manager();
    let old = Arc::new(RecordingSink::new("old"));
    let other = Arc::new(JoystickSlots::new("other"));
    if keep_other_registered {
        manager.register(DeviceId(1), other.clone()).unwrap();
    }
    manager.register(DeviceId(0), old.clone()).unwrap();

    for i in 0..500 {
        manager.subsystem().inject(axis(0, 0, i));
    }
    manager.unregister(DeviceId(0)).unwrap();
    let old_writes = old.writes().len();

    let fresh = Arc::new(RecordingSink::new("fresh"));
    manager.register(DeviceId(0), fresh.clone()).unwrap();
    manager.subsystem().inject(button(0, 2, true));

    // FIFO: the marker is processed after every event of the burst
    assert!(wait_until(|| !fresh.writes().is_empty()));
    assert_eq!(fresh.writes(), vec![(SlotCategory::Button, 2, 1)]);
    assert_eq!(old.writes().len(), old_writes);
    assert_eq!(manager.subsystem().pending_events(), 0);
    assert_thread_matches_registry(&manager);

    manager.unregister(DeviceId(0)).unwrap();
    if keep_other_registered {
        manager.unregister(DeviceId(1)).unwrap();
    }
}

#[test]
fn test_queued_events_not_replayed_after_last_unregister() {
    assert_burst_not_replayed(false);
}

#[test]
fn test_queued_events_not_replayed_while_others_registered() {
    assert_burst_not_replayed(true);
}

#[test]
fn test_event_from_previous_session_is_stale() {
    let manager = make_manager();
    let slots = Arc::new(JoystickSlots::new("joystick0"));
    manager.register(DeviceId(0), slots.clone()).unwrap();
    let first = registered_session(&manager, DeviceId(0));
    manager.unregister(DeviceId(0)).unwrap();

    manager.register(DeviceId(0), slots.clone()).unwrap();
    let second = registered_session(&manager, DeviceId(0));
    assert_ne!(first, second);

    // Pulled from the queue before the unregister, dispatched after the register
    manager.shared.dispatch(QueuedEvent::stamped(first, axis(0, 0, 700)));
    manager.shared.dispatch(QueuedEvent::unstamped(axis(0, 1, 700)));
    assert_eq!(slots.snapshot().axes, vec![0, 0]);
    assert_eq!(manager.stats().stale, 2);

    manager.shared.dispatch(QueuedEvent::stamped(second, axis(0, 0, 700)));
    assert_eq!(slots.axis(0), Some(700));
    assert_eq!(manager.stats().stale, 2);

    manager.unregister(DeviceId(0)).unwrap();
}

#[test]
fn test_sink_cannot_serve_two_devices() {
    let manager = make_manager();
    let slots = Arc::new(JoystickSlots::new("shared"));
    manager.register(DeviceId(0), slots.clone()).unwrap();
    manager.subsystem().inject(button(0, 2, true));
    assert!(wait_until(|| slots.button(2) == Some(true)));

    let err = manager.register(DeviceId(1), slots.clone()).unwrap_err();
    assert!(matches!(err, JoystickError::SinkInUse { id: DeviceId(0), .. }));

    // The first registration keeps its slots and state
    assert_eq!(slots.button(2), Some(true));
    assert_eq!(slots.slot_count(SlotCategory::Axis), 2);
    assert_eq!(slots.name(), "Stick A");
    assert!(!manager.is_registered(DeviceId(1)));
    assert_eq!(manager.subsystem().open_calls(), 1);

    // Once released, the sink may move to another device
    manager.unregister(DeviceId(0)).unwrap();
    manager.register(DeviceId(1), slots.clone()).unwrap();
    assert_eq!(slots.slot_count(SlotCategory::Axis), 3);
    manager.unregister(DeviceId(1)).unwrap();
}

#[test]
fn test_closed_queue_ends_dispatching() {
    let manager = DispatchManager::new(ClosedQueue::default());
    manager
        .register(DeviceId(0), Arc::new(JoystickSlots::new("a")))
        .unwrap();

    assert!(wait_until(|| !manager.is_dispatching()));
    assert_eq!(manager.live_dispatch_threads(), 0);
    assert!(manager.is_registered(DeviceId(0)));

    // The next registration replaces the exited thread
    manager
        .register(DeviceId(1), Arc::new(JoystickSlots::new("b")))
        .unwrap();
    assert!(wait_until(|| manager.subsystem().waits.load(Ordering::Acquire) == 2));
    assert!(wait_until(|| !manager.is_dispatching()));
    assert_eq!(manager.live_dispatch_threads(), 0);

    manager.unregister(DeviceId(0)).unwrap();
    manager.unregister(DeviceId(1)).unwrap();
    assert!(!manager.is_dispatching());
    assert!(manager.registered().is_empty());
}

#[test]
fn test_unregister_unknown_fails() {
    let manager = make_manager();
    assert!(matches!(
        manager.unregister(DeviceId(0)),
        Err(JoystickError::NotRegistered(DeviceId(0)))
    ));

    manager
        .register(DeviceId(0), Arc::new(JoystickSlots::new("a")))
        .unwrap();
    manager.unregister(DeviceId(0)).unwrap();
    assert!(matches!(
        manager.unregister(DeviceId(0)),
        Err(JoystickError::NotRegistered(DeviceId(0)))
    ));
    assert_eq!(manager.subsystem().close_calls(), 1);
    assert_thread_matches_registry(&manager);
}

#[test]
fn test_events_arrive_in_queue_order() {
    let manager = make_manager();
    let sink = Arc::new(RecordingSink::new("recorder"));
    manager.register(DeviceId(1), sink.clone()).unwrap();

    for value in 1..=100 {
        manager.subsystem().inject(axis(1, 2, value));
    }
    assert!(wait_until(|| sink.writes().len() == 100));

    let values: Vec<SlotValue> = sink.writes().iter().map(|(_, _, v)| *v).collect();
    assert_eq!(values, (1..=100).collect::<Vec<_>>());

    manager.unregister(DeviceId(1)).unwrap();
}

#[test]
fn test_concurrent_registration_of_same_id() {
    let manager = make_manager();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let manager = manager.clone();
            thread::spawn(move || {
                manager.register(DeviceId(0), Arc::new(JoystickSlots::new(format!("owner{}", i))))
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let successes = results.iter().filter(|r| r.is_ok()).count();
    let duplicates = results
        .iter()
        .filter(|r| matches!(r, Err(JoystickError::AlreadyRegistered { .. })))
        .count();

    assert_eq!(successes, 1);
    assert_eq!(duplicates, 7);
    assert_eq!(manager.subsystem().open_calls(), 1);
    assert_thread_matches_registry(&manager);

    manager.unregister(DeviceId(0)).unwrap();
    assert_thread_matches_registry(&manager);
}

#[test]
fn test_concurrent_churn_never_leaks_threads() {
    let manager = make_manager();

    let handles: Vec<_> = (0..3u32)
        .map(|id| {
            let manager = manager.clone();
            thread::spawn(move || {
                for round in 0..25 {
                    let slots = Arc::new(JoystickSlots::new(format!("dev{}-{}", id, round)));
                    manager.register(DeviceId(id), slots).unwrap();
                    manager.subsystem().inject(axis(id, 0, round));
                    assert!(manager.live_dispatch_threads() <= 1);
                    manager.unregister(DeviceId(id)).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert!(manager.registered().is_empty());
    assert_thread_matches_registry(&manager);
    assert_eq!(manager.subsystem().open_calls(), 75);
    assert_eq!(manager.subsystem().close_calls(), 75);
}

#[test]
fn test_manager_cell_retries_failed_init() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let cell = ManagerCell::new(move || {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(JoystickError::SubsystemInitFailure("no backend".to_string()))
        } else {
            Ok(make_provider())
        }
    });

    assert!(matches!(
        cell.get(),
        Err(JoystickError::SubsystemInitFailure(_))
    ));
    assert!(!cell.is_initialized());

    let manager = cell.get().unwrap();
    manager
        .register(DeviceId(0), Arc::new(JoystickSlots::new("a")))
        .unwrap();

    // Later calls share the same registry and do not re-initialize
    let again = cell.get().unwrap();
    assert!(again.is_registered(DeviceId(0)));
    assert_eq!(attempts.load(Ordering::SeqCst), 2);

    again.unregister(DeviceId(0)).unwrap();
}

#[derive(Debug, Clone)]
enum Op {
    Register(u32),
    Unregister(u32),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u32..4).prop_map(Op::Register),
        (0u32..4).prop_map(Op::Unregister),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_thread_runs_iff_registry_non_empty(ops in prop::collection::vec(op_strategy(), 1..24)) {
        let manager = make_manager();

        for op in ops {
            let registered_before = manager.registered();
            let result = match op {
                Op::Register(id) => manager
                    .register(DeviceId(id), Arc::new(JoystickSlots::new(format!("dev{}", id))))
                    .map(|_| ()),
                Op::Unregister(id) => manager.unregister(DeviceId(id)),
            };

            if result.is_err() {
                prop_assert_eq!(manager.registered(), registered_before);
            }
            let occupied = !manager.registered().is_empty();
            prop_assert_eq!(manager.is_dispatching(), occupied);
            prop_assert_eq!(manager.live_dispatch_threads(), usize::from(occupied));
        }

        for id in manager.registered() {
            manager.unregister(id).unwrap();
        }
        prop_assert_eq!(manager.live_dispatch_threads(), 0);
    }
}
