//! In-memory device provider
//!
//! Implements [`NativeSubsystem`] without hardware: devices come from a
//! fixed list, events are injected by hand (or by a feeder thread) into a
//! crossbeam channel that stands in for the native queue. Injected events are
//! stamped with the device's session at injection time, like a driver that
//! tags events with the open they belong to. Used by the test suite and by
//! `backend: virtual`.

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info};

use super::error::{JoystickError, Result};
use super::event::{NativeEvent, QueuedEvent, Session};
use super::subsystem::{NativeSubsystem, OpenSessions};
use super::types::{hat, DeviceCapabilities, DeviceId, SlotValue};

/// Name given to the feeder thread
pub const FEEDER_THREAD_NAME: &str = "virtual-feeder";

/// Description of one virtual device
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct VirtualDeviceSpec {
    pub name: String,
    #[serde(default)]
    pub axes: usize,
    #[serde(default)]
    pub balls: usize,
    #[serde(default)]
    pub hats: usize,
    #[serde(default)]
    pub buttons: usize,
}

impl VirtualDeviceSpec {
    pub fn new(name: impl Into<String>, axes: usize, balls: usize, hats: usize, buttons: usize) -> Self {
        Self {
            name: name.into(),
            axes,
            balls,
            hats,
            buttons,
        }
    }

    pub fn capabilities(&self) -> DeviceCapabilities {
        DeviceCapabilities {
            axes: self.axes,
            balls: self.balls,
            hats: self.hats,
            buttons: self.buttons,
            name: self.name.clone(),
        }
    }
}

/// Handle to an opened virtual device
#[derive(Debug)]
pub struct VirtualHandle {
    id: DeviceId,
    session: Session,
}

impl VirtualHandle {
    pub fn id(&self) -> DeviceId {
        self.id
    }
}

/// Cloneable event source for feeding a [`VirtualProvider`] from another thread
#[derive(Clone)]
pub struct VirtualInjector {
    tx: Sender<QueuedEvent>,
    sessions: Arc<OpenSessions>,
}

impl VirtualInjector {
    /// Queue `event` stamped with its device's current session
    ///
    /// Returns false once the provider is gone.
    pub fn send(&self, event: NativeEvent) -> bool {
        self.tx.send(self.sessions.stamp(event)).is_ok()
    }
}

/// Virtual device subsystem
pub struct VirtualProvider {
    devices: Vec<VirtualDeviceSpec>,
    failing: Mutex<HashSet<DeviceId>>,
    open_calls: AtomicUsize,
    close_calls: AtomicUsize,
    wake_posts: AtomicUsize,
    injector: VirtualInjector,
    event_rx: Receiver<QueuedEvent>,
}

impl VirtualProvider {
    /// Create a provider enumerating `devices` in order (ids `0..len`)
    pub fn new(devices: Vec<VirtualDeviceSpec>) -> Self {
        let (event_tx, event_rx) = channel::unbounded();
        Self {
            devices,
            failing: Mutex::new(HashSet::new()),
            open_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
            wake_posts: AtomicUsize::new(0),
            injector: VirtualInjector {
                tx: event_tx,
                sessions: Arc::new(OpenSessions::new()),
            },
            event_rx,
        }
    }

    /// Queue an event as if the hardware had produced it
    pub fn inject(&self, event: NativeEvent) {
        // The provider owns the receiver, so the queue cannot be disconnected
        self.injector.send(event);
    }

    /// Injector for feeding events from another thread
    pub fn injector(&self) -> VirtualInjector {
        self.injector.clone()
    }

    /// Make every future `open` of `id` fail
    pub fn fail_open(&self, id: DeviceId) {
        self.failing.lock().insert(id);
    }

    pub fn is_open(&self, id: DeviceId) -> bool {
        self.injector.sessions.is_open(id)
    }

    pub fn open_calls(&self) -> usize {
        self.open_calls.load(Ordering::Acquire)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::Acquire)
    }

    pub fn wake_posts(&self) -> usize {
        self.wake_posts.load(Ordering::Acquire)
    }

    /// Events queued and not yet consumed
    pub fn pending_events(&self) -> usize {
        self.event_rx.len()
    }

    /// Enumerated device descriptions
    pub fn devices(&self) -> &[VirtualDeviceSpec] {
        &self.devices
    }

    /// Start a thread injecting synthetic input for every device
    ///
    /// One tick per `period`; see [`synthetic_events`] for the pattern.
    pub fn spawn_feeder(&self, period: Duration) -> Result<Feeder> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let devices = self.devices.clone();
        let injector = self.injector();

        let join = thread::Builder::new()
            .name(FEEDER_THREAD_NAME.to_string())
            .spawn(move || {
                let mut tick = 0u64;
                while !thread_stop.load(Ordering::Acquire) {
                    for event in synthetic_events(&devices, tick) {
                        if !injector.send(event) {
                            return;
                        }
                    }
                    tick = tick.wrapping_add(1);
                    thread::sleep(period);
                }
            })?;

        info!("Virtual feeder started ({} ms period)", period.as_millis());
        Ok(Feeder {
            stop,
            join: Some(join),
        })
    }
}

/// Running feeder thread, stopped and joined on drop
pub struct Feeder {
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl Drop for Feeder {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                error!("Virtual feeder thread panicked");
            }
        }
        debug!("Virtual feeder stopped");
    }
}

/// Hat positions cycled by the feeder
const HAT_CYCLE: [SlotValue; 5] = [hat::UP, hat::RIGHT, hat::DOWN, hat::LEFT, hat::CENTERED];

/// Events produced for one feeder tick
///
/// - every tick: one axis (round robin) follows a 32-step sweep
/// - every 4th tick: ball 0 moves by (+3, -3)
/// - ticks 0 / 4 mod 8: a button (round robin) is pressed / released
/// - every 16th tick: hat 0 steps through up, right, down, left, centered
pub fn synthetic_events(devices: &[VirtualDeviceSpec], tick: u64) -> Vec<NativeEvent> {
    let mut events = Vec::new();

    for (index, spec) in devices.iter().enumerate() {
        let device = DeviceId(index as u32);

        if spec.axes > 0 {
            let step = (tick % 32) as SlotValue;
            events.push(NativeEvent::AxisMotion {
                device,
                axis: (tick / 32) as usize % spec.axes,
                value: -32767 + step * 2114,
            });
        }
        if spec.balls > 0 && tick % 4 == 0 {
            events.push(NativeEvent::BallMotion {
                device,
                ball: 0,
                dx: 3,
                dy: -3,
            });
        }
        if spec.buttons > 0 && tick % 4 == 0 {
            events.push(NativeEvent::Button {
                device,
                button: (tick / 8) as usize % spec.buttons,
                pressed: tick % 8 == 0,
            });
        }
        if spec.hats > 0 && tick % 16 == 0 {
            events.push(NativeEvent::HatMotion {
                device,
                hat: 0,
                value: HAT_CYCLE[(tick / 16) as usize % HAT_CYCLE.len()],
            });
        }
    }

    events
}

impl NativeSubsystem for VirtualProvider {
    type Handle = VirtualHandle;

    fn enumeration_count(&self) -> usize {
        self.devices.len()
    }

    fn open(&self, id: DeviceId) -> Result<VirtualHandle> {
        self.open_calls.fetch_add(1, Ordering::AcqRel);

        if self.failing.lock().contains(&id) {
            return Err(JoystickError::OpenFailure {
                id,
                reason: "open refused by device".to_string(),
            });
        }
        if id.index() >= self.devices.len() {
            return Err(JoystickError::OpenFailure {
                id,
                reason: "no such device".to_string(),
            });
        }
        let Some(session) = self.injector.sessions.open(id) else {
            return Err(JoystickError::OpenFailure {
                id,
                reason: "device already open".to_string(),
            });
        };

        debug!("Virtual device {} opened (session {})", id, session);
        Ok(VirtualHandle { id, session })
    }

    fn close(&self, handle: VirtualHandle) {
        self.close_calls.fetch_add(1, Ordering::AcqRel);
        self.injector.sessions.close(handle.id);
        debug!("Virtual device {} closed", handle.id);
    }

    fn session(&self, handle: &VirtualHandle) -> Session {
        handle.session
    }

    fn query_capabilities(&self, handle: &VirtualHandle) -> DeviceCapabilities {
        self.devices
            .get(handle.id.index())
            .map(VirtualDeviceSpec::capabilities)
            .unwrap_or_default()
    }

    fn wait_for_event(&self) -> Result<QueuedEvent> {
        self.event_rx.recv().map_err(|_| JoystickError::QueueClosed)
    }

    fn post_wake_event(&self) {
        self.wake_posts.fetch_add(1, Ordering::AcqRel);
        let _ = self.injector.tx.send(QueuedEvent::unstamped(NativeEvent::Wake));
    }
}
