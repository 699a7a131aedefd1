//! gilrs-backed native subsystem
//!
//! `Gilrs` is not `Send`, so it lives on a dedicated pump thread. The pump
//! performs the initial gamepad scan, reports the enumeration back, then
//! translates gilrs events of opened devices into [`NativeEvent`]s, stamped
//! with the device's open session, on a crossbeam channel. That channel is
//! the native queue the dispatch thread blocks on.
//!
//! Enumeration is a snapshot taken at startup: gamepads are numbered in the
//! order gilrs lists them. A gamepad plugged in later is logged, not added.

use crossbeam::channel::{self, Receiver, Sender};
use gilrs::{Axis, Button, Event, EventType, GamepadId, Gilrs};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

use super::controls::{scale_axis, ControlLayout, HatState};
use super::error::{JoystickError, Result};
use super::event::{NativeEvent, QueuedEvent, Session};
use super::subsystem::{NativeSubsystem, OpenSessions};
use super::types::{DeviceCapabilities, DeviceId};

/// Name given to the gilrs pump thread
pub const PUMP_THREAD_NAME: &str = "gilrs-pump";

/// Timing of the gilrs pump thread
#[derive(Debug, Clone, Copy)]
pub struct GilrsSettings {
    /// How long to collect connection events before enumerating
    pub scan: Duration,
    /// Upper bound on one blocking wait, bounds shutdown latency
    pub poll: Duration,
}

impl Default for GilrsSettings {
    fn default() -> Self {
        Self {
            scan: Duration::from_millis(1500),
            poll: Duration::from_millis(50),
        }
    }
}

/// One gamepad found by the startup scan
#[derive(Debug, Clone)]
pub struct EnumeratedDevice {
    pub id: DeviceId,
    /// gilrs' own gamepad index, for log correlation
    pub gilrs_index: usize,
    pub capabilities: DeviceCapabilities,
    pub power: String,
}

/// Handle to an opened gilrs gamepad
#[derive(Debug)]
pub struct GilrsHandle {
    id: DeviceId,
    session: Session,
}

impl GilrsHandle {
    pub fn id(&self) -> DeviceId {
        self.id
    }
}

/// Per-device translation state kept by the pump
struct TrackedPad {
    id: DeviceId,
    layout: ControlLayout,
    hat: HatState,
}

impl TrackedPad {
    fn new(id: DeviceId, layout: ControlLayout) -> Self {
        Self {
            id,
            layout,
            hat: HatState::default(),
        }
    }

    fn on_axis(&mut self, axis: Axis, value: f32) -> Option<NativeEvent> {
        if matches!(axis, Axis::DPadX | Axis::DPadY) {
            return self.hat_event(|hat| hat.apply_axis(axis, value));
        }

        let index = self.layout.axis_index(axis)?;
        // gilrs reports stick Y up-positive; slots use the HID convention
        let value = match axis {
            Axis::LeftStickY | Axis::RightStickY => -value,
            _ => value,
        };
        Some(NativeEvent::AxisMotion {
            device: self.id,
            axis: index,
            value: scale_axis(value),
        })
    }

    fn on_button(&mut self, button: Button, pressed: bool) -> Option<NativeEvent> {
        if let Some(index) = self.layout.button_index(button) {
            return Some(NativeEvent::Button {
                device: self.id,
                button: index,
                pressed,
            });
        }
        self.hat_event(|hat| hat.apply_button(button, pressed))
    }

    fn hat_event(&mut self, apply: impl FnOnce(&mut HatState) -> bool) -> Option<NativeEvent> {
        if !self.layout.has_hat() || !apply(&mut self.hat) {
            return None;
        }
        Some(NativeEvent::HatMotion {
            device: self.id,
            hat: 0,
            value: self.hat.value(),
        })
    }
}

/// State shared between the provider and its pump thread
struct PumpShared {
    opened: OpenSessions,
    connected: Mutex<HashSet<DeviceId>>,
    shutdown: AtomicBool,
}

/// Native subsystem over gilrs
pub struct GilrsProvider {
    devices: Vec<EnumeratedDevice>,
    shared: Arc<PumpShared>,
    pump: Option<JoinHandle<()>>,
    event_tx: Sender<QueuedEvent>,
    event_rx: Receiver<QueuedEvent>,
}

impl GilrsProvider {
    /// Initialize gilrs on a pump thread and enumerate connected gamepads
    ///
    /// Blocks for the scan duration.
    ///
    /// # Errors
    /// * [`JoystickError::SubsystemInitFailure`] - gilrs could not start
    /// * [`JoystickError::ThreadSpawn`] - the pump thread could not start
    pub fn start(settings: GilrsSettings) -> Result<Self> {
        let (event_tx, event_rx) = channel::unbounded();
        let (init_tx, init_rx) = channel::bounded(1);
        let shared = Arc::new(PumpShared {
            opened: OpenSessions::new(),
            connected: Mutex::new(HashSet::new()),
            shutdown: AtomicBool::new(false),
        });

        let pump_shared = Arc::clone(&shared);
        let pump_tx = event_tx.clone();
        let pump = thread::Builder::new()
            .name(PUMP_THREAD_NAME.to_string())
            .spawn(move || pump_loop(settings, pump_shared, pump_tx, init_tx))?;

        let devices = match init_rx.recv() {
            Ok(Ok(devices)) => devices,
            Ok(Err(reason)) => {
                let _ = pump.join();
                return Err(JoystickError::SubsystemInitFailure(reason));
            }
            Err(_) => {
                let _ = pump.join();
                return Err(JoystickError::SubsystemInitFailure(
                    "gilrs pump exited during startup".to_string(),
                ));
            }
        };

        Ok(Self {
            devices,
            shared,
            pump: Some(pump),
            event_tx,
            event_rx,
        })
    }

    /// Gamepads found by the startup scan, in id order
    pub fn devices(&self) -> &[EnumeratedDevice] {
        &self.devices
    }

    pub fn is_connected(&self, id: DeviceId) -> bool {
        self.shared.connected.lock().contains(&id)
    }
}

impl NativeSubsystem for GilrsProvider {
    type Handle = GilrsHandle;

    fn enumeration_count(&self) -> usize {
        self.devices.len()
    }

    fn open(&self, id: DeviceId) -> Result<GilrsHandle> {
        if id.index() >= self.devices.len() {
            return Err(JoystickError::OpenFailure {
                id,
                reason: "no such gamepad".to_string(),
            });
        }
        if !self.is_connected(id) {
            return Err(JoystickError::OpenFailure {
                id,
                reason: "gamepad disconnected".to_string(),
            });
        }
        let Some(session) = self.shared.opened.open(id) else {
            return Err(JoystickError::OpenFailure {
                id,
                reason: "gamepad already open".to_string(),
            });
        };
        Ok(GilrsHandle { id, session })
    }

    fn close(&self, handle: GilrsHandle) {
        self.shared.opened.close(handle.id);
        debug!("Closed {}", handle.id);
    }

    fn session(&self, handle: &GilrsHandle) -> Session {
        handle.session
    }

    fn query_capabilities(&self, handle: &GilrsHandle) -> DeviceCapabilities {
        self.devices
            .get(handle.id.index())
            .map(|d| d.capabilities.clone())
            .unwrap_or_default()
    }

    fn wait_for_event(&self) -> Result<QueuedEvent> {
        self.event_rx.recv().map_err(|_| JoystickError::QueueClosed)
    }

    fn post_wake_event(&self) {
        let _ = self.event_tx.send(QueuedEvent::unstamped(NativeEvent::Wake));
    }
}

impl Drop for GilrsProvider {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        if let Some(pump) = self.pump.take() {
            if pump.join().is_err() {
                error!("gilrs pump thread panicked");
            }
        }
    }
}

/// Main event loop (runs in the dedicated pump thread)
fn pump_loop(
    settings: GilrsSettings,
    shared: Arc<PumpShared>,
    event_tx: Sender<QueuedEvent>,
    init_tx: Sender<std::result::Result<Vec<EnumeratedDevice>, String>>,
) {
    // gilrs must be created on the thread that polls it
    let mut gilrs = match Gilrs::new() {
        Ok(g) => {
            info!("GilRs initialized");
            g
        }
        Err(e) => {
            warn!("Failed to initialize GilRs: {}", e);
            let _ = init_tx.send(Err(e.to_string()));
            return;
        }
    };

    info!("⏳ Scanning for gamepads ({} ms)...", settings.scan.as_millis());
    let scan_start = Instant::now();
    while scan_start.elapsed() < settings.scan {
        while let Some(Event { id, event, .. }) = gilrs.next_event() {
            if event == EventType::Connected {
                debug!("Gamepad connected during initial scan: {:?}", id);
            }
        }
        thread::sleep(Duration::from_millis(20));
    }

    let mut pads: HashMap<GamepadId, TrackedPad> = HashMap::new();
    let mut devices = Vec::new();
    for (index, (gamepad_id, gamepad)) in gilrs.gamepads().filter(|(_, gp)| gp.is_connected()).enumerate() {
        let id = DeviceId(index as u32);
        let layout = ControlLayout::probe(
            |axis| gamepad.axis_code(axis).is_some(),
            |button| gamepad.button_code(button).is_some(),
        );
        let capabilities = layout.capabilities(gamepad.name());
        info!("  - {}: \"{}\" ({:?})", id, capabilities.name, gamepad_id);

        devices.push(EnumeratedDevice {
            id,
            gilrs_index: usize::from(gamepad_id),
            capabilities,
            power: format!("{:?}", gamepad.power_info()),
        });
        shared.connected.lock().insert(id);
        pads.insert(gamepad_id, TrackedPad::new(id, layout));
    }

    if devices.is_empty() {
        warn!("⚠️  No gamepads detected");
    } else {
        info!("Found {} connected gamepad(s)", devices.len());
    }
    if init_tx.send(Ok(devices)).is_err() {
        return;
    }

    while !shared.shutdown.load(Ordering::Acquire) {
        let Some(Event { id, event, .. }) = gilrs.next_event_blocking(Some(settings.poll)) else {
            continue;
        };

        let Some(pad) = pads.get_mut(&id) else {
            if event == EventType::Connected {
                info!("Gamepad {:?} connected after startup scan, not enumerated", id);
            }
            continue;
        };

        let translated = match event {
            EventType::AxisChanged(axis, value, _) => pad.on_axis(axis, value),
            EventType::ButtonPressed(button, _) => pad.on_button(button, true),
            EventType::ButtonReleased(button, _) => pad.on_button(button, false),
            EventType::Connected => {
                info!("{} reconnected", pad.id);
                shared.connected.lock().insert(pad.id);
                None
            }
            EventType::Disconnected => {
                warn!("{} disconnected", pad.id);
                shared.connected.lock().remove(&pad.id);
                None
            }
            _ => None,
        };

        let Some(native) = translated else {
            continue;
        };
        let Some(session) = shared.opened.current(pad.id) else {
            trace!("Ignoring event for closed {}", pad.id);
            continue;
        };
        if event_tx.send(QueuedEvent::stamped(session, native)).is_err() {
            break;
        }
    }

    info!("gilrs pump stopped");
}
