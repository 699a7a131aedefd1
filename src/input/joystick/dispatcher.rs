//! Device event dispatch manager
//!
//! Owns the single background thread that drains the native event queue and
//! routes each event to the sink of the device it belongs to.
//!
//! # Thread lifecycle
//!
//! The dispatch thread exists if and only if at least one device is
//! registered:
//!
//! ```text
//! register   (registry 0 -> 1)  ──► spawn dispatch thread
//! unregister (registry 1 -> 0)  ──► set stop flag, post wake event, join
//! ```
//!
//! # Locking
//!
//! - `lifecycle` serializes every register/unregister call, including the
//!   thread start and the stop/join. It is never taken by the dispatch thread.
//! - `registry` is shared with the dispatch thread. It guards the id map and
//!   every sink write performed by dispatch. It is never held across a native
//!   open, a capability query or a join.
//!
//! # Sessions
//!
//! Every open gets a fresh session number and events carry the session they
//! were produced in. Dispatch compares it with the registry entry under the
//! registry lock, so events queued before an unregister are never written
//! into the sink of a later registration of the same id.

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, trace, warn};

use super::error::{JoystickError, Result};
use super::event::{NativeEvent, QueuedEvent};
use super::registry::{Registry, RegistryEntry};
use super::slots::DeviceSink;
use super::subsystem::NativeSubsystem;
use super::types::{DeviceCapabilities, DeviceId, SlotCategory, SlotValue};

/// Name given to the dispatch thread
pub const DISPATCH_THREAD_NAME: &str = "joystick-dispatch";

/// Counters maintained by the dispatch thread
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Events written into a registered sink
    pub delivered: u64,
    /// Events whose device was not registered when they were processed
    pub dropped: u64,
    /// Events left over from an earlier registration of a device
    pub stale: u64,
}

#[derive(Debug, Default)]
struct StatCounters {
    delivered: AtomicU64,
    dropped: AtomicU64,
    stale: AtomicU64,
}

/// Dispatch loop state, logged when the thread exits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DispatchState {
    Running,
    /// Stop flag observed
    Stopped,
    /// The native queue can no longer produce events
    QueueClosed,
}

/// Handle to the running dispatch thread
struct DispatchThread {
    stop: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

impl DispatchThread {
    /// Wake the thread out of its blocking wait and wait for it to exit
    ///
    /// The stop flag must already be set.
    fn shutdown<S: NativeSubsystem>(self, subsystem: &S) {
        debug_assert!(self.stop.load(Ordering::Acquire));
        subsystem.post_wake_event();
        self.join_exited();
    }

    fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    fn join_exited(self) {
        if self.join.join().is_err() {
            error!("Dispatch thread panicked");
        }
    }
}

struct Shared<S: NativeSubsystem> {
    subsystem: S,
    lifecycle: Mutex<Option<DispatchThread>>,
    registry: Mutex<Registry<S::Handle>>,
    stats: StatCounters,
    live_threads: AtomicUsize,
}

impl<S: NativeSubsystem> Shared<S> {
    /// Route one event to its device's sink
    fn dispatch(&self, queued: QueuedEvent) {
        let QueuedEvent { session, event } = queued;
        let Some(device) = event.device() else {
            trace!("Wake event without stop request, ignoring");
            return;
        };

        let registry = self.registry.lock();
        let Some(entry) = registry.get(device) else {
            // The device may have unregistered while this event sat in the queue
            debug!("Dropping event for unregistered device {}: {:?}", device, event);
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };
        if session != Some(entry.session) {
            debug!(
                "Retiring {:?} for {}: session {:?}, registered session {}",
                event, device, session, entry.session
            );
            self.stats.stale.fetch_add(1, Ordering::Relaxed);
            return;
        }

        trace!("Dispatching {:?}", event);
        let sink = &entry.sink;
        match event {
            NativeEvent::AxisMotion { axis, value, .. } => {
                sink.set_slot(SlotCategory::Axis, axis, value);
            }
            NativeEvent::BallMotion { ball, dx, dy, .. } => {
                sink.set_slot(SlotCategory::BallDx, ball, dx);
                sink.set_slot(SlotCategory::BallDy, ball, dy);
            }
            NativeEvent::HatMotion { hat, value, .. } => {
                sink.set_slot(SlotCategory::Hat, hat, value);
            }
            NativeEvent::Button {
                button, pressed, ..
            } => {
                sink.set_slot(SlotCategory::Button, button, SlotValue::from(pressed));
            }
            NativeEvent::Wake => {}
        }
        self.stats.delivered.fetch_add(1, Ordering::Relaxed);
    }

    fn stats(&self) -> DispatchStats {
        DispatchStats {
            delivered: self.stats.delivered.load(Ordering::Relaxed),
            dropped: self.stats.dropped.load(Ordering::Relaxed),
            stale: self.stats.stale.load(Ordering::Relaxed),
        }
    }
}

/// Main event loop (runs in the dedicated dispatch thread)
fn dispatch_loop<S: NativeSubsystem>(shared: Arc<Shared<S>>, stop: Arc<AtomicBool>) {
    let mut state = DispatchState::Running;
    info!("Dispatch thread started");

    while state == DispatchState::Running {
        let queued = match shared.subsystem.wait_for_event() {
            Ok(queued) => queued,
            Err(e) => {
                warn!("Dispatch thread exiting: {}", e);
                state = DispatchState::QueueClosed;
                continue;
            }
        };

        // A wake event is indistinguishable from a real one at this point;
        // the flag alone decides whether to exit.
        if stop.load(Ordering::Acquire) {
            state = DispatchState::Stopped;
            debug!("Stop requested, discarding {:?}", queued.event);
            continue;
        }

        shared.dispatch(queued);
    }

    let stats = shared.stats();
    info!(
        "Dispatch thread exited: {:?} ({} delivered, {} dropped, {} stale)",
        state, stats.delivered, stats.dropped, stats.stale
    );
    shared.live_threads.fetch_sub(1, Ordering::AcqRel);
}

/// Process-wide device dispatch manager
///
/// Cheap to clone; all clones share one registry and one dispatch thread.
/// Construct it explicitly (or lazily through [`ManagerCell`]) and hand
/// clones to whoever registers devices.
pub struct DispatchManager<S: NativeSubsystem> {
    shared: Arc<Shared<S>>,
}

impl<S: NativeSubsystem> Clone for DispatchManager<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: NativeSubsystem> DispatchManager<S> {
    /// Create a manager over an initialized native subsystem
    ///
    /// No thread is started until the first device registers.
    pub fn new(subsystem: S) -> Self {
        Self {
            shared: Arc::new(Shared {
                subsystem,
                lifecycle: Mutex::new(None),
                registry: Mutex::new(Registry::new()),
                stats: StatCounters::default(),
                live_threads: AtomicUsize::new(0),
            }),
        }
    }

    /// Register a device and start dispatching its events into `sink`
    ///
    /// # Arguments
    /// * `id` - Enumeration index of the device
    /// * `sink` - Receives materialized slots and dispatched values
    ///
    /// # Returns
    /// The capabilities queried from the device
    ///
    /// # Errors
    /// * [`JoystickError::InvalidDeviceId`] - `id` is not enumerable (no open attempted)
    /// * [`JoystickError::AlreadyRegistered`] - `id` is registered by another owner
    /// * [`JoystickError::SinkInUse`] - `sink` is already registered for another id
    /// * [`JoystickError::OpenFailure`] - the native open failed
    /// * [`JoystickError::ThreadSpawn`] - the dispatch thread could not start
    ///
    /// On error the registry and the dispatch thread are left as they were.
    /// A dispatch thread that exited on its own (closed native queue) is
    /// joined and replaced here.
    pub fn register(&self, id: DeviceId, sink: Arc<dyn DeviceSink>) -> Result<DeviceCapabilities> {
        let shared = &self.shared;
        let mut thread_slot = shared.lifecycle.lock();

        let available = shared.subsystem.enumeration_count();
        if id.index() >= available {
            warn!("Refusing to register {}: {} device(s) enumerated", id, available);
            return Err(JoystickError::InvalidDeviceId { id, available });
        }
        {
            let registry = shared.registry.lock();
            if let Some(owner) = registry.owner_of(id) {
                warn!("Refusing to register {} for '{}': owned by '{}'", id, sink.owner(), owner);
                return Err(JoystickError::AlreadyRegistered { id, owner });
            }
            // Materializing would reset the slots of the other registration
            if let Some(other) = registry.id_of_sink(&sink) {
                warn!("Refusing to register {}: sink of '{}' already serves {}", id, sink.owner(), other);
                return Err(JoystickError::SinkInUse {
                    id: other,
                    owner: sink.owner().to_string(),
                });
            }
        }

        // Slow hardware calls happen without the registry lock so dispatch
        // to other devices keeps flowing.
        let handle = shared.subsystem.open(id)?;
        let session = shared.subsystem.session(&handle);
        let capabilities = shared.subsystem.query_capabilities(&handle);
        info!("Opened {} \"{}\" for '{}'", id, capabilities.name, sink.owner());
        debug!(
            "{}: {} axes, {} balls, {} hats, {} buttons",
            id, capabilities.axes, capabilities.balls, capabilities.hats, capabilities.buttons
        );

        for category in SlotCategory::ALL {
            sink.materialize_slots(category, capabilities.slot_count(category));
        }
        sink.set_name(&capabilities.name);

        let mut registry = shared.registry.lock();
        let size = registry.insert(
            id,
            RegistryEntry {
                handle,
                session,
                sink,
                capabilities: capabilities.clone(),
            },
        );

        if thread_slot.as_ref().is_some_and(DispatchThread::is_finished) {
            warn!("Dispatch thread has exited, restarting it");
            if let Some(exited) = thread_slot.take() {
                exited.join_exited();
            }
        }
        if thread_slot.is_none() {
            debug_assert!(size == 1 || self.live_dispatch_threads() == 0);
            match self.spawn_dispatch_thread() {
                Ok(thread) => *thread_slot = Some(thread),
                Err(e) => {
                    error!("Could not start dispatch thread: {}", e);
                    if let Some(entry) = registry.remove(id) {
                        drop(registry);
                        shared.subsystem.close(entry.handle);
                    }
                    return Err(e);
                }
            }
        }

        info!("✅ Registered {} ({} device(s) active)", id, size);
        Ok(capabilities)
    }

    /// Unregister a device and close its native handle
    ///
    /// When this removes the last device, the dispatch thread is stopped and
    /// joined before this call returns; no sink is written afterwards.
    ///
    /// # Errors
    /// * [`JoystickError::NotRegistered`] - `id` is not registered
    pub fn unregister(&self, id: DeviceId) -> Result<()> {
        let shared = &self.shared;
        let mut thread_slot = shared.lifecycle.lock();

        let (entry, stopping) = {
            let mut registry = shared.registry.lock();
            let entry = registry.remove(id).ok_or(JoystickError::NotRegistered(id))?;
            let stopping = if registry.is_empty() {
                thread_slot.take()
            } else {
                None
            };
            if let Some(thread) = &stopping {
                thread.stop.store(true, Ordering::Release);
            }
            (entry, stopping)
        };

        if let Some(thread) = stopping {
            info!("Last device unregistered, stopping dispatch thread");
            thread.shutdown(&shared.subsystem);
        }

        shared.subsystem.close(entry.handle);
        info!("Unregistered {} (owner '{}')", id, entry.sink.owner());
        Ok(())
    }

    fn spawn_dispatch_thread(&self) -> Result<DispatchThread> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let shared = Arc::clone(&self.shared);

        self.shared.live_threads.fetch_add(1, Ordering::AcqRel);
        let spawned = thread::Builder::new()
            .name(DISPATCH_THREAD_NAME.to_string())
            .spawn(move || dispatch_loop(shared, thread_stop));

        match spawned {
            Ok(join) => Ok(DispatchThread { stop, join }),
            Err(e) => {
                self.shared.live_threads.fetch_sub(1, Ordering::AcqRel);
                Err(e.into())
            }
        }
    }

    /// Whether `id` is currently registered
    pub fn is_registered(&self, id: DeviceId) -> bool {
        self.shared.registry.lock().contains(id)
    }

    /// Registered device ids in ascending order
    pub fn registered(&self) -> Vec<DeviceId> {
        self.shared.registry.lock().ids()
    }

    /// Capabilities captured when `id` was registered
    pub fn capabilities(&self, id: DeviceId) -> Option<DeviceCapabilities> {
        self.shared
            .registry
            .lock()
            .get(id)
            .map(|entry| entry.capabilities.clone())
    }

    /// Whether a dispatch thread is running
    ///
    /// False once the thread has exited, even if devices are still
    /// registered (the native queue closed). The next register restarts it.
    pub fn is_dispatching(&self) -> bool {
        self.shared
            .lifecycle
            .lock()
            .as_ref()
            .is_some_and(|thread| !thread.is_finished())
    }

    /// Dispatch threads that have been started and not yet exited
    pub fn live_dispatch_threads(&self) -> usize {
        self.shared.live_threads.load(Ordering::Acquire)
    }

    /// Delivered / dropped / stale event counters
    pub fn stats(&self) -> DispatchStats {
        self.shared.stats()
    }

    /// The underlying native subsystem
    pub fn subsystem(&self) -> &S {
        &self.shared.subsystem
    }
}

type SubsystemFactory<S> = Box<dyn Fn() -> Result<S> + Send + Sync>;

/// Lazily constructed manager
///
/// The subsystem is initialized on the first successful [`ManagerCell::get`].
/// A failed initialization is returned to that caller and retried on the
/// next call.
pub struct ManagerCell<S: NativeSubsystem> {
    factory: SubsystemFactory<S>,
    manager: OnceCell<DispatchManager<S>>,
}

impl<S: NativeSubsystem> ManagerCell<S> {
    pub fn new(factory: impl Fn() -> Result<S> + Send + Sync + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            manager: OnceCell::new(),
        }
    }

    /// Get the manager, initializing the subsystem on first use
    ///
    /// # Errors
    /// Whatever the factory returns, typically [`JoystickError::SubsystemInitFailure`]
    pub fn get(&self) -> Result<DispatchManager<S>> {
        self.manager
            .get_or_try_init(|| {
                info!("Initializing device subsystem");
                (self.factory)().map(DispatchManager::new)
            })
            .cloned()
    }

    /// Whether the subsystem has been initialized
    pub fn is_initialized(&self) -> bool {
        self.manager.get().is_some()
    }
}

#[cfg(test)]
mod tests;
