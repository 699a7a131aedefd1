//! Capability surface consumed from the native device library
//!
//! The dispatch manager only ever talks to hardware through this trait:
//! enumerate, open, close, query capabilities, block for the next event and
//! post a wake event into that same queue.

use parking_lot::Mutex;
use std::collections::HashMap;

use super::error::Result;
use super::event::{NativeEvent, QueuedEvent, Session};
use super::types::{DeviceCapabilities, DeviceId};

/// Native device subsystem
///
/// Note: All methods take &self so one subsystem can be shared between the
/// dispatch thread (which calls `wait_for_event` in a loop) and caller
/// threads (which open and close devices). Implementations use interior
/// mutability for their state.
pub trait NativeSubsystem: Send + Sync + 'static {
    /// Handle to an opened device
    type Handle: Send + 'static;

    /// Number of devices currently enumerable (ids `0..count`)
    fn enumeration_count(&self) -> usize;

    /// Open a device; fails with `OpenFailure`
    fn open(&self, id: DeviceId) -> Result<Self::Handle>;

    /// Close a previously opened device
    fn close(&self, handle: Self::Handle);

    /// Session assigned when `handle` was opened
    fn session(&self, handle: &Self::Handle) -> Session;

    /// Capability counts and display name of an opened device
    fn query_capabilities(&self, handle: &Self::Handle) -> DeviceCapabilities;

    /// Block until the next event is queued (no timeout)
    ///
    /// Device events produced while the device is open carry the session of
    /// that open. Returns `QueueClosed` once the queue can never produce
    /// again.
    fn wait_for_event(&self) -> Result<QueuedEvent>;

    /// Push a [`NativeEvent::Wake`] into the queue `wait_for_event` reads
    fn post_wake_event(&self);
}

/// Open devices and their current session, for subsystem implementations
#[derive(Debug, Default)]
pub struct OpenSessions {
    inner: Mutex<SessionTable>,
}

#[derive(Debug, Default)]
struct SessionTable {
    open: HashMap<DeviceId, Session>,
    last: Session,
}

impl OpenSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `id` open under a new session; `None` if it is already open
    pub fn open(&self, id: DeviceId) -> Option<Session> {
        let mut table = self.inner.lock();
        if table.open.contains_key(&id) {
            return None;
        }
        table.last += 1;
        let session = table.last;
        table.open.insert(id, session);
        Some(session)
    }

    pub fn close(&self, id: DeviceId) {
        self.inner.lock().open.remove(&id);
    }

    /// Session `id` is currently open under
    pub fn current(&self, id: DeviceId) -> Option<Session> {
        self.inner.lock().open.get(&id).copied()
    }

    pub fn is_open(&self, id: DeviceId) -> bool {
        self.current(id).is_some()
    }

    /// Tag `event` with the current session of its device
    pub fn stamp(&self, event: NativeEvent) -> QueuedEvent {
        QueuedEvent {
            session: event.device().and_then(|id| self.current(id)),
            event,
        }
    }
}
