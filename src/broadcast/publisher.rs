//! Listener registry and synchronous fan-out.

use super::Broadcast;
use crate::error::ServiceError;
use crate::steps::ChangeEvent;
use log::{trace, warn};
use parking_lot::RwLock;
use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Outcome of a listener handling one broadcast.
pub type ListenerResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

type ListenerFn = Arc<dyn Fn(&Broadcast) -> ListenerResult + Send + Sync>;

/// Token identifying a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(u64);

impl fmt::Display for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

#[derive(Clone)]
struct Listener {
    handle: ListenerHandle,
    name: String,
    callback: ListenerFn,
}

/// Fans step count changes out to listeners of a named channel.
///
/// Listeners run on the publishing thread in registration order. Each
/// publish iterates over a snapshot of the registry, so a listener registered
/// while a publish is in flight may or may not see that broadcast.
pub struct BroadcastPublisher {
    channel: String,
    listeners: RwLock<Vec<Listener>>,
    next_id: AtomicU64,
}

impl BroadcastPublisher {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Name of the channel broadcasts are published on.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Register a listener. `name` identifies it in failure logs.
    ///
    /// Listeners run on the publishing thread, and a publishing
    /// `StepCounterService` holds its own lock while they run. A listener must
    /// not call back into that service (`state()`, `step_count()`, `stop()`)
    /// synchronously or it deadlocks. Hand the work to another thread instead.
    pub fn register_listener<F>(&self, name: impl Into<String>, listener: F) -> ListenerHandle
    where
        F: Fn(&Broadcast) -> ListenerResult + Send + Sync + 'static,
    {
        let handle = ListenerHandle(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.listeners.write().push(Listener {
            handle,
            name: name.into(),
            callback: Arc::new(listener),
        });
        handle
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn unregister_listener(&self, handle: ListenerHandle) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| l.handle != handle);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Deliver `event` to every registered listener.
    ///
    /// Never fails: a listener that errors or panics is logged as a
    /// [`ServiceError::PublishFailure`] and delivery continues with the next
    /// one. Returns the number of listeners that handled the broadcast.
    pub fn publish(&self, event: &ChangeEvent) -> usize {
        let broadcast = Broadcast::from_event(&self.channel, event);
        let snapshot: Vec<Listener> = self.listeners.read().clone();

        let mut delivered = 0;
        for listener in &snapshot {
            let outcome = catch_unwind(AssertUnwindSafe(|| (listener.callback)(&broadcast)));
            let reason = match outcome {
                Ok(Ok(())) => {
                    delivered += 1;
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(panic) => format!("panicked: {}", panic_message(&*panic)),
            };

            let failure = ServiceError::PublishFailure {
                listener: listener.name.clone(),
                channel: self.channel.clone(),
                reason,
            };
            warn!("{} ({})", failure, listener.handle);
        }

        trace!(
            "Published step_count={} on {} to {}/{} listeners",
            event.step_count,
            self.channel,
            delivered,
            snapshot.len()
        );
        delivered
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}
