//! Host-facing lifecycle surface.

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Restart policy a service hands back to the host from a start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StartResult {
    /// Relaunch with the same arguments if the service is killed.
    Sticky,
}

/// Arguments of a start request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartArgs {
    /// Host-assigned sequence number of this start request.
    pub start_id: u32,
    /// Set when the host relaunched the service after it was killed.
    pub redelivered: bool,
}

impl StartArgs {
    pub fn new(start_id: u32) -> Self {
        Self {
            start_id,
            redelivered: false,
        }
    }
}

/// Lifecycle callbacks a host invokes on a background service.
pub trait ServiceLifecycle {
    /// Interface handed to clients that bind to the service.
    type Binder;

    /// Called once after construction. No sensor interaction happens here.
    fn on_create(&self);

    /// Called for every start request.
    fn on_start_command(&self, args: &StartArgs) -> Result<StartResult>;

    /// Called once when the host tears the service down.
    fn on_destroy(&self);

    /// Called when a client binds. `None` means binding is not supported.
    fn on_bind(&self) -> Option<Self::Binder>;
}
