//! Service lifecycle: the host-facing surface, keepalive declarations and the
//! controller tying sensors, aggregation and broadcasts together.

pub mod controller;
pub mod keepalive;
pub mod lifecycle;

pub use controller::{ServiceState, StepCounterService};
pub use keepalive::{ForegroundNotification, KeepaliveDeclarer, LogKeepalive};
pub use lifecycle::{ServiceLifecycle, StartArgs, StartResult};
