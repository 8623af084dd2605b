//! Step counter service library.
//!
//! A long-running background component that subscribes to a step counter
//! sensor, keeps the running step count and broadcasts every change to
//! registered listeners, under an explicit keepalive declaration.
//!
//! ```text
//! host ──► StepCounterService ──► SensorSubscription ──► SensorProvider
//!                                                            │ callback
//!          BroadcastPublisher ◄── StepAggregator ◄───────────┘
//!                 │
//!                 ▼
//!             listeners
//! ```

pub mod broadcast;
pub mod config;
pub mod error;
pub mod instance_lock;
pub mod sensors;
pub mod service;
pub mod steps;
