//! Step count change notification.
//!
//! A [`BroadcastPublisher`] owns a named channel and fans each
//! [`Broadcast`] out to the listeners registered on it. Delivery is
//! best-effort: nothing is persisted or replayed, and listener failures are
//! logged rather than reported to the publisher's caller.

pub mod listeners;
pub mod publisher;

pub use listeners::{JsonLinesListener, LogListener};
pub use publisher::{BroadcastPublisher, ListenerHandle, ListenerResult};

use crate::error::Result;
use crate::steps::ChangeEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Payload carried on the step count channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepCountUpdate {
    pub step_count: u64,
}

/// A message delivered to listeners of a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Broadcast {
    pub channel: String,
    pub payload: StepCountUpdate,
    pub timestamp: DateTime<Utc>,
}

impl Broadcast {
    pub fn from_event(channel: &str, event: &ChangeEvent) -> Self {
        Self {
            channel: channel.to_string(),
            payload: StepCountUpdate {
                step_count: event.step_count,
            },
            timestamp: event.timestamp,
        }
    }

    /// Serialize as a single JSON object.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
