//! Converts step counter readings into [`ChangeEvent`]s.

use crate::sensors::{SensorReading, SensorType};
use chrono::{DateTime, Utc};
use log::{debug, trace};
use serde::{Deserialize, Serialize};

/// A new step count was recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub step_count: u64,
    pub timestamp: DateTime<Utc>,
}

/// Owns the running step count of one listening period.
///
/// Only [`SensorType::StepCounter`] readings are accepted. Every accepted
/// reading produces an event, even if the count did not change; consumers
/// that want de-duplication compare consecutive counts themselves.
#[derive(Debug, Default)]
pub struct StepAggregator {
    step_count: Option<u64>,
}

impl StepAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest a reading, returning the resulting event if it was accepted.
    pub fn ingest(&mut self, reading: &SensorReading) -> Option<ChangeEvent> {
        if reading.sensor_type != SensorType::StepCounter {
            trace!("Discarding {} reading", reading.sensor_type);
            return None;
        }

        // Sensor granularity is whole steps. The cast truncates toward zero and
        // saturates: negative and NaN values become 0.
        let step_count = reading.value as u64;
        self.step_count = Some(step_count);
        debug!("Steps: {}", step_count);

        Some(ChangeEvent {
            step_count,
            timestamp: reading.timestamp,
        })
    }

    /// Last accepted step count, if any reading was accepted yet.
    pub fn current(&self) -> Option<u64> {
        self.step_count
    }
}
