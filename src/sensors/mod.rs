//! Sensor model and provider abstraction.
//!
//! The sensor provider is an external collaborator: it owns the physical or
//! virtual sensors and delivers events to registered callbacks, possibly on
//! threads this crate does not control. [`SensorSubscription`] wraps a
//! provider and hands out [`SubscriptionHandle`]s for active registrations.

pub mod manual;
pub mod simulated;
pub mod subscription;

pub use manual::ManualSensorProvider;
pub use simulated::SimulatedSensorProvider;
pub use subscription::{SensorSubscription, SubscriptionHandle};

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use strum::{Display, EnumString};

/// Kind of sensor a reading originates from.
///
/// Several sensor types may report through the same callback, so consumers
/// filter on this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SensorType {
    /// Cumulative steps since the provider's counter was last reset.
    StepCounter,
    /// One event per detected step.
    StepDetector,
    Accelerometer,
    Gyroscope,
    /// Vendor-specific sensor identified by its raw type code.
    Other(i32),
}

/// Reported accuracy of a sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SensorAccuracy {
    Unreliable,
    Low,
    Medium,
    High,
}

/// Requested delivery rate for a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum SamplingRate {
    Fastest,
    Game,
    Ui,
    #[default]
    Normal,
}

impl SamplingRate {
    /// Nominal interval between readings for this rate.
    pub fn interval(&self) -> Duration {
        match self {
            SamplingRate::Fastest => Duration::ZERO,
            SamplingRate::Game => Duration::from_millis(20),
            SamplingRate::Ui => Duration::from_millis(66),
            SamplingRate::Normal => Duration::from_millis(200),
        }
    }
}

/// A single raw reading delivered by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub sensor_type: SensorType,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl SensorReading {
    /// Create a reading stamped with the current time.
    pub fn now(sensor_type: SensorType, value: f64) -> Self {
        Self {
            sensor_type,
            value,
            timestamp: Utc::now(),
        }
    }
}

/// Events a provider delivers to a registered callback.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorEvent {
    Reading(SensorReading),
    AccuracyChanged {
        sensor_type: SensorType,
        accuracy: SensorAccuracy,
    },
}

/// Descriptor of a sensor exposed by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorInfo {
    pub sensor_type: SensorType,
    pub name: String,
    pub vendor: String,
}

/// Identifier of a registration inside a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrationId(pub u64);

/// Callback invoked by a provider for every event of a registration.
pub type SensorCallback = Arc<dyn Fn(SensorEvent) + Send + Sync>;

/// External subsystem that owns sensors and delivers their events.
pub trait SensorProvider: Send + Sync {
    /// Look up the default sensor of the given type, if the device has one.
    fn default_sensor(&self, sensor_type: SensorType) -> Option<SensorInfo>;

    /// Start delivering events from `sensor` to `callback`.
    fn register(
        &self,
        sensor: &SensorInfo,
        rate: SamplingRate,
        callback: SensorCallback,
    ) -> Result<RegistrationId>;

    /// Stop delivering events for a registration. Unknown ids are ignored.
    fn unregister(&self, id: RegistrationId);
}
