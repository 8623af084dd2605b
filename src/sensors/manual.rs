//! Sensor provider driven by the embedding application.
//!
//! Events are pushed explicitly through [`ManualSensorProvider::emit`], which
//! makes this provider suitable for bridging readings from another source
//! (a companion device, a replay file) and for exercising the service in tests.

use super::{
    RegistrationId, SamplingRate, SensorCallback, SensorEvent, SensorInfo, SensorProvider,
    SensorReading, SensorType,
};
use crate::error::{Result, ServiceError};
use log::debug;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

struct Registration {
    id: RegistrationId,
    callback: SensorCallback,
}

/// Thread-safe provider whose events come from [`emit`](Self::emit) calls.
///
/// Every event is delivered to every active registration, regardless of the
/// sensor type it was registered for.
pub struct ManualSensorProvider {
    sensors: RwLock<Vec<SensorInfo>>,
    registrations: Mutex<Vec<Registration>>,
    next_id: AtomicU64,
    register_calls: AtomicUsize,
    unregister_calls: AtomicUsize,
}

impl ManualSensorProvider {
    /// Create a provider exposing no sensors.
    pub fn new() -> Self {
        Self {
            sensors: RwLock::new(Vec::new()),
            registrations: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            register_calls: AtomicUsize::new(0),
            unregister_calls: AtomicUsize::new(0),
        }
    }

    /// Create a provider exposing a single sensor of the given type.
    pub fn with_sensor(sensor_type: SensorType) -> Self {
        let provider = Self::new();
        provider.add_sensor(sensor_type);
        provider
    }

    /// Expose an additional sensor.
    pub fn add_sensor(&self, sensor_type: SensorType) {
        self.sensors.write().push(SensorInfo {
            sensor_type,
            name: format!("Manual {}", sensor_type),
            vendor: env!("CARGO_PKG_NAME").to_string(),
        });
    }

    /// Deliver an event to all active registrations on the calling thread.
    ///
    /// Returns the number of callbacks invoked.
    pub fn emit(&self, event: SensorEvent) -> usize {
        // Callbacks run without the registration lock held so they may unregister.
        let callbacks: Vec<SensorCallback> = self
            .registrations
            .lock()
            .iter()
            .map(|r| r.callback.clone())
            .collect();
        for callback in &callbacks {
            callback(event.clone());
        }
        callbacks.len()
    }

    /// Convenience for [`emit`](Self::emit) with a reading.
    pub fn emit_reading(&self, reading: SensorReading) -> usize {
        self.emit(SensorEvent::Reading(reading))
    }

    /// Number of currently active registrations.
    pub fn registration_count(&self) -> usize {
        self.registrations.lock().len()
    }

    /// Total number of successful `register` calls.
    pub fn register_calls(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }

    /// Total number of `unregister` calls that removed a registration.
    pub fn unregister_calls(&self) -> usize {
        self.unregister_calls.load(Ordering::SeqCst)
    }
}

impl Default for ManualSensorProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorProvider for ManualSensorProvider {
    fn default_sensor(&self, sensor_type: SensorType) -> Option<SensorInfo> {
        self.sensors
            .read()
            .iter()
            .find(|s| s.sensor_type == sensor_type)
            .cloned()
    }

    fn register(
        &self,
        sensor: &SensorInfo,
        rate: SamplingRate,
        callback: SensorCallback,
    ) -> Result<RegistrationId> {
        if self.default_sensor(sensor.sensor_type).is_none() {
            return Err(ServiceError::SensorUnavailable(sensor.sensor_type));
        }

        let id = RegistrationId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.registrations.lock().push(Registration { id, callback });
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        debug!("[Manual] Registered {:?} for {} at {}", id, sensor.name, rate);
        Ok(id)
    }

    fn unregister(&self, id: RegistrationId) {
        let mut registrations = self.registrations.lock();
        let before = registrations.len();
        registrations.retain(|r| r.id != id);
        if registrations.len() != before {
            self.unregister_calls.fetch_add(1, Ordering::SeqCst);
            debug!("[Manual] Unregistered {:?}", id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_default_sensor_lookup() {
        let provider = ManualSensorProvider::with_sensor(SensorType::StepCounter);
        assert!(provider.default_sensor(SensorType::StepCounter).is_some());
        assert!(provider.default_sensor(SensorType::Accelerometer).is_none());
    }

    #[test]
    fn test_emit_without_registrations() {
        let provider = ManualSensorProvider::with_sensor(SensorType::StepCounter);
        let delivered = provider.emit_reading(SensorReading::now(SensorType::StepCounter, 1.0));
        assert_eq!(delivered, 0);
    }

    #[test]
    fn test_unregister_unknown_id_is_ignored() {
        let provider = ManualSensorProvider::with_sensor(SensorType::StepCounter);
        let sensor = provider.default_sensor(SensorType::StepCounter).unwrap();
        let id = provider
            .register(&sensor, SamplingRate::Normal, Arc::new(|_| {}))
            .unwrap();

        provider.unregister(RegistrationId(999));
        assert_eq!(provider.registration_count(), 1);
        assert_eq!(provider.unregister_calls(), 0);

        provider.unregister(id);
        provider.unregister(id);
        assert_eq!(provider.registration_count(), 0);
        assert_eq!(provider.unregister_calls(), 1);
    }
}
