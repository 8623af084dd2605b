//! Registration of interest in a sensor type with a [`SensorProvider`].

use super::{RegistrationId, SamplingRate, SensorEvent, SensorInfo, SensorProvider, SensorType};
use crate::error::{Result, ServiceError};
use log::{debug, info};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// Opaque token for an active registration with the sensor provider.
///
/// Invalidated by [`SensorSubscription::unsubscribe`]; unsubscribing an
/// invalidated handle again is a no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    id: RegistrationId,
    sensor: SensorInfo,
}

impl SubscriptionHandle {
    /// The sensor this handle is registered with.
    pub fn sensor(&self) -> &SensorInfo {
        &self.sensor
    }
}

/// Subscribes callbacks to sensors of an (optionally absent) provider.
pub struct SensorSubscription {
    provider: Option<Arc<dyn SensorProvider>>,
    rate: SamplingRate,
    active: Mutex<HashSet<RegistrationId>>,
}

impl SensorSubscription {
    /// Wrap a provider. `None` models a sensor subsystem that could not be obtained.
    pub fn new(provider: Option<Arc<dyn SensorProvider>>, rate: SamplingRate) -> Self {
        Self {
            provider,
            rate,
            active: Mutex::new(HashSet::new()),
        }
    }

    /// Register `callback` for events from the default sensor of `sensor_type`.
    ///
    /// The provider may invoke the callback from any thread, once per event.
    pub fn subscribe<F>(&self, sensor_type: SensorType, callback: F) -> Result<SubscriptionHandle>
    where
        F: Fn(SensorEvent) + Send + Sync + 'static,
    {
        let provider = self
            .provider
            .as_ref()
            .ok_or(ServiceError::ProviderUnavailable)?;
        let sensor = provider
            .default_sensor(sensor_type)
            .ok_or(ServiceError::SensorUnavailable(sensor_type))?;

        let id = provider.register(&sensor, self.rate, Arc::new(callback))?;
        self.active.lock().insert(id);

        info!(
            "{} sensor registered ({} by {}, rate={})",
            sensor_type, sensor.name, sensor.vendor, self.rate
        );
        Ok(SubscriptionHandle { id, sensor })
    }

    /// Unregister a handle. Returns `false` if it was already invalidated.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        if !self.active.lock().remove(&handle.id) {
            debug!("Ignoring unsubscribe of inactive handle {:?}", handle.id);
            return false;
        }
        if let Some(provider) = self.provider.as_ref() {
            provider.unregister(handle.id);
        }
        info!("{} sensor unregistered", handle.sensor.sensor_type);
        true
    }

    /// Check whether a handle is still registered.
    pub fn is_active(&self, handle: &SubscriptionHandle) -> bool {
        self.active.lock().contains(&handle.id)
    }

    /// Number of registrations currently held through this subscription.
    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    /// Whether a sensor provider was obtained at all.
    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }
}
