//! Simulated step counter for development and testing.
//!
//! Emulates a hardware step counter: a cumulative counter that keeps growing
//! for the lifetime of the provider, independent of who is registered.

use super::{
    RegistrationId, SamplingRate, SensorAccuracy, SensorCallback, SensorEvent, SensorInfo,
    SensorProvider, SensorReading, SensorType,
};
use crate::config::SimulationConfig;
use crate::error::{Result, ServiceError};
use log::{debug, info};
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

/// Lower bound for the tick period; `tokio::time::interval` rejects zero.
const MIN_TICK: Duration = Duration::from_millis(1);

/// Sensor provider backed by one tokio task per registration.
///
/// Each tick adds a random number of steps (up to `max_steps_per_tick`) to the
/// shared counter and delivers the new cumulative value as a
/// [`SensorType::StepCounter`] reading.
pub struct SimulatedSensorProvider {
    config: SimulationConfig,
    runtime: Handle,
    counter: Arc<AtomicU64>,
    next_id: AtomicU64,
    tasks: Mutex<HashMap<RegistrationId, CancellationToken>>,
}

impl SimulatedSensorProvider {
    /// Create a provider that spawns its tasks on `runtime`.
    pub fn new(config: SimulationConfig, runtime: Handle) -> Self {
        let counter = Arc::new(AtomicU64::new(config.initial_count));
        Self {
            config,
            runtime,
            counter,
            next_id: AtomicU64::new(1),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Current value of the simulated hardware counter.
    pub fn total_steps(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }

    /// Number of registrations with a running task.
    pub fn active_registrations(&self) -> usize {
        self.tasks.lock().len()
    }

    fn tick_period(&self, rate: SamplingRate) -> Duration {
        self.config.interval().max(rate.interval()).max(MIN_TICK)
    }
}

impl SensorProvider for SimulatedSensorProvider {
    fn default_sensor(&self, sensor_type: SensorType) -> Option<SensorInfo> {
        if sensor_type != SensorType::StepCounter || !self.config.sensor_present {
            return None;
        }
        Some(SensorInfo {
            sensor_type,
            name: "Simulated Step Counter".to_string(),
            vendor: env!("CARGO_PKG_NAME").to_string(),
        })
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
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let counter = self.counter.clone();
        let period = self.tick_period(rate);
        let max_steps = self.config.max_steps_per_tick;

        self.runtime.spawn(async move {
            callback(SensorEvent::AccuracyChanged {
                sensor_type: SensorType::StepCounter,
                accuracy: SensorAccuracy::High,
            });

            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        let steps = rand::thread_rng().gen_range(0..=max_steps);
                        let total = advance(&counter, steps);
                        debug!("[Sim] Step counter at {} (+{})", total, steps);
                        callback(SensorEvent::Reading(SensorReading::now(
                            SensorType::StepCounter,
                            total as f64,
                        )));
                    }
                }
            }
        });

        self.tasks.lock().insert(id, token);
        info!("[Sim] Step counter streaming every {:?}", period);
        Ok(id)
    }

    fn unregister(&self, id: RegistrationId) {
        if let Some(token) = self.tasks.lock().remove(&id) {
            token.cancel();
            info!("[Sim] Step counter stream stopped");
        }
    }
}

/// Add `steps` to the counter, saturating at `u64::MAX`. Returns the new total.
fn advance(counter: &AtomicU64, steps: u64) -> u64 {
    let previous = counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| {
            Some(c.saturating_add(steps))
        })
        .unwrap_or_else(|c| c);
    previous.saturating_add(steps)
}

impl Drop for SimulatedSensorProvider {
    fn drop(&mut self) {
        for (_, token) in self.tasks.lock().drain() {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use tokio::time::timeout;
    use tokio_test::assert_ok;

    fn test_config() -> SimulationConfig {
        SimulationConfig {
            provider_present: true,
            sensor_present: true,
            interval_ms: 5,
            max_steps_per_tick: 4,
            initial_count: 100,
        }
    }

    #[test]
    fn test_missing_sensor_is_not_exposed() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let config = SimulationConfig {
            sensor_present: false,
            ..test_config()
        };
        let provider = SimulatedSensorProvider::new(config, runtime.handle().clone());
        assert!(provider.default_sensor(SensorType::StepCounter).is_none());
        assert!(provider.default_sensor(SensorType::Accelerometer).is_none());
    }

    #[tokio::test]
    async fn test_readings_are_cumulative() {
        let provider = SimulatedSensorProvider::new(test_config(), Handle::current());
        let sensor = provider.default_sensor(SensorType::StepCounter).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let id = assert_ok!(provider.register(
            &sensor,
            SamplingRate::Fastest,
            Arc::new(move |event| {
                let _ = tx.send(event);
            }),
        ));

        let first = timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
        assert!(matches!(
            first,
            Some(SensorEvent::AccuracyChanged {
                accuracy: SensorAccuracy::High,
                ..
            })
        ));

        let mut previous = 100.0;
        for _ in 0..5 {
            match timeout(Duration::from_secs(2), rx.recv()).await.unwrap() {
                Some(SensorEvent::Reading(reading)) => {
                    assert_eq!(reading.sensor_type, SensorType::StepCounter);
                    assert!(reading.value >= previous);
                    previous = reading.value;
                }
                other => panic!("unexpected event: {:?}", other),
            }
        }

        provider.unregister(id);
        assert_eq!(provider.active_registrations(), 0);
    }

    #[tokio::test]
    async fn test_unregister_stops_stream() {
        let provider = SimulatedSensorProvider::new(test_config(), Handle::current());
        let sensor = provider.default_sensor(SensorType::StepCounter).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let id = assert_ok!(provider.register(
            &sensor,
            SamplingRate::Fastest,
            Arc::new(move |event| {
                let _ = tx.send(event);
            }),
        ));
        let _ = timeout(Duration::from_secs(2), rx.recv()).await.unwrap();

        provider.unregister(id);
        // The task drops its callback (and sender) once it observes cancellation.
        let drained = timeout(Duration::from_secs(2), async {
            while rx.recv().await.is_some() {}
        })
        .await;
        assert!(drained.is_ok());
    }

    #[test]
    fn test_advance_saturates() {
        let counter = AtomicU64::new(u64::MAX - 1);
        assert_eq!(advance(&counter, 0), u64::MAX - 1);
        assert_eq!(advance(&counter, 3), u64::MAX);
        assert_eq!(advance(&counter, 3), u64::MAX);
        assert_eq!(counter.load(Ordering::SeqCst), u64::MAX);
    }

    #[tokio::test]
    async fn test_stream_survives_counter_ceiling() {
        let config = SimulationConfig {
            max_steps_per_tick: 3,
            initial_count: u64::MAX - 1,
            ..test_config()
        };
        let provider = SimulatedSensorProvider::new(config, Handle::current());
        let sensor = provider.default_sensor(SensorType::StepCounter).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let id = assert_ok!(provider.register(
            &sensor,
            SamplingRate::Fastest,
            Arc::new(move |event| {
                let _ = tx.send(event);
            }),
        ));

        let mut readings = 0;
        while readings < 20 {
            match timeout(Duration::from_secs(2), rx.recv()).await {
                Ok(Some(SensorEvent::Reading(reading))) => {
                    assert!(reading.value >= (u64::MAX - 1) as f64);
                    readings += 1;
                }
                Ok(Some(_)) => {}
                Ok(None) | Err(_) => panic!("stream ended after {} readings", readings),
            }
        }

        assert!(provider.total_steps() >= u64::MAX - 1);
        provider.unregister(id);
    }
}
