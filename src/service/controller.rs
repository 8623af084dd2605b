//! The step counter service state machine.
//!
//! ```text
//! Created ──start()──► Listening ──stop()──► Destroyed
//!    └───────────────────stop()──────────────────┘
//! ```
//!
//! State, the active subscription handle and the step aggregator share one
//! lock. Sensor callbacks check the state under that lock before ingesting
//! and publish while still holding it, so once `stop()` has marked the
//! service destroyed no further broadcast can happen. Calls into the sensor
//! provider are made with the lock released.

use super::keepalive::{ForegroundNotification, KeepaliveDeclarer};
use super::lifecycle::{ServiceLifecycle, StartArgs, StartResult};
use crate::broadcast::BroadcastPublisher;
use crate::config::ServiceConfig;
use crate::error::{Result, ServiceError};
use crate::sensors::{
    SensorEvent, SensorProvider, SensorSubscription, SensorType, SubscriptionHandle,
};
use crate::steps::StepAggregator;
use log::{debug, error, info, trace};
use parking_lot::Mutex;
use std::convert::Infallible;
use std::sync::{Arc, Weak};
use strum::Display;

/// Lifecycle state of a [`StepCounterService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ServiceState {
    Created,
    Listening,
    Destroyed,
}

struct Inner {
    state: ServiceState,
    handle: Option<SubscriptionHandle>,
    aggregator: StepAggregator,
    foreground_declared: bool,
}

struct Shared {
    foreground_id: u32,
    notification: Option<ForegroundNotification>,
    subscription: SensorSubscription,
    keepalive: Arc<dyn KeepaliveDeclarer>,
    publisher: Arc<BroadcastPublisher>,
    inner: Mutex<Inner>,
}

impl Shared {
    fn on_sensor_event(&self, event: SensorEvent) {
        let reading = match event {
            SensorEvent::Reading(reading) => reading,
            SensorEvent::AccuracyChanged {
                sensor_type,
                accuracy,
            } => {
                debug!("{} accuracy changed to {}", sensor_type, accuracy);
                return;
            }
        };

        let mut inner = self.inner.lock();
        if inner.state != ServiceState::Listening {
            trace!(
                "Discarding {} reading while {}",
                reading.sensor_type, inner.state
            );
            return;
        }
        if let Some(change) = inner.aggregator.ingest(&reading) {
            self.publisher.publish(&change);
        }
    }
}

/// Background service that turns step counter readings into broadcasts.
///
/// The service has a one-shot lifetime: once stopped it cannot be started
/// again. Listeners run while the service lock is held and must not call
/// back into the service.
pub struct StepCounterService {
    shared: Arc<Shared>,
}

impl StepCounterService {
    /// Create a service in the [`ServiceState::Created`] state.
    ///
    /// `provider` is `None` when the sensor subsystem could not be obtained.
    pub fn new(
        config: &ServiceConfig,
        provider: Option<Arc<dyn SensorProvider>>,
        keepalive: Arc<dyn KeepaliveDeclarer>,
        publisher: Arc<BroadcastPublisher>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                foreground_id: config.foreground_id,
                notification: config.notification.clone(),
                subscription: SensorSubscription::new(provider, config.sampling_rate),
                keepalive,
                publisher,
                inner: Mutex::new(Inner {
                    state: ServiceState::Created,
                    handle: None,
                    aggregator: StepAggregator::new(),
                    foreground_declared: false,
                }),
            }),
        }
    }

    /// Declare the keepalive obligation and subscribe to the step counter.
    ///
    /// A no-op while listening. If no step counter can be subscribed the
    /// failure is logged and the service keeps running idle.
    pub fn start(&self) -> Result<()> {
        {
            let mut inner = self.shared.inner.lock();
            match inner.state {
                ServiceState::Destroyed => return Err(ServiceError::AlreadyDestroyed),
                ServiceState::Listening => {
                    debug!("Step counter service already listening");
                    return Ok(());
                }
                ServiceState::Created => {}
            }

            // Must precede sensor registration.
            self.shared.keepalive.declare_foreground(
                self.shared.foreground_id,
                self.shared.notification.as_ref(),
            );
            inner.foreground_declared = true;
            inner.state = ServiceState::Listening;
        }

        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        let subscribed = self
            .shared
            .subscription
            .subscribe(SensorType::StepCounter, move |event| {
                if let Some(shared) = weak.upgrade() {
                    shared.on_sensor_event(event);
                }
            });

        match subscribed {
            Ok(handle) => {
                let mut inner = self.shared.inner.lock();
                if inner.state == ServiceState::Listening {
                    inner.handle = Some(handle);
                    info!("Step counter service listening");
                } else {
                    // stop() ran while the provider was registering us.
                    drop(inner);
                    self.shared.subscription.unsubscribe(&handle);
                    debug!("Service stopped during subscription, released late handle");
                }
            }
            Err(e) => {
                error!("{}; service stays alive without step updates", e);
            }
        }
        Ok(())
    }

    /// Unsubscribe, release the keepalive obligation and become destroyed.
    ///
    /// Idempotent. Once this returns no listener observes another broadcast
    /// from this service.
    pub fn stop(&self) {
        let (previous, handle, release) = {
            let mut inner = self.shared.inner.lock();
            if inner.state == ServiceState::Destroyed {
                debug!("Step counter service already destroyed");
                return;
            }
            let previous = inner.state;
            inner.state = ServiceState::Destroyed;
            (
                previous,
                inner.handle.take(),
                std::mem::take(&mut inner.foreground_declared),
            )
        };

        if let Some(handle) = handle {
            self.shared.subscription.unsubscribe(&handle);
        }
        if release {
            self.shared
                .keepalive
                .release_foreground(self.shared.foreground_id);
        }
        info!("Step counter service stopped (was {})", previous);
    }

    pub fn state(&self) -> ServiceState {
        self.shared.inner.lock().state
    }

    /// Last step count accepted during this service's lifetime.
    pub fn step_count(&self) -> Option<u64> {
        self.shared.inner.lock().aggregator.current()
    }

    /// Whether a sensor subscription is currently active.
    pub fn is_subscribed(&self) -> bool {
        self.shared.inner.lock().handle.is_some()
    }

    pub fn publisher(&self) -> &Arc<BroadcastPublisher> {
        &self.shared.publisher
    }
}

impl ServiceLifecycle for StepCounterService {
    /// Not a bound service.
    type Binder = Infallible;

    fn on_create(&self) {
        info!("Service created");
        if !self.shared.subscription.has_provider() {
            debug!("No sensor provider attached");
        }
    }

    fn on_start_command(&self, args: &StartArgs) -> Result<StartResult> {
        debug!(
            "Start command {} (redelivered={})",
            args.start_id, args.redelivered
        );
        self.start()?;
        Ok(StartResult::Sticky)
    }

    fn on_destroy(&self) {
        self.stop();
        info!("Service destroyed");
    }

    fn on_bind(&self) -> Option<Self::Binder> {
        None
    }
}

impl Drop for StepCounterService {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::sensors::{
        ManualSensorProvider, RegistrationId, SamplingRate, SensorCallback, SensorInfo,
        SensorReading,
    };
    use crate::service::keepalive::LogKeepalive;
    use std::sync::mpsc;
    use std::thread;

    /// Records the order of keepalive and provider calls.
    #[derive(Default)]
    struct CallLog(Mutex<Vec<&'static str>>);

    impl CallLog {
        fn push(&self, call: &'static str) {
            self.0.lock().push(call);
        }

        fn calls(&self) -> Vec<&'static str> {
            self.0.lock().clone()
        }
    }

    struct RecordingKeepalive(Arc<CallLog>);

    impl KeepaliveDeclarer for RecordingKeepalive {
        fn declare_foreground(&self, _id: u32, _descriptor: Option<&ForegroundNotification>) {
            self.0.push("declare");
        }

        fn release_foreground(&self, _id: u32) {
            self.0.push("release");
        }
    }

    /// Delegates to a manual provider, optionally blocking inside `register`.
    struct GatedProvider {
        inner: ManualSensorProvider,
        log: Arc<CallLog>,
        gate: Option<(mpsc::Sender<()>, Mutex<mpsc::Receiver<()>>)>,
        emit_on_register: Option<f64>,
    }

    impl GatedProvider {
        fn new(log: Arc<CallLog>) -> Self {
            Self {
                inner: ManualSensorProvider::with_sensor(SensorType::StepCounter),
                log,
                gate: None,
                emit_on_register: None,
            }
        }
    }

    impl SensorProvider for GatedProvider {
        fn default_sensor(&self, sensor_type: SensorType) -> Option<SensorInfo> {
            self.inner.default_sensor(sensor_type)
        }

        fn register(
            &self,
            sensor: &SensorInfo,
            rate: SamplingRate,
            callback: SensorCallback,
        ) -> Result<RegistrationId> {
            self.log.push("register");
            if let Some((entered, proceed)) = &self.gate {
                entered.send(()).unwrap();
                proceed.lock().recv().unwrap();
            }
            let id = self.inner.register(sensor, rate, callback)?;
            if let Some(value) = self.emit_on_register {
                self.inner
                    .emit_reading(SensorReading::now(SensorType::StepCounter, value));
            }
            Ok(id)
        }

        fn unregister(&self, id: RegistrationId) {
            self.log.push("unregister");
            self.inner.unregister(id);
        }
    }

    fn service_with(
        provider: Option<Arc<dyn SensorProvider>>,
        keepalive: Arc<dyn KeepaliveDeclarer>,
    ) -> StepCounterService {
        let config = Config::default();
        let publisher = Arc::new(BroadcastPublisher::new(
            config.service.broadcast_channel.clone(),
        ));
        StepCounterService::new(&config.service, provider, keepalive, publisher)
    }

    fn recorded_counts(service: &StepCounterService) -> Arc<Mutex<Vec<u64>>> {
        let counts = Arc::new(Mutex::new(Vec::new()));
        let sink = counts.clone();
        service.publisher().register_listener("recorder", move |b| {
            sink.lock().push(b.payload.step_count);
            Ok(())
        });
        counts
    }

    #[test]
    fn test_keepalive_declared_before_registration() {
        let log = Arc::new(CallLog::default());
        let provider = Arc::new(GatedProvider::new(log.clone()));
        let service = service_with(Some(provider), Arc::new(RecordingKeepalive(log.clone())));

        service.start().unwrap();
        service.stop();

        assert_eq!(
            log.calls(),
            vec!["declare", "register", "unregister", "release"]
        );
    }

    #[test]
    fn test_stop_from_created_releases_nothing() {
        let log = Arc::new(CallLog::default());
        let provider = Arc::new(GatedProvider::new(log.clone()));
        let service = service_with(Some(provider), Arc::new(RecordingKeepalive(log.clone())));

        service.stop();
        assert_eq!(service.state(), ServiceState::Destroyed);
        assert!(log.calls().is_empty());
        assert!(matches!(service.start(), Err(ServiceError::AlreadyDestroyed)));
    }

    #[test]
    fn test_reading_during_registration_is_processed() {
        let log = Arc::new(CallLog::default());
        let mut provider = GatedProvider::new(log);
        provider.emit_on_register = Some(8.0);
        let keepalive = Arc::new(LogKeepalive::new());
        let service = service_with(Some(Arc::new(provider)), keepalive);
        let counts = recorded_counts(&service);

        service.start().unwrap();
        assert_eq!(*counts.lock(), vec![8]);
        assert_eq!(service.step_count(), Some(8));
    }

    #[test]
    fn test_stop_during_registration_releases_late_handle() {
        let log = Arc::new(CallLog::default());
        let (entered_tx, entered_rx) = mpsc::channel();
        let (proceed_tx, proceed_rx) = mpsc::channel();
        let mut provider = GatedProvider::new(log.clone());
        provider.gate = Some((entered_tx, Mutex::new(proceed_rx)));
        let provider = Arc::new(provider);

        let service = Arc::new(service_with(
            Some(provider.clone()),
            Arc::new(RecordingKeepalive(log.clone())),
        ));

        let starter = {
            let service = service.clone();
            thread::spawn(move || service.start())
        };
        entered_rx.recv().unwrap();
        service.stop();
        proceed_tx.send(()).unwrap();
        starter.join().unwrap().unwrap();

        assert_eq!(service.state(), ServiceState::Destroyed);
        assert!(!service.is_subscribed());
        assert_eq!(provider.inner.registration_count(), 0);
        assert_eq!(
            log.calls(),
            vec!["declare", "register", "release", "unregister"]
        );
    }

    #[test]
    fn test_accuracy_changes_do_not_publish() {
        let provider = Arc::new(ManualSensorProvider::with_sensor(SensorType::StepCounter));
        let service = service_with(Some(provider.clone()), Arc::new(LogKeepalive::new()));
        let counts = recorded_counts(&service);
        service.start().unwrap();

        provider.emit(SensorEvent::AccuracyChanged {
            sensor_type: SensorType::StepCounter,
            accuracy: crate::sensors::SensorAccuracy::Low,
        });
        assert!(counts.lock().is_empty());
    }

    #[test]
    fn test_lifecycle_surface() {
        let provider = Arc::new(ManualSensorProvider::with_sensor(SensorType::StepCounter));
        let keepalive = Arc::new(LogKeepalive::new());
        let service = service_with(Some(provider.clone()), keepalive.clone());

        service.on_create();
        assert_eq!(service.state(), ServiceState::Created);
        assert_eq!(provider.register_calls(), 0);
        assert!(service.on_bind().is_none());

        let result = service.on_start_command(&StartArgs::new(1)).unwrap();
        assert_eq!(result, StartResult::Sticky);
        assert_eq!(keepalive.active_id(), Some(1));

        service.on_destroy();
        assert_eq!(keepalive.active_id(), None);
        assert!(matches!(
            service.on_start_command(&StartArgs::new(2)),
            Err(ServiceError::AlreadyDestroyed)
        ));
    }

    #[test]
    fn test_drop_tears_down_subscription() {
        let provider = Arc::new(ManualSensorProvider::with_sensor(SensorType::StepCounter));
        let keepalive = Arc::new(LogKeepalive::new());
        {
            let service = service_with(Some(provider.clone()), keepalive.clone());
            service.start().unwrap();
            assert_eq!(provider.registration_count(), 1);
        }
        assert_eq!(provider.registration_count(), 0);
        assert_eq!(keepalive.active_id(), None);
    }
}
