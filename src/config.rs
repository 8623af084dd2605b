use crate::sensors::SamplingRate;
use crate::service::keepalive::ForegroundNotification;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Broadcast channel step count updates are published on by default.
pub const DEFAULT_BROADCAST_CHANNEL: &str = "com.example.health_app.STEP_COUNT_UPDATE";

/// Load environment variables from .env file with robust parsing.
/// Handles values with spaces without requiring quotes.
pub fn load_dotenv() {
    load_dotenv_from(Path::new(".env"));
}

/// Load environment variables from the given file if it exists.
///
/// Variables already present in the environment take precedence.
pub fn load_dotenv_from(env_path: &Path) {
    let content = match fs::read_to_string(env_path) {
        Ok(c) => c,
        Err(_) => return,
    };

    for (key, value) in parse_dotenv(&content) {
        if std::env::var(key).is_err() {
            // SAFETY: called during startup before the async runtime spawns threads
            unsafe { std::env::set_var(key, value) };
        }
    }
}

/// Parse `KEY=value` lines, skipping blanks and comments.
fn parse_dotenv(content: &str) -> Vec<(&str, &str)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let (key, value) = line.split_once('=')?;
            let mut value = value.trim();
            if value.len() >= 2
                && ((value.starts_with('"') && value.ends_with('"'))
                    || (value.starts_with('\'') && value.ends_with('\'')))
            {
                value = &value[1..value.len() - 1];
            }
            Some((key.trim(), value))
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub simulation: SimulationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Identifier passed with the foreground (keepalive) declaration.
    pub foreground_id: u32,
    /// Descriptor shown by the host while the service runs in the foreground.
    pub notification: Option<ForegroundNotification>,
    /// Name of the channel step count updates are broadcast on.
    pub broadcast_channel: String,
    pub sampling_rate: SamplingRate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Whether the simulated sensor subsystem can be obtained at all.
    pub provider_present: bool,
    /// Whether the simulated device has a step counter sensor.
    pub sensor_present: bool,
    pub interval_ms: u64,
    pub max_steps_per_tick: u64,
    /// Value of the cumulative hardware counter when the simulation starts.
    pub initial_count: u64,
}

impl SimulationConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                foreground_id: 1,
                notification: None,
                broadcast_channel: DEFAULT_BROADCAST_CHANNEL.to_string(),
                sampling_rate: SamplingRate::Normal,
            },
            simulation: SimulationConfig {
                provider_present: true,
                sensor_present: true,
                interval_ms: 1000,
                max_steps_per_tick: 3,
                initial_count: 0,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(id) = std::env::var("STEP_FOREGROUND_ID")
            && let Ok(id) = id.parse()
        {
            config.service.foreground_id = id;
        }
        if let Ok(title) = std::env::var("STEP_NOTIFICATION_TITLE") {
            let text = std::env::var("STEP_NOTIFICATION_TEXT").ok();
            config.service.notification = Some(ForegroundNotification::new(title, text));
        }
        if let Ok(channel) = std::env::var("STEP_BROADCAST_CHANNEL") {
            config.service.broadcast_channel = channel;
        }
        if let Ok(rate) = std::env::var("STEP_SAMPLING_RATE")
            && let Ok(rate) = rate.parse()
        {
            config.service.sampling_rate = rate;
        }

        // Simulated sensor provider
        if let Ok(present) = std::env::var("SIM_PROVIDER_PRESENT")
            && let Ok(p) = present.parse()
        {
            config.simulation.provider_present = p;
        }
        if let Ok(present) = std::env::var("SIM_SENSOR_PRESENT")
            && let Ok(p) = present.parse()
        {
            config.simulation.sensor_present = p;
        }
        if let Ok(interval) = std::env::var("SIM_INTERVAL_MS")
            && let Ok(i) = interval.parse()
        {
            config.simulation.interval_ms = i;
        }
        if let Ok(steps) = std::env::var("SIM_MAX_STEPS_PER_TICK")
            && let Ok(s) = steps.parse()
        {
            config.simulation.max_steps_per_tick = s;
        }
        if let Ok(count) = std::env::var("SIM_INITIAL_COUNT")
            && let Ok(c) = count.parse()
        {
            config.simulation.initial_count = c;
        }

        config
    }
}
