use clap::Parser;
use log::{error, info};
use std::sync::Arc;
use step_counter_service::broadcast::{BroadcastPublisher, JsonLinesListener, LogListener};
use step_counter_service::config::{Config, load_dotenv};
use step_counter_service::instance_lock::InstanceLock;
use step_counter_service::sensors::{SensorProvider, SimulatedSensorProvider};
use step_counter_service::service::{
    LogKeepalive, ServiceLifecycle, StartArgs, StepCounterService,
};
use tokio::signal;

const INSTANCE_NAME: &str = "step-counter-service";

#[derive(Parser)]
#[command(name = "step-counter-service")]
#[command(about = "Background step counter that broadcasts step count updates")]
struct Cli {
    /// Identifier of the foreground (keepalive) declaration
    #[arg(long)]
    foreground_id: Option<u32>,

    /// Broadcast channel name
    #[arg(long)]
    channel: Option<String>,

    /// Interval between simulated step counter readings
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Upper bound of simulated steps added per reading
    #[arg(long)]
    max_steps_per_tick: Option<u64>,

    /// Initial value of the simulated hardware counter
    #[arg(long)]
    initial_count: Option<u64>,

    /// Simulate a device without a step counter sensor
    #[arg(long)]
    no_sensor: bool,

    /// Simulate an inaccessible sensor subsystem
    #[arg(long)]
    no_provider: bool,

    /// Write every broadcast as a JSON line to stdout
    #[arg(long, env = "STEP_JSON_OUTPUT")]
    json: bool,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(id) = self.foreground_id {
            config.service.foreground_id = id;
        }
        if let Some(channel) = &self.channel {
            config.service.broadcast_channel = channel.clone();
        }
        if let Some(interval) = self.interval_ms {
            config.simulation.interval_ms = interval;
        }
        if let Some(steps) = self.max_steps_per_tick {
            config.simulation.max_steps_per_tick = steps;
        }
        if let Some(count) = self.initial_count {
            config.simulation.initial_count = count;
        }
        if self.no_sensor {
            config.simulation.sensor_present = false;
        }
        if self.no_provider {
            config.simulation.provider_present = false;
        }
    }
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn main() {
    // Load .env file before the runtime starts any threads
    load_dotenv();
    init_logger();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    cli.apply(&mut config);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {}", e);
            std::process::exit(1);
        }
    };
    runtime.block_on(run(cli, config));
}

async fn run(cli: Cli, config: Config) {
    let _instance_lock = match InstanceLock::acquire(INSTANCE_NAME) {
        Ok(lock) => lock,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    info!("Starting step counter service");
    info!("  Broadcast channel: {}", config.service.broadcast_channel);
    info!("  Foreground ID: {}", config.service.foreground_id);
    info!("  Sampling rate: {}", config.service.sampling_rate);

    let provider: Option<Arc<dyn SensorProvider>> = if config.simulation.provider_present {
        info!(
            "  Simulated step counter: every {:?}, up to {} steps",
            config.simulation.interval(),
            config.simulation.max_steps_per_tick
        );
        let simulated = SimulatedSensorProvider::new(
            config.simulation.clone(),
            tokio::runtime::Handle::current(),
        );
        Some(Arc::new(simulated) as Arc<dyn SensorProvider>)
    } else {
        None
    };

    let publisher = Arc::new(BroadcastPublisher::new(
        config.service.broadcast_channel.clone(),
    ));
    publisher.register_listener("log", |b| LogListener.handle(b));
    if cli.json {
        let json = JsonLinesListener::new(std::io::stdout());
        publisher.register_listener("stdout", move |b| json.handle(b));
    }

    let service = StepCounterService::new(
        &config.service,
        provider,
        Arc::new(LogKeepalive::new()),
        publisher,
    );

    service.on_create();
    match service.on_start_command(&StartArgs::new(1)) {
        Ok(result) => info!("Step counter service running (restart policy: {:?})", result),
        Err(e) => error!("Failed to start step counter service: {}", e),
    }
    info!("  - Press Ctrl+C to exit");

    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received shutdown signal");
        }
        Err(e) => {
            error!("Failed to listen for shutdown signal: {}", e);
        }
    }

    let last = service.step_count();
    service.on_destroy();
    match last {
        Some(steps) => info!("Step counter service stopped at {} steps", steps),
        None => info!("Step counter service stopped without readings"),
    }
}
