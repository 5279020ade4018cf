use clap::Parser;
use embassy_executor::Spawner;
use embassy_time::{Delay, Duration, Timer};
use log::*;
use static_cell::StaticCell;

use kiln_controller::config::{OvenConfig, SimulationConfig};
use kiln_controller::oven_controller::{OvenController, OvenIo, SimulatedOven};
use kiln_controller::profile::Profile;
use kiln_controller::profile_reader::{list_profiles, parse_profile, read_profile};
use kiln_controller::status::StatusReporter;
use kiln_controller::temperature_sensor_mock::{Simulator, ThermalModel};
use kiln_controller::{OvenShared, RunMode};

static SHARED: StaticCell<OvenShared> = StaticCell::new();
static OVEN: StaticCell<SimulatedOven<'static, Delay>> = StaticCell::new();

/// Fire a simulated kiln through one profile.
#[derive(Parser, Debug)]
#[command(version = kiln_controller::VERSION)]
struct Args {
    /// Built-in profile to run.
    #[arg(long, default_value = "test", conflicts_with = "profile_file")]
    profile: String,

    /// JSON profile file to run instead of a built-in one.
    #[arg(long)]
    profile_file: Option<String>,

    /// Control tick in milliseconds.
    #[arg(long, default_value_t = 500)]
    tick_millis: u32,

    /// Seconds of schedule lookahead.
    #[arg(long, default_value_t = 0.0)]
    previsioning: f32,
}

fn load_profile(args: &Args) -> Result<Profile, String> {
    match &args.profile_file {
        Some(path) => {
            let json = std::fs::read_to_string(path).map_err(|e| format!("{}: {}", path, e))?;
            parse_profile(&json).map_err(|e| format!("{}: {}", path, e))
        }
        None => read_profile(&args.profile).map_err(|e| {
            let known: Vec<_> = list_profiles().collect();
            format!("{}: {} (built-in: {})", args.profile, e, known.join(", "))
        }),
    }
}

/// Everything the tasks need, built before the executor runs anything.
struct Setup {
    shared: &'static OvenShared,
    oven: &'static mut SimulatedOven<'static, Delay>,
    model: ThermalModel,
    config: OvenConfig,
}

fn setup(args: &Args) -> Result<Setup, String> {
    let profile = load_profile(args).map_err(|e| format!("Cannot load profile {}", e))?;

    let config = OvenConfig {
        tick_millis: args.tick_millis,
        sensor_interval_millis: args.tick_millis,
        previsioning: args.previsioning,
        ..OvenConfig::simulated()
    };
    let simulation = SimulationConfig {
        time_step: config.tick_secs(),
        ..SimulationConfig::default()
    };
    let model = ThermalModel::new(simulation).map_err(|e| format!("Invalid simulation: {}", e))?;

    let shared: &'static OvenShared = SHARED.init(OvenShared::new());
    let oven = OvenController::new(config, shared, OvenIo::simulated(), Delay)
        .map_err(|e| format!("Invalid configuration: {}", e))?;

    shared
        .handle()
        .submit_profile(profile)
        .map_err(|e| format!("Profile not accepted: {}", e))?;

    Ok(Setup {
        shared,
        oven: OVEN.init(oven),
        model,
        config,
    })
}

#[embassy_executor::task]
async fn simulator_task(shared: &'static OvenShared, model: ThermalModel, interval: Duration) {
    Simulator::new(model, Delay, interval).run(shared).await
}

#[embassy_executor::task]
async fn controller_task(oven: &'static mut SimulatedOven<'static, Delay>) {
    oven.run().await
}

#[embassy_executor::task]
async fn status_task(shared: &'static OvenShared) {
    StatusReporter::new(Delay, Duration::from_secs(1))
        .run(shared)
        .await
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_millis()
        .init();

    let args = Args::parse();
    info!("Kiln controller {}", kiln_controller::VERSION);

    let Setup {
        shared,
        oven,
        model,
        config,
    } = match setup(&args) {
        Ok(setup) => setup,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    spawner.must_spawn(simulator_task(shared, model, config.sensor_interval()));
    spawner.must_spawn(controller_task(oven));
    spawner.must_spawn(status_task(shared));

    let handle = shared.handle();
    let mut started = false;
    loop {
        Timer::after(config.tick()).await;
        let state = handle.get_state();
        match state.run_mode {
            RunMode::Running => started = true,
            RunMode::Idle if started => {
                info!(
                    "Run finished ({:?}) at {} deg C",
                    state.last_reset_reason, state.measured_temperature
                );
                std::process::exit(0);
            }
            RunMode::Idle => {}
        }
    }
}
