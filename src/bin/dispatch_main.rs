// dispatch_main.rs
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use taxi_dispatch::monitoring::ride_log::run_ride_log;
use taxi_dispatch::simulation_engine::fleet_client::FleetClient;
use taxi_dispatch::simulation_engine::rider_client::RiderClient;
use taxi_dispatch::{Config, DispatchError, Dispatcher};
use tokio::time::sleep;

/// Runs a simulated fleet and a stream of riders through the dispatcher.
#[derive(Debug, Parser)]
struct Args {
    /// JSON config file; built-in defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Seed for vehicle and ride locations.
    #[arg(long)]
    seed: Option<u64>,
    /// Append every ride event to this CSV file.
    #[arg(long)]
    ride_log: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args = Args::parse();

    if let Err(e) = run(args).await {
        eprintln!("Dispatch error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), DispatchError> {
    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    let mut seeder = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let fleet_rng = StdRng::seed_from_u64(seeder.random());
    let rider_rng = StdRng::seed_from_u64(seeder.random());

    println!("=== Taxi dispatch starting ===");
    let dispatcher = Arc::new(Dispatcher::start(&config.dispatch));
    let ride_log = args
        .ride_log
        .map(|path| tokio::spawn(run_ride_log(dispatcher.subscribe(), path)));

    let sim = &config.simulation;
    let fleet = tokio::spawn(
        FleetClient::new(
            Arc::clone(&dispatcher),
            sim.fleet_size,
            sim.registration_interval(),
            sim.grid_size,
        )
        .run(fleet_rng),
    );

    info!(
        "Waiting {:?} for initial vehicles to register",
        sim.rider_warmup()
    );
    sleep(sim.rider_warmup()).await;

    let report = RiderClient::new(
        Arc::clone(&dispatcher),
        sim.ride_count,
        sim.request_interval(),
        sim.grid_size,
    )
    .run(rider_rng)
    .await;

    dispatcher.shutdown();
    info!("All requests sent, waiting for rides to complete");
    let stats = dispatcher.join().await?;
    let vehicles = fleet.await?;

    // Last handle to the event channel; the ride log ends once it is gone.
    drop(dispatcher);
    if let Some(handle) = ride_log {
        handle.await??;
    }

    println!(
        "{} vehicles, {} ride requests accepted, {} rejected",
        vehicles.len(),
        report.accepted,
        report.rejected
    );
    println!("{}", serde_json::to_string_pretty(&stats)?);
    println!("=== Taxi dispatch finished ===");
    Ok(())
}
