use std::sync::Arc;

use tracing::{error, info};

use nematode::driver::{Driver, DriverConfig};
use nematode::kinematics::{Kinematics, SteeringConfig};
use nematode::observer::DriverAdapter;
use nematode::prelude::{ConnectomeGraph, Simulation, WormConfig};

const DEFAULT_STEPS: u64 = 2000;
const REPORT_EVERY: u64 = 250;

fn main() {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() >= 2 && (args[1] == "--help" || args[1] == "-h" || args[1] == "help") {
        print_help();
        return;
    }

    let body = args.get(1).map(String::as_str).unwrap_or("steering");
    let steps = match args.get(2).map(|s| s.parse::<u64>()) {
        None => DEFAULT_STEPS,
        Some(Ok(n)) => n,
        Some(Err(_)) => {
            eprintln!("steps must be a non-negative integer: {}", args[2]);
            print_help();
            std::process::exit(2);
        }
    };

    let result = match body {
        "steering" => run_steering(steps),
        "differential" => run_differential(steps),
        other => {
            eprintln!("Unknown body: {other}");
            print_help();
            std::process::exit(2);
        }
    };

    if let Err(e) = result {
        error!(error = %e, "simulation failed");
        std::process::exit(1);
    }
}

fn print_help() {
    println!("nematode (C. elegans connectome driving a simulated body)");
    println!("usage:");
    println!("  cargo run -- [steering|differential] [steps]");
    println!("  cargo run -- --help");
    println!();
    println!("Set RUST_LOG=debug to see every step.");
}

fn run_steering(steps: u64) -> nematode::Result<()> {
    let cfg = WormConfig::default().with_steering(SteeringConfig::calibrated());
    let graph = Arc::new(ConnectomeGraph::bundled(&cfg)?);
    let sim = Simulation::steering(graph, &cfg)?;
    drive(Driver::new(sim, DriverConfig::default()), steps)
}

fn run_differential(steps: u64) -> nematode::Result<()> {
    let cfg = WormConfig::default();
    let graph = Arc::new(ConnectomeGraph::bundled(&cfg)?);
    let sim = Simulation::differential(graph, &cfg)?;
    drive(Driver::new(sim, DriverConfig::default()), steps)
}

fn drive<K: Kinematics>(mut driver: Driver<K>, steps: u64) -> nematode::Result<()> {
    for t in 0..steps {
        driver.tick()?;

        if t % REPORT_EVERY == 0 {
            let snap = DriverAdapter::new(&driver).snapshot();
            let pose = snap.simulation.pose;
            info!(
                t,
                x = format_args!("{:.1}", pose.x),
                y = format_args!("{:.1}", pose.y),
                heading = format_args!("{:.3}", pose.heading),
                fired = snap.simulation.fired_last_step.len(),
                nose = snap.nose_touching,
                "tick"
            );
        }
    }

    let summary = driver.summary();
    println!("steps:        {}", summary.steps);
    println!("mean left:    {:.5}", summary.mean_left);
    println!("mean right:   {:.5}", summary.mean_right);
    println!("right - left: {:.5}", summary.bias());
    println!("nose touches: {}", summary.nose_touches);
    println!(
        "final pose:   x={:.2} y={:.2} heading={:.3}",
        summary.final_pose.x, summary.final_pose.y, summary.final_pose.heading
    );
    Ok(())
}
