//! A C. elegans connectome driving a simulated body.
//!
//! Sensor groups inject signal into a static weighted graph of ~400 neurons.
//! Each [`simulation::Simulation::step`] fires every neuron whose accumulated
//! potential crosses the threshold, drains the body-wall muscles into a
//! left/right [`motor::DriveCommand`], and feeds that to a body model
//! ([`kinematics::SteeringBody`] or [`kinematics::DifferentialDrive`]).
//!
//! ```no_run
//! use std::sync::Arc;
//! use nematode::prelude::*;
//!
//! let cfg = WormConfig::default();
//! let graph = Arc::new(ConnectomeGraph::bundled(&cfg)?);
//! let mut sim = Simulation::steering(graph, &cfg)?;
//! sim.trigger(FOOD)?;
//! let report = sim.step()?;
//! println!("{:?}", report.pose);
//! # Ok::<(), nematode::Error>(())
//! ```

#[path = "core/error.rs"]
pub mod error;

#[path = "core/connectome.rs"]
pub mod connectome;

#[path = "core/config.rs"]
pub mod config;

#[path = "core/sensors.rs"]
pub mod sensors;

#[path = "core/engine.rs"]
pub mod engine;

#[path = "core/motor.rs"]
pub mod motor;

#[path = "core/kinematics.rs"]
pub mod kinematics;

#[path = "core/simulation.rs"]
pub mod simulation;

pub mod driver;
pub mod observer;

pub use error::{Error, Result};

pub mod prelude {
    pub use crate::config::{SensorGroupConfig, WormConfig};
    pub use crate::connectome::{ConnectomeGraph, MuscleSide, NeuronId};
    pub use crate::driver::{Cage, DriveSummary, Driver, DriverConfig};
    pub use crate::engine::{EnginePhase, PropagationEngine, SignalState};
    pub use crate::error::{ConfigError, RuntimeError};
    pub use crate::kinematics::{
        bounded_clip, BodyPose, DiffDriveConfig, DifferentialDrive, Kinematics, SteeringBody,
        SteeringConfig,
    };
    pub use crate::motor::DriveCommand;
    pub use crate::observer::SimulationAdapter;
    pub use crate::sensors::{SensorInterface, ANTERIOR_HARSH_TOUCH, FOOD, NOSE_TOUCH};
    pub use crate::simulation::{Simulation, StepReport};
}
