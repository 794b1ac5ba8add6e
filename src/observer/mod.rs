#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::connectome::NeuronId;
use crate::driver::{Driver, DriveSummary};
use crate::engine::EnginePhase;
use crate::kinematics::{BodyPose, Kinematics};
use crate::motor::DriveCommand;
use crate::simulation::Simulation;

/// How many neurons `SimulationAdapter::snapshot` lists by activity.
pub const MOST_ACTIVE_DEFAULT: usize = 8;

/// A read-only snapshot of what the worm is doing.
///
/// Observers cannot mutate or steer the simulation. Snapshotting is
/// on-demand and allocates; the step loop is unaffected.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SimulationSnapshot {
    pub age_steps: u64,
    pub phase: EnginePhase,
    pub pose: BodyPose,
    pub last_drive: Option<DriveCommand>,

    pub fired_last_step: Vec<String>,
    /// `(name, current potential)`, largest magnitude first.
    pub most_active: Vec<(String, i64)>,
}

pub struct SimulationAdapter<'a, K: Kinematics> {
    sim: &'a Simulation<K>,
    most_active: usize,
}

impl<'a, K: Kinematics> SimulationAdapter<'a, K> {
    pub fn new(sim: &'a Simulation<K>) -> Self {
        Self {
            sim,
            most_active: MOST_ACTIVE_DEFAULT,
        }
    }

    pub fn with_most_active(mut self, n: usize) -> Self {
        self.most_active = n;
        self
    }

    pub fn snapshot(&self) -> SimulationSnapshot {
        let engine = self.sim.engine();

        SimulationSnapshot {
            age_steps: engine.age_steps(),
            phase: engine.phase(),
            pose: self.sim.pose(),
            last_drive: self.sim.last_drive(),

            fired_last_step: ids_to_names(self.sim, engine.fired_last_step()),
            most_active: engine
                .most_active(self.most_active)
                .into_iter()
                .map(|(id, v)| (self.sim.graph().name(id).to_string(), v))
                .collect(),
        }
    }
}

fn ids_to_names<K: Kinematics>(sim: &Simulation<K>, ids: &[NeuronId]) -> Vec<String> {
    ids.iter()
        .map(|&id| sim.graph().name(id).to_string())
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct DriverSnapshot {
    pub simulation: SimulationSnapshot,
    pub nose_touching: bool,
    pub summary: DriveSummary,
}

pub struct DriverAdapter<'a, K: Kinematics> {
    driver: &'a Driver<K>,
}

impl<'a, K: Kinematics> DriverAdapter<'a, K> {
    pub fn new(driver: &'a Driver<K>) -> Self {
        Self { driver }
    }

    pub fn snapshot(&self) -> DriverSnapshot {
        DriverSnapshot {
            simulation: SimulationAdapter::new(self.driver.simulation()).snapshot(),
            nose_touching: self.driver.nose_touching(),
            summary: self.driver.summary(),
        }
    }
}
