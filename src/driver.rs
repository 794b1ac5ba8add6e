//! Closed-loop runner: body senses the cage, sensors stimulate the worm,
//! the connectome moves the body.
//!
//! Each tick:
//! - nose against a wall → trigger `nose-touch`
//! - otherwise, during the first `food_steps` ticks → trigger `food`
//! - then exactly one [`Simulation::step`]

use std::f64::consts::{FRAC_PI_2, PI, TAU};
use std::sync::Arc;

#[cfg(feature = "parallel")]
use rayon::prelude::*;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::WormConfig;
use crate::connectome::ConnectomeGraph;
use crate::kinematics::{BodyPose, Kinematics, SteeringBody};
use crate::sensors::{FOOD, NOSE_TOUCH};
use crate::simulation::{Simulation, StepReport};

/// Rectangular enclosure centred on the origin.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Cage {
    pub half_width: f64,
    pub half_height: f64,
    /// How close to a wall counts as touching.
    pub wall_buffer: f64,
    /// Max angular distance (radians) between heading and a wall's normal.
    /// Anything above π disables the heading check.
    pub heading_buffer: f64,
}

impl Default for Cage {
    fn default() -> Self {
        Self {
            half_width: 250.0,
            half_height: 250.0,
            wall_buffer: 20.0,
            heading_buffer: TAU,
        }
    }
}

/// Smallest angle between two headings, in `[0, π]`.
fn angular_distance(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(TAU);
    d.min(TAU - d)
}

impl Cage {
    pub fn new(half_width: f64, half_height: f64) -> Self {
        Self {
            half_width,
            half_height,
            ..Self::default()
        }
    }

    /// Near a wall and facing into it.
    pub fn nose_touching(&self, pose: &BodyPose) -> bool {
        let facing = |wall: f64| angular_distance(pose.heading, wall) < self.heading_buffer;
        let near = |pos: f64, wall: f64| (pos - wall).abs() < self.wall_buffer;

        (near(pose.x, self.half_width) && facing(0.0))
            || (near(pose.y, self.half_height) && facing(FRAC_PI_2))
            || (near(pose.x, -self.half_width) && facing(PI))
            || (near(pose.y, -self.half_height) && facing(PI + FRAC_PI_2))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DriverConfig {
    pub cage: Cage,
    /// Food is presented for this many ticks at the start of a run.
    pub food_steps: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            cage: Cage::default(),
            food_steps: 15,
        }
    }
}

/// Aggregate of one run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DriveSummary {
    pub steps: u64,
    pub mean_left: f64,
    pub mean_right: f64,
    pub nose_touches: u64,
    pub food_triggers: u64,
    pub final_pose: BodyPose,
}

impl DriveSummary {
    /// Average right-minus-left drive; the trim that would straighten the
    /// worm out.
    pub fn bias(&self) -> f64 {
        self.mean_right - self.mean_left
    }
}

pub struct Driver<K: Kinematics> {
    sim: Simulation<K>,
    cfg: DriverConfig,

    ticks: u64,
    nose_touches: u64,
    food_triggers: u64,
    left_sum: f64,
    right_sum: f64,
}

impl<K: Kinematics> Driver<K> {
    pub fn new(sim: Simulation<K>, cfg: DriverConfig) -> Self {
        Self {
            sim,
            cfg,
            ticks: 0,
            nose_touches: 0,
            food_triggers: 0,
            left_sum: 0.0,
            right_sum: 0.0,
        }
    }

    pub fn simulation(&self) -> &Simulation<K> {
        &self.sim
    }

    pub fn config(&self) -> &DriverConfig {
        &self.cfg
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn nose_touching(&self) -> bool {
        self.cfg.cage.nose_touching(&self.sim.pose())
    }

    /// Sense, stimulate and step once.
    ///
    /// A failed tick changes nothing: injections are undone and the
    /// counters are left as they were.
    pub fn tick(&mut self) -> crate::Result<StepReport> {
        let stimulus = if self.nose_touching() {
            Some(NOSE_TOUCH)
        } else if self.ticks < self.cfg.food_steps {
            Some(FOOD)
        } else {
            None
        };

        let report = self.sim.stimulate_and_step(stimulus.as_slice())?;
        match stimulus {
            Some(NOSE_TOUCH) => self.nose_touches += 1,
            Some(_) => self.food_triggers += 1,
            None => {}
        }
        self.ticks += 1;
        self.left_sum += report.drive.left;
        self.right_sum += report.drive.right;
        Ok(report)
    }

    pub fn run(&mut self, steps: u64) -> crate::Result<DriveSummary> {
        for _ in 0..steps {
            self.tick()?;
        }
        let summary = self.summary();
        tracing::info!(
            steps = summary.steps,
            mean_left = summary.mean_left,
            mean_right = summary.mean_right,
            nose_touches = summary.nose_touches,
            "run finished"
        );
        Ok(summary)
    }

    pub fn summary(&self) -> DriveSummary {
        let n = self.ticks.max(1) as f64;
        DriveSummary {
            steps: self.ticks,
            mean_left: self.left_sum / n,
            mean_right: self.right_sum / n,
            nose_touches: self.nose_touches,
            food_triggers: self.food_triggers,
            final_pose: self.sim.pose(),
        }
    }

    pub fn into_simulation(self) -> Simulation<K> {
        self.sim
    }
}

fn run_one(
    graph: &Arc<ConnectomeGraph>,
    cfg: &WormConfig,
    driver: DriverConfig,
    steps: u64,
) -> crate::Result<DriveSummary> {
    let sim = Simulation::<SteeringBody>::steering(Arc::clone(graph), cfg)?;
    Driver::new(sim, driver).run(steps)
}

/// Run one steering worm per config, all sharing `graph`.
///
/// Results are in input order. With the `parallel` feature the runs go to
/// the rayon pool.
#[cfg(feature = "parallel")]
pub fn run_batch(
    graph: &Arc<ConnectomeGraph>,
    configs: &[WormConfig],
    driver: DriverConfig,
    steps: u64,
) -> crate::Result<Vec<DriveSummary>> {
    configs
        .par_iter()
        .map(|cfg| run_one(graph, cfg, driver, steps))
        .collect()
}

#[cfg(not(feature = "parallel"))]
pub fn run_batch(
    graph: &Arc<ConnectomeGraph>,
    configs: &[WormConfig],
    driver: DriverConfig,
    steps: u64,
) -> crate::Result<Vec<DriveSummary>> {
    configs
        .iter()
        .map(|cfg| run_one(graph, cfg, driver, steps))
        .collect()
}
