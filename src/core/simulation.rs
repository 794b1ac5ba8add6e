use std::sync::Arc;

use crate::config::WormConfig;
use crate::connectome::{ConnectomeGraph, NeuronId};
use crate::engine::PropagationEngine;
use crate::error::RuntimeError;
use crate::kinematics::{BodyPose, DifferentialDrive, Kinematics, SteeringBody};
use crate::motor::DriveCommand;
use crate::sensors::SensorInterface;

/// Outcome of one committed timestep.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub drive: DriveCommand,
    pub pose: BodyPose,
    pub fired: usize,
}

/// One worm: propagation state, sensors and a body.
///
/// The graph is shared; everything else is owned, so independent instances
/// can run on separate threads.
#[derive(Debug, Clone)]
pub struct Simulation<K: Kinematics> {
    engine: PropagationEngine,
    sensors: SensorInterface,
    body: K,
    last_drive: Option<DriveCommand>,
}

impl Simulation<SteeringBody> {
    pub fn steering(graph: Arc<ConnectomeGraph>, cfg: &WormConfig) -> crate::Result<Self> {
        let body = SteeringBody::new(cfg.steering)?;
        Self::with_body(graph, cfg, body)
    }
}

impl Simulation<DifferentialDrive> {
    pub fn differential(graph: Arc<ConnectomeGraph>, cfg: &WormConfig) -> crate::Result<Self> {
        let body = DifferentialDrive::new(cfg.differential)?;
        Self::with_body(graph, cfg, body)
    }
}

impl<K: Kinematics> Simulation<K> {
    /// Validates `cfg` and resolves its sensor groups against `graph`.
    pub fn with_body(graph: Arc<ConnectomeGraph>, cfg: &WormConfig, body: K) -> crate::Result<Self> {
        cfg.validate()?;
        let sensors = SensorInterface::new(&graph, &cfg.sensors)?;
        let engine = PropagationEngine::new(graph, cfg.threshold)?;
        Ok(Self {
            engine,
            sensors,
            body,
            last_drive: None,
        })
    }

    pub fn engine(&self) -> &PropagationEngine {
        &self.engine
    }

    pub fn sensors(&self) -> &SensorInterface {
        &self.sensors
    }

    pub fn body(&self) -> &K {
        &self.body
    }

    pub fn graph(&self) -> &Arc<ConnectomeGraph> {
        self.engine.graph()
    }

    pub fn pose(&self) -> BodyPose {
        self.body.pose()
    }

    pub fn last_drive(&self) -> Option<DriveCommand> {
        self.last_drive
    }

    pub fn age_steps(&self) -> u64 {
        self.engine.age_steps()
    }

    /// Inject a named stimulus into the next timestep.
    pub fn trigger(&mut self, group: &str) -> crate::Result<()> {
        self.sensors.trigger(group, &mut self.engine)
    }

    /// Stimulate individual neurons directly.
    pub fn inject(&mut self, neurons: &[NeuronId]) -> Result<(), RuntimeError> {
        self.engine.inject(neurons)
    }

    /// Fire, drain and move the body.
    ///
    /// Signal state and pose are committed together; if either the
    /// propagation or the body update fails, neither changes.
    pub fn step(&mut self) -> Result<StepReport, RuntimeError> {
        let pending = self.engine.prepare()?;
        let drive = pending.drive();
        let fired = pending.fired().len();

        let pose = match self.body.apply(drive) {
            Ok(pose) => pose,
            Err(e) => {
                self.engine.abort();
                tracing::warn!(error = %e, step = self.engine.age_steps(), "body update failed; step aborted");
                return Err(e);
            }
        };

        self.engine.commit(pending);
        self.last_drive = Some(drive);
        Ok(StepReport { drive, pose, fired })
    }

    /// Trigger `groups` in order, then step.
    ///
    /// All-or-nothing: if a trigger or the step fails, the injections made
    /// here are undone too, so retrying does not double-inject.
    pub fn stimulate_and_step(&mut self, groups: &[&str]) -> crate::Result<StepReport> {
        let saved = self.engine.state().clone();
        let outcome = self.trigger_all_and_step(groups);
        if outcome.is_err() {
            self.engine.restore(saved);
        }
        outcome
    }

    fn trigger_all_and_step(&mut self, groups: &[&str]) -> crate::Result<StepReport> {
        for group in groups {
            self.trigger(group)?;
        }
        Ok(self.step()?)
    }
}
