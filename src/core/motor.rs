#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::connectome::{ConnectomeGraph, MuscleSide, NeuronId};
use crate::engine::SignalState;
use crate::error::RuntimeError;

/// Raw left/right muscle potential for one timestep.
///
/// Not normalized; each kinematics model scales it its own way.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DriveCommand {
    pub left: f64,
    pub right: f64,
}

impl DriveCommand {
    pub fn new(left: f64, right: f64) -> Self {
        Self { left, right }
    }
}

/// Sums and resets the body-wall muscles after each round of firing.
#[derive(Debug, Clone)]
pub struct MotorAccumulator {
    left: Vec<NeuronId>,
    right: Vec<NeuronId>,
}

impl MotorAccumulator {
    pub fn new(graph: &ConnectomeGraph) -> Self {
        Self {
            left: graph.muscles(MuscleSide::Left),
            right: graph.muscles(MuscleSide::Right),
        }
    }

    pub fn left(&self) -> &[NeuronId] {
        &self.left
    }

    pub fn right(&self) -> &[NeuronId] {
        &self.right
    }

    /// Read every muscle's `next` potential into a left/right pair, then zero
    /// those entries so muscle potential never outlives its timestep.
    ///
    /// On overflow `state` is left untouched.
    pub fn drain(&self, state: &mut SignalState) -> Result<DriveCommand, RuntimeError> {
        let left = sum_next(state, &self.left, "left muscles")?;
        let right = sum_next(state, &self.right, "right muscles")?;

        for &id in self.left.iter().chain(&self.right) {
            state.take_next(id);
        }

        Ok(DriveCommand {
            left: left as f64,
            right: right as f64,
        })
    }
}

fn sum_next(
    state: &SignalState,
    muscles: &[NeuronId],
    group: &'static str,
) -> Result<i64, RuntimeError> {
    muscles.iter().try_fold(0i64, |acc, &id| {
        acc.checked_add(state.next(id))
            .ok_or_else(|| RuntimeError::Overflow(group.to_string()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectome::{Edge, MuscleMap};
    use std::collections::BTreeSet;

    fn graph() -> ConnectomeGraph {
        let ids: BTreeSet<String> = ["A", "L1", "L2", "R1"].iter().map(|s| s.to_string()).collect();
        ConnectomeGraph::build(
            vec![
                Edge::new("A", "L1", 5),
                Edge::new("A", "L2", -2),
                Edge::new("A", "R1", 7),
            ],
            ids,
            &MuscleMap {
                left: vec!["L1".into(), "L2".into()],
                right: vec!["R1".into()],
            },
            &[],
        )
        .unwrap()
    }

    #[test]
    fn drain_sums_each_side_and_zeroes_muscles() {
        let graph = graph();
        let motor = MotorAccumulator::new(&graph);
        let mut state = SignalState::zeroed(graph.len());
        let a = graph.id("A").unwrap();
        for (target, weight) in graph.outgoing(a) {
            state.accumulate(target, weight, &graph).unwrap();
        }

        let drive = motor.drain(&mut state).unwrap();
        assert_eq!(drive, DriveCommand::new(3.0, 7.0));
        for &m in motor.left().iter().chain(motor.right()) {
            assert_eq!(state.next(m), 0);
        }
    }

    #[test]
    fn second_drain_sees_nothing() {
        let graph = graph();
        let motor = MotorAccumulator::new(&graph);
        let mut state = SignalState::zeroed(graph.len());
        state
            .accumulate(graph.id("R1").unwrap(), 4, &graph)
            .unwrap();

        assert_eq!(motor.drain(&mut state).unwrap().right, 4.0);
        assert_eq!(motor.drain(&mut state).unwrap(), DriveCommand::default());
    }

    #[test]
    fn overflow_leaves_state_untouched() {
        let graph = graph();
        let motor = MotorAccumulator::new(&graph);
        let mut state = SignalState::zeroed(graph.len());
        state
            .accumulate(graph.id("L1").unwrap(), i32::MAX, &graph)
            .unwrap();
        state.set_next(graph.id("L2").unwrap(), i64::MAX);

        let before = state.clone();
        assert!(matches!(
            motor.drain(&mut state),
            Err(RuntimeError::Overflow(_))
        ));
        assert_eq!(state, before);
    }
}
