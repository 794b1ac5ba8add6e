use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::connectome::{ConnectomeGraph, NeuronId};
use crate::error::{ConfigError, RuntimeError};
use crate::motor::{DriveCommand, MotorAccumulator};

/// Where the engine is within a timestep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum EnginePhase {
    /// Buffers consistent; `current` is the result of the last swap.
    #[default]
    Idle,
    /// Over-threshold neurons are being fired into `next`.
    Firing,
    /// Muscles have been drained out of `next`; waiting for commit.
    Drained,
}

/// Double-buffered accumulated potential for every neuron and muscle.
///
/// Firing reads `current` and writes `next`. Publishing copies `next` into
/// `current`; `next` keeps its values so potential persists until a neuron
/// fires or a muscle is drained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalState {
    current: Vec<i64>,
    next: Vec<i64>,
}

impl SignalState {
    pub fn zeroed(len: usize) -> Self {
        Self {
            current: vec![0; len],
            next: vec![0; len],
        }
    }

    #[inline]
    pub fn current(&self, id: NeuronId) -> i64 {
        self.current[id.index()]
    }

    #[inline]
    pub fn next(&self, id: NeuronId) -> i64 {
        self.next[id.index()]
    }

    /// `current`, indexed by `NeuronId::index`.
    pub fn current_values(&self) -> &[i64] {
        &self.current
    }

    /// `next`, indexed by `NeuronId::index`.
    pub fn next_values(&self) -> &[i64] {
        &self.next
    }

    /// `next[target] += weight`, failing instead of wrapping.
    pub fn accumulate(
        &mut self,
        target: NeuronId,
        weight: i32,
        graph: &ConnectomeGraph,
    ) -> Result<(), RuntimeError> {
        let slot = &mut self.next[target.index()];
        *slot = slot
            .checked_add(i64::from(weight))
            .ok_or_else(|| RuntimeError::Overflow(graph.name(target).to_string()))?;
        Ok(())
    }

    /// Read and zero one `next` entry.
    pub fn take_next(&mut self, id: NeuronId) -> i64 {
        std::mem::take(&mut self.next[id.index()])
    }

    pub(crate) fn set_next(&mut self, id: NeuronId, value: i64) {
        self.next[id.index()] = value;
    }

    /// `current := next`, as a copy.
    fn publish(&mut self) {
        self.current.clone_from(&self.next);
    }
}

/// A fully computed but uncommitted timestep.
///
/// Dropping it (or calling [`PropagationEngine::abort`]) discards the step;
/// the engine's published state is untouched until
/// [`PropagationEngine::commit`].
#[derive(Debug, Clone)]
pub struct PendingStep {
    state: SignalState,
    drive: DriveCommand,
    fired: Vec<NeuronId>,
}

impl PendingStep {
    pub fn drive(&self) -> DriveCommand {
        self.drive
    }

    /// Neurons fired this step, in id order.
    pub fn fired(&self) -> &[NeuronId] {
        &self.fired
    }

    pub fn state(&self) -> &SignalState {
        &self.state
    }
}

/// Threshold-fire propagation over a static connectome.
#[derive(Debug, Clone)]
pub struct PropagationEngine {
    graph: Arc<ConnectomeGraph>,
    threshold: i64,
    state: SignalState,
    motor: MotorAccumulator,
    phase: EnginePhase,

    fired_last_step: Vec<NeuronId>,
    age_steps: u64,
}

impl PropagationEngine {
    /// Zero-filled engine. A negative `threshold` is rejected.
    pub fn new(graph: Arc<ConnectomeGraph>, threshold: i64) -> Result<Self, ConfigError> {
        if threshold < 0 {
            return Err(ConfigError::Invalid("threshold must be >= 0"));
        }
        let state = SignalState::zeroed(graph.len());
        let motor = MotorAccumulator::new(&graph);
        Ok(Self {
            graph,
            threshold,
            state,
            motor,
            phase: EnginePhase::Idle,
            fired_last_step: Vec::new(),
            age_steps: 0,
        })
    }

    pub fn graph(&self) -> &Arc<ConnectomeGraph> {
        &self.graph
    }

    pub fn threshold(&self) -> i64 {
        self.threshold
    }

    pub fn state(&self) -> &SignalState {
        &self.state
    }

    pub fn motor(&self) -> &MotorAccumulator {
        &self.motor
    }

    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    pub fn age_steps(&self) -> u64 {
        self.age_steps
    }

    pub fn fired_last_step(&self) -> &[NeuronId] {
        &self.fired_last_step
    }

    /// Apply each neuron's outgoing edges to `next`, in order.
    ///
    /// This is the dendrite-accumulate primitive used by sensors: it neither
    /// reads nor resets the injected neurons' own potential. The whole batch
    /// is applied or, on overflow or an id from another graph, none of it.
    pub fn inject(&mut self, neurons: &[NeuronId]) -> Result<(), RuntimeError> {
        if let Some(&foreign) = neurons.iter().find(|id| id.index() >= self.graph.len()) {
            return Err(RuntimeError::UnknownId(foreign.to_string()));
        }
        let mut work = self.state.clone();
        for &id in neurons {
            tracing::trace!(neuron = self.graph.name(id), "inject");
            for (target, weight) in self.graph.outgoing(id) {
                work.accumulate(target, weight, &self.graph)?;
            }
        }
        self.state = work;
        Ok(())
    }

    fn should_fire(&self, id: NeuronId) -> bool {
        self.graph.can_fire(id) && self.state.current(id).unsigned_abs() > self.threshold as u64
    }

    /// Compute one timestep without publishing it.
    ///
    /// Every firing neuron is chosen from `current` up front. Then, in id
    /// order, each one's edges are summed into `next` and its own `next` entry
    /// is reset to zero. A fired neuron therefore ends the step holding only
    /// what higher-id neurons firing after it sent; its self-loops never
    /// survive. Muscles are then drained and `current := next` is computed on
    /// the pending copy.
    pub fn prepare(&mut self) -> Result<PendingStep, RuntimeError> {
        self.phase = EnginePhase::Firing;

        let mut work = self.state.clone();
        let fired: Vec<NeuronId> = self.graph.ids().filter(|&id| self.should_fire(id)).collect();

        if let Err(e) = self.fire_into(&mut work, &fired) {
            self.phase = EnginePhase::Idle;
            tracing::warn!(error = %e, step = self.age_steps, "step aborted while firing");
            return Err(e);
        }

        let drive = match self.motor.drain(&mut work) {
            Ok(drive) => drive,
            Err(e) => {
                self.phase = EnginePhase::Idle;
                tracing::warn!(error = %e, step = self.age_steps, "step aborted while draining");
                return Err(e);
            }
        };
        self.phase = EnginePhase::Drained;

        work.publish();

        Ok(PendingStep {
            state: work,
            drive,
            fired,
        })
    }

    fn fire_into(&self, work: &mut SignalState, fired: &[NeuronId]) -> Result<(), RuntimeError> {
        for &id in fired {
            for (target, weight) in self.graph.outgoing(id) {
                work.accumulate(target, weight, &self.graph)?;
            }
            // Spent: anything that reached this neuron before it fired is gone.
            work.take_next(id);
        }
        Ok(())
    }

    /// Publish a pending step. Returns the engine to `Idle`.
    pub fn commit(&mut self, pending: PendingStep) {
        tracing::debug!(
            step = self.age_steps,
            fired = pending.fired.len(),
            left = pending.drive.left,
            right = pending.drive.right,
            "step committed"
        );
        self.state = pending.state;
        self.fired_last_step = pending.fired;
        self.age_steps = self.age_steps.wrapping_add(1);
        self.phase = EnginePhase::Idle;
    }

    /// Put back a state saved with `state().clone()`, undoing injections
    /// made since.
    pub(crate) fn restore(&mut self, state: SignalState) {
        self.state = state;
        self.phase = EnginePhase::Idle;
    }

    /// Discard a pending step; the published state is unchanged.
    pub fn abort(&mut self) {
        self.phase = EnginePhase::Idle;
    }

    /// Fire, drain and publish in one call.
    pub fn step(&mut self) -> Result<DriveCommand, RuntimeError> {
        let pending = self.prepare()?;
        let drive = pending.drive;
        self.commit(pending);
        Ok(drive)
    }

    /// The `n` neurons with the largest `|current|`, ties broken by id.
    pub fn most_active(&self, n: usize) -> Vec<(NeuronId, i64)> {
        let mut active: Vec<(NeuronId, i64)> = self
            .graph
            .ids()
            .map(|id| (id, self.state.current(id)))
            .filter(|&(_, v)| v != 0)
            .collect();
        active.sort_by(|a, b| b.1.unsigned_abs().cmp(&a.1.unsigned_abs()).then(a.0.cmp(&b.0)));
        active.truncate(n);
        active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectome::{Edge, MuscleMap};
    use std::collections::BTreeSet;

    fn build(names: &[&str], edges: Vec<Edge>, left: &[&str], right: &[&str]) -> Arc<ConnectomeGraph> {
        let ids: BTreeSet<String> = names.iter().map(|s| s.to_string()).collect();
        let muscles = MuscleMap {
            left: left.iter().map(|s| s.to_string()).collect(),
            right: right.iter().map(|s| s.to_string()).collect(),
        };
        Arc::new(
            ConnectomeGraph::build(edges, ids, &muscles, &["MVULVA".to_string()])
                .expect("valid test graph"),
        )
    }

    fn id(engine: &PropagationEngine, name: &str) -> NeuronId {
        engine.graph().id(name).unwrap()
    }

    /// Put `value` in both buffers, as if it had been published last step.
    fn charge(engine: &mut PropagationEngine, name: &str, value: i64) {
        let n = id(engine, name);
        engine.state.set_next(n, value);
        engine.state.publish();
    }

    #[test]
    fn contributions_into_one_target_are_summed() {
        let graph = build(
            &["A", "B", "T", "MVULVA"],
            vec![Edge::new("A", "T", 3), Edge::new("B", "T", 4)],
            &[],
            &[],
        );
        let mut engine = PropagationEngine::new(graph, 1).unwrap();
        charge(&mut engine, "A", 5);
        charge(&mut engine, "B", 5);
        charge(&mut engine, "T", 1);

        engine.step().unwrap();

        let t = id(&engine, "T");
        // T was at 1 (not over threshold 1), so it keeps that and gains 3 + 4.
        assert_eq!(engine.state().next(t), 8);
        assert_eq!(engine.state().current(t), 8);
    }

    #[test]
    fn duplicate_edges_are_summed() {
        let graph = build(
            &["A", "T", "MVULVA"],
            vec![Edge::new("A", "T", 2), Edge::new("A", "T", 2)],
            &[],
            &[],
        );
        let mut engine = PropagationEngine::new(graph, 0).unwrap();
        charge(&mut engine, "A", 1);
        engine.step().unwrap();
        assert_eq!(engine.state().current(id(&engine, "T")), 4);
    }

    #[test]
    fn fired_neuron_self_loop_is_wiped_by_its_reset() {
        let graph = build(
            &["A", "T", "MVULVA"],
            vec![Edge::new("A", "A", 9), Edge::new("A", "T", 1)],
            &[],
            &[],
        );
        let mut engine = PropagationEngine::new(graph, 2).unwrap();
        charge(&mut engine, "A", 10);

        let pending = engine.prepare().unwrap();
        let a = id(&engine, "A");
        assert_eq!(pending.fired(), &[a]);
        assert_eq!(pending.state().next(a), 0);
        engine.commit(pending);

        // Nothing feeds A any more, so it stays quiet.
        let drive = engine.step().unwrap();
        assert_eq!(drive, DriveCommand::default());
        assert!(engine.fired_last_step().is_empty());
        assert_eq!(engine.state().current(a), 0);
    }

    #[test]
    fn fired_neurons_reset_after_their_own_edges_in_id_order() {
        // A fires first and sends 1 to B; B then fires, sends 6 to A and is
        // reset. Only the later firer's contribution survives.
        let graph = build(
            &["A", "B", "MVULVA"],
            vec![Edge::new("A", "B", 1), Edge::new("B", "A", 6)],
            &[],
            &[],
        );
        let mut engine = PropagationEngine::new(graph, 2).unwrap();
        charge(&mut engine, "A", 3);
        charge(&mut engine, "B", 3);

        engine.step().unwrap();

        let (a, b) = (id(&engine, "A"), id(&engine, "B"));
        assert_eq!(engine.fired_last_step(), &[a, b]);
        assert_eq!(engine.state().next(a), 6);
        assert_eq!(engine.state().next(b), 0);
        assert_eq!(engine.state().current(b), 0);
    }

    #[test]
    fn injected_input_to_a_firing_neuron_is_spent() {
        let graph = build(
            &["A", "S", "T", "MVULVA"],
            vec![Edge::new("S", "A", 50), Edge::new("A", "T", 1)],
            &[],
            &[],
        );
        let mut engine = PropagationEngine::new(graph, 2).unwrap();
        charge(&mut engine, "A", 3);
        let s = id(&engine, "S");

        engine.inject(&[s]).unwrap();
        engine.step().unwrap();

        assert_eq!(engine.state().current(id(&engine, "A")), 0);
        assert_eq!(engine.state().current(id(&engine, "T")), 1);
    }

    #[test]
    fn threshold_uses_absolute_value() {
        let graph = build(&["I", "T", "MVULVA"], vec![Edge::new("I", "T", -5)], &[], &[]);
        let mut engine = PropagationEngine::new(graph, 30).unwrap();
        charge(&mut engine, "I", -31);

        engine.step().unwrap();

        assert_eq!(engine.fired_last_step(), &[id(&engine, "I")]);
        assert_eq!(engine.state().current(id(&engine, "T")), -5);
    }

    #[test]
    fn potential_at_threshold_does_not_fire() {
        let graph = build(&["A", "T", "MVULVA"], vec![Edge::new("A", "T", 1)], &[], &[]);
        let mut engine = PropagationEngine::new(graph, 30).unwrap();
        charge(&mut engine, "A", 30);

        engine.step().unwrap();

        assert!(engine.fired_last_step().is_empty());
        // Unfired potential persists across steps.
        assert_eq!(engine.state().current(id(&engine, "A")), 30);
    }

    #[test]
    fn sink_never_fires() {
        let graph = build(&["MVULVA", "T"], vec![Edge::new("MVULVA", "T", 1)], &[], &[]);
        let mut engine = PropagationEngine::new(graph, 0).unwrap();
        charge(&mut engine, "MVULVA", 1000);

        engine.step().unwrap();

        assert!(engine.fired_last_step().is_empty());
        assert_eq!(engine.state().current(id(&engine, "MVULVA")), 1000);
        assert_eq!(engine.state().current(id(&engine, "T")), 0);
    }

    #[test]
    fn muscles_are_drained_and_never_fire() {
        let graph = build(
            &["A", "ML", "MR", "MVULVA"],
            vec![
                Edge::new("A", "ML", 40),
                Edge::new("A", "MR", 10),
                Edge::new("ML", "MR", 99),
            ],
            &["ML"],
            &["MR"],
        );
        let mut engine = PropagationEngine::new(graph, 5).unwrap();
        charge(&mut engine, "A", 6);

        let drive = engine.step().unwrap();
        assert_eq!(drive, DriveCommand::new(40.0, 10.0));
        assert_eq!(engine.state().current(id(&engine, "ML")), 0);
        assert_eq!(engine.state().current(id(&engine, "MR")), 0);

        let drive = engine.step().unwrap();
        assert_eq!(drive, DriveCommand::default());
    }

    #[test]
    fn inject_applies_edges_without_touching_own_potential() {
        let graph = build(&["S", "T", "MVULVA"], vec![Edge::new("S", "T", 2)], &[], &[]);
        let mut engine = PropagationEngine::new(graph, 30).unwrap();
        charge(&mut engine, "S", 7);
        let s = id(&engine, "S");
        let t = id(&engine, "T");

        engine.inject(&[s, s]).unwrap();

        assert_eq!(engine.state().next(t), 4);
        assert_eq!(engine.state().next(s), 7);
        // Injection lands in `next`; `current` only changes on step.
        assert_eq!(engine.state().current(t), 0);
    }

    #[test]
    fn published_current_is_a_copy_of_next() {
        let graph = build(&["A", "T", "MVULVA"], vec![Edge::new("A", "T", 3)], &[], &[]);
        let mut engine = PropagationEngine::new(graph, 30).unwrap();
        let a = id(&engine, "A");
        let t = id(&engine, "T");

        engine.inject(&[a]).unwrap();
        engine.step().unwrap();
        assert_eq!(engine.state().current(t), 3);

        engine.inject(&[a]).unwrap();
        assert_eq!(engine.state().next(t), 6);
        assert_eq!(engine.state().current(t), 3);
    }

    #[test]
    fn overflow_aborts_without_publishing() {
        let graph = build(&["A", "T", "MVULVA"], vec![Edge::new("A", "T", 1)], &[], &[]);
        let mut engine = PropagationEngine::new(graph, 0).unwrap();
        charge(&mut engine, "A", 5);
        let t = id(&engine, "T");
        engine.state.set_next(t, i64::MAX);

        let before = engine.state().clone();
        let err = engine.step().unwrap_err();

        assert_eq!(err, RuntimeError::Overflow("T".to_string()));
        assert_eq!(engine.state(), &before);
        assert_eq!(engine.phase(), EnginePhase::Idle);
        assert_eq!(engine.age_steps(), 0);
    }

    #[test]
    fn abort_discards_pending_step() {
        let graph = build(&["A", "T", "MVULVA"], vec![Edge::new("A", "T", 1)], &[], &[]);
        let mut engine = PropagationEngine::new(graph, 0).unwrap();
        charge(&mut engine, "A", 5);
        let before = engine.state().clone();

        let pending = engine.prepare().unwrap();
        assert_eq!(engine.phase(), EnginePhase::Drained);
        drop(pending);
        engine.abort();

        assert_eq!(engine.phase(), EnginePhase::Idle);
        assert_eq!(engine.state(), &before);
    }

    #[test]
    fn most_active_orders_by_magnitude() {
        let graph = build(&["A", "B", "C", "MVULVA"], vec![], &[], &[]);
        let mut engine = PropagationEngine::new(graph, 100).unwrap();
        charge(&mut engine, "A", 3);
        charge(&mut engine, "B", -9);

        let top = engine.most_active(5);
        assert_eq!(top, vec![(id(&engine, "B"), -9), (id(&engine, "A"), 3)]);
    }

    #[test]
    fn negative_threshold_is_rejected() {
        let graph = build(&["A", "MVULVA"], vec![], &[], &[]);
        assert!(matches!(
            PropagationEngine::new(graph, -1),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn inject_rejects_ids_from_another_graph() {
        let small = build(&["A", "T", "MVULVA"], vec![Edge::new("A", "T", 1)], &[], &[]);
        let large = build(&["A", "B", "C", "D", "T", "MVULVA"], vec![], &[], &[]);
        let foreign = large.id("T").unwrap();
        assert!(foreign.index() >= small.len());

        let mut engine = PropagationEngine::new(small, 0).unwrap();
        let a = id(&engine, "A");
        let before = engine.state().clone();

        let err = engine.inject(&[a, foreign]).unwrap_err();
        assert_eq!(err, RuntimeError::UnknownId(foreign.to_string()));
        assert_eq!(engine.state(), &before);
    }

    #[test]
    fn restore_undoes_injection() {
        let graph = build(&["A", "T", "MVULVA"], vec![Edge::new("A", "T", 4)], &[], &[]);
        let mut engine = PropagationEngine::new(graph, 30).unwrap();
        let saved = engine.state().clone();

        engine.inject(&[id(&engine, "A")]).unwrap();
        assert_eq!(engine.state().next(id(&engine, "T")), 4);

        engine.restore(saved.clone());
        assert_eq!(engine.state(), &saved);
    }
}
