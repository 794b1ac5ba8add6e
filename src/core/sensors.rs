use std::collections::HashMap;

use crate::config::SensorGroupConfig;
use crate::connectome::{ConnectomeGraph, NeuronId};
use crate::engine::PropagationEngine;
use crate::error::ConfigError;

pub const FOOD: &str = "food";
pub const NOSE_TOUCH: &str = "nose-touch";
pub const ANTERIOR_HARSH_TOUCH: &str = "anterior-harsh-touch";

#[derive(Debug, Clone)]
struct NamedGroup {
    name: String,
    neurons: Vec<NeuronId>,
}

/// Named stimuli resolved to neuron ids.
///
/// Triggering a group injects each member neuron's outgoing edges into the
/// engine's `next` buffer, in group order.
#[derive(Debug, Clone, Default)]
pub struct SensorInterface {
    groups: Vec<NamedGroup>,
    group_index: HashMap<String, usize>,
}

impl SensorInterface {
    pub fn new(graph: &ConnectomeGraph, groups: &[SensorGroupConfig]) -> Result<Self, ConfigError> {
        let mut sensors = Self::default();
        for group in groups {
            let names: Vec<&str> = group.neurons.iter().map(String::as_str).collect();
            sensors.define_group(graph, &group.name, &names)?;
        }
        Ok(sensors)
    }

    pub fn define_group(
        &mut self,
        graph: &ConnectomeGraph,
        name: &str,
        neurons: &[&str],
    ) -> Result<(), ConfigError> {
        if self.group_index.contains_key(name) {
            return Err(ConfigError::DuplicateSensorGroup(name.to_string()));
        }
        let neurons = neurons
            .iter()
            .map(|&n| {
                graph
                    .id(n)
                    .ok_or_else(|| ConfigError::UnknownNeuron(n.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.group_index.insert(name.to_string(), self.groups.len());
        self.groups.push(NamedGroup {
            name: name.to_string(),
            neurons,
        });
        Ok(())
    }

    pub fn has_group(&self, name: &str) -> bool {
        self.group_index.contains_key(name)
    }

    pub fn group(&self, name: &str) -> Result<&[NeuronId], ConfigError> {
        self.group_index
            .get(name)
            .map(|&i| self.groups[i].neurons.as_slice())
            .ok_or_else(|| ConfigError::UnknownSensorGroup(name.to_string()))
    }

    /// Group names in definition order.
    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|g| g.name.as_str())
    }

    /// Stimulate every neuron of `name`. An unknown name changes nothing.
    pub fn trigger(&self, name: &str, engine: &mut PropagationEngine) -> crate::Result<()> {
        let neurons = self.group(name)?;
        tracing::debug!(group = name, neurons = neurons.len(), "sensor triggered");
        engine.inject(neurons)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WormConfig;
    use crate::connectome::{Edge, MuscleMap};
    use std::collections::BTreeSet;
    use std::sync::Arc;

    fn graph() -> Arc<ConnectomeGraph> {
        let ids: BTreeSet<String> = ["S1", "S2", "T", "U"].iter().map(|s| s.to_string()).collect();
        Arc::new(
            ConnectomeGraph::build(
                vec![
                    Edge::new("S1", "T", 3),
                    Edge::new("S2", "T", 4),
                    Edge::new("S2", "U", -1),
                ],
                ids,
                &MuscleMap {
                    left: vec![],
                    right: vec![],
                },
                &[],
            )
            .unwrap(),
        )
    }

    #[test]
    fn trigger_injects_every_member() {
        let graph = graph();
        let sensors =
            SensorInterface::new(&graph, &[SensorGroupConfig::new("touch", &["S1", "S2"])]).unwrap();
        let mut engine = PropagationEngine::new(Arc::clone(&graph), 30).unwrap();

        sensors.trigger("touch", &mut engine).unwrap();

        let state = engine.state();
        assert_eq!(state.next(graph.id("T").unwrap()), 7);
        assert_eq!(state.next(graph.id("U").unwrap()), -1);
        // Injection never touches the published buffer or the sensors themselves.
        assert_eq!(state.current(graph.id("T").unwrap()), 0);
        assert_eq!(state.next(graph.id("S1").unwrap()), 0);
    }

    #[test]
    fn repeated_triggers_accumulate() {
        let graph = graph();
        let sensors =
            SensorInterface::new(&graph, &[SensorGroupConfig::new("touch", &["S1"])]).unwrap();
        let mut engine = PropagationEngine::new(Arc::clone(&graph), 30).unwrap();

        sensors.trigger("touch", &mut engine).unwrap();
        sensors.trigger("touch", &mut engine).unwrap();
        assert_eq!(engine.state().next(graph.id("T").unwrap()), 6);
    }

    #[test]
    fn unknown_group_is_rejected_without_effect() {
        let graph = graph();
        let sensors = SensorInterface::new(&graph, &[]).unwrap();
        let mut engine = PropagationEngine::new(Arc::clone(&graph), 30).unwrap();
        let before = engine.state().clone();

        let err = sensors.trigger("smell", &mut engine).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Config(ConfigError::UnknownSensorGroup(ref g)) if g == "smell"
        ));
        assert_eq!(engine.state(), &before);
    }

    #[test]
    fn unknown_member_neuron_is_rejected() {
        let graph = graph();
        let err = SensorInterface::new(&graph, &[SensorGroupConfig::new("touch", &["S1", "NOPE"])])
            .unwrap_err();
        assert_eq!(err, ConfigError::UnknownNeuron("NOPE".to_string()));
    }

    #[test]
    fn duplicate_group_is_rejected() {
        let graph = graph();
        let mut sensors = SensorInterface::default();
        sensors.define_group(&graph, "touch", &["S1"]).unwrap();
        assert_eq!(
            sensors.define_group(&graph, "touch", &["S2"]),
            Err(ConfigError::DuplicateSensorGroup("touch".to_string()))
        );
    }

    #[test]
    fn bundled_groups_resolve() {
        let cfg = WormConfig::default();
        let graph = ConnectomeGraph::bundled(&cfg).unwrap();
        let sensors = SensorInterface::new(&graph, &cfg.sensors).unwrap();

        let names: Vec<&str> = sensors.group_names().collect();
        assert_eq!(names, vec![FOOD, NOSE_TOUCH, ANTERIOR_HARSH_TOUCH]);
        assert_eq!(sensors.group(FOOD).unwrap().len(), 8);
        assert_eq!(sensors.group(NOSE_TOUCH).unwrap().len(), 10);
        assert_eq!(sensors.group(ANTERIOR_HARSH_TOUCH).unwrap().len(), 5);
    }
}
