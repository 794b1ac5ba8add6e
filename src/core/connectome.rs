use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::Path;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::WormConfig;
use crate::error::ConfigError;

/// Bundled connectivity table: one `<source> <dest> <weight>` edge per line.
pub const BUNDLED_EDGES: &str = include_str!("../../data/connectome.txt");

/// Bundled identifier list: every neuron and muscle, one per line.
pub const BUNDLED_NEURONS: &str = include_str!("../../data/neurons.txt");

/// Dense neuron/muscle identifier.
///
/// Ids are assigned in sorted name order when the graph is built, so
/// iterating ids in ascending order visits names in sorted order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NeuronId(u32);

impl NeuronId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NeuronId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MuscleSide {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeuronKind {
    /// Accumulates and fires.
    Signal,
    /// Accumulates, never fires.
    Sink,
    /// Accumulates, never fires, drained every step.
    Muscle(MuscleSide),
}

/// One weighted synapse, by name. Negative weights are inhibitory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub source: String,
    pub target: String,
    pub weight: i32,
}

impl Edge {
    pub fn new(source: &str, target: &str, weight: i32) -> Self {
        Self {
            source: source.to_string(),
            target: target.to_string(),
            weight,
        }
    }
}

/// Left/right classification of body-wall muscles.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MuscleMap {
    pub left: Vec<String>,
    pub right: Vec<String>,
}

impl Default for MuscleMap {
    /// Dorsal 01-24 and ventral 01-23 muscles on each side.
    fn default() -> Self {
        Self {
            left: numbered("MDL", 24).chain(numbered("MVL", 23)).collect(),
            right: numbered("MDR", 24).chain(numbered("MVR", 23)).collect(),
        }
    }
}

fn numbered(prefix: &'static str, count: u32) -> impl Iterator<Item = String> {
    (1..=count).map(move |i| format!("{prefix}{i:02}"))
}

/// CSR (Compressed Sparse Row) edge storage.
///
/// Neuron `i` owns edges at `offsets[i]..offsets[i + 1]`, in the order they
/// appeared in the input.
#[derive(Debug, Clone)]
struct CsrConnections {
    targets: Vec<NeuronId>,
    weights: Vec<i32>,
    offsets: Vec<usize>,
}

/// The static wiring of the worm. Immutable once built.
#[derive(Debug, Clone)]
pub struct ConnectomeGraph {
    names: Vec<String>,
    index: HashMap<String, NeuronId>,
    kinds: Vec<NeuronKind>,
    connections: CsrConnections,
}

impl ConnectomeGraph {
    /// Build a graph from named edges and the declared identifier set.
    ///
    /// Every edge endpoint, muscle and non-firing sink must be declared.
    /// A muscle listed on both sides is rejected. Nothing is constructed
    /// unless every check passes.
    pub fn build(
        edges: Vec<Edge>,
        neuron_ids: BTreeSet<String>,
        muscles: &MuscleMap,
        non_firing: &[String],
    ) -> Result<Self, ConfigError> {
        if neuron_ids.len() > u32::MAX as usize {
            return Err(ConfigError::Invalid("too many neurons"));
        }

        let names: Vec<String> = neuron_ids.into_iter().collect();
        let index: HashMap<String, NeuronId> = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), NeuronId(i as u32)))
            .collect();

        let lookup = |name: &str| {
            index
                .get(name)
                .copied()
                .ok_or_else(|| ConfigError::UnknownNeuron(name.to_string()))
        };

        let mut kinds = vec![NeuronKind::Signal; names.len()];
        for name in &muscles.left {
            kinds[lookup(name)?.index()] = NeuronKind::Muscle(MuscleSide::Left);
        }
        for name in &muscles.right {
            let id = lookup(name)?;
            if kinds[id.index()] == NeuronKind::Muscle(MuscleSide::Left) {
                return Err(ConfigError::DuplicateMuscleClassification(name.clone()));
            }
            kinds[id.index()] = NeuronKind::Muscle(MuscleSide::Right);
        }
        for name in non_firing {
            let id = lookup(name)?;
            if kinds[id.index()] == NeuronKind::Signal {
                kinds[id.index()] = NeuronKind::Sink;
            }
        }

        let mut resolved = Vec::with_capacity(edges.len());
        for edge in &edges {
            let source = index
                .get(&edge.source)
                .copied()
                .ok_or_else(|| ConfigError::UnknownSource(edge.source.clone()))?;
            let target =
                index
                    .get(&edge.target)
                    .copied()
                    .ok_or_else(|| ConfigError::UnknownTarget {
                        from: edge.source.clone(),
                        target: edge.target.clone(),
                    })?;
            resolved.push((source, target, edge.weight));
        }

        // Stable counting sort by source keeps per-neuron input order.
        let mut offsets = vec![0usize; names.len() + 1];
        for &(source, _, _) in &resolved {
            offsets[source.index() + 1] += 1;
        }
        for i in 0..names.len() {
            offsets[i + 1] += offsets[i];
        }
        let mut cursor = offsets.clone();
        let mut targets = vec![NeuronId(0); resolved.len()];
        let mut weights = vec![0i32; resolved.len()];
        for (source, target, weight) in resolved {
            let slot = cursor[source.index()];
            targets[slot] = target;
            weights[slot] = weight;
            cursor[source.index()] += 1;
        }

        let graph = Self {
            names,
            index,
            kinds,
            connections: CsrConnections {
                targets,
                weights,
                offsets,
            },
        };

        tracing::info!(
            neurons = graph.len(),
            edges = graph.edge_count(),
            left_muscles = graph.muscles(MuscleSide::Left).len(),
            right_muscles = graph.muscles(MuscleSide::Right).len(),
            "connectome built"
        );

        Ok(graph)
    }

    /// Build from a neuron list and an edge list in the line formats above,
    /// classifying muscles and sinks from `cfg`.
    pub fn from_text(neurons: &str, edges: &str, cfg: &WormConfig) -> Result<Self, ConfigError> {
        let neuron_ids = parse_neuron_list(neurons)?;
        let edges = parse_edge_list(edges)?;
        Self::build(edges, neuron_ids, &cfg.muscles, &cfg.non_firing)
    }

    /// The hermaphrodite connectome shipped with the crate.
    pub fn bundled(cfg: &WormConfig) -> Result<Self, ConfigError> {
        Self::from_text(BUNDLED_NEURONS, BUNDLED_EDGES, cfg)
    }

    /// Read the neuron list and edge list from disk.
    pub fn load(
        neurons_path: impl AsRef<Path>,
        edges_path: impl AsRef<Path>,
        cfg: &WormConfig,
    ) -> crate::Result<Self> {
        let neurons = std::fs::read_to_string(neurons_path)?;
        let edges = std::fs::read_to_string(edges_path)?;
        Ok(Self::from_text(&neurons, &edges, cfg)?)
    }

    /// Number of declared identifiers (neurons and muscles).
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.connections.targets.len()
    }

    /// All ids in sorted name order.
    pub fn ids(&self) -> impl Iterator<Item = NeuronId> {
        (0..self.names.len() as u32).map(NeuronId)
    }

    pub fn id(&self, name: &str) -> Option<NeuronId> {
        self.index.get(name).copied()
    }

    pub fn name(&self, id: NeuronId) -> &str {
        &self.names[id.index()]
    }

    pub fn kind(&self, id: NeuronId) -> NeuronKind {
        self.kinds[id.index()]
    }

    pub fn is_muscle(&self, id: NeuronId) -> bool {
        matches!(self.kinds[id.index()], NeuronKind::Muscle(_))
    }

    /// Only signal neurons fire; muscles and sinks just accumulate.
    #[inline]
    pub fn can_fire(&self, id: NeuronId) -> bool {
        self.kinds[id.index()] == NeuronKind::Signal
    }

    /// Muscles on one side, in id order.
    pub fn muscles(&self, side: MuscleSide) -> Vec<NeuronId> {
        self.ids()
            .filter(|&id| self.kinds[id.index()] == NeuronKind::Muscle(side))
            .collect()
    }

    /// Outgoing `(target, weight)` pairs of `id`, in input order.
    pub fn outgoing(&self, id: NeuronId) -> impl Iterator<Item = (NeuronId, i32)> + '_ {
        let start = self.connections.offsets[id.index()];
        let end = self.connections.offsets[id.index() + 1];
        self.connections.targets[start..end]
            .iter()
            .copied()
            .zip(self.connections.weights[start..end].iter().copied())
    }
}

fn content_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
}

/// Parse `<source> <dest> <weight>` lines.
///
/// Blank lines and `#` comments are skipped. Any other line without exactly
/// three tokens, or with a non-integer weight, fails the whole load.
pub fn parse_edge_list(text: &str) -> Result<Vec<Edge>, ConfigError> {
    let mut edges = Vec::new();
    for (line_no, line) in content_lines(text) {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let [source, target, weight] = tokens.as_slice() else {
            return Err(ConfigError::MalformedLine(line_no));
        };
        let weight: i32 = weight
            .parse()
            .map_err(|_| ConfigError::MalformedLine(line_no))?;
        edges.push(Edge::new(source, target, weight));
    }
    Ok(edges)
}

/// Parse one identifier per line.
pub fn parse_neuron_list(text: &str) -> Result<BTreeSet<String>, ConfigError> {
    let mut ids = BTreeSet::new();
    for (line_no, line) in content_lines(text) {
        let mut tokens = line.split_whitespace();
        match (tokens.next(), tokens.next()) {
            (Some(name), None) => {
                ids.insert(name.to_string());
            }
            _ => return Err(ConfigError::MalformedLine(line_no)),
        }
    }
    Ok(ids)
}
