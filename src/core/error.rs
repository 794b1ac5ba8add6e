//! Error types for the simulation.
//!
//! Construction problems surface as [`ConfigError`] before any step runs.
//! A step that produces an overflow or a non-finite pose fails with
//! [`RuntimeError`] and commits nothing.

use thiserror::Error;

/// Construction-time error. Always fatal, never retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A connectivity or neuron-list line could not be parsed (1-based line number).
    #[error("malformed line {0}")]
    MalformedLine(usize),

    #[error("edge {from} -> {target} targets an undeclared neuron")]
    UnknownTarget { from: String, target: String },

    #[error("edge source {0} is not a declared neuron")]
    UnknownSource(String),

    /// A muscle, sink or sensor entry names an undeclared neuron.
    #[error("unknown neuron {0}")]
    UnknownNeuron(String),

    #[error("muscle {0} is classified as both left and right")]
    DuplicateMuscleClassification(String),

    #[error("unknown sensor group {0}")]
    UnknownSensorGroup(String),

    #[error("duplicate sensor group {0}")]
    DuplicateSensorGroup(String),

    /// A normalization domain bound is zero (or not finite).
    #[error("degenerate normalization: {0}")]
    DegenerateNormalization(&'static str),

    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

/// Mid-step numeric failure. The step is aborted and nothing is committed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("signal overflow at {0}")]
    Overflow(String),

    #[error("non-finite value in {0}")]
    NonFinite(&'static str),

    /// A `NeuronId` that does not belong to this engine's graph.
    #[error("neuron id {0} is not in this connectome")]
    UnknownId(String),
}

/// Top-level error for loading and running a simulation.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
