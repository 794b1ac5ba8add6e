#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[cfg(feature = "serde")]
use std::path::Path;

use crate::connectome::MuscleMap;
use crate::error::ConfigError;
use crate::kinematics::{DiffDriveConfig, SteeringConfig};
use crate::sensors::{ANTERIOR_HARSH_TOUCH, FOOD, NOSE_TOUCH};

/// A named, ordered list of input neurons that a stimulus injects into.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SensorGroupConfig {
    pub name: String,
    pub neurons: Vec<String>,
}

impl SensorGroupConfig {
    pub fn new(name: &str, neurons: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            neurons: neurons.iter().map(|n| n.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct WormConfig {
    /// A neuron fires when `|potential| > threshold`.
    pub threshold: i64,

    /// Neurons that absorb signal but never fire (the vulval sink).
    pub non_firing: Vec<String>,

    pub muscles: MuscleMap,

    // Trigger groups, in declaration order.
    pub sensors: Vec<SensorGroupConfig>,

    pub steering: SteeringConfig,
    pub differential: DiffDriveConfig,
}

impl Default for WormConfig {
    /// The hermaphrodite worm as wired by the bundled connectome:
    ///
    /// - threshold 30
    /// - 47 left and 47 right body-wall muscles
    /// - food, nose-touch and anterior-harsh-touch sensor groups
    fn default() -> Self {
        Self {
            threshold: 30,
            non_firing: vec!["MVULVA".to_string()],
            muscles: MuscleMap::default(),
            sensors: vec![
                SensorGroupConfig::new(
                    FOOD,
                    &["ADFL", "ADFR", "ASGL", "ASGR", "ASIL", "ASIR", "ASJL", "ASJR"],
                ),
                SensorGroupConfig::new(
                    NOSE_TOUCH,
                    &[
                        "FLPR", "FLPL", "ASHL", "ASHR", "IL1VL", "IL1VR", "OLQDL", "OLQDR",
                        "OLQVR", "OLQVL",
                    ],
                ),
                SensorGroupConfig::new(
                    ANTERIOR_HARSH_TOUCH,
                    &["FLPL", "FLPR", "BDUL", "BDUR", "SDQR"],
                ),
            ],
            steering: SteeringConfig::default(),
            differential: DiffDriveConfig::default(),
        }
    }
}

impl WormConfig {
    pub fn with_threshold(mut self, threshold: i64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_steering(mut self, steering: SteeringConfig) -> Self {
        self.steering = steering;
        self
    }

    pub fn with_differential(mut self, differential: DiffDriveConfig) -> Self {
        self.differential = differential;
        self
    }

    /// Add a sensor group, or replace the neuron list of an existing one.
    pub fn with_sensor_group(mut self, name: &str, neurons: &[&str]) -> Self {
        let group = SensorGroupConfig::new(name, neurons);
        match self.sensors.iter_mut().find(|g| g.name == name) {
            Some(existing) => *existing = group,
            None => self.sensors.push(group),
        }
        self
    }

    /// Validate the configuration, returning the first problem found.
    ///
    /// Identifier checks (unknown neurons, muscles on both sides) need the
    /// neuron list and happen when the graph is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threshold < 0 {
            return Err(ConfigError::Invalid("threshold must be >= 0"));
        }
        for (i, group) in self.sensors.iter().enumerate() {
            if group.name.is_empty() {
                return Err(ConfigError::Invalid("sensor group name must not be empty"));
            }
            if self.sensors[..i].iter().any(|g| g.name == group.name) {
                return Err(ConfigError::DuplicateSensorGroup(group.name.clone()));
            }
        }
        self.steering.validate()?;
        self.differential.validate()?;
        Ok(())
    }

    /// Parse a JSON config. Missing fields take their default values.
    #[cfg(feature = "serde")]
    pub fn from_json_str(json: &str) -> crate::Result<Self> {
        let cfg: Self = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    #[cfg(feature = "serde")]
    pub fn load(path: impl AsRef<Path>) -> crate::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    #[cfg(feature = "serde")]
    pub fn to_json_pretty(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
