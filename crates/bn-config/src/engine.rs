//! Engine configuration types.
//!
//! Every section has serde defaults, so an empty JSON object is a valid
//! configuration.

use serde::{Deserialize, Serialize};

use crate::validate::ValidationError;

/// Largest conditional probability table (in rows) a model may allocate.
pub const MAX_CPT_ROWS: usize = 1_000_000;

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,

    #[serde(default)]
    pub categories: CategoryBounds,

    #[serde(default)]
    pub random: RandomConfig,

    #[serde(default)]
    pub scoring: ScoringConfig,

    #[serde(default)]
    pub inference: InferenceConfig,
}

fn default_schema_version() -> String {
    crate::CONFIG_SCHEMA_VERSION.to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            categories: CategoryBounds::default(),
            random: RandomConfig::default(),
            scoring: ScoringConfig::default(),
            inference: InferenceConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load a configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ValidationError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ValidationError::IoError(format!("Failed to read {}: {}", path.display(), e))
        })?;

        Self::parse_json(&content)
    }

    /// Parse and validate a configuration from a JSON string.
    pub fn parse_json(json: &str) -> Result<Self, ValidationError> {
        let config: EngineConfig = serde_json::from_str(json)
            .map_err(|e| ValidationError::ParseError(format!("Invalid JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Semantic validation of every section.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !bn_common::schema::is_compatible(&self.schema_version) {
            return Err(ValidationError::UnsupportedSchema(
                self.schema_version.clone(),
            ));
        }
        self.categories.validate()?;
        self.inference.validate()?;
        Ok(())
    }
}

/// Inclusive range from which category counts are drawn for untyped nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryBounds {
    pub low: usize,
    pub high: usize,
}

impl CategoryBounds {
    pub fn new(low: usize, high: usize) -> Self {
        Self { low, high }
    }

    /// Every node gets exactly `n` categories.
    pub fn fixed(n: usize) -> Self {
        Self { low: n, high: n }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.low < 2 {
            return Err(ValidationError::invalid(
                "categories.low",
                format!("lower bound must be at least 2, got {}", self.low),
            ));
        }
        if self.high < self.low {
            return Err(ValidationError::invalid(
                "categories.high",
                format!(
                    "upper bound {} is below lower bound {}",
                    self.high, self.low
                ),
            ));
        }
        Ok(())
    }
}

impl Default for CategoryBounds {
    fn default() -> Self {
        Self { low: 2, high: 4 }
    }
}

/// Random source settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomConfig {
    /// Fixed seed for reproducible runs; `None` seeds from the OS.
    #[serde(default)]
    pub seed: Option<u64>,
}

/// What to do when a log-gamma term cannot be evaluated while scoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LnGammaPolicy {
    /// Count the term as zero, log a warning, keep scoring.
    #[default]
    ZeroContribution,
    /// Fail the score call.
    Propagate,
}

/// Structure-score settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default)]
    pub lngamma_policy: LnGammaPolicy,
}

/// Exact-inference limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Upper bound on the number of joint states enumerated per update.
    #[serde(default = "default_max_joint_states")]
    pub max_joint_states: u64,
}

fn default_max_joint_states() -> u64 {
    1 << 24
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            max_joint_states: default_max_joint_states(),
        }
    }
}

impl InferenceConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_joint_states == 0 {
            return Err(ValidationError::invalid(
                "inference.max_joint_states",
                "must be positive",
            ));
        }
        Ok(())
    }
}
