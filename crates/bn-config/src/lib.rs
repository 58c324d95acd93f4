//! Bayes-net engine configuration loading and validation.
//!
//! This crate provides:
//! - Typed Rust structs for the engine config file
//! - Semantic validation of category bounds and inference limits
//! - Config resolution (CLI → env → defaults)

pub mod engine;
pub mod resolve;
pub mod validate;

pub use engine::{
    CategoryBounds, EngineConfig, InferenceConfig, LnGammaPolicy, RandomConfig, ScoringConfig,
};
pub use resolve::{resolve_config, ConfigSource, CONFIG_ENV_VAR};
pub use validate::ValidationError;

/// Schema version for configuration files.
pub const CONFIG_SCHEMA_VERSION: &str = bn_common::SCHEMA_VERSION;
