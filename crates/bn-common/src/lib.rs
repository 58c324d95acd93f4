//! Bayes-net common types, IDs, and errors.
//!
//! This crate provides foundational types shared across bn-core modules:
//! - Node identity and family keys
//! - The missing-value sentinel used by discrete data
//! - Common error types
//! - Schema versioning for serialized documents

pub mod error;
pub mod id;
pub mod schema;

pub use error::{Error, Result};
pub use id::{FamilyKey, NodeId, MISSING_VALUE};
pub use schema::SCHEMA_VERSION;
