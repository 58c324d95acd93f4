//! Discrete Bayesian networks: parametrization, instantiation, exact
//! belief updating and memoized BDe scoring.
//!
//! Models are built bottom-up:
//! [`Dag`] → [`BayesPm`] (categories per node) → [`BayesIm`] (one CPT per
//! node). [`Evidence`] is applied to an instantiated model through a
//! [`BayesUpdater`]; [`BdeMetricCache`] scores families against data.

pub mod cli;
pub mod data;
pub mod estimate;
pub mod evidence;
pub mod exit_codes;
pub mod graph;
pub mod im;
pub mod logging;
pub mod network;
pub mod pm;
pub mod random;
pub mod score;
pub mod updater;
pub mod variable;

pub use data::{DiscreteData, DiscreteDataSet};
pub use estimate::{em_estimate, ml_estimate};
pub use evidence::Evidence;
pub use graph::Dag;
pub use im::{BayesIm, CptTable, Initialization};
pub use network::NetworkFile;
pub use pm::BayesPm;
pub use random::{RandomSource, SeededRandom};
pub use score::{BdeMetricCache, CacheStats};
pub use updater::{BayesUpdater, InvariantUpdater, RowSummingUpdater, UpdateStats};
pub use variable::CategoricalVariable;

pub use bn_common::{Error, FamilyKey, NodeId, Result, MISSING_VALUE};
