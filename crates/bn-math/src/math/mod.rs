//! Core math modules.

pub mod dirichlet;
pub mod gamma;
pub mod simplex;
