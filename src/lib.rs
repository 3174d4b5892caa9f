// === Public Modules (The Canonical Paths) ===
pub mod config;
pub mod coordinator;
pub mod error;
pub mod evaluator;
pub mod generator;
pub mod model;
pub mod opportunity;
pub mod optimiser;
pub mod plan;
pub mod resilience;
pub mod rpc;
pub mod safety;
pub mod stats;

// === Private Implementation Details ===
mod macros;

// === Facades (Re-exporting internals) ===
pub use crate::error::{PlannerError, PlannerResult};

pub mod sorted_vec_map;
