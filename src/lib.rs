//! coco - Cartesian Genetic Programming with coevolved fitness predictors.
//!
//! Candidate circuits (symbolic expressions or 3x3 image filters) evolve in
//! an elitist (1+λ) CGP population. A second population evolves fitness
//! predictors: small subsets of the fitness cases that rank circuits almost
//! as well as the full set at a fraction of the cost. An optional Baldwin
//! controller grows or shrinks predictors according to observed progress.
//!
//! # Architecture
//!
//! - `schema`: Run configuration and reporting types
//! - `compute`: Generic evolutionary engine, CGP, predictors, Baldwin
//!   controller and the coevolution orchestrator
//! - `vault`: Text checkpoints of champions and populations
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use coco::{Coevolution, RunConfig, SymbolicDataset};
//!
//! let dataset = Arc::new(SymbolicDataset::from_fn(2, 64, 0.01, |x| x[0] * x[1] + x[0]));
//! let mut run = Coevolution::new(RunConfig::default(), dataset).unwrap();
//!
//! let summary = run.run_with_callback(|progress| {
//!     if progress.improved {
//!         println!("{}: {:.2}", progress.generation, progress.best_real_fitness);
//!     }
//! }).unwrap();
//! println!("Best fitness {:.2} ({})", summary.best_fitness, summary.stop_reason);
//! ```

pub mod compute;
pub mod schema;
pub mod vault;

// Re-export commonly used types
pub use compute::{Coevolution, FilterDataset, RunSummary, SymbolicDataset};
pub use schema::{Algorithm, RunConfig, StopReason};
