//! Coevolution of CGP circuits and fitness predictors.
//!
//! [`Coevolution`] drives the champion population on the calling thread and
//! the predictor population on a scoped worker thread. See the orchestrator
//! module docs for the shared regions and how they invalidate each other.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use coco::compute::coevolution::Coevolution;
//! use coco::compute::fitness::SymbolicDataset;
//! use coco::schema::{Algorithm, RunConfig};
//!
//! let dataset = Arc::new(SymbolicDataset::from_fn(1, 50, 0.01, |x| x[0] * x[0] - x[0]));
//! let config = RunConfig {
//!     algorithm: Algorithm::Baldwin,
//!     max_generations: 5_000,
//!     target_fitness: Some(100.0),
//!     ..RunConfig::default()
//! };
//!
//! let mut run = Coevolution::new(config, dataset).unwrap();
//! let summary = run.run().unwrap();
//! println!("{} after {} generations", summary.stop_reason, summary.generations);
//! ```

mod journal;
mod orchestrator;

pub use journal::{HistoryJournal, PredictorJournal};
pub use orchestrator::{Coevolution, RunError, RunSummary};
