//! Compute module - evolutionary engine, CGP and coevolution.

pub mod baldwin;
pub mod cgp;
pub mod coevolution;
pub mod evolution;
pub mod fitness;
pub mod predictor;

pub use coevolution::{Coevolution, RunError, RunSummary};
pub use evolution::{Archive, Direction, Fitness, GenomeOps, Individual, Population};
pub use fitness::{Dataset, FilterDataset, SymbolicDataset};
