//! Generic evolutionary engine.
//!
//! The engine is parametrized over genome representations through the
//! [`GenomeOps`] capability trait:
//!
//! - **Genome contract** (`genome`): individuals, fitness caches, directions
//! - **Population** (`population`): generation advance with parallel evaluation
//! - **Archive** (`archive`): bounded ring of best-known individuals
//! - **Ring index** (`ring`): recency-ordered index translation shared by
//!   archives and the Baldwin history
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use coco::compute::cgp::{CgpLayout, CgpOps, CgpShape, Symbolic};
//! use coco::compute::evolution::{Direction, Population};
//! use coco::compute::fitness::{EvalMode, SymbolicDataset};
//!
//! let dataset = Arc::new(SymbolicDataset::from_fn(1, 20, 0.01, |x| x[0] * x[0]));
//! let shape = CgpShape::new(1, 1, 8, 4, 8);
//! let layout = CgpLayout::<Symbolic>::new(shape, None).unwrap();
//! let ops = CgpOps::new(layout, 5, dataset, EvalMode::Scalar);
//! let context = ops.full_context();
//!
//! let mut population = Population::new(8, Direction::Maximize, ops, 1).unwrap();
//! for _ in 0..100 {
//!     population.advance_generation(&context);
//! }
//! println!("best: {}", population.best_fitness());
//! ```

mod archive;
mod genome;
mod population;
mod ring;

pub use archive::Archive;
pub use genome::{Direction, Fitness, FitnessCache, GenomeError, GenomeOps, Individual, Parents};
pub use population::Population;
pub use ring::RingIndex;
