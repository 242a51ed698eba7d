//! Cartesian Genetic Programming.
//!
//! - **Function sets** (`functions`): symbolic regression and 8-bit image filters
//! - **Genotype** (`genotype`): grid layout, mutation, active-node marking
//! - **Evaluation** (`eval`): scalar and lane-batched circuit evaluation with
//!   in-place curing of numerically failing nodes
//! - **Operations** (`ops`): [`GenomeOps`](crate::compute::evolution::GenomeOps)
//!   implementation driving a CGP population

mod eval;
mod functions;
mod genotype;
mod ops;

pub use eval::{LaneStep, NodeOutput, Step, Workspace};
pub use functions::{
    FilterOp, FunctionSet, INFINITY_SENTINEL, MAX_LANES, NAN_SENTINEL, PixelFilter, Symbolic,
    SymbolicOp,
};
pub use genotype::{CgpGenome, CgpLayout, CgpShape, GENES_PER_NODE, NODE_INPUTS, Node};
pub use ops::{CgpContext, CgpOps};
