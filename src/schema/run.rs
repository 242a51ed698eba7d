//! Progress and result types reported by a run.

use serde::{Deserialize, Serialize};

/// Per-generation progress of the champion loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunProgress {
    /// Current CGP generation.
    pub generation: u64,
    /// Generation limit.
    pub max_generations: u64,
    /// Best fitness under the active predictor (or all cases without predictors).
    pub best_fitness: f64,
    /// Real fitness of the last archived champion.
    pub best_real_fitness: f64,
    /// Used length of the active predictor.
    pub predictor_length: Option<usize>,
    /// Whether this generation produced a new champion.
    pub improved: bool,
    /// Circuit evaluations so far, one per fitness case.
    pub evaluations: u64,
}

/// Reason a run stopped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StopReason {
    /// Reached maximum generations.
    MaxGenerations,
    /// Reached target fitness.
    TargetReached,
    /// Cancellation token set from outside.
    Cancelled,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            StopReason::MaxGenerations => "maximum generations reached",
            StopReason::TargetReached => "target fitness reached",
            StopReason::Cancelled => "cancelled",
        };
        f.write_str(text)
    }
}
