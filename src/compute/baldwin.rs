//! Adaptive predictor length (Baldwin effect).
//!
//! The champion loop appends one [`HistoryEntry`] per improvement (and per
//! stalled interval). [`update_parameters`] classifies the latest entry and
//! rescales the predictor length: stalls, regressions and inaccurate
//! predictions grow the predictor, fast progress shrinks it.

use std::fmt;

use serde::Serialize;

use super::evolution::{Fitness, RingIndex};
use crate::schema::BaldwinConfig;

/// Entries kept in the history ring.
pub const HISTORY_LENGTH: usize = 7;

/// One sample of champion progress.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct HistoryEntry {
    pub generation: u64,
    pub delta_generation: u64,
    /// Real fitness of the champion.
    pub fitness: Fitness,
    pub delta_fitness: Fitness,
    /// Fitness of the champion under the active predictor.
    pub predicted_fitness: Fitness,
    /// Approximation error of the active predictor.
    pub active_predictor_fitness: Fitness,
    /// Fitness change per generation.
    pub velocity: f64,
    pub delta_velocity: f64,
}

/// Fixed-depth ring of progress samples.
#[derive(Debug, Clone)]
pub struct History {
    entries: [HistoryEntry; HISTORY_LENGTH],
    ring: RingIndex,
    last_change: HistoryEntry,
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

impl History {
    /// History seeded with a zero entry at generation 0.
    pub fn new() -> Self {
        Self::starting_at(0, 0.0)
    }

    /// History seeded with a flat entry, for runs that start from an
    /// already evaluated champion.
    pub fn starting_at(generation: u64, fitness: Fitness) -> Self {
        let seed = HistoryEntry {
            generation,
            fitness,
            predicted_fitness: fitness,
            ..HistoryEntry::default()
        };
        let mut ring = RingIndex::new(HISTORY_LENGTH);
        let mut entries = [HistoryEntry::default(); HISTORY_LENGTH];
        entries[ring.advance()] = seed;
        Self {
            entries,
            ring,
            last_change: seed,
        }
    }

    /// Append a sample, deriving the deltas from the previous entry.
    pub fn push(
        &mut self,
        generation: u64,
        fitness: Fitness,
        predicted_fitness: Fitness,
        active_predictor_fitness: Fitness,
    ) -> &HistoryEntry {
        let previous = *self.latest();
        let delta_generation = generation.saturating_sub(previous.generation);
        let delta_fitness = fitness - previous.fitness;
        let velocity = if delta_generation == 0 {
            0.0
        } else {
            delta_fitness / delta_generation as f64
        };

        let entry = HistoryEntry {
            generation,
            delta_generation,
            fitness,
            delta_fitness,
            predicted_fitness,
            active_predictor_fitness,
            velocity,
            delta_velocity: velocity - previous.velocity,
        };
        if delta_fitness != 0.0 {
            self.last_change = entry;
        }

        let slot = self.ring.advance();
        self.entries[slot] = entry;
        &self.entries[slot]
    }

    /// Entry by recency; 0 is the newest.
    pub fn get(&self, index: usize) -> &HistoryEntry {
        &self.entries[self.ring.physical(index)]
    }

    pub fn latest(&self) -> &HistoryEntry {
        self.get(0)
    }

    /// Most recent entry whose fitness changed.
    pub fn last_change(&self) -> &HistoryEntry {
        &self.last_change
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Entries from newest to oldest.
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        (0..self.len()).map(move |i| self.get(i))
    }
}

fn table_border(f: &mut fmt::Formatter<'_>, columns: usize) -> fmt::Result {
    write!(f, "+--------+---------++")?;
    for _ in 0..columns {
        write!(f, "---------+")?;
    }
    writeln!(f)
}

fn table_row<T: fmt::Display>(
    f: &mut fmt::Formatter<'_>,
    label: &str,
    last_change: T,
    values: impl Iterator<Item = T>,
) -> fmt::Result {
    write!(f, "| {label:>6} | {last_change:>7.3} ||")?;
    for value in values {
        write!(f, " {value:>7.3} |")?;
    }
    writeln!(f)
}

/// Box table: the last change on the left, then entries oldest to newest.
impl fmt::Display for History {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries: Vec<&HistoryEntry> = (0..self.len()).rev().map(|i| self.get(i)).collect();
        let last = &self.last_change;
        let columns = entries.len();

        table_border(f, columns)?;
        table_row(f, "G", last.generation, entries.iter().map(|e| e.generation))?;
        table_row(f, "f", last.fitness, entries.iter().map(|e| e.fitness))?;
        table_border(f, columns)?;
        table_row(f, "dG", last.delta_generation, entries.iter().map(|e| e.delta_generation))?;
        table_row(f, "df", last.delta_fitness, entries.iter().map(|e| e.delta_fitness))?;
        table_border(f, columns)?;
        table_row(f, "f/G", last.velocity, entries.iter().map(|e| e.velocity))?;
        table_row(f, "d(f/G)", last.delta_velocity, entries.iter().map(|e| e.delta_velocity))?;
        table_border(f, columns)
    }
}

/// Rule chosen by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Adjustment {
    Inaccurate,
    Stalled,
    Decreasing,
    IncreasingSlowly,
    IncreasingFast,
}

impl Adjustment {
    pub fn coefficient(self, config: &BaldwinConfig) -> f64 {
        match self {
            Adjustment::Inaccurate => config.inaccuracy_coefficient,
            Adjustment::Stalled => config.zero_coefficient,
            Adjustment::Decreasing => config.decrease_coefficient,
            Adjustment::IncreasingSlowly => config.increase_slow_coefficient,
            Adjustment::IncreasingFast => config.increase_fast_coefficient,
        }
    }
}

/// Result of one controller step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LengthUpdate {
    pub adjustment: Adjustment,
    pub coefficient: f64,
    pub old_length: usize,
    pub new_length: usize,
}

impl LengthUpdate {
    pub fn changed(&self) -> bool {
        self.old_length != self.new_length
    }
}

/// Ratio of predicted to real fitness.
pub fn inaccuracy(entry: &HistoryEntry) -> f64 {
    if entry.fitness == 0.0 {
        if entry.predicted_fitness == 0.0 { 1.0 } else { f64::INFINITY }
    } else {
        entry.predicted_fitness / entry.fitness
    }
}

/// Pick the rule for `entry`; earlier rules take priority.
pub fn classify(entry: &HistoryEntry, config: &BaldwinConfig) -> Adjustment {
    let velocity = entry.velocity;
    if inaccuracy(entry) > config.inaccuracy_tolerance {
        Adjustment::Inaccurate
    } else if velocity.abs() <= config.zero_epsilon {
        Adjustment::Stalled
    } else if velocity < 0.0 {
        Adjustment::Decreasing
    } else if velocity <= config.slow_threshold {
        Adjustment::IncreasingSlowly
    } else {
        Adjustment::IncreasingFast
    }
}

/// New predictor length for the latest history entry, within `[1, max_length]`.
pub fn update_parameters(
    history: &History,
    config: &BaldwinConfig,
    current_length: usize,
    max_length: usize,
) -> LengthUpdate {
    let adjustment = classify(history.latest(), config);
    let coefficient = adjustment.coefficient(config);
    let new_length = if (coefficient - 1.0).abs() > config.change_tolerance {
        ((current_length as f64 * coefficient).floor() as usize).clamp(1, max_length.max(1))
    } else {
        current_length
    };
    LengthUpdate {
        adjustment,
        coefficient,
        old_length: current_length,
        new_length,
    }
}
