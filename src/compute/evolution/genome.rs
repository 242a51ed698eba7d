//! Genome capability contract.
//!
//! The evolutionary engine never looks inside a genome. Everything it needs
//! (allocation, randomization, copying, offspring creation and fitness
//! computation) goes through [`GenomeOps`], implemented once per genome
//! representation.

use std::sync::Arc;

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// Fitness value.
pub type Fitness = f64;

/// Optimization direction of a population.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Minimize,
    Maximize,
}

impl Direction {
    /// Whether `what` is strictly better than `compared_to`.
    pub fn is_better(self, what: Fitness, compared_to: Fitness) -> bool {
        match self {
            Direction::Minimize => what < compared_to,
            Direction::Maximize => what > compared_to,
        }
    }

    /// Whether `what` is better than or equal to `compared_to`.
    pub fn is_better_or_same(self, what: Fitness, compared_to: Fitness) -> bool {
        match self {
            Direction::Minimize => what <= compared_to,
            Direction::Maximize => what >= compared_to,
        }
    }

    /// The worst possible fitness in this direction.
    pub fn worst(self) -> Fitness {
        match self {
            Direction::Minimize => Fitness::INFINITY,
            Direction::Maximize => Fitness::NEG_INFINITY,
        }
    }
}

/// Cached fitness of an individual.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FitnessCache {
    value: Fitness,
    valid: bool,
}

impl FitnessCache {
    /// A cache holding a valid value.
    pub fn valid(value: Fitness) -> Self {
        Self { value, valid: true }
    }

    /// Cached value, if still valid.
    pub fn get(&self) -> Option<Fitness> {
        self.valid.then_some(self.value)
    }

    /// Last computed value, valid or not.
    pub fn value(&self) -> Fitness {
        self.value
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn set(&mut self, value: Fitness) {
        self.value = value;
        self.valid = true;
    }

    pub fn invalidate(&mut self) {
        self.valid = false;
    }
}

/// A genome together with its fitness cache.
///
/// Individuals are owned by exactly one population or archive slot and are
/// overwritten in place, never shared.
#[derive(Debug, Clone, PartialEq)]
pub struct Individual<G> {
    pub genome: G,
    pub fitness: FitnessCache,
}

impl<G: Clone> Individual<G> {
    /// Wrap a genome with an invalid fitness cache.
    pub fn new(genome: G) -> Self {
        Self {
            genome,
            fitness: FitnessCache::default(),
        }
    }

    /// Deep-copy `other` into this slot, reusing allocations.
    pub fn copy_from(&mut self, other: &Individual<G>) {
        self.genome.clone_from(&other.genome);
        self.fitness = other.fitness;
    }

    pub fn invalidate(&mut self) {
        self.fitness.invalidate();
    }
}

/// Information about the current parents handed to offspring generation.
#[derive(Debug, Clone, Copy)]
pub struct Parents {
    /// Index of the current best individual.
    pub best_index: usize,
    /// Problem direction of the population.
    pub direction: Direction,
}

/// Genome allocation errors.
#[derive(Debug, thiserror::Error)]
pub enum GenomeError {
    #[error("Invalid genome shape: {0}")]
    InvalidShape(String),
    #[error("Genome allocation failed: {0}")]
    Allocation(String),
}

/// Capability table of a genome representation.
///
/// Copying a genome is `Clone` (see [`Individual::copy_from`]) and
/// releasing it is `Drop`.
pub trait GenomeOps: Send + Sync {
    /// Genome representation.
    type Genome: Clone + Send + Sync;
    /// Read-only evaluation context passed to every fitness computation.
    type Context: Sync;

    /// Allocate an uninitialized genome.
    fn allocate(&self) -> Result<Self::Genome, GenomeError>;

    /// Overwrite every gene with a random value.
    fn randomize(&self, genome: &mut Self::Genome, rng: &mut StdRng);

    /// Replace the population with the next generation, in place.
    ///
    /// Every individual whose genome changes must have its fitness
    /// invalidated.
    fn offspring(
        &self,
        individuals: &mut [Individual<Self::Genome>],
        parents: Parents,
        rng: &mut StdRng,
    );

    /// Compute fitness unconditionally.
    ///
    /// The genome is mutable because evaluation may cure numerically
    /// failing nodes in place.
    fn fitness(&self, genome: &mut Self::Genome, context: &Self::Context) -> Fitness;
}

impl<O: GenomeOps> GenomeOps for Arc<O> {
    type Genome = O::Genome;
    type Context = O::Context;

    fn allocate(&self) -> Result<Self::Genome, GenomeError> {
        self.as_ref().allocate()
    }

    fn randomize(&self, genome: &mut Self::Genome, rng: &mut StdRng) {
        self.as_ref().randomize(genome, rng)
    }

    fn offspring(
        &self,
        individuals: &mut [Individual<Self::Genome>],
        parents: Parents,
        rng: &mut StdRng,
    ) {
        self.as_ref().offspring(individuals, parents, rng)
    }

    fn fitness(&self, genome: &mut Self::Genome, context: &Self::Context) -> Fitness {
        self.as_ref().fitness(genome, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_comparisons() {
        assert!(Direction::Maximize.is_better(2.0, 1.0));
        assert!(!Direction::Maximize.is_better(1.0, 1.0));
        assert!(Direction::Maximize.is_better_or_same(1.0, 1.0));
        assert!(Direction::Minimize.is_better(1.0, 2.0));
        assert!(!Direction::Minimize.is_better_or_same(3.0, 2.0));
        assert!(Direction::Minimize.is_better(5.0, Direction::Minimize.worst()));
        assert!(Direction::Maximize.is_better(-5.0, Direction::Maximize.worst()));
    }

    #[test]
    fn test_fitness_cache() {
        let mut cache = FitnessCache::default();
        assert_eq!(cache.get(), None);

        cache.set(4.5);
        assert_eq!(cache.get(), Some(4.5));

        cache.invalidate();
        assert_eq!(cache.get(), None);
        assert_eq!(cache.value(), 4.5);
    }

    #[test]
    fn test_copy_from_is_deep() {
        let mut dst = Individual::new(vec![0u32; 3]);
        let mut src = Individual::new(vec![1u32, 2, 3]);
        src.fitness.set(1.0);

        dst.copy_from(&src);
        src.genome[0] = 99;

        assert_eq!(dst.genome, vec![1, 2, 3]);
        assert_eq!(dst.fitness.get(), Some(1.0));
    }
}
