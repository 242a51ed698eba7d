//! Generic population and generation advance.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;

use super::genome::{Direction, Fitness, GenomeError, GenomeOps, Individual, Parents};

/// Fixed-size population driven by a [`GenomeOps`] implementation.
pub struct Population<O: GenomeOps> {
    ops: O,
    individuals: Vec<Individual<O::Genome>>,
    direction: Direction,
    generation: u64,
    best_index: Option<usize>,
    best_fitness: Fitness,
    rng: StdRng,
}

impl<O: GenomeOps> Population<O> {
    /// Allocate and randomize `size` individuals.
    ///
    /// No partial population survives an allocation failure.
    pub fn new(size: usize, direction: Direction, ops: O, seed: u64) -> Result<Self, GenomeError> {
        if size == 0 {
            return Err(GenomeError::Allocation(
                "population size must be non-zero".to_string(),
            ));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut individuals = Vec::with_capacity(size);
        for _ in 0..size {
            let mut genome = ops.allocate()?;
            ops.randomize(&mut genome, &mut rng);
            individuals.push(Individual::new(genome));
        }

        Ok(Self {
            ops,
            individuals,
            direction,
            generation: 0,
            best_index: None,
            best_fitness: direction.worst(),
            rng,
        })
    }

    /// Rebuild a population from restored parts (vault loading).
    pub fn from_parts(
        ops: O,
        individuals: Vec<Individual<O::Genome>>,
        direction: Direction,
        generation: u64,
        best_index: usize,
        seed: u64,
    ) -> Result<Self, GenomeError> {
        if best_index >= individuals.len() {
            return Err(GenomeError::Allocation(format!(
                "best index {best_index} out of range for {} individuals",
                individuals.len()
            )));
        }
        let best_fitness = individuals[best_index]
            .fitness
            .get()
            .unwrap_or(direction.worst());

        Ok(Self {
            ops,
            individuals,
            direction,
            generation,
            best_index: Some(best_index),
            best_fitness,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// Evaluate one individual if its fitness cache is invalid.
    pub fn evaluate(&mut self, index: usize, context: &O::Context) -> Fitness {
        let ops = &self.ops;
        evaluate_individual(ops, &mut self.individuals[index], context)
    }

    /// Evaluate one individual regardless of its cache.
    pub fn force_reevaluate(&mut self, index: usize, context: &O::Context) -> Fitness {
        let individual = &mut self.individuals[index];
        let fitness = self.ops.fitness(&mut individual.genome, context);
        individual.fitness.set(fitness);
        fitness
    }

    /// Evaluate every invalid individual in parallel, then pick the best.
    ///
    /// When the best is unchanged, another individual with the same fitness
    /// takes over so neutral variants can drift.
    pub fn evaluate_population(&mut self, context: &O::Context) {
        let ops = &self.ops;
        self.individuals.par_iter_mut().for_each(|individual| {
            evaluate_individual(ops, individual, context);
        });

        let mut best_index = 0;
        let mut best_fitness = self.direction.worst();
        for (i, individual) in self.individuals.iter().enumerate() {
            let fitness = individual.fitness.value();
            if i == 0 || self.direction.is_better_or_same(fitness, best_fitness) {
                best_fitness = fitness;
                best_index = i;
            }
        }

        if Some(best_index) == self.best_index
            && let Some(other) = self
                .individuals
                .iter()
                .enumerate()
                .position(|(i, ind)| i != best_index && ind.fitness.value() == best_fitness)
        {
            best_index = other;
        }

        self.best_index = Some(best_index);
        self.best_fitness = best_fitness;
    }

    /// Produce offspring, evaluate them and bump the generation counter.
    ///
    /// The first call on a fresh population only evaluates it.
    pub fn advance_generation(&mut self, context: &O::Context) {
        if let Some(best_index) = self.best_index {
            let parents = Parents {
                best_index,
                direction: self.direction,
            };
            self.ops
                .offspring(&mut self.individuals, parents, &mut self.rng);
        }
        self.evaluate_population(context);
        self.generation += 1;
    }

    /// Mark every fitness cache stale.
    pub fn invalidate_all(&mut self) {
        for individual in &mut self.individuals {
            individual.invalidate();
        }
    }

    /// Current best individual, once the population has been evaluated.
    pub fn best(&self) -> Option<&Individual<O::Genome>> {
        self.best_index.map(|i| &self.individuals[i])
    }

    pub fn best_index(&self) -> Option<usize> {
        self.best_index
    }

    pub fn best_fitness(&self) -> Fitness {
        self.best_fitness
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn individuals(&self) -> &[Individual<O::Genome>] {
        &self.individuals
    }

    pub fn individual_mut(&mut self, index: usize) -> &mut Individual<O::Genome> {
        &mut self.individuals[index]
    }

    pub fn len(&self) -> usize {
        self.individuals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.individuals.is_empty()
    }

    pub fn ops(&self) -> &O {
        &self.ops
    }
}

fn evaluate_individual<O: GenomeOps>(
    ops: &O,
    individual: &mut Individual<O::Genome>,
    context: &O::Context,
) -> Fitness {
    if let Some(fitness) = individual.fitness.get() {
        return fitness;
    }
    let fitness = ops.fitness(&mut individual.genome, context);
    individual.fitness.set(fitness);
    fitness
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Single integer genome; fitness is the integer itself.
    #[derive(Default)]
    struct CounterOps {
        evaluations: AtomicUsize,
    }

    impl GenomeOps for CounterOps {
        type Genome = i64;
        type Context = i64;

        fn allocate(&self) -> Result<i64, GenomeError> {
            Ok(0)
        }

        fn randomize(&self, genome: &mut i64, rng: &mut StdRng) {
            *genome = rng.gen_range(0..100);
        }

        fn offspring(
            &self,
            individuals: &mut [Individual<i64>],
            parents: Parents,
            rng: &mut StdRng,
        ) {
            let best = individuals[parents.best_index].clone();
            for (i, individual) in individuals.iter_mut().enumerate() {
                if i != parents.best_index {
                    individual.copy_from(&best);
                    individual.genome += rng.gen_range(-3..=3);
                    individual.invalidate();
                }
            }
        }

        fn fitness(&self, genome: &mut i64, offset: &i64) -> Fitness {
            self.evaluations.fetch_add(1, Ordering::Relaxed);
            (*genome + *offset) as Fitness
        }
    }

    struct FailingOps;

    impl GenomeOps for FailingOps {
        type Genome = ();
        type Context = ();

        fn allocate(&self) -> Result<(), GenomeError> {
            Err(GenomeError::Allocation("out of memory".to_string()))
        }

        fn randomize(&self, _genome: &mut (), _rng: &mut StdRng) {}

        fn offspring(
            &self,
            _individuals: &mut [Individual<()>],
            _parents: Parents,
            _rng: &mut StdRng,
        ) {
        }

        fn fitness(&self, _genome: &mut (), _context: &()) -> Fitness {
            0.0
        }
    }

    #[test]
    fn test_allocation_failure_is_fatal() {
        assert!(Population::new(4, Direction::Maximize, FailingOps, 1).is_err());
        assert!(Population::new(0, Direction::Maximize, CounterOps::default(), 1).is_err());
    }

    #[test]
    fn test_advance_increments_generation() {
        let mut pop = Population::new(5, Direction::Maximize, CounterOps::default(), 7).unwrap();
        assert_eq!(pop.generation(), 0);
        assert!(pop.best().is_none());

        for expected in 1..=10 {
            pop.advance_generation(&0);
            assert_eq!(pop.generation(), expected);
        }
    }

    #[test]
    fn test_best_index_invariant() {
        for direction in [Direction::Maximize, Direction::Minimize] {
            let mut pop = Population::new(6, direction, CounterOps::default(), 42).unwrap();
            for _ in 0..25 {
                pop.advance_generation(&0);
                let best = pop.best_fitness();
                assert_eq!(pop.best().unwrap().fitness.get(), Some(best));
                assert!(
                    pop.individuals()
                        .iter()
                        .all(|ind| !direction.is_better(ind.fitness.get().unwrap(), best))
                );
            }
        }
    }

    #[test]
    fn test_elitism_never_regresses() {
        let mut pop = Population::new(4, Direction::Maximize, CounterOps::default(), 3).unwrap();
        pop.advance_generation(&0);
        let mut previous = pop.best_fitness();
        for _ in 0..50 {
            pop.advance_generation(&0);
            assert!(pop.best_fitness() >= previous);
            previous = pop.best_fitness();
        }
    }

    #[test]
    fn test_tie_break_moves_best() {
        let ops = CounterOps::default();
        let individuals = (0..3)
            .map(|_| {
                let mut ind = Individual::new(5);
                ind.fitness.set(5.0);
                ind
            })
            .collect();
        let mut pop =
            Population::from_parts(ops, individuals, Direction::Maximize, 0, 2, 1).unwrap();

        // Last equal individual wins the scan; it was already best, so it moves.
        pop.evaluate_population(&0);
        assert_eq!(pop.best_index(), Some(0));
    }

    #[test]
    fn test_evaluate_uses_cache() {
        let mut pop = Population::new(3, Direction::Maximize, CounterOps::default(), 9).unwrap();
        pop.evaluate(0, &0);
        pop.evaluate(0, &0);
        assert_eq!(pop.ops().evaluations.load(Ordering::Relaxed), 1);

        let genome = pop.individuals()[0].genome;
        let forced = pop.force_reevaluate(0, &10);
        assert_eq!(forced, (genome + 10) as Fitness);
        assert_eq!(pop.ops().evaluations.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_invalidate_all_triggers_reevaluation() {
        let mut pop = Population::new(4, Direction::Minimize, CounterOps::default(), 11).unwrap();
        pop.evaluate_population(&0);
        let before = pop.ops().evaluations.load(Ordering::Relaxed);

        pop.evaluate_population(&0);
        assert_eq!(pop.ops().evaluations.load(Ordering::Relaxed), before);

        pop.invalidate_all();
        pop.evaluate_population(&100);
        assert_eq!(pop.ops().evaluations.load(Ordering::Relaxed), before + 4);
        assert!(pop.best_fitness() >= 100.0);
    }
}
