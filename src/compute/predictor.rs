//! Fitness predictors.
//!
//! A predictor selects a subset of fitness cases. Evaluating a circuit on
//! that subset approximates its real fitness; predictors are themselves
//! evolved to minimize the approximation error over an archive of
//! champion circuits.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use rand::Rng;
use rand::rngs::StdRng;

use super::cgp::{CgpGenome, CgpShape, FunctionSet, Workspace};
use super::evolution::{Direction, Fitness, GenomeError, GenomeOps, Individual, Parents};
use super::fitness::{Cases, Dataset, EvalMode, evaluate_cases};

/// Variable-length subset of fitness case indices.
///
/// Storage is allocated once at `max_length`; only the used prefix (or, for
/// circular predictors, the window starting at `offset`) is the phenotype.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictorGenome {
    genes: Vec<u32>,
    used_length: usize,
    offset: usize,
}

impl PredictorGenome {
    pub fn new(max_length: usize) -> Self {
        Self {
            genes: vec![0; max_length],
            used_length: max_length.min(1),
            offset: 0,
        }
    }

    pub fn genes(&self) -> &[u32] {
        &self.genes
    }

    pub fn max_length(&self) -> usize {
        self.genes.len()
    }

    pub fn used_length(&self) -> usize {
        self.used_length
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Set the phenotype window start. Wraps around the gene array.
    pub fn set_offset(&mut self, offset: usize) {
        self.offset = offset % self.genes.len().max(1);
    }

    /// Change the used length without touching storage.
    pub fn resize(&mut self, length: usize) {
        self.used_length = length.clamp(1, self.genes.len().max(1));
    }

    /// Fill every gene with a random case index and set the used length.
    pub fn randomize(&mut self, length: usize, sample_count: usize, rng: &mut StdRng) {
        for gene in &mut self.genes {
            *gene = rng.gen_range(0..sample_count) as u32;
        }
        self.resize(length);
    }

    /// Gene index of logical phenotype position `k`.
    fn position(&self, k: usize) -> usize {
        (self.offset + k) % self.genes.len()
    }

    /// Selected case indices.
    pub fn phenotype(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.used_length).map(move |k| self.genes[self.position(k)])
    }

    pub fn phenotype_vec(&self) -> Vec<u32> {
        self.phenotype().collect()
    }

    /// Redraw up to `ceil(rate * used_length)` randomly chosen phenotype
    /// positions.
    pub fn mutate(&mut self, rate: f64, sample_count: usize, rng: &mut StdRng) {
        let max_changed = (rate * self.used_length as f64).ceil() as usize;
        let count = rng.gen_range(0..=max_changed);
        for _ in 0..count {
            let k = rng.gen_range(0..self.used_length);
            let position = self.position(k);
            self.genes[position] = rng.gen_range(0..sample_count) as u32;
        }
    }

    /// One-point crossover of two parents' full gene arrays.
    pub fn crossover(&mut self, mom: &PredictorGenome, dad: &PredictorGenome, rng: &mut StdRng) {
        let split = rng.gen_range(0..self.genes.len());
        self.genes[..split].copy_from_slice(&mom.genes[..split]);
        self.genes[split..].copy_from_slice(&dad.genes[split..]);
        self.offset = mom.offset;
    }
}

/// Champion circuits with their real fitness, used to score predictors.
#[derive(Debug, Clone)]
pub struct TrainingSet<F: FunctionSet> {
    champions: Vec<(CgpGenome<F>, Fitness)>,
    epoch: u64,
}

impl<F: FunctionSet> TrainingSet<F> {
    pub fn new(champions: Vec<(CgpGenome<F>, Fitness)>, epoch: u64) -> Self {
        Self { champions, epoch }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), 0)
    }

    /// Incremented whenever the champion archive changes.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn champions(&self) -> &[(CgpGenome<F>, Fitness)] {
        &self.champions
    }

    pub fn len(&self) -> usize {
        self.champions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.champions.is_empty()
    }
}

/// Static predictor settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictorParams {
    /// Number of fitness cases indices are drawn from.
    pub sample_count: usize,
    pub max_length: usize,
    pub mutation_rate: f64,
    /// Fraction of the population kept unchanged.
    pub offspring_elite: f64,
    /// Fraction of the population produced by crossover.
    pub offspring_combine: f64,
    pub circular: bool,
    /// Offsets tried per evaluation of a circular predictor.
    pub offset_candidates: usize,
}

/// Predictor operations. Minimizes mean absolute prediction error.
pub struct PredictorOps<D: Dataset> {
    params: PredictorParams,
    length: AtomicUsize,
    shape: CgpShape,
    dataset: Arc<D>,
    mode: EvalMode,
    evaluations: Arc<AtomicU64>,
}

impl<D: Dataset> PredictorOps<D> {
    pub fn new(
        params: PredictorParams,
        initial_length: usize,
        shape: CgpShape,
        dataset: Arc<D>,
        mode: EvalMode,
    ) -> Result<Self, GenomeError> {
        if params.max_length == 0 {
            return Err(GenomeError::InvalidShape(
                "predictor maximum length must be non-zero".to_string(),
            ));
        }
        if params.sample_count == 0 {
            return Err(GenomeError::InvalidShape(
                "predictors need at least one fitness case".to_string(),
            ));
        }
        Ok(Self {
            params,
            length: AtomicUsize::new(initial_length.clamp(1, params.max_length)),
            shape,
            dataset,
            mode,
            evaluations: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Share an evaluation counter with other operations.
    pub fn with_counter(mut self, counter: Arc<AtomicU64>) -> Self {
        self.evaluations = counter;
        self
    }

    pub fn params(&self) -> &PredictorParams {
        &self.params
    }

    /// Used length given to new and randomized predictors.
    pub fn length(&self) -> usize {
        self.length.load(Ordering::Relaxed)
    }

    /// Change the target length, clamped to `[1, max_length]`.
    pub fn set_length(&self, length: usize) -> usize {
        let length = length.clamp(1, self.params.max_length);
        self.length.store(length, Ordering::Relaxed);
        length
    }

    /// Fitness of `champion` computed on the given case subset.
    pub fn predict(&self, champion: &CgpGenome<D::Functions>, cases: &[u32]) -> Fitness {
        let mut genome = champion.clone();
        let mut workspace = Workspace::new(&self.shape);
        let result = evaluate_cases(
            &mut genome,
            self.dataset.as_ref(),
            Cases::Subset(cases),
            self.mode,
            &mut workspace,
        );
        self.evaluations.fetch_add(result.evaluated, Ordering::Relaxed);
        result.fitness
    }

    /// Mean absolute difference between real and predicted champion fitness.
    pub fn approximation_error(
        &self,
        genome: &PredictorGenome,
        training: &TrainingSet<D::Functions>,
    ) -> Fitness {
        if training.is_empty() {
            return Direction::Minimize.worst();
        }
        let cases = genome.phenotype_vec();
        let total: f64 = training
            .champions()
            .iter()
            .map(|(champion, real)| (real - self.predict(champion, &cases)).abs())
            .sum();
        total / training.len() as f64
    }

    fn candidate_offsets(&self, current: usize) -> Vec<usize> {
        if !self.params.circular {
            return vec![0];
        }
        let max = self.params.max_length;
        let count = self.params.offset_candidates.clamp(1, max);
        let step = max / count;
        (0..count).map(|k| (current + k * step) % max).collect()
    }
}

fn tournament(
    pool: &[Individual<PredictorGenome>],
    direction: Direction,
    rng: &mut StdRng,
) -> usize {
    let red = rng.gen_range(0..pool.len());
    let blue = rng.gen_range(0..pool.len());
    if direction.is_better(pool[red].fitness.value(), pool[blue].fitness.value()) {
        red
    } else {
        blue
    }
}

/// Mark the `count` best individuals.
fn find_elites<G>(individuals: &[Individual<G>], count: usize, direction: Direction) -> Vec<bool> {
    let mut is_elite = vec![false; individuals.len()];
    for _ in 0..count.min(individuals.len()) {
        let mut best: Option<usize> = None;
        for (i, individual) in individuals.iter().enumerate() {
            if is_elite[i] {
                continue;
            }
            let better = match best {
                None => true,
                Some(b) => direction.is_better(
                    individual.fitness.value(),
                    individuals[b].fitness.value(),
                ),
            };
            if better {
                best = Some(i);
            }
        }
        if let Some(b) = best {
            is_elite[b] = true;
        }
    }
    is_elite
}

impl<D: Dataset> GenomeOps for PredictorOps<D> {
    type Genome = PredictorGenome;
    type Context = TrainingSet<D::Functions>;

    fn allocate(&self) -> Result<PredictorGenome, GenomeError> {
        Ok(PredictorGenome::new(self.params.max_length))
    }

    fn randomize(&self, genome: &mut PredictorGenome, rng: &mut StdRng) {
        genome.randomize(self.length(), self.params.sample_count, rng);
    }

    /// Keep the elite, breed a share by tournament and crossover, and
    /// replace the rest with random predictors.
    fn offspring(
        &self,
        individuals: &mut [Individual<PredictorGenome>],
        parents: Parents,
        rng: &mut StdRng,
    ) {
        let size = individuals.len() as f64;
        let elite_count = ((size * self.params.offspring_elite).ceil() as usize).max(1);
        let mut combined = (size * self.params.offspring_combine).ceil() as usize;
        let is_elite = find_elites(individuals, elite_count, parents.direction);

        let pool = individuals.to_vec();
        let length = self.length();
        for (i, child) in individuals.iter_mut().enumerate() {
            if is_elite[i] {
                continue;
            }
            if combined > 0 {
                let mom = tournament(&pool, parents.direction, rng);
                let dad = tournament(&pool, parents.direction, rng);
                child
                    .genome
                    .crossover(&pool[mom].genome, &pool[dad].genome, rng);
                child.genome.resize(length);
                child
                    .genome
                    .mutate(self.params.mutation_rate, self.params.sample_count, rng);
                combined -= 1;
            } else {
                child
                    .genome
                    .randomize(length, self.params.sample_count, rng);
            }
            child.invalidate();
        }
    }

    /// Approximation error, searching the best phenotype offset of
    /// circular predictors.
    fn fitness(
        &self,
        genome: &mut PredictorGenome,
        training: &TrainingSet<D::Functions>,
    ) -> Fitness {
        let mut best_error = Direction::Minimize.worst();
        let mut best_offset = genome.offset();
        for offset in self.candidate_offsets(genome.offset()) {
            genome.set_offset(offset);
            let error = self.approximation_error(genome, training);
            if error < best_error {
                best_error = error;
                best_offset = offset;
            }
        }
        genome.set_offset(best_offset);
        best_error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::cgp::{CgpLayout, Symbolic, SymbolicOp};
    use crate::compute::evolution::Population;
    use crate::compute::fitness::SymbolicDataset;
    use rand::SeedableRng;

    fn params(max_length: usize, circular: bool) -> PredictorParams {
        PredictorParams {
            sample_count: 40,
            max_length,
            mutation_rate: 0.5,
            offspring_elite: 0.25,
            offspring_combine: 0.5,
            circular,
            offset_candidates: 4,
        }
    }

    fn setup(circular: bool) -> (PredictorOps<SymbolicDataset>, TrainingSet<Symbolic>) {
        let dataset = Arc::new(SymbolicDataset::from_fn(1, 40, 0.01, |x| x[0] * x[0]));
        let shape = CgpShape::new(1, 1, 1, 1, 1);
        let layout = CgpLayout::<Symbolic>::new(shape, None).unwrap();
        let square =
            CgpGenome::from_genes(&layout, &[([0, 0], SymbolicOp::Mul as u8)], &[1]).unwrap();
        let identity =
            CgpGenome::from_genes(&layout, &[([0, 0], SymbolicOp::Abs as u8)], &[0]).unwrap();

        let ops = PredictorOps::new(
            params(20, circular),
            10,
            shape,
            Arc::clone(&dataset),
            EvalMode::Scalar,
        )
        .unwrap();
        let mut training = Vec::new();
        for mut champion in [square, identity] {
            let real = evaluate_cases(
                &mut champion,
                dataset.as_ref(),
                Cases::All,
                EvalMode::Scalar,
                &mut Workspace::new(&shape),
            )
            .fitness;
            training.push((champion, real));
        }
        (ops, TrainingSet::new(training, 1))
    }

    #[test]
    fn test_resize_keeps_storage() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut genome = PredictorGenome::new(16);
        genome.randomize(8, 100, &mut rng);
        let genes = genome.genes().to_vec();

        genome.resize(12);
        assert_eq!(genome.used_length(), 12);
        assert_eq!(genome.genes(), genes.as_slice());

        genome.resize(100);
        assert_eq!(genome.used_length(), 16);
        genome.resize(0);
        assert_eq!(genome.used_length(), 1);
    }

    #[test]
    fn test_mutation_touches_only_used_prefix() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut genome = PredictorGenome::new(32);
        genome.randomize(8, 1000, &mut rng);
        let before = genome.genes().to_vec();

        for _ in 0..50 {
            genome.mutate(1.0, 1000, &mut rng);
        }
        assert_eq!(&genome.genes()[8..], &before[8..]);
    }

    #[test]
    fn test_low_rate_still_mutates_short_predictors() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut genome = PredictorGenome::new(6);
        genome.randomize(6, 1000, &mut rng);
        let before = genome.genes().to_vec();

        for _ in 0..200 {
            genome.mutate(0.05, 1000, &mut rng);
        }
        assert_ne!(genome.genes(), before.as_slice());

        let mut frozen = genome.clone();
        frozen.mutate(0.0, 1000, &mut rng);
        assert_eq!(frozen, genome);
    }

    #[test]
    fn test_circular_phenotype_wraps() {
        let mut genome = PredictorGenome::new(5);
        genome.genes = vec![10, 11, 12, 13, 14];
        genome.resize(3);
        genome.set_offset(4);

        assert_eq!(genome.phenotype_vec(), vec![14, 10, 11]);

        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..50 {
            genome.mutate(1.0, 5, &mut rng);
        }
        // Positions 4, 0 and 1 form the phenotype; 2 and 3 are never touched.
        assert_eq!(&genome.genes()[2..4], &[12, 13]);
    }

    #[test]
    fn test_full_subset_predicts_exactly() {
        let (ops, training) = setup(false);
        let mut genome = PredictorGenome::new(40);
        genome.genes = (0..40).collect();
        genome.resize(40);

        assert_eq!(ops.approximation_error(&genome, &training), 0.0);
    }

    #[test]
    fn test_empty_training_set_is_worst() {
        let (ops, _) = setup(false);
        let mut genome = ops.allocate().unwrap();
        let error = ops.fitness(&mut genome, &TrainingSet::empty());
        assert_eq!(error, f64::INFINITY);
    }

    #[test]
    fn test_offset_search_never_worse() {
        let (ops, training) = setup(true);
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..10 {
            let mut genome = ops.allocate().unwrap();
            ops.randomize(&mut genome, &mut rng);
            let at_current = ops.approximation_error(&genome, &training);

            let searched = ops.fitness(&mut genome, &training);
            assert!(searched <= at_current);
            assert_eq!(ops.approximation_error(&genome, &training), searched);
        }
    }

    #[test]
    fn test_offspring_keeps_elites() {
        let (ops, training) = setup(false);
        let mut population = Population::new(8, Direction::Minimize, ops, 6).unwrap();
        population.advance_generation(&training);
        let best = population.best().unwrap().clone();

        for _ in 0..20 {
            population.advance_generation(&training);
            assert!(population.best_fitness() <= best.fitness.get().unwrap());
        }
        assert!(
            population
                .individuals()
                .iter()
                .all(|ind| ind.genome.used_length() == 10)
        );
    }

    #[test]
    fn test_set_length_clamps() {
        let (ops, _) = setup(false);
        assert_eq!(ops.set_length(0), 1);
        assert_eq!(ops.set_length(500), 20);
        assert_eq!(ops.length(), 20);
    }
}
