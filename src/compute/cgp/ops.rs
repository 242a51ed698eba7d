//! CGP genome operations for the evolutionary engine.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use rand::rngs::StdRng;

use super::eval::Workspace;
use super::genotype::{CgpGenome, CgpLayout};
use crate::compute::evolution::{Fitness, GenomeError, GenomeOps, Individual, Parents};
use crate::compute::fitness::{Cases, Dataset, EvalMode, evaluate_cases};

/// How CGP fitness is computed.
#[derive(Debug, Clone)]
pub enum CgpContext {
    /// Every fitness case.
    Full,
    /// Only the cases selected by the active predictor.
    Predicted(Arc<[u32]>),
}

/// Elitist (1+λ) CGP operations over a dataset.
pub struct CgpOps<D: Dataset> {
    layout: CgpLayout<D::Functions>,
    mutate_genes: usize,
    dataset: Arc<D>,
    mode: EvalMode,
    evaluations: Arc<AtomicU64>,
}

impl<D: Dataset> CgpOps<D> {
    pub fn new(
        layout: CgpLayout<D::Functions>,
        mutate_genes: usize,
        dataset: Arc<D>,
        mode: EvalMode,
    ) -> Self {
        Self {
            layout,
            mutate_genes,
            dataset,
            mode,
            evaluations: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Share an evaluation counter with other operations.
    pub fn with_counter(mut self, counter: Arc<AtomicU64>) -> Self {
        self.evaluations = counter;
        self
    }

    pub fn full_context(&self) -> CgpContext {
        CgpContext::Full
    }

    pub fn layout(&self) -> &CgpLayout<D::Functions> {
        &self.layout
    }

    pub fn dataset(&self) -> &Arc<D> {
        &self.dataset
    }

    pub fn mode(&self) -> EvalMode {
        self.mode
    }

    /// Circuit evaluations performed so far.
    pub fn evaluations(&self) -> u64 {
        self.evaluations.load(Ordering::Relaxed)
    }

    pub fn counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.evaluations)
    }

    /// Fitness over every case, bypassing any predictor.
    pub fn real_fitness(&self, genome: &mut CgpGenome<D::Functions>) -> Fitness {
        self.fitness_on(genome, Cases::All)
    }

    fn fitness_on(&self, genome: &mut CgpGenome<D::Functions>, cases: Cases<'_>) -> Fitness {
        let mut workspace = Workspace::new(self.layout.shape());
        let result =
            evaluate_cases(genome, self.dataset.as_ref(), cases, self.mode, &mut workspace);
        self.evaluations.fetch_add(result.evaluated, Ordering::Relaxed);
        result.fitness
    }
}

impl<D: Dataset> GenomeOps for CgpOps<D> {
    type Genome = CgpGenome<D::Functions>;
    type Context = CgpContext;

    fn allocate(&self) -> Result<Self::Genome, GenomeError> {
        Ok(CgpGenome::new(self.layout.shape()))
    }

    fn randomize(&self, genome: &mut Self::Genome, rng: &mut StdRng) {
        genome.randomize(&self.layout, rng);
    }

    fn offspring(
        &self,
        individuals: &mut [Individual<Self::Genome>],
        parents: Parents,
        rng: &mut StdRng,
    ) {
        let parent = individuals[parents.best_index].clone();
        for (i, child) in individuals.iter_mut().enumerate() {
            if i == parents.best_index {
                continue;
            }
            child.copy_from(&parent);
            child.genome.mutate(&self.layout, self.mutate_genes, rng);
            child.invalidate();
        }
    }

    fn fitness(&self, genome: &mut Self::Genome, context: &CgpContext) -> Fitness {
        match context {
            CgpContext::Full => self.fitness_on(genome, Cases::All),
            CgpContext::Predicted(cases) => self.fitness_on(genome, Cases::Subset(cases)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::cgp::{CgpShape, Symbolic};
    use crate::compute::evolution::{Direction, Population};
    use crate::compute::fitness::SymbolicDataset;
    use rand::SeedableRng;

    fn ops(cases: usize) -> CgpOps<SymbolicDataset> {
        let dataset = Arc::new(SymbolicDataset::from_fn(1, cases, 0.01, |x| x[0] * x[0] + x[0]));
        let layout = CgpLayout::<Symbolic>::new(CgpShape::new(1, 1, 10, 2, 10), None).unwrap();
        CgpOps::new(layout, 4, dataset, EvalMode::Batched)
    }

    #[test]
    fn test_offspring_clones_parent() {
        let ops = ops(10);
        let mut rng = StdRng::seed_from_u64(4);
        let mut individuals: Vec<_> = (0..4)
            .map(|_| {
                let mut genome = ops.allocate().unwrap();
                ops.randomize(&mut genome, &mut rng);
                let mut ind = Individual::new(genome);
                ind.fitness.set(1.0);
                ind
            })
            .collect();
        let parent = individuals[2].clone();

        let parents = Parents {
            best_index: 2,
            direction: Direction::Maximize,
        };
        ops.offspring(&mut individuals, parents, &mut rng);

        assert_eq!(individuals[2], parent);
        for (i, child) in individuals.iter().enumerate() {
            if i != 2 {
                assert!(!child.fitness.is_valid());
            }
        }
    }

    #[test]
    fn test_counter_tracks_cases() {
        let ops = ops(16);
        let mut genome = ops.allocate().unwrap();
        let mut rng = StdRng::seed_from_u64(8);
        ops.randomize(&mut genome, &mut rng);

        let predicted = CgpContext::Predicted(Arc::from(vec![1u32, 5, 7]));
        ops.fitness(&mut genome, &predicted);
        assert!(ops.evaluations() >= 3);

        let before = ops.evaluations();
        ops.real_fitness(&mut genome);
        assert!(ops.evaluations() >= before + 16);
    }

    #[test]
    fn test_population_improves() {
        let ops = ops(20);
        let context = ops.full_context();
        let mut population = Population::new(8, Direction::Maximize, ops, 17).unwrap();

        population.advance_generation(&context);
        let initial = population.best_fitness();
        for _ in 0..300 {
            population.advance_generation(&context);
        }
        assert!(population.best_fitness() >= initial);
        assert_eq!(population.generation(), 301);
    }
}
