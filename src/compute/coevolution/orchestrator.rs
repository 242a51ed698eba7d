//! Champion and predictor loops.
//!
//! The champion loop runs on the calling thread; the predictor loop runs on
//! a scoped worker. They share two regions, each behind its own mutex and
//! never held together:
//!
//! - the champion region: archive of real-fitness champions and the
//!   training set predictors are scored against;
//! - the predictor region: archive of best predictors, the active phenotype
//!   and the target length set by the Baldwin controller.
//!
//! Each region carries an epoch. A loop that sees the other region's epoch
//! change invalidates its whole population and re-evaluates it before
//! advancing. Predictor errors are only compared when both were scored
//! against the same training set.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Instant;

use log::{debug, info, warn};

use super::journal::{HistoryJournal, PredictorJournal};
use crate::compute::baldwin::{History, update_parameters};
use crate::compute::cgp::{CgpContext, CgpGenome, CgpLayout, CgpOps, CgpShape, FunctionSet};
use crate::compute::evolution::{Archive, Direction, Fitness, GenomeError, Individual, Population};
use crate::compute::fitness::Dataset;
use crate::compute::predictor::{PredictorGenome, PredictorOps, PredictorParams, TrainingSet};
use crate::schema::{Algorithm, ConfigError, RunConfig, RunProgress, StopReason};
use crate::vault::{PopulationRecord, Vault, VaultError};

/// Every dataset scores circuits higher-is-better.
const CGP_DIRECTION: Direction = Direction::Maximize;
/// Predictors minimize approximation error.
const PREDICTOR_DIRECTION: Direction = Direction::Minimize;

/// Errors raised while setting up a run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Genome(#[from] GenomeError),
    #[error(transparent)]
    Vault(#[from] VaultError),
    #[error("Dataset has no fitness cases")]
    EmptyDataset,
}

/// Outcome of a finished run.
#[derive(Debug, Clone)]
pub struct RunSummary<G> {
    pub generations: u64,
    pub stop_reason: StopReason,
    /// Best real fitness of any archived champion.
    pub best_fitness: Fitness,
    pub best_genome: G,
    /// Final used length of the active predictor.
    pub predictor_length: Option<usize>,
    /// Circuit evaluations, one per fitness case.
    pub evaluations: u64,
    pub elapsed_seconds: f64,
}

struct ChampionRegion<F: FunctionSet> {
    archive: Archive<CgpGenome<F>>,
    training: Arc<TrainingSet<F>>,
}

struct PredictorRegion {
    archive: Archive<PredictorGenome>,
    active: Arc<[u32]>,
    epoch: u64,
    /// Training set epoch the active predictor's error was scored against.
    training_epoch: u64,
    target_length: usize,
    journal: Option<PredictorJournal>,
}

impl PredictorRegion {
    /// Rescore the active predictor against `training`, keeping its phenotype.
    fn rescore<D: Dataset>(
        &mut self,
        ops: &PredictorOps<D>,
        training: &TrainingSet<D::Functions>,
    ) -> Fitness {
        let active = self.archive.get_mut(0);
        let error = ops.approximation_error(&active.genome, training);
        active.fitness.set(error);
        self.training_epoch = training.epoch();
        error
    }

    /// Publish the newest archived predictor as the active phenotype.
    fn activate_latest(&mut self, generation: u64) {
        self.active = self.archive.get(0).genome.phenotype_vec().into();
        self.epoch += 1;
        self.record(generation);
    }

    fn record(&mut self, generation: u64) {
        if let Some(journal) = self.journal.as_mut()
            && let Err(e) = journal.record(generation, &self.active)
        {
            warn!("Failed to write predictor log: {e}");
        }
    }
}

struct Shared<D: Dataset> {
    champions: Mutex<ChampionRegion<D::Functions>>,
    predictors: Option<Mutex<PredictorRegion>>,
    /// Set when either loop of this run finishes.
    stop: AtomicBool,
    /// Caller's cancellation token. Only ever read here.
    cancelled: Arc<AtomicBool>,
    /// Latest champion generation, for predictor journal lines.
    generation: AtomicU64,
}

impl<D: Dataset> Shared<D> {
    fn stopping(&self) -> bool {
        self.stop.load(Ordering::Relaxed) || self.cancelled.load(Ordering::Relaxed)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Sets the stop flag when the champion loop exits, even by panic.
struct StopOnDrop<'a>(&'a AtomicBool);

impl Drop for StopOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// CGP run, optionally coevolved with fitness predictors.
pub struct Coevolution<D: Dataset> {
    config: RunConfig,
    dataset: Arc<D>,
    layout: CgpLayout<D::Functions>,
    cancelled: Arc<AtomicBool>,
    vault: Option<Vault>,
    predictor_journal: Option<PredictorJournal>,
    history_journal: Option<HistoryJournal>,
    resume: Option<PopulationRecord<D::Functions>>,
}

impl<D: Dataset> Coevolution<D> {
    /// Validate `config` against `dataset` and prepare a run.
    pub fn new(config: RunConfig, dataset: Arc<D>) -> Result<Self, RunError> {
        config.validate()?;
        if dataset.case_count() == 0 {
            return Err(RunError::EmptyDataset);
        }

        let shape = CgpShape::new(
            dataset.input_count(),
            dataset.output_count(),
            config.cgp.cols,
            config.cgp.rows,
            config.cgp.levels_back,
        );
        let layout = CgpLayout::new(shape, config.cgp.allowed_functions.as_deref())?;
        let vault = config
            .vault
            .directory
            .as_ref()
            .map(Vault::open)
            .transpose()?;

        Ok(Self {
            config,
            dataset,
            layout,
            cancelled: Arc::new(AtomicBool::new(false)),
            vault,
            predictor_journal: None,
            history_journal: None,
            resume: None,
        })
    }

    pub fn with_predictor_journal(mut self, journal: PredictorJournal) -> Self {
        self.predictor_journal = Some(journal);
        self
    }

    pub fn with_history_journal(mut self, journal: HistoryJournal) -> Self {
        self.history_journal = Some(journal);
        self
    }

    /// Get cancellation handle. Setting it stops both loops at their next
    /// generation boundary, including before the first one. The token is
    /// never reset, so later runs stop immediately until the caller clears it.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn layout(&self) -> &CgpLayout<D::Functions> {
        &self.layout
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Continue from the latest vault state. Returns its generation.
    pub fn resume_from_vault(&mut self) -> Result<Option<u64>, RunError> {
        let Some(vault) = &self.vault else {
            return Ok(None);
        };
        let Some(record) = vault.retrieve_latest(&self.layout)? else {
            return Ok(None);
        };
        let generation = record.generation;
        info!(
            "Resuming from generation {generation} ({} chromosomes)",
            record.individuals.len()
        );
        self.resume = Some(record);
        Ok(Some(generation))
    }

    /// Run to completion (blocking).
    pub fn run(&mut self) -> Result<RunSummary<CgpGenome<D::Functions>>, RunError> {
        self.run_with_callback(|_| {})
    }

    /// Run to completion, reporting every champion generation.
    pub fn run_with_callback<C>(
        &mut self,
        mut callback: C,
    ) -> Result<RunSummary<CgpGenome<D::Functions>>, RunError>
    where
        C: FnMut(&RunProgress),
    {
        let start = Instant::now();
        let seed = self.config.random_seed.unwrap_or_else(rand::random);
        let mode = self.config.evaluation.mode;
        let counter = Arc::new(AtomicU64::new(0));

        let cgp_ops = CgpOps::new(
            self.layout.clone(),
            self.config.cgp.mutate_genes,
            Arc::clone(&self.dataset),
            mode,
        )
        .with_counter(Arc::clone(&counter));
        let mut population = match self.resume.take() {
            Some(record) => Population::from_parts(
                cgp_ops,
                record.individuals,
                CGP_DIRECTION,
                record.generation,
                record.best_index,
                seed,
            )?,
            None => Population::new(self.config.cgp.population_size, CGP_DIRECTION, cgp_ops, seed)?,
        };

        // Seed the champion archive from the initial population on all cases.
        population.evaluate_population(&CgpContext::Full);
        let mut champion = population
            .best()
            .cloned()
            .ok_or_else(|| GenomeError::Allocation("population has no best".to_string()))?;
        let real = population.ops().real_fitness(&mut champion.genome);
        champion.fitness.set(real);
        let mut champion_archive = Archive::new(self.config.cgp.archive_size, population.ops())?;
        champion_archive.insert(&champion);
        let training = Arc::new(TrainingSet::new(vec![(champion.genome.clone(), real)], 1));
        info!("Initial champion: real fitness {real:.4}");

        let mut predictor_side = None;
        let mut predictor_error = 0.0;
        if self.config.algorithm.uses_predictors() {
            let cases = self.dataset.case_count();
            let (initial_length, max_length) = self.config.predictor.lengths(cases);
            let settings = &self.config.predictor;
            let params = PredictorParams {
                sample_count: cases,
                max_length,
                mutation_rate: settings.mutation_rate,
                offspring_elite: settings.offspring_elite,
                offspring_combine: settings.offspring_combine,
                circular: settings.circular,
                offset_candidates: settings.offset_candidates,
            };
            let ops = Arc::new(
                PredictorOps::new(
                    params,
                    initial_length,
                    *self.layout.shape(),
                    Arc::clone(&self.dataset),
                    mode,
                )?
                .with_counter(Arc::clone(&counter)),
            );

            let mut predictors = Population::new(
                settings.population_size,
                PREDICTOR_DIRECTION,
                Arc::clone(&ops),
                seed.wrapping_add(1),
            )?;
            predictors.evaluate_population(&training);
            let best = predictors
                .best()
                .cloned()
                .ok_or_else(|| GenomeError::Allocation("no best predictor".to_string()))?;
            let mut archive = Archive::new(settings.archive_size, ops.as_ref())?;
            archive.insert(&best);

            let mut region = PredictorRegion {
                archive,
                active: best.genome.phenotype_vec().into(),
                epoch: 1,
                training_epoch: training.epoch(),
                target_length: initial_length,
                journal: self.predictor_journal.take(),
            };
            region.record(population.generation());
            info!(
                "Initial predictor: length {initial_length} of {max_length}, error {:.4}",
                best.fitness.value()
            );

            predictor_error = best.fitness.value();
            population.invalidate_all();
            population.evaluate_population(&CgpContext::Predicted(Arc::clone(&region.active)));
            predictor_side = Some((predictors, ops, region));
        }

        let (predictor_population, predictor_ops, predictor_region) = match predictor_side {
            Some((population, ops, region)) => {
                (Some(population), Some(ops), Some(Mutex::new(region)))
            }
            None => (None, None, None),
        };
        let shared = Shared::<D> {
            champions: Mutex::new(ChampionRegion {
                archive: champion_archive,
                training,
            }),
            predictors: predictor_region,
            stop: AtomicBool::new(false),
            cancelled: Arc::clone(&self.cancelled),
            generation: AtomicU64::new(population.generation()),
        };

        let mut champion_loop = ChampionLoop {
            config: &self.config,
            shared: &shared,
            predictor_ops: predictor_ops.as_deref(),
            vault: self.vault.as_ref(),
            history: History::starting_at(population.generation(), real),
            history_journal: self.history_journal.take(),
            champion_real: real,
            best_real: real,
            best_genome: champion.genome,
            active_predictor_fitness: predictor_error,
            last_adaptation: population.generation(),
        };

        let outcome = thread::scope(|scope| {
            let worker = predictor_population.map(|predictors| {
                let shared = &shared;
                scope.spawn(move || predictor_loop(predictors, shared))
            });

            let outcome = {
                let _stop = StopOnDrop(&shared.stop);
                champion_loop.run(&mut population, &mut callback)
            };

            if let Some(worker) = worker {
                match worker.join() {
                    Ok(length) => debug!("Predictor loop stopped at length {length}"),
                    Err(panic) => std::panic::resume_unwind(panic),
                }
            }
            outcome
        });

        let stop_reason = outcome.unwrap_or(StopReason::Cancelled);
        champion_loop.store(&population);

        let generations = population.generation();
        info!(
            "Finished after {generations} generations ({stop_reason}), best real fitness {:.4}",
            champion_loop.best_real
        );
        Ok(RunSummary {
            generations,
            stop_reason,
            best_fitness: champion_loop.best_real,
            best_genome: champion_loop.best_genome,
            predictor_length: predictor_ops.as_ref().map(|ops| ops.length()),
            evaluations: counter.load(Ordering::Relaxed),
            elapsed_seconds: start.elapsed().as_secs_f64(),
        })
    }
}

/// State owned by the champion loop.
struct ChampionLoop<'a, D: Dataset> {
    config: &'a RunConfig,
    shared: &'a Shared<D>,
    predictor_ops: Option<&'a PredictorOps<D>>,
    vault: Option<&'a Vault>,
    history: History,
    history_journal: Option<HistoryJournal>,
    /// Real fitness of the latest archived champion.
    champion_real: Fitness,
    best_real: Fitness,
    best_genome: CgpGenome<D::Functions>,
    active_predictor_fitness: Fitness,
    last_adaptation: u64,
}

impl<D: Dataset> ChampionLoop<'_, D> {
    /// Advance until a stop condition; `None` means the stop flag was seen.
    fn run<C: FnMut(&RunProgress)>(
        &mut self,
        population: &mut Population<CgpOps<D>>,
        callback: &mut C,
    ) -> Option<StopReason> {
        let shared = self.shared;
        let (mut predictor_epoch, mut context) = match &shared.predictors {
            Some(region) => {
                let region = lock(region);
                (region.epoch, CgpContext::Predicted(Arc::clone(&region.active)))
            }
            None => (0, CgpContext::Full),
        };

        loop {
            if shared.stopping() {
                return None;
            }
            if population.generation() >= self.config.max_generations {
                return Some(StopReason::MaxGenerations);
            }

            if let Some(region) = &shared.predictors {
                refresh_context(population, region, &mut predictor_epoch, &mut context);
            }

            let parent_fitness = population.best_fitness();
            population.advance_generation(&context);
            let generation = population.generation();
            shared.generation.store(generation, Ordering::Relaxed);

            let improved = CGP_DIRECTION.is_better(population.best_fitness(), parent_fitness);
            if improved {
                self.archive_champion(population, generation);
            }
            if improved || self.adaptation_due(generation) {
                self.record_history(population, generation);
            }

            if let Some(vault) = self.vault
                && self.config.vault.interval > 0
                && generation % self.config.vault.interval == 0
            {
                store_population(vault, population);
            }

            if self.config.log_interval > 0 && generation % self.config.log_interval == 0 {
                debug!(
                    "Generation {generation}: fitness {:.4}, champion real {:.4}",
                    population.best_fitness(),
                    self.champion_real
                );
            }

            callback(&RunProgress {
                generation,
                max_generations: self.config.max_generations,
                best_fitness: population.best_fitness(),
                best_real_fitness: self.best_real,
                predictor_length: self.predictor_ops.map(|ops| ops.length()),
                improved,
                evaluations: population.ops().evaluations(),
            });

            if let Some(target) = self.config.target_fitness
                && CGP_DIRECTION.is_better_or_same(self.best_real, target)
            {
                return Some(StopReason::TargetReached);
            }
        }
    }

    /// Archive the population best with its real fitness, publish the new
    /// training set and rescore the active predictor against it.
    fn archive_champion(&mut self, population: &Population<CgpOps<D>>, generation: u64) {
        let shared = self.shared;
        let Some(best) = population.best() else {
            return;
        };
        let mut champion: Individual<CgpGenome<D::Functions>> = best.clone();
        let predicted = champion.fitness.value();
        let real = population.ops().real_fitness(&mut champion.genome);
        champion.fitness.set(real);

        let training = publish_champion(&shared.champions, &champion);

        self.champion_real = real;
        if CGP_DIRECTION.is_better(real, self.best_real) {
            self.best_real = real;
            self.best_genome = champion.genome;
        }
        info!("Generation {generation}: new champion, fitness {predicted:.4}, real {real:.4}");

        if let (Some(region), Some(ops)) = (&shared.predictors, self.predictor_ops) {
            self.active_predictor_fitness = lock(region).rescore(ops, &*training);
        }
    }

    fn adaptation_due(&self, generation: u64) -> bool {
        let interval = self.config.baldwin.interval;
        self.config.algorithm == Algorithm::Baldwin
            && interval > 0
            && generation - self.last_adaptation >= interval
    }

    /// Append a history entry and, under Baldwin, retarget predictor length.
    fn record_history(&mut self, population: &Population<CgpOps<D>>, generation: u64) {
        let shared = self.shared;
        let entry = *self.history.push(
            generation,
            self.champion_real,
            population.best_fitness(),
            self.active_predictor_fitness,
        );
        if let Some(journal) = self.history_journal.as_mut()
            && let Err(e) = journal.record(&entry)
        {
            warn!("Failed to write history log: {e}");
        }

        if self.config.algorithm != Algorithm::Baldwin {
            return;
        }
        self.last_adaptation = generation;
        debug!("Baldwin history at generation {generation}:\n{}", self.history);

        let (Some(region), Some(ops)) = (&shared.predictors, self.predictor_ops) else {
            return;
        };
        let mut region = lock(region);
        let update = update_parameters(
            &self.history,
            &self.config.baldwin,
            region.target_length,
            ops.params().max_length,
        );
        if update.changed() {
            region.target_length = update.new_length;
            info!(
                "Generation {generation}: predictor length {} -> {} ({:?}, x{})",
                update.old_length, update.new_length, update.adjustment, update.coefficient
            );
        }
    }

    fn store(&self, population: &Population<CgpOps<D>>) {
        if let Some(vault) = self.vault {
            store_population(vault, population);
        }
    }
}

fn store_population<D: Dataset>(vault: &Vault, population: &Population<CgpOps<D>>) {
    let Some(best_index) = population.best_index() else {
        return;
    };
    if let Err(e) = vault.store(
        population.generation(),
        best_index,
        population.individuals(),
        population.ops().layout(),
    ) {
        warn!("Failed to store generation {}: {e}", population.generation());
    }
}

/// Archive `champion` and publish the training set of every archived
/// champion under the next epoch.
fn publish_champion<F: FunctionSet>(
    champions: &Mutex<ChampionRegion<F>>,
    champion: &Individual<CgpGenome<F>>,
) -> Arc<TrainingSet<F>> {
    let mut region = lock(champions);
    region.archive.insert(champion);
    let epoch = region.training.epoch() + 1;
    let training = region
        .archive
        .iter()
        .map(|c| (c.genome.clone(), c.fitness.value()))
        .collect();
    region.training = Arc::new(TrainingSet::new(training, epoch));
    Arc::clone(&region.training)
}

/// Switch `context` to the active predictor if it changed since `seen_epoch`
/// and re-evaluate the whole population under it.
fn refresh_context<D: Dataset>(
    population: &mut Population<CgpOps<D>>,
    predictors: &Mutex<PredictorRegion>,
    seen_epoch: &mut u64,
    context: &mut CgpContext,
) -> bool {
    let (epoch, active) = {
        let region = lock(predictors);
        (region.epoch, Arc::clone(&region.active))
    };
    if epoch == *seen_epoch {
        return false;
    }
    *seen_epoch = epoch;
    *context = CgpContext::Predicted(active);
    population.invalidate_all();
    population.evaluate_population(context);
    true
}

/// Pick up a newer training set and re-evaluate every predictor against it.
fn refresh_training<D: Dataset>(
    population: &mut Population<Arc<PredictorOps<D>>>,
    champions: &Mutex<ChampionRegion<D::Functions>>,
    training: &mut Arc<TrainingSet<D::Functions>>,
) -> bool {
    let current = Arc::clone(&lock(champions).training);
    if current.epoch() == training.epoch() {
        return false;
    }
    *training = current;
    population.invalidate_all();
    population.evaluate_population(&**training);
    true
}

/// Archive and activate `candidate` if it beats the latest archived
/// predictor. Both errors are taken against `training`: a stale candidate is
/// refused and a stale archive entry is rescored first.
fn offer_predictor<D: Dataset>(
    predictors: &Mutex<PredictorRegion>,
    ops: &PredictorOps<D>,
    candidate: &Individual<PredictorGenome>,
    training: &TrainingSet<D::Functions>,
    generation: u64,
) -> bool {
    let mut region = lock(predictors);
    if region.training_epoch > training.epoch() {
        return false;
    }
    if region.training_epoch < training.epoch() {
        region.rescore(ops, training);
    }
    let improved = region.archive.latest().is_none_or(|latest| {
        PREDICTOR_DIRECTION.is_better(candidate.fitness.value(), latest.fitness.value())
    });
    if improved {
        region.archive.insert(candidate);
        region.training_epoch = training.epoch();
        region.activate_latest(generation);
    }
    improved
}

/// Evolve predictors until the stop flag is set. Returns the final length.
fn predictor_loop<D: Dataset>(
    mut population: Population<Arc<PredictorOps<D>>>,
    shared: &Shared<D>,
) -> usize {
    let ops = Arc::clone(population.ops());
    let mut length = ops.length();
    let Some(region) = &shared.predictors else {
        return length;
    };
    let mut training = Arc::clone(&lock(&shared.champions).training);

    while !shared.stopping() {
        refresh_training(&mut population, &shared.champions, &mut training);

        let target = lock(region).target_length;
        if target != length {
            length = ops.set_length(target);
            for i in 0..population.len() {
                let individual = population.individual_mut(i);
                individual.genome.resize(length);
                individual.invalidate();
            }
            population.evaluate_population(&training);

            let mut state = lock(region);
            state.archive.get_mut(0).genome.resize(length);
            state.rescore(ops.as_ref(), &*training);
            state.activate_latest(shared.generation.load(Ordering::Relaxed));
            info!("Active predictor resized to {length}");
        }

        population.advance_generation(&training);
        let Some(best) = population.best() else {
            continue;
        };
        let generation = shared.generation.load(Ordering::Relaxed);
        if offer_predictor(region, ops.as_ref(), best, &*training, generation) {
            debug!(
                "Predictor generation {}: new active predictor, error {:.4}",
                population.generation(),
                best.fitness.value()
            );
        }
    }
    length
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::cgp::Symbolic;
    use crate::compute::evolution::GenomeOps;
    use crate::compute::fitness::SymbolicDataset;
    use crate::schema::EvalMode;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::io;

    fn dataset() -> Arc<SymbolicDataset> {
        Arc::new(SymbolicDataset::from_fn(1, 24, 0.01, |x| x[0] * x[0] + x[0]))
    }

    fn config(algorithm: Algorithm, generations: u64) -> RunConfig {
        let mut config = RunConfig {
            algorithm,
            max_generations: generations,
            random_seed: Some(7),
            ..RunConfig::default()
        };
        config.cgp.cols = 6;
        config.cgp.rows = 2;
        config.cgp.levels_back = 6;
        config
    }

    struct Regions {
        circuits: Population<CgpOps<SymbolicDataset>>,
        ops: Arc<PredictorOps<SymbolicDataset>>,
        predictors: Population<Arc<PredictorOps<SymbolicDataset>>>,
        champions: Mutex<ChampionRegion<Symbolic>>,
        region: Mutex<PredictorRegion>,
    }

    impl Regions {
        fn new() -> Self {
            let dataset = dataset();
            let shape = CgpShape::new(1, 1, 6, 2, 6);
            let layout = CgpLayout::<Symbolic>::new(shape, None).unwrap();
            let cgp_ops = CgpOps::new(layout, 3, Arc::clone(&dataset), EvalMode::Batched);
            let mut circuits = Population::new(5, CGP_DIRECTION, cgp_ops, 3).unwrap();
            circuits.evaluate_population(&CgpContext::Full);
            let mut champion = circuits.best().cloned().unwrap();
            let real = circuits.ops().real_fitness(&mut champion.genome);
            champion.fitness.set(real);
            let mut champion_archive = Archive::new(4, circuits.ops()).unwrap();
            champion_archive.insert(&champion);
            let training = Arc::new(TrainingSet::new(vec![(champion.genome, real)], 1));

            let params = PredictorParams {
                sample_count: 24,
                max_length: 8,
                mutation_rate: 0.2,
                offspring_elite: 0.25,
                offspring_combine: 0.5,
                circular: false,
                offset_candidates: 1,
            };
            let ops = PredictorOps::new(params, 4, shape, dataset, EvalMode::Batched).unwrap();
            let ops = Arc::new(ops);
            let mut predictors =
                Population::new(6, PREDICTOR_DIRECTION, Arc::clone(&ops), 4).unwrap();
            predictors.evaluate_population(&training);
            let best = predictors.best().cloned().unwrap();
            let mut archive = Archive::new(4, ops.as_ref()).unwrap();
            archive.insert(&best);

            Self {
                circuits,
                ops,
                predictors,
                champions: Mutex::new(ChampionRegion {
                    archive: champion_archive,
                    training,
                }),
                region: Mutex::new(PredictorRegion {
                    archive,
                    active: best.genome.phenotype_vec().into(),
                    epoch: 1,
                    training_epoch: 1,
                    target_length: 4,
                    journal: None,
                }),
            }
        }

        /// Publish the second circuit as a new champion.
        fn publish(&self) -> Arc<TrainingSet<Symbolic>> {
            let mut champion = self.circuits.individuals()[1].clone();
            let real = self.circuits.ops().real_fitness(&mut champion.genome);
            champion.fitness.set(real);
            publish_champion(&self.champions, &champion)
        }
    }

    #[test]
    fn test_new_champion_rescores_predictors() {
        let mut regions = Regions::new();
        let mut training = Arc::clone(&lock(&regions.champions).training);

        let published = regions.publish();
        assert_eq!(published.epoch(), 2);
        assert_eq!(published.len(), 2);

        let error = lock(&regions.region).rescore(regions.ops.as_ref(), &*published);
        {
            let region = lock(&regions.region);
            let active = region.archive.get(0);
            assert_eq!(region.training_epoch, 2);
            assert_eq!(active.fitness.value(), error);
            assert_eq!(error, regions.ops.approximation_error(&active.genome, &published));
        }

        assert!(refresh_training(&mut regions.predictors, &regions.champions, &mut training));
        assert_eq!(training.epoch(), 2);
        for individual in regions.predictors.individuals() {
            let expected = regions.ops.approximation_error(&individual.genome, &training);
            assert!(individual.fitness.is_valid());
            assert_eq!(individual.fitness.value(), expected);
        }
        assert!(!refresh_training(&mut regions.predictors, &regions.champions, &mut training));
    }

    #[test]
    fn test_predictors_compared_on_same_training() {
        let regions = Regions::new();
        let stale = Arc::clone(&lock(&regions.champions).training);
        let current = regions.publish();

        let mut candidate = regions.predictors.individuals()[0].clone();
        candidate.fitness.set(-1.0);
        assert!(!offer_predictor(&regions.region, regions.ops.as_ref(), &candidate, &*stale, 3));
        {
            let region = lock(&regions.region);
            assert_eq!(region.epoch, 1);
            assert_eq!(region.training_epoch, 1);
        }

        // The archived predictor is rescored before losing to a worse candidate.
        candidate.fitness.set(PREDICTOR_DIRECTION.worst());
        assert!(!offer_predictor(&regions.region, regions.ops.as_ref(), &candidate, &*current, 3));
        let region = lock(&regions.region);
        let active = region.archive.get(0);
        assert_eq!(region.epoch, 1);
        assert_eq!(region.training_epoch, 2);
        assert_eq!(
            active.fitness.value(),
            regions.ops.approximation_error(&active.genome, &current)
        );
    }

    #[test]
    fn test_new_predictor_reevaluates_circuits() {
        let mut regions = Regions::new();
        let training = Arc::clone(&lock(&regions.champions).training);
        let mut seen = 1;
        let mut context = CgpContext::Predicted(Arc::clone(&lock(&regions.region).active));
        assert!(!refresh_context(&mut regions.circuits, &regions.region, &mut seen, &mut context));

        lock(&regions.region).archive.get_mut(0).fitness.set(1.0);
        let mut candidate = regions.predictors.individuals()[0].clone();
        let mut rng = StdRng::seed_from_u64(99);
        candidate.genome.randomize(4, 24, &mut rng);
        candidate.fitness.set(0.5);
        assert!(offer_predictor(&regions.region, regions.ops.as_ref(), &candidate, &*training, 3));
        {
            let region = lock(&regions.region);
            assert_eq!(region.epoch, 2);
            assert_eq!(region.archive.len(), 2);
            assert_eq!(region.active.to_vec(), candidate.genome.phenotype_vec());
        }

        candidate.fitness.set(0.9);
        assert!(!offer_predictor(&regions.region, regions.ops.as_ref(), &candidate, &*training, 4));

        assert!(refresh_context(&mut regions.circuits, &regions.region, &mut seen, &mut context));
        assert_eq!(seen, 2);
        let ops = regions.circuits.ops();
        for individual in regions.circuits.individuals() {
            let expected = ops.fitness(&mut individual.genome.clone(), &context);
            assert_eq!(individual.fitness.value(), expected);
        }
        assert!(!refresh_context(&mut regions.circuits, &regions.region, &mut seen, &mut context));
    }

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_plain_cgp_runs_to_limit() {
        let mut run = Coevolution::new(config(Algorithm::Cgp, 40), dataset()).unwrap();
        let mut generations = Vec::new();
        let summary = run.run_with_callback(|p| generations.push(p.generation)).unwrap();

        assert_eq!(summary.stop_reason, StopReason::MaxGenerations);
        assert_eq!(summary.generations, 40);
        assert_eq!(generations, (1..=40).collect::<Vec<_>>());
        assert!(summary.predictor_length.is_none());
        // every generation evaluates the 7 offspring on every case
        assert!(summary.evaluations >= 40 * 7 * 24);

        let mut best = summary.best_genome.clone();
        let ops = CgpOps::new(run.layout().clone(), 1, dataset(), EvalMode::Scalar);
        assert_eq!(ops.real_fitness(&mut best), summary.best_fitness);
    }

    #[test]
    fn test_coevolution_logs_predictors() {
        let buffer = SharedBuffer::default();
        let mut run = Coevolution::new(config(Algorithm::Predictors, 60), dataset())
            .unwrap()
            .with_predictor_journal(PredictorJournal::new(buffer.clone()));
        let summary = run.run().unwrap();

        assert_eq!(summary.stop_reason, StopReason::MaxGenerations);
        assert_eq!(summary.generations, 60);
        // 25% of 24 cases
        assert_eq!(summary.predictor_length, Some(6));

        let log = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        let first = log.lines().next().unwrap();
        assert!(first.starts_with("Generation 0: Predictor phenotype length 6 ["));
    }

    #[test]
    fn test_baldwin_adapts_length_within_bounds() {
        let mut config = config(Algorithm::Baldwin, 120);
        config.baldwin.interval = 10;
        let history = SharedBuffer::default();
        let mut run = Coevolution::new(config, dataset())
            .unwrap()
            .with_history_journal(HistoryJournal::new(history.clone()));
        let summary = run.run().unwrap();

        let length = summary.predictor_length.unwrap();
        assert!((1..=24).contains(&length));

        // stalled intervals append entries even without improvement
        let log = String::from_utf8(history.0.lock().unwrap().clone()).unwrap();
        assert!(log.lines().count() >= 1);
    }

    #[test]
    fn test_target_stops_run() {
        let mut config = config(Algorithm::Predictors, 10_000);
        config.target_fitness = Some(0.0);
        let mut run = Coevolution::new(config, dataset()).unwrap();
        let summary = run.run().unwrap();

        assert_eq!(summary.stop_reason, StopReason::TargetReached);
        assert_eq!(summary.generations, 1);
    }

    #[test]
    fn test_cancel_from_callback() {
        let mut run = Coevolution::new(config(Algorithm::Predictors, 10_000), dataset()).unwrap();
        let cancel = run.cancel_handle();
        let summary = run
            .run_with_callback(|_| cancel.store(true, Ordering::Relaxed))
            .unwrap();

        assert_eq!(summary.stop_reason, StopReason::Cancelled);
        assert_eq!(summary.generations, 1);
    }

    #[test]
    fn test_cancel_before_run() {
        for algorithm in [Algorithm::Cgp, Algorithm::Predictors] {
            let mut run = Coevolution::new(config(algorithm, 10_000), dataset()).unwrap();
            run.cancel_handle().store(true, Ordering::Relaxed);
            let summary = run.run().unwrap();

            assert_eq!(summary.stop_reason, StopReason::Cancelled);
            assert_eq!(summary.generations, 0);
            assert!(run.cancel_handle().load(Ordering::Relaxed));
        }
    }

    #[test]
    fn test_vault_checkpoint_and_resume() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(Algorithm::Cgp, 25);
        config.vault.directory = Some(dir.path().to_path_buf());
        config.vault.interval = 10;

        let mut run = Coevolution::new(config.clone(), dataset()).unwrap();
        run.run().unwrap();
        assert!(dir.path().join("state_00000010").is_file());
        assert!(dir.path().join("state_00000025").is_file());

        config.max_generations = 30;
        let mut resumed = Coevolution::new(config, dataset()).unwrap();
        assert_eq!(resumed.resume_from_vault().unwrap(), Some(25));
        let summary = resumed.run().unwrap();
        assert_eq!(summary.generations, 30);
    }

    #[test]
    fn test_invalid_setup_rejected() {
        let mut bad = config(Algorithm::Cgp, 10);
        bad.cgp.rows = 0;
        assert!(matches!(
            Coevolution::new(bad, dataset()),
            Err(RunError::Config(_))
        ));

        let mut unknown = config(Algorithm::Cgp, 10);
        unknown.cgp.allowed_functions = Some(vec![200]);
        assert!(matches!(
            Coevolution::new(unknown, dataset()),
            Err(RunError::Genome(_))
        ));
    }
}
