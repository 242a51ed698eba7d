//! Run configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Which evolutionary algorithm drives the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// Plain CGP with fitness on every case.
    Cgp,
    /// CGP coevolved with fitness predictors.
    #[default]
    Predictors,
    /// Coevolution with adaptive predictor length.
    Baldwin,
}

impl Algorithm {
    pub fn uses_predictors(self) -> bool {
        !matches!(self, Algorithm::Cgp)
    }
}

/// Scalar or lane-batched circuit evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvalMode {
    Scalar,
    #[default]
    Batched,
}

/// Top-level run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub algorithm: Algorithm,
    /// Generation limit of the CGP population.
    #[serde(default = "default_max_generations")]
    pub max_generations: u64,
    /// Stop once the best real fitness reaches this value.
    #[serde(default)]
    pub target_fitness: Option<f64>,
    /// Progress logging period in generations; 0 disables periodic logs.
    #[serde(default = "default_log_interval")]
    pub log_interval: u64,
    #[serde(default)]
    pub cgp: CgpConfig,
    #[serde(default)]
    pub predictor: PredictorConfig,
    #[serde(default)]
    pub baldwin: BaldwinConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub vault: VaultConfig,
    /// Seed for reproducible runs.
    #[serde(default)]
    pub random_seed: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::default(),
            max_generations: default_max_generations(),
            target_fitness: None,
            log_interval: default_log_interval(),
            cgp: CgpConfig::default(),
            predictor: PredictorConfig::default(),
            baldwin: BaldwinConfig::default(),
            evaluation: EvaluationConfig::default(),
            dataset: DatasetConfig::default(),
            vault: VaultConfig::default(),
            random_seed: None,
        }
    }
}

fn default_max_generations() -> u64 {
    50_000
}
fn default_log_interval() -> u64 {
    20
}

/// CGP grid and population.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CgpConfig {
    #[serde(default = "default_cols")]
    pub cols: usize,
    #[serde(default = "default_rows")]
    pub rows: usize,
    #[serde(default = "default_levels_back")]
    pub levels_back: usize,
    #[serde(default = "default_population_size")]
    pub population_size: usize,
    /// Maximum genes changed per mutation.
    #[serde(default = "default_mutate_genes")]
    pub mutate_genes: usize,
    #[serde(default = "default_archive_size")]
    pub archive_size: usize,
    /// Restrict function mutation to these function ids.
    #[serde(default)]
    pub allowed_functions: Option<Vec<u8>>,
}

impl Default for CgpConfig {
    fn default() -> Self {
        Self {
            cols: default_cols(),
            rows: default_rows(),
            levels_back: default_levels_back(),
            population_size: default_population_size(),
            mutate_genes: default_mutate_genes(),
            archive_size: default_archive_size(),
            allowed_functions: None,
        }
    }
}

fn default_cols() -> usize {
    8
}
fn default_rows() -> usize {
    4
}
fn default_levels_back() -> usize {
    8
}
fn default_population_size() -> usize {
    8
}
fn default_mutate_genes() -> usize {
    5
}
fn default_archive_size() -> usize {
    10
}

/// Predictor population. Sizes are fractions of the fitness case count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictorConfig {
    /// Initial used length.
    #[serde(default = "default_predictor_size")]
    pub size: f64,
    /// Storage length; Baldwin never grows a predictor past it.
    #[serde(default = "default_predictor_max_size")]
    pub max_size: f64,
    #[serde(default = "default_predictor_mutation_rate")]
    pub mutation_rate: f64,
    #[serde(default = "default_population_size")]
    pub population_size: usize,
    #[serde(default = "default_archive_size")]
    pub archive_size: usize,
    #[serde(default = "default_offspring_elite")]
    pub offspring_elite: f64,
    #[serde(default = "default_offspring_combine")]
    pub offspring_combine: f64,
    /// Read the phenotype from a rotating window over the genes.
    #[serde(default)]
    pub circular: bool,
    #[serde(default = "default_offset_candidates")]
    pub offset_candidates: usize,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            size: default_predictor_size(),
            max_size: default_predictor_max_size(),
            mutation_rate: default_predictor_mutation_rate(),
            population_size: default_population_size(),
            archive_size: default_archive_size(),
            offspring_elite: default_offspring_elite(),
            offspring_combine: default_offspring_combine(),
            circular: false,
            offset_candidates: default_offset_candidates(),
        }
    }
}

impl PredictorConfig {
    /// Initial and maximum used lengths for `cases` fitness cases.
    pub fn lengths(&self, cases: usize) -> (usize, usize) {
        let max = ((self.max_size * cases as f64).ceil() as usize).clamp(1, cases.max(1));
        let initial = ((self.size * cases as f64).ceil() as usize).clamp(1, max);
        (initial, max)
    }
}

fn default_predictor_size() -> f64 {
    0.25
}
fn default_predictor_max_size() -> f64 {
    1.0
}
fn default_predictor_mutation_rate() -> f64 {
    0.05
}
fn default_offspring_elite() -> f64 {
    0.25
}
fn default_offspring_combine() -> f64 {
    0.5
}
fn default_offset_candidates() -> usize {
    4
}

/// Adaptive predictor length controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaldwinConfig {
    /// Also adapt after this many generations without improvement; 0 disables.
    #[serde(default = "default_baldwin_interval")]
    pub interval: u64,
    /// Velocities within this distance of zero count as stalled.
    #[serde(default = "default_zero_epsilon")]
    pub zero_epsilon: f64,
    /// Velocities above this are fast progress.
    #[serde(default = "default_slow_threshold")]
    pub slow_threshold: f64,
    /// Predicted/real fitness ratio above which the predictor is inaccurate.
    #[serde(default = "default_inaccuracy_tolerance")]
    pub inaccuracy_tolerance: f64,
    #[serde(default = "default_inaccuracy_coefficient")]
    pub inaccuracy_coefficient: f64,
    #[serde(default = "default_zero_coefficient")]
    pub zero_coefficient: f64,
    #[serde(default = "default_decrease_coefficient")]
    pub decrease_coefficient: f64,
    #[serde(default = "default_increase_slow_coefficient")]
    pub increase_slow_coefficient: f64,
    #[serde(default = "default_increase_fast_coefficient")]
    pub increase_fast_coefficient: f64,
    /// Coefficients closer to 1 than this leave the length unchanged.
    #[serde(default = "default_change_tolerance")]
    pub change_tolerance: f64,
}

impl Default for BaldwinConfig {
    fn default() -> Self {
        Self {
            interval: default_baldwin_interval(),
            zero_epsilon: default_zero_epsilon(),
            slow_threshold: default_slow_threshold(),
            inaccuracy_tolerance: default_inaccuracy_tolerance(),
            inaccuracy_coefficient: default_inaccuracy_coefficient(),
            zero_coefficient: default_zero_coefficient(),
            decrease_coefficient: default_decrease_coefficient(),
            increase_slow_coefficient: default_increase_slow_coefficient(),
            increase_fast_coefficient: default_increase_fast_coefficient(),
            change_tolerance: default_change_tolerance(),
        }
    }
}

fn default_baldwin_interval() -> u64 {
    500
}
fn default_zero_epsilon() -> f64 {
    0.001
}
fn default_slow_threshold() -> f64 {
    5.0
}
fn default_inaccuracy_tolerance() -> f64 {
    1.2
}
fn default_inaccuracy_coefficient() -> f64 {
    1.1
}
fn default_zero_coefficient() -> f64 {
    1.07
}
fn default_decrease_coefficient() -> f64 {
    1.03
}
fn default_increase_slow_coefficient() -> f64 {
    1.0
}
fn default_increase_fast_coefficient() -> f64 {
    0.97
}
fn default_change_tolerance() -> f64 {
    0.005
}

/// Circuit evaluation settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationConfig {
    #[serde(default)]
    pub mode: EvalMode,
}

/// Fitness case settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Symbolic regression hit tolerance.
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            epsilon: default_epsilon(),
        }
    }
}

fn default_epsilon() -> f64 {
    0.01
}

/// Checkpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Checkpoint directory; checkpoints are disabled when unset.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    /// Store every this many generations, and always at termination.
    #[serde(default = "default_vault_interval")]
    pub interval: u64,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            directory: None,
            interval: default_vault_interval(),
        }
    }
}

fn default_vault_interval() -> u64 {
    200
}

impl RunConfig {
    /// Validate every numeric range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let cgp = &self.cgp;
        if cgp.cols == 0 || cgp.rows == 0 || cgp.levels_back == 0 {
            return Err(ConfigError::InvalidGrid);
        }
        if cgp.population_size < 2 {
            return Err(ConfigError::PopulationTooSmall("cgp"));
        }
        if cgp.mutate_genes == 0 {
            return Err(ConfigError::InvalidMutation);
        }
        if cgp.archive_size == 0 {
            return Err(ConfigError::ArchiveEmpty("cgp"));
        }
        if cgp.allowed_functions.as_ref().is_some_and(|f| f.is_empty()) {
            return Err(ConfigError::EmptyFunctionSet);
        }

        let predictor = &self.predictor;
        let fraction = |name: &'static str, value: f64, allow_zero: bool| {
            let lower_ok = if allow_zero { value >= 0.0 } else { value > 0.0 };
            if lower_ok && value <= 1.0 {
                Ok(())
            } else {
                Err(ConfigError::InvalidFraction { name, value })
            }
        };
        fraction("predictor.size", predictor.size, false)?;
        fraction("predictor.max_size", predictor.max_size, false)?;
        fraction("predictor.mutation_rate", predictor.mutation_rate, true)?;
        fraction("predictor.offspring_elite", predictor.offspring_elite, true)?;
        fraction("predictor.offspring_combine", predictor.offspring_combine, true)?;
        if predictor.size > predictor.max_size {
            return Err(ConfigError::InvalidFraction {
                name: "predictor.size",
                value: predictor.size,
            });
        }
        if predictor.population_size < 2 {
            return Err(ConfigError::PopulationTooSmall("predictor"));
        }
        if predictor.archive_size == 0 {
            return Err(ConfigError::ArchiveEmpty("predictor"));
        }
        if predictor.offset_candidates == 0 {
            return Err(ConfigError::InvalidOffsetCandidates);
        }

        let baldwin = &self.baldwin;
        if baldwin.zero_epsilon < 0.0
            || baldwin.slow_threshold < 0.0
            || baldwin.change_tolerance < 0.0
        {
            return Err(ConfigError::InvalidBaldwin(
                "thresholds must be non-negative".to_string(),
            ));
        }
        if baldwin.inaccuracy_tolerance <= 0.0 {
            return Err(ConfigError::InvalidBaldwin(
                "inaccuracy tolerance must be positive".to_string(),
            ));
        }
        let coefficients = [
            baldwin.inaccuracy_coefficient,
            baldwin.zero_coefficient,
            baldwin.decrease_coefficient,
            baldwin.increase_slow_coefficient,
            baldwin.increase_fast_coefficient,
        ];
        if coefficients.iter().any(|c| !c.is_finite() || *c <= 0.0) {
            return Err(ConfigError::InvalidBaldwin(
                "coefficients must be positive".to_string(),
            ));
        }

        if !(self.dataset.epsilon > 0.0) {
            return Err(ConfigError::InvalidEpsilon);
        }
        if self.target_fitness.is_some_and(|t| !t.is_finite()) {
            return Err(ConfigError::InvalidTarget);
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("CGP grid (cols, rows, levels_back) must be non-zero")]
    InvalidGrid,
    #[error("{0} population size must be at least 2")]
    PopulationTooSmall(&'static str),
    #[error("CGP mutation must change at least one gene")]
    InvalidMutation,
    #[error("{0} archive size must be non-zero")]
    ArchiveEmpty(&'static str),
    #[error("Allowed function list is empty")]
    EmptyFunctionSet,
    #[error("{name} = {value} is outside its valid range")]
    InvalidFraction { name: &'static str, value: f64 },
    #[error("Circular predictors need at least one offset candidate")]
    InvalidOffsetCandidates,
    #[error("Invalid Baldwin settings: {0}")]
    InvalidBaldwin(String),
    #[error("Symbolic regression epsilon must be positive")]
    InvalidEpsilon,
    #[error("Target fitness must be finite")]
    InvalidTarget,
}
