//! Fitness cases and batch evaluation.
//!
//! A [`Dataset`] supplies per-case inputs and scores per-case outputs.
//! [`evaluate_cases`] runs a genome over all cases or over a predictor's
//! subset, restarting from the first case whenever the genome cures a node.

use std::fs;
use std::io::Write;
use std::path::Path;

use log::warn;

use super::cgp::{CgpGenome, FunctionSet, LaneStep, PixelFilter, Step, Symbolic, Workspace};
use super::evolution::Fitness;
pub use crate::schema::EvalMode;

/// Value type of a dataset's function set.
pub type DatasetValue<D> = <<D as Dataset>::Functions as FunctionSet>::Value;

/// Errors loading or building a dataset.
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("Malformed data file: {0}")]
    Malformed(String),
    #[error("Dataset has no fitness cases")]
    Empty,
    #[error("Image buffers do not match: {0}")]
    ImageMismatch(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fitness cases for one problem.
pub trait Dataset: Send + Sync {
    type Functions: FunctionSet;

    /// Primary inputs per case.
    fn input_count(&self) -> usize;

    /// Circuit outputs per case.
    fn output_count(&self) -> usize;

    fn case_count(&self) -> usize;

    /// Primary input values of one case.
    fn inputs(&self, case: usize) -> &[DatasetValue<Self>];

    /// Score contribution of one case's outputs.
    fn contribution(&self, case: usize, outputs: &[DatasetValue<Self>]) -> f64;

    /// Turn the summed contributions of `cases` cases into a fitness value.
    fn aggregate(&self, total: f64, cases: usize) -> Fitness;

    /// Fitness assigned when evaluation cannot complete.
    fn worst_fitness(&self) -> Fitness {
        0.0
    }
}

/// Which fitness cases to evaluate.
#[derive(Debug, Clone, Copy)]
pub enum Cases<'a> {
    All,
    Subset(&'a [u32]),
}

impl Cases<'_> {
    fn len<D: Dataset + ?Sized>(&self, dataset: &D) -> usize {
        match self {
            Cases::All => dataset.case_count(),
            Cases::Subset(indices) => indices.len(),
        }
    }

    fn case(&self, i: usize) -> usize {
        match self {
            Cases::All => i,
            Cases::Subset(indices) => indices[i] as usize,
        }
    }
}

/// Outcome of evaluating a genome over a set of cases.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaseEvaluation {
    pub fitness: Fitness,
    /// Circuit evaluations performed, restarted cases included.
    pub evaluated: u64,
}

/// Evaluate `genome` over `cases`.
///
/// Both modes give identical fitness and cure the same nodes.
pub fn evaluate_cases<D: Dataset + ?Sized>(
    genome: &mut CgpGenome<D::Functions>,
    dataset: &D,
    cases: Cases<'_>,
    mode: EvalMode,
    workspace: &mut Workspace<DatasetValue<D>>,
) -> CaseEvaluation {
    let count = cases.len(dataset);
    if count == 0 {
        return CaseEvaluation {
            fitness: dataset.worst_fitness(),
            evaluated: 0,
        };
    }

    let mut evaluated = 0;
    // Each restart cures a node and cured nodes never fail again.
    let max_restarts = genome.nodes().len() + 1;
    for _ in 0..=max_restarts {
        let total = match mode {
            EvalMode::Scalar => scalar_pass(genome, dataset, cases, workspace, &mut evaluated),
            EvalMode::Batched => lane_pass(genome, dataset, cases, workspace, &mut evaluated),
        };
        if let Some(total) = total {
            return CaseEvaluation {
                fitness: dataset.aggregate(total, count),
                evaluated,
            };
        }
    }

    warn!("Evaluation restarted more than {max_restarts} times, assigning worst fitness");
    CaseEvaluation {
        fitness: dataset.worst_fitness(),
        evaluated,
    }
}

fn scalar_pass<D: Dataset + ?Sized>(
    genome: &mut CgpGenome<D::Functions>,
    dataset: &D,
    cases: Cases<'_>,
    workspace: &mut Workspace<DatasetValue<D>>,
    evaluated: &mut u64,
) -> Option<f64> {
    let mut total = 0.0;
    for i in 0..cases.len(dataset) {
        let case = cases.case(i);
        *evaluated += 1;
        match genome.evaluate(dataset.inputs(case), &mut workspace.values, &mut workspace.outputs) {
            Step::Restart => return None,
            Step::Complete => total += dataset.contribution(case, &workspace.outputs),
        }
    }
    Some(total)
}

fn lane_pass<D: Dataset + ?Sized>(
    genome: &mut CgpGenome<D::Functions>,
    dataset: &D,
    cases: Cases<'_>,
    workspace: &mut Workspace<DatasetValue<D>>,
    evaluated: &mut u64,
) -> Option<f64> {
    let count = cases.len(dataset);
    let lanes = D::Functions::LANES;
    let mut total = 0.0;

    let mut start = 0;
    while start < count {
        let width = lanes.min(count - start);
        for lane in 0..width {
            let inputs = dataset.inputs(cases.case(start + lane));
            for (slot, &value) in workspace.lane_values.iter_mut().zip(inputs) {
                slot[lane] = value;
            }
        }
        *evaluated += width as u64;

        let step =
            genome.evaluate_lanes(width, &mut workspace.lane_values, &mut workspace.lane_outputs);
        match step {
            LaneStep::Complete => {
                for lane in 0..width {
                    for (output, lane_output) in
                        workspace.outputs.iter_mut().zip(&workspace.lane_outputs)
                    {
                        *output = lane_output[lane];
                    }
                    total += dataset.contribution(cases.case(start + lane), &workspace.outputs);
                }
            }
            LaneStep::Exceptional => {
                // Replay the batch in case order so curing matches the scalar path.
                for lane in 0..width {
                    let case = cases.case(start + lane);
                    *evaluated += 1;
                    let step = genome.evaluate(
                        dataset.inputs(case),
                        &mut workspace.values,
                        &mut workspace.outputs,
                    );
                    match step {
                        Step::Restart => return None,
                        Step::Complete => total += dataset.contribution(case, &workspace.outputs),
                    }
                }
            }
        }
        start += width;
    }
    Some(total)
}

/// Symbolic regression cases: `100 * hits / cases`, where a hit is an
/// output within `epsilon` of the target.
#[derive(Debug, Clone)]
pub struct SymbolicDataset {
    variables: usize,
    inputs: Vec<f64>,
    targets: Vec<f64>,
    epsilon: f64,
}

impl SymbolicDataset {
    /// Build from row-major inputs (`variables` per case) and one target per case.
    pub fn new(
        variables: usize,
        inputs: Vec<f64>,
        targets: Vec<f64>,
        epsilon: f64,
    ) -> Result<Self, DatasetError> {
        if targets.is_empty() {
            return Err(DatasetError::Empty);
        }
        if variables == 0 || inputs.len() != variables * targets.len() {
            return Err(DatasetError::Malformed(format!(
                "{} input values for {} cases of {} variables",
                inputs.len(),
                targets.len(),
                variables
            )));
        }
        Ok(Self {
            variables,
            inputs,
            targets,
            epsilon,
        })
    }

    /// Sample `target` on an evenly spaced grid over [-1, 1].
    pub fn from_fn(
        variables: usize,
        cases: usize,
        epsilon: f64,
        target: impl Fn(&[f64]) -> f64,
    ) -> Self {
        let step = 2.0 / cases.saturating_sub(1).max(1) as f64;
        let mut inputs = Vec::with_capacity(cases * variables);
        let mut targets = Vec::with_capacity(cases);
        for case in 0..cases {
            let row: Vec<f64> = (0..variables)
                .map(|v| -1.0 + step * ((case * (v + 1)) % cases.max(1)) as f64)
                .collect();
            targets.push(target(&row));
            inputs.extend(row);
        }
        Self {
            variables,
            inputs,
            targets,
            epsilon,
        }
    }

    /// Parse the `cases variables` header followed by one row per case,
    /// inputs first and the target last.
    pub fn parse(text: &str, epsilon: f64) -> Result<Self, DatasetError> {
        let mut tokens = text.split_whitespace();
        let mut header = |name: &str| -> Result<usize, DatasetError> {
            tokens
                .next()
                .ok_or_else(|| DatasetError::Malformed(format!("missing {name} in header")))?
                .parse()
                .map_err(|_| DatasetError::Malformed(format!("invalid {name} in header")))
        };
        let cases = header("case count")?;
        let variables = header("variable count")?;
        let expected = variables
            .checked_add(1)
            .and_then(|width| cases.checked_mul(width))
            .ok_or_else(|| {
                DatasetError::Malformed(format!("{cases} cases of {variables} variables"))
            })?;

        let values = tokens
            .map(|t| {
                t.parse::<f64>()
                    .map_err(|_| DatasetError::Malformed(format!("invalid number '{t}'")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if values.len() != expected {
            return Err(DatasetError::Malformed(format!(
                "expected {expected} values for {cases} cases, found {}",
                values.len()
            )));
        }

        let mut inputs = Vec::with_capacity(cases * variables);
        let mut targets = Vec::with_capacity(cases);
        for row in values.chunks_exact(variables + 1) {
            inputs.extend_from_slice(&row[..variables]);
            targets.push(row[variables]);
        }
        Self::new(variables, inputs, targets, epsilon)
    }

    pub fn load(path: impl AsRef<Path>, epsilon: f64) -> Result<Self, DatasetError> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text, epsilon)
    }

    /// Write in the format accepted by [`SymbolicDataset::parse`].
    pub fn save(&self, mut writer: impl Write) -> Result<(), DatasetError> {
        writeln!(writer, "{} {}", self.targets.len(), self.variables)?;
        for (row, target) in self.inputs.chunks_exact(self.variables).zip(&self.targets) {
            for value in row {
                write!(writer, "{value}\t")?;
            }
            writeln!(writer, "{target}")?;
        }
        Ok(())
    }

    pub fn target(&self, case: usize) -> f64 {
        self.targets[case]
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }
}

impl Dataset for SymbolicDataset {
    type Functions = Symbolic;

    fn input_count(&self) -> usize {
        self.variables
    }

    fn output_count(&self) -> usize {
        1
    }

    fn case_count(&self) -> usize {
        self.targets.len()
    }

    fn inputs(&self, case: usize) -> &[f64] {
        &self.inputs[case * self.variables..(case + 1) * self.variables]
    }

    fn contribution(&self, case: usize, outputs: &[f64]) -> f64 {
        if (self.targets[case] - outputs[0]).abs() < self.epsilon {
            1.0
        } else {
            0.0
        }
    }

    fn aggregate(&self, total: f64, cases: usize) -> Fitness {
        100.0 * total / cases as f64
    }
}

/// Pixels in a filter window.
pub const WINDOW_SIZE: usize = 9;

/// Image filter cases: one 3x3 window of the noisy image per pixel, scored
/// PSNR-style against the original image.
#[derive(Debug, Clone)]
pub struct FilterDataset {
    width: usize,
    height: usize,
    windows: Vec<[u8; WINDOW_SIZE]>,
    original: Vec<u8>,
}

impl FilterDataset {
    /// Build from two row-major grayscale buffers of equal size.
    ///
    /// Windows at the border repeat the nearest edge pixel.
    pub fn from_images(
        width: usize,
        height: usize,
        original: &[u8],
        noisy: &[u8],
    ) -> Result<Self, DatasetError> {
        if width == 0 || height == 0 {
            return Err(DatasetError::Empty);
        }
        let expected = width * height;
        if original.len() != expected || noisy.len() != expected {
            return Err(DatasetError::ImageMismatch(format!(
                "{width}x{height} needs {expected} pixels, got {} and {}",
                original.len(),
                noisy.len()
            )));
        }

        let pixel = |x: isize, y: isize| {
            let x = x.clamp(0, width as isize - 1) as usize;
            let y = y.clamp(0, height as isize - 1) as usize;
            noisy[y * width + x]
        };
        let windows = (0..expected)
            .map(|i| {
                let (x, y) = ((i % width) as isize, (i / width) as isize);
                std::array::from_fn(|k| {
                    let (dx, dy) = ((k % 3) as isize - 1, (k / 3) as isize - 1);
                    pixel(x + dx, y + dy)
                })
            })
            .collect();

        Ok(Self {
            width,
            height,
            windows,
            original: original.to_vec(),
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Run the filter over every window, producing the filtered image.
    pub fn apply(&self, genome: &mut CgpGenome<PixelFilter>) -> Vec<u8> {
        self.windows
            .iter()
            .map(|window| genome.outputs_for(window)[0])
            .collect()
    }
}

impl Dataset for FilterDataset {
    type Functions = PixelFilter;

    fn input_count(&self) -> usize {
        WINDOW_SIZE
    }

    fn output_count(&self) -> usize {
        1
    }

    fn case_count(&self) -> usize {
        self.windows.len()
    }

    fn inputs(&self, case: usize) -> &[u8] {
        &self.windows[case]
    }

    fn contribution(&self, case: usize, outputs: &[u8]) -> f64 {
        let diff = outputs[0] as f64 - self.original[case] as f64;
        diff * diff
    }

    fn aggregate(&self, total: f64, cases: usize) -> Fitness {
        255.0 * 255.0 * cases as f64 / total.max(1.0)
    }
}
