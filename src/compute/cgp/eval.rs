//! Circuit evaluation.
//!
//! The scalar path evaluates one fitness case and may cure failing nodes in
//! place; the lane path evaluates up to [`MAX_LANES`] cases at once and never
//! touches the genome. A lane batch that hits an exceptional value reports
//! it and leaves curing to the scalar path.

use super::functions::{FunctionSet, MAX_LANES};
use super::genotype::{CgpGenome, CgpShape, Node};

/// Output of a single node evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeOutput<V> {
    pub value: V,
    /// The node was turned into a constant; the current batch is stale.
    pub genome_mutated: bool,
}

/// Result of a scalar circuit evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Outputs were written.
    Complete,
    /// A node was cured; every case evaluated so far must be redone.
    Restart,
}

/// Result of a lane-batched circuit evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneStep {
    Complete,
    /// Some lane produced an exceptional value; nothing was cured.
    Exceptional,
}

impl<V: Copy> Node<V> {
    /// Evaluate this node, replacing its function with a constant if the
    /// result is exceptional.
    pub fn output<F: FunctionSet<Value = V>>(&mut self, a: V, b: V) -> NodeOutput<V> {
        if let Some(value) = self.constant {
            return NodeOutput {
                value,
                genome_mutated: false,
            };
        }

        let value = F::apply(self.function, a, b);
        match F::recover(value) {
            Some(fallback) => {
                self.constant = Some(fallback);
                NodeOutput {
                    value: fallback,
                    genome_mutated: true,
                }
            }
            None => NodeOutput {
                value,
                genome_mutated: false,
            },
        }
    }
}

/// Scratch buffers for evaluating one genome.
#[derive(Debug, Clone)]
pub struct Workspace<V> {
    pub values: Vec<V>,
    pub outputs: Vec<V>,
    pub lane_values: Vec<[V; MAX_LANES]>,
    pub lane_outputs: Vec<[V; MAX_LANES]>,
}

impl<V: Copy + Default> Workspace<V> {
    pub fn new(shape: &CgpShape) -> Self {
        Self {
            values: vec![V::default(); shape.value_count()],
            outputs: vec![V::default(); shape.outputs],
            lane_values: vec![[V::default(); MAX_LANES]; shape.value_count()],
            lane_outputs: vec![[V::default(); MAX_LANES]; shape.outputs],
        }
    }
}

impl<F: FunctionSet> CgpGenome<F> {
    /// Evaluate one fitness case.
    ///
    /// Inactive nodes are skipped. On [`Step::Restart`] the outputs are not
    /// written.
    pub fn evaluate(
        &mut self,
        inputs: &[F::Value],
        values: &mut [F::Value],
        outputs: &mut [F::Value],
    ) -> Step {
        let input_count = self.input_count();
        values[..input_count].copy_from_slice(&inputs[..input_count]);

        for (i, node) in self.nodes_mut().iter_mut().enumerate() {
            if !node.active {
                continue;
            }
            let a = values[node.inputs[0]];
            let b = values[node.inputs[1]];
            let out = node.output::<F>(a, b);
            if out.genome_mutated {
                return Step::Restart;
            }
            values[input_count + i] = out.value;
        }

        for (output, &selected) in outputs.iter_mut().zip(self.outputs()) {
            *output = values[selected];
        }
        Step::Complete
    }

    /// Evaluate `lanes` fitness cases at once.
    ///
    /// Primary inputs must already be in `values[..inputs]`.
    pub fn evaluate_lanes(
        &self,
        lanes: usize,
        values: &mut [[F::Value; MAX_LANES]],
        outputs: &mut [[F::Value; MAX_LANES]],
    ) -> LaneStep {
        debug_assert!(lanes <= MAX_LANES);
        let input_count = self.input_count();

        for (i, node) in self.nodes().iter().enumerate() {
            if !node.active {
                continue;
            }

            let mut out = [F::Value::default(); MAX_LANES];
            match node.constant {
                Some(constant) => out[..lanes].fill(constant),
                None => {
                    let a = values[node.inputs[0]];
                    let b = values[node.inputs[1]];
                    for lane in 0..lanes {
                        let value = F::apply(node.function, a[lane], b[lane]);
                        if F::recover(value).is_some() {
                            return LaneStep::Exceptional;
                        }
                        out[lane] = value;
                    }
                }
            }
            values[input_count + i] = out;
        }

        for (output, &selected) in outputs.iter_mut().zip(self.outputs()) {
            *output = values[selected];
        }
        LaneStep::Complete
    }

    /// Evaluate a single input vector to completion, curing as needed.
    pub fn outputs_for(&mut self, inputs: &[F::Value]) -> Vec<F::Value> {
        let mut values = vec![F::Value::default(); self.input_count() + self.nodes().len()];
        let mut outputs = vec![F::Value::default(); self.outputs().len()];

        // Every restart cures one node, so this is bounded by the node count.
        for _ in 0..=self.nodes().len() {
            if self.evaluate(inputs, &mut values, &mut outputs) == Step::Complete {
                break;
            }
        }
        outputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::cgp::functions::{
        FilterOp, INFINITY_SENTINEL, NAN_SENTINEL, PixelFilter, Symbolic, SymbolicOp,
    };
    use crate::compute::cgp::genotype::CgpLayout;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_identity_circuit() {
        let layout = CgpLayout::<PixelFilter>::new(CgpShape::new(2, 1, 1, 1, 1), None).unwrap();
        let mut genome =
            CgpGenome::from_genes(&layout, &[([0, 1], FilterOp::Identity as u8)], &[2]).unwrap();

        assert_eq!(genome.outputs_for(&[5, 9]), vec![5]);
        assert!(genome.nodes()[0].active);
    }

    #[test]
    fn test_output_selecting_primary_input() {
        let layout = CgpLayout::<Symbolic>::new(CgpShape::new(2, 1, 1, 1, 1), None).unwrap();
        let mut genome = CgpGenome::from_genes(&layout, &[([0, 0], 0)], &[1]).unwrap();

        assert_eq!(genome.active_count(), 0);
        assert_eq!(genome.outputs_for(&[5.0, 9.0]), vec![9.0]);
    }

    #[test]
    fn test_division_by_zero_restarts_once() {
        let layout = CgpLayout::<Symbolic>::new(CgpShape::new(1, 1, 2, 1, 2), None).unwrap();
        // n0 = x - x; n1 = x / n0
        let mut genome = CgpGenome::from_genes(
            &layout,
            &[([0, 0], SymbolicOp::Sub as u8), ([0, 1], SymbolicOp::Div as u8)],
            &[2],
        )
        .unwrap();
        let mut workspace = Workspace::new(layout.shape());

        let first = genome.evaluate(&[3.0], &mut workspace.values, &mut workspace.outputs);
        assert_eq!(first, Step::Restart);
        assert_eq!(genome.nodes()[1].constant, Some(INFINITY_SENTINEL));

        let second = genome.evaluate(&[3.0], &mut workspace.values, &mut workspace.outputs);
        assert_eq!(second, Step::Complete);
        assert_eq!(workspace.outputs[0], INFINITY_SENTINEL);
    }

    #[test]
    fn test_nan_sentinel() {
        let layout = CgpLayout::<Symbolic>::new(CgpShape::new(1, 1, 1, 1, 1), None).unwrap();
        let mut genome =
            CgpGenome::from_genes(&layout, &[([0, 0], SymbolicOp::Log as u8)], &[1]).unwrap();

        assert_eq!(genome.outputs_for(&[-2.0]), vec![NAN_SENTINEL]);
        // Cured nodes stay constant for every later input.
        assert_eq!(genome.outputs_for(&[1.0]), vec![NAN_SENTINEL]);
    }

    #[test]
    fn test_lanes_match_scalar() {
        let layout = CgpLayout::<PixelFilter>::new(CgpShape::new(9, 1, 8, 4, 3), None).unwrap();
        let mut rng = StdRng::seed_from_u64(21);
        let mut workspace = Workspace::new(layout.shape());

        for _ in 0..20 {
            let mut genome = CgpGenome::<PixelFilter>::new(layout.shape());
            genome.randomize(&layout, &mut rng);

            let cases: Vec<[u8; 9]> = (0..PixelFilter::LANES)
                .map(|c| std::array::from_fn(|i| (c * 31 + i * 17) as u8))
                .collect();
            for (lane, case) in cases.iter().enumerate() {
                for (input, &value) in case.iter().enumerate() {
                    workspace.lane_values[input][lane] = value;
                }
            }

            let step = genome.evaluate_lanes(
                PixelFilter::LANES,
                &mut workspace.lane_values,
                &mut workspace.lane_outputs,
            );
            assert_eq!(step, LaneStep::Complete);

            for (lane, case) in cases.iter().enumerate() {
                let scalar = genome.outputs_for(case);
                assert_eq!(scalar[0], workspace.lane_outputs[0][lane]);
            }
        }
    }

    #[test]
    fn test_lanes_report_exceptions_without_curing() {
        let layout = CgpLayout::<Symbolic>::new(CgpShape::new(1, 1, 1, 1, 1), None).unwrap();
        let genome =
            CgpGenome::from_genes(&layout, &[([0, 0], SymbolicOp::Log as u8)], &[1]).unwrap();
        let mut workspace = Workspace::new(layout.shape());
        workspace.lane_values[0][..4].copy_from_slice(&[1.0, 2.0, -1.0, 3.0]);

        let step =
            genome.evaluate_lanes(4, &mut workspace.lane_values, &mut workspace.lane_outputs);
        assert_eq!(step, LaneStep::Exceptional);
        assert_eq!(genome.nodes()[0].constant, None);
    }
}
