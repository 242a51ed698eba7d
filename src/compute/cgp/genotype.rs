//! Cartesian graph genotype.
//!
//! Nodes are laid out column by column; node `i` lives in column
//! `i / rows`. Value indices `0..inputs` address primary inputs and
//! `inputs + i` addresses the output of node `i`.

use std::marker::PhantomData;

use rand::Rng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use super::functions::FunctionSet;
use crate::compute::evolution::GenomeError;

/// Genes per node: two inputs and a function.
pub const GENES_PER_NODE: usize = 3;

/// Node inputs.
pub const NODE_INPUTS: usize = 2;

/// Dimensions of a CGP grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CgpShape {
    pub inputs: usize,
    pub outputs: usize,
    pub cols: usize,
    pub rows: usize,
    pub levels_back: usize,
}

impl CgpShape {
    pub fn new(
        inputs: usize,
        outputs: usize,
        cols: usize,
        rows: usize,
        levels_back: usize,
    ) -> Self {
        Self {
            inputs,
            outputs,
            cols,
            rows,
            levels_back,
        }
    }

    pub fn node_count(&self) -> usize {
        self.cols * self.rows
    }

    /// Number of addressable values (primary inputs plus node outputs).
    pub fn value_count(&self) -> usize {
        self.inputs + self.node_count()
    }

    /// Length of the linearized gene space.
    pub fn genome_length(&self) -> usize {
        self.node_count() * GENES_PER_NODE + self.outputs
    }

    /// First gene index belonging to an output selector.
    pub fn output_genes_offset(&self) -> usize {
        self.node_count() * GENES_PER_NODE
    }

    pub fn node_column(&self, node: usize) -> usize {
        node / self.rows
    }

    fn validate(&self) -> Result<(), GenomeError> {
        if self.inputs == 0 || self.outputs == 0 {
            return Err(GenomeError::InvalidShape(
                "circuit needs at least one input and one output".to_string(),
            ));
        }
        if self.cols == 0 || self.rows == 0 {
            return Err(GenomeError::InvalidShape(format!(
                "grid {}x{} has no nodes",
                self.cols, self.rows
            )));
        }
        if self.levels_back == 0 {
            return Err(GenomeError::InvalidShape(
                "levels-back must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Shape plus precomputed allele tables shared by every genome of a run.
#[derive(Debug, Clone)]
pub struct CgpLayout<F> {
    shape: CgpShape,
    allowed_inputs: Vec<Vec<usize>>,
    allowed_functions: Vec<u8>,
    _functions: PhantomData<F>,
}

impl<F: FunctionSet> CgpLayout<F> {
    /// Build the layout, optionally restricting function mutation to a subset.
    pub fn new(shape: CgpShape, allowed_functions: Option<&[u8]>) -> Result<Self, GenomeError> {
        shape.validate()?;

        let allowed_functions = match allowed_functions {
            Some(subset) => {
                if subset.is_empty() {
                    return Err(GenomeError::InvalidShape(
                        "allowed function subset is empty".to_string(),
                    ));
                }
                if let Some(bad) = subset.iter().find(|&&f| f >= F::COUNT) {
                    return Err(GenomeError::InvalidShape(format!(
                        "function id {bad} out of range (0..{})",
                        F::COUNT
                    )));
                }
                subset.to_vec()
            }
            None => (0..F::COUNT).collect(),
        };

        let allowed_inputs = (0..shape.cols)
            .map(|col| {
                let minimum = shape.inputs + shape.rows * col.saturating_sub(shape.levels_back);
                let maximum = shape.inputs + shape.rows * col;
                (0..shape.inputs).chain(minimum..maximum).collect()
            })
            .collect();

        Ok(Self {
            shape,
            allowed_inputs,
            allowed_functions,
            _functions: PhantomData,
        })
    }

    pub fn shape(&self) -> &CgpShape {
        &self.shape
    }

    /// Values a node in column `col` may reference.
    pub fn allowed_inputs(&self, col: usize) -> &[usize] {
        &self.allowed_inputs[col]
    }

    pub fn allowed_functions(&self) -> &[u8] {
        &self.allowed_functions
    }

    /// Whether `value` is a legal input reference for `node`.
    pub fn is_valid_input(&self, node: usize, value: usize) -> bool {
        let col = self.shape.node_column(node);
        self.allowed_inputs[col].contains(&value)
    }
}

/// A function node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Node<V> {
    pub inputs: [usize; NODE_INPUTS],
    pub function: u8,
    /// Reachable from an output selector. Derived.
    pub active: bool,
    /// Cured output replacing the function after a numeric failure.
    pub constant: Option<V>,
}

impl<V> Default for Node<V> {
    fn default() -> Self {
        Self {
            inputs: [0; NODE_INPUTS],
            function: 0,
            active: false,
            constant: None,
        }
    }
}

/// CGP genome: nodes plus output selectors.
#[derive(Debug, Clone, PartialEq)]
pub struct CgpGenome<F: FunctionSet> {
    nodes: Vec<Node<F::Value>>,
    outputs: Vec<usize>,
    inputs: usize,
}

impl<F: FunctionSet> CgpGenome<F> {
    /// Zeroed genome of the layout's shape.
    pub fn new(shape: &CgpShape) -> Self {
        Self {
            nodes: vec![Node::default(); shape.node_count()],
            outputs: vec![0; shape.outputs],
            inputs: shape.inputs,
        }
    }

    /// Build a genome from explicit genes, validating every reference.
    ///
    /// Each node is `(inputs, function)`.
    pub fn from_genes(
        layout: &CgpLayout<F>,
        nodes: &[([usize; NODE_INPUTS], u8)],
        outputs: &[usize],
    ) -> Result<Self, GenomeError> {
        let shape = layout.shape();
        if nodes.len() != shape.node_count() || outputs.len() != shape.outputs {
            return Err(GenomeError::InvalidShape(format!(
                "expected {} nodes and {} outputs, got {} and {}",
                shape.node_count(),
                shape.outputs,
                nodes.len(),
                outputs.len()
            )));
        }

        let mut genome = Self::new(shape);
        for (i, &(inputs, function)) in nodes.iter().enumerate() {
            if function >= F::COUNT {
                return Err(GenomeError::InvalidShape(format!(
                    "node {i} uses unknown function {function}"
                )));
            }
            if let Some(bad) = inputs.iter().find(|&&v| !layout.is_valid_input(i, v)) {
                return Err(GenomeError::InvalidShape(format!(
                    "node {i} references value {bad} outside its levels-back window"
                )));
            }
            genome.nodes[i].inputs = inputs;
            genome.nodes[i].function = function;
        }
        if let Some(bad) = outputs.iter().find(|&&o| o >= shape.value_count()) {
            return Err(GenomeError::InvalidShape(format!(
                "output selector {bad} out of range"
            )));
        }
        genome.outputs.copy_from_slice(outputs);
        genome.find_active_blocks();
        Ok(genome)
    }

    pub fn nodes(&self) -> &[Node<F::Value>] {
        &self.nodes
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut [Node<F::Value>] {
        &mut self.nodes
    }

    pub fn outputs(&self) -> &[usize] {
        &self.outputs
    }

    pub fn input_count(&self) -> usize {
        self.inputs
    }

    /// Number of nodes currently reachable from an output.
    pub fn active_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.active).count()
    }

    /// Replace the allele at `gene` with a random one.
    ///
    /// Returns whether the mutated locus belongs to an active node or an
    /// output selector. Active flags are not recomputed here.
    pub fn randomize_gene(&mut self, layout: &CgpLayout<F>, gene: usize, rng: &mut StdRng) -> bool {
        let shape = layout.shape();
        assert!(gene < shape.genome_length(), "gene {gene} out of range");

        if gene < shape.output_genes_offset() {
            let node_index = gene / GENES_PER_NODE;
            let locus = gene % GENES_PER_NODE;
            let col = shape.node_column(node_index);
            let node = &mut self.nodes[node_index];

            if locus == NODE_INPUTS {
                if let Some(&function) = layout.allowed_functions().choose(rng) {
                    node.function = function;
                }
            } else if let Some(&value) = layout.allowed_inputs(col).choose(rng) {
                node.inputs[locus] = value;
            }
            node.constant = None;
            node.active
        } else {
            let index = gene - shape.output_genes_offset();
            self.outputs[index] = rng.gen_range(0..shape.value_count());
            true
        }
    }

    /// Overwrite every gene with a random allele.
    pub fn randomize(&mut self, layout: &CgpLayout<F>, rng: &mut StdRng) {
        for gene in 0..layout.shape().genome_length() {
            self.randomize_gene(layout, gene, rng);
        }
        self.find_active_blocks();
    }

    /// Point-mutate between 1 and `max_genes` random loci.
    ///
    /// Returns whether any active locus was touched.
    pub fn mutate(&mut self, layout: &CgpLayout<F>, max_genes: usize, rng: &mut StdRng) -> bool {
        let length = layout.shape().genome_length();
        let count = rng.gen_range(1..=max_genes.clamp(1, length));
        let mut phenotype_changed = false;
        for _ in 0..count {
            let gene = rng.gen_range(0..length);
            phenotype_changed |= self.randomize_gene(layout, gene, rng);
        }
        self.find_active_blocks();
        phenotype_changed
    }

    /// Mark the nodes transitively reachable from an output selector.
    ///
    /// Only the first `arity(function)` inputs of a node are followed.
    pub fn find_active_blocks(&mut self) {
        let inputs = self.inputs;
        for node in &mut self.nodes {
            node.active = false;
        }

        for &selected in &self.outputs {
            if let Some(index) = selected.checked_sub(inputs) {
                self.nodes[index].active = true;
            }
        }

        for i in (0..self.nodes.len()).rev() {
            if !self.nodes[i].active {
                continue;
            }
            let node = self.nodes[i];
            for &value in &node.inputs[..F::arity(node.function)] {
                if let Some(index) = value.checked_sub(inputs) {
                    self.nodes[index].active = true;
                }
            }
        }
    }
}
