//! Chromosome and population text records.
//!
//! A chromosome is written in CGP-viewer notation:
//!
//! ```text
//! {inputs, outputs, cols, rows, node_inputs, 1, function_count}([id] in0, in1, fn)...(out0, out1)
//! ```
//!
//! A population record prefixes the generation, best index and size, then
//! one `Fitness:` line plus chromosome per individual.

use std::io::Write;

use super::VaultError;
use super::hexfloat;
use crate::compute::cgp::{CgpGenome, CgpLayout, CgpShape, FunctionSet, NODE_INPUTS};
use crate::compute::evolution::{FitnessCache, Individual};

/// Write `genome` in CGP-viewer notation, without a trailing newline.
pub fn write_chromosome<F: FunctionSet, W: Write>(
    writer: &mut W,
    genome: &CgpGenome<F>,
    shape: &CgpShape,
) -> std::io::Result<()> {
    write!(
        writer,
        "{{{}, {}, {}, {}, {}, 1, {}}}",
        shape.inputs, shape.outputs, shape.cols, shape.rows, NODE_INPUTS, F::COUNT
    )?;
    for (i, node) in genome.nodes().iter().enumerate() {
        write!(
            writer,
            "([{}] {}, {}, {})",
            shape.inputs + i,
            node.inputs[0],
            node.inputs[1],
            node.function
        )?;
    }
    let outputs: Vec<String> = genome.outputs().iter().map(|o| o.to_string()).collect();
    write!(writer, "({})", outputs.join(", "))
}

/// Parse one chromosome in CGP-viewer notation.
pub fn parse_chromosome<F: FunctionSet>(
    text: &str,
    layout: &CgpLayout<F>,
) -> Result<CgpGenome<F>, VaultError> {
    let mut scanner = Scanner::new(text);
    let genome = scan_chromosome(&mut scanner, layout)?;
    scanner.finish()?;
    Ok(genome)
}

/// Population contents as stored on disk.
#[derive(Debug, Clone)]
pub struct PopulationRecord<F: FunctionSet> {
    pub generation: u64,
    pub best_index: usize,
    pub individuals: Vec<Individual<CgpGenome<F>>>,
}

/// Write a population record.
pub fn write_population<F: FunctionSet, W: Write>(
    writer: &mut W,
    generation: u64,
    best_index: usize,
    individuals: &[Individual<CgpGenome<F>>],
    shape: &CgpShape,
) -> std::io::Result<()> {
    writeln!(writer, "Generation: {generation}")?;
    writeln!(writer, "Best chromosome index: {best_index}")?;
    writeln!(writer, "Chromosomes: {}", individuals.len())?;
    for individual in individuals {
        match individual.fitness.get() {
            Some(value) => writeln!(writer, "Fitness: Y {}", hexfloat::format(value))?,
            None => writeln!(writer, "Fitness: N")?,
        }
        write_chromosome(writer, &individual.genome, shape)?;
        writeln!(writer)?;
    }
    Ok(())
}

/// Parse a population record written by [`write_population`].
pub fn parse_population<F: FunctionSet>(
    text: &str,
    layout: &CgpLayout<F>,
) -> Result<PopulationRecord<F>, VaultError> {
    let mut scanner = Scanner::new(text);
    scanner.expect("Generation:")?;
    let generation = scanner.number()? as u64;
    scanner.expect("Best chromosome index:")?;
    let best_index = scanner.number()?;
    scanner.expect("Chromosomes:")?;
    let size = scanner.number()?;

    if size == 0 || best_index >= size {
        return Err(VaultError::Malformed(format!(
            "best index {best_index} invalid for {size} chromosomes"
        )));
    }

    // The count is untrusted; a short record fails at the first missing entry.
    let mut individuals = Vec::new();
    for _ in 0..size {
        scanner.expect("Fitness:")?;
        let fitness = match scanner.word()? {
            "Y" => {
                let word = scanner.word()?;
                let value = hexfloat::parse(word)
                    .ok_or_else(|| VaultError::Malformed(format!("bad fitness value {word:?}")))?;
                FitnessCache::valid(value)
            }
            "N" => FitnessCache::default(),
            other => {
                return Err(VaultError::Malformed(format!(
                    "expected Y or N after Fitness:, found {other:?}"
                )));
            }
        };
        let genome = scan_chromosome(&mut scanner, layout)?;
        individuals.push(Individual { genome, fitness });
    }
    scanner.finish()?;

    Ok(PopulationRecord {
        generation,
        best_index,
        individuals,
    })
}

fn scan_chromosome<F: FunctionSet>(
    scanner: &mut Scanner<'_>,
    layout: &CgpLayout<F>,
) -> Result<CgpGenome<F>, VaultError> {
    let shape = layout.shape();

    scanner.expect("{")?;
    let mut header = [0usize; 7];
    for (i, value) in header.iter_mut().enumerate() {
        if i > 0 {
            scanner.expect(",")?;
        }
        *value = scanner.number()?;
    }
    scanner.expect("}")?;

    let expected = [
        shape.inputs,
        shape.outputs,
        shape.cols,
        shape.rows,
        NODE_INPUTS,
        1,
        usize::from(F::COUNT),
    ];
    if header != expected {
        return Err(VaultError::IncompatibleShape {
            expected: format!("{expected:?}"),
            found: format!("{header:?}"),
        });
    }

    let mut nodes = Vec::with_capacity(shape.node_count());
    for i in 0..shape.node_count() {
        scanner.expect("(")?;
        scanner.expect("[")?;
        let id = scanner.number()?;
        if id != shape.inputs + i {
            return Err(VaultError::Malformed(format!(
                "expected node id {}, found {id}",
                shape.inputs + i
            )));
        }
        scanner.expect("]")?;
        let first = scanner.number()?;
        scanner.expect(",")?;
        let second = scanner.number()?;
        scanner.expect(",")?;
        let function = u8::try_from(scanner.number()?)
            .map_err(|_| VaultError::Malformed(format!("function id of node {id} too large")))?;
        scanner.expect(")")?;
        nodes.push(([first, second], function));
    }

    scanner.expect("(")?;
    let mut outputs = Vec::with_capacity(shape.outputs);
    for i in 0..shape.outputs {
        if i > 0 {
            scanner.expect(",")?;
        }
        outputs.push(scanner.number()?);
    }
    scanner.expect(")")?;

    CgpGenome::from_genes(layout, &nodes, &outputs)
        .map_err(|e| VaultError::Malformed(e.to_string()))
}

/// Whitespace-insensitive token reader.
struct Scanner<'a> {
    rest: &'a str,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str) -> Self {
        Self { rest: text }
    }

    fn skip_whitespace(&mut self) {
        self.rest = self.rest.trim_start();
    }

    fn expect(&mut self, literal: &str) -> Result<(), VaultError> {
        self.skip_whitespace();
        match self.rest.strip_prefix(literal) {
            Some(rest) => {
                self.rest = rest;
                Ok(())
            }
            None => Err(VaultError::Malformed(format!(
                "expected {literal:?} at {:?}",
                self.preview()
            ))),
        }
    }

    fn number(&mut self) -> Result<usize, VaultError> {
        self.skip_whitespace();
        let end = self
            .rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(self.rest.len());
        let (digits, rest) = self.rest.split_at(end);
        let value = digits.parse().map_err(|_| {
            VaultError::Malformed(format!("expected a number at {:?}", self.preview()))
        })?;
        self.rest = rest;
        Ok(value)
    }

    fn word(&mut self) -> Result<&'a str, VaultError> {
        self.skip_whitespace();
        let end = self
            .rest
            .find(char::is_whitespace)
            .unwrap_or(self.rest.len());
        if end == 0 {
            return Err(VaultError::Malformed("unexpected end of record".to_string()));
        }
        let (word, rest) = self.rest.split_at(end);
        self.rest = rest;
        Ok(word)
    }

    fn finish(&mut self) -> Result<(), VaultError> {
        self.skip_whitespace();
        if self.rest.is_empty() {
            Ok(())
        } else {
            Err(VaultError::Malformed(format!(
                "trailing data {:?}",
                self.preview()
            )))
        }
    }

    fn preview(&self) -> &str {
        let end = self
            .rest
            .char_indices()
            .nth(24)
            .map_or(self.rest.len(), |(i, _)| i);
        &self.rest[..end]
    }
}
