//! Checkpoint directory of numbered population states.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::debug;

use super::VaultError;
use super::format::{PopulationRecord, parse_population, write_population};
use crate::compute::cgp::{CgpGenome, CgpLayout, FunctionSet};
use crate::compute::evolution::Individual;

const STATE_PREFIX: &str = "state_";

/// Directory holding `state_%08d` population checkpoints.
#[derive(Debug, Clone)]
pub struct Vault {
    directory: PathBuf,
}

impl Vault {
    /// Open (creating if needed) a checkpoint directory.
    pub fn open(directory: impl Into<PathBuf>) -> Result<Self, VaultError> {
        let directory = directory.into();
        fs::create_dir_all(&directory)?;
        Ok(Self { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Write the population state for `generation`, replacing any earlier
    /// state of the same generation.
    pub fn store<F: FunctionSet>(
        &self,
        generation: u64,
        best_index: usize,
        individuals: &[Individual<CgpGenome<F>>],
        layout: &CgpLayout<F>,
    ) -> Result<PathBuf, VaultError> {
        let path = self.directory.join(format!("{STATE_PREFIX}{generation:08}"));
        let mut writer = BufWriter::new(fs::File::create(&path)?);
        write_population(&mut writer, generation, best_index, individuals, layout.shape())?;
        writer.flush()?;
        debug!("Stored generation {generation} in {}", path.display());
        Ok(path)
    }

    /// Path of the lexicographically last state file.
    pub fn latest_path(&self) -> Result<Option<PathBuf>, VaultError> {
        let mut latest: Option<String> = None;
        for entry in fs::read_dir(&self.directory)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with(STATE_PREFIX) && latest.as_ref().is_none_or(|l| name > *l) {
                latest = Some(name);
            }
        }
        Ok(latest.map(|name| self.directory.join(name)))
    }

    /// Load the latest state, if any.
    pub fn retrieve_latest<F: FunctionSet>(
        &self,
        layout: &CgpLayout<F>,
    ) -> Result<Option<PopulationRecord<F>>, VaultError> {
        let Some(path) = self.latest_path()? else {
            return Ok(None);
        };
        let text = fs::read_to_string(&path)?;
        let record = parse_population(&text, layout)?;
        debug!(
            "Retrieved generation {} from {}",
            record.generation,
            path.display()
        );
        Ok(Some(record))
    }
}
