//! Persistent champion and population records.
//!
//! - **Hex floats** (`hexfloat`): exact `%a` fitness encoding
//! - **Format** (`format`): CGP-viewer chromosome notation and population records
//! - **Storage** (`storage`): `state_%08d` checkpoint directory

mod format;
pub mod hexfloat;
mod storage;

pub use format::{
    PopulationRecord, parse_chromosome, parse_population, write_chromosome, write_population,
};
pub use storage::Vault;

/// Vault load and store errors.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("Malformed record: {0}")]
    Malformed(String),
    #[error("Incompatible genome shape: expected {expected}, found {found}")]
    IncompatibleShape { expected: String, found: String },
    #[error("Vault I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
