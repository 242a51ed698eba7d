//! Schema module - configuration and reporting types for evolution runs.

mod config;
mod run;

pub use config::*;
pub use run::*;
