//! Integrity Sim - scenario harness for the score-integrity engine
//!
//! Runs [`integrity_core`] simulations from named presets or JSON config
//! files, checks the structural guarantees of every finished tree and
//! reports coverage and per-level drift.
//!
//! # Determinism
//!
//! Every run draws from a ChaCha8 stream derived from one 64-bit master
//! seed. Presets each get their own derived stream, so a failing run is
//! reproducible from its `(scenario, seed)` pair alone.
//!
//! # Usage
//!
//! ```ignore
//! use integrity_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42).run(ScenarioId::Baseline);
//! assert!(result.passed);
//! ```

mod config_file;
mod exporter;
mod runner;
pub mod scenarios;

pub use config_file::{load_config, parse_config, ConfigError};
pub use exporter::SimExport;
pub use runner::{run_all, LevelStats, RunOutput, ScenarioMetrics, ScenarioResult, ScenarioRunner};
