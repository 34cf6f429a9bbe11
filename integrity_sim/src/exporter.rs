//! JSON exporter for downstream plotting.
//!
//! Exports the configuration, retest coverage and flattened per-subject score
//! series of one run so an external plotting tool can draw the real-vs-level
//! comparisons without re-running the simulation.

use crate::runner::{RunOutput, ScenarioResult};
use integrity_core::{FlattenedScores, RetestSummary, SimulationConfig};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Complete simulation export.
#[derive(Debug, Clone, Serialize)]
pub struct SimExport {
    /// Scenario or config name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Configuration the run was built from
    pub config: SimulationConfig,

    /// Checked result of the run
    pub result: ScenarioResult,

    /// Retest coverage per unit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<RetestSummary>,

    /// Per-subject real / distorted series
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scores: Option<FlattenedScores>,
}

impl SimExport {
    /// Creates an export from a finished run.
    pub fn new(config: &SimulationConfig, output: RunOutput) -> Self {
        Self {
            scenario: output.result.scenario.clone(),
            seed: output.result.seed,
            config: config.clone(),
            result: output.result,
            summary: output.summary,
            scores: output.scores,
        }
    }

    /// Serializes to pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &Path) -> std::io::Result<()> {
        let json = self.to_json()?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
