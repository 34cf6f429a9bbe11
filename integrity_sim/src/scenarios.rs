//! Named simulation presets.

use integrity_core::{SimulationConfig, SubjectParams};
use std::collections::BTreeMap;

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// SIM-001: 20 students, half retested at L1, everything at L2
    Baseline,

    /// SIM-002: No L1 retesting, so nothing reaches L2 either
    NoRetest,

    /// SIM-003: Every level retests everyone it can
    FullAudit,

    /// SIM-004: L1 oversight colludes fully with local manipulation
    HighCollusion,

    /// SIM-005: Strong moderation shifts and noisy grading
    HarshModeration,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Baseline,
            ScenarioId::NoRetest,
            ScenarioId::FullAudit,
            ScenarioId::HighCollusion,
            ScenarioId::HarshModeration,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Baseline => "baseline",
            ScenarioId::NoRetest => "no_retest",
            ScenarioId::FullAudit => "full_audit",
            ScenarioId::HighCollusion => "high_collusion",
            ScenarioId::HarshModeration => "harsh_moderation",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Baseline => "2 schools x 10 students, 50% L1 retest, full L2 refinement",
            ScenarioId::NoRetest => "0% L1 retest: every L1 and L2 map stays empty",
            ScenarioId::FullAudit => "3 subjects, 24 schools, 100% retesting at every level",
            ScenarioId::HighCollusion => "collusion 1.0, steep slope: L1 reproduces L0 manipulation",
            ScenarioId::HarshModeration => "L1 moderation -5, L2 moderation +3, noise std 3",
        }
    }

    /// Stream index used to derive this scenario's RNG from a master seed.
    pub fn stream(&self) -> u64 {
        match self {
            ScenarioId::Baseline => 1,
            ScenarioId::NoRetest => 2,
            ScenarioId::FullAudit => 3,
            ScenarioId::HighCollusion => 4,
            ScenarioId::HarshModeration => 5,
        }
    }

    /// Builds the simulation configuration of this scenario.
    pub fn config(&self) -> SimulationConfig {
        let baseline = SimulationConfig::default();
        match self {
            ScenarioId::Baseline => baseline,
            ScenarioId::NoRetest => SimulationConfig {
                l1_retest_percentage: 0.0,
                ..baseline
            },
            ScenarioId::FullAudit => {
                let (subjects_params, passing_marks) = three_subjects();
                SimulationConfig {
                    students_per_school: 30,
                    subjects_params,
                    passing_marks,
                    n_schools_per_l1: 4,
                    n_l1s_per_l2: 3,
                    n_l2s: 2,
                    l1_retest_percentage: 100.0,
                    l2_retest_percentage_schools: 100.0,
                    l2_retest_percentage_students: 100.0,
                    ..baseline
                }
            }
            ScenarioId::HighCollusion => {
                let (subjects_params, passing_marks) = three_subjects();
                SimulationConfig {
                    students_per_school: 40,
                    subjects_params,
                    passing_marks,
                    n_schools_per_l1: 5,
                    n_l1s_per_l2: 2,
                    l1_retest_percentage: 30.0,
                    l2_retest_percentage_schools: 40.0,
                    l2_retest_percentage_students: 50.0,
                    collusion_index: 1.0,
                    slope_l0: 0.5,
                    ..baseline
                }
            }
            ScenarioId::HarshModeration => SimulationConfig {
                students_per_school: 25,
                n_schools_per_l1: 4,
                n_l1s_per_l2: 2,
                n_l2s: 2,
                l1_retest_percentage: 20.0,
                l2_retest_percentage_schools: 50.0,
                l2_retest_percentage_students: 50.0,
                moderation_index_l1: -5.0,
                moderation_index_l2: 3.0,
                measurement_error_std_dev: 3.0,
                ..baseline
            },
        }
    }
}

fn three_subjects() -> (BTreeMap<String, SubjectParams>, BTreeMap<String, f64>) {
    let subjects = [
        ("Maths", SubjectParams::new(50.0, 15.0, 11), 40.0),
        ("English", SubjectParams::new(58.0, 12.0, 21), 45.0),
        ("Science", SubjectParams::new(47.0, 18.0, 101), 35.0),
    ];

    let params = subjects
        .iter()
        .map(|(name, params, _)| (name.to_string(), *params))
        .collect();
    let marks = subjects
        .iter()
        .map(|(name, _, mark)| (name.to_string(), *mark))
        .collect();
    (params, marks)
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "baseline" | "sim-001" => Ok(ScenarioId::Baseline),
            "no_retest" | "noretest" | "sim-002" => Ok(ScenarioId::NoRetest),
            "full_audit" | "fullaudit" | "sim-003" => Ok(ScenarioId::FullAudit),
            "high_collusion" | "highcollusion" | "sim-004" => Ok(ScenarioId::HighCollusion),
            "harsh_moderation" | "harshmoderation" | "sim-005" => Ok(ScenarioId::HarshModeration),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
