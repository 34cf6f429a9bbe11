//! Simulation configuration.
//!
//! A [`SimulationConfig`] carries every knob of one simulation run. It is
//! plain data (serde-friendly, so the web layer or the CLI can hand it over
//! as JSON) and is validated up front by [`SimulationConfig::validate`]
//! before any random draw happens.

use crate::error::{SimError, SimResult};
use crate::hierarchy::School;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Generation parameters for one subject.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubjectParams {
    /// Mean of the ground-truth score distribution
    pub mean: f64,

    /// Standard deviation of the ground-truth score distribution
    pub std_dev: f64,

    /// Number of evenly spaced score levels over [0, 100], both ends included
    pub granularity: u32,
}

impl SubjectParams {
    /// Creates a new parameter record.
    pub fn new(mean: f64, std_dev: f64, granularity: u32) -> Self {
        Self { mean, std_dev, granularity }
    }

    /// Distance between two adjacent score levels.
    pub fn step(&self) -> f64 {
        100.0 / (self.granularity as f64 - 1.0)
    }

    /// Checks the parameters against the generator's domain.
    pub fn validate(&self) -> SimResult<()> {
        if self.granularity < 2 {
            return Err(SimError::invalid(
                "generator",
                "granularity",
                self.granularity as f64,
                "must be at least 2",
            ));
        }
        if !self.std_dev.is_finite() || self.std_dev < 0.0 {
            return Err(SimError::invalid(
                "generator",
                "std_dev",
                self.std_dev,
                "must be finite and non-negative",
            ));
        }
        if !self.mean.is_finite() {
            return Err(SimError::invalid("generator", "mean", self.mean, "must be finite"));
        }
        Ok(())
    }
}

/// Largest number of units or students a tree can hold.
const MAX_POPULATION: usize = isize::MAX as usize / std::mem::size_of::<School>();

/// Configuration for a full simulation run.
///
/// Field aliases accept the upper-case level names (`n_schools_per_L1`,
/// `slope_L0`, ...) used by the upload service payloads. Only the slope,
/// moderation and measurement-error fields may be omitted; unknown keys are
/// rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationConfig {
    /// Number of students in every school
    pub students_per_school: usize,

    /// Generation parameters keyed by subject name
    pub subjects_params: BTreeMap<String, SubjectParams>,

    /// Passing mark keyed by subject name
    pub passing_marks: BTreeMap<String, f64>,

    /// Schools grouped into each mid-level (L1) unit
    #[serde(alias = "n_schools_per_L1")]
    pub n_schools_per_l1: usize,

    /// Mid-level units grouped into each top-level (L2) unit
    #[serde(alias = "n_L1s_per_L2")]
    pub n_l1s_per_l2: usize,

    /// Number of top-level units
    #[serde(alias = "n_L2s")]
    pub n_l2s: usize,

    /// Percentage of each school's students retested at L1 (0-100)
    #[serde(alias = "L1_retest_percentage")]
    pub l1_retest_percentage: f64,

    /// Percentage of each L1 unit's schools retested at L2 (0-100)
    #[serde(alias = "L2_retest_percentage_schools")]
    pub l2_retest_percentage_schools: f64,

    /// Percentage of a selected school's L1-retested students retested at L2 (0-100)
    #[serde(alias = "L2_retest_percentage_students")]
    pub l2_retest_percentage_students: f64,

    /// Share of the L0 manipulation surviving L1 oversight (0-1)
    pub collusion_index: f64,

    /// Integrity distortion slope at L0
    #[serde(alias = "slope_L0", default = "default_slope_l0")]
    pub slope_l0: f64,

    /// Moderation shift applied at L1
    #[serde(alias = "moderation_index_L1", default)]
    pub moderation_index_l1: f64,

    /// Moderation shift applied at L2
    #[serde(alias = "moderation_index_L2", default)]
    pub moderation_index_l2: f64,

    /// Mean of the measurement-error noise
    #[serde(default)]
    pub measurement_error_mean: f64,

    /// Standard deviation of the measurement-error noise
    #[serde(default = "default_measurement_error_std_dev")]
    pub measurement_error_std_dev: f64,
}

fn default_slope_l0() -> f64 {
    0.1
}

fn default_measurement_error_std_dev() -> f64 {
    1.0
}

impl Default for SimulationConfig {
    fn default() -> Self {
        let mut subjects_params = BTreeMap::new();
        subjects_params.insert("Maths".to_string(), SubjectParams::new(50.0, 10.0, 11));
        let mut passing_marks = BTreeMap::new();
        passing_marks.insert("Maths".to_string(), 40.0);

        Self {
            students_per_school: 10,
            subjects_params,
            passing_marks,
            n_schools_per_l1: 2,
            n_l1s_per_l2: 1,
            n_l2s: 1,
            l1_retest_percentage: 50.0,
            l2_retest_percentage_schools: 100.0,
            l2_retest_percentage_students: 100.0,
            collusion_index: 0.5,
            slope_l0: default_slope_l0(),
            moderation_index_l1: 0.0,
            moderation_index_l2: 0.0,
            measurement_error_mean: 0.0,
            measurement_error_std_dev: default_measurement_error_std_dev(),
        }
    }
}

impl SimulationConfig {
    /// Total number of schools in the tree, saturating at `usize::MAX`.
    pub fn school_count(&self) -> usize {
        self.n_l2s
            .saturating_mul(self.n_l1s_per_l2)
            .saturating_mul(self.n_schools_per_l1)
    }

    /// Total number of students in the tree, saturating at `usize::MAX`.
    pub fn student_count(&self) -> usize {
        self.school_count().saturating_mul(self.students_per_school)
    }

    /// Checks that every level of the tree fits in memory.
    fn check_population(&self) -> SimResult<()> {
        let too_large = |field: &'static str, value: Option<usize>| {
            SimError::invalid(
                "assembly",
                field,
                value.map_or(f64::INFINITY, |v| v as f64),
                "exceeds the largest population a tree can hold",
            )
        };
        let bounded = |field: &'static str, value: Option<usize>| match value {
            Some(v) if v <= MAX_POPULATION => Ok(v),
            _ => Err(too_large(field, value)),
        };

        bounded("n_l2s", Some(self.n_l2s))?;
        let mid_units = bounded("mid_unit_count", self.n_l2s.checked_mul(self.n_l1s_per_l2))?;
        let schools = bounded("school_count", mid_units.checked_mul(self.n_schools_per_l1))?;
        bounded("student_count", schools.checked_mul(self.students_per_school))?;
        Ok(())
    }

    /// Subject names in iteration order.
    pub fn subjects(&self) -> Vec<String> {
        self.subjects_params.keys().cloned().collect()
    }

    /// Slope used by the L1 integrity distortion.
    pub fn slope_l1(&self) -> f64 {
        self.slope_l0 * self.collusion_index
    }

    /// Validates every parameter, failing on the first out-of-domain value.
    pub fn validate(&self) -> SimResult<()> {
        self.check_population()?;

        for (subject, params) in &self.subjects_params {
            params.validate().map_err(|e| e.for_subject(subject))?;

            let mark = self
                .passing_marks
                .get(subject)
                .ok_or_else(|| SimError::MissingPassingMark { subject: subject.clone() })?;
            if !mark.is_finite() {
                return Err(SimError::invalid("level0", "passing_mark", *mark, "must be finite")
                    .for_subject(subject));
            }
        }

        check_percentage("level1", "l1_retest_percentage", self.l1_retest_percentage)?;
        check_percentage(
            "level2",
            "l2_retest_percentage_schools",
            self.l2_retest_percentage_schools,
        )?;
        check_percentage(
            "level2",
            "l2_retest_percentage_students",
            self.l2_retest_percentage_students,
        )?;

        if !(0.0..=1.0).contains(&self.collusion_index) {
            return Err(SimError::invalid(
                "level1",
                "collusion_index",
                self.collusion_index,
                "must be within [0, 1]",
            ));
        }

        check_finite("level0", "slope_l0", self.slope_l0)?;
        check_finite("level1", "moderation_index_l1", self.moderation_index_l1)?;
        check_finite("level2", "moderation_index_l2", self.moderation_index_l2)?;
        check_finite("measurement", "measurement_error_mean", self.measurement_error_mean)?;

        if !self.measurement_error_std_dev.is_finite() || self.measurement_error_std_dev < 0.0 {
            return Err(SimError::invalid(
                "measurement",
                "measurement_error_std_dev",
                self.measurement_error_std_dev,
                "must be finite and non-negative",
            ));
        }

        Ok(())
    }
}

fn check_percentage(stage: &'static str, field: &'static str, value: f64) -> SimResult<()> {
    if !(0.0..=100.0).contains(&value) {
        return Err(SimError::invalid(stage, field, value, "must be within [0, 100]"));
    }
    Ok(())
}

fn check_finite(stage: &'static str, field: &'static str, value: f64) -> SimResult<()> {
    if !value.is_finite() {
        return Err(SimError::invalid(stage, field, value, "must be finite"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SimulationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.school_count(), 2);
        assert_eq!(config.student_count(), 20);
    }

    #[test]
    fn test_granularity_below_two_rejected() {
        let mut config = SimulationConfig::default();
        config.subjects_params.insert("Maths".into(), SubjectParams::new(50.0, 10.0, 1));

        match config.validate() {
            Err(SimError::InvalidParameter { field, subject, .. }) => {
                assert_eq!(field, "granularity");
                assert_eq!(subject.as_deref(), Some("Maths"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_negative_std_dev_rejected() {
        let params = SubjectParams::new(50.0, -1.0, 11);
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_collusion_out_of_range_rejected() {
        let config = SimulationConfig {
            collusion_index: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SimError::InvalidParameter { field: "collusion_index", .. })
        ));
    }

    #[test]
    fn test_percentage_out_of_range_rejected() {
        for bad in [-1.0, 100.5, f64::NAN] {
            let config = SimulationConfig {
                l2_retest_percentage_students: bad,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "accepted {}", bad);
        }
    }

    #[test]
    fn test_missing_passing_mark_rejected() {
        let mut config = SimulationConfig::default();
        config.subjects_params.insert("English".into(), SubjectParams::new(60.0, 12.0, 21));

        assert_eq!(
            config.validate(),
            Err(SimError::MissingPassingMark { subject: "English".to_string() })
        );
    }

    #[test]
    fn test_zero_population_is_valid() {
        let config = SimulationConfig {
            students_per_school: 0,
            n_l2s: 0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.student_count(), 0);
    }

    #[test]
    fn test_school_overflow_rejected() {
        let config = SimulationConfig {
            n_schools_per_l1: usize::MAX / 2 + 1,
            n_l1s_per_l2: 2,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SimError::InvalidParameter { stage: "assembly", field: "school_count", .. })
        ));
        assert_eq!(config.school_count(), usize::MAX);
    }

    #[test]
    fn test_student_overflow_rejected() {
        let config = SimulationConfig {
            students_per_school: usize::MAX / 2,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SimError::InvalidParameter { stage: "assembly", field: "student_count", .. })
        ));
    }

    #[test]
    fn test_empty_units_beyond_memory_rejected() {
        let config = SimulationConfig {
            students_per_school: 0,
            n_schools_per_l1: 0,
            n_l1s_per_l2: 0,
            n_l2s: 1 << 61,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SimError::InvalidParameter { stage: "assembly", field: "n_l2s", .. })
        ));
    }

    const REQUIRED: &str = r#"
        "students_per_school": 4,
        "subjects_params": {"Maths": {"mean": 50.0, "std_dev": 10.0, "granularity": 11}},
        "passing_marks": {"Maths": 40.0},
        "n_schools_per_L1": 3,
        "n_L1s_per_L2": 2,
        "n_L2s": 1,
        "L1_retest_percentage": 25.0,
        "L2_retest_percentage_schools": 50.0,
        "L2_retest_percentage_students": 50.0,
        "collusion_index": 0.5"#;

    #[test]
    fn test_deserialize_accepts_level_aliases() {
        let json = format!(r#"{{{}, "slope_L0": 0.2, "moderation_index_L2": -1.5}}"#, REQUIRED);

        let config: SimulationConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.n_schools_per_l1, 3);
        assert_eq!(config.n_l1s_per_l2, 2);
        assert_eq!(config.l1_retest_percentage, 25.0);
        assert_eq!(config.slope_l0, 0.2);
        assert_eq!(config.moderation_index_l2, -1.5);
        // Optional fields fall back to the defaults
        assert_eq!(config.moderation_index_l1, 0.0);
        assert_eq!(config.measurement_error_mean, 0.0);
        assert_eq!(config.measurement_error_std_dev, 1.0);
    }

    #[test]
    fn test_deserialize_rejects_unknown_keys() {
        let json = format!(r#"{{{}, "L1_retest_pct": 0}}"#, REQUIRED);
        let err = serde_json::from_str::<SimulationConfig>(&json).unwrap_err();
        assert!(err.to_string().contains("L1_retest_pct"), "{}", err);
    }

    #[test]
    fn test_deserialize_requires_core_inputs() {
        let json = REQUIRED.replace(r#""collusion_index": 0.5"#, r#""slope_L0": 0.1"#);
        let err = serde_json::from_str::<SimulationConfig>(&format!("{{{}}}", json)).unwrap_err();
        assert!(err.to_string().contains("collusion_index"), "{}", err);
    }
}
