//! Distortion transforms and the per-level pipelines built from them.
//!
//! Every transform is elementwise and clips its output to [0, 100]. The only
//! source of state is the RNG handed to [`measurement_error`], so the same
//! seed always reproduces the same distorted scores.
//!
//! Pipeline composition (order matters):
//!
//! ```text
//! Level-0:  integrity(slope_l0)               -> measurement error
//! Level-1:  integrity(slope_l0 * collusion)   -> moderation(L1) -> measurement error
//! Level-2:                                       moderation(L2) -> measurement error
//! ```

use crate::config::SimulationConfig;
use crate::error::{SimError, SimResult};
use crate::scores::{clip_score, ScoreVector};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Inflates a failing score in proportion to its distance below the passing mark.
///
/// Scores at or above the passing mark are returned unchanged.
pub fn integrity_distortion(score: f64, passing_mark: f64, slope: f64) -> f64 {
    let distortion = (passing_mark - score).max(0.0) * slope;
    clip_score(score + distortion)
}

/// Integrity distortion surviving L1 oversight, scaled by the collusion index.
pub fn integrity_distortion_l1(
    score: f64,
    passing_mark: f64,
    collusion_index: f64,
    slope_l0: f64,
) -> SimResult<f64> {
    check_collusion(collusion_index)?;
    Ok(integrity_distortion(score, passing_mark, slope_l0 * collusion_index))
}

/// Shifts a score by a constant.
pub fn moderation_distortion(score: f64, moderation_index: f64) -> f64 {
    clip_score(score + moderation_index)
}

/// Gaussian measurement noise added at the end of every pipeline.
#[derive(Debug, Clone)]
pub struct MeasurementError {
    normal: Normal<f64>,
}

impl MeasurementError {
    /// Creates a noise model, rejecting negative or non-finite spread.
    pub fn new(mean: f64, std_dev: f64) -> SimResult<Self> {
        if !mean.is_finite() {
            return Err(SimError::invalid(
                "measurement",
                "measurement_error_mean",
                mean,
                "must be finite",
            ));
        }
        let bad_std = || {
            SimError::invalid(
                "measurement",
                "measurement_error_std_dev",
                std_dev,
                "must be finite and non-negative",
            )
        };
        // rand_distr accepts a negative spread, so the sign is checked here
        if std_dev < 0.0 {
            return Err(bad_std());
        }
        let normal = Normal::new(mean, std_dev).map_err(|_| bad_std())?;
        Ok(Self { normal })
    }
}

/// Adds one draw of measurement noise to a score.
pub fn measurement_error<R: Rng + ?Sized>(score: f64, noise: &MeasurementError, rng: &mut R) -> f64 {
    clip_score(score + noise.normal.sample(rng))
}

fn check_collusion(collusion_index: f64) -> SimResult<()> {
    if !(0.0..=1.0).contains(&collusion_index) {
        return Err(SimError::invalid(
            "level1",
            "collusion_index",
            collusion_index,
            "must be within [0, 1]",
        ));
    }
    Ok(())
}

/// Oversight level a pipeline belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Level {
    /// School-level grading
    L0,
    /// Mid-level unit retest
    L1,
    /// Top-level unit retest
    L2,
}

impl Level {
    pub fn name(&self) -> &'static str {
        match self {
            Level::L0 => "level0",
            Level::L1 => "level1",
            Level::L2 => "level2",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A fixed composition of transforms for one oversight level.
///
/// `integrity` is `None` at L2, where retesting is treated as free of local
/// manipulation.
#[derive(Debug, Clone)]
pub struct DistortionPipeline {
    level: Level,

    /// Passing mark per subject and slope, when the level applies integrity distortion
    integrity: Option<(BTreeMap<String, f64>, f64)>,

    /// Constant moderation shift, absent at L0
    moderation_index: Option<f64>,

    noise: MeasurementError,
}

impl DistortionPipeline {
    /// Level-0: integrity distortion followed by measurement error.
    pub fn level0(
        passing_marks: BTreeMap<String, f64>,
        slope_l0: f64,
        noise: MeasurementError,
    ) -> Self {
        Self {
            level: Level::L0,
            integrity: Some((passing_marks, slope_l0)),
            moderation_index: None,
            noise,
        }
    }

    /// Level-1: collusion-scaled integrity, moderation, then measurement error.
    pub fn level1(
        passing_marks: BTreeMap<String, f64>,
        slope_l0: f64,
        collusion_index: f64,
        moderation_index: f64,
        noise: MeasurementError,
    ) -> SimResult<Self> {
        check_collusion(collusion_index)?;
        Ok(Self {
            level: Level::L1,
            integrity: Some((passing_marks, slope_l0 * collusion_index)),
            moderation_index: Some(moderation_index),
            noise,
        })
    }

    /// Level-2: moderation followed by measurement error.
    pub fn level2(moderation_index: f64, noise: MeasurementError) -> Self {
        Self {
            level: Level::L2,
            integrity: None,
            moderation_index: Some(moderation_index),
            noise,
        }
    }

    /// Builds the pipeline for `level` from a simulation config.
    pub fn from_config(level: Level, config: &SimulationConfig) -> SimResult<Self> {
        let noise = MeasurementError::new(
            config.measurement_error_mean,
            config.measurement_error_std_dev,
        )?;
        match level {
            Level::L0 => Ok(Self::level0(config.passing_marks.clone(), config.slope_l0, noise)),
            Level::L1 => Self::level1(
                config.passing_marks.clone(),
                config.slope_l0,
                config.collusion_index,
                config.moderation_index_l1,
                noise,
            ),
            Level::L2 => Ok(Self::level2(config.moderation_index_l2, noise)),
        }
    }

    /// Oversight level this pipeline models.
    pub fn level(&self) -> Level {
        self.level
    }

    /// Effective integrity slope, if this level applies integrity distortion.
    pub fn integrity_slope(&self) -> Option<f64> {
        self.integrity.as_ref().map(|(_, slope)| *slope)
    }

    /// Distorts one ground-truth score vector into a new vector.
    ///
    /// Subjects are processed in name order; each consumes exactly one
    /// noise draw.
    pub fn apply<R: Rng + ?Sized>(&self, real: &ScoreVector, rng: &mut R) -> SimResult<ScoreVector> {
        let mut distorted = ScoreVector::new();
        for (subject, score) in real.iter() {
            let mut value = score;

            if let Some((marks, slope)) = &self.integrity {
                let mark = marks.get(subject).ok_or_else(|| SimError::MissingPassingMark {
                    subject: subject.to_string(),
                })?;
                value = integrity_distortion(value, *mark, *slope);
            }

            if let Some(shift) = self.moderation_index {
                value = moderation_distortion(value, shift);
            }

            value = measurement_error(value, &self.noise, rng);
            distorted.insert(subject, value);
        }
        Ok(distorted)
    }
}
