//! Ground-truth score generation.
//!
//! Scores are drawn from a normal distribution, clipped to [0, 100] and
//! snapped onto the subject's grid of `granularity` evenly spaced levels.

use crate::config::SubjectParams;
use crate::error::{SimError, SimResult};
use crate::scores::{clip_score, ScoreVector};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use std::collections::BTreeMap;

/// Snaps a score onto the nearest grid level.
///
/// Ties round to even, so a value exactly halfway between two levels lands
/// on the even multiple of the step.
pub fn quantize(score: f64, granularity: u32) -> f64 {
    let step = 100.0 / (granularity as f64 - 1.0);
    clip_score((score / step).round_ties_even() * step)
}

/// Draws `count` independent ground-truth scores for one subject.
pub fn generate_subject_scores<R: Rng + ?Sized>(
    params: &SubjectParams,
    count: usize,
    rng: &mut R,
) -> SimResult<Vec<f64>> {
    params.validate()?;

    let normal = Normal::new(params.mean, params.std_dev).map_err(|_| {
        SimError::invalid("generator", "std_dev", params.std_dev, "rejected by normal distribution")
    })?;

    Ok((0..count)
        .map(|_| quantize(clip_score(normal.sample(rng)), params.granularity))
        .collect())
}

/// Draws one ground-truth score vector, one independent draw per subject.
///
/// Subjects are visited in name order so that a fixed seed always maps to
/// the same draws.
pub fn generate_scores<R: Rng + ?Sized>(
    subjects_params: &BTreeMap<String, SubjectParams>,
    rng: &mut R,
) -> SimResult<ScoreVector> {
    let mut scores = ScoreVector::new();
    for (subject, params) in subjects_params {
        let draw = generate_subject_scores(params, 1, rng).map_err(|e| e.for_subject(subject))?;
        scores.insert(subject.clone(), draw[0]);
    }
    Ok(scores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_quantize_granularity_eleven() {
        assert_relative_eq!(quantize(43.0, 11), 40.0, epsilon = 1e-9);
        assert_relative_eq!(quantize(47.0, 11), 50.0, epsilon = 1e-9);
        assert_relative_eq!(quantize(100.0, 11), 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_quantize_two_levels() {
        assert_eq!(quantize(49.0, 2), 0.0);
        assert_eq!(quantize(51.0, 2), 100.0);
    }

    #[test]
    fn test_generated_scores_on_grid_and_in_range() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let params = SubjectParams::new(50.0, 40.0, 21);

        let scores = generate_subject_scores(&params, 500, &mut rng).unwrap();
        assert_eq!(scores.len(), 500);

        for s in scores {
            assert!((0.0..=100.0).contains(&s));
            let level = s / params.step();
            assert_relative_eq!(level, level.round(), epsilon = 1e-9);
        }
    }

    #[test]
    fn test_zero_std_dev_is_deterministic() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let params = SubjectParams::new(62.0, 0.0, 11);

        let scores = generate_subject_scores(&params, 10, &mut rng).unwrap();
        assert!(scores.iter().all(|s| *s == 60.0));
    }

    #[test]
    fn test_invalid_params_rejected() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let bad_granularity = SubjectParams::new(50.0, 10.0, 1);
        assert!(matches!(
            generate_subject_scores(&bad_granularity, 1, &mut rng),
            Err(SimError::InvalidParameter { field: "granularity", .. })
        ));

        let bad_std = SubjectParams::new(50.0, -0.1, 11);
        assert!(matches!(
            generate_subject_scores(&bad_std, 1, &mut rng),
            Err(SimError::InvalidParameter { field: "std_dev", .. })
        ));
    }

    #[test]
    fn test_generate_scores_same_seed_same_vector() {
        let mut subjects = BTreeMap::new();
        subjects.insert("Maths".to_string(), SubjectParams::new(50.0, 10.0, 11));
        subjects.insert("English".to_string(), SubjectParams::new(60.0, 15.0, 101));

        let mut rng1 = ChaCha8Rng::seed_from_u64(42);
        let mut rng2 = ChaCha8Rng::seed_from_u64(42);

        let a = generate_scores(&subjects, &mut rng1).unwrap();
        let b = generate_scores(&subjects, &mut rng2).unwrap();

        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
    }
}
