//! Score vectors and synthetic identifiers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lowest representable score.
pub const MIN_SCORE: f64 = 0.0;

/// Highest representable score.
pub const MAX_SCORE: f64 = 100.0;

/// Clips a value into the score range.
#[inline]
pub fn clip_score(value: f64) -> f64 {
    value.clamp(MIN_SCORE, MAX_SCORE)
}

/// Stable synthetic identifier of a student (global population index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StudentId(pub usize);

impl StudentId {
    /// Returns the population index.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for StudentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "student_{}", self.0)
    }
}

/// One scalar per subject, keyed by subject name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScoreVector(BTreeMap<String, f64>);

impl ScoreVector {
    /// Creates an empty vector.
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Sets the score of a subject.
    pub fn insert(&mut self, subject: impl Into<String>, score: f64) {
        self.0.insert(subject.into(), score);
    }

    /// Returns the score of a subject.
    pub fn get(&self, subject: &str) -> Option<f64> {
        self.0.get(subject).copied()
    }

    /// Iterates `(subject, score)` pairs in subject order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Subject names present in this vector.
    pub fn subjects(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Number of subjects.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no subject is present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns true if every score lies within [0, 100].
    pub fn in_range(&self) -> bool {
        self.0.values().all(|v| (MIN_SCORE..=MAX_SCORE).contains(v))
    }
}

impl FromIterator<(String, f64)> for ScoreVector {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
