//! Read-only analysis of a completed hierarchy tree.
//!
//! [`summarize`] reports retest coverage at every level; [`flatten`] collects
//! per-subject score series for plotting and descriptive comparison. Neither
//! touches the tree, so repeated calls return identical results.

use crate::distortion::Level;
use crate::error::{SimError, SimResult};
use crate::hierarchy::{HierarchyTree, MidUnitId, School, SchoolId, ScoreMap, TopUnitId};
use crate::scores::StudentId;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

/// Students of one school retested at some level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchoolCoverage {
    pub school: SchoolId,
    pub students: Vec<StudentId>,
}

impl SchoolCoverage {
    fn from_map(school: SchoolId, map: &ScoreMap) -> Self {
        Self {
            school,
            students: map.keys().copied().collect(),
        }
    }

    pub fn count(&self) -> usize {
        self.students.len()
    }
}

/// Retest coverage inside one mid-level unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MidUnitCoverage {
    pub unit: MidUnitId,

    /// Schools with at least one L2 retest, with the retested students
    pub l2_schools: Vec<SchoolCoverage>,

    /// Every school of the unit with its L1-retested students (possibly none)
    pub l1_schools: Vec<SchoolCoverage>,
}

impl MidUnitCoverage {
    pub fn l2_school_count(&self) -> usize {
        self.l2_schools.len()
    }

    pub fn l2_student_count(&self) -> usize {
        self.l2_schools.iter().map(SchoolCoverage::count).sum()
    }

    pub fn l1_student_count(&self) -> usize {
        self.l1_schools.iter().map(SchoolCoverage::count).sum()
    }

    /// L1-retested students of one school of this unit.
    pub fn l1_students(&self, school: SchoolId) -> Option<&[StudentId]> {
        self.l1_schools
            .iter()
            .find(|c| c.school == school)
            .map(|c| c.students.as_slice())
    }
}

/// Retest coverage inside one top-level unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopUnitCoverage {
    pub unit: TopUnitId,
    pub mid_units: Vec<MidUnitCoverage>,
}

impl TopUnitCoverage {
    pub fn l2_school_count(&self) -> usize {
        self.mid_units.iter().map(MidUnitCoverage::l2_school_count).sum()
    }

    pub fn l2_student_count(&self) -> usize {
        self.mid_units.iter().map(MidUnitCoverage::l2_student_count).sum()
    }

    pub fn l1_student_count(&self) -> usize {
        self.mid_units.iter().map(MidUnitCoverage::l1_student_count).sum()
    }
}

/// Retest coverage of the whole tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetestSummary {
    pub top_units: Vec<TopUnitCoverage>,
}

impl RetestSummary {
    /// Iterates every mid-level unit's coverage in tree order.
    pub fn mid_units(&self) -> impl Iterator<Item = &MidUnitCoverage> {
        self.top_units.iter().flat_map(|t| t.mid_units.iter())
    }

    pub fn mid_unit(&self, id: MidUnitId) -> Option<&MidUnitCoverage> {
        self.mid_units().find(|m| m.unit == id)
    }

    pub fn l2_school_count(&self) -> usize {
        self.top_units.iter().map(TopUnitCoverage::l2_school_count).sum()
    }

    pub fn l2_student_count(&self) -> usize {
        self.top_units.iter().map(TopUnitCoverage::l2_student_count).sum()
    }

    pub fn l1_student_count(&self) -> usize {
        self.top_units.iter().map(TopUnitCoverage::l1_student_count).sum()
    }
}

/// Extracts retest coverage from a completed tree.
///
/// Logs one line per school ("L1 tested ...") and one per mid-level unit
/// ("L2 tested ..."); the log output has no bearing on the returned summary.
pub fn summarize(tree: &HierarchyTree) -> RetestSummary {
    let top_units = tree
        .top_units()
        .iter()
        .map(|top| {
            let mid_units = top
                .mid_units()
                .iter()
                .map(|mid| {
                    let l1_schools: Vec<SchoolCoverage> = mid
                        .schools()
                        .iter()
                        .map(|s| SchoolCoverage::from_map(s.id(), s.l1_scores()))
                        .collect();
                    let l2_schools: Vec<SchoolCoverage> = mid
                        .schools()
                        .iter()
                        .filter(|s| !s.l2_scores().is_empty())
                        .map(|s| SchoolCoverage::from_map(s.id(), s.l2_scores()))
                        .collect();

                    let coverage = MidUnitCoverage {
                        unit: mid.id(),
                        l2_schools,
                        l1_schools,
                    };
                    for school in &coverage.l1_schools {
                        info!("L1 tested {} students in {}", school.count(), school.school);
                    }
                    info!(
                        "L2 tested {} students in {} schools for {}",
                        coverage.l2_student_count(),
                        coverage.l2_school_count(),
                        coverage.unit
                    );
                    coverage
                })
                .collect();

            TopUnitCoverage {
                unit: top.id(),
                mid_units,
            }
        })
        .collect();

    RetestSummary { top_units }
}

/// Ground-truth scores paired element-wise with their distorted counterparts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PairedSeries {
    pub real: Vec<f64>,
    pub distorted: Vec<f64>,
}

impl PairedSeries {
    fn push(&mut self, real: f64, distorted: f64) {
        self.real.push(real);
        self.distorted.push(distorted);
    }

    pub fn len(&self) -> usize {
        self.real.len()
    }

    pub fn is_empty(&self) -> bool {
        self.real.is_empty()
    }

    /// Iterates `(real, distorted)` pairs.
    pub fn pairs(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.real.iter().copied().zip(self.distorted.iter().copied())
    }

    /// Mean of `distorted - real`, `None` when empty.
    pub fn mean_shift(&self) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        Some(self.pairs().map(|(r, d)| d - r).sum::<f64>() / self.len() as f64)
    }

    /// Root mean square of `distorted - real`, `None` when empty.
    pub fn rms_error(&self) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        let sum_sq: f64 = self.pairs().map(|(r, d)| (d - r).powi(2)).sum();
        Some((sum_sq / self.len() as f64).sqrt())
    }
}

/// Score series of one subject across the tree.
///
/// `l0` pairs every student's ground truth with its Level-0 score, so
/// `l0.real` is the full real-score population.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SubjectSeries {
    pub l0: PairedSeries,
    pub l1: PairedSeries,
    pub l2: PairedSeries,
}

impl SubjectSeries {
    /// All ground-truth scores.
    pub fn real(&self) -> &[f64] {
        &self.l0.real
    }

    pub fn level(&self, level: Level) -> &PairedSeries {
        match level {
            Level::L0 => &self.l0,
            Level::L1 => &self.l1,
            Level::L2 => &self.l2,
        }
    }
}

/// Per-subject flattened series.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlattenedScores {
    pub subjects: BTreeMap<String, SubjectSeries>,
}

impl FlattenedScores {
    pub fn subject(&self, name: &str) -> Option<&SubjectSeries> {
        self.subjects.get(name)
    }
}

/// Collects, per subject, the real and distorted scores of every level.
///
/// Fails with `UnknownSubject` if a student's scores lack a requested subject.
pub fn flatten<S: AsRef<str>>(tree: &HierarchyTree, subjects: &[S]) -> SimResult<FlattenedScores> {
    let mut flat = FlattenedScores::default();
    for subject in subjects {
        flat.subjects.insert(subject.as_ref().to_string(), SubjectSeries::default());
    }

    for school in tree.schools() {
        for (name, series) in flat.subjects.iter_mut() {
            collect(school, school.l0_scores(), name, &mut series.l0)?;
            collect(school, school.l1_scores(), name, &mut series.l1)?;
            collect(school, school.l2_scores(), name, &mut series.l2)?;
        }
    }
    Ok(flat)
}

fn collect(
    school: &School,
    distorted: &ScoreMap,
    subject: &str,
    out: &mut PairedSeries,
) -> SimResult<()> {
    for (student, scores) in distorted {
        let real = school
            .ground_truth(*student)
            .and_then(|truth| truth.get(subject))
            .ok_or_else(|| SimError::UnknownSubject { subject: subject.to_string() })?;
        let value = scores
            .get(subject)
            .ok_or_else(|| SimError::UnknownSubject { subject: subject.to_string() })?;
        out.push(real, value);
    }
    Ok(())
}
