//! The three-level organizational tree.
//!
//! ```text
//! HierarchyTree
//!   └─ TopUnit  (L2_<t>)
//!        └─ MidUnit  (L1_<t>_<m>)
//!             └─ School  (school_<s>)
//!                  ├─ real_scores   every student, ground truth
//!                  ├─ l0_scores     every student
//!                  ├─ l1_scores     ⊆ l0 keys
//!                  └─ l2_scores     ⊆ l1 keys
//! ```
//!
//! All containers are index-addressable `Vec`s in configuration order. Only
//! the orchestrator mutates a tree; everyone else gets `&HierarchyTree`.

use crate::error::{SimError, SimResult};
use crate::scores::{ScoreVector, StudentId};
use serde::Serialize;
use std::collections::BTreeMap;

/// Global index of a school.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SchoolId(pub usize);

impl std::fmt::Display for SchoolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "school_{}", self.0)
    }
}

/// Position of a mid-level unit: top-level index and index within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct MidUnitId {
    pub top: usize,
    pub index: usize,
}

impl std::fmt::Display for MidUnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L1_{}_{}", self.top, self.index)
    }
}

/// Index of a top-level unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TopUnitId(pub usize);

impl std::fmt::Display for TopUnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L2_{}", self.0)
    }
}

/// Score maps keyed by student.
pub type ScoreMap = BTreeMap<StudentId, ScoreVector>;

/// A school and the scores recorded for its students at every level.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct School {
    id: SchoolId,
    real_scores: ScoreMap,
    l0_scores: ScoreMap,
    l1_scores: ScoreMap,
    l2_scores: ScoreMap,
}

impl School {
    pub(crate) fn new(id: SchoolId, real_scores: ScoreMap, l0_scores: ScoreMap) -> Self {
        Self {
            id,
            real_scores,
            l0_scores,
            l1_scores: ScoreMap::new(),
            l2_scores: ScoreMap::new(),
        }
    }

    pub fn id(&self) -> SchoolId {
        self.id
    }

    /// Ground-truth scores of every student.
    pub fn real_scores(&self) -> &ScoreMap {
        &self.real_scores
    }

    /// Level-0 scores of every student.
    pub fn l0_scores(&self) -> &ScoreMap {
        &self.l0_scores
    }

    /// Level-1 scores of the students retested by the mid-level unit.
    pub fn l1_scores(&self) -> &ScoreMap {
        &self.l1_scores
    }

    /// Level-2 scores of the students retested by the top-level unit.
    pub fn l2_scores(&self) -> &ScoreMap {
        &self.l2_scores
    }

    /// Student ids in population order.
    pub fn student_ids(&self) -> Vec<StudentId> {
        self.real_scores.keys().copied().collect()
    }

    pub fn student_count(&self) -> usize {
        self.real_scores.len()
    }

    /// Ground truth of one student of this school.
    pub fn ground_truth(&self, student: StudentId) -> Option<&ScoreVector> {
        self.real_scores.get(&student)
    }

    pub(crate) fn record_l1(&mut self, student: StudentId, scores: ScoreVector) -> SimResult<()> {
        if !self.real_scores.contains_key(&student) {
            return Err(SimError::invariant(format!(
                "{} is not a student of {}",
                student, self.id
            )));
        }
        self.l1_scores.insert(student, scores);
        Ok(())
    }

    pub(crate) fn record_l2(&mut self, student: StudentId, scores: ScoreVector) -> SimResult<()> {
        if !self.l1_scores.contains_key(&student) {
            return Err(SimError::invariant(format!(
                "{} of {} was not retested at L1",
                student, self.id
            )));
        }
        self.l2_scores.insert(student, scores);
        Ok(())
    }

    /// Checks the key-set and range invariants of this school.
    pub fn verify(&self) -> SimResult<()> {
        if self.l0_scores.len() != self.real_scores.len()
            || !self.l0_scores.keys().all(|k| self.real_scores.contains_key(k))
        {
            return Err(SimError::invariant(format!(
                "{}: L0 scores do not cover exactly the real scores",
                self.id
            )));
        }
        if let Some(stray) = self.l1_scores.keys().find(|k| !self.l0_scores.contains_key(k)) {
            return Err(SimError::invariant(format!(
                "{}: L1 score for {} has no L0 counterpart",
                self.id, stray
            )));
        }
        if let Some(stray) = self.l2_scores.keys().find(|k| !self.l1_scores.contains_key(k)) {
            return Err(SimError::invariant(format!(
                "{}: L2 score for {} was not retested at L1",
                self.id, stray
            )));
        }

        let maps = [
            ("real", &self.real_scores),
            ("L0", &self.l0_scores),
            ("L1", &self.l1_scores),
            ("L2", &self.l2_scores),
        ];
        for (label, map) in maps {
            for (student, scores) in map {
                if !scores.in_range() {
                    return Err(SimError::invariant(format!(
                        "{}: {} score of {} outside [0, 100]",
                        self.id, label, student
                    )));
                }
                let truth = &self.real_scores[student];
                if !scores.subjects().eq(truth.subjects()) {
                    return Err(SimError::invariant(format!(
                        "{}: {} scores of {} cover different subjects than ground truth",
                        self.id, label, student
                    )));
                }
            }
        }
        Ok(())
    }
}

/// A mid-level (L1) unit: a fixed run of consecutive schools.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MidUnit {
    id: MidUnitId,
    schools: Vec<School>,
}

impl MidUnit {
    pub(crate) fn new(id: MidUnitId, schools: Vec<School>) -> Self {
        Self { id, schools }
    }

    pub fn id(&self) -> MidUnitId {
        self.id
    }

    pub fn schools(&self) -> &[School] {
        &self.schools
    }

    pub(crate) fn schools_mut(&mut self) -> &mut [School] {
        &mut self.schools
    }
}

/// A top-level (L2) unit: a fixed run of consecutive mid-level units.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopUnit {
    id: TopUnitId,
    mid_units: Vec<MidUnit>,
}

impl TopUnit {
    pub(crate) fn new(id: TopUnitId, mid_units: Vec<MidUnit>) -> Self {
        Self { id, mid_units }
    }

    pub fn id(&self) -> TopUnitId {
        self.id
    }

    pub fn mid_units(&self) -> &[MidUnit] {
        &self.mid_units
    }
}

/// The complete simulated hierarchy.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HierarchyTree {
    top_units: Vec<TopUnit>,
}

impl HierarchyTree {
    pub(crate) fn new(top_units: Vec<TopUnit>) -> Self {
        Self { top_units }
    }

    pub fn top_units(&self) -> &[TopUnit] {
        &self.top_units
    }

    /// Iterates every mid-level unit in configuration order.
    pub fn mid_units(&self) -> impl Iterator<Item = &MidUnit> {
        self.top_units.iter().flat_map(|t| t.mid_units.iter())
    }

    pub(crate) fn mid_units_mut(&mut self) -> impl Iterator<Item = &mut MidUnit> {
        self.top_units.iter_mut().flat_map(|t| t.mid_units.iter_mut())
    }

    /// Iterates every school in configuration order.
    pub fn schools(&self) -> impl Iterator<Item = &School> {
        self.mid_units().flat_map(|m| m.schools.iter())
    }

    pub(crate) fn schools_mut(&mut self) -> impl Iterator<Item = &mut School> {
        self.mid_units_mut().flat_map(|m| m.schools.iter_mut())
    }

    /// Looks up a school by its global index.
    pub fn school(&self, id: SchoolId) -> Option<&School> {
        self.schools().find(|s| s.id == id)
    }

    /// Looks up a mid-level unit by position.
    pub fn mid_unit(&self, id: MidUnitId) -> Option<&MidUnit> {
        self.top_units.get(id.top)?.mid_units.get(id.index)
    }

    pub fn school_count(&self) -> usize {
        self.schools().count()
    }

    pub fn student_count(&self) -> usize {
        self.schools().map(School::student_count).sum()
    }

    /// Ground truth of a student anywhere in the tree.
    pub fn ground_truth(&self, student: StudentId) -> Option<&ScoreVector> {
        self.schools().find_map(|s| s.ground_truth(student))
    }

    /// Verifies the invariants of every school.
    pub fn verify(&self) -> SimResult<()> {
        self.schools().try_for_each(School::verify)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(v: f64) -> ScoreVector {
        let mut s = ScoreVector::new();
        s.insert("Maths", v);
        s
    }

    fn school_with(n: usize) -> School {
        let real: ScoreMap = (0..n).map(|i| (StudentId(i), scores(50.0))).collect();
        let l0 = real.clone();
        School::new(SchoolId(0), real, l0)
    }

    #[test]
    fn test_display_keys() {
        assert_eq!(SchoolId(3).to_string(), "school_3");
        assert_eq!(MidUnitId { top: 1, index: 2 }.to_string(), "L1_1_2");
        assert_eq!(TopUnitId(0).to_string(), "L2_0");
    }

    #[test]
    fn test_record_l1_rejects_foreign_student() {
        let mut school = school_with(3);
        assert!(school.record_l1(StudentId(1), scores(55.0)).is_ok());
        assert!(school.record_l1(StudentId(9), scores(55.0)).is_err());
    }

    #[test]
    fn test_record_l2_requires_l1_retest() {
        let mut school = school_with(3);
        assert!(school.record_l2(StudentId(0), scores(55.0)).is_err());

        school.record_l1(StudentId(0), scores(52.0)).unwrap();
        assert!(school.record_l2(StudentId(0), scores(55.0)).is_ok());
        assert!(school.verify().is_ok());
    }

    #[test]
    fn test_verify_catches_out_of_range() {
        let mut school = school_with(2);
        school.l1_scores.insert(StudentId(0), scores(120.0));
        assert!(matches!(school.verify(), Err(SimError::InvariantViolation(_))));
    }

    #[test]
    fn test_verify_catches_subset_violation() {
        let mut school = school_with(2);
        school.l1_scores.insert(StudentId(5), scores(50.0));
        assert!(school.verify().is_err());
    }

    #[test]
    fn test_tree_lookup() {
        let mid = MidUnit::new(MidUnitId { top: 0, index: 0 }, vec![school_with(4)]);
        let tree = HierarchyTree::new(vec![TopUnit::new(TopUnitId(0), vec![mid])]);

        assert_eq!(tree.school_count(), 1);
        assert_eq!(tree.student_count(), 4);
        assert!(tree.school(SchoolId(0)).is_some());
        assert!(tree.mid_unit(MidUnitId { top: 0, index: 1 }).is_none());
        assert_eq!(tree.ground_truth(StudentId(2)), Some(&scores(50.0)));
        assert!(tree.verify().is_ok());
    }
}
