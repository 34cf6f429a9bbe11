//! Hierarchical sampler: builds the tree and runs the retest passes.
//!
//! The run is a strict three-phase state machine:
//!
//! 1. **Assembly**: one ground truth per student, contiguous partition into
//!    schools, Level-0 pipeline over the whole population.
//! 2. **Level-1 sampling**: per school, a simple random sample of students
//!    gets the Level-1 pipeline.
//! 3. **Level-2 sampling**: per mid-level unit, a sample of schools; within
//!    each, a sample of the L1-retested students gets the Level-2 pipeline.
//!
//! Every level distorts the untouched ground truth. Retests model independent
//! re-grading, so distortions never chain from one level to the next.

use crate::config::SimulationConfig;
use crate::distortion::{DistortionPipeline, Level};
use crate::error::{SimError, SimResult};
use crate::generator::generate_scores;
use crate::hierarchy::{HierarchyTree, MidUnit, MidUnitId, School, SchoolId, ScoreMap, TopUnit, TopUnitId};
use crate::scores::{ScoreVector, StudentId};
use rand::seq::index;
use rand::Rng;
use tracing::{debug, info, warn};

/// Number of units drawn from `population` at `percentage` percent.
///
/// Fractional sizes truncate toward zero; the product is formed before the
/// division so whole-number results are exact.
pub fn retest_count(population: usize, percentage: f64) -> usize {
    (population as f64 * percentage / 100.0) as usize
}

/// Where the orchestrator stands in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Assembly,
    Level1Sampling,
    Level2Sampling,
    Complete,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Assembly => "assembly",
            Phase::Level1Sampling => "level1_sampling",
            Phase::Level2Sampling => "level2_sampling",
            Phase::Complete => "complete",
        }
    }
}

/// Owns the tree while it is being built.
pub struct Orchestrator {
    config: SimulationConfig,
    level0: DistortionPipeline,
    level1: DistortionPipeline,
    level2: DistortionPipeline,
    phase: Phase,
    tree: HierarchyTree,
}

impl Orchestrator {
    /// Validates the configuration and prepares the three pipelines.
    pub fn new(config: &SimulationConfig) -> SimResult<Self> {
        config.validate()?;

        Ok(Self {
            level0: DistortionPipeline::from_config(Level::L0, config)?,
            level1: DistortionPipeline::from_config(Level::L1, config)?,
            level2: DistortionPipeline::from_config(Level::L2, config)?,
            config: config.clone(),
            phase: Phase::Assembly,
            tree: HierarchyTree::default(),
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Read-only view of the tree built so far.
    pub fn tree(&self) -> &HierarchyTree {
        &self.tree
    }

    fn expect_phase(&self, expected: Phase) -> SimResult<()> {
        if self.phase != expected {
            return Err(SimError::PhaseOrder {
                expected: expected.name(),
                actual: self.phase.name(),
            });
        }
        Ok(())
    }

    /// Phase 1: generate ground truth, partition, apply Level-0.
    pub fn assemble<R: Rng + ?Sized>(&mut self, rng: &mut R) -> SimResult<()> {
        self.expect_phase(Phase::Assembly)?;

        let cfg = &self.config;
        let total = cfg.student_count();
        info!(
            "Assembly: {} students in {} schools ({} top-level x {} mid-level x {} schools)",
            total,
            cfg.school_count(),
            cfg.n_l2s,
            cfg.n_l1s_per_l2,
            cfg.n_schools_per_l1
        );
        if total == 0 {
            warn!("Configuration yields an empty population");
        }

        // Ground truth is fixed for everyone before any sampling decision
        let mut truths = Vec::new();
        for _ in 0..total {
            truths.push(generate_scores(&cfg.subjects_params, rng)?);
        }
        let mut truths = truths.into_iter().enumerate();

        let mut top_units = Vec::new();
        for t in 0..cfg.n_l2s {
            let mut mid_units = Vec::new();
            for m in 0..cfg.n_l1s_per_l2 {
                let first_school = (t * cfg.n_l1s_per_l2 + m) * cfg.n_schools_per_l1;
                let mut schools = Vec::new();

                for s in first_school..first_school + cfg.n_schools_per_l1 {
                    let mut real = ScoreMap::new();
                    let mut l0 = ScoreMap::new();

                    for (i, truth) in truths.by_ref().take(cfg.students_per_school) {
                        let student = StudentId(i);
                        l0.insert(student, self.level0.apply(&truth, rng)?);
                        real.insert(student, truth);
                    }
                    schools.push(School::new(SchoolId(s), real, l0));
                }
                mid_units.push(MidUnit::new(MidUnitId { top: t, index: m }, schools));
            }
            top_units.push(TopUnit::new(TopUnitId(t), mid_units));
        }

        self.tree = HierarchyTree::new(top_units);
        self.phase = Phase::Level1Sampling;
        Ok(())
    }

    /// Phase 2: per school, retest a sample of students at L1.
    pub fn sample_level1<R: Rng + ?Sized>(&mut self, rng: &mut R) -> SimResult<()> {
        self.expect_phase(Phase::Level1Sampling)?;
        let percentage = self.config.l1_retest_percentage;
        info!("Level-1 sampling: {}% of students per school", percentage);

        for school in self.tree.schools_mut() {
            let eligible = school.student_ids();
            let count = retest_count(eligible.len(), percentage);

            for i in index::sample(rng, eligible.len(), count) {
                let student = eligible[i];
                let distorted = distort(&self.level1, school, student, rng)?;
                school.record_l1(student, distorted)?;
            }
            debug!("{}: {} of {} students retested at L1", school.id(), count, eligible.len());
        }

        self.phase = Phase::Level2Sampling;
        Ok(())
    }

    /// Phase 3: per mid-level unit, retest a sample of schools at L2 and,
    /// within each, a sample of the L1-retested students.
    pub fn sample_level2<R: Rng + ?Sized>(&mut self, rng: &mut R) -> SimResult<()> {
        self.expect_phase(Phase::Level2Sampling)?;
        let school_pct = self.config.l2_retest_percentage_schools;
        let student_pct = self.config.l2_retest_percentage_students;
        info!(
            "Level-2 sampling: {}% of schools per mid-level unit, {}% of their L1 retests",
            school_pct, student_pct
        );

        for mid in self.tree.mid_units_mut() {
            let mid_id = mid.id();
            let schools = mid.schools_mut();
            let school_count = retest_count(schools.len(), school_pct);
            let selected = index::sample(rng, schools.len(), school_count);

            for s in selected {
                let school = &mut schools[s];
                let eligible: Vec<StudentId> = school.l1_scores().keys().copied().collect();
                let count = retest_count(eligible.len(), student_pct);

                for i in index::sample(rng, eligible.len(), count) {
                    let student = eligible[i];
                    let distorted = distort(&self.level2, school, student, rng)?;
                    school.record_l2(student, distorted)?;
                }
                debug!("{} / {}: {} students retested at L2", mid_id, school.id(), count);
            }
        }

        self.phase = Phase::Complete;
        Ok(())
    }

    /// Runs all remaining phases and hands over the finished tree.
    pub fn run<R: Rng + ?Sized>(mut self, rng: &mut R) -> SimResult<HierarchyTree> {
        if self.phase == Phase::Assembly {
            self.assemble(rng)?;
        }
        if self.phase == Phase::Level1Sampling {
            self.sample_level1(rng)?;
        }
        if self.phase == Phase::Level2Sampling {
            self.sample_level2(rng)?;
        }
        self.finish()
    }

    /// Hands over the tree once every phase has completed.
    pub fn finish(self) -> SimResult<HierarchyTree> {
        self.expect_phase(Phase::Complete)?;
        Ok(self.tree)
    }
}

fn distort<R: Rng + ?Sized>(
    pipeline: &DistortionPipeline,
    school: &School,
    student: StudentId,
    rng: &mut R,
) -> SimResult<ScoreVector> {
    let truth = school.ground_truth(student).ok_or_else(|| {
        SimError::invariant(format!("{} has no ground truth in {}", student, school.id()))
    })?;
    pipeline.apply(truth, rng)
}

/// Simulates a full run: validates `config`, builds the tree and performs
/// both retest passes using `rng` as the only source of randomness.
///
/// Either the complete tree is returned or the first error encountered.
pub fn simulate_test_scores<R: Rng + ?Sized>(
    config: &SimulationConfig,
    rng: &mut R,
) -> SimResult<HierarchyTree> {
    Orchestrator::new(config)?.run(rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_retest_count() {
        assert_eq!(retest_count(10, 50.0), 5);
        assert_eq!(retest_count(10, 0.0), 0);
        assert_eq!(retest_count(10, 100.0), 10);
        assert_eq!(retest_count(3, 50.0), 1);
        assert_eq!(retest_count(100, 29.0), 29);
        assert_eq!(retest_count(1, 99.0), 0);
        assert_eq!(retest_count(0, 100.0), 0);
    }

    #[test]
    fn test_phases_advance_in_order() {
        let config = SimulationConfig::default();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut orch = Orchestrator::new(&config).unwrap();

        assert_eq!(orch.phase(), Phase::Assembly);
        orch.assemble(&mut rng).unwrap();
        assert_eq!(orch.phase(), Phase::Level1Sampling);
        assert_eq!(orch.tree().student_count(), 20);
        assert!(orch.tree().schools().all(|s| s.l1_scores().is_empty()));

        orch.sample_level1(&mut rng).unwrap();
        assert_eq!(orch.phase(), Phase::Level2Sampling);
        orch.sample_level2(&mut rng).unwrap();
        assert_eq!(orch.phase(), Phase::Complete);

        let tree = orch.finish().unwrap();
        assert!(tree.verify().is_ok());
    }

    #[test]
    fn test_out_of_order_phase_rejected() {
        let config = SimulationConfig::default();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut orch = Orchestrator::new(&config).unwrap();

        assert_eq!(
            orch.sample_level2(&mut rng),
            Err(SimError::PhaseOrder {
                expected: "level2_sampling",
                actual: "assembly",
            })
        );
    }

    #[test]
    fn test_finish_before_complete_rejected() {
        let config = SimulationConfig::default();
        let orch = Orchestrator::new(&config).unwrap();
        assert!(matches!(orch.finish(), Err(SimError::PhaseOrder { .. })));
    }

    #[test]
    fn test_invalid_config_rejected_before_sampling() {
        let config = SimulationConfig {
            collusion_index: -0.2,
            ..Default::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(simulate_test_scores(&config, &mut rng).is_err());
    }

    #[test]
    fn test_oversized_population_rejected_without_panic() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let overflowing = SimulationConfig {
            n_schools_per_l1: usize::MAX / 2 + 1,
            n_l1s_per_l2: 2,
            ..Default::default()
        };
        assert!(matches!(
            simulate_test_scores(&overflowing, &mut rng),
            Err(SimError::InvalidParameter { field: "school_count", .. })
        ));

        let empty_but_huge = SimulationConfig {
            students_per_school: 0,
            n_schools_per_l1: 0,
            n_l2s: 1 << 61,
            ..Default::default()
        };
        assert!(matches!(
            simulate_test_scores(&empty_but_huge, &mut rng),
            Err(SimError::InvalidParameter { stage: "assembly", .. })
        ));
    }

    #[test]
    fn test_contiguous_partition() {
        let config = SimulationConfig {
            students_per_school: 3,
            n_schools_per_l1: 2,
            n_l1s_per_l2: 2,
            n_l2s: 2,
            ..Default::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let tree = simulate_test_scores(&config, &mut rng).unwrap();

        assert_eq!(tree.school_count(), 8);
        for (s, school) in tree.schools().enumerate() {
            assert_eq!(school.id(), SchoolId(s));
            let expected: Vec<StudentId> = (s * 3..s * 3 + 3).map(StudentId).collect();
            assert_eq!(school.student_ids(), expected);
        }

        let mid = tree.mid_unit(MidUnitId { top: 1, index: 0 }).unwrap();
        let ids: Vec<SchoolId> = mid.schools().iter().map(School::id).collect();
        assert_eq!(ids, vec![SchoolId(4), SchoolId(5)]);
    }

    #[test]
    fn test_retests_distort_ground_truth_not_previous_level() {
        // Noise-free, no moderation, full collusion: L1 equals L0 exactly,
        // L2 equals ground truth exactly.
        let config = SimulationConfig {
            l1_retest_percentage: 100.0,
            collusion_index: 1.0,
            slope_l0: 0.5,
            measurement_error_std_dev: 0.0,
            ..Default::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let tree = simulate_test_scores(&config, &mut rng).unwrap();

        for school in tree.schools() {
            for (student, l1) in school.l1_scores() {
                assert_eq!(l1, &school.l0_scores()[student]);
            }
            for (student, l2) in school.l2_scores() {
                assert_eq!(l2, &school.real_scores()[student]);
            }
        }
    }
}
