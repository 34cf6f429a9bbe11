//! Scenario runner - executes a simulation and checks its invariants.

use crate::scenarios::ScenarioId;

use integrity_core::{
    flatten, retest_count, simulate_test_scores, summarize, FlattenedScores, HierarchyTree, Level,
    RetestSummary, SimContext, SimulationConfig,
};
use rand::Rng;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Results from running a scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    /// Scenario (or config file) that was run
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Whether the run completed and every check passed
    pub passed: bool,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected from the finished tree
    pub metrics: ScenarioMetrics,
}

/// Mean shift and RMS error of one level's distorted scores against ground truth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LevelStats {
    pub count: usize,
    pub mean_shift: Option<f64>,
    pub rms_error: Option<f64>,
}

/// Metrics collected after a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScenarioMetrics {
    /// Students in the tree
    pub students: usize,

    /// Schools in the tree
    pub schools: usize,

    /// Students retested at L1
    pub l1_retested: usize,

    /// Schools with at least one L2 retest
    pub l2_schools: usize,

    /// Students retested at L2
    pub l2_retested: usize,

    /// Per subject, per level ("L0", "L1", "L2") comparison with ground truth
    pub levels: BTreeMap<String, BTreeMap<String, LevelStats>>,
}

/// A finished run: the checked result plus the data it was computed from.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub result: ScenarioResult,
    pub tree: Option<HierarchyTree>,
    pub summary: Option<RetestSummary>,
    pub scores: Option<FlattenedScores>,
}

/// Runs simulations for a master seed.
pub struct ScenarioRunner {
    context: SimContext,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            context: SimContext::new(seed),
        }
    }

    pub fn seed(&self) -> u64 {
        self.context.seed()
    }

    /// Runs a preset scenario on its own derived stream.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.run_detailed(scenario).result
    }

    /// Runs a preset scenario and keeps the tree, summary and flattened scores.
    pub fn run_detailed(&self, scenario: ScenarioId) -> RunOutput {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed());
        debug!("{}", scenario.description());

        let mut rng = self.context.derive_rng(scenario.stream());
        self.execute(scenario.name(), &scenario.config(), &mut rng)
    }

    /// Runs an arbitrary configuration on the master stream.
    pub fn run_config(&self, name: &str, config: &SimulationConfig) -> RunOutput {
        info!("Starting run: {} (seed={})", name, self.seed());
        let mut rng = self.context.rng();
        self.execute(name, config, &mut rng)
    }

    fn execute<R: Rng + ?Sized>(&self, name: &str, config: &SimulationConfig, rng: &mut R) -> RunOutput {
        let mut result = ScenarioResult {
            scenario: name.to_string(),
            seed: self.seed(),
            passed: false,
            failure_reason: None,
            metrics: ScenarioMetrics::default(),
        };

        let tree = match simulate_test_scores(config, rng) {
            Ok(tree) => tree,
            Err(e) => {
                warn!("{} aborted: {}", name, e);
                result.failure_reason = Some(e.to_string());
                return RunOutput {
                    result,
                    tree: None,
                    summary: None,
                    scores: None,
                };
            }
        };

        let summary = summarize(&tree);
        let scores = match flatten(&tree, &config.subjects()) {
            Ok(scores) => scores,
            Err(e) => {
                result.failure_reason = Some(e.to_string());
                return RunOutput {
                    result,
                    tree: Some(tree),
                    summary: Some(summary),
                    scores: None,
                };
            }
        };

        result.metrics = collect_metrics(&tree, &summary, &scores);
        match check_run(config, &tree, &summary) {
            Ok(()) => result.passed = true,
            Err(reason) => result.failure_reason = Some(reason),
        }

        info!(
            "{}: {} students, {} retested at L1, {} at L2 across {} schools",
            name,
            result.metrics.students,
            result.metrics.l1_retested,
            result.metrics.l2_retested,
            result.metrics.l2_schools
        );

        RunOutput {
            result,
            tree: Some(tree),
            summary: Some(summary),
            scores: Some(scores),
        }
    }
}

/// Checks the structural guarantees of a finished run.
fn check_run(
    config: &SimulationConfig,
    tree: &HierarchyTree,
    summary: &RetestSummary,
) -> Result<(), String> {
    tree.verify().map_err(|e| e.to_string())?;

    if tree.student_count() != config.student_count() {
        return Err(format!(
            "expected {} students, tree holds {}",
            config.student_count(),
            tree.student_count()
        ));
    }

    let l1_expected = retest_count(config.students_per_school, config.l1_retest_percentage);
    for school in tree.schools() {
        if school.l1_scores().len() != l1_expected {
            return Err(format!(
                "{} retested {} students at L1, expected {}",
                school.id(),
                school.l1_scores().len(),
                l1_expected
            ));
        }
    }

    let l2_school_bound = retest_count(config.n_schools_per_l1, config.l2_retest_percentage_schools);
    for mid in summary.mid_units() {
        if mid.l2_school_count() > l2_school_bound {
            return Err(format!(
                "{} retested {} schools at L2, bound is {}",
                mid.unit,
                mid.l2_school_count(),
                l2_school_bound
            ));
        }
        for school in &mid.l2_schools {
            let expected = retest_count(l1_expected, config.l2_retest_percentage_students);
            if school.count() != expected {
                return Err(format!(
                    "{} retested {} students at L2, expected {}",
                    school.school,
                    school.count(),
                    expected
                ));
            }
        }
    }

    if summarize(tree) != *summary {
        return Err("summary changed between two passes over the same tree".to_string());
    }

    Ok(())
}

fn collect_metrics(
    tree: &HierarchyTree,
    summary: &RetestSummary,
    scores: &FlattenedScores,
) -> ScenarioMetrics {
    let levels: BTreeMap<String, BTreeMap<String, LevelStats>> = scores
        .subjects
        .iter()
        .map(|(subject, series)| {
            let per_level: BTreeMap<String, LevelStats> = [Level::L0, Level::L1, Level::L2]
                .into_iter()
                .map(|level| {
                    let paired = series.level(level);
                    let stats = LevelStats {
                        count: paired.len(),
                        mean_shift: paired.mean_shift(),
                        rms_error: paired.rms_error(),
                    };
                    (level_key(level).to_string(), stats)
                })
                .collect();
            (subject.clone(), per_level)
        })
        .collect();

    ScenarioMetrics {
        students: tree.student_count(),
        schools: tree.school_count(),
        l1_retested: summary.l1_student_count(),
        l2_schools: summary.l2_school_count(),
        l2_retested: summary.l2_student_count(),
        levels,
    }
}

fn level_key(level: Level) -> &'static str {
    match level {
        Level::L0 => "L0",
        Level::L1 => "L1",
        Level::L2 => "L2",
    }
}

/// Runs every preset for one seed.
pub fn run_all(seed: u64) -> Vec<ScenarioResult> {
    let runner = ScenarioRunner::new(seed);
    ScenarioId::all().into_iter().map(|s| runner.run(s)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_baseline_passes() {
        let result = ScenarioRunner::new(42).run(ScenarioId::Baseline);

        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.metrics.students, 20);
        assert_eq!(result.metrics.schools, 2);
        assert_eq!(result.metrics.l1_retested, 10);
        assert_eq!(result.metrics.l2_schools, 2);
        assert_eq!(result.metrics.l2_retested, 10);
    }

    #[test]
    fn test_no_retest_has_no_coverage() {
        let result = ScenarioRunner::new(42).run(ScenarioId::NoRetest);

        assert!(result.passed);
        assert_eq!(result.metrics.l1_retested, 0);
        assert_eq!(result.metrics.l2_retested, 0);
        let maths = &result.metrics.levels["Maths"];
        assert_eq!(maths["L1"].count, 0);
        assert_eq!(maths["L1"].mean_shift, None);
    }

    #[test]
    fn test_invalid_config_fails_without_tree() {
        let config = SimulationConfig {
            l1_retest_percentage: 120.0,
            ..Default::default()
        };
        let output = ScenarioRunner::new(1).run_config("broken", &config);

        assert!(!output.result.passed);
        assert!(output.tree.is_none());
        assert!(output
            .result
            .failure_reason
            .as_deref()
            .unwrap()
            .contains("l1_retest_percentage"));
    }

    #[test]
    fn test_same_seed_same_metrics() {
        let a = ScenarioRunner::new(7).run(ScenarioId::HarshModeration);
        let b = ScenarioRunner::new(7).run(ScenarioId::HarshModeration);

        assert_eq!(a.metrics.levels, b.metrics.levels);
    }

    #[test]
    fn test_run_all_covers_every_scenario() {
        let results = run_all(3);
        assert_eq!(results.len(), ScenarioId::all().len());
        assert!(results.iter().all(|r| r.passed), "{:?}", results);
    }
}
