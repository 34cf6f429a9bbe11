//! Integrity simulator CLI
//!
//! Run hierarchical score-integrity simulations from presets or config files.

use clap::Parser;
use integrity_core::SimulationConfig;
use integrity_sim::scenarios::ScenarioId;
use integrity_sim::{load_config, RunOutput, ScenarioResult, ScenarioRunner, SimExport};
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Hierarchical score-integrity simulation CLI
#[derive(Parser, Debug)]
#[command(name = "integrity-sim")]
#[command(about = "Simulate score distortion and stratified retesting", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (baseline, no_retest, full_audit, high_collusion, harsh_moderation, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// JSON configuration file; overrides --scenario
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of consecutive seeds to run
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export configuration, coverage and flattened scores to a JSON file
    #[arg(long)]
    export: Option<PathBuf>,
}

/// A unit of work: a preset or a loaded configuration.
enum Job {
    Preset(ScenarioId),
    Config(String, SimulationConfig),
}

impl Job {
    fn config(&self) -> SimulationConfig {
        match self {
            Job::Preset(scenario) => scenario.config(),
            Job::Config(_, config) => config.clone(),
        }
    }

    fn run(&self, runner: &ScenarioRunner) -> RunOutput {
        match self {
            Job::Preset(scenario) => runner.run_detailed(*scenario),
            Job::Config(name, config) => runner.run_config(name, config),
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if !args.json {
        info!("Integrity simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    // Resolve what to run
    let jobs: Vec<Job> = if let Some(path) = &args.config {
        match load_config(path) {
            Ok(config) => vec![Job::Config(path.display().to_string(), config)],
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    } else if args.scenario == "all" {
        ScenarioId::all().into_iter().map(Job::Preset).collect()
    } else {
        match args.scenario.parse::<ScenarioId>() {
            Ok(scenario) => vec![Job::Preset(scenario)],
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!("Available scenarios: baseline, no_retest, full_audit, high_collusion, harsh_moderation, all");
                std::process::exit(1);
            }
        }
    };

    // Determine base seed
    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1)
    } else {
        args.seed
    };

    // Handle --export mode
    if let Some(export_path) = &args.export {
        if jobs.len() > 1 || args.seeds > 1 {
            eprintln!("Error: --export only supports a single scenario and seed");
            std::process::exit(1);
        }

        let job = &jobs[0];
        let output = job.run(&ScenarioRunner::new(base_seed));
        let passed = output.result.passed;
        let export = SimExport::new(&job.config(), output);

        if let Err(e) = export.write_to_file(export_path) {
            error!("Failed to write export: {:?}", e);
            std::process::exit(1);
        }
        info!("Exported {} (seed={}) to {}", export.scenario, base_seed, export_path.display());

        if !passed {
            error!(
                "✗ {} FAILED: {}",
                export.scenario,
                export.result.failure_reason.as_deref().unwrap_or("unknown")
            );
            std::process::exit(1);
        }
        return;
    }

    // Run simulations
    let mut all_results: Vec<ScenarioResult> = Vec::new();
    let mut failed_count = 0;

    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        let runner = ScenarioRunner::new(seed);

        for job in &jobs {
            let result = job.run(&runner).result;

            if !args.json {
                if result.passed {
                    info!("✓ {} (seed={}) PASSED", result.scenario, seed);
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        result.scenario,
                        seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }

            if !result.passed {
                failed_count += 1;
            }
            all_results.push(result);
        }
    }

    // Summary
    let total = all_results.len();
    let passed = total - failed_count;

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": passed,
            "failed": failed_count,
            "results": all_results,
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        if failed_count == 0 {
            info!("✅ All {} runs passed!", total);
        } else {
            error!("❌ {}/{} runs failed!", failed_count, total);
            for result in all_results.iter().filter(|r| !r.passed) {
                error!(
                    "  - {} seed={}: {}",
                    result.scenario,
                    result.seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
    }

    // Exit with proper code for CI
    if failed_count > 0 {
        std::process::exit(1);
    }
}
