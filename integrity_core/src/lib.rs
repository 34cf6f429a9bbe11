//! Integrity Core - Hierarchical Score-Integrity Simulation
//!
//! Models how standardized-test scores drift as they pass through layers of
//! oversight that each retest only a sample of the population below them:
//! 1. **Integrity distortion**: local manipulation inflating failing scores
//! 2. **Moderation**: uniform re-grading shift applied to a retested group
//! 3. **Measurement error**: Gaussian noise closing every pipeline
//!
//! # Architecture
//!
//! ```text
//! generator ──► Level-0 pipeline ──► tree assembly
//!                                        │
//!                    Level-1 sampling ◄──┘  (students per school)
//!                           │
//!                    Level-2 sampling       (schools per L1 unit, then
//!                           │                their L1-retested students)
//!                           ▼
//!                      aggregate            (coverage + flattened series)
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use integrity_core::{simulate_test_scores, summarize, SimContext, SimulationConfig};
//!
//! let config = SimulationConfig::default();
//! let mut rng = SimContext::new(42).rng();
//! let tree = simulate_test_scores(&config, &mut rng)?;
//! let summary = summarize(&tree);
//! ```

pub mod aggregate;
pub mod config;
pub mod context;
pub mod distortion;
pub mod error;
pub mod generator;
pub mod hierarchy;
pub mod orchestrator;
pub mod scores;

// Re-export key types for convenience
pub use aggregate::{flatten, summarize, FlattenedScores, PairedSeries, RetestSummary, SubjectSeries};
pub use config::{SimulationConfig, SubjectParams};
pub use context::SimContext;
pub use distortion::{DistortionPipeline, Level, MeasurementError};
pub use error::{SimError, SimResult};
pub use hierarchy::{HierarchyTree, MidUnit, MidUnitId, School, SchoolId, TopUnit, TopUnitId};
pub use orchestrator::{retest_count, simulate_test_scores, Orchestrator, Phase};
pub use scores::{ScoreVector, StudentId};
