//! The execution pipeline and its downstream adapter seam.

pub mod executor;
pub mod pipeline;

pub use executor::{Executor, ExecutionError, FailureKind, SimulatedExecutor};
pub use pipeline::{ExecutionPipeline, PipelineConfig, PipelineOutcome};
