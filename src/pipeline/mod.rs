//! The conversion decision pipeline.
//!
//! ```text
//! InputImage ──► decision ──► Skip(reason)                  pass through
//!                   │
//!                   └──► Convert(primary job)
//!                           + planner ──► breakpoint jobs
//!                                              │
//!                        executor (one call per job, any order)
//!                                              │
//!                                  ConversionResult | JobFailure
//! ```
//!
//! Everything up to the executor is pure policy over metadata and a settings
//! snapshot; the executor is the only stage that writes files.

pub mod decision;
pub mod executor;
pub mod input;
pub mod job;
pub mod planner;

pub use decision::{decide_for_format, decide_primary_conversion};
pub use executor::{Cancellation, ExecuteError, artifact_path, execute};
pub use input::InputImage;
pub use job::{
    ConversionJob, ConversionResult, Decision, JobFailure, JobKind, PRIMARY_KEY, PassOutcome,
    SkipReason,
};
pub use planner::{Breakpoint, BreakpointTable, plan_breakpoints, plan_with_table};
