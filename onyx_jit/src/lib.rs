//! Tiered method-at-a-time JIT compilation pipeline orchestrator.
//!
//! Onyx takes one method's intermediate representation and drives it, phase
//! by phase, to machine code:
//!
//! - **Phase registry**: the fixed, ordered catalog of named phases
//! - **Phase runner**: timing, invariant checks, and dump hooks around each
//!   phase invocation
//! - **Session**: all per-method mutable state for exactly one compilation
//! - **Pipeline**: the ordered, conditionally gated sequence of phases from
//!   pre-import through code generation
//! - **Inlining**: nested import-only compilations for inline candidates
//! - **Driver**: the compile-one-method entry point with a single retry
//!   under maximally conservative configuration
//!
//! Instruction encoding, the importer's internal algorithm, and the
//! individual optimization algorithms are external collaborators consumed
//! through the trait seams in [`external`].
#![deny(unsafe_op_in_unsafe_fn)]

pub mod context;
pub mod driver;
pub mod external;
pub mod inline;
pub mod ir;
pub mod options;
pub mod phase;
pub mod pipeline;
pub mod runner;
pub mod session;
pub mod stats;

pub use context::JitContext;
pub use driver::{CompileOutcome, CompileResult, JitDriver};
pub use external::{CodeBuffer, CodeEmitter, EhKind, EhRegion, Importer, MethodInfo, MethodProvider};
pub use inline::{InlineLimits, InlineVerdict};
pub use options::{CompileFlags, CompileOptions, MethodMetrics, OptLevel, TargetIsa, Tier};
pub use phase::PhaseId;
pub use pipeline::{Pipeline, PipelineMode};
pub use runner::{PhaseRunner, PhaseStatus};
pub use session::Session;
pub use stats::{AggregateStats, PhaseTimes, SessionStats};
