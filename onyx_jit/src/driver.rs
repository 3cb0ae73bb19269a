//! The compile-one-method entry point.
//!
//! The driver owns the outermost policy: resolve the method, run the
//! pipeline over a fresh root session, and on failure retry exactly once
//! under forced-minimal options. An architecture mismatch is the one failure
//! that skips the retry; the method is reported skipped so the host can fall
//! back to another code source.
//!
//! Each attempt gets its own arena, handed to the session at the start and
//! reclaimed at the end on every path, success or failure.

use onyx_core::{Arena, JitError, JitResult, MethodHandle};

use crate::context::JitContext;
use crate::external::{CodeBuffer, CodeEmitter, Importer, MethodInfo, MethodProvider};
use crate::options::{CompileFlags, CompileOptions};
use crate::phase::PhaseId;
use crate::pipeline::{Pipeline, PipelineMode};
use crate::runner::PhaseRunner;
use crate::session::Session;

// =============================================================================
// Results
// =============================================================================

/// Terminal classification of one driver invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileOutcome {
    /// Machine code was produced.
    Success,
    /// The method was deliberately not compiled; the host should fall back.
    Skipped,
    /// A compiler defect was detected, or the method's IL is malformed.
    InternalError,
    /// A transient failure; the host may request compilation again later.
    RecoverableError,
    /// The compiler cannot express this method yet.
    ImplementationLimitation,
}

/// Everything the host learns from one invocation.
#[derive(Debug)]
pub struct CompileResult {
    /// Terminal classification.
    pub outcome: CompileOutcome,
    /// Emitted code, on success.
    pub code: Option<CodeBuffer>,
    /// Whether the forced-minimal retry ran.
    pub retried: bool,
    /// Whether the compiler downgraded the optimization level unilaterally.
    pub downgraded: bool,
    /// Phase during which the final attempt failed, if it failed.
    pub failing_phase: Option<PhaseId>,
    /// The final attempt's error, if it failed.
    pub error: Option<JitError>,
}

impl CompileResult {
    /// Whether code was produced.
    #[inline]
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.outcome == CompileOutcome::Success
    }
}

fn outcome_for(error: &JitError) -> CompileOutcome {
    match error {
        // Malformed IL is the compiler's problem as far as the host can
        // tell; it classifies with internal defects.
        JitError::BadCode { .. } | JitError::Internal { .. } => CompileOutcome::InternalError,
        JitError::ImportFailure { .. } | JitError::Recoverable { .. } => {
            CompileOutcome::RecoverableError
        }
        JitError::NotImplemented { .. } => CompileOutcome::ImplementationLimitation,
        JitError::ArchMismatch { .. } => CompileOutcome::Skipped,
    }
}

// =============================================================================
// Driver
// =============================================================================

struct AttemptFailure {
    error: JitError,
    phase: Option<PhaseId>,
}

/// Compiles methods one at a time over a shared context.
pub struct JitDriver<'a> {
    ctx: &'a JitContext,
    provider: &'a dyn MethodProvider,
    importer: &'a dyn Importer,
    emitter: &'a dyn CodeEmitter,
}

impl<'a> JitDriver<'a> {
    /// Driver over the given context and collaborators.
    #[must_use]
    pub fn new(
        ctx: &'a JitContext,
        provider: &'a dyn MethodProvider,
        importer: &'a dyn Importer,
        emitter: &'a dyn CodeEmitter,
    ) -> Self {
        Self {
            ctx,
            provider,
            importer,
            emitter,
        }
    }

    /// Compile one method. Never panics and never escapes an error; every
    /// failure folds into the result's outcome.
    pub fn compile_method(&self, method: MethodHandle, flags: &CompileFlags) -> CompileResult {
        let info = match self.provider.describe(method) {
            Ok(info) => info,
            Err(error) => {
                self.ctx.record_failure();
                return CompileResult {
                    outcome: outcome_for(&error),
                    code: None,
                    retried: false,
                    downgraded: false,
                    failing_phase: None,
                    error: Some(error),
                };
            }
        };

        match self.try_compile(&info, flags, false) {
            Ok(result) => result,
            Err(failure) => {
                if matches!(failure.error, JitError::ArchMismatch { .. }) {
                    self.ctx.record_skipped();
                    return CompileResult {
                        outcome: CompileOutcome::Skipped,
                        code: None,
                        retried: false,
                        downgraded: false,
                        // A skip is not a phase failure.
                        failing_phase: None,
                        error: Some(failure.error),
                    };
                }

                // One retry, maximally conservative.
                self.ctx.record_retry();
                let mut conservative = flags.clone();
                conservative.force_min_opts = true;
                match self.try_compile(&info, &conservative, true) {
                    Ok(mut result) => {
                        result.retried = true;
                        result
                    }
                    Err(second) => {
                        self.ctx.record_failure();
                        CompileResult {
                            outcome: outcome_for(&second.error),
                            code: None,
                            retried: true,
                            downgraded: false,
                            failing_phase: second.phase,
                            error: Some(second.error),
                        }
                    }
                }
            }
        }
    }

    /// One compilation attempt. The arena is allocated and released exactly
    /// once on every path through here.
    fn try_compile(
        &self,
        info: &MethodInfo,
        flags: &CompileFlags,
        is_retry: bool,
    ) -> Result<CompileResult, AttemptFailure> {
        let opts = CompileOptions::decide(flags, &info.metrics, &self.ctx.config, info.method);

        let arena = Arena::new();
        self.ctx.record_arena_allocated();
        let mut session = Session::new_root(info.method, info.module, opts, arena);

        let outcome = self.run_session(&mut session, info, flags);

        let failing_phase = session.most_recent_phase();
        let downgraded = session.opts.downgraded;
        let stats = session.stats;
        let phase_time = session.phase_times.total_time();
        let code = session.take_code();
        drop(session.take_arena());
        self.ctx.record_arena_released();

        match outcome {
            Ok(()) => {
                let code = code.ok_or_else(|| AttemptFailure {
                    error: JitError::internal("pipeline finished without emitting code"),
                    phase: failing_phase,
                })?;
                self.ctx.record_compiled();
                self.ctx.accumulate_session(&stats, phase_time);
                Ok(CompileResult {
                    outcome: CompileOutcome::Success,
                    code: Some(code),
                    retried: is_retry,
                    downgraded,
                    failing_phase: None,
                    error: None,
                })
            }
            Err(error) => Err(AttemptFailure {
                error,
                phase: failing_phase,
            }),
        }
    }

    fn run_session(
        &self,
        session: &mut Session,
        info: &MethodInfo,
        flags: &CompileFlags,
    ) -> JitResult<()> {
        let pipeline = Pipeline {
            ctx: self.ctx,
            provider: self.provider,
            importer: self.importer,
            emitter: self.emitter,
        };
        let mut runner = PhaseRunner::new();
        pipeline.run(&mut runner, session, info, PipelineMode::Full)?;

        // A cross-target request compiles in full and is rejected only
        // afterwards; the produced code is discarded with the session.
        if flags.target != self.ctx.host() {
            return Err(JitError::ArchMismatch {
                host: self.ctx.host().name(),
                requested: flags.target.name(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
