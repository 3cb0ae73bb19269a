//! Uniform phase execution harness.
//!
//! Every phase, top-level or nested, goes through [`PhaseRunner::run`], which
//! wraps the phase body with the same envelope:
//! - nesting check against the declared parent (when checks are enabled)
//! - entry bookkeeping and failure attribution
//! - wall-clock timing (when timing is enabled)
//! - an IR size sample for phases that report size metrics
//! - a post-phase consistency pass over the IR form ratchet
//! - a behavior-free dump line
//!
//! A phase that a gate turns off never reaches the runner and leaves no
//! record at all.

use std::time::{Duration, Instant};

use onyx_core::{JitError, JitResult};

use crate::ir::IrForm;
use crate::phase::PhaseId;
use crate::session::Session;

// =============================================================================
// Phase status
// =============================================================================

/// What a phase reports about its effect on the IR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseStatus {
    /// The phase changed the IR.
    Everything,
    /// The phase provably changed nothing.
    Nothing,
    /// The phase cannot tell; treated as a modification for bookkeeping.
    Unknown,
}

impl PhaseStatus {
    /// Short status label for dump lines.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            PhaseStatus::Everything => "modified",
            PhaseStatus::Nothing => "unchanged",
            PhaseStatus::Unknown => "unknown",
        }
    }
}

// =============================================================================
// Runner
// =============================================================================

/// Executes phase bodies under the common envelope. One runner per session;
/// nested inline compilations get a fresh one.
#[derive(Debug, Default)]
pub struct PhaseRunner {
    active: Vec<PhaseId>,
}

impl PhaseRunner {
    /// New runner with an empty nesting stack.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a leaf phase.
    pub fn run(
        &mut self,
        session: &mut Session,
        phase: PhaseId,
        f: impl FnOnce(&mut Session) -> JitResult<PhaseStatus>,
    ) -> JitResult<PhaseStatus> {
        self.run_with(session, phase, |_, s| f(s))
    }

    /// Run a phase whose body launches child phases through the same runner.
    pub fn run_with(
        &mut self,
        session: &mut Session,
        phase: PhaseId,
        f: impl FnOnce(&mut Self, &mut Session) -> JitResult<PhaseStatus>,
    ) -> JitResult<PhaseStatus> {
        if session.opts.checks_enabled {
            self.check_nesting(phase)?;
        }

        session.set_most_recent_phase(phase);
        session.phase_times.record_entry(phase);
        let form_before = session.ir.form();

        self.active.push(phase);
        let start = session.opts.timing_enabled.then(Instant::now);
        let result = f(self, session);
        self.active.pop();
        let status = result?;
        let elapsed = start.map_or(Duration::ZERO, |t| t.elapsed());

        if session.opts.checks_enabled {
            Self::check_form(phase, form_before, session.ir.form())?;
        }

        // Control is back with the enclosing phase, if any; a failure above
        // keeps the marker on the deepest phase for attribution.
        let resumed = self.active.last().copied().unwrap_or(phase);
        session.set_most_recent_phase(resumed);

        let size = phase.reports_size().then(|| {
            (
                session.ir.node_count() as u32,
                session.ir.block_count() as u32,
            )
        });
        session
            .phase_times
            .record_completion(phase, elapsed, status, size);
        session.dump(format!("*** {}: {}", phase.name(), status.as_str()));
        Ok(status)
    }

    /// Depth of the currently executing phase stack.
    #[inline]
    #[must_use]
    pub fn depth(&self) -> usize {
        self.active.len()
    }

    fn check_nesting(&self, phase: PhaseId) -> JitResult<()> {
        match (phase.parent(), self.active.last()) {
            (Some(parent), Some(&active)) if active == parent => Ok(()),
            (Some(parent), _) => Err(JitError::internal(format!(
                "phase {} must run nested under {}",
                phase.name(),
                parent.name()
            ))),
            (None, Some(&active)) => Err(JitError::internal(format!(
                "top-level phase {} launched inside {}",
                phase.name(),
                active.name()
            ))),
            (None, None) => Ok(()),
        }
    }

    fn check_form(phase: PhaseId, before: IrForm, after: IrForm) -> JitResult<()> {
        if after < before {
            return Err(JitError::internal(format!(
                "phase {} regressed IR form {:?} -> {:?}",
                phase.name(),
                before,
                after
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
