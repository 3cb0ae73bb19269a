//! Compilation statistics.
//!
//! Two layers, following the session/process split: a per-session phase
//! timing table filled in by the phase runner, and a process-wide aggregate
//! accumulated once at the end of each driver invocation. Statistics are a
//! side channel; nothing here affects compiled output.

use crate::phase::PhaseId;
use crate::runner::PhaseStatus;
use rustc_hash::FxHashMap;
use std::time::Duration;

// =============================================================================
// Per-session phase timing
// =============================================================================

/// Accumulated numbers for one phase within one session.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhaseSlot {
    /// Times the phase ran.
    pub invocations: u32,
    /// Total time spent.
    pub time: Duration,
    /// Invocations that reported modifying the IR.
    pub modified: u32,
    /// IR node count at the most recent completion; sampled only for
    /// size-reporting phases, zero otherwise.
    pub nodes: u32,
    /// IR block count at the most recent completion; sampled only for
    /// size-reporting phases, zero otherwise.
    pub blocks: u32,
}

/// Per-session phase timing and ordering table.
#[derive(Debug, Default)]
pub struct PhaseTimes {
    slots: FxHashMap<PhaseId, PhaseSlot>,
    entered: Vec<PhaseId>,
    completed: Vec<PhaseId>,
}

impl PhaseTimes {
    /// Empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a phase entry.
    pub fn record_entry(&mut self, phase: PhaseId) {
        self.entered.push(phase);
    }

    /// Record a phase completion with its duration, modified tri-state, and
    /// (for size-reporting phases) the post-phase IR size as
    /// `(nodes, blocks)`.
    pub fn record_completion(
        &mut self,
        phase: PhaseId,
        time: Duration,
        status: PhaseStatus,
        size: Option<(u32, u32)>,
    ) {
        let slot = self.slots.entry(phase).or_default();
        slot.invocations += 1;
        slot.time += time;
        if status == PhaseStatus::Everything {
            slot.modified += 1;
        }
        if let Some((nodes, blocks)) = size {
            slot.nodes = nodes;
            slot.blocks = blocks;
        }
        self.completed.push(phase);
    }

    /// Whether the phase was ever entered.
    #[must_use]
    pub fn entered(&self, phase: PhaseId) -> bool {
        self.entered.contains(&phase)
    }

    /// Invocation count for a phase (zero if never run).
    #[must_use]
    pub fn invocations(&self, phase: PhaseId) -> u32 {
        self.slots.get(&phase).map_or(0, |s| s.invocations)
    }

    /// Total time spent in a phase.
    #[must_use]
    pub fn time_of(&self, phase: PhaseId) -> Duration {
        self.slots.get(&phase).map_or(Duration::ZERO, |s| s.time)
    }

    /// Slot accessor.
    #[must_use]
    pub fn slot(&self, phase: PhaseId) -> Option<&PhaseSlot> {
        self.slots.get(&phase)
    }

    /// Completion order, as observed by entry/exit instrumentation.
    #[must_use]
    pub fn completed_order(&self) -> &[PhaseId] {
        &self.completed
    }

    /// Entry order.
    #[must_use]
    pub fn entered_order(&self) -> &[PhaseId] {
        &self.entered
    }

    /// Index of the *last* completion of a phase.
    #[must_use]
    pub fn last_completion(&self, phase: PhaseId) -> Option<usize> {
        self.completed.iter().rposition(|&p| p == phase)
    }

    /// Whether every completion of `a` precedes the first completion of `b`.
    #[must_use]
    pub fn completes_before(&self, a: PhaseId, b: PhaseId) -> bool {
        match (
            self.last_completion(a),
            self.completed.iter().position(|&p| p == b),
        ) {
            (Some(last_a), Some(first_b)) => last_a < first_b,
            _ => false,
        }
    }

    /// Sum of phase times.
    #[must_use]
    pub fn total_time(&self) -> Duration {
        self.slots.values().map(|s| s.time).sum()
    }

    /// Number of phase completions.
    #[must_use]
    pub fn phases_run(&self) -> usize {
        self.completed.len()
    }

    /// Drop everything; used when a reusable inlinee session is
    /// reinitialized for a fresh attempt.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.entered.clear();
        self.completed.clear();
    }
}

// =============================================================================
// Session summary
// =============================================================================

/// Summary counters for one session, folded into the process aggregate when
/// the driver invocation finishes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionStats {
    /// Bytes of machine code produced.
    pub code_bytes: u64,
    /// Inline candidates tried.
    pub inline_attempts: u64,
    /// Inline candidates spliced.
    pub inline_successes: u64,
    /// Cumulative IL bytes of spliced inlinees.
    pub inlined_il_bytes: u64,
}

// =============================================================================
// Process aggregate
// =============================================================================

/// Process-wide aggregate statistics, one instance per [`crate::JitContext`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AggregateStats {
    /// Driver invocations that produced code.
    pub methods_compiled: u64,
    /// Driver invocations that went through the retry path.
    pub retries: u64,
    /// Driver invocations that failed terminally.
    pub failures: u64,
    /// Driver invocations skipped (architecture mismatch).
    pub skipped: u64,
    /// Arenas handed out to root compilations.
    pub arenas_allocated: u64,
    /// Arenas released by the driver.
    pub arenas_released: u64,
    /// Total machine code bytes.
    pub total_code_bytes: u64,
    /// Inline candidates tried, process-wide.
    pub inline_attempts: u64,
    /// Inline candidates spliced, process-wide.
    pub inline_successes: u64,
    /// Total phase time across sessions.
    pub phase_time: Duration,
}

impl AggregateStats {
    /// Fold one session's summary in.
    pub fn merge_session(&mut self, s: &SessionStats, phase_time: Duration) {
        self.total_code_bytes += s.code_bytes;
        self.inline_attempts += s.inline_attempts;
        self.inline_successes += s.inline_successes;
        self.phase_time += phase_time;
    }
}

// =============================================================================
// Tests
// =============================================================================
