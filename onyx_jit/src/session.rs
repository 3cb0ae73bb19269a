//! Per-compilation session state.
//!
//! A [`Session`] holds everything one compilation touches: the IR being built,
//! the locals table, the decided options, per-phase bookkeeping, and (for root
//! compilations only) the backing arena. Sessions never outlive one driver
//! invocation, with a single exception: a root session caches one nested
//! session for inline attempts and reuses it across candidates.

use onyx_core::{Arena, ArenaMark, JitError, JitResult, MethodHandle, ModuleHandle};

use crate::external::CodeBuffer;
use crate::ir::locals::LocalsTable;
use crate::ir::Ir;
use crate::options::{CompileOptions, OptLevel};
use crate::phase::PhaseId;
use crate::stats::{PhaseTimes, SessionStats};

// =============================================================================
// Diagnostics
// =============================================================================

/// Diagnostic side channel. Writing here must never change compilation
/// behavior; it exists so dumps and tests can observe phase traffic.
#[derive(Debug, Default)]
pub struct SessionDiags {
    /// Dump lines, in emission order.
    pub lines: Vec<String>,
}

impl SessionDiags {
    /// Append a dump line.
    pub fn push(&mut self, line: String) {
        self.lines.push(line);
    }

    /// Whether any line contains `needle`.
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.iter().any(|l| l.contains(needle))
    }
}

// =============================================================================
// Session
// =============================================================================

/// State of one compilation, root or inlinee.
#[derive(Debug)]
pub struct Session {
    /// Method being compiled.
    pub method: MethodHandle,
    /// Module defining it.
    pub module: ModuleHandle,
    /// Decided options.
    pub opts: CompileOptions,
    /// The IR under construction.
    pub ir: Ir,
    /// Local variable descriptors.
    pub locals: LocalsTable,
    /// Per-phase timing and invocation records.
    pub phase_times: PhaseTimes,
    /// Summary counters.
    pub stats: SessionStats,
    /// Diagnostic side channel.
    pub diags: SessionDiags,
    /// Inlining recursion depth; zero for the root.
    pub inline_depth: u32,
    /// Cumulative IL bytes consumed by spliced inlinees (root only).
    pub inline_budget_used: u32,
    opts_locked: bool,
    most_recent_phase: Option<PhaseId>,
    arena: Option<Arena>,
    inlinee: Option<Box<Session>>,
    code: Option<CodeBuffer>,
}

impl Session {
    /// Root session. Takes ownership of the backing arena; the driver
    /// reclaims it when the invocation finishes.
    #[must_use]
    pub fn new_root(
        method: MethodHandle,
        module: ModuleHandle,
        opts: CompileOptions,
        arena: Arena,
    ) -> Self {
        Self {
            method,
            module,
            opts,
            ir: Ir::new(),
            locals: LocalsTable::new(),
            phase_times: PhaseTimes::new(),
            stats: SessionStats::default(),
            diags: SessionDiags::default(),
            inline_depth: 0,
            inline_budget_used: 0,
            opts_locked: false,
            most_recent_phase: None,
            arena: Some(arena),
            inlinee: None,
            code: None,
        }
    }

    /// Nested session for an inline attempt. Carries no arena of its own;
    /// inlinee allocations charge the root's arena.
    #[must_use]
    pub fn new_inlinee(
        method: MethodHandle,
        module: ModuleHandle,
        opts: CompileOptions,
        depth: u32,
    ) -> Self {
        Self {
            method,
            module,
            opts,
            ir: Ir::new(),
            locals: LocalsTable::new(),
            phase_times: PhaseTimes::new(),
            stats: SessionStats::default(),
            diags: SessionDiags::default(),
            inline_depth: depth,
            inline_budget_used: 0,
            opts_locked: false,
            most_recent_phase: None,
            arena: None,
            inlinee: None,
            code: None,
        }
    }

    /// Re-arm a cached nested session for the next inline candidate.
    pub fn reset_for(
        &mut self,
        method: MethodHandle,
        module: ModuleHandle,
        opts: CompileOptions,
        depth: u32,
    ) {
        self.method = method;
        self.module = module;
        self.opts = opts;
        self.ir = Ir::new();
        self.locals = LocalsTable::new();
        self.phase_times.clear();
        self.stats = SessionStats::default();
        self.diags.lines.clear();
        self.inline_depth = depth;
        self.inline_budget_used = 0;
        self.opts_locked = false;
        self.most_recent_phase = None;
        self.code = None;
    }

    /// Whether this session compiles an inline candidate.
    #[inline]
    #[must_use]
    pub fn is_inlinee(&self) -> bool {
        self.inline_depth > 0
    }

    // -------------------------------------------------------------------------
    // Options lifecycle
    // -------------------------------------------------------------------------

    /// Seal the options record. Called when the morph-init phase begins;
    /// afterwards no further level changes are sanctioned.
    pub fn lock_opts(&mut self) {
        self.opts_locked = true;
    }

    /// Whether the options record is sealed.
    #[inline]
    #[must_use]
    pub fn opts_locked(&self) -> bool {
        self.opts_locked
    }

    /// The one sanctioned late change: drop to minimal optimization before
    /// the record seals. Idempotent when already minimal; an attempt after
    /// sealing is a compiler defect.
    pub fn downgrade_to_min_opts(&mut self, reason: &str) -> JitResult<()> {
        if self.opts_locked {
            return Err(JitError::internal(format!(
                "optimization downgrade after options locked: {reason}"
            )));
        }
        if self.opts.level != OptLevel::Minimal {
            self.opts.level = OptLevel::Minimal;
            self.opts.downgraded = true;
            self.dump(format!("downgrade to min opts: {reason}"));
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Phase bookkeeping
    // -------------------------------------------------------------------------

    /// Record the phase currently executing, for failure attribution.
    pub fn set_most_recent_phase(&mut self, phase: PhaseId) {
        self.most_recent_phase = Some(phase);
    }

    /// The phase most recently entered, if any.
    #[inline]
    #[must_use]
    pub fn most_recent_phase(&self) -> Option<PhaseId> {
        self.most_recent_phase
    }

    /// Emit a dump line when dumping is enabled. Never affects behavior.
    pub fn dump(&mut self, line: String) {
        if self.opts.dump_enabled {
            self.diags.push(line);
        }
    }

    // -------------------------------------------------------------------------
    // Arena (root sessions only)
    // -------------------------------------------------------------------------

    /// Allocate from the backing arena. Inlinee IR charges the root's arena
    /// via the inline machinery, not through its own session.
    pub fn arena_alloc(&mut self, size: usize) -> JitResult<(usize, usize)> {
        match self.arena.as_mut() {
            Some(arena) => Ok(arena.alloc(size)),
            None => Err(JitError::internal("arena allocation on inlinee session")),
        }
    }

    /// Snapshot the arena position before a speculative allocation burst.
    #[must_use]
    pub fn arena_mark(&self) -> Option<ArenaMark> {
        self.arena.as_ref().map(Arena::mark)
    }

    /// Discard everything allocated since `mark`.
    pub fn arena_rewind(&mut self, mark: ArenaMark) {
        if let Some(arena) = self.arena.as_mut() {
            arena.rewind(mark);
        }
    }

    /// Whether this session owns an arena.
    #[inline]
    #[must_use]
    pub fn has_arena(&self) -> bool {
        self.arena.is_some()
    }

    /// Reclaim the arena at the end of the invocation.
    pub fn take_arena(&mut self) -> Option<Arena> {
        self.arena.take()
    }

    // -------------------------------------------------------------------------
    // Cached inlinee session
    // -------------------------------------------------------------------------

    /// Detach the cached nested session, if one exists.
    pub fn take_inlinee(&mut self) -> Option<Box<Session>> {
        self.inlinee.take()
    }

    /// Cache a nested session for reuse by the next candidate.
    pub fn store_inlinee(&mut self, inlinee: Box<Session>) {
        self.inlinee = Some(inlinee);
    }

    // -------------------------------------------------------------------------
    // Output
    // -------------------------------------------------------------------------

    /// Store the emitted code buffer.
    pub fn store_code(&mut self, code: CodeBuffer) {
        self.stats.code_bytes = u64::from(code.size());
        self.code = Some(code);
    }

    /// Detach the emitted code buffer.
    pub fn take_code(&mut self) -> Option<CodeBuffer> {
        self.code.take()
    }
}

// =============================================================================
// Tests
// =============================================================================
