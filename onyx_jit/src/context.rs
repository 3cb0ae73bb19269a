//! Process-wide compiler context.
//!
//! One [`JitContext`] lives for the life of the host process. It owns the
//! configuration store, the aggregate statistics, and the lazily parsed
//! policy lists shared by every compilation.

use std::sync::OnceLock;

use onyx_core::{ConfigStore, ModuleHandle};
use parking_lot::Mutex;

use crate::options::{keys, TargetIsa};
use crate::stats::{AggregateStats, SessionStats};

/// Shared state for all compilations in this process.
#[derive(Debug)]
pub struct JitContext {
    /// Configuration store, read-only after construction.
    pub config: ConfigStore,
    host: TargetIsa,
    stats: Mutex<AggregateStats>,
    excluded_modules: OnceLock<Vec<u64>>,
}

impl JitContext {
    /// Context over the given configuration. The host target defaults to the
    /// native architecture unless the configuration overrides it.
    #[must_use]
    pub fn new(config: ConfigStore) -> Self {
        let host = config
            .get(keys::TARGET)
            .and_then(TargetIsa::parse)
            .unwrap_or_else(TargetIsa::native);
        Self {
            config,
            host,
            stats: Mutex::new(AggregateStats::default()),
            excluded_modules: OnceLock::new(),
        }
    }

    /// The architecture this context generates code for.
    #[inline]
    #[must_use]
    pub fn host(&self) -> TargetIsa {
        self.host
    }

    /// Modules the inliner never pulls code from. Parsed once from the
    /// comma-separated configuration value.
    pub fn excluded_modules(&self) -> &[u64] {
        self.excluded_modules.get_or_init(|| {
            self.config
                .get(keys::EXCLUDED_MODULES)
                .map(|raw| {
                    raw.split(',')
                        .filter_map(|s| s.trim().parse::<u64>().ok())
                        .collect()
                })
                .unwrap_or_default()
        })
    }

    /// Whether inlining from `module` is vetoed by policy.
    #[must_use]
    pub fn module_excluded(&self, module: ModuleHandle) -> bool {
        self.excluded_modules().contains(&module.as_u64())
    }

    // -------------------------------------------------------------------------
    // Statistics
    // -------------------------------------------------------------------------

    /// Record that an arena was handed to a root compilation.
    pub fn record_arena_allocated(&self) {
        self.stats.lock().arenas_allocated += 1;
    }

    /// Record that the driver reclaimed an arena.
    pub fn record_arena_released(&self) {
        self.stats.lock().arenas_released += 1;
    }

    /// Record a driver invocation that produced code.
    pub fn record_compiled(&self) {
        self.stats.lock().methods_compiled += 1;
    }

    /// Record a retry attempt.
    pub fn record_retry(&self) {
        self.stats.lock().retries += 1;
    }

    /// Record a terminal failure.
    pub fn record_failure(&self) {
        self.stats.lock().failures += 1;
    }

    /// Record a skipped method.
    pub fn record_skipped(&self) {
        self.stats.lock().skipped += 1;
    }

    /// Fold one session's summary into the aggregate.
    pub fn accumulate_session(&self, session_stats: &SessionStats, phase_time: std::time::Duration) {
        self.stats.lock().merge_session(session_stats, phase_time);
    }

    /// Copy of the aggregate statistics.
    #[must_use]
    pub fn stats_snapshot(&self) -> AggregateStats {
        *self.stats.lock()
    }
}

// =============================================================================
// Tests
// =============================================================================
