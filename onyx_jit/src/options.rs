//! Compilation options and the optimization-level decision.
//!
//! Each session carries an options record set once during initialization and
//! read-only thereafter, with a single sanctioned exception: an early
//! optimization-level downgrade, armed until the morph-init phase locks the
//! record. The level decision itself runs exactly once, before any optimizing
//! phase, from the externally requested tier plus the method's complexity
//! metrics and the configured thresholds.

use onyx_core::{ConfigStore, MethodHandle};

// =============================================================================
// Config keys
// =============================================================================

/// Configuration keys read at session initialization. Numeric thresholds are
/// configuration inputs, never literals at decision sites.
pub mod keys {
    /// IL size above which the compiler downgrades to minimal optimization.
    pub const MAX_IL_SIZE: &str = "max-il-size";
    /// Basic-block count threshold for the minimal downgrade.
    pub const MAX_BLOCK_COUNT: &str = "max-block-count";
    /// Local-variable count threshold for the minimal downgrade.
    pub const MAX_LOCAL_COUNT: &str = "max-local-count";
    /// Instruction count threshold for the minimal downgrade.
    pub const MAX_INSTR_COUNT: &str = "max-instr-count";
    /// Whether on-stack replacement is available on this host.
    pub const OSR_ENABLED: &str = "osr-enabled";
    /// Iteration count for the optimize-repeat loop.
    pub const OPT_REPEAT_COUNT: &str = "opt-repeat-count";
    /// Percent of methods stress-forced to minimal by handle hash (0 = off).
    pub const STRESS_RATE: &str = "stress-rate";
    /// Enable post-phase dump lines.
    pub const DUMP: &str = "dump";
    /// Enable post-phase consistency checks.
    pub const CHECKS: &str = "checks-enabled";
    /// Enable per-phase timing.
    pub const TIMING: &str = "timing-enabled";
    /// Enable stack-guard cookie insertion.
    pub const GS_COOKIE: &str = "gs-cookie";
    /// Maximum IL size of an inline candidate.
    pub const INLINE_MAX_IL: &str = "inline-max-il";
    /// Maximum inlining recursion depth.
    pub const INLINE_MAX_DEPTH: &str = "inline-max-depth";
    /// Cumulative inlined IL budget per root compilation.
    pub const INLINE_BUDGET: &str = "inline-budget";
    /// Comma-separated module ids never inlined from.
    pub const EXCLUDED_MODULES: &str = "excluded-modules";
    /// Host target override, for cross-targeting tests.
    pub const TARGET: &str = "target";
}

/// Default minimal-optimization thresholds.
pub mod defaults {
    /// Default for [`super::keys::MAX_IL_SIZE`].
    pub const MAX_IL_SIZE: u32 = 60_000;
    /// Default for [`super::keys::MAX_BLOCK_COUNT`].
    pub const MAX_BLOCK_COUNT: u32 = 10_000;
    /// Default for [`super::keys::MAX_LOCAL_COUNT`].
    pub const MAX_LOCAL_COUNT: u32 = 400;
    /// Default for [`super::keys::MAX_INSTR_COUNT`].
    pub const MAX_INSTR_COUNT: u32 = 20_000;
}

// =============================================================================
// Targets, tiers, levels
// =============================================================================

/// Target instruction set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetIsa {
    /// x86-64.
    X64,
    /// AArch64.
    Arm64,
}

impl TargetIsa {
    /// Architecture name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            TargetIsa::X64 => "x64",
            TargetIsa::Arm64 => "arm64",
        }
    }

    /// The architecture this process runs on.
    #[must_use]
    pub fn native() -> Self {
        if cfg!(target_arch = "aarch64") {
            TargetIsa::Arm64
        } else {
            TargetIsa::X64
        }
    }

    /// Parse an architecture name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "x64" => Some(TargetIsa::X64),
            "arm64" => Some(TargetIsa::Arm64),
            _ => None,
        }
    }
}

/// Externally requested compilation tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Quick-start tier: fast compilation, minimal optimization.
    Baseline,
    /// Fully optimizing tier.
    Optimized,
}

/// Internal optimization level, decided once per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptLevel {
    /// Full optimization.
    Full,
    /// Minimal optimization.
    Minimal,
    /// Debug-friendly code generation.
    Debug,
}

// =============================================================================
// External request
// =============================================================================

/// The host's compilation request flags.
#[derive(Debug, Clone)]
pub struct CompileFlags {
    /// Requested tier.
    pub tier: Tier,
    /// Debuggable code requested.
    pub debug_code: bool,
    /// Profile instrumentation requested.
    pub instrument: bool,
    /// OSR entry offset; `Some` makes this an OSR compilation.
    pub osr_offset: Option<u32>,
    /// Force minimal optimization.
    pub force_min_opts: bool,
    /// Requested target ISA.
    pub target: TargetIsa,
}

impl Default for CompileFlags {
    fn default() -> Self {
        Self {
            tier: Tier::Optimized,
            debug_code: false,
            instrument: false,
            osr_offset: None,
            force_min_opts: false,
            target: TargetIsa::native(),
        }
    }
}

impl CompileFlags {
    /// Request a specific tier.
    #[must_use]
    pub fn with_tier(mut self, tier: Tier) -> Self {
        self.tier = tier;
        self
    }

    /// Request profile instrumentation.
    #[must_use]
    pub fn with_instrumentation(mut self) -> Self {
        self.instrument = true;
        self
    }

    /// Request an OSR compilation at the given offset.
    #[must_use]
    pub fn with_osr_offset(mut self, offset: u32) -> Self {
        self.osr_offset = Some(offset);
        self
    }

    /// Request a specific target.
    #[must_use]
    pub fn with_target(mut self, target: TargetIsa) -> Self {
        self.target = target;
        self
    }
}

// =============================================================================
// Method complexity metrics
// =============================================================================

/// Complexity metrics of the method being compiled, as reported by the
/// metadata provider before importation.
#[derive(Debug, Clone, Copy, Default)]
pub struct MethodMetrics {
    /// IL size in bytes.
    pub il_size: u32,
    /// Argument count.
    pub arg_count: u32,
    /// Local variable count.
    pub local_count: u32,
    /// IL instruction count.
    pub instr_count: u32,
    /// Estimated basic-block count.
    pub block_count: u32,
    /// Whether the method contains a backward branch.
    pub has_backward_branch: bool,
    /// Whether the method contains an explicit tail call.
    pub has_tail_call: bool,
    /// Exception-handling region count.
    pub eh_region_count: u32,
}

// =============================================================================
// Per-session options
// =============================================================================

/// Immutable-after-initialization record of one compilation's configuration.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Decided optimization level.
    pub level: OptLevel,
    /// Effective tier (may be escalated above the request).
    pub tier: Tier,
    /// Instrumentation enabled.
    pub instrument: bool,
    /// OSR entry offset, if this is an OSR compilation.
    pub osr_offset: Option<u32>,
    /// Target ISA.
    pub target: TargetIsa,
    /// The compiler downgraded unilaterally due to complexity; surfaced to
    /// the external caller.
    pub downgraded: bool,
    /// Forced minimal by the stress sampler.
    pub stress_selected: bool,
    /// Iterations of the optimize-repeat loop.
    pub repeat_opt_count: u32,
    /// Whether OSR is available at all on this host.
    pub osr_enabled: bool,
    /// Dump hook enabled.
    pub dump_enabled: bool,
    /// Post-phase consistency checks enabled.
    pub checks_enabled: bool,
    /// Per-phase timing enabled.
    pub timing_enabled: bool,
    /// Stack-guard cookie insertion enabled.
    pub gs_cookie: bool,
}

impl CompileOptions {
    /// Whether the optimizing phase block runs.
    #[inline]
    #[must_use]
    pub fn optimizing(&self) -> bool {
        self.level == OptLevel::Full
    }

    /// Decide this session's options. Runs exactly once, before morph-init;
    /// the result is immutable afterwards except for the single sanctioned
    /// early downgrade.
    #[must_use]
    pub fn decide(
        flags: &CompileFlags,
        metrics: &MethodMetrics,
        config: &ConfigStore,
        method: MethodHandle,
    ) -> Self {
        let osr_enabled = config.get_bool(keys::OSR_ENABLED, true);
        let stress_rate = config.get_u32(keys::STRESS_RATE, 0).min(100);

        let mut downgraded = false;
        let mut stress_selected = false;
        let mut tier = flags.tier;

        let level = if flags.force_min_opts {
            OptLevel::Minimal
        } else if flags.debug_code {
            OptLevel::Debug
        } else if Self::exceeds_complexity_limits(metrics, config) {
            downgraded = true;
            OptLevel::Minimal
        } else if stress_rate > 0 && method.stable_hash() % 100 < u64::from(stress_rate) {
            stress_selected = true;
            OptLevel::Minimal
        } else if flags.osr_offset.is_some() {
            // An OSR compilation is by construction an optimized rebuild.
            tier = Tier::Optimized;
            OptLevel::Full
        } else if flags.tier == Tier::Baseline && Self::should_escalate(flags, metrics, osr_enabled)
        {
            tier = Tier::Optimized;
            OptLevel::Full
        } else {
            match flags.tier {
                Tier::Baseline => OptLevel::Minimal,
                Tier::Optimized => OptLevel::Full,
            }
        };

        Self {
            level,
            tier,
            instrument: flags.instrument,
            osr_offset: flags.osr_offset,
            target: flags.target,
            downgraded,
            stress_selected,
            repeat_opt_count: config.get_u32(keys::OPT_REPEAT_COUNT, 1).max(1),
            osr_enabled,
            dump_enabled: config.get_bool(keys::DUMP, false),
            checks_enabled: config.get_bool(keys::CHECKS, true),
            timing_enabled: config.get_bool(keys::TIMING, true),
            gs_cookie: config.get_bool(keys::GS_COOKIE, true),
        }
    }

    /// Options for an inlinee session: the caller's options minus
    /// instrumentation and OSR, which apply only to the root method.
    #[must_use]
    pub fn for_inlinee(&self) -> Self {
        Self {
            instrument: false,
            osr_offset: None,
            downgraded: false,
            stress_selected: false,
            ..self.clone()
        }
    }

    fn exceeds_complexity_limits(metrics: &MethodMetrics, config: &ConfigStore) -> bool {
        metrics.il_size > config.get_u32(keys::MAX_IL_SIZE, defaults::MAX_IL_SIZE)
            || metrics.block_count > config.get_u32(keys::MAX_BLOCK_COUNT, defaults::MAX_BLOCK_COUNT)
            || metrics.local_count > config.get_u32(keys::MAX_LOCAL_COUNT, defaults::MAX_LOCAL_COUNT)
            || metrics.instr_count > config.get_u32(keys::MAX_INSTR_COUNT, defaults::MAX_INSTR_COUNT)
    }

    /// Whether a low-tier request should be promoted to full optimization:
    /// a loop with OSR unsupported or disabled would otherwise trap the
    /// method in the low tier, and an explicit tail call is incompatible
    /// with low-tier instrumentation.
    fn should_escalate(flags: &CompileFlags, metrics: &MethodMetrics, osr_enabled: bool) -> bool {
        (metrics.has_backward_branch && !osr_enabled)
            || (metrics.has_tail_call && flags.instrument)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn plain_metrics() -> MethodMetrics {
        MethodMetrics {
            il_size: 10,
            instr_count: 5,
            block_count: 1,
            local_count: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_optimized_tier_gets_full() {
        let opts = CompileOptions::decide(
            &CompileFlags::default(),
            &plain_metrics(),
            &ConfigStore::new(),
            MethodHandle::new(1),
        );
        assert_eq!(opts.level, OptLevel::Full);
        assert!(opts.optimizing());
        assert!(!opts.downgraded);
    }

    #[test]
    fn test_baseline_tier_gets_minimal() {
        let flags = CompileFlags::default().with_tier(Tier::Baseline);
        let opts = CompileOptions::decide(
            &flags,
            &plain_metrics(),
            &ConfigStore::new(),
            MethodHandle::new(1),
        );
        assert_eq!(opts.level, OptLevel::Minimal);
        assert!(!opts.optimizing());
    }

    #[test]
    fn test_force_min_opts_wins() {
        let flags = CompileFlags {
            force_min_opts: true,
            ..CompileFlags::default()
        };
        let opts = CompileOptions::decide(
            &flags,
            &plain_metrics(),
            &ConfigStore::new(),
            MethodHandle::new(1),
        );
        assert_eq!(opts.level, OptLevel::Minimal);
        assert!(!opts.downgraded);
    }

    #[test]
    fn test_debug_code_gets_debug_level() {
        let flags = CompileFlags {
            debug_code: true,
            ..CompileFlags::default()
        };
        let opts = CompileOptions::decide(
            &flags,
            &plain_metrics(),
            &ConfigStore::new(),
            MethodHandle::new(1),
        );
        assert_eq!(opts.level, OptLevel::Debug);
    }

    #[test]
    fn test_complexity_downgrade_is_surfaced() {
        let mut config = ConfigStore::new();
        config.set(keys::MAX_IL_SIZE, "100");
        let metrics = MethodMetrics {
            il_size: 101,
            ..plain_metrics()
        };
        let opts = CompileOptions::decide(
            &CompileFlags::default(),
            &metrics,
            &config,
            MethodHandle::new(1),
        );
        assert_eq!(opts.level, OptLevel::Minimal);
        assert!(opts.downgraded);
    }

    #[test]
    fn test_exactly_at_threshold_is_not_downgraded() {
        let mut config = ConfigStore::new();
        config.set(keys::MAX_IL_SIZE, "100");
        let metrics = MethodMetrics {
            il_size: 100,
            ..plain_metrics()
        };
        let opts = CompileOptions::decide(
            &CompileFlags::default(),
            &metrics,
            &config,
            MethodHandle::new(1),
        );
        assert_eq!(opts.level, OptLevel::Full);
    }

    #[test]
    fn test_loop_without_osr_escalates_baseline() {
        let mut config = ConfigStore::new();
        config.set(keys::OSR_ENABLED, "0");
        let metrics = MethodMetrics {
            has_backward_branch: true,
            ..plain_metrics()
        };
        let flags = CompileFlags::default().with_tier(Tier::Baseline);
        let opts = CompileOptions::decide(&flags, &metrics, &config, MethodHandle::new(1));

        assert_eq!(opts.level, OptLevel::Full);
        assert_eq!(opts.tier, Tier::Optimized);
    }

    #[test]
    fn test_loop_with_osr_stays_baseline() {
        let metrics = MethodMetrics {
            has_backward_branch: true,
            ..plain_metrics()
        };
        let flags = CompileFlags::default().with_tier(Tier::Baseline);
        let opts = CompileOptions::decide(
            &flags,
            &metrics,
            &ConfigStore::new(),
            MethodHandle::new(1),
        );
        assert_eq!(opts.level, OptLevel::Minimal);
        assert_eq!(opts.tier, Tier::Baseline);
    }

    #[test]
    fn test_tail_call_under_instrumentation_escalates() {
        let metrics = MethodMetrics {
            has_tail_call: true,
            ..plain_metrics()
        };
        let flags = CompileFlags::default()
            .with_tier(Tier::Baseline)
            .with_instrumentation();
        let opts = CompileOptions::decide(
            &flags,
            &metrics,
            &ConfigStore::new(),
            MethodHandle::new(1),
        );
        assert_eq!(opts.level, OptLevel::Full);
    }

    #[test]
    fn test_stress_rate_hundred_forces_minimal() {
        let mut config = ConfigStore::new();
        config.set(keys::STRESS_RATE, "100");
        let opts = CompileOptions::decide(
            &CompileFlags::default(),
            &plain_metrics(),
            &config,
            MethodHandle::new(7),
        );
        assert_eq!(opts.level, OptLevel::Minimal);
        assert!(opts.stress_selected);
        assert!(!opts.downgraded);
    }

    #[test]
    fn test_inlinee_options_strip_root_only_state() {
        let flags = CompileFlags::default()
            .with_instrumentation()
            .with_osr_offset(12);
        let opts = CompileOptions::decide(
            &flags,
            &plain_metrics(),
            &ConfigStore::new(),
            MethodHandle::new(1),
        );
        let inlinee = opts.for_inlinee();
        assert!(!inlinee.instrument);
        assert!(inlinee.osr_offset.is_none());
        assert_eq!(inlinee.level, opts.level);
    }

    #[test]
    fn test_repeat_count_floor_is_one() {
        let mut config = ConfigStore::new();
        config.set(keys::OPT_REPEAT_COUNT, "0");
        let opts = CompileOptions::decide(
            &CompileFlags::default(),
            &plain_metrics(),
            &config,
            MethodHandle::new(1),
        );
        assert_eq!(opts.repeat_opt_count, 1);
    }
}
