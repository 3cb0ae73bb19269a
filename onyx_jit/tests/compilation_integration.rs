//! End-to-end tests over the full compilation pipeline.
//!
//! Everything here goes through the public surface only: a method table
//! provider, a recipe-driven importer, a deterministic byte emitter, and
//! either the driver or a directly driven pipeline when the assertions need
//! to see inside the session.
//!
//! Coverage:
//! - Phase ordering across an optimized compilation
//! - Deterministic output for identical inputs
//! - Inline failures staying below the driver
//! - The single-retry policy and its termination
//! - Optimization gating after a size-based downgrade
//! - Arena accounting across inline splices

use std::cell::Cell;
use std::collections::HashMap;

use onyx_core::{Arena, ConfigStore, JitError, JitResult, MethodHandle, ModuleHandle};
use onyx_jit::ir::locals::{LclType, LocalsTable};
use onyx_jit::ir::{BlockKind, Ir, TreeOp};
use onyx_jit::options::keys;
use onyx_jit::{
    CodeBuffer, CodeEmitter, CompileFlags, CompileOutcome, CompileOptions, Importer, JitContext,
    JitDriver, MethodInfo, MethodMetrics, MethodProvider, OptLevel, PhaseId, PhaseRunner,
    Pipeline, PipelineMode, Session, Tier,
};

// =============================================================================
// Test infrastructure
// =============================================================================

/// What the importer builds for a given method.
#[derive(Clone)]
enum Body {
    /// `return <k>`.
    RetConst(i64),
    /// Entry, a self-looping body block, and a return.
    Loop,
    /// `return <k>` preceded by one inline-candidate call.
    CallOnce(u64),
    /// Import always fails with the given error kind.
    Fail(fn() -> JitError),
}

struct Table {
    methods: HashMap<u64, MethodInfo>,
    bodies: HashMap<u64, Body>,
    imports: Cell<u32>,
}

impl Table {
    fn new() -> Self {
        Self {
            methods: HashMap::new(),
            bodies: HashMap::new(),
            imports: Cell::new(0),
        }
    }

    fn define(&mut self, handle: u64, il_bytes: usize, body: Body) {
        self.define_with_metrics(handle, il_bytes, body, MethodMetrics::default());
    }

    fn define_with_metrics(
        &mut self,
        handle: u64,
        il_bytes: usize,
        body: Body,
        mut metrics: MethodMetrics,
    ) {
        metrics.il_size = il_bytes as u32;
        let info = MethodInfo::new(MethodHandle::new(handle), ModuleHandle::new(1))
            .with_il(vec![0u8; il_bytes])
            .with_metrics(metrics)
            .with_name(format!("m{handle}"));
        self.methods.insert(handle, info);
        self.bodies.insert(handle, body);
    }
}

impl MethodProvider for Table {
    fn describe(&self, method: MethodHandle) -> JitResult<MethodInfo> {
        self.methods
            .get(&method.as_u64())
            .cloned()
            .ok_or_else(|| JitError::import_failure("unknown method"))
    }
}

impl Importer for Table {
    fn import(&self, info: &MethodInfo, ir: &mut Ir, locals: &mut LocalsTable) -> JitResult<()> {
        self.imports.set(self.imports.get() + 1);
        let body = self
            .bodies
            .get(&info.method.as_u64())
            .ok_or_else(|| JitError::import_failure("no body"))?;
        match body {
            Body::RetConst(k) => {
                let b = ir.new_block(BlockKind::Return);
                let con = ir.add_node(TreeOp::IntCon(*k), []);
                let ret = ir.add_node(TreeOp::Return, [con]);
                ir.push_stmt(b, ret);
            }
            Body::Loop => {
                locals.push(LclType::Int);
                let b0 = ir.new_block(BlockKind::Basic);
                let b1 = ir.new_block(BlockKind::Basic);
                let b2 = ir.new_block(BlockKind::Return);
                let con = ir.add_node(TreeOp::IntCon(0), []);
                let store = ir.add_node(TreeOp::LclStore(0), [con]);
                ir.push_stmt(b0, store);
                let load = ir.add_node(TreeOp::LclLoad(0), []);
                let one = ir.add_node(TreeOp::IntCon(1), []);
                let add = ir.add_node(TreeOp::Add, [load, one]);
                let back = ir.add_node(TreeOp::LclStore(0), [add]);
                ir.push_stmt(b1, back);
                let result = ir.add_node(TreeOp::LclLoad(0), []);
                let ret = ir.add_node(TreeOp::Return, [result]);
                ir.push_stmt(b2, ret);
                ir.block_mut(b0).succs.push(b1);
                ir.block_mut(b1).succs.push(b1);
                ir.block_mut(b1).succs.push(b2);
            }
            Body::CallOnce(callee) => {
                let b = ir.new_block(BlockKind::Return);
                let call = ir.add_node(
                    TreeOp::Call {
                        target: MethodHandle::new(*callee),
                        inline_candidate: true,
                    },
                    [],
                );
                ir.push_stmt(b, call);
                let con = ir.add_node(TreeOp::IntCon(0), []);
                let ret = ir.add_node(TreeOp::Return, [con]);
                ir.push_stmt(b, ret);
            }
            Body::Fail(make) => return Err(make()),
        }
        Ok(())
    }
}

/// Deterministic emitter: output depends only on the final IR shape.
struct ShapeEmitter;

impl CodeEmitter for ShapeEmitter {
    fn emit(
        &self,
        ir: &Ir,
        locals: &LocalsTable,
        _target: onyx_jit::TargetIsa,
    ) -> JitResult<CodeBuffer> {
        let mut code = vec![ir.block_count() as u8, locals.len() as u8];
        for (_, node) in ir.nodes() {
            code.push(node.args.len() as u8);
        }
        Ok(CodeBuffer {
            code,
            ..Default::default()
        })
    }
}

/// Drive the full pipeline directly so assertions can inspect the session.
fn run_session(table: &Table, config: ConfigStore, handle: u64, flags: &CompileFlags) -> Session {
    let ctx = JitContext::new(config);
    let info = table.describe(MethodHandle::new(handle)).unwrap();
    let opts = CompileOptions::decide(flags, &info.metrics, &ctx.config, info.method);
    let mut session = Session::new_root(info.method, info.module, opts, Arena::new());
    let pipeline = Pipeline {
        ctx: &ctx,
        provider: table,
        importer: table,
        emitter: &ShapeEmitter,
    };
    let mut runner = PhaseRunner::new();
    pipeline
        .run(&mut runner, &mut session, &info, PipelineMode::Full)
        .unwrap();
    session
}

// =============================================================================
// Phase ordering
// =============================================================================

#[test]
fn test_optimized_compile_orders_phases() {
    let mut table = Table::new();
    table.define(1, 8, Body::RetConst(1));
    let session = run_session(&table, ConfigStore::new(), 1, &CompileFlags::default());

    let times = &session.phase_times;
    let chain = [
        PhaseId::ValueNumber,
        PhaseId::Cse,
        PhaseId::AssertionProp,
        PhaseId::Lower,
        PhaseId::RegAlloc,
        PhaseId::CodeGen,
    ];
    for pair in chain.windows(2) {
        assert!(
            times.completes_before(pair[0], pair[1]),
            "{} must complete before {}",
            pair[0].name(),
            pair[1].name()
        );
    }
}

#[test]
fn test_trivial_method_compiles_optimized() {
    // One return block, one IL byte.
    let mut table = Table::new();
    table.define(1, 1, Body::RetConst(42));
    let ctx = JitContext::new(ConfigStore::new());
    let driver = JitDriver::new(&ctx, &table, &table, &ShapeEmitter);

    let result = driver.compile_method(MethodHandle::new(1), &CompileFlags::default());
    assert_eq!(result.outcome, CompileOutcome::Success);
    assert!(!result.retried);
    assert!(result.code.unwrap().size() > 0);
}

// =============================================================================
// Determinism
// =============================================================================

#[test]
fn test_identical_inputs_produce_identical_code() {
    let mut table = Table::new();
    table.define(1, 8, Body::RetConst(7));
    table.define(2, 8, Body::RetConst(7));
    table.define(3, 8, Body::CallOnce(2));

    let ctx = JitContext::new(ConfigStore::new());
    let driver = JitDriver::new(&ctx, &table, &table, &ShapeEmitter);
    let flags = CompileFlags::default();

    let first = driver.compile_method(MethodHandle::new(3), &flags);
    let second = driver.compile_method(MethodHandle::new(3), &flags);
    assert_eq!(first.code.unwrap().code, second.code.unwrap().code);
}

// =============================================================================
// Inlining stays below the driver
// =============================================================================

#[test]
fn test_failing_inlinee_never_fails_the_root() {
    let mut table = Table::new();
    table.define(1, 8, Body::CallOnce(2));
    table.define(2, 8, Body::Fail(|| JitError::internal("inlinee importer defect")));

    let ctx = JitContext::new(ConfigStore::new());
    let driver = JitDriver::new(&ctx, &table, &table, &ShapeEmitter);

    let result = driver.compile_method(MethodHandle::new(1), &CompileFlags::default());
    assert_eq!(result.outcome, CompileOutcome::Success);
    assert!(!result.retried);
    let snap = ctx.stats_snapshot();
    assert_eq!(snap.inline_attempts, 1);
    assert_eq!(snap.inline_successes, 0);
}

#[test]
fn test_oversized_inlinee_rejected_root_succeeds() {
    let mut table = Table::new();
    table.define(1, 8, Body::CallOnce(2));
    table.define(2, 100_000, Body::RetConst(5));

    let ctx = JitContext::new(ConfigStore::new());
    let driver = JitDriver::new(&ctx, &table, &table, &ShapeEmitter);

    let result = driver.compile_method(MethodHandle::new(1), &CompileFlags::default());
    assert_eq!(result.outcome, CompileOutcome::Success);
    assert_eq!(ctx.stats_snapshot().inline_successes, 0);
}

#[test]
fn test_inlined_call_disappears_from_caller_ir() {
    let mut table = Table::new();
    table.define(1, 8, Body::CallOnce(2));
    table.define(2, 8, Body::RetConst(5));
    let session = run_session(&table, ConfigStore::new(), 1, &CompileFlags::default());

    assert_eq!(session.stats.inline_successes, 1);
    assert!(!session
        .ir
        .nodes()
        .any(|(_, n)| matches!(n.op, TreeOp::Call { .. })));
}

// =============================================================================
// Retry policy
// =============================================================================

#[test]
fn test_internal_error_retried_exactly_once() {
    let mut table = Table::new();
    table.define(1, 8, Body::Fail(|| JitError::internal("persistent defect")));

    let ctx = JitContext::new(ConfigStore::new());
    let driver = JitDriver::new(&ctx, &table, &table, &ShapeEmitter);

    let result = driver.compile_method(MethodHandle::new(1), &CompileFlags::default());
    assert_eq!(result.outcome, CompileOutcome::InternalError);
    assert!(result.retried);
    assert!(result.code.is_none());
    // Original attempt plus one retry; never a third.
    assert_eq!(table.imports.get(), 2);
    assert_eq!(ctx.stats_snapshot().retries, 1);
}

#[test]
fn test_zero_length_il_is_internal_error_after_one_retry() {
    let mut table = Table::new();
    table.define(1, 0, Body::RetConst(1));

    let ctx = JitContext::new(ConfigStore::new());
    let driver = JitDriver::new(&ctx, &table, &table, &ShapeEmitter);

    let result = driver.compile_method(MethodHandle::new(1), &CompileFlags::default());
    assert_eq!(result.outcome, CompileOutcome::InternalError);
    assert!(result.retried);
    assert!(result.code.is_none());
    // Both attempts were rejected before the importer ran.
    assert_eq!(table.imports.get(), 0);
    assert_eq!(ctx.stats_snapshot().retries, 1);
}

// =============================================================================
// Optimization gating
// =============================================================================

#[test]
fn test_il_above_threshold_downgrades_and_skips_opt_phases() {
    let mut config = ConfigStore::new();
    config.set(keys::MAX_IL_SIZE, "100");
    let mut table = Table::new();
    // Exactly one byte above the threshold.
    table.define(1, 101, Body::RetConst(1));

    let flags = CompileFlags::default();
    let info = table.describe(MethodHandle::new(1)).unwrap();
    let opts = CompileOptions::decide(&flags, &info.metrics, &config, info.method);
    assert_eq!(opts.level, OptLevel::Minimal);
    assert!(opts.downgraded);

    let session = run_session(&table, config, 1, &flags);
    for phase in [PhaseId::SsaBuild, PhaseId::ValueNumber, PhaseId::Cse] {
        assert!(
            !session.phase_times.entered(phase),
            "{} must leave no timing entry",
            phase.name()
        );
        assert_eq!(session.phase_times.invocations(phase), 0);
    }
    assert!(session.phase_times.entered(PhaseId::MinimalLiveness));
}

#[test]
fn test_loop_at_low_tier_without_osr_escalates() {
    let mut config = ConfigStore::new();
    config.set(keys::OSR_ENABLED, "0");
    let mut table = Table::new();
    table.define_with_metrics(
        1,
        16,
        Body::Loop,
        MethodMetrics {
            has_backward_branch: true,
            block_count: 3,
            ..Default::default()
        },
    );

    let flags = CompileFlags::default().with_tier(Tier::Baseline);
    let session = run_session(&table, config, 1, &flags);

    assert_eq!(session.opts.level, OptLevel::Full);
    assert_eq!(session.opts.tier, Tier::Optimized);
    assert!(session.phase_times.entered(PhaseId::ValueNumber));
}

// =============================================================================
// Arena accounting
// =============================================================================

#[test]
fn test_one_arena_regardless_of_inline_splices() {
    let mut table = Table::new();
    // m1 -> m2 -> m3, two successful splices.
    table.define(1, 8, Body::CallOnce(2));
    table.define(2, 8, Body::CallOnce(3));
    table.define(3, 8, Body::RetConst(9));

    let ctx = JitContext::new(ConfigStore::new());
    let driver = JitDriver::new(&ctx, &table, &table, &ShapeEmitter);

    let result = driver.compile_method(MethodHandle::new(1), &CompileFlags::default());
    assert_eq!(result.outcome, CompileOutcome::Success);

    let snap = ctx.stats_snapshot();
    assert_eq!(snap.inline_successes, 2);
    assert_eq!(snap.arenas_allocated, 1);
    assert_eq!(snap.arenas_released, 1);
}
