//! Inlining via nested import-only compilations.
//!
//! Each candidate call site gets its own nested session, driven through the
//! import segment of the pipeline only. A finished inlinee body is spliced
//! into the caller's IR in place of the call; a rejected candidate leaves the
//! caller exactly as it was, including the arena position. Failures inside an
//! inlinee compilation convert into rejection verdicts and never abort the
//! root compilation.
//!
//! The nested session is cached on the root session and reused across
//! candidates, so a method with many call sites pays the session setup once.

use onyx_core::{ConfigStore, JitResult};

use crate::external::MethodInfo;
use crate::ir::{BlockId, BlockKind, NodeId, TreeOp};
use crate::options::keys;
use crate::pipeline::{Pipeline, PipelineMode};
use crate::runner::{PhaseRunner, PhaseStatus};
use crate::session::Session;

// =============================================================================
// Verdicts and limits
// =============================================================================

/// Why a candidate was or was not inlined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InlineVerdict {
    /// Body spliced into the caller.
    Inlined,
    /// Candidate IL exceeds the size limit.
    TooLarge,
    /// Candidate uses a construct the inliner cannot carry across.
    ForbiddenConstruct,
    /// Candidate's module is excluded by policy.
    PolicyVeto,
    /// The nested compilation failed; the failure stops here.
    CompilationError,
    /// Recursion depth or the cumulative IL budget is spent.
    BudgetExhausted,
}

impl InlineVerdict {
    /// Short label for dump lines.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            InlineVerdict::Inlined => "inlined",
            InlineVerdict::TooLarge => "too large",
            InlineVerdict::ForbiddenConstruct => "forbidden construct",
            InlineVerdict::PolicyVeto => "policy veto",
            InlineVerdict::CompilationError => "compilation error",
            InlineVerdict::BudgetExhausted => "budget exhausted",
        }
    }
}

/// Inlining limits, read once per phase from configuration.
#[derive(Debug, Clone, Copy)]
pub struct InlineLimits {
    /// Maximum candidate IL size in bytes.
    pub max_il: u32,
    /// Maximum recursion depth.
    pub max_depth: u32,
    /// Cumulative inlined IL budget for the whole root compilation.
    pub budget: u32,
}

impl InlineLimits {
    /// Read the limits, falling back to the stock policy.
    #[must_use]
    pub fn from_config(config: &ConfigStore) -> Self {
        Self {
            max_il: config.get_u32(keys::INLINE_MAX_IL, 100),
            max_depth: config.get_u32(keys::INLINE_MAX_DEPTH, 8),
            budget: config.get_u32(keys::INLINE_BUDGET, 4096),
        }
    }
}

// =============================================================================
// The inlining phase
// =============================================================================

/// One pending candidate call site.
struct Candidate {
    block: BlockId,
    call: NodeId,
    depth: u32,
}

/// Drive the inlining worklist over the session's call sites. Sites exposed
/// by a successful splice are appended at the next depth, so inlining
/// proceeds transitively up to the depth limit.
pub(crate) fn run_inline_phase(
    p: &Pipeline<'_>,
    session: &mut Session,
    _info: &MethodInfo,
) -> JitResult<PhaseStatus> {
    let limits = InlineLimits::from_config(&p.ctx.config);
    let mut worklist = collect_candidates(session, 1);
    let mut spliced = 0u64;

    while let Some(candidate) = worklist.pop() {
        let TreeOp::Call { target, .. } = session.ir.node(candidate.call).op else {
            continue;
        };
        session.stats.inline_attempts += 1;
        let (verdict, copied) = try_inline(p, session, &candidate, &limits)?;
        session.dump(format!(
            "inline candidate {}: {}",
            target.as_u64(),
            verdict.as_str()
        ));
        if verdict == InlineVerdict::Inlined {
            session.stats.inline_successes += 1;
            spliced += 1;
            // The spliced body may expose new candidates. Only statement
            // roots qualify, and only among the freshly copied nodes.
            let stmts = &session.ir.block(candidate.block).stmts;
            let fresh: Vec<Candidate> = copied
                .into_iter()
                .filter(|id| stmts.contains(id))
                .filter(|&id| {
                    matches!(
                        session.ir.node(id).op,
                        TreeOp::Call {
                            inline_candidate: true,
                            ..
                        }
                    )
                })
                .map(|call| Candidate {
                    block: candidate.block,
                    call,
                    depth: candidate.depth + 1,
                })
                .collect();
            worklist.extend(fresh);
        }
    }

    Ok(if spliced > 0 {
        PhaseStatus::Everything
    } else {
        PhaseStatus::Nothing
    })
}

fn collect_candidates(session: &Session, depth: u32) -> Vec<Candidate> {
    let mut found = Vec::new();
    for block in session.ir.live_blocks() {
        for &stmt in &block.stmts {
            if matches!(
                session.ir.node(stmt).op,
                TreeOp::Call {
                    inline_candidate: true,
                    ..
                }
            ) {
                found.push(Candidate {
                    block: block.id,
                    call: stmt,
                    depth,
                });
            }
        }
    }
    found
}

/// Judge and, if accepted, splice one candidate. Only compiler defects in the
/// caller's own state propagate as errors; everything that goes wrong with
/// the candidate itself becomes a verdict.
fn try_inline(
    p: &Pipeline<'_>,
    session: &mut Session,
    candidate: &Candidate,
    limits: &InlineLimits,
) -> JitResult<(InlineVerdict, Vec<NodeId>)> {
    let TreeOp::Call { target, .. } = session.ir.node(candidate.call).op else {
        return Ok((InlineVerdict::CompilationError, Vec::new()));
    };

    if candidate.depth > limits.max_depth {
        return Ok((InlineVerdict::BudgetExhausted, Vec::new()));
    }

    let Ok(callee) = p.provider.describe(target) else {
        return Ok((InlineVerdict::CompilationError, Vec::new()));
    };
    if p.ctx.module_excluded(callee.module) {
        return Ok((InlineVerdict::PolicyVeto, Vec::new()));
    }
    if callee.il_size() > limits.max_il {
        return Ok((InlineVerdict::TooLarge, Vec::new()));
    }
    if callee.has_eh() {
        return Ok((InlineVerdict::ForbiddenConstruct, Vec::new()));
    }
    if session.inline_budget_used + callee.il_size() > limits.budget {
        return Ok((InlineVerdict::BudgetExhausted, Vec::new()));
    }

    // Everything the attempt allocates is provisional until the splice.
    let mark = session.arena_mark();
    session.arena_alloc(callee.il_size() as usize)?;

    let mut nested = match session.take_inlinee() {
        Some(mut cached) => {
            cached.reset_for(
                callee.method,
                callee.module,
                session.opts.for_inlinee(),
                candidate.depth,
            );
            cached
        }
        None => Box::new(Session::new_inlinee(
            callee.method,
            callee.module,
            session.opts.for_inlinee(),
            candidate.depth,
        )),
    };

    let mut runner = PhaseRunner::new();
    let compiled = p.run(&mut runner, &mut nested, &callee, PipelineMode::ImportOnly);

    let outcome = match compiled {
        Err(_) => {
            if let Some(mark) = mark {
                session.arena_rewind(mark);
            }
            (InlineVerdict::CompilationError, Vec::new())
        }
        Ok(()) if has_forbidden_construct(&nested) => {
            if let Some(mark) = mark {
                session.arena_rewind(mark);
            }
            (InlineVerdict::ForbiddenConstruct, Vec::new())
        }
        Ok(()) => {
            let copied = splice(session, &nested, candidate);
            session.inline_budget_used += callee.il_size();
            session.stats.inlined_il_bytes += u64::from(callee.il_size());
            (InlineVerdict::Inlined, copied)
        }
    };

    session.store_inlinee(nested);
    Ok(outcome)
}

/// Constructs the splice cannot carry into the caller.
fn has_forbidden_construct(nested: &Session) -> bool {
    nested
        .ir
        .live_blocks()
        .any(|b| b.kind == BlockKind::CallFinally)
        || nested
            .ir
            .nodes()
            .any(|(_, n)| matches!(n.op, TreeOp::Patchpoint { .. }))
}

/// Copy the inlinee body into the caller, rebasing its local numbers onto
/// the caller's table.
fn splice(session: &mut Session, nested: &Session, candidate: &Candidate) -> Vec<NodeId> {
    let lcl_base = session.locals.len() as u32;
    for var in nested.locals.iter() {
        session.locals.push(var.ty);
    }

    let copied = session
        .ir
        .splice_inlinee(&nested.ir, candidate.block, candidate.call);
    for &id in &copied {
        let node = session.ir.node_mut(id);
        match &mut node.op {
            TreeOp::LclLoad(l) | TreeOp::LclStore(l) | TreeOp::AddrOf(l) => *l += lcl_base,
            _ => {}
        }
    }
    copied
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::JitContext;
    use crate::external::{CodeBuffer, CodeEmitter, EhKind, EhRegion, Importer, MethodProvider};
    use crate::ir::locals::{LclType, LocalsTable};
    use crate::ir::Ir;
    use crate::options::{CompileFlags, CompileOptions, MethodMetrics, TargetIsa};
    use onyx_core::{Arena, JitError, MethodHandle, ModuleHandle};
    use rustc_hash::FxHashMap;

    /// Provider over a fixed method table.
    struct TableProvider {
        methods: FxHashMap<u64, MethodInfo>,
    }

    impl MethodProvider for TableProvider {
        fn describe(&self, method: MethodHandle) -> JitResult<MethodInfo> {
            self.methods
                .get(&method.as_u64())
                .cloned()
                .ok_or_else(|| JitError::import_failure("unknown method"))
        }
    }

    /// Imports every method as `store l0 = <handle>; return load l0`, with a
    /// nested candidate call when the handle has a successor in the chain.
    struct ChainImporter {
        calls: FxHashMap<u64, u64>,
    }

    impl Importer for ChainImporter {
        fn import(
            &self,
            info: &MethodInfo,
            ir: &mut Ir,
            locals: &mut LocalsTable,
        ) -> JitResult<()> {
            locals.push(LclType::Int);
            let b = ir.new_block(BlockKind::Return);
            let con = ir.add_node(TreeOp::IntCon(info.method.as_u64() as i64), []);
            let store = ir.add_node(TreeOp::LclStore(0), [con]);
            ir.push_stmt(b, store);
            if let Some(&next) = self.calls.get(&info.method.as_u64()) {
                let call = ir.add_node(
                    TreeOp::Call {
                        target: MethodHandle::new(next),
                        inline_candidate: true,
                    },
                    [],
                );
                ir.push_stmt(b, call);
            }
            let load = ir.add_node(TreeOp::LclLoad(0), []);
            let ret = ir.add_node(TreeOp::Return, [load]);
            ir.push_stmt(b, ret);
            Ok(())
        }
    }

    struct NullEmitter;
    impl CodeEmitter for NullEmitter {
        fn emit(&self, _ir: &Ir, _locals: &LocalsTable, _t: TargetIsa) -> JitResult<CodeBuffer> {
            Ok(CodeBuffer::default())
        }
    }

    fn method(handle: u64, il_bytes: usize) -> MethodInfo {
        MethodInfo::new(MethodHandle::new(handle), ModuleHandle::new(1))
            .with_il(vec![0u8; il_bytes])
            .with_name(format!("m{handle}"))
    }

    fn root_session(ctx: &JitContext) -> Session {
        let opts = CompileOptions::decide(
            &CompileFlags::default(),
            &MethodMetrics::default(),
            &ctx.config,
            MethodHandle::new(1),
        );
        Session::new_root(MethodHandle::new(1), ModuleHandle::new(1), opts, Arena::new())
    }

    struct Fixture {
        ctx: JitContext,
        provider: TableProvider,
        importer: ChainImporter,
    }

    impl Fixture {
        fn new(config: ConfigStore) -> Self {
            let mut methods = FxHashMap::default();
            for h in 1..=4u64 {
                methods.insert(h, method(h, 8));
            }
            let mut calls = FxHashMap::default();
            calls.insert(1, 2);
            calls.insert(2, 3);
            Self {
                ctx: JitContext::new(config),
                provider: TableProvider { methods },
                importer: ChainImporter { calls },
            }
        }

        fn run_inlining(&self) -> Session {
            let pipeline = Pipeline {
                ctx: &self.ctx,
                provider: &self.provider,
                importer: &self.importer,
                emitter: &NullEmitter,
            };
            let mut session = root_session(&self.ctx);
            let root = method(1, 8);
            self.importer
                .import(&root, &mut session.ir, &mut session.locals)
                .unwrap();
            run_inline_phase(&pipeline, &mut session, &root).unwrap();
            session
        }
    }

    #[test]
    fn test_transitive_inlining_splices_chain() {
        let session = Fixture::new(ConfigStore::new()).run_inlining();
        // m1 -> m2 -> m3, both spliced; no calls remain.
        assert_eq!(session.stats.inline_successes, 2);
        assert!(!session
            .ir
            .nodes()
            .any(|(_, n)| matches!(n.op, TreeOp::Call { .. })));
        // Each inlinee contributed one rebased local.
        assert_eq!(session.locals.len(), 3);
    }

    #[test]
    fn test_too_large_candidate_rejected() {
        let mut fixture = Fixture::new(ConfigStore::new());
        fixture
            .provider
            .methods
            .insert(2, method(2, 500_000));
        let session = fixture.run_inlining();
        assert_eq!(session.stats.inline_successes, 0);
        assert_eq!(session.stats.inline_attempts, 1);
        assert!(session
            .ir
            .nodes()
            .any(|(_, n)| matches!(n.op, TreeOp::Call { .. })));
    }

    #[test]
    fn test_eh_candidate_is_forbidden() {
        let mut fixture = Fixture::new(ConfigStore::new());
        let with_eh = method(2, 8).with_eh_region(EhRegion {
            kind: EhKind::Catch,
            try_begin: 0,
            try_end: 4,
            handler_begin: 4,
        });
        fixture.provider.methods.insert(2, with_eh);
        let session = fixture.run_inlining();
        assert_eq!(session.stats.inline_successes, 0);
    }

    #[test]
    fn test_policy_veto_via_excluded_module() {
        let mut config = ConfigStore::new();
        config.set(keys::EXCLUDED_MODULES, "9");
        let mut fixture = Fixture::new(config);
        let foreign = MethodInfo::new(MethodHandle::new(2), ModuleHandle::new(9))
            .with_il(vec![0u8; 8]);
        fixture.provider.methods.insert(2, foreign);
        let session = fixture.run_inlining();
        assert_eq!(session.stats.inline_successes, 0);
        assert_eq!(session.stats.inline_attempts, 1);
    }

    #[test]
    fn test_unresolvable_callee_becomes_verdict_not_error() {
        let mut fixture = Fixture::new(ConfigStore::new());
        fixture.provider.methods.remove(&2);
        // The phase itself succeeds; the failure stayed with the candidate.
        let session = fixture.run_inlining();
        assert_eq!(session.stats.inline_attempts, 1);
        assert_eq!(session.stats.inline_successes, 0);
    }

    #[test]
    fn test_budget_exhaustion_stops_splicing() {
        let mut config = ConfigStore::new();
        config.set(keys::INLINE_BUDGET, "8");
        let fixture = Fixture::new(config);
        // First splice (8 bytes) spends the whole budget; m3 is rejected.
        let session = fixture.run_inlining();
        assert_eq!(session.stats.inline_successes, 1);
        assert_eq!(session.inline_budget_used, 8);
    }

    #[test]
    fn test_depth_limit_bounds_recursion() {
        let mut config = ConfigStore::new();
        config.set(keys::INLINE_MAX_DEPTH, "1");
        let fixture = Fixture::new(config);
        let session = fixture.run_inlining();
        // m2 splices at depth 1; m3 would be depth 2.
        assert_eq!(session.stats.inline_successes, 1);
    }

    #[test]
    fn test_failed_attempt_rewinds_arena() {
        let mut fixture = Fixture::new(ConfigStore::new());
        fixture.provider.methods.remove(&3);
        // m2 resolves and splices; its exposed call to m3 fails to resolve.
        // A self-call chain makes this easier: watch the arena across the
        // failing attempt.
        fixture.importer.calls.insert(3, 4);
        let pipeline = Pipeline {
            ctx: &fixture.ctx,
            provider: &fixture.provider,
            importer: &fixture.importer,
            emitter: &NullEmitter,
        };
        let mut session = root_session(&fixture.ctx);
        let root = method(1, 8);
        fixture
            .importer
            .import(&root, &mut session.ir, &mut session.locals)
            .unwrap();

        run_inline_phase(&pipeline, &mut session, &root).unwrap();
        // One success (m2), one failed attempt (m3). The failed attempt's
        // charge was rewound, leaving only m2's 8 bytes.
        assert_eq!(session.stats.inline_attempts, 2);
        assert_eq!(session.stats.inline_successes, 1);
    }

    #[test]
    fn test_nested_session_is_reused() {
        let fixture = Fixture::new(ConfigStore::new());
        let mut session = fixture.run_inlining();
        // The cached inlinee session survives the phase for the next pass.
        assert!(session.take_inlinee().is_some());
    }
}
