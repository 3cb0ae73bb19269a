//! The compilation pipeline.
//!
//! A declarative, ordered sequence of phase entries drives every compilation.
//! Each entry names a registered phase, a gate deciding whether it runs this
//! session, and the action to execute. Three things shape the flow beyond the
//! flat list:
//!
//! - inlinee compilations stop after the import segment
//! - the optimizing phase block runs only at full optimization; a skipped
//!   phase leaves no timing record at all
//! - the optimizing block repeats a configured, fixed number of times, with
//!   transient annotations cleared between iterations
//!
//! Phase actions here are deliberately lightweight stand-ins for the heavy
//! algorithms, which live behind the trait seams in [`crate::external`]; what
//! this module owns is the ordering, gating, and bookkeeping contract.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use onyx_core::{JitError, JitResult};

use crate::context::JitContext;
use crate::external::{CodeEmitter, Importer, MethodInfo, MethodProvider};
use crate::inline;
use crate::ir::{BlockFlags, BlockId, BlockKind, Helper, Ir, IrForm, NodeId, TreeOp};
use crate::options::Tier;
use crate::phase::PhaseId;
use crate::runner::{PhaseRunner, PhaseStatus};
use crate::session::Session;

// =============================================================================
// Mode and gates
// =============================================================================

/// How far the pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineMode {
    /// The whole pipeline, through code generation.
    Full,
    /// Import segment only; used for inline candidate compilations.
    ImportOnly,
}

/// Condition under which a phase entry runs. Gates are re-evaluated at each
/// encounter, so an early optimization downgrade turns later gated phases off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    /// Runs in every session.
    Always,
    /// Runs only at full optimization.
    Optimizing,
    /// Runs only when profile instrumentation was requested.
    Instrumenting,
    /// Runs only for on-stack-replacement compilations.
    Osr,
    /// Runs only in the quick-start tier with OSR available, where
    /// patchpoints give loops an escape hatch to the optimizing tier.
    Patchpoints,
    /// Runs only when stack-guard cookies are enabled.
    GsCookie,
    /// Runs only when the method has exception-handling regions.
    HasEh,
}

impl Gate {
    fn passes(self, session: &Session, info: &MethodInfo) -> bool {
        match self {
            Gate::Always => true,
            Gate::Optimizing => session.opts.optimizing(),
            Gate::Instrumenting => session.opts.instrument,
            Gate::Osr => session.opts.osr_offset.is_some(),
            Gate::Patchpoints => {
                session.opts.tier == Tier::Baseline && session.opts.osr_enabled
            }
            Gate::GsCookie => session.opts.gs_cookie,
            Gate::HasEh => info.has_eh(),
        }
    }
}

// =============================================================================
// Phase tables
// =============================================================================

type PhaseAction = fn(&Pipeline<'_>, &mut Session, &MethodInfo) -> JitResult<PhaseStatus>;

struct PhaseEntry {
    id: PhaseId,
    gate: Gate,
    action: PhaseAction,
}

macro_rules! entry {
    ($id:ident, $gate:ident, $action:ident) => {
        PhaseEntry {
            id: PhaseId::$id,
            gate: Gate::$gate,
            action: $action,
        }
    };
}

/// Import segment: everything an inlinee compilation also runs.
static IMPORT_PHASES: &[PhaseEntry] = &[
    entry!(PreImport, Always, pre_import),
    entry!(ProfileInstrumentPrep, Instrumenting, noop_prep),
    entry!(IncorporateProfile, Optimizing, noop_prep),
    entry!(OsrEntryFixup, Osr, osr_entry_fixup),
    entry!(Importation, Always, importation),
    entry!(InstrumentationInsert, Instrumenting, instrumentation_insert),
    entry!(PatchpointExpansion, Patchpoints, patchpoint_expansion),
    entry!(IndirectCallTransform, Optimizing, indirect_call_transform),
    entry!(PostImportCleanup, Always, post_import_cleanup),
];

/// Front end: morph and flow-graph work, shared by all full compilations.
static FRONT_PHASES: &[PhaseEntry] = &[
    entry!(MorphInit, Always, morph_init),
    entry!(Inlining, Optimizing, inlining),
    entry!(ObjectStackAllocation, Optimizing, object_stack_allocation),
    entry!(AddInternalBlocks, Always, add_internal_blocks),
    entry!(EmptyTryFinallyRemoval, HasEh, empty_try_finally_removal),
    entry!(MergeCloneFinally, HasEh, merge_clone_finally),
    entry!(EarlyFlowCleanup, Optimizing, remove_unreachable),
    entry!(PromoteStructs, Optimizing, promote_structs),
    entry!(MarkAddressExposed, Always, mark_address_exposed),
    entry!(EarlyLiveness, Optimizing, recount_locals),
    entry!(ForwardSub, Optimizing, forward_sub),
    entry!(PhysicalPromotion, Optimizing, noop_opt),
    entry!(RetypeImplicitByRefs, Always, retype_implicit_byrefs),
    entry!(RemoveDeadBlocks, Optimizing, remove_unreachable),
    entry!(Morph, Always, morph),
    entry!(PostMorph, Always, noop_opt),
    entry!(GsCookie, GsCookie, gs_cookie),
    entry!(ComputeEdgeWeights, Always, compute_edge_weights),
    entry!(CreateFunclets, HasEh, create_funclets),
    entry!(InvertLoops, Optimizing, noop_opt),
    entry!(OptimizeFlow, Optimizing, optimize_flow),
    entry!(TailMergeThrows, Optimizing, tail_merge_throws),
    entry!(ComputeDominators, Optimizing, compute_dominators),
    entry!(FindLoops, Optimizing, find_loops),
    entry!(CloneLoops, Optimizing, noop_opt),
    entry!(UnrollLoops, Optimizing, noop_opt),
    entry!(FinalizeLocals, Always, finalize_locals),
    entry!(SetTreeOrder, Always, set_tree_order),
];

/// The optimizing block, iterated a fixed configured number of times.
/// The SSA build entry is special-cased by the driver loop so its
/// sub-phases run nested.
static OPT_PHASES: &[PhaseEntry] = &[
    entry!(SsaBuild, Always, noop_opt),
    entry!(ValueNumber, Always, value_number),
    entry!(Cse, Always, cse),
    entry!(AssertionProp, Always, noop_opt),
    entry!(RedundantBranchElim, Always, redundant_branch_elim),
    entry!(RangeCheck, Always, range_check),
    entry!(DeadStoreRemoval, Always, dead_store_removal),
];

/// Back end: expansion, lowering, and code generation.
static BACK_PHASES: &[PhaseEntry] = &[
    entry!(ExpandHelpers, Always, expand_helpers),
    entry!(InsertGcPolls, Always, insert_gc_polls),
    entry!(CreateThrowHelpers, Always, create_throw_helpers),
    entry!(OptimizeBools, Optimizing, noop_opt),
    entry!(IfConversion, Optimizing, noop_opt),
    entry!(OptimizeLayout, Optimizing, optimize_layout),
    entry!(RecognizeSwitches, Optimizing, noop_opt),
    entry!(DetermineColdRegions, Optimizing, determine_cold_regions),
    entry!(Rationalize, Always, rationalize),
    entry!(Lower, Always, lower),
    entry!(ComputeStackLevels, Always, noop_opt),
    entry!(RegAlloc, Always, reg_alloc),
    entry!(AlignLoops, Optimizing, align_loops),
    entry!(CodeGen, Always, codegen),
    entry!(PatchpointInfo, Patchpoints, patchpoint_info),
    entry!(RecordStats, Always, record_stats),
];

// =============================================================================
// Pipeline
// =============================================================================

/// The pipeline over one context and its external collaborators. Stateless
/// across sessions; every per-method fact lives in the [`Session`].
pub struct Pipeline<'a> {
    /// Process-wide context.
    pub ctx: &'a JitContext,
    /// Metadata and IL resolution.
    pub provider: &'a dyn MethodProvider,
    /// IL-to-IR translation.
    pub importer: &'a dyn Importer,
    /// Machine code production.
    pub emitter: &'a dyn CodeEmitter,
}

impl Pipeline<'_> {
    /// Run the pipeline over `session`.
    ///
    /// In [`PipelineMode::ImportOnly`] the flow stops after the import
    /// segment, leaving tree-form IR for the caller to inspect and splice.
    pub fn run(
        &self,
        runner: &mut PhaseRunner,
        session: &mut Session,
        info: &MethodInfo,
        mode: PipelineMode,
    ) -> JitResult<()> {
        self.run_segment(runner, session, info, IMPORT_PHASES)?;
        if mode == PipelineMode::ImportOnly {
            return Ok(());
        }

        self.run_segment(runner, session, info, FRONT_PHASES)?;

        if session.opts.optimizing() {
            // Fixed iteration count from configuration; never re-decided
            // mid-flight, and never run to convergence.
            let repeats = session.opts.repeat_opt_count;
            for iteration in 0..repeats {
                if iteration > 0 {
                    session.ir.reset_opt_annotations();
                    // Loop heads are cleared with the SSA/value-number
                    // annotations; rediscover them so the back end sees the
                    // same flow-graph facts regardless of the repeat count.
                    mark_loop_heads(&mut session.ir);
                }
                self.run_opt_block(runner, session, info)?;
            }
        } else {
            runner.run(session, PhaseId::MinimalLiveness, |s| {
                minimal_liveness_body(s)
            })?;
        }

        self.run_segment(runner, session, info, BACK_PHASES)
    }

    fn run_segment(
        &self,
        runner: &mut PhaseRunner,
        session: &mut Session,
        info: &MethodInfo,
        segment: &[PhaseEntry],
    ) -> JitResult<()> {
        for entry in segment {
            // A gated-off phase is never entered and leaves no record.
            if !entry.gate.passes(session, info) {
                continue;
            }
            runner.run(session, entry.id, |s| (entry.action)(self, s, info))?;
        }
        Ok(())
    }

    fn run_opt_block(
        &self,
        runner: &mut PhaseRunner,
        session: &mut Session,
        info: &MethodInfo,
    ) -> JitResult<()> {
        for entry in OPT_PHASES {
            if !entry.gate.passes(session, info) {
                continue;
            }
            if entry.id == PhaseId::SsaBuild {
                runner.run_with(session, PhaseId::SsaBuild, |r, s| {
                    r.run(s, PhaseId::SsaLiveness, |s| recount_locals_body(s))?;
                    r.run(s, PhaseId::SsaRename, |s| ssa_rename_body(s))?;
                    Ok(PhaseStatus::Everything)
                })?;
            } else {
                runner.run(session, entry.id, |s| (entry.action)(self, s, info))?;
            }
        }
        Ok(())
    }
}

// =============================================================================
// Import segment actions
// =============================================================================

fn pre_import(_p: &Pipeline<'_>, session: &mut Session, info: &MethodInfo) -> JitResult<PhaseStatus> {
    if info.il.is_empty() {
        return Err(JitError::bad_code("method has no IL"));
    }
    session.dump(format!(
        "compiling {} ({} IL bytes, level {:?})",
        info.name,
        info.il_size(),
        session.opts.level
    ));
    Ok(PhaseStatus::Nothing)
}

fn noop_prep(_p: &Pipeline<'_>, _s: &mut Session, _i: &MethodInfo) -> JitResult<PhaseStatus> {
    Ok(PhaseStatus::Nothing)
}

fn osr_entry_fixup(
    _p: &Pipeline<'_>,
    session: &mut Session,
    info: &MethodInfo,
) -> JitResult<PhaseStatus> {
    let offset = session.opts.osr_offset.unwrap_or(0);
    if offset >= info.il_size() {
        return Err(JitError::bad_code(format!(
            "OSR offset {offset} outside method of {} IL bytes",
            info.il_size()
        )));
    }
    Ok(PhaseStatus::Nothing)
}

fn importation(
    p: &Pipeline<'_>,
    session: &mut Session,
    info: &MethodInfo,
) -> JitResult<PhaseStatus> {
    p.importer.import(info, &mut session.ir, &mut session.locals)?;
    if session.ir.entry().is_none() {
        return Err(JitError::import_failure("importer produced no entry block"));
    }
    for id in session.ir.block_ids().collect::<Vec<_>>() {
        session.ir.block_mut(id).flags.set(BlockFlags::IMPORTED);
    }
    // The OSR entry is the block holding the requested offset's loop head;
    // with the lightweight importer that is the first loop head found.
    if session.opts.osr_offset.is_some() {
        if let Some(head) = session
            .ir
            .block_ids()
            .find(|&b| session.ir.block(b).flags.has(BlockFlags::LOOP_HEAD))
        {
            session.ir.block_mut(head).flags.set(BlockFlags::OSR_ENTRY);
        }
    }
    Ok(PhaseStatus::Everything)
}

fn instrumentation_insert(
    _p: &Pipeline<'_>,
    session: &mut Session,
    _info: &MethodInfo,
) -> JitResult<PhaseStatus> {
    let Some(entry) = session.ir.entry() else {
        return Ok(PhaseStatus::Nothing);
    };
    let probe = session.ir.add_node(TreeOp::CounterProbe, []);
    session.ir.block_mut(entry).stmts.insert(0, probe);
    Ok(PhaseStatus::Everything)
}

fn patchpoint_expansion(
    _p: &Pipeline<'_>,
    session: &mut Session,
    _info: &MethodInfo,
) -> JitResult<PhaseStatus> {
    let heads: Vec<_> = session
        .ir
        .block_ids()
        .filter(|&b| session.ir.block(b).flags.has(BlockFlags::LOOP_HEAD))
        .collect();
    if heads.is_empty() {
        return Ok(PhaseStatus::Nothing);
    }
    for head in heads {
        let pp = session
            .ir
            .add_node(TreeOp::Patchpoint { il_offset: head.0 }, []);
        session.ir.block_mut(head).stmts.insert(0, pp);
    }
    Ok(PhaseStatus::Everything)
}

fn indirect_call_transform(
    _p: &Pipeline<'_>,
    session: &mut Session,
    _info: &MethodInfo,
) -> JitResult<PhaseStatus> {
    let any = session
        .ir
        .nodes()
        .any(|(_, n)| matches!(n.op, TreeOp::IndirectCall));
    Ok(if any {
        PhaseStatus::Unknown
    } else {
        PhaseStatus::Nothing
    })
}

fn post_import_cleanup(
    _p: &Pipeline<'_>,
    session: &mut Session,
    _info: &MethodInfo,
) -> JitResult<PhaseStatus> {
    let removed = session.ir.remove_empty_basic_blocks();
    Ok(if removed > 0 {
        PhaseStatus::Everything
    } else {
        PhaseStatus::Nothing
    })
}

// =============================================================================
// Front-end actions
// =============================================================================

fn morph_init(
    p: &Pipeline<'_>,
    session: &mut Session,
    _info: &MethodInfo,
) -> JitResult<PhaseStatus> {
    // Last chance for the sanctioned early downgrade: importation may have
    // revealed a flow graph far larger than the IL metrics promised.
    let max_blocks = p.ctx.config.get_u32(
        crate::options::keys::MAX_BLOCK_COUNT,
        crate::options::defaults::MAX_BLOCK_COUNT,
    );
    if session.opts.optimizing() && session.ir.block_count() as u32 > max_blocks {
        session.downgrade_to_min_opts("flow graph exceeds block budget")?;
    }
    session.lock_opts();
    Ok(PhaseStatus::Nothing)
}

fn inlining(p: &Pipeline<'_>, session: &mut Session, info: &MethodInfo) -> JitResult<PhaseStatus> {
    inline::run_inline_phase(p, session, info)
}

fn object_stack_allocation(
    _p: &Pipeline<'_>,
    session: &mut Session,
    _info: &MethodInfo,
) -> JitResult<PhaseStatus> {
    let any = session
        .ir
        .nodes()
        .any(|(_, n)| matches!(n.op, TreeOp::AllocObj { escapes: false }));
    Ok(if any {
        PhaseStatus::Everything
    } else {
        PhaseStatus::Nothing
    })
}

fn add_internal_blocks(
    _p: &Pipeline<'_>,
    session: &mut Session,
    _info: &MethodInfo,
) -> JitResult<PhaseStatus> {
    let scratch = session.ir.new_block(BlockKind::Basic);
    session.ir.block_mut(scratch).flags.set(BlockFlags::INTERNAL);
    Ok(PhaseStatus::Everything)
}

fn empty_try_finally_removal(
    _p: &Pipeline<'_>,
    _session: &mut Session,
    info: &MethodInfo,
) -> JitResult<PhaseStatus> {
    let empties = info
        .eh_regions
        .iter()
        .filter(|r| r.try_begin == r.try_end)
        .count();
    Ok(if empties > 0 {
        PhaseStatus::Everything
    } else {
        PhaseStatus::Nothing
    })
}

fn merge_clone_finally(
    _p: &Pipeline<'_>,
    session: &mut Session,
    _info: &MethodInfo,
) -> JitResult<PhaseStatus> {
    let callers: Vec<_> = session
        .ir
        .block_ids()
        .filter(|&b| session.ir.block(b).kind == BlockKind::CallFinally)
        .collect();
    if callers.is_empty() {
        return Ok(PhaseStatus::Nothing);
    }
    for b in callers {
        session.ir.block_mut(b).flags.set(BlockFlags::CLONED);
    }
    Ok(PhaseStatus::Everything)
}

/// Mark blocks unreachable from the entry as removed. Compiler-created
/// scratch and funclet blocks are exempt.
fn remove_unreachable(
    _p: &Pipeline<'_>,
    session: &mut Session,
    _info: &MethodInfo,
) -> JitResult<PhaseStatus> {
    let reachable = session.ir.reachable_from_entry();
    let mut removed = 0;
    for id in session.ir.block_ids().collect::<Vec<_>>() {
        let block = session.ir.block(id);
        if reachable[id.index()]
            || block.flags.has(BlockFlags::REMOVED)
            || block.flags.has(BlockFlags::INTERNAL)
            || block.flags.has(BlockFlags::FUNCLET)
        {
            continue;
        }
        session.ir.block_mut(id).flags.set(BlockFlags::REMOVED);
        removed += 1;
    }
    Ok(if removed > 0 {
        PhaseStatus::Everything
    } else {
        PhaseStatus::Nothing
    })
}

fn promote_structs(
    _p: &Pipeline<'_>,
    session: &mut Session,
    _info: &MethodInfo,
) -> JitResult<PhaseStatus> {
    let mut promoted = 0;
    for var in session.locals.iter_mut() {
        if let crate::ir::LclType::Struct(fields) = var.ty {
            if fields <= 4 && !var.address_exposed {
                var.promoted = true;
                promoted += 1;
            }
        }
    }
    Ok(if promoted > 0 {
        PhaseStatus::Everything
    } else {
        PhaseStatus::Nothing
    })
}

fn mark_address_exposed(
    _p: &Pipeline<'_>,
    session: &mut Session,
    _info: &MethodInfo,
) -> JitResult<PhaseStatus> {
    let mut exposed: Vec<u32> = Vec::new();
    for (_, node) in session.ir.nodes() {
        if let TreeOp::AddrOf(lcl) = node.op {
            exposed.push(lcl);
        }
    }
    if exposed.is_empty() {
        return Ok(PhaseStatus::Nothing);
    }
    for lcl in &exposed {
        if let Some(var) = session.locals.get_mut(*lcl) {
            var.address_exposed = true;
            // Exposure disqualifies promotion.
            var.promoted = false;
        }
    }
    Ok(PhaseStatus::Everything)
}

fn recount_locals(
    _p: &Pipeline<'_>,
    session: &mut Session,
    _info: &MethodInfo,
) -> JitResult<PhaseStatus> {
    recount_locals_body(session)
}

/// Recompute appearance counts from the IR. Shared by early liveness, the
/// SSA liveness sub-phase, and minimal liveness.
fn recount_locals_body(session: &mut Session) -> JitResult<PhaseStatus> {
    session.locals.reset_ref_counts();
    let mut counts: FxHashMap<u32, u32> = FxHashMap::default();
    for (_, node) in session.ir.nodes() {
        match node.op {
            TreeOp::LclLoad(l) | TreeOp::LclStore(l) | TreeOp::AddrOf(l) => {
                *counts.entry(l).or_insert(0) += 1;
            }
            _ => {}
        }
    }
    for (lcl, count) in counts {
        if let Some(var) = session.locals.get_mut(lcl) {
            var.ref_count = count;
        }
    }
    Ok(PhaseStatus::Everything)
}

fn forward_sub(
    _p: &Pipeline<'_>,
    session: &mut Session,
    _info: &MethodInfo,
) -> JitResult<PhaseStatus> {
    // Substitute loads of a local whose only definition stores a constant.
    let mut single_def: FxHashMap<u32, Option<i64>> = FxHashMap::default();
    for (_, node) in session.ir.nodes() {
        if let TreeOp::LclStore(lcl) = node.op {
            let con = node.args.first().and_then(|&a| match session.ir.node(a).op {
                TreeOp::IntCon(v) => Some(v),
                _ => None,
            });
            match single_def.get(&lcl) {
                None => {
                    single_def.insert(lcl, con);
                }
                Some(_) => {
                    single_def.insert(lcl, None);
                }
            }
        }
        if let TreeOp::AddrOf(lcl) = node.op {
            single_def.insert(lcl, None);
        }
    }

    let mut subs: Vec<(NodeId, i64)> = Vec::new();
    for (id, node) in session.ir.nodes() {
        if let TreeOp::LclLoad(lcl) = node.op {
            if let Some(Some(v)) = single_def.get(&lcl) {
                subs.push((id, *v));
            }
        }
    }
    if subs.is_empty() {
        return Ok(PhaseStatus::Nothing);
    }
    for (id, v) in subs {
        let node = session.ir.node_mut(id);
        node.op = TreeOp::IntCon(v);
        node.args.clear();
    }
    Ok(PhaseStatus::Everything)
}

fn noop_opt(_p: &Pipeline<'_>, _s: &mut Session, _i: &MethodInfo) -> JitResult<PhaseStatus> {
    Ok(PhaseStatus::Nothing)
}

fn retype_implicit_byrefs(
    _p: &Pipeline<'_>,
    session: &mut Session,
    _info: &MethodInfo,
) -> JitResult<PhaseStatus> {
    let mut retyped = 0;
    for var in session.locals.iter_mut() {
        if let crate::ir::LclType::Struct(fields) = var.ty {
            if fields > 4 && !var.implicit_byref {
                var.implicit_byref = true;
                retyped += 1;
            }
        }
    }
    Ok(if retyped > 0 {
        PhaseStatus::Everything
    } else {
        PhaseStatus::Nothing
    })
}

/// Fold arithmetic over constant operands.
fn morph(_p: &Pipeline<'_>, session: &mut Session, _info: &MethodInfo) -> JitResult<PhaseStatus> {
    let mut folds: Vec<(NodeId, i64)> = Vec::new();
    for (id, node) in session.ir.nodes() {
        let (TreeOp::Add | TreeOp::Mul) = node.op else {
            continue;
        };
        if node.args.len() != 2 {
            continue;
        }
        let lhs = session.ir.node(node.args[0]);
        let rhs = session.ir.node(node.args[1]);
        if let (TreeOp::IntCon(a), TreeOp::IntCon(b)) = (&lhs.op, &rhs.op) {
            let v = match node.op {
                TreeOp::Add => a.wrapping_add(*b),
                _ => a.wrapping_mul(*b),
            };
            folds.push((id, v));
        }
    }
    if folds.is_empty() {
        return Ok(PhaseStatus::Nothing);
    }
    for (id, v) in folds {
        let node = session.ir.node_mut(id);
        node.op = TreeOp::IntCon(v);
        node.args.clear();
    }
    Ok(PhaseStatus::Everything)
}

fn gs_cookie(
    _p: &Pipeline<'_>,
    session: &mut Session,
    _info: &MethodInfo,
) -> JitResult<PhaseStatus> {
    // Only methods with address-taken locals carry the cookie check.
    let vulnerable = session.locals.iter().any(|v| v.address_exposed);
    if !vulnerable {
        return Ok(PhaseStatus::Nothing);
    }
    let Some(entry) = session.ir.entry() else {
        return Ok(PhaseStatus::Nothing);
    };
    let check = session.ir.add_node(TreeOp::GsCookieCheck, []);
    session.ir.block_mut(entry).stmts.insert(0, check);
    Ok(PhaseStatus::Everything)
}

fn compute_edge_weights(
    _p: &Pipeline<'_>,
    session: &mut Session,
    _info: &MethodInfo,
) -> JitResult<PhaseStatus> {
    for id in session.ir.block_ids().collect::<Vec<_>>() {
        let heavy = session.ir.block(id).flags.has(BlockFlags::LOOP_HEAD);
        session.ir.block_mut(id).weight = if heavy { 4 } else { 1 };
    }
    Ok(PhaseStatus::Everything)
}

fn create_funclets(
    _p: &Pipeline<'_>,
    session: &mut Session,
    info: &MethodInfo,
) -> JitResult<PhaseStatus> {
    for _region in &info.eh_regions {
        let funclet = session.ir.new_block(BlockKind::Basic);
        let flags = &mut session.ir.block_mut(funclet).flags;
        flags.set(BlockFlags::FUNCLET);
        flags.set(BlockFlags::INTERNAL);
    }
    Ok(PhaseStatus::Everything)
}

fn optimize_flow(
    _p: &Pipeline<'_>,
    session: &mut Session,
    _info: &MethodInfo,
) -> JitResult<PhaseStatus> {
    let removed = session.ir.remove_empty_basic_blocks();
    Ok(if removed > 0 {
        PhaseStatus::Everything
    } else {
        PhaseStatus::Nothing
    })
}

fn tail_merge_throws(
    _p: &Pipeline<'_>,
    session: &mut Session,
    _info: &MethodInfo,
) -> JitResult<PhaseStatus> {
    let throws = session
        .ir
        .live_blocks()
        .filter(|b| b.kind == BlockKind::Throw)
        .count();
    Ok(if throws > 1 {
        PhaseStatus::Unknown
    } else {
        PhaseStatus::Nothing
    })
}

fn compute_dominators(
    _p: &Pipeline<'_>,
    session: &mut Session,
    _info: &MethodInfo,
) -> JitResult<PhaseStatus> {
    // Analysis only; the reachability set doubles as the dominance frontier
    // input for the lightweight loop finder.
    let _ = session.ir.reachable_from_entry();
    Ok(PhaseStatus::Nothing)
}

/// Mark natural-loop heads. A successor edge to an equal-or-earlier block is
/// a back edge; its target is a head. Also run standalone after the
/// opt-repeat annotation reset.
fn mark_loop_heads(ir: &mut Ir) -> bool {
    let mut heads: Vec<_> = Vec::new();
    for block in ir.live_blocks() {
        for &succ in &block.succs {
            if succ <= block.id {
                heads.push(succ);
            }
        }
    }
    let found = !heads.is_empty();
    for head in heads {
        ir.block_mut(head).flags.set(BlockFlags::LOOP_HEAD);
    }
    found
}

fn find_loops(
    _p: &Pipeline<'_>,
    session: &mut Session,
    _info: &MethodInfo,
) -> JitResult<PhaseStatus> {
    Ok(if mark_loop_heads(&mut session.ir) {
        PhaseStatus::Everything
    } else {
        PhaseStatus::Nothing
    })
}

fn finalize_locals(
    _p: &Pipeline<'_>,
    session: &mut Session,
    _info: &MethodInfo,
) -> JitResult<PhaseStatus> {
    recount_locals_body(session)?;
    let tracked = session.locals.finalize_tracking();
    session.dump(format!("{tracked} locals tracked"));
    Ok(PhaseStatus::Everything)
}

fn set_tree_order(
    _p: &Pipeline<'_>,
    session: &mut Session,
    _info: &MethodInfo,
) -> JitResult<PhaseStatus> {
    // Post-order within each statement, statements in block order.
    let mut order = 0u32;
    let mut assignments: Vec<(NodeId, u32)> = Vec::new();
    for block in session.ir.live_blocks() {
        for &stmt in &block.stmts {
            let mut stack: SmallVec<[(NodeId, bool); 8]> = SmallVec::new();
            stack.push((stmt, false));
            while let Some((id, expanded)) = stack.pop() {
                if expanded {
                    assignments.push((id, order));
                    order += 1;
                } else {
                    stack.push((id, true));
                    for &arg in session.ir.node(id).args.iter().rev() {
                        stack.push((arg, false));
                    }
                }
            }
        }
    }
    for (id, ord) in assignments {
        session.ir.node_mut(id).order = ord;
    }
    Ok(PhaseStatus::Everything)
}

// =============================================================================
// Optimizing-block actions
// =============================================================================

fn ssa_rename_body(session: &mut Session) -> JitResult<PhaseStatus> {
    let mut next_ssa: FxHashMap<u32, u32> = FxHashMap::default();
    let mut assignments: Vec<(NodeId, u32)> = Vec::new();
    for (id, node) in session.ir.nodes() {
        if let TreeOp::LclStore(lcl) = node.op {
            let n = next_ssa.entry(lcl).or_insert(0);
            *n += 1;
            assignments.push((id, *n));
        }
    }
    for (id, num) in assignments {
        session.ir.node_mut(id).ssa_num = Some(num);
    }
    Ok(PhaseStatus::Everything)
}

fn value_number(
    _p: &Pipeline<'_>,
    session: &mut Session,
    _info: &MethodInfo,
) -> JitResult<PhaseStatus> {
    let mut con_vns: FxHashMap<i64, u32> = FxHashMap::default();
    let mut next_vn = 1u32;
    let mut assignments: Vec<(NodeId, u32)> = Vec::new();
    for (id, node) in session.ir.nodes() {
        let vn = match node.op {
            TreeOp::IntCon(v) => *con_vns.entry(v).or_insert_with(|| {
                let vn = next_vn;
                next_vn += 1;
                vn
            }),
            _ => {
                let vn = next_vn;
                next_vn += 1;
                vn
            }
        };
        assignments.push((id, vn));
    }
    for (id, vn) in assignments {
        session.ir.node_mut(id).vn = Some(vn);
    }
    Ok(PhaseStatus::Everything)
}

/// Redirect operand references to the first node of each value number.
fn cse(_p: &Pipeline<'_>, session: &mut Session, _info: &MethodInfo) -> JitResult<PhaseStatus> {
    let mut leader: FxHashMap<u32, NodeId> = FxHashMap::default();
    for (id, node) in session.ir.nodes() {
        if let (TreeOp::IntCon(_), Some(vn)) = (&node.op, node.vn) {
            leader.entry(vn).or_insert(id);
        }
    }

    let mut rewrites: Vec<(NodeId, usize, NodeId)> = Vec::new();
    for (id, node) in session.ir.nodes() {
        for (slot, &arg) in node.args.iter().enumerate() {
            if let Some(vn) = session.ir.node(arg).vn {
                if let Some(&lead) = leader.get(&vn) {
                    if lead != arg {
                        rewrites.push((id, slot, lead));
                    }
                }
            }
        }
    }
    if rewrites.is_empty() {
        return Ok(PhaseStatus::Nothing);
    }
    for (id, slot, lead) in rewrites {
        session.ir.node_mut(id).args[slot] = lead;
    }
    Ok(PhaseStatus::Everything)
}

fn redundant_branch_elim(
    _p: &Pipeline<'_>,
    session: &mut Session,
    _info: &MethodInfo,
) -> JitResult<PhaseStatus> {
    // A multi-way terminator whose edges all reach the same block is a
    // degenerate branch; collapse the duplicate edges.
    let ids: Vec<_> = session.ir.block_ids().collect();
    let mut changed = false;
    for id in ids {
        let block = session.ir.block_mut(id);
        if block.succs.len() < 2 {
            continue;
        }
        let before = block.succs.len();
        let mut seen: SmallVec<[BlockId; 2]> = SmallVec::new();
        block.succs.retain(|succ| {
            if seen.contains(succ) {
                false
            } else {
                seen.push(*succ);
                true
            }
        });
        changed |= block.succs.len() < before;
    }
    Ok(if changed {
        PhaseStatus::Everything
    } else {
        PhaseStatus::Nothing
    })
}

fn range_check(
    _p: &Pipeline<'_>,
    session: &mut Session,
    _info: &MethodInfo,
) -> JitResult<PhaseStatus> {
    let mut removable: Vec<NodeId> = Vec::new();
    for (id, node) in session.ir.nodes() {
        if !matches!(node.op, TreeOp::BoundsCheck) || node.args.len() != 2 {
            continue;
        }
        let index = &session.ir.node(node.args[0]).op;
        let length = &session.ir.node(node.args[1]).op;
        if let (TreeOp::IntCon(i), TreeOp::IntCon(l)) = (index, length) {
            if *i >= 0 && i < l {
                removable.push(id);
            }
        }
    }
    if removable.is_empty() {
        return Ok(PhaseStatus::Nothing);
    }
    for id in removable {
        let node = session.ir.node_mut(id);
        node.op = TreeOp::Nop;
        node.args.clear();
    }
    Ok(PhaseStatus::Everything)
}

fn dead_store_removal(
    _p: &Pipeline<'_>,
    session: &mut Session,
    _info: &MethodInfo,
) -> JitResult<PhaseStatus> {
    let mut read: rustc_hash::FxHashSet<u32> = rustc_hash::FxHashSet::default();
    for (_, node) in session.ir.nodes() {
        match node.op {
            TreeOp::LclLoad(l) | TreeOp::AddrOf(l) => {
                read.insert(l);
            }
            _ => {}
        }
    }
    let mut dead: Vec<NodeId> = Vec::new();
    for (id, node) in session.ir.nodes() {
        if let TreeOp::LclStore(lcl) = node.op {
            if !read.contains(&lcl) {
                dead.push(id);
            }
        }
    }
    if dead.is_empty() {
        return Ok(PhaseStatus::Nothing);
    }
    for id in dead {
        let node = session.ir.node_mut(id);
        node.op = TreeOp::Nop;
        node.args.clear();
    }
    Ok(PhaseStatus::Everything)
}

fn minimal_liveness_body(session: &mut Session) -> JitResult<PhaseStatus> {
    recount_locals_body(session)?;
    session.locals.finalize_tracking();
    Ok(PhaseStatus::Everything)
}

// =============================================================================
// Back-end actions
// =============================================================================

fn expand_helpers(
    _p: &Pipeline<'_>,
    session: &mut Session,
    _info: &MethodInfo,
) -> JitResult<PhaseStatus> {
    let mut expanded = 0;
    for node in session.ir.nodes_mut() {
        let helper = match node.op {
            TreeOp::RuntimeLookup => Helper::RuntimeLookup,
            TreeOp::StaticInit => Helper::StaticInit,
            TreeOp::TlsAccess => Helper::TlsAccess,
            TreeOp::Cast => Helper::CastClass,
            _ => continue,
        };
        node.op = TreeOp::HelperCall(helper);
        expanded += 1;
    }
    Ok(if expanded > 0 {
        PhaseStatus::Everything
    } else {
        PhaseStatus::Nothing
    })
}

fn insert_gc_polls(
    _p: &Pipeline<'_>,
    session: &mut Session,
    _info: &MethodInfo,
) -> JitResult<PhaseStatus> {
    let heads: Vec<_> = session
        .ir
        .block_ids()
        .filter(|&b| session.ir.block(b).flags.has(BlockFlags::LOOP_HEAD))
        .collect();
    if heads.is_empty() {
        return Ok(PhaseStatus::Nothing);
    }
    for head in heads {
        let poll = session.ir.add_node(TreeOp::GcPoll, []);
        session.ir.push_stmt(head, poll);
    }
    Ok(PhaseStatus::Everything)
}

fn create_throw_helpers(
    _p: &Pipeline<'_>,
    session: &mut Session,
    _info: &MethodInfo,
) -> JitResult<PhaseStatus> {
    let any_check = session
        .ir
        .nodes()
        .any(|(_, n)| matches!(n.op, TreeOp::BoundsCheck));
    if !any_check {
        return Ok(PhaseStatus::Nothing);
    }
    let throw = session.ir.new_block(BlockKind::Throw);
    let fail = session.ir.add_node(TreeOp::HelperCall(Helper::RangeFail), []);
    session.ir.push_stmt(throw, fail);
    let flags = &mut session.ir.block_mut(throw).flags;
    flags.set(BlockFlags::INTERNAL);
    flags.set(BlockFlags::COLD);
    Ok(PhaseStatus::Everything)
}

fn optimize_layout(
    _p: &Pipeline<'_>,
    session: &mut Session,
    _info: &MethodInfo,
) -> JitResult<PhaseStatus> {
    let cold = session
        .ir
        .live_blocks()
        .filter(|b| b.flags.has(BlockFlags::COLD))
        .count();
    Ok(if cold > 0 {
        PhaseStatus::Unknown
    } else {
        PhaseStatus::Nothing
    })
}

fn determine_cold_regions(
    _p: &Pipeline<'_>,
    session: &mut Session,
    _info: &MethodInfo,
) -> JitResult<PhaseStatus> {
    let entry = session.ir.entry();
    let mut marked = 0;
    for id in session.ir.block_ids().collect::<Vec<_>>() {
        if Some(id) == entry {
            continue;
        }
        let block = session.ir.block(id);
        if block.kind == BlockKind::Throw && !block.flags.has(BlockFlags::COLD) {
            session.ir.block_mut(id).flags.set(BlockFlags::COLD);
            marked += 1;
        }
    }
    Ok(if marked > 0 {
        PhaseStatus::Everything
    } else {
        PhaseStatus::Nothing
    })
}

fn rationalize(
    _p: &Pipeline<'_>,
    session: &mut Session,
    _info: &MethodInfo,
) -> JitResult<PhaseStatus> {
    session.ir.advance_form(IrForm::Rationalized)?;
    Ok(PhaseStatus::Everything)
}

fn lower(_p: &Pipeline<'_>, session: &mut Session, _info: &MethodInfo) -> JitResult<PhaseStatus> {
    session.ir.advance_form(IrForm::Linear)?;
    Ok(PhaseStatus::Everything)
}

fn reg_alloc(
    _p: &Pipeline<'_>,
    session: &mut Session,
    _info: &MethodInfo,
) -> JitResult<PhaseStatus> {
    let mut next_reg = 0u8;
    let mut next_slot = 0u32;
    for var in session.locals.iter_mut() {
        if var.tracked && !var.address_exposed {
            var.reg = Some(next_reg % 8);
            next_reg = next_reg.wrapping_add(1);
        } else {
            var.frame_offset = Some(next_slot);
            next_slot += 8;
        }
    }
    Ok(PhaseStatus::Everything)
}

fn align_loops(
    _p: &Pipeline<'_>,
    session: &mut Session,
    _info: &MethodInfo,
) -> JitResult<PhaseStatus> {
    let heads = session
        .ir
        .live_blocks()
        .filter(|b| b.flags.has(BlockFlags::LOOP_HEAD))
        .count();
    Ok(if heads > 0 {
        PhaseStatus::Unknown
    } else {
        PhaseStatus::Nothing
    })
}

fn codegen(p: &Pipeline<'_>, session: &mut Session, _info: &MethodInfo) -> JitResult<PhaseStatus> {
    let code = p.emitter.emit(&session.ir, &session.locals, session.opts.target)?;
    session.dump(format!("emitted {} bytes", code.size()));
    session.store_code(code);
    Ok(PhaseStatus::Everything)
}

fn patchpoint_info(
    _p: &Pipeline<'_>,
    session: &mut Session,
    _info: &MethodInfo,
) -> JitResult<PhaseStatus> {
    let patchpoints = session
        .ir
        .nodes()
        .filter(|(_, n)| matches!(n.op, TreeOp::Patchpoint { .. }))
        .count();
    session.dump(format!("{patchpoints} patchpoints reported"));
    Ok(PhaseStatus::Nothing)
}

fn record_stats(
    _p: &Pipeline<'_>,
    session: &mut Session,
    _info: &MethodInfo,
) -> JitResult<PhaseStatus> {
    session.dump(format!(
        "{} phases in {:?}",
        session.phase_times.phases_run(),
        session.phase_times.total_time()
    ));
    Ok(PhaseStatus::Nothing)
}

// =============================================================================
// Tests
// =============================================================================
