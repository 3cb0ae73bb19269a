//! The phase registry.
//!
//! A fixed, process-wide catalog of every named phase the pipeline can run,
//! with parent/child nesting for reporting and a flag for phases that report
//! IR-size metrics. Every phase has exactly one entry; parent references form
//! a tree of depth at most two (phase and optional sub-phase).

/// Identifier of one pipeline phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[allow(missing_docs)]
pub enum PhaseId {
    PreImport,
    ProfileInstrumentPrep,
    IncorporateProfile,
    OsrEntryFixup,
    Importation,
    InstrumentationInsert,
    PatchpointExpansion,
    IndirectCallTransform,
    PostImportCleanup,
    MorphInit,
    Inlining,
    ObjectStackAllocation,
    AddInternalBlocks,
    EmptyTryFinallyRemoval,
    MergeCloneFinally,
    EarlyFlowCleanup,
    PromoteStructs,
    MarkAddressExposed,
    EarlyLiveness,
    ForwardSub,
    PhysicalPromotion,
    RetypeImplicitByRefs,
    RemoveDeadBlocks,
    Morph,
    PostMorph,
    GsCookie,
    ComputeEdgeWeights,
    CreateFunclets,
    InvertLoops,
    OptimizeFlow,
    TailMergeThrows,
    ComputeDominators,
    FindLoops,
    CloneLoops,
    UnrollLoops,
    FinalizeLocals,
    SetTreeOrder,
    SsaBuild,
    SsaLiveness,
    SsaRename,
    ValueNumber,
    Cse,
    AssertionProp,
    RedundantBranchElim,
    RangeCheck,
    DeadStoreRemoval,
    MinimalLiveness,
    ExpandHelpers,
    InsertGcPolls,
    CreateThrowHelpers,
    OptimizeBools,
    IfConversion,
    OptimizeLayout,
    RecognizeSwitches,
    DetermineColdRegions,
    Rationalize,
    Lower,
    ComputeStackLevels,
    RegAlloc,
    AlignLoops,
    CodeGen,
    PatchpointInfo,
    RecordStats,
}

impl PhaseId {
    /// Every registered phase, in canonical pipeline order.
    pub const ALL: &'static [PhaseId] = &[
        PhaseId::PreImport,
        PhaseId::ProfileInstrumentPrep,
        PhaseId::IncorporateProfile,
        PhaseId::OsrEntryFixup,
        PhaseId::Importation,
        PhaseId::InstrumentationInsert,
        PhaseId::PatchpointExpansion,
        PhaseId::IndirectCallTransform,
        PhaseId::PostImportCleanup,
        PhaseId::MorphInit,
        PhaseId::Inlining,
        PhaseId::ObjectStackAllocation,
        PhaseId::AddInternalBlocks,
        PhaseId::EmptyTryFinallyRemoval,
        PhaseId::MergeCloneFinally,
        PhaseId::EarlyFlowCleanup,
        PhaseId::PromoteStructs,
        PhaseId::MarkAddressExposed,
        PhaseId::EarlyLiveness,
        PhaseId::ForwardSub,
        PhaseId::PhysicalPromotion,
        PhaseId::RetypeImplicitByRefs,
        PhaseId::RemoveDeadBlocks,
        PhaseId::Morph,
        PhaseId::PostMorph,
        PhaseId::GsCookie,
        PhaseId::ComputeEdgeWeights,
        PhaseId::CreateFunclets,
        PhaseId::InvertLoops,
        PhaseId::OptimizeFlow,
        PhaseId::TailMergeThrows,
        PhaseId::ComputeDominators,
        PhaseId::FindLoops,
        PhaseId::CloneLoops,
        PhaseId::UnrollLoops,
        PhaseId::FinalizeLocals,
        PhaseId::SetTreeOrder,
        PhaseId::SsaBuild,
        PhaseId::SsaLiveness,
        PhaseId::SsaRename,
        PhaseId::ValueNumber,
        PhaseId::Cse,
        PhaseId::AssertionProp,
        PhaseId::RedundantBranchElim,
        PhaseId::RangeCheck,
        PhaseId::DeadStoreRemoval,
        PhaseId::MinimalLiveness,
        PhaseId::ExpandHelpers,
        PhaseId::InsertGcPolls,
        PhaseId::CreateThrowHelpers,
        PhaseId::OptimizeBools,
        PhaseId::IfConversion,
        PhaseId::OptimizeLayout,
        PhaseId::RecognizeSwitches,
        PhaseId::DetermineColdRegions,
        PhaseId::Rationalize,
        PhaseId::Lower,
        PhaseId::ComputeStackLevels,
        PhaseId::RegAlloc,
        PhaseId::AlignLoops,
        PhaseId::CodeGen,
        PhaseId::PatchpointInfo,
        PhaseId::RecordStats,
    ];

    /// Phase name for reporting.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            PhaseId::PreImport => "pre-import",
            PhaseId::ProfileInstrumentPrep => "profile-instrument-prep",
            PhaseId::IncorporateProfile => "incorporate-profile",
            PhaseId::OsrEntryFixup => "osr-entry-fixup",
            PhaseId::Importation => "importation",
            PhaseId::InstrumentationInsert => "instrumentation-insert",
            PhaseId::PatchpointExpansion => "patchpoint-expansion",
            PhaseId::IndirectCallTransform => "indirect-call-transform",
            PhaseId::PostImportCleanup => "post-import-cleanup",
            PhaseId::MorphInit => "morph-init",
            PhaseId::Inlining => "inlining",
            PhaseId::ObjectStackAllocation => "object-stack-allocation",
            PhaseId::AddInternalBlocks => "add-internal-blocks",
            PhaseId::EmptyTryFinallyRemoval => "empty-try-finally-removal",
            PhaseId::MergeCloneFinally => "merge-clone-finally",
            PhaseId::EarlyFlowCleanup => "early-flow-cleanup",
            PhaseId::PromoteStructs => "promote-structs",
            PhaseId::MarkAddressExposed => "mark-address-exposed",
            PhaseId::EarlyLiveness => "early-liveness",
            PhaseId::ForwardSub => "forward-sub",
            PhaseId::PhysicalPromotion => "physical-promotion",
            PhaseId::RetypeImplicitByRefs => "retype-implicit-byrefs",
            PhaseId::RemoveDeadBlocks => "remove-dead-blocks",
            PhaseId::Morph => "morph",
            PhaseId::PostMorph => "post-morph",
            PhaseId::GsCookie => "gs-cookie",
            PhaseId::ComputeEdgeWeights => "compute-edge-weights",
            PhaseId::CreateFunclets => "create-funclets",
            PhaseId::InvertLoops => "invert-loops",
            PhaseId::OptimizeFlow => "optimize-flow",
            PhaseId::TailMergeThrows => "tail-merge-throws",
            PhaseId::ComputeDominators => "compute-dominators",
            PhaseId::FindLoops => "find-loops",
            PhaseId::CloneLoops => "clone-loops",
            PhaseId::UnrollLoops => "unroll-loops",
            PhaseId::FinalizeLocals => "finalize-locals",
            PhaseId::SetTreeOrder => "set-tree-order",
            PhaseId::SsaBuild => "ssa-build",
            PhaseId::SsaLiveness => "ssa-liveness",
            PhaseId::SsaRename => "ssa-rename",
            PhaseId::ValueNumber => "value-number",
            PhaseId::Cse => "cse",
            PhaseId::AssertionProp => "assertion-prop",
            PhaseId::RedundantBranchElim => "redundant-branch-elim",
            PhaseId::RangeCheck => "range-check",
            PhaseId::DeadStoreRemoval => "dead-store-removal",
            PhaseId::MinimalLiveness => "minimal-liveness",
            PhaseId::ExpandHelpers => "expand-helpers",
            PhaseId::InsertGcPolls => "insert-gc-polls",
            PhaseId::CreateThrowHelpers => "create-throw-helpers",
            PhaseId::OptimizeBools => "optimize-bools",
            PhaseId::IfConversion => "if-conversion",
            PhaseId::OptimizeLayout => "optimize-layout",
            PhaseId::RecognizeSwitches => "recognize-switches",
            PhaseId::DetermineColdRegions => "determine-cold-regions",
            PhaseId::Rationalize => "rationalize",
            PhaseId::Lower => "lower",
            PhaseId::ComputeStackLevels => "compute-stack-levels",
            PhaseId::RegAlloc => "regalloc",
            PhaseId::AlignLoops => "align-loops",
            PhaseId::CodeGen => "codegen",
            PhaseId::PatchpointInfo => "patchpoint-info",
            PhaseId::RecordStats => "record-stats",
        }
    }

    /// Parent phase, for nested sub-phases.
    #[must_use]
    pub const fn parent(self) -> Option<PhaseId> {
        match self {
            PhaseId::SsaLiveness | PhaseId::SsaRename => Some(PhaseId::SsaBuild),
            _ => None,
        }
    }

    /// Whether this phase reports IR-size metrics.
    #[must_use]
    pub const fn reports_size(self) -> bool {
        matches!(
            self,
            PhaseId::Importation
                | PhaseId::Inlining
                | PhaseId::Morph
                | PhaseId::Cse
                | PhaseId::DeadStoreRemoval
                | PhaseId::Lower
        )
    }
}
