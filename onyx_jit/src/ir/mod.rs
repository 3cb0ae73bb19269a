//! Tree-based intermediate representation.
//!
//! The IR is an ordered collection of basic blocks, each holding an ordered
//! list of statement trees. Nodes live in a single arena+index pool addressed
//! by [`NodeId`]; trees reference their operands by id, never by pointer.
//!
//! The representation moves through a one-way ratchet of forms: tree-shaped
//! after importation, rationalized after the tree/linear boundary, and linear
//! once lowered for register allocation. A form transition can never be
//! rolled back within one compilation.

pub mod locals;

pub use locals::{LclType, LclVarDsc, LocalsTable};

use onyx_core::{JitError, JitResult, MethodHandle};
use smallvec::SmallVec;

// =============================================================================
// Ids
// =============================================================================

/// Index of a tree node in the session's node pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Create from a raw index.
    #[inline]
    pub const fn new(id: u32) -> Self {
        NodeId(id)
    }

    /// Get the pool index.
    #[inline(always)]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a basic block in the flow graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl BlockId {
    /// Create from a raw index.
    #[inline]
    pub const fn new(id: u32) -> Self {
        BlockId(id)
    }

    /// Get the graph index.
    #[inline(always)]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

// =============================================================================
// Tree operators
// =============================================================================

/// Runtime helper targets produced by late expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Helper {
    /// Generic dictionary lookup.
    RuntimeLookup,
    /// Static constructor trigger.
    StaticInit,
    /// Thread-local storage access.
    TlsAccess,
    /// Checked cast.
    CastClass,
    /// Range-check failure throw.
    RangeFail,
}

/// Operator of a tree node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeOp {
    /// No operation (also what a spliced-away call collapses to).
    Nop,
    /// Integer constant.
    IntCon(i64),
    /// Read of a local variable.
    LclLoad(u32),
    /// Store to a local variable; operand is the value.
    LclStore(u32),
    /// Address of a local variable.
    AddrOf(u32),
    /// Integer addition.
    Add,
    /// Integer multiplication.
    Mul,
    /// Array bounds check; operands are index and length.
    BoundsCheck,
    /// Direct call.
    Call {
        /// Callee method.
        target: MethodHandle,
        /// Whether the importer marked this site as an inline candidate.
        inline_candidate: bool,
    },
    /// Indirect call through a pointer.
    IndirectCall,
    /// Call to a runtime helper (result of late expansion).
    HelperCall(Helper),
    /// Generic runtime lookup, expanded late into a helper call.
    RuntimeLookup,
    /// Static initialization trigger, expanded late.
    StaticInit,
    /// Thread-local access, expanded late.
    TlsAccess,
    /// Checked cast, expanded late.
    Cast,
    /// Object allocation.
    AllocObj {
        /// Whether escape analysis proved the object escapes.
        escapes: bool,
    },
    /// OSR transition point at a loop head.
    Patchpoint {
        /// IL offset of the loop back-edge target.
        il_offset: u32,
    },
    /// Profile counter probe inserted under instrumentation.
    CounterProbe,
    /// GC suspension poll.
    GcPoll,
    /// Stack-guard cookie check.
    GsCookieCheck,
    /// Return from the method; optional operand is the value.
    Return,
}

// =============================================================================
// Nodes and blocks
// =============================================================================

/// One node of a statement tree.
#[derive(Debug, Clone)]
pub struct TreeNode {
    /// Operator.
    pub op: TreeOp,
    /// Operand node ids.
    pub args: SmallVec<[NodeId; 2]>,
    /// Value number, assigned by the value-numbering phase.
    pub vn: Option<u32>,
    /// SSA definition number, assigned during SSA construction.
    pub ssa_num: Option<u32>,
    /// Linear order, assigned by statement/tree ordering.
    pub order: u32,
}

impl TreeNode {
    fn new(op: TreeOp, args: SmallVec<[NodeId; 2]>) -> Self {
        Self {
            op,
            args,
            vn: None,
            ssa_num: None,
            order: 0,
        }
    }
}

/// Classification of a basic block's terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Falls through or branches.
    Basic,
    /// Ends in a return.
    Return,
    /// Ends in a throw.
    Throw,
    /// Transfers to a finally handler.
    CallFinally,
}

/// Per-block flag bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockFlags(pub u16);

impl BlockFlags {
    /// Produced by importation.
    pub const IMPORTED: u16 = 1 << 0;
    /// Compiler-created scratch block.
    pub const INTERNAL: u16 = 1 << 1;
    /// Target of a backward branch.
    pub const LOOP_HEAD: u16 = 1 << 2;
    /// Rarely executed.
    pub const COLD: u16 = 1 << 3;
    /// Unlinked from the flow graph.
    pub const REMOVED: u16 = 1 << 4;
    /// OSR entry point.
    pub const OSR_ENTRY: u16 = 1 << 5;
    /// Exception handler funclet.
    pub const FUNCLET: u16 = 1 << 6;
    /// Body spliced in by inlining.
    pub const INLINED: u16 = 1 << 7;
    /// Duplicated by loop cloning.
    pub const CLONED: u16 = 1 << 8;

    /// Set a flag bit.
    #[inline]
    pub fn set(&mut self, flag: u16) {
        self.0 |= flag;
    }

    /// Clear a flag bit.
    #[inline]
    pub fn clear(&mut self, flag: u16) {
        self.0 &= !flag;
    }

    /// Test a flag bit.
    #[inline]
    pub fn has(self, flag: u16) -> bool {
        self.0 & flag != 0
    }
}

/// A basic block: ordered statements plus flow-graph edges.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    /// Block id.
    pub id: BlockId,
    /// Terminator classification.
    pub kind: BlockKind,
    /// Flag bits.
    pub flags: BlockFlags,
    /// Statement roots, in execution order.
    pub stmts: SmallVec<[NodeId; 4]>,
    /// Successor blocks.
    pub succs: SmallVec<[BlockId; 2]>,
    /// Relative execution weight.
    pub weight: u32,
}

// =============================================================================
// IR form ratchet
// =============================================================================

/// Representation form, ratcheted strictly forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IrForm {
    /// Tree-shaped, as produced by importation.
    Tree,
    /// Trees rationalized into canonical statement form.
    Rationalized,
    /// Linear form ready for register allocation and code generation.
    Linear,
}

// =============================================================================
// IR aggregate
// =============================================================================

/// The IR of one compilation: node pool, flow graph, and current form.
#[derive(Debug)]
pub struct Ir {
    nodes: Vec<TreeNode>,
    blocks: Vec<BasicBlock>,
    form: IrForm,
}

impl Ir {
    /// Create an empty tree-form IR.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            blocks: Vec::new(),
            form: IrForm::Tree,
        }
    }

    /// Current representation form.
    #[inline]
    pub fn form(&self) -> IrForm {
        self.form
    }

    /// Advance the representation form. The transition is one-way; asking to
    /// move backwards (or to stand still) is an internal error.
    pub fn advance_form(&mut self, next: IrForm) -> JitResult<()> {
        if next <= self.form {
            return Err(JitError::internal(format!(
                "illegal IR form transition {:?} -> {:?}",
                self.form, next
            )));
        }
        self.form = next;
        Ok(())
    }

    /// Append a new block.
    pub fn new_block(&mut self, kind: BlockKind) -> BlockId {
        let id = BlockId::new(self.blocks.len() as u32);
        self.blocks.push(BasicBlock {
            id,
            kind,
            flags: BlockFlags::default(),
            stmts: SmallVec::new(),
            succs: SmallVec::new(),
            weight: 0,
        });
        id
    }

    /// Append a new node.
    pub fn add_node(&mut self, op: TreeOp, args: impl IntoIterator<Item = NodeId>) -> NodeId {
        let id = NodeId::new(self.nodes.len() as u32);
        self.nodes.push(TreeNode::new(op, args.into_iter().collect()));
        id
    }

    /// Append a statement root to a block.
    pub fn push_stmt(&mut self, block: BlockId, stmt: NodeId) {
        self.blocks[block.index()].stmts.push(stmt);
    }

    /// Node accessor.
    #[inline]
    pub fn node(&self, id: NodeId) -> &TreeNode {
        &self.nodes[id.index()]
    }

    /// Mutable node accessor.
    #[inline]
    pub fn node_mut(&mut self, id: NodeId) -> &mut TreeNode {
        &mut self.nodes[id.index()]
    }

    /// Block accessor.
    #[inline]
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.index()]
    }

    /// Mutable block accessor.
    #[inline]
    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.index()]
    }

    /// Total nodes ever allocated (including dead ones).
    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Iterate all nodes with their ids.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &TreeNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (NodeId::new(i as u32), n))
    }

    /// Mutable node slice.
    pub fn nodes_mut(&mut self) -> &mut [TreeNode] {
        &mut self.nodes
    }

    /// Entry block, once importation has produced one.
    #[inline]
    pub fn entry(&self) -> Option<BlockId> {
        self.blocks.first().map(|b| b.id)
    }

    /// Iterate blocks that have not been removed.
    pub fn live_blocks(&self) -> impl Iterator<Item = &BasicBlock> {
        self.blocks
            .iter()
            .filter(|b| !b.flags.has(BlockFlags::REMOVED))
    }

    /// Number of live blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.live_blocks().count()
    }

    /// All block ids, live or not.
    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> {
        (0..self.blocks.len() as u32).map(BlockId::new)
    }

    /// Mark empty non-internal basic blocks as removed.
    ///
    /// The entry block is always retained.
    pub fn remove_empty_basic_blocks(&mut self) -> usize {
        let mut removed = 0;
        for block in self.blocks.iter_mut().skip(1) {
            if block.kind == BlockKind::Basic
                && block.stmts.is_empty()
                && !block.flags.has(BlockFlags::INTERNAL)
                && !block.flags.has(BlockFlags::REMOVED)
            {
                block.flags.set(BlockFlags::REMOVED);
                removed += 1;
            }
        }
        removed
    }

    /// Which blocks are reachable from the entry along successor edges.
    ///
    /// Removed blocks are never visited. Returns an empty vector for an
    /// empty graph.
    #[must_use]
    pub fn reachable_from_entry(&self) -> Vec<bool> {
        let mut seen = vec![false; self.blocks.len()];
        let Some(entry) = self.entry() else {
            return seen;
        };
        let mut stack = vec![entry];
        while let Some(id) = stack.pop() {
            let idx = id.index();
            if seen[idx] || self.blocks[idx].flags.has(BlockFlags::REMOVED) {
                continue;
            }
            seen[idx] = true;
            for &succ in &self.blocks[idx].succs {
                stack.push(succ);
            }
        }
        seen
    }

    /// Clear value numbers, SSA numbers, and loop annotations.
    ///
    /// Used between iterations of the optimize-repeat loop; the optimization
    /// level itself is never recomputed here.
    pub fn reset_opt_annotations(&mut self) {
        for node in &mut self.nodes {
            node.vn = None;
            node.ssa_num = None;
        }
        for block in &mut self.blocks {
            block.flags.clear(BlockFlags::LOOP_HEAD);
        }
    }

    /// Splice a finished inlinee body into this IR in place of a call.
    ///
    /// Copies the inlinee's statements (with remapped node ids) into `block`
    /// ahead of the call statement, then collapses the call node itself into
    /// either the inlinee's return value or a no-op. Returns the ids of the
    /// copied nodes, so the caller can scan them for further candidates.
    pub fn splice_inlinee(
        &mut self,
        callee: &Ir,
        block: BlockId,
        call_node: NodeId,
    ) -> Vec<NodeId> {
        let base = self.nodes.len() as u32;
        let mut copied = Vec::with_capacity(callee.nodes.len());
        for node in &callee.nodes {
            let args = node.args.iter().map(|a| NodeId::new(a.0 + base)).collect();
            let id = NodeId::new(self.nodes.len() as u32);
            self.nodes.push(TreeNode::new(node.op.clone(), args));
            copied.push(id);
        }

        // Gather the inlinee statements in block order, splitting off the
        // return so its value can replace the call.
        let mut new_stmts: Vec<NodeId> = Vec::new();
        let mut ret_value: Option<NodeId> = None;
        for cb in callee.live_blocks() {
            for &stmt in &cb.stmts {
                let mapped = NodeId::new(stmt.0 + base);
                if matches!(callee.node(stmt).op, TreeOp::Return) {
                    ret_value = callee
                        .node(stmt)
                        .args
                        .first()
                        .map(|a| NodeId::new(a.0 + base));
                } else {
                    new_stmts.push(mapped);
                }
            }
        }

        let pos = self.blocks[block.index()]
            .stmts
            .iter()
            .position(|&s| s == call_node)
            .unwrap_or(0);
        for (i, stmt) in new_stmts.into_iter().enumerate() {
            self.blocks[block.index()].stmts.insert(pos + i, stmt);
        }
        self.blocks[block.index()].flags.set(BlockFlags::INLINED);

        // The call site becomes a use of the return value, or nothing.
        let call = &mut self.nodes[call_node.index()];
        match ret_value {
            Some(v) => {
                call.op = TreeOp::Nop;
                call.args = SmallVec::from_slice(&[v]);
            }
            None => {
                call.op = TreeOp::Nop;
                call.args.clear();
            }
        }

        copied
    }
}

impl Default for Ir {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
