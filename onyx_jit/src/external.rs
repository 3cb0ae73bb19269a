//! The seams between the compiler and its host.
//!
//! The orchestrator itself never touches method bytes, metadata, or output
//! buffers directly. Three traits cover those concerns:
//! - [`MethodProvider`] resolves method handles to metadata and IL
//! - [`Importer`] translates IL into the initial tree-form IR
//! - [`CodeEmitter`] receives the finished IR and produces machine code
//!
//! Hosts implement these; the test suite substitutes recording stubs.

use onyx_core::{JitResult, MethodHandle, ModuleHandle};

use crate::ir::locals::LocalsTable;
use crate::ir::Ir;
use crate::options::{MethodMetrics, TargetIsa};

// =============================================================================
// Method descriptions
// =============================================================================

/// Kind of a protected region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EhKind {
    /// Try/catch handler.
    Catch,
    /// Try/finally handler.
    Finally,
    /// Exception filter.
    Filter,
}

/// One exception-handling region of a method.
#[derive(Debug, Clone)]
pub struct EhRegion {
    /// Region kind.
    pub kind: EhKind,
    /// IL offset where the protected range begins.
    pub try_begin: u32,
    /// IL offset one past the protected range.
    pub try_end: u32,
    /// IL offset of the handler.
    pub handler_begin: u32,
}

/// Everything the compiler needs to know about one method up front.
#[derive(Debug, Clone)]
pub struct MethodInfo {
    /// Handle of the method.
    pub method: MethodHandle,
    /// Module defining the method.
    pub module: ModuleHandle,
    /// Raw IL bytes.
    pub il: Vec<u8>,
    /// Complexity metrics.
    pub metrics: MethodMetrics,
    /// Exception-handling regions.
    pub eh_regions: Vec<EhRegion>,
    /// Human-readable name, for dumps.
    pub name: String,
}

impl MethodInfo {
    /// New description with empty IL and default metrics.
    #[must_use]
    pub fn new(method: MethodHandle, module: ModuleHandle) -> Self {
        Self {
            method,
            module,
            il: Vec::new(),
            metrics: MethodMetrics::default(),
            eh_regions: Vec::new(),
            name: String::new(),
        }
    }

    /// Attach IL bytes; updates the size metric.
    #[must_use]
    pub fn with_il(mut self, il: Vec<u8>) -> Self {
        self.metrics.il_size = il.len() as u32;
        self.il = il;
        self
    }

    /// Attach complexity metrics.
    #[must_use]
    pub fn with_metrics(mut self, metrics: MethodMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Attach an EH region.
    #[must_use]
    pub fn with_eh_region(mut self, region: EhRegion) -> Self {
        self.metrics.eh_region_count = self.eh_regions.len() as u32 + 1;
        self.eh_regions.push(region);
        self
    }

    /// Name the method, for dumps.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// IL size in bytes.
    #[inline]
    #[must_use]
    pub fn il_size(&self) -> u32 {
        self.il.len() as u32
    }

    /// Whether the method has any exception-handling regions.
    #[inline]
    #[must_use]
    pub fn has_eh(&self) -> bool {
        !self.eh_regions.is_empty()
    }
}

// =============================================================================
// Host traits
// =============================================================================

/// Resolves method handles to their metadata and IL.
pub trait MethodProvider {
    /// Look up a method's description. Inline candidates resolve through
    /// here as well.
    fn describe(&self, method: MethodHandle) -> JitResult<MethodInfo>;
}

/// Translates a method's IL into the initial tree-form IR.
pub trait Importer {
    /// Populate `ir` and `locals` from the method's IL. The IR arrives
    /// empty apart from its entry block.
    fn import(&self, info: &MethodInfo, ir: &mut Ir, locals: &mut LocalsTable) -> JitResult<()>;
}

/// Output buffer handed back to the host after code generation.
#[derive(Debug, Clone, Default)]
pub struct CodeBuffer {
    /// Emitted machine code.
    pub code: Vec<u8>,
    /// Offsets of patchpoint sites within `code`.
    pub patchpoint_offsets: Vec<u32>,
    /// Size of the hot portion, when cold splitting occurred.
    pub hot_size: u32,
}

impl CodeBuffer {
    /// Total emitted byte count.
    #[inline]
    #[must_use]
    pub fn size(&self) -> u32 {
        self.code.len() as u32
    }
}

/// Receives the finished IR and produces machine code for the target.
pub trait CodeEmitter {
    /// Generate code. Called once per successful compilation, after all
    /// IR phases complete.
    fn emit(&self, ir: &Ir, locals: &LocalsTable, target: TargetIsa) -> JitResult<CodeBuffer>;
}

// =============================================================================
// Tests
// =============================================================================
