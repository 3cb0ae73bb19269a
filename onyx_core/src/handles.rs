//! Opaque host-provided handles.
//!
//! The host identifies methods and modules by opaque tokens; the
//! compiler never looks inside them, it only passes them back across the
//! metadata seam and uses them as map keys.

/// Unique identifier for a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodHandle(pub u64);

impl MethodHandle {
    /// Create from a raw u64 value.
    #[inline]
    pub const fn new(id: u64) -> Self {
        MethodHandle(id)
    }

    /// Get the underlying u64 value.
    #[inline(always)]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Deterministic hash of the handle, used by the stress-sampling knob.
    ///
    /// FNV-1a over the handle bytes; stable across runs so stress selection
    /// is reproducible.
    #[must_use]
    pub const fn stable_hash(self) -> u64 {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        let mut bytes = self.0;
        let mut i = 0;
        while i < 8 {
            hash ^= bytes & 0xff;
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
            bytes >>= 8;
            i += 1;
        }
        hash
    }
}

/// Unique identifier for a module, used for token resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleHandle(pub u64);

impl ModuleHandle {
    /// Create from a raw u64 value.
    #[inline]
    pub const fn new(id: u64) -> Self {
        ModuleHandle(id)
    }

    /// Get the underlying u64 value.
    #[inline(always)]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}
