//! Local variable descriptors.
//!
//! Owned exclusively by one session; never shared across sessions. Phases
//! update liveness and enregistration eligibility in place, and the
//! local-table finalization phase decides the tracked set.

/// Storage type of a local.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LclType {
    /// Machine integer.
    Int,
    /// Floating point.
    Double,
    /// GC reference.
    Ref,
    /// Struct with the given field count.
    Struct(u8),
}

/// Descriptor of one local variable.
#[derive(Debug, Clone)]
pub struct LclVarDsc {
    /// Storage type.
    pub ty: LclType,
    /// Appearance count, maintained by the liveness phases.
    pub ref_count: u32,
    /// Whether the local's address escapes into memory.
    pub address_exposed: bool,
    /// Whether the local participates in liveness and enregistration.
    pub tracked: bool,
    /// Whether struct promotion split this local into fields.
    pub promoted: bool,
    /// Whether this large-struct parameter was retyped to a by-reference.
    pub implicit_byref: bool,
    /// Assigned register, if enregistered.
    pub reg: Option<u8>,
    /// Frame offset, if spilled.
    pub frame_offset: Option<u32>,
}

impl LclVarDsc {
    /// New untyped-int descriptor.
    #[must_use]
    pub fn new(ty: LclType) -> Self {
        Self {
            ty,
            ref_count: 0,
            address_exposed: false,
            tracked: false,
            promoted: false,
            implicit_byref: false,
            reg: None,
            frame_offset: None,
        }
    }
}

/// The session's symbol table.
#[derive(Debug, Default)]
pub struct LocalsTable {
    vars: Vec<LclVarDsc>,
}

impl LocalsTable {
    /// Empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Table pre-populated with `count` integer locals.
    #[must_use]
    pub fn with_count(count: u32) -> Self {
        Self {
            vars: (0..count).map(|_| LclVarDsc::new(LclType::Int)).collect(),
        }
    }

    /// Append a local, returning its number.
    pub fn push(&mut self, ty: LclType) -> u32 {
        self.vars.push(LclVarDsc::new(ty));
        (self.vars.len() - 1) as u32
    }

    /// Descriptor accessor.
    #[inline]
    pub fn get(&self, lcl: u32) -> Option<&LclVarDsc> {
        self.vars.get(lcl as usize)
    }

    /// Mutable descriptor accessor.
    #[inline]
    pub fn get_mut(&mut self, lcl: u32) -> Option<&mut LclVarDsc> {
        self.vars.get_mut(lcl as usize)
    }

    /// Number of locals.
    #[inline]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether the table is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Iterate descriptors.
    pub fn iter(&self) -> impl Iterator<Item = &LclVarDsc> {
        self.vars.iter()
    }

    /// Iterate descriptors mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut LclVarDsc> {
        self.vars.iter_mut()
    }

    /// Zero every ref count, ahead of a recount.
    pub fn reset_ref_counts(&mut self) {
        for v in &mut self.vars {
            v.ref_count = 0;
        }
    }

    /// Decide the tracked set: referenced locals whose address does not
    /// escape. Returns the tracked count.
    pub fn finalize_tracking(&mut self) -> usize {
        let mut tracked = 0;
        for v in &mut self.vars {
            v.tracked = v.ref_count > 0 && !v.address_exposed;
            if v.tracked {
                tracked += 1;
            }
        }
        tracked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_count() {
        let table = LocalsTable::with_count(3);
        assert_eq!(table.len(), 3);
        assert!(table.get(2).is_some());
        assert!(table.get(3).is_none());
    }

    #[test]
    fn test_push_types() {
        let mut table = LocalsTable::new();
        let a = table.push(LclType::Ref);
        let b = table.push(LclType::Struct(4));
        assert_eq!((a, b), (0, 1));
        assert_eq!(table.get(b).unwrap().ty, LclType::Struct(4));
    }

    #[test]
    fn test_finalize_tracking() {
        let mut table = LocalsTable::with_count(3);
        table.get_mut(0).unwrap().ref_count = 2;
        table.get_mut(1).unwrap().ref_count = 1;
        table.get_mut(1).unwrap().address_exposed = true;

        let tracked = table.finalize_tracking();
        assert_eq!(tracked, 1);
        assert!(table.get(0).unwrap().tracked);
        assert!(!table.get(1).unwrap().tracked);
        assert!(!table.get(2).unwrap().tracked);
    }
}
