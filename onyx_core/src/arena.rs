//! Bump arena scoped to one root compilation.
//!
//! Every allocation made on behalf of a root session and all of its nested
//! inlinee sessions is charged to a single arena, and the driver releases the
//! arena exactly once, after the orchestrator returns. Discarding a failed
//! inline attempt is an O(1) rewind to a previously taken mark.
//!
//! The arena hands out offsets into chunked storage rather than raw pointers;
//! IR nodes are stored arena+index style (`Vec` pools addressed by ids), so
//! the arena's job is ownership, accounting, and cheap rollback.

/// Default chunk size in bytes.
const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// A position in the arena, for O(1) rollback of speculative work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaMark {
    chunk: usize,
    used: usize,
    total: usize,
}

/// Bump allocator owning all per-compilation transient memory.
#[derive(Debug)]
pub struct Arena {
    chunks: Vec<Vec<u8>>,
    /// Index of the chunk currently being bumped.
    current: usize,
    /// Bytes used in the current chunk.
    used: usize,
    chunk_size: usize,
    /// Total live bytes across all chunks.
    total: usize,
    /// High-water mark across the arena's lifetime (survives rewinds).
    high_water: usize,
}

impl Arena {
    /// Create an arena with the default chunk size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_chunk_size(DEFAULT_CHUNK_SIZE)
    }

    /// Create an arena with a custom chunk size.
    #[must_use]
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunks: vec![vec![0u8; chunk_size]],
            current: 0,
            used: 0,
            chunk_size: chunk_size.max(16),
            total: 0,
            high_water: 0,
        }
    }

    /// Reserve `size` bytes, returning the arena-relative offset of the
    /// allocation as `(chunk, offset)`.
    pub fn alloc(&mut self, size: usize) -> (usize, usize) {
        debug_assert!(size <= self.chunk_size, "oversized arena request");
        if self.used + size > self.chunks[self.current].len() {
            self.current += 1;
            self.used = 0;
            if self.current == self.chunks.len() {
                self.chunks.push(vec![0u8; self.chunk_size]);
            }
        }
        let offset = self.used;
        self.used += size;
        self.total += size;
        self.high_water = self.high_water.max(self.total);
        (self.current, offset)
    }

    /// Take a mark for later rollback.
    #[must_use]
    pub fn mark(&self) -> ArenaMark {
        ArenaMark {
            chunk: self.current,
            used: self.used,
            total: self.total,
        }
    }

    /// Rewind to a previously taken mark, discarding everything allocated
    /// since. Chunks are retained for reuse.
    pub fn rewind(&mut self, mark: ArenaMark) {
        debug_assert!(mark.chunk <= self.current);
        self.current = mark.chunk;
        self.used = mark.used;
        self.total = mark.total;
    }

    /// Live bytes currently allocated.
    #[inline]
    #[must_use]
    pub fn allocated_bytes(&self) -> usize {
        self.total
    }

    /// Peak bytes ever allocated, including rewound work.
    #[inline]
    #[must_use]
    pub fn high_water_bytes(&self) -> usize {
        self.high_water
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_bumps() {
        let mut arena = Arena::with_chunk_size(64);
        let (c0, o0) = arena.alloc(16);
        let (c1, o1) = arena.alloc(16);
        assert_eq!((c0, o0), (0, 0));
        assert_eq!((c1, o1), (0, 16));
        assert_eq!(arena.allocated_bytes(), 32);
    }

    #[test]
    fn test_alloc_spills_to_new_chunk() {
        let mut arena = Arena::with_chunk_size(32);
        arena.alloc(24);
        let (chunk, offset) = arena.alloc(24);
        assert_eq!(chunk, 1);
        assert_eq!(offset, 0);
        assert_eq!(arena.allocated_bytes(), 48);
    }

    #[test]
    fn test_mark_rewind_is_cheap_discard() {
        let mut arena = Arena::with_chunk_size(32);
        arena.alloc(8);
        let mark = arena.mark();

        arena.alloc(24);
        arena.alloc(24);
        assert_eq!(arena.allocated_bytes(), 56);

        arena.rewind(mark);
        assert_eq!(arena.allocated_bytes(), 8);
        // High water remembers the rewound work.
        assert_eq!(arena.high_water_bytes(), 56);
    }

    #[test]
    fn test_rewound_chunks_are_reused() {
        let mut arena = Arena::with_chunk_size(32);
        let mark = arena.mark();
        arena.alloc(32);
        arena.alloc(32);
        let chunks_before = arena.chunks.len();

        arena.rewind(mark);
        arena.alloc(32);
        arena.alloc(32);
        assert_eq!(arena.chunks.len(), chunks_before);
    }
}
