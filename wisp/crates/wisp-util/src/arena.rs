//! Bump-pointer arena allocator (spec §4.1).
//!
//! Contract: `alloc` is bump allocation within the current block; when a
//! request does not fit, a new block is linked into the chain sized
//! `max(request, previous_capacity)` and becomes current. `reset`
//! invalidates every prior allocation from this arena without returning
//! memory to the OS. `destroy` frees the whole chain. [`bumpalo::Bump`]
//! already implements exactly this chained-growing-block discipline, so
//! `Arena` is a thin wrapper that gives it the fallible, spec-shaped API
//! lexing and parsing expect instead of `bumpalo`'s infallible-by-default
//! one.
//!
//! Arenas are not `Sync`: one arena is owned by one owner (lexer, parser,
//! or an evaluator stack frame) at a time, matching spec's "arenas are not
//! thread-safe" note.

use crate::error::{ArenaError, ArenaResult};
use bumpalo::Bump;

pub struct Arena {
    bump: Bump,
}

impl Arena {
    pub fn new() -> Self {
        Self { bump: Bump::new() }
    }

    pub fn with_capacity(bytes: usize) -> Self {
        Self { bump: Bump::with_capacity(bytes) }
    }

    /// Allocate a value in this arena, returning a reference with the
    /// arena's lifetime.
    pub fn alloc<T>(&self, value: T) -> ArenaResult<&T> {
        self.bump.try_alloc_with(|| value).map_err(|_| {
            let requested = std::mem::size_of::<T>();
            log::warn!("arena allocation of {requested} bytes failed");
            ArenaError::OutOfMemory { requested }
        })
    }

    pub fn alloc_str(&self, text: &str) -> ArenaResult<&str> {
        self.bump.try_alloc_str(text).map_err(|_| {
            log::warn!("arena allocation of {} bytes failed", text.len());
            ArenaError::OutOfMemory { requested: text.len() }
        })
    }

    pub fn alloc_slice_copy<T: Copy>(&self, slice: &[T]) -> ArenaResult<&[T]> {
        self.bump.try_alloc_slice_copy(slice).map_err(|_| {
            let requested = std::mem::size_of_val(slice);
            log::warn!("arena allocation of {requested} bytes failed");
            ArenaError::OutOfMemory { requested }
        })
    }

    /// Invalidate every allocation made so far. Callers must not retain
    /// any reference obtained before this call; the lexer/parser driver
    /// resets the arena only after it has finished with the tokens and
    /// expression tree from the previous pass.
    pub fn reset(&mut self) {
        self.bump.reset();
    }

    pub fn allocated_bytes(&self) -> usize {
        self.bump.allocated_bytes()
    }

    /// Free the whole arena chain. Equivalent to dropping the arena; kept
    /// as an explicit method so call sites can document intent the way
    /// the contract in spec §4.1 names it.
    pub fn destroy(self) {
        drop(self);
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
    fn alloc_returns_usable_reference() {
        let arena = Arena::new();
        let x = arena.alloc(42i64).unwrap();
        assert_eq!(*x, 42);
    }

    #[test]
    fn reset_allows_reuse() {
        let mut arena = Arena::new();
        let _ = arena.alloc(1i64).unwrap();
        let before = arena.allocated_bytes();
        arena.reset();
        assert!(arena.allocated_bytes() <= before);
        let _ = arena.alloc(2i64).unwrap();
    }

    #[test]
    fn grows_past_initial_block() {
        let arena = Arena::with_capacity(16);
        for i in 0..1000i64 {
            let _ = arena.alloc(i).unwrap();
        }
    }

    #[test]
    fn alloc_str_preserves_contents() {
        let arena = Arena::new();
        let s = arena.alloc_str("hello arena").unwrap();
        assert_eq!(s, "hello arena");
    }
}
