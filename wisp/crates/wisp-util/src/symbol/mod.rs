//! Symbol interning.
//!
//! A [`Symbol`] is a 32-bit handle into a global, process-wide string
//! table. Two symbols compare equal in O(1) (integer comparison) rather
//! than by comparing string contents, and every symbol carries its
//! original text recoverable through [`Symbol::as_str`]. This is the
//! representation spec §3/§4.4 assumes when it says names are "interned
//! (pointer-equality + precomputed hash for comparison)": a `Symbol` index
//! plays the role of that pointer.

pub mod known;
mod interner;

pub use interner::{StringTable, STRING_TABLE};

use std::fmt;

/// An interned name. Cheap to copy, compare, and hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol {
    index: u32,
}

static_assertions::assert_impl_all!(Symbol: Send, Sync);

impl Symbol {
    /// Intern `text`, returning the existing symbol if it was already
    /// interned or allocating a fresh one otherwise.
    pub fn intern(text: &str) -> Self {
        STRING_TABLE.intern(text)
    }

    /// Intern one of the reserved keyword/builtin names. Panics if `idx`
    /// is outside the reserved range; callers pass the `KW_*` /
    /// `BUILTIN_NAME_*` constants from [`known`], never an arbitrary
    /// value, so this is a programmer error if it fires.
    pub fn known(idx: u32) -> Self {
        debug_assert!(idx < interner::RESERVED_SYMBOLS_END);
        Symbol { index: idx }
    }

    pub fn as_str(&self) -> &'static str {
        STRING_TABLE.get(*self).unwrap_or("<invalid symbol>")
    }

    pub fn is_known(&self) -> bool {
        self.index < interner::RESERVED_SYMBOLS_END
    }

    pub fn eq_str(&self, other: &str) -> bool {
        self.as_str() == other
    }

    #[inline]
    pub const fn as_u32(&self) -> u32 {
        self.index
    }

    /// Reconstruct a `Symbol` from a raw index previously obtained from
    /// [`Symbol::as_u32`]. The caller must guarantee the index was in fact
    /// produced by this interner; an arbitrary index looks up as
    /// `"<invalid symbol>"` rather than being unsafe, since the index
    /// space has no memory-unsafety implications here (unlike a raw
    /// pointer), so this does not need an `unsafe` marker.
    pub fn from_u32(index: u32) -> Self {
        Symbol { index }
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({:?}#{})", self.as_str(), self.index)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Snapshot of interner activity, useful for diagnosing pathological
/// programs that intern an unbounded number of unique names.
#[derive(Clone, Copy, Debug, Default)]
pub struct InternerStats {
    pub count: usize,
    pub capacity: usize,
    pub collisions: usize,
    pub hits: usize,
    pub misses: usize,
}

impl InternerStats {
    pub fn load_factor(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            self.count as f64 / self.capacity as f64
        }
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_idempotent() {
        let a = Symbol::intern("foo-bar");
        let b = Symbol::intern("foo-bar");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "foo-bar");
    }

    #[test]
    fn distinct_strings_are_distinct_symbols() {
        let a = Symbol::intern("one-of-a-kind-a");
        let b = Symbol::intern("one-of-a-kind-b");
        assert_ne!(a, b);
    }

    #[test]
    fn known_symbols_round_trip() {
        let lambda = Symbol::known(known::KW_LAMBDA);
        assert_eq!(lambda.as_str(), "lambda");
        assert!(lambda.is_known());
        let interned = Symbol::intern("lambda");
        assert_eq!(lambda, interned);
    }

    #[quickcheck_macros::quickcheck]
    fn intern_roundtrips_any_ascii(name: String) -> bool {
        if name.is_empty() || name.len() > 64 || !name.is_ascii() {
            return true;
        }
        let sym = Symbol::intern(&name);
        sym.as_str() == name
    }
}
