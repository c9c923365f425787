//! String interner backing [`super::Symbol`].
//!
//! Interning is the only piece of ambient machinery here that genuinely
//! benefits from the teacher's concurrent design: `display`/`eval`
//! built-ins and the lexer never run on more than one thread at a time in
//! this interpreter, but keeping the interner itself thread-safe costs
//! nothing and means a future embedder can intern from multiple threads
//! without revisiting this module.

use ahash::AHasher;
use dashmap::DashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::LazyLock;

use super::{InternerStats, Symbol};

pub static STRING_TABLE: LazyLock<StringTable> = LazyLock::new(|| {
    let table = StringTable::new();
    table.initialize_known_symbols();
    table
});

/// Boundary between pre-interned reserved symbols (special forms, builtin
/// names) and symbols interned at runtime from user source.
pub const RESERVED_SYMBOLS_END: u32 = 64;

pub struct StringTable {
    map: DashMap<u64, (&'static str, u32)>,
    next_index: AtomicU32,
    collisions: AtomicUsize,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl StringTable {
    #[inline]
    fn new() -> Self {
        Self {
            map: DashMap::with_capacity(128),
            next_index: AtomicU32::new(RESERVED_SYMBOLS_END),
            collisions: AtomicUsize::new(0),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    /// Pre-interns every special-form keyword and builtin name so they get
    /// stable, predictable indices reachable without touching the map at
    /// evaluation time. Order here must match [`super::known`].
    fn initialize_known_symbols(&self) {
        for (idx, name) in super::known::ALL.iter().enumerate() {
            let actual_idx = idx as u32;
            if actual_idx < RESERVED_SYMBOLS_END {
                let interned: &'static str = Box::leak(name.to_string().into_boxed_str());
                let hash = Self::hash_string(name);
                self.map.insert(hash, (interned, actual_idx));
            }
        }
    }

    pub fn intern(&self, string: &str) -> Symbol {
        let hash = Self::hash_string(string);

        if let Some(entry) = self.map.get(&hash) {
            if entry.value().0 == string {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Symbol { index: entry.value().1 };
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);

        match self.map.entry(hash) {
            dashmap::mapref::entry::Entry::Occupied(entry) => {
                if entry.get().0 == string {
                    Symbol { index: entry.get().1 }
                } else {
                    self.handle_collision(string, hash)
                }
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let interned: &'static str = Box::leak(string.to_string().into_boxed_str());
                let idx = self.next_index.fetch_add(1, Ordering::Relaxed);
                entry.insert((interned, idx));
                Symbol { index: idx }
            }
        }
    }

    fn handle_collision(&self, string: &str, original_hash: u64) -> Symbol {
        const MAX_PROBES: u64 = 32;
        const PROBE_PRIME: u64 = 0x9e3779b97f4a7c15;

        for i in 1u64..=MAX_PROBES {
            let probe_hash = original_hash.wrapping_add(i.wrapping_mul(PROBE_PRIME));

            if let Some(entry) = self.map.get(&probe_hash) {
                if entry.value().0 == string {
                    return Symbol { index: entry.value().1 };
                }
            } else {
                self.collisions.fetch_add(1, Ordering::Relaxed);
                let interned: &'static str = Box::leak(string.to_string().into_boxed_str());
                let idx = self.next_index.fetch_add(1, Ordering::Relaxed);
                self.map.insert(probe_hash, (interned, idx));
                return Symbol { index: idx };
            }
        }

        self.collisions.fetch_add(1, Ordering::Relaxed);
        let interned: &'static str = Box::leak(string.to_string().into_boxed_str());
        let idx = self.next_index.fetch_add(1, Ordering::Relaxed);
        self.map.insert(original_hash, (interned, idx));
        Symbol { index: idx }
    }

    /// Linear scan by index. Rare: the evaluator holds `Symbol`s, not
    /// strings, and only goes back to text for error messages and
    /// `display`.
    pub fn get(&self, symbol: Symbol) -> Option<&'static str> {
        self.map.iter().find(|entry| entry.value().1 == symbol.index).map(|entry| entry.value().0)
    }

    #[inline]
    fn hash_string(string: &str) -> u64 {
        let mut hasher = AHasher::default();
        string.hash(&mut hasher);
        hasher.finish()
    }

    pub fn stats(&self) -> InternerStats {
        InternerStats {
            count: self.map.len(),
            capacity: self.map.capacity(),
            collisions: self.collisions.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    #[cfg(test)]
    pub(crate) fn reset_stats(&self) {
        self.collisions.store(0, Ordering::Relaxed);
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_same_string_is_idempotent() {
        let s1 = STRING_TABLE.intern("hello");
        let s2 = STRING_TABLE.intern("hello");
        assert_eq!(s1, s2);
    }

    #[test]
    fn intern_different_strings_differ() {
        let s1 = STRING_TABLE.intern("hello");
        let s2 = STRING_TABLE.intern("world");
        assert_ne!(s1, s2);
    }

    #[test]
    fn get_roundtrips() {
        let symbol = STRING_TABLE.intern("some-symbol-name");
        assert_eq!(STRING_TABLE.get(symbol), Some("some-symbol-name"));
    }

    #[test]
    fn known_symbols_are_stable() {
        let a = STRING_TABLE.intern("lambda");
        let b = STRING_TABLE.intern("lambda");
        assert_eq!(a, b);
        assert!(a.index < RESERVED_SYMBOLS_END);
    }

    #[test]
    fn concurrent_intern_of_distinct_strings_is_unique() {
        use std::thread;
        let handles: Vec<_> = (0..20)
            .map(|i| thread::spawn(move || STRING_TABLE.intern(&format!("concurrent-{i}"))))
            .collect();
        let symbols: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for i in 0..symbols.len() {
            for j in (i + 1)..symbols.len() {
                assert_ne!(symbols[i], symbols[j]);
            }
        }
    }

    #[test]
    fn stats_track_hits_and_misses() {
        STRING_TABLE.reset_stats();
        let _ = STRING_TABLE.intern("fresh-stat-probe");
        let stats = STRING_TABLE.stats();
        assert!(stats.misses >= 1);
        let _ = STRING_TABLE.intern("fresh-stat-probe");
        let stats = STRING_TABLE.stats();
        assert!(stats.hits >= 1);
    }
}
