//! Built-in operations (spec §4.6/C8).
//!
//! Grounded on `original_source/src/find_builtin.c`'s gperf `wordlist[]`,
//! which enumerates exactly these 29 names. Dispatch goes through a
//! table built once and keyed by builtin id rather than a long `match`,
//! so adding a builtin is a one-line table entry instead of touching
//! the call site.

use std::sync::OnceLock;

use rustc_hash::FxHashMap;
use wisp_util::symbol::known::*;

use crate::env::Env;
use crate::error::{RuntimeError, RuntimeResult};
use crate::eval::Evaluator;
use crate::value::Value;

type BuiltinFn = fn(&mut Evaluator, &[Value]) -> RuntimeResult<Value>;

fn table() -> &'static FxHashMap<u32, BuiltinFn> {
    static TABLE: OnceLock<FxHashMap<u32, BuiltinFn>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut t: FxHashMap<u32, BuiltinFn> = FxHashMap::default();
        t.insert(BUILTIN_NAME_ADD, add);
        t.insert(BUILTIN_NAME_SUB, sub);
        t.insert(BUILTIN_NAME_MUL, mul);
        t.insert(BUILTIN_NAME_DIV, div);
        t.insert(BUILTIN_NAME_MOD, modulo);
        t.insert(BUILTIN_NAME_NUM_EQ, eq_num);
        t.insert(BUILTIN_NAME_LESS_THAN, lt);
        t.insert(BUILTIN_NAME_LESS_EQ, le);
        t.insert(BUILTIN_NAME_GREATER_THAN, gt);
        t.insert(BUILTIN_NAME_GREATER_EQ, ge);
        t.insert(BUILTIN_NAME_CONS, cons);
        t.insert(BUILTIN_NAME_CAR, car);
        t.insert(BUILTIN_NAME_CDR, cdr);
        t.insert(BUILTIN_NAME_LIST, list);
        t.insert(BUILTIN_NAME_IS_ATOM, atom_p);
        t.insert(BUILTIN_NAME_IS_PAIR, pair_p);
        t.insert(BUILTIN_NAME_IS_LIST, list_p);
        t.insert(BUILTIN_NAME_IS_NULL, null_p);
        t.insert(BUILTIN_NAME_IS_NUMBER, number_p);
        t.insert(BUILTIN_NAME_IS_STRING, string_p);
        t.insert(BUILTIN_NAME_IS_SYMBOL, symbol_p);
        t.insert(BUILTIN_NAME_IS_PROCEDURE, procedure_p);
        t.insert(BUILTIN_NAME_EQ, eq_p);
        t.insert(BUILTIN_NAME_EQUAL, equal_p);
        t.insert(BUILTIN_NAME_DISPLAY, display);
        t.insert(BUILTIN_NAME_NEWLINE, newline);
        t.insert(BUILTIN_NAME_APPLY, apply);
        t.insert(BUILTIN_NAME_EVAL, eval);
        t.insert(BUILTIN_NAME_EXIT, exit);
        t
    })
}

pub fn call(ev: &mut Evaluator, id: u32, args: &[Value]) -> RuntimeResult<Value> {
    let f = *table().get(&id).ok_or(RuntimeError::NotApplicable)?;
    f(ev, args)
}

/// Defines every reserved builtin name in `env` as a `Value::builtin`
/// binding. Plain, non-const bindings: the environment model makes no
/// distinction between a primitive and user code, matching spec §4.6's
/// framing of builtins as ordinary procedures the evaluator happens to
/// know how to apply directly.
///
/// `env` is rooted across the whole loop: it is freshly allocated and
/// not yet reachable from anywhere else, so without this an allocation
/// triggered partway through (the table itself is cheap, but `env_define`
/// may grow the scope's binding chain) could reclaim entries defined
/// earlier in the same loop.
pub fn install(ev: &mut Evaluator, env: Env) {
    let mark = ev.handles_mark();
    ev.push_handle(env);
    for id in BUILTIN_NAME_ADD..=BUILTIN_NAME_EXIT {
        let sym = wisp_util::Symbol::known(id);
        ev.env_define(env, sym, Value::builtin(id), false).expect("fresh environment, no conflicts");
    }
    ev.truncate_handles(mark);
}

fn arity(args: &[Value], expected: usize) -> RuntimeResult<()> {
    if args.len() != expected {
        return Err(RuntimeError::WrongArity { expected: expected.to_string(), got: args.len() });
    }
    Ok(())
}

fn numeric(v: Value) -> RuntimeResult<f64> {
    v.as_numeric().ok_or(RuntimeError::TypeError { expected: "number", got: v.type_name() })
}

/// `true` iff every argument is an exact `Int`, so arithmetic on an
/// all-integer argument list stays exact rather than round-tripping
/// through `f64` (spec's reduced numeric tower still keeps this much).
fn all_ints(args: &[Value]) -> bool {
    args.iter().all(|v| v.as_int().is_some())
}

fn add(_ev: &mut Evaluator, args: &[Value]) -> RuntimeResult<Value> {
    if all_ints(args) {
        let mut acc: i64 = 0;
        for a in args {
            acc = acc.wrapping_add(a.as_int().unwrap());
        }
        return Ok(Value::int(acc));
    }
    let mut acc = 0.0;
    for a in args {
        acc += numeric(*a)?;
    }
    Ok(Value::float(acc))
}

fn sub(_ev: &mut Evaluator, args: &[Value]) -> RuntimeResult<Value> {
    if args.is_empty() {
        return Err(RuntimeError::WrongArity { expected: ">=1".into(), got: 0 });
    }
    if all_ints(args) {
        let mut it = args.iter().map(|v| v.as_int().unwrap());
        let first = it.next().unwrap();
        return Ok(Value::int(if args.len() == 1 {
            -first
        } else {
            it.fold(first, |acc, x| acc.wrapping_sub(x))
        }));
    }
    let mut it = args.iter().map(|v| numeric(*v));
    let first = it.next().unwrap()?;
    if args.len() == 1 {
        return Ok(Value::float(-first));
    }
    let mut acc = first;
    for x in it {
        acc -= x?;
    }
    Ok(Value::float(acc))
}

fn mul(_ev: &mut Evaluator, args: &[Value]) -> RuntimeResult<Value> {
    if all_ints(args) {
        let mut acc: i64 = 1;
        for a in args {
            acc = acc.wrapping_mul(a.as_int().unwrap());
        }
        return Ok(Value::int(acc));
    }
    let mut acc = 1.0;
    for a in args {
        acc *= numeric(*a)?;
    }
    Ok(Value::float(acc))
}

fn div(_ev: &mut Evaluator, args: &[Value]) -> RuntimeResult<Value> {
    // Unlike `+ - *`, division always yields a float: a single argument
    // is its reciprocal, two or more is left-to-right float division.
    if args.is_empty() {
        return Err(RuntimeError::WrongArity { expected: ">=1".into(), got: 0 });
    }
    let mut it = args.iter().map(|v| numeric(*v));
    let first = it.next().unwrap()?;
    if args.len() == 1 {
        if first == 0.0 {
            return Err(RuntimeError::DivisionByZero);
        }
        return Ok(Value::float(1.0 / first));
    }
    let mut acc = first;
    for x in it {
        let x = x?;
        if x == 0.0 {
            return Err(RuntimeError::DivisionByZero);
        }
        acc /= x;
    }
    Ok(Value::float(acc))
}

fn modulo(_ev: &mut Evaluator, args: &[Value]) -> RuntimeResult<Value> {
    arity(args, 2)?;
    let a = args[0].as_int().ok_or(RuntimeError::TypeError { expected: "int", got: args[0].type_name() })?;
    let b = args[1].as_int().ok_or(RuntimeError::TypeError { expected: "int", got: args[1].type_name() })?;
    if b == 0 {
        return Err(RuntimeError::DivisionByZero);
    }
    Ok(Value::int(a.rem_euclid(b)))
}

fn compare(args: &[Value], cmp: impl Fn(f64, f64) -> bool) -> RuntimeResult<Value> {
    if args.len() < 2 {
        return Err(RuntimeError::WrongArity { expected: ">=2".into(), got: args.len() });
    }
    for pair in args.windows(2) {
        let a = numeric(pair[0])?;
        let b = numeric(pair[1])?;
        if !cmp(a, b) {
            return Ok(Value::bool(false));
        }
    }
    Ok(Value::bool(true))
}

fn eq_num(_ev: &mut Evaluator, args: &[Value]) -> RuntimeResult<Value> {
    compare(args, |a, b| a == b)
}
fn lt(_ev: &mut Evaluator, args: &[Value]) -> RuntimeResult<Value> {
    compare(args, |a, b| a < b)
}
fn le(_ev: &mut Evaluator, args: &[Value]) -> RuntimeResult<Value> {
    compare(args, |a, b| a <= b)
}
fn gt(_ev: &mut Evaluator, args: &[Value]) -> RuntimeResult<Value> {
    compare(args, |a, b| a > b)
}
fn ge(_ev: &mut Evaluator, args: &[Value]) -> RuntimeResult<Value> {
    compare(args, |a, b| a >= b)
}

fn cons(ev: &mut Evaluator, args: &[Value]) -> RuntimeResult<Value> {
    arity(args, 2)?;
    ev.make_cons(args[0], args[1])
}

fn car(ev: &mut Evaluator, args: &[Value]) -> RuntimeResult<Value> {
    arity(args, 1)?;
    ev.cons_car(args[0])
}

fn cdr(ev: &mut Evaluator, args: &[Value]) -> RuntimeResult<Value> {
    arity(args, 1)?;
    ev.cons_cdr(args[0])
}

fn list(ev: &mut Evaluator, args: &[Value]) -> RuntimeResult<Value> {
    let mut result = Value::nil();
    for v in args.iter().rev() {
        result = ev.make_cons(*v, result)?;
    }
    Ok(result)
}

fn atom_p(_ev: &mut Evaluator, args: &[Value]) -> RuntimeResult<Value> {
    arity(args, 1)?;
    Ok(Value::bool(args[0].as_cons_ptr().is_none()))
}

fn pair_p(_ev: &mut Evaluator, args: &[Value]) -> RuntimeResult<Value> {
    arity(args, 1)?;
    Ok(Value::bool(args[0].as_cons_ptr().is_some()))
}

fn is_proper_list(ev: &Evaluator, mut v: Value) -> bool {
    loop {
        if v.is_nil() {
            return true;
        }
        match v.as_cons_ptr() {
            Some(_) => v = ev.cons_cdr(v).expect("checked is a cons above"),
            None => return false,
        }
    }
}

fn list_p(ev: &mut Evaluator, args: &[Value]) -> RuntimeResult<Value> {
    arity(args, 1)?;
    Ok(Value::bool(is_proper_list(ev, args[0])))
}

fn null_p(_ev: &mut Evaluator, args: &[Value]) -> RuntimeResult<Value> {
    arity(args, 1)?;
    Ok(Value::bool(args[0].is_nil()))
}

fn number_p(_ev: &mut Evaluator, args: &[Value]) -> RuntimeResult<Value> {
    arity(args, 1)?;
    Ok(Value::bool(args[0].is_number()))
}

fn string_p(_ev: &mut Evaluator, args: &[Value]) -> RuntimeResult<Value> {
    arity(args, 1)?;
    Ok(Value::bool(args[0].as_str_ptr().is_some()))
}

fn symbol_p(_ev: &mut Evaluator, args: &[Value]) -> RuntimeResult<Value> {
    arity(args, 1)?;
    Ok(Value::bool(args[0].as_symbol().is_some()))
}

fn procedure_p(_ev: &mut Evaluator, args: &[Value]) -> RuntimeResult<Value> {
    arity(args, 1)?;
    Ok(Value::bool(args[0].as_closure_ptr().is_some() || args[0].as_builtin().is_some()))
}

/// Identity comparison: two heap objects are `eq?` only if they share
/// an address, matching every scalar tag comparing by raw bits.
fn eq_p(_ev: &mut Evaluator, args: &[Value]) -> RuntimeResult<Value> {
    arity(args, 2)?;
    let a = args[0];
    let b = args[1];
    Ok(Value::bool(a.tag() == b.tag() && a.bits == b.bits && raw_ptr(a) == raw_ptr(b)))
}

fn raw_ptr(v: Value) -> *mut u8 {
    v.as_cons_ptr().or(v.as_str_ptr()).or(v.as_closure_ptr()).unwrap_or(std::ptr::null_mut())
}

fn equal_p(ev: &mut Evaluator, args: &[Value]) -> RuntimeResult<Value> {
    arity(args, 2)?;
    Ok(Value::bool(structurally_equal(ev, args[0], args[1])?))
}

fn structurally_equal(ev: &Evaluator, a: Value, b: Value) -> RuntimeResult<bool> {
    if let (Some(x), Some(y)) = (a.as_numeric(), b.as_numeric()) {
        return Ok(x == y);
    }
    if let (Some(pa), Some(pb)) = (a.as_str_ptr(), b.as_str_ptr()) {
        return Ok(unsafe { crate::value::StrHeader::bytes(pa) } == unsafe { crate::value::StrHeader::bytes(pb) });
    }
    if let (Some(_), Some(_)) = (a.as_cons_ptr(), b.as_cons_ptr()) {
        let car_eq = structurally_equal(ev, ev.cons_car(a)?, ev.cons_car(b)?)?;
        let cdr_eq = structurally_equal(ev, ev.cons_cdr(a)?, ev.cons_cdr(b)?)?;
        return Ok(car_eq && cdr_eq);
    }
    if a.is_nil() && b.is_nil() {
        return Ok(true);
    }
    Ok(a.tag() == b.tag() && a.bits == b.bits && raw_ptr(a) == raw_ptr(b))
}

fn display(ev: &mut Evaluator, args: &[Value]) -> RuntimeResult<Value> {
    arity(args, 1)?;
    let text = render(ev, args[0]);
    ev.write_out(&text)?;
    Ok(Value::nil())
}

fn newline(ev: &mut Evaluator, args: &[Value]) -> RuntimeResult<Value> {
    arity(args, 0)?;
    ev.write_out("\n")?;
    Ok(Value::nil())
}

fn render(ev: &Evaluator, v: Value) -> String {
    if let Some(i) = v.as_int() {
        return i.to_string();
    }
    if let Some(f) = v.as_float() {
        return f.to_string();
    }
    if let Some(b) = v.as_bool() {
        return (if b { "#t" } else { "#f" }).to_string();
    }
    if v.is_nil() {
        return "()".to_string();
    }
    if let Some(ptr) = v.as_str_ptr() {
        let bytes = unsafe { crate::value::StrHeader::bytes(ptr) };
        return String::from_utf8_lossy(bytes).into_owned();
    }
    // A symbol prints as its own name, matching input syntax, the same
    // way an integer prints as its digits.
    if let Some(sym) = v.as_symbol() {
        return sym.as_str().to_string();
    }
    if v.as_builtin().is_some() || v.as_closure_ptr().is_some() {
        return format!("#<{}>", v.type_name());
    }
    if v.as_cons_ptr().is_some() {
        // `(quote x)` as data prints as `'x`, matching input syntax.
        if let Ok(car) = ev.cons_car(v) {
            if car.as_symbol().map(|s| s.as_u32()) == Some(KW_QUOTE) {
                if let Ok(cdr) = ev.cons_cdr(v) {
                    if let Ok(operand) = ev.cons_car(cdr) {
                        if ev.cons_cdr(cdr).map(|c| c.is_nil()).unwrap_or(false) {
                            return format!("'{}", render(ev, operand));
                        }
                    }
                }
            }
        }
        let mut parts = Vec::new();
        let mut cur = v;
        loop {
            match cur.as_cons_ptr() {
                Some(_) => {
                    parts.push(render(ev, ev.cons_car(cur).expect("checked is a cons above")));
                    cur = ev.cons_cdr(cur).expect("checked is a cons above");
                }
                None => break,
            }
        }
        if !cur.is_nil() {
            parts.push(".".to_string());
            parts.push(render(ev, cur));
        }
        return format!("({})", parts.join(" "));
    }
    "#<unknown>".to_string()
}

fn apply(ev: &mut Evaluator, args: &[Value]) -> RuntimeResult<Value> {
    if args.is_empty() {
        return Err(RuntimeError::WrongArity { expected: ">=1".into(), got: 0 });
    }
    let callee = args[0];
    let mut flat = Vec::new();
    flat.extend_from_slice(&args[1..args.len().saturating_sub(1)]);
    if let Some(last) = args.last().copied() {
        if args.len() > 1 {
            let mut cur = last;
            while cur.as_cons_ptr().is_some() {
                flat.push(ev.cons_car(cur)?);
                cur = ev.cons_cdr(cur)?;
            }
        }
    }
    ev.apply(callee, &flat)
}

fn eval(ev: &mut Evaluator, args: &[Value]) -> RuntimeResult<Value> {
    if args.is_empty() || args.len() > 2 {
        return Err(RuntimeError::WrongArity { expected: "1..=2".into(), got: args.len() });
    }
    let env = match args.get(1) {
        None => ev.global_env(),
        Some(v) if v.as_env_ptr().is_some() => *v,
        Some(v) => return Err(RuntimeError::TypeError { expected: "environment", got: v.type_name() }),
    };
    ev.eval_value(args[0], env)
}

fn exit(_ev: &mut Evaluator, args: &[Value]) -> RuntimeResult<Value> {
    let code = match args.first() {
        Some(v) => v.as_int().unwrap_or(0) as i32,
        None => 0,
    };
    log::debug!("exit builtin invoked with code {code}");
    Err(RuntimeError::Exit(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev() -> Evaluator {
        Evaluator::new()
    }

    #[test]
    fn eq_distinguishes_bool_values() {
        let mut e = ev();
        assert_eq!(eq_p(&mut e, &[Value::bool(true), Value::bool(false)]).unwrap().as_bool(), Some(false));
        assert_eq!(eq_p(&mut e, &[Value::bool(true), Value::bool(true)]).unwrap().as_bool(), Some(true));
    }

    #[test]
    fn eq_distinguishes_float_values() {
        let mut e = ev();
        assert_eq!(eq_p(&mut e, &[Value::float(1.0), Value::float(2.0)]).unwrap().as_bool(), Some(false));
        assert_eq!(eq_p(&mut e, &[Value::float(1.0), Value::float(1.0)]).unwrap().as_bool(), Some(true));
    }

    #[test]
    fn equal_compares_cons_structure() {
        let mut e = ev();
        let a = e.make_cons(Value::int(1), Value::int(2)).unwrap();
        let b = e.make_cons(Value::int(1), Value::int(2)).unwrap();
        assert!(structurally_equal(&e, a, b).unwrap());
        let c = e.make_cons(Value::int(1), Value::int(3)).unwrap();
        assert!(!structurally_equal(&e, a, c).unwrap());
    }

    #[test]
    fn arity_checks_argument_count() {
        assert!(arity(&[Value::int(1)], 2).is_err());
        assert!(arity(&[Value::int(1), Value::int(2)], 2).is_ok());
    }

    #[test]
    fn div_by_zero_is_an_error() {
        let mut e = ev();
        assert!(matches!(div(&mut e, &[Value::int(1), Value::int(0)]), Err(RuntimeError::DivisionByZero)));
    }

    #[test]
    fn div_always_yields_a_float_even_for_exact_integer_division() {
        let mut e = ev();
        assert_eq!(div(&mut e, &[Value::int(7), Value::int(2)]).unwrap().as_float(), Some(3.5));
        assert_eq!(div(&mut e, &[Value::int(6), Value::int(3)]).unwrap().as_float(), Some(2.0));
    }

    #[test]
    fn eval_builtin_accepts_an_explicit_environment_argument() {
        let mut e = ev();
        let env = e.global_env();
        let quoted = e.make_cons(Value::symbol(wisp_util::Symbol::known(BUILTIN_NAME_ADD)), {
            let rest = e.make_cons(Value::int(1), Value::nil()).unwrap();
            e.make_cons(Value::int(2), rest).unwrap()
        });
        assert_eq!(eval(&mut e, &[quoted.unwrap(), env]).unwrap().as_int(), Some(3));
    }

    #[test]
    fn eval_builtin_rejects_a_non_environment_second_argument() {
        let mut e = ev();
        assert!(matches!(
            eval(&mut e, &[Value::int(1), Value::int(2)]),
            Err(RuntimeError::TypeError { expected: "environment", .. })
        ));
    }

    #[test]
    fn div_with_a_single_argument_is_its_reciprocal() {
        let mut e = ev();
        assert_eq!(div(&mut e, &[Value::int(5)]).unwrap().as_float(), Some(0.2));
        assert!(matches!(div(&mut e, &[Value::int(0)]), Err(RuntimeError::DivisionByZero)));
    }

    #[test]
    fn install_binds_every_reserved_builtin_name() {
        let mut e = ev();
        let env = e.global_env();
        assert_eq!(e.env_lookup(env, wisp_util::Symbol::known(BUILTIN_NAME_ADD)).unwrap().as_builtin(), Some(BUILTIN_NAME_ADD));
        assert_eq!(e.env_lookup(env, wisp_util::Symbol::known(BUILTIN_NAME_EXIT)).unwrap().as_builtin(), Some(BUILTIN_NAME_EXIT));
    }

    /// A `Write` sink backed by an `Rc<RefCell<..>>` so the test can read
    /// back what `display`/`newline` wrote after the evaluator (which
    /// owns the sink) has finished running.
    struct SharedBuf(std::rc::Rc<std::cell::RefCell<Vec<u8>>>);

    impl std::io::Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn captured_output(src: &str) -> String {
        let arena = wisp_util::Arena::new();
        let mut handler = wisp_util::Handler::new();
        let lexed = wisp_lex::lex(src.as_bytes(), &mut handler);
        let program = wisp_par::parse(&lexed.tokens, src.as_bytes(), &arena).expect("parse ok");
        let buf = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let mut e = Evaluator::with_writer(wisp_gc::GcConfig::default(), Box::new(SharedBuf(buf.clone())));
        e.eval_program(&program).unwrap();
        String::from_utf8(buf.borrow().clone()).unwrap()
    }

    #[test]
    fn display_prints_symbol_by_name_not_as_a_procedure_marker() {
        assert_eq!(captured_output("(display 'yes)"), "yes");
    }

    #[test]
    fn display_prints_quoted_data_with_quote_shorthand() {
        assert_eq!(captured_output("(display ''x)"), "'x");
    }

    #[test]
    fn display_prints_lists_and_newline_writes_a_single_byte() {
        assert_eq!(
            captured_output("(display (car (cons 1 (cons 2 '())))) (newline) (display (cdr (cons 1 (cons 2 '()))))"),
            "1\n(2)"
        );
    }
}
