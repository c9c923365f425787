//! Evaluation error kinds (spec §4.7/§7).

use thiserror::Error;
use wisp_util::Symbol;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("unbound variable: {0:?}")]
    UnboundVariable(Symbol),
    #[error("cannot reassign const binding: {0:?}")]
    ConstReassignment(Symbol),
    #[error("value is not callable: {0}")]
    NotCallable(&'static str),
    #[error("wrong number of arguments: expected {expected}, got {got}")]
    WrongArity { expected: String, got: usize },
    #[error("type error: expected {expected}, got {got}")]
    TypeError { expected: &'static str, got: &'static str },
    #[error("division by zero")]
    DivisionByZero,
    #[error("special form `{0}` used incorrectly: {1}")]
    MalformedSpecialForm(&'static str, String),
    #[error("unknown special form or application head")]
    NotApplicable,
    #[error(transparent)]
    Gc(#[from] wisp_gc::GcError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// `(exit n)`: the sole abrupt-termination continuation (spec §4.7).
    #[error("exit({0})")]
    Exit(i32),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
