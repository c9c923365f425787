//! Driver-level error taxonomy and its mapping to the §6 exit codes.
//!
//! Grounded on the teacher's `faxc-drv::CompileError`: one enum that
//! aggregates every lower-layer error type the pipeline can produce,
//! with a manual mapping to a process exit code instead of an opaque
//! `anyhow::Error` bubbling all the way to `main`.

use std::path::PathBuf;

use thiserror::Error;
use wisp_par::ParseError;
use wisp_rt::RuntimeError;

use crate::{EXIT_EVAL_ERROR, EXIT_IO_ERROR, EXIT_LEX_ERROR, EXIT_OUT_OF_MEMORY, EXIT_PARSE_ERROR};

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("could not read {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),
    #[error("lexing failed")]
    Lex,
    #[error("{0}")]
    Parse(ParseError),
    #[error("{0}")]
    Eval(RuntimeError),
    #[error("out of memory")]
    OutOfMemory,
    /// Not a failure: `(exit n)` requests this exact process exit code.
    #[error("exit({0})")]
    Exit(i32),
}

impl DriverError {
    pub fn exit_code(&self) -> i32 {
        match self {
            DriverError::Io(..) => EXIT_IO_ERROR,
            DriverError::Lex => EXIT_LEX_ERROR,
            DriverError::Parse(_) => EXIT_PARSE_ERROR,
            DriverError::Eval(_) => EXIT_EVAL_ERROR,
            DriverError::OutOfMemory => EXIT_OUT_OF_MEMORY,
            DriverError::Exit(code) => *code,
        }
    }

    /// `ParseErrorKind::OutOfMemory` (arena exhaustion) is an OOM failure
    /// per spec's exit code table, not a parse-syntax failure, even
    /// though it surfaces through `wisp_par::parse`.
    pub(crate) fn from_parse(err: ParseError) -> Self {
        match err.kind {
            wisp_par::ParseErrorKind::OutOfMemory => DriverError::OutOfMemory,
            _ => DriverError::Parse(err),
        }
    }

    /// `RuntimeError::Exit` and a GC out-of-memory failure each have
    /// their own exit code distinct from a generic eval failure.
    pub(crate) fn from_runtime(err: RuntimeError) -> Self {
        match err {
            RuntimeError::Exit(code) => DriverError::Exit(code),
            RuntimeError::Gc(wisp_gc::GcError::OutOfMemory { .. }) => DriverError::OutOfMemory,
            other => DriverError::Eval(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_match_spec_table() {
        assert_eq!(DriverError::Io(PathBuf::from("x"), std::io::Error::other("boom")).exit_code(), 5);
        assert_eq!(DriverError::Lex.exit_code(), 1);
        assert_eq!(DriverError::Parse(ParseError::new(wisp_par::ParseErrorKind::UnbalancedList, None)).exit_code(), 2);
        assert_eq!(DriverError::Eval(RuntimeError::DivisionByZero).exit_code(), 3);
        assert_eq!(DriverError::OutOfMemory.exit_code(), 4);
        assert_eq!(DriverError::Exit(7).exit_code(), 7);
    }

    #[test]
    fn runtime_exit_and_oom_map_to_their_own_codes_not_generic_eval() {
        assert_eq!(DriverError::from_runtime(RuntimeError::Exit(42)).exit_code(), 42);
        assert_eq!(
            DriverError::from_runtime(RuntimeError::Gc(wisp_gc::GcError::OutOfMemory { requested: 8 })).exit_code(),
            4
        );
        assert_eq!(DriverError::from_runtime(RuntimeError::DivisionByZero).exit_code(), 3);
    }

    #[test]
    fn parse_arena_exhaustion_maps_to_oom_not_parse_error() {
        let err = ParseError::new(wisp_par::ParseErrorKind::OutOfMemory, None);
        assert_eq!(DriverError::from_parse(err).exit_code(), 4);
    }
}
