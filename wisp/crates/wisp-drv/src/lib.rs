//! The `wisp` CLI driver (spec §6): reads one source file, lexes,
//! parses, and evaluates it, mapping whatever failed to the process
//! exit code spec's table assigns it.
//!
//! Grounded on the teacher's `faxc-drv`: a thin `main.rs` delegates to a
//! library `run` so the pipeline is testable in-process (this crate's
//! own `#[cfg(test)]` coverage) as well as out-of-process (`tests/`,
//! via `assert_cmd`, matching `faxc-drv`'s own integration test split).
//! Unlike the teacher's multi-file, multi-phase `Session`, there is no
//! incremental cache, source map across files, or codegen stage to
//! carry: one file in, one evaluation, one exit code out.

pub mod error;

use std::path::Path;

pub use error::DriverError;
use wisp_rt::Evaluator;

pub const EXIT_OK: i32 = 0;
pub const EXIT_LEX_ERROR: i32 = 1;
pub const EXIT_PARSE_ERROR: i32 = 2;
pub const EXIT_EVAL_ERROR: i32 = 3;
pub const EXIT_OUT_OF_MEMORY: i32 = 4;
pub const EXIT_IO_ERROR: i32 = 5;

/// `read_file(path) -> (bytes, length) | error` (spec §6). The returned
/// buffer is handed to the lexer and parser, whose tokens and expression
/// nodes are spans/pointers into it, so callers must keep it alive for
/// as long as those are in use; `run` below keeps it alive for the
/// whole pipeline by never dropping it until evaluation is done.
pub fn read_file(path: &Path) -> Result<Vec<u8>, DriverError> {
    std::fs::read(path).map_err(|e| DriverError::Io(path.to_path_buf(), e))
}

/// Runs one source file to completion and returns the process exit
/// code. `(exit n)` anywhere in the program overrides the normal
/// success/failure mapping with `n` directly.
pub fn run(path: &Path) -> i32 {
    match run_inner(path) {
        Ok(()) => EXIT_OK,
        Err(DriverError::Exit(code)) => code,
        Err(err) => {
            log::error!("{err}");
            eprintln!("wisp: {err}");
            err.exit_code()
        }
    }
}

fn run_inner(path: &Path) -> Result<(), DriverError> {
    let source = read_file(path)?;

    let mut handler = wisp_util::Handler::new();
    let lexed = wisp_lex::lex(&source, &mut handler);
    if handler.has_errors() {
        for d in handler.diagnostics() {
            log::error!("{}", d.render(&source));
        }
        return Err(DriverError::Lex);
    }

    // The arena outlives this function: `program` borrows from it, and
    // the evaluator copies anything it needs onto the GC heap as it
    // walks the tree, never holding an arena pointer past this call.
    let arena = wisp_util::Arena::new();
    let program = wisp_par::parse(&lexed.tokens, &source, &arena).map_err(DriverError::from_parse)?;

    let mut ev = Evaluator::new();
    ev.eval_program(&program).map_err(DriverError::from_runtime)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn run_src(src: &str) -> i32 {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(src.as_bytes()).unwrap();
        run(file.path())
    }

    #[test]
    fn successful_program_exits_zero() {
        assert_eq!(run_src("(display (+ 1 2 3))"), EXIT_OK);
    }

    #[test]
    fn missing_file_exits_with_io_error_code() {
        assert_eq!(run(Path::new("/nonexistent/path/does-not-exist.wisp")), EXIT_IO_ERROR);
    }

    #[test]
    fn lex_error_exits_with_lex_error_code() {
        assert_eq!(run_src("\"unterminated"), EXIT_LEX_ERROR);
    }

    #[test]
    fn parse_error_exits_with_parse_error_code() {
        assert_eq!(run_src("(+ 1 2"), EXIT_PARSE_ERROR);
    }

    #[test]
    fn eval_error_exits_with_eval_error_code() {
        assert_eq!(run_src("(+ 1 undefined-name)"), EXIT_EVAL_ERROR);
    }

    #[test]
    fn exit_builtin_passes_its_code_verbatim() {
        assert_eq!(run_src("(exit 42)"), 42);
    }
}
