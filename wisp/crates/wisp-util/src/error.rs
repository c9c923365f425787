//! Error types owned by `wisp-util` itself. Each downstream crate defines
//! its own error enum for the failures specific to its layer (lexing,
//! parsing, GC, evaluation); this module only covers the arena, which is
//! used directly by more than one of those crates.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArenaError {
    #[error("arena allocation of {requested} bytes failed")]
    OutOfMemory { requested: usize },
}

pub type ArenaResult<T> = Result<T, ArenaError>;
