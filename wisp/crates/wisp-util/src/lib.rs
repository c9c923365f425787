//! Shared substrate for the Wisp interpreter: the arena allocator, symbol
//! interning, source spans, and diagnostics. Every other crate in this
//! workspace depends on this one; it depends on nothing else in the
//! workspace.

pub mod arena;
pub mod diagnostic;
pub mod error;
pub mod span;
pub mod symbol;

pub use arena::Arena;
pub use diagnostic::{Diagnostic, Handler, Level};
pub use error::{ArenaError, ArenaResult};
pub use span::Span;
pub use symbol::Symbol;
