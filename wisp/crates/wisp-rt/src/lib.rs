//! Tree-walking evaluator and runtime value model (spec §4.4/§4.6/§4.7/C4/C7/C8).

pub mod builtin;
pub mod env;
pub mod error;
pub mod eval;
pub mod value;

pub use env::Env;
pub use error::{RuntimeError, RuntimeResult};
pub use eval::Evaluator;
pub use value::{ClosurePayload, ConsPayload, HeapKind, StrHeader, Value, ValueTag};
