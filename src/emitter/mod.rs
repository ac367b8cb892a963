//! SQL emitter (verb module)
//!
//! Renders a `Select` tree into dialect SQL text with `?` placeholders.

mod error;
mod sql;

pub use error::EmitError;
pub use sql::emit_sql;
