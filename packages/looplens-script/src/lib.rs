//! Script front end for looplens.
//!
//! Scripts are a small JavaScript-flavoured subset. Everything is evaluated by
//! a tree-walking [`Interpreter`]; the four scheduling primitives
//! (`console.log`, `setTimeout`, `queueMicrotask`, `Promise.prototype.then`)
//! are routed to a [`Host`] supplied by the caller.

pub mod ast;
pub mod error;
pub mod host;
pub mod interp;
pub mod lexer;
pub mod parse;
pub mod value;

pub use ast::Program;
pub use error::ScriptError;
pub use host::{Callback, Host};
pub use interp::{Interpreter, Limits};
pub use parse::{MAX_NESTING, parse, parse_with_limit};
pub use value::Value;
