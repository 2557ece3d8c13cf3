//! Core library for the Piquant language runtime: a small Lisp with
//! closures, macros, first-class environments and rendezvous channels.

pub mod diagnostics;
pub mod driver;
pub mod environment;
pub mod lexer;
pub mod logging;
pub mod output;
pub mod parser;
pub mod repl;
pub mod runtime;
pub mod stdlib;
pub mod value;

pub use diagnostics::{EvalError, Location, ParserError, ParserErrorList, PiquantError};
pub use driver::{parse_eval, parse_eval_print, Interpreter, Options};
pub use environment::{EnvRef, Environment};
pub use output::OutputSink;
pub use repl::Repl;
pub use runtime::{Evaluator, RuntimeContext};
pub use value::Node;
