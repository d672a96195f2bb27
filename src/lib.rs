//! A minimal interactive shell.
//!
//! Each line read from a [`line::LineSource`] has its comment and surrounding
//! spaces removed, is expanded into words by an [`expand::WordExpander`] and
//! is dispatched either to a builtin from the [`command::CommandTable`] or to
//! an external program started and reaped by [`external::run_cmd`].
//!
//! The main entry point is [`Interpreter`]. Session state lives in an
//! explicit [`env::Environment`] that builtins receive with every call, so
//! each of them can be exercised on its own.

pub mod builtin;
pub mod command;
pub mod env;
pub mod expand;
pub mod external;
mod glob;
pub mod interpreter;
pub mod io_adapters;
pub mod line;
pub mod logging;
pub mod signal;
pub mod text;

/// Just a convenient re-export of the interactive command runner.
///
/// See [`Interpreter`] for the high-level API and examples.
pub use interpreter::Interpreter;
