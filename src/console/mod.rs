//! Serial console for inspecting and writing synchronized items
//!
//! Lazy polling from the main loop - no dedicated task. Items are read and
//! written through their canonical string forms, the same path the
//! settings board uses.

pub mod commands;
#[allow(clippy::module_inception)]
pub mod console;
pub mod error;
pub mod parser;

pub use commands::{command_names, execute, CommandContext, COMMANDS};
pub use console::Console;
pub use error::ConsoleError;
pub use parser::{parse_line, ParsedCommand};
