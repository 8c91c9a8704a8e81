//! fbridge Protocol - Wire grammar for the file channel
//!
//! This crate provides the two text formats that cross the shared
//! directory: the command batch written by the bridge, and the
//! line-oriented result records written back by the interpreter.

pub mod command;
pub mod parse;

pub use command::{encode_batch, module_offset_address, Command, STOP_SENTINEL};
pub use parse::{parse_line, parse_results, parse_results_with};
