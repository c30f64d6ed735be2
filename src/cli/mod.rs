//! CLI command handlers

pub mod commands;

pub use commands::{fields, formula, get, info, remove, validate};
