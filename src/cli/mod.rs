//! CLI module for newsquery
//!
//! Handles command-line argument parsing.

pub mod args;

pub use args::{Args, Commands, LogFormat, SearchArgs, Verbosity};
