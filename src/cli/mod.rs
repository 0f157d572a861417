//! CLI module for loanr - command-line interface and subcommands.
//!
//! Each subcommand builds a request object for the lifecycle engine or the
//! party registry.

pub mod commands;

pub use commands::Cli;
