//! CLI module for ems - command-line interface and subcommands.
//!
//! Provides the main entry point with `server` and `client` subcommands.

pub mod commands;

pub use commands::Cli;
