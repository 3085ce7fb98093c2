//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - server: run the reservation server on a well-known FIFO
//! - client: run a job script against a server

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ems - Concurrent event seat reservation over named pipes
#[derive(Parser, Debug)]
#[command(name = "ems")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the reservation server
    Server {
        /// Path of the server FIFO to create
        endpoint: PathBuf,

        /// Simulated store access delay in microseconds
        delay_us: Option<u64>,

        /// Number of worker threads (overrides config)
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Run a job script against a server
    Client {
        /// FIFO for requests (created by the client)
        request: PathBuf,

        /// FIFO for responses (created by the client)
        response: PathBuf,

        /// The server's FIFO
        server: PathBuf,

        /// Job script; output goes next to it with a `.out` extension
        script: PathBuf,
    },
}
