//! CLI module for Hark.

pub mod commands;
mod output;

pub use output::Output;

use clap::{Parser, Subcommand};

/// Hark - Media Ingestion and Retrieval
///
/// Submit audio/video sources for transcription and chunking, track their
/// progress, and ask questions against completed sessions.
#[derive(Parser, Debug)]
#[command(name = "hark")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize Hark: directories, database, seed subject/user, config file
    Init,

    /// Submit a media source for transcription and chunking
    Submit {
        /// URL of the media source
        url: String,

        /// Subject to file the session under
        #[arg(short, long, default_value = "1")]
        subject: i64,

        /// User submitting the session
        #[arg(short, long, default_value = "1")]
        user: i64,

        /// Wait for processing to reach a terminal state
        #[arg(short, long)]
        wait: bool,
    },

    /// Show the status of a session
    Status {
        /// Session ID
        id: i64,
    },

    /// Ask a question against a completed session
    Ask {
        /// Session ID
        id: i64,

        /// The question to ask
        question: String,
    },

    /// List all sessions
    List,

    /// Start the HTTP API server
    Serve {
        /// Host to bind to (defaults to the configured server.host)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to (defaults to the configured server.port)
        #[arg(short, long)]
        port: Option<u16>,
    },
}
