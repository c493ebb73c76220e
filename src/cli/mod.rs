//! CLI module for FinTrack
//!
//! Provides command-line interface parsing and handling for the
//! fintrack-server binary. Uses clap for argument parsing and owo-colors for
//! colored terminal output.

pub mod output;

use clap::{Parser, Subcommand};

/// FinTrack - Personal Finance Backend
///
/// A personal finance backend with hardened account authentication: email
/// verification with one-time codes, brute-force lockout, rotating refresh
/// tokens, and password recovery.
#[derive(Parser, Debug)]
#[command(
    name = "fintrack-server",
    version,
    about = "FinTrack - Personal Finance Backend",
    long_about = "A personal finance backend with hardened account authentication:\n\
                  email verification with one-time codes, brute-force login lockout,\n\
                  rotating refresh tokens, and password recovery.\n\n\
                  Run 'serve' (or no subcommand) to start the server. Configuration\n\
                  comes from environment variables, loaded from .env when present.",
    after_help = "EXAMPLES:\n    \
                  fintrack-server                    # Start the server\n    \
                  fintrack-server serve --port 8080  # Override the listen port\n    \
                  fintrack-server generate-secret    # Mint a JWT_SECRET value\n    \
                  fintrack-server openapi            # Print the OpenAPI document"
)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP server (the default when no subcommand is given)
    Serve {
        /// Host address to bind, overriding HOST
        #[arg(long)]
        host: Option<String>,

        /// Port to bind, overriding PORT
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print the OpenAPI document as JSON and exit
    Openapi,

    /// Generate a random value suitable for JWT_SECRET
    GenerateSecret,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
