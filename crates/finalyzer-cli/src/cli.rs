use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "finalyzer")]
#[command(about = "Upload financial documents and follow their analysis")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// CLI profile name
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,

    /// API base URL for this invocation (overrides profile and FINALYZER_API_URL)
    #[arg(long, global = true, value_name = "URL")]
    pub api_url: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Register, sign in or sign out
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
    /// List uploaded documents
    #[command(alias = "ls")]
    Documents {
        /// Page number, starting at 1
        #[arg(short, long, default_value = "1")]
        page: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
        /// Browse pages interactively (n/p/<number>/r/q)
        #[arg(short, long, conflicts_with = "json")]
        interactive: bool,
    },
    /// Upload a PDF for analysis
    Upload {
        /// Path to the PDF file
        path: PathBuf,
        /// Analysis query sent with the document
        #[arg(short, long)]
        query: Option<String>,
        /// Follow the analysis after the upload completes
        #[arg(short, long)]
        watch: bool,
    },
    /// Follow the analysis of a document
    Analysis {
        /// Document ID returned by `upload`, or an `/analysis/<ID>` path
        document_id: String,
        /// Fetch once and exit instead of polling
        #[arg(long)]
        once: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Configure CLI profiles
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Check that the API is reachable
    Health,
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Create an account
    Register {
        #[arg(long, value_name = "EMAIL")]
        email: String,
        #[arg(long, value_name = "PASSWORD")]
        password: String,
        /// Account role (defaults to `user`)
        #[arg(long, value_name = "ROLE")]
        role: Option<String>,
    },
    /// Sign in and store the access token in the keychain
    Login {
        #[arg(long, value_name = "EMAIL")]
        email: String,
        #[arg(long, value_name = "PASSWORD")]
        password: String,
    },
    /// Show whether the profile is signed in
    Status,
    /// Sign out and remove the stored access token
    Logout,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize or update profile config
    Init {
        /// API base URL
        #[arg(long, value_name = "URL")]
        api_base_url: Option<String>,
        /// Seconds between analysis polls
        #[arg(long, value_name = "SECS")]
        poll_interval: Option<u64>,
        /// Documents per page
        #[arg(long, value_name = "N")]
        page_size: Option<usize>,
        /// Seconds between dashboard refreshes (0 disables)
        #[arg(long, value_name = "SECS")]
        refresh_interval: Option<u64>,
        /// Default analysis query for uploads
        #[arg(long, value_name = "TEXT")]
        upload_query: Option<String>,
        /// Keep current active profile instead of activating this one
        #[arg(long)]
        no_activate: bool,
    },
    /// Show the effective configuration
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
