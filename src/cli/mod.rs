pub mod import;
pub mod init;
pub mod orphans;
pub mod preview;
pub mod rules;
pub mod status;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "sift", about = "Bank-statement ingestion and normalization pipeline.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Set up sift: choose a data directory and initialize the database.
    Init {
        /// Path for sift data (default: ~/Documents/sift)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
    },
    /// Ingest one or more statement exports (CSV/XLSX).
    Import {
        /// Paths to statement files
        files: Vec<String>,
        /// Owning user id
        #[arg(long)]
        user: String,
        /// Override the sign convention: negative | positive
        #[arg(long)]
        convention: Option<String>,
        /// Emit the full result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage categorization rules.
    Rules {
        #[command(subcommand)]
        command: RulesCommands,
    },
    /// Preview categories proposed by rules from other institutions.
    Preview {
        /// Owning user id
        #[arg(long)]
        user: String,
        /// Institution the uncategorized transactions came from
        #[arg(long)]
        institution: String,
        /// Commit the previewed categories
        #[arg(long)]
        apply: bool,
    },
    /// Delete source files that own zero transactions.
    Orphans,
    /// Show database location and summary statistics.
    Status,
}

#[derive(Subcommand)]
pub enum RulesCommands {
    /// Add a new rule.
    Add {
        /// Merchant pattern to match
        pattern: String,
        /// Category to assign
        #[arg(long)]
        category: String,
        /// Match type: exact | contains
        #[arg(long, default_value = "contains")]
        match_type: String,
        /// Issuer the rule was learned from
        #[arg(long)]
        institution: Option<String>,
        #[arg(long, default_value_t = 0)]
        priority: i64,
    },
    /// List active rules.
    List,
}
