use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "patchbay")]
#[command(about = "Audio signal routing simulator with verified plugins")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build a routing graph and run it for a number of blocks
    Run {
        /// Routing file (YAML)
        #[arg(short, long)]
        config: PathBuf,
        /// Number of blocks to process
        #[arg(short, long, default_value_t = 10)]
        blocks: u64,
        /// Node ids to report (all nodes when omitted)
        #[arg(short, long)]
        track: Vec<String>,
    },
    /// Print the SHA-256 digest of a plugin directory
    Hash {
        /// Plugin directory
        dir: PathBuf,
    },
    /// Check a plugin manifest against its directory without loading any code
    Verify {
        /// Manifest file (YAML or TOML)
        manifest: PathBuf,
        /// Plugin root directory (defaults to $PATCHBAY_PLUGIN_ROOT or ./plugins)
        #[arg(long)]
        plugin_root: Option<PathBuf>,
    },
    /// List built-in node kinds and their parameters
    Kinds,
}
