use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "deskpilot", version, about = "Model-agnostic computer-use agent runtime")]
pub struct Cli {
    /// Verbose logging (repeat for more)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP proxy: one agent turn per POST /responses
    Serve {
        /// Listen address
        #[arg(long, default_value = "127.0.0.1:8000")]
        addr: SocketAddr,
        /// Require this key in the X-API-Key header
        #[arg(long, env = "DESKPILOT_API_KEY")]
        api_key: Option<String>,
    },
    /// List registered agent loops and their dispatch patterns
    Loops,
    /// Ground a single element instruction against a PNG screenshot
    Predict {
        /// Model identifier (must support click prediction)
        #[arg(long)]
        model: String,
        /// Element instruction, e.g. "the blue Save button"
        #[arg(long)]
        instruction: String,
        /// Path to a PNG screenshot
        #[arg(long)]
        image: PathBuf,
    },
}
