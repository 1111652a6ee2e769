use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Directory holding config.yaml, the FAQ corpus and embedding stores
    #[clap(long, global = true, env = "FAQD_CONFIG_DIR", default_value = "config")]
    pub config_dir: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the HTTP search service.
    Serve {
        /// Override listen address from config.yaml
        #[clap(short, long)]
        listen: Option<String>,
    },

    /// Answer a single question and print the result as JSON
    Search {
        question: String,

        /// Number of answers to return
        #[clap(short = 'n', long, default_value = "5")]
        count: usize,
    },

    /// Print the active FAQ corpus as JSON
    Config,
}
