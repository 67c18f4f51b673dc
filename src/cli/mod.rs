//! CLI command definitions and parsing
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "flowscope",
    version,
    about = "Ask natural-language security questions about network flows",
    long_about = "Flowscope classifies a security question, routes it to the network-flow graph, \
                  the vector index of flow and log text, or both, races the candidate strategies \
                  and assembles a single answer with optional source excerpts."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/flowscope/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Analysis-type hint accepted on the command line
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TypeArg {
    #[default]
    Auto,
    Graph,
    Semantic,
    Hybrid,
    Conversational,
}

impl From<TypeArg> for crate::analyzer::AnalysisType {
    fn from(arg: TypeArg) -> Self {
        match arg {
            TypeArg::Auto => Self::Auto,
            TypeArg::Graph => Self::Graph,
            TypeArg::Semantic => Self::Semantic,
            TypeArg::Hybrid => Self::Hybrid,
            TypeArg::Conversational => Self::Conversational,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Answer a security question
    Ask {
        /// Question to ask
        question: String,

        /// Analysis type hint (auto lets the classifier decide)
        #[arg(short = 't', long = "type", value_enum, default_value_t = TypeArg::Auto)]
        analysis_type: TypeArg,

        /// Include source excerpts in the response
        #[arg(short, long)]
        sources: bool,

        /// Maximum number of results to retrieve
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// User identifier for cache scoping
        #[arg(short, long, default_value = "cli")]
        user: String,

        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the label the classifier assigns to a question
    Classify {
        /// Question to classify
        question: String,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Print the configuration file path
    Path,
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
