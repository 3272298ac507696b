use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "pdl",
    about = "Inspect ledgers of blocks and their private data",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Ledger storage root (overrides the config file)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// TOML storage configuration
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// List ledgers
    Ledgers,
    /// Open a ledger (running recovery) and show its heights
    Info(InfoArgs),
    /// Show a block with its private data
    Show(ShowArgs),
}

#[derive(Args)]
pub struct InfoArgs {
    pub ledger: String,
}

#[derive(Args)]
pub struct ShowArgs {
    pub ledger: String,
    pub block: u64,
    /// Only show this collection, as `namespace/collection`; repeatable
    #[arg(long = "filter", value_parser = parse_ns_coll)]
    pub filters: Vec<(String, String)>,
}

fn parse_ns_coll(s: &str) -> Result<(String, String), String> {
    match s.split_once('/') {
        Some((ns, coll)) if !ns.is_empty() && !coll.is_empty() => {
            Ok((ns.to_string(), coll.to_string()))
        }
        _ => Err(format!("expected `namespace/collection`, got `{s}`")),
    }
}
