//! Command-line arguments

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::output::OutputFormat;

/// Crawl one market of the catalog into JSON or CSV datasets
#[derive(Parser, Debug)]
#[command(
    name = "catalog-crawler",
    version,
    about = "Crawl one market of the catalog into JSON or CSV datasets",
    after_help = "EXAMPLES:\n    \
        catalog-crawler --market FMCG\n    \
        catalog-crawler --market FMCG -i Staples 'Dairy & Eggs' --folder-loc /srv/data\n    \
        catalog-crawler --market FMCG -e Beverages --proxy --log-format text\n    \
        catalog-crawler --market FMCG -o csv"
)]
pub struct Cli {
    /// Market to crawl, matched against the catalog's market titles
    #[arg(long, value_name = "NAME")]
    pub market: String,

    /// Config file (falls back to CONFIG_PATH, then catalog-crawler.toml)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Dataset format (overrides the config file)
    #[arg(short = 'o', long = "output", value_enum, value_name = "FORMAT")]
    pub output: Option<OutputFormat>,

    /// Directory datasets are written to
    #[arg(long = "folder-loc", value_name = "DIR")]
    pub folder_loc: Option<PathBuf>,

    /// Route requests through the proxy from the environment
    #[arg(long)]
    pub proxy: bool,

    /// Only crawl these categories
    #[arg(short = 'i', long = "include-categories", num_args = 1.., value_name = "CATEGORY")]
    pub include_categories: Option<Vec<String>>,

    /// Skip these categories
    #[arg(short = 'e', long = "exclude-categories", num_args = 1.., value_name = "CATEGORY")]
    pub exclude_categories: Option<Vec<String>>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Json,
    Text,
}
