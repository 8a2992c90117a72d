use clap::{Args, Parser, Subcommand, ValueHint};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "alchemy",
    author,
    version,
    about = "Convert distribution network topologies between formats",
    long_about = None
)]
pub struct Cli {
    /// Set the logging level
    #[arg(long, default_value = "info", global = true)]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Import a topology, export it, and run notifiers on every artifact
    Convert(ConvertArgs),
    /// Import a topology and print per-network connectivity statistics
    Inspect(InspectArgs),
    /// List registered plugins and their parameters
    Plugins,
}

/// Plugin parameters shared by the commands that import.
#[derive(Args, Debug)]
pub struct ParamArgs {
    /// TOML file whose [params] table provides defaults for plugin parameters
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Plugin parameters as `--key value` pairs; must come after all other options
    #[arg(
        value_name = "--KEY VALUE",
        trailing_var_arg = true,
        allow_hyphen_values = true,
        num_args = 0..
    )]
    pub params: Vec<String>,
}

#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// Importer name (see `alchemy plugins`)
    #[arg(long)]
    pub input_format: String,

    /// Exporter name (see `alchemy plugins`)
    #[arg(long)]
    pub output_format: String,

    /// Notifier name; repeat or separate with commas to chain several
    #[arg(long = "notifier", value_delimiter = ',')]
    pub notifiers: Vec<String>,

    #[command(flatten)]
    pub params: ParamArgs,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Importer name (see `alchemy plugins`)
    #[arg(long)]
    pub input_format: String,

    /// Write one Graphviz file per network into this directory
    #[arg(long, value_hint = ValueHint::DirPath)]
    pub dot: Option<PathBuf>,

    #[command(flatten)]
    pub params: ParamArgs,
}
