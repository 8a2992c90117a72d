use alchemy_cli::cli::{Cli, Commands};
use alchemy_cli::commands;
use alchemy_io::PluginRegistry;
use clap::Parser;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::FmtSubscriber;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("could not install log subscriber: {err}");
    }

    let registry = PluginRegistry::builtin();
    let result = match &cli.command {
        Commands::Convert(args) => commands::convert(&registry, args),
        Commands::Inspect(args) => commands::inspect(&registry, args).map(|()| true),
        Commands::Plugins => {
            commands::plugins(&registry);
            Ok(true)
        }
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!("{err:#}");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
