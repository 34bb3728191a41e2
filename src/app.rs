//! Command dispatch: wire the parsed CLI to the pipeline.

pub mod pipeline;

use clap::{CommandFactory, Parser};

use crate::cli::{Cli, Command, RunArgs};
use crate::domain::RunConfig;
use crate::error::AppError;
use crate::report;

/// Parse the command line and run the selected command.
pub fn run() -> Result<(), AppError> {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::RunAll(args)) => handle_run_all(&args),
        None => {
            let mut cmd = Cli::command();
            cmd.print_help()
                .map_err(|e| AppError::new(1, format!("Failed to print help: {e}")))?;
            println!();
            Err(AppError::new(1, "No command given; see usage above."))
        }
    }
}

fn handle_run_all(args: &RunArgs) -> Result<(), AppError> {
    let config = run_config_from_args(args);
    let output = pipeline::run_all(&config)?;
    println!("{}", report::format_run_summary(&output, &config));
    Ok(())
}

fn run_config_from_args(args: &RunArgs) -> RunConfig {
    RunConfig {
        no_network: args.no_network,
        force_refresh: args.force_refresh,
        cache_dir: args.cache_dir.clone(),
        output_dir: args.output_dir.clone(),
        figures_dir: args.figures_dir.clone(),
        results_dir: args.results_dir.clone(),
        maxlags: args.maxlags,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_config_carries_every_cli_flag() {
        let args = RunArgs {
            no_network: true,
            force_refresh: true,
            cache_dir: "a".into(),
            output_dir: "b".into(),
            figures_dir: "c".into(),
            results_dir: "d".into(),
            maxlags: 8,
        };
        let config = run_config_from_args(&args);
        assert!(config.no_network);
        assert!(config.force_refresh);
        assert_eq!(config.cache_dir, std::path::PathBuf::from("a"));
        assert_eq!(config.output_dir, std::path::PathBuf::from("b"));
        assert_eq!(config.figures_dir, std::path::PathBuf::from("c"));
        assert_eq!(config.results_dir, std::path::PathBuf::from("d"));
        assert_eq!(config.maxlags, 8);
    }

    #[test]
    fn cli_parses_run_all_defaults() {
        use clap::Parser;
        let cli = Cli::parse_from(["fshares", "run-all"]);
        match cli.command {
            Some(Command::RunAll(args)) => {
                assert!(!args.no_network);
                assert!(!args.force_refresh);
                assert_eq!(args.cache_dir, std::path::PathBuf::from("data/raw"));
                assert_eq!(args.maxlags, 4);
            }
            _ => panic!("expected run-all"),
        }
    }
}
