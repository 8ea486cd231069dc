//! imdefects CLI entry point.

use clap::Parser;
use imdefects::cli::{self, Cli, Commands, EXIT_ERROR};

fn main() {
    let cli = Cli::parse();
    cli::init_logging(cli.verbose, cli.quiet);

    let result = match &cli.command {
        Commands::VacAntisite(args) => cli::run_vac_antisite(args),
        Commands::Solute(args) => cli::run_solute(args),
        Commands::Inspect(args) => cli::run_inspect(args),
    };

    let exit_code = match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            EXIT_ERROR
        }
    };

    std::process::exit(exit_code);
}
