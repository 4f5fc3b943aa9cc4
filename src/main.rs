//! taskdeps - typed task dependencies from the command line

use std::process::ExitCode;

use clap::Parser;
use taskdeps::cli::{self, Cli, Output};
use taskdeps::storage::{Config, GlobalConfig};
use taskdeps::{logging, DependencyError};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let global = Config::load_global().unwrap_or_else(|e| {
        eprintln!("Warning: ignoring global config: {:#}", e);
        GlobalConfig::default()
    });

    let output = Output::new(cli.format.unwrap_or_else(|| global.default_format.into()));

    if let Err(e) = logging::init_logging(cli.log_level, cli.verbose, global.log_level.as_deref())
    {
        eprintln!("Warning: {:#}", e);
    }

    match cli::execute(cli, &output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output.failure(&e);
            if e.downcast_ref::<DependencyError>().is_some() {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}
