use std::process::ExitCode;

use clap::Parser;
use llmq::{logging, Cli, EnvConfig};

fn main() -> ExitCode {
    let cli = Cli::parse();
    let env = EnvConfig::from_env();
    logging::init(cli.verbose, env.log_filter.as_deref());

    match llmq::run(&cli, &env) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("[error] {error:#}");
            ExitCode::FAILURE
        }
    }
}
