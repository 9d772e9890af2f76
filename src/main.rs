use clap::Parser;
use secmaster::cli::{Cli, run};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
