use clap::Parser;
use std::process::ExitCode;

use ad_membership::cli::Cli;

fn main() -> ExitCode {
    ad_membership::run(Cli::parse())
}
