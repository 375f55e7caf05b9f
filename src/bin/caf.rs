//! The `caf` command line tool.

use anyhow::Result;
use caf_cli::commands::{DumpCommand, GenerateCommand, SynthCommand};
use clap::Parser;

/// CAF: API-level fuzzing for JavaScript engines.
#[derive(Parser)]
#[command(name = "caf", version, about)]
enum Caf {
    /// Synthesizes the JavaScript program replaying a binary test case.
    Synth(SynthCommand),
    /// Prints a human-readable listing of a binary test case.
    Dump(DumpCommand),
    /// Generates fresh binary test cases to seed a fuzzing corpus.
    Generate(GenerateCommand),
}

fn main() -> Result<()> {
    env_logger::init();
    match Caf::parse() {
        Caf::Synth(command) => command.execute(),
        Caf::Dump(command) => command.execute(),
        Caf::Generate(command) => command.execute(),
    }
}
