//! Subcommand implementations for the `caf` CLI.

mod dump;
mod generate;
mod synth;

pub use self::dump::DumpCommand;
pub use self::generate::GenerateCommand;
pub use self::synth::SynthCommand;
