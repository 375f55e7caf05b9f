//! The module that implements the `caf synth` command.

use anyhow::{Context, Result};
use caf_fuzzer::{codec, ObjectPool, ScriptTarget, Synthesizer};
use caf_store::CafStore;
use clap::{Parser, ValueEnum};
use std::fs;
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Target {
    /// Plain JavaScript.
    Js,
    /// Node.js embedding.
    Nodejs,
}

impl Target {
    fn to_script_target(self) -> ScriptTarget {
        match self {
            Target::Js => ScriptTarget::Js,
            Target::Nodejs => ScriptTarget::Nodejs,
        }
    }
}

/// Synthesizes the JavaScript program replaying a binary test case.
#[derive(Parser)]
pub struct SynthCommand {
    /// Path to the API catalog JSON file.
    #[arg(short = 's', long = "store", value_name = "FILE")]
    store: PathBuf,

    /// Rendering target.
    #[arg(short = 't', long = "target", value_name = "TARGET", value_enum, default_value = "js")]
    target: Target,

    /// Write the script to this file instead of stdout.
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    output: Option<PathBuf>,

    /// Path to the binary test case file.
    #[arg(value_name = "TESTCASE")]
    testcase: PathBuf,
}

impl SynthCommand {
    /// Executes the command.
    pub fn execute(self) -> Result<()> {
        let store = CafStore::load(&self.store)
            .with_context(|| format!("failed to load catalog from {}", self.store.display()))?;
        let bytes = fs::read(&self.testcase)
            .with_context(|| format!("failed to read {}", self.testcase.display()))?;

        let mut pool = ObjectPool::new();
        let tc = codec::decode(&bytes, &mut pool)
            .with_context(|| format!("failed to decode {}", self.testcase.display()))?;

        let script =
            Synthesizer::new(&store, self.target.to_script_target()).synthesize(&pool, &tc);
        match &self.output {
            Some(path) => fs::write(path, script)
                .with_context(|| format!("failed to write {}", path.display()))?,
            None => print!("{}", script),
        }
        Ok(())
    }
}
