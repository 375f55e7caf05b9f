//! The module that implements the `caf generate` command.

use anyhow::{Context, Result};
use caf_fuzzer::{codec, Generator, GeneratorOptions, ObjectPool};
use caf_store::CafStore;
use clap::Parser;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::fs;
use std::path::PathBuf;

/// Generates fresh binary test cases to seed a fuzzing corpus.
#[derive(Parser)]
pub struct GenerateCommand {
    /// Path to the API catalog JSON file.
    #[arg(short = 's', long = "store", value_name = "FILE")]
    store: PathBuf,

    /// Directory the seed files are written to.
    #[arg(short = 'o', long = "out-dir", value_name = "DIR")]
    out_dir: PathBuf,

    /// How many test cases to generate.
    #[arg(short = 'n', long = "count", value_name = "N", default_value_t = 64)]
    count: usize,

    /// RNG seed; generation is reproducible per seed.
    #[arg(long = "seed", value_name = "N")]
    seed: Option<u64>,

    /// Maximum number of calls per test case.
    #[arg(long = "max-calls", value_name = "N")]
    max_calls: Option<usize>,

    /// Maximum array nesting depth.
    #[arg(long = "max-depth", value_name = "N")]
    max_depth: Option<usize>,

    /// Maximum generated string length.
    #[arg(long = "max-string-len", value_name = "N")]
    max_string_len: Option<usize>,

    /// Maximum generated array length.
    #[arg(long = "max-array-len", value_name = "N")]
    max_array_len: Option<usize>,
}

impl GenerateCommand {
    /// Executes the command.
    pub fn execute(self) -> Result<()> {
        let store = CafStore::load(&self.store)
            .with_context(|| format!("failed to load catalog from {}", self.store.display()))?;
        fs::create_dir_all(&self.out_dir)
            .with_context(|| format!("failed to create {}", self.out_dir.display()))?;

        let mut opts = GeneratorOptions::default();
        if let Some(max_calls) = self.max_calls {
            opts.max_calls = max_calls;
        }
        if let Some(max_depth) = self.max_depth {
            opts.max_depth = max_depth;
        }
        if let Some(max_string_len) = self.max_string_len {
            opts.max_string_len = max_string_len;
        }
        if let Some(max_array_len) = self.max_array_len {
            opts.max_array_len = max_array_len;
        }

        let mut rng = match self.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };

        let mut pool = ObjectPool::new();
        for index in 0..self.count {
            pool.clear();
            let mut generator = Generator::with_options(&store, &mut pool, &mut rng, opts.clone());
            let tc = generator.generate();
            let wire = codec::encode(&pool, &tc);

            let path = self.out_dir.join(format!("{:04}.bin", index));
            fs::write(&path, wire)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
        log::info!(
            "wrote {} seed test cases to {}",
            self.count,
            self.out_dir.display()
        );
        Ok(())
    }
}
