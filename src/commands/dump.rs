//! The module that implements the `caf dump` command.

use anyhow::{Context, Result};
use caf_fuzzer::{codec, ObjectPool, ValueData, ValueId};
use caf_store::CafStore;
use clap::Parser;
use std::fs;
use std::path::PathBuf;

/// Prints a human-readable listing of a binary test case.
#[derive(Parser)]
pub struct DumpCommand {
    /// Path to the API catalog JSON file.
    #[arg(short = 's', long = "store", value_name = "FILE")]
    store: PathBuf,

    /// Path to the binary test case file.
    #[arg(value_name = "TESTCASE")]
    testcase: PathBuf,
}

impl DumpCommand {
    /// Executes the command.
    pub fn execute(self) -> Result<()> {
        let store = CafStore::load(&self.store)
            .with_context(|| format!("failed to load catalog from {}", self.store.display()))?;
        let bytes = fs::read(&self.testcase)
            .with_context(|| format!("failed to read {}", self.testcase.display()))?;

        let mut pool = ObjectPool::new();
        let tc = codec::decode(&bytes, &mut pool)
            .with_context(|| format!("failed to decode {}", self.testcase.display()))?;

        for (index, call) in tc.calls().iter().enumerate() {
            let name = store
                .get(call.func_id)
                .map(|f| f.name.as_str())
                .unwrap_or("<unknown>");
            let kind = if call.is_constructor { "construct" } else { "call" };
            println!("#{} {} {} (func id {})", index, kind, name, call.func_id);
            println!("    this: {}", render(&pool, call.this));
            for (arg_index, &arg) in call.args.iter().enumerate() {
                println!("    arg {}: {}", arg_index, render(&pool, arg));
            }
        }
        Ok(())
    }
}

fn render(pool: &ObjectPool, value: ValueId) -> String {
    match pool.data(value) {
        ValueData::Undefined => "undefined".to_string(),
        ValueData::Null => "null".to_string(),
        ValueData::Boolean(b) => b.to_string(),
        ValueData::String(bytes) => format!("{:?}", String::from_utf8_lossy(bytes)),
        ValueData::Function(id) => format!("function #{}", id),
        ValueData::Integer(x) => x.to_string(),
        ValueData::Float(x) => x.to_string(),
        ValueData::Array(elements) => {
            let rendered: Vec<String> = elements.iter().map(|&e| render(pool, e)).collect();
            format!("[{}]", rendered.join(", "))
        }
        ValueData::Placeholder(call) => format!("<return value of call #{}>", call),
    }
}
