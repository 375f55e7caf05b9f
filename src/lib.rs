//! The CAF command line interface (CLI) crate.
//!
//! This crate implements the `caf` command line tool: offline synthesis and
//! inspection of binary test cases, plus seed-corpus generation. The fuzzing
//! engine itself lives in `caf-fuzzer`; the AFL++ entry points in `caf-afl`.

#![deny(
    missing_docs,
    trivial_numeric_casts,
    unused_extern_crates,
    unstable_features
)]
#![warn(unused_import_braces)]

pub mod commands;
