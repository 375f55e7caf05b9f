//! Fuzzing engine core for CAF.
//!
//! CAF fuzzes dynamically-typed JavaScript engines at the API level: a test
//! case is not a byte string but an ordered sequence of API invocations over
//! a typed value graph. This crate implements the engine backend around that
//! idea:
//!
//! * [`value`] / [`pool`]: the typed value universe and the arena that owns
//!   and interns its nodes;
//! * [`testcase`]: the call-sequence data model;
//! * [`generate`]: biased sampling of fresh test cases;
//! * [`mutate`]: structural and value-level mutation of existing ones;
//! * [`codec`]: the length-delimited binary form exchanged with the
//!   harness across the AFL boundary, including identity-preserving
//!   back-references;
//! * [`synthesis`]: rendering a test case as an executable JavaScript
//!   fragment.
//!
//! The API catalog the generator and mutator draw callees from lives in the
//! `caf-store` crate; the AFL++ entry points live in `caf-afl`.

#![deny(trivial_numeric_casts, unused_extern_crates)]
#![warn(unused_import_braces)]

pub mod codec;
pub mod generate;
pub mod mutate;
pub mod pool;
pub mod synthesis;
pub mod testcase;
pub mod value;

pub use codec::{decode, encode, encode_into, DecodeError};
pub use generate::{Generator, GeneratorOptions};
pub use mutate::Mutator;
pub use pool::ObjectPool;
pub use synthesis::{ScriptTarget, Synthesizer};
pub use testcase::{FunctionCall, TestCase};
pub use value::{ValueData, ValueId, ValueKind};
