//! Exercises the `caf` subcommands end to end through temp files.

use caf_cli::commands::{DumpCommand, GenerateCommand, SynthCommand};
use clap::Parser;
use std::fs;

const STORE_JSON: &str = r#"{
    "apis": [
        { "id": 0, "name": "print" },
        { "id": 1, "name": "parseInt" }
    ],
    "callbacks": { "3": [1] }
}"#;

#[test]
fn generate_then_synthesize_and_dump() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("store.json");
    fs::write(&store_path, STORE_JSON).unwrap();
    let corpus_dir = dir.path().join("corpus");

    let generate = GenerateCommand::try_parse_from([
        "generate",
        "-s",
        store_path.to_str().unwrap(),
        "-o",
        corpus_dir.to_str().unwrap(),
        "-n",
        "8",
        "--seed",
        "42",
    ])
    .unwrap();
    generate.execute().unwrap();

    let mut seeds: Vec<_> = fs::read_dir(&corpus_dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    seeds.sort();
    assert_eq!(seeds.len(), 8);

    for seed in &seeds {
        let script_path = dir.path().join("out.js");
        let synth = SynthCommand::try_parse_from([
            "synth",
            "-s",
            store_path.to_str().unwrap(),
            "-o",
            script_path.to_str().unwrap(),
            seed.to_str().unwrap(),
        ])
        .unwrap();
        synth.execute().unwrap();

        let script = fs::read_to_string(&script_path).unwrap();
        // Every call binds its result to a variable.
        assert!(script.contains("let _0 ="));

        let dump = DumpCommand::try_parse_from([
            "dump",
            "-s",
            store_path.to_str().unwrap(),
            seed.to_str().unwrap(),
        ])
        .unwrap();
        dump.execute().unwrap();
    }
}

#[test]
fn generation_is_reproducible_per_seed() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("store.json");
    fs::write(&store_path, STORE_JSON).unwrap();

    let mut corpora = Vec::new();
    for name in ["a", "b"] {
        let corpus_dir = dir.path().join(name);
        GenerateCommand::try_parse_from([
            "generate",
            "-s",
            store_path.to_str().unwrap(),
            "-o",
            corpus_dir.to_str().unwrap(),
            "-n",
            "4",
            "--seed",
            "7",
        ])
        .unwrap()
        .execute()
        .unwrap();

        let mut files: Vec<_> = fs::read_dir(&corpus_dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        files.sort();
        corpora.push(
            files
                .iter()
                .map(|path| fs::read(path).unwrap())
                .collect::<Vec<_>>(),
        );
    }
    assert_eq!(corpora[0], corpora[1]);
}

#[test]
fn synth_rejects_corrupt_test_cases() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("store.json");
    fs::write(&store_path, STORE_JSON).unwrap();
    let bogus = dir.path().join("bogus.bin");
    fs::write(&bogus, [0xff; 3]).unwrap();

    let synth = SynthCommand::try_parse_from([
        "synth",
        "-s",
        store_path.to_str().unwrap(),
        bogus.to_str().unwrap(),
    ])
    .unwrap();
    assert!(synth.execute().is_err());
}
