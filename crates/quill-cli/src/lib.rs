//! Quill CLI
//!
//! Thin driver over [`quill_repair`]: reads one input (a file or stdin),
//! runs one pipeline stage and prints the result. All file and stream I/O
//! in the workspace happens here.
//!
//! # Exit codes
//!
//! - `0`: success
//! - `1`: extraction failed and a retry may succeed
//! - `2`: the model output was truncated; retrying the same call is futile

#![warn(missing_docs)]
#![warn(unreachable_pub)]

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use quill_repair::{Patch, Pipeline, ReferenceSet, RepairConfig};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Environment variable holding a tracing filter directive
pub const LOG_ENV: &str = "QUILL_LOG";

/// Exit code for a retryable extraction failure
pub const EXIT_FAILED: u8 = 1;

/// Exit code for truncated model output
pub const EXIT_TRUNCATED: u8 = 2;

fn input_arg() -> Arg {
    Arg::new("input")
        .value_name("INPUT")
        .value_parser(value_parser!(PathBuf))
        .help("Input file (reads stdin when omitted)")
}

/// Build the argument parser
#[must_use]
pub fn command() -> Command {
    Command::new("quill")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Repair and compile generative model output")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Log every repair, not just suspicious ones"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("extract")
                .about("Recover the first JSON value and print it")
                .arg(input_arg()),
        )
        .subcommand(
            Command::new("sanitize")
                .about("Strip model artifacts from one text field")
                .arg(input_arg()),
        )
        .subcommand(
            Command::new("compile")
                .about("Resolve citations, escape and balance a document")
                .arg(
                    Arg::new("refs")
                        .long("refs")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Reference set: JSON object of entries or array of keys"),
                )
                .arg(
                    Arg::new("bibtex")
                        .long("bibtex")
                        .value_parser(value_parser!(PathBuf))
                        .help("Also write BibTeX for the cited keys to this file"),
                )
                .arg(input_arg()),
        )
        .subcommand(
            Command::new("patch")
                .about("Apply ordered revision patches to a document")
                .arg(
                    Arg::new("patches")
                        .long("patches")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("JSON array of {\"original\", \"replacement\"} objects"),
                )
                .arg(input_arg()),
        )
}

/// Install the global subscriber
///
/// `QUILL_LOG` wins when set; otherwise `warn`, or `debug` with
/// `verbose`. Logs go to stderr so stdout carries only results.
pub fn init_tracing(verbose: bool, json: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);

    // A subscriber may already be installed when embedded; keep it.
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

/// Load configuration, or defaults without a path
///
/// # Errors
///
/// Unreadable file or invalid TOML.
pub fn load_config(path: Option<&Path>) -> Result<RepairConfig> {
    let Some(path) = path else {
        return Ok(RepairConfig::default());
    };
    let source = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    RepairConfig::from_toml_str(&source)
        .with_context(|| format!("invalid config {}", path.display()))
}

/// Load a reference set from JSON
///
/// # Errors
///
/// Unreadable file or JSON of neither accepted shape.
pub fn load_references(path: &Path) -> Result<ReferenceSet> {
    let source = fs::read_to_string(path)
        .with_context(|| format!("failed to read references {}", path.display()))?;
    serde_json::from_str(&source)
        .with_context(|| format!("invalid reference set {}", path.display()))
}

/// Load an ordered patch list from JSON
///
/// # Errors
///
/// Unreadable file or malformed patch list.
pub fn load_patches(path: &Path) -> Result<Vec<Patch>> {
    let source = fs::read_to_string(path)
        .with_context(|| format!("failed to read patches {}", path.display()))?;
    serde_json::from_str(&source).with_context(|| format!("invalid patches {}", path.display()))
}

fn read_input(path: Option<&PathBuf>) -> Result<String> {
    match path {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
        }
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            Ok(buf)
        }
    }
}

/// Run the selected subcommand, returning the process exit code
///
/// # Errors
///
/// I/O, configuration and argument failures. Extraction failures are not
/// errors here: they are reported on `err` and mapped to an exit code.
pub fn run(matches: &ArgMatches, out: &mut dyn Write, err: &mut dyn Write) -> Result<u8> {
    let config = load_config(matches.get_one::<PathBuf>("config").map(PathBuf::as_path))?;
    let pipeline = Pipeline::new(config).context("invalid configuration")?;

    let Some((name, args)) = matches.subcommand() else {
        anyhow::bail!("no subcommand given");
    };
    let input = read_input(args.get_one::<PathBuf>("input"))?;
    tracing::debug!(command = name, bytes = input.len(), "running");

    match name {
        "extract" => match pipeline.extract_json(&input) {
            Ok(value) => {
                writeln!(out, "{}", serde_json::to_string_pretty(&value)?)?;
                Ok(0)
            }
            Err(e) => {
                writeln!(err, "error: {e}")?;
                Ok(if e.is_truncated() {
                    EXIT_TRUNCATED
                } else {
                    EXIT_FAILED
                })
            }
        },
        "sanitize" => {
            writeln!(out, "{}", pipeline.sanitize_field(&input))?;
            Ok(0)
        }
        "compile" => {
            let refs_path = args
                .get_one::<PathBuf>("refs")
                .context("--refs is required")?;
            let refs = load_references(refs_path)?;
            let compiled = pipeline.compile_document(&input, &refs);
            out.write_all(compiled.as_bytes())?;

            if let Some(bib_path) = args.get_one::<PathBuf>("bibtex") {
                let cited = refs.cited_keys(&compiled);
                fs::write(bib_path, refs.to_bibtex(&cited))
                    .with_context(|| format!("failed to write {}", bib_path.display()))?;
                tracing::info!(keys = cited.len(), path = %bib_path.display(), "wrote bibliography");
            }
            Ok(0)
        }
        "patch" => {
            let patches_path = args
                .get_one::<PathBuf>("patches")
                .context("--patches is required")?;
            let patches = load_patches(patches_path)?;
            let report = pipeline.apply_patches(&input, &patches);
            out.write_all(report.document.as_bytes())?;

            for index in report.skipped() {
                let preview: String = patches[index].original.chars().take(60).collect();
                writeln!(err, "skipped patch #{index}: original not found: '{preview}'")?;
            }
            Ok(0)
        }
        other => anyhow::bail!("unknown command '{other}'"),
    }
}
