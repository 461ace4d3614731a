//! Well-formedness checker.
//!
//! Parses each file with the tree parser, reports failures and warnings,
//! and prints the parsed tree unless `--noout` is given.

use std::fs;
use std::io;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use xmlwrap::parser::ParseOptions;
use xmlwrap::serial::{write_document, SerializeOptions};
use xmlwrap::TreeParser;

/// xmlcheck -- check that XML files are well-formed.
#[derive(Parser, Debug)]
#[command(name = "xmlcheck", version, about, long_about = None)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// XML files to check (use `-` for stdin).
    #[arg(required = true)]
    files: Vec<String>,

    /// Read each file into memory and parse the buffer instead of the path.
    #[arg(long)]
    memory: bool,

    /// Drop whitespace-only text between elements.
    #[arg(long)]
    noblanks: bool,

    /// Disable namespace processing.
    #[arg(long)]
    nonamespaces: bool,

    /// Do not print the parsed tree.
    #[arg(long)]
    noout: bool,

    /// Indent the printed tree.
    #[arg(long)]
    format: bool,

    /// Only report failures.
    #[arg(long)]
    quiet: bool,

    /// Print how long each parse took.
    #[arg(long)]
    timing: bool,
}

const EXIT_SUCCESS: u8 = 0;
const EXIT_PARSE_ERROR: u8 = 1;
const EXIT_OUTPUT_ERROR: u8 = 2;

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "xmlwrap=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    let options = ParseOptions::default()
        .keep_blanks(!cli.noblanks)
        .namespaces(!cli.nonamespaces);

    let mut worst_exit = EXIT_SUCCESS;
    for file in &cli.files {
        worst_exit = worst_exit.max(check_file(&cli, &options, file));
    }
    ExitCode::from(worst_exit)
}

fn check_file(cli: &Cli, options: &ParseOptions, filename: &str) -> u8 {
    let start = Instant::now();
    let parsed = if cli.memory || filename == "-" {
        match read_input(filename) {
            Ok(bytes) => TreeParser::from_memory_with_options(&bytes, options, false),
            Err(e) => {
                eprintln!("{filename}: failed to read: {e}");
                return EXIT_PARSE_ERROR;
            }
        }
    } else {
        TreeParser::from_file_with_options(filename, options, false)
    };
    if cli.timing {
        eprintln!("Parsing {filename} took {:?}", start.elapsed());
    }

    let parser = match parsed {
        Ok(parser) => parser,
        Err(e) => {
            eprintln!("{filename}: {e}");
            return EXIT_PARSE_ERROR;
        }
    };
    if parser.failed() {
        eprintln!("{filename}: {}", parser.error_message());
        return EXIT_PARSE_ERROR;
    }
    if parser.had_warnings() && !cli.quiet {
        eprintln!("{filename}: warnings");
    }
    if cli.noout {
        return EXIT_SUCCESS;
    }

    let Ok(doc) = parser.document().get() else {
        return EXIT_SUCCESS;
    };
    let serialize = SerializeOptions::default().indent(cli.format);
    let mut out = io::stdout().lock();
    if let Err(e) = write_document(doc, &serialize, &mut out) {
        eprintln!("{filename}: {e}");
        return EXIT_OUTPUT_ERROR;
    }
    EXIT_SUCCESS
}

/// Reads a file, or stdin for `-`.
fn read_input(filename: &str) -> io::Result<Vec<u8>> {
    if filename == "-" {
        let mut buf = Vec::new();
        io::Read::read_to_end(&mut io::stdin(), &mut buf)?;
        Ok(buf)
    } else {
        fs::read(filename)
    }
}
