//! prevodb CLI
//!
//! Creates a compact database from the ReVo XML files:
//!
//! ```text
//! prevodb -i revo.zip -o out/          # multi-file layout
//! prevodb -i revo/ -o prevo.db -s      # single-file database
//! ```
//!
//! The input may be a ZIP archive (read through the external `unzip`
//! tool) or an unpacked directory. Exit code is 0 on success and 1 on
//! any reported error, including bad command lines.

use std::{path::PathBuf, process::ExitCode};

use clap::Parser;

use prevodb::{db::PrevoDb, source::RevoSource, PrevoError};

#[derive(Parser)]
#[command(name = "prevodb")]
#[command(version, about = "Creates a compact database from the ReVo XML files")]
struct Cli {
    /// The zip file or directory containing the ReVo XML files
    #[arg(short = 'i', long = "in", value_name = "PATH")]
    input: PathBuf,

    /// Location for the output of the database
    #[arg(short = 'o', long = "out", value_name = "PATH")]
    output: PathBuf,

    /// Generate a single file instead of a db for Android
    #[arg(short = 's', long = "single")]
    single: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Usage errors exit 1 like every other failure
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            eprint!("{err}");
            return ExitCode::from(1);
        }
    };

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(1)
        }
    }
}

fn run(cli: &Cli) -> Result<(), PrevoError> {
    let source = RevoSource::new(&cli.input)?;
    let db = PrevoDb::build(&source)?;

    if cli.single {
        db.save_single(&cli.output)
    } else {
        db.save(&cli.output)
    }
}
