//! pdbdump CLI
//!
//! Decodes and validates artifacts produced by `prevodb`:
//!
//! ```text
//! pdbdump article out/assets/articles/article-0.bin
//! pdbdump index out/assets/indices/index-eo.bin
//! ```
//!
//! `article` prints each spannable string with its spans; `index` walks
//! the compressed trie and prints every entry in collation order. Both
//! reject malformed input, which makes them usable as format checkers.

use std::{fs, path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand};

use prevodb::{
    spannable::SpannableString,
    trie::decode_entries,
    PrevoError,
};

#[derive(Parser)]
#[command(name = "pdbdump")]
#[command(version, about = "Dumps binary artifacts produced by prevodb")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode an article blob: every string and its spans
    Article {
        /// article-<N>.bin file or a blob extracted from a single-file db
        file: PathBuf,
    },

    /// Decode a compressed index: every entry in collation order
    Index {
        /// index-<code>.bin file
        file: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            eprint!("{err}");
            return ExitCode::from(1);
        }
    };

    let result = match cli.command {
        Commands::Article { file } => dump_article(&file),
        Commands::Index { file } => dump_index(&file),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(1)
        }
    }
}

fn dump_article(file: &PathBuf) -> Result<(), PrevoError> {
    let data = fs::read(file).map_err(|e| PrevoError::Io(format!("{}: {e}", file.display())))?;

    let mut pos = 0;
    while pos < data.len() {
        let (string, used) = SpannableString::read(&data[pos..])?;
        pos += used;

        println!("{}", string.text);
        println!("utf16_length = {}", string.utf16_len());
        for span in &string.spans {
            println!(
                "{}({}) [{},{}] {}",
                span.start, span.length, span.data1, span.data2, span.kind as u8
            );
        }
    }

    Ok(())
}

fn dump_index(file: &PathBuf) -> Result<(), PrevoError> {
    let data = fs::read(file).map_err(|e| PrevoError::Io(format!("{}: {e}", file.display())))?;

    for entry in decode_entries(&data)? {
        match &entry.display {
            Some(display) => println!(
                "{} ({}) {} {}",
                entry.word, display, entry.article, entry.section
            ),
            None => println!("{} {} {}", entry.word, entry.article, entry.section),
        }
    }

    Ok(())
}
