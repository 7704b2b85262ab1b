//! A thin demo binary over the `neosearch` library: create an index, add a
//! JSON document, and run a boolean query against it. Not a full
//! statement-lexer REPL — just enough surface to exercise the library
//! from a shell.

use std::env::current_dir;
use std::process;

use clap::{Parser, Subcommand};
use neosearch::{Clause, Config, Metadata, NeoSearch, Query, Result};

/// A minimal command-line front end for the neosearch library.
#[derive(Parser)]
#[command(name = "neosearch-cli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Create indices, add documents, and run boolean queries")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new index
    CreateIndex {
        /// Index name
        name: String,
    },
    /// Add a JSON document to an index
    Add {
        /// Index name
        index: String,
        /// Document id
        id: u64,
        /// Raw JSON document body
        doc: String,
    },
    /// Look up documents where `field` equals `value`
    Search {
        /// Index name
        index: String,
        /// Field name
        field: String,
        /// Field value
        value: String,
    },
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        process::exit(1);
    }
}

fn run() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let ns = NeoSearch::open(Config {
        data_dir: current_dir()?.to_string_lossy().into_owned(),
        ..Config::default()
    });

    match cli.command {
        Commands::CreateIndex { name } => {
            ns.index(name, true)?;
        }
        Commands::Add { index, id, doc } => {
            let idx = ns.index(index, false)?;
            idx.add(ns.engine(), id, doc.as_bytes(), &Metadata::new())?;
        }
        Commands::Search { index, field, value } => {
            let idx = ns.index(index, false)?;
            let query = Query::Or(vec![Clause { field, value }]);
            let (docs, total) = ns.search(&idx, &query, 0)?;
            println!("{total} match(es):");
            for doc in docs {
                println!("{doc}");
            }
        }
    }

    ns.close();
    Ok(())
}
