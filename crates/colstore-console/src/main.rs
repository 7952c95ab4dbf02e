use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use colstore_console::display::{OutputMode, render};
use colstore_console::{IndexSpec, compile_file};
use tracing::error;

/// colstore console: compile table definitions and inspect their physical layout.
#[derive(Parser, Debug)]
#[command(name = "colstore-console", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile a JSON table definition and print the resolved schema.
    Compile {
        /// Path to the table definition.
        definition: PathBuf,

        /// Derive an index on a column, as `<column>` or `<column>=<name>`
        /// (can be repeated).
        #[arg(short, long = "index")]
        index: Vec<IndexSpec>,

        /// Output results as machine-parseable JSON.
        #[arg(short, long)]
        json: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Compile {
            definition,
            index,
            json,
        } => {
            let mode = if json {
                OutputMode::Json
            } else {
                OutputMode::Pretty
            };
            match compile_file(&definition, &index) {
                Ok(output) => println!("{}", render(&output, &mode)),
                Err(e) => {
                    error!(definition = %definition.display(), "compile failed");
                    eprintln!("Error: {e}");
                    process::exit(1);
                }
            }
        }
    }
}
