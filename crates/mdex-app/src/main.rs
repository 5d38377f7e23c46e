use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mdex_app::{Library, worker};
use mdex_config::Config;
use tokio::signal;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mdex")]
#[command(about = "Register MDict dictionaries, autocomplete terms and look up definitions", long_about = None)]
struct Args {
    /// JSON config file; environment variables are used when omitted
    #[arg(long, global = true, env = "MDEX_CONFIG")]
    config: Option<PathBuf>,

    /// Root of managed storage
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(flatten)]
    Library(LibraryCommand),
    /// Serve one task over stdin/stdout
    #[command(hide = true)]
    Worker,
}

#[derive(Subcommand)]
enum LibraryCommand {
    /// Copy a .mdx or .mdd file into storage and index it
    Register { id: String, path: PathBuf },
    /// Remove a dictionary's managed copies and cache
    Unregister { id: String },
    /// Look up every definition of a term
    Lookup { id: String, term: String },
    /// Complete a prefix from the term index
    Complete {
        prefix: String,
        /// Maximum number of terms, negative for unlimited
        #[arg(long, allow_hyphen_values = true)]
        limit: Option<i64>,
    },
    /// List registered dictionaries
    List,
    /// Rebuild the term index from every registered dictionary
    Rebuild,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::new(),
    };
    if let Some(data_dir) = args.data_dir {
        config.storage.data_dir = data_dir;
    }

    let command = match args.command {
        Command::Library(command) => command,
        Command::Worker => {
            worker::run_stdio(&config).await?;
            return Ok(());
        }
    };

    let library = Library::init(config).await?;
    let result = tokio::select! {
        result = run(&library, command) => result,
        _ = signal::ctrl_c() => {
            tracing::info!("Shutdown requested");
            Ok(())
        }
    };
    library.shutdown().await;
    result
}

async fn run(library: &Library, command: LibraryCommand) -> Result<()> {
    match command {
        LibraryCommand::Register { id, path } => {
            let report = library.register_dictionary(&id, &path).await?;
            println!(
                "registered {id}: {} terms, {} new",
                report.terms, report.inserted
            );
        }
        LibraryCommand::Unregister { id } => {
            library.unregister_dictionary(&id).await?;
            println!("unregistered {id}");
        }
        LibraryCommand::Lookup { id, term } => {
            let hits = library.lookup(&id, &term).await?;
            if hits.is_empty() {
                println!("no entry for {term}");
            }
            for hit in hits {
                match hit.definition {
                    Some(definition) => println!("{}\n{definition}\n", hit.term),
                    None => println!("{} (resource)", hit.term),
                }
            }
        }
        LibraryCommand::Complete { prefix, limit } => {
            let limit = limit.unwrap_or(library.config().search.autocomplete_limit);
            for term in library.autocomplete(&prefix, limit).await {
                println!("{term}");
            }
        }
        LibraryCommand::List => {
            for record in library.list_dictionaries()? {
                println!(
                    "{}\t{}\t{}",
                    record.id,
                    record.kind,
                    record.source_path.display()
                );
            }
        }
        LibraryCommand::Rebuild => {
            let report = library.rebuild_index().await?;
            println!("reindexed {} dictionaries", report.indexed.len());
            for (id, reason) in &report.failed {
                eprintln!("failed to reindex {id}: {reason}");
            }
        }
    }
    Ok(())
}

/// Logs go to stderr; a worker's stdout carries protocol messages
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if std::env::var("MDEX_LOG_JSON").is_ok_and(|v| v == "1") {
        builder.json().init();
    } else {
        builder.with_ansi(atty::is(atty::Stream::Stderr)).init();
    }
}
