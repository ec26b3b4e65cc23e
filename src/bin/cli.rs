//! atlasgate CLI
//!
//! Maintenance command-line interface over a local store.

use std::process::ExitCode;

use atlasgate::{Database, Environment, OpenOptions, RangeOptions, ReadOptions};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

/// atlasgate CLI
#[derive(Parser, Debug)]
#[command(name = "atlasgate")]
#[command(about = "Inspect and maintain an atlasgate store")]
#[command(version)]
struct Args {
    /// Store directory
    #[arg(short, long, default_value = "./atlasgate_data")]
    path: String,

    /// Number of background worker threads
    #[arg(short, long, default_value = "4")]
    workers: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Set a key-value pair
    Put {
        key: String,
        value: String,

        /// fsync the log before returning
        #[arg(long)]
        sync: bool,
    },

    /// Get a value by key
    Get { key: String },

    /// Delete a key
    Del { key: String },

    /// Print the entries of a key range
    Scan {
        /// Lower bound (inclusive)
        #[arg(long)]
        gte: Option<String>,

        /// Upper bound (exclusive)
        #[arg(long)]
        lt: Option<String>,

        #[arg(long)]
        reverse: bool,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Delete every key of a range
    Clear {
        #[arg(long)]
        gte: Option<String>,

        #[arg(long)]
        lt: Option<String>,
    },

    /// Approximate bytes used by keys in [start, end)
    Size { start: String, end: String },

    /// Compact the whole store
    Compact,

    /// Print an engine property (e.g. atlas.stats)
    Property { name: String },

    /// Remove the store
    Destroy,

    /// Salvage a damaged store
    Repair,
}

fn main() -> ExitCode {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,atlasgate=debug"));

    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.code() {
                Some(code) => eprintln!("error [{}]: {}", code, e),
                None => eprintln!("error: {}", e),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> atlasgate::Result<()> {
    let env = Environment::builder().worker_threads(args.workers).build()?;
    tracing::info!("atlasgate v{} on {}", atlasgate::VERSION, args.path);

    // Location commands run without opening the store
    match args.command {
        Commands::Destroy => {
            env.destroy(args.path.as_str()).wait()?;
            tracing::info!("destroyed {}", args.path);
            return Ok(());
        }
        Commands::Repair => {
            env.repair(args.path.as_str()).wait()?;
            tracing::info!("repaired {}", args.path);
            return Ok(());
        }
        _ => {}
    }

    let db = env.open(args.path.as_str(), OpenOptions::default())?;
    let result = execute(&db, args.command);
    db.close().wait()?;
    result
}

fn execute(db: &Database, command: Commands) -> atlasgate::Result<()> {
    match command {
        Commands::Put { key, value, sync } => {
            let options = atlasgate::WriteOptions { sync };
            db.put_with(&key, &value, options).wait()?;
            println!("OK");
        }

        Commands::Get { key } => match db.get_sync(&key, &ReadOptions::default())? {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => println!("(nil)"),
        },

        Commands::Del { key } => {
            db.del(&key).wait()?;
            println!("OK");
        }

        Commands::Scan {
            gte,
            lt,
            reverse,
            limit,
        } => {
            let mut options = range(gte, lt).reverse(reverse);
            options.limit = limit;

            let entries = db.iterator(options)?.all()?;
            for entry in &entries {
                let key = entry.key.as_deref().unwrap_or_default();
                let value = entry.value.as_deref().unwrap_or_default();
                println!(
                    "{}\t{}",
                    String::from_utf8_lossy(key),
                    String::from_utf8_lossy(value)
                );
            }
            tracing::info!("{} entries", entries.len());
        }

        Commands::Clear { gte, lt } => {
            db.clear(range(gte, lt)).wait()?;
            println!("OK");
        }

        Commands::Size { start, end } => {
            let size = db.approximate_size(&start, &end).wait()?;
            println!("{}", size);
        }

        Commands::Compact => {
            db.compact_range(None, None).wait()?;
            println!("OK");
        }

        Commands::Property { name } => {
            println!("{}", db.get_property(&name)?);
        }

        Commands::Destroy | Commands::Repair => {}
    }

    Ok(())
}

fn range(gte: Option<String>, lt: Option<String>) -> RangeOptions {
    let mut options = RangeOptions::new();
    if let Some(gte) = gte {
        options = options.gte(gte);
    }
    if let Some(lt) = lt {
        options = options.lt(lt);
    }
    options
}
