// src/main.rs

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use stockbook::db::items;
use stockbook::{Database, OpResult};

#[derive(Parser)]
#[command(
    name = "stockbook",
    version,
    about = "Item lifecycle bookkeeping for a small resale and rental shop"
)]
struct Cli {
    /// Path to the SQLite database file.
    #[arg(long, default_value = "stockbook.db")]
    db: String,

    /// Log at debug level (overrides RUST_LOG).
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the database file and apply the schema. Safe to re-run.
    Init,
    /// Print the stock summary: items per status plus overdue rentals.
    Status,
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let db = Database::new(cli.db.clone());
    let result = match cli.command {
        Command::Init => init(&db, &cli.db),
        Command::Status => status(&db),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn init(db: &Database, path: &str) -> OpResult<()> {
    db.init_schema()?;
    println!("✅ Database ready at {path}");
    Ok(())
}

fn status(db: &Database) -> OpResult<()> {
    let today = chrono::Utc::now().date_naive();
    let summary = db.with_conn(|conn| items::status_counts(conn, today))?;

    println!("in stock   {:>5}", summary.in_stock);
    println!("listed     {:>5}", summary.listed);
    println!("reserved   {:>5}", summary.reserved);
    println!("rented     {:>5}   ({} overdue)", summary.rented, summary.overdue);
    println!("sold       {:>5}", summary.sold);
    println!("disposed   {:>5}", summary.disposed);
    Ok(())
}
