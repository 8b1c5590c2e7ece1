use std::io::IsTerminal;
use std::path::PathBuf;

use bookstore_reports::{
    sample_books, Catalog, CatalogSummary, Config, DeleteMode, DocumentStore, FailurePolicy,
    JsonSink, MemoryStore, MongoStore, QueryRunner, ReportSink, TextSink,
};
use clap::{Parser, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "bookstore-reports")]
#[command(about = "Run the bookstore report catalog against a document store", long_about = None)]
struct Args {
    /// Configuration file (defaults to ./bookstore-reports.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Store connection string
    #[arg(long)]
    uri: Option<String>,

    /// Database name
    #[arg(long)]
    database: Option<String>,

    /// Collection name
    #[arg(long)]
    collection: Option<String>,

    /// Use an in-memory store seeded with sample books
    #[arg(long)]
    memory: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Actually run the delete report instead of describing it
    #[arg(long)]
    confirm_delete: bool,

    /// Stop at the first failing report
    #[arg(long)]
    fail_fast: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr so report output stays clean on stdout
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bookstore_reports=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = Config::load(&std::env::current_dir()?, args.config.as_deref())?;
    if let Some(uri) = &args.uri {
        config.uri = uri.clone();
    }
    if let Some(database) = &args.database {
        config.database = database.clone();
    }
    if let Some(collection) = &args.collection {
        config.collection = collection.clone();
    }
    config.validate()?;

    let catalog = Catalog::new()
        .with_delete_mode(if args.confirm_delete {
            DeleteMode::Confirmed
        } else {
            DeleteMode::DryRun
        })
        .with_policy(if args.fail_fast {
            FailurePolicy::Abort
        } else {
            FailurePolicy::Continue
        });

    let stdout = std::io::stdout();
    let mut sink: Box<dyn ReportSink> = match args.format {
        Format::Text => Box::new(TextSink::new(stdout.lock(), stdout.is_terminal())),
        Format::Json => Box::new(JsonSink::new(stdout.lock())),
    };

    let summary = if args.memory {
        let store = MemoryStore::new(config.collection.clone());
        let runner = QueryRunner::new(store);
        let inserted = runner.insert_books(&sample_books()).await?;
        tracing::info!("Seeded in-memory collection {} with {} books", config.collection, inserted);
        run_catalog(runner, &catalog, sink.as_mut()).await?
    } else {
        let store = MongoStore::connect(&config).await?;
        run_catalog(QueryRunner::new(store), &catalog, sink.as_mut()).await?
    };

    if summary.failed > 0 {
        anyhow::bail!("{} of {} reports failed", summary.failed, summary.total());
    }
    Ok(())
}

/// Runs the catalog and closes the store whether or not it succeeded.
async fn run_catalog<S: DocumentStore>(
    runner: QueryRunner<S>,
    catalog: &Catalog,
    sink: &mut dyn ReportSink,
) -> anyhow::Result<CatalogSummary> {
    let result = catalog.run(&runner, sink).await;
    if let Err(e) = runner.close().await {
        tracing::warn!("Failed to close store: {}", e);
    }
    Ok(result?)
}
