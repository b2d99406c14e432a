use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{debug, info, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

mod cli;
mod config;
mod graph;
mod index;
mod indexer;
mod query;

use config::Config;
use query::QueryKind;

#[derive(Parser)]
#[command(name = "springscope")]
#[command(version)]
#[command(about = "Structural index and question answering for Spring Boot codebases", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project directory
    #[arg(short, long, global = true, default_value = ".")]
    project: String,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Args, Clone)]
struct QueryArgs {
    /// Skip the self-verification pass
    #[arg(long)]
    no_verify: bool,

    /// Directory with pre-generated summaries (defaults to retrieval.summary_dir)
    #[arg(long)]
    summary_dir: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Index the project's Java sources
    Index {
        /// Keep watching for changes after the initial pass
        #[arg(short, long)]
        watch: bool,

        /// Drop the existing index first
        #[arg(short, long)]
        rebuild: bool,

        /// Remove entries for files that no longer exist
        #[arg(long)]
        prune: bool,

        /// Seed the index from a directory holding index.json and file_checksums.json
        #[arg(long, value_name = "DIR")]
        import: Option<PathBuf>,
    },

    /// Ask a question about the application
    Query {
        text: String,
        #[command(flatten)]
        args: QueryArgs,
    },

    /// Plan the implementation of a new feature
    Feature {
        description: String,
        #[command(flatten)]
        args: QueryArgs,
    },

    /// Analyze the impact of a code change
    Impact {
        description: String,
        #[command(flatten)]
        args: QueryArgs,
    },

    /// Interactive question loop
    Interactive {
        #[command(flatten)]
        args: QueryArgs,
    },

    /// Run queries from a file, or the demo set when no file is given
    Batch {
        /// One query per line
        #[arg(short, long)]
        file: Option<String>,
        #[command(flatten)]
        args: QueryArgs,
    },

    /// Show definitions and callers of a method
    References {
        method: String,

        /// Output format: json, text
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show index statistics
    Stats,
}

/// One formatted output layer in the configured style
fn format_layer<S, W>(format: &str, writer: W, ansi: bool) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer().with_target(false).with_ansi(ansi).with_writer(writer);
    match format {
        "json" => layer.json().boxed(),
        "pretty" => layer.pretty().boxed(),
        _ => layer.compact().boxed(),
    }
}

/// Logs go to stderr and, when `logging.file` is set, to that file as well.
/// The returned guard flushes the file writer and must live until exit.
fn init_logging(config: &Config, debug: bool, verbose: bool) -> Option<WorkerGuard> {
    let level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        config.logging.level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> =
        vec![format_layer(&config.logging.format, std::io::stderr, true)];

    let guard = config.logging.file.as_deref().map(Path::new).and_then(|path| {
        let file_name = path.file_name()?;
        let dir = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir).ok();

        let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
        layers.push(format_layer(&config.logging.format, writer, false));
        Some(guard)
    });

    tracing_subscriber::registry().with(layers).with(filter).init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::load(&cli.project)?;
    let _log_guard = init_logging(&config, cli.debug, cli.verbose);

    info!("springscope v{} starting", env!("CARGO_PKG_VERSION"));
    match &config.source {
        Some(path) => info!("Loaded configuration from {}", path.display()),
        None => debug!("No {} in {}, using defaults", config::CONFIG_FILE_NAME, cli.project),
    }
    if let Some(file) = &config.logging.file {
        debug!("Writing logs to {}", file);
    }

    match cli.command {
        Commands::Index {
            watch,
            rebuild,
            prune,
            import,
        } => {
            cli::index::index_project(&config, watch, rebuild, prune, import).await?;
        }

        Commands::Query { text, args } => {
            cli::query::run_query(&config, QueryKind::General, text, !args.no_verify, args.summary_dir).await?;
        }

        Commands::Feature { description, args } => {
            cli::query::run_query(&config, QueryKind::Feature, description, !args.no_verify, args.summary_dir)
                .await?;
        }

        Commands::Impact { description, args } => {
            cli::query::run_query(&config, QueryKind::Impact, description, !args.no_verify, args.summary_dir)
                .await?;
        }

        Commands::Interactive { args } => {
            cli::interactive::run_interactive(&config, !args.no_verify, args.summary_dir).await?;
        }

        Commands::Batch { file, args } => {
            cli::batch::run_batch(&config, file, !args.no_verify, args.summary_dir).await?;
        }

        Commands::References { method, format } => {
            cli::references::show_references(&config, method, format).await?;
        }

        Commands::Stats => {
            cli::stats::show_stats(&config, cli.verbose).await?;
        }
    }

    Ok(())
}
