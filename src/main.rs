use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use gh_flush::config::{AppConfig, PolicyConfig};
use gh_flush::pipeline::Pipeline;
use gh_flush::platform::github::GitHubService;
use gh_flush::report::{self, LineSink, OutputFormat, ResultSink, TableSink};
use gh_flush::shutdown::cancel_on_signal;

/// `gh-flush` deletes GitHub notifications that are from bots, about
/// closed pull requests, or already read.
#[derive(Parser)]
#[command(name = "gh-flush", version, about)]
struct Cli {
    /// Don't delete notifications on PRs from bots
    #[arg(short = 'b', long)]
    skip_bots: bool,

    /// Don't delete notifications on closed / merged PRs
    #[arg(short = 'c', long)]
    skip_closed: bool,

    /// Don't delete read notifications
    #[arg(short = 'r', long)]
    skip_read: bool,

    /// Dry run without deleting anything
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Number of workers [default: number of CPUs]
    #[arg(short, long)]
    workers: Option<usize>,

    /// Stop after a given number of read notifications in a row, 0 to never stop [default: 50]
    #[arg(short = 's', long)]
    halt_after: Option<usize>,

    /// Path to configuration file
    #[arg(long)]
    config: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Lines)]
    format: OutputFormat,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    /// Command-line flags win over file and environment settings.
    fn apply(&self, policy: &mut PolicyConfig) {
        policy.skip_bots |= self.skip_bots;
        policy.skip_closed |= self.skip_closed;
        policy.skip_read |= self.skip_read;
        policy.dry_run |= self.dry_run;
        if let Some(workers) = self.workers {
            policy.workers = workers;
        }
        if let Some(halt_after) = self.halt_after {
            policy.halt_after = halt_after;
        }
    }
}

fn init_tracing(json: bool) {
    // Keep stdout for the report; logs go to stderr and default to warnings
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut config = AppConfig::load(cli.config.as_deref())?;
    cli.apply(&mut config.policy);
    config.policy.validate()?;

    tracing::info!(
        api_url = %config.github.api_url,
        policy = ?config.policy,
        "Starting gh-flush"
    );

    let service = Arc::new(GitHubService::new(&config.github)?);

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    let dry_run = config.policy.dry_run;
    let pipeline = Pipeline::new(service, config.policy, cancel.clone());

    eprintln!("Fetching notifications...");
    let mut stream = pipeline.run().await?;

    let mut sink: Box<dyn ResultSink> = match cli.format {
        OutputFormat::Lines => Box::new(LineSink::new(
            std::io::stdout(),
            dry_run,
            chrono::Utc::now(),
        )),
        OutputFormat::Table => Box::new(TableSink::new(std::io::stdout())),
    };

    let tally = report::consume(&mut stream, sink.as_mut()).await?;

    tracing::info!(
        processed = tally.processed,
        deleted = tally.deleted,
        cancelled = cancel.is_cancelled(),
        "Run complete"
    );

    // Stop the signal listener
    cancel.cancel();
    Ok(())
}
