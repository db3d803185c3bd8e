use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use change_monitor::config::{self, MonitorConfig};
use change_monitor::monitor::Monitor;
use change_monitor::store::Selector;

#[derive(Parser)]
#[command(name = "change-monitor")]
#[command(version, about = "Keeps a versioned, diffable history of web documents")]
struct Cli {
    /// Configuration file (defaults to config.json in the data directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// History partition to work in; omit for the global view
    #[arg(long, global = true)]
    scope: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check URLs now and record the outcome
    Check {
        #[arg(required = true)]
        urls: Vec<String>,

        /// Concurrent checks (defaults to the configured worker count)
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Write a stored version to stdout
    Show {
        url: String,

        /// Index (negative counts from the newest) or timestamp
        #[arg(long, default_value = "-1")]
        version: String,
    },
    /// Print the difference between two stored versions
    Diff { url: String, from: String, to: String },
    /// List recorded checks
    History { url: String },
    /// Print when a URL was last checked
    LastChecked { url: String },
}

fn init_logging() {
    let file_appender = tracing_appender::rolling::never(config::data_dir(), config::LOG_FILE_NAME);

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("change_monitor=info")),
        )
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(file_appender))
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.unwrap_or_else(config::config_path);
    let config = MonitorConfig::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    let monitor = Monitor::open(&config, cli.scope).context("Failed to open archive")?;

    match cli.command {
        Command::Check { urls, workers } => {
            let monitor = match workers {
                Some(workers) => monitor.with_workers(workers),
                None => monitor,
            };
            for outcome in monitor.check_multi(&urls).await {
                match outcome.result {
                    Ok(decision) => println!("{}\t{}", outcome.url, decision),
                    Err(e) => println!("{}\terror ({})", outcome.url, e),
                }
            }
        }
        Command::Show { url, version } => {
            let selector: Selector = version.parse()?;
            let mut resource = monitor.get(&url).await?;
            let blob = resource.get_version(&selector)?;
            std::io::stdout().write_all(&blob.data)?;
        }
        Command::Diff { url, from, to } => {
            let from: Selector = from.parse()?;
            let to: Selector = to.parse()?;
            let mut resource = monitor.get(&url).await?;
            print!("{}", resource.get_diff(&from, &to)?);
        }
        Command::History { url } => {
            let resource = monitor.get(&url).await?;
            for (index, record) in resource.history()?.iter().enumerate() {
                let content = record
                    .content_ref
                    .as_ref()
                    .map_or_else(|| "-".to_string(), |id| id.md5.clone());
                println!(
                    "{}\t{}\t{}\t{}",
                    index,
                    record.timestamp.to_rfc3339(),
                    record.response_code,
                    content
                );
            }
        }
        Command::LastChecked { url } => {
            let resource = monitor.get(&url).await?;
            match resource.last_checked()? {
                Some(at) => println!("{}", at.to_rfc3339()),
                None => println!("never"),
            }
        }
    }

    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(cli))
}
