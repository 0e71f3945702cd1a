use anyhow::{Context, Result};
use clap::Parser;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use iris_persistence::config::{AppConfig, CliConfig, FileConfig};
use iris_persistence::{
    Action, Dispatcher, Reducer, SqliteBucketStore, SqliteDocumentStore,
};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

/// Replays a JSON-lines action log through the persistence pipeline.
#[derive(Parser, Debug)]
struct CliArgs {
    /// Directory holding the bucket and document databases.
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// Path to a TOML config file. Its values override the CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Log every dispatched action, except loading notifications.
    #[clap(long)]
    pub log_actions: bool,

    /// Action log to replay, one JSON action per line. Reads stdin when omitted.
    #[clap(value_parser = parse_path)]
    pub input: Option<PathBuf>,
}

/// Stand-in for the application state: tallies what went through the
/// pipeline and keeps the failures reported back into it.
#[derive(Default)]
struct ReplayState {
    counts: BTreeMap<&'static str, usize>,
    exceptions: Vec<String>,
    log_actions: bool,
}

impl Reducer for ReplayState {
    fn reduce(&mut self, action: &Action) {
        *self.counts.entry(action.kind()).or_default() += 1;
        match action {
            Action::HandleException {
                message,
                description,
            } => self
                .exceptions
                .push(format!("{}: {}", message, description)),
            Action::UiSet { data } => {
                if let Some(log_actions) = data.get("log_actions").and_then(|v| v.as_bool()) {
                    self.log_actions = log_actions;
                }
            }
            _ => {}
        }
    }

    fn log_actions(&self) -> bool {
        self.log_actions
    }
}

async fn replay<R: AsyncBufRead + Unpin>(
    reader: R,
    dispatcher: &mut Dispatcher<ReplayState>,
) -> Result<usize> {
    let mut lines = reader.lines();
    let mut dispatched = 0;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        dispatcher.dispatch(Action::from_json_lenient(line));
        dispatcher.drain_reports();
        dispatched += 1;
    }
    Ok(dispatched)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let cli_config = CliConfig {
        db_dir: cli_args.db_dir.clone(),
        log_actions: cli_args.log_actions,
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    info!("Opening bucket store at {:?}...", config.bucket_db_path());
    let buckets = Arc::new(SqliteBucketStore::new(config.bucket_db_path())?);
    info!("Opening document store at {:?}...", config.document_db_path());
    let documents = Arc::new(SqliteDocumentStore::new(config.document_db_path())?);

    let mut dispatcher = Dispatcher::new(
        ReplayState::default(),
        buckets,
        documents,
        config.interceptor_settings(),
    );

    let dispatched = match &cli_args.input {
        Some(path) => {
            info!("Replaying actions from {:?}", path);
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open action log {:?}", path))?;
            replay(BufReader::new(file), &mut dispatcher).await?
        }
        None => {
            info!("Replaying actions from stdin");
            replay(BufReader::new(tokio::io::stdin()), &mut dispatcher).await?
        }
    };

    info!("Waiting for background batches...");
    let state = dispatcher.shutdown().await;
    info!("Dispatched {} action(s)", dispatched);
    for (kind, count) in &state.counts {
        info!("  {}: {}", kind, count);
    }
    for exception in &state.exceptions {
        warn!("Reported failure: {}", exception);
    }

    Ok(())
}
