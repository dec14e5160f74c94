//! courier CLI - in-memory のパイプラインを動かすデモ・スモーク用コマンド
//!
//! - `submit`: 1 件投入してレスポンスを表示し、処理完了まで待つ
//! - `smoke`: N 件を並列投入 → 再投入 → 完了をポーリング → レイテンシ統計

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use courier_core::app::{App, AppBuilder, WorkerGroup};
use courier_core::config::Limits;
use courier_core::impls::{FlakyExecutor, InMemoryQueueConfig, InMemoryTaskQueue, InMemoryTaskStore};
use courier_core::observability::{self, LogFormat};

mod smoke;
mod stats;

#[derive(Parser)]
#[command(name = "courier")]
#[command(author, version, about = "Idempotent task pipeline on in-memory adapters", long_about = None)]
struct Cli {
    /// TOML file with limit overrides (flags and env win over the file)
    #[arg(long, env = "COURIER_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = LogFormatArg::Pretty, global = true)]
    log_format: LogFormatArg,

    #[command(flatten)]
    limits: LimitArgs,

    #[command(flatten)]
    runtime: RuntimeArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Pretty,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

#[derive(Args)]
struct LimitArgs {
    #[arg(long, env = "MAX_TASK_ID_LENGTH", global = true)]
    max_task_id_length: Option<usize>,

    #[arg(long, env = "MAX_PAYLOAD_SIZE_BYTES", global = true)]
    max_payload_size_bytes: Option<usize>,

    #[arg(long, env = "BASE_BACKOFF_SECONDS", global = true)]
    base_backoff_seconds: Option<u64>,

    #[arg(long, env = "MAX_BACKOFF_SECONDS", global = true)]
    max_backoff_seconds: Option<u64>,

    #[arg(long, env = "MAX_LOG_BODY_BYTES", global = true)]
    max_log_body_bytes: Option<usize>,
}

impl LimitArgs {
    fn apply(&self, mut limits: Limits) -> Limits {
        if let Some(n) = self.max_task_id_length {
            limits.max_task_id_length = n;
        }
        if let Some(n) = self.max_payload_size_bytes {
            limits.max_payload_size_bytes = n;
        }
        if let Some(n) = self.base_backoff_seconds {
            limits.base_backoff_seconds = n;
        }
        if let Some(n) = self.max_backoff_seconds {
            limits.max_backoff_seconds = n;
        }
        if let Some(n) = self.max_log_body_bytes {
            limits.max_log_body_bytes = n;
        }
        limits
    }
}

/// Substrate and worker settings for the in-memory run.
#[derive(Args)]
struct RuntimeArgs {
    /// Number of processing workers
    #[arg(long, default_value_t = 4, global = true)]
    workers: usize,

    /// Probability that the simulated work fails
    #[arg(long, default_value_t = 0.3, global = true)]
    failure_rate: f64,

    /// Seconds a received message stays hidden when nobody adjusts it
    #[arg(long, default_value_t = 30, global = true)]
    visibility_timeout_secs: u64,

    /// Deliveries before a message is diverted to the dead-letter queue
    #[arg(long, default_value_t = 5, global = true)]
    max_receive_count: u32,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit one task and wait for it to finish
    Submit {
        #[arg(long)]
        task_id: String,

        /// JSON object payload
        #[arg(long, default_value = "{}")]
        payload: String,

        #[arg(long)]
        correlation_id: Option<String>,

        /// Give up waiting after this many seconds
        #[arg(long, default_value_t = 60)]
        timeout_secs: u64,
    },

    /// Submit many tasks in parallel and report latency statistics
    Smoke {
        #[arg(long, env = "SMOKE_TASK_COUNT", default_value_t = 10)]
        count: usize,

        #[arg(long, env = "SMOKE_TIMEOUT_MS", default_value_t = 90_000)]
        timeout_ms: u64,

        #[arg(long, env = "SMOKE_INTERVAL_MS", default_value_t = 200)]
        interval_ms: u64,
    },
}

/// Handles the CLI keeps on the concrete adapters, for status reporting.
pub(crate) struct Pipeline {
    pub app: Arc<App>,
    pub store: Arc<InMemoryTaskStore>,
    pub queue: Arc<InMemoryTaskQueue>,
    pub workers: WorkerGroup,
}

fn load_limits(cli: &Cli) -> Result<Limits> {
    let base = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            Limits::from_toml_str(&text)
                .with_context(|| format!("parsing config file {}", path.display()))?
        }
        None => Limits::default(),
    };
    let limits = cli.limits.apply(base);
    limits.validate().context("invalid limits")?;
    Ok(limits)
}

fn start_pipeline(limits: Limits, runtime: &RuntimeArgs) -> Result<Pipeline> {
    let store = Arc::new(InMemoryTaskStore::new());
    let queue = Arc::new(InMemoryTaskQueue::new(InMemoryQueueConfig {
        visibility_timeout: Duration::from_secs(runtime.visibility_timeout_secs),
        max_receive_count: runtime.max_receive_count,
    }));
    let app = AppBuilder::new()
        .store(store.clone())
        .queue(queue.clone())
        .executor(Arc::new(FlakyExecutor::new(runtime.failure_rate)))
        .limits(limits)
        .build()
        .context("wiring the pipeline")?;
    let app = Arc::new(app);

    let workers = WorkerGroup::spawn(
        runtime.workers,
        queue.clone(),
        app.processing(),
        app.forensics(),
        Duration::from_millis(500),
    );

    Ok(Pipeline {
        app,
        store,
        queue,
        workers,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    observability::init_tracing(cli.log_format.into());

    let limits = load_limits(&cli)?;
    let pipeline = start_pipeline(limits, &cli.runtime)?;
    tracing::debug!(limits = ?pipeline.app.limits(), "pipeline started");

    match cli.command {
        Commands::Submit {
            task_id,
            payload,
            correlation_id,
            timeout_secs,
        } => {
            let payload: serde_json::Value =
                serde_json::from_str(&payload).context("--payload must be JSON")?;
            smoke::submit_one(
                pipeline,
                task_id,
                payload,
                correlation_id,
                Duration::from_secs(timeout_secs),
            )
            .await
        }
        Commands::Smoke {
            count,
            timeout_ms,
            interval_ms,
        } => {
            smoke::run(
                pipeline,
                count,
                Duration::from_millis(timeout_ms),
                Duration::from_millis(interval_ms),
            )
            .await
        }
    }
}
