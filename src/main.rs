use anyhow::{Context as _, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::info;

use taskhub::config::DaemonConfig;
use taskhub::notify::channel::{ChannelSender, EmailSender, InAppSender, SmsSender};
use taskhub::queue::worker::run_delivery_worker;
use taskhub::rest::start_rest_server;
use taskhub::storage::Storage;
use taskhub::{jobs, AppContext};

#[derive(Parser)]
#[command(
    name = "taskhubd",
    about = "taskhub — task mutation engine and notification fan-out daemon",
    version
)]
struct Args {
    /// Data directory for config and the SQLite database
    #[arg(long, env = "TASKHUB_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,

    /// HTTP server port (overrides config.toml)
    #[arg(long, env = "TASKHUB_PORT")]
    port: Option<u16>,

    /// Bind address (default: 127.0.0.1; use 0.0.0.0 for LAN access)
    #[arg(long, env = "TASKHUB_BIND")]
    bind_address: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "TASKHUB_LOG")]
    log: Option<String>,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "TASKHUB_LOG_FILE")]
    log_file: Option<std::path::PathBuf>,
}

fn init_tracing(level: Option<&str>, log_file: Option<&std::path::Path>) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.unwrap_or("info")));

    match log_file {
        Some(path) => {
            let dir = path.parent().unwrap_or(std::path::Path::new("."));
            let file = path
                .file_name()
                .map(|f| f.to_string_lossy().to_string())
                .unwrap_or_else(|| "taskhubd.log".to_string());
            let appender = tracing_appender::rolling::daily(dir, file);
            fmt().with_env_filter(filter).with_writer(appender).init();
        }
        None => fmt().with_env_filter(filter).init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log.as_deref(), args.log_file.as_deref());

    let data_dir = args.data_dir.unwrap_or_else(|| {
        dirs_fallback().join(".taskhub")
    });

    let mut config = DaemonConfig::load(&data_dir);
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(bind) = args.bind_address {
        config.server.bind_address = bind;
    }

    let storage = Storage::new_with_slow_query(
        &data_dir,
        config.observability.slow_query_threshold_ms,
    )
    .await
    .context("failed to open storage")?;

    let ctx = Arc::new(AppContext::new(config, storage));
    info!(data_dir = %data_dir.display(), "taskhubd starting");

    // Channel senders. In-app always; email/SMS only when configured —
    // unconfigured channels are never enqueued by the dispatcher.
    let pool = ctx.storage.pool();
    let mut senders: Vec<Box<dyn ChannelSender>> = vec![Box::new(InAppSender::new(pool))];
    if ctx.config.email.enabled() {
        senders.push(Box::new(EmailSender::new(
            ctx.config.email.api_url.clone(),
            ctx.config.email.api_key.clone(),
            ctx.config.email.from_address.clone(),
        )));
        info!("email channel enabled");
    }
    if ctx.config.sms.enabled() {
        senders.push(Box::new(SmsSender::new(
            ctx.config.sms.api_url.clone(),
            ctx.config.sms.api_key.clone(),
            ctx.config.sms.sender_id.clone(),
        )));
        info!("sms channel enabled");
    }
    let senders = Arc::new(senders);

    // Delivery workers + maintenance jobs.
    let poll = Duration::from_millis(ctx.config.delivery.poll_interval_ms.max(100));
    for worker_id in 0..ctx.config.delivery.workers.max(1) {
        tokio::spawn(run_delivery_worker(
            ctx.queue.clone(),
            senders.clone(),
            worker_id,
            poll,
        ));
    }
    tokio::spawn(jobs::run_queue_janitor(
        ctx.queue.clone(),
        ctx.config.delivery.clean_after_hours,
    ));
    tokio::spawn(jobs::run_activity_pruner(
        ctx.activity.clone(),
        ctx.config.retention.activity_days,
    ));

    start_rest_server(ctx).await
}

/// Home directory, or cwd when the environment is too bare to tell.
fn dirs_fallback() -> std::path::PathBuf {
    std::env::var_os("HOME")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|| std::path::PathBuf::from("."))
}
