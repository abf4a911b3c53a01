use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use uptime_core::checks::{CertificateInspector, CheckExecutor, CheckRunner};
use uptime_core::db::enums::{MonitorStatus, MonitorType};
use uptime_core::db::models::{CheckConfig, Monitor};
use uptime_core::db::{Fixture, MemoryStore, MonitorStore, PgStore};
use uptime_core::notifications::{CredentialResolver, JobBuilder, NotificationJob};
use uptime_core::queue::{ChannelQueue, Dispatcher, JobQueue, QueueName};
use uptime_core::version::VERSION;
use uptime_core::worker::{create_status_router, Scheduler, SchedulerOptions, StatusState, WorkerConfig};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser, Debug)]
#[command(author, version = VERSION, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scheduling loop
    Run {
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
        /// Use an in-memory store loaded from a JSON fixture instead of the database
        #[arg(long, requires = "fixture")]
        dry_run: bool,
        /// JSON fixture for --dry-run
        #[arg(long, requires = "dry_run")]
        fixture: Option<PathBuf>,
    },
    /// Probe a single target and print the result
    Probe {
        #[arg(long = "type")]
        monitor_type: MonitorType,
        #[arg(long)]
        target: String,
        #[arg(long, default_value_t = 10)]
        timeout: u32,
    },
    /// Pause a monitor
    Pause {
        #[arg(long)]
        org: i32,
        #[arg(long)]
        monitor: i32,
    },
    /// Resume a paused monitor
    Resume {
        #[arg(long)]
        org: i32,
        #[arg(long)]
        monitor: i32,
    },
    /// Acknowledge an alert
    Ack {
        #[arg(long)]
        org: i32,
        #[arg(long)]
        alert: i64,
        #[arg(long)]
        by: String,
    },
}

fn init_logging(log_dir: &str) {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily(log_dir, "worker.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    // Log to stdout: human-readable format
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sea_orm=warn,sqlx::query=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let args = Args::parse();
    let config = WorkerConfig::load(args.config.as_deref())?;
    init_logging(&config.log_dir);
    info!("Starting uptime worker, version: {}", VERSION);

    match args.command {
        Command::Run {
            once,
            dry_run,
            fixture,
        } => run(config, once, dry_run.then_some(fixture).flatten()).await,
        Command::Probe {
            monitor_type,
            target,
            timeout,
        } => probe(monitor_type, target, timeout).await,
        Command::Pause { org, monitor } => {
            let store = connect(&config).await?;
            let status = store.set_monitor_paused(org, monitor, true).await?;
            info!(organization_id = org, monitor_id = monitor, %status, "Monitor paused.");
            Ok(())
        }
        Command::Resume { org, monitor } => {
            let store = connect(&config).await?;
            let status = store.set_monitor_paused(org, monitor, false).await?;
            info!(organization_id = org, monitor_id = monitor, %status, "Monitor resumed.");
            Ok(())
        }
        Command::Ack { org, alert, by } => {
            let store = connect(&config).await?;
            let entry = store.acknowledge_alert(org, alert, &by).await?;
            println!("{}", serde_json::to_string_pretty(&entry)?);
            Ok(())
        }
    }
}

async fn connect(config: &WorkerConfig) -> Result<PgStore, BoxError> {
    Ok(PgStore::connect(config.database_url()?, config.database_max_connections).await?)
}

fn certificate_inspector() -> Option<CertificateInspector> {
    match CertificateInspector::with_native_roots() {
        Ok(inspector) => Some(inspector),
        Err(e) => {
            warn!(error = %e, "Certificate inspection disabled.");
            None
        }
    }
}

async fn probe(monitor_type: MonitorType, target: String, timeout: u32) -> Result<(), BoxError> {
    let monitor = Monitor {
        id: 0,
        organization_id: 0,
        name: target.clone(),
        monitor_type,
        target,
        frequency_seconds: 60,
        timeout_seconds: timeout,
        config: CheckConfig::default(),
        status: MonitorStatus::Pending,
        streak: Default::default(),
        next_check_at: None,
        last_checked_at: None,
    };
    let executor = CheckExecutor::new(certificate_inspector())?;
    let result = executor.run(&monitor).await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// Stands in for the external senders: logs every job that reaches a queue.
fn spawn_log_consumer(name: QueueName, mut receiver: mpsc::Receiver<NotificationJob>) {
    tokio::spawn(async move {
        while let Some(job) = receiver.recv().await {
            let meta = job.meta();
            info!(
                queue = %name,
                job_id = %meta.job_id,
                alert_history_id = meta.alert_history_id,
                channel_id = meta.channel_id,
                channel_type = %meta.channel_type,
                monitor_id = meta.monitor_id,
                "Notification job consumed."
            );
        }
        info!(queue = %name, "Queue consumer stopped.");
    });
}

async fn run(config: WorkerConfig, once: bool, fixture: Option<PathBuf>) -> Result<(), BoxError> {
    let store: Arc<dyn MonitorStore> = match fixture {
        Some(path) => {
            info!(fixture = %path.display(), "Running against in-memory fixture.");
            Arc::new(MemoryStore::from_fixture(Fixture::load(&path)?))
        }
        None => Arc::new(connect(&config).await?),
    };

    let encryption = config.encryption_service()?.map(Arc::new);
    if encryption.is_none() {
        warn!("NOTIFICATION_ENCRYPTION_KEY is not set; encrypted secrets cannot be resolved.");
    }

    let mut dispatcher = Dispatcher::new();
    for name in &config.provisioned_queues {
        let (queue, receiver) =
            ChannelQueue::new(*name, config.queue_capacity, config.enqueue_timeout());
        dispatcher.register(Arc::new(queue) as Arc<dyn JobQueue>);
        spawn_log_consumer(*name, receiver);
    }
    let dispatcher = Arc::new(dispatcher);

    let scheduler = Scheduler::new(
        store.clone(),
        Arc::new(CheckExecutor::new(certificate_inspector())?),
        Arc::new(CredentialResolver::new(store, encryption.clone())),
        Arc::new(JobBuilder::new(config.dashboard_url.clone(), encryption)?),
        dispatcher.clone(),
        SchedulerOptions::from(&config),
    );

    if once {
        let report = scheduler.run_once().await;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let http_task = match config.http_listen.as_deref() {
        Some(addr) => {
            let listener = TcpListener::bind(addr).await?;
            info!("Status endpoint listening on {}", addr);
            let router = create_status_router(Arc::new(StatusState {
                scheduler: scheduler.clone(),
                dispatcher,
            }));
            let mut http_shutdown = shutdown_rx.clone();
            Some(tokio::spawn(async move {
                let served = axum::serve(listener, router)
                    .with_graceful_shutdown(async move {
                        let _ = http_shutdown.wait_for(|stop| *stop).await;
                    })
                    .await;
                if let Err(e) = served {
                    error!(error = %e, "Status endpoint failed.");
                }
            }))
        }
        None => None,
    };

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal."),
            Err(e) => error!(error = %e, "Failed to listen for shutdown signal."),
        }
        let _ = shutdown_tx.send(true);
    });

    scheduler.run(shutdown_rx).await;
    if let Some(task) = http_task {
        if let Err(e) = task.await {
            error!(error = %e, "Status endpoint task failed.");
        }
    }
    info!("Uptime worker stopped.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dry_run_and_fixture_go_together() {
        let args = Args::try_parse_from([
            "uptime-worker",
            "run",
            "--once",
            "--dry-run",
            "--fixture",
            "fixtures/demo.json",
        ])
        .unwrap();
        match args.command {
            Command::Run {
                once,
                dry_run,
                fixture,
            } => {
                assert!(once && dry_run);
                assert_eq!(fixture, Some(PathBuf::from("fixtures/demo.json")));
            }
            other => panic!("unexpected command {other:?}"),
        }

        assert!(Args::try_parse_from(["uptime-worker", "run", "--fixture", "fixtures/demo.json"]).is_err());
        assert!(Args::try_parse_from(["uptime-worker", "run", "--dry-run"]).is_err());
    }
}
