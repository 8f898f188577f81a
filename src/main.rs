// Argus Host Monitoring Service - Daemon
// Wires stores, probes and the four core subsystems together

use argus::alerts::{AlertEvaluator, AlertStore};
use argus::clock::SystemClock;
use argus::config;
use argus::metrics::{MetricsCollector, SysinfoProbe};
use argus::notify::{EmailChannel, InAppChannel, Notifier, SmtpMailer, TemplateRegistry};
use argus::tasks::{ExecutionRepository, RunnerRegistry, TaskScheduler, TaskStore};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() > 1 && (args[1] == "--version" || args[1] == "-v") {
        println!("argus {VERSION}");
        return Ok(());
    }
    if args.len() > 1 && (args[1] == "--help" || args[1] == "-h") {
        println!("Argus Host Monitoring Service v{VERSION}");
        println!("Usage: argus [--config <path>]");
        println!();
        println!("Options:");
        println!("  -c, --config <path>  Configuration file (YAML)");
        println!("  -h, --help           Show this help message");
        println!("  -v, --version        Show version information");
        return Ok(());
    }

    let config_path = config_path_from_args(&args);
    let config = config::load(config_path.as_deref()).await?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    if config.logging.compact {
        tracing_subscriber::fmt().with_env_filter(filter).compact().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("Starting Argus Host Monitoring Service v{VERSION}");

    let clock = Arc::new(SystemClock);
    let probe = Arc::new(SysinfoProbe::new());

    // Metrics collector: initial synchronous sample, then the periodic loop.
    let collector = Arc::new(MetricsCollector::new(
        config.collector.clone(),
        probe,
        clock.clone(),
    ));
    collector.start().await;
    info!(healthy = collector.is_healthy().await, "Metrics collector ready");

    // Alert evaluation and notification.
    let alert_store = Arc::new(AlertStore::open(config.storage.alerts_dir()).await?);
    let (evaluator, events) = AlertEvaluator::new(
        config.evaluator.clone(),
        Arc::clone(&alert_store),
        Arc::clone(&collector) as Arc<dyn argus::metrics::MetricSource>,
        clock.clone(),
    );
    let evaluator = Arc::new(evaluator);

    let notifier = Notifier::new(&config.notifier, TemplateRegistry::builtin(), clock.clone());
    notifier.register_channel(Arc::new(InAppChannel::new(config.notifier.inapp_max_size)));
    match &config.smtp {
        Some(smtp) => match SmtpMailer::new(smtp) {
            Ok(mailer) => {
                notifier.register_channel(Arc::new(EmailChannel::new(
                    Arc::new(mailer),
                    Duration::from_secs(config.notifier.send_timeout_secs),
                )));
            }
            Err(e) => error!("Email channel disabled: {e}"),
        },
        None => info!("No SMTP relay configured, email channel disabled"),
    }
    let notifier = Arc::new(notifier);

    notifier.start(events).await;
    evaluator.start().await;
    info!("Alert evaluator and notifier running");

    // Maintenance tasks.
    let task_store = Arc::new(TaskStore::open(config.storage.tasks_dir()).await?);
    let executions = Arc::new(ExecutionRepository::open(config.storage.tasks_dir()).await?);
    let runners = Arc::new(RunnerRegistry::with_builtins(Arc::clone(&collector)));
    let scheduler = Arc::new(TaskScheduler::new(
        config.scheduler.clone(),
        task_store,
        executions,
        runners,
        clock,
    ));
    scheduler.start().await;
    info!("Task scheduler running");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    // Evaluator first so the event channel closes, then the notifier drains.
    evaluator.stop().await;
    notifier.stop().await;
    scheduler.stop().await;
    collector.stop().await;

    info!("Argus stopped");
    Ok(())
}

fn config_path_from_args(args: &[String]) -> Option<PathBuf> {
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--config" || arg == "-c" {
            return iter.next().map(PathBuf::from);
        }
    }
    None
}
