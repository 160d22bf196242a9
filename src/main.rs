use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use warden::config::WardenConfig;
use warden::dispatch::{
    delivery_channel, Delivery, Dispatcher, HandlerRegistry, MessageHandler, TransportConsumer,
};
use warden::ratelimit::{LocalCounterStore, RateLimiter, RequestContext};

/// Operation name checked before each stdin delivery is published.
const PUBLISH_OPERATION: &str = "transport.publish";

#[derive(Debug, Parser)]
#[command(name = "warden", version, about = "Admission-controlled dispatch core")]
struct Args {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(short, long)]
    config: Option<String>,

    /// Log filter, e.g. `info` or `warden=debug`
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Handler of last resort: logs every message it receives.
struct LoggingHandler;

#[async_trait]
impl MessageHandler for LoggingHandler {
    fn name(&self) -> &str {
        "logging"
    }

    fn accept(&self, _topic: &str, _payload: &str) -> bool {
        true
    }

    async fn handle(&self, payload: &str) -> anyhow::Result<()> {
        info!(payload = %payload, "Message received");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&args.log_level)?)
        .with_target(false)
        .with_thread_ids(true)
        .init();

    info!("Starting Warden");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = WardenConfig::load(args.config.as_deref())?;
    info!(
        direct_queues = ?config.transport.direct_queues,
        topics = ?config.transport.topics,
        "Configuration loaded"
    );

    // Rate limiter
    let store = Arc::new(LocalCounterStore::new());
    let rules = config.rate_limiting.load_rules()?;
    info!(operations = rules.len(), "Rate limit rules loaded");
    let rate_limiter = Arc::new(
        RateLimiter::with_store(store.clone())
            .with_resolver(config.rate_limiting.key_resolver())
            .with_rules(rules),
    );

    // Handlers are fixed before any consumer starts.
    let mut handlers = HandlerRegistry::builder();
    handlers.register_with_order(Arc::new(LoggingHandler), i32::MAX);
    let dispatcher = Dispatcher::new(Arc::new(handlers.build()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut senders: HashMap<String, mpsc::Sender<Delivery>> = HashMap::new();
    let mut consumers = Vec::new();
    for queue in &config.transport.direct_queues {
        let (tx, rx) = delivery_channel(config.transport.channel_capacity);
        let consumer = TransportConsumer::direct_queue(queue.clone(), dispatcher.clone(), rx);
        consumers.push(tokio::spawn(consumer.run(shutdown_rx.clone())));
        senders.insert(queue.clone(), tx);
    }
    for topic in &config.transport.topics {
        let (tx, rx) = delivery_channel(config.transport.channel_capacity);
        let consumer = TransportConsumer::topic(topic.clone(), dispatcher.clone(), rx);
        consumers.push(tokio::spawn(consumer.run(shutdown_rx.clone())));
        senders.insert(topic.clone(), tx);
    }

    let sweeper = tokio::spawn(sweep_counters(
        store,
        config.rate_limiting.sweep_interval(),
        shutdown_rx.clone(),
    ));
    let reader = tokio::spawn(read_stdin(senders, rate_limiter, shutdown_rx));

    shutdown_signal().await;
    shutdown_tx.send(true)?;

    reader.await?;
    sweeper.await?;
    let stats = futures::future::join_all(consumers).await;
    info!(consumers = stats.len(), "Consumers drained");

    info!("Warden stopped");
    Ok(())
}

/// Publish stdin lines of the form `source<TAB>payload` to the named consumer.
async fn read_stdin(
    senders: HashMap<String, mpsc::Sender<Delivery>>,
    rate_limiter: Arc<RateLimiter>,
    mut shutdown: watch::Receiver<bool>,
) {
    let context = RequestContext::new().with_peer_ip([127, 0, 0, 1].into());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            _ = shutdown.changed() => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) => line,
                Ok(None) => {
                    debug!("stdin closed");
                    // Keep waiting for the shutdown signal.
                    let _ = shutdown.changed().await;
                    break;
                }
                Err(err) => {
                    warn!(error = %err, "Failed to read stdin");
                    break;
                }
            },
        };

        let Some((source, payload)) = line.split_once('\t') else {
            warn!(line = %line, "Expected `source<TAB>payload`");
            continue;
        };
        let Some(sender) = senders.get(source) else {
            warn!(source = %source, "No consumer for source");
            continue;
        };

        match rate_limiter.check_operation(PUBLISH_OPERATION, &context).await {
            Ok(decision) if decision.is_allowed() => {}
            Ok(decision) => {
                warn!(source = %source, reason = ?decision.deny_reason(), "Publish rate limited");
                continue;
            }
            Err(err) => {
                warn!(error = %err, "Publish rule is invalid");
                continue;
            }
        }

        if sender
            .send(Delivery::new(payload).with_topic(source))
            .await
            .is_err()
        {
            warn!(source = %source, "Consumer stopped, dropping message");
        }
    }
}

/// Periodically drop counters whose window has ended.
async fn sweep_counters(
    store: Arc<LocalCounterStore>,
    every: std::time::Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = interval.tick() => {
                store.purge_expired();
            }
        }
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
