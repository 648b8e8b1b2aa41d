//! flowq CLI: run the work item consumer and operate it.

use clap::{Parser, Subcommand};
use flowq::api::{self, AppState, ControlClient};
use flowq::config::Config;
use flowq::db::Db;
use flowq::engine::{
    InMemoryReplicaStateStore, ReplicaStateStore, ScopeManager, WorkItemConsumer,
    spawn_state_recorder,
};
use flowq::processor::{ProcessorRegistry, TextWorkItem, TextWorkItemProcessor};
use flowq::producer::WorkItemProducer;
use flowq::queue::{InMemoryQueue, QueueClient};
use flowq::telemetry::{TelemetryConfig, init_telemetry};
use secrecy::ExposeSecret;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "flowq", about = "Work item queue processor")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the work item consumer and its control surface
    Serve {
        /// Create the work item queue if it does not exist
        #[arg(long)]
        create_queue: bool,
        /// Use an in-process queue and state store instead of Postgres
        #[arg(long)]
        in_memory: bool,
    },
    /// Queue operations
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },
    /// Enqueue a text work item
    Submit {
        /// Text to log when the work item is processed
        text: String,
        /// Seconds before the work item becomes visible
        #[arg(long, default_value_t = 0)]
        delay: u64,
    },
    /// Control a running processor over HTTP
    Processor {
        /// Base URL of the replica's control surface
        #[arg(long, default_value = "http://localhost:8080")]
        endpoint: String,
        #[command(subcommand)]
        action: ProcessorAction,
    },
}

#[derive(Subcommand)]
enum QueueAction {
    /// Create the configured work item queue (idempotent)
    Create,
}

#[derive(Subcommand)]
enum ProcessorAction {
    /// Resume processing
    Start,
    /// Finish the current work item, then stop
    Stop,
    /// Show the state of every replica
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            create_queue,
            in_memory,
        } => cmd_serve(create_queue, in_memory).await,
        Command::Queue {
            action: QueueAction::Create,
        } => {
            let config = Config::from_env()?;
            let db = Db::connect(config.require_database_url()?.expose_secret()).await?;
            db.migrate().await?;
            db.create_queue(&config.queue_name).await?;
            println!("Queue '{}' is ready", config.queue_name);
            Ok(())
        }
        Command::Submit { text, delay } => cmd_submit(text, delay).await,
        Command::Processor { endpoint, action } => cmd_processor(&endpoint, action).await,
    }
}

fn build_registry() -> flowq::error::Result<ProcessorRegistry> {
    ProcessorRegistry::builder()
        .register(|| TextWorkItemProcessor)
        .build()
}

async fn cmd_serve(create_queue: bool, in_memory: bool) -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "flowq".to_string(),
        replica_name: config.replica_name.clone(),
        log_level: config.log_level.clone(),
    })?;

    let (queue, state_store): (Arc<dyn QueueClient>, Arc<dyn ReplicaStateStore>) = if in_memory {
        let queue = Arc::new(InMemoryQueue::new());
        queue.create_queue(&config.queue_name).await?;
        (queue, Arc::new(InMemoryReplicaStateStore::new()))
    } else {
        let db = Db::connect(config.require_database_url()?.expose_secret()).await?;
        db.migrate().await?;
        if create_queue {
            db.create_queue(&config.queue_name).await?;
        }
        let db = Arc::new(db);
        (db.clone(), db)
    };

    let registry = Arc::new(build_registry()?);
    let scope_manager = Arc::new(ScopeManager::new(
        config.replica_name.clone(),
        config.work_on_startup,
    ));

    let cancel = CancellationToken::new();
    let recorder = spawn_state_recorder(&scope_manager, state_store.clone(), cancel.clone());

    let listener = tokio::net::TcpListener::bind(config.control_listen_addr).await?;
    let control = tokio::spawn(api::serve(
        listener,
        AppState {
            scope_manager: Arc::clone(&scope_manager),
            state_store,
            stop_check_interval: config.stop_check_interval,
            shutdown: cancel.clone(),
        },
        cancel.clone(),
    ));

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown requested");
        shutdown.cancel();
    });

    let consumer = WorkItemConsumer::new(
        queue,
        registry,
        scope_manager,
        config.consumer_options(),
    );
    consumer.run(cancel.clone()).await?;

    cancel.cancel();
    match control.await {
        Ok(Err(e)) => error!(error = %e, "control surface failed"),
        Err(e) => error!(error = %e, "control surface task panicked"),
        Ok(Ok(())) => {}
    }
    recorder.await.ok();
    Ok(())
}

async fn cmd_submit(text: String, delay: u64) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let db = Db::connect(config.require_database_url()?.expose_secret()).await?;

    let producer = WorkItemProducer::<TextWorkItem>::new(Arc::new(db), config.queue_name.clone());
    let item = TextWorkItem::new(text);
    let receipt = producer
        .produce_delayed(&item, Duration::from_secs(delay))
        .await?;

    println!(
        "Enqueued: {} (queue: {}, msg_id: {})",
        item.id, receipt.queue_name, receipt.msg_id
    );
    Ok(())
}

async fn cmd_processor(endpoint: &str, action: ProcessorAction) -> anyhow::Result<()> {
    let client = ControlClient::new(endpoint);
    let states = match action {
        ProcessorAction::Start => client.start().await?,
        ProcessorAction::Stop => client.stop().await?,
        ProcessorAction::Status => client.status().await?,
    };

    if states.is_empty() {
        println!("No replicas reported.");
        return Ok(());
    }

    println!("{:<40}  STATE", "REPLICA");
    println!("{}", "-".repeat(52));
    for (replica, state) in &states {
        println!("{replica:<40}  {state}");
    }
    Ok(())
}
