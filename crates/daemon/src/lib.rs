// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! wfe-daemon: the long-running process that wires the engine's
//! collaborators together — state store, instance manager, executor, timer
//! scheduler, task registry and event bus — and drains the dispatch queues
//! described in §5.

pub mod admin;
pub mod handlers;
pub mod pid_guard;
pub mod protocol;
pub mod settings;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use wfe_core::SystemClock;
use wfe_engine::{InstanceManager, PluginTaskRegistry, ProcessExecutor, TimerScheduler};
use wfe_graph::BpmnParser;
use wfe_storage::{InMemoryDefinitionRepository, InMemoryInstanceRepository, WalStateStore};

use crate::handlers::EngineContext;
use crate::settings::Settings;

pub use pid_guard::{PidGuard, PidGuardError};
pub use settings::Settings as DaemonSettings;

type Engine = EngineContext<SystemClock, PluginTaskRegistry, wfe_bus::BusTimerSink>;

/// Everything [`run`] spawns and owns for the life of the process.
pub struct Daemon {
    pub settings: Settings,
    pub bus: Arc<dyn wfe_bus::EventBusClient>,
    pub store: Arc<WalStateStore>,
    pub engine: Engine,
    pub scheduler: Arc<TimerScheduler<SystemClock, wfe_bus::BusTimerSink>>,
    pub locks: Arc<wfe_bus::InstanceLocks>,
    pub admin_socket_path: PathBuf,
}

/// `<state_dir>/wfed.sock`, the socket [`admin::serve`] listens on and
/// `wfe-cli` connects to, next to `database.url`'s WAL file.
fn admin_socket_path(database_url: &str) -> PathBuf {
    let wal = wal_path(database_url);
    wal.parent().unwrap_or_else(|| std::path::Path::new(".")).join("wfed.sock")
}

/// Resolve the daemon's state directory, shared by `wfed` and `wfe-cli` so
/// both land on the same admin socket without either hardcoding the other's
/// `database.url`.
pub fn state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("WFE_STATE_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("wfe");
    }
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("/tmp")).join(".local/state/wfe")
}

/// Resolve the WAL path from `database.url`: a bare path or a `file://`
/// URL both name a location on disk, since this store has no relational
/// backend (§6 config-loading notes in the expanded spec).
fn wal_path(database_url: &str) -> PathBuf {
    PathBuf::from(database_url.strip_prefix("file://").unwrap_or(database_url))
}

/// Build every collaborator from `settings` and `parser` (the BPMN XML
/// parser is injected by the caller — see §1 "Out of scope").
pub async fn build(settings: Settings, parser: Arc<dyn BpmnParser>) -> anyhow::Result<Daemon> {
    let path = wal_path(&settings.database.url);
    let store = if path.exists() {
        Arc::new(WalStateStore::recover_from_wal(&path).await.context("replaying WAL on startup")?)
    } else {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("creating WAL directory")?;
        }
        Arc::new(WalStateStore::with_wal(
            wfe_storage::Wal::open(&path).context("opening WAL file")?,
        ))
    };

    let definitions = Arc::new(InMemoryDefinitionRepository::new());
    let instances_repo = Arc::new(InMemoryInstanceRepository::new());
    let instances = Arc::new(InstanceManager::new(
        definitions.clone(),
        instances_repo,
        store.clone() as Arc<dyn wfe_storage::StateStore>,
        SystemClock,
    ));

    let discovered = discover_plugins(&settings.process.plugin_dir);
    tracing::info!(count = discovered.len(), dir = %settings.process.plugin_dir, "discovered task plugins");
    let registry = Arc::new(PluginTaskRegistry::new(settings.process.plugin_dir.clone()));

    let bus: Arc<dyn wfe_bus::EventBusClient> = if settings.rabbitmq.url.starts_with("nats://") {
        Arc::new(
            wfe_bus::NatsEventBus::connect(wfe_bus::NatsBusConfig::new(settings.rabbitmq.url.clone()))
                .await
                .context("connecting to NATS")?,
        )
    } else {
        Arc::new(wfe_bus::InMemoryEventBus::new())
    };

    let sink = Arc::new(wfe_bus::BusTimerSink::new(bus.clone()));
    let scheduler = Arc::new(TimerScheduler::new(
        store.clone() as Arc<dyn wfe_storage::StateStore>,
        SystemClock,
        sink,
        Duration::from_secs(1),
    ));

    let executor = Arc::new(ProcessExecutor::new(
        store.clone() as Arc<dyn wfe_storage::StateStore>,
        SystemClock,
        registry,
        Duration::from_secs(settings.process.script_timeout),
        scheduler.clone(),
    ));

    let engine = EngineContext { definitions, instances, executor, parser };
    let locks = Arc::new(wfe_bus::InstanceLocks::new());
    let admin_socket_path = admin_socket_path(&settings.database.url);

    Ok(Daemon { settings, bus, store, engine, scheduler, locks, admin_socket_path })
}

/// List the plugin directory's entries without validating they are
/// executable; the task registry itself reports an unusable plugin the
/// first time a task tries to invoke it.
fn discover_plugins(plugin_dir: &str) -> Vec<String> {
    std::fs::read_dir(plugin_dir)
        .into_iter()
        .flatten()
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect()
}

/// Run both dispatch workers and the timer scheduler's poll loop until a
/// shutdown signal arrives. Collects every disconnect error from spawned
/// tasks rather than stopping at the first one, surfacing only the first
/// after every task has had a chance to wind down (§7 shutdown policy).
pub async fn run(daemon: Daemon) -> anyhow::Result<()> {
    let dispatcher = Arc::new(wfe_bus::Dispatcher::new(daemon.bus.clone(), daemon.locks.clone()));

    let process_engine = daemon.engine.clone();
    let process_dispatcher = dispatcher.clone();
    let process_execution = tokio::spawn(async move {
        process_dispatcher
            .run("process_execution", move |event| {
                let engine = process_engine.clone();
                async move { handlers::handle(&engine, event).await }
            })
            .await
    });

    let timer_engine = daemon.engine.clone();
    let timer_dispatcher = dispatcher;
    let timer_execution = tokio::spawn(async move {
        timer_dispatcher
            .run("timer_execution", move |event| {
                let engine = timer_engine.clone();
                async move { handlers::handle(&engine, event).await }
            })
            .await
    });

    let scheduler = daemon.scheduler.clone();
    let timer_poll = tokio::spawn(async move {
        scheduler.run_forever().await;
    });

    let admin_instances = daemon.engine.instances.clone();
    let admin_socket_path = daemon.admin_socket_path.clone();
    let admin = tokio::spawn(async move {
        if let Err(e) = admin::serve(&admin_socket_path, admin_instances).await {
            tracing::error!(error = %e, "admin listener exited");
        }
    });

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("installing SIGTERM handler")?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
        .context("installing SIGINT handler")?;

    tokio::select! {
        _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => tracing::info!("received SIGINT, shutting down"),
    }

    process_execution.abort();
    timer_execution.abort();
    timer_poll.abort();
    admin.abort();
    let _ = std::fs::remove_file(&daemon.admin_socket_path);

    let mut first_error = None;
    for (name, handle) in [("process_execution", process_execution), ("timer_execution", timer_execution)] {
        match handle.await {
            Ok(Ok(())) | Err(_) => {}
            Ok(Err(e)) => {
                tracing::error!(queue = name, error = %e, "dispatch worker exited with an error");
                first_error.get_or_insert(e);
            }
        }
    }

    if let Some(e) = first_error {
        return Err(e.into());
    }
    Ok(())
}
