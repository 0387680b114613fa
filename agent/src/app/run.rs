//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app::options::{AppOptions, LifecycleOptions};
use crate::app::state::AppState;
use crate::errors::AgentError;
use crate::server::serve::serve;
use crate::server::state::ServerState;
use crate::storage::identity::AgentIdentity;
use crate::workers::poller::{PollResult, RESULT_QUEUE_CAPACITY};
use crate::workers::{dispatcher, poller};

/// Run the agent until `shutdown_signal` resolves
pub async fn run(
    options: AppOptions,
    identity: AgentIdentity,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), AgentError> {
    info!("Initializing Fleet Agent...");

    // Create shutdown channel
    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone());

    if let Err(e) = init(&options, identity, &shutdown_tx, &mut shutdown_manager).await {
        error!("Failed to start agent: {}", e);
        shutdown_manager.shutdown().await?;
        return Err(e);
    }

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    drop(shutdown_tx);
    shutdown_manager.shutdown().await
}

// =============================== INITIALIZATION ================================== //

async fn init(
    options: &AppOptions,
    identity: AgentIdentity,
    shutdown_tx: &broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<Arc<AppState>, AgentError> {
    let app_state = Arc::new(AppState::init(options, identity).await?);
    let (results_tx, results_rx) = mpsc::channel::<PollResult>(RESULT_QUEUE_CAPACITY);

    if options.enable_local_server {
        init_local_server(options, app_state.clone(), shutdown_manager, shutdown_tx.subscribe())
            .await?;
    }

    init_dispatcher_worker(
        app_state.clone(),
        results_rx,
        shutdown_manager,
        shutdown_tx.subscribe(),
    )?;

    init_poller_worker(
        options.poller.clone(),
        app_state.clone(),
        results_tx,
        shutdown_manager,
        shutdown_tx.subscribe(),
    )?;

    Ok(app_state)
}

fn init_poller_worker(
    options: poller::Options,
    app_state: Arc<AppState>,
    results_tx: mpsc::Sender<PollResult>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), AgentError> {
    info!("Initializing poller worker...");

    let api = app_state.http_client.clone();
    let scheduler = app_state.scheduler.clone();

    let poller_handle = tokio::spawn(async move {
        poller::run(
            &options,
            api,
            scheduler,
            results_tx,
            tokio::time::sleep,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });

    shutdown_manager.with_poller_worker_handle(poller_handle)
}

fn init_dispatcher_worker(
    app_state: Arc<AppState>,
    results_rx: mpsc::Receiver<PollResult>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), AgentError> {
    info!("Initializing dispatcher worker...");

    let dispatcher = app_state.dispatcher();

    let dispatcher_handle = tokio::spawn(async move {
        dispatcher::run(
            dispatcher,
            results_rx,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });

    shutdown_manager.with_dispatcher_worker_handle(dispatcher_handle)
}

async fn init_local_server(
    options: &AppOptions,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), AgentError> {
    info!("Initializing local HTTP server...");

    let server_state = ServerState::new(
        app_state.identity.uuid.clone(),
        app_state.scheduler.clone(),
        app_state.flags.clone(),
        app_state.started_at,
    );

    let server_handle = serve(&options.server, Arc::new(server_state), async move {
        let _ = shutdown_rx.recv().await;
    })
    .await?;

    shutdown_manager.with_local_server_handle(server_handle)
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    lifecycle_options: LifecycleOptions,
    local_server_handle: Option<JoinHandle<Result<(), AgentError>>>,
    poller_worker_handle: Option<JoinHandle<()>>,
    dispatcher_worker_handle: Option<JoinHandle<()>>,
}

impl ShutdownManager {
    pub fn new(shutdown_tx: broadcast::Sender<()>, lifecycle_options: LifecycleOptions) -> Self {
        Self {
            shutdown_tx,
            lifecycle_options,
            local_server_handle: None,
            poller_worker_handle: None,
            dispatcher_worker_handle: None,
        }
    }

    pub fn with_poller_worker_handle(&mut self, handle: JoinHandle<()>) -> Result<(), AgentError> {
        if self.poller_worker_handle.is_some() {
            return Err(AgentError::ShutdownError("poller_handle already set".to_string()));
        }
        self.poller_worker_handle = Some(handle);
        Ok(())
    }

    pub fn with_dispatcher_worker_handle(&mut self, handle: JoinHandle<()>) -> Result<(), AgentError> {
        if self.dispatcher_worker_handle.is_some() {
            return Err(AgentError::ShutdownError("dispatcher_handle already set".to_string()));
        }
        self.dispatcher_worker_handle = Some(handle);
        Ok(())
    }

    pub fn with_local_server_handle(
        &mut self,
        handle: JoinHandle<Result<(), AgentError>>,
    ) -> Result<(), AgentError> {
        if self.local_server_handle.is_some() {
            return Err(AgentError::ShutdownError("server_handle already set".to_string()));
        }
        self.local_server_handle = Some(handle);
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), AgentError> {
        let _ = self.shutdown_tx.send(());

        match tokio::time::timeout(
            self.lifecycle_options.max_shutdown_delay,
            self.shutdown_impl(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, forcing shutdown...",
                    self.lifecycle_options.max_shutdown_delay
                );
                std::process::exit(1);
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), AgentError> {
        info!("Shutting down Fleet Agent...");

        // 1. Poller worker, so no new work arrives
        if let Some(handle) = self.poller_worker_handle.take() {
            handle.await.map_err(|e| AgentError::ShutdownError(e.to_string()))?;
        }

        // 2. Dispatcher worker, cancelling any in-flight task
        if let Some(handle) = self.dispatcher_worker_handle.take() {
            handle.await.map_err(|e| AgentError::ShutdownError(e.to_string()))?;
        }

        // 3. Local server
        if let Some(handle) = self.local_server_handle.take() {
            handle.await.map_err(|e| AgentError::ShutdownError(e.to_string()))??;
        }

        info!("Shutdown complete");
        Ok(())
    }
}
