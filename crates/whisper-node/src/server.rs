//! Ledger node server

use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

use whisper_core::clock::SystemClock;
use whisper_core::sqlite_store::SqliteStore;
use whisper_core::{InMemoryStore, Ledger, RecordStore};

use crate::api::{create_router, ApiState};
use crate::config::ServerConfig;

/// Ledger node server
pub struct WhisperNode {
    config: ServerConfig,
    ledger: Arc<Ledger>,
}

impl WhisperNode {
    /// Open the record store and build the ledger.
    pub fn new(config: ServerConfig) -> Result<Self> {
        let store: Arc<dyn RecordStore> = match &config.database_path {
            Some(path) => {
                info!("Opening ledger database at {}", path.display());
                Arc::new(SqliteStore::new(path)?)
            }
            None => {
                info!("No database_path configured, keeping records in memory");
                Arc::new(InMemoryStore::new())
            }
        };

        let ledger = Arc::new(Ledger::new(store, Arc::new(SystemClock), config.ledger_config()));

        Ok(Self { config, ledger })
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// HTTP application with tracing middleware.
    pub fn router(&self) -> Router {
        create_router(ApiState {
            ledger: self.ledger.clone(),
        })
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
    }

    /// Bind the configured address and serve until Ctrl-C.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.listen_addr).await?;
        info!("HTTP server listening on {}", listener.local_addr()?);
        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    pub async fn serve(
        &self,
        listener: TcpListener,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;
        info!("Ledger node stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
