//! Retrieval Service Facade
//!
//! Axum HTTP server exposing one search endpoint and one health endpoint.

mod handlers;
mod routes;
mod signals;

pub use handlers::{AppState, ErrorResponse, HealthResponse, SearchParams, SearchResponse};
pub use routes::create_router;
pub use signals::{shutdown_signal, SignalHandler};

use crate::context::AppContext;
use crate::error::{Result, TrilaneError};
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

/// HTTP retrieval server
pub struct RetrievalService {
    state: AppState,
    collection: String,
}

impl RetrievalService {
    pub fn new(context: &AppContext) -> Self {
        Self {
            state: AppState {
                searcher: context.searcher(),
                store: context.store.clone(),
            },
            collection: context.config.collection.name.clone(),
        }
    }

    /// Refuse to serve a collection that was never indexed
    pub async fn check_collection(&self) -> Result<()> {
        if !self.state.store.collection_exists(&self.collection).await? {
            return Err(TrilaneError::Config(format!(
                "Collection '{}' does not exist. Run `trilane index` first",
                self.collection
            )));
        }
        info!("Using collection: '{}'", self.collection);
        Ok(())
    }

    /// Bind `listen_addr` and serve until `shutdown` resolves
    pub async fn run<F>(&self, listen_addr: &str, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr: SocketAddr = listen_addr.parse().map_err(|e| TrilaneError::InvalidConfigValue {
            path: "service.listen_addr".to_string(),
            message: format!("{}", e),
        })?;

        let listener = TcpListener::bind(&addr).await.map_err(|e| TrilaneError::Io {
            source: e,
            context: format!("Failed to bind HTTP server on {}", addr),
        })?;

        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.check_collection().await?;

        let app = create_router(self.state.clone());
        let local = listener.local_addr().map_err(|e| TrilaneError::Io {
            source: e,
            context: "Failed to read listener address".to_string(),
        })?;
        info!("HTTP API server listening on http://{}", local);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.await;
                info!("HTTP server shutting down");
            })
            .await
            .map_err(|e| TrilaneError::Io {
                source: e,
                context: "HTTP server error".to_string(),
            })?;

        Ok(())
    }
}
