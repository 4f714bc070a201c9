//! polyrun HTTP and WebSocket server.
//!
//! # Architecture
//!
//! The server consists of:
//! - **Routes**: buffered execution, streaming over `/ws`, templates,
//!   toolchain info and snippet sharing
//! - **Protocol**: request, response and stream message types
//! - **Share**: pluggable snippet storage
//!
//! State is built explicitly in [`Server::bind`] and injected into the
//! handlers; there are no process-wide singletons.

pub mod error;
pub mod protocol;
pub mod routes;
pub mod share;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use polyrun_core::{ExecutionConfig, Orchestrator};
use tokio::net::TcpListener;

pub use error::{ServerError, ServerResult};
pub use protocol::{ClientMessage, ServerMessage};
pub use routes::{AppState, create_router};
pub use share::{InMemorySnippetStore, SnippetStore};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on. `0` picks a free port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// A bound server, ready to run.
pub struct Server {
    listener: TcpListener,
    router: Router,
    addr: SocketAddr,
}

impl Server {
    /// Bind the listener with an in-memory snippet store.
    pub async fn bind(config: &ServerConfig, orchestrator: Arc<Orchestrator>) -> ServerResult<Self> {
        Self::bind_with_store(config, orchestrator, Arc::new(InMemorySnippetStore::new())).await
    }

    /// Bind the listener with the given snippet store.
    pub async fn bind_with_store(
        config: &ServerConfig,
        orchestrator: Arc<Orchestrator>,
        snippets: Arc<dyn SnippetStore>,
    ) -> ServerResult<Self> {
        let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
        let addr = listener.local_addr()?;

        let state = Arc::new(AppState {
            orchestrator,
            snippets,
        });

        Ok(Self {
            listener,
            router: create_router(state),
            addr,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serve until `shutdown` resolves.
    pub async fn run<F>(self, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::info!("Starting polyrun server at http://{}", self.addr);
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;
        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

/// Start the server and run it until Ctrl+C.
pub async fn serve(config: ServerConfig, execution: ExecutionConfig) -> ServerResult<()> {
    let orchestrator = Arc::new(Orchestrator::new(execution));
    let server = Server::bind(&config, orchestrator).await?;

    server
        .run(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received shutdown signal");
            }
        })
        .await
}
