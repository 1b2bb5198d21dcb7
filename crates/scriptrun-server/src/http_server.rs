//! HTTP server for the script endpoint
//!
//! Uses hyper's HTTP/1.1 server. Each accepted connection gets its own tokio
//! task; requests on it are handed to the [`Router`].
//!
//! # Example
//!
//! ```no_run
//! use scriptrun_server::{HttpServer, ScriptRunner, ServerConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let runner = ScriptRunner::new(ServerConfig::new().with_scripts_dir("scripts")).unwrap();
//!     let server = HttpServer::new(Arc::new(runner));
//!     server.run("127.0.0.1:8000".parse().unwrap()).await.unwrap();
//! }
//! ```

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use scriptrun_common::{Result, ScriptrunError};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::http_router::Router;
use crate::response::HyperResponse;
use crate::runner::ScriptRunner;

/// HTTP server in front of a [`ScriptRunner`].
pub struct HttpServer {
    router: Arc<Router>,
}

impl HttpServer {
    pub fn new(runner: Arc<ScriptRunner>) -> Self {
        Self { router: Arc::new(Router::new(runner)) }
    }

    /// Binds `addr` and serves until the task is dropped.
    pub async fn run(self, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ScriptrunError::Transport(format!("Failed to bind to {}: {}", addr, e)))?;
        self.serve(listener).await
    }

    /// Serves connections from an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let local_addr = listener
            .local_addr()
            .map_err(|e| ScriptrunError::Transport(format!("Failed to get local address: {}", e)))?;
        tracing::info!("HTTP server listening on {}", local_addr);

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!("Failed to accept connection: {}", e);
                    continue;
                }
            };

            let io = TokioIo::new(stream);
            let router = self.router.clone();

            tokio::task::spawn(async move {
                let service = service_fn(move |req| {
                    let router = router.clone();
                    async move { Self::handle_request(router, req).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    tracing::debug!("Error serving connection from {}: {}", peer, err);
                }
            });
        }
    }

    async fn handle_request(
        router: Arc<Router>,
        req: Request<Incoming>,
    ) -> std::result::Result<HyperResponse, Infallible> {
        tracing::debug!("{} {}", req.method(), req.uri());
        Ok(router.route(req).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use std::net::SocketAddr;
    use tempfile::TempDir;

    async fn start_test_server(dir: &TempDir) -> SocketAddr {
        let runner = ScriptRunner::new(ServerConfig::new().with_scripts_dir(dir.path())).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(HttpServer::new(Arc::new(runner)).serve(listener));
        addr
    }

    #[tokio::test]
    async fn test_server_answers_health() {
        let dir = TempDir::new().unwrap();
        let addr = start_test_server(&dir).await;

        let response = reqwest::get(format!("http://{}/health", addr)).await.unwrap();
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn test_run_bind_error() {
        let dir = TempDir::new().unwrap();
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap();

        let runner = ScriptRunner::new(ServerConfig::new().with_scripts_dir(dir.path())).unwrap();
        let err = HttpServer::new(Arc::new(runner)).run(addr).await.unwrap_err();
        assert!(matches!(err, ScriptrunError::Transport(_)));
    }
}
