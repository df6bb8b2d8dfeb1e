//! Prometheus scrape endpoint.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::metrics::MetricsRegistry;
use crate::server::ServerError;

pub const OPENMETRICS_CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExporterStatus {
    /// This call bound the port and spawned the endpoint
    Started(SocketAddr),
    /// The endpoint was already up, or something else holds the port
    AlreadyRunning(SocketAddr),
}

impl ExporterStatus {
    pub fn addr(&self) -> SocketAddr {
        match self {
            ExporterStatus::Started(addr) | ExporterStatus::AlreadyRunning(addr) => *addr,
        }
    }
}

struct Running {
    addr: SocketAddr,
    task: JoinHandle<()>,
}

/// Serves `GET /metrics` for a registry, starting at most once.
pub struct MetricsExporter {
    registry: Arc<MetricsRegistry>,
    running: Mutex<Option<Running>>,
}

impl MetricsExporter {
    pub fn new(registry: Arc<MetricsRegistry>) -> Self {
        Self {
            registry,
            running: Mutex::new(None),
        }
    }

    pub fn router(registry: Arc<MetricsRegistry>) -> Router {
        Router::new()
            .route("/metrics", get(metrics_handler))
            .with_state(registry)
    }

    /// Starts the endpoint on `addr` unless it is already running.
    ///
    /// "Address in use" is reported as [`ExporterStatus::AlreadyRunning`], not as an error.
    pub async fn ensure_started(&self, addr: SocketAddr) -> Result<ExporterStatus, ServerError> {
        let mut running = self.running.lock().await;
        if let Some(existing) = running.as_ref() {
            log::debug!("Metrics endpoint already running on {}", existing.addr);
            return Ok(ExporterStatus::AlreadyRunning(existing.addr));
        }

        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                log::info!("Metrics port {} already in use, assuming the endpoint is running", addr);
                return Ok(ExporterStatus::AlreadyRunning(addr));
            }
            Err(source) => return Err(ServerError::Bind { addr, source }),
        };
        let local_addr = listener.local_addr()?;

        let app = Self::router(Arc::clone(&self.registry));
        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                log::error!("Metrics endpoint stopped: {}", e);
            }
        });

        log::info!("Metrics available at http://{}/metrics", local_addr);
        *running = Some(Running { addr: local_addr, task });
        Ok(ExporterStatus::Started(local_addr))
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().await.as_ref().map(|r| r.addr)
    }

    pub async fn shutdown(&self) {
        if let Some(running) = self.running.lock().await.take() {
            running.task.abort();
            log::info!("Metrics endpoint on {} stopped", running.addr);
        }
    }
}

async fn metrics_handler(State(registry): State<Arc<MetricsRegistry>>) -> Response {
    match registry.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, OPENMETRICS_CONTENT_TYPE)],
            body,
        )
            .into_response(),
        Err(e) => {
            log::error!("{}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 0))
    }

    #[tokio::test]
    async fn test_second_start_reports_already_running() {
        let exporter = MetricsExporter::new(Arc::new(MetricsRegistry::new()));
        let first = exporter.ensure_started(loopback()).await.unwrap();
        let second = exporter.ensure_started(first.addr()).await.unwrap();

        assert!(matches!(first, ExporterStatus::Started(_)));
        assert_eq!(second, ExporterStatus::AlreadyRunning(first.addr()));
        exporter.shutdown().await;
    }

    #[tokio::test]
    async fn test_port_taken_by_someone_else() {
        let holder = std::net::TcpListener::bind(loopback()).unwrap();
        let taken = holder.local_addr().unwrap();

        let exporter = MetricsExporter::new(Arc::new(MetricsRegistry::new()));
        let status = exporter.ensure_started(taken).await.unwrap();
        assert_eq!(status, ExporterStatus::AlreadyRunning(taken));
        assert!(exporter.local_addr().await.is_none());
    }
}
