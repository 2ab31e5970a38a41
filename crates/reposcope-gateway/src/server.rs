use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use tokio::sync::watch;

use crate::error::GatewayError;
use crate::router::build_router;
use crate::service::AnalyzerService;

const DEFAULT_MAX_BODY_SIZE: usize = 1024 * 1024;

#[derive(Clone)]
pub(crate) struct AppState {
    pub service: Arc<dyn AnalyzerService>,
}

/// The reposcope HTTP API bound to one address, stopped through a watch flag.
pub struct GatewayServer {
    addr: SocketAddr,
    max_body_size: usize,
    service: Arc<dyn AnalyzerService>,
    shutdown_rx: watch::Receiver<bool>,
}

/// Resolve `host:port`, falling back to loopback for hosts that are not IP literals.
fn resolve_listen_addr(host: &str, port: u16) -> SocketAddr {
    match host.parse::<IpAddr>() {
        Ok(ip) => SocketAddr::new(ip, port),
        Err(_) => {
            tracing::warn!(host, port, "bind host is not an IP address, using loopback");
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
        }
    }
}

/// Resolves once the flag reads `true`. A dropped sender never resolves,
/// so the API keeps serving until the process exits.
async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    if rx.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

impl GatewayServer {
    #[must_use]
    pub fn new(
        bind: &str,
        port: u16,
        service: Arc<dyn AnalyzerService>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        let addr = resolve_listen_addr(bind, port);
        if addr.ip().is_unspecified() {
            tracing::warn!(%addr, "repository API is exposed on every network interface");
        }
        Self {
            addr,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            service,
            shutdown_rx,
        }
    }

    #[must_use]
    pub fn with_max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Answer API requests until the shutdown flag is set, then drain
    /// in-flight requests and return.
    ///
    /// # Errors
    ///
    /// `Bind` if the address is unavailable, `Server` if axum fails while serving.
    pub async fn serve(self) -> Result<(), GatewayError> {
        let Self {
            addr,
            max_body_size,
            service,
            shutdown_rx,
        } = self;

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| GatewayError::Bind(addr.to_string(), e))?;
        let router = build_router(AppState { service }, max_body_size);
        tracing::info!(%addr, max_body_size, "repository API ready");

        axum::serve(listener, router)
            .with_graceful_shutdown(wait_for_shutdown(shutdown_rx))
            .await
            .map_err(|e| GatewayError::Server(e.to_string()))?;
        tracing::info!(%addr, "repository API stopped");
        Ok(())
    }
}
