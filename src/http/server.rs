//! HTTP server implementation.

use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::service::{router, AppState};
use crate::error::{HubgateError, Result};

/// HTTP server hosting the event stream and publish endpoints.
pub struct HttpServer {
    /// Bound listener
    listener: TcpListener,
    /// Handler state
    state: AppState,
}

impl HttpServer {
    /// Bind to `addr`. Port 0 picks an ephemeral port.
    pub async fn bind(addr: SocketAddr, state: AppState) -> Result<Self> {
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            error!(addr = %addr, error = %e, "Failed to bind HTTP listener");
            HubgateError::Io(e)
        })?;

        Ok(Self { listener, state })
    }

    /// The address actually bound.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until `signal` resolves, then drain open connections.
    ///
    /// Long-lived event streams only end once their channels are closed,
    /// so the signal should close the broadcaster's subscribers before
    /// resolving.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.local_addr()?;
        info!(addr = %addr, "Starting HTTP server");

        let app = router(self.state).into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(self.listener, app)
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server failed");
                HubgateError::Io(e)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::Broadcaster;
    use crate::config::HubgateConfig;
    use crate::ratelimit::RateLimiter;
    use std::sync::Arc;

    fn test_state() -> AppState {
        AppState::new(
            Arc::new(RateLimiter::new()),
            Broadcaster::new(),
            &HubgateConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let server = HttpServer::bind("127.0.0.1:0".parse().unwrap(), test_state())
            .await
            .unwrap();
        assert_ne!(server.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_signal_stops_server() {
        let server = HttpServer::bind("127.0.0.1:0".parse().unwrap(), test_state())
            .await
            .unwrap();

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            server.serve_with_shutdown(async {}),
        )
        .await;
        assert!(matches!(result, Ok(Ok(()))));
    }
}
