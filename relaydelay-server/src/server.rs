use std::net::SocketAddr;

use relaydelay_log::LogError;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::{ServerError, ServiceState, ShutdownHandle, endpoints};

/// HTTP server for metrics scraping and health checks.
///
/// The server stops accepting connections once the [`ShutdownHandle`] is notified.
pub struct HttpServer {
    listener: TcpListener,
}

impl HttpServer {
    /// Binds the server to `addr`.
    pub async fn bind(addr: SocketAddr) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(ServerError::BindFailed)?;

        Ok(Self { listener })
    }

    /// Serves all endpoints on a background task.
    pub fn spawn(self, state: ServiceState, mut shutdown: ShutdownHandle) -> JoinHandle<()> {
        let Self { listener } = self;

        if let Ok(addr) = listener.local_addr() {
            relaydelay_log::info!("spawning http server");
            relaydelay_log::info!("  listening on http://{addr}/");
        }

        let app = endpoints::routes(state);
        tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown.notified().await;
                    relaydelay_log::info!("shutting down http server");
                })
                .await;

            if let Err(error) = result {
                relaydelay_log::error!("http server failed: {}", LogError(&error));
            }
        })
    }
}
