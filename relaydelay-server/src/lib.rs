//! The relaydelay service.
//!
//! Two tasks run for the lifetime of the process:
//!
//!  - The [`CollectionLoop`] polls the telemetry store once per period through a
//!    [`WatermarkPoller`], extracts relay delays from all new records and records them into the
//!    [`MetricsRegistry`](relaydelay_metrics::MetricsRegistry). After each cycle it optionally
//!    pushes the registry to a push gateway.
//!  - The [`HttpServer`] exposes the registry on `/metrics` and answers health checks on
//!    `/api/health/live` and `/api/health/ready`.
//!
//! Both tasks share the registry and the [`HealthState`], and stop when the [`Controller`]
//! receives a termination signal. Use [`run`] to start the whole service.
#![warn(missing_docs)]

use std::io;
use std::sync::Arc;

use relaydelay_config::Config;
use relaydelay_metrics::{ExportError, MetricsError, MetricsRegistry, PushClient};
use relaydelay_store::{MongoStore, StoreError};

mod collector;
mod controller;
mod endpoints;
mod health;
mod poller;
mod server;

pub use self::collector::*;
pub use self::controller::*;
pub use self::endpoints::*;
pub use self::health::*;
pub use self::poller::*;
pub use self::server::*;

/// Indicates the type of failure of the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Binding failed.
    #[error("bind to interface failed")]
    BindFailed(#[source] io::Error),

    /// The async runtime could not be created.
    #[error("failed to start the runtime")]
    Runtime(#[source] io::Error),

    /// The metrics registry could not be created.
    #[error("failed to set up metrics")]
    Metrics(#[from] MetricsError),

    /// The push gateway client could not be created.
    #[error("failed to set up the push gateway client")]
    Export(#[from] ExportError),

    /// The store client could not be created.
    #[error("failed to set up the telemetry store")]
    Store(#[from] StoreError),
}

/// Runs the service until a termination signal is received.
///
/// `instance` is the grouping key for pushed metrics, usually the hostname. This blocks the
/// current thread.
pub fn run(config: Config, instance: &str) -> Result<(), ServerError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("relaydelay")
        .enable_all()
        .build()
        .map_err(ServerError::Runtime)?;

    runtime.block_on(serve(Arc::new(config), instance))
}

async fn serve(config: Arc<Config>, instance: &str) -> Result<(), ServerError> {
    let controller = Controller::new();

    let metrics = Arc::new(MetricsRegistry::from_config(&config)?);
    let health = Arc::new(HealthState::new());

    let push = match config.push_gateway().enabled {
        true => {
            let client = PushClient::from_config(&config, instance)?;
            relaydelay_log::info!("pushing metrics to {}", client.url());
            Some(client)
        }
        false => None,
    };

    let store = MongoStore::connect(&config).await?;

    let server = HttpServer::bind(config.listen_addr()).await?;
    let state = ServiceState::new(metrics.clone(), health.clone(), config.metrics_enabled());
    let server = server.spawn(state, controller.shutdown_handle());

    let collector = CollectionLoop::new(&config, Arc::new(store), metrics, health.clone(), push);
    let collector = tokio::spawn(collector.run(controller.shutdown_handle()));

    controller.shutdown_on_signal().await;
    health.set_shutting_down();

    // Both tasks only stop on shutdown, so a join error means they panicked.
    if collector.await.is_err() {
        relaydelay_log::error!("collection loop panicked");
    }
    if server.await.is_err() {
        relaydelay_log::error!("http server panicked");
    }

    relaydelay_log::info!("relaydelay stopped");
    Ok(())
}
