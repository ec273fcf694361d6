use tokio::sync::watch;

/// Coordinates a graceful shutdown of all services.
///
/// Services obtain a [`ShutdownHandle`] and poll it at points where stopping is safe. The
/// controller triggers the shutdown on `SIGINT` or `SIGTERM`, or when [`shutdown`](Self::shutdown)
/// is called.
#[derive(Debug)]
pub struct Controller {
    sender: watch::Sender<bool>,
}

impl Controller {
    /// Creates a controller that has not been shut down.
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender }
    }

    /// Returns a handle that is notified when shutdown starts.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            receiver: self.sender.subscribe(),
        }
    }

    /// Notifies all handles to shut down.
    pub fn shutdown(&self) {
        self.sender.send_replace(true);
    }

    /// Waits for a termination signal, then shuts down.
    pub async fn shutdown_on_signal(&self) {
        wait_for_signal().await;
        relaydelay_log::info!("received termination signal, shutting down");
        self.shutdown();
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}

/// Receives the shutdown notification of a [`Controller`].
#[derive(Clone, Debug)]
pub struct ShutdownHandle {
    receiver: watch::Receiver<bool>,
}

impl ShutdownHandle {
    /// Returns `true` once shutdown has started.
    pub fn is_shutting_down(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once shutdown has started.
    ///
    /// Resolves immediately if shutdown started before. If the controller is dropped without
    /// shutting down, this never resolves.
    pub async fn notified(&mut self) {
        if self.receiver.wait_for(|&shutdown| shutdown).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let (Ok(mut sigint), Ok(mut sigterm)) = (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
    ) else {
        relaydelay_log::error!("failed to install signal handlers");
        return std::future::pending().await;
    };

    tokio::select! {
        _ = sigint.recv() => (),
        _ = sigterm.recv() => (),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        relaydelay_log::error!("failed to install signal handlers");
        std::future::pending::<()>().await;
    }
}
