use tokio::signal::unix::{Signal, SignalKind, signal};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::mqtt::MqttSession;

pub struct ShutdownHandler {
    sigterm: Signal,
    sigint: Signal,
}

impl ShutdownHandler {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let sigterm = signal(SignalKind::terminate())?;
        let sigint = signal(SignalKind::interrupt())?;

        Ok(ShutdownHandler { sigterm, sigint })
    }

    pub async fn wait_for_shutdown_signal(&mut self) -> ShutdownSignal {
        tokio::select! {
            _ = self.sigint.recv() => ShutdownSignal::Interrupt,
            _ = self.sigterm.recv() => ShutdownSignal::Terminate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

impl ShutdownSignal {
    pub fn description(&self) -> &'static str {
        match self {
            ShutdownSignal::Interrupt => "SIGINT (Ctrl+C) received",
            ShutdownSignal::Terminate => "SIGTERM received (likely from systemctl)",
        }
    }
}

/// Stops publishing events and closes the broker connection cleanly, so the
/// broker does not send the last will.
pub async fn perform_graceful_shutdown(session: &MqttSession, bridge: JoinHandle<()>) {
    info!("Performing graceful shutdown...");

    bridge.abort();
    debug!("Stopped event publisher");

    session.shutdown().await;

    info!("Graceful shutdown completed");
}
