//! Command forwarder - best-effort relay of viewer commands to the engine

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::upstream::{UpstreamClient, UpstreamError};

use super::{ControlCommand, ControlStatus};

/// Handle used by viewer sessions to submit commands.
///
/// A single worker drains the queue, so commands reach the engine in
/// submission order. Nothing is retried and no failure reaches the viewer.
#[derive(Clone)]
pub struct CommandForwarder {
    tx: mpsc::Sender<ControlCommand>,
    status: Arc<RwLock<ControlStatus>>,
}

impl CommandForwarder {
    /// Start the forwarding worker; abort the handle to stop it
    pub fn spawn(client: UpstreamClient, queue_capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let worker = tokio::spawn(run_worker(client, rx));

        let forwarder = Self {
            tx,
            status: Arc::new(RwLock::new(ControlStatus::default())),
        };
        (forwarder, worker)
    }

    /// Queue a command without waiting; dropped with a warning if the queue is full
    pub fn submit(&self, command: ControlCommand) {
        self.status.write().apply(&command);

        match self.tx.try_send(command) {
            Ok(()) => {}
            Err(TrySendError::Full(command)) => {
                warn!(command = %command.kind(), "Command queue full, dropping command");
            }
            Err(TrySendError::Closed(command)) => {
                warn!(command = %command.kind(), "Command forwarder stopped, dropping command");
            }
        }
    }

    pub fn status(&self) -> ControlStatus {
        *self.status.read()
    }
}

/// Send one command upstream, a single attempt
pub async fn forward(client: &UpstreamClient, command: &ControlCommand) -> Result<(), UpstreamError> {
    client.post_command(command).await
}

async fn run_worker(client: UpstreamClient, mut rx: mpsc::Receiver<ControlCommand>) {
    while let Some(command) = rx.recv().await {
        match forward(&client, &command).await {
            Ok(()) => debug!(command = %command.kind(), "Command forwarded"),
            Err(e) => warn!(command = %command.kind(), error = %e, "Command forward failed"),
        }
    }
    info!("Command forwarder stopped");
}
