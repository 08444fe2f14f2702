//! Message-passing front end for [`MmuMonitor`].
//!
//! [`MonitorService`] owns the monitor and drains one request channel, so
//! firmware lines, commands, API calls, and prompt timer expiries are all
//! processed by a single consumer in arrival order.

use std::collections::HashSet;
use std::time::Duration;

use mmu_shared::{Config, MmuState, PrinterControl};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::dispatch::EventDispatcher;
use crate::interceptor::CommandDecision;
use crate::monitor::{Lifecycle, MmuMonitor, MonitorError};
use crate::prompt::PromptTimer;

/// A request for the monitor task.
#[derive(Debug)]
pub enum MonitorRequest {
    LineReceived(String),
    CommandQueued {
        command: String,
        tags: HashSet<String>,
        respond_to: oneshot::Sender<CommandDecision>,
    },
    CommandSent(String),
    FirmwareInfo(String),
    Lifecycle(Lifecycle),
    /// Operator choice from the API; `-1` skips.
    Select {
        choice: i64,
        respond_to: oneshot::Sender<Result<(), MonitorError>>,
    },
    StartPrompt {
        respond_to: oneshot::Sender<Result<Uuid, MonitorError>>,
    },
    PromptExpired { session: Uuid },
    UpdateConfig(Config),
    Refresh,
    Snapshot {
        respond_to: oneshot::Sender<MonitorSnapshot>,
    },
}

/// State as seen by an API caller.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSnapshot {
    pub mmu: MmuState,
    pub prompt_active: bool,
}

/// Prompt deadline as a task that posts back into the request channel.
///
/// Holds only a weak sender; a pending deadline keeps the channel open
/// until it fires or is cancelled.
pub struct ChannelPromptTimer {
    requests: mpsc::WeakSender<MonitorRequest>,
    pending: Option<JoinHandle<()>>,
}

impl ChannelPromptTimer {
    pub fn new(requests: mpsc::WeakSender<MonitorRequest>) -> Self {
        Self { requests, pending: None }
    }
}

impl PromptTimer for ChannelPromptTimer {
    fn arm(&mut self, session: Uuid, after: Duration) {
        self.cancel();
        let Some(requests) = self.requests.upgrade() else {
            tracing::debug!("No senders left, prompt {} will not expire", session);
            return;
        };
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if requests.send(MonitorRequest::PromptExpired { session }).await.is_err() {
                tracing::debug!("Monitor stopped before prompt {} expired", session);
            }
        }));
    }

    fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}

impl Drop for ChannelPromptTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Cloneable handle for feeding the monitor task.
#[derive(Debug, Clone)]
pub struct MonitorHandle {
    requests: mpsc::Sender<MonitorRequest>,
}

impl MonitorHandle {
    async fn send(&self, request: MonitorRequest) -> Result<(), MonitorError> {
        self.requests.send(request).await.map_err(|_| MonitorError::ChannelClosed)
    }

    pub async fn line_received(&self, line: impl Into<String>) -> Result<(), MonitorError> {
        self.send(MonitorRequest::LineReceived(line.into())).await
    }

    pub async fn command_queued(
        &self,
        command: impl Into<String>,
        tags: HashSet<String>,
    ) -> Result<CommandDecision, MonitorError> {
        let (respond_to, response) = oneshot::channel();
        self.send(MonitorRequest::CommandQueued {
            command: command.into(),
            tags,
            respond_to,
        })
        .await?;
        response.await.map_err(|_| MonitorError::ChannelClosed)
    }

    pub async fn command_sent(&self, command: impl Into<String>) -> Result<(), MonitorError> {
        self.send(MonitorRequest::CommandSent(command.into())).await
    }

    pub async fn firmware_info(&self, machine_type: impl Into<String>) -> Result<(), MonitorError> {
        self.send(MonitorRequest::FirmwareInfo(machine_type.into())).await
    }

    pub async fn lifecycle(&self, event: Lifecycle) -> Result<(), MonitorError> {
        self.send(MonitorRequest::Lifecycle(event)).await
    }

    pub async fn select(&self, choice: i64) -> Result<(), MonitorError> {
        let (respond_to, response) = oneshot::channel();
        self.send(MonitorRequest::Select { choice, respond_to }).await?;
        response.await.map_err(|_| MonitorError::ChannelClosed)?
    }

    pub async fn start_prompt(&self) -> Result<Uuid, MonitorError> {
        let (respond_to, response) = oneshot::channel();
        self.send(MonitorRequest::StartPrompt { respond_to }).await?;
        response.await.map_err(|_| MonitorError::ChannelClosed)?
    }

    pub async fn update_config(&self, config: Config) -> Result<(), MonitorError> {
        self.send(MonitorRequest::UpdateConfig(config)).await
    }

    pub async fn refresh(&self) -> Result<(), MonitorError> {
        self.send(MonitorRequest::Refresh).await
    }

    pub async fn snapshot(&self) -> Result<MonitorSnapshot, MonitorError> {
        let (respond_to, response) = oneshot::channel();
        self.send(MonitorRequest::Snapshot { respond_to }).await?;
        response.await.map_err(|_| MonitorError::ChannelClosed)
    }
}

pub struct MonitorService<P: PrinterControl> {
    monitor: MmuMonitor<P, ChannelPromptTimer>,
    requests: mpsc::Receiver<MonitorRequest>,
}

impl<P: PrinterControl> MonitorService<P> {
    /// Builds the service and the handle that feeds it. Must be called
    /// inside a Tokio runtime, since prompt timers are spawned tasks.
    pub fn new(config: Config, printer: P, dispatcher: EventDispatcher, buffer: usize) -> (Self, MonitorHandle) {
        let (sender, requests) = mpsc::channel(buffer);
        let timer = ChannelPromptTimer::new(sender.downgrade());
        let monitor = MmuMonitor::new(config, printer, timer, dispatcher);
        (Self { monitor, requests }, MonitorHandle { requests: sender })
    }

    pub fn monitor(&self) -> &MmuMonitor<P, ChannelPromptTimer> {
        &self.monitor
    }

    fn handle(&mut self, request: MonitorRequest) {
        match request {
            MonitorRequest::LineReceived(line) => self.monitor.handle_line(&line),
            MonitorRequest::CommandQueued { command, tags, respond_to } => {
                let decision = self.monitor.handle_command(&command, &tags);
                let _ = respond_to.send(decision);
            }
            MonitorRequest::CommandSent(command) => self.monitor.handle_sent(&command),
            MonitorRequest::FirmwareInfo(machine_type) => self.monitor.handle_firmware_info(&machine_type),
            MonitorRequest::Lifecycle(event) => self.monitor.handle_lifecycle(event),
            MonitorRequest::Select { choice, respond_to } => {
                let _ = respond_to.send(self.monitor.select(choice));
            }
            MonitorRequest::StartPrompt { respond_to } => {
                let _ = respond_to.send(self.monitor.start_prompt());
            }
            MonitorRequest::PromptExpired { session } => self.monitor.prompt_expired(session),
            MonitorRequest::UpdateConfig(config) => self.monitor.update_config(config),
            MonitorRequest::Refresh => self.monitor.refresh(),
            MonitorRequest::Snapshot { respond_to } => {
                let _ = respond_to.send(MonitorSnapshot {
                    mmu: self.monitor.state().clone(),
                    prompt_active: self.monitor.prompt_active(),
                });
            }
        }
    }

    /// Processes requests until every [`MonitorHandle`] is dropped.
    ///
    /// A pending prompt deadline counts as a sender, so an open prompt still
    /// times out after the last handle is gone.
    pub async fn run(mut self) -> MmuMonitor<P, ChannelPromptTimer> {
        tracing::info!("MMU monitor running");
        while let Some(request) = self.requests.recv().await {
            self.handle(request);
        }
        tracing::info!("MMU monitor stopped");
        self.monitor
    }
}
