//! Orchestrator facade
//!
//! Wraps the supervisor, the broadcast hub and the video library behind
//! one interface. Every call runs directly against the component it
//! wraps. Button presses are the exception: they go through a short queue
//! so the polling loop never waits on a restart.

use super::status::StatusMessage;
use crate::broadcast::{BroadcastHub, SubscriberId, Subscription};
use crate::hardware::{DebounceMonitor, DebounceSettings, EdgeHandler, InputSource};
use crate::library::VideoLibrary;
use crate::stream::{StreamStatus, StreamSupervisor, SupervisorEvent};
use crate::utils::AppResult;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Button presses queued behind a toggle that is still running
const PENDING_PRESSES: usize = 2;

/// Coordinates stream transitions and their announcements
pub struct Orchestrator {
    supervisor: StreamSupervisor,
    hub: BroadcastHub,
    library: VideoLibrary,
}

impl Orchestrator {
    pub fn new(supervisor: StreamSupervisor, hub: BroadcastHub, library: VideoLibrary) -> Self {
        Self {
            supervisor,
            hub,
            library,
        }
    }

    /// Start the stream and announce it
    ///
    /// The encoder lives as long as `scope`, not as long as the caller.
    pub async fn request_start(&self, scope: &CancellationToken) -> AppResult<()> {
        tracing::info!("Facade: Starting stream");
        if let Err(e) = self.supervisor.start(scope).await {
            tracing::error!("Facade: Failed to start stream: {}", e);
            return Err(e.into());
        }
        self.broadcast(&StatusMessage::started());
        Ok(())
    }

    /// Stop the stream and announce it
    pub fn request_stop(&self) -> AppResult<()> {
        tracing::info!("Facade: Stopping stream");
        if let Err(e) = self.supervisor.stop() {
            tracing::error!("Facade: Failed to stop stream: {}", e);
            return Err(e.into());
        }
        self.broadcast(&StatusMessage::stopped());
        Ok(())
    }

    /// Flip the stream state
    ///
    /// Check-then-act without extra locking: a concurrent HTTP request can
    /// slip in between, in which case both calls succeed in turn.
    pub async fn toggle(&self, scope: &CancellationToken) -> AppResult<()> {
        if self.is_streaming() {
            self.request_stop()
        } else {
            self.request_start(scope).await
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.supervisor.is_running()
    }

    pub fn stream_status(&self) -> StreamStatus {
        self.supervisor.status()
    }

    /// Directory the encoder writes the live playlist into
    pub fn live_dir(&self) -> PathBuf {
        self.supervisor
            .playlist()
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_default()
    }

    pub fn list_videos(&self) -> AppResult<Vec<String>> {
        tracing::info!("Facade: Listing videos");
        Ok(self.library.list()?)
    }

    /// Open a recording for serving
    pub async fn open_video(&self, name: &str) -> AppResult<tokio::fs::File> {
        tracing::info!("Facade: Serving video {}", name);
        let path = self.library.resolve(name)?;
        Ok(tokio::fs::File::open(path).await?)
    }

    pub fn subscribe(&self) -> Subscription {
        self.hub.subscribe()
    }

    pub fn unsubscribe(&self, id: &SubscriberId) -> bool {
        self.hub.unsubscribe(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.hub.subscriber_count()
    }

    /// Send a status message to all subscribers
    pub fn broadcast(&self, message: &StatusMessage) -> usize {
        match serde_json::to_string(message) {
            Ok(json) => {
                tracing::info!("Facade: Broadcasting message: {}", message.message);
                self.hub.publish(&json)
            }
            Err(e) => {
                tracing::error!("Facade: Failed to serialize status message: {}", e);
                0
            }
        }
    }

    /// Announce encoder deaths nobody asked for
    pub fn forward_process_exits(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let orchestrator = Arc::clone(self);
        let mut events = self.supervisor.subscribe();

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = events.recv() => event,
                };

                match event {
                    Ok(SupervisorEvent::Exited {
                        generation,
                        code,
                        requested: false,
                    }) => {
                        tracing::warn!("Facade: Encoder {} exited on its own", generation);
                        let streaming = orchestrator.is_streaming();
                        orchestrator.broadcast(&StatusMessage::exited(code, streaming));
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Facade: Missed {} supervisor events", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// Poll the toggle button until `scope` is cancelled
    pub fn spawn_button_monitor<S>(
        self: &Arc<Self>,
        source: S,
        settings: DebounceSettings,
        scope: CancellationToken,
    ) -> JoinHandle<u64>
    where
        S: InputSource + 'static,
    {
        tracing::info!("Facade: Starting button monitoring");
        let (presses, mut pending) = mpsc::channel::<()>(PENDING_PRESSES);

        // Presses are applied one at a time, off the polling loop
        let orchestrator = Arc::clone(self);
        let toggle_scope = scope.clone();
        tokio::spawn(async move {
            while pending.recv().await.is_some() {
                if toggle_scope.is_cancelled() {
                    break;
                }
                if let Err(e) = orchestrator.toggle(&toggle_scope).await {
                    tracing::error!("Facade: Error toggling stream via button: {}", e);
                }
            }
        });

        let handler = Arc::new(ButtonToggle { presses });
        DebounceMonitor::new(source, handler, settings).spawn(scope)
    }

    /// Stop the encoder and wait for it to be reaped
    pub async fn shutdown(&self, timeout: Duration) {
        self.supervisor.shutdown(timeout).await;
    }
}

/// Button handler that queues a stream toggle
pub struct ButtonToggle {
    presses: mpsc::Sender<()>,
}

impl EdgeHandler for ButtonToggle {
    fn on_press(&self) {
        match self.presses.try_send(()) {
            Ok(()) => {}
            Err(TrySendError::Full(())) => {
                tracing::warn!("Facade: Toggle still in progress, ignoring button press");
            }
            Err(TrySendError::Closed(())) => {
                tracing::warn!("Facade: Toggle worker gone, ignoring button press");
            }
        }
    }
}
