//! Encoder process supervisor
//!
//! Owns the single long-running encoder process. Every launch gets a
//! watcher task that reaps the process and clears the session when it
//! exits, whatever the reason. Start, stop and watcher completion all
//! mutate the session under one lock.

use super::encoder::EncoderCommand;
use super::state::{StreamError, StreamResult, StreamStatus, SupervisorEvent};
use parking_lot::RwLock;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// How long the encoder gets to exit after SIGTERM by default
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);

/// Lifecycle events buffered per event subscriber
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Extra time past the grace period for the kill to be reaped
const KILL_REAP_MARGIN: Duration = Duration::from_secs(1);

/// Handle to a launched encoder process
///
/// The `Child` itself lives in the watcher task; the session only keeps
/// what it needs to identify and terminate it.
#[derive(Debug)]
struct ProcessHandle {
    generation: u64,
    pid: Option<u32>,
    terminate: CancellationToken,
    /// Cancelled by the watcher once the process has been reaped
    reaped: CancellationToken,
}

/// The stream session guarded by the supervisor lock
#[derive(Debug, Default)]
struct StreamSession {
    running: bool,
    handle: Option<ProcessHandle>,
    /// Stopped process still inside its grace period
    draining: Option<ProcessHandle>,
    launches: u64,
}

impl StreamSession {
    /// Forget the process of `generation`, wherever it is tracked
    fn release(&mut self, generation: u64) -> bool {
        if self.handle.as_ref().map(|h| h.generation) == Some(generation) {
            self.handle = None;
            self.running = false;
            true
        } else if self.draining.as_ref().map(|h| h.generation) == Some(generation) {
            self.draining = None;
            true
        } else {
            false
        }
    }
}

/// Starts, tracks and terminates the encoder
pub struct StreamSupervisor {
    command: EncoderCommand,
    stop_grace: Duration,
    session: Arc<RwLock<StreamSession>>,
    watchers: TaskTracker,
    event_tx: broadcast::Sender<SupervisorEvent>,
}

impl StreamSupervisor {
    /// Create a supervisor for the given encoder command
    pub fn new(command: EncoderCommand) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            command,
            stop_grace: DEFAULT_STOP_GRACE,
            session: Arc::new(RwLock::new(StreamSession::default())),
            watchers: TaskTracker::new(),
            event_tx,
        }
    }

    /// Override the SIGTERM grace period
    pub fn with_stop_grace(mut self, stop_grace: Duration) -> Self {
        self.stop_grace = stop_grace;
        self
    }

    /// Playlist the encoder writes
    pub fn playlist(&self) -> &Path {
        &self.command.playlist
    }

    /// Whether an encoder process is live
    pub fn is_running(&self) -> bool {
        self.session.read().running
    }

    /// OS process id of the live encoder
    pub fn pid(&self) -> Option<u32> {
        self.session.read().handle.as_ref().and_then(|h| h.pid)
    }

    /// Snapshot of the session
    pub fn status(&self) -> StreamStatus {
        let session = self.session.read();
        StreamStatus {
            running: session.running,
            pid: session.handle.as_ref().and_then(|h| h.pid),
            generation: session.handle.as_ref().map(|h| h.generation),
            playlist: self.command.playlist.clone(),
        }
    }

    /// Subscribe to process lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.event_tx.subscribe()
    }

    /// Launch the encoder unless one is already running
    ///
    /// The process is bound to a child of `scope`: cancelling the scope
    /// terminates it just like `stop` does. A process that was stopped but
    /// has not exited yet is waited for first, so two encoders never run
    /// side by side.
    pub async fn start(&self, scope: &CancellationToken) -> StreamResult<()> {
        loop {
            let (reaped, pid) = {
                let mut session = self.session.write();

                if session.running {
                    tracing::warn!("Stream already running");
                    return Ok(());
                }

                if scope.is_cancelled() {
                    return Err(StreamError::ShuttingDown);
                }

                match session.draining.as_ref() {
                    Some(draining) => (draining.reaped.clone(), draining.pid),
                    None => return self.launch(&mut session, scope),
                }
            };

            let waited = self.stop_grace + KILL_REAP_MARGIN;
            tracing::info!("Waiting for previous encoder (pid {:?}) to exit", pid);
            tokio::select! {
                _ = reaped.cancelled() => {}
                _ = scope.cancelled() => return Err(StreamError::ShuttingDown),
                _ = tokio::time::sleep(waited) => {
                    tracing::error!("Previous encoder (pid {:?}) still alive after {:?}", pid, waited);
                    return Err(StreamError::StillStopping { pid, waited });
                }
            }
        }
    }

    fn launch(&self, session: &mut StreamSession, scope: &CancellationToken) -> StreamResult<()> {
        if let Some(dir) = self.command.output_dir().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|source| StreamError::OutputDir {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        tracing::info!("Starting stream, outputting to {:?}", self.command.playlist);

        let mut child = Command::new(&self.command.program)
            .args(&self.command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| {
                tracing::error!("Failed to start {}: {}", self.command.program, source);
                StreamError::Launch {
                    program: self.command.program.clone(),
                    source,
                }
            })?;

        session.launches += 1;
        let generation = session.launches;
        let pid = child.id();
        let terminate = scope.child_token();
        let reaped = CancellationToken::new();

        if let Some(stderr) = child.stderr.take() {
            self.watchers.spawn(forward_stderr(stderr, generation));
        }
        self.watchers.spawn(watch(
            child,
            generation,
            terminate.clone(),
            reaped.clone(),
            self.stop_grace,
            Arc::clone(&self.session),
            self.event_tx.clone(),
        ));

        session.handle = Some(ProcessHandle {
            generation,
            pid,
            terminate,
            reaped,
        });
        session.running = true;

        let _ = self.event_tx.send(SupervisorEvent::Launched { generation, pid });
        tracing::info!("Encoder started (pid {:?}, generation {})", pid, generation);
        Ok(())
    }

    /// Request termination of the running encoder
    ///
    /// Returns once termination has been requested; the watcher reaps the
    /// process in the background. Until then the process stays tracked as
    /// draining and blocks the next `start`.
    pub fn stop(&self) -> StreamResult<()> {
        let mut session = self.session.write();

        let Some(handle) = session.handle.take() else {
            tracing::warn!("No active stream to stop");
            session.running = false;
            return Ok(());
        };

        tracing::info!(
            "Stopping encoder (pid {:?}, generation {})",
            handle.pid,
            handle.generation
        );
        handle.terminate.cancel();
        session.running = false;
        session.draining = Some(handle);
        Ok(())
    }

    /// Stop the encoder and wait for every watcher to finish
    pub async fn shutdown(&self, timeout: Duration) {
        if let Err(e) = self.stop() {
            tracing::error!("Failed to stop encoder during shutdown: {}", e);
        }

        self.watchers.close();
        if tokio::time::timeout(timeout, self.watchers.wait()).await.is_err() {
            tracing::warn!("Encoder watchers still running after {:?}", timeout);
        } else {
            tracing::info!("Encoder supervisor shut down");
        }
    }
}

/// Reap one encoder process and release its session slot
async fn watch(
    mut child: Child,
    generation: u64,
    terminate: CancellationToken,
    reaped: CancellationToken,
    stop_grace: Duration,
    session: Arc<RwLock<StreamSession>>,
    event_tx: broadcast::Sender<SupervisorEvent>,
) {
    let (status, requested) = tokio::select! {
        status = child.wait() => (status, false),
        _ = terminate.cancelled() => (terminate_child(&mut child, stop_grace).await, true),
    };

    let code = match &status {
        Ok(status) if status.success() => {
            tracing::info!("Encoder process exited gracefully");
            status.code()
        }
        Ok(status) if requested => {
            tracing::info!("Encoder process terminated: {}", status);
            status.code()
        }
        Ok(status) => {
            tracing::error!("Encoder process exited with error: {}", status);
            status.code()
        }
        Err(e) => {
            tracing::error!("Failed to wait for encoder process: {}", e);
            None
        }
    };

    if session.write().release(generation) {
        tracing::debug!("Stream session {} released by watcher", generation);
    }

    let _ = event_tx.send(SupervisorEvent::Exited {
        generation,
        code,
        requested,
    });
    reaped.cancel();
}

/// SIGTERM, then SIGKILL once the grace period runs out
async fn terminate_child(child: &mut Child, stop_grace: Duration) -> std::io::Result<ExitStatus> {
    request_exit(child);

    match tokio::time::timeout(stop_grace, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            tracing::warn!("Encoder still alive after {:?}, killing it", stop_grace);
            if let Err(e) = child.start_kill() {
                tracing::warn!("Failed to kill encoder: {}", e);
            }
            child.wait().await
        }
    }
}

#[cfg(unix)]
fn request_exit(child: &mut Child) {
    let Some(pid) = child.id() else {
        tracing::debug!("Encoder already reaped, nothing to signal");
        return;
    };

    // SAFETY: kill(2) has no memory-safety preconditions. The pid belongs to
    // a child we have not reaped yet, so it cannot have been recycled.
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if rc != 0 {
        tracing::warn!(
            "Failed to signal encoder {}: {}",
            pid,
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn request_exit(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        tracing::warn!("Failed to kill encoder: {}", e);
    }
}

/// Relay encoder diagnostics into the log
async fn forward_stderr(stderr: ChildStderr, generation: u64) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(target: "streambox::encoder", generation, "{}", line);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::stream::PLAYLIST_NAME;
    use tempfile::tempdir;

    fn sleeper(dir: &Path) -> EncoderCommand {
        EncoderCommand::new("sleep", ["30"], dir.join(PLAYLIST_NAME))
    }

    async fn next_exit(events: &mut broadcast::Receiver<SupervisorEvent>) -> SupervisorEvent {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match events.recv().await.unwrap() {
                    event @ SupervisorEvent::Exited { .. } => return event,
                    SupervisorEvent::Launched { .. } => continue,
                }
            }
        })
        .await
        .expect("encoder exit not observed")
    }

    async fn wait_until_stopped(supervisor: &StreamSupervisor) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while supervisor.is_running() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("supervisor still reports running");
    }

    #[tokio::test]
    async fn test_start_twice_keeps_one_process() {
        let dir = tempdir().unwrap();
        let supervisor = StreamSupervisor::new(sleeper(dir.path()));
        let scope = CancellationToken::new();

        supervisor.start(&scope).await.unwrap();
        let pid = supervisor.pid();
        assert!(pid.is_some());
        assert!(supervisor.is_running());

        supervisor.start(&scope).await.unwrap();
        assert_eq!(supervisor.pid(), pid);
        assert_eq!(supervisor.status().generation, Some(1));

        supervisor.shutdown(Duration::from_secs(5)).await;
        assert!(!supervisor.is_running());
    }

    #[tokio::test]
    async fn test_stop_when_stopped_is_noop() {
        let dir = tempdir().unwrap();
        let supervisor = StreamSupervisor::new(sleeper(dir.path()));

        supervisor.stop().unwrap();
        supervisor.stop().unwrap();
        assert!(!supervisor.is_running());
        assert_eq!(supervisor.pid(), None);
    }

    #[tokio::test]
    async fn test_stop_requests_termination() {
        let dir = tempdir().unwrap();
        let supervisor = StreamSupervisor::new(sleeper(dir.path()));
        let mut events = supervisor.subscribe();
        let scope = CancellationToken::new();

        supervisor.start(&scope).await.unwrap();
        supervisor.stop().unwrap();
        assert!(!supervisor.is_running());

        match next_exit(&mut events).await {
            SupervisorEvent::Exited {
                generation,
                requested,
                ..
            } => {
                assert_eq!(generation, 1);
                assert!(requested);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_process_exit_clears_running() {
        let dir = tempdir().unwrap();
        let supervisor =
            StreamSupervisor::new(EncoderCommand::new("true", Vec::<String>::new(), dir.path().join(PLAYLIST_NAME)));
        let mut events = supervisor.subscribe();

        supervisor.start(&CancellationToken::new()).await.unwrap();
        wait_until_stopped(&supervisor).await;

        match next_exit(&mut events).await {
            SupervisorEvent::Exited { code, requested, .. } => {
                assert_eq!(code, Some(0));
                assert!(!requested);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_launch_failure_keeps_state() {
        let dir = tempdir().unwrap();
        let supervisor = StreamSupervisor::new(EncoderCommand::new(
            "/nonexistent/encoder",
            ["-y"],
            dir.path().join(PLAYLIST_NAME),
        ));

        let result = supervisor.start(&CancellationToken::new()).await;
        assert!(matches!(result, Err(StreamError::Launch { .. })));
        assert!(!supervisor.is_running());
        assert_eq!(supervisor.status().generation, None);
    }

    #[tokio::test]
    async fn test_start_creates_output_dir() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("live").join("hls");
        let supervisor = StreamSupervisor::new(sleeper(&output));

        supervisor.start(&CancellationToken::new()).await.unwrap();
        assert!(output.is_dir());

        supervisor.shutdown(Duration::from_secs(5)).await;
    }

    #[tokio::test]
    async fn test_cancelled_scope_refuses_start() {
        let dir = tempdir().unwrap();
        let supervisor = StreamSupervisor::new(sleeper(dir.path()));
        let scope = CancellationToken::new();
        scope.cancel();

        assert!(matches!(supervisor.start(&scope).await, Err(StreamError::ShuttingDown)));
        assert!(!supervisor.is_running());
    }

    #[tokio::test]
    async fn test_scope_cancellation_terminates_process() {
        let dir = tempdir().unwrap();
        let supervisor = StreamSupervisor::new(sleeper(dir.path()));
        let mut events = supervisor.subscribe();
        let scope = CancellationToken::new();

        supervisor.start(&scope).await.unwrap();
        scope.cancel();

        assert!(matches!(
            next_exit(&mut events).await,
            SupervisorEvent::Exited { requested: true, .. }
        ));
        wait_until_stopped(&supervisor).await;
    }

    /// Encoder that takes a while to wind down after SIGTERM
    fn slow_exit(dir: &Path) -> EncoderCommand {
        EncoderCommand::new(
            "sh",
            ["-c", "trap 'sleep 0.3; exit 0' TERM; while true; do sleep 0.05; done"],
            dir.join(PLAYLIST_NAME),
        )
    }

    #[tokio::test]
    async fn test_restart_waits_for_previous_exit() {
        let dir = tempdir().unwrap();
        let supervisor = StreamSupervisor::new(slow_exit(dir.path()));
        let mut events = supervisor.subscribe();
        let scope = CancellationToken::new();

        supervisor.start(&scope).await.unwrap();
        let first = supervisor.pid().unwrap();
        // Let the shell install its trap
        tokio::time::sleep(Duration::from_millis(100)).await;

        supervisor.stop().unwrap();
        supervisor.start(&scope).await.unwrap();
        let second = supervisor.pid().unwrap();
        assert_ne!(first, second);

        // The first encoder is gone before the second one is launched
        // SAFETY: signal 0 only checks for existence
        let rc = unsafe { libc::kill(first as libc::pid_t, 0) };
        assert_eq!(rc, -1);
        let mut order = Vec::new();
        while let Ok(event) = events.try_recv() {
            order.push(event);
        }
        assert!(matches!(
            order.as_slice(),
            [
                SupervisorEvent::Launched { generation: 1, .. },
                SupervisorEvent::Exited { generation: 1, requested: true, .. },
                SupervisorEvent::Launched { generation: 2, .. },
            ]
        ));
        assert!(supervisor.is_running());
        assert_eq!(supervisor.status().generation, Some(2));

        supervisor.shutdown(Duration::from_secs(5)).await;
    }

    #[tokio::test]
    async fn test_shutdown_aborts_pending_restart() {
        let dir = tempdir().unwrap();
        let supervisor = StreamSupervisor::new(slow_exit(dir.path()));
        let scope = CancellationToken::new();

        supervisor.start(&scope).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        supervisor.stop().unwrap();

        // Shutdown while waiting for the old encoder aborts the restart
        let restart = supervisor.start(&scope);
        let cancel = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            scope.cancel();
        };
        let (result, ()) = tokio::join!(restart, cancel);
        assert!(matches!(result, Err(StreamError::ShuttingDown)));
        assert!(!supervisor.is_running());

        supervisor.shutdown(Duration::from_secs(5)).await;
    }

    #[tokio::test]
    async fn test_sigterm_ignored_falls_back_to_kill() {
        let dir = tempdir().unwrap();
        let command = EncoderCommand::new(
            "sh",
            ["-c", "trap '' TERM; exec sleep 30"],
            dir.path().join(PLAYLIST_NAME),
        );
        let supervisor = StreamSupervisor::new(command).with_stop_grace(Duration::from_millis(200));
        let mut events = supervisor.subscribe();

        supervisor.start(&CancellationToken::new()).await.unwrap();
        // Give the shell time to install the trap before signalling
        tokio::time::sleep(Duration::from_millis(100)).await;
        supervisor.stop().unwrap();

        assert!(matches!(
            next_exit(&mut events).await,
            SupervisorEvent::Exited { code: None, requested: true, .. }
        ));
    }
}
