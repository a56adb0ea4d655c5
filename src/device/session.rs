//! Generic device session: one worker thread per physical device.
//!
//! A session owns a [`DeviceDriver`] and talks to the rest of the system only
//! through channels: commands come in, status updates go out. The worker
//! connects with a fast-then-slow retry schedule, reconnects when the driver
//! reports a lost link, and checks its stop flag at every wait point.

use crate::actuator::ActuationParams;
use crate::config::RetryConfig;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

/// Commands queued per session before `send` reports the device as busy.
const COMMAND_QUEUE_SIZE: usize = 8;

/// How often an idle session checks its link.
const IDLE_POLL: Duration = Duration::from_secs(1);

/// Errors raised by device drivers and sessions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("connection failed: {0}")]
    ConnectFailed(String),

    #[error("connection lost: {0}")]
    ConnectionLost(String),

    #[error("command rejected: {0}")]
    CommandRejected(String),

    #[error("scan failed: {0}")]
    ScanFailed(String),

    #[error("device is busy")]
    Busy,

    #[error("session stopped")]
    Stopped,
}

/// Capabilities a concrete transport provides to a session.
pub trait DeviceDriver: Send + 'static {
    fn connect(&mut self) -> Result<(), DeviceError>;

    fn execute(&mut self, params: &ActuationParams) -> Result<(), DeviceError>;

    fn is_connected(&self) -> bool;

    fn disconnect(&mut self) {}
}

/// Discovers device addresses of one family.
pub trait DeviceScanner {
    fn scan_addresses(&self, timeout: Duration) -> Result<Vec<String>, DeviceError>;
}

/// Serializes scans and connection attempts across sessions, since radio
/// stacks misbehave when two of them interleave.
#[derive(Debug, Clone, Default)]
pub struct ScanGuard {
    lock: Arc<Mutex<()>>,
}

impl ScanGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the guard.
    pub fn run<T>(&self, f: impl FnOnce() -> T) -> T {
        let _held = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        f()
    }

    /// Scan for addresses under the guard.
    pub fn scan(
        &self,
        scanner: &dyn DeviceScanner,
        timeout: Duration,
    ) -> Result<Vec<String>, DeviceError> {
        self.run(|| scanner.scan_addresses(timeout))
    }
}

/// Messages accepted by a session worker.
#[derive(Debug, Clone)]
pub enum SessionCommand {
    Execute(ActuationParams),
    Stop,
}

/// Lifecycle notifications emitted by a session worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionStatus {
    Connecting { attempt: u32 },
    Connected,
    Disconnected { reason: String },
    CommandFailed { reason: String },
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub device_id: String,
    pub status: SessionStatus,
}

/// Handle to a running device worker.
pub struct DeviceSession {
    device_id: String,
    commands: Sender<SessionCommand>,
    running: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl DeviceSession {
    /// Start a worker thread driving `driver`.
    pub fn spawn<D: DeviceDriver>(
        device_id: impl Into<String>,
        driver: D,
        retry: RetryConfig,
        guard: ScanGuard,
        status: Sender<StatusUpdate>,
    ) -> Self {
        let device_id = device_id.into();
        let (commands, inbox) = bounded(COMMAND_QUEUE_SIZE);
        let running = Arc::new(AtomicBool::new(true));
        let connected = Arc::new(AtomicBool::new(false));

        let worker = Worker {
            device_id: device_id.clone(),
            driver,
            retry,
            guard,
            inbox,
            status,
            running: running.clone(),
            connected: connected.clone(),
        };

        let handle = thread::spawn(move || worker.run());

        Self {
            device_id,
            commands,
            running,
            connected,
            thread_handle: Some(handle),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Queue an actuation without blocking.
    pub fn send(&self, params: ActuationParams) -> Result<(), DeviceError> {
        if !self.is_running() {
            return Err(DeviceError::Stopped);
        }
        self.commands
            .try_send(SessionCommand::Execute(params))
            .map_err(|e| match e {
                TrySendError::Full(_) => DeviceError::Busy,
                TrySendError::Disconnected(_) => DeviceError::Stopped,
            })
    }

    /// Ask the worker to stop and wait for it to exit.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        // Wake the worker if it is waiting; a full queue is fine, it still
        // sees the flag within one wait interval.
        let _ = self.commands.try_send(SessionCommand::Stop);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker<D> {
    device_id: String,
    driver: D,
    retry: RetryConfig,
    guard: ScanGuard,
    inbox: Receiver<SessionCommand>,
    status: Sender<StatusUpdate>,
    running: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
}

impl<D: DeviceDriver> Worker<D> {
    fn run(mut self) {
        tracing::info!(device = %self.device_id, "Device session started");

        if self.connect_with_retries() {
            self.serve();
        }

        self.driver.disconnect();
        self.connected.store(false, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        self.emit(SessionStatus::Stopped);
        tracing::info!(device = %self.device_id, "Device session stopped");
    }

    fn serve(&mut self) {
        while self.running.load(Ordering::SeqCst) {
            match self.inbox.recv_timeout(IDLE_POLL) {
                Ok(SessionCommand::Execute(params)) => {
                    if !self.driver.is_connected() && !self.reconnect("link down before command") {
                        return;
                    }
                    if let Err(e) = self.driver.execute(&params) {
                        tracing::error!(device = %self.device_id, error = %e, "Command failed");
                        self.emit(SessionStatus::CommandFailed {
                            reason: e.to_string(),
                        });
                        if matches!(e, DeviceError::ConnectionLost(_)) && !self.reconnect(&e.to_string()) {
                            return;
                        }
                    }
                }
                Ok(SessionCommand::Stop) | Err(RecvTimeoutError::Disconnected) => return,
                Err(RecvTimeoutError::Timeout) => {
                    if !self.driver.is_connected() && !self.reconnect("link check failed") {
                        return;
                    }
                }
            }
        }
    }

    fn reconnect(&mut self, reason: &str) -> bool {
        self.connected.store(false, Ordering::SeqCst);
        tracing::warn!(device = %self.device_id, reason, "Device disconnected");
        self.emit(SessionStatus::Disconnected {
            reason: reason.to_string(),
        });
        self.connect_with_retries()
    }

    /// Connect, retrying fast then slow until connected or stopped.
    fn connect_with_retries(&mut self) -> bool {
        let mut failures: u32 = 0;

        while self.running.load(Ordering::SeqCst) {
            self.emit(SessionStatus::Connecting {
                attempt: failures + 1,
            });

            let driver = &mut self.driver;
            match self.guard.run(|| driver.connect()) {
                Ok(()) => {
                    self.connected.store(true, Ordering::SeqCst);
                    self.emit(SessionStatus::Connected);
                    tracing::info!(device = %self.device_id, "Device connected");
                    return true;
                }
                Err(e) => {
                    tracing::warn!(
                        device = %self.device_id,
                        attempt = failures + 1,
                        error = %e,
                        "Connection attempt failed"
                    );
                    let delay = self.retry.delay_after(failures);
                    failures = failures.saturating_add(1);
                    if !self.wait(delay) {
                        return false;
                    }
                }
            }
        }
        false
    }

    /// Sleep for `delay` unless stopped first. Commands arriving while the
    /// link is down are stale by the time it comes back and are dropped.
    fn wait(&mut self, delay: Duration) -> bool {
        match self.inbox.recv_timeout(delay) {
            Ok(SessionCommand::Stop) | Err(RecvTimeoutError::Disconnected) => false,
            Ok(SessionCommand::Execute(_)) => {
                self.emit(SessionStatus::CommandFailed {
                    reason: "not connected".to_string(),
                });
                self.running.load(Ordering::SeqCst)
            }
            Err(RecvTimeoutError::Timeout) => self.running.load(Ordering::SeqCst),
        }
    }

    fn emit(&self, status: SessionStatus) {
        let _ = self.status.try_send(StatusUpdate {
            device_id: self.device_id.clone(),
            status,
        });
    }
}
