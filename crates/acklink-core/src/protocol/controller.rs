//! Transport control
//!
//! Owns the channel lifecycle and the send/acknowledge/retry protocol.
//!
//! A command is written, then the sending thread blocks on an [`AckSignal`]
//! while the channel's inbound-data notification runs [`receive`] on another
//! thread. When a complete frame is assembled the signal is set and `send`
//! returns. Unanswered commands are re-sent until the attempt limit is hit,
//! at which point a terminal [`CommandOutcome::Timeout`] is published.
//!
//! [`receive`]: TransportController::receive

use serde::{Deserialize, Serialize};
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::channel::{Channel, Transport};
use super::{
    AckSignal, CommandOutcome, Frame, FrameAssembler, LinkConfig, PortSettings, ProtocolError,
};
use crate::event::{EventBus, SubscriptionToken};

/// Message broadcast when a command is issued on a closed channel
const NOT_OPEN_MESSAGE: &str = "Serial port is not open.";

/// Controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkState {
    /// No channel open
    Closed,
    /// Channel open, nothing outstanding
    OpenIdle,
    /// Channel open, a command is waiting for its acknowledgment
    OpenAwaitingAck,
}

/// The most recently sent command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingCommand {
    /// Bytes written on every attempt
    pub bytes: Vec<u8>,
    /// Unacknowledged attempts so far
    pub retry_count: u32,
    /// Whether a `send` is currently blocked waiting for the acknowledgment
    pub ack_pending: bool,
}

#[derive(Default)]
struct Link {
    channel: Option<Box<dyn Channel>>,
    selected: Option<String>,
}

struct Shared {
    transport: RwLock<Option<Box<dyn Transport>>>,
    link: Mutex<Link>,
    pending: Mutex<PendingCommand>,
    send_lock: Mutex<()>,
    timeout_ms: AtomicU64,
    ack: AckSignal,
    config: LinkConfig,
    outcomes: EventBus<CommandOutcome>,
    errors: EventBus<String>,
}

/// Half-duplex command controller for one physical link.
///
/// Cloning is cheap; clones share the same channel and command state, which
/// lets the inbound-data handler hold a controller of its own.
#[derive(Clone)]
pub struct TransportController {
    shared: Arc<Shared>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl TransportController {
    /// Create a controller over `transport` with the default configuration
    pub fn new<T: Transport + 'static>(transport: T) -> Self {
        Self::with_config(transport, LinkConfig::default())
    }

    /// Create a controller over `transport` with `config`
    pub fn with_config<T: Transport + 'static>(transport: T, config: LinkConfig) -> Self {
        let controller = Self::uninitialized(config);
        controller.init(transport);
        controller
    }

    /// Create a controller with no transport installed.
    ///
    /// Opening a channel fails with [`ProtocolError::NotInitialized`] until
    /// [`init`](Self::init) is called.
    pub fn uninitialized(config: LinkConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                transport: RwLock::new(None),
                link: Mutex::new(Link::default()),
                pending: Mutex::new(PendingCommand::default()),
                send_lock: Mutex::new(()),
                timeout_ms: AtomicU64::new(config.timeout_ms),
                ack: AckSignal::new(),
                config,
                outcomes: EventBus::new(),
                errors: EventBus::new(),
            }),
        }
    }

    /// Install the transport used to open channels
    pub fn init<T: Transport + 'static>(&self, transport: T) {
        *self
            .shared
            .transport
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(Box::new(transport));
    }

    /// Whether a transport is installed
    pub fn is_initialized(&self) -> bool {
        self.shared
            .transport
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Configuration this controller was built with
    pub fn config(&self) -> &LinkConfig {
        &self.shared.config
    }

    /// Bus carrying `Retry` and `Timeout` outcomes
    pub fn outcomes(&self) -> &EventBus<CommandOutcome> {
        &self.shared.outcomes
    }

    /// Register an error-notification listener
    pub fn on_error<F>(&self, handler: F) -> SubscriptionToken
    where
        F: Fn(&String) + Send + Sync + 'static,
    {
        self.shared.errors.subscribe(handler)
    }

    /// Remove an error-notification listener
    pub fn remove_error_listener(&self, token: SubscriptionToken) -> bool {
        self.shared.errors.unsubscribe(token)
    }

    fn notify_error(&self, message: impl Into<String>) {
        let message = message.into();
        error!("{}", message);
        self.shared.errors.publish(message);
    }

    /// Open a channel and register `on_data` as its inbound-data handler.
    ///
    /// Any channel already open is closed first. Open failures are broadcast
    /// to the error listeners and reset the command state; they yield
    /// `Ok(false)` rather than an error. Only a missing transport is an
    /// error.
    pub fn open_channel<H>(&self, settings: &PortSettings, on_data: H) -> Result<bool, ProtocolError>
    where
        H: Fn() + Send + Sync + 'static,
    {
        if !self.is_initialized() {
            return Err(ProtocolError::NotInitialized);
        }
        self.close_channel();

        // The guard must be gone before listeners run; they may call release()
        let opened = {
            let transport = self
                .shared
                .transport
                .read()
                .unwrap_or_else(|e| e.into_inner());
            transport
                .as_ref()
                .ok_or(ProtocolError::NotInitialized)?
                .open(settings)
        };

        match opened {
            Ok(mut channel) => {
                let mut link = lock(&self.shared.link);
                channel.set_data_received(Some(Arc::new(on_data)));
                link.channel = Some(channel);
                link.selected = Some(settings.port_name.clone());
                info!("Channel {} open", settings.port_name);
                Ok(true)
            }
            Err(e) => {
                lock(&self.shared.link).selected = None;
                self.notify_error(format!("Failed to open serial port: {}", e));
                self.reset();
                Ok(false)
            }
        }
    }

    /// Open a channel whose inbound data is fed through `assembler`.
    ///
    /// Every assembled frame acknowledges the outstanding command and is then
    /// handed to `on_frame` on the inbound-data thread.
    pub fn open_with_assembler<F>(
        &self,
        settings: &PortSettings,
        assembler: Arc<FrameAssembler>,
        on_frame: F,
    ) -> Result<bool, ProtocolError>
    where
        F: Fn(Frame) + Send + Sync + 'static,
    {
        // Weak so the channel's handler does not keep the controller alive
        let weak = Arc::downgrade(&self.shared);
        self.open_channel(settings, move || {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            let controller = TransportController { shared };
            if let Some(frame) = controller.receive(|bytes| assembler.decode(bytes)) {
                on_frame(frame);
            }
        })
    }

    /// Close the channel and unregister its inbound-data handler
    pub fn close_channel(&self) {
        // Take the channel out first: its watcher may be inside `receive`,
        // which needs the link lock to finish.
        let channel = lock(&self.shared.link).channel.take();
        if let Some(mut channel) = channel {
            channel.set_data_received(None);
            channel.close();
            info!("Channel closed");
        }
    }

    /// List the ports the transport currently sees.
    ///
    /// If the selected port has disappeared, its channel is closed and the
    /// command state reset.
    pub fn list_channels(&self) -> Result<Vec<String>, ProtocolError> {
        let names = {
            let transport = self
                .shared
                .transport
                .read()
                .unwrap_or_else(|e| e.into_inner());
            transport
                .as_ref()
                .ok_or(ProtocolError::NotInitialized)?
                .list_port_names()?
        };

        let selected = lock(&self.shared.link).selected.clone();
        if let Some(selected) = selected {
            if !names.contains(&selected) {
                warn!("Selected port {} is no longer present", selected);
                self.close_channel();
                lock(&self.shared.link).selected = None;
                self.reset();
            }
        }

        Ok(names)
    }

    fn with_channel<T>(
        &self,
        f: impl FnOnce(&mut Box<dyn Channel>) -> io::Result<T>,
    ) -> Result<T, ProtocolError> {
        let mut link = lock(&self.shared.link);
        match link.channel.as_mut() {
            Some(channel) if channel.is_open() => Ok(f(channel)?),
            _ => Err(ProtocolError::NotOpen),
        }
    }

    /// Whether a channel is open and usable
    pub fn is_working(&self) -> bool {
        lock(&self.shared.link)
            .channel
            .as_ref()
            .is_some_and(|c| c.is_open())
    }

    /// Current controller state
    pub fn state(&self) -> LinkState {
        if !self.is_working() {
            LinkState::Closed
        } else if lock(&self.shared.pending).ack_pending {
            LinkState::OpenAwaitingAck
        } else {
            LinkState::OpenIdle
        }
    }

    /// Name of the port selected by the last successful open
    pub fn selected_channel(&self) -> Option<String> {
        lock(&self.shared.link).selected.clone()
    }

    /// Snapshot of the pending command
    pub fn pending_command(&self) -> PendingCommand {
        lock(&self.shared.pending).clone()
    }

    /// Unacknowledged attempts for the current command
    pub fn retry_count(&self) -> u32 {
        lock(&self.shared.pending).retry_count
    }

    /// Acknowledgment timeout used by `send`
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.shared.timeout_ms.load(Ordering::Acquire))
    }

    /// Change the acknowledgment timeout for subsequent sends
    pub fn set_timeout(&self, ms: u64) {
        self.shared.timeout_ms.store(ms, Ordering::Release);
    }

    /// Write a command and block until it is acknowledged or times out.
    ///
    /// Each attempt waits up to [`timeout`](Self::timeout). An unanswered
    /// attempt publishes [`CommandOutcome::Retry`] and writes the same bytes
    /// again; once the attempt limit is reached [`CommandOutcome::Timeout`] is
    /// published and returned. Concurrent calls are serialized.
    ///
    /// On a closed channel the state is reset, the error listeners are
    /// notified and [`CommandOutcome::Failure`] is returned without writing.
    /// Empty input writes nothing and returns [`CommandOutcome::Init`].
    pub fn send(&self, bytes: &[u8]) -> CommandOutcome {
        if bytes.is_empty() {
            debug!("send: empty command ignored");
            return CommandOutcome::Init;
        }
        if !self.is_working() {
            self.reset();
            self.notify_error(NOT_OPEN_MESSAGE);
            return CommandOutcome::Failure;
        }

        let _serial = lock(&self.shared.send_lock);
        {
            let mut pending = lock(&self.shared.pending);
            pending.bytes = bytes.to_vec();
            pending.retry_count = 0;
        }

        let max_attempts = self.shared.config.max_attempts;
        loop {
            let command = {
                let mut pending = lock(&self.shared.pending);
                if pending.bytes.is_empty() {
                    // reset() or release() ran while we were waiting
                    debug!("send: pending command cleared, giving up");
                    return CommandOutcome::Failure;
                }
                // Clear before publishing the awaiting state so an early
                // acknowledge() is not lost
                self.shared.ack.clear();
                pending.ack_pending = true;
                pending.bytes.clone()
            };

            info!("Send command => {:02X?}", command);
            if let Err(e) = self.with_channel(|channel| channel.write_bytes(&command)) {
                lock(&self.shared.pending).ack_pending = false;
                self.reset();
                match e {
                    ProtocolError::NotOpen => self.notify_error(NOT_OPEN_MESSAGE),
                    e => self.notify_error(format!("Failed to write to serial port: {}", e)),
                }
                return CommandOutcome::Failure;
            }

            let timeout = self.timeout();
            let acknowledged = self.shared.ack.wait(timeout);

            let attempts = {
                let mut pending = lock(&self.shared.pending);
                pending.ack_pending = false;
                if acknowledged {
                    pending.retry_count = 0;
                    None
                } else {
                    pending.retry_count += 1;
                    Some(pending.retry_count)
                }
            };

            let Some(attempts) = attempts else {
                debug!("Command acknowledged --- {:02X?}", command);
                return CommandOutcome::Success;
            };

            warn!(
                "No acknowledgment within {}ms --- {:02X?}",
                timeout.as_millis(),
                command
            );
            if attempts >= max_attempts {
                error!("Command failed after {} attempts", attempts);
                self.shared.outcomes.publish(CommandOutcome::Timeout);
                return CommandOutcome::Timeout;
            }

            warn!("Retrying command => {:02X?}", command);
            self.shared.outcomes.publish(CommandOutcome::Retry);
        }
    }

    /// [`send`](Self::send) on the blocking thread pool
    pub async fn send_async(&self, bytes: Vec<u8>) -> CommandOutcome {
        let controller = self.clone();
        tokio::task::spawn_blocking(move || controller.send(&bytes))
            .await
            .unwrap_or_else(|e| {
                error!("send task failed: {}", e);
                CommandOutcome::Failure
            })
    }

    /// Write raw text without framing or acknowledgment tracking.
    ///
    /// Returns `false` if nothing was written; a closed channel resets the
    /// state and notifies the error listeners.
    pub fn send_text(&self, text: &str) -> bool {
        match self.with_channel(|channel| channel.write_text(text)) {
            Ok(()) => {
                info!("Send command ==> {}", text);
                true
            }
            Err(ProtocolError::NotOpen) => {
                self.reset();
                self.notify_error(NOT_OPEN_MESSAGE);
                false
            }
            Err(e) => {
                self.notify_error(format!("Failed to write to serial port: {}", e));
                false
            }
        }
    }

    /// Drain the channel and pass the bytes to `decode`.
    ///
    /// A decoded frame acknowledges the outstanding command before it is
    /// returned. Never blocks beyond the cost of the read.
    pub fn receive<F>(&self, decode: F) -> Option<Frame>
    where
        F: FnOnce(&[u8]) -> Option<Frame>,
    {
        let bytes = match self.with_channel(|channel| channel.read_available()) {
            Ok(bytes) => bytes,
            Err(ProtocolError::NotOpen) => return None,
            Err(e) => {
                warn!("receive: read failed: {}", e);
                return None;
            }
        };

        let frame = decode(&bytes)?;
        debug!("Received frame <= {:02X?}", frame.as_bytes());
        self.shared.ack.set();
        Some(frame)
    }

    /// [`receive`](Self::receive) on the blocking thread pool
    pub async fn receive_async<F>(&self, decode: F) -> Option<Frame>
    where
        F: FnOnce(&[u8]) -> Option<Frame> + Send + 'static,
    {
        let controller = self.clone();
        tokio::task::spawn_blocking(move || controller.receive(decode))
            .await
            .ok()
            .flatten()
    }

    /// Mark the outstanding command acknowledged.
    ///
    /// For callers that recognize the reply themselves instead of going
    /// through [`receive`](Self::receive).
    pub fn acknowledge(&self) {
        self.shared.ack.set();
    }

    /// Restore the default timeout and clear the retry counter, the
    /// acknowledgment signal and the pending command
    pub fn reset(&self) {
        self.shared
            .timeout_ms
            .store(self.shared.config.timeout_ms, Ordering::Release);
        *lock(&self.shared.pending) = PendingCommand::default();
        self.shared.ack.clear();
    }

    /// Close the channel, drop the transport and error listeners, and reset.
    ///
    /// Safe to call repeatedly. Call [`init`](Self::init) before opening again.
    pub fn release(&self) {
        self.close_channel();
        *self
            .shared
            .transport
            .write()
            .unwrap_or_else(|e| e.into_inner()) = None;
        lock(&self.shared.link).selected = None;
        self.shared.errors.clear();
        self.reset();
        info!("Serial port has been released.");
    }
}
