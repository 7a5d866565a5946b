use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LinkError {
    #[error("device link is disconnected")]
    Disconnected,
    #[error("failed to send frame: {0}")]
    Send(String),
    #[error("transport encoding error: {0}")]
    Encoding(String),
}

/// Bidirectional frame channel to the fretboard. Transport specifics (BLE,
/// serial, in-memory) stay behind this trait.
#[async_trait]
pub trait DeviceLink: Send + Sync {
    async fn send(&self, frame: &[u8]) -> Result<(), LinkError>;

    fn subscribe(&self) -> Result<Subscription, LinkError>;

    fn is_connected(&self) -> bool {
        true
    }
}

type FrameTransform = Box<dyn Fn(Vec<u8>) -> Result<Vec<u8>, LinkError> + Send>;
type CancelHook = Box<dyn FnOnce() + Send>;

/// Live stream of inbound frames. Dropping or cancelling it unregisters the
/// listener from the link.
pub struct Subscription {
    frames: mpsc::UnboundedReceiver<Vec<u8>>,
    transform: Option<FrameTransform>,
    on_cancel: Option<CancelHook>,
}

impl Subscription {
    pub fn new(
        frames: mpsc::UnboundedReceiver<Vec<u8>>,
        on_cancel: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            frames,
            transform: None,
            on_cancel: Some(Box::new(on_cancel)),
        }
    }

    /// Applies `transform` to every frame before it is handed out.
    pub fn with_transform(
        mut self,
        transform: impl Fn(Vec<u8>) -> Result<Vec<u8>, LinkError> + Send + 'static,
    ) -> Self {
        self.transform = Some(Box::new(transform));
        self
    }

    /// Waits for the next frame; `None` once the link has gone away.
    pub async fn next_frame(&mut self) -> Option<Result<Vec<u8>, LinkError>> {
        let frame = self.frames.recv().await?;
        Some(self.apply(frame))
    }

    pub fn cancel(mut self) {
        self.release();
    }

    fn apply(&self, frame: Vec<u8>) -> Result<Vec<u8>, LinkError> {
        match &self.transform {
            Some(transform) => transform(frame),
            None => Ok(frame),
        }
    }

    fn release(&mut self) {
        self.frames.close();
        if let Some(on_cancel) = self.on_cancel.take() {
            on_cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.on_cancel.is_some())
            .finish()
    }
}

#[derive(Default)]
struct LoopbackState {
    sent: Vec<Vec<u8>>,
    listeners: HashMap<u64, mpsc::UnboundedSender<Vec<u8>>>,
    next_id: u64,
    fail_sends: bool,
    disconnected: bool,
}

/// In-memory link. Records outbound frames and lets the caller play the
/// device by delivering inbound frames to every subscriber.
#[derive(Clone, Default)]
pub struct LoopbackLink {
    state: Arc<Mutex<LoopbackState>>,
}

impl LoopbackLink {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, LoopbackState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.state().sent.clone()
    }

    pub fn sent_text(&self) -> Vec<String> {
        self.state()
            .sent
            .iter()
            .map(|frame| String::from_utf8_lossy(frame).into_owned())
            .collect()
    }

    /// Pushes a frame to all subscribers, returning how many received it.
    pub fn deliver(&self, frame: impl Into<Vec<u8>>) -> usize {
        let frame = frame.into();
        let mut state = self.state();
        state
            .listeners
            .retain(|_, listener| listener.send(frame.clone()).is_ok());
        state.listeners.len()
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.state().fail_sends = fail;
    }

    /// Drops every listener so open subscriptions end, and refuses new ones.
    pub fn disconnect(&self) {
        let mut state = self.state();
        state.disconnected = true;
        state.listeners.clear();
        debug!("loopback link disconnected");
    }

    pub fn subscriber_count(&self) -> usize {
        self.state().listeners.len()
    }
}

#[async_trait]
impl DeviceLink for LoopbackLink {
    async fn send(&self, frame: &[u8]) -> Result<(), LinkError> {
        let mut state = self.state();
        if state.disconnected {
            return Err(LinkError::Disconnected);
        }
        if state.fail_sends {
            warn!(len = frame.len(), "loopback send rejected");
            return Err(LinkError::Send("loopback configured to fail".into()));
        }
        state.sent.push(frame.to_vec());
        Ok(())
    }

    fn subscribe(&self) -> Result<Subscription, LinkError> {
        let mut state = self.state();
        if state.disconnected {
            return Err(LinkError::Disconnected);
        }
        let id = state.next_id;
        state.next_id += 1;
        let (tx, rx) = mpsc::unbounded_channel();
        state.listeners.insert(id, tx);
        let shared = Arc::clone(&self.state);
        Ok(Subscription::new(rx, move || {
            shared
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .listeners
                .remove(&id);
        }))
    }

    fn is_connected(&self) -> bool {
        !self.state().disconnected
    }
}
