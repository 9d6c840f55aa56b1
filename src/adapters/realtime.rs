use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use thiserror::Error;

use crate::domain::realtime_event::{OutboundEvent, RealtimeMessage};

/// Outbound half of a realtime channel.
pub trait RealtimeChannel: Send + std::fmt::Debug {
    fn publish(&self, event: &OutboundEvent) -> Result<(), RealtimeError>;

    /// Stops inbound delivery. Must be idempotent.
    fn close(&mut self);
}

pub trait RealtimeConnector {
    type Channel: RealtimeChannel;

    fn connect(
        &self,
        token: &str,
        channel_id: &str,
    ) -> Result<RealtimeConnection<Self::Channel>, RealtimeError>;
}

#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("realtime request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("realtime provider answered with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("realtime stream failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse realtime message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid realtime endpoint: {0}")]
    InvalidUrl(String),
    #[error("realtime connection closed")]
    Closed,
    #[error("invalid realtime script: {0}")]
    Script(String),
}

/// An open channel with its single inbound subscriber.
///
/// Closing happens on drop, so the connection lives exactly as long as the
/// flow that owns it.
#[derive(Debug)]
pub struct RealtimeConnection<C: RealtimeChannel> {
    channel: C,
    inbound: Receiver<RealtimeMessage>,
    channel_id: String,
    closed: bool,
}

impl<C: RealtimeChannel> RealtimeConnection<C> {
    pub fn new(channel: C, inbound: Receiver<RealtimeMessage>, channel_id: &str) -> Self {
        Self {
            channel,
            inbound,
            channel_id: channel_id.to_string(),
            closed: false,
        }
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    pub fn publish(&self, event: &OutboundEvent) -> Result<(), RealtimeError> {
        if self.closed {
            return Err(RealtimeError::Closed);
        }

        tracing::debug!(
            channel_id = %self.channel_id,
            event = event.name(),
            "publishing realtime event"
        );
        self.channel.publish(event)
    }

    /// Waits up to `timeout` for the next message. `Ok(None)` means the wait
    /// timed out; a closed stream is an error.
    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> Result<Option<RealtimeMessage>, RealtimeError> {
        if self.closed {
            return Err(RealtimeError::Closed);
        }

        match self.inbound.recv_timeout(timeout) {
            Ok(message) => Ok(Some(message)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(RealtimeError::Closed),
        }
    }

    pub fn close(&mut self) {
        if self.closed {
            return;
        }

        self.channel.close();
        self.closed = true;
        tracing::info!(channel_id = %self.channel_id, "realtime connection closed");
    }
}

impl<C: RealtimeChannel> Drop for RealtimeConnection<C> {
    fn drop(&mut self) {
        self.close();
    }
}
