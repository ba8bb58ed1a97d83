//! In-process raw channel between execution contexts.
//!
//! Stands in for `postMessage`: fire-and-forget, no correlation, no delivery
//! guarantee. Every subscriber sees every envelope and keeps only those addressed
//! to its own context.

use std::sync::Arc;

use mockall::automock;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::host::ContextId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub source: ContextId,
    pub target: ContextId,
    /// Marshalled window message.
    pub data: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("Send failed: {message}")]
    SendFailed { message: String },
    #[error("Receiver lagged behind by {count} messages")]
    Lagged { count: u64 },
    #[error("Receive failed: {message}")]
    ReceiveFailed { message: String },
}

pub type BusResult<T> = Result<T, BusError>;

/// Outbound half of a raw channel, as seen from one context.
#[automock]
pub trait WindowMessagePoster: Send + Sync {
    fn post_message(&self, target: ContextId, data: String) -> BusResult<()>;
}

pub struct WindowBus {
    sender: broadcast::Sender<Envelope>,
}

impl WindowBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> EnvelopeReceiver {
        EnvelopeReceiver::new(self.sender.subscribe())
    }

    pub fn post(&self, envelope: Envelope) -> BusResult<()> {
        self.sender.send(envelope).map_err(|e| BusError::SendFailed {
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// A poster that stamps every envelope with `source`.
    pub fn poster(self: &Arc<Self>, source: ContextId) -> BusPoster {
        BusPoster {
            bus: self.clone(),
            source,
        }
    }
}

pub struct BusPoster {
    bus: Arc<WindowBus>,
    source: ContextId,
}

impl WindowMessagePoster for BusPoster {
    fn post_message(&self, target: ContextId, data: String) -> BusResult<()> {
        self.bus.post(Envelope {
            source: self.source,
            target,
            data,
        })
    }
}

pub struct EnvelopeReceiver {
    receiver: broadcast::Receiver<Envelope>,
}

impl EnvelopeReceiver {
    fn new(receiver: broadcast::Receiver<Envelope>) -> Self {
        Self { receiver }
    }

    /// Receives the next envelope. On lag, reports how many envelopes were
    /// overwritten; the next call continues with the oldest one still retained.
    pub async fn recv(&mut self) -> BusResult<Envelope> {
        match self.receiver.recv().await {
            Ok(envelope) => Ok(envelope),
            Err(broadcast::error::RecvError::Lagged(n)) => Err(BusError::Lagged { count: n }),
            Err(e) => Err(BusError::ReceiveFailed {
                message: e.to_string(),
            }),
        }
    }
}
