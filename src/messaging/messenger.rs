//! # Point-to-Point Messenger
//!
//! Layers request/response correlation on top of the fire-and-forget raw channel.
//! Every outgoing command carries a fresh correlation id; the matching response
//! resolves the waiting sender through a oneshot channel. Incoming commands are
//! routed by name to at most one registered listener.
//!
//! Sends are unbounded: a target that never answers leaves the caller waiting.
//! Callers that need an upper bound wrap the send in [`crate::timeout::race`].

use std::{future::Future, sync::Arc};

use dashmap::{mapref::entry::Entry, DashMap};
use futures::{future::BoxFuture, FutureExt};
use thiserror::Error;
use tokio::{sync::oneshot, task::JoinHandle};
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

use crate::{
    host::{ContextId, FrameElement, FrameHost},
    messaging::{
        bus::{BusError, EnvelopeReceiver, WindowMessagePoster},
        protocol::{Command, CommandResponse, ResponseOutcome, WindowMessage},
    },
    FrameResult,
};

#[derive(Debug, Error)]
pub enum MessengerError {
    #[error("Target frame has a sandbox attribute which disallows scripts")]
    SandboxedFrame,
    #[error("Target frame does not have a content context")]
    MissingContentContext,
    #[error("A listener for command {0} is already registered")]
    DuplicateListener(String),
    #[error("Command {command} failed in the receiving context: {message}")]
    Remote { command: String, message: String },
    #[error("Response channel closed before a response arrived")]
    ChannelClosed,
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error("Failed to marshal window message: {0}")]
    Marshal(#[from] serde_json::Error),
}

pub type MessengerResult<T> = Result<T, MessengerError>;

/// Handles one named command. Receives the command and the context that sent it.
pub type CommandListener =
    Arc<dyn Fn(Command, ContextId) -> BoxFuture<'static, FrameResult<CommandResponse>> + Send + Sync>;

/// Removes the pending entry when the send future completes or is dropped.
struct PendingGuard {
    pending: Arc<DashMap<String, oneshot::Sender<ResponseOutcome>>>,
    id: String,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

#[derive(Clone)]
pub struct FrameMessenger {
    context: ContextId,
    poster: Arc<dyn WindowMessagePoster>,
    host: Arc<dyn FrameHost>,
    pending: Arc<DashMap<String, oneshot::Sender<ResponseOutcome>>>,
    listeners: Arc<DashMap<String, CommandListener>>,
}

impl FrameMessenger {
    pub fn new(poster: Arc<dyn WindowMessagePoster>, host: Arc<dyn FrameHost>) -> Self {
        Self {
            context: host.current_context(),
            poster,
            host,
            pending: Arc::new(DashMap::new()),
            listeners: Arc::new(DashMap::new()),
        }
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Sends `command` to the content context of a child frame element.
    ///
    /// Fails immediately, without posting anything, when the frame cannot run
    /// scripts or has no live content context.
    pub async fn send_to_frame(
        &self,
        frame: &FrameElement,
        command: Command,
    ) -> MessengerResult<CommandResponse> {
        if !frame.allows_scripts() {
            return Err(MessengerError::SandboxedFrame);
        }
        let target = self
            .host
            .content_context(frame)
            .ok_or(MessengerError::MissingContentContext)?;
        self.send_to_context(target, command).await
    }

    #[instrument(level = "debug", skip(self, command), fields(command = %command.name, from = %self.context))]
    pub async fn send_to_context(
        &self,
        target: ContextId,
        command: Command,
    ) -> MessengerResult<CommandResponse> {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id.clone(), tx);
        let _guard = PendingGuard {
            pending: self.pending.clone(),
            id: id.clone(),
        };

        let message = WindowMessage::Request {
            command_message_id: id,
            command: command.name.clone(),
            payload: command.payload,
        };
        self.poster.post_message(target, message.marshal()?)?;

        match rx.await.map_err(|_| MessengerError::ChannelClosed)? {
            ResponseOutcome::Success { payload } => Ok(CommandResponse::new(payload)),
            ResponseOutcome::Failure { message } => Err(MessengerError::Remote {
                command: command.name,
                message,
            }),
        }
    }

    /// Registers the handler for `command`. At most one listener per name.
    pub fn add_listener<F, Fut>(&self, command: &str, listener: F) -> MessengerResult<()>
    where
        F: Fn(Command, ContextId) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FrameResult<CommandResponse>> + Send + 'static,
    {
        let listener: CommandListener = Arc::new(move |command, source| listener(command, source).boxed());
        match self.listeners.entry(command.to_string()) {
            Entry::Occupied(_) => Err(MessengerError::DuplicateListener(command.to_string())),
            Entry::Vacant(entry) => {
                entry.insert(listener);
                debug!("Registered listener for {} in {}", command, self.context);
                Ok(())
            }
        }
    }

    pub fn remove_listener(&self, command: &str) -> bool {
        self.listeners.remove(command).is_some()
    }

    /// Handles one raw message delivered to this context.
    pub async fn on_window_message(&self, data: &str, source: ContextId) {
        match WindowMessage::unmarshal(data) {
            Some(WindowMessage::Request {
                command_message_id,
                command,
                payload,
            }) => {
                self.on_request(command_message_id, Command::with_payload(&command, payload), source)
                    .await
            }
            Some(WindowMessage::Response {
                request_command_message_id,
                outcome,
            }) => self.on_response(&request_command_message_id, outcome),
            None => debug!("Ignoring foreign message in {}", self.context),
        }
    }

    async fn on_request(&self, id: String, command: Command, source: ContextId) {
        // Clone the listener out so the map shard is not locked across the await.
        let listener = self.listeners.get(&command.name).map(|l| l.value().clone());
        let name = command.name.clone();

        let outcome = match listener {
            None => {
                debug!("No listener for {} in {}, replying with null", name, self.context);
                ResponseOutcome::Success {
                    payload: serde_json::Value::Null,
                }
            }
            Some(listener) => match listener(command, source).await {
                Ok(response) => ResponseOutcome::Success {
                    payload: response.payload,
                },
                Err(e) => {
                    error!("Listener for {} failed in {}: {}", name, self.context, e);
                    ResponseOutcome::Failure {
                        message: e.to_string(),
                    }
                }
            },
        };

        let response = WindowMessage::Response {
            request_command_message_id: id,
            outcome,
        };
        let posted = response
            .marshal()
            .map_err(MessengerError::from)
            .and_then(|data| Ok(self.poster.post_message(source, data)?));
        if let Err(e) = posted {
            warn!("Failed to respond to {} from {}: {}", name, source, e);
        }
    }

    fn on_response(&self, id: &str, outcome: ResponseOutcome) {
        match self.pending.remove(id) {
            Some((_, sender)) => {
                if sender.send(outcome).is_err() {
                    debug!("Sender for response {} stopped waiting", id);
                }
            }
            None => warn!("Late or unknown response {} in {}", id, self.context),
        }
    }

    /// Pumps the raw channel into this messenger until the channel closes.
    ///
    /// Each delivered message is handled on its own task so a slow listener never
    /// blocks responses to this context's own requests.
    pub fn listen(&self, mut receiver: EnvelopeReceiver) -> JoinHandle<()> {
        let messenger = self.clone();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(envelope) if envelope.target == messenger.context => {
                        let handler = messenger.clone();
                        tokio::spawn(async move {
                            handler.on_window_message(&envelope.data, envelope.source).await;
                        });
                    }
                    Ok(_) => continue,
                    Err(BusError::Lagged { count }) => {
                        warn!("{} missed {} window messages", messenger.context, count);
                    }
                    Err(e) => {
                        debug!("Stopped listening in {}: {}", messenger.context, e);
                        break;
                    }
                }
            }
        })
    }
}
