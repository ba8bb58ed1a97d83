//! # Ping-Checked Fan-out
//!
//! Before broadcasting to its child frames a context pings each of them and keeps
//! only those that answer with the ready sentinel in time. A frame that times out
//! is simply left out; any other ping failure fails initialization as a whole.
//!
//! Every context registers the ping listener. Answering a ping also kicks off the
//! responder's own initialization, so readiness spreads down the frame tree.

use std::{
    fmt,
    sync::{Arc, Weak},
    time::Duration,
};

use futures::future::join_all;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    host::{ContextId, FrameElement, FrameHost},
    merge::{merge_all, AggregateError},
    messaging::{
        messenger::{FrameMessenger, MessengerError},
        protocol::{is_reserved_command, ping_ready_payload, Command, CommandResponse, PING_COMMAND},
    },
    timeout::race,
    FrameResult,
};

#[derive(Debug, Error)]
pub enum FanoutError {
    #[error("Child frames have not been initialized")]
    NotInitialized,
    #[error("{frame} answered ping with unexpected payload {payload}")]
    UnexpectedPingResponse { frame: String, payload: Value },
    #[error("Ping to {frame} failed: {source}")]
    PingFailed {
        frame: String,
        #[source]
        source: MessengerError,
    },
    #[error("Frame initialization failed: {0}")]
    Initialization(AggregateError<FanoutError>),
    #[error("Command {command} failed: {errors}")]
    CommandFailed {
        command: String,
        errors: AggregateError<MessengerError>,
    },
    #[error("Command name {0} is reserved by the frame protocol")]
    ReservedCommand(String),
    #[error(transparent)]
    Messenger(#[from] MessengerError),
}

pub type FanoutResult<T> = Result<T, FanoutError>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum FrameSet {
    Uninitialized,
    Initializing,
    Ready(Vec<FrameElement>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum FanoutState {
    Uninitialized,
    Initializing,
    Ready,
}

pub struct AllFramesMessenger {
    messenger: FrameMessenger,
    host: Arc<dyn FrameHost>,
    ping_timeout: Duration,
    frames: RwLock<FrameSet>,
}

impl fmt::Debug for AllFramesMessenger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllFramesMessenger")
            .field("context", &self.messenger.context())
            .field("ping_timeout", &self.ping_timeout)
            .finish()
    }
}

impl AllFramesMessenger {
    /// Creates the fan-out for one context and registers its ping listener.
    pub fn new(
        messenger: FrameMessenger,
        host: Arc<dyn FrameHost>,
        ping_timeout: Duration,
    ) -> FrameResult<Arc<Self>> {
        let fanout = Arc::new(Self {
            messenger,
            host,
            ping_timeout,
            frames: RwLock::new(FrameSet::Uninitialized),
        });

        let weak = Arc::downgrade(&fanout);
        fanout
            .messenger
            .add_listener(PING_COMMAND, move |_command, source| {
                Self::answer_ping(weak.clone(), source)
            })?;

        Ok(fanout)
    }

    async fn answer_ping(weak: Weak<Self>, source: ContextId) -> FrameResult<CommandResponse> {
        if let Some(fanout) = weak.upgrade() {
            debug!("{} pinged by {}", fanout.messenger.context(), source);
            // Answer right away so a slow grandchild cannot make this frame miss its
            // parent's ping deadline.
            tokio::spawn(async move {
                if let Err(e) = fanout.initialize_all_frames().await {
                    error!("Nested frame initialization failed: {}", e);
                }
            });
        }
        Ok(CommandResponse::new(ping_ready_payload()))
    }

    pub async fn state(&self) -> FanoutState {
        match &*self.frames.read().await {
            FrameSet::Uninitialized => FanoutState::Uninitialized,
            FrameSet::Initializing => FanoutState::Initializing,
            FrameSet::Ready(_) => FanoutState::Ready,
        }
    }

    /// Child frames that answered the last successful initialization.
    pub async fn responsive_frames(&self) -> FanoutResult<Vec<FrameElement>> {
        match &*self.frames.read().await {
            FrameSet::Ready(frames) => Ok(frames.clone()),
            _ => Err(FanoutError::NotInitialized),
        }
    }

    /// Pings every direct child frame and records the responsive ones.
    ///
    /// Frames that stay silent past the ping timeout are excluded. Any other
    /// failure fails the whole call and returns the set to uninitialized.
    #[instrument(skip(self), fields(context = %self.messenger.context()))]
    pub async fn initialize_all_frames(&self) -> FanoutResult<()> {
        *self.frames.write().await = FrameSet::Initializing;

        let pings = self.host.child_frames().into_iter().map(|frame| async move {
            let context = format!("ping {}", frame);
            let outcome = race(
                self.messenger.send_to_frame(&frame, Command::new(PING_COMMAND)),
                self.ping_timeout,
                &context,
            )
            .await;
            (frame, outcome)
        });

        let mut responsive = Vec::new();
        let mut errors = Vec::new();
        for (frame, outcome) in join_all(pings).await {
            match outcome {
                Ok(Ok(response)) if response.payload == ping_ready_payload() => responsive.push(frame),
                Ok(Ok(response)) => errors.push(FanoutError::UnexpectedPingResponse {
                    frame: frame.to_string(),
                    payload: response.payload,
                }),
                Ok(Err(source)) => errors.push(FanoutError::PingFailed {
                    frame: frame.to_string(),
                    source,
                }),
                Err(timeout) => warn!("Excluding unresponsive {}: {}", frame, timeout),
            }
        }

        if !errors.is_empty() {
            *self.frames.write().await = FrameSet::Uninitialized;
            return Err(FanoutError::Initialization(AggregateError::new(errors)));
        }

        info!("{} responsive child frame(s)", responsive.len());
        *self.frames.write().await = FrameSet::Ready(responsive);
        Ok(())
    }

    /// Sends one command with the same payload to every responsive child frame.
    pub async fn send_command_to_all_frames(
        &self,
        command: &str,
        payload: Value,
    ) -> FanoutResult<Vec<CommandResponse>> {
        ensure_application_command(command)?;
        let targets = self
            .responsive_frames()
            .await?
            .into_iter()
            .map(|frame| (frame, payload.clone()))
            .collect();
        self.send_to_targets(command, targets).await
    }

    /// Sends `command` to the given frames that are in the responsive set.
    ///
    /// `payload_for` is called with each targeted frame and its index in `frames`.
    /// Frames outside the responsive set are skipped without error.
    pub async fn send_command_to_multiple_frames<F>(
        &self,
        command: &str,
        frames: &[FrameElement],
        payload_for: F,
    ) -> FanoutResult<Vec<CommandResponse>>
    where
        F: Fn(&FrameElement, usize) -> Value,
    {
        ensure_application_command(command)?;
        let responsive = self.responsive_frames().await?;
        let mut targets = Vec::with_capacity(frames.len());
        for (index, frame) in frames.iter().enumerate() {
            if responsive.contains(frame) {
                targets.push((frame.clone(), payload_for(frame, index)));
            } else {
                debug!("Skipping {} which did not answer the ping", frame);
            }
        }
        self.send_to_targets(command, targets).await
    }

    async fn send_to_targets(
        &self,
        command: &str,
        targets: Vec<(FrameElement, Value)>,
    ) -> FanoutResult<Vec<CommandResponse>> {
        let sends = targets.into_iter().map(|(frame, payload)| async move {
            self.messenger
                .send_to_frame(&frame, Command::with_payload(command, payload))
                .await
        });
        merge_all(sends)
            .await
            .map_err(|errors| FanoutError::CommandFailed {
                command: command.to_string(),
                errors,
            })
    }

    /// Unbounded point-to-point send to an arbitrary context.
    pub async fn send_message_to_window(
        &self,
        target: ContextId,
        command: Command,
    ) -> FanoutResult<CommandResponse> {
        Ok(self.messenger.send_to_context(target, command).await?)
    }

    pub fn add_message_listener<F, Fut>(&self, command: &str, listener: F) -> FanoutResult<()>
    where
        F: Fn(Command, ContextId) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = FrameResult<CommandResponse>> + Send + 'static,
    {
        ensure_application_command(command)?;
        Ok(self.messenger.add_listener(command, listener)?)
    }
}

fn ensure_application_command(command: &str) -> FanoutResult<()> {
    if is_reserved_command(command) {
        return Err(FanoutError::ReservedCommand(command.to_string()));
    }
    Ok(())
}
