//! # Recursive Command Protocol
//!
//! [`AllFrameRunner`] drives one distributed analysis across the whole frame tree.
//! Start and stop are issued from the top context only; each context runs the
//! local operation and then forwards it to its direct child frames, which do the
//! same. Results flow the other way: a child sends each result to its parent, the
//! parent rewrites it into its own coordinate space and forwards it again until
//! the top context hands it to its sink.
//!
//! Every context must register its runner before the top calls `start`, otherwise
//! that context answers the start command with a null payload and is skipped.

use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use async_trait::async_trait;
use futures::{future::BoxFuture, future::join_all, FutureExt};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    host::{ContextId, FrameElement, FrameHost},
    messaging::{
        messenger::FrameMessenger,
        protocol::{Command, CommandResponse, RunnerCommands},
    },
    timeout::race,
    FrameResult,
};

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Runner start/stop is only available in the top context, not {0}")]
    NotTopContext(ContextId),
    #[error("unable to get frame element for {0}")]
    UnknownSourceFrame(ContextId),
    #[error("{0} is not the top context but has no parent context")]
    MissingParent(ContextId),
    #[error("Malformed result from {source_context}: {message}")]
    MalformedResult {
        source_context: ContextId,
        message: String,
    },
}

/// Receives every result produced locally. Installed by the runner.
pub type ResultCallback<R> = Arc<dyn Fn(R) -> BoxFuture<'static, FrameResult<()>> + Send + Sync>;

/// Behaviour plugged into an [`AllFrameRunner`].
#[async_trait]
pub trait AllFrameRunnerTarget: Send + Sync + 'static {
    type Output: Serialize + DeserializeOwned + Clone + Send + Sync + 'static;

    /// Namespaces the runner's reserved commands so several runners can coexist.
    fn command_suffix(&self) -> &str;

    fn set_result_callback(&self, callback: ResultCallback<Self::Output>);

    async fn start(&self) -> FrameResult<()>;

    async fn stop(&self) -> FrameResult<()>;

    /// Rewrites a result coming from the context inside `frame` so that it is
    /// expressed relative to the current context.
    fn transform_child_result_for_parent(&self, result: Self::Output, frame: &FrameElement) -> Self::Output;

    async fn handle_result_in_top_frame(&self, result: Self::Output) -> FrameResult<()>;
}

pub struct AllFrameRunner<T: AllFrameRunnerTarget> {
    messenger: FrameMessenger,
    host: Arc<dyn FrameHost>,
    target: Arc<T>,
    commands: RunnerCommands,
    child_command_timeout: Duration,
}

impl<T: AllFrameRunnerTarget> AllFrameRunner<T> {
    /// Creates the runner and registers its three reserved listeners in this context.
    pub fn new(
        messenger: FrameMessenger,
        host: Arc<dyn FrameHost>,
        target: Arc<T>,
        child_command_timeout: Duration,
    ) -> FrameResult<Arc<Self>> {
        let commands = RunnerCommands::for_suffix(target.command_suffix());
        let runner = Arc::new(Self {
            messenger,
            host,
            target,
            commands,
            child_command_timeout,
        });
        runner.register_listeners()?;
        Ok(runner)
    }

    fn register_listeners(self: &Arc<Self>) -> FrameResult<()> {
        let weak = Arc::downgrade(self);
        self.messenger.add_listener(&self.commands.start, move |_, source| {
            let weak = weak.clone();
            async move {
                debug!("start requested by {}", source);
                match weak.upgrade() {
                    Some(runner) => runner.start_subtree().await?,
                    None => debug!("runner dropped before start arrived"),
                }
                Ok(CommandResponse::empty())
            }
        })?;

        let weak = Arc::downgrade(self);
        self.messenger.add_listener(&self.commands.stop, move |_, source| {
            let weak = weak.clone();
            async move {
                debug!("stop requested by {}", source);
                match weak.upgrade() {
                    Some(runner) => runner.stop_subtree().await?,
                    None => debug!("runner dropped before stop arrived"),
                }
                Ok(CommandResponse::empty())
            }
        })?;

        let weak = Arc::downgrade(self);
        self.messenger
            .add_listener(&self.commands.result_from_child, move |command, source| {
                let weak = weak.clone();
                async move {
                    match weak.upgrade() {
                        Some(runner) => runner.on_result_from_child(command, source).await,
                        None => Ok(CommandResponse::empty()),
                    }
                }
            })?;

        let weak: Weak<Self> = Arc::downgrade(self);
        self.target.set_result_callback(Arc::new(move |result: T::Output| {
            let weak = weak.clone();
            async move {
                match weak.upgrade() {
                    Some(runner) => runner.report_result(result).await,
                    None => Ok(()),
                }
            }
            .boxed()
        }));

        Ok(())
    }

    pub fn target(&self) -> &Arc<T> {
        &self.target
    }

    /// Starts the analysis in every context of the frame tree.
    #[instrument(skip(self), fields(suffix = %self.target.command_suffix()))]
    pub async fn start(&self) -> FrameResult<()> {
        self.ensure_top()?;
        self.start_subtree().await?;
        info!("started in all frames");
        Ok(())
    }

    #[instrument(skip(self), fields(suffix = %self.target.command_suffix()))]
    pub async fn stop(&self) -> FrameResult<()> {
        self.ensure_top()?;
        self.stop_subtree().await?;
        info!("stopped in all frames");
        Ok(())
    }

    fn ensure_top(&self) -> FrameResult<()> {
        if !self.host.is_top_context() {
            return Err(RunnerError::NotTopContext(self.host.current_context()).into());
        }
        Ok(())
    }

    async fn start_subtree(&self) -> FrameResult<()> {
        self.target.start().await?;
        self.forward_to_children(&self.commands.start).await;
        Ok(())
    }

    async fn stop_subtree(&self) -> FrameResult<()> {
        self.target.stop().await?;
        self.forward_to_children(&self.commands.stop).await;
        Ok(())
    }

    /// Sends `command` to every direct child frame and waits for all of them.
    ///
    /// A child that fails or stays silent past the timeout is logged and treated
    /// as absent; it never aborts its siblings.
    async fn forward_to_children(&self, command: &str) {
        let frames = self.host.child_frames();
        let sends = frames.iter().map(|frame| async move {
            let context = format!("{} to {}", command, frame);
            let outcome = race(
                self.messenger.send_to_frame(frame, Command::new(command)),
                self.child_command_timeout,
                &context,
            )
            .await;
            match outcome {
                Ok(Ok(_)) => debug!("{} finished {}", frame, command),
                Ok(Err(e)) => warn!("{} failed {}: {}", frame, command, e),
                Err(timeout) => warn!("Treating {} as absent: {}", frame, timeout),
            }
        });
        join_all(sends).await;
    }

    /// Routes one locally produced result toward the top context.
    pub async fn report_result(&self, result: T::Output) -> FrameResult<()> {
        if self.host.is_top_context() {
            self.target.handle_result_in_top_frame(result).await
        } else {
            self.send_result_to_parent(&result).await
        }
    }

    async fn send_result_to_parent(&self, result: &T::Output) -> FrameResult<()> {
        let context = self.host.current_context();
        let parent = self
            .host
            .parent_context()
            .ok_or(RunnerError::MissingParent(context))?;
        let payload = serde_json::to_value(result)?;
        self.messenger
            .send_to_context(parent, Command::with_payload(&self.commands.result_from_child, payload))
            .await?;
        Ok(())
    }

    async fn on_result_from_child(&self, command: Command, source: ContextId) -> FrameResult<CommandResponse> {
        let frame = self.host.frame_for_context(source).ok_or_else(|| {
            error!("unable to get frame element for {}", source);
            RunnerError::UnknownSourceFrame(source)
        })?;

        let result: T::Output =
            serde_json::from_value(command.payload).map_err(|e| RunnerError::MalformedResult {
                source_context: source,
                message: e.to_string(),
            })?;

        let transformed = self.target.transform_child_result_for_parent(result, &frame);
        let echo = serde_json::to_value(&transformed)?;

        if self.host.is_top_context() {
            self.target.handle_result_in_top_frame(transformed).await?;
        } else {
            self.send_result_to_parent(&transformed).await?;
        }
        Ok(CommandResponse::new(echo))
    }
}
