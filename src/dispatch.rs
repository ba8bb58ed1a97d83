//! # Event Dispatch Hub
//!
//! Routes named events to ordered lists of application callbacks. An event that
//! arrives before any callback for its type is queued and replayed, once, to the
//! first callback registered for that type.
//!
//! Each callback outcome is bounded on its own: a pending outcome races the
//! event response timeout, an immediate one completes after the fire-and-forget
//! delay. The future returned by [`EventDispatchHub::dispatch`] must be awaited
//! or spawned for pending callback work to make progress.

use std::{
    collections::VecDeque,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};

use dashmap::DashMap;
use futures::{
    future::{join_all, BoxFuture},
    FutureExt,
};
use serde_json::Value;
use thiserror::Error;
use tokio::{sync::oneshot, time::Instant};
use tracing::{debug, error, warn};

use crate::{
    config::FrameRelayConfig,
    timeout::{delay, race, TimeoutError},
};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DispatchError {
    #[error("Listener for {event_type} failed: {message}")]
    ListenerFailed { event_type: String, message: String },
    #[error(transparent)]
    Timeout(#[from] TimeoutError),
    #[error("Deferred {event_type} event was dropped before a listener registered")]
    Dropped { event_type: String },
}

pub type DispatchResult<T> = Result<T, DispatchError>;

/// What a callback hands back when invoked.
pub enum ListenerOutcome {
    /// Work still in flight.
    Pending(BoxFuture<'static, DispatchResult<Value>>),
    /// The callback finished synchronously. Callbacks are expected to produce
    /// `Value::Null` here; anything else is logged.
    Immediate(Value),
}

impl ListenerOutcome {
    pub fn done() -> Self {
        ListenerOutcome::Immediate(Value::Null)
    }

    pub fn pending<F>(future: F) -> Self
    where
        F: std::future::Future<Output = DispatchResult<Value>> + Send + 'static,
    {
        ListenerOutcome::Pending(future.boxed())
    }
}

impl fmt::Debug for ListenerOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenerOutcome::Pending(_) => f.write_str("Pending"),
            ListenerOutcome::Immediate(value) => write!(f, "Immediate({})", value),
        }
    }
}

pub type ApplicationListener = Arc<dyn Fn(&[Value]) -> ListenerOutcome + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Per-callback results of one dispatch, in registration order.
pub type DispatchCompletion = BoxFuture<'static, Vec<DispatchResult<Value>>>;

struct DeferredEvent {
    event_type: String,
    args: Vec<Value>,
    dispatched_at: Instant,
    resolution: oneshot::Sender<DispatchCompletion>,
}

pub struct EventDispatchHub {
    listeners: DashMap<String, Vec<(ListenerId, ApplicationListener)>>,
    deferred: Mutex<VecDeque<DeferredEvent>>,
    next_id: AtomicU64,
    event_response_timeout: Duration,
    fire_and_forget_delay: Duration,
}

impl EventDispatchHub {
    pub fn new(config: &FrameRelayConfig) -> Self {
        Self {
            listeners: DashMap::new(),
            deferred: Mutex::new(VecDeque::new()),
            next_id: AtomicU64::new(1),
            event_response_timeout: config.event_response_timeout,
            fire_and_forget_delay: config.fire_and_forget_delay,
        }
    }

    /// Appends `listener` to the callbacks for `event_type` and replays any events
    /// of that type that were waiting for one.
    pub fn add_listener(&self, event_type: &str, listener: ApplicationListener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.listeners
            .entry(event_type.to_string())
            .or_default()
            .push((id, listener));
        debug!("Registered listener {:?} for {}", id, event_type);
        self.process_deferred_events();
        id
    }

    /// Returns `false`, after logging, when no such listener is registered.
    pub fn remove_listener(&self, event_type: &str, id: ListenerId) -> bool {
        let removed = match self.listeners.get_mut(event_type) {
            Some(mut listeners) => {
                let before = listeners.len();
                listeners.retain(|(listener_id, _)| *listener_id != id);
                listeners.len() != before
            }
            None => false,
        };
        if !removed {
            warn!("No listener {:?} registered for {}", id, event_type);
        }
        removed
    }

    pub fn listener_count(&self, event_type: &str) -> usize {
        self.listeners.get(event_type).map(|l| l.len()).unwrap_or(0)
    }

    pub fn deferred_count(&self) -> usize {
        self.deferred_queue().len()
    }

    /// Invokes every callback for `event_type` now, or queues the event when
    /// there is none yet.
    pub fn dispatch(&self, event_type: &str, args: Vec<Value>) -> DispatchCompletion {
        let listeners = self.listeners_for(event_type);
        if listeners.is_empty() {
            return self.defer(event_type, args);
        }
        self.invoke(event_type, &listeners, &args)
    }

    fn listeners_for(&self, event_type: &str) -> Vec<ApplicationListener> {
        // Snapshot so callbacks can register or remove listeners re-entrantly.
        self.listeners
            .get(event_type)
            .map(|listeners| listeners.iter().map(|(_, l)| l.clone()).collect())
            .unwrap_or_default()
    }

    fn invoke(&self, event_type: &str, listeners: &[ApplicationListener], args: &[Value]) -> DispatchCompletion {
        let completions: Vec<_> = listeners
            .iter()
            .map(|listener| self.bound_outcome(event_type, listener(args)))
            .collect();
        join_all(completions).boxed()
    }

    fn bound_outcome(&self, event_type: &str, outcome: ListenerOutcome) -> BoxFuture<'static, DispatchResult<Value>> {
        match outcome {
            ListenerOutcome::Pending(future) => {
                let ceiling = self.event_response_timeout;
                let context = format!("[{} listener response]", event_type);
                async move {
                    match race(future, ceiling, &context).await {
                        Ok(Ok(value)) => Ok(value),
                        Ok(Err(e)) => {
                            error!("{}", e);
                            Err(e)
                        }
                        Err(timeout) => {
                            error!("{}", timeout);
                            Err(timeout.into())
                        }
                    }
                }
                .boxed()
            }
            ListenerOutcome::Immediate(value) => {
                if !value.is_null() {
                    error!("Unexpected synchronous result from {} listener: {}", event_type, value);
                }
                delay(Ok::<_, DispatchError>(value), self.fire_and_forget_delay).boxed()
            }
        }
    }

    fn defer(&self, event_type: &str, args: Vec<Value>) -> DispatchCompletion {
        debug!("No listener for {}, deferring", event_type);
        let (resolution, receiver) = oneshot::channel();
        let dispatched_at = Instant::now();
        self.deferred_queue().push_back(DeferredEvent {
            event_type: event_type.to_string(),
            args,
            dispatched_at,
            resolution,
        });

        // The ceiling runs from dispatch, not from the first poll.
        let deadline = dispatched_at + self.event_response_timeout;
        let event_type = event_type.to_string();
        async move {
            let context = format!("[deferred {} event]", event_type);
            let ceiling = deadline.saturating_duration_since(Instant::now());
            let replayed = async {
                match receiver.await {
                    Ok(completion) => completion.await,
                    Err(_) => vec![Err(DispatchError::Dropped {
                        event_type: event_type.clone(),
                    })],
                }
            };
            match race(replayed, ceiling, &context).await {
                Ok(results) => results,
                Err(timeout) => {
                    warn!("{}", timeout);
                    vec![Err(timeout.into())]
                }
            }
        }
        .boxed()
    }

    /// Replays deferred events that now have callbacks, oldest first, and keeps
    /// the rest queued. Events older than the response timeout are discarded.
    fn process_deferred_events(&self) {
        let pending: Vec<DeferredEvent> = self.deferred_queue().drain(..).collect();
        let mut still_deferred = VecDeque::new();
        for event in pending {
            if event.dispatched_at.elapsed() >= self.event_response_timeout {
                debug!("Discarding stale deferred {} event", event.event_type);
                continue;
            }
            let listeners = self.listeners_for(&event.event_type);
            if listeners.is_empty() {
                still_deferred.push_back(event);
                continue;
            }
            debug!("Replaying deferred {} event", event.event_type);
            let completion = self.invoke(&event.event_type, &listeners, &event.args);
            if let Err(completion) = event.resolution.send(completion) {
                // Nobody awaits the result, but pending callback work still has to run.
                debug!("Deferred {} event caller went away", event.event_type);
                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    handle.spawn(completion);
                }
            }
        }

        // Events deferred re-entrantly by a replayed callback go after the survivors.
        let mut queue = self.deferred_queue();
        let newer: Vec<DeferredEvent> = queue.drain(..).collect();
        queue.extend(still_deferred);
        queue.extend(newer);
    }

    fn deferred_queue(&self) -> std::sync::MutexGuard<'_, VecDeque<DeferredEvent>> {
        self.deferred.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
