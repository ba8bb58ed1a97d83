//! # Tab-Stop Orchestrator
//!
//! Watches keyboard navigation in one context while a run is active. Focus moves
//! are checked against document order, Tab presses against keyboard traps, and on
//! stop every tabbable element that was never reached is reported.
//!
//! Plugged into an [`AllFrameRunner`](crate::runner::AllFrameRunner), which starts
//! and stops it in every frame and carries its results to the top context.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Weak,
};

use async_trait::async_trait;
use futures::{future, FutureExt};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, warn};

use crate::{
    config::FrameRelayConfig,
    dom::{Document, DomEvent, DomEventKind, DomListener, ListenerHandle},
    host::{ElementId, FrameElement},
    runner::{AllFrameRunnerTarget, ResultCallback},
    tab_stops::{
        collector::TabStopResultCollector,
        evaluator::TabStopsRequirementEvaluator,
        focus_traps::FocusTrapsHandler,
        result::TabStopRequirementResult,
        state::TabStopsState,
    },
    FrameResult,
};

pub const TAB_STOPS_COMMAND_SUFFIX: &str = "tab-stops";

pub struct TabStopRequirementOrchestrator {
    inner: Arc<OrchestratorInner>,
}

struct OrchestratorInner {
    document: Arc<dyn Document>,
    evaluator: Arc<TabStopsRequirementEvaluator>,
    focus_traps: FocusTrapsHandler,
    running: AtomicBool,
    /// Bumped on every start and stop, so a trap check can tell which run it belongs to.
    run_generation: AtomicU64,
    state: Mutex<Option<TabStopsState>>,
    dom_listeners: Mutex<Vec<ListenerHandle>>,
    report_results: RwLock<Option<ResultCallback<TabStopRequirementResult>>>,
    collector: Arc<TabStopResultCollector>,
}

impl TabStopRequirementOrchestrator {
    pub fn new(document: Arc<dyn Document>, config: &FrameRelayConfig) -> Self {
        let evaluator = Arc::new(TabStopsRequirementEvaluator::new(document.clone()));
        let focus_traps = FocusTrapsHandler::new(document.clone(), evaluator.clone(), config.keyboard_trap_delay);
        Self {
            inner: Arc::new(OrchestratorInner {
                document,
                evaluator,
                focus_traps,
                running: AtomicBool::new(false),
                run_generation: AtomicU64::new(0),
                state: Mutex::new(None),
                dom_listeners: Mutex::new(Vec::new()),
                report_results: RwLock::new(None),
                collector: Arc::new(TabStopResultCollector::new()),
            }),
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Results collected in this context when it is the top context.
    pub fn collector(&self) -> Arc<TabStopResultCollector> {
        self.inner.collector.clone()
    }
}

impl OrchestratorInner {
    async fn attach_dom_listeners(self: &Arc<Self>) {
        let focus_in: DomListener = {
            let weak = Arc::downgrade(self);
            Arc::new(move |event: DomEvent| {
                let weak = weak.clone();
                async move {
                    if let (Some(inner), DomEvent::FocusIn { target }) = (weak.upgrade(), event) {
                        inner.on_focus_in(target).await;
                    }
                }
                .boxed()
            })
        };

        let key_down: DomListener = {
            let weak: Weak<Self> = Arc::downgrade(self);
            Arc::new(move |event: DomEvent| {
                let Some(inner) = weak.upgrade() else {
                    return future::ready(()).boxed();
                };
                // Capture focus synchronously, before the key's default action moves it.
                let focused = match &event {
                    DomEvent::KeyDown { key } if key == "Tab" && inner.running.load(Ordering::SeqCst) => {
                        inner.focus_traps.focused_before_tab()
                    }
                    _ => None,
                };
                let generation = inner.run_generation.load(Ordering::SeqCst);
                async move {
                    if let Some(focused) = focused {
                        inner.on_tab_pressed(focused, generation).await;
                    }
                }
                .boxed()
            })
        };

        let mut handles = self.dom_listeners.lock().await;
        handles.push(self.document.add_event_listener(DomEventKind::FocusIn, focus_in));
        handles.push(self.document.add_event_listener(DomEventKind::KeyDown, key_down));
    }

    async fn detach_dom_listeners(&self) {
        let mut handles = self.dom_listeners.lock().await;
        for handle in handles.drain(..) {
            self.document.remove_event_listener(handle);
        }
    }

    async fn on_focus_in(&self, target: ElementId) {
        let finding = {
            let mut state = self.state.lock().await;
            let Some(state) = state.as_mut() else {
                return;
            };
            state
                .record_focus(target)
                .and_then(|previous| self.evaluator.focus_order_result(previous, target))
        };
        if let Some(result) = finding {
            self.report(result).await;
        }
    }

    async fn on_tab_pressed(&self, focused: ElementId, generation: u64) {
        let Some(result) = self.focus_traps.check_for_trap(focused).await else {
            return;
        };
        if !self.running.load(Ordering::SeqCst) || self.run_generation.load(Ordering::SeqCst) != generation {
            debug!("Run ended while checking {} for a trap", focused);
            return;
        }
        self.report(result).await;
    }

    async fn report(&self, result: TabStopRequirementResult) {
        let callback = self.report_results.read().await.clone();
        match callback {
            Some(callback) => {
                if let Err(e) = callback(result).await {
                    error!("Failed to report tab-stop result: {}", e);
                }
            }
            None => warn!("No result callback installed, dropping {} result", result.requirement_id),
        }
    }
}

#[async_trait]
impl AllFrameRunnerTarget for TabStopRequirementOrchestrator {
    type Output = TabStopRequirementResult;

    fn command_suffix(&self) -> &str {
        TAB_STOPS_COMMAND_SUFFIX
    }

    fn set_result_callback(&self, callback: ResultCallback<TabStopRequirementResult>) {
        // Installed once during runner construction, before any run starts.
        match self.inner.report_results.try_write() {
            Ok(mut slot) => *slot = Some(callback),
            Err(_) => error!("Result callback is busy and could not be replaced"),
        }
    }

    async fn start(&self) -> FrameResult<()> {
        let inner = &self.inner;
        inner.detach_dom_listeners().await;

        let tabbable = inner.document.tabbable_elements();
        let static_results = inner.evaluator.tabbable_focus_order_results(&tabbable);
        debug!("Tracking {} tabbable element(s)", tabbable.len());
        *inner.state.lock().await = Some(TabStopsState::new(tabbable));
        inner.run_generation.fetch_add(1, Ordering::SeqCst);
        inner.running.store(true, Ordering::SeqCst);
        inner.attach_dom_listeners().await;

        for result in static_results {
            inner.report(result).await;
        }
        Ok(())
    }

    async fn stop(&self) -> FrameResult<()> {
        let inner = &self.inner;
        inner.running.store(false, Ordering::SeqCst);
        inner.run_generation.fetch_add(1, Ordering::SeqCst);
        inner.detach_dom_listeners().await;

        let Some(state) = inner.state.lock().await.take() else {
            debug!("Stop requested while idle");
            return Ok(());
        };
        for result in inner.evaluator.keyboard_navigation_results(&state.unvisited()) {
            inner.report(result).await;
        }
        Ok(())
    }

    fn transform_child_result_for_parent(
        &self,
        result: TabStopRequirementResult,
        frame: &FrameElement,
    ) -> TabStopRequirementResult {
        result.within_frame(self.inner.document.unique_selector(frame.element))
    }

    async fn handle_result_in_top_frame(&self, result: TabStopRequirementResult) -> FrameResult<()> {
        self.inner.collector.add(result).await;
        Ok(())
    }
}
