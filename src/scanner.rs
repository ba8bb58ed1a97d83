//! Per-context wiring of the messaging stack and the tab-stop analysis.

use std::{collections::BTreeMap, sync::Arc};

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::{
    config::FrameRelayConfig,
    dom::Document,
    host::{ContextId, FrameHost},
    messaging::{bus::WindowBus, fanout::AllFramesMessenger, messenger::FrameMessenger},
    page::SimulatedPage,
    runner::AllFrameRunner,
    tab_stops::{orchestrator::TabStopRequirementOrchestrator, CollectedResult, TabStopRequirementResult},
    Error, FrameResult,
};

/// Everything one context runs: messenger, fan-out, and the tab-stop runner.
pub struct FrameScanner {
    context: ContextId,
    messenger: FrameMessenger,
    fanout: Arc<AllFramesMessenger>,
    tab_stops: Arc<AllFrameRunner<TabStopRequirementOrchestrator>>,
    pump: JoinHandle<()>,
}

impl FrameScanner {
    /// Registers every listener of this context and starts pumping the bus.
    pub fn attach(
        bus: &Arc<WindowBus>,
        host: Arc<dyn FrameHost>,
        document: Arc<dyn Document>,
        config: &FrameRelayConfig,
    ) -> FrameResult<Self> {
        let context = host.current_context();
        let messenger = FrameMessenger::new(Arc::new(bus.poster(context)), host.clone());
        let fanout = AllFramesMessenger::new(messenger.clone(), host.clone(), config.ping_timeout)?;
        let orchestrator = Arc::new(TabStopRequirementOrchestrator::new(document, config));
        let tab_stops = AllFrameRunner::new(messenger.clone(), host, orchestrator, config.frame_command_timeout)?;
        let pump = messenger.listen(bus.subscribe());
        debug!("Scanner attached to {}", context);

        Ok(Self {
            context,
            messenger,
            fanout,
            tab_stops,
            pump,
        })
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn messenger(&self) -> &FrameMessenger {
        &self.messenger
    }

    pub fn fanout(&self) -> &Arc<AllFramesMessenger> {
        &self.fanout
    }

    pub async fn initialize_frames(&self) -> FrameResult<()> {
        Ok(self.fanout.initialize_all_frames().await?)
    }

    pub async fn start_tab_stops(&self) -> FrameResult<()> {
        self.tab_stops.start().await
    }

    pub async fn stop_tab_stops(&self) -> FrameResult<()> {
        self.tab_stops.stop().await
    }

    pub fn is_running(&self) -> bool {
        self.tab_stops.target().is_running()
    }

    /// Results gathered by this context's top-frame sink.
    pub async fn tab_stop_results(&self) -> Vec<TabStopRequirementResult> {
        self.tab_stops.target().collector().results().await
    }

    pub async fn collected_tab_stop_results(&self) -> Vec<CollectedResult> {
        self.tab_stops.target().collector().collected().await
    }
}

impl Drop for FrameScanner {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// A simulated page with a scanner attached to every live context.
pub struct ScanSession {
    page: SimulatedPage,
    bus: Arc<WindowBus>,
    config: FrameRelayConfig,
    scanners: BTreeMap<ContextId, FrameScanner>,
}

impl ScanSession {
    pub fn new(page: SimulatedPage, config: FrameRelayConfig) -> FrameResult<Self> {
        config.validate()?;
        let bus = Arc::new(WindowBus::new(config.bus_capacity));
        let mut session = Self {
            page,
            bus,
            config,
            scanners: BTreeMap::new(),
        };
        for context in session.page.contexts() {
            session.attach(context)?;
        }
        info!("Scan session attached to {} context(s)", session.scanners.len());
        Ok(session)
    }

    /// Attaches a scanner to a context that was added after the session started.
    pub fn attach(&mut self, context: ContextId) -> FrameResult<()> {
        let document = self
            .page
            .document(context)
            .ok_or_else(|| Error::internal(format!("{} has no document", context)))?;
        let scanner = FrameScanner::attach(&self.bus, self.page.host(context), document, &self.config)?;
        self.scanners.insert(context, scanner);
        Ok(())
    }

    pub fn page(&self) -> &SimulatedPage {
        &self.page
    }

    pub fn scanner(&self, context: ContextId) -> Option<&FrameScanner> {
        self.scanners.get(&context)
    }

    pub fn top(&self) -> FrameResult<&FrameScanner> {
        self.scanner(self.page.top())
            .ok_or_else(|| Error::internal("top context has no scanner"))
    }
}
