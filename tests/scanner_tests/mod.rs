mod dispatch_test;
mod fanout_test;
mod keyboard_trap_test;
mod tab_order_test;

use std::sync::Arc;

use frame_relay::{
    page::{DocumentSpec, SimulatedDocument, SimulatedPage},
    tab_stops::TabStopRequirementId,
    ElementId, FrameRelayConfig, ScanSession,
};
use serde_json::Value;

pub fn page_from(spec: Value) -> SimulatedPage {
    let spec: DocumentSpec = serde_json::from_value(spec).expect("valid page spec");
    SimulatedPage::from_spec(&spec)
}

pub fn session_for(spec: Value) -> ScanSession {
    ScanSession::new(page_from(spec), FrameRelayConfig::default()).expect("session attaches")
}

pub fn document(session: &ScanSession, frame_path: &[&str]) -> Arc<SimulatedDocument> {
    let path: Vec<String> = frame_path.iter().map(|s| s.to_string()).collect();
    let context = session.page().resolve(&path).expect("frame path resolves");
    session.page().document(context).expect("context has a document")
}

pub fn element(document: &SimulatedDocument, selector: &str) -> ElementId {
    document
        .element_by_selector(selector)
        .unwrap_or_else(|| panic!("no element {}", selector))
}

/// (requirement, selector path) of every collected finding, in collection order.
pub async fn findings(session: &ScanSession) -> Vec<(TabStopRequirementId, Vec<String>)> {
    session
        .top()
        .expect("top scanner")
        .tab_stop_results()
        .await
        .into_iter()
        .map(|result| (result.requirement_id, result.selector))
        .collect()
}

pub fn path(selectors: &[&str]) -> Vec<String> {
    selectors.iter().map(|s| s.to_string()).collect()
}
