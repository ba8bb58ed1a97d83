//! Keyboard trap detection. A Tab press that leaves focus where it was after a
//! short delay means the element keeps keyboard users stuck.

use std::{sync::Arc, time::Duration};

use tracing::debug;

use crate::{
    dom::Document,
    host::ElementId,
    tab_stops::{evaluator::TabStopsRequirementEvaluator, result::TabStopRequirementResult},
};

pub struct FocusTrapsHandler {
    document: Arc<dyn Document>,
    evaluator: Arc<TabStopsRequirementEvaluator>,
    delay: Duration,
}

impl FocusTrapsHandler {
    pub fn new(document: Arc<dyn Document>, evaluator: Arc<TabStopsRequirementEvaluator>, delay: Duration) -> Self {
        Self {
            document,
            evaluator,
            delay,
        }
    }

    /// The element that held focus when Tab went down. Nothing or the body means
    /// there is nothing to check.
    pub fn focused_before_tab(&self) -> Option<ElementId> {
        let focused = self.document.active_element()?;
        if focused == self.document.body() {
            return None;
        }
        Some(focused)
    }

    pub async fn check_for_trap(&self, focused: ElementId) -> Option<TabStopRequirementResult> {
        tokio::time::sleep(self.delay).await;
        if self.document.active_element() != Some(focused) {
            return None;
        }
        debug!("Focus stayed on {} after Tab", focused);
        Some(self.evaluator.keyboard_trap_result(focused))
    }
}
