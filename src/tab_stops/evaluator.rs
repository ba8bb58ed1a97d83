//! Turns document facts into requirement results.

use std::{cmp::Ordering, sync::Arc};

use crate::{
    dom::Document,
    host::ElementId,
    tab_stops::result::{TabStopRequirementId, TabStopRequirementResult},
};

pub struct TabStopsRequirementEvaluator {
    document: Arc<dyn Document>,
}

impl TabStopsRequirementEvaluator {
    pub fn new(document: Arc<dyn Document>) -> Self {
        Self { document }
    }

    /// Static tab-order findings: every consecutive pair in tab order whose later
    /// element sits earlier in the document.
    pub fn tabbable_focus_order_results(&self, tabbable: &[ElementId]) -> Vec<TabStopRequirementResult> {
        tabbable
            .windows(2)
            .filter_map(|pair| self.focus_order_result(pair[0], pair[1]))
            .collect()
    }

    /// A tab-order finding when `current` received focus after `previous` but
    /// precedes it in the document.
    pub fn focus_order_result(&self, previous: ElementId, current: ElementId) -> Option<TabStopRequirementResult> {
        if self.document.compare_document_position(current, previous) != Ordering::Less {
            return None;
        }
        Some(self.result_for(
            TabStopRequirementId::TabOrder,
            current,
            format!(
                "The focus order is inconsistent with the document order: {} received focus after {}",
                self.document.unique_selector(current),
                self.document.unique_selector(previous)
            ),
        ))
    }

    pub fn keyboard_trap_result(&self, element: ElementId) -> TabStopRequirementResult {
        self.result_for(
            TabStopRequirementId::KeyboardTraps,
            element,
            format!(
                "Focus is trapped on {}: pressing Tab did not move focus",
                self.document.unique_selector(element)
            ),
        )
    }

    /// One keyboard-navigation finding per tabbable element that never received focus.
    pub fn keyboard_navigation_results(&self, unreachable: &[ElementId]) -> Vec<TabStopRequirementResult> {
        unreachable
            .iter()
            .map(|element| {
                self.result_for(
                    TabStopRequirementId::KeyboardNavigation,
                    *element,
                    format!(
                        "{} was not reachable using the keyboard",
                        self.document.unique_selector(*element)
                    ),
                )
            })
            .collect()
    }

    fn result_for(
        &self,
        requirement_id: TabStopRequirementId,
        element: ElementId,
        description: String,
    ) -> TabStopRequirementResult {
        TabStopRequirementResult {
            requirement_id,
            description,
            selector: vec![self.document.unique_selector(element)],
            html: self.document.outer_html(element),
        }
    }
}
