use std::collections::HashSet;

use crate::host::ElementId;

/// Per-context bookkeeping for one tab-stop run.
#[derive(Debug, Clone, Default)]
pub struct TabStopsState {
    pub ordered_tabbable: Vec<ElementId>,
    pub visited: HashSet<ElementId>,
    pub most_recent: Option<ElementId>,
}

impl TabStopsState {
    pub fn new(ordered_tabbable: Vec<ElementId>) -> Self {
        Self {
            ordered_tabbable,
            ..Default::default()
        }
    }

    /// Records a focus move and returns the element to compare against, if any.
    ///
    /// The first focus and revisits of an already visited element are recorded
    /// without comparison.
    pub fn record_focus(&mut self, element: ElementId) -> Option<ElementId> {
        let previous = self.most_recent.replace(element);
        if !self.visited.insert(element) {
            return None;
        }
        previous
    }

    pub fn unvisited(&self) -> Vec<ElementId> {
        self.ordered_tabbable
            .iter()
            .filter(|element| !self.visited.contains(element))
            .copied()
            .collect()
    }
}
