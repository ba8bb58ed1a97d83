//! Top-frame sink for tab-stop results.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::tab_stops::result::{TabStopRequirementId, TabStopRequirementResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectedResult {
    pub result: TabStopRequirementResult,
    pub received_at: DateTime<Utc>,
}

#[derive(Default)]
struct CollectorState {
    seen: HashSet<(TabStopRequirementId, Vec<String>, String)>,
    results: Vec<CollectedResult>,
}

/// Keeps every distinct result in first-seen order.
///
/// Two results are the same finding when requirement, selector path and html
/// match; a repeat (for example from tabbing through the same out-of-order pair
/// twice) is dropped.
#[derive(Default)]
pub struct TabStopResultCollector {
    state: Mutex<CollectorState>,
}

impl TabStopResultCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the result was already collected.
    pub async fn add(&self, result: TabStopRequirementResult) -> bool {
        let mut state = self.state.lock().await;
        let key = (result.requirement_id, result.selector.clone(), result.html.clone());
        if !state.seen.insert(key) {
            debug!("Dropping duplicate {} result", result.requirement_id);
            return false;
        }
        info!(
            "{} finding at {}",
            result.requirement_id,
            result.selector.join(" > ")
        );
        state.results.push(CollectedResult {
            result,
            received_at: Utc::now(),
        });
        true
    }

    pub async fn results(&self) -> Vec<TabStopRequirementResult> {
        let state = self.state.lock().await;
        state.results.iter().map(|c| c.result.clone()).collect()
    }

    pub async fn collected(&self) -> Vec<CollectedResult> {
        self.state.lock().await.results.clone()
    }
}
