use serde::{Deserialize, Serialize};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum TabStopRequirementId {
    KeyboardNavigation,
    KeyboardTraps,
    TabOrder,
}

/// One finding. `selector` is a path of per-document selectors, outermost first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TabStopRequirementResult {
    pub requirement_id: TabStopRequirementId,
    pub description: String,
    pub selector: Vec<String>,
    pub html: String,
}

impl TabStopRequirementResult {
    /// Prepends the selector of the frame element that contains the reporting document.
    pub fn within_frame(mut self, frame_selector: String) -> Self {
        self.selector.insert(0, frame_selector);
        self
    }
}
