//! Document capability surface consumed by the tab-stop analysis.

use std::{cmp::Ordering, sync::Arc};

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::host::ElementId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum DomEventKind {
    FocusIn,
    KeyDown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DomEvent {
    FocusIn { target: ElementId },
    KeyDown { key: String },
}

impl DomEvent {
    pub fn kind(&self) -> DomEventKind {
        match self {
            DomEvent::FocusIn { .. } => DomEventKind::FocusIn,
            DomEvent::KeyDown { .. } => DomEventKind::KeyDown,
        }
    }
}

/// DOM event listener. The returned future completes when the listener's work
/// (including any deferred checks) is done.
pub type DomListener = Arc<dyn Fn(DomEvent) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(pub u64);

pub trait Document: Send + Sync {
    fn body(&self) -> ElementId;

    /// Currently focused element. `None` when nothing (not even the body) has focus.
    fn active_element(&self) -> Option<ElementId>;

    /// Elements reachable by sequential keyboard navigation, in tab order.
    fn tabbable_elements(&self) -> Vec<ElementId>;

    /// Relative position of `a` with respect to `b` in document order.
    fn compare_document_position(&self, a: ElementId, b: ElementId) -> Ordering;

    fn unique_selector(&self, element: ElementId) -> String;

    fn outer_html(&self, element: ElementId) -> String;

    fn add_event_listener(&self, kind: DomEventKind, listener: DomListener) -> ListenerHandle;

    fn remove_event_listener(&self, handle: ListenerHandle);
}
