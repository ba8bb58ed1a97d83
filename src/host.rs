//! # Host Capability Surface
//!
//! Execution contexts (a top document and its nested frames) are never owned by this
//! crate. They are addressed through cheap, copyable handles that the host hands out
//! and resolves again on every use, because navigation can create or destroy a context
//! at any moment.
//!
//! [`FrameHost`] is the per-context view of the host: each context gets its own
//! instance, the same way each frame sees its own `window`.

use std::fmt;

use mockall::automock;
use serde::{Deserialize, Serialize};

/// Handle for one execution context. Equality is the only meaningful operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContextId(pub u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "context#{}", self.0)
    }
}

/// Handle for one element inside a context's document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(pub u64);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "element#{}", self.0)
    }
}

/// A child frame element as enumerated from the owning document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameElement {
    pub element: ElementId,
    /// Raw value of the `sandbox` attribute, if present.
    pub sandbox: Option<String>,
}

impl FrameElement {
    pub fn new(element: ElementId) -> Self {
        Self {
            element,
            sandbox: None,
        }
    }

    pub fn sandboxed(element: ElementId, sandbox: &str) -> Self {
        Self {
            element,
            sandbox: Some(sandbox.to_string()),
        }
    }

    /// A frame supports scripting unless it carries a sandbox attribute without
    /// the `allow-scripts` token.
    pub fn allows_scripts(&self) -> bool {
        match &self.sandbox {
            None => true,
            Some(tokens) => tokens
                .split_whitespace()
                .any(|token| token.eq_ignore_ascii_case("allow-scripts")),
        }
    }
}

impl PartialEq for FrameElement {
    fn eq(&self, other: &Self) -> bool {
        self.element == other.element
    }
}

impl Eq for FrameElement {}

impl fmt::Display for FrameElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame({})", self.element)
    }
}

/// Structural lookups a context can perform on its own surroundings.
#[automock]
pub trait FrameHost: Send + Sync {
    /// The context this host view belongs to.
    fn current_context(&self) -> ContextId;

    fn is_top_context(&self) -> bool;

    /// `None` for the top context.
    fn parent_context(&self) -> Option<ContextId>;

    /// Direct child frame elements of the current document, in document order.
    fn child_frames(&self) -> Vec<FrameElement>;

    /// The inner execution context of a frame element, if it has a live one.
    fn content_context(&self, frame: &FrameElement) -> Option<ContextId>;

    /// Which frame element of the current document owns `context`, if any.
    fn frame_for_context(&self, context: ContextId) -> Option<FrameElement> {
        self.child_frames()
            .into_iter()
            .find(|frame| self.content_context(frame) == Some(context))
    }
}
