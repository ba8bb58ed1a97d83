//! # frame-relay: Cross-Frame Protocol for In-Page Accessibility Scanning
//!
//! A page is a tree of execution contexts: the top document and every nested
//! frame, each scheduled independently and reachable only by asynchronous
//! message passing. frame-relay lets one analysis run across that whole tree
//! and report its findings in the top context's coordinates.
//!
//! ## Layers
//!
//! ### 1. Host Capabilities
//! Contexts and elements are ephemeral handles resolved through the host:
//! - Frame tree lookups ([`host`])
//! - Document queries and DOM events ([`dom`])
//! - An in-memory implementation of both ([`page`])
//!
//! ### 2. Messaging
//! - Raw fire-and-forget channel ([`messaging::bus`])
//! - Correlated request/response between two contexts ([`messaging::messenger`])
//! - Ping-checked fan-out to child frames ([`messaging::fanout`])
//!
//! ### 3. Distributed Analyses
//! - Recursive start/stop and result bubbling ([`runner`])
//! - Keyboard navigation analysis ([`tab_stops`])
//! - Per-context wiring ([`scanner`])
//!
//! ### 4. Event Dispatch
//! A background-side hub routing named events to application callbacks, with
//! deferral for events that arrive before their callback ([`dispatch`]).
//!
//! ## Bounding
//!
//! Point-to-point sends never time out on their own. Every bound lives in the
//! layer that needs it and goes through [`timeout::race`]; the durations come
//! from [`config::FrameRelayConfig`]. A timed-out participant is treated as
//! absent and never retried. Batches settle through [`merge::merge_all`], which
//! never short-circuits.
//!
//! ```text
//! top context ── start ──▶ child ── start ──▶ grandchild
//!      ▲                     │                     │
//!      └── result (A > B) ◀──┴── result (B) ◀──────┘
//! ```

pub mod config;
pub mod dispatch;
pub mod dom;
pub mod error;
pub mod host;
pub mod merge;
pub mod messaging;
pub mod page;
pub mod runner;
pub mod scanner;
pub mod tab_stops;
pub mod timeout;

// Re-exports
pub use config::FrameRelayConfig;
pub use error::*;
pub use host::{ContextId, ElementId, FrameElement, FrameHost};
pub use runner::{AllFrameRunner, AllFrameRunnerTarget};
pub use scanner::{FrameScanner, ScanSession};
