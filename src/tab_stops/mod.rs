//! Keyboard navigation analysis: tab order, keyboard traps, and unreachable
//! tab stops, evaluated per context and reported to the top frame.

pub mod collector;
pub mod evaluator;
pub mod focus_traps;
pub mod orchestrator;
pub mod result;
pub mod state;

pub use collector::{CollectedResult, TabStopResultCollector};
pub use evaluator::TabStopsRequirementEvaluator;
pub use focus_traps::FocusTrapsHandler;
pub use orchestrator::{TabStopRequirementOrchestrator, TAB_STOPS_COMMAND_SUFFIX};
pub use result::{TabStopRequirementId, TabStopRequirementResult};
pub use state::TabStopsState;
