//! Wire types and reserved command names shared by every context.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Prefix owned by the protocol. Application commands must not use it.
pub const RESERVED_PREFIX: &str = "frame-relay.";

pub const PING_COMMAND: &str = "frame-relay.ping";

const START_RUNNER_COMMAND: &str = "frame-relay.runner.start";
const STOP_RUNNER_COMMAND: &str = "frame-relay.runner.stop";
const RESULT_FROM_CHILD_COMMAND: &str = "frame-relay.runner.result-from-child";

pub fn is_reserved_command(name: &str) -> bool {
    name.starts_with(RESERVED_PREFIX)
}

/// The only acceptable payload of a ping response.
pub fn ping_ready_payload() -> Value {
    json!({ "status": "ready" })
}

/// Reserved command names for one distributed runner, namespaced by its suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerCommands {
    pub start: String,
    pub stop: String,
    pub result_from_child: String,
}

impl RunnerCommands {
    pub fn for_suffix(suffix: &str) -> Self {
        Self {
            start: format!("{}-{}", START_RUNNER_COMMAND, suffix),
            stop: format!("{}-{}", STOP_RUNNER_COMMAND, suffix),
            result_from_child: format!("{}-{}", RESULT_FROM_CHILD_COMMAND, suffix),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub name: String,
    #[serde(default)]
    pub payload: Value,
}

impl Command {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            payload: Value::Null,
        }
    }

    pub fn with_payload(name: &str, payload: Value) -> Self {
        Self {
            name: name.to_string(),
            payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CommandResponse {
    /// `Value::Null` means the responder had nothing to say.
    pub payload: Value,
}

impl CommandResponse {
    pub fn new(payload: Value) -> Self {
        Self { payload }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ResponseOutcome {
    Success { payload: Value },
    Failure { message: String },
}

/// Envelope posted across the raw channel. The correlation id is unrelated to any
/// id the underlying transport may assign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WindowMessage {
    #[serde(rename = "CommandMessageRequest")]
    Request {
        command_message_id: String,
        command: String,
        #[serde(default)]
        payload: Value,
    },
    #[serde(rename = "CommandMessageResponse")]
    Response {
        request_command_message_id: String,
        outcome: ResponseOutcome,
    },
}

impl WindowMessage {
    pub fn marshal(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Returns `None` for traffic that is not ours; pages post all sorts of messages.
    pub fn unmarshal(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}
