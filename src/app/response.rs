//! Command-correlated responses.
//!
//! Exactly one response per parsed command, pushed onto the response
//! queue and serialized by the BLE loop as
//! `{"type":"command_response","id":…,"status":"success","result":{…}}`
//! or `{"type":"command_response","id":…,"status":"error",
//! "data":{"errorCode":…,"errorMessage":…}}`.

use crate::error::SystemErrorCode;
use serde_json::{Map, Value, json};

/// Outcome payload of a [`CommandResponse`].
#[derive(Debug, Clone)]
pub enum ResponseOutcome {
    Success(Map<String, Value>),
    Failure {
        code: SystemErrorCode,
        message: heapless::String<128>,
    },
}

/// A reply correlated to a client command by `id`.
#[derive(Debug, Clone)]
pub struct CommandResponse {
    pub id: heapless::String<32>,
    pub timestamp_ms: u64,
    pub outcome: ResponseOutcome,
}

impl CommandResponse {
    pub fn success(id: &str, timestamp_ms: u64, result: Map<String, Value>) -> Self {
        Self {
            id: bounded(id),
            timestamp_ms,
            outcome: ResponseOutcome::Success(result),
        }
    }

    pub fn failure(id: &str, timestamp_ms: u64, code: SystemErrorCode, message: &str) -> Self {
        let mut msg = heapless::String::new();
        let _ = msg.push_str(&message[..message.len().min(128)]);
        Self {
            id: bounded(id),
            timestamp_ms,
            outcome: ResponseOutcome::Failure { code, message: msg },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ResponseOutcome::Success(_))
    }

    /// Serialize to the response wire shape.
    pub fn to_json(&self) -> Value {
        match &self.outcome {
            ResponseOutcome::Success(result) => json!({
                "type": "command_response",
                "id": self.id.as_str(),
                "status": "success",
                "result": Value::Object(result.clone()),
            }),
            ResponseOutcome::Failure { code, message } => json!({
                "type": "command_response",
                "id": self.id.as_str(),
                "status": "error",
                "data": {
                    "errorCode": code.code(),
                    "errorMessage": message.as_str(),
                },
            }),
        }
    }
}

fn bounded(id: &str) -> heapless::String<32> {
    let mut s = heapless::String::new();
    let _ = s.push_str(&id[..id.len().min(32)]);
    s
}
