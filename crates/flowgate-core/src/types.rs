//! Data types exchanged with the flow service and the gateway's callers.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::{ErrorKind, GatewayError, GatewayResult};

/// Read-only flow descriptor returned by the flow service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flow {
    /// Opaque, unique identifier
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_component: bool,
    #[serde(default)]
    pub mcp_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_description: Option<String>,
}

impl Flow {
    /// Create a flow descriptor with only an id and a name set
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            tags: Vec::new(),
            is_component: false,
            mcp_enabled: false,
            folder_id: None,
            endpoint_name: None,
            access_type: None,
            action_name: None,
            action_description: None,
        }
    }
}

/// Flows parsed out of a listing response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFlows {
    /// Records that passed validation, in upstream order
    pub flows: Vec<Flow>,
    /// Number of records rejected
    pub dropped: usize,
}

/// Parse a flow listing body.
///
/// The flow service answers either with a bare array or with an object
/// wrapping the array under `flows`. Records that fail to deserialize or
/// carry an empty `id` are dropped and counted, not treated as a failure.
pub fn parse_flow_listing(body: Value) -> GatewayResult<ParsedFlows> {
    let records = match body {
        Value::Array(records) => records,
        Value::Object(mut object) => match object.remove("flows") {
            Some(Value::Array(records)) => records,
            _ => {
                return Err(GatewayError::ResponseMalformed(
                    "flow listing object has no 'flows' array".to_string(),
                ))
            }
        },
        other => {
            return Err(GatewayError::ResponseMalformed(format!(
                "unexpected flow listing type: {}",
                json_type_name(&other)
            )))
        }
    };

    let mut parsed = ParsedFlows {
        flows: Vec::with_capacity(records.len()),
        dropped: 0,
    };

    for (index, record) in records.into_iter().enumerate() {
        match serde_json::from_value::<Flow>(record) {
            Ok(flow) if !flow.id.trim().is_empty() => parsed.flows.push(flow),
            Ok(_) => {
                warn!(index, "Dropping flow record with empty id");
                parsed.dropped += 1;
            }
            Err(e) => {
                warn!(index, error = %e, "Dropping invalid flow record");
                parsed.dropped += 1;
            }
        }
    }

    Ok(parsed)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Input and output mode of a flow run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IoType {
    #[default]
    Chat,
    Text,
}

impl fmt::Display for IoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoType::Chat => write!(f, "chat"),
            IoType::Text => write!(f, "text"),
        }
    }
}

/// Caller-built request to run a flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub input_value: String,
    #[serde(default)]
    pub output_type: IoType,
    #[serde(default)]
    pub input_type: IoType,
    /// Per-component overrides, passed through untouched
    #[serde(default)]
    pub tweaks: HashMap<String, Value>,
}

impl ExecutionRequest {
    /// Create a chat-in, chat-out request without tweaks
    pub fn new(input_value: impl Into<String>) -> Self {
        Self {
            input_value: input_value.into(),
            output_type: IoType::default(),
            input_type: IoType::default(),
            tweaks: HashMap::new(),
        }
    }

    pub fn with_output_type(mut self, output_type: IoType) -> Self {
        self.output_type = output_type;
        self
    }

    pub fn with_input_type(mut self, input_type: IoType) -> Self {
        self.input_type = input_type;
        self
    }

    pub fn with_tweak(mut self, key: impl Into<String>, value: Value) -> Self {
        self.tweaks.insert(key.into(), value);
        self
    }
}

/// Outcome of a flow run as seen by the caller.
///
/// Exactly one of `result` and `error` is set; the constructors are the
/// only way to build one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    success: bool,
    result: Option<Value>,
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<ErrorKind>,
}

impl ExecutionResult {
    /// Wrap an upstream payload
    pub fn succeeded(payload: Value) -> Self {
        Self {
            success: true,
            result: Some(payload),
            error: None,
            error_kind: None,
        }
    }

    /// Wrap a classified failure
    pub fn failed(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(message.into()),
            error_kind: Some(kind),
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error_kind
    }

    /// Take the payload out of a successful result
    pub fn into_result(self) -> Option<Value> {
        self.result
    }
}

impl From<&GatewayError> for ExecutionResult {
    fn from(err: &GatewayError) -> Self {
        ExecutionResult::failed(err.kind(), err.caller_message())
    }
}
