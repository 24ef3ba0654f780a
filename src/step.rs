//! Wire format of a single model step and its decoding into a tagged form.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::fence::strip_json_fence;

/// One phase of the start/think/action/observe/output protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Start,
    Think,
    Action,
    Observe,
    Output,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Start,
        Stage::Think,
        Stage::Action,
        Stage::Observe,
        Stage::Output,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Start => "start",
            Stage::Think => "think",
            Stage::Action => "action",
            Stage::Observe => "observe",
            Stage::Output => "output",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = StepDecodeError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == normalized)
            .ok_or_else(|| StepDecodeError::UnknownStage(raw.to_string()))
    }
}

#[derive(Debug, Error)]
pub enum StepDecodeError {
    #[error("model returned no text payload")]
    MissingPayload,

    #[error("response is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("unknown stage `{0}`")]
    UnknownStage(String),

    #[error("malformed functionCall: {0}")]
    MalformedFunctionCall(String),
}

/// What the model asked the driver to do in this step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepDirective {
    Action {
        tool: String,
        input: Map<String, Value>,
    },
    Output {
        text: String,
    },
    Think,
}

/// A decoded model step.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelStep {
    /// Stage the model declared, if any.
    pub stage: Option<Stage>,
    pub thought: String,
    pub directive: StepDirective,
}

impl ModelStep {
    /// Decode raw model text, stripping a code fence first.
    pub fn decode(raw: &str) -> Result<Self, StepDecodeError> {
        let text = strip_json_fence(raw);
        let value: Value = serde_json::from_str(&text)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, StepDecodeError> {
        let mut map = match value {
            Value::Object(map) => map,
            other => return Err(StepDecodeError::NotAnObject(json_kind(&other))),
        };

        let stage = match map.remove("stage") {
            None | Some(Value::Null) => None,
            Some(Value::String(raw)) => Some(raw.parse()?),
            Some(other) => return Err(StepDecodeError::UnknownStage(other.to_string())),
        };

        let thought = match map.remove("thought") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(text)) => text,
            Some(other) => other.to_string(),
        };

        let call = map.remove("functionCall").filter(|call| !is_falsy(call));
        let directive = match call {
            None => match map.remove("output") {
                None | Some(Value::Null) => StepDirective::Think,
                Some(Value::String(text)) => StepDirective::Output { text },
                Some(other) => StepDirective::Output {
                    text: other.to_string(),
                },
            },
            Some(call) => decode_function_call(call)?,
        };

        Ok(Self {
            stage,
            thought,
            directive,
        })
    }
}

/// `false`, `0` and `""` count as "no call", like an absent field.
fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(text) => text.is_empty(),
        _ => false,
    }
}

fn decode_function_call(call: Value) -> Result<StepDirective, StepDecodeError> {
    let mut call = match call {
        Value::Object(map) => map,
        other => {
            return Err(StepDecodeError::MalformedFunctionCall(format!(
                "expected an object, got {}",
                json_kind(&other)
            )))
        }
    };

    let tool = match call.remove("tool") {
        Some(Value::String(tool)) if !tool.is_empty() => tool,
        Some(_) => {
            return Err(StepDecodeError::MalformedFunctionCall(
                "`tool` must be a non-empty string".into(),
            ))
        }
        None => {
            return Err(StepDecodeError::MalformedFunctionCall(
                "missing `tool`".into(),
            ))
        }
    };

    let input = match call.remove("input") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(input)) => input,
        Some(other) => {
            return Err(StepDecodeError::MalformedFunctionCall(format!(
                "`input` for `{tool}` must be an object, got {}",
                json_kind(&other)
            )))
        }
    };

    Ok(StepDirective::Action { tool, input })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
