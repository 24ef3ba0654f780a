use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::tool::{ToolRegistry, TypedTool};

/// The registry the demo loop ships with: `getTime`, `addNumbers` and `echo`.
pub fn basic_toolkit() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register_typed(GetTimeTool);
    registry.register_typed(AddNumbersTool);
    registry.register_typed(EchoTool);
    registry
}

#[derive(Debug, Deserialize)]
pub struct NoArgs {}

#[derive(Debug, Serialize)]
pub struct TimeReading {
    pub time: String,
}

pub struct GetTimeTool;

impl TypedTool for GetTimeTool {
    type Input = NoArgs;
    type Output = TimeReading;

    fn name(&self) -> &'static str {
        "getTime"
    }

    fn description(&self) -> &'static str {
        "Return the current UTC time as an ISO-8601 timestamp. Takes no input."
    }

    fn run(&self, _input: NoArgs) -> TimeReading {
        TimeReading {
            time: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AddInput {
    pub a: f64,
    pub b: f64,
}

#[derive(Debug, Serialize)]
pub struct AddOutput {
    pub result: String,
}

pub struct AddNumbersTool;

impl TypedTool for AddNumbersTool {
    type Input = AddInput;
    type Output = AddOutput;

    fn name(&self) -> &'static str {
        "addNumbers"
    }

    fn description(&self) -> &'static str {
        "Add two numbers. Expects {\"a\": number, \"b\": number}."
    }

    fn parameters(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {"a": {"type": "number"}, "b": {"type": "number"}},
            "required": ["a", "b"]
        }))
    }

    fn run(&self, input: AddInput) -> AddOutput {
        AddOutput {
            result: format!("{} from function", input.a + input.b),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct EchoInput {
    #[serde(default)]
    pub message: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct EchoOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub echoed: Option<Value>,
}

pub struct EchoTool;

impl TypedTool for EchoTool {
    type Input = EchoInput;
    type Output = EchoOutput;

    fn name(&self) -> &'static str {
        "echo"
    }

    fn description(&self) -> &'static str {
        "Echo `message` back unchanged. Expects {\"message\": any}."
    }

    fn run(&self, input: EchoInput) -> EchoOutput {
        EchoOutput {
            echoed: input.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn adds_numbers_into_sentence() {
        let registry = basic_toolkit();
        let result = registry
            .invoke("addNumbers", &object(json!({"a": 5, "b": 7})))
            .await;
        assert_eq!(result, json!({"result": "12 from function"}));

        let result = registry
            .invoke("addNumbers", &object(json!({"a": 1.5, "b": 2})))
            .await;
        assert_eq!(result, json!({"result": "3.5 from function"}));
    }

    #[tokio::test]
    async fn get_time_is_iso_8601() {
        let registry = basic_toolkit();
        let result = registry.invoke("getTime", &Map::new()).await;
        let time = result["time"].as_str().unwrap();
        assert!(time.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(time).is_ok());
    }

    #[tokio::test]
    async fn no_arg_call_matches_empty_object() {
        let registry = basic_toolkit();
        let tool = registry.get("echo").unwrap();
        let without = tool.call(None).await.unwrap();
        let with_empty = tool.call(Some(json!({}))).await.unwrap();
        assert_eq!(without, with_empty);
        assert_eq!(without, json!({}));
    }

    #[tokio::test]
    async fn echo_returns_message_unchanged() {
        let registry = basic_toolkit();
        let result = registry
            .invoke("echo", &object(json!({"message": {"nested": [1, 2]}})))
            .await;
        assert_eq!(result, json!({"echoed": {"nested": [1, 2]}}));
    }

    #[tokio::test]
    async fn add_without_operands_reports_error() {
        let registry = basic_toolkit();
        let result = registry.invoke("addNumbers", &Map::new()).await;
        assert!(result.get("error").is_some());
    }
}
