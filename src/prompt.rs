//! The request payload sent to the model on every iteration.

use serde::Serialize;
use serde_json::Value;

use crate::state::{AgentState, StepRecord};
use crate::step::Stage;

pub const STEP_FORMAT: &str =
    "Always return valid JSON with keys: {stage, thought, functionCall?, output?}";

const PROTOCOL: &str = r#"You are a helpful AI assistant designed to resolve the user's query.
You work in START, THINK, ACTION, OBSERVE and OUTPUT stages.
In the START stage the user gives you a query.
Then you THINK about how to resolve it, a few times if needed. If a tool is needed, emit an ACTION step with a functionCall naming the tool and its input, then wait for the OBSERVE step that carries the tool result in `goal`.
Based on the OBSERVE step you either produce the OUTPUT or continue the loop.
Return exactly one JSON step object per reply, with keys {stage, thought, functionCall?, output?}.
functionCall has the shape {"tool": string, "input": object}.
NEVER return anything other than JSON. NEVER return markdown. Do NOT include multiple stages or code fences.
Example reply:
    {"stage": "think", "thought": "I should use addNumbers with 5 and 7"}
    {"stage": "action", "thought": "Calling addNumbers", "functionCall": {"tool": "addNumbers", "input": {"a": 5, "b": 7}}}
    {"stage": "output", "thought": "I have the sum", "output": "5 + 7 is 12"}"#;

/// Serialised form of one request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepPrompt<'a> {
    pub instruction: String,
    pub current_stage: Stage,
    pub goal: &'a Value,
    pub history: &'a [StepRecord],
    pub format: &'static str,
}

impl<'a> StepPrompt<'a> {
    pub fn new(state: &'a AgentState, tool_names: &[String]) -> Self {
        Self {
            instruction: instruction(tool_names),
            current_stage: state.stage,
            goal: &state.goal,
            history: &state.history,
            format: STEP_FORMAT,
        }
    }

    pub fn render(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

pub fn instruction(tool_names: &[String]) -> String {
    let tools = if tool_names.is_empty() {
        "none".to_string()
    } else {
        tool_names.join(", ")
    };
    format!("{PROTOCOL}\nAvailable Tools: {tools}")
}
