use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::step::Stage;

/// A tool invocation as recorded in the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub tool: String,
    pub input: Map<String, Value>,
    pub result: Value,
}

/// One entry of the loop history. Appended once and never changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub stage: Stage,
    pub thought: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// Conversation state owned by a single loop run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub stage: Stage,
    /// Starts as the user's request; replaced by the latest tool result.
    pub goal: Value,
    pub history: Vec<StepRecord>,
}

impl AgentState {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            stage: Stage::Start,
            goal: Value::String(goal.into()),
            history: Vec::new(),
        }
    }

    pub(crate) fn record_action(
        &mut self,
        thought: String,
        tool: String,
        input: Map<String, Value>,
        result: Value,
    ) {
        self.history.push(StepRecord {
            stage: self.stage,
            thought,
            action: Some(ActionRecord {
                tool,
                input,
                result: result.clone(),
            }),
            output: None,
        });
        self.stage = Stage::Observe;
        self.goal = result;
    }

    pub(crate) fn record_reply(
        &mut self,
        thought: String,
        output: Option<String>,
        next: Option<Stage>,
    ) {
        self.history.push(StepRecord {
            stage: self.stage,
            thought,
            action: None,
            output,
        });
        self.stage = next.unwrap_or(Stage::Output);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn action_overwrites_goal_and_moves_to_observe() {
        let mut state = AgentState::new("sum 5+7");
        state.record_action(
            "add them".into(),
            "addNumbers".into(),
            json!({"a": 5, "b": 7}).as_object().cloned().unwrap(),
            json!({"result": "12 from function"}),
        );

        assert_eq!(state.stage, Stage::Observe);
        assert_eq!(state.goal, json!({"result": "12 from function"}));
        assert_eq!(state.history[0].stage, Stage::Start);
    }

    #[test]
    fn reply_defaults_to_output_stage() {
        let mut state = AgentState::new("hi");
        state.record_reply("thinking".into(), None, None);
        assert_eq!(state.stage, Stage::Output);
        assert_eq!(state.goal, json!("hi"));
    }

    #[test]
    fn history_omits_absent_fields() {
        let record = StepRecord {
            stage: Stage::Think,
            thought: "t".into(),
            action: None,
            output: None,
        };
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({"stage": "think", "thought": "t"})
        );
    }
}
