use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::Result;
use crate::llm::LanguageModel;
use crate::prompt::StepPrompt;
use crate::state::{AgentState, StepRecord};
use crate::step::{ModelStep, Stage, StepDecodeError, StepDirective};
use crate::tool::ToolRegistry;

/// When the loop should stop on its own.
///
/// A decode failure always ends the loop regardless of the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminationPolicy {
    pub max_steps: Option<usize>,
    /// Stop after a non-tool step leaves the state in the output stage.
    pub stop_on_output: bool,
}

impl TerminationPolicy {
    /// Only a decode failure stops the loop.
    pub fn unbounded() -> Self {
        Self {
            max_steps: None,
            stop_on_output: false,
        }
    }

    /// Cap the run at `max_steps` model steps; `0` removes the cap.
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = Some(max_steps).filter(|limit| *limit > 0);
        self
    }
}

impl Default for TerminationPolicy {
    fn default() -> Self {
        Self {
            max_steps: Some(16),
            stop_on_output: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum StopReason {
    DecodeFailed(String),
    OutputReached,
    StepLimit,
}

/// Summary of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct LoopReport {
    pub run_id: Uuid,
    pub steps: usize,
    pub stop: StopReason,
    pub state: AgentState,
}

impl LoopReport {
    pub fn history(&self) -> &[StepRecord] {
        &self.state.history
    }

    /// Text of the last step that carried an output, if any.
    pub fn final_output(&self) -> Option<&str> {
        self.state
            .history
            .iter()
            .rev()
            .find_map(|record| record.output.as_deref())
    }
}

/// Drives the start/think/action/observe/output protocol against a model.
pub struct StageLoop<M: LanguageModel + ?Sized> {
    model: Arc<M>,
    tools: ToolRegistry,
    policy: TerminationPolicy,
    state: AgentState,
}

impl<M: LanguageModel + ?Sized> StageLoop<M> {
    pub fn new(model: Arc<M>) -> Self {
        Self {
            model,
            tools: ToolRegistry::new(),
            policy: TerminationPolicy::default(),
            state: AgentState::new(String::new()),
        }
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_policy(mut self, policy: TerminationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// State of the current or most recent run.
    pub fn state(&self) -> &AgentState {
        &self.state
    }

    /// Run the loop for `goal` until the policy or a decode failure stops it.
    ///
    /// A failed completion request is returned as an error; the state reached
    /// so far stays available through [`StageLoop::state`].
    pub async fn run(&mut self, goal: impl Into<String>) -> Result<LoopReport> {
        let run_id = Uuid::new_v4();
        let span = info_span!("stage_loop", %run_id);
        self.run_inner(run_id, goal.into()).instrument(span).await
    }

    async fn run_inner(&mut self, run_id: Uuid, goal: String) -> Result<LoopReport> {
        self.state = AgentState::new(goal);
        let tool_names = self.tools.names();
        let mut steps = 0usize;

        let stop = loop {
            if let Some(limit) = self.policy.max_steps {
                if steps >= limit {
                    info!(limit, "step limit reached");
                    break StopReason::StepLimit;
                }
            }

            info!(step = steps + 1, stage = %self.state.stage, "requesting next step");

            let prompt = StepPrompt::new(&self.state, &tool_names).render()?;
            let completion = self.model.generate(&prompt).await?;

            let decoded = completion
                .content
                .ok_or(StepDecodeError::MissingPayload)
                .and_then(|raw| {
                    debug!(raw = %raw, "model replied");
                    ModelStep::decode(&raw)
                });
            let step = match decoded {
                Ok(step) => step,
                Err(err) => {
                    warn!(error = %err, "failed to parse model step, stopping");
                    break StopReason::DecodeFailed(err.to_string());
                }
            };
            info!(stage = ?step.stage, thought = %step.thought, "model step");

            let reached_output = self.apply(step).await;
            steps += 1;

            if reached_output && self.policy.stop_on_output {
                break StopReason::OutputReached;
            }
        };

        info!(steps, stop = ?stop, "loop finished");
        Ok(LoopReport {
            run_id,
            steps,
            stop,
            state: self.state.clone(),
        })
    }

    /// Fold one step into the state. Returns true when a non-tool step left
    /// the state in the output stage.
    async fn apply(&mut self, step: ModelStep) -> bool {
        let ModelStep {
            stage,
            thought,
            directive,
        } = step;

        match directive {
            StepDirective::Action { tool, input } => {
                info!(tool = %tool, input = ?input, "calling function");
                let result = self.tools.invoke(&tool, &input).await;
                info!(tool = %tool, result = %result, "function result");
                self.state.record_action(thought, tool, input, result);
                false
            }
            StepDirective::Output { text } => {
                self.state.record_reply(thought, Some(text), stage);
                self.state.stage == Stage::Output
            }
            StepDirective::Think => {
                self.state.record_reply(thought, None, stage);
                self.state.stage == Stage::Output
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    use crate::llm::StubModel;
    use crate::toolkit::basic_toolkit;

    fn prompt_at(stub: &StubModel, index: usize) -> Value {
        serde_json::from_str(&stub.prompts()[index]).unwrap()
    }

    #[tokio::test]
    async fn tool_result_becomes_next_goal() {
        let model = StubModel::new(vec![
            r#"{"stage":"action","thought":"add","functionCall":{"tool":"addNumbers","input":{"a":5,"b":7}}}"#.into(),
            "not json".into(),
        ]);
        let mut agent = StageLoop::new(model.clone())
            .with_tools(basic_toolkit())
            .with_policy(TerminationPolicy::unbounded());

        let report = agent.run("sum 5+7").await.unwrap();

        let second = prompt_at(&model, 1);
        assert_eq!(second["goal"], json!({"result": "12 from function"}));
        assert_eq!(second["currentStage"], "observe");
        assert_eq!(report.steps, 1);
        assert!(matches!(report.stop, StopReason::DecodeFailed(_)));
    }

    #[tokio::test]
    async fn prose_reply_stops_without_more_requests() {
        let model = StubModel::new(vec![
            "Sure, here is the time!".into(),
            r#"{"stage":"output","output":"unused"}"#.into(),
        ]);
        let mut agent = StageLoop::new(model.clone()).with_policy(TerminationPolicy::unbounded());

        let report = agent.run("what time is it").await.unwrap();

        assert_eq!(model.prompts().len(), 1);
        assert_eq!(model.remaining(), 1);
        assert!(report.history().is_empty());
        assert!(matches!(report.stop, StopReason::DecodeFailed(_)));
    }

    #[tokio::test]
    async fn unknown_tool_result_flows_into_goal() {
        let model = StubModel::new(vec![
            r#"{"stage":"action","thought":"fly","functionCall":{"tool":"launch","input":{"x":1}}}"#.into(),
            r#"{"stage":"output","thought":"cannot","output":"no such tool"}"#.into(),
        ]);
        let mut agent = StageLoop::new(model.clone()).with_tools(basic_toolkit());

        let report = agent.run("launch").await.unwrap();

        assert_eq!(
            prompt_at(&model, 1)["goal"],
            json!({"error": "Function launch not found"})
        );
        assert_eq!(report.stop, StopReason::OutputReached);
        assert_eq!(report.final_output(), Some("no such tool"));
    }

    #[tokio::test]
    async fn reaching_output_does_not_stop_unbounded_loop() {
        let model = StubModel::new(vec![
            r#"{"stage":"output","thought":"done","output":"hi"}"#.into(),
            r#"{"stage":"think","thought":"again"}"#.into(),
            "```".into(),
        ]);
        let mut agent = StageLoop::new(model.clone()).with_policy(TerminationPolicy::unbounded());

        let report = agent.run("hi").await.unwrap();

        assert_eq!(report.steps, 2);
        assert_eq!(report.state.stage, Stage::Think);
        assert_eq!(model.prompts().len(), 3);
    }

    #[tokio::test]
    async fn step_limit_caps_requests() {
        let replies = (0..5)
            .map(|i| format!(r#"{{"stage":"think","thought":"pass {i}"}}"#))
            .collect();
        let model = StubModel::new(replies);
        let mut agent = StageLoop::new(model.clone())
            .with_policy(TerminationPolicy::unbounded().with_max_steps(3));

        let report = agent.run("loop").await.unwrap();

        assert_eq!(report.stop, StopReason::StepLimit);
        assert_eq!(report.steps, 3);
        assert_eq!(model.prompts().len(), 3);
    }

    #[tokio::test]
    async fn zero_step_limit_means_no_cap() {
        let policy = TerminationPolicy::default().with_max_steps(0);
        assert_eq!(policy.max_steps, None);
        assert!(policy.stop_on_output);

        let mut replies: Vec<String> = (0..4)
            .map(|i| format!(r#"{{"stage":"think","thought":"pass {i}"}}"#))
            .collect();
        replies.push("all done".into());
        let model = StubModel::new(replies);
        let mut agent = StageLoop::new(model.clone())
            .with_policy(TerminationPolicy::unbounded().with_max_steps(0));

        let report = agent.run("loop").await.unwrap();

        assert!(matches!(report.stop, StopReason::DecodeFailed(_)), "{:?}", report.stop);
        assert_eq!(model.prompts().len(), 5);
    }

    #[tokio::test]
    async fn missing_stage_defaults_to_output() {
        let model = StubModel::new(vec![r#"{"thought":"short","output":"bye"}"#.into()]);
        let mut agent = StageLoop::new(model);

        let report = agent.run("bye").await.unwrap();

        assert_eq!(report.state.stage, Stage::Output);
        assert_eq!(report.stop, StopReason::OutputReached);
        assert_eq!(report.history()[0].stage, Stage::Start);
    }

    #[tokio::test]
    async fn transport_failure_propagates_and_keeps_state() {
        let model = StubModel::new(vec![r#"{"stage":"think","thought":"first"}"#.into()]);
        let mut agent = StageLoop::new(model).with_policy(TerminationPolicy::unbounded());

        let err = agent.run("go").await.unwrap_err();

        assert!(matches!(err, crate::LoopError::LanguageModel(_)));
        assert_eq!(agent.state().history.len(), 1);
        assert_eq!(agent.state().stage, Stage::Think);
    }
}
