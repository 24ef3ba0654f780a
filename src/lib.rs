//! A single-step structured agent loop.
//!
//! The crate provides:
//! - A language model abstraction (`LanguageModel`) with Gemini, OpenAI and stub clients.
//! - A function registry (`ToolRegistry`) with typed tools and the demo `basic_toolkit`.
//! - A `StageLoop` driver that asks the model for one start/think/action/observe/output
//!   step at a time and feeds tool results back as the next goal.
//! - A `KeyProber` that checks a bearer key against a models endpoint.

mod agent;
mod config;
mod error;
mod fence;
mod llm;
mod probe;
mod prompt;
mod state;
mod step;
mod telemetry;
mod tool;
mod toolkit;

pub use agent::{LoopReport, StageLoop, StopReason, TerminationPolicy};
pub use config::{AgentConfig, AppConfig, LoggingConfig, ModelConfig, ProbeConfig, Provider};
pub use error::{LoopError, Result};
pub use fence::strip_json_fence;
pub use llm::{build_model, GeminiClient, LanguageModel, ModelCompletion, OpenAIClient, StubModel};
pub use probe::{ErrorDetail, KeyCheck, KeyProber, DEFAULT_PROBE_ENDPOINT};
pub use prompt::{instruction, StepPrompt, STEP_FORMAT};
pub use state::{ActionRecord, AgentState, StepRecord};
pub use step::{ModelStep, Stage, StepDecodeError, StepDirective};
pub use telemetry::init_tracing;
pub use tool::{Tool, ToolDescription, ToolRegistry, TypedTool};
pub use toolkit::{basic_toolkit, AddNumbersTool, EchoTool, GetTimeTool};
