use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{LoopError, Result};

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;

    /// Optionally return a JSON Schema-like object describing the expected arguments.
    fn parameters(&self) -> Option<Value> {
        None
    }

    /// `None` means the model supplied no arguments at all.
    async fn call(&self, input: Option<Value>) -> Result<Value>;
}

/// A tool with statically typed input and output records.
///
/// Register it with [`ToolRegistry::register_typed`]; the registry takes care
/// of converting to and from JSON. A call without arguments is decoded from
/// `{}`, so inputs whose fields all have defaults accept both forms.
pub trait TypedTool: Send + Sync + 'static {
    type Input: DeserializeOwned + Send;
    type Output: Serialize;

    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;

    fn parameters(&self) -> Option<Value> {
        None
    }

    fn run(&self, input: Self::Input) -> Self::Output;
}

struct Typed<T>(T);

#[async_trait]
impl<T: TypedTool> Tool for Typed<T> {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn description(&self) -> &str {
        self.0.description()
    }

    fn parameters(&self) -> Option<Value> {
        self.0.parameters()
    }

    async fn call(&self, input: Option<Value>) -> Result<Value> {
        let input = input.unwrap_or_else(|| Value::Object(Map::new()));
        let typed: T::Input = serde_json::from_value(input)?;
        Ok(serde_json::to_value(self.0.run(typed))?)
    }
}

/// Static description of a tool that can be embedded in prompts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDescription {
    pub name: String,
    pub description: String,
    pub parameters: Option<Value>,
}

#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn register_typed<T: TypedTool>(&mut self, tool: T) {
        self.register(Typed(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn describe(&self) -> Vec<ToolDescription> {
        let mut descriptions: Vec<ToolDescription> = self
            .tools
            .values()
            .map(|tool| ToolDescription {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            })
            .collect();

        descriptions.sort_by(|a, b| a.name.cmp(&b.name));
        descriptions
    }

    pub async fn call(&self, name: &str, input: Option<Value>) -> Result<Value> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| LoopError::ToolNotFound(name.to_string()))?;
        tool.call(input)
            .await
            .map_err(|source| LoopError::ToolInvocation {
                name: name.to_string(),
                source: Box::new(source),
            })
    }

    /// Invoke `name` and fold every failure into an `{"error": ...}` value.
    ///
    /// An empty `input` calls the tool without arguments.
    pub async fn invoke(&self, name: &str, input: &Map<String, Value>) -> Value {
        let args = if input.is_empty() {
            None
        } else {
            Some(Value::Object(input.clone()))
        };

        match self.call(name, args).await {
            Ok(value) => value,
            Err(LoopError::ToolInvocation { source, .. }) => json!({ "error": source.to_string() }),
            Err(err) => json!({ "error": err.to_string() }),
        }
    }
}
