//! Tool system for agents
//!
//! Tools are how agents reach the outside world: the knowledge lookup, the
//! remote search tools and other agents wrapped with [`Agent::as_tool`].
//! The model picks tools by name at runtime, so every agent run builds a
//! [`ToolRegistry`] that maps names to handlers and gives every invocation the
//! same result shape.
//!
//! [`Agent::as_tool`]: crate::agent::Agent::as_tool

use async_trait::async_trait;
use futures::future::BoxFuture;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{AgentsError, Result};
use crate::model::ModelProvider;

/// Result from a tool execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub output: Value,
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(output: Value) -> Self {
        Self {
            output,
            error: None,
        }
    }

    pub fn text(output: impl Into<String>) -> Self {
        Self::success(Value::String(output.into()))
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            output: Value::Null,
            error: Some(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Text sent back to the model as the tool message.
    pub fn to_model_text(&self) -> String {
        match (&self.error, &self.output) {
            (Some(err), _) => format!("Error: {}", err),
            (None, Value::String(s)) => s.clone(),
            (None, other) => other.to_string(),
        }
    }
}

/// Name, description and argument schema advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// What a tool may use from the run that invoked it.
#[derive(Clone)]
pub struct ToolContext {
    pub provider: Arc<dyn ModelProvider>,
    pub trace_id: String,
}

impl ToolContext {
    pub fn new(provider: Arc<dyn ModelProvider>, trace_id: impl Into<String>) -> Self {
        Self {
            provider,
            trace_id: trace_id.into(),
        }
    }
}

impl Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("provider", &self.provider.model_name())
            .field("trace_id", &self.trace_id)
            .finish()
    }
}

/// Trait for all tools that can be used by agents
#[async_trait]
pub trait Tool: Send + Sync + Debug {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the arguments object
    fn parameters_schema(&self) -> Value;

    async fn execute(&self, ctx: &ToolContext, arguments: Value) -> Result<ToolResult>;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

type Handler = Arc<dyn Fn(ToolContext, Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// A tool backed by an async function.
#[derive(Clone)]
pub struct FunctionTool {
    name: String,
    description: String,
    parameters_schema: Value,
    handler: Handler,
}

impl Debug for FunctionTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}

impl FunctionTool {
    /// Untyped constructor over raw JSON arguments.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters_schema: Value,
        function: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let function = Arc::new(function);
        Self {
            name: name.into(),
            description: description.into(),
            parameters_schema,
            handler: Arc::new(
                move |_ctx: ToolContext, args: Value| -> BoxFuture<'static, Result<Value>> {
                    let f = function.clone();
                    Box::pin(async move { f(args).await })
                },
            ),
        }
    }

    /// Typed constructor: the argument schema is derived from `A`.
    pub fn typed<A, R, F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        function: F,
    ) -> Self
    where
        A: DeserializeOwned + JsonSchema + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        let function = Arc::new(function);
        Self {
            name: name.into(),
            description: description.into(),
            parameters_schema: schema_value::<A>(),
            handler: Arc::new(
                move |_ctx: ToolContext, raw: Value| -> BoxFuture<'static, Result<Value>> {
                    let f = function.clone();
                    Box::pin(async move {
                        let args: A = serde_json::from_value(raw)?;
                        let out = f(args).await?;
                        Ok(serde_json::to_value(out)?)
                    })
                },
            ),
        }
    }
}

#[async_trait]
impl Tool for FunctionTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.parameters_schema.clone()
    }

    async fn execute(&self, ctx: &ToolContext, arguments: Value) -> Result<ToolResult> {
        let output = (self.handler)(ctx.clone(), arguments).await?;
        Ok(ToolResult::success(output))
    }
}

/// JSON schema for a typed argument struct.
pub fn schema_value<A: JsonSchema>() -> Value {
    let schema = schemars::schema_for!(A);
    serde_json::to_value(schema.schema).unwrap_or_else(|_| serde_json::json!({"type": "object"}))
}

/// Name → handler table for one agent.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Fails with [`AgentsError::UserError`] if two tools share a name.
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Result<Self> {
        let mut index = HashMap::with_capacity(tools.len());
        for (i, tool) in tools.iter().enumerate() {
            if index.insert(tool.name().to_string(), i).is_some() {
                return Err(AgentsError::UserError {
                    message: format!("duplicate tool name '{}'", tool.name()),
                });
            }
        }
        Ok(Self { tools, index })
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec()).collect()
    }

    /// Invokes a tool by name. Never fails: unknown tools and tool errors come
    /// back as a failed [`ToolResult`] so the model can decide what to do next.
    pub async fn invoke(&self, ctx: &ToolContext, name: &str, arguments: Value) -> ToolResult {
        let Some(tool) = self.get(name) else {
            warn!(tool = %name, "model requested an unknown tool");
            return ToolResult::error(format!("Tool '{}' not found", name));
        };
        debug!(tool = %name, "executing tool");
        match tool.execute(ctx, arguments).await {
            Ok(result) => result,
            Err(e) => {
                warn!(tool = %name, error = %e, "tool call failed");
                ToolResult::error(e.to_string())
            }
        }
    }
}
