//! Model abstraction for LLM interactions
//!
//! Wraps the async-openai crate behind [`ModelProvider`] so the runner, nested
//! agent tools and guardrail agents all talk to the model the same way, and so
//! tests can swap in [`MockProvider`].

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
        ChatCompletionStreamOptions, ChatCompletionTool, ChatCompletionToolArgs,
        ChatCompletionToolType, CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
        FunctionCall, FunctionObjectArgs, ResponseFormat, ResponseFormatJsonSchema,
    },
    Client,
};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::error::{AgentsError, Result};
use crate::items::{Message, ModelResponse, Role, ToolCall};
use crate::tool::ToolSpec;
use crate::usage::Usage;

/// Everything one model call needs.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    /// Name of the agent making the call
    pub agent: String,
    /// Overrides the provider's default model
    pub model: Option<String>,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSpec>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// JSON schema the final answer must follow
    pub output_schema: Option<Value>,
}

impl ModelRequest {
    pub fn new(agent: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            agent: agent.into(),
            model: None,
            messages,
            tools: vec![],
            temperature: None,
            max_tokens: None,
            output_schema: None,
        }
    }

    /// Instructions the agent was configured with.
    pub fn system_prompt(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
    }

    /// Content of the most recent user message.
    pub fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

/// Trait for model providers
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn complete(&self, request: ModelRequest) -> Result<(ModelResponse, Usage)>;

    /// Like [`ModelProvider::complete`], also pushing text fragments to `deltas`
    /// as they arrive.
    async fn complete_streaming(
        &self,
        request: ModelRequest,
        deltas: UnboundedSender<String>,
    ) -> Result<(ModelResponse, Usage)> {
        let (response, usage) = self.complete(request).await?;
        if let Some(content) = response.content.as_ref().filter(|c| !c.is_empty()) {
            let _ = deltas.send(content.clone());
        }
        Ok((response, usage))
    }

    fn model_name(&self) -> &str;
}

/// OpenAI chat-completions provider
pub struct OpenAIProvider {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAIProvider {
    /// Uses `OPENAI_API_KEY` from the environment through async-openai's defaults.
    pub fn new(model: impl Into<String>) -> Self {
        Self::with_client(Client::new(), model)
    }

    pub fn with_client(client: Client<OpenAIConfig>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    fn convert_message(&self, msg: &Message) -> Result<ChatCompletionRequestMessage> {
        let converted = match msg.role {
            Role::System => ChatCompletionRequestSystemMessageArgs::default()
                .content(msg.content.clone())
                .build()?
                .into(),
            Role::User => ChatCompletionRequestUserMessageArgs::default()
                .content(msg.content.clone())
                .build()?
                .into(),
            Role::Assistant => {
                let mut builder = ChatCompletionRequestAssistantMessageArgs::default();
                if !msg.content.is_empty() {
                    builder.content(msg.content.clone());
                }
                if let Some(tool_calls) = &msg.tool_calls {
                    let calls: Vec<ChatCompletionMessageToolCall> = tool_calls
                        .iter()
                        .map(|tc| ChatCompletionMessageToolCall {
                            id: tc.id.clone(),
                            r#type: ChatCompletionToolType::Function,
                            function: FunctionCall {
                                name: tc.name.clone(),
                                arguments: tc.arguments.to_string(),
                            },
                        })
                        .collect();
                    builder.tool_calls(calls);
                }
                builder.build()?.into()
            }
            Role::Tool => ChatCompletionRequestToolMessageArgs::default()
                .content(msg.content.clone())
                .tool_call_id(msg.tool_call_id.clone().unwrap_or_default())
                .build()?
                .into(),
        };
        Ok(converted)
    }

    fn convert_tools(&self, tools: &[ToolSpec]) -> Result<Vec<ChatCompletionTool>> {
        tools
            .iter()
            .map(|tool| {
                Ok(ChatCompletionToolArgs::default()
                    .r#type(ChatCompletionToolType::Function)
                    .function(
                        FunctionObjectArgs::default()
                            .name(tool.name.clone())
                            .description(tool.description.clone())
                            .parameters(tool.parameters.clone())
                            .build()?,
                    )
                    .build()?)
            })
            .collect()
    }

    fn build_request(
        &self,
        request: &ModelRequest,
        stream: bool,
    ) -> Result<CreateChatCompletionRequest> {
        let messages = request
            .messages
            .iter()
            .map(|m| self.convert_message(m))
            .collect::<Result<Vec<_>>>()?;

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(request.model.as_deref().unwrap_or(&self.model))
            .messages(messages);

        if !request.tools.is_empty() {
            args.tools(self.convert_tools(&request.tools)?);
        }
        if let Some(temp) = request.temperature {
            args.temperature(temp);
        }
        if let Some(max) = request.max_tokens {
            args.max_completion_tokens(max);
        }
        if let Some(schema) = &request.output_schema {
            args.response_format(ResponseFormat::JsonSchema {
                json_schema: ResponseFormatJsonSchema {
                    description: None,
                    name: "final_output".to_string(),
                    schema: Some(schema.clone()),
                    strict: None,
                },
            });
        }
        if stream {
            args.stream(true)
                .stream_options(ChatCompletionStreamOptions {
                    include_usage: true,
                });
        }
        Ok(args.build()?)
    }
}

fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[async_trait]
impl ModelProvider for OpenAIProvider {
    async fn complete(&self, request: ModelRequest) -> Result<(ModelResponse, Usage)> {
        let body = self.build_request(&request, false)?;
        let response = self.client.chat().create(body).await?;

        let choice = response
            .choices
            .first()
            .ok_or_else(|| AgentsError::ModelBehaviorError {
                message: "No choices in response".to_string(),
            })?;

        let tool_calls = choice
            .message
            .tool_calls
            .as_ref()
            .map(|calls| {
                calls
                    .iter()
                    .map(|tc| ToolCall {
                        id: tc.id.clone(),
                        name: tc.function.name.clone(),
                        arguments: parse_arguments(&tc.function.arguments),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let model_response = ModelResponse {
            id: response.id.clone(),
            content: choice.message.content.clone(),
            tool_calls,
            finish_reason: choice.finish_reason.as_ref().map(|r| format!("{:?}", r)),
            created_at: chrono::Utc::now(),
        };

        let usage = response
            .usage
            .map(|u| Usage::new(u.prompt_tokens as usize, u.completion_tokens as usize))
            .unwrap_or_else(Usage::empty);

        Ok((model_response, usage))
    }

    async fn complete_streaming(
        &self,
        request: ModelRequest,
        deltas: UnboundedSender<String>,
    ) -> Result<(ModelResponse, Usage)> {
        let body = self.build_request(&request, true)?;
        let mut stream = self.client.chat().create_stream(body).await?;

        let mut id = String::new();
        let mut content = String::new();
        let mut finish_reason = None;
        let mut usage = Usage::empty();
        // index -> (id, name, arguments)
        let mut partial_calls: BTreeMap<u32, (String, String, String)> = BTreeMap::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if id.is_empty() {
                id = chunk.id.clone();
            }
            if let Some(u) = chunk.usage {
                usage = Usage::new(u.prompt_tokens as usize, u.completion_tokens as usize);
            }
            for choice in chunk.choices {
                if let Some(text) = choice.delta.content {
                    if !text.is_empty() {
                        let _ = deltas.send(text.clone());
                        content.push_str(&text);
                    }
                }
                for call in choice.delta.tool_calls.unwrap_or_default() {
                    let entry = partial_calls.entry(call.index).or_default();
                    if let Some(call_id) = call.id {
                        entry.0 = call_id;
                    }
                    if let Some(function) = call.function {
                        if let Some(name) = function.name {
                            entry.1.push_str(&name);
                        }
                        if let Some(args) = function.arguments {
                            entry.2.push_str(&args);
                        }
                    }
                }
                if let Some(reason) = choice.finish_reason {
                    finish_reason = Some(format!("{:?}", reason));
                }
            }
        }

        debug!(model = %self.model, tool_calls = partial_calls.len(), "stream finished");

        let tool_calls = partial_calls
            .into_values()
            .map(|(id, name, args)| ToolCall {
                id,
                name,
                arguments: parse_arguments(&args),
            })
            .collect();

        Ok((
            ModelResponse {
                id,
                content: (!content.is_empty()).then_some(content),
                tool_calls,
                finish_reason,
                created_at: chrono::Utc::now(),
            },
            usage,
        ))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Scripted model provider for tests and offline demos.
///
/// Responses are queued per agent name; an agent without its own queue falls
/// back to the shared queue, and an empty shared queue answers
/// `"Default response"`. Every request is recorded.
pub struct MockProvider {
    model: String,
    shared: Mutex<VecDeque<ModelResponse>>,
    by_agent: Mutex<HashMap<String, VecDeque<ModelResponse>>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl MockProvider {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            shared: Mutex::new(VecDeque::new()),
            by_agent: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_response(self, response: ModelResponse) -> Self {
        if let Ok(mut queue) = self.shared.lock() {
            queue.push_back(response);
        }
        self
    }

    pub fn with_message(self, content: impl Into<String>) -> Self {
        self.with_response(ModelResponse::new_message(content))
    }

    pub fn with_tool_call(self, tool_name: impl Into<String>, args: Value) -> Self {
        self.with_response(ModelResponse::new_tool_calls(vec![ToolCall::new(
            tool_name, args,
        )]))
    }

    pub fn for_agent(self, agent: impl Into<String>, response: ModelResponse) -> Self {
        if let Ok(mut queues) = self.by_agent.lock() {
            queues.entry(agent.into()).or_default().push_back(response);
        }
        self
    }

    pub fn with_agent_message(self, agent: impl Into<String>, content: impl Into<String>) -> Self {
        self.for_agent(agent, ModelResponse::new_message(content))
    }

    pub fn with_agent_tool_call(
        self,
        agent: impl Into<String>,
        tool_name: impl Into<String>,
        args: Value,
    ) -> Self {
        self.for_agent(
            agent,
            ModelResponse::new_tool_calls(vec![ToolCall::new(tool_name, args)]),
        )
    }

    /// Requests received so far, in call order.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn requests_for(&self, agent: &str) -> Vec<ModelRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.agent == agent)
            .collect()
    }

    fn next_response(&self, agent: &str) -> ModelResponse {
        let scripted = self
            .by_agent
            .lock()
            .ok()
            .and_then(|mut queues| queues.get_mut(agent).and_then(|q| q.pop_front()));
        scripted
            .or_else(|| self.shared.lock().ok().and_then(|mut q| q.pop_front()))
            .unwrap_or_else(|| ModelResponse::new_message("Default response"))
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    async fn complete(&self, request: ModelRequest) -> Result<(ModelResponse, Usage)> {
        let response = self.next_response(&request.agent);
        if let Ok(mut log) = self.requests.lock() {
            log.push(request);
        }
        Ok((response, Usage::new(10, 5)))
    }

    /// Sends the content word by word.
    async fn complete_streaming(
        &self,
        request: ModelRequest,
        deltas: UnboundedSender<String>,
    ) -> Result<(ModelResponse, Usage)> {
        let (response, usage) = self.complete(request).await?;
        if let Some(content) = &response.content {
            for piece in content.split_inclusive(' ') {
                let _ = deltas.send(piece.to_string());
            }
        }
        Ok((response, usage))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
