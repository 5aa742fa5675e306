use crate::prompts::{ANALYSIS_INSTRUCTIONS, CHAT_INSTRUCTIONS, PROFILE_TOOL, SUMMARY_INSTRUCTIONS, TOOL_BUDGET};
use crate::traits::LookupService;
use crate::types::{PipelineError, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Trait for the model that looks at frames, folds summaries and answers chat
#[async_trait]
pub trait LlmAdapter: Send + Sync {
    /// Get the name of this LLM adapter
    fn adapter_name(&self) -> String;

    /// Describe the image at `image` following `instruction`. Returns free text.
    async fn analyze(&self, image: &Path, instruction: &str) -> Result<String>;

    /// Produce an updated cumulative summary from a fully built prompt
    async fn summarize(&self, prompt: &str) -> Result<String>;

    /// Answer a free-text question, independent of the capture loop
    async fn chat(&self, message: &str) -> Result<String>;
}

/// Whether tool lookups made during a conversation go to the call log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tracking {
    CallLog,
    Untracked,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AssistantMessage {
    #[serde(default = "assistant_role")]
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ToolCall>,
}

fn assistant_role() -> String {
    "assistant".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: FunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ProfileArguments {
    pokemon_name: String,
}

/// Adapter for any OpenAI-compatible chat-completions endpoint.
///
/// The profile lookup is exposed as a function tool. Tool calls are resolved
/// through the shared [`LookupService`] and fed back until the model answers
/// in text or the per-conversation budget runs out.
pub struct OpenAiAdapter {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    lookup: Arc<dyn LookupService>,
    tool_budget: usize,
}

impl OpenAiAdapter {
    pub fn new(
        base_url: &str,
        api_key: String,
        model: String,
        lookup: Arc<dyn LookupService>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            lookup,
            tool_budget: TOOL_BUDGET,
        })
    }

    pub fn with_tool_budget(mut self, budget: usize) -> Self {
        self.tool_budget = budget;
        self
    }

    fn tool_definitions() -> Value {
        json!([{
            "type": "function",
            "function": {
                "name": PROFILE_TOOL,
                "description": "Fetch Pokémon data (stats, types, abilities, moves) by name or id.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "pokemon_name": {
                            "type": "string",
                            "description": "Pokémon identifier (name or id)."
                        }
                    },
                    "required": ["pokemon_name"]
                }
            }
        }])
    }

    async fn complete(&self, messages: &[Value], tool_choice: Option<&str>) -> Result<AssistantMessage> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut body = json!({
            "model": self.model,
            "messages": messages,
        });
        if let (Some(choice), Some(object)) = (tool_choice, body.as_object_mut()) {
            object.insert("tools".into(), Self::tool_definitions());
            object.insert("tool_choice".into(), json!(choice));
        }

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(PipelineError::Analysis(format!(
                "HTTP {}: {}",
                status,
                detail.chars().take(500).collect::<String>()
            )));
        }

        let completion: ChatCompletion = response.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| PipelineError::Analysis("response contained no choices".to_string()))
    }

    /// Run a conversation to its final text, resolving tool calls on the way.
    async fn converse(&self, mut messages: Vec<Value>, first_choice: Option<&str>, tracking: Tracking) -> Result<String> {
        let mut remaining = self.tool_budget;
        let mut choice = first_choice;

        loop {
            let reply = self.complete(&messages, choice).await?;
            if reply.tool_calls.is_empty() || matches!(choice, None | Some("none")) {
                return Ok(reply.content.unwrap_or_default());
            }

            messages.push(serde_json::to_value(&reply)?);
            for call in &reply.tool_calls {
                let output = if remaining == 0 {
                    json!({ "error": "tool budget exhausted for this frame" })
                } else {
                    remaining -= 1;
                    self.run_tool(call, tracking).await
                };
                messages.push(json!({
                    "role": "tool",
                    "tool_call_id": call.id,
                    "content": output.to_string(),
                }));
            }

            // After the first round the model may answer freely; once the
            // budget is spent it must answer.
            choice = if remaining == 0 { Some("none") } else { Some("auto") };
        }
    }

    async fn run_tool(&self, call: &ToolCall, tracking: Tracking) -> Value {
        if call.function.name != PROFILE_TOOL {
            warn!("Model requested unknown tool {}", call.function.name);
            return json!({ "error": format!("unknown tool {}", call.function.name) });
        }
        let arguments: ProfileArguments = match serde_json::from_str(&call.function.arguments) {
            Ok(arguments) => arguments,
            Err(e) => return json!({ "error": format!("invalid arguments: {}", e) }),
        };
        debug!("{}({:?})", PROFILE_TOOL, arguments.pokemon_name);
        match tracking {
            Tracking::CallLog => self.lookup.lookup(&arguments.pokemon_name).await,
            Tracking::Untracked => self.lookup.lookup_untracked(&arguments.pokemon_name).await,
        }
    }
}

#[async_trait]
impl LlmAdapter for OpenAiAdapter {
    fn adapter_name(&self) -> String {
        format!("OpenAI-compatible ({})", self.model)
    }

    async fn analyze(&self, image: &Path, instruction: &str) -> Result<String> {
        let bytes = tokio::fs::read(image).await?;
        let data_url = format!("data:image/png;base64,{}", STANDARD.encode(bytes));

        let messages = vec![
            json!({ "role": "system", "content": ANALYSIS_INSTRUCTIONS }),
            json!({
                "role": "user",
                "content": [
                    { "type": "text", "text": instruction },
                    { "type": "image_url", "image_url": { "url": data_url, "detail": "high" } }
                ]
            }),
        ];

        self.converse(messages, Some("required"), Tracking::CallLog).await
    }

    async fn summarize(&self, prompt: &str) -> Result<String> {
        let messages = vec![
            json!({ "role": "system", "content": SUMMARY_INSTRUCTIONS }),
            json!({ "role": "user", "content": prompt }),
        ];
        self.converse(messages, None, Tracking::Untracked)
            .await
            .map_err(|e| PipelineError::Summarization(e.to_string()))
    }

    async fn chat(&self, message: &str) -> Result<String> {
        let messages = vec![
            json!({ "role": "system", "content": CHAT_INSTRUCTIONS }),
            json!({ "role": "user", "content": message }),
        ];
        self.converse(messages, Some("auto"), Tracking::Untracked).await
    }
}

/// One scripted answer for [`MockLlmAdapter`].
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    /// Perform tracked lookups for these keys, then answer.
    AfterLookups { keys: Vec<String>, text: String },
    Fail(String),
}

#[derive(Default)]
struct MockScript {
    analyses: VecDeque<MockReply>,
    summaries: VecDeque<MockReply>,
    chats: VecDeque<MockReply>,
    prompts: Vec<(String, String)>,
}

/// Scripted adapter for development and testing
///
/// Replies are consumed in FIFO order per operation. When a queue runs dry a
/// neutral default answer is returned, so a demo loop never stalls.
pub struct MockLlmAdapter {
    name: String,
    response_delay_ms: u64,
    lookup: Option<Arc<dyn LookupService>>,
    script: Mutex<MockScript>,
}

pub const MOCK_DEFAULT_ANALYSIS: &str = r#"{"game_name":"unknown","scene":"overworld","characters":[],"environment":"unknown","notable_events":"none"}"#;

impl MockLlmAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            response_delay_ms: 0,
            lookup: None,
            script: Mutex::new(MockScript::default()),
        }
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.response_delay_ms = delay_ms;
        self
    }

    pub fn with_lookup(mut self, lookup: Arc<dyn LookupService>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    fn script(&self) -> std::sync::MutexGuard<'_, MockScript> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn push_analysis(&self, reply: MockReply) {
        self.script().analyses.push_back(reply);
    }

    pub fn push_summary(&self, reply: MockReply) {
        self.script().summaries.push_back(reply);
    }

    pub fn push_chat(&self, reply: MockReply) {
        self.script().chats.push_back(reply);
    }

    /// Every prompt received so far as `(operation, text)`.
    pub fn prompts(&self) -> Vec<(String, String)> {
        self.script().prompts.clone()
    }

    pub fn summary_calls(&self) -> usize {
        self.script().prompts.iter().filter(|(op, _)| op == "summarize").count()
    }

    async fn simulate_processing(&self) {
        if self.response_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.response_delay_ms)).await;
        }
    }

    async fn play(&self, reply: Option<MockReply>, default: String) -> std::result::Result<String, String> {
        self.simulate_processing().await;
        match reply {
            None => Ok(default),
            Some(MockReply::Text(text)) => Ok(text),
            Some(MockReply::Fail(message)) => Err(message),
            Some(MockReply::AfterLookups { keys, text }) => {
                if let Some(lookup) = &self.lookup {
                    for key in &keys {
                        lookup.lookup(key).await;
                    }
                }
                Ok(text)
            }
        }
    }

    fn take(&self, operation: &str, text: &str) -> Option<MockReply> {
        let mut script = self.script();
        script.prompts.push((operation.to_string(), text.to_string()));
        match operation {
            "analyze" => script.analyses.pop_front(),
            "summarize" => script.summaries.pop_front(),
            _ => script.chats.pop_front(),
        }
    }
}

#[async_trait]
impl LlmAdapter for MockLlmAdapter {
    fn adapter_name(&self) -> String {
        format!("Mock LLM Adapter ({})", self.name)
    }

    async fn analyze(&self, image: &Path, instruction: &str) -> Result<String> {
        debug!("Mock analysis of {}", image.display());
        let reply = self.take("analyze", instruction);
        self.play(reply, MOCK_DEFAULT_ANALYSIS.to_string())
            .await
            .map_err(PipelineError::Analysis)
    }

    async fn summarize(&self, prompt: &str) -> Result<String> {
        let reply = self.take("summarize", prompt);
        info!("Mock summary requested");
        self.play(reply, "No notable progress yet.".to_string())
            .await
            .map_err(PipelineError::Summarization)
    }

    async fn chat(&self, message: &str) -> Result<String> {
        let reply = self.take("chat", message);
        self.play(reply, format!("Mock reply: {}", message))
            .await
            .map_err(PipelineError::Analysis)
    }
}
