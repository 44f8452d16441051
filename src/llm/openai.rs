//! OpenAI 兼容客户端
//!
//! Router / Generator / Reflector / Summarizer 共用一个实例；base_url 可指向 OpenAI、OpenRouter 或本地推理服务。

use std::sync::atomic::{AtomicU64, Ordering};

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;

use crate::llm::LlmClient;
use crate::memory::{Message, Role};

#[derive(Debug, Default)]
struct UsageCounter {
    prompt: AtomicU64,
    completion: AtomicU64,
}

impl UsageCounter {
    fn record(&self, prompt: u32, completion: u32) {
        self.prompt.fetch_add(u64::from(prompt), Ordering::Relaxed);
        self.completion.fetch_add(u64::from(completion), Ordering::Relaxed);
    }

    fn snapshot(&self) -> (u64, u64, u64) {
        let prompt = self.prompt.load(Ordering::Relaxed);
        let completion = self.completion.load(Ordering::Relaxed);
        (prompt, completion, prompt + completion)
    }
}

pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
    /// 结构化输出时建议调低
    temperature: Option<f32>,
    usage: UsageCounter,
}

impl OpenAiClient {
    /// api_key 为 None 时由 async-openai 读取 OPENAI_API_KEY
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let mut config = OpenAIConfig::new();
        if let Some(url) = base_url {
            config = config.with_api_base(url);
        }
        if let Some(key) = api_key {
            config = config.with_api_key(key);
        }

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            temperature: None,
            usage: UsageCounter::default(),
        }
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

fn to_request_message(m: &Message) -> Result<ChatCompletionRequestMessage, String> {
    let content = m.content.clone();
    let msg = match m.role {
        Role::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(content)
            .build()
            .map(ChatCompletionRequestMessage::System),
        Role::User => ChatCompletionRequestUserMessageArgs::default()
            .content(content)
            .build()
            .map(ChatCompletionRequestMessage::User),
        Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
            .content(content)
            .build()
            .map(ChatCompletionRequestMessage::Assistant),
    };
    msg.map_err(|e| format!("invalid {:?} message: {e}", m.role))
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        let messages = messages
            .iter()
            .map(to_request_message)
            .collect::<Result<Vec<_>, _>>()?;

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model).messages(messages);
        if let Some(t) = self.temperature {
            args.temperature(t);
        }
        let request = args.build().map_err(|e| e.to_string())?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| e.to_string())?;

        if let Some(usage) = &response.usage {
            self.usage.record(usage.prompt_tokens, usage.completion_tokens);
        }

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        tracing::debug!(model = %self.model, chars = content.len(), "llm completion");
        Ok(content)
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.snapshot()
    }
}
