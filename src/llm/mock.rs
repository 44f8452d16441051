//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按顺序回放预置的回复；脚本耗尽后返回错误。同时记录每次调用收到的消息，便于断言提示词内容。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::LlmClient;
use crate::memory::Message;

/// Mock 客户端：依次返回脚本中的回复
#[derive(Debug, Default)]
pub struct MockLlmClient {
    replies: Mutex<VecDeque<Result<String, String>>>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条成功回复
    pub fn with_reply(self, reply: impl Into<String>) -> Self {
        if let Ok(mut q) = self.replies.lock() {
            q.push_back(Ok(reply.into()));
        }
        self
    }

    /// 追加一条失败回复
    pub fn with_failure(self, error: impl Into<String>) -> Self {
        if let Ok(mut q) = self.replies.lock() {
            q.push_back(Err(error.into()));
        }
        self
    }

    /// 已收到的调用（每次调用的完整消息列表）
    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(messages.to_vec());
        }
        self.replies
            .lock()
            .map_err(|e| e.to_string())?
            .pop_front()
            .unwrap_or_else(|| Err("mock script exhausted".to_string()))
    }
}
