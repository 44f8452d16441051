//! 对话历史
//!
//! 跨轮次唯一保留的内容，作为 Router 的输入上下文。只追加；
//! 超过 max_turns 轮时按整轮丢弃最旧的部分，保证窗口总以 User 消息开头。

use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

/// 有界对话窗口；一轮 = 一条 User 消息及其后的回复
#[derive(Clone, Debug)]
pub struct ConversationMemory {
    messages: Vec<Message>,
    max_turns: usize,
}

impl ConversationMemory {
    pub fn new(max_turns: usize) -> Self {
        Self {
            messages: Vec::new(),
            max_turns: max_turns.max(1),
        }
    }

    pub fn push(&mut self, msg: Message) {
        self.messages.push(msg);
        self.prune();
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// 当前窗口内的轮数
    pub fn turns(&self) -> usize {
        self.messages.iter().filter(|m| m.role == Role::User).count()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn prune(&mut self) {
        let excess = self.turns().saturating_sub(self.max_turns);
        if excess == 0 {
            return;
        }
        // 丢弃前 excess 轮：切到第 excess+1 条 User 消息处
        let cut = self
            .messages
            .iter()
            .enumerate()
            .filter(|(_, m)| m.role == Role::User)
            .nth(excess)
            .map(|(i, _)| i)
            .unwrap_or(self.messages.len());
        self.messages.drain(..cut);
    }
}
