//! 记忆层：跨轮次保留的对话历史

pub mod conversation;

pub use conversation::{ConversationMemory, Message, Role};
