//! 协作方错误类型
//!
//! 两类外部依赖的失败：
//! - **CollaboratorError**：LLM 结构化调用失败（无响应、无法解析、超时）
//! - **SandboxError**：执行环境传输层失败（IO、HTTP、超时、路径逃逸）
//!
//! 代码非零退出不是错误，而是正常的执行结果（见 `workflow::ExecOutput`）。
//! WorkflowEngine 会把这两类错误统一转换为 SessionState 中的 system_error 文本。

use std::time::Duration;

use thiserror::Error;

/// LanguageModelPort 调用失败：均视为本轮不可恢复的系统错误
#[derive(Error, Debug)]
pub enum CollaboratorError {
    #[error("LLM error: {0}")]
    Llm(String),

    #[error("LLM returned an empty response")]
    EmptyResponse,

    #[error("Unparseable structured output: {0}")]
    Unparseable(String),

    #[error("LLM call timed out after {0:?}")]
    Timeout(Duration),
}

/// ExecutionPort / ArtifactPort 的传输层错误
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Sandbox call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Path escape attempt: {0}")]
    PathEscape(String),

    #[error("Sandbox server error: {0}")]
    Server(String),
}
