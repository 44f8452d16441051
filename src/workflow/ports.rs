//! 协作方端口
//!
//! 引擎只通过这三个 trait 访问外部世界：
//! - **LanguageModelPort**：路由决策、代码生成、反思修复、自然语言总结
//! - **ExecutionPort**：在隔离环境中运行代码 / Shell 命令
//! - **ArtifactPort**：取回生成的图表文件
//!
//! 由调用方构造后注入 WorkflowEngine，测试中可替换为假实现。

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::{CollaboratorError, SandboxError};
use crate::memory::Message;

/// Router 的结构化决策
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// 需要写代码分析；question 为自包含的任务描述
    CodeGen { question: String },
    /// 针对上一次分析的追问
    Summarizer { question: String },
    /// 闲聊，直接回复
    Chat { reply: String },
    /// 意图不明，回复一个澄清问题
    Clarify { reply: String },
}

/// 生成步骤的结构化结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationResult {
    pub code: String,
    pub rationale: String,
    pub charts_exist: bool,
    pub chart_names: Vec<String>,
}

/// 修复类型：决定反思之后是先修环境还是直接重跑代码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FixType {
    CodeFix,
    EnvironmentFix,
}

/// 反思步骤的结构化结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflectionResult {
    pub fix_type: FixType,
    pub code: Option<String>,
    pub cmd: Option<String>,
    pub comment: String,
}

/// 反思请求：有代码时审查代码，无代码时要求从头生成
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReflectionRequest {
    Review {
        code: String,
        error: String,
        rationale: String,
    },
    FromScratch {
        error: String,
        rationale: String,
    },
}

/// 总结请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummaryRequest {
    /// 本轮执行成功：content 为 `Analysis results:` 开头的结果文本
    Analysis {
        rationale: String,
        code: String,
        content: String,
    },
    /// 针对上一次分析的追问
    FollowUp {
        question: String,
        prior: AnalysisRecord,
    },
}

/// 一次成功分析的留档，供后续追问使用
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub question: String,
    pub code: String,
    pub rationale: String,
    pub answer: String,
    pub chart_filenames: Vec<String>,
    pub created_at: i64,
}

/// 一次代码/命令执行的结果；非零退出是正常结果而不是错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub output: String,
}

impl ExecOutput {
    pub fn new(exit_code: i32, output: impl Into<String>) -> Self {
        Self {
            exit_code,
            output: output.into(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// 单个文件的取回结果
#[derive(Debug)]
pub struct ArtifactFetch {
    pub name: String,
    pub outcome: Result<PathBuf, SandboxError>,
}

#[async_trait]
pub trait LanguageModelPort: Send + Sync {
    async fn route_decision(&self, history: &[Message]) -> Result<RouteDecision, CollaboratorError>;

    async fn generate(&self, question: &str) -> Result<GenerationResult, CollaboratorError>;

    async fn reflect(
        &self,
        request: &ReflectionRequest,
    ) -> Result<ReflectionResult, CollaboratorError>;

    async fn summarize(&self, request: &SummaryRequest) -> Result<String, CollaboratorError>;

    /// 累计 token 使用：(prompt, completion, total)；不统计的实现返回全 0
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

#[async_trait]
pub trait ExecutionPort: Send + Sync {
    async fn run_code(&self, code: &str) -> Result<ExecOutput, SandboxError>;

    async fn run_command(&self, cmd: &str) -> Result<ExecOutput, SandboxError>;
}

#[async_trait]
pub trait ArtifactPort: Send + Sync {
    /// 尽力而为：逐个取回，单个失败不影响其它文件
    async fn fetch(&self, names: &[String]) -> Vec<ArtifactFetch>;
}
