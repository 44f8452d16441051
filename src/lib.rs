//! Analyst - 数据分析智能体
//!
//! 把用户请求路由到闲聊、写代码分析或追问解释三条路径之一，
//! 然后驱动有界的「生成 -> 执行 -> 反思 -> 重试」循环，直到得到答案或耗尽重试预算。
//!
//! 模块划分：
//! - **agent**: 无头运行时（按配置组装引擎，多轮 Session）
//! - **analyst**: 基于 LLM 的路由 / 生成 / 反思 / 总结
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **memory**: 对话历史
//! - **observability**: 日志初始化
//! - **sandbox**: 代码执行环境（本地进程 / 远程 HTTP）
//! - **workflow**: 单轮状态、决策点与状态机引擎

pub mod agent;
pub mod analyst;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod sandbox;
pub mod workflow;

pub use agent::Session;
pub use workflow::{TurnOutcome, WorkflowEngine};
