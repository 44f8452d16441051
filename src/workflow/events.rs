//! 工作流过程事件：用于前端展示路由、执行、反思与最终回复

use serde::Serialize;

use crate::workflow::policy::Node;
use crate::workflow::ports::FixType;

/// 最终回复的类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyKind {
    Chat,
    Clarify,
    Answer,
    FollowUp,
    SystemFailure,
    BudgetExhausted,
    NoResult,
}

/// 单步过程事件（可序列化为 JSON）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// 进入节点
    NodeEntered { node: Node },
    /// Router 决策（code_gen / summarizer / chat / clarify）
    Routed { decision: String },
    /// 生成了第一版代码
    CodeGenerated { charts_expected: bool },
    /// 代码执行结束
    Executed { attempt: u32, exit_code: i32 },
    /// 环境修复命令执行结束
    RepairExecuted { exit_code: i32 },
    /// 反思完成
    Reflected { attempt: u32, fix_type: FixType },
    /// 图表取回结果
    ArtifactFetched { name: String, ok: bool },
    /// 本轮结束
    Finished { kind: ReplyKind },
}
