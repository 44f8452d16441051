//! 单轮会话状态
//!
//! 每个用户轮次新建一份 SessionState，由 WorkflowEngine 独占并在各节点间传递；
//! 只有对话历史跨轮保留（见 `memory::ConversationMemory`）。

use serde::Serialize;

use crate::workflow::ports::FixType;

/// 单轮状态：字段名与节点读写关系一一对应
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionState {
    /// Router 交给生成/总结节点的任务描述
    pub pending_question: Option<String>,
    /// 当前候选代码；仅在 CODE_FIX 且反思给出新代码时被替换
    pub generated_code: Option<String>,
    /// 生成代码时附带的思考过程，仅供参考
    pub rationale: Option<String>,
    pub charts_expected: bool,
    pub chart_filenames: Vec<String>,
    /// 生成后置为 1，每次反思加 1，从不递减
    pub attempt_count: u32,
    pub last_answer: Option<String>,
    /// 可恢复错误（沙箱非零退出）
    pub agent_error: Option<String>,
    /// 不可恢复错误；一旦设置，本轮内不会被清除
    pub system_error: Option<String>,
    pub fix_type: Option<FixType>,
    /// 仅当 fix_type = ENVIRONMENT_FIX 时被消费
    pub repair_command: Option<String>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置系统错误；已有系统错误时保留最早的那条
    pub fn fail(&mut self, error: impl Into<String>) {
        if self.system_error.is_none() {
            self.system_error = Some(error.into());
        }
    }

    pub fn has_system_error(&self) -> bool {
        self.system_error.is_some()
    }

    /// 当前代码（空串视为没有代码）
    pub fn code(&self) -> Option<&str> {
        self.generated_code.as_deref().filter(|c| !c.trim().is_empty())
    }

    /// 仅在 ENVIRONMENT_FIX 下返回非空的修复命令
    pub fn pending_repair(&self) -> Option<&str> {
        match self.fix_type {
            Some(FixType::EnvironmentFix) => self
                .repair_command
                .as_deref()
                .filter(|c| !c.trim().is_empty()),
            _ => None,
        }
    }

    /// 执行后校验：last_answer / agent_error / system_error 至多一个被设置
    pub fn check_execution_outcome(&self) -> Result<(), String> {
        let set = [
            self.last_answer.is_some(),
            self.agent_error.is_some(),
            self.system_error.is_some(),
        ]
        .iter()
        .filter(|s| **s)
        .count();

        match set {
            0 => Err("execution produced neither an answer nor an error".to_string()),
            1 => Ok(()),
            n => Err(format!("{n} of answer/agent_error/system_error are set at once")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fail_keeps_first_error() {
        let mut state = SessionState::new();
        state.fail("Code was empty.");
        state.fail("Cmd was empty.");
        assert_eq!(state.system_error.as_deref(), Some("Code was empty."));
    }

    #[test]
    fn test_blank_code_is_absent() {
        let mut state = SessionState::new();
        state.generated_code = Some("   \n".to_string());
        assert!(state.code().is_none());
        state.generated_code = Some("print(1)".to_string());
        assert_eq!(state.code(), Some("print(1)"));
    }

    #[test]
    fn test_repair_ignored_without_environment_fix() {
        let mut state = SessionState::new();
        state.repair_command = Some("pip install pandas".to_string());
        assert!(state.pending_repair().is_none());

        state.fix_type = Some(FixType::CodeFix);
        assert!(state.pending_repair().is_none());

        state.fix_type = Some(FixType::EnvironmentFix);
        assert_eq!(state.pending_repair(), Some("pip install pandas"));
    }

    #[test]
    fn test_check_execution_outcome() {
        let mut state = SessionState::new();
        assert!(state.check_execution_outcome().is_err());

        state.last_answer = Some("42".to_string());
        assert!(state.check_execution_outcome().is_ok());

        state.system_error = Some("boom".to_string());
        assert!(state.check_execution_outcome().is_err());
    }
}
