//! 决策点：执行结果分类、反思后路由、重试预算
//!
//! 三者都是纯函数，只读 SessionState，不产生副作用；对同一未修改状态重复调用得到相同结果。

use serde::Serialize;

use crate::workflow::ports::FixType;
use crate::workflow::state::SessionState;

/// 反思循环的固定上限
pub const RETRY_CEILING: u32 = 4;

/// 工作流节点
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Route,
    Generate,
    Execute,
    Repair,
    Reflect,
    Summarize,
}

/// 执行结果分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    AgentError,
    SystemError,
    /// 既无答案也无错误；不应出现，但需要处理
    Empty,
}

/// 有界计数：attempt_count 低于上限时才允许再反思一次
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    ceiling: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            ceiling: RETRY_CEILING,
        }
    }
}

impl RetryPolicy {
    pub fn allows_reflection(&self, attempt_count: u32) -> bool {
        attempt_count < self.ceiling
    }
}

/// 执行后的决策点
#[derive(Debug, Clone, Copy, Default)]
pub struct OutcomeClassifier {
    policy: RetryPolicy,
}

impl OutcomeClassifier {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// 系统错误总是优先于残留的 agent_error
    pub fn classify(state: &SessionState) -> Outcome {
        if state.last_answer.is_some() {
            Outcome::Success
        } else if state.system_error.is_some() {
            Outcome::SystemError
        } else if state.agent_error.is_some() {
            Outcome::AgentError
        } else {
            Outcome::Empty
        }
    }

    /// 成功与系统错误直接总结；agent_error 且预算未耗尽时反思；其余一律总结
    pub fn next_node(&self, state: &SessionState) -> Node {
        match Self::classify(state) {
            Outcome::Success | Outcome::SystemError => Node::Summarize,
            Outcome::AgentError if self.policy.allows_reflection(state.attempt_count) => {
                Node::Reflect
            }
            Outcome::AgentError | Outcome::Empty => Node::Summarize,
        }
    }
}

/// 反思后的决策点
#[derive(Debug, Clone, Copy, Default)]
pub struct ReflectionRouter;

impl ReflectionRouter {
    pub fn next_node(fix_type: Option<FixType>) -> Node {
        match fix_type {
            Some(FixType::EnvironmentFix) => Node::Repair,
            Some(FixType::CodeFix) | None => Node::Execute,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failing_state(attempts: u32) -> SessionState {
        SessionState {
            attempt_count: attempts,
            agent_error: Some("Error: Code execution failed 1 NameError".to_string()),
            ..SessionState::default()
        }
    }

    #[test]
    fn test_retry_policy_boundary() {
        let policy = RetryPolicy::default();
        assert!(policy.allows_reflection(1));
        assert!(policy.allows_reflection(RETRY_CEILING - 1));
        assert!(!policy.allows_reflection(RETRY_CEILING));
        assert!(!policy.allows_reflection(RETRY_CEILING + 1));
    }

    #[test]
    fn test_agent_error_reflects_below_ceiling() {
        let classifier = OutcomeClassifier::default();
        for attempts in 1..4 {
            assert_eq!(classifier.next_node(&failing_state(attempts)), Node::Reflect);
        }
    }

    #[test]
    fn test_agent_error_at_ceiling_summarizes() {
        let classifier = OutcomeClassifier::default();
        assert_eq!(classifier.next_node(&failing_state(4)), Node::Summarize);
    }

    #[test]
    fn test_system_error_wins_over_agent_error() {
        let mut state = failing_state(1);
        state.system_error = Some("Cmd was empty.".to_string());
        assert_eq!(OutcomeClassifier::classify(&state), Outcome::SystemError);
        assert_eq!(OutcomeClassifier::default().next_node(&state), Node::Summarize);
    }

    #[test]
    fn test_success_summarizes() {
        let state = SessionState {
            attempt_count: 1,
            last_answer: Some("[{'question': 'q', 'answer': 'a'}]".to_string()),
            ..SessionState::default()
        };
        assert_eq!(OutcomeClassifier::classify(&state), Outcome::Success);
        assert_eq!(OutcomeClassifier::default().next_node(&state), Node::Summarize);
    }

    #[test]
    fn test_empty_state_summarizes() {
        let state = SessionState::default();
        assert_eq!(OutcomeClassifier::classify(&state), Outcome::Empty);
        assert_eq!(OutcomeClassifier::default().next_node(&state), Node::Summarize);
    }

    #[test]
    fn test_classifier_is_idempotent() {
        let classifier = OutcomeClassifier::default();
        let state = failing_state(2);
        let first = classifier.next_node(&state);
        let second = classifier.next_node(&state);
        assert_eq!(first, second);
    }

    #[test]
    fn test_reflection_router() {
        assert_eq!(
            ReflectionRouter::next_node(Some(FixType::EnvironmentFix)),
            Node::Repair
        );
        assert_eq!(ReflectionRouter::next_node(Some(FixType::CodeFix)), Node::Execute);
        assert_eq!(ReflectionRouter::next_node(None), Node::Execute);
    }
}
