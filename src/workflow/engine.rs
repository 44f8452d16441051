//! 工作流引擎
//!
//! 显式有限状态机：Route -> Generate -> Execute -> [Reflect -> (Repair) -> Execute]* -> Summarize。
//! 每个节点读写同一份 SessionState，返回下一个节点；决策点交给 OutcomeClassifier / ReflectionRouter。
//!
//! 协作方调用（LLM、沙箱）都带超时并响应取消令牌；任何协作方失败都转换为 system_error，
//! 因此 run_turn 从不返回错误，每轮恰好产出一条回复。

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::core::{CollaboratorError, SandboxError};
use crate::memory::Message;
use crate::workflow::events::{ReplyKind, WorkflowEvent};
use crate::workflow::policy::{Node, OutcomeClassifier, ReflectionRouter, RetryPolicy};
use crate::workflow::ports::{
    AnalysisRecord, ArtifactPort, ExecutionPort, FixType, LanguageModelPort, ReflectionRequest,
    RouteDecision, SummaryRequest,
};
use crate::workflow::state::SessionState;

pub const GENERATOR_FAILED: &str = "Generator didnt provide any code soln";
pub const REFLECTOR_FAILED: &str = "Reflector LLM failed to generate response. Aborting.";
pub const EMPTY_CODE: &str = "Code was empty.";
pub const EMPTY_COMMAND: &str = "Cmd was empty.";
pub const TURN_CANCELLED: &str = "turn cancelled";
pub const NO_RESULT: &str = "No result generated.";

/// 协作方调用的超时设置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    pub llm_timeout: Duration,
    pub execution_timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            llm_timeout: Duration::from_secs(60),
            execution_timeout: Duration::from_secs(120),
        }
    }
}

/// 一轮的结果：回复文本、回复类别、最终状态与经过的节点
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub turn_id: String,
    pub reply: String,
    pub kind: ReplyKind,
    pub state: SessionState,
    pub trace: Vec<Node>,
}

impl TurnOutcome {
    /// 成功分析时生成留档，供后续追问
    pub fn analysis_record(&self) -> Option<AnalysisRecord> {
        if self.kind != ReplyKind::Answer {
            return None;
        }
        let answer = self.state.last_answer.clone()?;
        Some(AnalysisRecord {
            question: self.state.pending_question.clone().unwrap_or_default(),
            code: self.state.generated_code.clone().unwrap_or_default(),
            rationale: self.state.rationale.clone().unwrap_or_default(),
            answer,
            chart_filenames: if self.state.charts_expected {
                self.state.chart_filenames.clone()
            } else {
                Vec::new()
            },
            created_at: chrono::Utc::now().timestamp_millis(),
        })
    }

    /// 本轮执行过某节点的次数
    pub fn visits(&self, node: Node) -> usize {
        self.trace.iter().filter(|n| **n == node).count()
    }
}

enum Step {
    Next(Node),
    Finish(ReplyKind, String),
}

enum GuardError {
    Cancelled,
    Failed(String),
}

/// 协作方错误类型各自的超时变体
trait Deadline {
    fn elapsed(limit: Duration) -> Self;
}

impl Deadline for CollaboratorError {
    fn elapsed(limit: Duration) -> Self {
        CollaboratorError::Timeout(limit)
    }
}

impl Deadline for SandboxError {
    fn elapsed(limit: Duration) -> Self {
        SandboxError::Timeout(limit)
    }
}

/// 工作流引擎：持有注入的协作方端口，按轮驱动状态机
pub struct WorkflowEngine {
    llm: Arc<dyn LanguageModelPort>,
    executor: Arc<dyn ExecutionPort>,
    artifacts: Arc<dyn ArtifactPort>,
    classifier: OutcomeClassifier,
    options: EngineOptions,
    event_tx: Option<mpsc::UnboundedSender<WorkflowEvent>>,
}

impl WorkflowEngine {
    pub fn new(
        llm: Arc<dyn LanguageModelPort>,
        executor: Arc<dyn ExecutionPort>,
        artifacts: Arc<dyn ArtifactPort>,
    ) -> Self {
        Self {
            llm,
            executor,
            artifacts,
            classifier: OutcomeClassifier::new(RetryPolicy::default()),
            options: EngineOptions::default(),
            event_tx: None,
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// 设置事件推送通道
    pub fn with_event_tx(mut self, tx: mpsc::UnboundedSender<WorkflowEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    fn emit(&self, event: WorkflowEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event);
        }
    }

    /// 跑完一轮。history 需已包含本轮的用户消息；prior 为上一次成功分析（用于追问）。
    pub async fn run_turn(
        &self,
        history: &[Message],
        prior: Option<&AnalysisRecord>,
        cancel: CancellationToken,
    ) -> TurnOutcome {
        let turn_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!("turn", turn_id = %turn_id);
        self.drive(turn_id, history, prior, cancel)
            .instrument(span)
            .await
    }

    async fn drive(
        &self,
        turn_id: String,
        history: &[Message],
        prior: Option<&AnalysisRecord>,
        cancel: CancellationToken,
    ) -> TurnOutcome {
        let mut state = SessionState::new();
        let mut trace = Vec::new();
        let mut follow_up = false;
        let mut node = Node::Route;

        let (kind, reply) = loop {
            // 已有答案时也要记下取消，Summarize 据此回复 System Failure
            if cancel.is_cancelled() {
                if !state.has_system_error() {
                    tracing::warn!(?node, "turn cancelled");
                }
                state.fail(TURN_CANCELLED);
                node = Node::Summarize;
            }

            trace.push(node);
            self.emit(WorkflowEvent::NodeEntered { node });
            tracing::debug!(?node, attempt = state.attempt_count, "enter node");

            let step = match node {
                Node::Route => {
                    let step = self.route(&mut state, history, &cancel).await;
                    follow_up = matches!(step, Step::Next(Node::Summarize))
                        && !state.has_system_error();
                    step
                }
                Node::Generate => Step::Next(self.generate(&mut state, &cancel).await),
                Node::Execute => {
                    self.execute(&mut state, &cancel).await;
                    Step::Next(self.classifier.next_node(&state))
                }
                Node::Repair => {
                    self.repair(&mut state, &cancel).await;
                    Step::Next(Node::Execute)
                }
                Node::Reflect => Step::Next(self.reflect(&mut state, &cancel).await),
                Node::Summarize => {
                    let prior = if follow_up { prior } else { None };
                    let (kind, reply) = self.summarize(&state, prior, &cancel).await;
                    Step::Finish(kind, reply)
                }
            };

            match step {
                Step::Next(next) => node = next,
                Step::Finish(kind, reply) => break (kind, reply),
            }
        };

        let (prompt_tokens, completion_tokens, total_tokens) = self.llm.token_usage();
        tracing::info!(
            ?kind,
            attempts = state.attempt_count,
            prompt_tokens,
            completion_tokens,
            total_tokens,
            "turn finished"
        );
        self.emit(WorkflowEvent::Finished { kind });

        TurnOutcome {
            turn_id,
            reply,
            kind,
            state,
            trace,
        }
    }

    /// 协作方调用的统一包装：取消优先，其次超时，最后是调用自身的错误
    async fn guard<T, E, F>(
        &self,
        cancel: &CancellationToken,
        limit: Duration,
        call: F,
    ) -> Result<T, GuardError>
    where
        F: Future<Output = Result<T, E>>,
        E: Display + Deadline,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(GuardError::Cancelled),
            res = tokio::time::timeout(limit, call) => match res {
                Err(_) => Err(GuardError::Failed(E::elapsed(limit).to_string())),
                Ok(Err(e)) => Err(GuardError::Failed(e.to_string())),
                Ok(Ok(v)) => Ok(v),
            },
        }
    }

    async fn route(
        &self,
        state: &mut SessionState,
        history: &[Message],
        cancel: &CancellationToken,
    ) -> Step {
        let decision = match self
            .guard(
                cancel,
                self.options.llm_timeout,
                self.llm.route_decision(history),
            )
            .await
        {
            Ok(d) => d,
            Err(GuardError::Cancelled) => {
                state.fail(TURN_CANCELLED);
                return Step::Next(Node::Summarize);
            }
            Err(GuardError::Failed(e)) => {
                tracing::warn!(error = %e, "router failed");
                state.fail(format!("Router failed to produce a decision: {e}"));
                return Step::Next(Node::Summarize);
            }
        };

        let label = match &decision {
            RouteDecision::CodeGen { .. } => "code_gen",
            RouteDecision::Summarizer { .. } => "summarizer",
            RouteDecision::Chat { .. } => "chat",
            RouteDecision::Clarify { .. } => "clarify",
        };
        tracing::info!(decision = label, "routed");
        self.emit(WorkflowEvent::Routed {
            decision: label.to_string(),
        });

        match decision {
            RouteDecision::CodeGen { question } => {
                state.pending_question = Some(question);
                Step::Next(Node::Generate)
            }
            RouteDecision::Summarizer { question } => {
                state.pending_question = Some(question);
                Step::Next(Node::Summarize)
            }
            RouteDecision::Chat { reply } => Step::Finish(ReplyKind::Chat, reply),
            RouteDecision::Clarify { reply } => Step::Finish(ReplyKind::Clarify, reply),
        }
    }

    async fn generate(&self, state: &mut SessionState, cancel: &CancellationToken) -> Node {
        let question = state.pending_question.clone().unwrap_or_default();

        match self
            .guard(cancel, self.options.llm_timeout, self.llm.generate(&question))
            .await
        {
            Ok(solution) => {
                state.generated_code = Some(solution.code);
                state.rationale = Some(solution.rationale);
                state.charts_expected = solution.charts_exist;
                state.chart_filenames = solution.chart_names;
                state.attempt_count = 1;
                self.emit(WorkflowEvent::CodeGenerated {
                    charts_expected: state.charts_expected,
                });
                Node::Execute
            }
            Err(GuardError::Cancelled) => {
                state.fail(TURN_CANCELLED);
                Node::Summarize
            }
            Err(GuardError::Failed(e)) => {
                tracing::warn!(error = %e, "generator failed");
                state.generated_code = None;
                state.fail(GENERATOR_FAILED);
                Node::Summarize
            }
        }
    }

    async fn execute(&self, state: &mut SessionState, cancel: &CancellationToken) {
        if state.has_system_error() {
            tracing::debug!("system error already set, skipping execution");
            return;
        }
        let Some(code) = state.code().map(str::to_owned) else {
            state.fail(EMPTY_CODE);
            return;
        };

        state.agent_error = None;
        match self
            .guard(
                cancel,
                self.options.execution_timeout,
                self.executor.run_code(&code),
            )
            .await
        {
            Ok(out) => {
                self.emit(WorkflowEvent::Executed {
                    attempt: state.attempt_count,
                    exit_code: out.exit_code,
                });
                if out.succeeded() {
                    tracing::info!(attempt = state.attempt_count, "code execution succeeded");
                    state.last_answer = Some(out.output);
                    if state.charts_expected {
                        self.fetch_charts(state, cancel).await;
                    }
                } else {
                    tracing::info!(
                        attempt = state.attempt_count,
                        exit_code = out.exit_code,
                        "code execution failed"
                    );
                    state.agent_error = Some(format!(
                        "Error: Code execution failed {} {}",
                        out.exit_code, out.output
                    ));
                }
            }
            Err(GuardError::Cancelled) => state.fail(TURN_CANCELLED),
            Err(GuardError::Failed(e)) => {
                tracing::warn!(error = %e, "sandbox failed to run code");
                state.fail(format!("Sandbox failed to run code: {e}"));
            }
        }

        if let Err(violation) = state.check_execution_outcome() {
            tracing::error!(%violation, "inconsistent state after execution");
        }
    }

    /// 尽力取回图表：失败只记日志，不影响 last_answer
    async fn fetch_charts(&self, state: &SessionState, cancel: &CancellationToken) {
        if state.chart_filenames.is_empty() {
            return;
        }
        let fetches = self
            .guard(
                cancel,
                self.options.execution_timeout,
                async { Ok::<_, SandboxError>(self.artifacts.fetch(&state.chart_filenames).await) },
            )
            .await;

        let fetches = match fetches {
            Ok(f) => f,
            Err(GuardError::Cancelled) => {
                tracing::warn!("chart download cancelled");
                return;
            }
            Err(GuardError::Failed(e)) => {
                tracing::warn!(error = %e, "chart download failed");
                return;
            }
        };

        for fetch in fetches {
            match &fetch.outcome {
                Ok(path) => tracing::info!(name = %fetch.name, path = %path.display(), "downloaded chart"),
                Err(e) => tracing::warn!(name = %fetch.name, error = %e, "chart download failed"),
            }
            self.emit(WorkflowEvent::ArtifactFetched {
                name: fetch.name,
                ok: fetch.outcome.is_ok(),
            });
        }
    }

    async fn repair(&self, state: &mut SessionState, cancel: &CancellationToken) {
        let Some(cmd) = state.pending_repair().map(str::to_owned) else {
            state.fail(EMPTY_COMMAND);
            return;
        };

        match self
            .guard(
                cancel,
                self.options.execution_timeout,
                self.executor.run_command(&cmd),
            )
            .await
        {
            Ok(out) => {
                self.emit(WorkflowEvent::RepairExecuted {
                    exit_code: out.exit_code,
                });
                if out.succeeded() {
                    tracing::info!(command = %cmd, "repair command succeeded");
                    state.agent_error = None;
                } else {
                    tracing::info!(command = %cmd, exit_code = out.exit_code, "repair command failed");
                    state.agent_error = Some(format!(
                        "Error: Cmd execution failed {} {}",
                        out.exit_code, out.output
                    ));
                }
            }
            Err(GuardError::Cancelled) => state.fail(TURN_CANCELLED),
            Err(GuardError::Failed(e)) => {
                tracing::warn!(error = %e, "sandbox failed to run command");
                state.fail(format!("Sandbox failed to run command: {e}"));
            }
        }
    }

    async fn reflect(&self, state: &mut SessionState, cancel: &CancellationToken) -> Node {
        let error = state
            .agent_error
            .clone()
            .unwrap_or_else(|| "No error reported.".to_string());
        let rationale = state
            .rationale
            .clone()
            .unwrap_or_else(|| "No thinking provided.".to_string());
        let request = match state.code() {
            Some(code) => ReflectionRequest::Review {
                code: code.to_string(),
                error,
                rationale,
            },
            None => ReflectionRequest::FromScratch { error, rationale },
        };

        let fix = match self
            .guard(cancel, self.options.llm_timeout, self.llm.reflect(&request))
            .await
        {
            Ok(fix) => fix,
            Err(GuardError::Cancelled) => {
                state.fail(TURN_CANCELLED);
                return Node::Summarize;
            }
            Err(GuardError::Failed(e)) => {
                tracing::warn!(error = %e, "reflector failed");
                state.fail(REFLECTOR_FAILED);
                return Node::Summarize;
            }
        };

        state.attempt_count += 1;
        state.fix_type = Some(fix.fix_type);
        match fix.fix_type {
            FixType::EnvironmentFix => {
                state.repair_command = fix.cmd;
            }
            FixType::CodeFix => {
                state.repair_command = None;
                if let Some(code) = fix.code.filter(|c| !c.trim().is_empty()) {
                    state.generated_code = Some(code);
                }
            }
        }

        tracing::info!(
            attempt = state.attempt_count,
            fix_type = ?fix.fix_type,
            comment = %fix.comment,
            "reflected"
        );
        self.emit(WorkflowEvent::Reflected {
            attempt: state.attempt_count,
            fix_type: fix.fix_type,
        });

        ReflectionRouter::next_node(state.fix_type)
    }

    async fn summarize(
        &self,
        state: &SessionState,
        prior: Option<&AnalysisRecord>,
        cancel: &CancellationToken,
    ) -> (ReplyKind, String) {
        if cancel.is_cancelled() {
            let error = state.system_error.as_deref().unwrap_or(TURN_CANCELLED);
            return (ReplyKind::SystemFailure, format!("System Failure: {error}"));
        }

        if let Some(answer) = &state.last_answer {
            let content = compose_results(answer, state);
            let request = SummaryRequest::Analysis {
                rationale: state
                    .rationale
                    .clone()
                    .unwrap_or_else(|| "No thinking provided.".to_string()),
                code: state
                    .generated_code
                    .clone()
                    .unwrap_or_else(|| "No code provided.".to_string()),
                content: content.clone(),
            };
            return match self
                .guard(cancel, self.options.llm_timeout, self.llm.summarize(&request))
                .await
            {
                Ok(text) if !text.trim().is_empty() => (ReplyKind::Answer, text),
                Ok(_) => (ReplyKind::Answer, content),
                Err(GuardError::Cancelled) => (ReplyKind::Answer, content),
                Err(GuardError::Failed(e)) => {
                    tracing::warn!(error = %e, "summarizer failed, replying with raw results");
                    (ReplyKind::Answer, content)
                }
            };
        }

        if let Some(error) = &state.system_error {
            return (ReplyKind::SystemFailure, format!("System Failure: {error}"));
        }

        if let Some(error) = &state.agent_error {
            return (
                ReplyKind::BudgetExhausted,
                format!(
                    "I failed to find a solution after maximum attempts. The last error encountered was: {error}"
                ),
            );
        }

        if let (Some(question), Some(prior)) = (&state.pending_question, prior) {
            let request = SummaryRequest::FollowUp {
                question: question.clone(),
                prior: prior.clone(),
            };
            return match self
                .guard(cancel, self.options.llm_timeout, self.llm.summarize(&request))
                .await
            {
                Ok(text) if !text.trim().is_empty() => (ReplyKind::FollowUp, text),
                Ok(_) => (ReplyKind::NoResult, NO_RESULT.to_string()),
                Err(GuardError::Cancelled) => (
                    ReplyKind::SystemFailure,
                    format!("System Failure: {TURN_CANCELLED}"),
                ),
                Err(GuardError::Failed(e)) => (
                    ReplyKind::SystemFailure,
                    format!("System Failure: Summarizer failed to answer the follow-up: {e}"),
                ),
            };
        }

        (ReplyKind::NoResult, NO_RESULT.to_string())
    }
}

/// 拼接成功结果文本；声明了图表时附上文件名
fn compose_results(answer: &str, state: &SessionState) -> String {
    let mut content = format!("Analysis results:\n{answer}");
    if state.charts_expected && !state.chart_filenames.is_empty() {
        content.push_str(&format!(
            "\n\nVisualizations created: {}",
            state.chart_filenames.join(", ")
        ));
    }
    content
}
