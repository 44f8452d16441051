//! Headless Agent 运行时
//!
//! create_engine 根据配置组装 LLM、沙箱与 WorkflowEngine；
//! Session 持有跨轮保留的对话历史与上一次成功分析，逐轮调用引擎。

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::analyst::{LlmAnalyst, Prompts};
use crate::config::{AppConfig, SandboxBackend};
use crate::llm::{LlmClient, OpenAiClient};
use crate::memory::{ConversationMemory, Message};
use crate::sandbox::{LocalSandbox, RemoteSandbox, RemoteSandboxConfig};
use crate::workflow::{AnalysisRecord, ArtifactPort, ExecutionPort, TurnOutcome, WorkflowEngine};

/// 按 [llm] 段创建客户端；目前只有 OpenAI 兼容后端
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    if cfg.llm.provider != "openai" {
        tracing::warn!(provider = %cfg.llm.provider, "unknown llm provider, using openai-compatible client");
    }
    let api_key = std::env::var(&cfg.llm.api_key_env).ok();
    Arc::new(
        OpenAiClient::new(cfg.llm.base_url.as_deref(), &cfg.llm.model, api_key.as_deref())
            .with_temperature(cfg.llm.temperature),
    )
}

/// 按 [sandbox] 段创建执行端口与图表端口（同一个沙箱实例）
pub fn create_sandbox_from_config(
    cfg: &AppConfig,
) -> anyhow::Result<(Arc<dyn ExecutionPort>, Arc<dyn ArtifactPort>)> {
    let section = &cfg.sandbox;
    match section.backend {
        SandboxBackend::Local => {
            let sandbox = Arc::new(
                LocalSandbox::new(section.work_dir(), section.download_dir())
                    .with_interpreter(section.interpreter.clone())
                    .with_shell(section.shell.clone()),
            );
            Ok((
                sandbox.clone() as Arc<dyn ExecutionPort>,
                sandbox as Arc<dyn ArtifactPort>,
            ))
        }
        SandboxBackend::Remote => {
            let api_key = std::env::var(&section.remote.api_key_env).ok();
            let config = RemoteSandboxConfig::new(&section.remote.base_url, section.download_dir())
                .with_api_key(api_key);
            let sandbox =
                Arc::new(RemoteSandbox::new(config).context("Failed to create remote sandbox")?);
            Ok((
                sandbox.clone() as Arc<dyn ExecutionPort>,
                sandbox as Arc<dyn ArtifactPort>,
            ))
        }
    }
}

/// 组装完整引擎
pub fn create_engine(cfg: &AppConfig) -> anyhow::Result<WorkflowEngine> {
    let llm = create_llm_from_config(cfg);
    let analyst = LlmAnalyst::new(llm).with_prompts(Prompts::load());
    let (executor, artifacts) = create_sandbox_from_config(cfg)?;
    Ok(WorkflowEngine::new(Arc::new(analyst), executor, artifacts).with_options(cfg.engine_options()))
}

/// 多轮会话：对话历史 + 上一次成功分析
pub struct Session {
    engine: Arc<WorkflowEngine>,
    history: ConversationMemory,
    last_analysis: Option<AnalysisRecord>,
}

impl Session {
    pub fn new(engine: Arc<WorkflowEngine>, max_turns: usize) -> Self {
        Self {
            engine,
            history: ConversationMemory::new(max_turns),
            last_analysis: None,
        }
    }

    /// 处理一条用户消息：写入历史、跑一轮、把回复写回历史
    pub async fn send(&mut self, user_input: &str, cancel: CancellationToken) -> TurnOutcome {
        self.history.push(Message::user(user_input));
        let outcome = self
            .engine
            .run_turn(self.history.messages(), self.last_analysis.as_ref(), cancel)
            .await;
        self.history.push(Message::assistant(outcome.reply.clone()));
        if let Some(record) = outcome.analysis_record() {
            self.last_analysis = Some(record);
        }
        outcome
    }

    /// 跑一轮；期间每收到一次中断就取消本轮。中断通道在轮次之间保持可用，空闲时由调用方处理
    pub async fn send_until_interrupted(
        &mut self,
        user_input: &str,
        interrupts: &mut mpsc::UnboundedReceiver<()>,
    ) -> TurnOutcome {
        let cancel = CancellationToken::new();
        let turn = self.send(user_input, cancel.clone());
        tokio::pin!(turn);
        loop {
            tokio::select! {
                outcome = &mut turn => return outcome,
                Some(()) = interrupts.recv() => {
                    tracing::warn!("interrupt received, cancelling turn");
                    cancel.cancel();
                }
            }
        }
    }

    pub fn history(&self) -> &[Message] {
        self.history.messages()
    }

    pub fn last_analysis(&self) -> Option<&AnalysisRecord> {
        self.last_analysis.as_ref()
    }

    /// 清空历史与分析留档
    pub fn reset(&mut self) {
        self.history.clear();
        self.last_analysis = None;
    }
}
