//! 工作流：单轮状态、决策点、协作方端口与状态机引擎

pub mod engine;
pub mod events;
pub mod policy;
pub mod ports;
pub mod state;

pub use engine::{EngineOptions, TurnOutcome, WorkflowEngine};
pub use events::{ReplyKind, WorkflowEvent};
pub use policy::{Node, Outcome, OutcomeClassifier, ReflectionRouter, RetryPolicy, RETRY_CEILING};
pub use ports::{
    AnalysisRecord, ArtifactFetch, ArtifactPort, ExecOutput, ExecutionPort, FixType,
    GenerationResult, LanguageModelPort, ReflectionRequest, ReflectionResult, RouteDecision,
    SummaryRequest,
};
pub use state::SessionState;
