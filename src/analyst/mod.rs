//! LlmAnalyst：基于 LlmClient 的 LanguageModelPort 实现
//!
//! 四个角色共用一个客户端，各自使用不同的系统提示词：
//! Manager（路由）、Generator（写代码）、Reflector（修复）、Summarizer（总结）。
//! 前三者要求 JSON 结构化输出，Summarizer 返回自然语言。

pub mod prompts;
pub mod structured;

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;

use crate::core::CollaboratorError;
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::workflow::{
    FixType, GenerationResult, LanguageModelPort, ReflectionRequest, ReflectionResult,
    RouteDecision, SummaryRequest,
};

pub use prompts::Prompts;
use structured::{
    parse_structured, schema_instructions, Decision, GeneratorOutput, ManagerOutput,
    ReflectorOutput,
};

pub struct LlmAnalyst {
    llm: Arc<dyn LlmClient>,
    prompts: Prompts,
}

impl LlmAnalyst {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            prompts: Prompts::default(),
        }
    }

    pub fn with_prompts(mut self, prompts: Prompts) -> Self {
        self.prompts = prompts;
        self
    }

    async fn complete(&self, messages: &[Message]) -> Result<String, CollaboratorError> {
        self.llm
            .complete(messages)
            .await
            .map_err(CollaboratorError::Llm)
    }

    async fn structured<T: DeserializeOwned + JsonSchema>(
        &self,
        system: &str,
        messages: &[Message],
    ) -> Result<T, CollaboratorError> {
        let mut full = vec![Message::system(format!(
            "{system}\n\n{}",
            schema_instructions::<T>()
        ))];
        full.extend_from_slice(messages);
        let output = self.complete(&full).await?;
        parse_structured(&output)
    }
}

fn non_empty(text: Option<String>) -> Option<String> {
    text.filter(|t| !t.trim().is_empty())
}

#[async_trait]
impl LanguageModelPort for LlmAnalyst {
    async fn route_decision(&self, history: &[Message]) -> Result<RouteDecision, CollaboratorError> {
        let out: ManagerOutput = self.structured(&self.prompts.manager, history).await?;
        let missing = |field: &str| {
            CollaboratorError::Unparseable(format!("{:?} decision without {field}", out.decision))
        };

        match out.decision {
            Decision::CodeGen => Ok(RouteDecision::CodeGen {
                question: non_empty(out.question.clone()).ok_or_else(|| missing("question"))?,
            }),
            Decision::Summarizer => Ok(RouteDecision::Summarizer {
                question: non_empty(out.question.clone()).ok_or_else(|| missing("question"))?,
            }),
            Decision::Chat => Ok(RouteDecision::Chat {
                reply: non_empty(out.messages.clone()).ok_or_else(|| missing("messages"))?,
            }),
            Decision::Clarify => Ok(RouteDecision::Clarify {
                reply: non_empty(out.messages.clone())
                    .or_else(|| non_empty(out.question.clone()))
                    .ok_or_else(|| missing("messages"))?,
            }),
        }
    }

    async fn generate(&self, question: &str) -> Result<GenerationResult, CollaboratorError> {
        let out: GeneratorOutput = self
            .structured(&self.prompts.generator, &[Message::user(question)])
            .await?;
        Ok(GenerationResult {
            code: out.code,
            rationale: out.thinking,
            charts_exist: out.charts_exists,
            chart_names: out.generated_chart_names,
        })
    }

    async fn reflect(
        &self,
        request: &ReflectionRequest,
    ) -> Result<ReflectionResult, CollaboratorError> {
        let input = match request {
            ReflectionRequest::Review {
                code,
                error,
                rationale,
            } => format!(
                "Review the following code and error to reflect on the needed fix:\n\n\
                 --- Code ---\n{code}\n\
                 --- Agent Error ---\n{error}\n\
                 --- Thinking process of model who wrote the code ---\n{rationale}\n"
            ),
            ReflectionRequest::FromScratch { error, rationale } => format!(
                "The previous step failed to generate code. Error: {error}. \
                 Please generate a solution from scratch using thinking: {rationale}."
            ),
        };

        let out: ReflectorOutput = self
            .structured(&self.prompts.reflector, &[Message::user(input)])
            .await?;

        let fix_type = match out.fix_type.as_deref().map(str::trim) {
            Some(t) if t.eq_ignore_ascii_case("ENVIRONMENT_FIX") => FixType::EnvironmentFix,
            _ => FixType::CodeFix,
        };
        Ok(ReflectionResult {
            fix_type,
            code: non_empty(out.code),
            cmd: non_empty(out.cmd),
            comment: out.comment,
        })
    }

    async fn summarize(&self, request: &SummaryRequest) -> Result<String, CollaboratorError> {
        let mut messages = vec![Message::system(self.prompts.summarizer.clone())];
        match request {
            SummaryRequest::Analysis {
                rationale,
                code,
                content,
            } => {
                messages.push(Message::assistant(rationale.clone()));
                messages.push(Message::assistant(code.clone()));
                messages.push(Message::user(content.clone()));
            }
            SummaryRequest::FollowUp { question, prior } => {
                let mut context = format!(
                    "Previous analysis task:\n{}\n\n--- Thinking ---\n{}\n\n--- Code ---\n{}\n\n--- Results ---\n{}",
                    prior.question, prior.rationale, prior.code, prior.answer
                );
                if !prior.chart_filenames.is_empty() {
                    context.push_str(&format!(
                        "\n\nVisualizations created: {}",
                        prior.chart_filenames.join(", ")
                    ));
                }
                messages.push(Message::assistant(context));
                messages.push(Message::user(question.clone()));
            }
        }

        let text = self.complete(&messages).await?;
        if text.trim().is_empty() {
            return Err(CollaboratorError::EmptyResponse);
        }
        Ok(text)
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }
}
