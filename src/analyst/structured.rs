//! 结构化输出：JSON Schema 提示与解析
//!
//! 模型回复可能夹带 ```json 代码块或前后说明文字；先提取 JSON 对象再按目标类型反序列化。

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::core::CollaboratorError;

/// Router 输出
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ManagerOutput {
    pub decision: Decision,
    /// Self-contained task for code_gen / summarizer, including all user-supplied data
    #[serde(default)]
    pub question: Option<String>,
    /// Direct reply for chat, or the clarifying question for clarify
    #[serde(default)]
    pub messages: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    CodeGen,
    Summarizer,
    #[serde(alias = "chats")]
    Chat,
    Clarify,
}

/// Generator 输出
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GeneratorOutput {
    /// How you understood and planned the solution
    #[serde(default)]
    pub thinking: String,
    /// Complete, executable Python code
    #[serde(default)]
    pub code: String,
    /// Whether the code saves any chart files
    #[serde(default)]
    pub charts_exists: bool,
    /// Filenames of every chart the code saves
    #[serde(default)]
    pub generated_chart_names: Vec<String>,
}

/// Reflector 输出
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ReflectorOutput {
    /// "CODE_FIX" or "ENVIRONMENT_FIX"
    #[serde(default)]
    pub fix_type: Option<String>,
    /// Complete corrected code (CODE_FIX)
    #[serde(default)]
    pub code: Option<String>,
    /// Shell command that repairs the environment (ENVIRONMENT_FIX)
    #[serde(default)]
    pub cmd: Option<String>,
    /// Short explanation of the failure
    #[serde(default)]
    pub comment: String,
}

/// 附加在系统提示词后的格式要求
pub fn schema_instructions<T: JsonSchema>() -> String {
    let schema = schemars::schema_for!(T);
    let schema = serde_json::to_string_pretty(&schema).unwrap_or_default();
    format!(
        "Respond with a single JSON object and nothing else. It must match this JSON schema:\n{schema}"
    )
}

/// 提取 JSON 文本：```json 代码块优先，其次首个 `{` 到最后一个 `}`
pub fn extract_json(output: &str) -> Option<&str> {
    let trimmed = output.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

/// 解析为目标类型；空回复与无法解析分别报错
pub fn parse_structured<T: DeserializeOwned>(output: &str) -> Result<T, CollaboratorError> {
    if output.trim().is_empty() {
        return Err(CollaboratorError::EmptyResponse);
    }
    let json = extract_json(output)
        .ok_or_else(|| CollaboratorError::Unparseable(format!("no JSON object in: {}", output.trim())))?;
    serde_json::from_str(json).map_err(|e| CollaboratorError::Unparseable(format!("{e}: {json}")))
}
