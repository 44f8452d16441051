//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `ANALYST__*` 覆盖（双下划线表示嵌套，如 `ANALYST__LLM__MODEL=gpt-4.1`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::workflow::EngineOptions;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub sandbox: SandboxSection,
}

impl AppConfig {
    /// 协作方超时
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            llm_timeout: Duration::from_secs(self.llm.timeouts.request),
            execution_timeout: Duration::from_secs(self.sandbox.timeout_secs),
        }
    }
}

/// [app] 段：应用名、对话轮数上限
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    /// 对话历史保留轮数
    #[serde(default = "default_max_context_turns")]
    pub max_context_turns: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            max_context_turns: default_max_context_turns(),
        }
    }
}

fn default_max_context_turns() -> usize {
    20
}

/// [llm] 段：模型、端点与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：目前只支持 openai（兼容端点通过 base_url 指定）
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    /// 采样温度；未设置时使用服务端默认值
    pub temperature: Option<f32>,
    /// 存放 API Key 的环境变量名
    #[serde(default = "default_llm_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            temperature: None,
            api_key_env: default_llm_api_key_env(),
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4.1-mini".to_string()
}

fn default_llm_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    /// 单次结构化调用超时（秒）
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

/// 沙箱后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SandboxBackend {
    #[default]
    Local,
    Remote,
}

/// [sandbox] 段：执行后端、工作目录、解释器与超时
#[derive(Debug, Clone, Deserialize)]
pub struct SandboxSection {
    #[serde(default)]
    pub backend: SandboxBackend,
    /// 代码运行目录，未设置时用 ./workspace
    pub work_dir: Option<PathBuf>,
    /// 图表下载目录，未设置时用 ./charts
    pub download_dir: Option<PathBuf>,
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
    #[serde(default = "default_shell")]
    pub shell: String,
    /// 单次代码/命令执行超时（秒）
    #[serde(default = "default_sandbox_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub remote: RemoteSection,
}

impl Default for SandboxSection {
    fn default() -> Self {
        Self {
            backend: SandboxBackend::default(),
            work_dir: None,
            download_dir: None,
            interpreter: default_interpreter(),
            shell: default_shell(),
            timeout_secs: default_sandbox_timeout_secs(),
            remote: RemoteSection::default(),
        }
    }
}

impl SandboxSection {
    pub fn work_dir(&self) -> PathBuf {
        self.work_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("workspace"))
    }

    pub fn download_dir(&self) -> PathBuf {
        self.download_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("charts"))
    }
}

fn default_interpreter() -> String {
    "python3".to_string()
}

fn default_shell() -> String {
    "sh".to_string()
}

fn default_sandbox_timeout_secs() -> u64 {
    120
}

/// [sandbox.remote] 段：远程沙箱地址与鉴权
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteSection {
    #[serde(default = "default_remote_url")]
    pub base_url: String,
    #[serde(default = "default_remote_api_key_env")]
    pub api_key_env: String,
}

impl Default for RemoteSection {
    fn default() -> Self {
        Self {
            base_url: default_remote_url(),
            api_key_env: default_remote_api_key_env(),
        }
    }
}

fn default_remote_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_remote_api_key_env() -> String {
    "ANALYST_SANDBOX_API_KEY".to_string()
}

/// 从 config 目录加载配置，环境变量 ANALYST__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 ANALYST__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("ANALYST")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 读取 config/prompts/<name>.txt；不存在时返回 None，由调用方使用内置提示词
pub fn load_prompt_override(name: &str) -> Option<String> {
    [
        format!("config/prompts/{name}.txt"),
        format!("../config/prompts/{name}.txt"),
    ]
    .into_iter()
    .find_map(|p| std::fs::read_to_string(p).ok())
    .filter(|s| !s.trim().is_empty())
}
