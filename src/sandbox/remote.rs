//! 远程沙箱（HTTP API）
//!
//! - `POST /process/code-run {"code"}` -> `{"exit_code", "result"}`
//! - `POST /process/exec {"command"}` -> `{"exit_code", "result"}`
//! - `GET /files?path=<name>` -> 文件内容

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::core::SandboxError;
use crate::sandbox::artifact_name;
use crate::workflow::{ArtifactFetch, ArtifactPort, ExecOutput, ExecutionPort};

#[derive(Debug, Clone)]
pub struct RemoteSandboxConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// 图表保存目录
    pub download_dir: PathBuf,
    pub connect_timeout_secs: u64,
}

impl RemoteSandboxConfig {
    pub fn new(base_url: impl Into<String>, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            download_dir: download_dir.into(),
            connect_timeout_secs: 10,
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }
}

#[derive(Debug, Serialize)]
struct CodeRunRequest<'a> {
    code: &'a str,
}

#[derive(Debug, Serialize)]
struct ExecRequest<'a> {
    command: &'a str,
}

#[derive(Debug, Deserialize)]
struct ProcessResponse {
    exit_code: i32,
    #[serde(default)]
    result: String,
}

pub struct RemoteSandbox {
    config: RemoteSandboxConfig,
    client: Client,
}

impl RemoteSandbox {
    pub fn new(config: RemoteSandboxConfig) -> Result<Self, SandboxError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()?;
        tracing::info!(base_url = %config.base_url, "created remote sandbox client");
        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }

    async fn process<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ExecOutput, SandboxError> {
        let url = self.url(path);
        let response = self.authorize(self.client.post(&url).json(body)).send().await?;
        if !response.status().is_success() {
            return Err(SandboxError::Server(format!(
                "{url} returned {}",
                response.status()
            )));
        }
        let body: ProcessResponse = response.json().await?;
        Ok(ExecOutput::new(body.exit_code, body.result))
    }

    async fn fetch_one(&self, name: &str) -> Result<PathBuf, SandboxError> {
        let relative = artifact_name(name)?;
        let file_name = relative
            .file_name()
            .ok_or_else(|| SandboxError::PathEscape(name.to_string()))?;

        let url = self.url("files");
        let response = self
            .authorize(self.client.get(&url).query(&[("path", name)]))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SandboxError::Server(format!(
                "download of {name} returned {}",
                response.status()
            )));
        }
        let bytes = response.bytes().await?;

        tokio::fs::create_dir_all(&self.config.download_dir).await?;
        let dest = self.config.download_dir.join(file_name);
        tokio::fs::write(&dest, &bytes).await?;
        Ok(dest)
    }
}

#[async_trait]
impl ExecutionPort for RemoteSandbox {
    async fn run_code(&self, code: &str) -> Result<ExecOutput, SandboxError> {
        tracing::debug!(code_len = code.len(), "remote sandbox run code");
        self.process("process/code-run", &CodeRunRequest { code }).await
    }

    async fn run_command(&self, command: &str) -> Result<ExecOutput, SandboxError> {
        tracing::debug!(command = %command, "remote sandbox run command");
        self.process("process/exec", &ExecRequest { command }).await
    }
}

#[async_trait]
impl ArtifactPort for RemoteSandbox {
    async fn fetch(&self, names: &[String]) -> Vec<ArtifactFetch> {
        let mut fetches = Vec::with_capacity(names.len());
        for name in names {
            fetches.push(ArtifactFetch {
                name: name.clone(),
                outcome: self.fetch_one(name).await,
            });
        }
        fetches
    }
}
