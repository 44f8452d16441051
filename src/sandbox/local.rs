//! 本地进程沙箱
//!
//! 代码写入工作目录下的临时脚本后交给解释器执行；修复命令通过 `sh -c` 执行。
//! 超时由引擎负责：future 被丢弃时进程随 kill_on_drop 被杀掉，临时脚本随 NamedTempFile 被删除。

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Output;

use async_trait::async_trait;
use tokio::process::Command;

use crate::core::SandboxError;
use crate::sandbox::artifact_name;
use crate::workflow::{ArtifactFetch, ArtifactPort, ExecOutput, ExecutionPort};

pub struct LocalSandbox {
    work_dir: PathBuf,
    download_dir: PathBuf,
    interpreter: String,
    shell: String,
}

impl LocalSandbox {
    pub fn new(work_dir: impl Into<PathBuf>, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            download_dir: download_dir.into(),
            interpreter: "python3".to_string(),
            shell: "sh".to_string(),
        }
    }

    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    async fn run(&self, mut cmd: Command) -> Result<ExecOutput, SandboxError> {
        tokio::fs::create_dir_all(&self.work_dir).await?;
        let output = cmd.current_dir(&self.work_dir).kill_on_drop(true).output().await?;
        Ok(to_exec_output(output))
    }

    async fn fetch_one(&self, name: &str) -> Result<PathBuf, SandboxError> {
        let relative = artifact_name(name)?;
        let file_name = relative
            .file_name()
            .ok_or_else(|| SandboxError::PathEscape(name.to_string()))?;
        tokio::fs::create_dir_all(&self.download_dir).await?;
        let dest = self.download_dir.join(file_name);
        tokio::fs::copy(self.work_dir.join(relative), &dest).await?;
        Ok(dest)
    }
}

/// 成功时只取 stdout；失败时 stderr 在前，便于反思步骤看到报错
fn to_exec_output(output: Output) -> ExecOutput {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let exit_code = output.status.code().unwrap_or(-1);
    let text = if output.status.success() {
        stdout.into_owned()
    } else if stdout.trim().is_empty() {
        stderr.into_owned()
    } else {
        format!("{stderr}\n{stdout}")
    };
    ExecOutput::new(exit_code, text)
}

#[async_trait]
impl ExecutionPort for LocalSandbox {
    async fn run_code(&self, code: &str) -> Result<ExecOutput, SandboxError> {
        tokio::fs::create_dir_all(&self.work_dir).await?;
        let mut script = tempfile::Builder::new()
            .prefix(".analyst_")
            .suffix(".py")
            .tempfile_in(&self.work_dir)?;
        script.write_all(code.as_bytes())?;
        script.flush()?;

        // 进程的工作目录就是 work_dir，只传文件名
        let name = script
            .path()
            .file_name()
            .map(PathBuf::from)
            .ok_or_else(|| SandboxError::Server("temporary script has no file name".to_string()))?;

        tracing::info!(interpreter = %self.interpreter, script = %name.display(), "local sandbox run code");
        let mut cmd = Command::new(&self.interpreter);
        cmd.arg(&name);
        self.run(cmd).await
    }

    async fn run_command(&self, command: &str) -> Result<ExecOutput, SandboxError> {
        tracing::info!(command = %command, "local sandbox run command");
        let mut cmd = Command::new(&self.shell);
        cmd.args(["-c", command]);
        self.run(cmd).await
    }
}

#[async_trait]
impl ArtifactPort for LocalSandbox {
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

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox(dir: &tempfile::TempDir) -> LocalSandbox {
        LocalSandbox::new(dir.path().join("work"), dir.path().join("charts")).with_interpreter("sh")
    }

    #[tokio::test]
    async fn test_run_code_success() {
        let dir = tempfile::tempdir().unwrap();
        let out = sandbox(&dir).run_code("echo hello").await.unwrap();
        assert!(out.succeeded());
        assert_eq!(out.output.trim(), "hello");
    }

    #[tokio::test]
    async fn test_run_code_nonzero_exit_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let out = sandbox(&dir)
            .run_code("echo boom >&2\nexit 3")
            .await
            .unwrap();
        assert_eq!(out.exit_code, 3);
        assert!(out.output.contains("boom"));
    }

    #[tokio::test]
    async fn test_run_code_cleans_up_script() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = sandbox(&dir);
        sandbox.run_code("true").await.unwrap();
        let leftovers = std::fs::read_dir(sandbox.work_dir()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_timed_out_run_leaves_no_script() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = sandbox(&dir);
        let run = tokio::time::timeout(
            std::time::Duration::from_millis(200),
            sandbox.run_code("sleep 5"),
        )
        .await;
        assert!(run.is_err());

        let leftovers: Vec<_> = std::fs::read_dir(sandbox.work_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert!(leftovers.is_empty(), "leftover files: {leftovers:?}");
    }

    #[tokio::test]
    async fn test_run_command() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = sandbox(&dir);
        let out = sandbox.run_command("echo repaired").await.unwrap();
        assert_eq!(out.exit_code, 0);
        assert_eq!(out.output.trim(), "repaired");

        let out = sandbox.run_command("exit 2").await.unwrap();
        assert_eq!(out.exit_code, 2);
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_sandbox_error() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = sandbox(&dir).with_interpreter("definitely-not-an-interpreter");
        assert!(matches!(
            sandbox.run_code("print(1)").await,
            Err(SandboxError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_is_per_name() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = sandbox(&dir);
        sandbox.run_command("echo png > chart.png").await.unwrap();

        let names = vec![
            "chart.png".to_string(),
            "missing.png".to_string(),
            "../escape.png".to_string(),
        ];
        let fetches = sandbox.fetch(&names).await;
        assert_eq!(fetches.len(), 3);

        let saved = fetches[0].outcome.as_ref().unwrap();
        assert_eq!(saved, &dir.path().join("charts").join("chart.png"));
        assert!(saved.exists());
        assert!(matches!(fetches[1].outcome, Err(SandboxError::Io(_))));
        assert!(matches!(fetches[2].outcome, Err(SandboxError::PathEscape(_))));
    }
}
