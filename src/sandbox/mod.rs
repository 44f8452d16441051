//! 执行环境：本地进程沙箱 / 远程 HTTP 沙箱，均实现 ExecutionPort 与 ArtifactPort

pub mod local;
pub mod remote;

use std::path::{Component, Path};

use crate::core::SandboxError;

pub use local::LocalSandbox;
pub use remote::{RemoteSandbox, RemoteSandboxConfig};

/// 图表名必须是沙箱工作目录内的相对路径
pub(crate) fn artifact_name(name: &str) -> Result<&Path, SandboxError> {
    let path = Path::new(name);
    let escapes = name.trim().is_empty()
        || path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(SandboxError::PathEscape(name.to_string()));
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_name() {
        assert!(artifact_name("chart.png").is_ok());
        assert!(artifact_name("out/chart.png").is_ok());
        assert!(artifact_name("../chart.png").is_err());
        assert!(artifact_name("/tmp/chart.png").is_err());
        assert!(artifact_name("").is_err());
    }
}
