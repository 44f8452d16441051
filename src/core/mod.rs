//! 核心错误层：LLM 协作方错误与沙箱错误

pub mod error;

pub use error::{CollaboratorError, SandboxError};
