use thiserror::Error;

/// docscope 的错误类型定义
///
/// 只有 `InputNotFound` 等致命错误会向调用方传播，
/// 其余协作方失败都会在各组件内部降级为 [`crate::report::RecoveredIssue`]。
#[derive(Error, Debug)]
pub enum DocScopeError {
    #[error("Git repository error: {0}")]
    GitError(String),

    #[error("Source parsing error: {0}")]
    ParseError(String),

    #[error("File I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid revision: {0}")]
    InvalidRevision(String),

    #[error("Input not found: {0}")]
    InputNotFound(String),

    #[error("Unparsable source: {0}")]
    UnparsableSource(String),

    #[error("Tree-sitter parsing failed: {0}")]
    TreeSitterError(String),

    #[error("Documentation generation failed: {0}")]
    GenerationError(String),

    #[error("Commit failed: {0}")]
    CommitError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<serde_json::Error> for DocScopeError {
    fn from(err: serde_json::Error) -> Self {
        DocScopeError::SerializationError(err.to_string())
    }
}

/// 项目通用的 Result 类型别名
pub type Result<T> = std::result::Result<T, DocScopeError>;
