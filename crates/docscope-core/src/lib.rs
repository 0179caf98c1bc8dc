//! docscope-core - 源码结构解析与文档合成核心库
//!
//! 基于 Tree-sitter 与启发式扫描识别多语言源码中的声明，
//! 把统一差异中的每一行变更定位到外层声明链，
//! 并为仓库中的声明合成结构化文档。

pub mod context;
pub mod diff;
pub mod doccomment;
pub mod error;
pub mod formatter;
pub mod generator;
pub mod git;
pub mod history;
pub mod parser;
pub mod project;
pub mod report;
pub mod scope;
pub mod synthesizer;

// 重新导出主要的公共 API
pub use context::{ContextAggregator, ContextEntry, ContextOptions, ContextReport, Snippet};
pub use diff::{ChangeKind, ChangeRecord, ChangeType, DiffHunk, DiffHunkParser, FileChange};
pub use doccomment::{DocCommentExtractor, DocRecord};
pub use error::{DocScopeError, Result};
pub use formatter::{
    DocSection, ExportFormat, FileDocument, OutputRenderer, Provenance, Template,
};
pub use generator::{
    DocGenerationRequest, DocGenerator, GeneratedDocs, GenerationConfig, HttpTextClient,
    TextGenerationClient,
};
pub use git::{
    CommitWriter, FileVersionSource, GitCliCommitter, GitRepository, SourceRepository,
};
pub use history::{HistoryEntry, HistoryStore, RunConfiguration};
// 导出多语言解析器架构
pub use parser::{
    Declaration, DeclarationKey, DeclarationKind, DeclarationScanner, Language, LanguageTable,
    ScanCapability,
};
pub use project::{ProfileOptions, ProjectProfile};
pub use report::{
    ArtifactLocation, Collaborator, FileOutputs, ProvenanceCounts, RecoveredIssue, SynthesisReport,
};
pub use scope::{ScopeChain, ScopeIndex, ScopeResolver};
pub use synthesizer::{DocSynthesizer, SynthesisOptions};
