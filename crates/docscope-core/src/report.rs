//! 运行报告
//!
//! 所有被局部恢复的错误都以 [`RecoveredIssue`] 的形式出现在报告中，
//! 它们不会让运行失败，但调用方可以观察到。

use crate::formatter::{ExportFormat, Provenance, Template};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 协作方类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collaborator {
    VersionControl,
    TextGeneration,
    WriteBack,
}

/// 被恢复的错误
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecoveredIssue {
    /// 结构化解析失败，已退回启发式扫描或空声明
    UnparsableSource { path: PathBuf, message: String },
    /// 协作方调用失败，已降级
    CollaboratorFailure {
        collaborator: Collaborator,
        path: Option<PathBuf>,
        message: String,
    },
    /// 单个输出产物写入失败
    OutputWriteFailure { path: PathBuf, message: String },
    /// 输入被跳过
    SkippedInput {
        path: Option<PathBuf>,
        reason: String,
    },
    /// 生成结果中无法安全匹配的键
    IgnoredGeneratedKey { path: PathBuf, key: String },
}

/// 按来源统计的文档数量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceCounts {
    pub existing: usize,
    pub generated: usize,
    pub missing: usize,
}

impl ProvenanceCounts {
    pub fn record(&mut self, provenance: Provenance) {
        match provenance {
            Provenance::Existing => self.existing += 1,
            Provenance::Generated => self.generated += 1,
            Provenance::Missing => self.missing += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.existing + self.generated + self.missing
    }

    pub fn merge(&mut self, other: &ProvenanceCounts) {
        self.existing += other.existing;
        self.generated += other.generated;
        self.missing += other.missing;
    }
}

/// 某个格式的输出位置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactLocation {
    pub format: ExportFormat,
    pub path: PathBuf,
}

/// 单个源文件的输出
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOutputs {
    pub source: PathBuf,
    pub artifacts: Vec<ArtifactLocation>,
    pub counts: ProvenanceCounts,
}

/// 文档生成运行报告
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisReport {
    /// 生成时的 HEAD 版本
    pub revision: Option<String>,
    pub template: Template,
    /// 输出写入草稿区
    pub draft: bool,
    /// 按顺序排列的已处理文件
    pub touched_files: Vec<PathBuf>,
    pub outputs: Vec<FileOutputs>,
    pub summary_path: Option<PathBuf>,
    pub history_path: PathBuf,
    /// 关联的提交，未提交时为 `None`
    pub commit: Option<String>,
    pub counts: ProvenanceCounts,
    pub issues: Vec<RecoveredIssue>,
}
