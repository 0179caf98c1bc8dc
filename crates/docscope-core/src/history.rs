//! 运行历史
//!
//! 以 JSON Lines 形式追加记录每次文档生成运行，已有记录从不改写。

use crate::error::{DocScopeError, Result};
use crate::formatter::{ExportFormat, Template};
use crate::report::ProvenanceCounts;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// 运行时使用的配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfiguration {
    pub template: Template,
    pub export_formats: Vec<ExportFormat>,
    pub manual_override: bool,
    pub generation_enabled: bool,
}

/// 一次运行的历史记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// 生成时的 HEAD 版本
    pub revision: Option<String>,
    pub configuration: RunConfiguration,
    pub touched: Vec<PathBuf>,
    pub total_files: usize,
    pub counts: ProvenanceCounts,
    /// RFC 3339 时间戳
    pub recorded_at: String,
}

impl HistoryEntry {
    /// 以当前时间创建记录
    pub fn new(
        revision: Option<String>,
        configuration: RunConfiguration,
        touched: Vec<PathBuf>,
        counts: ProvenanceCounts,
    ) -> Self {
        Self {
            revision,
            configuration,
            total_files: touched.len(),
            touched,
            counts,
            recorded_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

/// 只追加的历史存储
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 追加一条记录
    pub fn append(&self, entry: &HistoryEntry) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                DocScopeError::IoError(std::io::Error::new(
                    e.kind(),
                    format!("Failed to open history {}: {e}", self.path.display()),
                ))
            })?;
        file.write_all(line.as_bytes())?;

        debug!("Appended history entry to {}", self.path.display());
        Ok(())
    }

    /// 按追加顺序读取全部记录，文件不存在时为空
    pub fn entries(&self) -> Result<Vec<HistoryEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let text = fs::read_to_string(&self.path)?;
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .enumerate()
            .map(|(index, line)| {
                serde_json::from_str(line).map_err(|e| {
                    DocScopeError::SerializationError(format!(
                        "Invalid history entry {} in {}: {e}",
                        index + 1,
                        self.path.display()
                    ))
                })
            })
            .collect()
    }
}
