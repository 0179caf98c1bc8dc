//! 变更上下文聚合模块
//!
//! 将差异记录与按版本读取的文件内容、作用域解析结果结合，
//! 生成带片段与外层声明链的上下文条目，并拼装成确定性的文本载荷。

use crate::diff::{ChangeKind, ChangeRecord, DiffHunkParser, FileChange};
use crate::git::FileVersionSource;
use crate::parser::LanguageTable;
use crate::report::{Collaborator, RecoveredIssue};
use crate::scope::{ScopeChain, ScopeIndex, ScopeResolver};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// 载荷末尾的固定说明
pub const INSTRUCTION_SUFFIX: &str = "Summarize what changed in each block above and how it affects \
the enclosing structure. Refer to changes by their number and keep the answer concise.\n";

/// 聚合选项
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextOptions {
    /// 变更行前后各取的行数
    pub snippet_radius: usize,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self { snippet_radius: 2 }
    }
}

/// 变更行附近的源码片段
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snippet {
    /// 片段首行行号
    pub start_line: u32,
    pub lines: Vec<String>,
}

/// 一条带上下文的变更记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub record: ChangeRecord,
    pub snippet: Snippet,
    pub scope: ScopeChain,
    pub old_revision: String,
    pub new_revision: String,
}

/// 上下文聚合结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextReport {
    pub old_revision: String,
    pub new_revision: String,
    pub entries: Vec<ContextEntry>,
    pub issues: Vec<RecoveredIssue>,
    pub payload: String,
}

/// 已读取的文件版本
struct FileVersion {
    lines: Vec<String>,
    index: ScopeIndex,
}

/// 上下文聚合器
pub struct ContextAggregator<'a> {
    table: &'a LanguageTable,
    source: &'a dyn FileVersionSource,
    options: ContextOptions,
}

impl<'a> ContextAggregator<'a> {
    /// 创建新的上下文聚合器
    pub fn new(table: &'a LanguageTable, source: &'a dyn FileVersionSource) -> Self {
        Self {
            table,
            source,
            options: ContextOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ContextOptions) -> Self {
        self.options = options;
        self
    }

    /// 解析逐文件差异并聚合上下文
    pub fn aggregate_changes(
        &self,
        changes: &[FileChange],
        old_revision: &str,
        new_revision: &str,
    ) -> ContextReport {
        let parser = DiffHunkParser::new();
        let mut records: Vec<ChangeRecord> = Vec::new();
        let mut diff_issues = Vec::new();

        for change in changes {
            let hunks = parser.parse_hunks(&change.diff);
            let ignored: u32 = hunks.iter().map(|h| h.ignored_lines).sum();
            if ignored > 0 {
                diff_issues.push(RecoveredIssue::SkippedInput {
                    path: Some(change.display_path().to_path_buf()),
                    reason: format!("{ignored} changed lines past the declared hunk lengths"),
                });
            }
            let parsed = hunks.into_iter().flat_map(|h| h.records).collect();
            records.extend(parser.attach_sides(change, parsed, old_revision, new_revision));
        }

        let mut report = self.aggregate(&records, old_revision, new_revision);
        diff_issues.append(&mut report.issues);
        report.issues = diff_issues;
        report
    }

    /// 为每条变更记录构建上下文条目
    ///
    /// 记录未携带版本时，新增行使用 `new_revision`，删除行使用 `old_revision`。
    /// 同一 (路径, 版本) 在一次调用中只读取一次。
    pub fn aggregate(
        &self,
        records: &[ChangeRecord],
        old_revision: &str,
        new_revision: &str,
    ) -> ContextReport {
        let mut resolver = ScopeResolver::new(self.table);
        let mut versions: HashMap<(PathBuf, String), Option<FileVersion>> = HashMap::new();
        let mut entries = Vec::new();
        let mut issues = Vec::new();

        for record in records {
            let Some(path) = record.path.as_deref() else {
                issues.push(RecoveredIssue::SkippedInput {
                    path: None,
                    reason: format!("{} record at line {} has no path", record.kind, record.line),
                });
                continue;
            };

            let revision = record.revision.clone().unwrap_or_else(|| match record.kind {
                ChangeKind::Add => new_revision.to_string(),
                ChangeKind::Del => old_revision.to_string(),
            });

            let cache_key = (path.to_path_buf(), revision.clone());
            let version = versions.entry(cache_key).or_insert_with(|| {
                self.load_version(path, &revision, &mut resolver, &mut issues)
            });
            let Some(version) = version else {
                continue;
            };

            entries.push(ContextEntry {
                record: ChangeRecord {
                    revision: Some(revision),
                    ..record.clone()
                },
                snippet: snippet(&version.lines, record.line, self.options.snippet_radius),
                scope: version.index.chain_for(record.line),
                old_revision: old_revision.to_string(),
                new_revision: new_revision.to_string(),
            });
        }

        debug!(
            "Aggregated {} context entries from {} records",
            entries.len(),
            records.len()
        );

        let payload = render_payload(&entries, old_revision, new_revision);
        ContextReport {
            old_revision: old_revision.to_string(),
            new_revision: new_revision.to_string(),
            entries,
            issues,
            payload,
        }
    }

    /// 读取文件版本并建立作用域索引，失败时记录问题
    fn load_version(
        &self,
        path: &Path,
        revision: &str,
        resolver: &mut ScopeResolver<'_>,
        issues: &mut Vec<RecoveredIssue>,
    ) -> Option<FileVersion> {
        match self.source.file_at_revision(path, revision) {
            Ok(Some(text)) => {
                let language = self.table.detect(path);
                let index = resolver.index(&text, language);
                if index.fell_back {
                    issues.push(RecoveredIssue::UnparsableSource {
                        path: path.to_path_buf(),
                        message: format!("resolved scope by indentation at {revision}"),
                    });
                }
                Some(FileVersion {
                    lines: text.lines().map(str::to_string).collect(),
                    index,
                })
            }
            Ok(None) => {
                issues.push(RecoveredIssue::SkippedInput {
                    path: Some(path.to_path_buf()),
                    reason: format!("no content at revision {revision}"),
                });
                None
            }
            Err(e) => {
                warn!("Failed to read {} at {revision}: {e}", path.display());
                issues.push(RecoveredIssue::CollaboratorFailure {
                    collaborator: Collaborator::VersionControl,
                    path: Some(path.to_path_buf()),
                    message: e.to_string(),
                });
                None
            }
        }
    }
}

/// 截取变更行前后各 `radius` 行，受文件边界限制
///
/// 行号超出文件范围时返回空片段。
fn snippet(lines: &[String], line: u32, radius: usize) -> Snippet {
    if line == 0 || line as usize > lines.len() {
        return Snippet {
            start_line: line,
            lines: Vec::new(),
        };
    }

    let index = line as usize - 1;
    let start = index.saturating_sub(radius);
    let end = (index + radius).min(lines.len() - 1);

    Snippet {
        start_line: start as u32 + 1,
        lines: lines[start..=end].to_vec(),
    }
}

/// 拼装确定性的文本载荷
fn render_payload(entries: &[ContextEntry], old_revision: &str, new_revision: &str) -> String {
    let mut output = String::new();

    output.push_str(&format!("Revision: {new_revision}\n"));
    output.push_str(&format!("Base revision: {old_revision}\n"));
    output.push_str(&format!("Changes: {}\n\n", entries.len()));

    for (number, entry) in entries.iter().enumerate() {
        let record = &entry.record;
        let path = record
            .path
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let revision = record.revision.as_deref().unwrap_or_default();

        output.push_str(&format!("Change {}:\n", number + 1));
        output.push_str(&format!("File: {path} @ {revision}\n"));
        output.push_str(&format!(
            "Change type: {}  Line: {}\n\n",
            record.kind, record.line
        ));

        output.push_str("Changed line:\n");
        output.push_str(&record.content);
        output.push_str("\n\n");

        output.push_str("Surrounding context:\n");
        for (offset, text) in entry.snippet.lines.iter().enumerate() {
            let line_number = entry.snippet.start_line + offset as u32;
            let marker = if line_number == record.line { '>' } else { ' ' };
            output.push_str(&format!("{marker}{line_number:5} | {text}\n"));
        }
        output.push('\n');

        output.push_str(&format!("Enclosing structure: {}\n\n", entry.scope));
        output.push_str("----\n\n");
    }

    output.push_str(INSTRUCTION_SUFFIX);
    output
}
