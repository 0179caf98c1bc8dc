//! 统一差异 (unified diff) 解析模块
//!
//! 将差异文本解析为逐行的变更记录。新旧两个行号计数器相互独立：
//! 新增行只推进新计数器，删除行只推进旧计数器，上下文行同时推进两者。
//! 没有差异块头的差异（二进制文件或纯重命名）解析为空序列。

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::warn;

static HUNK_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").expect("hunk header pattern is valid")
});

/// 变更类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Add,
    Del,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Add => f.write_str("add"),
            ChangeKind::Del => f.write_str("del"),
        }
    }
}

/// 单行变更记录
///
/// 删除行的行号位于旧版本坐标轴，新增行的行号位于新版本坐标轴。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub kind: ChangeKind,
    pub line: u32,
    pub content: String,
    pub path: Option<PathBuf>,
    pub revision: Option<String>,
}

/// 差异块
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffHunk {
    pub old_start: u32,
    pub old_lines: u32,
    pub new_start: u32,
    pub new_lines: u32,
    pub records: Vec<ChangeRecord>,
    /// 块长度耗尽后、下一个块头或文件头之前被忽略的 `+`/`-` 行数
    pub ignored_lines: u32,
}

/// 文件变更类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
    Renamed,
    Copied,
}

/// 单个文件的变更
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    /// 旧版本路径，新增文件为 None
    pub old_path: Option<PathBuf>,
    /// 新版本路径，删除文件为 None
    pub new_path: Option<PathBuf>,
    pub change_type: ChangeType,
    pub is_binary: bool,
    /// 从第一个差异块头开始的差异文本
    pub diff: String,
}

impl FileChange {
    /// 用于展示的路径，优先使用新路径
    pub fn display_path(&self) -> &Path {
        self.new_path
            .as_deref()
            .or(self.old_path.as_deref())
            .unwrap_or(Path::new(""))
    }
}

/// 差异块解析器
pub struct DiffHunkParser;

impl DiffHunkParser {
    /// 创建新的差异块解析器
    pub fn new() -> Self {
        Self
    }

    /// 解析差异文本，返回按出现顺序排列的变更记录
    pub fn parse(&self, diff: &str) -> Vec<ChangeRecord> {
        self.parse_hunks(diff)
            .into_iter()
            .flat_map(|hunk| hunk.records)
            .collect()
    }

    /// 解析文件变更，并为记录附加路径与版本
    ///
    /// 删除行关联旧路径与旧版本，新增行关联新路径与新版本。
    pub fn parse_file_change(
        &self,
        change: &FileChange,
        old_revision: &str,
        new_revision: &str,
    ) -> Vec<ChangeRecord> {
        self.attach_sides(change, self.parse(&change.diff), old_revision, new_revision)
    }

    /// 为已解析的记录附加所属一侧的路径与版本
    pub fn attach_sides(
        &self,
        change: &FileChange,
        mut records: Vec<ChangeRecord>,
        old_revision: &str,
        new_revision: &str,
    ) -> Vec<ChangeRecord> {
        for record in &mut records {
            let (path, revision) = match record.kind {
                ChangeKind::Add => (&change.new_path, new_revision),
                ChangeKind::Del => (&change.old_path, old_revision),
            };
            record.path = path.clone();
            record.revision = Some(revision.to_string());
        }
        records
    }

    /// 解析差异文本中的所有差异块
    ///
    /// 声明的块长度耗尽后，到下一个块头之前的行不再计数，
    /// 因此块内以 `---`/`+++` 开头的内容行仍按内容处理。
    pub fn parse_hunks(&self, diff: &str) -> Vec<DiffHunk> {
        let mut hunks: Vec<DiffHunk> = Vec::new();
        let mut old_line = 0;
        let mut new_line = 0;
        let mut remaining_old = 0;
        let mut remaining_new = 0;
        let mut between_files = false;
        let lines: Vec<&str> = diff.lines().collect();

        for (index, &line) in lines.iter().enumerate() {
            if let Some(header) = parse_hunk_header(line) {
                between_files = false;
                old_line = header.old_start;
                new_line = header.new_start;
                remaining_old = header.old_lines;
                remaining_new = header.new_lines;
                hunks.push(header);
                continue;
            }

            let Some(hunk) = hunks.last_mut() else {
                // 第一个块头之前的文件头
                continue;
            };
            if remaining_old == 0 && remaining_new == 0 {
                let plain_file_header = line.starts_with("--- ")
                    && lines.get(index + 1).is_some_and(|next| next.starts_with("+++ "));
                if line.starts_with("diff ") || plain_file_header {
                    between_files = true;
                } else if !between_files && (line.starts_with('+') || line.starts_with('-')) {
                    hunk.ignored_lines += 1;
                }
                continue;
            }

            if let Some(content) = line.strip_prefix('+') {
                hunk.records.push(ChangeRecord {
                    kind: ChangeKind::Add,
                    line: new_line,
                    content: content.to_string(),
                    path: None,
                    revision: None,
                });
                new_line += 1;
                remaining_new = remaining_new.saturating_sub(1);
            } else if let Some(content) = line.strip_prefix('-') {
                hunk.records.push(ChangeRecord {
                    kind: ChangeKind::Del,
                    line: old_line,
                    content: content.to_string(),
                    path: None,
                    revision: None,
                });
                old_line += 1;
                remaining_old = remaining_old.saturating_sub(1);
            } else if line.starts_with('\\') {
                // "\ No newline at end of file" 不是文件行
            } else {
                old_line += 1;
                new_line += 1;
                remaining_old = remaining_old.saturating_sub(1);
                remaining_new = remaining_new.saturating_sub(1);
            }
        }

        for hunk in hunks.iter().filter(|h| h.ignored_lines > 0) {
            warn!(
                "Ignored {} changed lines past the end of hunk @@ -{},{} +{},{} @@",
                hunk.ignored_lines, hunk.old_start, hunk.old_lines, hunk.new_start, hunk.new_lines
            );
        }

        hunks
    }

    /// 将多文件差异文本拆分为逐文件的变更
    ///
    /// 支持 `diff --git` 扩展头（新增、删除、重命名、复制、二进制标记），
    /// 也支持只有 `---`/`+++` 文件头的普通统一差异。
    pub fn split_files(&self, text: &str) -> Vec<FileChange> {
        let lines: Vec<&str> = text.lines().collect();
        let mut files = Vec::new();
        let mut current: Option<FileSection> = None;
        let mut remaining_old: u32 = 0;
        let mut remaining_new: u32 = 0;

        for (index, line) in lines.iter().enumerate() {
            if remaining_old > 0 || remaining_new > 0 {
                if let Some(section) = current.as_mut() {
                    section.push_diff_line(line);
                }
                if line.starts_with('+') {
                    remaining_new = remaining_new.saturating_sub(1);
                } else if line.starts_with('-') {
                    remaining_old = remaining_old.saturating_sub(1);
                } else if !line.starts_with('\\') {
                    remaining_old = remaining_old.saturating_sub(1);
                    remaining_new = remaining_new.saturating_sub(1);
                }
                continue;
            }

            if let Some(rest) = line.strip_prefix("diff --git ") {
                files.extend(current.take().map(FileSection::finish));
                current = Some(FileSection::from_git_header(rest));
                continue;
            }

            let starts_plain_header = line.starts_with("--- ")
                && lines.get(index + 1).is_some_and(|next| next.starts_with("+++ "))
                && current.as_ref().is_none_or(|s| s.has_hunks);
            if starts_plain_header {
                files.extend(current.take().map(FileSection::finish));
                current = Some(FileSection::default());
            }

            if let Some(header) = parse_hunk_header(line) {
                let section = current.get_or_insert_with(FileSection::default);
                section.push_diff_line(line);
                section.has_hunks = true;
                remaining_old = header.old_lines;
                remaining_new = header.new_lines;
                continue;
            }

            if let Some(section) = current.as_mut() {
                if !section.has_hunks {
                    section.apply_metadata(line);
                }
            }
        }

        files.extend(current.take().map(FileSection::finish));
        files
    }
}

impl Default for DiffHunkParser {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_hunk_header(line: &str) -> Option<DiffHunk> {
    let captures = HUNK_HEADER.captures(line)?;
    let number = |index: usize, default: u32| {
        captures
            .get(index)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(default)
    };

    Some(DiffHunk {
        old_start: number(1, 0),
        old_lines: number(2, 1),
        new_start: number(3, 0),
        new_lines: number(4, 1),
        records: Vec::new(),
        ignored_lines: 0,
    })
}

/// 拆分过程中正在构建的文件段
#[derive(Debug, Default)]
struct FileSection {
    old_path: Option<PathBuf>,
    new_path: Option<PathBuf>,
    added: bool,
    deleted: bool,
    renamed: bool,
    copied: bool,
    is_binary: bool,
    has_hunks: bool,
    diff: String,
}

impl FileSection {
    fn from_git_header(rest: &str) -> Self {
        let mut section = Self::default();
        if let Some((old, new)) = rest.rsplit_once(" b/") {
            let old = old.strip_prefix("a/").unwrap_or(old);
            section.old_path = Some(PathBuf::from(old));
            section.new_path = Some(PathBuf::from(new));
        }
        section
    }

    fn push_diff_line(&mut self, line: &str) {
        self.diff.push_str(line);
        self.diff.push('\n');
    }

    fn apply_metadata(&mut self, line: &str) {
        if line.starts_with("new file mode") {
            self.added = true;
        } else if line.starts_with("deleted file mode") {
            self.deleted = true;
        } else if let Some(path) = line.strip_prefix("rename from ") {
            self.renamed = true;
            self.old_path = Some(PathBuf::from(path));
        } else if let Some(path) = line.strip_prefix("rename to ") {
            self.renamed = true;
            self.new_path = Some(PathBuf::from(path));
        } else if let Some(path) = line.strip_prefix("copy from ") {
            self.copied = true;
            self.old_path = Some(PathBuf::from(path));
        } else if let Some(path) = line.strip_prefix("copy to ") {
            self.copied = true;
            self.new_path = Some(PathBuf::from(path));
        } else if line.starts_with("Binary files ") || line.starts_with("GIT binary patch") {
            self.is_binary = true;
        } else if let Some(path) = line.strip_prefix("--- ") {
            match header_path(path, "a/") {
                Some(path) => self.old_path = Some(path),
                None => self.added = true,
            }
        } else if let Some(path) = line.strip_prefix("+++ ") {
            match header_path(path, "b/") {
                Some(path) => self.new_path = Some(path),
                None => self.deleted = true,
            }
        }
    }

    fn finish(self) -> FileChange {
        let (old_path, new_path) = match (self.added, self.deleted) {
            (true, _) => (None, self.new_path),
            (_, true) => (self.old_path, None),
            _ => (self.old_path, self.new_path),
        };

        let change_type = if self.renamed {
            ChangeType::Renamed
        } else if self.copied {
            ChangeType::Copied
        } else if old_path.is_none() {
            ChangeType::Added
        } else if new_path.is_none() {
            ChangeType::Deleted
        } else {
            ChangeType::Modified
        };

        FileChange {
            old_path,
            new_path,
            change_type,
            is_binary: self.is_binary,
            diff: self.diff,
        }
    }
}

/// 解析 `---`/`+++` 行的路径，`/dev/null` 表示不存在
fn header_path(raw: &str, prefix: &str) -> Option<PathBuf> {
    // 普通 diff 会在制表符后附带时间戳
    let raw = raw.split('\t').next().unwrap_or(raw).trim_end();
    if raw == "/dev/null" {
        return None;
    }
    Some(PathBuf::from(raw.strip_prefix(prefix).unwrap_or(raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds_and_lines(records: &[ChangeRecord]) -> Vec<(ChangeKind, u32, &str)> {
        records
            .iter()
            .map(|r| (r.kind, r.line, r.content.as_str()))
            .collect()
    }

    #[test]
    fn test_independent_line_counters() {
        let diff = "@@ -5,3 +5,4 @@\n-old five\n+new five\n+new six\n context\n unchanged\n";
        let records = DiffHunkParser::new().parse(diff);

        assert_eq!(
            kinds_and_lines(&records),
            vec![
                (ChangeKind::Del, 5, "old five"),
                (ChangeKind::Add, 5, "new five"),
                (ChangeKind::Add, 6, "new six"),
            ]
        );
    }

    #[test]
    fn test_deletion_then_addition_after_context() {
        // 第一行删除位于旧坐标第 5 行，第二行新增位于新坐标第 6 行
        let diff = "@@ -5,3 +5,4 @@\n-gone\n+added\n keep\n+more\n keep\n";
        let records = DiffHunkParser::new().parse(diff);

        assert_eq!(
            kinds_and_lines(&records),
            vec![
                (ChangeKind::Del, 5, "gone"),
                (ChangeKind::Add, 5, "added"),
                (ChangeKind::Add, 7, "more"),
            ]
        );

        let diff = "@@ -5,3 +5,4 @@\n-gone\n context\n+added\n";
        let records = DiffHunkParser::new().parse(diff);
        assert_eq!(
            kinds_and_lines(&records),
            vec![(ChangeKind::Del, 5, "gone"), (ChangeKind::Add, 6, "added")]
        );
    }

    #[test]
    fn test_counters_reset_per_hunk() {
        let diff = "@@ -1,2 +1,2 @@\n-a\n+b\n c\n@@ -40 +40,2 @@\n x\n+y\n";
        let hunks = DiffHunkParser::new().parse_hunks(diff);

        assert_eq!(hunks.len(), 2);
        assert_eq!(hunks[1].old_lines, 1);
        assert_eq!(
            kinds_and_lines(&hunks[1].records),
            vec![(ChangeKind::Add, 41, "y")]
        );
    }

    #[test]
    fn test_file_headers_are_skipped() {
        let diff = "diff --git a/x.py b/x.py\nindex 1..2 100644\n--- a/x.py\n+++ b/x.py\n@@ -1 +1 @@\n-a\n+b\n";
        let records = DiffHunkParser::new().parse(diff);

        assert_eq!(
            kinds_and_lines(&records),
            vec![(ChangeKind::Del, 1, "a"), (ChangeKind::Add, 1, "b")]
        );
    }

    #[test]
    fn test_header_like_content_inside_hunk() {
        let diff = "@@ -1,2 +1,2 @@\n--- SQL comment\n+++ counter\n keep\n";
        let records = DiffHunkParser::new().parse(diff);

        assert_eq!(
            kinds_and_lines(&records),
            vec![
                (ChangeKind::Del, 1, "-- SQL comment"),
                (ChangeKind::Add, 1, "++ counter"),
            ]
        );
    }

    #[test]
    fn test_lines_past_hunk_length_are_counted() {
        let hunks = DiffHunkParser::new().parse_hunks("@@ -1 +1 @@\n-a\n+b\n c\n+d\n");

        assert_eq!(hunks.len(), 1);
        assert_eq!(
            kinds_and_lines(&hunks[0].records),
            vec![(ChangeKind::Del, 1, "a"), (ChangeKind::Add, 1, "b")]
        );
        assert_eq!(hunks[0].ignored_lines, 1);
    }

    #[test]
    fn test_next_file_headers_are_not_ignored_lines() {
        let diff = "diff --git a/x.py b/x.py\n--- a/x.py\n+++ b/x.py\n@@ -1 +1 @@\n-a\n+b\n\
diff --git a/y.py b/y.py\n--- a/y.py\n+++ b/y.py\n@@ -3 +3 @@\n-c\n+d\n";
        let hunks = DiffHunkParser::new().parse_hunks(diff);

        assert_eq!(hunks.len(), 2);
        assert!(hunks.iter().all(|h| h.ignored_lines == 0));

        let plain = "--- a/x.py\n+++ b/x.py\n@@ -1 +1 @@\n-a\n+b\n--- a/y.py\n+++ b/y.py\n@@ -3 +3 @@\n-c\n+d\n";
        let hunks = DiffHunkParser::new().parse_hunks(plain);
        assert_eq!(hunks.len(), 2);
        assert!(hunks.iter().all(|h| h.ignored_lines == 0));
    }

    #[test]
    fn test_no_newline_marker_is_not_a_line() {
        let diff = "@@ -1,2 +1,2 @@\n keep\n-last\n\\ No newline at end of file\n+last\n";
        let records = DiffHunkParser::new().parse(diff);

        assert_eq!(
            kinds_and_lines(&records),
            vec![(ChangeKind::Del, 2, "last"), (ChangeKind::Add, 2, "last")]
        );
    }

    #[test]
    fn test_blank_context_line_advances_both_counters() {
        let diff = "@@ -1,3 +1,3 @@\n a\n\n-c\n+d\n";
        let records = DiffHunkParser::new().parse(diff);

        assert_eq!(
            kinds_and_lines(&records),
            vec![(ChangeKind::Del, 3, "c"), (ChangeKind::Add, 3, "d")]
        );
    }

    #[test]
    fn test_diff_without_hunks_is_empty() {
        let parser = DiffHunkParser::new();
        assert!(parser.parse("").is_empty());
        assert!(parser.parse("Binary files a/logo.png and b/logo.png differ\n").is_empty());
        assert!(
            parser
                .parse("diff --git a/a.py b/b.py\nsimilarity index 100%\nrename from a.py\nrename to b.py\n")
                .is_empty()
        );
    }

    #[test]
    fn test_split_git_diff() {
        let text = r#"diff --git a/src/app.py b/src/app.py
index 83db48f..bf269f4 100644
--- a/src/app.py
+++ b/src/app.py
@@ -1,2 +1,2 @@
 import os
-x = 1
+x = 2
diff --git a/new.go b/new.go
new file mode 100644
index 0000000..e69de29
--- /dev/null
+++ b/new.go
@@ -0,0 +1 @@
+package main
diff --git a/old.js b/old.js
deleted file mode 100644
--- a/old.js
+++ /dev/null
@@ -1 +0,0 @@
-function gone() {}
diff --git a/a.py b/lib/a.py
similarity index 100%
rename from a.py
rename to lib/a.py
diff --git a/logo.png b/logo.png
Binary files a/logo.png and b/logo.png differ
"#;
        let files = DiffHunkParser::new().split_files(text);

        let summary: Vec<_> = files
            .iter()
            .map(|f| {
                (
                    f.old_path.clone(),
                    f.new_path.clone(),
                    f.change_type,
                    f.is_binary,
                )
            })
            .collect();

        assert_eq!(
            summary,
            vec![
                (
                    Some(PathBuf::from("src/app.py")),
                    Some(PathBuf::from("src/app.py")),
                    ChangeType::Modified,
                    false
                ),
                (None, Some(PathBuf::from("new.go")), ChangeType::Added, false),
                (Some(PathBuf::from("old.js")), None, ChangeType::Deleted, false),
                (
                    Some(PathBuf::from("a.py")),
                    Some(PathBuf::from("lib/a.py")),
                    ChangeType::Renamed,
                    false
                ),
                (
                    Some(PathBuf::from("logo.png")),
                    Some(PathBuf::from("logo.png")),
                    ChangeType::Modified,
                    true
                ),
            ]
        );

        assert_eq!(files[0].diff, "@@ -1,2 +1,2 @@\n import os\n-x = 1\n+x = 2\n");
        assert!(files[3].diff.is_empty());
        assert!(files[4].diff.is_empty());
    }

    #[test]
    fn test_parse_file_change_attaches_paths_and_revisions() {
        let text = "diff --git a/a.py b/b.py\nrename from a.py\nrename to b.py\n--- a/a.py\n+++ b/b.py\n@@ -1 +1 @@\n-old\n+new\n";
        let parser = DiffHunkParser::new();
        let files = parser.split_files(text);
        let records = parser.parse_file_change(&files[0], "base", "head");

        assert_eq!(records[0].path, Some(PathBuf::from("a.py")));
        assert_eq!(records[0].revision.as_deref(), Some("base"));
        assert_eq!(records[1].path, Some(PathBuf::from("b.py")));
        assert_eq!(records[1].revision.as_deref(), Some("head"));
    }

    #[test]
    fn test_split_plain_unified_diff() {
        let text = "--- a.txt\t2024-01-01\n+++ a.txt\t2024-01-02\n@@ -1 +1 @@\n-x\n+y\n--- b.txt\n+++ b.txt\n@@ -2,0 +3 @@\n+z\n";
        let files = DiffHunkParser::new().split_files(text);

        assert_eq!(files.len(), 2);
        assert_eq!(files[0].new_path, Some(PathBuf::from("a.txt")));
        assert_eq!(files[1].display_path(), Path::new("b.txt"));
        assert_eq!(
            kinds_and_lines(&DiffHunkParser::new().parse(&files[1].diff)),
            vec![(ChangeKind::Add, 3, "z")]
        );
    }
}
