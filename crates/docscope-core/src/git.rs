//! Git 仓库交互模块
//!
//! 提供版本控制协作方的读写能力：按版本读取文件、计算两个版本之间的
//! 逐文件差异、列出仓库中需要处理的文件，以及提交生成的文档。

use crate::diff::{ChangeType, FileChange};
use crate::error::{DocScopeError, Result};
use gix::ThreadSafeRepository;
use imara_diff::{Algorithm, BasicLineDiffPrinter, Diff, InternedInput, UnifiedDiffConfig};
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// 列出文件时跳过的目录
pub const SKIPPED_DIRECTORIES: &[&str] = &[
    ".git",
    "__pycache__",
    "node_modules",
    ".venv",
    "venv",
    "target",
    "build",
    "dist",
    ".pytest_cache",
    ".ruff_cache",
    "docs",
];

/// 二进制检测读取的字节数
const BINARY_PROBE_LEN: usize = 8192;

/// 按版本读取文件内容
pub trait FileVersionSource {
    /// 返回 `path` 在 `revision` 时的完整文本，文件不存在时返回 `None`
    fn file_at_revision(&self, path: &Path, revision: &str) -> Result<Option<String>>;
}

/// 文档生成所需的仓库视图
pub trait SourceRepository {
    /// 工作区根目录
    fn root(&self) -> &Path;

    /// 当前 HEAD 版本，未提交过时返回 `None`
    fn head_revision(&self) -> Option<String>;

    /// 列出已跟踪以及未被忽略的未跟踪文件，路径相对于根目录
    fn list_files(&self) -> Result<Vec<PathBuf>>;
}

/// 暂存并提交指定路径
pub trait CommitWriter {
    /// 提交 `paths` 并返回新提交的标识
    fn commit(&self, root: &Path, paths: &[PathBuf], message: &str) -> Result<String>;
}

/// 基于 gix 的 Git 仓库
pub struct GitRepository {
    repo: ThreadSafeRepository,
    root: PathBuf,
}

impl GitRepository {
    /// 打开仓库
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(DocScopeError::InputNotFound(format!(
                "Repository path does not exist: {}",
                path.display()
            )));
        }

        let repo = ThreadSafeRepository::open(path.to_path_buf()).map_err(|e| {
            DocScopeError::GitError(format!(
                "Failed to open repository at {}: {e}",
                path.display()
            ))
        })?;

        let root = repo
            .to_thread_local()
            .workdir()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| path.to_path_buf());

        Ok(Self { repo, root })
    }

    /// 将版本表达式解析为完整的提交标识
    pub fn resolve_revision(&self, spec: &str) -> Result<String> {
        if spec.trim().is_empty() {
            return Err(DocScopeError::InvalidRevision(
                "Empty revision".to_string(),
            ));
        }

        let repo = self.repo.to_thread_local();
        repo.rev_parse_single(spec)
            .map(|id| id.detach().to_string())
            .map_err(|e| {
                DocScopeError::InvalidRevision(format!("Failed to resolve revision {spec}: {e}"))
            })
    }

    /// 获取版本的第一个父提交
    pub fn first_parent(&self, revision: &str) -> Result<Option<String>> {
        let repo = self.repo.to_thread_local();
        let commit = repo
            .rev_parse_single(revision)
            .map_err(|e| {
                DocScopeError::InvalidRevision(format!("Failed to resolve revision {revision}: {e}"))
            })?
            .object()
            .map_err(|e| DocScopeError::GitError(format!("Failed to find commit {revision}: {e}")))?
            .peel_to_commit()
            .map_err(|e| {
                DocScopeError::GitError(format!("Failed to peel {revision} to a commit: {e}"))
            })?;

        let parent = commit.parent_ids().next().map(|id| id.detach().to_string());
        Ok(parent)
    }

    /// 计算两个版本之间的逐文件差异
    ///
    /// 每个文件的差异文本只包含差异块，二进制文件和纯重命名没有差异块。
    pub fn diff_revisions(&self, old_revision: &str, new_revision: &str) -> Result<Vec<FileChange>> {
        let repo = self.repo.to_thread_local();
        let old_tree = tree_at(&repo, old_revision)?;
        let new_tree = tree_at(&repo, new_revision)?;

        let mut changes = Vec::new();
        let mut platform = old_tree.changes().map_err(|e| {
            DocScopeError::GitError(format!("Failed to create tree changes iterator: {e}"))
        })?;
        platform.options(|opts| {
            opts.track_path();
        });

        platform
            .for_each_to_obtain_tree(&new_tree, |change| {
                match process_tree_change(change) {
                    Ok(Some(file_change)) => changes.push(file_change),
                    Ok(None) => {}
                    Err(e) => warn!("Skipping unreadable change: {e}"),
                }
                Ok::<_, gix::object::tree::diff::for_each::Error>(
                    gix::object::tree::diff::Action::Continue,
                )
            })
            .map_err(|e| DocScopeError::GitError(format!("Failed to process tree changes: {e}")))?;

        debug!(
            "Found {} changed files between {old_revision} and {new_revision}",
            changes.len()
        );
        Ok(changes)
    }
}

impl FileVersionSource for GitRepository {
    fn file_at_revision(&self, path: &Path, revision: &str) -> Result<Option<String>> {
        let repo = self.repo.to_thread_local();
        let tree = tree_at(&repo, revision)?;

        let Some(entry) = tree.lookup_entry_by_path(path).map_err(|e| {
            DocScopeError::GitError(format!(
                "Failed to look up {} at {revision}: {e}",
                path.display()
            ))
        })?
        else {
            return Ok(None);
        };

        if !entry.mode().is_blob() {
            return Ok(None);
        }

        let object = entry.object().map_err(|e| {
            DocScopeError::GitError(format!("Failed to read blob for {}: {e}", path.display()))
        })?;

        if is_binary(&object.data) {
            debug!("{} is binary at {revision}", path.display());
            return Ok(None);
        }

        Ok(Some(String::from_utf8_lossy(&object.data).into_owned()))
    }
}

impl SourceRepository for GitRepository {
    fn root(&self) -> &Path {
        &self.root
    }

    fn head_revision(&self) -> Option<String> {
        let repo = self.repo.to_thread_local();
        repo.head_id().ok().map(|id| id.detach().to_string())
    }

    fn list_files(&self) -> Result<Vec<PathBuf>> {
        let repo = self.repo.to_thread_local();
        let mut files = BTreeSet::new();

        // 已跟踪文件
        let index = repo
            .index_or_empty()
            .map_err(|e| DocScopeError::GitError(format!("Failed to open index: {e}")))?;
        for entry in index.entries() {
            let relative = PathBuf::from(entry.path(&index).to_string());
            if self.root.join(&relative).is_file() {
                files.insert(relative);
            }
        }

        // 未被忽略的未跟踪文件
        let Some(worktree) = repo.worktree() else {
            return Ok(files.into_iter().collect());
        };
        let mut excludes = worktree
            .excludes(None)
            .map_err(|e| DocScopeError::GitError(format!("Failed to load ignore rules: {e}")))?;

        let mut walker = WalkDir::new(&self.root).min_depth(1).into_iter();
        while let Some(entry) = walker.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("Skipping unreadable path: {e}");
                    continue;
                }
            };
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };

            if entry.file_type().is_dir() {
                let skipped = entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| SKIPPED_DIRECTORIES.contains(&name));
                let ignored = excludes
                    .at_path(relative, Some(gix::index::entry::Mode::DIR))
                    .map(|platform| platform.is_excluded())
                    .unwrap_or(false);
                if skipped || ignored {
                    walker.skip_current_dir();
                }
                continue;
            }

            if !entry.file_type().is_file() || files.contains(relative) {
                continue;
            }

            let ignored = excludes
                .at_path(relative, Some(gix::index::entry::Mode::FILE))
                .map_err(|e| {
                    DocScopeError::GitError(format!(
                        "Failed to check ignore rules for {}: {e}",
                        relative.display()
                    ))
                })?
                .is_excluded();
            if !ignored {
                files.insert(relative.to_path_buf());
            }
        }

        Ok(files.into_iter().collect())
    }
}

/// 解析版本并取得其树对象
fn tree_at<'repo>(repo: &'repo gix::Repository, revision: &str) -> Result<gix::Tree<'repo>> {
    repo.rev_parse_single(revision)
        .map_err(|e| {
            DocScopeError::InvalidRevision(format!("Failed to resolve revision {revision}: {e}"))
        })?
        .object()
        .map_err(|e| DocScopeError::GitError(format!("Failed to find object {revision}: {e}")))?
        .peel_to_tree()
        .map_err(|e| DocScopeError::GitError(format!("Failed to get tree of {revision}: {e}")))
}

/// 将树变更转换为文件变更，目录与子模块返回 `None`
fn process_tree_change(change: gix::object::tree::diff::Change<'_, '_, '_>) -> Result<Option<FileChange>> {
    use gix::object::tree::diff::Change;

    match change {
        Change::Addition {
            location,
            entry_mode,
            id,
            ..
        } => {
            if !entry_mode.is_blob() {
                return Ok(None);
            }
            let (after, binary) = blob_text(id)?;
            Ok(Some(FileChange {
                old_path: None,
                new_path: Some(PathBuf::from(location.to_string())),
                change_type: ChangeType::Added,
                is_binary: binary,
                diff: if binary {
                    String::new()
                } else {
                    unified_hunks("", &after)
                },
            }))
        }
        Change::Deletion {
            location,
            entry_mode,
            id,
            ..
        } => {
            if !entry_mode.is_blob() {
                return Ok(None);
            }
            let (before, binary) = blob_text(id)?;
            Ok(Some(FileChange {
                old_path: Some(PathBuf::from(location.to_string())),
                new_path: None,
                change_type: ChangeType::Deleted,
                is_binary: binary,
                diff: if binary {
                    String::new()
                } else {
                    unified_hunks(&before, "")
                },
            }))
        }
        Change::Modification {
            location,
            previous_entry_mode,
            previous_id,
            entry_mode,
            id,
        } => {
            if !entry_mode.is_blob() || !previous_entry_mode.is_blob() {
                return Ok(None);
            }
            let path = PathBuf::from(location.to_string());
            let (before, old_binary) = blob_text(previous_id)?;
            let (after, new_binary) = blob_text(id)?;
            let binary = old_binary || new_binary;

            Ok(Some(FileChange {
                old_path: Some(path.clone()),
                new_path: Some(path),
                change_type: ChangeType::Modified,
                is_binary: binary,
                diff: if binary {
                    String::new()
                } else {
                    unified_hunks(&before, &after)
                },
            }))
        }
        Change::Rewrite {
            source_location,
            source_entry_mode,
            source_id,
            entry_mode,
            location,
            id,
            copy,
            ..
        } => {
            if !entry_mode.is_blob() || !source_entry_mode.is_blob() {
                return Ok(None);
            }
            let (before, old_binary) = blob_text(source_id)?;
            let (after, new_binary) = blob_text(id)?;
            let binary = old_binary || new_binary;

            Ok(Some(FileChange {
                old_path: Some(PathBuf::from(source_location.to_string())),
                new_path: Some(PathBuf::from(location.to_string())),
                change_type: if copy {
                    ChangeType::Copied
                } else {
                    ChangeType::Renamed
                },
                is_binary: binary,
                diff: if binary {
                    String::new()
                } else {
                    unified_hunks(&before, &after)
                },
            }))
        }
    }
}

/// 读取 blob 文本并检测是否为二进制
fn blob_text(id: gix::Id<'_>) -> Result<(String, bool)> {
    let object = id
        .object()
        .map_err(|e| DocScopeError::GitError(format!("Failed to find blob {id}: {e}")))?;

    if is_binary(&object.data) {
        return Ok((String::new(), true));
    }
    Ok((String::from_utf8_lossy(&object.data).into_owned(), false))
}

/// 检查前 8192 字节中是否包含 null 字节
fn is_binary(data: &[u8]) -> bool {
    let check_size = std::cmp::min(data.len(), BINARY_PROBE_LEN);
    data[..check_size].contains(&0)
}

/// 使用 imara-diff 生成只含差异块的统一差异文本
fn unified_hunks(before: &str, after: &str) -> String {
    if before == after {
        return String::new();
    }

    let input = InternedInput::new(before, after);
    let mut diff = Diff::compute(Algorithm::Histogram, &input);
    diff.postprocess_lines(&input);

    diff.unified_diff(
        &BasicLineDiffPrinter(&input.interner),
        UnifiedDiffConfig::default(),
        &input,
    )
    .to_string()
}

/// 通过 git 命令行提交
#[derive(Debug, Default, Clone, Copy)]
pub struct GitCliCommitter;

impl GitCliCommitter {
    pub fn new() -> Self {
        Self
    }

    fn run(&self, root: &Path, args: &[OsString]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(root)
            .output()
            .map_err(|e| DocScopeError::CommitError(format!("Failed to run git: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let detail = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(DocScopeError::CommitError(format!(
                "git {} failed: {detail}",
                args.first()
                    .map(|a| a.to_string_lossy().into_owned())
                    .unwrap_or_default()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl CommitWriter for GitCliCommitter {
    fn commit(&self, root: &Path, paths: &[PathBuf], message: &str) -> Result<String> {
        if paths.is_empty() {
            return Err(DocScopeError::CommitError(
                "No paths to commit".to_string(),
            ));
        }

        let pathspec = paths.iter().map(|p| p.as_os_str().to_os_string());

        let mut add: Vec<OsString> = vec!["add".into(), "--".into()];
        add.extend(pathspec.clone());
        self.run(root, &add)?;

        let mut commit: Vec<OsString> = vec!["commit".into(), "-m".into(), message.into(), "--".into()];
        commit.extend(pathspec);
        self.run(root, &commit)?;

        let head = self.run(root, &["rev-parse".into(), "HEAD".into()])?;
        Ok(head.trim().to_string())
    }
}

#[cfg(test)]
mod tests;
