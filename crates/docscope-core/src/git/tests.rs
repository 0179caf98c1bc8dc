use super::*;
use crate::diff::DiffHunkParser;
use pretty_assertions::assert_eq;
use std::fs;
use tempfile::TempDir;

/// 在测试仓库中运行 git 命令
fn git(repo_path: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_path)
        .output()
        .map_err(|e| DocScopeError::GitError(format!("Failed to run git {args:?}: {e}")))?;

    if !output.status.success() {
        return Err(DocScopeError::GitError(format!(
            "git {args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// 创建一个临时的 Git 仓库用于测试
fn create_test_repo() -> Result<(TempDir, PathBuf)> {
    let temp_dir = TempDir::new().map_err(DocScopeError::IoError)?;
    let repo_path = temp_dir.path().to_path_buf();

    git(&repo_path, &["init"])?;
    git(&repo_path, &["config", "user.name", "Test User"])?;
    git(&repo_path, &["config", "user.email", "test@example.com"])?;
    git(&repo_path, &["config", "commit.gpgsign", "false"])?;

    Ok((temp_dir, repo_path))
}

/// 写入文件并创建提交，返回提交哈希
fn create_test_commit(repo_path: &Path, file_name: &str, content: &str) -> Result<String> {
    let file_path = repo_path.join(file_name);
    if let Some(parent) = file_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&file_path, content)?;

    git(repo_path, &["add", file_name])?;
    git(repo_path, &["commit", "-m", &format!("Update {file_name}")])?;
    git(repo_path, &["rev-parse", "HEAD"])
}

/// 删除文件并创建提交
fn remove_file_and_commit(repo_path: &Path, file_name: &str) -> Result<String> {
    git(repo_path, &["rm", "-q", file_name])?;
    git(repo_path, &["commit", "-m", &format!("Remove {file_name}")])?;
    git(repo_path, &["rev-parse", "HEAD"])
}

#[test]
fn test_open_missing_path() {
    let result = GitRepository::open(Path::new("/definitely/not/a/repo/path"));
    assert!(matches!(result, Err(DocScopeError::InputNotFound(_))));
}

#[test]
fn test_open_non_repository() {
    let temp_dir = TempDir::new().unwrap();
    let result = GitRepository::open(temp_dir.path());
    assert!(matches!(result, Err(DocScopeError::GitError(_))));
}

#[test]
fn test_resolve_revision_and_parent() {
    let (_temp_dir, repo_path) = create_test_repo().unwrap();
    let first = create_test_commit(&repo_path, "a.py", "x = 1\n").unwrap();
    let second = create_test_commit(&repo_path, "a.py", "x = 2\n").unwrap();

    let repo = GitRepository::open(&repo_path).unwrap();
    assert_eq!(repo.resolve_revision("HEAD").unwrap(), second);
    assert_eq!(repo.resolve_revision(&first[..8]).unwrap(), first);
    assert_eq!(repo.first_parent(&second).unwrap(), Some(first.clone()));
    assert_eq!(repo.first_parent(&first).unwrap(), None);
    assert_eq!(repo.head_revision(), Some(second));
}

#[test]
fn test_invalid_revision() {
    let (_temp_dir, repo_path) = create_test_repo().unwrap();
    create_test_commit(&repo_path, "a.py", "x = 1\n").unwrap();

    let repo = GitRepository::open(&repo_path).unwrap();
    assert!(matches!(
        repo.resolve_revision("no-such-branch"),
        Err(DocScopeError::InvalidRevision(_))
    ));
    assert!(matches!(
        repo.resolve_revision("  "),
        Err(DocScopeError::InvalidRevision(_))
    ));
}

#[test]
fn test_file_at_revision() {
    let (_temp_dir, repo_path) = create_test_repo().unwrap();
    let first = create_test_commit(&repo_path, "pkg/mod.py", "x = 1\n").unwrap();
    let second = create_test_commit(&repo_path, "pkg/mod.py", "x = 2\n").unwrap();

    let repo = GitRepository::open(&repo_path).unwrap();
    let path = Path::new("pkg/mod.py");
    assert_eq!(
        repo.file_at_revision(path, &first).unwrap(),
        Some("x = 1\n".to_string())
    );
    assert_eq!(
        repo.file_at_revision(path, &second).unwrap(),
        Some("x = 2\n".to_string())
    );
    assert_eq!(
        repo.file_at_revision(Path::new("missing.py"), &second).unwrap(),
        None
    );
    // 目录不是文件
    assert_eq!(repo.file_at_revision(Path::new("pkg"), &second).unwrap(), None);
}

#[test]
fn test_diff_revisions_modification() {
    let (_temp_dir, repo_path) = create_test_repo().unwrap();
    let old = create_test_commit(
        &repo_path,
        "calc.py",
        "class A:\n    def b(self):\n        return 1\n",
    )
    .unwrap();
    let new = create_test_commit(
        &repo_path,
        "calc.py",
        "class A:\n    def b(self):\n        return 2\n",
    )
    .unwrap();

    let repo = GitRepository::open(&repo_path).unwrap();
    let changes = repo.diff_revisions(&old, &new).unwrap();
    assert_eq!(changes.len(), 1);

    let change = &changes[0];
    assert_eq!(change.change_type, ChangeType::Modified);
    assert_eq!(change.new_path, Some(PathBuf::from("calc.py")));
    assert!(!change.is_binary);
    assert!(change.diff.starts_with("@@"));

    let records = DiffHunkParser::new().parse_file_change(change, &old, &new);
    let summary: Vec<(String, u32, String)> = records
        .iter()
        .map(|r| (r.kind.to_string(), r.line, r.content.clone()))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("del".to_string(), 3, "        return 1".to_string()),
            ("add".to_string(), 3, "        return 2".to_string()),
        ]
    );
}

#[test]
fn test_diff_revisions_addition_and_deletion() {
    let (_temp_dir, repo_path) = create_test_repo().unwrap();
    let base = create_test_commit(&repo_path, "keep.py", "x = 1\n").unwrap();
    let added = create_test_commit(&repo_path, "new.go", "package main\n").unwrap();
    let removed = remove_file_and_commit(&repo_path, "keep.py").unwrap();

    let repo = GitRepository::open(&repo_path).unwrap();

    let changes = repo.diff_revisions(&base, &added).unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].change_type, ChangeType::Added);
    assert_eq!(changes[0].old_path, None);
    assert!(changes[0].diff.contains("+package main"));

    let changes = repo.diff_revisions(&added, &removed).unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].change_type, ChangeType::Deleted);
    assert_eq!(changes[0].old_path, Some(PathBuf::from("keep.py")));
    assert!(changes[0].diff.contains("-x = 1"));
}

#[test]
fn test_binary_files_are_flagged() {
    let (_temp_dir, repo_path) = create_test_repo().unwrap();
    let base = create_test_commit(&repo_path, "a.py", "x = 1\n").unwrap();

    fs::write(repo_path.join("blob.bin"), [0u8, 1, 2, 3, 0, 255]).unwrap();
    git(&repo_path, &["add", "blob.bin"]).unwrap();
    git(&repo_path, &["commit", "-m", "Add binary"]).unwrap();
    let head = git(&repo_path, &["rev-parse", "HEAD"]).unwrap();

    let repo = GitRepository::open(&repo_path).unwrap();
    let changes = repo.diff_revisions(&base, &head).unwrap();
    assert_eq!(changes.len(), 1);
    assert!(changes[0].is_binary);
    assert!(changes[0].diff.is_empty());
    assert_eq!(
        repo.file_at_revision(Path::new("blob.bin"), &head).unwrap(),
        None
    );
}

#[test]
fn test_list_files_respects_ignore_rules() {
    let (_temp_dir, repo_path) = create_test_repo().unwrap();
    create_test_commit(&repo_path, ".gitignore", "*.log\nscratch/\n").unwrap();
    create_test_commit(&repo_path, "src/app.py", "x = 1\n").unwrap();

    fs::write(repo_path.join("untracked.py"), "y = 2\n").unwrap();
    fs::write(repo_path.join("debug.log"), "noise\n").unwrap();
    fs::create_dir_all(repo_path.join("scratch")).unwrap();
    fs::write(repo_path.join("scratch/tmp.py"), "z = 3\n").unwrap();
    fs::create_dir_all(repo_path.join("node_modules/pkg")).unwrap();
    fs::write(repo_path.join("node_modules/pkg/index.js"), "x\n").unwrap();
    fs::create_dir_all(repo_path.join("docs/files")).unwrap();
    fs::write(repo_path.join("docs/files/app.py.md"), "# app\n").unwrap();

    let repo = GitRepository::open(&repo_path).unwrap();
    let files = repo.list_files().unwrap();

    assert_eq!(
        files,
        vec![
            PathBuf::from(".gitignore"),
            PathBuf::from("src/app.py"),
            PathBuf::from("untracked.py"),
        ]
    );
}

#[test]
fn test_list_files_skips_deleted_tracked_files() {
    let (_temp_dir, repo_path) = create_test_repo().unwrap();
    create_test_commit(&repo_path, "a.py", "x = 1\n").unwrap();
    create_test_commit(&repo_path, "b.py", "y = 1\n").unwrap();
    fs::remove_file(repo_path.join("b.py")).unwrap();

    let repo = GitRepository::open(&repo_path).unwrap();
    assert_eq!(repo.list_files().unwrap(), vec![PathBuf::from("a.py")]);
}

#[test]
fn test_cli_committer_commits_paths() {
    let (_temp_dir, repo_path) = create_test_repo().unwrap();
    let base = create_test_commit(&repo_path, "a.py", "x = 1\n").unwrap();

    fs::create_dir_all(repo_path.join("docs")).unwrap();
    fs::write(repo_path.join("docs/summary.md"), "# Documentation Summary\n").unwrap();
    fs::write(repo_path.join("other.py"), "unrelated = True\n").unwrap();

    let committer = GitCliCommitter::new();
    let commit = committer
        .commit(
            &repo_path,
            &[PathBuf::from("docs/summary.md")],
            "docs: update",
        )
        .unwrap();

    assert_ne!(commit, base);
    assert_eq!(git(&repo_path, &["rev-parse", "HEAD"]).unwrap(), commit);
    assert_eq!(git(&repo_path, &["log", "-1", "--format=%s"]).unwrap(), "docs: update");
    // 未指定的文件不会被提交
    let status = git(&repo_path, &["status", "--porcelain"]).unwrap();
    assert!(status.contains("?? other.py"));
}

#[test]
fn test_cli_committer_reports_failure() {
    let (_temp_dir, repo_path) = create_test_repo().unwrap();
    create_test_commit(&repo_path, "a.py", "x = 1\n").unwrap();

    let committer = GitCliCommitter::new();
    // 没有变更可提交
    let result = committer.commit(&repo_path, &[PathBuf::from("a.py")], "noop");
    assert!(matches!(result, Err(DocScopeError::CommitError(_))));

    let result = committer.commit(&repo_path, &[], "empty");
    assert!(matches!(result, Err(DocScopeError::CommitError(_))));
}
