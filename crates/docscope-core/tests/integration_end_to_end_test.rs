//! 端到端集成测试
//!
//! 使用真实的 Git 仓库测试上下文聚合与文档合成的完整流程

use docscope_core::{
    ChangeKind, ContextAggregator, DocSynthesizer, GitCliCommitter, GitRepository, HistoryStore,
    LanguageTable, RecoveredIssue, SourceRepository, SynthesisOptions,
    formatter::parse_rendered_headers,
};
use pretty_assertions::assert_eq;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

const SERVICE_GO_V1: &str = r#"package service

// Service handles requests.
type Service struct {
	name string
}

// Handle processes one request.
func (s *Service) Handle(input string) string {
	return s.name + input
}
"#;

const SERVICE_GO_V2: &str = r#"package service

// Service handles requests.
type Service struct {
	name string
}

// Handle processes one request.
func (s *Service) Handle(input string) string {
	trimmed := input
	return s.name + trimmed
}
"#;

const MODELS_PY_V1: &str = r#"class Order:
    """A customer order."""

    def total(self):
        return sum(self.items)

    def describe(self):
        return "order"
"#;

const MODELS_PY_V2: &str = r#"class Order:
    """A customer order."""

    def total(self):
        return sum(item.price for item in self.items)

    def describe(self):
        return "order"
"#;

/// 端到端测试套件
struct EndToEndTestSuite {
    _temp_dir: TempDir,
    repo_path: PathBuf,
}

impl EndToEndTestSuite {
    /// 创建测试套件并初始化 Git 仓库
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let repo_path = temp_dir.path().join("test_repo");
        fs::create_dir_all(&repo_path).unwrap();

        let suite = Self {
            _temp_dir: temp_dir,
            repo_path,
        };
        suite.git(&["init"]);
        suite.git(&["config", "user.name", "Test User"]);
        suite.git(&["config", "user.email", "test@example.com"]);
        suite.git(&["config", "commit.gpgsign", "false"]);
        suite
    }

    fn git(&self, args: &[&str]) -> String {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_path)
            .output()
            .expect("Failed to run git");
        assert!(
            output.status.success(),
            "git {args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    fn write(&self, path: &str, content: &str) {
        let full = self.repo_path.join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, content).unwrap();
    }

    /// 提交全部改动并返回提交标识
    fn commit_all(&self, message: &str) -> String {
        self.git(&["add", "-A"]);
        self.git(&["commit", "-m", message]);
        self.git(&["rev-parse", "HEAD"])
    }
}

#[test]
fn test_context_across_languages() {
    let suite = EndToEndTestSuite::new();
    suite.write("service/service.go", SERVICE_GO_V1);
    suite.write("models.py", MODELS_PY_V1);
    suite.write("obsolete.py", "def gone():\n    pass\n");
    let first = suite.commit_all("Initial commit");

    suite.write("service/service.go", SERVICE_GO_V2);
    suite.write("models.py", MODELS_PY_V2);
    suite.write("notes/readme.txt", "not source\n");
    fs::remove_file(suite.repo_path.join("obsolete.py")).unwrap();
    let second = suite.commit_all("Second commit");

    let repository = GitRepository::open(&suite.repo_path).unwrap();
    assert_eq!(repository.first_parent(&second).unwrap(), Some(first.clone()));

    let changes = repository.diff_revisions(&first, &second).unwrap();
    let table = LanguageTable::standard();
    let report = ContextAggregator::new(&table, &repository).aggregate_changes(
        &changes,
        &first,
        &second,
    );

    assert!(report.issues.is_empty(), "{:?}", report.issues);

    // 文件之间的顺序取决于树差异的遍历顺序，文件内部保持差异顺序
    let mut entries = report.entries.clone();
    entries.sort_by_key(|entry| entry.record.path.clone());

    let summary: Vec<(String, ChangeKind, u32, String)> = entries
        .iter()
        .map(|entry| {
            (
                entry.record.path.as_ref().unwrap().display().to_string(),
                entry.record.kind,
                entry.record.line,
                entry.scope.to_string(),
            )
        })
        .collect();

    assert_eq!(
        summary,
        vec![
            ("models.py".to_string(), ChangeKind::Del, 5, "class Order -> def total".to_string()),
            ("models.py".to_string(), ChangeKind::Add, 5, "class Order -> def total".to_string()),
            ("notes/readme.txt".to_string(), ChangeKind::Add, 1, "module".to_string()),
            ("obsolete.py".to_string(), ChangeKind::Del, 1, "def gone".to_string()),
            ("obsolete.py".to_string(), ChangeKind::Del, 2, "def gone".to_string()),
            ("service/service.go".to_string(), ChangeKind::Del, 10, "func Handle".to_string()),
            ("service/service.go".to_string(), ChangeKind::Add, 10, "func Handle".to_string()),
            ("service/service.go".to_string(), ChangeKind::Add, 11, "func Handle".to_string()),
        ]
    );

    // 删除行读取旧版本，新增行读取新版本
    let deleted = &entries[3];
    assert_eq!(deleted.record.revision.as_deref(), Some(first.as_str()));
    assert_eq!(deleted.snippet.lines, vec!["def gone():", "    pass"]);

    assert!(report.payload.starts_with(&format!(
        "Revision: {second}\nBase revision: {first}\nChanges: 8\n\n"
    )));
    assert!(report.payload.contains("Enclosing structure: class Order -> def total\n"));
}

#[test]
fn test_docs_are_committed_and_rerun_is_stable() {
    let suite = EndToEndTestSuite::new();
    suite.write("service/service.go", SERVICE_GO_V1);
    suite.write("models.py", MODELS_PY_V1);
    suite.write(".gitignore", "scratch/\n");
    suite.write("scratch/tmp.py", "def ignored():\n    pass\n");
    let head = suite.commit_all("Initial commit");

    let repository = GitRepository::open(&suite.repo_path).unwrap();
    assert_eq!(repository.head_revision(), Some(head.clone()));

    let table = LanguageTable::standard();
    let committer = GitCliCommitter::new();
    let synthesizer = DocSynthesizer::new(&table, &committer, SynthesisOptions::default());

    let report = synthesizer.run(&repository).unwrap();
    assert!(report.issues.is_empty(), "{:?}", report.issues);
    assert_eq!(
        report.touched_files,
        vec![PathBuf::from("models.py"), PathBuf::from("service/service.go")]
    );
    assert_eq!(report.counts.existing, 3);
    assert_eq!(report.counts.missing, 2);

    let commit = report.commit.clone().expect("documentation should be committed");
    assert_eq!(suite.git(&["rev-parse", "HEAD"]), commit);
    assert_eq!(
        suite.git(&["log", "-1", "--format=%s"]),
        format!(
            "docs: update for {} using template api (2 files)",
            &head[..8]
        )
    );
    let committed = suite.git(&["show", "--name-only", "--format=", "HEAD"]);
    assert_eq!(
        committed.lines().collect::<Vec<_>>(),
        vec![
            "docs/files/models.py.md",
            "docs/files/service__service.go.md",
            "docs/files/summary.md",
            "docs/history.jsonl",
        ]
    );

    let models_doc = fs::read_to_string(suite.repo_path.join("docs/files/models.py.md")).unwrap();
    let headers = parse_rendered_headers(&models_doc);
    assert_eq!(
        headers,
        vec![
            ("class".to_string(), "Order".to_string(), 1, 8),
            ("def".to_string(), "total".to_string(), 4, 5),
            ("def".to_string(), "describe".to_string(), 7, 8),
        ]
    );
    assert!(models_doc.contains("A customer order."));

    let go_outputs = &report.outputs[1];
    assert_eq!(go_outputs.counts.existing, 2);
    assert_eq!(go_outputs.counts.missing, 0);

    // 再次运行：文档不变，历史增加一条
    let rerun = synthesizer.run(&repository).unwrap();
    let models_again =
        fs::read_to_string(suite.repo_path.join("docs/files/models.py.md")).unwrap();
    assert_eq!(models_doc, models_again);
    assert_eq!(rerun.touched_files, report.touched_files);
    assert!(rerun.commit.is_some());

    let history = HistoryStore::new(suite.repo_path.join("docs/history.jsonl"))
        .entries()
        .unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].revision.as_deref(), Some(head.as_str()));
    assert_eq!(history[1].revision.as_deref(), Some(commit.as_str()));
}

#[test]
fn test_draft_run_leaves_history_uncommitted() {
    let suite = EndToEndTestSuite::new();
    suite.write("app.js", "/**\n * Boots the app.\n */\nfunction boot() {}\n");
    suite.commit_all("Initial commit");

    let repository = GitRepository::open(&suite.repo_path).unwrap();
    let table = LanguageTable::standard();
    let committer = GitCliCommitter::new();
    let options = SynthesisOptions {
        manual_override: true,
        ..SynthesisOptions::default()
    };

    let report = DocSynthesizer::new(&table, &committer, options)
        .run(&repository)
        .unwrap();

    assert_eq!(report.commit, None);
    assert_eq!(report.outputs[0].counts.existing, 1);
    assert_eq!(suite.git(&["rev-list", "--count", "HEAD"]), "1");

    let status = suite.git(&["status", "--porcelain"]);
    assert!(status.contains("docs/"));
    assert!(Path::new(&suite.repo_path.join("docs/drafts/app.js.md")).is_file());
}

#[test]
fn test_unparsable_python_is_reported() {
    let suite = EndToEndTestSuite::new();
    suite.write("broken.py", "def broken(:\n    return\n");
    suite.write("ok.py", "def fine():\n    return 1\n");
    suite.commit_all("Initial commit");

    let repository = GitRepository::open(&suite.repo_path).unwrap();
    let table = LanguageTable::standard();
    let committer = GitCliCommitter::new();
    let options = SynthesisOptions {
        manual_override: true,
        ..SynthesisOptions::default()
    };

    let report = DocSynthesizer::new(&table, &committer, options)
        .run(&repository)
        .unwrap();

    assert_eq!(report.touched_files, vec![PathBuf::from("ok.py")]);
    assert!(matches!(
        &report.issues[..],
        [RecoveredIssue::UnparsableSource { path, .. }] if path == Path::new("broken.py")
    ));
    assert_eq!(report.outputs[0].counts.missing, 1);
}
