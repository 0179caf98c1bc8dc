//! CLI 集成测试
//!
//! 运行编译后的二进制文件，测试各个子命令

use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

/// 获取编译后的二进制文件路径
fn get_binary_path() -> String {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // 移除测试可执行文件名
    if path.ends_with("deps") {
        path.pop(); // 移除 deps 目录
    }
    path.push("docscope");
    path.to_string_lossy().to_string()
}

fn docscope(args: &[&str]) -> Output {
    Command::new(get_binary_path())
        .args(args)
        .env_remove("RUST_LOG")
        .env_remove("DOCSCOPE_LLM_ENDPOINT")
        .output()
        .expect("Failed to execute command")
}

fn git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("Failed to run git");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

/// 创建测试用的临时 Git 仓库，包含两次提交
fn create_test_repo() -> TempDir {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let root = temp_dir.path();

    git(root, &["init"]);
    git(root, &["config", "user.name", "Test User"]);
    git(root, &["config", "user.email", "test@example.com"]);
    git(root, &["config", "commit.gpgsign", "false"]);

    let first = r#"class Greeter:
    """Says hello."""

    def greet(self, name):
        return "Hello " + name
"#;
    std::fs::write(root.join("greeter.py"), first).expect("Failed to write Python file");
    git(root, &["add", "."]);
    git(root, &["commit", "-m", "Initial commit"]);

    let second = r#"class Greeter:
    """Says hello."""

    def greet(self, name):
        return "Hi " + name
"#;
    std::fs::write(root.join("greeter.py"), second).expect("Failed to write Python file");
    git(root, &["commit", "-am", "Change greeting"]);

    temp_dir
}

#[test]
fn test_help_output() {
    let output = docscope(&["--help"]);

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("docscope"));
    assert!(stdout.contains("context"));
    assert!(stdout.contains("docs"));
    assert!(stdout.contains("profile"));
    assert!(stdout.contains("scope"));
}

#[test]
fn test_version_output() {
    let output = docscope(&["--version"]);

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("0.1.0"));
}

#[test]
fn test_missing_subcommand() {
    let output = docscope(&[]);
    assert!(!output.status.success());
}

#[test]
fn test_scope_command() {
    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("shapes.py");
    std::fs::write(
        &file,
        "class A:\n    x = 1\n    def b(self):\n        return 1\n\n\n\n\n\n    y = 2\n",
    )
    .unwrap();
    let file = file.to_str().unwrap();

    let output = docscope(&["scope", file, "4"]);
    assert!(output.status.success());
    assert_eq!(String::from_utf8(output.stdout).unwrap(), "class A -> def b\n");

    let output = docscope(&["scope", file, "10", "--json"]);
    assert!(output.status.success());
    assert_eq!(String::from_utf8(output.stdout).unwrap(), "[\"class A\"]\n");
}

#[test]
fn test_scope_missing_file() {
    let output = docscope(&["scope", "/no/such/file.py", "1"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("Source file does not exist"));
}

#[test]
fn test_context_command() {
    let repo = create_test_repo();

    let output = docscope(&["context", "--repo", repo.path().to_str().unwrap()]);
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("Changes: 2\n"));
    assert!(stdout.contains("File: greeter.py @ "));
    assert!(stdout.contains("Change type: del  Line: 5\n"));
    assert!(stdout.contains("Change type: add  Line: 5\n"));
    assert!(stdout.contains("Enclosing structure: class Greeter -> def greet\n"));
}

#[test]
fn test_context_json_to_file() {
    let repo = create_test_repo();
    let out_dir = TempDir::new().unwrap();
    let out_file = out_dir.path().join("nested/context.json");

    let output = docscope(&[
        "context",
        "--repo",
        repo.path().to_str().unwrap(),
        "--json",
        "-o",
        out_file.to_str().unwrap(),
    ]);
    assert!(output.status.success());

    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out_file).unwrap()).unwrap();
    assert_eq!(report["entries"].as_array().unwrap().len(), 2);
    assert_eq!(
        report["entries"][0]["scope"],
        serde_json::json!(["class Greeter", "def greet"])
    );
}

#[test]
fn test_docs_draft_command() {
    let repo = create_test_repo();

    let output = docscope(&[
        "docs",
        "--repo",
        repo.path().to_str().unwrap(),
        "--draft",
        "--format",
        "markdown",
        "--format",
        "json",
    ]);
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["draft"], true);
    assert_eq!(report["touched_files"], serde_json::json!(["greeter.py"]));
    assert!(report["commit"].is_null());

    let markdown =
        std::fs::read_to_string(repo.path().join("docs/drafts/greeter.py.md")).unwrap();
    assert!(markdown.contains("### class `Greeter` (lines 1-5)\n\nSays hello.\n\n"));
    assert!(markdown.contains("### def `greet` (lines 4-5)\n\nNo documentation available.\n\n"));
    assert!(repo.path().join("docs/drafts/greeter.py.json").is_file());
}

#[test]
fn test_docs_generate_without_endpoint() {
    let repo = create_test_repo();

    let output = docscope(&["docs", "--repo", repo.path().to_str().unwrap(), "--generate"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("--generate requires --llm-endpoint"));
}

#[test]
fn test_profile_prompt() {
    let repo = create_test_repo();

    let output = docscope(&["profile", "--repo", repo.path().to_str().unwrap(), "--prompt"]);
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("Languages: python=1\n"));
    assert!(stdout.contains("- greeter.py (python) declarations: class Greeter, def greet\n"));
}

#[test]
fn test_missing_repository() {
    let output = docscope(&["docs", "--repo", "/no/such/docscope/repo"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("Repository path does not exist"));
}
