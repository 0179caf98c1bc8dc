//! docscope - 源码结构解析与文档合成工具
//!
//! 命令行入口：解析参数、初始化日志并把任务分派给核心库。

mod cli;

use cli::{Cli, Config, ContextConfig, DocsConfig, ProfileConfig, ScopeConfig, Task};
use docscope_core::{
    ContextAggregator, DiffHunkParser, DocScopeError, DocSynthesizer, GitCliCommitter,
    GitRepository, HttpTextClient, LanguageTable, ProjectProfile, Result, ScopeResolver,
};
use std::fs;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

fn main() {
    // 解析命令行参数
    let cli = Cli::parse_args();

    // 初始化日志记录，输出到 stderr 以免混入载荷
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // 验证参数
    if let Err(e) = cli.validate() {
        error!("Invalid arguments: {e}");
        std::process::exit(1);
    }

    let config: Config = cli.into();
    if config.verbose {
        debug!("Verbose logging enabled");
    }

    // 运行主要逻辑
    if let Err(e) = run(config) {
        error!("Application error: {e}");
        std::process::exit(1);
    }
}

/// 主要应用逻辑
fn run(config: Config) -> Result<()> {
    // 语言表在进程内只构建一次
    let table = LanguageTable::standard();

    match config.task {
        Task::Context(context) => run_context(&table, context),
        Task::Docs(docs) => run_docs(&table, docs),
        Task::Profile(profile) => run_profile(&table, profile),
        Task::Scope(scope) => run_scope(&table, scope),
    }
}

fn run_context(table: &LanguageTable, config: ContextConfig) -> Result<()> {
    let repository = GitRepository::open(&config.repo_path)?;

    let new_revision = repository.resolve_revision(&config.to)?;
    let old_revision = match &config.from {
        Some(from) => repository.resolve_revision(from)?,
        None => repository.first_parent(&new_revision)?.ok_or_else(|| {
            DocScopeError::InvalidRevision(format!(
                "{} has no parent; pass --from explicitly",
                config.to
            ))
        })?,
    };

    let changes = match &config.diff_file {
        Some(diff_file) => {
            let text = fs::read_to_string(diff_file).map_err(|e| {
                DocScopeError::IoError(std::io::Error::new(
                    e.kind(),
                    format!("Failed to read diff file {}: {e}", diff_file.display()),
                ))
            })?;
            DiffHunkParser::new().split_files(&text)
        }
        None => repository.diff_revisions(&old_revision, &new_revision)?,
    };
    info!(
        "Building context for {} changed files between {old_revision} and {new_revision}",
        changes.len()
    );

    let report = ContextAggregator::new(table, &repository)
        .with_options(config.options)
        .aggregate_changes(&changes, &old_revision, &new_revision);

    let output = if config.json {
        let mut json = serde_json::to_string_pretty(&report)?;
        json.push('\n');
        json
    } else {
        report.payload
    };

    match &config.output_file {
        Some(path) => {
            fs::write(path, output)?;
            info!("Context written to {}", path.display());
        }
        None => print!("{output}"),
    }
    Ok(())
}

fn run_docs(table: &LanguageTable, config: DocsConfig) -> Result<()> {
    let repository = GitRepository::open(&config.repo_path)?;
    let committer = GitCliCommitter::new();

    let client = config.generation.map(HttpTextClient::new).transpose()?;
    let mut synthesizer = DocSynthesizer::new(table, &committer, config.options);
    if let Some(client) = &client {
        synthesizer = synthesizer.with_client(client);
    }

    let report = synthesizer.run(&repository)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn run_profile(table: &LanguageTable, config: ProfileConfig) -> Result<()> {
    let profile = ProjectProfile::scan(&config.repo_path, table, &config.options)?;

    if config.prompt {
        print!("{}", profile.overview_prompt(&config.options));
    } else {
        println!("{}", serde_json::to_string_pretty(&profile)?);
    }
    Ok(())
}

fn run_scope(table: &LanguageTable, config: ScopeConfig) -> Result<()> {
    let bytes = fs::read(&config.file)?;
    let source = String::from_utf8_lossy(&bytes);
    let language = table.detect(&config.file);

    let chain = ScopeResolver::new(table).resolve(&source, language, config.line);
    if config.json {
        println!("{}", serde_json::to_string(&chain)?);
    } else {
        println!("{chain}");
    }
    Ok(())
}
