//! 命令行接口模块
//!
//! 提供命令行参数解析、参数验证以及到核心配置的转换

use clap::{Args, Parser, Subcommand, ValueEnum};
use docscope_core::{
    ContextOptions, DocScopeError, ExportFormat, GenerationConfig, ProfileOptions, Result,
    SynthesisOptions, Template,
};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// docscope - 源码结构解析与文档合成工具
///
/// 把差异中的每一行变更定位到外层声明链，
/// 并为仓库中的声明生成结构化文档。
#[derive(Parser, Debug)]
#[command(name = "docscope")]
#[command(author = "docscope contributors")]
#[command(version = "0.1.0")]
#[command(about = "Resolve source structure around changes and synthesize per-file documentation")]
#[command(
    long_about = "docscope detects declarations in multi-language source trees, resolves the enclosing declaration chain of every changed line in a diff, and renders per-file documentation that merges existing doc comments with optionally generated text."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// 详细输出
    #[arg(
        short = 'v',
        long = "verbose",
        global = true,
        help = "Enable verbose logging output"
    )]
    pub verbose: bool,
}

/// 子命令
#[derive(Subcommand, Debug)]
pub enum Command {
    /// 为两个版本之间的变更构建上下文载荷
    #[command(about = "Build a context payload for the changes between two revisions")]
    Context(ContextArgs),
    /// 为仓库生成逐文件文档
    #[command(about = "Synthesize per-file documentation for a repository")]
    Docs(DocsArgs),
    /// 输出项目概况
    #[command(about = "Profile a repository and print the result as JSON")]
    Profile(ProfileArgs),
    /// 解析单行的外层声明链
    #[command(about = "Print the enclosing declaration chain of one line")]
    Scope(ScopeArgs),
}

#[derive(Args, Debug)]
pub struct ContextArgs {
    /// 仓库路径
    #[arg(
        short = 'r',
        long = "repo",
        default_value = ".",
        help = "Path to the Git repository",
        value_name = "PATH"
    )]
    pub repo_path: PathBuf,

    /// 基准版本
    #[arg(
        long = "from",
        value_name = "REV",
        help = "Base revision (defaults to the first parent of --to)"
    )]
    pub from: Option<String>,

    /// 目标版本
    #[arg(
        long = "to",
        default_value = "HEAD",
        value_name = "REV",
        help = "Target revision"
    )]
    pub to: String,

    /// 使用已有的差异文件
    #[arg(
        long = "diff-file",
        value_name = "FILE",
        help = "Parse this unified diff instead of computing one"
    )]
    pub diff_file: Option<PathBuf>,

    /// 片段半径
    #[arg(
        long = "context-lines",
        default_value_t = 2,
        value_name = "LINES",
        help = "Lines of context before and after each changed line"
    )]
    pub context_lines: usize,

    /// 输出到文件
    #[arg(
        short = 'o',
        long = "output",
        value_name = "FILE",
        help = "Write the payload to a file instead of stdout"
    )]
    pub output_file: Option<PathBuf>,

    /// 输出完整报告
    #[arg(long = "json", help = "Print the full context report as JSON")]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct DocsArgs {
    /// 仓库路径
    #[arg(
        short = 'r',
        long = "repo",
        default_value = ".",
        help = "Path to the Git repository",
        value_name = "PATH"
    )]
    pub repo_path: PathBuf,

    /// 文档模板
    #[arg(
        short = 't',
        long = "template",
        value_enum,
        default_value_t = TemplateArg::Api,
        help = "Documentation template"
    )]
    pub template: TemplateArg,

    /// 导出格式，可重复
    #[arg(
        short = 'f',
        long = "format",
        value_enum,
        default_values_t = vec![FormatArg::Markdown],
        help = "Export format (repeatable)"
    )]
    pub formats: Vec<FormatArg>,

    /// 草稿模式
    #[arg(
        long = "draft",
        help = "Write to the drafts area and skip the commit"
    )]
    pub draft: bool,

    /// 请求生成文本
    #[arg(
        long = "generate",
        help = "Ask the text generation service to fill missing documentation"
    )]
    pub generate: bool,

    /// 文本生成服务地址
    #[arg(
        long = "llm-endpoint",
        env = "DOCSCOPE_LLM_ENDPOINT",
        value_name = "URL",
        help = "Text generation endpoint"
    )]
    pub llm_endpoint: Option<String>,

    /// 模型名称
    #[arg(
        long = "llm-model",
        env = "DOCSCOPE_LLM_MODEL",
        default_value = "groq-1",
        value_name = "MODEL",
        help = "Model name sent with each request"
    )]
    pub llm_model: String,

    /// 访问凭据
    #[arg(
        long = "llm-api-key",
        env = "DOCSCOPE_LLM_API_KEY",
        hide_env_values = true,
        value_name = "KEY",
        help = "Bearer token for the text generation endpoint"
    )]
    pub llm_api_key: Option<String>,

    /// 请求超时
    #[arg(
        long = "llm-timeout",
        default_value_t = 20,
        value_name = "SECONDS",
        help = "Timeout for each generation request"
    )]
    pub llm_timeout: u64,

    /// 接受只有名称的生成结果键
    #[arg(
        long = "legacy-bare-names",
        help = "Accept generated keys without a kind when the name is unambiguous"
    )]
    pub legacy_bare_names: bool,

    /// 最大文件大小
    #[arg(
        long = "max-file-size",
        default_value_t = 1_000_000,
        value_name = "BYTES",
        help = "Skip source files larger than this"
    )]
    pub max_file_size: u64,
}

#[derive(Args, Debug)]
pub struct ProfileArgs {
    /// 仓库路径
    #[arg(
        short = 'r',
        long = "repo",
        default_value = ".",
        help = "Path to the project root",
        value_name = "PATH"
    )]
    pub repo_path: PathBuf,

    /// 输出概览提示
    #[arg(long = "prompt", help = "Print the overview prompt instead of JSON")]
    pub prompt: bool,

    /// 最多检查的文件数
    #[arg(
        long = "max-files",
        default_value_t = 2000,
        value_name = "COUNT",
        help = "Maximum number of files to inspect"
    )]
    pub max_files: usize,
}

#[derive(Args, Debug)]
pub struct ScopeArgs {
    /// 源文件
    #[arg(value_name = "FILE", help = "Source file in the working tree")]
    pub file: PathBuf,

    /// 行号
    #[arg(
        value_name = "LINE",
        help = "1-based line number",
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub line: u32,

    /// 输出 JSON
    #[arg(long = "json", help = "Print the chain as a JSON array")]
    pub json: bool,
}

/// 文档模板命令行参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TemplateArg {
    #[value(name = "api")]
    Api,
    #[value(name = "class_breakdown")]
    ClassBreakdown,
    #[value(name = "generic")]
    Generic,
}

/// 导出格式命令行参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    #[value(name = "markdown")]
    Markdown,
    #[value(name = "html")]
    Html,
    #[value(name = "json")]
    Json,
}

impl From<TemplateArg> for Template {
    fn from(arg: TemplateArg) -> Self {
        match arg {
            TemplateArg::Api => Template::Api,
            TemplateArg::ClassBreakdown => Template::ClassBreakdown,
            TemplateArg::Generic => Template::Generic,
        }
    }
}

impl From<FormatArg> for ExportFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Markdown => ExportFormat::Markdown,
            FormatArg::Html => ExportFormat::Html,
            FormatArg::Json => ExportFormat::Json,
        }
    }
}

/// 上下文命令配置
#[derive(Debug, Clone)]
pub struct ContextConfig {
    pub repo_path: PathBuf,
    pub from: Option<String>,
    pub to: String,
    pub diff_file: Option<PathBuf>,
    pub options: ContextOptions,
    pub output_file: Option<PathBuf>,
    pub json: bool,
}

/// 文档命令配置
#[derive(Debug, Clone)]
pub struct DocsConfig {
    pub repo_path: PathBuf,
    pub options: SynthesisOptions,
    /// 启用生成时的服务配置
    pub generation: Option<GenerationConfig>,
}

/// 概况命令配置
#[derive(Debug, Clone)]
pub struct ProfileConfig {
    pub repo_path: PathBuf,
    pub options: ProfileOptions,
    pub prompt: bool,
}

/// 作用域命令配置
#[derive(Debug, Clone)]
pub struct ScopeConfig {
    pub file: PathBuf,
    pub line: u32,
    pub json: bool,
}

/// 要执行的任务
#[derive(Debug, Clone)]
pub enum Task {
    Context(ContextConfig),
    Docs(DocsConfig),
    Profile(ProfileConfig),
    Scope(ScopeConfig),
}

/// 应用程序配置信息
#[derive(Debug, Clone)]
pub struct Config {
    pub task: Task,
    /// 是否启用详细输出
    pub verbose: bool,
}

impl From<Cli> for Config {
    fn from(cli: Cli) -> Self {
        let task = match cli.command {
            Command::Context(args) => Task::Context(ContextConfig {
                repo_path: args.repo_path,
                from: args.from,
                to: args.to,
                diff_file: args.diff_file,
                options: ContextOptions {
                    snippet_radius: args.context_lines,
                },
                output_file: args.output_file,
                json: args.json,
            }),
            Command::Docs(args) => {
                let generation = args.generate.then(|| GenerationConfig {
                    endpoint: args.llm_endpoint.clone().unwrap_or_default(),
                    model: args.llm_model.clone(),
                    api_key: args.llm_api_key.clone(),
                    timeout: Duration::from_secs(args.llm_timeout),
                    ..GenerationConfig::default()
                });

                Task::Docs(DocsConfig {
                    repo_path: args.repo_path,
                    options: SynthesisOptions {
                        template: args.template.into(),
                        export_formats: args.formats.into_iter().map(Into::into).collect(),
                        generate: args.generate,
                        manual_override: args.draft,
                        max_file_size: args.max_file_size,
                        legacy_bare_name_fallback: args.legacy_bare_names,
                        ..SynthesisOptions::default()
                    },
                    generation,
                })
            }
            Command::Profile(args) => Task::Profile(ProfileConfig {
                repo_path: args.repo_path,
                options: ProfileOptions {
                    max_files: args.max_files,
                    ..ProfileOptions::default()
                },
                prompt: args.prompt,
            }),
            Command::Scope(args) => Task::Scope(ScopeConfig {
                file: args.file,
                line: args.line,
                json: args.json,
            }),
        };

        Config {
            task,
            verbose: cli.verbose,
        }
    }
}

impl Cli {
    /// 解析命令行参数
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// 验证参数的有效性
    pub fn validate(&self) -> Result<()> {
        match &self.command {
            Command::Context(args) => {
                require_path(&args.repo_path, "Repository path")?;

                if args.to.trim().is_empty() {
                    return Err(DocScopeError::InvalidRevision(
                        "Target revision cannot be empty".to_string(),
                    ));
                }
                if args.from.as_deref().is_some_and(|from| from.trim().is_empty()) {
                    return Err(DocScopeError::InvalidRevision(
                        "Base revision cannot be empty".to_string(),
                    ));
                }
                if let Some(diff_file) = &args.diff_file {
                    require_path(diff_file, "Diff file")?;
                }
                if let Some(output_file) = &args.output_file {
                    create_parent_dir(output_file)?;
                }
            }
            Command::Docs(args) => {
                require_path(&args.repo_path, "Repository path")?;

                if args.max_file_size == 0 {
                    return Err(DocScopeError::ConfigError(
                        "Maximum file size must be greater than 0".to_string(),
                    ));
                }

                // 生成文本需要服务地址
                if args.generate
                    && args
                        .llm_endpoint
                        .as_deref()
                        .is_none_or(|endpoint| endpoint.trim().is_empty())
                {
                    return Err(DocScopeError::ConfigError(
                        "--generate requires --llm-endpoint or DOCSCOPE_LLM_ENDPOINT".to_string(),
                    ));
                }
            }
            Command::Profile(args) => {
                require_path(&args.repo_path, "Project root")?;

                if args.max_files == 0 {
                    return Err(DocScopeError::ConfigError(
                        "Maximum file count must be greater than 0".to_string(),
                    ));
                }
            }
            Command::Scope(args) => {
                if !args.file.is_file() {
                    return Err(DocScopeError::InputNotFound(format!(
                        "Source file does not exist: {}",
                        args.file.display()
                    )));
                }
            }
        }

        Ok(())
    }
}

fn require_path(path: &Path, what: &str) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(DocScopeError::InputNotFound(format!(
            "{what} does not exist: {}",
            path.display()
        )))
    }
}

/// 创建输出文件的父目录
fn create_parent_dir(output_file: &Path) -> Result<()> {
    if let Some(parent) = output_file.parent() {
        // 只有当父目录不是空路径时才检查和创建
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DocScopeError::IoError(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create output directory {}: {e}",
                        parent.display()
                    ),
                ))
            })?;
        }
    }
    Ok(())
}
