//! 输出格式化模块
//!
//! 将逐文件的文档章节渲染为 Markdown、HTML 或 JSON，并渲染仓库级摘要。
//! 渲染结果只依赖输入，不包含时间戳，相同输入总是得到相同字节。

use crate::error::Result;
use crate::parser::{Declaration, Language};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// 没有文档时的占位文本
pub const PLACEHOLDER: &str = "No documentation available.";

/// 摘要中默认列出的文件数上限
pub const SUMMARY_DISPLAY_CAP: usize = 100;

static SECTION_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^### (\S+) `([^`]+)` \(lines (\d+)-(\d+)\)$")
        .expect("section header pattern is valid")
});

/// 文档模板
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Template {
    #[default]
    Api,
    ClassBreakdown,
    Generic,
}

impl Template {
    pub fn as_str(&self) -> &'static str {
        match self {
            Template::Api => "api",
            Template::ClassBreakdown => "class_breakdown",
            Template::Generic => "generic",
        }
    }

    /// 章节标题
    pub fn heading(&self) -> &'static str {
        match self {
            Template::Api => "API Documentation",
            Template::ClassBreakdown => "Class and Function Breakdown",
            Template::Generic => "Documentation",
        }
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 导出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Markdown,
    Html,
    Json,
}

impl ExportFormat {
    /// 文件扩展名
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Markdown => "md",
            ExportFormat::Html => "html",
            ExportFormat::Json => "json",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Markdown => f.write_str("markdown"),
            ExportFormat::Html => f.write_str("html"),
            ExportFormat::Json => f.write_str("json"),
        }
    }
}

/// 文档来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Existing,
    Generated,
    Missing,
}

/// 一个声明的文档章节
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocSection {
    pub declaration: Declaration,
    pub body: String,
    pub provenance: Provenance,
}

impl DocSection {
    /// 实际展示的文本，缺失时为占位文本
    pub fn display_body(&self) -> &str {
        let body = self.body.trim();
        if body.is_empty() { PLACEHOLDER } else { body }
    }
}

/// 单个源文件的文档
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDocument {
    pub path: PathBuf,
    pub language: Language,
    pub template: Template,
    /// 按起始行升序
    pub sections: Vec<DocSection>,
}

/// JSON 导出中的章节
#[derive(Serialize)]
struct JsonSection<'a> {
    kind: &'a str,
    name: &'a str,
    start_line: u32,
    end_line: u32,
    provenance: Provenance,
    body: &'a str,
}

/// JSON 导出的文档
#[derive(Serialize)]
struct JsonDocument<'a> {
    path: String,
    language: Language,
    template: Template,
    heading: &'a str,
    sections: Vec<JsonSection<'a>>,
}

/// 输出渲染器
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputRenderer;

impl OutputRenderer {
    /// 创建新的输出渲染器
    pub fn new() -> Self {
        Self
    }

    /// 按格式渲染文件文档
    pub fn render(&self, document: &FileDocument, format: ExportFormat) -> Result<String> {
        match format {
            ExportFormat::Markdown => Ok(self.render_markdown(document)),
            ExportFormat::Html => Ok(self.render_html(document)),
            ExportFormat::Json => self.render_json(document),
        }
    }

    /// 渲染为 Markdown 格式
    pub fn render_markdown(&self, document: &FileDocument) -> String {
        let mut output = String::new();

        output.push_str(&format!("# {}\n\n", display_path(&document.path)));
        output.push_str(&format!("## {}\n\n", document.template.heading()));

        if document.sections.is_empty() {
            output.push_str("(No declarations found)\n");
            return output;
        }

        for section in &document.sections {
            let decl = &section.declaration;
            output.push_str(&format!(
                "### {} `{}` (lines {}-{})\n\n",
                decl.keyword,
                decl.name,
                decl.start_line,
                decl.end()
            ));
            output.push_str(&escape_markdown_headings(section.display_body()));
            output.push_str("\n\n");
        }

        output
    }

    /// 渲染为 HTML 格式
    pub fn render_html(&self, document: &FileDocument) -> String {
        let path = html_escape(&display_path(&document.path));
        let mut output = String::new();

        output.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
        output.push_str("    <meta charset=\"UTF-8\">\n");
        output.push_str(&format!("    <title>{path}</title>\n"));
        output.push_str("    <style>\n");
        output.push_str(DEFAULT_CSS);
        output.push_str("    </style>\n");
        output.push_str("</head>\n<body>\n");

        output.push_str(&format!("    <h1>{path}</h1>\n"));
        output.push_str(&format!(
            "    <h2>{}</h2>\n",
            html_escape(document.template.heading())
        ));

        if document.sections.is_empty() {
            output.push_str("    <p class=\"empty\">(No declarations found)</p>\n");
        }

        for section in &document.sections {
            let decl = &section.declaration;
            let provenance = match section.provenance {
                Provenance::Existing => "existing",
                Provenance::Generated => "generated",
                Provenance::Missing => "missing",
            };

            output.push_str(&format!(
                "    <section class=\"declaration {provenance}\" data-kind=\"{}\" data-start=\"{}\" data-end=\"{}\">\n",
                html_escape(&decl.keyword),
                decl.start_line,
                decl.end()
            ));
            output.push_str(&format!(
                "        <h3>{} <code>{}</code> (lines {}-{})</h3>\n",
                html_escape(&decl.keyword),
                html_escape(&decl.name),
                decl.start_line,
                decl.end()
            ));
            output.push_str(&format!(
                "        <pre>{}</pre>\n",
                html_escape(section.display_body())
            ));
            output.push_str("    </section>\n");
        }

        output.push_str("</body>\n</html>\n");
        output
    }

    /// 渲染为 JSON 格式
    pub fn render_json(&self, document: &FileDocument) -> Result<String> {
        let json = JsonDocument {
            path: display_path(&document.path),
            language: document.language,
            template: document.template,
            heading: document.template.heading(),
            sections: document
                .sections
                .iter()
                .map(|section| JsonSection {
                    kind: &section.declaration.keyword,
                    name: &section.declaration.name,
                    start_line: section.declaration.start_line,
                    end_line: section.declaration.end(),
                    provenance: section.provenance,
                    body: section.display_body(),
                })
                .collect(),
        };

        let mut output = serde_json::to_string_pretty(&json)?;
        output.push('\n');
        Ok(output)
    }

    /// 渲染仓库级摘要，超过上限的文件以剩余数量标记
    pub fn render_summary(&self, template: Template, touched: &[PathBuf], cap: usize) -> String {
        let mut output = String::new();

        output.push_str("# Documentation Summary\n\n");
        output.push_str(&format!("Template: {template}\n\n"));
        output.push_str(&format!("Total files documented: {}\n\n", touched.len()));
        output.push_str("Files with generated documentation:\n");

        for path in touched.iter().take(cap) {
            output.push_str(&format!("- {}\n", display_path(path)));
        }
        if touched.len() > cap {
            output.push_str(&format!("\n... and {} more files\n", touched.len() - cap));
        }

        output
    }
}

/// 从渲染后的 Markdown 中解析章节头 (kind, name, start, end)
pub fn parse_rendered_headers(markdown: &str) -> Vec<(String, String, u32, u32)> {
    SECTION_HEADER
        .captures_iter(markdown)
        .filter_map(|caps| {
            let start = caps[3].parse().ok()?;
            let end = caps[4].parse().ok()?;
            Some((caps[1].to_string(), caps[2].to_string(), start, end))
        })
        .collect()
}

/// 转义正文中以 `#` 开头的行，正文不会被当作章节头
fn escape_markdown_headings(body: &str) -> Cow<'_, str> {
    if !body.lines().any(|line| line.starts_with('#')) {
        return Cow::Borrowed(body);
    }

    let escaped: Vec<Cow<'_, str>> = body
        .lines()
        .map(|line| {
            if line.starts_with('#') {
                Cow::Owned(format!("\\{line}"))
            } else {
                Cow::Borrowed(line)
            }
        })
        .collect();
    Cow::Owned(escaped.join("\n"))
}

/// 使用 `/` 分隔的展示路径，与平台无关
pub fn display_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// 输出文件名：路径中的 `/` 替换为 `__`，再加上格式扩展名
pub fn artifact_file_name(path: &Path, format: ExportFormat) -> String {
    format!(
        "{}.{}",
        display_path(path).replace('/', "__"),
        format.extension()
    )
}

const DEFAULT_CSS: &str = r#"
        body {
            font-family: -apple-system, 'Segoe UI', Helvetica, Arial, sans-serif;
            line-height: 1.6;
            max-width: 960px;
            margin: 0 auto;
            padding: 20px;
        }
        h1, h2 {
            border-bottom: 1px solid #e9ecef;
            padding-bottom: 8px;
        }
        .declaration {
            margin: 16px 0;
            padding-left: 12px;
            border-left: 3px solid #dee2e6;
        }
        .declaration.generated {
            border-left-color: #0d6efd;
        }
        .declaration.missing {
            border-left-color: #ffc107;
        }
        pre {
            white-space: pre-wrap;
            background-color: #f8f9fa;
            padding: 10px;
        }
"#;

/// HTML转义函数
fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
