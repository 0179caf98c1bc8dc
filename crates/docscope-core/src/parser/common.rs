//! 通用解析器接口和数据结构
//!
//! 定义语言检测表、声明结构以及语法树导航工具。
//! 语言表在进程内只构建一次，以引用方式传递给各个组件。

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tree_sitter::Node;

/// 语言标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Language {
    #[serde(rename = "python")]
    Python,
    #[serde(rename = "javascript")]
    JavaScript,
    #[serde(rename = "typescript")]
    TypeScript,
    #[serde(rename = "java")]
    Java,
    #[serde(rename = "go")]
    Go,
    #[serde(rename = "rust")]
    Rust,
    #[serde(rename = "c")]
    C,
    #[serde(rename = "cpp")]
    Cpp,
    #[serde(rename = "c_header")]
    CHeader,
    #[serde(rename = "html")]
    Html,
    #[serde(rename = "css")]
    Css,
    #[serde(rename = "json")]
    Json,
    #[serde(rename = "yaml")]
    Yaml,
    #[serde(rename = "shell")]
    Shell,
    #[serde(rename = "dockerfile")]
    Dockerfile,
    #[serde(rename = "unknown")]
    Unknown,
}

impl Language {
    /// 语言标签的字符串形式
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Java => "java",
            Language::Go => "go",
            Language::Rust => "rust",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::CHeader => "c_header",
            Language::Html => "html",
            Language::Css => "css",
            Language::Json => "json",
            Language::Yaml => "yaml",
            Language::Shell => "shell",
            Language::Dockerfile => "dockerfile",
            Language::Unknown => "unknown",
        }
    }

    pub fn is_known(&self) -> bool {
        *self != Language::Unknown
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 拥有完整语法的语言
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StructuralGrammar {
    Python,
    Go,
}

impl StructuralGrammar {
    /// 获取对应的 tree-sitter 语言定义
    pub fn tree_sitter_language(&self) -> tree_sitter::Language {
        match self {
            StructuralGrammar::Python => tree_sitter_python::LANGUAGE.into(),
            StructuralGrammar::Go => tree_sitter_go::LANGUAGE.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StructuralGrammar::Python => "Python",
            StructuralGrammar::Go => "Go",
        }
    }
}

/// 声明扫描能力，每个文件按语言标签选定一次
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanCapability {
    /// 基于语法树的结构化扫描
    Structural(StructuralGrammar),
    /// 基于关键字正则的逐行扫描
    Heuristic,
}

/// 文档注释风格
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocStyle {
    /// `/** ... */` 块注释，`look_behind` 为向上搜索的最大行数
    Block { look_behind: usize },
    /// 连续的行文档注释，例如 Go 的 `//` 和 Rust 的 `///`
    LineDoc {
        marker: &'static str,
        /// 声明与注释之间允许跳过的行前缀（如 Rust 属性）
        skip_prefix: Option<&'static str>,
    },
    /// 声明体内第一条语句为字符串字面量
    Embedded(StructuralGrammar),
    /// 不提取文档
    None,
}

/// 固定的语言查找表
///
/// 包含扩展名映射、文件名映射、文档注释风格、扫描能力和项目标记文件。
#[derive(Debug, Clone)]
pub struct LanguageTable {
    extensions: HashMap<&'static str, Language>,
    filenames: HashMap<&'static str, Language>,
    doc_styles: HashMap<Language, DocStyle>,
    structural: HashMap<Language, StructuralGrammar>,
    project_markers: Vec<(&'static str, Vec<&'static str>)>,
}

impl LanguageTable {
    /// 构建标准语言表
    pub fn standard() -> Self {
        let extensions = HashMap::from([
            ("py", Language::Python),
            ("js", Language::JavaScript),
            ("ts", Language::TypeScript),
            ("java", Language::Java),
            ("go", Language::Go),
            ("rs", Language::Rust),
            ("c", Language::C),
            ("cpp", Language::Cpp),
            ("h", Language::CHeader),
            ("html", Language::Html),
            ("css", Language::Css),
            ("json", Language::Json),
            ("yaml", Language::Yaml),
            ("yml", Language::Yaml),
            ("sh", Language::Shell),
        ]);

        let filenames = HashMap::from([("Dockerfile", Language::Dockerfile)]);

        // 单行声明的语言回看 5 行，签名冗长的语言回看 10 行
        let doc_styles = HashMap::from([
            (Language::JavaScript, DocStyle::Block { look_behind: 5 }),
            (Language::TypeScript, DocStyle::Block { look_behind: 5 }),
            (Language::Java, DocStyle::Block { look_behind: 10 }),
            (Language::C, DocStyle::Block { look_behind: 10 }),
            (Language::Cpp, DocStyle::Block { look_behind: 10 }),
            (Language::CHeader, DocStyle::Block { look_behind: 10 }),
            (
                Language::Go,
                DocStyle::LineDoc {
                    marker: "//",
                    skip_prefix: None,
                },
            ),
            (
                Language::Rust,
                DocStyle::LineDoc {
                    marker: "///",
                    skip_prefix: Some("#["),
                },
            ),
            (
                Language::Python,
                DocStyle::Embedded(StructuralGrammar::Python),
            ),
        ]);

        let structural = HashMap::from([
            (Language::Python, StructuralGrammar::Python),
            (Language::Go, StructuralGrammar::Go),
        ]);

        let project_markers = vec![
            (
                "python",
                vec!["requirements.txt", "pyproject.toml", "setup.py", "Pipfile"],
            ),
            ("node", vec!["package.json", "yarn.lock"]),
            ("docker", vec!["Dockerfile", "docker-compose.yml"]),
            ("rust", vec!["Cargo.toml"]),
            ("go", vec!["go.mod"]),
        ];

        Self {
            extensions,
            filenames,
            doc_styles,
            structural,
            project_markers,
        }
    }

    /// 根据文件路径检测语言，未知时返回 [`Language::Unknown`]
    pub fn detect(&self, path: &Path) -> Language {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            return Language::Unknown;
        };

        if let Some(language) = self.filenames.get(file_name) {
            return *language;
        }

        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.extensions.get(ext.to_ascii_lowercase().as_str()))
            .copied()
            .unwrap_or(Language::Unknown)
    }

    /// 语言对应的扫描能力
    pub fn scan_capability(&self, language: Language) -> ScanCapability {
        match self.structural.get(&language) {
            Some(grammar) => ScanCapability::Structural(*grammar),
            None => ScanCapability::Heuristic,
        }
    }

    /// 语言对应的文档注释风格
    pub fn doc_style(&self, language: Language) -> DocStyle {
        self.doc_styles
            .get(&language)
            .copied()
            .unwrap_or(DocStyle::None)
    }

    /// 项目标记文件表，按 (类别, 文件名列表) 组织
    pub fn project_markers(&self) -> &[(&'static str, Vec<&'static str>)] {
        &self.project_markers
    }
}

impl Default for LanguageTable {
    fn default() -> Self {
        Self::standard()
    }
}

/// 声明类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclarationKind {
    Class,
    Function,
    Type,
    Interface,
}

impl DeclarationKind {
    /// 根据源码关键字推断类别
    pub fn from_keyword(keyword: &str) -> Self {
        match keyword {
            "class" => DeclarationKind::Class,
            "interface" | "trait" => DeclarationKind::Interface,
            "struct" | "enum" | "type" => DeclarationKind::Type,
            _ => DeclarationKind::Function,
        }
    }
}

/// 源码中的一个命名声明
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    pub kind: DeclarationKind,
    /// 源码关键字，用于展示，例如 `def`、`func`、`class`
    pub keyword: String,
    pub name: String,
    /// 起始行 (1-indexed)
    pub start_line: u32,
    /// 结束行 (含)，启发式扫描时未知
    pub end_line: Option<u32>,
    /// 缩进宽度，制表符按 4 列展开
    pub indent: usize,
    /// 直接外层声明在同一序列中的下标
    pub parent: Option<usize>,
}

impl Declaration {
    /// 结束行，未知时视为起始行
    pub fn end(&self) -> u32 {
        self.end_line.unwrap_or(self.start_line)
    }

    /// `"{kind} {name}"` 形式的标签
    pub fn label(&self) -> String {
        format!("{} {}", self.keyword, self.name)
    }

    pub fn contains_line(&self, line: u32) -> bool {
        self.start_line <= line && line <= self.end()
    }

    /// 精确身份键
    pub fn key(&self) -> DeclarationKey {
        DeclarationKey {
            kind: self.keyword.clone(),
            name: self.name.clone(),
            start_line: self.start_line,
            end_line: self.end(),
        }
    }
}

/// 声明身份：(kind, name, start_line, end_line)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeclarationKey {
    pub kind: String,
    pub name: String,
    pub start_line: u32,
    pub end_line: u32,
}

/// 计算行首缩进宽度，制表符按 4 列制表位展开
pub fn indentation_width(line: &str) -> usize {
    let mut width = 0;
    for ch in line.chars() {
        match ch {
            ' ' => width += 1,
            '\t' => width += 4 - width % 4,
            _ => break,
        }
    }
    width
}

/// CST 导航器 - 提供语法树导航功能
pub struct CstNavigator;

impl CstNavigator {
    /// 创建新的 CST 导航器
    pub fn new() -> Self {
        Self
    }

    /// 递归查找指定类型的节点
    pub fn find_nodes_by_kind<'a>(&self, root: Node<'a>, kind: &str) -> Vec<Node<'a>> {
        let mut results = Vec::new();
        Self::collect_nodes_by_kind(root, kind, &mut results);
        results
    }

    /// 获取节点的行号范围 (1-indexed, 含两端)
    ///
    /// 以换行结尾的节点，其结束位置落在下一行第 0 列，此时退回上一行。
    pub fn node_line_span(&self, node: Node) -> (u32, u32) {
        let start = node.start_position();
        let end = node.end_position();
        let start_line = start.row as u32 + 1;
        let end_line = if end.column == 0 && end.row > start.row {
            end.row as u32
        } else {
            end.row as u32 + 1
        };
        (start_line, end_line)
    }

    /// 获取节点的文本内容
    pub fn node_text<'a>(&self, node: Node, source: &'a str) -> &'a str {
        node.utf8_text(source.as_bytes()).unwrap_or_default()
    }

    fn collect_nodes_by_kind<'a>(node: Node<'a>, kind: &str, results: &mut Vec<Node<'a>>) {
        if node.kind() == kind {
            results.push(node);
        }

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            Self::collect_nodes_by_kind(child, kind, results);
        }
    }
}

impl Default for CstNavigator {
    fn default() -> Self {
        Self::new()
    }
}
