//! 文档注释提取模块
//!
//! 按语言族选择提取策略：
//! - 块注释 (`/** ... */`)，在固定回看窗口内查找
//! - 行文档注释 (Go `//`、Rust `///`)，收集紧邻的连续行
//! - 内嵌语句 (Python docstring)，取声明体的第一条字符串语句
//!
//! 注释与声明之间最多允许一个空行。

use crate::parser::{
    CstNavigator, Declaration, DeclarationKey, DocStyle, Language, LanguageTable, StructuralGrammar,
    StructuralParser, python,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// 与某个声明身份精确对应的文档
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocRecord {
    pub key: DeclarationKey,
    pub body: String,
}

/// 文档注释提取器
pub struct DocCommentExtractor<'a> {
    table: &'a LanguageTable,
}

impl<'a> DocCommentExtractor<'a> {
    /// 创建新的文档注释提取器
    pub fn new(table: &'a LanguageTable) -> Self {
        Self { table }
    }

    /// 提取声明附带的文档
    ///
    /// 返回顺序与 `declarations` 一致，没有文档的声明不产生记录。
    pub fn extract(
        &self,
        source: &str,
        language: Language,
        declarations: &[Declaration],
    ) -> Vec<DocRecord> {
        if declarations.is_empty() {
            return Vec::new();
        }

        let lines: Vec<&str> = source.lines().collect();

        match self.table.doc_style(language) {
            DocStyle::Block { look_behind } => declarations
                .iter()
                .filter_map(|decl| {
                    block_comment(&lines, decl.start_line, look_behind).map(|body| DocRecord {
                        key: decl.key(),
                        body,
                    })
                })
                .collect(),
            DocStyle::LineDoc {
                marker,
                skip_prefix,
            } => declarations
                .iter()
                .filter_map(|decl| {
                    line_doc_comment(&lines, decl.start_line, marker, skip_prefix).map(|body| {
                        DocRecord {
                            key: decl.key(),
                            body,
                        }
                    })
                })
                .collect(),
            DocStyle::Embedded(grammar) => embedded_docstrings(source, grammar, declarations),
            DocStyle::None => Vec::new(),
        }
    }
}

/// 在回看窗口内查找紧邻声明的 `/** ... */` 块
fn block_comment(lines: &[&str], decl_line: u32, look_behind: usize) -> Option<String> {
    let decl_index = (decl_line as usize).checked_sub(1)?;
    let lower = decl_index.saturating_sub(look_behind);

    // 跳过注解行与至多一个空行，定位注释结束行
    let mut cursor = decl_index;
    let mut blank_seen = false;
    while cursor > lower {
        let line = lines.get(cursor - 1)?.trim();
        if line.starts_with('@') {
            cursor -= 1;
        } else if line.is_empty() && !blank_seen {
            blank_seen = true;
            cursor -= 1;
        } else {
            break;
        }
    }

    let end = cursor.checked_sub(1)?;
    if end < lower || !lines.get(end)?.trim_end().ends_with("*/") {
        return None;
    }

    let mut start = None;
    for index in (lower..=end).rev() {
        let line = lines[index].trim_start();
        if line.starts_with("/**") {
            start = Some(index);
            break;
        }
        // 遇到另一个注释的结尾说明块不完整
        if index != end && line.contains("*/") {
            return None;
        }
    }
    let start = start?;

    let block = lines[start..=end].join("\n");
    let inner = block.trim();
    let inner = inner.strip_prefix("/**").unwrap_or(inner);
    let inner = inner.strip_suffix("*/").unwrap_or(inner);

    let cleaned: Vec<&str> = inner
        .lines()
        .map(|line| line.trim().trim_start_matches('*').trim())
        .filter(|line| !line.is_empty())
        .collect();

    (!cleaned.is_empty()).then(|| cleaned.join("\n"))
}

/// 收集紧邻声明之前的连续行文档注释
fn line_doc_comment(
    lines: &[&str],
    decl_line: u32,
    marker: &str,
    skip_prefix: Option<&str>,
) -> Option<String> {
    let mut cursor = (decl_line as usize).checked_sub(1)?;
    let mut collected: Vec<&str> = Vec::new();

    while cursor > 0 {
        let line = lines.get(cursor - 1)?.trim_start();

        if collected.is_empty() && skip_prefix.is_some_and(|prefix| line.starts_with(prefix)) {
            cursor -= 1;
            continue;
        }

        let Some(rest) = line.strip_prefix(marker) else {
            break;
        };
        // `////` 之类的分隔线不是文档
        if marker == "///" && rest.starts_with('/') {
            break;
        }

        collected.push(rest.strip_prefix(' ').unwrap_or(rest).trim_end());
        cursor -= 1;
    }

    collected.reverse();
    while collected.last().is_some_and(|l| l.is_empty()) {
        collected.pop();
    }
    let leading = collected.iter().take_while(|l| l.is_empty()).count();
    let body = collected[leading..].join("\n");

    (!body.is_empty()).then_some(body)
}

/// 通过语法树提取内嵌字符串文档
fn embedded_docstrings(
    source: &str,
    grammar: StructuralGrammar,
    declarations: &[Declaration],
) -> Vec<DocRecord> {
    let tree = match StructuralParser::new(grammar).and_then(|mut p| p.parse_source(source)) {
        Ok(tree) => tree,
        Err(e) => {
            debug!("Skipping embedded documentation extraction: {e}");
            return Vec::new();
        }
    };

    let navigator = CstNavigator::new();
    let root = tree.root_node();

    // (起始行, 结束行, 名称) -> docstring
    let mut docstrings: HashMap<(u32, u32, String), String> = HashMap::new();
    for kind in ["class_definition", "function_definition"] {
        for node in navigator.find_nodes_by_kind(root, kind) {
            let Some(name) = node.child_by_field_name("name") else {
                continue;
            };
            if let Some(doc) = python::docstring(node, source) {
                let (start, end) = navigator.node_line_span(node);
                let name = navigator.node_text(name, source).to_string();
                docstrings.insert((start, end, name), doc);
            }
        }
    }

    declarations
        .iter()
        .filter_map(|decl| {
            let lookup = (decl.start_line, decl.end(), decl.name.clone());
            docstrings.get(&lookup).map(|body| DocRecord {
                key: decl.key(),
                body: body.clone(),
            })
        })
        .collect()
}
