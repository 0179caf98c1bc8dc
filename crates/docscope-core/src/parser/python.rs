//! Python 语法规则
//!
//! 声明节点分类以及 docstring 提取。

use super::common::DeclarationKind;
use tree_sitter::Node;

/// 将语法节点归类为声明，返回 (类别, 关键字)
///
/// `async def` 与普通函数同属 `function_definition` 节点。
pub(crate) fn classify(node: Node) -> Option<(DeclarationKind, &'static str)> {
    match node.kind() {
        "class_definition" => Some((DeclarationKind::Class, "class")),
        "function_definition" => Some((DeclarationKind::Function, "def")),
        _ => None,
    }
}

/// 提取类或函数定义的 docstring
///
/// 声明体的第一条语句（忽略注释）若为纯字符串字面量则视为文档。
pub fn docstring(definition: Node, source: &str) -> Option<String> {
    let body = definition.child_by_field_name("body")?;

    let mut cursor = body.walk();
    let first = body
        .named_children(&mut cursor)
        .find(|child| child.kind() != "comment")?;

    if first.kind() != "expression_statement" || first.named_child_count() != 1 {
        return None;
    }

    let literal = first.named_child(0)?;
    if literal.kind() != "string" {
        return None;
    }

    let raw = literal.utf8_text(source.as_bytes()).ok()?;
    let value = string_literal_value(raw)?;
    let cleaned = clean_docstring(value);
    (!cleaned.is_empty()).then_some(cleaned)
}

/// 去掉字符串字面量的前缀与引号，字节串和 f-string 不作为文档
fn string_literal_value(raw: &str) -> Option<&str> {
    let prefix_len = raw
        .find(|c: char| c == '"' || c == '\'')
        .unwrap_or(raw.len());
    let prefix = raw[..prefix_len].to_ascii_lowercase();
    if prefix.contains('b') || prefix.contains('f') {
        return None;
    }

    let quoted = &raw[prefix_len..];
    for delimiter in ["\"\"\"", "'''", "\"", "'"] {
        if quoted.len() >= delimiter.len() * 2
            && quoted.starts_with(delimiter)
            && quoted.ends_with(delimiter)
        {
            return Some(&quoted[delimiter.len()..quoted.len() - delimiter.len()]);
        }
    }
    None
}

/// 按 `inspect.cleandoc` 的规则整理 docstring
///
/// 首行去掉前导空白，其余行去掉公共缩进，并删除首尾空行。
pub fn clean_docstring(doc: &str) -> String {
    let expanded: Vec<String> = doc.lines().map(expand_tabs).collect();
    if expanded.is_empty() {
        return String::new();
    }

    let margin = expanded
        .iter()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.chars().count() - line.trim_start().chars().count())
        .min()
        .unwrap_or(0);

    let mut lines: Vec<&str> = Vec::with_capacity(expanded.len());
    lines.push(expanded[0].trim_start());
    for line in &expanded[1..] {
        lines.push(strip_chars(line, margin).trim_end());
    }

    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    let leading = lines.iter().take_while(|l| l.trim().is_empty()).count();

    lines[leading..].join("\n").trim_end().to_string()
}

/// 按字符数去掉行首的公共缩进，空白行可能短于缩进
fn strip_chars(line: &str, count: usize) -> &str {
    match line.char_indices().nth(count) {
        Some((offset, _)) => &line[offset..],
        None => "",
    }
}

fn expand_tabs(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut column = 0;
    for ch in line.chars() {
        if ch == '\t' {
            let spaces = 8 - column % 8;
            out.extend(std::iter::repeat_n(' ', spaces));
            column += spaces;
        } else {
            out.push(ch);
            column += 1;
        }
    }
    out
}
