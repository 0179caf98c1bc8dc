//! 启发式声明扫描
//!
//! 对没有语法支持的语言，逐行匹配声明关键字。
//! 结束行无法确定，调用方按起始行处理。

use super::common::{Declaration, DeclarationKind, indentation_width};
use regex::Regex;
use std::sync::LazyLock;

/// 声明关键字模式：可选缩进、可选修饰符、关键字、可选 Go 接收者、名称
static DECLARATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^[ \t]*(?:(?:export|default|public|private|protected|internal|static|abstract|final|async|unsafe|extern|const|pub(?:\([^)]*\))?)[ \t]+)*(class|def|interface|func|function|fn|struct|trait|enum)[ \t]+(?:\([^)]*\)[ \t]*)?([A-Za-z_]\w*)",
    )
    .expect("declaration pattern is valid")
});

/// 逐行扫描声明
pub fn scan(source: &str) -> Vec<Declaration> {
    source
        .lines()
        .enumerate()
        .filter_map(|(index, line)| {
            let captures = DECLARATION_PATTERN.captures(line)?;
            let keyword = captures.get(1)?.as_str().to_ascii_lowercase();
            let name = captures.get(2)?.as_str().to_string();

            Some(Declaration {
                kind: DeclarationKind::from_keyword(&keyword),
                keyword,
                name,
                start_line: index as u32 + 1,
                end_line: None,
                indent: indentation_width(line),
                parent: None,
            })
        })
        .collect()
}
