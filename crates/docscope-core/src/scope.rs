//! 作用域解析模块
//!
//! 给定文件文本与行号，返回由外到内的外层声明链。
//! 结构化路径依赖扫描时记录的外层声明引用；
//! 启发式路径依赖缩进，缩进不严格递增时结果可能有损。

use crate::parser::{Declaration, DeclarationScanner, Language, LanguageTable, ScanCapability, heuristic};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// 由外到内的外层声明链，空链表示模块级
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeChain(Vec<String>);

impl ScopeChain {
    pub fn new(tokens: Vec<String>) -> Self {
        Self(tokens)
    }

    /// 模块级作用域
    pub fn module() -> Self {
        Self(Vec::new())
    }

    pub fn is_module(&self) -> bool {
        self.0.is_empty()
    }

    pub fn tokens(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for ScopeChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("module")
        } else {
            f.write_str(&self.0.join(" -> "))
        }
    }
}

/// 作用域解析策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    Structural,
    Heuristic,
}

/// 一个文件版本的声明索引，可反复查询
#[derive(Debug, Clone)]
pub struct ScopeIndex {
    pub strategy: ResolutionStrategy,
    pub declarations: Vec<Declaration>,
    pub line_count: usize,
    /// 结构化解析失败后退回启发式扫描
    pub fell_back: bool,
}

impl ScopeIndex {
    /// 查询指定行的外层声明链
    pub fn chain_for(&self, line: u32) -> ScopeChain {
        if line == 0 || line as usize > self.line_count {
            return ScopeChain::module();
        }

        match self.strategy {
            ResolutionStrategy::Structural => resolve_structural(&self.declarations, line),
            ResolutionStrategy::Heuristic => resolve_heuristic(&self.declarations, line),
        }
    }
}

/// 作用域解析器
pub struct ScopeResolver<'a> {
    table: &'a LanguageTable,
    scanner: DeclarationScanner,
}

impl<'a> ScopeResolver<'a> {
    /// 创建新的作用域解析器
    pub fn new(table: &'a LanguageTable) -> Self {
        Self {
            table,
            scanner: DeclarationScanner::new(),
        }
    }

    /// 为文件文本构建声明索引
    ///
    /// 有语法支持的语言走结构化路径，解析失败时退回启发式路径。
    pub fn index(&mut self, source: &str, language: Language) -> ScopeIndex {
        let line_count = source.lines().count();

        match self.table.scan_capability(language) {
            capability @ ScanCapability::Structural(grammar) => {
                match self.scanner.try_scan(source, capability) {
                    Ok(declarations) => ScopeIndex {
                        strategy: ResolutionStrategy::Structural,
                        declarations,
                        line_count,
                        fell_back: false,
                    },
                    Err(e) => {
                        debug!(
                            "{} parse failed, resolving scope by indentation: {e}",
                            grammar.name()
                        );
                        ScopeIndex {
                            strategy: ResolutionStrategy::Heuristic,
                            declarations: heuristic::scan(source),
                            line_count,
                            fell_back: true,
                        }
                    }
                }
            }
            ScanCapability::Heuristic => ScopeIndex {
                strategy: ResolutionStrategy::Heuristic,
                declarations: heuristic::scan(source),
                line_count,
                fell_back: false,
            },
        }
    }

    /// 解析单行的外层声明链
    pub fn resolve(&mut self, source: &str, language: Language, line: u32) -> ScopeChain {
        self.index(source, language).chain_for(line)
    }
}

/// 结构化路径：取包含目标行的最内层声明，再沿外层引用回溯
///
/// 最内层按起始行最大、其次跨度最小确定。
pub fn resolve_structural(declarations: &[Declaration], line: u32) -> ScopeChain {
    let innermost = declarations
        .iter()
        .enumerate()
        .filter(|(_, decl)| decl.contains_line(line))
        .max_by(|(_, a), (_, b)| {
            a.start_line
                .cmp(&b.start_line)
                .then_with(|| (b.end() - b.start_line).cmp(&(a.end() - a.start_line)))
        })
        .map(|(index, _)| index);

    let mut tokens = Vec::new();
    let mut cursor = innermost;
    while let Some(index) = cursor {
        let Some(decl) = declarations.get(index) else {
            break;
        };
        tokens.push(decl.label());
        // 外层引用总是指向更靠前的下标
        cursor = decl.parent.filter(|parent| *parent < index);
    }

    tokens.reverse();
    ScopeChain::new(tokens)
}

/// 启发式路径：按缩进严格递减逆向收集
pub fn resolve_heuristic(declarations: &[Declaration], line: u32) -> ScopeChain {
    let mut candidates: Vec<&Declaration> = declarations
        .iter()
        .filter(|decl| decl.start_line <= line)
        .collect();
    candidates.sort_by_key(|decl| decl.start_line);

    let mut minimum = usize::MAX;
    let mut tokens = Vec::new();
    for decl in candidates.iter().rev() {
        if decl.indent < minimum {
            tokens.push(decl.label());
            minimum = decl.indent;
        }
    }

    tokens.reverse();
    ScopeChain::new(tokens)
}
