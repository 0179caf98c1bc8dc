//! 声明扫描器
//!
//! 按语言的扫描能力分派到结构化或启发式实现，
//! 结构化实现在扫描时记录每个声明的直接外层声明。

use super::common::{CstNavigator, Declaration, ScanCapability, StructuralGrammar, indentation_width};
use super::{go, heuristic, python};
use crate::error::{DocScopeError, Result};
use std::collections::HashMap;
use tracing::debug;
use tree_sitter::{Node, Parser, Tree};

/// 基于 Tree-sitter 的结构化解析器
pub struct StructuralParser {
    grammar: StructuralGrammar,
    parser: Parser,
}

impl StructuralParser {
    /// 为指定语法创建解析器
    pub fn new(grammar: StructuralGrammar) -> Result<Self> {
        let language = grammar.tree_sitter_language();
        let mut parser = Parser::new();

        parser.set_language(&language).map_err(|e| {
            DocScopeError::TreeSitterError(format!(
                "Failed to set {} language: {e}",
                grammar.name()
            ))
        })?;

        Ok(Self { grammar, parser })
    }

    pub fn grammar(&self) -> StructuralGrammar {
        self.grammar
    }

    /// 解析源码为语法树，语法错误视为无法解析
    pub fn parse_source(&mut self, source: &str) -> Result<Tree> {
        let tree = self.parser.parse(source, None).ok_or_else(|| {
            DocScopeError::ParseError(format!(
                "Failed to parse {} source code",
                self.grammar.name()
            ))
        })?;

        if tree.root_node().has_error() {
            return Err(DocScopeError::UnparsableSource(format!(
                "{} source contains syntax errors",
                self.grammar.name()
            )));
        }

        Ok(tree)
    }

    /// 先序遍历语法树收集声明
    ///
    /// 先序遍历保证结果按起始行升序，外层声明总是先于内层声明入列。
    pub fn collect_declarations(&self, tree: &Tree, source: &str) -> Vec<Declaration> {
        let lines: Vec<&str> = source.lines().collect();
        let mut declarations = Vec::new();
        self.walk(tree.root_node(), source, &lines, None, &mut declarations);
        declarations
    }

    fn walk(
        &self,
        node: Node,
        source: &str,
        lines: &[&str],
        parent: Option<usize>,
        out: &mut Vec<Declaration>,
    ) {
        let mut enclosing = parent;

        let classified = match self.grammar {
            StructuralGrammar::Python => python::classify(node),
            StructuralGrammar::Go => go::classify(node),
        };

        if let Some((kind, keyword)) = classified {
            let navigator = CstNavigator::new();
            let name = node
                .child_by_field_name("name")
                .map(|n| navigator.node_text(n, source))
                .filter(|n| !n.is_empty());

            if let Some(name) = name {
                let (start_line, end_line) = navigator.node_line_span(node);
                let indent = lines
                    .get(start_line as usize - 1)
                    .map(|line| indentation_width(line))
                    .unwrap_or(0);

                out.push(Declaration {
                    kind,
                    keyword: keyword.to_string(),
                    name: name.to_string(),
                    start_line,
                    end_line: Some(end_line),
                    indent,
                    parent,
                });
                enclosing = Some(out.len() - 1);
            }
        }

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.walk(child, source, lines, enclosing, out);
        }
    }
}

/// 声明扫描器
///
/// 缓存每种语法的解析器，单次调用内复用。
pub struct DeclarationScanner {
    parsers: HashMap<StructuralGrammar, StructuralParser>,
}

impl DeclarationScanner {
    /// 创建新的声明扫描器
    pub fn new() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    /// 扫描声明，失败时返回空序列
    pub fn scan(&mut self, source: &str, capability: ScanCapability) -> Vec<Declaration> {
        self.try_scan(source, capability).unwrap_or_else(|e| {
            debug!("Structural scan failed, returning no declarations: {e}");
            Vec::new()
        })
    }

    /// 扫描声明，结构化解析失败时返回错误以便调用方记录
    pub fn try_scan(&mut self, source: &str, capability: ScanCapability) -> Result<Vec<Declaration>> {
        match capability {
            ScanCapability::Heuristic => Ok(heuristic::scan(source)),
            ScanCapability::Structural(grammar) => {
                let parser = self.parser(grammar)?;
                let tree = parser.parse_source(source)?;
                Ok(parser.collect_declarations(&tree, source))
            }
        }
    }

    /// 解析语法树，供文档提取使用
    pub fn parse_tree(&mut self, source: &str, grammar: StructuralGrammar) -> Result<Tree> {
        self.parser(grammar)?.parse_source(source)
    }

    fn parser(&mut self, grammar: StructuralGrammar) -> Result<&mut StructuralParser> {
        if !self.parsers.contains_key(&grammar) {
            let parser = StructuralParser::new(grammar)?;
            self.parsers.insert(grammar, parser);
        }

        self.parsers.get_mut(&grammar).ok_or_else(|| {
            DocScopeError::TreeSitterError(format!("No parser for {}", grammar.name()))
        })
    }
}

impl Default for DeclarationScanner {
    fn default() -> Self {
        Self::new()
    }
}
