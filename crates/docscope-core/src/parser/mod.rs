//! 多语言解析器模块
//!
//! 提供语言检测、结构化 (Tree-sitter) 与启发式两种声明扫描能力

pub mod common;
pub mod go;
pub mod heuristic;
pub mod python;
pub mod scanner;

// 重新导出核心类型
pub use common::{
    CstNavigator, Declaration, DeclarationKey, DeclarationKind, DocStyle, Language, LanguageTable,
    ScanCapability, StructuralGrammar, indentation_width,
};
pub use scanner::{DeclarationScanner, StructuralParser};
