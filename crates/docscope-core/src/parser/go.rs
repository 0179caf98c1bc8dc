//! Go 语法规则
//!
//! 基于 Tree-sitter Go 语法的声明节点分类

use super::common::DeclarationKind;
use tree_sitter::Node;

/// 将语法节点归类为声明，返回 (类别, 关键字)
///
/// 函数与方法都以 `func` 展示；类型声明按底层类型区分
/// `struct`、`interface` 和其他 `type`。
pub(crate) fn classify(node: Node) -> Option<(DeclarationKind, &'static str)> {
    match node.kind() {
        "function_declaration" | "method_declaration" => {
            Some((DeclarationKind::Function, "func"))
        }
        "type_spec" => match node.child_by_field_name("type").map(|t| t.kind()) {
            Some("struct_type") => Some((DeclarationKind::Type, "struct")),
            Some("interface_type") => Some((DeclarationKind::Interface, "interface")),
            _ => Some((DeclarationKind::Type, "type")),
        },
        "type_alias" => Some((DeclarationKind::Type, "type")),
        _ => None,
    }
}
