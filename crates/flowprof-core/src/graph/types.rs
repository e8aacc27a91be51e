use serde::Serialize;

use super::{BlockId, ModuleId, VertexId};
use crate::env::GlobalEnv;

/// Abstract value types carried by vertices
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Type {
    /// The type of expressions that never produce a value
    Bot,
    Nil,
    True,
    False,
    Untyped,
    /// An instance of a class, with one vertex per type parameter
    Instance { module: ModuleId, args: Vec<VertexId> },
    /// The class or module object itself
    Singleton(ModuleId),
    /// An array literal. `elems` is present while the literal's shape is known;
    /// `elem` is the union of every element.
    Array {
        elems: Option<Vec<VertexId>>,
        elem: VertexId,
    },
    Proc(BlockId),
    /// A signature type variable bound to the vertex collecting its instantiation
    Var { name: String, vtx: VertexId },
}

impl Type {
    pub fn instance(module: ModuleId) -> Self {
        Type::Instance {
            module,
            args: Vec::new(),
        }
    }

    /// True when the type refers to no vertex and can live in an interned source
    pub fn is_static(&self) -> bool {
        match self {
            Type::Instance { args, .. } => args.is_empty(),
            Type::Array { .. } | Type::Var { .. } => false,
            _ => true,
        }
    }

    pub fn show(&self, env: &GlobalEnv) -> String {
        self.show_rec(env, &mut Vec::new())
    }

    pub(crate) fn show_rec(&self, env: &GlobalEnv, visiting: &mut Vec<VertexId>) -> String {
        match self {
            Type::Bot => "bot".to_string(),
            Type::Nil => "nil".to_string(),
            Type::True => "true".to_string(),
            Type::False => "false".to_string(),
            Type::Untyped => "untyped".to_string(),
            Type::Instance { module, args } => {
                let name = env.module_name(*module);
                if args.is_empty() {
                    name
                } else {
                    let args: Vec<String> =
                        args.iter().map(|&a| env.show_vertex_rec(a, visiting)).collect();
                    format!("{}[{}]", name, args.join(", "))
                }
            }
            Type::Singleton(module) => format!("singleton({})", env.module_name(*module)),
            Type::Array {
                elems: Some(elems),
                ..
            } => {
                let elems: Vec<String> =
                    elems.iter().map(|&e| env.show_vertex_rec(e, visiting)).collect();
                format!("[{}]", elems.join(", "))
            }
            Type::Array { elems: None, elem } => {
                format!("Array[{}]", env.show_vertex_rec(*elem, visiting))
            }
            Type::Proc(block) => match env.block(*block) {
                Some(record) => {
                    let params: Vec<String> = record
                        .params
                        .iter()
                        .map(|&p| env.show_vertex_rec(p, visiting))
                        .collect();
                    format!(
                        "^({}) -> {}",
                        params.join(", "),
                        env.show_vertex_rec(record.ret, visiting)
                    )
                }
                None => "Proc".to_string(),
            },
            Type::Var { name, .. } => name.clone(),
        }
    }
}

/// Removes the outer parentheses of a rendered union, `(A | B)` becoming `A | B`
pub(crate) fn strip_parens(shown: &str) -> &str {
    match shown.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        Some(inner) if balanced(inner) => inner,
        _ => shown,
    }
}

fn balanced(s: &str) -> bool {
    let mut depth = 0i32;
    for c in s.chars() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_parens() {
        assert_eq!(strip_parens("(Integer | String)"), "Integer | String");
        assert_eq!(strip_parens("Integer"), "Integer");
        assert_eq!(strip_parens("(A | B) | (C | D)"), "(A | B) | (C | D)");
    }

    #[test]
    fn test_static_types() {
        assert!(Type::Nil.is_static());
        assert!(Type::instance(ModuleId(3)).is_static());
        assert!(!Type::Instance {
            module: ModuleId(3),
            args: vec![VertexId(1)]
        }
        .is_static());
        assert!(!Type::Array {
            elems: None,
            elem: VertexId(0)
        }
        .is_static());
    }
}
