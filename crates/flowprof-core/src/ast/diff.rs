//! Pairing unchanged definitions of a new tree with the installed old tree

use std::collections::HashMap;

use super::{Node, NodeKind};
use crate::graph::NodeId;

/// Maps every node of a reusable new subtree to its old counterpart.
///
/// Only statement lists of the program and of module and class bodies with
/// unchanged headers are compared. Within one list, equal reusable
/// statements are matched in order, scanning forward through the old list.
pub(crate) fn diff(new: &Node, old: &Node) -> HashMap<NodeId, NodeId> {
    let mut out = HashMap::new();
    diff_node(new, old, &mut out);
    out
}

fn body(node: &Node) -> Option<&[Node]> {
    match &node.kind {
        NodeKind::Program { body } | NodeKind::Module { body, .. } | NodeKind::Class { body, .. } => {
            Some(body)
        }
        _ => None,
    }
}

/// Whether two container nodes open the same scope with the same header
fn same_header(new: &Node, old: &Node) -> bool {
    match (&new.kind, &old.kind) {
        (NodeKind::Program { .. }, NodeKind::Program { .. }) => true,
        (
            NodeKind::Module {
                cpath: a,
                type_params: ta,
                ..
            },
            NodeKind::Module {
                cpath: b,
                type_params: tb,
                ..
            },
        ) => a == b && ta == tb,
        (
            NodeKind::Class {
                cpath: a,
                superclass: sa,
                type_params: ta,
                ..
            },
            NodeKind::Class {
                cpath: b,
                superclass: sb,
                type_params: tb,
                ..
            },
        ) => a == b && sa == sb && ta == tb,
        _ => false,
    }
}

fn diff_node(new: &Node, old: &Node, out: &mut HashMap<NodeId, NodeId>) {
    if !same_header(new, old) {
        return;
    }
    let (Some(new_body), Some(old_body)) = (body(new), body(old)) else {
        return;
    };

    let mut cursor = 0;
    for stmt in new_body {
        if cursor >= old_body.len() {
            break;
        }
        let rest = &old_body[cursor..];
        if stmt.is_reusable() {
            if let Some(offset) = rest.iter().position(|o| o == stmt) {
                pair_subtree(stmt, &rest[offset], out);
                cursor += offset + 1;
            }
        } else if body(stmt).is_some() {
            if let Some(offset) = rest.iter().position(|o| same_header(stmt, o)) {
                diff_node(stmt, &rest[offset], out);
                cursor += offset + 1;
            }
        }
    }
}

fn pair_subtree(new: &Node, old: &Node, out: &mut HashMap<NodeId, NodeId>) {
    out.insert(new.id, old.id);
    for (n, o) in new.children().into_iter().zip(old.children()) {
        pair_subtree(n, o, out);
    }
}
