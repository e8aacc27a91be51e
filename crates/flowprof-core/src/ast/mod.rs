//! Syntax tree consumed by the engine
//!
//! Trees are produced by a [`crate::service::Frontend`]. The default frontend
//! reads them as JSON, with every node written as an object tagged by `type`.
//! Node ids are not part of the serialized form; they are assigned by the
//! environment when a tree is installed.

mod build;
pub(crate) mod diff;
pub(crate) mod install;

use serde::{Deserialize, Serialize};

use crate::graph::NodeId;
use crate::signature::{MethodType, SigType};

/// Zero-based line and column
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pos {
    pub line: u32,
    pub column: u32,
}

impl Pos {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Pos,
    pub end: Pos,
}

impl Span {
    pub fn new(start: Pos, end: Pos) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, pos: Pos) -> bool {
        self.start <= pos && pos < self.end
    }
}

/// A node of the tree. Equality compares structure only, so a definition
/// moved to another line still equals its previous version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    #[serde(skip)]
    pub id: NodeId,
    #[serde(default)]
    pub span: Span,
    #[serde(flatten)]
    pub kind: NodeKind,
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuperclassRef {
    pub cpath: Vec<String>,
    #[serde(default)]
    pub args: Vec<SigType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arg {
    pub value: Node,
    #[serde(default)]
    pub splat: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptParam {
    pub name: String,
    pub default: Node,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    pub req: Vec<String>,
    pub opt: Vec<OptParam>,
    pub rest: Option<String>,
    pub post: Vec<String>,
    pub block: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssignTarget {
    Local { name: String },
    Ivar { name: String },
    Gvar { name: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    Program {
        body: Vec<Node>,
    },
    Module {
        cpath: Vec<String>,
        #[serde(default)]
        type_params: Vec<String>,
        body: Vec<Node>,
    },
    Class {
        cpath: Vec<String>,
        #[serde(default)]
        superclass: Option<SuperclassRef>,
        #[serde(default)]
        type_params: Vec<String>,
        body: Vec<Node>,
    },
    Def {
        name: String,
        #[serde(default)]
        singleton: bool,
        #[serde(default)]
        params: Params,
        body: Vec<Node>,
    },
    Return {
        #[serde(default)]
        value: Option<Box<Node>>,
    },
    Next {
        #[serde(default)]
        value: Option<Box<Node>>,
    },
    Call {
        #[serde(default)]
        recv: Option<Box<Node>>,
        name: String,
        #[serde(default)]
        name_span: Option<Span>,
        #[serde(default)]
        args: Vec<Arg>,
        #[serde(default)]
        keywords: Option<Box<Node>>,
        #[serde(default)]
        block: Option<Box<Node>>,
        /// Overrides whether overriding methods of subclasses are also called
        #[serde(default)]
        subclasses: Option<bool>,
    },
    Block {
        #[serde(default)]
        params: Vec<String>,
        body: Vec<Node>,
    },
    Yield {
        #[serde(default)]
        args: Vec<Arg>,
    },
    Const {
        name: String,
        /// Explicit `Scope::Name` qualification, as an absolute path
        #[serde(default)]
        scope: Option<Vec<String>>,
    },
    ConstWrite {
        name: String,
        value: Box<Node>,
    },
    LocalRead {
        name: String,
    },
    LocalWrite {
        name: String,
        value: Box<Node>,
    },
    IvarRead {
        name: String,
    },
    IvarWrite {
        name: String,
        value: Box<Node>,
    },
    GvarRead {
        name: String,
    },
    GvarWrite {
        name: String,
        value: Box<Node>,
    },
    MultiAssign {
        targets: Vec<AssignTarget>,
        value: Box<Node>,
    },
    If {
        cond: Box<Node>,
        then_body: Vec<Node>,
        #[serde(default)]
        else_body: Vec<Node>,
    },
    #[serde(rename = "self")]
    SelfRef,
    Nil,
    True,
    False,
    Int {
        value: i64,
    },
    Float {
        value: f64,
    },
    Str {
        value: String,
    },
    Sym {
        value: String,
    },
    Array {
        elems: Vec<Node>,
    },
    Alias {
        new_name: String,
        old_name: String,
    },
    Include {
        cpath: Vec<String>,
        #[serde(default)]
        args: Vec<SigType>,
    },
    SigDef {
        name: String,
        #[serde(default)]
        singleton: bool,
        overloads: Vec<MethodType>,
        #[serde(default)]
        overloading: bool,
    },
    SigConst {
        name: String,
        ty: SigType,
    },
    SigGvar {
        name: String,
        ty: SigType,
    },
}

impl Node {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            id: NodeId::default(),
            span: Span::default(),
            kind,
        }
    }

    /// Direct children in evaluation order
    pub fn children(&self) -> Vec<&Node> {
        let mut out: Vec<&Node> = Vec::new();
        match &self.kind {
            NodeKind::Program { body }
            | NodeKind::Module { body, .. }
            | NodeKind::Class { body, .. }
            | NodeKind::Block { body, .. } => out.extend(body),
            NodeKind::Def { params, body, .. } => {
                out.extend(params.opt.iter().map(|o| &o.default));
                out.extend(body);
            }
            NodeKind::Return { value } | NodeKind::Next { value } => out.extend(value.as_deref()),
            NodeKind::Call {
                recv,
                args,
                keywords,
                block,
                ..
            } => {
                out.extend(recv.as_deref());
                out.extend(args.iter().map(|a| &a.value));
                out.extend(keywords.as_deref());
                out.extend(block.as_deref());
            }
            NodeKind::Yield { args } => out.extend(args.iter().map(|a| &a.value)),
            NodeKind::ConstWrite { value, .. }
            | NodeKind::LocalWrite { value, .. }
            | NodeKind::IvarWrite { value, .. }
            | NodeKind::GvarWrite { value, .. }
            | NodeKind::MultiAssign { value, .. } => out.push(value),
            NodeKind::If {
                cond,
                then_body,
                else_body,
            } => {
                out.push(cond);
                out.extend(then_body);
                out.extend(else_body);
            }
            NodeKind::Array { elems } => out.extend(elems),
            _ => {}
        }
        out
    }

    fn children_mut(&mut self) -> Vec<&mut Node> {
        let mut out: Vec<&mut Node> = Vec::new();
        match &mut self.kind {
            NodeKind::Program { body }
            | NodeKind::Module { body, .. }
            | NodeKind::Class { body, .. }
            | NodeKind::Block { body, .. } => out.extend(body),
            NodeKind::Def { params, body, .. } => {
                out.extend(params.opt.iter_mut().map(|o| &mut o.default));
                out.extend(body);
            }
            NodeKind::Return { value } | NodeKind::Next { value } => out.extend(value.as_deref_mut()),
            NodeKind::Call {
                recv,
                args,
                keywords,
                block,
                ..
            } => {
                out.extend(recv.as_deref_mut());
                out.extend(args.iter_mut().map(|a| &mut a.value));
                out.extend(keywords.as_deref_mut());
                out.extend(block.as_deref_mut());
            }
            NodeKind::Yield { args } => out.extend(args.iter_mut().map(|a| &mut a.value)),
            NodeKind::ConstWrite { value, .. }
            | NodeKind::LocalWrite { value, .. }
            | NodeKind::IvarWrite { value, .. }
            | NodeKind::GvarWrite { value, .. }
            | NodeKind::MultiAssign { value, .. } => out.push(value),
            NodeKind::If {
                cond,
                then_body,
                else_body,
            } => {
                out.push(cond);
                out.extend(then_body);
                out.extend(else_body);
            }
            NodeKind::Array { elems } => out.extend(elems),
            _ => {}
        }
        out
    }

    /// Assigns a fresh id to every node of the tree, parents first
    pub fn number(&mut self, alloc: &mut impl FnMut() -> NodeId) {
        self.id = alloc();
        for child in self.children_mut() {
            child.number(alloc);
        }
    }

    /// Visits every node of the tree, parents first
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Node)) {
        f(self);
        for child in self.children() {
            child.walk(f);
        }
    }

    /// Definitions whose installed state can be moved to an equal node
    pub fn is_reusable(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Def { .. }
                | NodeKind::SigDef { .. }
                | NodeKind::SigConst { .. }
                | NodeKind::SigGvar { .. }
                | NodeKind::Include { .. }
                | NodeKind::Alias { .. }
        )
    }

    pub fn name_span(&self) -> Option<Span> {
        match &self.kind {
            NodeKind::Call { name_span, .. } => *name_span,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_tagged_nodes() {
        let json = r#"{
            "type": "program",
            "body": [
                { "type": "const_write", "name": "C", "value": { "type": "str", "value": "x" } },
                { "type": "call", "name": "foo", "args": [{ "value": { "type": "int", "value": 1 } }] },
                { "type": "self" }
            ]
        }"#;
        let node: Node = serde_json::from_str(json).unwrap();
        let NodeKind::Program { body } = &node.kind else {
            panic!("expected program");
        };
        assert_eq!(body.len(), 3);
        assert!(matches!(body[2].kind, NodeKind::SelfRef));
    }

    #[test]
    fn test_equality_ignores_spans() {
        let mut a = Node::int(1);
        let b = Node::int(1);
        a.span = Span::new(Pos::new(3, 0), Pos::new(3, 1));
        assert_eq!(a, b);
        assert_ne!(a, Node::int(2));
    }

    #[test]
    fn test_number_assigns_distinct_ids() {
        let mut tree = Node::program(vec![Node::lasgn("x", Node::int(1)), Node::lvar("x")]);
        let mut next = 0;
        tree.number(&mut || {
            next += 1;
            NodeId(next)
        });
        let mut ids = Vec::new();
        tree.walk(&mut |n| ids.push(n.id));
        assert_eq!(ids, vec![NodeId(1), NodeId(2), NodeId(3), NodeId(4)]);
    }
}
