//! Shorthand constructors for building trees in code

use super::{Arg, AssignTarget, Node, NodeKind, OptParam, Params, Pos, Span, SuperclassRef};
use crate::signature::{MethodType, SigType};

fn path(cpath: &str) -> Vec<String> {
    cpath.split("::").map(str::to_string).collect()
}

impl Node {
    pub fn at(mut self, line: u32, start: u32, end: u32) -> Self {
        self.span = Span::new(Pos::new(line, start), Pos::new(line, end));
        self
    }

    pub fn program(body: Vec<Node>) -> Self {
        Node::new(NodeKind::Program { body })
    }

    pub fn module(cpath: &str, body: Vec<Node>) -> Self {
        Node::new(NodeKind::Module {
            cpath: path(cpath),
            type_params: Vec::new(),
            body,
        })
    }

    pub fn class(cpath: &str, superclass: Option<&str>, body: Vec<Node>) -> Self {
        Node::new(NodeKind::Class {
            cpath: path(cpath),
            superclass: superclass.map(|s| SuperclassRef {
                cpath: path(s),
                args: Vec::new(),
            }),
            type_params: Vec::new(),
            body,
        })
    }

    pub fn def(name: &str, params: Params, body: Vec<Node>) -> Self {
        Node::new(NodeKind::Def {
            name: name.to_string(),
            singleton: false,
            params,
            body,
        })
    }

    pub fn sdef(name: &str, params: Params, body: Vec<Node>) -> Self {
        Node::new(NodeKind::Def {
            name: name.to_string(),
            singleton: true,
            params,
            body,
        })
    }

    pub fn ret(value: Option<Node>) -> Self {
        Node::new(NodeKind::Return {
            value: value.map(Box::new),
        })
    }

    pub fn next(value: Option<Node>) -> Self {
        Node::new(NodeKind::Next {
            value: value.map(Box::new),
        })
    }

    pub fn call(recv: Option<Node>, name: &str, args: Vec<Node>) -> Self {
        Node::call_with(recv, name, args.into_iter().map(Arg::plain).collect(), None)
    }

    pub fn call_with(recv: Option<Node>, name: &str, args: Vec<Arg>, block: Option<Node>) -> Self {
        Node::new(NodeKind::Call {
            recv: recv.map(Box::new),
            name: name.to_string(),
            name_span: None,
            args,
            keywords: None,
            block: block.map(Box::new),
            subclasses: None,
        })
    }

    pub fn block(params: &[&str], body: Vec<Node>) -> Self {
        Node::new(NodeKind::Block {
            params: params.iter().map(|p| p.to_string()).collect(),
            body,
        })
    }

    pub fn yield_(args: Vec<Node>) -> Self {
        Node::new(NodeKind::Yield {
            args: args.into_iter().map(Arg::plain).collect(),
        })
    }

    pub fn const_read(name: &str) -> Self {
        Node::new(NodeKind::Const {
            name: name.to_string(),
            scope: None,
        })
    }

    pub fn const_write(name: &str, value: Node) -> Self {
        Node::new(NodeKind::ConstWrite {
            name: name.to_string(),
            value: Box::new(value),
        })
    }

    pub fn lvar(name: &str) -> Self {
        Node::new(NodeKind::LocalRead { name: name.to_string() })
    }

    pub fn lasgn(name: &str, value: Node) -> Self {
        Node::new(NodeKind::LocalWrite {
            name: name.to_string(),
            value: Box::new(value),
        })
    }

    pub fn ivar(name: &str) -> Self {
        Node::new(NodeKind::IvarRead { name: name.to_string() })
    }

    pub fn iasgn(name: &str, value: Node) -> Self {
        Node::new(NodeKind::IvarWrite {
            name: name.to_string(),
            value: Box::new(value),
        })
    }

    pub fn gvar(name: &str) -> Self {
        Node::new(NodeKind::GvarRead { name: name.to_string() })
    }

    pub fn gasgn(name: &str, value: Node) -> Self {
        Node::new(NodeKind::GvarWrite {
            name: name.to_string(),
            value: Box::new(value),
        })
    }

    pub fn masgn(targets: Vec<AssignTarget>, value: Node) -> Self {
        Node::new(NodeKind::MultiAssign {
            targets,
            value: Box::new(value),
        })
    }

    pub fn if_(cond: Node, then_body: Vec<Node>, else_body: Vec<Node>) -> Self {
        Node::new(NodeKind::If {
            cond: Box::new(cond),
            then_body,
            else_body,
        })
    }

    pub fn self_ref() -> Self {
        Node::new(NodeKind::SelfRef)
    }

    pub fn nil() -> Self {
        Node::new(NodeKind::Nil)
    }

    pub fn true_() -> Self {
        Node::new(NodeKind::True)
    }

    pub fn false_() -> Self {
        Node::new(NodeKind::False)
    }

    pub fn int(value: i64) -> Self {
        Node::new(NodeKind::Int { value })
    }

    pub fn float(value: f64) -> Self {
        Node::new(NodeKind::Float { value })
    }

    pub fn str(value: &str) -> Self {
        Node::new(NodeKind::Str {
            value: value.to_string(),
        })
    }

    pub fn sym(value: &str) -> Self {
        Node::new(NodeKind::Sym {
            value: value.to_string(),
        })
    }

    pub fn array(elems: Vec<Node>) -> Self {
        Node::new(NodeKind::Array { elems })
    }

    pub fn alias(new_name: &str, old_name: &str) -> Self {
        Node::new(NodeKind::Alias {
            new_name: new_name.to_string(),
            old_name: old_name.to_string(),
        })
    }

    pub fn include(cpath: &str) -> Self {
        Node::new(NodeKind::Include {
            cpath: path(cpath),
            args: Vec::new(),
        })
    }

    pub fn sig(name: &str, overloads: Vec<MethodType>) -> Self {
        Node::new(NodeKind::SigDef {
            name: name.to_string(),
            singleton: false,
            overloads,
            overloading: false,
        })
    }

    pub fn sig_const(name: &str, ty: SigType) -> Self {
        Node::new(NodeKind::SigConst {
            name: name.to_string(),
            ty,
        })
    }

    pub fn sig_gvar(name: &str, ty: SigType) -> Self {
        Node::new(NodeKind::SigGvar {
            name: name.to_string(),
            ty,
        })
    }
}

impl Arg {
    pub fn plain(value: Node) -> Self {
        Self { value, splat: false }
    }

    pub fn splat(value: Node) -> Self {
        Self { value, splat: true }
    }
}

impl Params {
    pub fn req(names: &[&str]) -> Self {
        Self {
            req: names.iter().map(|n| n.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn with_opt(mut self, name: &str, default: Node) -> Self {
        self.opt.push(OptParam {
            name: name.to_string(),
            default,
        });
        self
    }

    pub fn with_rest(mut self, name: &str) -> Self {
        self.rest = Some(name.to_string());
        self
    }

    pub fn with_post(mut self, names: &[&str]) -> Self {
        self.post.extend(names.iter().map(|n| n.to_string()));
        self
    }

    pub fn with_block(mut self, name: &str) -> Self {
        self.block = Some(name.to_string());
        self
    }
}
