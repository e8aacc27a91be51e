//! Installing a tree into the graph and tearing it down again
//!
//! Each node gets a [`NodeRecord`] holding the vertices it allocated, the
//! registrations it made and a [`Changes`] buffer for the edges and sites it
//! created. A node's own sites are created when its buffer is reinstalled,
//! after all of its children are in place.

use indexmap::IndexMap;
use std::collections::HashMap;
use std::mem;
use std::rc::Rc;
use tracing::trace;

use super::{AssignTarget, Node, NodeKind, Params};
use crate::env::{
    BlockRecord, ConstKey, DefOrigin, GlobalEnv, IVarKey, MethodKey, ModuleDecl, NodeRecord, Registration,
};
use crate::error::Result;
use crate::graph::{Changes, ModuleId, NodeId, Owner, SiteKey, SiteKind, Type, VertexId};
use crate::sites::{
    CallSite, ConstReadSite, FormalArgs, GVarReadSite, IVarReadSite, MAsgnSite, MethodDeclSite,
    MethodDefSite, TypeReadSite,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    Toplevel,
    ModuleBody,
    Method,
    Block,
}

#[derive(Debug)]
struct Scope {
    kind: ScopeKind,
    owner: NodeId,
    self_ty: Type,
    vars: IndexMap<String, VertexId>,
    ret: Option<VertexId>,
    block_param: Option<VertexId>,
    returns: Vec<NodeId>,
}

impl Scope {
    fn new(kind: ScopeKind, owner: NodeId, self_ty: Type) -> Self {
        Self {
            kind,
            owner,
            self_ty,
            vars: IndexMap::new(),
            ret: None,
            block_param: None,
            returns: Vec::new(),
        }
    }
}

pub(crate) struct Installer<'a> {
    env: &'a mut GlobalEnv,
    path: Rc<str>,
    reuse: &'a HashMap<NodeId, NodeId>,
    scopes: Vec<Scope>,
    /// Lexical module nesting, innermost first
    cref: Rc<[ModuleId]>,
    pub(crate) reused: usize,
}

impl<'a> Installer<'a> {
    pub(crate) fn new(env: &'a mut GlobalEnv, path: Rc<str>, reuse: &'a HashMap<NodeId, NodeId>) -> Self {
        let object = env.core().object;
        Self {
            env,
            path,
            reuse,
            scopes: Vec::new(),
            cref: Rc::from(vec![object]),
            reused: 0,
        }
    }

    pub(crate) fn install(&mut self, node: &Node) -> Result<VertexId> {
        if let Some(&old) = self.reuse.get(&node.id) {
            return Ok(self.adopt(node, old));
        }
        self.env
            .nodes
            .insert(node.id, NodeRecord::new(Rc::clone(&self.path), node.span));
        let mut changes = Changes::default();
        let ret = self.install0(node, &mut changes)?;
        changes.reinstall(self.env, Owner::Node(node.id))?;
        if let Some(record) = self.env.nodes.get_mut(&node.id) {
            record.ret = Some(ret);
            record.name_span = node.name_span();
            record.changes = changes;
        }
        Ok(ret)
    }

    /// Moves the installed state of the old subtree paired with `node` onto it
    fn adopt(&mut self, node: &Node, old: NodeId) -> VertexId {
        let reuse = self.reuse;
        let mut moved: Vec<(NodeId, NodeId, &Node)> = Vec::new();
        node.walk(&mut |n| {
            if let Some(&old) = reuse.get(&n.id) {
                moved.push((n.id, old, n));
            }
        });
        let remap: HashMap<NodeId, NodeId> = moved.iter().map(|&(new, old, _)| (old, new)).collect();

        for (new, old, n) in moved {
            let Some(mut record) = self.env.nodes.remove(&old) else {
                continue;
            };
            record.path = Rc::clone(&self.path);
            record.span = n.span;
            record.name_span = n.name_span();
            for ret in &mut record.returns {
                if let Some(&to) = remap.get(ret) {
                    *ret = to;
                }
            }
            for &site in &record.sites {
                let slot = &mut self.env.sites[site.index()];
                slot.node = new;
                slot.changes.remap_nodes(&remap);
            }
            for &vtx in &record.vertices {
                self.env.vertices[vtx.index()].node = Some(new);
            }
            if let Some(block) = record.block.and_then(|b| self.env.block_mut(b)) {
                block.node = new;
            }
            for registration in &record.registrations {
                self.env
                    .rekey_registration(registration, DefOrigin::Node(old), DefOrigin::Node(new));
            }
            self.env.nodes.insert(new, record);
        }
        self.reused += 1;
        trace!(node = %node.id, %old, "reused unchanged definition");

        match self.env.nodes.get(&node.id).and_then(|r| r.ret) {
            Some(ret) => ret,
            None => self.env.empty_vertex(),
        }
    }

    fn record(&mut self, node: NodeId) -> Option<&mut NodeRecord> {
        self.env.nodes.get_mut(&node)
    }

    fn vertex(&mut self, node: NodeId, label: &'static str) -> VertexId {
        let vtx = self.env.new_vertex(label, Some(node));
        if let Some(record) = self.record(node) {
            record.vertices.push(vtx);
        }
        vtx
    }

    fn owned_source(&mut self, node: NodeId, ty: Type) -> VertexId {
        let vtx = self.env.new_source([ty], Some(node));
        if let Some(record) = self.record(node) {
            record.vertices.push(vtx);
        }
        vtx
    }

    fn register(&mut self, node: NodeId, registration: Registration) {
        if let Some(record) = self.record(node) {
            record.registrations.push(registration);
        }
    }

    fn nil(&mut self) -> VertexId {
        self.env.source(&[Type::Nil])
    }

    fn symbol(&mut self) -> VertexId {
        let symbol = self.env.core().symbol;
        self.env.source(&[Type::instance(symbol)])
    }

    fn module(&self) -> ModuleId {
        self.cref[0]
    }

    fn self_ty(&self) -> Type {
        match self.scopes.last() {
            Some(scope) => scope.self_ty.clone(),
            None => Type::instance(self.env.core().object),
        }
    }

    fn self_side(&self) -> (ModuleId, bool) {
        match self.self_ty() {
            Type::Singleton(module) => (module, true),
            Type::Instance { module, .. } => (module, false),
            _ => (self.module(), false),
        }
    }

    fn lookup_local(&self, name: &str) -> Option<VertexId> {
        for scope in self.scopes.iter().rev() {
            if let Some(&vtx) = scope.vars.get(name) {
                return Some(vtx);
            }
            if scope.kind != ScopeKind::Block {
                break;
            }
        }
        None
    }

    /// A new local in the innermost scope, owned by the scope's node
    fn define_local(&mut self, name: &str) -> VertexId {
        let Some(owner) = self.scopes.last().map(|s| s.owner) else {
            return self.env.empty_vertex();
        };
        let vtx = self.vertex(owner, "local");
        if let Some(scope) = self.scopes.last_mut() {
            scope.vars.insert(name.to_string(), vtx);
        }
        vtx
    }

    fn local(&mut self, name: &str) -> VertexId {
        match self.lookup_local(name) {
            Some(vtx) => vtx,
            None => self.define_local(name),
        }
    }

    /// The enclosing method scope, looking through blocks
    fn method_scope(&mut self) -> Option<&mut Scope> {
        for scope in self.scopes.iter_mut().rev() {
            match scope.kind {
                ScopeKind::Method => return Some(scope),
                ScopeKind::Block => continue,
                ScopeKind::Toplevel | ScopeKind::ModuleBody => return None,
            }
        }
        None
    }

    fn block_scope(&mut self) -> Option<&mut Scope> {
        self.scopes.last_mut().filter(|s| s.kind == ScopeKind::Block)
    }

    /// Installs statements in order and returns the last one with its value
    fn install_body(&mut self, body: &[Node]) -> Result<Option<(NodeId, VertexId)>> {
        let mut last = None;
        for stmt in body {
            let vtx = self.install(stmt)?;
            last = Some((stmt.id, vtx));
        }
        Ok(last)
    }

    /// Connects the implicit value of a body to `ret` and records it as a return point
    fn close_body(&mut self, body: &[Node], last: Option<(NodeId, VertexId)>, ret: VertexId, changes: &mut Changes) {
        let jumps = matches!(
            body.last().map(|n| &n.kind),
            Some(NodeKind::Return { .. }) | Some(NodeKind::Next { .. })
        );
        match last {
            Some(_) if jumps => {}
            Some((id, vtx)) => {
                changes.add_edge(vtx, ret);
                if let Some(scope) = self.scopes.last_mut() {
                    scope.returns.push(id);
                }
            }
            None => {
                let nil = self.nil();
                changes.add_edge(nil, ret);
            }
        }
    }

    fn value_or_nil(&mut self, value: Option<&Node>) -> Result<VertexId> {
        match value {
            Some(value) => self.install(value),
            None => Ok(self.nil()),
        }
    }

    fn install0(&mut self, node: &Node, changes: &mut Changes) -> Result<VertexId> {
        let id = node.id;
        let origin = DefOrigin::Node(id);
        match &node.kind {
            NodeKind::Program { body } => {
                let object = self.env.core().object;
                self.scopes
                    .push(Scope::new(ScopeKind::Toplevel, id, Type::instance(object)));
                let result = self.install_body(body);
                self.scopes.pop();
                match result? {
                    Some((_, vtx)) => Ok(vtx),
                    None => Ok(self.nil()),
                }
            }

            NodeKind::Module {
                cpath,
                type_params,
                body,
            } => self.install_module(node, cpath, false, None, type_params, body, changes),

            NodeKind::Class {
                cpath,
                superclass,
                type_params,
                body,
            } => self.install_module(node, cpath, true, superclass.clone(), type_params, body, changes),

            NodeKind::Def {
                name,
                singleton,
                params,
                body,
            } => {
                let module = self.module();
                let self_ty = if *singleton {
                    Type::Singleton(module)
                } else {
                    Type::instance(module)
                };
                let ret = self.vertex(id, "ret");
                let block = self.vertex(id, "block");
                let mut scope = Scope::new(ScopeKind::Method, id, self_ty);
                scope.ret = Some(ret);
                scope.block_param = Some(block);
                self.scopes.push(scope);
                let result = self.install_def(id, params, body, block, ret, changes);
                let scope = self.scopes.pop();
                let arg_vtxs = result?;
                let returns = scope.map(|s| s.returns).unwrap_or_default();
                if let Some(record) = self.record(id) {
                    record.returns = returns;
                }

                let formals = FormalArgs {
                    req: params.req.clone(),
                    opt: params.opt.iter().map(|o| o.name.clone()).collect(),
                    rest: params.rest.clone(),
                    post: params.post.clone(),
                    block: params.block.clone(),
                };
                changes.add_site(
                    SiteKey::new("method", 0),
                    id,
                    SiteKind::MethodDef(MethodDefSite {
                        module,
                        singleton: *singleton,
                        name: name.clone(),
                        formals: Rc::new(formals),
                        arg_vtxs: Rc::new(arg_vtxs),
                        block: Some(block),
                        ret,
                    }),
                );
                Ok(self.symbol())
            }

            NodeKind::Return { value } => {
                let vtx = self.value_or_nil(value.as_deref())?;
                if let Some(scope) = self.method_scope() {
                    if let Some(ret) = scope.ret {
                        changes.add_edge(vtx, ret);
                    }
                    scope.returns.push(id);
                }
                Ok(vtx)
            }

            NodeKind::Next { value } => {
                let vtx = self.value_or_nil(value.as_deref())?;
                if let Some(scope) = self.block_scope() {
                    if let Some(ret) = scope.ret {
                        changes.add_edge(vtx, ret);
                    }
                    scope.returns.push(id);
                }
                Ok(vtx)
            }

            NodeKind::Call {
                recv,
                name,
                args,
                keywords,
                block,
                subclasses,
                ..
            } => {
                let recv_vtx = match recv {
                    Some(recv) => self.install(recv)?,
                    None => {
                        let self_ty = self.self_ty();
                        self.env.source(&[self_ty])
                    }
                };
                let mut arg_vtxs = Vec::with_capacity(args.len());
                let mut splats = Vec::with_capacity(args.len());
                for arg in args {
                    arg_vtxs.push(self.install(&arg.value)?);
                    splats.push(arg.splat);
                }
                let keywords = match keywords {
                    Some(kw) => Some(self.install(kw)?),
                    None => None,
                };
                let block = match block {
                    Some(block) => Some(self.install(block)?),
                    None => None,
                };
                let ret = self.vertex(id, "call");
                let subclasses = subclasses
                    .unwrap_or(recv.is_none() && self.env.config().subclass_dispatch_for_self_calls);
                changes.add_site(
                    SiteKey::new("call", 0),
                    id,
                    SiteKind::Call(CallSite {
                        recv: recv_vtx,
                        name: name.clone(),
                        args: Rc::from(arg_vtxs),
                        splats: Rc::from(splats),
                        keywords,
                        block,
                        subclasses,
                        ret,
                    }),
                );
                Ok(ret)
            }

            NodeKind::Block { params, body } => {
                let ret = self.vertex(id, "block-ret");
                let mut scope = Scope::new(ScopeKind::Block, id, self.self_ty());
                scope.ret = Some(ret);
                self.scopes.push(scope);
                let params: Vec<VertexId> = params.iter().map(|p| self.define_local(p)).collect();
                let result = self.install_body(body);
                if let Ok(last) = &result {
                    self.close_body(body, *last, ret, changes);
                }
                let scope = self.scopes.pop();
                result?;

                let block = self.env.add_block(BlockRecord {
                    node: id,
                    params,
                    ret,
                });
                let returns = scope.map(|s| s.returns).unwrap_or_default();
                if let Some(record) = self.record(id) {
                    record.returns = returns;
                    record.block = Some(block);
                }
                Ok(self.owned_source(id, Type::Proc(block)))
            }

            NodeKind::Yield { args } => {
                let recv = match self.method_scope().and_then(|s| s.block_param) {
                    Some(vtx) => vtx,
                    None => self.env.empty_vertex(),
                };
                let mut arg_vtxs = Vec::with_capacity(args.len());
                let mut splats = Vec::with_capacity(args.len());
                for arg in args {
                    arg_vtxs.push(self.install(&arg.value)?);
                    splats.push(arg.splat);
                }
                let ret = self.vertex(id, "yield");
                changes.add_site(
                    SiteKey::new("yield", 0),
                    id,
                    SiteKind::Call(CallSite {
                        recv,
                        name: "call".to_string(),
                        args: Rc::from(arg_vtxs),
                        splats: Rc::from(splats),
                        keywords: None,
                        block: None,
                        subclasses: false,
                        ret,
                    }),
                );
                Ok(ret)
            }

            NodeKind::Const { name, scope } => {
                let scope = scope.as_ref().map(|path| self.env.resolve_cpath(path));
                let ret = self.vertex(id, "const");
                changes.add_site(
                    SiteKey::new("const", 0),
                    id,
                    SiteKind::ConstRead(ConstReadSite {
                        name: name.clone(),
                        scope,
                        cref: Rc::clone(&self.cref),
                        ret,
                    }),
                );
                Ok(ret)
            }

            NodeKind::ConstWrite { name, value } => {
                let vtx = self.install(value)?;
                let key = ConstKey::new(self.module(), name.clone());
                let cvtx = self.env.add_const_def(&key, origin);
                self.register(id, Registration::Const(key));
                changes.add_edge(vtx, cvtx);
                Ok(vtx)
            }

            NodeKind::LocalRead { name } => Ok(self.local(name)),

            NodeKind::LocalWrite { name, value } => {
                let vtx = self.install(value)?;
                let var = self.local(name);
                changes.add_edge(vtx, var);
                Ok(vtx)
            }

            NodeKind::IvarRead { name } => {
                let (module, singleton) = self.self_side();
                let proxy = self.vertex(id, "ivar-proxy");
                let ret = self.vertex(id, "ivar");
                changes.add_site(
                    SiteKey::new("ivar", 0),
                    id,
                    SiteKind::IVarRead(IVarReadSite {
                        module,
                        singleton,
                        name: name.clone(),
                        proxy,
                        ret,
                    }),
                );
                Ok(ret)
            }

            NodeKind::IvarWrite { name, value } => {
                let vtx = self.install(value)?;
                let ivar = self.define_ivar(id, name);
                changes.add_edge(vtx, ivar);
                Ok(vtx)
            }

            NodeKind::GvarRead { name } => {
                let ret = self.vertex(id, "gvar");
                changes.add_site(
                    SiteKey::new("gvar", 0),
                    id,
                    SiteKind::GVarRead(GVarReadSite {
                        name: name.clone(),
                        ret,
                    }),
                );
                Ok(ret)
            }

            NodeKind::GvarWrite { name, value } => {
                let vtx = self.install(value)?;
                let gvar = self.env.gvar_vertex(name);
                changes.add_edge(vtx, gvar);
                Ok(vtx)
            }

            NodeKind::MultiAssign { targets, value } => {
                let rhs = self.install(value)?;
                let mut lhss = Vec::with_capacity(targets.len());
                for target in targets {
                    let vtx = match target {
                        AssignTarget::Local { name } => self.local(name),
                        AssignTarget::Ivar { name } => self.define_ivar(id, name),
                        AssignTarget::Gvar { name } => self.env.gvar_vertex(name),
                    };
                    lhss.push(vtx);
                }
                changes.add_site(
                    SiteKey::new("masgn", 0),
                    id,
                    SiteKind::MAsgn(MAsgnSite {
                        rhs,
                        lhss: Rc::from(lhss),
                    }),
                );
                Ok(rhs)
            }

            NodeKind::If {
                cond,
                then_body,
                else_body,
            } => {
                self.install(cond)?;
                let then_vtx = match self.install_body(then_body)? {
                    Some((_, vtx)) => vtx,
                    None => self.nil(),
                };
                let else_vtx = match self.install_body(else_body)? {
                    Some((_, vtx)) => vtx,
                    None => self.nil(),
                };
                let ret = self.vertex(id, "if");
                changes.add_edge(then_vtx, ret);
                changes.add_edge(else_vtx, ret);
                Ok(ret)
            }

            NodeKind::SelfRef => {
                let self_ty = self.self_ty();
                Ok(self.env.source(&[self_ty]))
            }
            NodeKind::Nil => Ok(self.nil()),
            NodeKind::True => Ok(self.env.source(&[Type::True])),
            NodeKind::False => Ok(self.env.source(&[Type::False])),
            NodeKind::Int { .. } => {
                let integer = self.env.core().integer;
                Ok(self.env.source(&[Type::instance(integer)]))
            }
            NodeKind::Float { .. } => {
                let float = self.env.core().float;
                Ok(self.env.source(&[Type::instance(float)]))
            }
            NodeKind::Str { .. } => {
                let string = self.env.core().string;
                Ok(self.env.source(&[Type::instance(string)]))
            }
            NodeKind::Sym { .. } => Ok(self.symbol()),

            NodeKind::Array { elems } => {
                let mut vtxs = Vec::with_capacity(elems.len());
                for elem in elems {
                    vtxs.push(self.install(elem)?);
                }
                let elem = self.vertex(id, "array-elem");
                for &vtx in &vtxs {
                    changes.add_edge(vtx, elem);
                }
                Ok(self.owned_source(
                    id,
                    Type::Array {
                        elems: Some(vtxs),
                        elem,
                    },
                ))
            }

            NodeKind::Alias { new_name, old_name } => {
                let key = MethodKey::new(self.module(), false, new_name.clone());
                self.env.add_alias(&key, origin, old_name.clone());
                self.register(id, Registration::Alias(key));
                Ok(self.nil())
            }

            NodeKind::Include { cpath, args } => {
                let module = self.module();
                let target = self.env.resolve_cpath(cpath);
                self.env.add_include(module, origin, target, args.clone());
                self.register(id, Registration::Include { module, target });
                Ok(self.nil())
            }

            NodeKind::SigDef {
                name,
                singleton,
                overloads,
                overloading,
            } => {
                changes.add_site(
                    SiteKey::new("decl", 0),
                    id,
                    SiteKind::MethodDecl(MethodDeclSite {
                        module: self.module(),
                        singleton: *singleton,
                        name: name.clone(),
                        method_types: Rc::from(overloads.clone()),
                        overloading: *overloading,
                    }),
                );
                Ok(self.symbol())
            }

            NodeKind::SigConst { name, ty } => {
                let key = ConstKey::new(self.module(), name.clone());
                let cvtx = self.env.add_const_def(&key, origin);
                self.register(id, Registration::Const(key));
                let ret = self.vertex(id, "sig-const");
                changes.add_site(
                    SiteKey::new("type", 0),
                    id,
                    SiteKind::TypeRead(TypeReadSite { ty: ty.clone(), ret }),
                );
                changes.add_edge(ret, cvtx);
                Ok(ret)
            }

            NodeKind::SigGvar { name, ty } => {
                let ret = self.vertex(id, "sig-gvar");
                changes.add_site(
                    SiteKey::new("type", 0),
                    id,
                    SiteKind::TypeRead(TypeReadSite { ty: ty.clone(), ret }),
                );
                let gvar = self.env.gvar_vertex(name);
                changes.add_edge(ret, gvar);
                Ok(ret)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn install_module(
        &mut self,
        node: &Node,
        cpath: &[String],
        is_class: bool,
        superclass: Option<super::SuperclassRef>,
        type_params: &[String],
        body: &[Node],
        changes: &mut Changes,
    ) -> Result<VertexId> {
        let id = node.id;
        let origin = DefOrigin::Node(id);
        let outer = self.module();
        let cpath: Vec<String> = if outer == self.env.core().object {
            cpath.to_vec()
        } else {
            self.env.module(outer).cpath().iter().chain(cpath).cloned().collect()
        };
        let module = self.env.resolve_cpath(&cpath);
        self.env.add_module_decl(
            module,
            origin,
            ModuleDecl {
                is_class,
                superclass,
                type_params: type_params.to_vec(),
            },
        );
        self.register(id, Registration::Module(module));

        if let Some((name, parent)) = cpath.split_last() {
            let parent = self.env.resolve_cpath(parent);
            let key = ConstKey::new(parent, name.clone());
            let cvtx = self.env.add_const_def(&key, origin);
            self.register(id, Registration::Const(key));
            let singleton = self.env.source(&[Type::Singleton(module)]);
            changes.add_edge(singleton, cvtx);
        }

        let cref: Rc<[ModuleId]> = std::iter::once(module).chain(self.cref.iter().copied()).collect();
        let saved = mem::replace(&mut self.cref, cref);
        self.scopes
            .push(Scope::new(ScopeKind::ModuleBody, id, Type::Singleton(module)));
        let result = self.install_body(body);
        self.scopes.pop();
        self.cref = saved;
        match result? {
            Some((_, vtx)) => Ok(vtx),
            None => Ok(self.nil()),
        }
    }

    fn install_def(
        &mut self,
        id: NodeId,
        params: &Params,
        body: &[Node],
        block: VertexId,
        ret: VertexId,
        changes: &mut Changes,
    ) -> Result<IndexMap<String, VertexId>> {
        let mut arg_vtxs = IndexMap::new();
        for name in &params.req {
            let vtx = self.define_local(name);
            arg_vtxs.insert(name.clone(), vtx);
        }
        for opt in &params.opt {
            let vtx = self.define_local(&opt.name);
            arg_vtxs.insert(opt.name.clone(), vtx);
            let default = self.install(&opt.default)?;
            changes.add_edge(default, vtx);
        }
        if let Some(name) = &params.rest {
            let elem = self.vertex(id, "rest");
            let local = self.define_local(name);
            let array = self.env.core().array;
            let src = self.owned_source(
                id,
                Type::Instance {
                    module: array,
                    args: vec![elem],
                },
            );
            changes.add_edge(src, local);
            arg_vtxs.insert(name.clone(), elem);
        }
        for name in &params.post {
            let vtx = self.define_local(name);
            arg_vtxs.insert(name.clone(), vtx);
        }
        if let Some(name) = &params.block {
            if let Some(scope) = self.scopes.last_mut() {
                scope.vars.insert(name.clone(), block);
            }
        }

        let last = self.install_body(body)?;
        self.close_body(body, last, ret, changes);
        Ok(arg_vtxs)
    }

    fn define_ivar(&mut self, node: NodeId, name: &str) -> VertexId {
        let (module, singleton) = self.self_side();
        let key = IVarKey {
            module,
            singleton,
            name: name.to_string(),
        };
        let vtx = self.env.add_ivar_def(&key, DefOrigin::Node(node));
        self.register(node, Registration::IVar(key));
        vtx
    }
}

/// Tears down every node of `tree` that was not moved to a newer tree
pub(crate) fn uninstall_tree(env: &mut GlobalEnv, tree: &Node) -> Result<()> {
    let mut ids = Vec::new();
    tree.walk(&mut |n| ids.push(n.id));
    for id in ids.into_iter().rev() {
        uninstall_node(env, id)?;
    }
    Ok(())
}

fn uninstall_node(env: &mut GlobalEnv, id: NodeId) -> Result<()> {
    let Some(mut record) = env.nodes.remove(&id) else {
        return Ok(());
    };
    record.changes.discard_pending();
    record.changes.reinstall(env, Owner::Node(id))?;
    for site in record.sites.iter().copied().collect::<Vec<_>>() {
        env.destroy_site(site)?;
    }
    let origin = DefOrigin::Node(id);
    for registration in record.registrations.iter().rev() {
        env.unregister(registration, origin);
    }
    if let Some(block) = record.block {
        env.remove_block(block);
    }
    for vtx in record.vertices {
        env.destroy_vertex(vtx);
    }
    Ok(())
}
