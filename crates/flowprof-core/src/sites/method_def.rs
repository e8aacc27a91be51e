use indexmap::IndexMap;
use std::rc::Rc;
use tracing::error;

use super::args::{arity_message, get_rest_args};
use crate::diagnostic::{Diagnostic, DiagnosticKind};
use crate::env::{GlobalEnv, MethodKey};
use crate::error::{EngineError, Result};
use crate::graph::{strip_parens as strip, Changes, ModuleId, NodeId, SiteId, SiteKey, SiteKind, Type, VertexId};
use crate::signature::default_param_map;
use crate::sites::CheckReturnSite;

/// Positional parameter names of a method body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormalArgs {
    pub req: Vec<String>,
    pub opt: Vec<String>,
    pub rest: Option<String>,
    pub post: Vec<String>,
    pub block: Option<String>,
}

impl FormalArgs {
    fn positional_names(&self) -> impl Iterator<Item = &String> {
        self.req
            .iter()
            .chain(&self.opt)
            .chain(self.rest.iter())
            .chain(&self.post)
    }
}

/// A method body. Parameters flow from callers, the body's value flows to `ret`.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDefSite {
    pub module: ModuleId,
    pub singleton: bool,
    pub name: String,
    pub formals: Rc<FormalArgs>,
    pub arg_vtxs: Rc<IndexMap<String, VertexId>>,
    pub block: Option<VertexId>,
    pub ret: VertexId,
}

impl MethodDefSite {
    pub fn key(&self) -> MethodKey {
        MethodKey::new(self.module, self.singleton, self.name.clone())
    }

    pub(crate) fn on_install(&self, env: &mut GlobalEnv, id: SiteId) -> Result<()> {
        if let Some(param) = self
            .formals
            .positional_names()
            .find(|name| !self.arg_vtxs.contains_key(*name))
        {
            let method = env.show_method_key(&self.key());
            error!(%method, %param, "formal parameter has no vertex");
            return Err(EngineError::MalformedFormals {
                method,
                param: param.clone(),
            });
        }
        env.add_method_def(&self.key(), id);
        Ok(())
    }

    pub(crate) fn on_uninstall(&self, env: &mut GlobalEnv, id: SiteId) -> Result<()> {
        env.remove_method_def(&self.key(), id);
        Ok(())
    }

    /// Binds the parameters from the first declared overload and checks the
    /// body's value against its return type
    pub(crate) fn run0(&self, env: &mut GlobalEnv, node: NodeId, changes: &mut Changes) -> Result<()> {
        let key = self.key();
        let Some(decl_id) = env.method_entity(&key).and_then(|me| me.decls().next()) else {
            return Ok(());
        };
        let kind = env.site_kind(decl_id);
        let SiteKind::MethodDecl(decl) = &*kind else {
            return Ok(());
        };
        let Some(mt) = decl.method_types.first() else {
            return Ok(());
        };

        let self_ty = if self.singleton {
            Type::Singleton(self.module)
        } else {
            Type::instance(self.module)
        };
        let map = default_param_map(env, changes, &self_ty);

        let mut args = Vec::new();
        for ty in mt.req.iter().chain(&mt.opt) {
            args.push(ty.get_vertex(env, changes, &map)?);
        }
        let mut splats = vec![false; args.len()];
        if let Some(rest) = &mt.rest {
            let elem = rest.get_vertex(env, changes, &map)?;
            let array = Type::Instance {
                module: env.core().array,
                args: vec![elem],
            };
            args.push(changes.fresh_source(env, "rest", vec![array]));
            splats.push(true);
        }
        for ty in &mt.post {
            args.push(ty.get_vertex(env, changes, &map)?);
            splats.push(false);
        }

        if self.pass_positionals(env, changes, None, &args, &splats) {
            let f_ret = mt.ret.get_vertex(env, changes, &map)?;
            changes.add_site(
                SiteKey::new("check-return", 0),
                node,
                SiteKind::CheckReturn(CheckReturnSite {
                    a_ret: self.ret,
                    f_ret,
                }),
            );
        }
        Ok(())
    }

    fn param(&self, name: &str) -> Option<VertexId> {
        self.arg_vtxs.get(name).copied()
    }

    fn bind(&self, changes: &mut Changes, actual: VertexId, name: &str) {
        if let Some(formal) = self.param(name) {
            changes.add_edge(actual, formal);
        }
    }

    /// Binds actual positional arguments to the parameters. On an arity
    /// mismatch nothing is bound, and a diagnostic is reported at `call_node`
    /// when there is one.
    pub(crate) fn pass_positionals(
        &self,
        env: &mut GlobalEnv,
        changes: &mut Changes,
        call_node: Option<NodeId>,
        args: &[VertexId],
        splats: &[bool],
    ) -> bool {
        let f = &*self.formals;
        let lower = f.req.len() + f.post.len();
        let upper = f.rest.is_none().then_some(lower + f.opt.len());

        let report = |changes: &mut Changes| {
            if let Some(node) = call_node {
                changes.add_diagnostic(Diagnostic::new(
                    node,
                    DiagnosticKind::WrongArity,
                    arity_message(args.len(), lower, upper),
                ));
            }
        };

        let first_splat = splats.iter().position(|&s| s);
        let last_splat = splats.iter().rposition(|&s| s);
        if let (Some(first_splat), Some(last_splat)) = (first_splat, last_splat) {
            if upper.is_some_and(|upper| upper < args.len()) {
                report(changes);
                return false;
            }
            let start = first_splat.min(f.req.len() + f.opt.len());
            let end = (last_splat + 1).max(args.len().saturating_sub(f.post.len()));
            let rest = get_rest_args(env, changes, start, end, args, splats);

            for (i, name) in f.req.iter().chain(&f.opt).enumerate() {
                if i < start {
                    self.bind(changes, args[i], name);
                } else {
                    for &vtx in &rest {
                        self.bind(changes, vtx, name);
                    }
                }
            }
            for (i, name) in f.post.iter().enumerate() {
                match (args.len() + i).checked_sub(f.post.len()) {
                    Some(idx) if end <= idx => self.bind(changes, args[idx], name),
                    _ => {
                        for &vtx in &rest {
                            self.bind(changes, vtx, name);
                        }
                    }
                }
            }
            if let Some(name) = &f.rest {
                for &vtx in &rest {
                    self.bind(changes, vtx, name);
                }
            }
            return true;
        }

        let actual = args.len();
        if actual < lower || upper.is_some_and(|upper| upper < actual) {
            report(changes);
            return false;
        }
        for (i, name) in f.req.iter().enumerate() {
            self.bind(changes, args[i], name);
        }
        let post_start = actual - f.post.len();
        for (i, name) in f.post.iter().enumerate() {
            self.bind(changes, args[post_start + i], name);
        }
        let mut i = f.req.len();
        for name in &f.opt {
            if i >= post_start {
                break;
            }
            self.bind(changes, args[i], name);
            i += 1;
        }
        if let Some(name) = &f.rest {
            for &vtx in &args[i..post_start] {
                self.bind(changes, vtx, name);
            }
        }
        true
    }

    /// Connects one call to this body
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn call(
        &self,
        env: &mut GlobalEnv,
        changes: &mut Changes,
        call_node: NodeId,
        args: &[VertexId],
        splats: &[bool],
        block: Option<VertexId>,
        ret: VertexId,
    ) {
        if self.pass_positionals(env, changes, Some(call_node), args, splats) {
            if let (Some(actual), Some(formal)) = (block, self.block) {
                changes.add_edge(actual, formal);
            }
            changes.add_edge(self.ret, ret);
        }
    }

    /// Renders the inferred signature, such as `(Integer, ?String) -> bool`
    pub fn show(&self, env: &GlobalEnv) -> String {
        let f = &*self.formals;
        let show = |name: &str| match self.param(name) {
            Some(vtx) => strip(&env.show_vertex(vtx)).to_string(),
            None => "untyped".to_string(),
        };
        let mut params: Vec<String> = f.req.iter().map(|n| show(n)).collect();
        params.extend(f.opt.iter().map(|n| format!("?{}", show(n))));
        params.extend(f.rest.iter().map(|n| format!("*{}", show(n))));
        params.extend(f.post.iter().map(|n| show(n)));

        let mut parts = Vec::new();
        if !params.is_empty() {
            parts.push(format!("({})", params.join(", ")));
        }
        if let Some(block) = self.block {
            let mut blocks: Vec<String> = env
                .vertex(block)
                .types()
                .filter_map(|ty| match ty {
                    Type::Proc(id) => env.block(*id),
                    _ => None,
                })
                .map(|record| {
                    let params: Vec<String> = record
                        .params
                        .iter()
                        .map(|&p| strip(&env.show_vertex(p)).to_string())
                        .collect();
                    format!("{{ ({}) -> {} }}", params.join(", "), env.show_vertex(record.ret))
                })
                .collect();
            blocks.sort();
            blocks.dedup();
            if !blocks.is_empty() {
                parts.push(blocks.join(" | "));
            }
        }
        parts.push(format!("-> {}", env.show_vertex(self.ret)));
        parts.join(" ")
    }
}
