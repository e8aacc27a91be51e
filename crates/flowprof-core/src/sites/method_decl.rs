use std::rc::Rc;

use super::args::get_rest_args;
use crate::diagnostic::{Diagnostic, DiagnosticKind};
use crate::env::{GlobalEnv, MethodKey};
use crate::error::Result;
use crate::graph::{BlockId, Changes, ModuleId, NodeId, SiteId, SiteKey, SiteKind, Type, VertexId};
use crate::signature::{MethodType, ParamMap};
use crate::sites::CheckReturnSite;

/// A declared method signature with one or more overloads
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDeclSite {
    pub module: ModuleId,
    pub singleton: bool,
    pub name: String,
    pub method_types: Rc<[MethodType]>,
    pub overloading: bool,
}

impl MethodDeclSite {
    pub fn key(&self) -> MethodKey {
        MethodKey::new(self.module, self.singleton, self.name.clone())
    }

    pub(crate) fn on_install(&self, env: &mut GlobalEnv, id: SiteId) -> Result<()> {
        env.add_method_decl(&self.key(), id);
        Ok(())
    }

    pub(crate) fn on_uninstall(&self, env: &mut GlobalEnv, id: SiteId) -> Result<()> {
        env.remove_method_decl(&self.key(), id);
        Ok(())
    }

    /// Applies every overload the call matches; the result receives the
    /// return types of all of them
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn resolve_overloads(
        &self,
        env: &mut GlobalEnv,
        changes: &mut Changes,
        node: NodeId,
        param_map: &ParamMap,
        args: &[VertexId],
        splats: &[bool],
        block: Option<VertexId>,
        ret: VertexId,
    ) -> Result<()> {
        let mut matched = false;
        for mt in self.method_types.iter() {
            let mut map = param_map.clone();
            let mut vars = Vec::new();
            for name in &mt.type_params {
                let vtx = changes.fresh_vertex(env, "type-var");
                let holder = changes.fresh_source(
                    env,
                    "type-var-holder",
                    vec![Type::Var {
                        name: name.clone(),
                        vtx,
                    }],
                );
                map.insert(name.clone(), holder);
                vars.push((name.clone(), vtx));
            }

            if !match_arguments(env, changes, &map, args, splats, mt)? {
                continue;
            }
            if mt.block.is_some() != block.is_some() {
                continue;
            }
            if let (Some(block_ty), Some(block)) = (&mt.block, block) {
                let procs: Vec<BlockId> = env
                    .vertex(block)
                    .types()
                    .filter_map(|ty| match ty {
                        Type::Proc(id) => Some(*id),
                        _ => None,
                    })
                    .collect();
                for id in procs {
                    let Some(record) = env.block(id).cloned() else {
                        continue;
                    };
                    let f_ret = block_ty.ret.get_vertex(env, changes, &map)?;
                    changes.add_site(
                        SiteKey::new("block-return", id.0),
                        record.node,
                        SiteKind::CheckReturn(CheckReturnSite {
                            a_ret: record.ret,
                            f_ret,
                        }),
                    );
                    if block_ty.req.len() == record.params.len() {
                        for (ty, &param) in block_ty.req.iter().zip(&record.params) {
                            let vtx = ty.get_vertex(env, changes, &map)?;
                            changes.add_edge(vtx, param);
                        }
                    }
                }
            }

            for (name, vtx) in vars {
                map.insert(name, vtx);
            }
            let ret_vtx = mt.ret.get_vertex(env, changes, &map)?;
            changes.add_edge(ret_vtx, ret);
            matched = true;
        }

        if !matched {
            changes.add_diagnostic(Diagnostic::new(
                node,
                DiagnosticKind::UnresolvedOverload,
                "failed to resolve overloads",
            ));
        }
        Ok(())
    }
}

/// Whether the actual arguments fit one overload, by count and by type
pub(crate) fn match_arguments(
    env: &mut GlobalEnv,
    changes: &mut Changes,
    map: &ParamMap,
    args: &[VertexId],
    splats: &[bool],
    mt: &MethodType,
) -> Result<bool> {
    if splats.iter().any(|&s| s) {
        if mt.rest.is_none() {
            return Ok(false);
        }
        if splats.iter().take(mt.req.len()).any(|&s| s) {
            return Ok(false);
        }
        if splats.iter().rev().take(mt.post.len()).any(|&s| s) {
            return Ok(false);
        }
    } else {
        let required = mt.req.len() + mt.post.len();
        if args.len() < required {
            return Ok(false);
        }
        if mt.rest.is_none() && args.len() > required + mt.opt.len() {
            return Ok(false);
        }
    }

    for (i, ty) in mt.req.iter().enumerate() {
        let Some(&actual) = args.get(i) else {
            return Ok(false);
        };
        let formal = ty.get_vertex(env, changes, map)?;
        if !env.check_match(changes, actual, formal) {
            return Ok(false);
        }
    }
    let Some(post_start) = args.len().checked_sub(mt.post.len()) else {
        return Ok(false);
    };
    for (i, ty) in mt.post.iter().enumerate() {
        let formal = ty.get_vertex(env, changes, map)?;
        if !env.check_match(changes, args[post_start + i], formal) {
            return Ok(false);
        }
    }

    let mut start = mt.req.len();
    let end = post_start;
    let mut opt = mt.opt.iter();
    while start < end && !splats.get(start).copied().unwrap_or(false) {
        let Some(ty) = opt.next() else { break };
        let formal = ty.get_vertex(env, changes, map)?;
        if !env.check_match(changes, args[start], formal) {
            return Ok(false);
        }
        start += 1;
    }
    if start < end {
        let rest = get_rest_args(env, changes, start, end, args, splats);
        for ty in opt {
            let formal = ty.get_vertex(env, changes, map)?;
            for &actual in &rest {
                if !env.check_match(changes, actual, formal) {
                    return Ok(false);
                }
            }
        }
        if let Some(ty) = &mt.rest {
            let formal = ty.get_vertex(env, changes, map)?;
            for &actual in &rest {
                if !env.check_match(changes, actual, formal) {
                    return Ok(false);
                }
            }
        }
    }
    Ok(true)
}
