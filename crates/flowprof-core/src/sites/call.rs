use indexmap::IndexSet;
use std::collections::HashSet;
use std::rc::Rc;
use tracing::warn;

use crate::builtin::CallInfo;
use crate::diagnostic::{Diagnostic, DiagnosticKind};
use crate::env::{GlobalEnv, MethodKey};
use crate::error::Result;
use crate::graph::{Changes, ModuleId, NodeId, SiteId, SiteKind, Type, VertexId};
use crate::signature::{default_param_map, ParamMap, SigType};

/// A method call `recv.name(args) { block }`
#[derive(Debug, Clone, PartialEq)]
pub struct CallSite {
    pub recv: VertexId,
    pub name: String,
    pub args: Rc<[VertexId]>,
    pub splats: Rc<[bool]>,
    pub keywords: Option<VertexId>,
    pub block: Option<VertexId>,
    /// Also call overriding definitions in subclasses of the receiver
    pub subclasses: bool,
    pub ret: VertexId,
}

/// Outcome of looking a method up for one receiver type
#[derive(Debug)]
struct Resolution {
    recv_ty: Type,
    method: Option<MethodKey>,
    param_map: ParamMap,
}

impl CallSite {
    pub(crate) fn run0(&self, env: &mut GlobalEnv, _id: SiteId, node: NodeId, changes: &mut Changes) -> Result<()> {
        let mut called: IndexSet<SiteId> = IndexSet::new();

        for res in self.resolve(env, changes)? {
            let Some(key) = res.method else {
                let message = format!("undefined method: {}#{}", env.show_type(&res.recv_ty), self.name);
                changes.add_diagnostic(Diagnostic::new(node, DiagnosticKind::UndefinedMethod, message));
                continue;
            };
            self.dispatch(env, changes, node, &res.recv_ty, &key, &res.param_map, &mut called)?;
        }

        if self.subclasses {
            for key in self.resolve_subclasses(env, changes) {
                let defs: Vec<SiteId> = env
                    .method_entity(&key)
                    .map(|me| me.defs().collect())
                    .unwrap_or_default();
                for def in defs {
                    if called.insert(def) {
                        self.call_def(env, changes, node, def);
                    }
                }
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn dispatch(
        &self,
        env: &mut GlobalEnv,
        changes: &mut Changes,
        node: NodeId,
        recv_ty: &Type,
        key: &MethodKey,
        param_map: &ParamMap,
        called: &mut IndexSet<SiteId>,
    ) -> Result<()> {
        let Some(me) = env.method_entity(key) else {
            return Ok(());
        };
        let builtin = me.builtin.clone();
        let decls: Vec<SiteId> = me.decls().collect();
        let defs: Vec<SiteId> = me.defs().collect();

        if let Some(hook) = builtin {
            let info = CallInfo {
                node,
                recv_ty,
                args: &self.args,
                splats: &self.splats,
                keywords: self.keywords,
                block: self.block,
                ret: self.ret,
            };
            hook.call(env, changes, &info)?;
        } else if !decls.is_empty() {
            for decl in decls {
                let kind = env.site_kind(decl);
                if let SiteKind::MethodDecl(decl) = &*kind {
                    decl.resolve_overloads(
                        env,
                        changes,
                        node,
                        param_map,
                        &self.args,
                        &self.splats,
                        self.block,
                        self.ret,
                    )?;
                }
            }
        } else {
            for def in defs {
                if called.insert(def) {
                    self.call_def(env, changes, node, def);
                }
            }
        }
        Ok(())
    }

    fn call_def(&self, env: &mut GlobalEnv, changes: &mut Changes, node: NodeId, def: SiteId) {
        let kind = env.site_kind(def);
        if let SiteKind::MethodDef(def) = &*kind {
            def.call(env, changes, node, &self.args, &self.splats, self.block, self.ret);
        }
    }

    /// Looks the method up for every receiver type. Receivers of unknown
    /// type are skipped.
    fn resolve(&self, env: &mut GlobalEnv, changes: &mut Changes) -> Result<Vec<Resolution>> {
        let recv_types: Vec<Type> = env.vertex(self.recv).types().cloned().collect();
        let mut out = Vec::new();

        for recv_ty in recv_types {
            let Some(base) = env.base_type(&recv_ty) else {
                continue;
            };
            let (module, singleton, type_args) = match &base {
                Type::Instance { module, args } => (*module, false, args.clone()),
                Type::Singleton(module) => (*module, true, Vec::new()),
                _ => continue,
            };

            let mut param_map = default_param_map(env, changes, &recv_ty);
            let params = env.module(module).type_params().to_vec();
            for (param, arg) in params.into_iter().zip(type_args) {
                param_map.insert(param, arg);
            }

            let mut name = self.name.clone();
            let mut method = None;
            let mut seen = HashSet::new();
            let mut cur = Some((module, singleton));
            while let Some((m, s)) = cur {
                if !seen.insert((m, s)) {
                    break;
                }
                let key = self.lookup_own(env, changes, m, s, &mut name);
                if env.method_entity(&key).is_some_and(|me| me.exists()) {
                    method = Some(key);
                    break;
                }

                if !s {
                    let mut visiting = HashSet::new();
                    if let Some((key, map)) =
                        self.resolve_included(env, changes, &recv_ty, m, &mut name, &param_map, &mut visiting)?
                    {
                        method = Some(key);
                        param_map = map;
                        break;
                    }
                }

                let next = env.get_superclass(m, s);
                if let Some((sup, _)) = next {
                    let sup_params = env.module(sup).type_params().to_vec();
                    if !sup_params.is_empty() {
                        let sup_args = env.module(m).superclass_args.clone();
                        let mut map = default_param_map(env, changes, &recv_ty);
                        for (i, param) in sup_params.into_iter().enumerate() {
                            let vtx = match sup_args.get(i) {
                                Some(arg) => arg.get_vertex(env, changes, &param_map)?,
                                None => env.empty_vertex(),
                            };
                            map.insert(param, vtx);
                        }
                        param_map = map;
                    }
                }
                cur = next;
            }

            out.push(Resolution {
                recv_ty,
                method,
                param_map,
            });
        }
        Ok(out)
    }

    /// Looks `name` up on one module side, following aliases. Records a
    /// dependency on every entity consulted and returns the final key.
    fn lookup_own(
        &self,
        env: &mut GlobalEnv,
        changes: &mut Changes,
        module: ModuleId,
        singleton: bool,
        name: &mut String,
    ) -> MethodKey {
        let mut redirected = HashSet::new();
        loop {
            let key = MethodKey::new(module, singleton, name.clone());
            env.ensure_method_entity(&key);
            changes.add_depended_method_entity(key.clone());
            let target = env
                .method_entity(&key)
                .and_then(|me| me.alias_target().map(str::to_string));
            match target {
                Some(target) if redirected.insert(name.clone()) => *name = target,
                Some(_) => {
                    warn!(method = %env.show_method_key(&key), "alias cycle; lookup stops here");
                    return key;
                }
                None => return key,
            }
        }
    }

    /// Searches the modules included into `module`, the last included first,
    /// and the modules they include in turn
    #[allow(clippy::too_many_arguments)]
    fn resolve_included(
        &self,
        env: &mut GlobalEnv,
        changes: &mut Changes,
        recv_ty: &Type,
        module: ModuleId,
        name: &mut String,
        param_map: &ParamMap,
        visiting: &mut HashSet<ModuleId>,
    ) -> Result<Option<(MethodKey, ParamMap)>> {
        if !visiting.insert(module) {
            return Ok(None);
        }
        let includes: Vec<(ModuleId, Vec<SigType>)> = env
            .module(module)
            .includes
            .iter()
            .rev()
            .map(|(&(_, target), args)| (target, args.clone()))
            .collect();

        for (inc, args) in includes {
            let mut map = default_param_map(env, changes, recv_ty);
            let params = env.module(inc).type_params().to_vec();
            for (i, param) in params.into_iter().enumerate() {
                let vtx = match args.get(i) {
                    Some(arg) => arg.get_vertex(env, changes, param_map)?,
                    None => env.empty_vertex(),
                };
                map.insert(param, vtx);
            }

            let key = self.lookup_own(env, changes, inc, false, name);
            if env.method_entity(&key).is_some_and(|me| me.exists()) {
                return Ok(Some((key, map)));
            }
            if let Some(found) = self.resolve_included(env, changes, recv_ty, inc, name, &map, visiting)? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    /// Overriding definitions of the method in strict descendants of each receiver class
    fn resolve_subclasses(&self, env: &mut GlobalEnv, changes: &mut Changes) -> Vec<MethodKey> {
        let recv_types: Vec<Type> = env.vertex(self.recv).types().cloned().collect();
        let mut out = Vec::new();
        for recv_ty in recv_types {
            let (module, singleton) = match env.base_type(&recv_ty) {
                Some(Type::Instance { module, .. }) => (module, false),
                Some(Type::Singleton(module)) => (module, true),
                _ => continue,
            };
            for sub in env.descendants(module).into_iter().skip(1) {
                let key = MethodKey::new(sub, singleton, self.name.clone());
                env.ensure_method_entity(&key);
                changes.add_depended_method_entity(key.clone());
                if env.method_entity(&key).is_some_and(|me| me.exists()) {
                    out.push(key);
                }
            }
        }
        out
    }
}
