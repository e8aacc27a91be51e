use indexmap::{IndexMap, IndexSet};
use std::collections::HashSet;
use tracing::debug;

use super::{ConstEntity, DefOrigin, GlobalEnv, IVarEntity, MethodEntity};
use crate::ast::SuperclassRef;
use crate::graph::{ModuleId, SiteId};
use crate::signature::SigType;

/// One declaration of a module or class, from a definition in source or a builtin
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleDecl {
    pub is_class: bool,
    pub superclass: Option<SuperclassRef>,
    pub type_params: Vec<String>,
}

#[derive(Debug, Default)]
pub struct ModuleEntity {
    pub(crate) cpath: Vec<String>,
    pub(crate) decls: IndexMap<DefOrigin, ModuleDecl>,
    pub(crate) superclass: Option<ModuleId>,
    pub(crate) superclass_args: Vec<SigType>,
    pub(crate) type_params: Vec<String>,
    pub(crate) includes: IndexMap<(DefOrigin, ModuleId), Vec<SigType>>,
    pub(crate) subclasses: IndexSet<ModuleId>,
    /// Instance side at index 0, singleton side at index 1
    pub(crate) methods: [IndexMap<String, MethodEntity>; 2],
    pub(crate) ivars: [IndexMap<String, IVarEntity>; 2],
    pub(crate) consts: IndexMap<String, ConstEntity>,
    pub(crate) subclass_checks: IndexSet<SiteId>,
    pub(crate) ivar_reads: IndexSet<SiteId>,
}

impl ModuleEntity {
    fn new(cpath: Vec<String>) -> Self {
        Self {
            cpath,
            ..Self::default()
        }
    }

    pub fn cpath(&self) -> &[String] {
        &self.cpath
    }

    pub fn exists(&self) -> bool {
        !self.decls.is_empty()
    }

    /// Modules without any declaration are treated as classes
    pub fn is_class(&self) -> bool {
        self.decls.values().next().map_or(true, |d| d.is_class)
    }

    pub fn superclass(&self) -> Option<ModuleId> {
        self.superclass
    }

    pub fn type_params(&self) -> &[String] {
        &self.type_params
    }

    /// Included modules in inclusion order
    pub fn included_modules(&self) -> impl DoubleEndedIterator<Item = ModuleId> + '_ {
        self.includes.keys().map(|&(_, module)| module)
    }

    pub fn subclasses(&self) -> impl Iterator<Item = ModuleId> + '_ {
        self.subclasses.iter().copied()
    }
}

impl GlobalEnv {
    pub fn module(&self, id: ModuleId) -> &ModuleEntity {
        &self.modules[id.index()]
    }

    pub(crate) fn module_mut(&mut self, id: ModuleId) -> &mut ModuleEntity {
        &mut self.modules[id.index()]
    }

    pub fn module_name(&self, id: ModuleId) -> String {
        self.module(id).cpath.join("::")
    }

    pub fn find_cpath<S: AsRef<str>>(&self, cpath: &[S]) -> Option<ModuleId> {
        if cpath.is_empty() {
            return Some(self.core().object);
        }
        let key: Vec<String> = cpath.iter().map(|s| s.as_ref().to_string()).collect();
        self.module_index.get(&key).copied()
    }

    /// Returns the entity for an absolute constant path, creating it on first use
    pub fn resolve_cpath<S: AsRef<str>>(&mut self, cpath: &[S]) -> ModuleId {
        if let Some(id) = self.find_cpath(cpath) {
            return id;
        }
        let key: Vec<String> = cpath.iter().map(|s| s.as_ref().to_string()).collect();
        let id = ModuleId(self.modules.len() as u32);
        self.modules.push(ModuleEntity::new(key.clone()));
        self.module_index.insert(key, id);
        id
    }

    pub(crate) fn add_module_decl(&mut self, module: ModuleId, origin: DefOrigin, decl: ModuleDecl) {
        self.module_mut(module).decls.insert(origin, decl);
        self.refresh_hierarchy(module);
    }

    pub(crate) fn remove_module_decl(&mut self, module: ModuleId, origin: DefOrigin) {
        self.module_mut(module).decls.shift_remove(&origin);
        self.refresh_hierarchy(module);
    }

    pub(crate) fn add_include(&mut self, module: ModuleId, origin: DefOrigin, target: ModuleId, args: Vec<SigType>) {
        self.module_mut(module).includes.insert((origin, target), args);
        debug!(module = %self.module_name(module), include = %self.module_name(target), "module included");
        self.trigger_hierarchy_dependents(module);
    }

    pub(crate) fn remove_include(&mut self, module: ModuleId, origin: DefOrigin, target: ModuleId) {
        if self.module_mut(module).includes.shift_remove(&(origin, target)).is_some() {
            self.trigger_hierarchy_dependents(module);
        }
    }

    fn refresh_hierarchy(&mut self, module: ModuleId) {
        let entity = self.module(module);
        let superclass_ref = entity.decls.values().find_map(|d| d.superclass.clone());
        let type_params = entity
            .decls
            .values()
            .find(|d| !d.type_params.is_empty())
            .map(|d| d.type_params.clone())
            .unwrap_or_default();
        let rootless = module == self.core().basic_object || !entity.exists();
        let is_class = entity.is_class();
        let (superclass, args) = match superclass_ref {
            _ if rootless => (None, Vec::new()),
            Some(sref) => {
                let sup = self.resolve_cpath(&sref.cpath);
                if sup == module {
                    (Some(self.core().object), Vec::new())
                } else {
                    (Some(sup), sref.args)
                }
            }
            None if is_class => (Some(self.core().object), Vec::new()),
            None => (None, Vec::new()),
        };

        let entity = self.module_mut(module);
        if entity.superclass == superclass && entity.superclass_args == args && entity.type_params == type_params {
            return;
        }
        let old = entity.superclass;
        entity.superclass = superclass;
        entity.superclass_args = args;
        entity.type_params = type_params;
        if old != superclass {
            if let Some(old) = old {
                self.module_mut(old).subclasses.shift_remove(&module);
            }
            if let Some(new) = superclass {
                self.module_mut(new).subclasses.insert(module);
            }
        }
        debug!(
            module = %self.module_name(module),
            superclass = ?superclass.map(|s| self.module_name(s)),
            "class hierarchy changed"
        );
        self.trigger_hierarchy_dependents(module);
    }

    /// The next step of a method lookup walk: instance sides follow the
    /// superclass, the singleton side of the root continues at `Class`, and the
    /// singleton side of a non-class module continues at `Module`
    pub fn get_superclass(&self, module: ModuleId, singleton: bool) -> Option<(ModuleId, bool)> {
        let core = self.core();
        if singleton {
            if module == core.basic_object {
                Some((core.class, false))
            } else if !self.module(module).is_class() {
                Some((core.module, false))
            } else {
                self.module(module).superclass.map(|s| (s, true))
            }
        } else {
            self.module(module).superclass.map(|s| (s, false))
        }
    }

    /// `(module, singleton)` followed by every step of its superclass walk
    pub fn superclass_chain(&self, module: ModuleId, singleton: bool) -> Vec<(ModuleId, bool)> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut cur = Some((module, singleton));
        while let Some(step) = cur {
            if !seen.insert(step) {
                break;
            }
            chain.push(step);
            cur = self.get_superclass(step.0, step.1);
        }
        chain
    }

    /// The module and every transitive subclass of it
    pub fn descendants(&self, module: ModuleId) -> Vec<ModuleId> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![module];
        while let Some(m) = stack.pop() {
            if !seen.insert(m) {
                continue;
            }
            out.push(m);
            stack.extend(self.module(m).subclasses.iter().rev().copied());
        }
        out
    }

    /// Re-runs every site whose outcome depends on the ancestry of `module`
    /// or of one of its descendants
    pub(crate) fn trigger_hierarchy_dependents(&mut self, module: ModuleId) {
        let mut dependents: IndexSet<SiteId> = IndexSet::new();
        for m in self.descendants(module) {
            let entity = self.module(m);
            for side in &entity.methods {
                for me in side.values() {
                    dependents.extend(me.callsites.iter().copied());
                }
            }
            for ce in entity.consts.values() {
                dependents.extend(ce.followers.iter().copied());
            }
            dependents.extend(entity.subclass_checks.iter().copied());
            dependents.extend(entity.ivar_reads.iter().copied());
        }
        for site in dependents {
            self.add_run(site);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::graph::NodeId;

    fn class_decl(superclass: Option<&str>) -> ModuleDecl {
        ModuleDecl {
            is_class: true,
            superclass: superclass.map(|s| SuperclassRef {
                cpath: vec![s.to_string()],
                args: Vec::new(),
            }),
            type_params: Vec::new(),
        }
    }

    #[test]
    fn test_classes_default_to_object() {
        let mut env = GlobalEnv::new(EngineConfig::default());
        let foo = env.resolve_cpath(&["Foo"]);
        env.add_module_decl(foo, DefOrigin::Node(NodeId(1)), class_decl(None));
        assert_eq!(env.module(foo).superclass(), Some(env.core().object));
        assert!(env.module(env.core().object).subclasses().any(|m| m == foo));
    }

    #[test]
    fn test_superclass_follows_remaining_decls() {
        let mut env = GlobalEnv::new(EngineConfig::default());
        let base = env.resolve_cpath(&["Base"]);
        let foo = env.resolve_cpath(&["Foo"]);
        env.add_module_decl(base, DefOrigin::Node(NodeId(1)), class_decl(None));
        env.add_module_decl(foo, DefOrigin::Node(NodeId(2)), class_decl(Some("Base")));
        env.add_module_decl(foo, DefOrigin::Node(NodeId(3)), class_decl(None));
        assert_eq!(env.module(foo).superclass(), Some(base));

        env.remove_module_decl(foo, DefOrigin::Node(NodeId(2)));
        assert_eq!(env.module(foo).superclass(), Some(env.core().object));
        assert!(!env.module(base).subclasses().any(|m| m == foo));
        assert_eq!(env.descendants(base), vec![base]);
    }

    #[test]
    fn test_singleton_walk_reaches_class() {
        let env = GlobalEnv::new(EngineConfig::default());
        let core = env.core().clone();
        let chain = env.superclass_chain(core.integer, true);
        assert_eq!(chain.first(), Some(&(core.integer, true)));
        assert!(chain.contains(&(core.basic_object, true)));
        assert!(chain.contains(&(core.class, false)));
        assert!(chain.contains(&(core.module, false)));
    }
}
