use indexmap::{IndexMap, IndexSet};
use std::hash::Hash;
use std::rc::Rc;
use tracing::debug;

use super::GlobalEnv;
use crate::builtin::BuiltinMethod;
use crate::graph::{ModuleId, NodeId, SiteId, VertexId};

/// Where a declaration or definition came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DefOrigin {
    /// Seeded by the builtin environment, never uninstalled
    Builtin,
    Node(NodeId),
}

/// Names one side of a module's method table: instance when `singleton`
/// is false, the module's own methods otherwise
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodKey {
    pub module: ModuleId,
    pub singleton: bool,
    pub name: String,
}

impl MethodKey {
    pub fn new(module: ModuleId, singleton: bool, name: impl Into<String>) -> Self {
        Self {
            module,
            singleton,
            name: name.into(),
        }
    }
}

/// Everything known about one method name on one side of a module
#[derive(Debug, Default)]
pub struct MethodEntity {
    pub(crate) decls: IndexSet<SiteId>,
    pub(crate) defs: IndexSet<SiteId>,
    pub(crate) aliases: IndexMap<DefOrigin, String>,
    pub(crate) builtin: Option<Rc<dyn BuiltinMethod>>,
    pub(crate) callsites: IndexSet<SiteId>,
}

impl MethodEntity {
    /// Whether a lookup stops here. Aliases alone do not count.
    pub fn exists(&self) -> bool {
        self.builtin.is_some() || !self.decls.is_empty() || !self.defs.is_empty()
    }

    /// The name this entry redirects to. With several aliases the first
    /// one installed wins.
    pub fn alias_target(&self) -> Option<&str> {
        self.aliases.values().next().map(String::as_str)
    }

    pub fn decls(&self) -> impl Iterator<Item = SiteId> + '_ {
        self.decls.iter().copied()
    }

    pub fn defs(&self) -> impl Iterator<Item = SiteId> + '_ {
        self.defs.iter().copied()
    }

    /// Call sites whose last lookup consulted this entry
    pub fn callsites(&self) -> impl Iterator<Item = SiteId> + '_ {
        self.callsites.iter().copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConstKey {
    pub module: ModuleId,
    pub name: String,
}

impl ConstKey {
    pub fn new(module: ModuleId, name: impl Into<String>) -> Self {
        Self {
            module,
            name: name.into(),
        }
    }
}

/// A constant's definitions and the vertex its value flows into. The
/// vertex outlives the definitions so readers keep their edges.
#[derive(Debug)]
pub struct ConstEntity {
    pub(crate) defs: IndexSet<DefOrigin>,
    pub(crate) vtx: VertexId,
    pub(crate) followers: IndexSet<SiteId>,
}

impl ConstEntity {
    pub fn exists(&self) -> bool {
        !self.defs.is_empty()
    }

    pub fn vertex(&self) -> VertexId {
        self.vtx
    }
}

/// An instance variable of one module side
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IVarKey {
    pub module: ModuleId,
    pub singleton: bool,
    pub name: String,
}

/// Written instance variable. Reads from subclasses resolve to the
/// topmost ancestor where it exists.
#[derive(Debug)]
pub struct IVarEntity {
    pub(crate) defs: IndexSet<DefOrigin>,
    pub(crate) vtx: VertexId,
}

impl IVarEntity {
    pub fn exists(&self) -> bool {
        !self.defs.is_empty()
    }
}

/// Globals are never undefined, so only the vertex is kept
#[derive(Debug)]
pub struct GVarEntity {
    pub(crate) vtx: VertexId,
}

/// A global registration made by a node, undone when the node is uninstalled
#[derive(Debug, Clone, PartialEq)]
pub enum Registration {
    Module(ModuleId),
    Include { module: ModuleId, target: ModuleId },
    Const(ConstKey),
    IVar(IVarKey),
    Alias(MethodKey),
}

fn side(singleton: bool) -> usize {
    usize::from(singleton)
}

/// Replaces the key `from` with `to` at the same position
fn rekey_entry<K: Hash + Eq, V>(map: &mut IndexMap<K, V>, from: &K, to: K) {
    if let Some((index, _, value)) = map.shift_remove_full(from) {
        map.shift_insert(index, to, value);
    }
}

fn rekey_member<T: Hash + Eq>(set: &mut IndexSet<T>, from: &T, to: T) {
    if let Some((index, _)) = set.shift_remove_full(from) {
        set.shift_insert(index, to);
    }
}

impl GlobalEnv {
    /// `None` until something has looked the name up or registered it
    pub fn method_entity(&self, key: &MethodKey) -> Option<&MethodEntity> {
        self.module(key.module).methods[side(key.singleton)].get(&key.name)
    }

    pub(crate) fn method_entity_mut(&mut self, key: &MethodKey) -> Option<&mut MethodEntity> {
        self.module_mut(key.module).methods[side(key.singleton)].get_mut(&key.name)
    }

    pub(crate) fn ensure_method_entity(&mut self, key: &MethodKey) -> &mut MethodEntity {
        self.module_mut(key.module).methods[side(key.singleton)]
            .entry(key.name.clone())
            .or_default()
    }

    pub fn show_method_key(&self, key: &MethodKey) -> String {
        let sep = if key.singleton { "." } else { "#" };
        format!("{}{}{}", self.module_name(key.module), sep, key.name)
    }

    fn run_callsites(&mut self, key: &MethodKey) {
        let sites: Vec<SiteId> = self
            .method_entity(key)
            .map(|me| me.callsites().collect())
            .unwrap_or_default();
        for site in sites {
            self.add_run(site);
        }
    }

    fn run_method_defs(&mut self, key: &MethodKey) {
        let sites: Vec<SiteId> = self
            .method_entity(key)
            .map(|me| me.defs().collect())
            .unwrap_or_default();
        for site in sites {
            self.add_run(site);
        }
    }

    /// Declarations are authoritative for callers and for the bodies they describe
    pub(crate) fn add_method_decl(&mut self, key: &MethodKey, site: SiteId) {
        self.ensure_method_entity(key).decls.insert(site);
        self.run_callsites(key);
        self.run_method_defs(key);
    }

    pub(crate) fn remove_method_decl(&mut self, key: &MethodKey, site: SiteId) {
        self.ensure_method_entity(key).decls.shift_remove(&site);
        self.run_callsites(key);
        self.run_method_defs(key);
    }

    /// Registers a body. Callers only see it when no declaration exists.
    pub(crate) fn add_method_def(&mut self, key: &MethodKey, site: SiteId) {
        let me = self.ensure_method_entity(key);
        me.defs.insert(site);
        if me.decls.is_empty() {
            self.run_callsites(key);
        }
    }

    pub(crate) fn remove_method_def(&mut self, key: &MethodKey, site: SiteId) {
        let me = self.ensure_method_entity(key);
        me.defs.shift_remove(&site);
        if me.decls.is_empty() {
            self.run_callsites(key);
        }
    }

    pub(crate) fn add_alias(&mut self, key: &MethodKey, origin: DefOrigin, target: String) {
        self.ensure_method_entity(key).aliases.insert(origin, target);
        self.run_callsites(key);
    }

    pub(crate) fn remove_alias(&mut self, key: &MethodKey, origin: DefOrigin) {
        self.ensure_method_entity(key).aliases.shift_remove(&origin);
        self.run_callsites(key);
    }

    pub fn const_entity(&self, key: &ConstKey) -> Option<&ConstEntity> {
        self.module(key.module).consts.get(&key.name)
    }

    pub(crate) fn const_entity_mut(&mut self, key: &ConstKey) -> Option<&mut ConstEntity> {
        self.module_mut(key.module).consts.get_mut(&key.name)
    }

    pub(crate) fn ensure_const_entity(&mut self, key: &ConstKey) -> &mut ConstEntity {
        if self.const_entity(key).is_none() {
            let label = format!("const:{}", self.show_const_key(key));
            let vtx = self.new_vertex(label, None);
            self.module_mut(key.module).consts.insert(
                key.name.clone(),
                ConstEntity {
                    defs: IndexSet::new(),
                    vtx,
                    followers: IndexSet::new(),
                },
            );
        }
        &mut self.modules[key.module.index()].consts[&key.name]
    }

    pub fn show_const_key(&self, key: &ConstKey) -> String {
        if key.module == self.core().object {
            key.name.clone()
        } else {
            format!("{}::{}", self.module_name(key.module), key.name)
        }
    }

    /// Adds a definition; readers are re-run only when the constant starts existing
    pub(crate) fn add_const_def(&mut self, key: &ConstKey, origin: DefOrigin) -> VertexId {
        let ce = self.ensure_const_entity(key);
        let was = ce.exists();
        ce.defs.insert(origin);
        let vtx = ce.vtx;
        if !was {
            debug!(constant = %self.show_const_key(key), "constant defined");
            self.run_const_followers(key);
        }
        vtx
    }

    pub(crate) fn remove_const_def(&mut self, key: &ConstKey, origin: DefOrigin) {
        let ce = self.ensure_const_entity(key);
        ce.defs.shift_remove(&origin);
        if !ce.exists() {
            debug!(constant = %self.show_const_key(key), "constant undefined");
            self.run_const_followers(key);
        }
    }

    fn run_const_followers(&mut self, key: &ConstKey) {
        let sites: Vec<SiteId> = self
            .const_entity(key)
            .map(|ce| ce.followers.iter().copied().collect())
            .unwrap_or_default();
        for site in sites {
            self.add_run(site);
        }
    }

    pub fn ivar_entity(&self, key: &IVarKey) -> Option<&IVarEntity> {
        self.module(key.module).ivars[side(key.singleton)].get(&key.name)
    }

    pub(crate) fn ensure_ivar_entity(&mut self, key: &IVarKey) -> &mut IVarEntity {
        if self.ivar_entity(key).is_none() {
            let vtx = self.new_vertex(format!("ivar:{}", key.name), None);
            self.module_mut(key.module).ivars[side(key.singleton)].insert(
                key.name.clone(),
                IVarEntity {
                    defs: IndexSet::new(),
                    vtx,
                },
            );
        }
        &mut self.modules[key.module.index()].ivars[side(key.singleton)][&key.name]
    }

    pub(crate) fn add_ivar_def(&mut self, key: &IVarKey, origin: DefOrigin) -> VertexId {
        let ive = self.ensure_ivar_entity(key);
        let was = ive.exists();
        ive.defs.insert(origin);
        let vtx = ive.vtx;
        if !was {
            self.run_ivar_readers(key.module);
        }
        vtx
    }

    pub(crate) fn remove_ivar_def(&mut self, key: &IVarKey, origin: DefOrigin) {
        let ive = self.ensure_ivar_entity(key);
        ive.defs.shift_remove(&origin);
        if !ive.exists() {
            self.run_ivar_readers(key.module);
        }
    }

    fn run_ivar_readers(&mut self, module: ModuleId) {
        let mut sites = Vec::new();
        for m in self.descendants(module) {
            sites.extend(self.module(m).ivar_reads.iter().copied());
        }
        for site in sites {
            self.add_run(site);
        }
    }

    /// Hands a registration over to the node that adopted the registering
    /// node's state. Nothing is re-run: lookups cannot tell the difference.
    pub(crate) fn rekey_registration(&mut self, registration: &Registration, from: DefOrigin, to: DefOrigin) {
        match registration {
            Registration::Module(module) => rekey_entry(&mut self.module_mut(*module).decls, &from, to),
            Registration::Include { module, target } => {
                rekey_entry(&mut self.module_mut(*module).includes, &(from, *target), (to, *target))
            }
            Registration::Const(key) => rekey_member(&mut self.ensure_const_entity(key).defs, &from, to),
            Registration::IVar(key) => rekey_member(&mut self.ensure_ivar_entity(key).defs, &from, to),
            Registration::Alias(key) => rekey_entry(&mut self.ensure_method_entity(key).aliases, &from, to),
        }
    }

    /// Undoes one registration made by the node behind `origin`
    pub(crate) fn unregister(&mut self, registration: &Registration, origin: DefOrigin) {
        match registration {
            Registration::Module(module) => self.remove_module_decl(*module, origin),
            Registration::Include { module, target } => self.remove_include(*module, origin, *target),
            Registration::Const(key) => self.remove_const_def(key, origin),
            Registration::IVar(key) => self.remove_ivar_def(key, origin),
            Registration::Alias(key) => self.remove_alias(key, origin),
        }
    }
}
