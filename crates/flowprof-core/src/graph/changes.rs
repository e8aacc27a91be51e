//! Double-buffered record of what a site or node run produced
//!
//! A run only ever writes into the pending half. [`Changes::reinstall`]
//! diffs the pending half against what the previous run installed, applies
//! the difference to the graph and swaps the halves, so a run that produces
//! exactly what the previous one did touches nothing.

use indexmap::{IndexMap, IndexSet};
use std::collections::HashMap;
use std::mem;
use tracing::{error, trace};

use super::{ModuleId, NodeId, SiteId, SiteKind, Type, VertexId};
use crate::diagnostic::Diagnostic;
use crate::env::{ConstKey, GlobalEnv, MethodKey};
use crate::error::{EngineError, Result};

/// Who a [`Changes`] buffer belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    /// Results of a site run
    Site(SiteId),
    /// Edges and child sites an AST node wires at install time
    Node(NodeId),
}

/// Identity of a child site within its parent's run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SiteKey {
    /// Role of the child, e.g. `"decl"` or `"check"`
    pub slot: &'static str,
    /// Position among children sharing the slot
    pub index: u32,
}

impl SiteKey {
    pub fn new(slot: &'static str, index: u32) -> Self {
        Self { slot, index }
    }
}

type ScratchKey = (&'static str, usize);

fn missing_reverse_index(site: SiteId, entity: String) -> EngineError {
    error!(%site, %entity, "structural dependency lost its reverse index entry");
    EngineError::MissingReverseIndex { site, entity }
}

/// The effects of one run, kept in two halves. A run fills the pending
/// half from scratch; [`Changes::reinstall`] then applies only the
/// difference against the installed half and swaps them.
#[derive(Debug, Default)]
pub struct Changes {
    edges: IndexSet<(VertexId, VertexId)>,
    new_edges: IndexSet<(VertexId, VertexId)>,
    sites: IndexMap<SiteKey, SiteId>,
    new_sites: IndexMap<SiteKey, (NodeId, SiteKind)>,
    diagnostics: Vec<Diagnostic>,
    new_diagnostics: Vec<Diagnostic>,
    method_deps: IndexSet<MethodKey>,
    new_method_deps: IndexSet<MethodKey>,
    static_reads: IndexSet<ConstKey>,
    new_static_reads: IndexSet<ConstKey>,
    superclasses: IndexSet<ModuleId>,
    new_superclasses: IndexSet<ModuleId>,
    scratch: IndexMap<ScratchKey, VertexId>,
    new_scratch: IndexMap<ScratchKey, VertexId>,
    ordinals: HashMap<&'static str, usize>,
}

impl Changes {
    /// Records an edge for the pending run
    pub fn add_edge(&mut self, src: VertexId, dst: VertexId) {
        self.new_edges.insert((src, dst));
    }

    /// Asks for a child site. An installed child with the same key and an
    /// equal description is kept instead of being rebuilt.
    pub fn add_site(&mut self, key: SiteKey, node: NodeId, kind: SiteKind) {
        self.new_sites.insert(key, (node, kind));
    }

    pub fn add_diagnostic(&mut self, diagnostic: Diagnostic) {
        self.new_diagnostics.push(diagnostic);
    }

    /// Re-runs the owner whenever the method entity's declarations,
    /// definitions or aliases change
    pub fn add_depended_method_entity(&mut self, key: MethodKey) {
        self.new_method_deps.insert(key);
    }

    /// Re-runs the owner when the constant starts or stops existing
    pub fn add_depended_static_read(&mut self, key: ConstKey) {
        self.new_static_reads.insert(key);
    }

    /// Re-runs the owner when the module's superclass changes
    pub fn add_depended_superclass(&mut self, module: ModuleId) {
        self.new_superclasses.insert(module);
    }

    /// A vertex private to this owner. The n-th call with a label in one run
    /// returns the vertex the n-th call returned in the previous run.
    pub fn fresh_vertex(&mut self, env: &mut GlobalEnv, label: &'static str) -> VertexId {
        let key = self.next_scratch_key(label);
        let vtx = match self.scratch.get(&key) {
            Some(&vtx) if env.vertex(vtx).is_alive() && !env.vertex(vtx).is_source() => vtx,
            _ => env.new_vertex(label, None),
        };
        self.new_scratch.insert(key, vtx);
        vtx
    }

    /// A private source vertex holding `types`, reused while the types are unchanged
    pub fn fresh_source(&mut self, env: &mut GlobalEnv, label: &'static str, types: Vec<Type>) -> VertexId {
        let key = self.next_scratch_key(label);
        let reusable = self.scratch.get(&key).copied().filter(|&vtx| {
            let vertex = env.vertex(vtx);
            vertex.is_alive()
                && vertex.is_source()
                && vertex.types.len() == types.len()
                && types.iter().all(|ty| vertex.contains(ty))
        });
        let vtx = match reusable {
            Some(vtx) => vtx,
            None => env.new_source(types, None),
        };
        self.new_scratch.insert(key, vtx);
        vtx
    }

    /// A source for a single type, interned when the type allows it
    pub fn type_source(&mut self, env: &mut GlobalEnv, label: &'static str, ty: Type) -> VertexId {
        if ty.is_static() {
            env.source(&[ty])
        } else {
            self.fresh_source(env, label, vec![ty])
        }
    }

    fn next_scratch_key(&mut self, label: &'static str) -> ScratchKey {
        let ordinal = self.ordinals.entry(label).or_insert(0);
        let key = (label, *ordinal);
        *ordinal += 1;
        key
    }

    /// Drops whatever a failed or abandoned run left in the pending half
    pub fn discard_pending(&mut self) {
        self.new_edges.clear();
        self.new_sites.clear();
        self.new_diagnostics.clear();
        self.new_method_deps.clear();
        self.new_static_reads.clear();
        self.new_superclasses.clear();
        self.new_scratch.clear();
        self.ordinals.clear();
    }

    /// Installed edges
    pub fn edges(&self) -> impl Iterator<Item = (VertexId, VertexId)> + '_ {
        self.edges.iter().copied()
    }

    /// Edges recorded by the run in progress, not yet installed
    pub fn pending_edges(&self) -> impl Iterator<Item = (VertexId, VertexId)> + '_ {
        self.new_edges.iter().copied()
    }

    /// Installed child sites
    pub fn sites(&self) -> impl Iterator<Item = SiteId> + '_ {
        self.sites.values().copied()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn scratch_vertices(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.scratch.values().copied()
    }

    pub(crate) fn remap_nodes(&mut self, map: &HashMap<NodeId, NodeId>) {
        for diagnostic in &mut self.diagnostics {
            if let Some(&node) = map.get(&diagnostic.node) {
                diagnostic.node = node;
            }
        }
    }

    /// Applies the difference between the pending half and the installed half
    pub fn reinstall(&mut self, env: &mut GlobalEnv, owner: Owner) -> Result<()> {
        for &(src, dst) in &self.new_edges {
            if !self.edges.contains(&(src, dst)) {
                env.add_edge(src, dst);
            }
        }
        for &(src, dst) in &self.edges {
            if !self.new_edges.contains(&(src, dst)) {
                env.remove_edge(src, dst);
            }
        }
        mem::swap(&mut self.edges, &mut self.new_edges);
        self.new_edges.clear();

        self.reinstall_sites(env)?;

        mem::swap(&mut self.diagnostics, &mut self.new_diagnostics);
        self.new_diagnostics.clear();

        match owner {
            Owner::Site(site) => self.reinstall_dependencies(env, site)?,
            Owner::Node(node) => {
                debug_assert!(
                    self.new_method_deps.is_empty()
                        && self.new_static_reads.is_empty()
                        && self.new_superclasses.is_empty(),
                    "node {node} recorded structural dependencies"
                );
            }
        }

        for (key, vtx) in &self.scratch {
            if self.new_scratch.get(key) != Some(vtx) {
                env.destroy_vertex(*vtx);
            }
        }
        mem::swap(&mut self.scratch, &mut self.new_scratch);
        self.new_scratch.clear();
        self.ordinals.clear();
        Ok(())
    }

    fn reinstall_sites(&mut self, env: &mut GlobalEnv) -> Result<()> {
        let mut previous = mem::take(&mut self.sites);
        let pending = mem::take(&mut self.new_sites);

        let mut kept = IndexMap::new();
        let mut created = Vec::new();
        for (key, (node, kind)) in pending {
            match previous.get(&key) {
                Some(&site) if env.site_matches(site, node, &kind) => {
                    previous.shift_remove(&key);
                    kept.insert(key, site);
                }
                _ => created.push((key, node, kind)),
            }
        }

        for (key, site) in previous {
            trace!(%site, slot = key.slot, "destroying child site");
            env.destroy_site(site)?;
        }
        for (key, node, kind) in created {
            let site = env.create_site(node, kind)?;
            kept.insert(key, site);
        }
        self.sites = kept;
        Ok(())
    }

    fn reinstall_dependencies(&mut self, env: &mut GlobalEnv, site: SiteId) -> Result<()> {
        for key in &self.method_deps {
            let removed = env
                .method_entity_mut(key)
                .map(|me| me.callsites.shift_remove(&site))
                .unwrap_or(false);
            if !removed {
                return Err(missing_reverse_index(site, format!("method {}", env.show_method_key(key))));
            }
        }
        for key in &self.new_method_deps {
            env.ensure_method_entity(key).callsites.insert(site);
        }
        mem::swap(&mut self.method_deps, &mut self.new_method_deps);
        self.new_method_deps.clear();

        for key in &self.static_reads {
            let removed = env
                .const_entity_mut(key)
                .map(|ce| ce.followers.shift_remove(&site))
                .unwrap_or(false);
            if !removed {
                return Err(missing_reverse_index(site, format!("constant {}", env.show_const_key(key))));
            }
        }
        for key in &self.new_static_reads {
            env.ensure_const_entity(key).followers.insert(site);
        }
        mem::swap(&mut self.static_reads, &mut self.new_static_reads);
        self.new_static_reads.clear();

        for &module in &self.superclasses {
            if !env.module_mut(module).subclass_checks.shift_remove(&site) {
                return Err(missing_reverse_index(site, format!("superclass of {}", env.module_name(module))));
            }
        }
        for &module in &self.new_superclasses {
            env.module_mut(module).subclass_checks.insert(site);
        }
        mem::swap(&mut self.superclasses, &mut self.new_superclasses);
        self.new_superclasses.clear();
        Ok(())
    }
}
