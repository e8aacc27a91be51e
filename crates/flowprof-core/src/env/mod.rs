//! The global environment: arenas, the object model and the run queue

mod entities;
mod module;
mod stats;

pub use entities::{
    ConstEntity, ConstKey, DefOrigin, GVarEntity, IVarEntity, IVarKey, MethodEntity, MethodKey,
    Registration,
};
pub use module::{ModuleDecl, ModuleEntity};
pub use stats::EngineStats;

use indexmap::{IndexMap, IndexSet};
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;
use tracing::{debug, trace};

use crate::ast::Span;
use crate::builtin;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::graph::{BlockId, Changes, ModuleId, NodeId, SiteId, SiteSlot, Type, Vertex, VertexId};

/// Ids of the modules the engine relies on
#[derive(Debug, Clone, Default)]
pub struct CoreModules {
    pub basic_object: ModuleId,
    pub object: ModuleId,
    pub module: ModuleId,
    pub class: ModuleId,
    pub kernel: ModuleId,
    pub integer: ModuleId,
    pub float: ModuleId,
    pub string: ModuleId,
    pub symbol: ModuleId,
    pub nil: ModuleId,
    pub true_class: ModuleId,
    pub false_class: ModuleId,
    pub array: ModuleId,
    pub hash: ModuleId,
    pub proc_class: ModuleId,
}

/// An installed block: its parameter vertices and the vertex its value flows to
#[derive(Debug, Clone, PartialEq)]
pub struct BlockRecord {
    pub node: NodeId,
    pub params: Vec<VertexId>,
    pub ret: VertexId,
}

/// Everything a node installed, so that it can be moved to a new tree or torn down
#[derive(Debug)]
pub struct NodeRecord {
    pub(crate) path: Rc<str>,
    pub(crate) span: Span,
    pub(crate) name_span: Option<Span>,
    pub(crate) ret: Option<VertexId>,
    pub(crate) vertices: Vec<VertexId>,
    pub(crate) changes: Changes,
    pub(crate) sites: IndexSet<SiteId>,
    pub(crate) registrations: Vec<Registration>,
    pub(crate) returns: Vec<NodeId>,
    pub(crate) block: Option<BlockId>,
}

impl NodeRecord {
    pub(crate) fn new(path: Rc<str>, span: Span) -> Self {
        Self {
            path,
            span,
            name_span: None,
            ret: None,
            vertices: Vec::new(),
            changes: Changes::default(),
            sites: IndexSet::new(),
            registrations: Vec::new(),
            returns: Vec::new(),
            block: None,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn span(&self) -> Span {
        self.span
    }

    pub fn name_span(&self) -> Option<Span> {
        self.name_span
    }

    pub fn ret(&self) -> Option<VertexId> {
        self.ret
    }

    pub fn sites(&self) -> impl Iterator<Item = SiteId> + '_ {
        self.sites.iter().copied()
    }

    pub fn vertices(&self) -> &[VertexId] {
        &self.vertices
    }
}

/// Ids of destroyed arena slots. Released ids wait for the next quiescent
/// point; free ids are handed out again by the allocator.
#[derive(Debug)]
pub(crate) struct FreeList<I> {
    released: Vec<I>,
    free: Vec<I>,
}

impl<I> Default for FreeList<I> {
    fn default() -> Self {
        Self {
            released: Vec::new(),
            free: Vec::new(),
        }
    }
}

impl<I: Copy> FreeList<I> {
    pub(crate) fn release(&mut self, id: I) {
        self.released.push(id);
    }

    pub(crate) fn pop(&mut self) -> Option<I> {
        self.free.pop()
    }

    /// Moves every released id accepted by `reusable` to the free list
    fn sweep(&mut self, mut reusable: impl FnMut(I) -> bool) -> usize {
        let before = self.free.len();
        let mut kept = Vec::new();
        for id in self.released.drain(..) {
            if reusable(id) {
                self.free.push(id);
            } else {
                kept.push(id);
            }
        }
        self.released = kept;
        self.free.len() - before
    }
}

#[derive(Debug)]
pub struct GlobalEnv {
    pub(crate) config: EngineConfig,
    pub(crate) vertices: Vec<Vertex>,
    pub(crate) sites: Vec<SiteSlot>,
    pub(crate) modules: Vec<ModuleEntity>,
    module_index: HashMap<Vec<String>, ModuleId>,
    pub(crate) gvars: IndexMap<String, GVarEntity>,
    pub(crate) interned: HashMap<Vec<Type>, VertexId>,
    blocks: Vec<Option<BlockRecord>>,
    pub(crate) free_vertices: FreeList<VertexId>,
    pub(crate) free_sites: FreeList<SiteId>,
    free_blocks: FreeList<BlockId>,
    pub(crate) nodes: HashMap<NodeId, NodeRecord>,
    queue: VecDeque<SiteId>,
    queued: HashSet<SiteId>,
    next_node: u32,
    pub(crate) stats: EngineStats,
    pub(crate) core: CoreModules,
}

impl GlobalEnv {
    pub fn new(config: EngineConfig) -> Self {
        let mut env = Self {
            config,
            vertices: Vec::new(),
            sites: Vec::new(),
            modules: Vec::new(),
            module_index: HashMap::new(),
            gvars: IndexMap::new(),
            interned: HashMap::new(),
            blocks: Vec::new(),
            free_vertices: FreeList::default(),
            free_sites: FreeList::default(),
            free_blocks: FreeList::default(),
            nodes: HashMap::new(),
            queue: VecDeque::new(),
            queued: HashSet::new(),
            next_node: 1,
            stats: EngineStats::default(),
            core: CoreModules::default(),
        };
        builtin::deploy(&mut env);
        env
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn core(&self) -> &CoreModules {
        &self.core
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn next_node_id(&mut self) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        id
    }

    /// Schedules a site; a site already in the queue is not added twice
    pub fn add_run(&mut self, site: SiteId) {
        if self.sites[site.index()].destroyed {
            return;
        }
        if self.queued.insert(site) {
            self.queue.push_back(site);
        }
    }

    pub fn pending_runs(&self) -> usize {
        self.queue.len()
    }

    /// Drains the run queue until no site is scheduled. Returns the number of runs.
    pub fn run_all(&mut self) -> Result<usize> {
        let mut runs = 0usize;
        while let Some(site) = self.queue.pop_front() {
            self.queued.remove(&site);
            if self.sites[site.index()].destroyed {
                continue;
            }
            if let Some(fuel) = self.config.fuel {
                if runs >= fuel {
                    return Err(EngineError::FuelExhausted { runs });
                }
            }
            runs += 1;
            trace!(%site, kind = self.sites[site.index()].kind.name(), "running site");
            self.run_site(site)?;
        }
        debug!(runs, "run queue drained");
        Ok(runs)
    }

    pub fn node_record(&self, node: NodeId) -> Option<&NodeRecord> {
        self.nodes.get(&node)
    }

    pub(crate) fn add_block(&mut self, record: BlockRecord) -> BlockId {
        if let Some(id) = self.free_blocks.pop() {
            self.blocks[id.index()] = Some(record);
            return id;
        }
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Some(record));
        id
    }

    pub fn block(&self, id: BlockId) -> Option<&BlockRecord> {
        self.blocks.get(id.index()).and_then(Option::as_ref)
    }

    pub(crate) fn block_mut(&mut self, id: BlockId) -> Option<&mut BlockRecord> {
        self.blocks.get_mut(id.index()).and_then(Option::as_mut)
    }

    pub(crate) fn remove_block(&mut self, id: BlockId) {
        if let Some(slot) = self.blocks.get_mut(id.index()) {
            if slot.take().is_some() {
                self.free_blocks.release(id);
            }
        }
    }

    /// Makes the slots of destroyed vertices, sites and blocks available
    /// again. Only runs on a drained queue. A dead vertex is kept back while
    /// an edge or a listening site still refers to it. Returns the number of
    /// slots freed.
    pub fn reclaim(&mut self) -> usize {
        if !self.queue.is_empty() {
            return 0;
        }
        let vertices = &self.vertices;
        let freed_vertices = self.free_vertices.sweep(|id| vertices[id.index()].is_reclaimable());
        let sites = &self.sites;
        let freed_sites = self.free_sites.sweep(|id| sites[id.index()].destroyed);
        let blocks = &self.blocks;
        let freed_blocks = self.free_blocks.sweep(|id| blocks[id.index()].is_none());
        let freed = freed_vertices + freed_sites + freed_blocks;
        if freed > 0 {
            debug!(vertices = freed_vertices, sites = freed_sites, blocks = freed_blocks, "arena slots reclaimed");
        }
        freed
    }

    /// Allocated vertex slots, live or not
    pub fn vertex_slots(&self) -> usize {
        self.vertices.len()
    }

    /// Allocated site slots, live or not
    pub fn site_slots(&self) -> usize {
        self.sites.len()
    }

    pub fn gvar_vertex(&mut self, name: &str) -> VertexId {
        if let Some(gvar) = self.gvars.get(name) {
            return gvar.vtx;
        }
        let vtx = self.new_vertex(format!("gvar:{name}"), None);
        self.gvars.insert(name.to_string(), GVarEntity { vtx });
        vtx
    }

    /// The nominal type used for method lookup, or `None` when calls on the
    /// type are silently skipped
    pub fn base_type(&self, ty: &Type) -> Option<Type> {
        let core = &self.core;
        match ty {
            Type::Nil => Some(Type::instance(core.nil)),
            Type::True => Some(Type::instance(core.true_class)),
            Type::False => Some(Type::instance(core.false_class)),
            Type::Array { elem, .. } => Some(Type::Instance {
                module: core.array,
                args: vec![*elem],
            }),
            Type::Proc(_) => Some(Type::instance(core.proc_class)),
            Type::Instance { .. } | Type::Singleton(_) => Some(ty.clone()),
            Type::Bot | Type::Untyped | Type::Var { .. } => None,
        }
    }

    pub fn show_vertex(&self, id: VertexId) -> String {
        self.show_vertex_rec(id, &mut Vec::new())
    }

    pub(crate) fn show_vertex_rec(&self, id: VertexId, visiting: &mut Vec<VertexId>) -> String {
        if visiting.contains(&id) {
            return "untyped".to_string();
        }
        visiting.push(id);

        let (mut optional, mut has_true, mut has_false, mut bot) = (false, false, false, false);
        let mut shown: Vec<String> = Vec::new();
        for ty in self.vertex(id).types() {
            match ty {
                Type::Nil => optional = true,
                Type::True => has_true = true,
                Type::False => has_false = true,
                Type::Bot => bot = true,
                Type::Instance { module, .. } if *module == self.core.nil => optional = true,
                Type::Instance { module, .. } if *module == self.core.true_class => has_true = true,
                Type::Instance { module, .. } if *module == self.core.false_class => has_false = true,
                other => {
                    let s = other.show_rec(self, visiting);
                    if !shown.contains(&s) {
                        shown.push(s);
                    }
                }
            }
        }
        visiting.pop();

        match (has_true, has_false) {
            (true, true) => shown.push("bool".to_string()),
            (true, false) => shown.push("true".to_string()),
            (false, true) => shown.push("false".to_string()),
            (false, false) => {}
        }
        shown.sort();
        let suffix = if optional { "?" } else { "" };
        match shown.len() {
            0 if optional => "nil".to_string(),
            0 if bot => "bot".to_string(),
            0 => "untyped".to_string(),
            1 => format!("{}{}", shown[0], suffix),
            _ => format!("({}){}", shown.join(" | "), suffix),
        }
    }

    pub fn show_type(&self, ty: &Type) -> String {
        ty.show(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> GlobalEnv {
        GlobalEnv::new(EngineConfig::default())
    }

    #[test]
    fn test_show_optional_and_bool() {
        let mut env = env();
        let int = Type::instance(env.core().integer);
        let v = env.new_source([int, Type::Nil], None);
        assert_eq!(env.show_vertex(v), "Integer?");

        let b = env.new_source([Type::True, Type::False], None);
        assert_eq!(env.show_vertex(b), "bool");
    }

    #[test]
    fn test_show_union_sorted() {
        let mut env = env();
        let core = env.core().clone();
        let v = env.new_source([Type::instance(core.string), Type::instance(core.integer)], None);
        assert_eq!(env.show_vertex(v), "(Integer | String)");
        let empty = env.empty_vertex();
        assert_eq!(env.show_vertex(empty), "untyped");
    }

    #[test]
    fn test_show_arrays() {
        let mut env = env();
        let core = env.core().clone();
        let a = env.source(&[Type::instance(core.integer)]);
        let b = env.source(&[Type::instance(core.string)]);
        let elem = env.new_source([Type::instance(core.integer), Type::instance(core.string)], None);
        let tuple = env.new_source(
            [Type::Array {
                elems: Some(vec![a, b]),
                elem,
            }],
            None,
        );
        assert_eq!(env.show_vertex(tuple), "[Integer, String]");
        let list = env.new_source([Type::Array { elems: None, elem }], None);
        assert_eq!(env.show_vertex(list), "Array[(Integer | String)]");
    }

    #[test]
    fn test_fuel_exhaustion_is_reported() {
        let mut env = GlobalEnv::new(EngineConfig::default().with_fuel(0));
        let ret = env.new_vertex("ret", None);
        let site = env
            .create_site(
                NodeId(0),
                crate::graph::SiteKind::GVarRead(crate::sites::GVarReadSite {
                    name: "$x".into(),
                    ret,
                }),
            )
            .unwrap();
        assert_eq!(env.pending_runs(), 1);
        assert!(matches!(env.run_all(), Err(EngineError::FuelExhausted { .. })));
        assert!(!env.site(site).is_destroyed());
    }

    #[test]
    fn test_dead_vertex_waits_for_its_edges_before_reuse() {
        let mut env = env();
        let a = env.new_vertex("a", None);
        let b = env.new_vertex("b", None);
        env.add_edge(a, b);
        env.destroy_vertex(b);
        assert_eq!(env.reclaim(), 0);

        env.remove_edge(a, b);
        assert_eq!(env.reclaim(), 1);
        let slots = env.vertex_slots();
        let c = env.new_vertex("c", None);
        assert_eq!(c, b);
        assert_eq!(env.vertex_slots(), slots);
        assert!(env.vertex(c).is_alive());
        assert!(env.vertex(c).is_empty());
        assert_eq!(env.vertex(c).label(), "c");
    }

    #[test]
    fn test_destroyed_site_slot_is_reused() {
        let mut env = env();
        let ret = env.new_vertex("ret", None);
        let kind = crate::graph::SiteKind::GVarRead(crate::sites::GVarReadSite {
            name: "$x".into(),
            ret,
        });
        let site = env.create_site(NodeId(0), kind.clone()).unwrap();
        env.run_all().unwrap();
        env.destroy_site(site).unwrap();
        // nothing is handed out again before a reclaim
        let other = env.create_site(NodeId(0), kind.clone()).unwrap();
        assert_ne!(other, site);

        assert_eq!(env.reclaim(), 0, "queue still holds the new site");
        env.run_all().unwrap();
        assert_eq!(env.reclaim(), 1);
        let again = env.create_site(NodeId(0), kind).unwrap();
        assert_eq!(again, site);
        assert!(!env.site(again).is_destroyed());
        assert_eq!(env.stats().live_site_count(), 2);
    }

    #[test]
    fn test_add_run_deduplicates() {
        let mut env = env();
        let ret = env.new_vertex("ret", None);
        let site = env
            .create_site(
                NodeId(0),
                crate::graph::SiteKind::GVarRead(crate::sites::GVarReadSite {
                    name: "$x".into(),
                    ret,
                }),
            )
            .unwrap();
        env.add_run(site);
        env.add_run(site);
        assert_eq!(env.pending_runs(), 1);
        assert_eq!(env.run_all().unwrap(), 1);
    }
}
