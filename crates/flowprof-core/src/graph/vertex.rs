use indexmap::{IndexMap, IndexSet};
use smallvec::SmallVec;
use std::borrow::Cow;
use std::collections::VecDeque;
use tracing::{trace, warn};

use super::{NodeId, SiteId, Type, VertexId};
use crate::env::GlobalEnv;

/// Why a type is present at a vertex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// The vertex is a source that was created holding the type
    Literal,
    /// The type arrived over the edge from this vertex
    Edge(VertexId),
}

/// A node of the constraint graph holding a set of abstract types
#[derive(Debug)]
pub struct Vertex {
    pub(crate) label: Cow<'static, str>,
    pub(crate) node: Option<NodeId>,
    pub(crate) types: IndexMap<Type, SmallVec<[Origin; 2]>>,
    /// Outgoing edges with the number of owners holding each of them
    pub(crate) next: IndexMap<VertexId, u32>,
    /// Number of vertices with an edge into this one
    pub(crate) incoming: u32,
    pub(crate) listeners: IndexSet<SiteId>,
    pub(crate) source: bool,
    pub(crate) alive: bool,
}

impl Vertex {
    fn new(label: Cow<'static, str>, node: Option<NodeId>, source: bool) -> Self {
        Self {
            label,
            node,
            types: IndexMap::new(),
            next: IndexMap::new(),
            incoming: 0,
            listeners: IndexSet::new(),
            source,
            alive: true,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn node(&self) -> Option<NodeId> {
        self.node
    }

    pub fn types(&self) -> impl Iterator<Item = &Type> {
        self.types.keys()
    }

    pub fn contains(&self, ty: &Type) -> bool {
        self.types.contains_key(ty)
    }

    pub fn origins(&self, ty: &Type) -> &[Origin] {
        self.types.get(ty).map(|o| o.as_slice()).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn successors(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.next.keys().copied()
    }

    pub fn listeners(&self) -> impl Iterator<Item = SiteId> + '_ {
        self.listeners.iter().copied()
    }

    /// Sources hold fixed literal types and never receive edges from owners
    pub fn is_source(&self) -> bool {
        self.source
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Dead, and no edge or site refers to it any more
    pub(crate) fn is_reclaimable(&self) -> bool {
        !self.alive && self.next.is_empty() && self.incoming == 0 && self.listeners.is_empty()
    }
}

impl GlobalEnv {
    fn alloc_vertex(&mut self, vertex: Vertex) -> VertexId {
        if let Some(id) = self.free_vertices.pop() {
            self.vertices[id.index()] = vertex;
            return id;
        }
        let id = VertexId(self.vertices.len() as u32);
        self.vertices.push(vertex);
        id
    }

    pub fn new_vertex(&mut self, label: impl Into<Cow<'static, str>>, node: Option<NodeId>) -> VertexId {
        self.alloc_vertex(Vertex::new(label.into(), node, false))
    }

    /// Creates a source vertex holding `types` as literals
    pub fn new_source(&mut self, types: impl IntoIterator<Item = Type>, node: Option<NodeId>) -> VertexId {
        let mut vertex = Vertex::new(Cow::Borrowed("source"), node, true);
        for ty in types {
            vertex.types.entry(ty).or_default().push(Origin::Literal);
        }
        self.alloc_vertex(vertex)
    }

    /// Returns the shared source vertex for a set of vertex-free types
    pub fn source(&mut self, types: &[Type]) -> VertexId {
        if let Some(&id) = self.interned.get(types) {
            return id;
        }
        debug_assert!(types.iter().all(Type::is_static));
        let id = self.new_source(types.iter().cloned(), None);
        self.interned.insert(types.to_vec(), id);
        id
    }

    /// A permanent vertex that holds no type
    pub fn empty_vertex(&mut self) -> VertexId {
        self.source(&[])
    }

    pub fn vertex(&self, id: VertexId) -> &Vertex {
        &self.vertices[id.index()]
    }

    /// Adds the edge `src -> dst` and propagates every type of `src`.
    ///
    /// The pair is stored once and adding it again changes no types, but each
    /// add bumps an owner count that [`GlobalEnv::remove_edge`] drops again.
    /// Interned sources are shared by many owners, so an edge out of one
    /// must stay until the last owner removes it. Returns whether the edge
    /// is new.
    pub fn add_edge(&mut self, src: VertexId, dst: VertexId) -> bool {
        if !self.vertices[src.index()].alive || !self.vertices[dst.index()].alive {
            warn!(%src, %dst, "ignoring edge touching a destroyed vertex");
            return false;
        }
        let count = self.vertices[src.index()].next.entry(dst).or_insert(0);
        *count += 1;
        if *count > 1 {
            return false;
        }
        self.vertices[dst.index()].incoming += 1;
        self.stats.edges_added += 1;
        trace!(%src, %dst, "edge added");
        let types: Vec<Type> = self.vertices[src.index()].types.keys().cloned().collect();
        if !types.is_empty() {
            self.propagate_added(dst, src, types);
        }
        true
    }

    /// Drops one owner of `src -> dst`; the last owner retracts every type
    /// that was present only because of this edge. Removing an absent edge
    /// is a no-op. Returns whether the edge is gone.
    pub fn remove_edge(&mut self, src: VertexId, dst: VertexId) -> bool {
        let vertex = &mut self.vertices[src.index()];
        let Some(count) = vertex.next.get_mut(&dst) else {
            return false;
        };
        *count -= 1;
        if *count > 0 {
            return false;
        }
        vertex.next.shift_remove(&dst);
        let target = &mut self.vertices[dst.index()];
        target.incoming = target.incoming.saturating_sub(1);
        self.stats.edges_removed += 1;
        trace!(%src, %dst, "edge removed");
        let types: Vec<Type> = self.vertices[src.index()].types.keys().cloned().collect();
        if !types.is_empty() {
            self.propagate_removed(dst, src, types);
        }
        true
    }

    pub fn has_edge(&self, src: VertexId, dst: VertexId) -> bool {
        self.vertices[src.index()].next.contains_key(&dst)
    }

    /// Retracts everything the vertex contributed downstream and marks it dead.
    ///
    /// Edges touching a dead vertex stay recorded until their owners remove
    /// them, and the slot is only reused once they have.
    pub fn destroy_vertex(&mut self, id: VertexId) {
        let vertex = &mut self.vertices[id.index()];
        if !vertex.alive {
            return;
        }
        let next: Vec<VertexId> = vertex.next.keys().copied().collect();
        let types: Vec<Type> = vertex.types.keys().cloned().collect();
        vertex.alive = false;
        if !types.is_empty() {
            for dst in next {
                self.propagate_removed(dst, id, types.clone());
            }
        }
        self.vertices[id.index()].types.clear();
        self.free_vertices.release(id);
    }

    fn propagate_added(&mut self, dst: VertexId, src: VertexId, types: Vec<Type>) {
        let mut worklist = VecDeque::new();
        worklist.push_back((dst, src, types));

        while let Some((at, from, types)) = worklist.pop_front() {
            let vertex = &mut self.vertices[at.index()];
            if !vertex.alive {
                continue;
            }
            let mut fresh = Vec::new();
            for ty in types {
                let origins = vertex.types.entry(ty.clone()).or_default();
                if origins.is_empty() {
                    fresh.push(ty);
                }
                origins.push(Origin::Edge(from));
            }
            if fresh.is_empty() {
                continue;
            }
            let listeners: Vec<SiteId> = vertex.listeners.iter().copied().collect();
            let next: Vec<VertexId> = vertex.next.keys().copied().collect();
            for site in listeners {
                self.add_run(site);
            }
            for succ in next {
                worklist.push_back((succ, at, fresh.clone()));
            }
        }
    }

    fn propagate_removed(&mut self, dst: VertexId, src: VertexId, types: Vec<Type>) {
        let mut worklist = VecDeque::new();
        worklist.push_back((dst, src, types));

        while let Some((at, from, types)) = worklist.pop_front() {
            let vertex = &mut self.vertices[at.index()];
            if !vertex.alive {
                continue;
            }
            let mut gone = Vec::new();
            for ty in types {
                let Some(origins) = vertex.types.get_mut(&ty) else {
                    continue;
                };
                if let Some(pos) = origins.iter().position(|o| *o == Origin::Edge(from)) {
                    origins.remove(pos);
                }
                if origins.is_empty() {
                    vertex.types.shift_remove(&ty);
                    gone.push(ty);
                }
            }
            if gone.is_empty() {
                continue;
            }
            self.stats.type_removals += gone.len();
            let listeners: Vec<SiteId> = vertex.listeners.iter().copied().collect();
            let next: Vec<VertexId> = vertex.next.keys().copied().collect();
            for site in listeners {
                self.add_run(site);
            }
            for succ in next {
                worklist.push_back((succ, at, gone.clone()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::EngineConfig;
    use crate::env::GlobalEnv;
    use crate::graph::{Origin, Type};

    fn env() -> GlobalEnv {
        GlobalEnv::new(EngineConfig::default())
    }

    #[test]
    fn test_edge_propagates_types() {
        let mut env = env();
        let int = Type::instance(env.core().integer);
        let src = env.source(&[int.clone()]);
        let a = env.new_vertex("a", None);
        let b = env.new_vertex("b", None);

        env.add_edge(a, b);
        env.add_edge(src, a);

        assert!(env.vertex(b).contains(&int));
        assert_eq!(env.vertex(b).origins(&int), &[Origin::Edge(a)]);
    }

    #[test]
    fn test_adding_edge_twice_keeps_one_pair() {
        let mut env = env();
        let int = Type::instance(env.core().integer);
        let src = env.source(&[int.clone()]);
        let a = env.new_vertex("a", None);

        assert!(env.add_edge(src, a));
        assert!(!env.add_edge(src, a));
        assert_eq!(env.vertex(src).successors().count(), 1);
        assert_eq!(env.vertex(a).origins(&int).len(), 1);

        // the second owner still holds the pair
        assert!(!env.remove_edge(src, a));
        assert!(env.vertex(a).contains(&int));
        assert!(env.remove_edge(src, a));
        assert!(env.vertex(a).is_empty());
    }

    #[test]
    fn test_removing_absent_edge_is_noop() {
        let mut env = env();
        let a = env.new_vertex("a", None);
        let b = env.new_vertex("b", None);
        assert!(!env.remove_edge(a, b));
        assert_eq!(env.stats().edges_removed, 0);
    }

    #[test]
    fn test_type_survives_while_another_origin_remains() {
        let mut env = env();
        let int = Type::instance(env.core().integer);
        let s1 = env.new_source([int.clone()], None);
        let s2 = env.new_source([int.clone()], None);
        let v = env.new_vertex("v", None);

        env.add_edge(s1, v);
        env.add_edge(s2, v);
        let before = env.stats().type_removals;

        env.remove_edge(s1, v);
        assert!(env.vertex(v).contains(&int));
        assert_eq!(env.stats().type_removals, before);

        env.remove_edge(s2, v);
        assert!(!env.vertex(v).contains(&int));
        assert_eq!(env.stats().type_removals, before + 1);
    }

    #[test]
    fn test_removal_cascades_downstream() {
        let mut env = env();
        let str_ty = Type::instance(env.core().string);
        let src = env.source(&[str_ty.clone()]);
        let a = env.new_vertex("a", None);
        let b = env.new_vertex("b", None);
        let c = env.new_vertex("c", None);
        env.add_edge(a, b);
        env.add_edge(b, c);
        env.add_edge(src, a);
        assert!(env.vertex(c).contains(&str_ty));

        env.remove_edge(src, a);
        assert!(env.vertex(a).is_empty());
        assert!(env.vertex(c).is_empty());
    }

    #[test]
    fn test_destroyed_vertex_retracts_and_rejects_edges() {
        let mut env = env();
        let int = Type::instance(env.core().integer);
        let src = env.new_source([int.clone()], None);
        let v = env.new_vertex("v", None);
        env.add_edge(src, v);

        env.destroy_vertex(src);
        assert!(env.vertex(v).is_empty());
        assert!(!env.add_edge(src, v));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_add_then_remove_restores_reachability(
                chain in 2usize..6,
                extra in proptest::collection::vec((0usize..6, 0usize..6), 0..8),
            ) {
                let mut env = env();
                let int = Type::instance(env.core().integer);
                let src = env.source(&[int.clone()]);
                let vs: Vec<_> = (0..chain).map(|_| env.new_vertex("v", None)).collect();
                for w in vs.windows(2) {
                    env.add_edge(w[0], w[1]);
                }
                for &(a, b) in &extra {
                    env.add_edge(vs[a % chain], vs[b % chain]);
                }
                let last = vs[chain - 1];

                env.add_edge(src, vs[0]);
                prop_assert!(env.vertex(last).contains(&int));

                env.remove_edge(src, vs[0]);
                if extra.is_empty() {
                    for &v in &vs {
                        prop_assert!(env.vertex(v).is_empty());
                    }
                }
            }

            #[test]
            fn prop_repeated_add_is_idempotent(times in 1usize..5) {
                let mut env = env();
                let int = Type::instance(env.core().integer);
                let src = env.source(&[int.clone()]);
                let v = env.new_vertex("v", None);
                for _ in 0..times {
                    env.add_edge(src, v);
                }
                prop_assert_eq!(env.vertex(src).successors().count(), 1);
                prop_assert_eq!(env.vertex(v).origins(&int).len(), 1);
            }
        }
    }
}
