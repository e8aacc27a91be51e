use smallvec::SmallVec;
use std::mem;
use std::rc::Rc;
use tracing::trace;

use super::{Changes, NodeId, Owner, SiteId, VertexId};
use crate::env::GlobalEnv;
use crate::error::Result;
use crate::sites::{
    CallSite, CheckReturnSite, ConstReadSite, GVarReadSite, IVarReadSite, MAsgnSite,
    MethodDeclSite, MethodDefSite, TypeReadSite,
};

/// The closed set of site variants
#[derive(Debug, Clone, PartialEq)]
pub enum SiteKind {
    ConstRead(ConstReadSite),
    TypeRead(TypeReadSite),
    MethodDecl(MethodDeclSite),
    MethodDef(MethodDefSite),
    CheckReturn(CheckReturnSite),
    Call(CallSite),
    GVarRead(GVarReadSite),
    IVarRead(IVarReadSite),
    MAsgn(MAsgnSite),
}

impl SiteKind {
    pub fn name(&self) -> &'static str {
        match self {
            SiteKind::ConstRead(_) => "const_read",
            SiteKind::TypeRead(_) => "type_read",
            SiteKind::MethodDecl(_) => "method_decl",
            SiteKind::MethodDef(_) => "method_def",
            SiteKind::CheckReturn(_) => "check_return",
            SiteKind::Call(_) => "call",
            SiteKind::GVarRead(_) => "gvar_read",
            SiteKind::IVarRead(_) => "ivar_read",
            SiteKind::MAsgn(_) => "masgn",
        }
    }

    /// Vertices whose type changes schedule the site
    pub fn inputs(&self) -> SmallVec<[VertexId; 4]> {
        match self {
            SiteKind::Call(call) => {
                let mut inputs = SmallVec::new();
                inputs.push(call.recv);
                inputs.extend(call.args.iter().copied());
                inputs.extend(call.block);
                inputs
            }
            SiteKind::CheckReturn(check) => smallvec::smallvec![check.a_ret],
            SiteKind::MAsgn(masgn) => smallvec::smallvec![masgn.rhs],
            _ => SmallVec::new(),
        }
    }

    pub fn ret(&self) -> Option<VertexId> {
        match self {
            SiteKind::ConstRead(site) => Some(site.ret),
            SiteKind::TypeRead(site) => Some(site.ret),
            SiteKind::MethodDef(site) => Some(site.ret),
            SiteKind::Call(site) => Some(site.ret),
            SiteKind::GVarRead(site) => Some(site.ret),
            SiteKind::IVarRead(site) => Some(site.ret),
            _ => None,
        }
    }

    fn on_install(&self, env: &mut GlobalEnv, id: SiteId) -> Result<()> {
        match self {
            SiteKind::MethodDecl(site) => site.on_install(env, id),
            SiteKind::MethodDef(site) => site.on_install(env, id),
            SiteKind::IVarRead(site) => site.on_install(env, id),
            _ => Ok(()),
        }
    }

    fn on_uninstall(&self, env: &mut GlobalEnv, id: SiteId) -> Result<()> {
        match self {
            SiteKind::MethodDecl(site) => site.on_uninstall(env, id),
            SiteKind::MethodDef(site) => site.on_uninstall(env, id),
            SiteKind::IVarRead(site) => site.on_uninstall(env, id),
            _ => Ok(()),
        }
    }

    fn run0(&self, env: &mut GlobalEnv, id: SiteId, node: NodeId, changes: &mut Changes) -> Result<()> {
        match self {
            SiteKind::ConstRead(site) => site.run0(env, changes),
            SiteKind::TypeRead(site) => site.run0(env, changes),
            SiteKind::MethodDecl(_) => Ok(()),
            SiteKind::MethodDef(site) => site.run0(env, node, changes),
            SiteKind::CheckReturn(site) => site.run0(env, node, changes),
            SiteKind::Call(site) => site.run0(env, id, node, changes),
            SiteKind::GVarRead(site) => site.run0(env, changes),
            SiteKind::IVarRead(site) => site.run0(env, changes),
            SiteKind::MAsgn(site) => site.run0(env, changes),
        }
    }
}

/// Arena slot of a site
#[derive(Debug)]
pub struct SiteSlot {
    pub(crate) node: NodeId,
    pub(crate) kind: Rc<SiteKind>,
    pub(crate) changes: Changes,
    pub(crate) destroyed: bool,
}

impl SiteSlot {
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn kind(&self) -> &SiteKind {
        &self.kind
    }

    pub fn changes(&self) -> &Changes {
        &self.changes
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

impl GlobalEnv {
    pub fn site(&self, id: SiteId) -> &SiteSlot {
        &self.sites[id.index()]
    }

    pub(crate) fn site_kind(&self, id: SiteId) -> Rc<SiteKind> {
        Rc::clone(&self.sites[id.index()].kind)
    }

    /// A live site bound to `node` with an equal description can stand in for a new one
    pub(crate) fn site_matches(&self, id: SiteId, node: NodeId, kind: &SiteKind) -> bool {
        let slot = &self.sites[id.index()];
        !slot.destroyed && slot.node == node && *slot.kind == *kind
    }

    pub(crate) fn create_site(&mut self, node: NodeId, kind: SiteKind) -> Result<SiteId> {
        let inputs = kind.inputs();
        let name = kind.name();
        let kind = Rc::new(kind);
        let slot = SiteSlot {
            node,
            kind: Rc::clone(&kind),
            changes: Changes::default(),
            destroyed: false,
        };
        let id = match self.free_sites.pop() {
            Some(id) => {
                self.sites[id.index()] = slot;
                id
            }
            None => {
                self.sites.push(slot);
                SiteId(self.sites.len() as u32 - 1)
            }
        };
        for vtx in inputs {
            self.vertices[vtx.index()].listeners.insert(id);
        }
        if let Some(record) = self.nodes.get_mut(&node) {
            record.sites.insert(id);
        }
        self.stats.site_created(name);
        trace!(site = %id, %node, kind = name, "site created");

        kind.on_install(self, id)?;
        self.add_run(id);
        Ok(id)
    }

    /// Tears a site down and rolls back everything its last run installed
    pub(crate) fn destroy_site(&mut self, id: SiteId) -> Result<()> {
        let slot = &mut self.sites[id.index()];
        if slot.destroyed {
            return Ok(());
        }
        slot.destroyed = true;
        let node = slot.node;
        let kind = Rc::clone(&slot.kind);

        for vtx in kind.inputs() {
            self.vertices[vtx.index()].listeners.shift_remove(&id);
        }
        if let Some(record) = self.nodes.get_mut(&node) {
            record.sites.shift_remove(&id);
        }
        kind.on_uninstall(self, id)?;

        let mut changes = mem::take(&mut self.sites[id.index()].changes);
        changes.discard_pending();
        let result = changes.reinstall(self, Owner::Site(id));
        self.sites[id.index()].changes = changes;
        self.free_sites.release(id);
        self.stats.site_destroyed(kind.name());
        trace!(site = %id, kind = kind.name(), "site destroyed");
        result
    }

    pub(crate) fn run_site(&mut self, id: SiteId) -> Result<()> {
        let slot = &mut self.sites[id.index()];
        if slot.destroyed {
            return Ok(());
        }
        let node = slot.node;
        let kind = Rc::clone(&slot.kind);
        let mut changes = mem::take(&mut slot.changes);
        changes.discard_pending();

        self.stats.site_runs += 1;
        let result = kind
            .run0(self, id, node, &mut changes)
            .and_then(|()| changes.reinstall(self, Owner::Site(id)));
        self.sites[id.index()].changes = changes;
        result
    }
}
