use crate::env::GlobalEnv;
use crate::error::Result;
use crate::graph::{Changes, VertexId};
use crate::signature::{ParamMap, SigType};

/// Materializes a declared type into `ret`
#[derive(Debug, Clone, PartialEq)]
pub struct TypeReadSite {
    pub ty: SigType,
    pub ret: VertexId,
}

impl TypeReadSite {
    pub(crate) fn run0(&self, env: &mut GlobalEnv, changes: &mut Changes) -> Result<()> {
        let vtx = self.ty.get_vertex(env, changes, &ParamMap::new())?;
        changes.add_edge(vtx, self.ret);
        Ok(())
    }
}
