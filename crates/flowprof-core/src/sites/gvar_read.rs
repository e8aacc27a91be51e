use crate::env::GlobalEnv;
use crate::error::Result;
use crate::graph::{Changes, VertexId};

#[derive(Debug, Clone, PartialEq)]
pub struct GVarReadSite {
    pub name: String,
    pub ret: VertexId,
}

impl GVarReadSite {
    pub(crate) fn run0(&self, env: &mut GlobalEnv, changes: &mut Changes) -> Result<()> {
        let vtx = env.gvar_vertex(&self.name);
        changes.add_edge(vtx, self.ret);
        Ok(())
    }
}
