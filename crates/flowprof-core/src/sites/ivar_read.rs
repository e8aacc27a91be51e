use crate::env::{GlobalEnv, IVarKey};
use crate::error::Result;
use crate::graph::{Changes, ModuleId, SiteId, VertexId};

/// Reads an instance variable as seen from `module`.
///
/// All reads and writes of a name are unified at the root-most ancestor
/// that defines it; a read from a subclass is forwarded there through
/// `proxy`.
#[derive(Debug, Clone, PartialEq)]
pub struct IVarReadSite {
    pub module: ModuleId,
    pub singleton: bool,
    pub name: String,
    pub proxy: VertexId,
    pub ret: VertexId,
}

impl IVarReadSite {
    pub(crate) fn on_install(&self, env: &mut GlobalEnv, id: SiteId) -> Result<()> {
        env.module_mut(self.module).ivar_reads.insert(id);
        Ok(())
    }

    pub(crate) fn on_uninstall(&self, env: &mut GlobalEnv, id: SiteId) -> Result<()> {
        env.module_mut(self.module).ivar_reads.shift_remove(&id);
        Ok(())
    }

    pub(crate) fn run0(&self, env: &mut GlobalEnv, changes: &mut Changes) -> Result<()> {
        let own = env
            .ensure_ivar_entity(&IVarKey {
                module: self.module,
                singleton: self.singleton,
                name: self.name.clone(),
            })
            .vtx;

        let mut target = None;
        for (module, singleton) in env.superclass_chain(self.module, self.singleton) {
            changes.add_depended_superclass(module);
            let key = IVarKey {
                module,
                singleton,
                name: self.name.clone(),
            };
            if let Some(ive) = env.ivar_entity(&key) {
                if ive.exists() {
                    target = Some(ive.vtx);
                }
            }
        }

        if let Some(target) = target {
            if target != own {
                changes.add_edge(own, self.proxy);
                changes.add_edge(self.proxy, target);
            }
            changes.add_edge(target, self.ret);
        }
        Ok(())
    }
}
