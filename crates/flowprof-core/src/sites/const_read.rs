use std::rc::Rc;

use crate::env::{ConstKey, GlobalEnv};
use crate::error::Result;
use crate::graph::{Changes, ModuleId, VertexId};

/// Reads a constant, searching the lexical scopes and then the ancestors
/// of the innermost one
#[derive(Debug, Clone, PartialEq)]
pub struct ConstReadSite {
    pub name: String,
    /// Explicit qualification, which disables the lexical search
    pub scope: Option<ModuleId>,
    /// Lexical scopes, innermost first
    pub cref: Rc<[ModuleId]>,
    pub ret: VertexId,
}

impl ConstReadSite {
    pub(crate) fn run0(&self, env: &mut GlobalEnv, changes: &mut Changes) -> Result<()> {
        if let Some(key) = self.resolve(env, changes) {
            let vtx = env.ensure_const_entity(&key).vtx;
            changes.add_edge(vtx, self.ret);
        }
        Ok(())
    }

    fn lookup_in(&self, env: &mut GlobalEnv, changes: &mut Changes, module: ModuleId) -> Option<ConstKey> {
        let key = ConstKey::new(module, self.name.clone());
        let exists = env.ensure_const_entity(&key).exists();
        changes.add_depended_static_read(key.clone());
        exists.then_some(key)
    }

    fn resolve(&self, env: &mut GlobalEnv, changes: &mut Changes) -> Option<ConstKey> {
        let start = match self.scope {
            Some(scope) => scope,
            None => {
                for &module in self.cref.iter() {
                    if let Some(key) = self.lookup_in(env, changes, module) {
                        return Some(key);
                    }
                }
                *self.cref.first()?
            }
        };
        for (module, _) in env.superclass_chain(start, false) {
            changes.add_depended_superclass(module);
            if let Some(key) = self.lookup_in(env, changes, module) {
                return Some(key);
            }
        }
        None
    }
}
