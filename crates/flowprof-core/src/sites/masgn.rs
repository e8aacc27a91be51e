use std::rc::Rc;

use crate::env::GlobalEnv;
use crate::error::Result;
use crate::graph::{Changes, Type, VertexId};

/// Destructuring assignment `a, b = rhs`
#[derive(Debug, Clone, PartialEq)]
pub struct MAsgnSite {
    pub rhs: VertexId,
    pub lhss: Rc<[VertexId]>,
}

impl MAsgnSite {
    pub(crate) fn run0(&self, env: &mut GlobalEnv, changes: &mut Changes) -> Result<()> {
        let types: Vec<Type> = env.vertex(self.rhs).types().cloned().collect();
        for ty in types {
            match &ty {
                Type::Array { elems, elem } => {
                    for (i, &lhs) in self.lhss.iter().enumerate() {
                        let src = match elems {
                            Some(elems) => match elems.get(i) {
                                Some(&e) => e,
                                None => env.source(&[Type::Nil]),
                            },
                            None => *elem,
                        };
                        changes.add_edge(src, lhs);
                    }
                }
                Type::Instance { module, args } if *module == env.core().array => {
                    if let Some(&elem) = args.first() {
                        for &lhs in self.lhss.iter() {
                            changes.add_edge(elem, lhs);
                        }
                    }
                }
                _ => {
                    if let Some(&first) = self.lhss.first() {
                        let src = changes.type_source(env, "masgn", ty.clone());
                        changes.add_edge(src, first);
                    }
                }
            }
        }
        Ok(())
    }
}
