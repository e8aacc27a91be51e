use std::collections::HashSet;

use super::{Changes, ModuleId, Type, VertexId};
use crate::env::GlobalEnv;

impl GlobalEnv {
    /// Checks that every type at `actual` is accepted by some type at `formal`.
    ///
    /// A formal holding a type variable accepts anything and collects the
    /// actual types into the variable's vertex through a pending edge. Every
    /// superclass consulted is recorded as a dependency in `changes`.
    pub fn check_match(&self, changes: &mut Changes, actual: VertexId, formal: VertexId) -> bool {
        for ty in self.vertex(formal).types() {
            if let Type::Var { vtx, .. } = ty {
                if *vtx != actual {
                    changes.add_edge(actual, *vtx);
                }
                return true;
            }
        }

        let actual_types: Vec<Type> = self.vertex(actual).types().cloned().collect();
        if actual_types.is_empty() {
            return true;
        }
        let formal_types: Vec<Type> = self.vertex(formal).types().cloned().collect();
        actual_types
            .iter()
            .all(|ty| formal_types.iter().any(|f| self.match_type(changes, ty, f)))
    }

    fn match_type(&self, changes: &mut Changes, actual: &Type, formal: &Type) -> bool {
        match (actual, formal) {
            (_, Type::Untyped) | (Type::Untyped, _) | (Type::Bot, _) | (_, Type::Var { .. }) => true,
            (Type::Nil, Type::Nil) | (Type::True, Type::True) | (Type::False, Type::False) => true,
            (
                Type::Instance {
                    module: a,
                    args: a_args,
                },
                Type::Instance {
                    module: f,
                    args: f_args,
                },
            ) => {
                if !self.is_subclass(changes, *a, *f) {
                    return false;
                }
                a != f
                    || a_args
                        .iter()
                        .zip(f_args)
                        .all(|(&x, &y)| self.check_match(changes, x, y))
            }
            (Type::Singleton(a), Type::Singleton(f)) => self.is_subclass(changes, *a, *f),
            (Type::Singleton(a), Type::Instance { module: f, .. }) => {
                let meta = if self.module(*a).is_class() {
                    self.core().class
                } else {
                    self.core().module
                };
                self.is_subclass(changes, meta, *f)
            }
            (
                Type::Array {
                    elems: Some(a), ..
                },
                Type::Array {
                    elems: Some(f), ..
                },
            ) => a.len() == f.len() && a.iter().zip(f).all(|(&x, &y)| self.check_match(changes, x, y)),
            (Type::Proc(a), Type::Proc(f)) => a == f,
            _ => match (self.base_type(actual), self.base_type(formal)) {
                (Some(base_a), Some(base_f)) if base_a != *actual || base_f != *formal => {
                    self.match_type(changes, &base_a, &base_f)
                }
                _ => false,
            },
        }
    }

    /// Walks the superclass chain and includes of `module` looking for `target`
    pub fn is_subclass(&self, changes: &mut Changes, module: ModuleId, target: ModuleId) -> bool {
        let mut seen = HashSet::new();
        let mut cur = Some(module);
        while let Some(m) = cur {
            if !seen.insert(m) {
                break;
            }
            changes.add_depended_superclass(m);
            if m == target || self.includes_module(m, target, &mut HashSet::new()) {
                return true;
            }
            cur = self.module(m).superclass;
        }
        false
    }

    fn includes_module(&self, module: ModuleId, target: ModuleId, seen: &mut HashSet<ModuleId>) -> bool {
        if !seen.insert(module) {
            return false;
        }
        self.module(module)
            .included_modules()
            .any(|inc| inc == target || self.includes_module(inc, target, seen))
    }
}

#[cfg(test)]
mod tests {
    use crate::config::EngineConfig;
    use crate::env::GlobalEnv;
    use crate::graph::{Changes, Type};

    #[test]
    fn test_subclass_instances_match_superclass() {
        let mut env = GlobalEnv::new(EngineConfig::default());
        let core = env.core().clone();
        let int = env.source(&[Type::instance(core.integer)]);
        let obj = env.source(&[Type::instance(core.object)]);
        let string = env.source(&[Type::instance(core.string)]);
        let mut changes = Changes::default();

        assert!(env.check_match(&mut changes, int, obj));
        assert!(!env.check_match(&mut changes, int, string));
    }

    #[test]
    fn test_nil_matches_nil_class_and_empty_matches_anything() {
        let mut env = GlobalEnv::new(EngineConfig::default());
        let core = env.core().clone();
        let nil = env.source(&[Type::Nil]);
        let nil_class = env.source(&[Type::instance(core.nil)]);
        let empty = env.empty_vertex();
        let mut changes = Changes::default();

        assert!(env.check_match(&mut changes, nil, nil_class));
        assert!(env.check_match(&mut changes, empty, nil_class));
    }

    #[test]
    fn test_type_variable_collects_actual() {
        let mut env = GlobalEnv::new(EngineConfig::default());
        let core = env.core().clone();
        let int = env.source(&[Type::instance(core.integer)]);
        let var = env.new_vertex("T", None);
        let formal = env.new_source(
            [Type::Var {
                name: "T".into(),
                vtx: var,
            }],
            None,
        );
        let mut changes = Changes::default();

        assert!(env.check_match(&mut changes, int, formal));
        assert_eq!(changes.pending_edges().collect::<Vec<_>>(), vec![(int, var)]);
    }
}
