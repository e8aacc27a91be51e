//! Declared method and constant types
//!
//! Signature types are turned into vertices on demand with
//! [`SigType::get_vertex`], substituting type variables through a
//! [`ParamMap`].

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::env::GlobalEnv;
use crate::error::Result;
use crate::graph::{Changes, Type, VertexId};

/// Type variable name to the vertex it stands for. `self` maps to the receiver.
pub type ParamMap = IndexMap<String, VertexId>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SigType {
    Instance {
        cpath: Vec<String>,
        #[serde(default)]
        args: Vec<SigType>,
    },
    Singleton {
        cpath: Vec<String>,
    },
    Var {
        name: String,
    },
    Union {
        members: Vec<SigType>,
    },
    Tuple {
        members: Vec<SigType>,
    },
    Optional {
        inner: Box<SigType>,
    },
    Nil,
    Bool,
    Untyped,
    #[serde(rename = "self")]
    SelfType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockType {
    #[serde(default)]
    pub req: Vec<SigType>,
    pub ret: SigType,
}

/// One overload of a declared method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodType {
    #[serde(default)]
    pub type_params: Vec<String>,
    #[serde(default)]
    pub req: Vec<SigType>,
    #[serde(default)]
    pub opt: Vec<SigType>,
    #[serde(default)]
    pub rest: Option<SigType>,
    #[serde(default)]
    pub post: Vec<SigType>,
    #[serde(default)]
    pub block: Option<BlockType>,
    pub ret: SigType,
}

/// The substitution every lookup starts from: `self` bound to the receiver type
pub(crate) fn default_param_map(env: &mut GlobalEnv, changes: &mut Changes, recv: &Type) -> ParamMap {
    let mut map = ParamMap::new();
    let vtx = changes.type_source(env, "self", recv.clone());
    map.insert("self".to_string(), vtx);
    map
}

impl SigType {
    pub fn instance(cpath: &str) -> Self {
        SigType::Instance {
            cpath: cpath.split("::").map(str::to_string).collect(),
            args: Vec::new(),
        }
    }

    pub fn var(name: &str) -> Self {
        SigType::Var {
            name: name.to_string(),
        }
    }

    /// Returns a vertex holding this type, allocating private vertices in `changes`
    pub fn get_vertex(&self, env: &mut GlobalEnv, changes: &mut Changes, subst: &ParamMap) -> Result<VertexId> {
        let vtx = match self {
            SigType::Instance { cpath, args } => {
                let module = env.resolve_cpath(cpath);
                if args.is_empty() {
                    env.source(&[Type::instance(module)])
                } else {
                    let args = args
                        .iter()
                        .map(|a| a.get_vertex(env, changes, subst))
                        .collect::<Result<Vec<_>>>()?;
                    changes.fresh_source(env, "sig-instance", vec![Type::Instance { module, args }])
                }
            }
            SigType::Singleton { cpath } => {
                let module = env.resolve_cpath(cpath);
                env.source(&[Type::Singleton(module)])
            }
            SigType::Var { name } => match subst.get(name) {
                Some(&vtx) => vtx,
                None => env.empty_vertex(),
            },
            SigType::SelfType => match subst.get("self") {
                Some(&vtx) => vtx,
                None => env.empty_vertex(),
            },
            SigType::Union { members } => union_vertex(env, changes, subst, members.iter())?,
            SigType::Optional { inner } => {
                union_vertex(env, changes, subst, [inner.as_ref(), &SigType::Nil].into_iter())?
            }
            SigType::Tuple { members } => {
                let elems = members
                    .iter()
                    .map(|m| m.get_vertex(env, changes, subst))
                    .collect::<Result<Vec<_>>>()?;
                let elem = union_of(env, changes, &elems);
                changes.fresh_source(
                    env,
                    "sig-tuple",
                    vec![Type::Array {
                        elems: Some(elems),
                        elem,
                    }],
                )
            }
            SigType::Nil => env.source(&[Type::Nil]),
            SigType::Bool => env.source(&[Type::True, Type::False]),
            SigType::Untyped => env.source(&[Type::Untyped]),
        };
        Ok(vtx)
    }
}

fn union_vertex<'a>(
    env: &mut GlobalEnv,
    changes: &mut Changes,
    subst: &ParamMap,
    members: impl Iterator<Item = &'a SigType>,
) -> Result<VertexId> {
    let mut vtxs = Vec::new();
    for member in members {
        vtxs.push(member.get_vertex(env, changes, subst)?);
    }
    Ok(union_of(env, changes, &vtxs))
}

/// Merges member vertices. Source members are merged eagerly so that the
/// result can be matched against in the same run; others are joined by edges.
fn union_of(env: &mut GlobalEnv, changes: &mut Changes, members: &[VertexId]) -> VertexId {
    if members.iter().all(|&m| env.vertex(m).is_source()) {
        let mut types: Vec<Type> = Vec::new();
        for &m in members {
            for ty in env.vertex(m).types() {
                if !types.contains(ty) {
                    types.push(ty.clone());
                }
            }
        }
        return changes.fresh_source(env, "sig-union", types);
    }
    let vtx = changes.fresh_vertex(env, "sig-union");
    for &m in members {
        changes.add_edge(m, vtx);
    }
    vtx
}
