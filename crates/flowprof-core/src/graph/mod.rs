//! Constraint graph: vertices, edges, sites and the Changes buffer
//!
//! Every graph object lives in an arena owned by [`crate::env::GlobalEnv`]
//! and is addressed by a small integer id. Edges are keyed by
//! `(source, destination)` id pairs.

mod changes;
mod matching;
mod site;
mod types;
mod vertex;

pub use changes::{Changes, Owner, SiteKey};
pub use site::{SiteKind, SiteSlot};
pub use types::Type;
pub(crate) use types::strip_parens;
pub use vertex::{Origin, Vertex};

use serde::Serialize;
use std::fmt;

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

arena_id!(
    /// Index of a vertex in the vertex arena
    VertexId,
    "v"
);
arena_id!(
    /// Index of a site in the site arena
    SiteId,
    "s"
);
arena_id!(
    /// Index of a module or class entity
    ModuleId,
    "m"
);
arena_id!(
    /// Index of an installed block (closure) record
    BlockId,
    "b"
);
arena_id!(
    /// Identity of an AST node, allocated by the environment when a tree is numbered
    NodeId,
    "n"
);
