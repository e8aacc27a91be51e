//! flowprof: incremental, flow-based type inference
//!
//! Programs are turned into a constraint graph. Vertices hold sets of types
//! and forward every type they gain or lose along their edges; sites watch
//! vertices and, when re-run, recompute the edges and child sites they are
//! responsible for. Editing a document installs the new tree, drains the run
//! queue to a fixpoint and retracts whatever the old tree contributed.
//!
//! ```
//! use flowprof_core::{ast::Node, Service, TextId};
//!
//! let mut service = Service::new();
//! let tree = Node::program(vec![Node::const_write("X", Node::str("hello"))]);
//! let text_id = TextId { path: "main.rb".into(), version: 0 };
//! service.update_tree(text_id, tree).unwrap();
//! assert_eq!(service.constant_type(&["X"]).as_deref(), Some("String"));
//! ```

pub mod ast;
pub mod builtin;
pub mod config;
pub mod diagnostic;
pub mod env;
pub mod error;
pub mod graph;
pub mod service;
pub mod signature;
pub mod sites;

pub use config::EngineConfig;
pub use diagnostic::{Diagnostic, DiagnosticKind, ReportedDiagnostic};
pub use env::{EngineStats, GlobalEnv};
pub use error::{EngineError, Result};
pub use graph::{Changes, SiteKind, Type, VertexId};
pub use service::{Frontend, JsonFrontend, Location, Service, TextId};
pub use signature::{MethodType, SigType};
