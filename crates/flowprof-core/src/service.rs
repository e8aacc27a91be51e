//! Document management and editor queries
//!
//! A [`Service`] owns the [`GlobalEnv`] and the installed tree of every open
//! document. Updating a document installs the new tree next to the old one,
//! drains the run queue, and only then tears the old tree down, so that
//! definitions present in both versions never disappear in between.

use colored::Colorize;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::fmt::{self, Write as _};
use std::rc::Rc;
use tracing::{debug, error, info};

use crate::ast::diff::diff;
use crate::ast::install::{uninstall_tree, Installer};
use crate::ast::{Node, NodeKind, Pos, Span};
use crate::config::EngineConfig;
use crate::diagnostic::{Anchor, ReportedDiagnostic};
use crate::env::{ConstKey, GlobalEnv, MethodKey, Registration};
use crate::error::{EngineError, Result};
use crate::graph::{ModuleId, NodeId, SiteId, SiteKind, Type, VertexId};
use crate::sites::CallSite;

/// A document path at one version
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextId {
    pub path: String,
    pub version: u64,
}

impl fmt::Display for TextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.path, self.version)
    }
}

/// Turns source text into a tree
pub trait Frontend {
    fn parse(&self, text_id: &TextId, source: &str) -> Result<Node>;
}

/// Reads trees serialized as JSON
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonFrontend;

impl Frontend for JsonFrontend {
    fn parse(&self, text_id: &TextId, source: &str) -> Result<Node> {
        serde_json::from_str(source).map_err(|e| EngineError::Parse {
            path: text_id.path.clone(),
            message: e.to_string(),
        })
    }
}

#[derive(Debug)]
struct Document {
    text_id: TextId,
    tree: Node,
}

/// A location in a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub path: String,
    pub span: Span,
}

pub struct Service {
    env: GlobalEnv,
    frontend: Box<dyn Frontend>,
    documents: IndexMap<String, Document>,
}

impl Default for Service {
    fn default() -> Self {
        Self::new()
    }
}

impl Service {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self::with_frontend(config, JsonFrontend)
    }

    pub fn with_frontend(config: EngineConfig, frontend: impl Frontend + 'static) -> Self {
        Self {
            env: GlobalEnv::new(config),
            frontend: Box::new(frontend),
            documents: IndexMap::new(),
        }
    }

    pub fn env(&self) -> &GlobalEnv {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut GlobalEnv {
        &mut self.env
    }

    pub fn version(&self, path: &str) -> Option<u64> {
        self.documents.get(path).map(|d| d.text_id.version)
    }

    pub fn tree(&self, path: &str) -> Option<&Node> {
        self.documents.get(path).map(|d| &d.tree)
    }

    /// Parses and installs a new version of `path`, one past the current one
    pub fn update_file(&mut self, path: &str, source: &str) -> Result<()> {
        let version = self.version(path).map_or(0, |v| v + 1);
        self.update_file_versioned(path, version, source)
    }

    pub fn update_file_versioned(&mut self, path: &str, version: u64, source: &str) -> Result<()> {
        let text_id = TextId {
            path: path.to_string(),
            version,
        };
        let tree = self.frontend.parse(&text_id, source)?;
        self.update_tree(text_id, tree)
    }

    /// Installs `tree` as the new version of a document.
    ///
    /// When installing or the first drain fails, the partly installed tree is
    /// torn down again and the previous version, if any, stays in effect.
    pub fn update_tree(&mut self, text_id: TextId, mut tree: Node) -> Result<()> {
        let env = &mut self.env;
        tree.number(&mut || env.next_node_id());

        let path = text_id.path.clone();
        let reuse = match self.documents.get(&path) {
            Some(prev) if self.env.config().reuse_unchanged_definitions => diff(&tree, &prev.tree),
            _ => HashMap::new(),
        };

        let mut installer = Installer::new(&mut self.env, Rc::from(path.as_str()), &reuse);
        let installed = installer.install(&tree).map(|_| installer.reused);
        let (reused, mut runs) = match installed.and_then(|reused| Ok((reused, self.env.run_all()?))) {
            Ok(done) => done,
            Err(err) => {
                error!(document = %text_id, %err, "update failed, rolling back");
                let prev = self.documents.shift_remove(&path);
                self.roll_back(&tree, prev);
                return Err(err);
            }
        };

        let document = text_id.to_string();
        let prev = self.documents.insert(path.clone(), Document { text_id, tree });
        if let Some(prev) = prev {
            let owned = owned_state(&self.env, &prev.tree);
            uninstall_tree(&mut self.env, &prev.tree)?;
            runs += self.env.run_all()?;
            if self.env.config().validate_invariants {
                self.validate_replaced(&path, &owned)?;
            }
        }
        let reclaimed = self.env.reclaim();

        info!(%document, reused, runs, reclaimed, "document updated");
        Ok(())
    }

    /// Tears down whatever part of `tree` got installed and installs the
    /// previous version again from scratch
    fn roll_back(&mut self, tree: &Node, prev: Option<Document>) {
        let restored = uninstall_tree(&mut self.env, tree)
            .and_then(|()| self.env.run_all())
            .and_then(|_| match &prev {
                Some(prev) => self.reinstall(prev),
                None => Ok(()),
            });
        match (restored, prev) {
            (Ok(()), Some(prev)) => {
                debug!(document = %prev.text_id, "previous version restored");
                self.documents.insert(prev.text_id.path.clone(), prev);
            }
            (Ok(()), None) => {}
            (Err(err), prev) => {
                error!(%err, "rollback failed, dropping the document");
                if let Some(prev) = prev {
                    if let Err(err) = uninstall_tree(&mut self.env, &prev.tree) {
                        error!(document = %prev.text_id, %err, "could not tear down the previous version");
                    }
                }
            }
        }
        self.env.reclaim();
    }

    /// Installs a document again without reusing anything it installed before
    fn reinstall(&mut self, doc: &Document) -> Result<()> {
        uninstall_tree(&mut self.env, &doc.tree)?;
        self.env.run_all()?;
        let no_reuse = HashMap::new();
        Installer::new(&mut self.env, Rc::from(doc.text_id.path.as_str()), &no_reuse).install(&doc.tree)?;
        self.env.run_all()?;
        Ok(())
    }

    /// Uninstalls a document entirely
    pub fn remove_file(&mut self, path: &str) -> Result<()> {
        let doc = self
            .documents
            .shift_remove(path)
            .ok_or_else(|| EngineError::UnknownDocument(path.to_string()))?;
        uninstall_tree(&mut self.env, &doc.tree)?;
        let runs = self.env.run_all()?;
        let reclaimed = self.env.reclaim();
        info!(document = %doc.text_id, runs, reclaimed, "document removed");
        Ok(())
    }

    /// Nothing the replaced tree still owned before its uninstall may survive it
    fn validate_replaced(&self, path: &str, owned: &OwnedState) -> Result<()> {
        let vertices = owned
            .vertices
            .iter()
            .filter(|&&v| self.env.vertex(v).is_alive())
            .count();
        let sites = owned
            .sites
            .iter()
            .filter(|&&s| !self.env.site(s).is_destroyed())
            .count();
        if vertices > 0 || sites > 0 {
            error!(path, vertices, sites, "replaced tree left live state behind");
            return Err(EngineError::DanglingReuse {
                path: path.to_string(),
                vertices,
                sites,
            });
        }
        debug!(
            path,
            vertices = owned.vertices.len(),
            sites = owned.sites.len(),
            "replaced tree fully released"
        );
        Ok(())
    }

    fn document(&self, path: &str) -> Result<&Document> {
        self.documents
            .get(path)
            .ok_or_else(|| EngineError::UnknownDocument(path.to_string()))
    }

    /// The innermost node whose span contains `pos`
    pub fn node_at(&self, path: &str, pos: Pos) -> Option<&Node> {
        let doc = self.documents.get(path)?;
        let mut found = None;
        doc.tree.walk(&mut |n| {
            if n.span.contains(pos) {
                found = Some(n);
            }
        });
        found
    }

    fn call_site(&self, node: NodeId) -> Option<&CallSite> {
        let record = self.env.node_record(node)?;
        record.sites().find_map(|site| {
            let slot = self.env.site(site);
            match slot.kind() {
                SiteKind::Call(call) if slot.node() == node && !slot.is_destroyed() => Some(call),
                _ => None,
            }
        })
    }

    /// Method lookup sides for every receiver type of a call
    fn receiver_sides(&self, node: NodeId) -> Vec<(ModuleSide, String)> {
        let Some(call) = self.call_site(node) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for ty in self.env.vertex(call.recv).types() {
            let side = match self.env.base_type(ty) {
                Some(Type::Instance { module, .. }) => (module, false),
                Some(Type::Singleton(module)) => (module, true),
                _ => continue,
            };
            if !out.contains(&(side, call.name.clone())) {
                out.push((side, call.name.clone()));
            }
        }
        out
    }

    /// `Recv#name` for a call under the cursor, the inferred type of any other node
    pub fn hover(&self, path: &str, pos: Pos) -> Option<String> {
        let node = self.node_at(path, pos)?;
        if let NodeKind::Call { .. } = node.kind {
            let shown: Vec<String> = self
                .receiver_sides(node.id)
                .into_iter()
                .map(|((module, singleton), name)| {
                    self.env.show_method_key(&MethodKey::new(module, singleton, name))
                })
                .collect();
            if !shown.is_empty() {
                return Some(shown.join("\n"));
            }
        }
        let ret = self.env.node_record(node.id)?.ret()?;
        Some(self.env.show_vertex(ret))
    }

    /// Where the bodies called by the call under the cursor are defined
    pub fn definitions(&self, path: &str, pos: Pos) -> Vec<Location> {
        let Some(node) = self.node_at(path, pos) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for ((module, singleton), name) in self.receiver_sides(node.id) {
            for key in self.lookup_chain(module, singleton, &name) {
                let Some(me) = self.env.method_entity(&key) else {
                    continue;
                };
                if !me.exists() {
                    continue;
                }
                for def in me.defs() {
                    let node = self.env.site(def).node();
                    if let Some(record) = self.env.node_record(node) {
                        let location = Location {
                            path: record.path().to_string(),
                            span: record.span(),
                        };
                        if !out.contains(&location) {
                            out.push(location);
                        }
                    }
                }
                break;
            }
        }
        out
    }

    /// Method keys in lookup order, following aliases
    fn lookup_chain(&self, module: ModuleId, singleton: bool, name: &str) -> Vec<MethodKey> {
        let mut keys = Vec::new();
        let mut name = name.to_string();
        for (m, s) in self.env.superclass_chain(module, singleton) {
            let mut sides = vec![m];
            if !s {
                sides.extend(self.env.module(m).included_modules().rev());
            }
            for side in sides {
                let mut seen = HashSet::new();
                loop {
                    let key = MethodKey::new(side, s, name.clone());
                    let target = self
                        .env
                        .method_entity(&key)
                        .and_then(|me| me.alias_target())
                        .map(str::to_string);
                    keys.push(key);
                    match target {
                        Some(target) if seen.insert(name.clone()) => name = target,
                        _ => break,
                    }
                }
            }
        }
        keys
    }

    /// Inferred signatures of every body of a method, such as
    /// `def foo: (Integer) -> String`
    pub fn method_signatures(&self, cpath: &[&str], singleton: bool, name: &str) -> Vec<String> {
        let Some(module) = self.env.find_cpath(cpath) else {
            return Vec::new();
        };
        let key = MethodKey::new(module, singleton, name);
        let Some(me) = self.env.method_entity(&key) else {
            return Vec::new();
        };
        me.defs()
            .filter_map(|def| match self.env.site(def).kind() {
                SiteKind::MethodDef(def) => Some(format!("def {}: {}", name, def.show(&self.env))),
                _ => None,
            })
            .collect()
    }

    /// The inferred type of a constant given by its absolute path
    pub fn constant_type(&self, cpath: &[&str]) -> Option<String> {
        let (name, parent) = cpath.split_last()?;
        let parent = self.env.find_cpath(parent)?;
        let ce = self.env.const_entity(&ConstKey::new(parent, *name))?;
        ce.exists().then(|| self.env.show_vertex(ce.vertex()))
    }

    /// Current diagnostics of a document, in tree order
    pub fn diagnostics(&self, path: &str) -> Result<Vec<ReportedDiagnostic>> {
        let doc = self.document(path)?;
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut nodes = Vec::new();
        doc.tree.walk(&mut |n| nodes.push(n.id));

        for node in nodes {
            let Some(record) = self.env.node_record(node) else {
                continue;
            };
            for site in record.sites() {
                if !seen.insert(site) {
                    continue;
                }
                for diagnostic in self.env.site(site).changes().diagnostics() {
                    let Some(target) = self.env.node_record(diagnostic.node) else {
                        continue;
                    };
                    let span = match diagnostic.anchor {
                        Anchor::MethodName => target.name_span().unwrap_or(target.span()),
                        Anchor::Node => target.span(),
                    };
                    out.push(ReportedDiagnostic {
                        path: target.path().to_string(),
                        span,
                        kind: diagnostic.kind,
                        message: diagnostic.message.clone(),
                    });
                }
            }
        }
        Ok(out)
    }

    /// One line per module, method body, constant and include the document declares
    pub fn dump_declarations(&self, path: &str) -> Result<String> {
        let doc = self.document(path)?;
        let mut nodes = Vec::new();
        doc.tree.walk(&mut |n| nodes.push(n));

        let mut out = String::new();
        for node in nodes {
            let Some(record) = self.env.node_record(node.id) else {
                continue;
            };
            match &node.kind {
                NodeKind::Module { .. } | NodeKind::Class { .. } => {
                    for registration in &record.registrations {
                        if let Registration::Module(module) = registration {
                            let entity = self.env.module(*module);
                            if entity.is_class() {
                                let _ = write!(out, "class {}", self.env.module_name(*module));
                                if let Some(sup) = entity.superclass() {
                                    let _ = write!(out, " < {}", self.env.module_name(sup));
                                }
                                out.push('\n');
                            } else {
                                let _ = writeln!(out, "module {}", self.env.module_name(*module));
                            }
                        }
                    }
                }
                NodeKind::Def { .. } => {
                    for site in record.sites() {
                        if let SiteKind::MethodDef(def) = self.env.site(site).kind() {
                            let key = self.env.show_method_key(&def.key());
                            let _ = writeln!(out, "def {}: {}", key, def.show(&self.env));
                        }
                    }
                }
                NodeKind::ConstWrite { .. } | NodeKind::SigConst { .. } => {
                    for registration in &record.registrations {
                        if let Registration::Const(key) = registration {
                            if let Some(ce) = self.env.const_entity(key) {
                                let _ = writeln!(
                                    out,
                                    "{}: {}",
                                    self.env.show_const_key(key),
                                    self.env.show_vertex(ce.vertex())
                                );
                            }
                        }
                    }
                }
                NodeKind::Include { .. } => {
                    for registration in &record.registrations {
                        if let Registration::Include { module, target } = registration {
                            let _ = writeln!(
                                out,
                                "include {} in {}",
                                self.env.module_name(*target),
                                self.env.module_name(*module)
                            );
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(out)
    }

    /// Vertices and sites owned by the nodes of a document, for debugging
    pub fn dump_graph(&self, path: &str) -> Result<String> {
        let doc = self.document(path)?;
        let mut nodes = Vec::new();
        doc.tree.walk(&mut |n| nodes.push(n.id));

        let mut out = String::new();
        for node in nodes {
            let Some(record) = self.env.node_record(node) else {
                continue;
            };
            let start = record.span().start;
            let _ = writeln!(
                out,
                "{} {}",
                node.to_string().bold(),
                format!("{}:{}", start.line + 1, start.column).dimmed()
            );
            for &vtx in record.vertices() {
                let vertex = self.env.vertex(vtx);
                let succ: Vec<String> = vertex.successors().map(|s| s.to_string()).collect();
                let _ = writeln!(
                    out,
                    "  {} {} : {} -> [{}]",
                    vtx.to_string().cyan(),
                    vertex.label(),
                    self.env.show_vertex(vtx).green(),
                    succ.join(", ")
                );
            }
            for site in record.sites() {
                let slot = self.env.site(site);
                let diagnostics = slot.changes().diagnostics().len();
                let line = format!("  {} {}", site.to_string().yellow(), slot.kind().name());
                if diagnostics > 0 {
                    let _ = writeln!(out, "{} {}", line, format!("({diagnostics} diagnostics)").red());
                } else {
                    let _ = writeln!(out, "{line}");
                }
            }
        }
        Ok(out)
    }
}

type ModuleSide = (ModuleId, bool);

/// Vertices and sites held by the records of a tree
#[derive(Debug, Default)]
struct OwnedState {
    vertices: Vec<VertexId>,
    sites: Vec<SiteId>,
}

fn owned_state(env: &GlobalEnv, tree: &Node) -> OwnedState {
    let mut owned = OwnedState::default();
    tree.walk(&mut |n| {
        if let Some(record) = env.node_record(n.id) {
            owned.vertices.extend(record.vertices().iter().copied());
            owned.sites.extend(record.sites());
        }
    });
    owned
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Node);

    impl Frontend for Fixed {
        fn parse(&self, _text_id: &TextId, _source: &str) -> Result<Node> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_text_id_display() {
        let id = TextId {
            path: "a.rb".into(),
            version: 3,
        };
        assert_eq!(id.to_string(), "a.rb@3");
    }

    #[test]
    fn test_json_frontend_reports_parse_errors() {
        let mut service = Service::new();
        let err = service.update_file("broken.rb", "{ not json").unwrap_err();
        assert!(matches!(err, EngineError::Parse { ref path, .. } if path == "broken.rb"));
        assert!(service.tree("broken.rb").is_none());
    }

    #[test]
    fn test_versions_increment() {
        let mut service = Service::with_frontend(EngineConfig::default(), Fixed(Node::program(vec![])));
        service.update_file("a.rb", "").unwrap();
        service.update_file("a.rb", "").unwrap();
        assert_eq!(service.version("a.rb"), Some(1));
        service.update_file_versioned("a.rb", 10, "").unwrap();
        assert_eq!(service.version("a.rb"), Some(10));
    }

    #[test]
    fn test_remove_unknown_document() {
        let mut service = Service::new();
        assert!(matches!(
            service.remove_file("nope.rb"),
            Err(EngineError::UnknownDocument(_))
        ));
    }

    #[test]
    fn test_node_at_prefers_innermost() {
        let tree = Node::program(vec![
            Node::lasgn("x", Node::int(1).at(0, 4, 5)).at(0, 0, 5),
        ])
        .at(0, 0, 5);
        let mut service = Service::with_frontend(EngineConfig::default(), Fixed(tree));
        service.update_file("a.rb", "").unwrap();
        let node = service.node_at("a.rb", Pos::new(0, 4)).unwrap();
        assert!(matches!(node.kind, NodeKind::Int { value: 1 }));
        assert_eq!(service.hover("a.rb", Pos::new(0, 4)).as_deref(), Some("Integer"));
    }
}
