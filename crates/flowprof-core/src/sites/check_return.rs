use crate::diagnostic::{Diagnostic, DiagnosticKind};
use crate::env::GlobalEnv;
use crate::error::Result;
use crate::graph::{Changes, NodeId, VertexId};

/// Checks a body's return value against a declared return type.
///
/// When the union of returns does not match, each return point of the
/// bound node is checked on its own and reported where it fails.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckReturnSite {
    pub a_ret: VertexId,
    pub f_ret: VertexId,
}

impl CheckReturnSite {
    pub(crate) fn run0(&self, env: &mut GlobalEnv, node: NodeId, changes: &mut Changes) -> Result<()> {
        if env.check_match(changes, self.a_ret, self.f_ret) {
            return Ok(());
        }
        let returns = env
            .node_record(node)
            .map(|rec| rec.returns.clone())
            .unwrap_or_default();
        for ret_node in returns {
            let Some(vtx) = env.node_record(ret_node).and_then(|rec| rec.ret) else {
                continue;
            };
            if env.check_match(changes, vtx, self.f_ret) {
                continue;
            }
            let message = format!(
                "expected: {}; actual: {}",
                env.show_vertex(self.f_ret),
                env.show_vertex(vtx)
            );
            changes.add_diagnostic(Diagnostic::new(ret_node, DiagnosticKind::ReturnTypeMismatch, message));
        }
        Ok(())
    }
}
