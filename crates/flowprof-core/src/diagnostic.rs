use serde::Serialize;
use std::fmt;

use crate::ast::Span;
use crate::graph::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    UndefinedMethod,
    WrongArity,
    UnresolvedOverload,
    ReturnTypeMismatch,
}

/// Which part of the node a diagnostic points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Anchor {
    Node,
    /// The method name of a call, falling back to the whole node
    MethodName,
}

/// A type error found by a site, addressed by node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub node: NodeId,
    pub anchor: Anchor,
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    pub fn new(node: NodeId, kind: DiagnosticKind, message: impl Into<String>) -> Self {
        let anchor = match kind {
            DiagnosticKind::UndefinedMethod | DiagnosticKind::WrongArity | DiagnosticKind::UnresolvedOverload => {
                Anchor::MethodName
            }
            DiagnosticKind::ReturnTypeMismatch => Anchor::Node,
        };
        Self {
            node,
            anchor,
            kind,
            message: message.into(),
        }
    }
}

/// A diagnostic resolved to a document position
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportedDiagnostic {
    pub path: String,
    pub span: Span,
    pub kind: DiagnosticKind,
    pub message: String,
}

impl fmt::Display for ReportedDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {}",
            self.path,
            self.span.start.line + 1,
            self.span.start.column,
            self.message
        )
    }
}
