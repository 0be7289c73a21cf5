//! Diagnostics attached to source positions.

use crate::error::{StructuralError, VerifyError};
use crate::symbol::Names;
use metamath_parse::Span;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Hint,
}

#[derive(Clone, Debug, PartialEq)]
pub enum DiagKind {
    /// Include expansion failure, already rendered (carries paths).
    Include(String),
    Structural(StructuralError),
    Verify(VerifyError),
}

impl DiagKind {
    pub fn message(&self, names: &Names) -> String {
        match self {
            Self::Include(msg) => msg.clone(),
            Self::Structural(e) => e.message(names),
            Self::Verify(e) => e.message(names),
        }
    }
}

/// A statement-scoped problem; building always continues past it.
#[derive(Clone, Debug, PartialEq)]
pub struct Diagnostic {
    pub span: Span,
    pub severity: Severity,
    pub kind: DiagKind,
}

impl Diagnostic {
    pub fn error(span: Span, kind: impl Into<DiagKind>) -> Self {
        Self {
            span,
            severity: Severity::Error,
            kind: kind.into(),
        }
    }
}

impl From<StructuralError> for DiagKind {
    fn from(e: StructuralError) -> Self {
        Self::Structural(e)
    }
}

impl From<VerifyError> for DiagKind {
    fn from(e: VerifyError) -> Self {
        Self::Verify(e)
    }
}
