//! Immutable, versioned database snapshots.

use crate::diag::Diagnostic;
use crate::statement::Statement;
use crate::symbol::{Atom, Names};
use crate::verify::VerifiedProof;
use crate::VerifyError;
use metamath_parse::{FileId, Span};
use std::sync::Arc;

pub(crate) type FnvImMap<K, V> = im::HashMap<K, V, fnv::FnvBuildHasher>;
pub(crate) type FnvImSet<K> = im::HashSet<K, fnv::FnvBuildHasher>;

/// Index of a statement inside a snapshot, stable across snapshots for
/// statements that did not move.
pub type StmtIdx = usize;

/// Cached verification outcome for one theorem, keyed by the hash of
/// everything its verification depends on.
#[derive(Clone, Debug)]
pub struct ProofEntry {
    pub key: u64,
    pub result: Result<Arc<VerifiedProof>, VerifyError>,
}

/// One immutable snapshot of the statement database.
///
/// Cloning a snapshot is cheap: the statement vector, label index and
/// proof cache are persistent structures, so a rebuilt snapshot shares
/// the backing storage of everything that did not change.
#[derive(Clone, Default)]
pub struct Db {
    pub names: Names,
    pub(crate) stmts: im::Vector<Arc<Statement>>,
    pub(crate) spans: im::Vector<Span>,
    pub(crate) labels: FnvImMap<Atom, StmtIdx>,
    pub(crate) consts: FnvImSet<Atom>,
    pub(crate) vars: FnvImSet<Atom>,
    pub(crate) proofs: FnvImMap<Atom, ProofEntry>,
    pub(crate) diags: im::Vector<Diagnostic>,
}

impl Db {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn len(&self) -> usize {
        self.stmts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }

    pub fn stmt(&self, idx: StmtIdx) -> Option<&Arc<Statement>> {
        self.stmts.get(idx)
    }

    pub fn span(&self, idx: StmtIdx) -> Option<Span> {
        self.spans.get(idx).copied()
    }

    pub fn statements(&self) -> impl Iterator<Item = (StmtIdx, &Arc<Statement>)> {
        self.stmts.iter().enumerate()
    }

    /// Resolve a label atom to its statement.
    pub fn lookup_atom(&self, label: Atom) -> Option<StmtIdx> {
        self.labels.get(&label).copied()
    }

    pub fn lookup(&self, label: &str) -> Option<StmtIdx> {
        self.lookup_atom(self.names.get(label)?)
    }

    pub fn statement(&self, label: &str) -> Option<&Arc<Statement>> {
        self.stmt(self.lookup(label)?)
    }

    pub fn is_const(&self, s: Atom) -> bool {
        self.consts.contains(&s)
    }

    pub fn is_var(&self, s: Atom) -> bool {
        self.vars.contains(&s)
    }

    /// Structural and include diagnostics, in declaration order.
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diags.iter()
    }

    pub fn proof_entry(&self, label: Atom) -> Option<&ProofEntry> {
        self.proofs.get(&label)
    }

    pub fn set_proof_entry(&mut self, label: Atom, entry: ProofEntry) {
        self.proofs.insert(label, entry);
    }

    /// All diagnostics for one source file: structural ones recorded in
    /// it plus verification failures of the theorems declared in it,
    /// ordered by position.
    pub fn file_diagnostics(&self, file: FileId) -> Vec<Diagnostic> {
        let mut out: Vec<Diagnostic> = self
            .diags
            .iter()
            .filter(|d| d.span.file == file)
            .cloned()
            .collect();
        for (idx, stmt) in self.statements() {
            let label = match stmt.label {
                Some(label) if stmt.proof().is_some() => label,
                _ => continue,
            };
            let span = match self.span(idx) {
                Some(span) if span.file == file => span,
                _ => continue,
            };
            if let Some(ProofEntry {
                result: Err(err), ..
            }) = self.proof_entry(label)
            {
                out.push(Diagnostic::error(span, err.clone()));
            }
        }
        out.sort_by_key(|d| (d.span.start, d.span.end));
        out
    }

    /// Assert the label-index invariant before a snapshot is published.
    ///
    /// The builder upholds this; a violation after a supposedly
    /// validated merge means the snapshot must be discarded.
    pub fn check_labels(&self) -> Result<(), String> {
        let mut labeled = 0;
        for (idx, stmt) in self.statements() {
            if let Some(label) = stmt.label {
                if self.lookup_atom(label) == Some(idx) {
                    labeled += 1;
                }
            }
        }
        if labeled != self.labels.len() {
            return Err(format!(
                "label index covers {} labels but {} statements resolve",
                self.labels.len(),
                labeled
            ));
        }
        Ok(())
    }
}
