//! Statements and their mandatory frames.

use crate::formula::Formula;
use crate::symbol::Atom;
use std::sync::Arc;

/// A floating hypothesis: `label $f typecode var $.`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FloatHyp {
    pub label: Atom,
    pub typecode: Atom,
    pub var: Atom,
}

/// An essential hypothesis: `label $e formula $.`
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EssHyp {
    pub label: Atom,
    pub formula: Formula,
}

/// The hypotheses and distinctness constraints in force for an assertion,
/// captured from the enclosing scopes at its declaration point.
///
/// Mandatory hypotheses are the floating hypotheses (in declaration
/// order, restricted to variables occurring in the assertion or its
/// essential hypotheses) followed by the essential hypotheses in
/// declaration order. This ordering fixes the argument order of
/// substitutions everywhere else: proof stacks, compressed proof
/// indices and unification all follow it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Frame {
    pub floats: Box<[FloatHyp]>,
    pub essentials: Box<[EssHyp]>,
    /// Active floating hypotheses over variables that are not mandatory;
    /// proofs may still reference them to introduce dummy variables.
    pub dummies: Box<[FloatHyp]>,
    /// Distinct-variable pairs, normalized `(min, max)` and sorted.
    pub disjoint: Box<[(Atom, Atom)]>,
}

impl Frame {
    /// Number of mandatory hypotheses.
    pub fn len(&self) -> usize {
        self.floats.len() + self.essentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The formula a mandatory hypothesis contributes to the proof stack.
    pub fn hyp_formula(&self, n: usize) -> Option<Formula> {
        if let Some(fh) = self.floats.get(n) {
            return Some(Formula::new(vec![fh.typecode, fh.var]));
        }
        let ess = self.essentials.get(n - self.floats.len())?;
        Some(ess.formula.clone())
    }

    pub fn hyp_label(&self, n: usize) -> Option<Atom> {
        if let Some(fh) = self.floats.get(n) {
            return Some(fh.label);
        }
        Some(self.essentials.get(n - self.floats.len())?.label)
    }

    /// Position of a label among the mandatory hypotheses.
    pub fn hyp_index(&self, label: Atom) -> Option<usize> {
        if let Some(i) = self.floats.iter().position(|fh| fh.label == label) {
            return Some(i);
        }
        let i = self.essentials.iter().position(|e| e.label == label)?;
        Some(self.floats.len() + i)
    }

    /// A dummy-variable hypothesis usable by proofs but not mandatory.
    pub fn dummy(&self, label: Atom) -> Option<&FloatHyp> {
        self.dummies.iter().find(|fh| fh.label == label)
    }

    pub fn disjoint_contains(&self, a: Atom, b: Atom) -> bool {
        let pair = if a < b { (a, b) } else { (b, a) };
        self.disjoint.binary_search(&pair).is_ok()
    }
}

/// How a theorem's proof was written in the source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Proof {
    /// A whitespace-separated sequence of label references.
    Normal(Box<[Atom]>),
    /// `( label ... )` followed by a capital-letter blob.
    Compressed { labels: Box<[Atom]>, tags: Box<str> },
    /// Contains a `?` placeholder; cannot verify yet.
    Incomplete,
    /// No `$=` part at all (already diagnosed by the builder).
    Missing,
}

/// What a statement declares.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StatementKind {
    /// `$c`, declaring constants.
    Const(Box<[Atom]>),
    /// `$v`, declaring variables.
    Var(Box<[Atom]>),
    /// `$d`: a group of pairwise distinct variables.
    Disjoint(Box<[Atom]>),
    /// `$f`; the formula is exactly a typecode and a variable.
    Float(Formula),
    /// `$e`
    Essential(Formula),
    /// `$a`
    Axiom(Formula),
    /// `$p`
    Theorem(Formula, Proof),
}

/// One database statement in declaration order.
///
/// Spans live in the snapshot, not here, so that a statement untouched
/// by an edit can be shared by reference between snapshots even when
/// its position in the file shifted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Statement {
    /// Present on `$f`, `$e`, `$a` and `$p` statements.
    pub label: Option<Atom>,
    pub kind: StatementKind,
    /// The comment immediately preceding the statement, if any.
    pub comment: Option<Arc<str>>,
    /// Captured scope context; present on `$a` and `$p`.
    pub frame: Option<Arc<Frame>>,
    /// Hash of the statement's source tokens, for reuse across rebuilds.
    pub(crate) src_hash: u64,
}

impl Statement {
    pub fn formula(&self) -> Option<&Formula> {
        match &self.kind {
            StatementKind::Float(f)
            | StatementKind::Essential(f)
            | StatementKind::Axiom(f)
            | StatementKind::Theorem(f, _) => Some(f),
            _ => None,
        }
    }

    pub fn proof(&self) -> Option<&Proof> {
        match &self.kind {
            StatementKind::Theorem(_, proof) => Some(proof),
            _ => None,
        }
    }

    pub fn is_assertion(&self) -> bool {
        matches!(
            self.kind,
            StatementKind::Axiom(_) | StatementKind::Theorem(..)
        )
    }
}
