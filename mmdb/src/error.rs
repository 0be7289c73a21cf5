//! Common error types.
//!
//! Structural and verification problems are statement-scoped: they are
//! recorded as diagnostics and never abort a build. Unification failure
//! is a value returned by the engine, not an error that propagates.

use crate::symbol::{Atom, Names};
use core::fmt::Write;

/// Scanning and scoping problems found by the database builder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StructuralError {
    /// The label is already taken; the first declaration stays in force.
    DuplicateLabel(Atom),
    /// A formula symbol is neither an active constant nor an active variable.
    UndeclaredSymbol(Atom),
    /// `$}` without a matching `${`.
    ScopeMismatch,
    /// `${` left open at end of input.
    UnclosedScope,
    /// `$c` inside a nested scope.
    ConstantScope,
    /// Constant or variable declared twice in intersecting scopes.
    SymbolRedeclared(Atom),
    /// The variable already has an active `$f`.
    FloatRedeclared(Atom),
    /// `$f` must consist of exactly a typecode and a variable.
    FloatArity,
    /// A formula's first symbol is not an active constant.
    TypecodeExpected(Atom),
    /// A statement that needs a formula has none.
    EmptyFormula,
    /// `$f`/`$e`/`$a`/`$p` without a preceding label.
    LabelExpected,
    /// A label not followed by a statement keyword.
    LabelUnused,
    /// `$d` needs at least two distinct variables.
    DisjointArity,
    /// `$p` without a `$=` proof part.
    ProofMissing,
    /// Statement ran into end of input before its `$.`.
    UnterminatedStatement,
    /// A token that cannot start or continue a statement here.
    UnexpectedToken,
}

impl StructuralError {
    pub fn message(&self, names: &Names) -> String {
        let mut out = String::new();
        let _ = match self {
            Self::DuplicateLabel(l) => write!(out, "duplicate label {}", names.resolve(*l)),
            Self::UndeclaredSymbol(s) => write!(out, "undeclared symbol {}", names.resolve(*s)),
            Self::ScopeMismatch => write!(out, "$}} without matching ${{"),
            Self::UnclosedScope => write!(out, "${{ still open at end of input"),
            Self::ConstantScope => write!(out, "$c is only allowed in the outermost scope"),
            Self::SymbolRedeclared(s) => write!(out, "symbol {} redeclared", names.resolve(*s)),
            Self::FloatRedeclared(v) => write!(
                out,
                "variable {} already has an active $f",
                names.resolve(*v)
            ),
            Self::FloatArity => write!(out, "$f takes exactly a typecode and a variable"),
            Self::TypecodeExpected(s) => write!(
                out,
                "formula must start with a constant typecode, got {}",
                names.resolve(*s)
            ),
            Self::EmptyFormula => write!(out, "statement has no formula"),
            Self::LabelExpected => write!(out, "statement requires a label"),
            Self::LabelUnused => write!(out, "label is not followed by a statement"),
            Self::DisjointArity => write!(out, "$d needs at least two distinct variables"),
            Self::ProofMissing => write!(out, "$p statement has no $= proof"),
            Self::UnterminatedStatement => write!(out, "statement not terminated by $."),
            Self::UnexpectedToken => write!(out, "unexpected token"),
        };
        out
    }
}

/// Failure of a proof to verify. Theorem-scoped: other theorems stay usable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerifyError {
    /// Proof references a label that does not exist.
    UnknownLabel(Atom),
    /// Proof references an assertion declared after the theorem.
    ForwardReference(Atom),
    /// Proof step references something that is neither a usable
    /// hypothesis nor an assertion.
    NotUsable(Atom),
    /// The popped formulas do not fit the referenced statement's
    /// hypothesis pattern.
    SubstitutionMismatch { step: usize, label: Atom },
    /// A substitution violates a distinct-variable constraint.
    DisjointViolation { step: usize, var1: Atom, var2: Atom },
    /// The final stack entry differs from the declared formula.
    ConclusionMismatch,
    /// An assertion reference pops more entries than the stack holds.
    StackUnderflow { step: usize },
    /// More than one entry left after the last proof step.
    StackUnbalanced { left: usize },
    /// The proof contains a `?` placeholder or is absent.
    Incomplete,
    /// The label does not name a provable statement.
    NotATheorem,
    /// Bad compressed proof encoding.
    Compressed(&'static str),
    /// Verification was cooperatively canceled; never published.
    Canceled,
}

impl VerifyError {
    pub fn message(&self, names: &Names) -> String {
        let mut out = String::new();
        let _ = match self {
            Self::UnknownLabel(l) => write!(out, "unknown label {}", names.resolve(*l)),
            Self::ForwardReference(l) => write!(
                out,
                "proof references {} before its declaration",
                names.resolve(*l)
            ),
            Self::NotUsable(l) => write!(
                out,
                "{} is not a hypothesis or assertion usable here",
                names.resolve(*l)
            ),
            Self::SubstitutionMismatch { step, label } => write!(
                out,
                "step {}: no consistent substitution for {}",
                step + 1,
                names.resolve(*label)
            ),
            Self::DisjointViolation { step, var1, var2 } => write!(
                out,
                "step {}: distinct-variable violation between {} and {}",
                step + 1,
                names.resolve(*var1),
                names.resolve(*var2)
            ),
            Self::ConclusionMismatch => {
                write!(out, "proof does not reduce to the declared formula")
            }
            Self::StackUnderflow { step } => write!(out, "step {}: proof stack underflow", step + 1),
            Self::StackUnbalanced { left } => {
                write!(out, "{} entries left on the proof stack", left)
            }
            Self::Incomplete => write!(out, "proof is incomplete"),
            Self::NotATheorem => write!(out, "not a provable statement"),
            Self::Compressed(why) => write!(out, "malformed compressed proof: {}", why),
            Self::Canceled => write!(out, "verification canceled"),
        };
        out
    }
}

/// Structured negative result of unification: always returned as a
/// value so that callers can build a precise diagnostic from it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UnifyFailure {
    /// The typecodes already differ.
    Typecode { expected: Atom, found: Atom },
    /// Symbols differ at expression position `at` (0-based, after the
    /// typecode).
    Symbol { at: usize },
    /// The step supplies the wrong number of hypotheses.
    HypCount { expected: usize, actual: usize },
    /// The same variable would have to take two different fragments.
    InconsistentBinding { var: Atom },
    /// A binding would make two constrained variables overlap.
    DisjointViolated { var1: Atom, var2: Atom },
    /// No candidate statement matches.
    NoCandidate,
}

impl UnifyFailure {
    pub fn message(&self, names: &Names) -> String {
        let mut out = String::new();
        let _ = match self {
            Self::Typecode { expected, found } => write!(
                out,
                "typecode mismatch: expected {}, found {}",
                names.resolve(*expected),
                names.resolve(*found)
            ),
            Self::Symbol { at } => write!(out, "symbol mismatch at position {}", at),
            Self::HypCount { expected, actual } => write!(
                out,
                "wrong hypothesis count: expected {}, got {}",
                expected, actual
            ),
            Self::InconsistentBinding { var } => write!(
                out,
                "inconsistent binding for variable {}",
                names.resolve(*var)
            ),
            Self::DisjointViolated { var1, var2 } => write!(
                out,
                "substitution violates distinctness of {} and {}",
                names.resolve(*var1),
                names.resolve(*var2)
            ),
            Self::NoCandidate => write!(out, "unification failed"),
        };
        out
    }
}

/// Common error type.
#[derive(Debug)]
pub enum Error {
    Include(metamath_parse::Error),
    Structural(StructuralError),
    Verify(VerifyError),
}

impl From<metamath_parse::Error> for Error {
    fn from(err: metamath_parse::Error) -> Self {
        Self::Include(err)
    }
}

impl From<StructuralError> for Error {
    fn from(err: StructuralError) -> Self {
        Self::Structural(err)
    }
}

impl From<VerifyError> for Error {
    fn from(err: VerifyError) -> Self {
        Self::Verify(err)
    }
}
