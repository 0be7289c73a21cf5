#![forbid(unsafe_code)]

//! Statement database, proof verification and unification for the
//! Metamath language.
//!
//! This is the library underlying the `mmserve` query server.
//!
//! # Usage
//!
//! A Metamath database is a sequence of statements: constant and
//! variable declarations, hypotheses, distinct-variable constraints,
//! axioms and theorems, organised into nested `${ ... $}` scopes.
//! The [`Builder`] consumes the token stream of a root file and its
//! includes (see the `metamath-parse` crate) and produces a [`Db`]
//! snapshot: an immutable value that can be queried, cheaply cloned,
//! and rebuilt with structural sharing after an edit.
//!
//! Problems found on the way (duplicate labels, out-of-scope symbols,
//! proofs that do not verify) never abort a build. They are recorded
//! as [`Diagnostic`]s or per-theorem [`VerifyError`]s so that the rest
//! of the database stays usable for navigation and queries.
//!
//! The following example builds a small database, verifies it, and
//! asks for the mandatory frame of an axiom.
//!
//! ~~~
//! use mmdb::{verify, Db};
//!
//! let mut db = Db::from_source(
//!     r"
//!     $c wff |- ( ) -> $.
//!     $v ph ps $.
//!     wph $f wff ph $.
//!     wps $f wff ps $.
//!     wi $a wff ( ph -> ps ) $.
//!     ${
//!         mp.1 $e |- ph $.
//!         mp.2 $e |- ( ph -> ps ) $.
//!         $( Modus ponens. $)
//!         ax-mp $a |- ps $.
//!     $}
//! ",
//! );
//! assert_eq!(db.diagnostics().count(), 0);
//! assert!(verify::refresh(&mut db, &()));
//!
//! let stmt = db.statement("ax-mp").expect("declared above");
//! let frame = stmt.frame.as_ref().expect("assertions carry frames");
//! assert_eq!(frame.floats.len(), 2);
//! assert_eq!(frame.essentials.len(), 2);
//! assert_eq!(stmt.comment.as_deref(), Some("Modus ponens."));
//! ~~~
//!
//! # Organisation
//!
//! * [`build`](Builder) turns lexemes into snapshots, maintaining the
//!   scope stack and capturing a [`Frame`] per assertion;
//! * [`verify`] runs proofs on an explicit stack machine and keeps a
//!   content-hash-keyed cache so that re-verification after an edit
//!   touches exactly the transitive dependents of the change;
//! * [`unify`] matches worksheet formulas against assertion patterns,
//!   returning either a [`Subst`] or a structured [`UnifyFailure`];
//! * [`worksheet`] parses and renders the line-oriented proof format
//!   that users edit interactively.

pub mod diag;
pub mod error;
pub mod unify;
pub mod verify;
pub mod worksheet;

mod build;
mod db;
mod formula;
mod scope;
mod statement;
mod subst;
mod symbol;

pub use build::Builder;
pub use db::{Db, ProofEntry, StmtIdx};
pub use diag::{DiagKind, Diagnostic, Severity};
pub use error::{Error, StructuralError, UnifyFailure, VerifyError};
pub use formula::{DisplaySyms, Formula};
pub use statement::{EssHyp, FloatHyp, Frame, Proof, Statement, StatementKind};
pub use subst::{Frag, Subst};
pub use symbol::{Atom, Names};
pub use verify::{Interrupt, ProofNode, VerifiedProof};
pub use worksheet::{StepUnification, Worksheet, WsDiag};
