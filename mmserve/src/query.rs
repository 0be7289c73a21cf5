//! Query operations over a published snapshot.
//!
//! Each operation is a thin pure function from a snapshot to a typed
//! result; the [`Service`](crate::service::Service) only adds snapshot
//! selection and freshness on top.

use crate::service::DbSnapshot;
use mmdb::worksheet::{self, WsDiag};
use mmdb::{Db, DisplaySyms, Severity, VerifyError, Worksheet};
use metamath_parse::Position;
use std::fmt::Write;
use std::path::{Path, PathBuf};

/// Where a label is declared.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Location {
    pub path: PathBuf,
    pub start: Position,
    pub end: Position,
}

/// What hovering a label shows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HoverInfo {
    pub label: String,
    pub typecode: String,
    /// Essential hypotheses, rendered as `label formula`.
    pub hypotheses: Vec<String>,
    /// The formula after its typecode.
    pub conclusion: String,
    pub comment: Option<String>,
}

impl HoverInfo {
    /// Plain-text markup in the shape editors expect: the statement in
    /// a fenced block, the associated comment below a rule.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "## {}", self.label);
        let _ = writeln!(out, "```metamath");
        for hyp in &self.hypotheses {
            let _ = writeln!(out, "{}", hyp);
        }
        let _ = writeln!(out, "{}   {} {}", self.label, self.typecode, self.conclusion);
        let _ = writeln!(out, "```");
        if let Some(comment) = &self.comment {
            let _ = writeln!(out, "---");
            let _ = writeln!(out, "{}", comment);
        }
        out
    }
}

/// A position-addressed diagnostic inside one document line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocDiag {
    pub line: u32,
    pub start_col: u32,
    pub end_col: u32,
    pub severity: Severity,
    pub message: String,
}

pub fn definition(snap: &DbSnapshot, label: &str) -> Option<Location> {
    let idx = snap.db.lookup(label)?;
    let span = snap.db.span(idx)?;
    let file = snap.sources.file(span.file);
    Some(Location {
        path: file.path.clone(),
        start: file.position(span.start),
        end: file.position(span.end),
    })
}

pub fn hover(snap: &DbSnapshot, label: &str) -> Option<HoverInfo> {
    let db = &snap.db;
    let stmt = db.statement(label)?;
    let formula = stmt.formula()?;
    let names = &db.names;
    let hypotheses = stmt
        .frame
        .iter()
        .flat_map(|f| f.essentials.iter())
        .map(|e| format!("{} {}", names.resolve(e.label), e.formula.display(names)))
        .collect();
    Some(HoverInfo {
        label: label.to_string(),
        typecode: names.resolve(formula.typecode()).to_string(),
        hypotheses,
        conclusion: DisplaySyms(formula.expr(), names).to_string(),
        comment: stmt.comment.as_deref().map(str::to_string),
    })
}

/// Reconstruct a worksheet from a theorem's stored proof.
/// `None` when the label does not name a theorem.
pub fn show_proof(snap: &DbSnapshot, label: &str) -> Option<Result<String, VerifyError>> {
    let db = &snap.db;
    let idx = db.lookup(label)?;
    let atom = db.names.get(label)?;
    let entry = db.proof_entry(atom)?;
    Some(match &entry.result {
        Ok(proof) => worksheet::render_proof(db, idx, proof).ok_or(VerifyError::NotATheorem),
        Err(err) => Err(err.clone()),
    })
}

/// Diagnostics of one database source file, ordered by position.
pub fn db_diagnostics(snap: &DbSnapshot, path: &Path) -> Vec<DocDiag> {
    let fid = match snap.sources.file_id(path) {
        Some(fid) => fid,
        None => return Vec::new(),
    };
    let file = snap.sources.file(fid);
    snap.db
        .file_diagnostics(fid)
        .into_iter()
        .map(|d| {
            let start = file.position(d.span.start);
            let end = file.position(d.span.end);
            DocDiag {
                line: start.line,
                start_col: start.col,
                // multi-line spans are clipped to their first line
                end_col: if end.line == start.line { end.col } else { start.col },
                severity: d.severity,
                message: d.kind.message(&snap.db.names),
            }
        })
        .collect()
}

/// Diagnostics of one worksheet against a database snapshot.
pub fn sheet_diagnostics(sheet: &Worksheet, db: &Db, dv_hints: bool) -> Vec<DocDiag> {
    sheet
        .diagnostics(db, dv_hints)
        .into_iter()
        .map(|d: WsDiag| DocDiag {
            line: d.line as u32,
            start_col: d.cols.start as u32,
            end_col: d.cols.end as u32,
            severity: d.severity,
            message: d.message,
        })
        .collect()
}
