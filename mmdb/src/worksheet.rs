//! Proof worksheets: the line-oriented format a user edits while
//! writing a proof, and the renderer that produces one from a verified
//! proof.
//!
//! A worksheet starts with a header identifying the theorem and the
//! "location after" label, followed by one line per proof step,
//!
//! ```text
//! $( <MM> <PROOF_ASST> THEOREM=th1  LOC_AFTER=?
//! h1::th.1           |- ph
//! 2:1,?:ax-mp        |- ps
//! qed:2:idi          |- ps
//! $= ( wps ax-mp ) ABCDE $.
//! $)
//! ```
//!
//! A leading `h` marks a hypothesis step, `qed` the goal step, and `?`
//! an unknown hypothesis reference or label. Lines starting with
//! whitespace continue the previous step; lines starting with `*` are
//! comments. The worksheet is held as raw text plus per-step
//! diagnostics while the user edits, never as a partial database.

use crate::db::{Db, StmtIdx};
use crate::diag::Severity;
use crate::error::UnifyFailure;
use crate::formula::Formula;
use crate::statement::{Frame, StatementKind};
use crate::subst::Subst;
use crate::symbol::Atom;
use crate::unify;
use crate::verify::VerifiedProof;
use core::ops::Range;
use fnv::FnvHashMap;
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt::Write;
use std::sync::Arc;

lazy_static! {
    static ref FIRST_LINE: Regex = Regex::new(
        r"^\$\( <MM> <PROOF_ASST> THEOREM=([0-9A-Za-z_\-\.]+)  LOC_AFTER=(\?|[0-9A-Za-z_\-\.]+)"
    )
    .unwrap();
    static ref STEP_LINE: Regex = Regex::new(
        r"^(h?)([0-9A-Za-z_\-\.]+):([0-9A-Za-z_\-\.,\?]*):(\?|[0-9A-Za-z_\-\.]*)(?:[ \t]+(.*))?$"
    )
    .unwrap();
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepKind {
    Hyp,
    Step,
    Qed,
}

/// One proof step of a worksheet.
#[derive(Clone, Debug)]
pub struct Step {
    pub name: String,
    pub kind: StepKind,
    /// Hypothesis references; `None` for `?`.
    pub hyps: Vec<Option<String>>,
    /// Cited statement label; `None` for `?` or empty.
    pub label: Option<String>,
    /// Parsed step formula; `None` if absent or not yet parseable.
    pub formula: Option<Formula>,
    /// Zero-based line of the step's first source line.
    pub line: usize,
    pub name_cols: Range<usize>,
    pub hyps_cols: Range<usize>,
    pub label_cols: Range<usize>,
    pub formula_cols: Range<usize>,
}

/// A diagnostic within a worksheet document.
#[derive(Clone, Debug, PartialEq)]
pub struct WsDiag {
    pub line: usize,
    pub cols: Range<usize>,
    pub severity: Severity,
    pub message: String,
}

impl WsDiag {
    fn error(line: usize, cols: Range<usize>, message: impl Into<String>) -> Self {
        Self {
            line,
            cols,
            severity: Severity::Error,
            message: message.into(),
        }
    }
}

/// Replacement text for one step, produced by step unification.
#[derive(Clone, Debug)]
pub struct StepUnification {
    pub line: usize,
    pub text: String,
    pub subst: Subst,
}

#[derive(Clone, Debug, Default)]
pub struct Worksheet {
    pub theorem: Option<String>,
    /// `None` stands for `?`: any assertion in the database is usable.
    pub loc_after: Option<String>,
    pub steps: Vec<Step>,
    by_name: FnvHashMap<String, usize>,
    parse_diags: Vec<WsDiag>,
}

impl Worksheet {
    pub fn parse(text: &str, db: &Db) -> Self {
        let mut ws = Worksheet::default();

        // group the lines into records: a line starting with whitespace
        // continues the record opened by the last non-blank line
        let mut records: Vec<(usize, String)> = Vec::new();
        for (i, line) in text.lines().enumerate() {
            if i == 0 {
                match FIRST_LINE.captures(line) {
                    Some(caps) => {
                        ws.theorem = Some(caps[1].to_string());
                        let loc = &caps[2];
                        ws.loc_after = (loc != "?").then(|| loc.to_string());
                    }
                    None => ws
                        .parse_diags
                        .push(WsDiag::error(0, 0..line.len(), "Could not parse first line")),
                }
                continue;
            }
            if line.starts_with(' ') || line.starts_with('\t') {
                if let Some(last) = records.last_mut() {
                    last.1.push(' ');
                    last.1.push_str(line.trim());
                }
                continue;
            }
            if line.is_empty() || line.starts_with('*') {
                continue;
            }
            records.push((i, line.to_string()));
        }

        for (line, text) in records {
            ws.record(line, &text, db);
        }
        ws
    }

    fn record(&mut self, line: usize, text: &str, db: &Db) {
        if text.starts_with("$=") || text.starts_with("$)") {
            // generated proof block and end marker carry no steps
            return;
        }
        let caps = match STEP_LINE.captures(text) {
            Some(caps) => caps,
            None => {
                return self
                    .parse_diags
                    .push(WsDiag::error(line, 0..text.len(), "Could not parse proof line"))
            }
        };

        let name = caps[2].to_string();
        let kind = if !caps[1].is_empty() {
            StepKind::Hyp
        } else if name == "qed" {
            StepKind::Qed
        } else {
            StepKind::Step
        };
        let hyps_match = caps.get(3).expect("group 3 always participates");
        let hyps: Vec<Option<String>> = if hyps_match.as_str().is_empty() {
            Vec::new()
        } else {
            hyps_match
                .as_str()
                .split(',')
                .map(|h| (h != "?").then(|| h.to_string()))
                .collect()
        };
        let label_match = caps.get(4).expect("group 4 always participates");
        let label = label_match.as_str();
        let label = (!label.is_empty() && label != "?").then(|| label.to_string());

        let mut formula = None;
        let formula_cols = caps.get(5).map_or(text.len()..text.len(), |m| m.range());
        if let Some(m) = caps.get(5) {
            formula = self.parse_formula(line, m.range(), m.as_str(), db);
        }

        let idx = self.steps.len();
        self.by_name.insert(name.clone(), idx);
        self.steps.push(Step {
            name,
            kind,
            hyps,
            label,
            formula,
            line,
            name_cols: caps.get(2).expect("name group").range(),
            hyps_cols: hyps_match.range(),
            label_cols: label_match.range(),
            formula_cols,
        });
    }

    fn parse_formula(
        &mut self,
        line: usize,
        cols: Range<usize>,
        text: &str,
        db: &Db,
    ) -> Option<Formula> {
        let mut syms = Vec::new();
        for tok in text.split_whitespace() {
            match db.names.get(tok).filter(|&a| db.is_const(a) || db.is_var(a)) {
                Some(atom) => syms.push(atom),
                None => {
                    self.parse_diags.push(WsDiag::error(
                        line,
                        cols.clone(),
                        format!("Unknown math token {}", tok),
                    ));
                    return None;
                }
            }
        }
        (!syms.is_empty()).then(|| Formula::new(syms))
    }

    pub fn step_by_name(&self, name: &str) -> Option<&Step> {
        self.steps.get(*self.by_name.get(name)?)
    }

    /// The step whose lines contain the given line.
    pub fn step_at_line(&self, line: usize) -> Option<&Step> {
        let idx = match self.steps.binary_search_by(|s| s.line.cmp(&line)) {
            Ok(idx) => idx,
            Err(0) => return None,
            Err(idx) => idx - 1,
        };
        self.steps.get(idx)
    }

    /// The database statement being proven, if its label resolves.
    pub fn theorem_idx(&self, db: &Db) -> Option<StmtIdx> {
        db.lookup(self.theorem.as_deref()?)
    }

    fn dv_frame<'a>(&self, db: &'a Db) -> Option<&'a Arc<Frame>> {
        db.stmt(self.theorem_idx(db)?)?.frame.as_ref()
    }

    /// Only statements declared before this bound may be cited.
    fn citation_limit(&self, db: &Db) -> Option<StmtIdx> {
        db.lookup(self.loc_after.as_deref()?)
    }

    fn hyp_formulas<'a>(&'a self, step: &Step) -> Vec<Option<&'a Formula>> {
        step.hyps
            .iter()
            .map(|h| {
                let name = h.as_deref()?;
                let hyp = self.step_by_name(name)?;
                (hyp.line < step.line).then(|| ())?;
                hyp.formula.as_ref()
            })
            .collect()
    }

    /// All diagnostics for this worksheet, ordered by position.
    /// With `dv_hints`, missing distinct-variable constraints are
    /// reported as hints against the step that needs them.
    pub fn diagnostics(&self, db: &Db, dv_hints: bool) -> Vec<WsDiag> {
        let mut out = self.parse_diags.clone();
        if let Some(t) = &self.theorem {
            if db.lookup(t).is_none() {
                out.push(WsDiag::error(0, 0..0, "Unknown theorem"));
            }
        }
        for step in &self.steps {
            self.check_step(step, db, dv_hints, &mut out);
        }
        out.sort_by(|a, b| (a.line, a.cols.start).cmp(&(b.line, b.cols.start)));
        out
    }

    fn check_step(&self, step: &Step, db: &Db, dv_hints: bool, out: &mut Vec<WsDiag>) {
        for hyp in step.hyps.iter().flatten() {
            let known = self
                .step_by_name(hyp)
                .map_or(false, |h| h.line < step.line);
            if !known {
                out.push(WsDiag::error(
                    step.line,
                    step.hyps_cols.clone(),
                    "Unknown step name",
                ));
            }
        }

        let goal_tc = self
            .theorem_idx(db)
            .and_then(|idx| db.stmt(idx))
            .and_then(|s| s.formula())
            .map(Formula::typecode);
        if let (Some(tc), Some(f)) = (goal_tc, &step.formula) {
            if step.kind != StepKind::Hyp && f.typecode() != tc {
                out.push(WsDiag::error(
                    step.line,
                    step.formula_cols.clone(),
                    "Step formula does not start with the provable typecode",
                ));
            }
        }

        match step.kind {
            StepKind::Hyp => self.check_hyp_step(step, db, out),
            StepKind::Step | StepKind::Qed => {
                self.check_derivation(step, db, dv_hints, out);
                if step.kind == StepKind::Qed {
                    self.check_qed(step, db, out);
                }
            }
        }
    }

    fn check_hyp_step(&self, step: &Step, db: &Db, out: &mut Vec<WsDiag>) {
        let stmt = match step.label.as_deref().and_then(|l| db.statement(l)) {
            Some(stmt) => stmt,
            None => {
                return out.push(WsDiag::error(
                    step.line,
                    step.label_cols.clone(),
                    "Unknown theorem",
                ))
            }
        };
        match (&stmt.kind, &step.formula) {
            (StatementKind::Essential(f), Some(given)) if f != given => {
                out.push(WsDiag::error(
                    step.line,
                    step.formula_cols.clone(),
                    "Hypothesis formula does not match database",
                ));
            }
            (StatementKind::Essential(_), _) => {}
            _ => out.push(WsDiag::error(
                step.line,
                step.label_cols.clone(),
                "Unknown theorem",
            )),
        }
    }

    fn check_derivation(&self, step: &Step, db: &Db, dv_hints: bool, out: &mut Vec<WsDiag>) {
        let label = match step.label.as_deref() {
            Some(label) => label,
            None => return,
        };
        let idx = match db.lookup(label) {
            Some(idx) if db.stmt(idx).map_or(false, |s| s.is_assertion()) => idx,
            _ => {
                return out.push(WsDiag::error(
                    step.line,
                    step.label_cols.clone(),
                    "Unknown theorem",
                ))
            }
        };
        if let Some(limit) = self.citation_limit(db) {
            if idx >= limit {
                return out.push(WsDiag::error(
                    step.line,
                    step.label_cols.clone(),
                    format!("{} may not be used here", label),
                ));
            }
        }

        // distinctness problems are reported as hints, not hard
        // failures: the user can still add the missing $d to the goal
        let hyps = self.hyp_formulas(step);
        match unify::unify(db, idx, step.formula.as_ref(), &hyps, &Subst::new(), None) {
            Ok(subst) => {
                if dv_hints {
                    self.dv_hints_for(step, db, idx, &subst, out);
                }
            }
            Err(failure) => {
                let cols = match &failure {
                    UnifyFailure::HypCount { .. } => step.hyps_cols.clone(),
                    _ => step.formula_cols.clone(),
                };
                out.push(WsDiag::error(step.line, cols, failure.message(&db.names)));
            }
        }
    }

    /// Distinctness constraints the citation imposes on the goal.
    fn dv_hints_for(
        &self,
        step: &Step,
        db: &Db,
        idx: StmtIdx,
        subst: &Subst,
        out: &mut Vec<WsDiag>,
    ) {
        let frame = match db.stmt(idx).and_then(|s| s.frame.clone()) {
            Some(frame) => frame,
            None => return,
        };
        let goal = self.dv_frame(db);
        for &(x, y) in frame.disjoint.iter() {
            let (ex, ey) = match (subst.get(x), subst.get(y)) {
                (Some(ex), Some(ey)) => (ex, ey),
                _ => continue,
            };
            for &a in ex.iter().filter(|&&s| db.is_var(s)) {
                for &b in ey.iter().filter(|&&s| db.is_var(s)) {
                    if a != b && !goal.map_or(false, |f| f.disjoint_contains(a, b)) {
                        out.push(WsDiag {
                            line: step.line,
                            cols: step.formula_cols.clone(),
                            severity: Severity::Hint,
                            message: format!(
                                "requires $d {} {}",
                                db.names.resolve(a),
                                db.names.resolve(b)
                            ),
                        });
                    }
                }
            }
        }
    }

    fn check_qed(&self, step: &Step, db: &Db, out: &mut Vec<WsDiag>) {
        let declared = self
            .theorem_idx(db)
            .and_then(|idx| db.stmt(idx))
            .and_then(|s| s.formula().cloned());
        if let (Some(declared), Some(given)) = (declared, &step.formula) {
            if declared != *given {
                out.push(WsDiag::error(
                    step.line,
                    step.formula_cols.clone(),
                    "Proof formula does not match database",
                ));
            }
        }
    }

    /// Unify the step at the given line against its citation, or
    /// against the earliest-declared matching assertion when the
    /// citation is unknown. Returns the completed step text.
    pub fn unify_step(&self, db: &Db, line: usize) -> Result<StepUnification, UnifyFailure> {
        let step = self.step_at_line(line).ok_or(UnifyFailure::NoCandidate)?;
        let hyps = self.hyp_formulas(step);
        let (idx, subst) = match step.label.as_deref() {
            Some(label) => {
                let idx = db.lookup(label).ok_or(UnifyFailure::NoCandidate)?;
                let subst =
                    unify::unify(db, idx, step.formula.as_ref(), &hyps, &Subst::new(), None)?;
                (idx, subst)
            }
            None => {
                let target = step.formula.as_ref().ok_or(UnifyFailure::NoCandidate)?;
                unify::find_candidate(db, target, &hyps, self.citation_limit(db))
                    .ok_or(UnifyFailure::NoCandidate)?
            }
        };

        let stmt = db.stmt(idx).ok_or(UnifyFailure::NoCandidate)?;
        let concl = stmt.formula().ok_or(UnifyFailure::NoCandidate)?;
        let formula = subst.apply(concl);
        let label = db.names.resolve(stmt.label.expect("assertions are labeled"));

        let mut text = String::new();
        if step.kind == StepKind::Hyp {
            text.push('h');
        }
        let hyp_refs: Vec<&str> = step
            .hyps
            .iter()
            .map(|h| h.as_deref().unwrap_or("?"))
            .collect();
        let _ = write!(
            text,
            "{}:{}:{} {}",
            step.name,
            hyp_refs.join(","),
            label,
            formula.display(&db.names)
        );
        Ok(StepUnification {
            line: step.line,
            text,
            subst,
        })
    }
}

/// Render a verified proof as a worksheet.
///
/// Only nodes of the theorem's own typecode become steps; the
/// grammatical subproofs below them stay implicit, like in the
/// worksheets users write. Hypothesis steps come out as `h<n>`, the
/// conclusion as `qed`, and the full proof (grammatical nodes
/// included) is appended as a compressed block.
pub fn render_proof(db: &Db, idx: StmtIdx, proof: &VerifiedProof) -> Option<String> {
    let stmt = db.stmt(idx)?;
    let label = db.names.resolve(stmt.label?);
    let formula = stmt.formula()?;
    let frame = stmt.frame.as_ref()?;
    let tc = formula.typecode();

    let mut out = format!("$( <MM> <PROOF_ASST> THEOREM={}  LOC_AFTER=?\n", label);

    // emit visible nodes in post-order; names[n] is the step name
    let mut names: FnvHashMap<usize, String> = Default::default();
    let mut next = 1usize;
    let mut stack = vec![(proof.root, false)];
    while let Some((node, expanded)) = stack.pop() {
        if names.contains_key(&node) {
            continue;
        }
        let n = &proof.nodes[node];
        if n.formula.typecode() != tc {
            continue;
        }
        if !expanded {
            stack.push((node, true));
            stack.extend(n.hyps.iter().rev().map(|&h| (h, false)));
            continue;
        }

        let is_hyp = n.hyps.is_empty() && frame.hyp_index(n.label).is_some();
        let name = if node == proof.root {
            "qed".to_string()
        } else {
            next += 1;
            (next - 1).to_string()
        };
        let refs: Vec<&str> = n
            .hyps
            .iter()
            .filter_map(|h| names.get(h).map(|s| s.as_str()))
            .collect();
        let _ = writeln!(
            out,
            "{}{}:{}:{} {}",
            if is_hyp { "h" } else { "" },
            name,
            refs.join(","),
            db.names.resolve(n.label),
            n.formula.display(&db.names)
        );
        names.insert(node, name);
    }

    let _ = writeln!(out, "$= {} $.", compress(db, idx, proof)?);
    out.push_str("$)\n");
    Some(out)
}

/// Encode a verified proof in the compressed format.
pub fn compress(db: &Db, idx: StmtIdx, proof: &VerifiedProof) -> Option<String> {
    let stmt = db.stmt(idx)?;
    let frame = stmt.frame.as_ref()?;
    let m = frame.len();

    // use counts decide which subtrees get tagged for reuse
    let mut counts: FnvHashMap<usize, usize> = Default::default();
    let mut stack = vec![proof.root];
    while let Some(node) = stack.pop() {
        let c = counts.entry(node).or_insert(0);
        *c += 1;
        if *c == 1 {
            stack.extend(proof.nodes[node].hyps.iter().copied());
        }
    }

    let is_mand = |node: &crate::verify::ProofNode| {
        node.hyps.is_empty() && frame.hyp_index(node.label).is_some()
    };

    // labels in order of first use, mandatory hypotheses excluded
    let mut labels: Vec<Atom> = Vec::new();
    let mut stack = vec![(proof.root, false)];
    let mut seen: FnvHashMap<usize, ()> = Default::default();
    while let Some((node, expanded)) = stack.pop() {
        let n = &proof.nodes[node];
        if !expanded {
            if seen.insert(node, ()).is_some() {
                continue;
            }
            stack.push((node, true));
            stack.extend(n.hyps.iter().rev().map(|&h| (h, false)));
            continue;
        }
        if !is_mand(n) && !labels.contains(&n.label) {
            labels.push(n.label);
        }
    }

    // emit the number blob, tagging shared subtrees with Z
    let mut tags = String::new();
    let mut tagged: FnvHashMap<usize, usize> = Default::default();
    let mut stack = vec![(proof.root, false)];
    while let Some((node, expanded)) = stack.pop() {
        let n = &proof.nodes[node];
        if !expanded {
            if let Some(&t) = tagged.get(&node) {
                letters(m + labels.len() + t + 1, &mut tags);
                continue;
            }
            if is_mand(n) {
                letters(frame.hyp_index(n.label)? + 1, &mut tags);
                continue;
            }
            stack.push((node, true));
            stack.extend(n.hyps.iter().rev().map(|&h| (h, false)));
            continue;
        }
        let pos = labels.iter().position(|&l| l == n.label)?;
        letters(m + pos + 1, &mut tags);
        if counts.get(&node).copied().unwrap_or(0) > 1 {
            tags.push('Z');
            tagged.insert(node, tagged.len());
        }
    }

    let labels: Vec<&str> = labels.iter().map(|&l| db.names.resolve(l)).collect();
    Some(format!("( {} ) {}", labels.join(" "), tags))
}

fn letters(mut n: usize, out: &mut String) {
    debug_assert!(n >= 1);
    let mut buf = [0u8; 16];
    let mut i = 0;
    buf[i] = b'A' + ((n - 1) % 20) as u8;
    n = (n - 1) / 20;
    i += 1;
    while n > 0 {
        buf[i] = b'U' + ((n - 1) % 5) as u8;
        n = (n - 1) / 5;
        i += 1;
    }
    out.extend(buf[..i].iter().rev().map(|&b| b as char));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify;

    const BASE: &str = r"
        $c wff |- ( ) -> $.
        $v ph ps ch $.
        wph $f wff ph $.
        wps $f wff ps $.
        wch $f wff ch $.
        wi $a wff ( ph -> ps ) $.
        ${
            mp.1 $e |- ph $.
            mp.2 $e |- ( ph -> ps ) $.
            ax-mp $a |- ps $.
        $}
        ax-id $a |- ( ph -> ph ) $.
        ${
            th.1 $e |- ph $.
            th.2 $e |- ( ph -> ps ) $.
            thm $p |- ps $= wph wps th.1 th.2 ax-mp $.
        $}
    ";

    fn db() -> Db {
        let mut db = Db::from_source(BASE);
        assert!(verify::refresh(&mut db, &()));
        db
    }

    const SHEET: &str = "$( <MM> <PROOF_ASST> THEOREM=thm  LOC_AFTER=?\n\
                         h1::th.1 |- ph\n\
                         h2::th.2 |- ( ph -> ps )\n\
                         qed:1,2:ax-mp |- ps\n\
                         $)\n";

    #[test]
    fn parse_and_check_clean_sheet() {
        let db = db();
        let ws = Worksheet::parse(SHEET, &db);
        assert_eq!(ws.theorem.as_deref(), Some("thm"));
        assert_eq!(ws.steps.len(), 3);
        assert_eq!(ws.steps[0].kind, StepKind::Hyp);
        assert_eq!(ws.steps[2].kind, StepKind::Qed);
        assert_eq!(ws.diagnostics(&db, false), []);
    }

    #[test]
    fn unknown_step_reference_is_diagnosed() {
        let db = db();
        let sheet = SHEET.replace("qed:1,2:", "qed:1,9:");
        let ws = Worksheet::parse(&sheet, &db);
        let diags = ws.diagnostics(&db, false);
        assert!(diags.iter().any(|d| d.message == "Unknown step name"));
    }

    #[test]
    fn wrong_hypothesis_count_is_diagnosed() {
        let db = db();
        let sheet = SHEET.replace("qed:1,2:", "qed:1:");
        let ws = Worksheet::parse(&sheet, &db);
        let diags = ws.diagnostics(&db, false);
        assert!(diags
            .iter()
            .any(|d| d.message.contains("expected 2, got 1")));
    }

    #[test]
    fn follow_up_lines_join_their_step() {
        let db = db();
        let sheet = SHEET.replace("|- ( ph -> ps )", "|- ( ph\n     -> ps )");
        let ws = Worksheet::parse(&sheet, &db);
        assert_eq!(ws.diagnostics(&db, false), []);
        let f = ws.steps[1].formula.as_ref().unwrap();
        assert_eq!(f.display(&db.names).to_string(), "|- ( ph -> ps )");
    }

    #[test]
    fn unify_fills_in_the_qed_formula() {
        let db = db();
        let sheet = SHEET.replace("qed:1,2:ax-mp |- ps", "qed:1,2:ax-mp");
        let ws = Worksheet::parse(&sheet, &db);
        let done = ws.unify_step(&db, 3).unwrap();
        assert_eq!(done.text, "qed:1,2:ax-mp |- ps");
    }

    #[test]
    fn unify_finds_the_earliest_candidate_for_unlabeled_steps() {
        let db = db();
        let sheet = "$( <MM> <PROOF_ASST> THEOREM=thm  LOC_AFTER=?\n\
                     1:: |- ( ps -> ps )\n\
                     $)\n";
        let ws = Worksheet::parse(sheet, &db);
        let done = ws.unify_step(&db, 1).unwrap();
        assert_eq!(done.text, "1::ax-id |- ( ps -> ps )");
    }

    #[test]
    fn rendered_proof_reparses_and_checks_out() {
        let db = db();
        let idx = db.lookup("thm").unwrap();
        let thm = db.names.get("thm").unwrap();
        let proof = db.proof_entry(thm).unwrap().result.clone().unwrap();
        let text = render_proof(&db, idx, &proof).unwrap();

        let ws = Worksheet::parse(&text, &db);
        assert_eq!(ws.theorem.as_deref(), Some("thm"));
        assert_eq!(ws.diagnostics(&db, false), []);
        let qed = ws.step_by_name("qed").unwrap();
        assert_eq!(
            qed.formula.as_ref(),
            db.statement("thm").unwrap().formula()
        );
    }

    #[test]
    fn compressed_block_round_trips_through_the_verifier() {
        let db = db();
        let idx = db.lookup("thm").unwrap();
        let thm = db.names.get("thm").unwrap();
        let proof = db.proof_entry(thm).unwrap().result.clone().unwrap();
        let block = compress(&db, idx, &proof).unwrap();

        // splice the compressed proof back into the source
        let source = BASE.replace(
            "$= wph wps th.1 th.2 ax-mp $.",
            &format!("$= {} $.", block),
        );
        let mut db2 = Db::from_source(&source);
        assert!(verify::refresh(&mut db2, &()));
        let thm2 = db2.names.get("thm").unwrap();
        assert!(db2.proof_entry(thm2).unwrap().result.is_ok());
    }

    #[test]
    fn dv_hints_surface_missing_constraints() {
        let text = r"
            $c wff |- $.
            $v x y $.
            vx $f wff x $.
            vy $f wff y $.
            ${
                $d x y $.
                axd $a |- x y $.
            $}
            goal $p |- x y $= ? $.
        ";
        let mut db = Db::from_source(text);
        verify::refresh(&mut db, &());
        let sheet = "$( <MM> <PROOF_ASST> THEOREM=goal  LOC_AFTER=?\n\
                     qed::axd |- x y\n\
                     $)\n";
        let ws = Worksheet::parse(sheet, &db);
        let diags = ws.diagnostics(&db, true);
        assert!(diags.iter().any(|d| d.message == "requires $d x y"));
        // with hints off the sheet is clean
        assert_eq!(ws.diagnostics(&db, false), []);
    }
}
