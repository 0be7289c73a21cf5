//! First-order unification of worksheet formulas against assertion
//! patterns.
//!
//! The variables of a candidate's floating hypotheses act as pattern
//! variables; every other symbol is literal. A variable binds a
//! non-empty symbol fragment. Where several splits are possible the
//! matcher deterministically commits to the leftmost-shortest binding
//! (backtracking on failure), so identical inputs always yield
//! identical substitutions.

use crate::db::{Db, StmtIdx};
use crate::error::UnifyFailure as F;
use crate::formula::Formula;
use crate::statement::Frame;
use crate::subst::Subst;
use crate::symbol::Atom;
use fnv::FnvHashSet;

struct Matcher<'a> {
    vars: &'a FnvHashSet<Atom>,
    /// Furthest failure seen, for a precise diagnostic.
    best: Option<(usize, F)>,
}

impl Matcher<'_> {
    fn fail(&mut self, at: usize, f: F) -> Result<(), ()> {
        if self.best.as_ref().map_or(true, |(b, _)| at >= *b) {
            self.best = Some((at, f));
        }
        Err(())
    }

    fn seq(&mut self, pat: &[Atom], tgt: &[Atom], at: usize, subst: &mut Subst) -> Result<(), ()> {
        let (p, rest) = match pat.split_first() {
            Some(x) => x,
            None if tgt.is_empty() => return Ok(()),
            None => return self.fail(at, F::Symbol { at }),
        };
        if !self.vars.contains(p) {
            return match tgt.split_first() {
                Some((t, trest)) if t == p => self.seq(rest, trest, at + 1, subst),
                _ => self.fail(at, F::Symbol { at }),
            };
        }
        if let Some(frag) = subst.get(*p) {
            let len = frag.len();
            if tgt.len() >= len && tgt[..len] == *frag {
                return self.seq(rest, &tgt[len..], at + len, subst);
            }
            return self.fail(at, F::InconsistentBinding { var: *p });
        }
        if tgt.is_empty() {
            return self.fail(at, F::Symbol { at });
        }
        for len in 1..=tgt.len() {
            subst.bind(*p, tgt[..len].into());
            if self.seq(rest, &tgt[len..], at + len, subst).is_ok() {
                return Ok(());
            }
            subst.unbind(*p);
        }
        Err(())
    }
}

fn match_one(
    vars: &FnvHashSet<Atom>,
    pat: &Formula,
    tgt: &Formula,
    subst: &mut Subst,
) -> Result<(), F> {
    if pat.typecode() != tgt.typecode() {
        return Err(F::Typecode {
            expected: pat.typecode(),
            found: tgt.typecode(),
        });
    }
    let mut m = Matcher { vars, best: None };
    match m.seq(pat.expr(), tgt.expr(), 0, subst) {
        Ok(()) => Ok(()),
        Err(()) => Err(m.best.map(|(_, f)| f).unwrap_or(F::NoCandidate)),
    }
}

/// Check the candidate's distinctness constraints under a substitution.
///
/// Two constrained fragments may never share a variable. When the
/// goal's frame is known, each cross pair of substituted variables must
/// additionally be constrained there.
fn check_disjoint(db: &Db, frame: &Frame, subst: &Subst, dv: Option<&Frame>) -> Result<(), F> {
    for &(x, y) in frame.disjoint.iter() {
        let (ex, ey) = match (subst.get(x), subst.get(y)) {
            (Some(ex), Some(ey)) => (ex, ey),
            _ => continue,
        };
        for &a in ex.iter().filter(|&&s| db.is_var(s)) {
            for &b in ey.iter().filter(|&&s| db.is_var(s)) {
                if a == b || dv.map_or(false, |f| !f.disjoint_contains(a, b)) {
                    return Err(F::DisjointViolated { var1: a, var2: b });
                }
            }
        }
    }
    Ok(())
}

/// Unify a candidate assertion against a (possibly unknown) target
/// formula and the formulas supplied for its essential hypotheses,
/// extending `known`. Conflicting bindings across slots fail with
/// [`InconsistentBinding`](F::InconsistentBinding), never a silent
/// overwrite. On success the merged substitution is returned.
pub fn unify(
    db: &Db,
    candidate: StmtIdx,
    target: Option<&Formula>,
    hyp_targets: &[Option<&Formula>],
    known: &Subst,
    dv: Option<&Frame>,
) -> Result<Subst, F> {
    let stmt = db.stmt(candidate).ok_or(F::NoCandidate)?;
    let concl = stmt.formula().ok_or(F::NoCandidate)?;
    let frame = match (&stmt.frame, stmt.is_assertion()) {
        (Some(frame), true) => frame,
        _ => return Err(F::NoCandidate),
    };
    if frame.essentials.len() != hyp_targets.len() {
        return Err(F::HypCount {
            expected: frame.essentials.len(),
            actual: hyp_targets.len(),
        });
    }

    let vars: FnvHashSet<Atom> = frame.floats.iter().map(|fh| fh.var).collect();
    let mut subst = known.clone();
    if let Some(target) = target {
        match_one(&vars, concl, target, &mut subst)?;
    }
    for (ess, tgt) in frame.essentials.iter().zip(hyp_targets) {
        if let Some(tgt) = tgt {
            match_one(&vars, &ess.formula, tgt, &mut subst)?;
        }
    }
    check_disjoint(db, frame, &subst, dv)?;
    Ok(subst)
}

/// Scan assertions in declaration order for the first one that unifies
/// with the target; ties go to the earliest declared.
pub fn find_candidate(
    db: &Db,
    target: &Formula,
    hyp_targets: &[Option<&Formula>],
    before: Option<StmtIdx>,
) -> Option<(StmtIdx, Subst)> {
    let end = before.unwrap_or_else(|| db.len());
    db.statements()
        .take_while(|(idx, _)| *idx < end)
        .find_map(|(idx, stmt)| {
            if !stmt.is_assertion() {
                return None;
            }
            if stmt.frame.as_ref()?.essentials.len() != hyp_targets.len() {
                return None;
            }
            let subst = unify(db, idx, Some(target), hyp_targets, &Subst::new(), None).ok()?;
            Some((idx, subst))
        })
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
    ";

    fn db() -> Db {
        let mut db = Db::from_source(BASE);
        assert!(verify::refresh(&mut db, &()));
        assert_eq!(db.diagnostics().count(), 0);
        db
    }

    fn formula(db: &Db, s: &str) -> Formula {
        let syms = s
            .split_whitespace()
            .map(|t| db.names.get(t).expect("known symbol"))
            .collect();
        Formula::new(syms)
    }

    #[test]
    fn leftmost_shortest_binding() {
        let db = db();
        let wi = db.lookup("wi").unwrap();
        let target = formula(&db, "wff ( ch -> ( ph -> ps ) )");
        let subst = unify(&db, wi, Some(&target), &[], &Subst::new(), None).unwrap();
        let ph = db.names.get("ph").unwrap();
        let ps = db.names.get("ps").unwrap();
        assert_eq!(subst.get(ph).unwrap(), [db.names.get("ch").unwrap()]);
        assert_eq!(
            subst.get(ps).unwrap(),
            formula(&db, "wff ( ph -> ps )").expr()
        );
    }

    #[test]
    fn unification_is_deterministic() {
        let db = db();
        let wi = db.lookup("wi").unwrap();
        let target = formula(&db, "wff ( ( ph -> ps ) -> ch )");
        let once = unify(&db, wi, Some(&target), &[], &Subst::new(), None).unwrap();
        let twice = unify(&db, wi, Some(&target), &[], &Subst::new(), None).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn inconsistent_binding_across_slots() {
        let db = db();
        let mp = db.lookup("ax-mp").unwrap();
        let target = formula(&db, "|- ph");
        let h1 = formula(&db, "|- ps");
        let h2 = formula(&db, "|- ( ch -> ph )");
        let err = unify(
            &db,
            mp,
            Some(&target),
            &[Some(&h1), Some(&h2)],
            &Subst::new(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, F::InconsistentBinding { .. }));
    }

    #[test]
    fn hypothesis_count_mismatch() {
        let db = db();
        let mp = db.lookup("ax-mp").unwrap();
        let target = formula(&db, "|- ph");
        let err = unify(&db, mp, Some(&target), &[], &Subst::new(), None).unwrap_err();
        assert_eq!(
            err,
            F::HypCount {
                expected: 2,
                actual: 0
            }
        );
    }

    #[test]
    fn typecode_mismatch() {
        let db = db();
        let wi = db.lookup("wi").unwrap();
        let target = formula(&db, "|- ( ph -> ps )");
        let err = unify(&db, wi, Some(&target), &[], &Subst::new(), None).unwrap_err();
        assert!(matches!(err, F::Typecode { .. }));
    }

    #[test]
    fn earliest_declared_candidate_wins() {
        let text = format!(
            "{}{}",
            BASE,
            r"
            first $a wff ( ph -> ph ) $.
            second $a wff ( ph -> ph ) $.
        "
        );
        let db = Db::from_source(&text);
        let target = {
            let syms = ["wff", "(", "ps", "->", "ps", ")"]
                .iter()
                .map(|t| db.names.get(t).unwrap())
                .collect();
            Formula::new(syms)
        };
        // wi also matches and is declared before both
        let (idx, _) = find_candidate(&db, &target, &[], None).unwrap();
        assert_eq!(idx, db.lookup("wi").unwrap());
        // restricting the scan past wi picks `first`, never `second`
        let after_wi = db.lookup("wi").unwrap();
        let (idx, _) = db
            .statements()
            .skip(after_wi + 1)
            .find_map(|(i, stmt)| {
                if !stmt.is_assertion() {
                    return None;
                }
                let s = unify(&db, i, Some(&target), &[], &Subst::new(), None).ok()?;
                Some((i, s))
            })
            .unwrap();
        assert_eq!(idx, db.lookup("first").unwrap());
    }
}
