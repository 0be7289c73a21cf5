//! Proof verification.
//!
//! A Metamath proof is a stack program: hypothesis references push
//! their formula, assertion references pop one entry per mandatory
//! hypothesis, compute the substitution that maps the assertion's
//! floating hypotheses onto the popped formulas, and push the
//! substituted conclusion. The machine below runs that program over an
//! explicit array of derivation nodes, so no recursion is involved and
//! cancellation can be polled between steps.

use crate::db::{Db, ProofEntry, StmtIdx};
use crate::error::VerifyError as E;
use crate::formula::Formula;
use crate::statement::{Frame, Proof, StatementKind};
use crate::subst::Subst;
use crate::symbol::Atom;
use fnv::FnvHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Cooperative cancellation, polled at proof-step granularity.
pub trait Interrupt {
    fn interrupted(&self) -> bool;
}

/// Never interrupts.
impl Interrupt for () {
    fn interrupted(&self) -> bool {
        false
    }
}

/// One derivation step: an applied statement and the nodes it consumed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProofNode {
    pub label: Atom,
    pub hyps: Box<[usize]>,
    pub formula: Formula,
}

/// A proof reduced to its theorem's formula.
///
/// Nodes are in evaluation order and may be shared (compressed proofs
/// reuse subtrees), so this is a DAG addressed by node index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedProof {
    pub nodes: Box<[ProofNode]>,
    pub root: usize,
}

struct Machine<'a, I> {
    db: &'a Db,
    /// Frame of the theorem being verified.
    frame: &'a Frame,
    /// Index of the theorem; only earlier statements may be referenced.
    idx: StmtIdx,
    intr: &'a I,
    nodes: Vec<ProofNode>,
    stack: Vec<usize>,
    step: usize,
}

impl<'a, I: Interrupt> Machine<'a, I> {
    fn push_node(&mut self, label: Atom, hyps: Box<[usize]>, formula: Formula) {
        self.nodes.push(ProofNode {
            label,
            hyps,
            formula,
        });
        self.stack.push(self.nodes.len() - 1);
    }

    fn step_label(&mut self, label: Atom) -> Result<(), E> {
        if self.intr.interrupted() {
            return Err(E::Canceled);
        }
        let step = self.step;
        self.step += 1;

        if let Some(i) = self.frame.hyp_index(label) {
            let formula = self.frame.hyp_formula(i).expect("index from own frame");
            self.push_node(label, Box::new([]), formula);
            return Ok(());
        }
        if let Some(fh) = self.frame.dummy(label) {
            let formula = Formula::new(vec![fh.typecode, fh.var]);
            self.push_node(label, Box::new([]), formula);
            return Ok(());
        }

        let ridx = self.db.lookup_atom(label).ok_or(E::UnknownLabel(label))?;
        if ridx >= self.idx {
            return Err(E::ForwardReference(label));
        }
        let stmt = self.db.stmt(ridx).expect("index from label table").clone();
        match &stmt.kind {
            StatementKind::Axiom(concl) | StatementKind::Theorem(concl, _) => {
                let rframe = stmt.frame.as_ref().expect("assertions carry frames");
                self.apply(label, concl, rframe, step)
            }
            _ => Err(E::NotUsable(label)),
        }
    }

    /// Pop the referenced assertion's mandatory hypotheses, derive and
    /// check the substitution, and push the substituted conclusion.
    fn apply(&mut self, label: Atom, concl: &Formula, rframe: &Frame, step: usize) -> Result<(), E> {
        let n = rframe.len();
        if self.stack.len() < n {
            return Err(E::StackUnderflow { step });
        }
        let base = self.stack.len() - n;
        let popped: Vec<usize> = self.stack[base..].to_vec();
        self.stack.truncate(base);

        let mut subst = Subst::new();
        for (i, fh) in rframe.floats.iter().enumerate() {
            let f = &self.nodes[popped[i]].formula;
            if f.typecode() != fh.typecode || !subst.bind(fh.var, f.expr().into()) {
                return Err(E::SubstitutionMismatch { step, label });
            }
        }
        for (j, ess) in rframe.essentials.iter().enumerate() {
            let expected = subst.apply(&ess.formula);
            let actual = &self.nodes[popped[rframe.floats.len() + j]].formula;
            if *actual != expected {
                return Err(E::SubstitutionMismatch { step, label });
            }
        }
        self.check_disjoint(rframe, &subst, step)?;

        let formula = subst.apply(concl);
        self.push_node(label, popped.into(), formula);
        Ok(())
    }

    /// Every distinctness constraint of the referenced assertion must
    /// hold for the substituted fragments: they may share no variable,
    /// and each cross pair of their variables must itself be constrained
    /// in the calling frame.
    fn check_disjoint(&self, rframe: &Frame, subst: &Subst, step: usize) -> Result<(), E> {
        for &(x, y) in rframe.disjoint.iter() {
            let ex = match subst.get(x) {
                Some(e) => e,
                None => continue,
            };
            let ey = match subst.get(y) {
                Some(e) => e,
                None => continue,
            };
            for &a in ex.iter().filter(|&&s| self.db.is_var(s)) {
                for &b in ey.iter().filter(|&&s| self.db.is_var(s)) {
                    if a == b || !self.frame.disjoint_contains(a, b) {
                        return Err(E::DisjointViolation {
                            step,
                            var1: a,
                            var2: b,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn run_compressed(&mut self, labels: &[Atom], tags: &str) -> Result<(), E> {
        let m = self.frame.len();
        let mut tagged: Vec<usize> = Vec::new();
        let mut num = 0usize;
        for ch in tags.chars() {
            match ch {
                'U'..='Y' => num = num * 5 + (ch as usize - 'U' as usize + 1),
                'A'..='T' => {
                    let n = num * 20 + (ch as usize - 'A' as usize + 1);
                    num = 0;
                    if n <= m {
                        let label = self.frame.hyp_label(n - 1).expect("n <= frame len");
                        self.step_label(label)?;
                    } else if n <= m + labels.len() {
                        self.step_label(labels[n - m - 1])?;
                    } else {
                        let t = n - m - labels.len() - 1;
                        let node = *tagged.get(t).ok_or(E::Compressed("bad subtree reference"))?;
                        if self.intr.interrupted() {
                            return Err(E::Canceled);
                        }
                        self.step += 1;
                        self.stack.push(node);
                    }
                }
                'Z' => {
                    let top = *self.stack.last().ok_or(E::Compressed("Z on empty stack"))?;
                    tagged.push(top);
                }
                _ => return Err(E::Compressed("unexpected character")),
            }
        }
        if num != 0 {
            return Err(E::Compressed("truncated number"));
        }
        Ok(())
    }
}

/// Run a theorem's proof against the database.
pub fn verify(db: &Db, idx: StmtIdx, intr: &impl Interrupt) -> Result<VerifiedProof, E> {
    let stmt = match db.stmt(idx) {
        Some(stmt) => stmt,
        None => return Err(E::NotATheorem),
    };
    let (formula, proof) = match &stmt.kind {
        StatementKind::Theorem(f, p) => (f, p),
        _ => return Err(E::NotATheorem),
    };
    let frame = stmt.frame.as_ref().ok_or(E::NotATheorem)?;

    let mut machine = Machine {
        db,
        frame,
        idx,
        intr,
        nodes: Vec::new(),
        stack: Vec::new(),
        step: 0,
    };
    match proof {
        Proof::Normal(refs) if !refs.is_empty() => {
            for &label in refs.iter() {
                machine.step_label(label)?;
            }
        }
        Proof::Compressed { labels, tags } => machine.run_compressed(labels, tags)?,
        _ => return Err(E::Incomplete),
    }

    if machine.stack.len() != 1 {
        return Err(E::StackUnbalanced {
            left: machine.stack.len(),
        });
    }
    let root = machine.stack[0];
    if machine.nodes[root].formula != *formula {
        return Err(E::ConclusionMismatch);
    }
    Ok(VerifiedProof {
        nodes: machine.nodes.into(),
        root,
    })
}

/// Dependency keys for every statement, in declaration order.
///
/// A theorem's key covers its own source, its frame and the keys of
/// every statement its proof references, so editing a proof changes
/// the keys of exactly its transitive dependents.
pub fn proof_keys(db: &Db) -> Vec<u64> {
    let mut keys = Vec::with_capacity(db.len());
    for (idx, stmt) in db.statements() {
        let mut h = FnvHasher::default();
        h.write_u64(stmt.src_hash);
        if let Some(frame) = &stmt.frame {
            frame.hash(&mut h);
        }
        if let Some(proof) = stmt.proof() {
            let refs: &[Atom] = match proof {
                Proof::Normal(refs) => refs,
                Proof::Compressed { labels, .. } => labels,
                _ => &[],
            };
            for &label in refs {
                match db.lookup_atom(label) {
                    Some(r) if r < idx => h.write_u64(keys[r]),
                    _ => h.write_u64(0),
                }
            }
        }
        keys.push(h.finish());
    }
    keys
}

/// Theorems whose cached verification no longer matches their key.
pub fn stale(db: &Db, keys: &[u64]) -> Vec<StmtIdx> {
    db.statements()
        .filter_map(|(idx, stmt)| {
            let label = stmt.label?;
            stmt.proof()?;
            match db.proof_entry(label) {
                Some(entry) if entry.key == keys[idx] => None,
                _ => Some(idx),
            }
        })
        .collect()
}

/// Drop cache entries whose label no longer exists.
pub fn prune_orphans(db: &mut Db) {
    let orphans: Vec<Atom> = db
        .proofs
        .keys()
        .filter(|l| db.lookup_atom(**l).is_none())
        .copied()
        .collect();
    for label in orphans {
        db.proofs.remove(&label);
    }
}

/// Re-verify all stale theorems in place, keeping cached results for
/// everything else. Returns false when interrupted; the snapshot must
/// then be discarded instead of published.
pub fn refresh(db: &mut Db, intr: &impl Interrupt) -> bool {
    let keys = proof_keys(db);
    prune_orphans(db);
    for idx in stale(db, &keys) {
        let label = db.stmt(idx).and_then(|s| s.label).expect("stale index");
        let result = verify(db, idx, intr).map(Arc::new);
        if matches!(result, Err(E::Canceled)) {
            return false;
        }
        db.set_proof_entry(
            label,
            ProofEntry {
                key: keys[idx],
                result,
            },
        );
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::Builder;
    use metamath_parse::{MemLoader, SourceMap};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const BASE: &str = r"
        $c wff |- ( ) -> $.
        $v ph ps $.
        wph $f wff ph $.
        wps $f wff ps $.
        wi $a wff ( ph -> ps ) $.
        ${
            mp.1 $e |- ph $.
            mp.2 $e |- ( ph -> ps ) $.
            ax-mp $a |- ps $.
        $}
    ";

    const THM: &str = r"
        ${
            th.1 $e |- ph $.
            th.2 $e |- ( ph -> ps ) $.
            thm $p |- ps $= wph wps th.1 th.2 ax-mp $.
        $}
    ";

    fn db(text: &str) -> Db {
        let mut db = Db::from_source(text);
        assert!(refresh(&mut db, &()));
        db
    }

    fn result<'a>(db: &'a Db, label: &str) -> &'a Result<Arc<VerifiedProof>, E> {
        let atom = db.names.get(label).unwrap();
        &db.proof_entry(atom).unwrap().result
    }

    #[test]
    fn normal_proof_verifies() {
        let db = db(&format!("{}{}", BASE, THM));
        let proof = result(&db, "thm").as_ref().unwrap();
        let root = &proof.nodes[proof.root];
        assert_eq!(
            root.formula.display(&db.names).to_string(),
            "|- ps"
        );
        assert_eq!(root.hyps.len(), 4);
    }

    #[test]
    fn compressed_proof_verifies() {
        let text = format!(
            "{}{}",
            BASE,
            r"
            ${
                th.1 $e |- ph $.
                th.2 $e |- ( ph -> ps ) $.
                thm $p |- ps $= ( ax-mp ) ABCDE $.
            $}
        "
        );
        let db = db(&text);
        assert!(result(&db, "thm").is_ok());
    }

    #[test]
    fn conclusion_mismatch_is_reported() {
        let text = format!(
            "{}{}",
            BASE,
            r"
            ${
                th.1 $e |- ph $.
                th.2 $e |- ( ph -> ps ) $.
                thm $p |- ph $= wph wps th.1 th.2 ax-mp $.
            $}
        "
        );
        let db = db(&text);
        assert_eq!(result(&db, "thm"), &Err(E::ConclusionMismatch));
    }

    #[test]
    fn disjoint_violation_is_reported() {
        let text = r"
            $c wff |- $.
            $v x y $.
            vx $f wff x $.
            vy $f wff y $.
            ${
                $d x y $.
                axd $a |- x y $.
            $}
            bad $p |- x x $= vx vx axd $.
        ";
        let db = db(text);
        assert!(matches!(
            result(&db, "bad"),
            Err(E::DisjointViolation { .. })
        ));
    }

    #[test]
    fn disjoint_constraint_satisfied_in_caller() {
        let text = r"
            $c wff |- $.
            $v x y $.
            vx $f wff x $.
            vy $f wff y $.
            ${
                $d x y $.
                axd $a |- x y $.
            $}
            ${
                $d x y $.
                good $p |- x y $= vx vy axd $.
            $}
        ";
        let db = db(text);
        assert!(result(&db, "good").is_ok());
    }

    #[test]
    fn incomplete_proof_is_not_an_error_of_others() {
        let text = format!(
            "{}{}{}",
            BASE,
            r"
            half $p |- ( ph -> ph ) $= ? $.
        ",
            THM
        );
        let db = db(&text);
        assert_eq!(result(&db, "half"), &Err(E::Incomplete));
        assert!(result(&db, "thm").is_ok());
    }

    #[test]
    fn reverification_is_deterministic() {
        let db = db(&format!("{}{}", BASE, THM));
        let idx = db.lookup("thm").unwrap();
        let once = verify(&db, idx, &()).unwrap();
        let twice = verify(&db, idx, &()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn editing_a_proof_invalidates_exactly_its_dependents() {
        let one = r"
            ${ u.1 $e |- ph $. u.2 $e |- ( ph -> ps ) $.
               use1 $p |- ps $= wph wps u.1 u.2 ax-mp $. $}
        ";
        let two = r"
            other $p wff ( ph -> ps ) $= wph wps wi $.
        ";
        let mut first = Db::from_source(&format!("{}{}{}", BASE, one, two));
        assert!(refresh(&mut first, &()));

        // touch only `other`'s proof
        let edited = format!("{}{}{}", BASE, one, two.replace("wph wps wi", "wps wph wi"));
        let loader = MemLoader::default().file("<input>", edited);
        let sm = SourceMap::load("<input>", &loader).unwrap();
        let mut second = Builder::new(&sm).with_previous(&first).build();

        let keys = proof_keys(&second);
        let only: Vec<_> = stale(&second, &keys);
        assert_eq!(only, vec![second.lookup("other").unwrap()]);

        assert!(refresh(&mut second, &()));
        // untouched results are the same allocation as before
        let use1 = first.names.get("use1").unwrap();
        let before = first.proof_entry(use1).unwrap().result.as_ref().unwrap();
        let after = second.proof_entry(use1).unwrap().result.as_ref().unwrap();
        assert!(Arc::ptr_eq(before, after));
        // and the edited proof now fails
        assert!(matches!(result(&second, "other"), Err(_)));
    }

    struct After(AtomicUsize);

    impl Interrupt for After {
        fn interrupted(&self) -> bool {
            self.0.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_err()
        }
    }

    #[test]
    fn cancellation_stops_between_steps() {
        let mut db = Db::from_source(&format!("{}{}", BASE, THM));
        let intr = After(AtomicUsize::new(2));
        assert!(!refresh(&mut db, &intr));
        // nothing was published for the canceled theorem
        let thm = db.names.get("thm").unwrap();
        assert!(db.proof_entry(thm).is_none());
    }
}
