//! Substitution of variables by formula fragments.

use crate::formula::Formula;
use crate::symbol::Atom;
use fnv::FnvHashMap;
use std::sync::Arc;

/// A variable-free view of what a variable gets replaced with:
/// the symbols of a formula with its typecode stripped.
pub type Frag = Arc<[Atom]>;

/// Map from variables to formula fragments.
///
/// Used both by the verifier (mapping a referenced statement's floating
/// hypotheses onto popped stack entries) and by the unification engine
/// (mapping candidate variables onto worksheet sub-formulas).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Subst(FnvHashMap<Atom, Frag>);

impl Subst {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn get(&self, var: Atom) -> Option<&[Atom]> {
        self.0.get(&var).map(|frag| &**frag)
    }

    /// Bind `var` to `frag`. Returns false on a conflicting rebinding;
    /// binding the same fragment twice is fine.
    pub fn bind(&mut self, var: Atom, frag: Frag) -> bool {
        match self.0.get(&var) {
            Some(old) => **old == *frag,
            None => {
                self.0.insert(var, frag);
                true
            }
        }
    }

    pub fn unbind(&mut self, var: Atom) {
        self.0.remove(&var);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Atom, &[Atom])> {
        self.0.iter().map(|(v, frag)| (*v, &**frag))
    }

    /// Replace every bound variable in `f`, leaving other symbols alone.
    /// The typecode is never substituted.
    pub fn apply(&self, f: &Formula) -> Formula {
        let mut out = Vec::with_capacity(f.len());
        out.push(f.typecode());
        for &s in f.expr() {
            match self.0.get(&s) {
                Some(frag) => out.extend_from_slice(frag),
                None => out.push(s),
            }
        }
        Formula::new(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::Names;

    #[test]
    fn apply_replaces_fragments() {
        let mut names = Names::new();
        let mut sym = |s: &str| names.intern(s);
        let (wff, ph, ps, arrow) = (sym("wff"), sym("ph"), sym("ps"), sym("->"));
        let f = Formula::new(vec![wff, ph, arrow, ps]);

        let mut subst = Subst::new();
        assert!(subst.bind(ph, vec![ps, arrow, ps].into()));
        let g = subst.apply(&f);
        assert_eq!(g.symbols(), [wff, ps, arrow, ps, arrow, ps]);
    }

    #[test]
    fn conflicting_rebinding_is_rejected() {
        let mut names = Names::new();
        let (ph, ps) = (names.intern("ph"), names.intern("ps"));
        let mut subst = Subst::new();
        assert!(subst.bind(ph, vec![ps].into()));
        assert!(subst.bind(ph, vec![ps].into()));
        assert!(!subst.bind(ph, vec![ph].into()));
    }
}
