//! Lexical scopes of the database builder.

use crate::formula::Formula;
use crate::statement::{EssHyp, FloatHyp, Frame};
use crate::symbol::Atom;
use fnv::FnvHashSet;

/// Declarations local to one `${ ... $}` block.
///
/// A frame records only its own deltas; everything inherited comes from
/// the frames below it on the stack.
#[derive(Default)]
struct ScopeFrame {
    vars: Vec<Atom>,
    floats: Vec<FloatHyp>,
    essentials: Vec<EssHyp>,
    disjoint: Vec<(Atom, Atom)>,
}

/// Stack of open scopes; index 0 is the outermost scope.
pub struct Scopes(Vec<ScopeFrame>);

impl Default for Scopes {
    fn default() -> Self {
        Self(vec![ScopeFrame::default()])
    }
}

impl Scopes {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn open(&mut self) {
        self.0.push(ScopeFrame::default());
    }

    /// Close the innermost scope; false if only the outermost is left.
    pub fn close(&mut self) -> bool {
        if self.0.len() == 1 {
            return false;
        }
        self.0.pop();
        true
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn is_outermost(&self) -> bool {
        self.0.len() == 1
    }

    pub fn add_var(&mut self, var: Atom) {
        self.0.last_mut().expect("outermost scope").vars.push(var);
    }

    pub fn add_float(&mut self, hyp: FloatHyp) {
        self.0.last_mut().expect("outermost scope").floats.push(hyp);
    }

    pub fn add_essential(&mut self, hyp: EssHyp) {
        self.0
            .last_mut()
            .expect("outermost scope")
            .essentials
            .push(hyp);
    }

    pub fn add_disjoint(&mut self, a: Atom, b: Atom) {
        let pair = if a < b { (a, b) } else { (b, a) };
        self.0.last_mut().expect("outermost scope").disjoint.push(pair);
    }

    pub fn var_active(&self, var: Atom) -> bool {
        self.0.iter().any(|f| f.vars.contains(&var))
    }

    /// The active floating hypothesis for a variable, if any.
    pub fn float_for(&self, var: Atom) -> Option<&FloatHyp> {
        self.0
            .iter()
            .flat_map(|f| f.floats.iter())
            .find(|fh| fh.var == var)
    }

    /// Active floating hypotheses in declaration order.
    /// Outer frames precede inner ones: a hypothesis in an outer frame
    /// was necessarily declared before the inner scope opened.
    fn floats(&self) -> impl Iterator<Item = &FloatHyp> {
        self.0.iter().flat_map(|f| f.floats.iter())
    }

    fn essentials(&self) -> impl Iterator<Item = &EssHyp> {
        self.0.iter().flat_map(|f| f.essentials.iter())
    }

    fn disjoint(&self) -> impl Iterator<Item = (Atom, Atom)> + use<'_> {
        self.0.iter().flat_map(|f| f.disjoint.iter().copied())
    }

    /// Capture the frame for an assertion with the given formula.
    pub fn frame_for(&self, formula: &Formula, is_var: impl Fn(Atom) -> bool) -> Frame {
        let mut mandatory: FnvHashSet<Atom> = formula.expr().iter().copied().filter(|&s| is_var(s)).collect();
        for ess in self.essentials() {
            mandatory.extend(ess.formula.expr().iter().copied().filter(|&s| is_var(s)));
        }

        let mut floats = Vec::new();
        let mut dummies = Vec::new();
        for fh in self.floats() {
            if mandatory.contains(&fh.var) {
                floats.push(*fh);
            } else {
                dummies.push(*fh);
            }
        }

        // restricted to variables a proof can mention: mandatory or dummy
        let known = |v: Atom| mandatory.contains(&v) || dummies.iter().any(|fh| fh.var == v);
        let mut disjoint: Vec<_> = self
            .disjoint()
            .filter(|&(a, b)| known(a) && known(b))
            .collect();
        disjoint.sort_unstable();
        disjoint.dedup();

        Frame {
            floats: floats.into(),
            essentials: self.essentials().cloned().collect(),
            dummies: dummies.into(),
            disjoint: disjoint.into(),
        }
    }
}
