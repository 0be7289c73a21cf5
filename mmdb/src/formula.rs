//! Formulas: interned symbol sequences headed by a typecode.

use crate::symbol::{Atom, Names};
use core::fmt::{self, Display};
use std::sync::Arc;

/// An ordered sequence of symbols whose first element is a typecode.
///
/// Formulas are immutable and cheaply cloneable, so snapshots and
/// proof trees can share them freely.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Formula(Arc<[Atom]>);

impl Formula {
    /// The caller guarantees that `symbols` starts with a typecode.
    pub fn new(symbols: Vec<Atom>) -> Self {
        debug_assert!(!symbols.is_empty());
        Self(symbols.into())
    }

    pub fn typecode(&self) -> Atom {
        self.0[0]
    }

    /// The symbols after the typecode.
    pub fn expr(&self) -> &[Atom] {
        &self.0[1..]
    }

    pub fn symbols(&self) -> &[Atom] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn display<'a>(&'a self, names: &'a Names) -> DisplaySyms<'a> {
        DisplaySyms(&self.0, names)
    }
}

/// Space-separated rendering of a symbol sequence.
pub struct DisplaySyms<'a>(pub &'a [Atom], pub &'a Names);

impl<'a> Display for DisplaySyms<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut syms = self.0.iter();
        if let Some(s) = syms.next() {
            f.write_str(self.1.resolve(*s))?;
        }
        syms.try_for_each(|s| write!(f, " {}", self.1.resolve(*s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_joins_with_spaces() {
        let mut names = Names::new();
        let syms: Vec<_> = ["wff", "(", "ph", "->", "ps", ")"]
            .iter()
            .map(|s| names.intern(s))
            .collect();
        let f = Formula::new(syms);
        assert_eq!(f.display(&names).to_string(), "wff ( ph -> ps )");
        assert_eq!(f.expr().len(), 5);
    }
}
