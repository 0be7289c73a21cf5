//! Interning of math symbols and labels.

use core::fmt::{self, Display};
use std::sync::Arc;

/// Interned string: a math symbol or a statement label.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Atom(u32);

impl Atom {
    pub fn idx(self) -> usize {
        self.0 as usize
    }
}

impl Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

type FnvImMap<K, V> = im::HashMap<K, V, fnv::FnvBuildHasher>;

/// Map between strings and atoms.
///
/// Cloning is cheap and shares structure with the original,
/// so every database snapshot can carry its own name table.
/// Atoms are append-only: an atom minted for one snapshot
/// denotes the same string in every later snapshot.
#[derive(Clone, Default)]
pub struct Names {
    map: FnvImMap<Arc<str>, Atom>,
    names: im::Vector<Arc<str>>,
}

impl Names {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn intern(&mut self, s: &str) -> Atom {
        if let Some(atom) = self.map.get(s) {
            return *atom;
        }
        let atom = Atom(self.names.len() as u32);
        let s: Arc<str> = s.into();
        self.names.push_back(s.clone());
        self.map.insert(s, atom);
        atom
    }

    pub fn get(&self, s: &str) -> Option<Atom> {
        self.map.get(s).copied()
    }

    pub fn resolve(&self, atom: Atom) -> &str {
        &self.names[atom.idx()]
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_is_stable() {
        let mut names = Names::new();
        let wff = names.intern("wff");
        assert_eq!(names.intern("wff"), wff);
        assert_eq!(names.get("wff"), Some(wff));
        assert_eq!(names.resolve(wff), "wff");

        // atoms survive into clones
        let mut later = names.clone();
        let ph = later.intern("ph");
        assert_eq!(later.resolve(wff), "wff");
        assert_ne!(ph, wff);
        assert_eq!(names.get("ph"), None);
    }
}
