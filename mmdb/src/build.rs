//! Construction of database snapshots from token streams.
//!
//! The builder keeps an explicit scope stack while walking the lexeme
//! stream. Structural problems are recorded as diagnostics against the
//! offending statement and the build keeps going, so a broken file still
//! yields a database usable for navigation.

use crate::db::{Db, FnvImMap, FnvImSet};
use crate::diag::{DiagKind, Diagnostic};
use crate::error::StructuralError as E;
use crate::formula::Formula;
use crate::scope::Scopes;
use crate::statement::{EssHyp, FloatHyp, Frame, Proof, Statement, StatementKind};
use crate::symbol::{Atom, Names};
use fnv::FnvHasher;
use metamath_parse::{FileId, Lexeme, Lexemes, MemLoader, SourceMap, Span, Token};
use std::hash::Hasher;
use std::sync::Arc;

type Stream<'s> = core::iter::Peekable<Lexemes<'s>>;

#[derive(Clone, Copy)]
enum Stop {
    End,
    Proof,
    Eof,
}

pub struct Builder<'s> {
    sm: &'s SourceMap,
    prev: Option<&'s Db>,
    names: Names,
    scopes: Scopes,
    stmts: im::Vector<Arc<Statement>>,
    spans: im::Vector<Span>,
    labels: FnvImMap<Atom, usize>,
    consts: FnvImSet<Atom>,
    vars: FnvImSet<Atom>,
    diags: Vec<Diagnostic>,
}

impl<'s> Builder<'s> {
    pub fn new(sm: &'s SourceMap) -> Self {
        Self {
            sm,
            prev: None,
            names: Names::new(),
            scopes: Scopes::new(),
            stmts: Default::default(),
            spans: Default::default(),
            labels: Default::default(),
            consts: Default::default(),
            vars: Default::default(),
            diags: Vec::new(),
        }
    }

    /// Rebuild against a previous snapshot: atoms keep their meaning,
    /// unchanged statements are reused by reference and the proof cache
    /// is carried over.
    pub fn with_previous(mut self, prev: &'s Db) -> Self {
        self.names = prev.names.clone();
        self.prev = Some(prev);
        self
    }

    pub fn build(mut self) -> Db {
        for (span, err) in self.sm.errors() {
            self.diags
                .push(Diagnostic::error(*span, DiagKind::Include(err.to_string())));
        }

        let mut it = Lexemes::new(self.sm).peekable();
        let mut last_span = Span::new(FileId::ROOT, 0..0);
        while let Some(lx) = it.next() {
            last_span = lx.span;
            match lx.token {
                Token::Open => self.scopes.open(),
                Token::Close => {
                    if !self.scopes.close() {
                        self.diag(lx.span, E::ScopeMismatch);
                    }
                }
                Token::Const => self.declare_syms(&mut it, lx, true),
                Token::Var => self.declare_syms(&mut it, lx, false),
                Token::Disjoint => self.disjoint(&mut it, lx),
                Token::Float | Token::Essential | Token::Axiom | Token::Provable => {
                    self.diag(lx.span, E::LabelExpected);
                    let _ = self.read_symbols(&mut it, lx.span);
                }
                Token::Ident(name) => self.labeled(&mut it, lx, name),
                _ => self.diag(lx.span, E::UnexpectedToken),
            }
        }
        if !self.scopes.is_outermost() {
            self.diag(last_span, E::UnclosedScope);
        }

        Db {
            names: self.names,
            stmts: self.stmts,
            spans: self.spans,
            labels: self.labels,
            consts: self.consts,
            vars: self.vars,
            proofs: self.prev.map(|p| p.proofs.clone()).unwrap_or_default(),
            diags: self.diags.into_iter().collect(),
        }
    }

    fn diag(&mut self, span: Span, err: E) {
        self.diags.push(Diagnostic::error(span, err));
    }

    /// Collect identifiers up to the statement terminator.
    fn read_symbols(&mut self, it: &mut Stream<'s>, from: Span) -> (Vec<(&'s str, Span)>, Stop, Span) {
        let mut syms = Vec::new();
        let mut last = from;
        while let Some(lx) = it.next() {
            last = lx.span;
            match lx.token {
                Token::Ident(s) => syms.push((s, lx.span)),
                Token::End => return (syms, Stop::End, last),
                Token::Proof => return (syms, Stop::Proof, last),
                _ => self.diag(lx.span, E::UnexpectedToken),
            }
        }
        self.diag(last, E::UnterminatedStatement);
        (syms, Stop::Eof, last)
    }

    fn declare_syms(&mut self, it: &mut Stream<'s>, kw: Lexeme<'s>, is_const: bool) {
        let (syms, stop, last) = self.read_symbols(it, kw.span);
        if matches!(stop, Stop::Proof) {
            self.diag(last, E::UnexpectedToken);
        }
        if is_const && !self.scopes.is_outermost() {
            self.diag(kw.span, E::ConstantScope);
            return;
        }
        let mut atoms = Vec::new();
        for (s, span) in &syms {
            let atom = self.names.intern(s);
            if self.consts.contains(&atom) || self.scopes.var_active(atom) {
                self.diag(*span, E::SymbolRedeclared(atom));
                continue;
            }
            if is_const {
                self.consts.insert(atom);
            } else {
                self.scopes.add_var(atom);
                self.vars.insert(atom);
            }
            atoms.push(atom);
        }
        let kind = if is_const {
            StatementKind::Const(atoms.into())
        } else {
            StatementKind::Var(atoms.into())
        };
        let src_hash = src_hash(&kw.token, None, kw.comment, &syms, &[]);
        self.record(
            kw.span.join(last),
            Statement {
                label: None,
                kind,
                comment: kw.comment.map(Into::into),
                frame: None,
                src_hash,
            },
        );
    }

    fn disjoint(&mut self, it: &mut Stream<'s>, kw: Lexeme<'s>) {
        let (syms, _, last) = self.read_symbols(it, kw.span);
        let span = kw.span.join(last);
        let mut atoms: Vec<Atom> = Vec::new();
        for (s, sspan) in &syms {
            let atom = self.names.intern(s);
            if !self.scopes.var_active(atom) {
                self.diag(*sspan, E::UndeclaredSymbol(atom));
                continue;
            }
            atoms.push(atom);
        }
        let mut unique = atoms.clone();
        unique.sort_unstable();
        unique.dedup();
        if atoms.len() < 2 || unique.len() != atoms.len() {
            self.diag(span, E::DisjointArity);
            return;
        }
        for (i, &a) in atoms.iter().enumerate() {
            for &b in &atoms[i + 1..] {
                self.scopes.add_disjoint(a, b);
            }
        }
        let src_hash = src_hash(&kw.token, None, kw.comment, &syms, &[]);
        self.record(
            span,
            Statement {
                label: None,
                kind: StatementKind::Disjoint(atoms.into()),
                comment: kw.comment.map(Into::into),
                frame: None,
                src_hash,
            },
        );
    }

    fn labeled(&mut self, it: &mut Stream<'s>, lx: Lexeme<'s>, name: &'s str) {
        let kw = match it.peek() {
            Some(l)
                if matches!(
                    l.token,
                    Token::Float | Token::Essential | Token::Axiom | Token::Provable
                ) =>
            {
                *l
            }
            _ => {
                self.diag(lx.span, E::LabelUnused);
                return;
            }
        };
        it.next();

        let label = self.names.intern(name);
        let duplicate = self.labels.contains_key(&label);
        if duplicate {
            self.diag(lx.span, E::DuplicateLabel(label));
        }
        let comment = lx.comment.or(kw.comment);

        match kw.token {
            Token::Float => {
                let (syms, _, last) = self.read_symbols(it, kw.span);
                let span = lx.span.join(last);
                if syms.len() != 2 {
                    return self.diag(span, E::FloatArity);
                }
                let tc = self.names.intern(syms[0].0);
                let var = self.names.intern(syms[1].0);
                if !self.consts.contains(&tc) {
                    return self.diag(syms[0].1, E::TypecodeExpected(tc));
                }
                if !self.scopes.var_active(var) {
                    return self.diag(syms[1].1, E::UndeclaredSymbol(var));
                }
                if self.scopes.float_for(var).is_some() {
                    return self.diag(span, E::FloatRedeclared(var));
                }
                if duplicate {
                    return;
                }
                self.scopes.add_float(FloatHyp {
                    label,
                    typecode: tc,
                    var,
                });
                let src_hash = src_hash(&kw.token, Some(name), comment, &syms, &[]);
                self.record(
                    span,
                    Statement {
                        label: Some(label),
                        kind: StatementKind::Float(Formula::new(vec![tc, var])),
                        comment: comment.map(Into::into),
                        frame: None,
                        src_hash,
                    },
                );
            }
            Token::Essential => {
                let (syms, _, last) = self.read_symbols(it, kw.span);
                let span = lx.span.join(last);
                let formula = match self.formula(&syms, span) {
                    Some(f) => f,
                    None => return,
                };
                if duplicate {
                    return;
                }
                self.scopes.add_essential(EssHyp {
                    label,
                    formula: formula.clone(),
                });
                let src_hash = src_hash(&kw.token, Some(name), comment, &syms, &[]);
                self.record(
                    span,
                    Statement {
                        label: Some(label),
                        kind: StatementKind::Essential(formula),
                        comment: comment.map(Into::into),
                        frame: None,
                        src_hash,
                    },
                );
            }
            Token::Axiom => {
                let (syms, _, last) = self.read_symbols(it, kw.span);
                let span = lx.span.join(last);
                let formula = match self.formula(&syms, span) {
                    Some(f) => f,
                    None => return,
                };
                if duplicate {
                    return;
                }
                let frame = self.capture_frame(&formula);
                let src_hash = src_hash(&kw.token, Some(name), comment, &syms, &[]);
                self.record(
                    span,
                    Statement {
                        label: Some(label),
                        kind: StatementKind::Axiom(formula),
                        comment: comment.map(Into::into),
                        frame: Some(frame),
                        src_hash,
                    },
                );
            }
            Token::Provable => {
                let (syms, stop, mid) = self.read_symbols(it, kw.span);
                let (proof_toks, last) = match stop {
                    Stop::Proof => {
                        let (toks, stop, last) = self.read_symbols(it, mid);
                        if matches!(stop, Stop::Proof) {
                            self.diag(last, E::UnexpectedToken);
                        }
                        (toks, last)
                    }
                    _ => {
                        self.diag(mid, E::ProofMissing);
                        (Vec::new(), mid)
                    }
                };
                let span = lx.span.join(last);
                let formula = match self.formula(&syms, span) {
                    Some(f) => f,
                    None => return,
                };
                if duplicate {
                    return;
                }
                let proof = if proof_toks.is_empty() {
                    match stop {
                        Stop::Proof => Proof::Incomplete,
                        _ => Proof::Missing,
                    }
                } else {
                    self.parse_proof(&proof_toks, span)
                };
                let frame = self.capture_frame(&formula);
                let src_hash = src_hash(&kw.token, Some(name), comment, &syms, &proof_toks);
                self.record(
                    span,
                    Statement {
                        label: Some(label),
                        kind: StatementKind::Theorem(formula, proof),
                        comment: comment.map(Into::into),
                        frame: Some(frame),
                        src_hash,
                    },
                );
            }
            _ => unreachable!("peeked statement keyword"),
        }
    }

    /// Validate a formula's symbols against the active scope.
    fn formula(&mut self, syms: &[(&'s str, Span)], span: Span) -> Option<Formula> {
        let (first, fspan) = match syms.first() {
            Some(x) => x,
            None => {
                self.diag(span, E::EmptyFormula);
                return None;
            }
        };
        let tc = self.names.intern(first);
        if !self.consts.contains(&tc) {
            self.diag(*fspan, E::TypecodeExpected(tc));
            return None;
        }
        let mut out = vec![tc];
        let mut ok = true;
        for (s, sspan) in &syms[1..] {
            let atom = self.names.intern(s);
            if self.consts.contains(&atom) || self.scopes.var_active(atom) {
                out.push(atom);
            } else {
                self.diag(*sspan, E::UndeclaredSymbol(atom));
                ok = false;
            }
        }
        ok.then(|| Formula::new(out))
    }

    fn capture_frame(&mut self, formula: &Formula) -> Arc<Frame> {
        let vars = &self.vars;
        Arc::new(self.scopes.frame_for(formula, |v| vars.contains(&v)))
    }

    fn parse_proof(&mut self, tokens: &[(&'s str, Span)], span: Span) -> Proof {
        if tokens.iter().any(|(s, _)| *s == "?") {
            return Proof::Incomplete;
        }
        if tokens[0].0 == "(" {
            let rest = &tokens[1..];
            let close = match rest.iter().position(|(s, _)| *s == ")") {
                Some(i) => i,
                None => {
                    self.diag(span, E::UnexpectedToken);
                    return Proof::Incomplete;
                }
            };
            let labels = rest[..close]
                .iter()
                .map(|(s, _)| self.names.intern(s))
                .collect();
            let tags: String = rest[close + 1..].iter().map(|(s, _)| *s).collect();
            Proof::Compressed {
                labels,
                tags: tags.into(),
            }
        } else {
            Proof::Normal(tokens.iter().map(|(s, _)| self.names.intern(s)).collect())
        }
    }

    fn record(&mut self, span: Span, stmt: Statement) {
        let idx = self.stmts.len();
        if let Some(label) = stmt.label {
            self.labels.insert(label, idx);
        }
        let arc = self
            .reuse(&stmt)
            .unwrap_or_else(|| Arc::new(stmt));
        self.stmts.push_back(arc);
        self.spans.push_back(span);
    }

    /// Share the previous snapshot's statement if nothing about it changed.
    fn reuse(&self, stmt: &Statement) -> Option<Arc<Statement>> {
        let prev = self.prev?;
        let idx = prev.lookup_atom(stmt.label?)?;
        let old = prev.stmt(idx)?;
        (**old == *stmt).then(|| old.clone())
    }
}

fn src_hash(
    kw: &Token,
    label: Option<&str>,
    comment: Option<&str>,
    syms: &[(&str, Span)],
    proof: &[(&str, Span)],
) -> u64 {
    let mut h = FnvHasher::default();
    h.write(kw.to_string().as_bytes());
    h.write_u8(0);
    h.write(label.unwrap_or("").as_bytes());
    h.write_u8(0);
    h.write(comment.unwrap_or("").as_bytes());
    h.write_u8(0);
    for (s, _) in syms {
        h.write(s.as_bytes());
        h.write_u8(1);
    }
    h.write_u8(0);
    for (s, _) in proof {
        h.write(s.as_bytes());
        h.write_u8(1);
    }
    h.finish()
}

impl Db {
    /// Build a database from a single in-memory source, for tests and
    /// small tools. Proofs are not verified yet; see
    /// [`refresh`](crate::verify::refresh).
    pub fn from_source(text: &str) -> Db {
        let loader = MemLoader::default().file("<input>", text);
        let sm = SourceMap::load("<input>", &loader).expect("in-memory root");
        Builder::new(&sm).build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StructuralError;

    const PROP: &str = r"
        $c wff |- ( ) -> $.
        $v ph ps ch $.
        wph $f wff ph $.
        wps $f wff ps $.
        wch $f wff ch $.
        wi $a wff ( ph -> ps ) $.
        $( Modus ponens. $)
        ${
            mp.1 $e |- ph $.
            mp.2 $e |- ( ph -> ps ) $.
            ax-mp $a |- ps $.
        $}
    ";

    fn structural(db: &Db) -> Vec<StructuralError> {
        db.diagnostics()
            .filter_map(|d| match &d.kind {
                DiagKind::Structural(e) => Some(e.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn frame_captures_floats_then_essentials() {
        let db = Db::from_source(PROP);
        assert_eq!(structural(&db), []);

        let stmt = db.statement("ax-mp").unwrap();
        let frame = stmt.frame.as_ref().unwrap();
        let names = &db.names;
        let floats: Vec<_> = frame
            .floats
            .iter()
            .map(|fh| names.resolve(fh.var))
            .collect();
        assert_eq!(floats, ["ph", "ps"]);
        let ess: Vec<_> = frame
            .essentials
            .iter()
            .map(|e| names.resolve(e.label))
            .collect();
        assert_eq!(ess, ["mp.1", "mp.2"]);
        // ch does not occur: its float is a dummy
        assert_eq!(frame.dummies.len(), 1);
    }

    #[test]
    fn hypotheses_become_invisible_after_scope_close() {
        let db = Db::from_source(
            r"
            $c wff |- $.
            $v ph $.
            wph $f wff ph $.
            ${ h1 $e |- ph $. a1 $a |- ph $. $}
            a2 $a |- ph $.
        ",
        );
        assert_eq!(structural(&db), []);
        let a1 = db.statement("a1").unwrap();
        assert_eq!(a1.frame.as_ref().unwrap().essentials.len(), 1);
        let a2 = db.statement("a2").unwrap();
        assert_eq!(a2.frame.as_ref().unwrap().essentials.len(), 0);
    }

    #[test]
    fn duplicate_label_keeps_first() {
        let db = Db::from_source(
            r"
            $c wff $.
            $v ph ps $.
            wph $f wff ph $.
            dup $a wff ph $.
            wps $f wff ps $.
            dup $a wff ps $.
        ",
        );
        let dup = db.names.get("dup").unwrap();
        assert!(structural(&db).contains(&StructuralError::DuplicateLabel(dup)));
        let stmt = db.statement("dup").unwrap();
        let ph = db.names.get("ph").unwrap();
        assert_eq!(stmt.formula().unwrap().expr(), [ph]);
    }

    #[test]
    fn undeclared_symbol_does_not_stop_the_build() {
        let db = Db::from_source(
            r"
            $c wff $.
            $v ph $.
            wph $f wff ph $.
            bad $a wff zz $.
            good $a wff ph $.
        ",
        );
        assert!(matches!(
            structural(&db)[..],
            [StructuralError::UndeclaredSymbol(_)]
        ));
        assert!(db.statement("bad").is_none());
        assert!(db.statement("good").is_some());
    }

    #[test]
    fn scope_mismatch_is_diagnosed() {
        let db = Db::from_source("$} ${");
        assert_eq!(
            structural(&db),
            [StructuralError::ScopeMismatch, StructuralError::UnclosedScope]
        );
    }

    #[test]
    fn disjoint_constraints_inherit_into_inner_scopes() {
        let db = Db::from_source(
            r"
            $c wff $.
            $v x y $.
            vx $f wff x $.
            vy $f wff y $.
            $d x y $.
            ${ a1 $a wff x y $. $}
        ",
        );
        assert_eq!(structural(&db), []);
        let frame = db.statement("a1").unwrap().frame.clone().unwrap();
        let x = db.names.get("x").unwrap();
        let y = db.names.get("y").unwrap();
        assert!(frame.disjoint_contains(x, y));
        assert!(frame.disjoint_contains(y, x));
    }

    #[test]
    fn rebuild_shares_unchanged_statements() {
        let first = Db::from_source(PROP);
        let edited = PROP.replace("|- ps $.", "|- ph $.");
        let loader = MemLoader::default().file("<input>", edited);
        let sm = SourceMap::load("<input>", &loader).unwrap();
        let second = Builder::new(&sm).with_previous(&first).build();

        let i = first.lookup("wi").unwrap();
        let j = second.lookup("wi").unwrap();
        assert!(Arc::ptr_eq(first.stmt(i).unwrap(), second.stmt(j).unwrap()));

        let i = first.lookup("ax-mp").unwrap();
        let j = second.lookup("ax-mp").unwrap();
        assert!(!Arc::ptr_eq(first.stmt(i).unwrap(), second.stmt(j).unwrap()));
    }
}
