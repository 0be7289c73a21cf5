//! Loading of a root file and its transitive includes.

use crate::span::{FileId, Position, Span};
use crate::Token;
use core::fmt::{self, Display};
use core::ops::Range;
use fnv::FnvHashMap;
use logos::Logos;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Resolves and reads the files referenced by include directives.
///
/// Splitting file access out of the lexer keeps the token stream
/// testable without touching the file system.
pub trait Loader {
    fn load(&self, path: &Path) -> io::Result<String>;

    /// Resolve an include path relative to the including file.
    fn resolve(&self, from: &Path, include: &str) -> PathBuf {
        from.parent().unwrap_or_else(|| Path::new("")).join(include)
    }
}

/// Loader reading from the file system.
pub struct FsLoader;

impl Loader for FsLoader {
    fn load(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }
}

/// Loader over an in-memory file table, resolving include paths verbatim.
#[derive(Default)]
pub struct MemLoader(pub FnvHashMap<PathBuf, String>);

impl MemLoader {
    pub fn file(mut self, path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        self.0.insert(path.into(), text.into());
        self
    }
}

impl Loader for MemLoader {
    fn load(&self, path: &Path) -> io::Result<String> {
        self.0
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }

    fn resolve(&self, _from: &Path, include: &str) -> PathBuf {
        PathBuf::from(include)
    }
}

/// Failure to assemble the include graph.
#[derive(Debug)]
pub enum Error {
    Io(PathBuf, io::Error),
    CyclicInclude(PathBuf),
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Io(path, e) => write!(f, "could not read {}: {}", path.display(), e),
            Self::CyclicInclude(path) => write!(f, "cyclic include of {}", path.display()),
        }
    }
}

/// A slice of a file's token stream: either literal text or
/// the spliced-in stream of an included file.
#[derive(Debug)]
pub(crate) enum Piece {
    Text(Range<u32>),
    File(FileId),
}

pub struct SourceFile {
    pub path: PathBuf,
    pub text: Arc<str>,
    line_starts: Vec<u32>,
    pub(crate) pieces: Vec<Piece>,
}

impl SourceFile {
    fn new(path: PathBuf, text: String) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            text.bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i as u32 + 1),
        );
        Self {
            path,
            text: text.into(),
            line_starts,
            pieces: Vec::new(),
        }
    }

    /// Position of a byte offset inside this file.
    pub fn position(&self, offset: u32) -> Position {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(l) => l,
            Err(l) => l - 1,
        };
        Position {
            line: line as u32,
            col: offset - self.line_starts[line],
        }
    }
}

/// The root file and all files it transitively includes.
///
/// Includes are expanded depth-first, left-to-right: the included file's
/// token stream replaces the directive in place. A file included a second
/// time (on a different branch) is skipped; a file including itself
/// transitively is a [`Error::CyclicInclude`] recorded against the
/// directive. Only an unreadable root file fails the whole load.
pub struct SourceMap {
    files: Vec<SourceFile>,
    errors: Vec<(Span, Error)>,
}

impl SourceMap {
    pub fn load(root: impl Into<PathBuf>, loader: &dyn Loader) -> Result<Self, Error> {
        let root = root.into();
        let text = loader.load(&root).map_err(|e| Error::Io(root.clone(), e))?;
        let mut sm = Self {
            files: Vec::new(),
            errors: Vec::new(),
        };
        let id = sm.push(root.clone(), text);
        let mut open = Vec::new();
        let mut done = FnvHashMap::default();
        done.insert(root, id);
        sm.scan(id, &mut open, &mut done, loader);
        Ok(sm)
    }

    fn push(&mut self, path: PathBuf, text: String) -> FileId {
        let id = FileId(self.files.len() as u32);
        self.files.push(SourceFile::new(path, text));
        id
    }

    /// Split a file into pieces at its include directives,
    /// loading and scanning each included file in turn.
    fn scan(
        &mut self,
        id: FileId,
        open: &mut Vec<PathBuf>,
        done: &mut FnvHashMap<PathBuf, FileId>,
        loader: &dyn Loader,
    ) {
        let path = self.files[id.0 as usize].path.clone();
        let text = self.files[id.0 as usize].text.clone();
        open.push(path.clone());

        let mut pieces = Vec::new();
        let mut start = 0u32;
        let mut lexer = Token::lexer(&text);
        while let Some(token) = lexer.next() {
            let target = match token {
                Token::Include(p) => loader.resolve(&path, p),
                _ => continue,
            };
            let range = lexer.span();
            pieces.push(Piece::Text(start..range.start as u32));
            start = range.end as u32;

            let span = Span::new(id, range);
            if open.contains(&target) {
                self.errors.push((span, Error::CyclicInclude(target)));
            } else if done.contains_key(&target) {
                log::debug!("skipping repeated include of {}", target.display());
            } else {
                match loader.load(&target) {
                    Ok(text) => {
                        let sub = self.push(target.clone(), text);
                        done.insert(target, sub);
                        pieces.push(Piece::File(sub));
                        self.scan(sub, open, done, loader);
                    }
                    Err(e) => self.errors.push((span, Error::Io(target, e))),
                }
            }
        }
        pieces.push(Piece::Text(start..text.len() as u32));

        open.pop();
        self.files[id.0 as usize].pieces = pieces;
    }

    pub fn file(&self, id: FileId) -> &SourceFile {
        &self.files[id.0 as usize]
    }

    pub fn files(&self) -> impl Iterator<Item = (FileId, &SourceFile)> {
        self.files
            .iter()
            .enumerate()
            .map(|(i, f)| (FileId(i as u32), f))
    }

    pub fn file_id(&self, path: &Path) -> Option<FileId> {
        self.files
            .iter()
            .position(|f| f.path == path)
            .map(|i| FileId(i as u32))
    }

    pub fn text(&self, span: Span) -> &str {
        &self.file(span.file).text[span.range()]
    }

    pub fn position(&self, span: Span) -> Position {
        self.file(span.file).position(span.start)
    }

    /// Include directives that could not be expanded.
    pub fn errors(&self) -> &[(Span, Error)] {
        &self.errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Lexemes;

    #[test]
    fn includes_in_place() {
        let loader = MemLoader::default()
            .file("main.mm", "$c wff $. $[ sub.mm $] $c |- $.")
            .file("sub.mm", "$c -> $.");
        let sm = SourceMap::load("main.mm", &loader).unwrap();
        assert!(sm.errors().is_empty());
        let idents: Vec<_> = Lexemes::new(&sm)
            .filter_map(|l| match l.token {
                Token::Ident(s) => Some(s),
                _ => None,
            })
            .collect();
        assert_eq!(idents, ["wff", "->", "|-"]);
    }

    #[test]
    fn cyclic_include() {
        let loader = MemLoader::default()
            .file("a.mm", "$[ b.mm $]")
            .file("b.mm", "$[ a.mm $]");
        let sm = SourceMap::load("a.mm", &loader).unwrap();
        assert!(matches!(sm.errors(), [(_, Error::CyclicInclude(_))]));
    }

    #[test]
    fn repeated_include_expanded_once() {
        let loader = MemLoader::default()
            .file("a.mm", "$[ c.mm $] $[ b.mm $] $[ c.mm $]")
            .file("b.mm", "$[ c.mm $]")
            .file("c.mm", "$c wff $.");
        let sm = SourceMap::load("a.mm", &loader).unwrap();
        assert!(sm.errors().is_empty());
        let consts = Lexemes::new(&sm)
            .filter(|l| l.token == Token::Const)
            .count();
        assert_eq!(consts, 1);
    }

    #[test]
    fn missing_include_is_diagnosed() {
        let loader = MemLoader::default().file("a.mm", "$[ gone.mm $] $c wff $.");
        let sm = SourceMap::load("a.mm", &loader).unwrap();
        assert!(matches!(sm.errors(), [(_, Error::Io(..))]));
        // the rest of the file is still lexed
        assert_eq!(Lexemes::new(&sm).count(), 3);
    }

    #[test]
    fn missing_root_is_fatal() {
        let loader = MemLoader::default();
        assert!(SourceMap::load("a.mm", &loader).is_err());
    }
}
