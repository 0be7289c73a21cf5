//! Lexer and include resolution for the Metamath file format.
//!
//! A Metamath database is a tree of files joined by `$[ ... $]` include
//! directives. This crate turns such a tree into a single lazy stream of
//! [`Lexeme`]s: typed tokens annotated with their file, byte offset and
//! any directly preceding comment. Building statements out of the stream
//! is left to consumers.
//!
//! Example usage:
//!
//! ~~~
//! use metamath_parse::{Lexemes, MemLoader, SourceMap, Token};
//!
//! let loader = MemLoader::default().file("main.mm", "$c wff -> $.");
//! let sm = SourceMap::load("main.mm", &loader)?;
//! let tokens: Vec<_> = Lexemes::new(&sm).map(|l| l.token).collect();
//! assert_eq!(tokens, [Token::Const, Token::Ident("wff"), Token::Ident("->"), Token::End]);
//! # Ok::<_, metamath_parse::Error>(())
//! ~~~

pub mod lex;
mod source;
mod span;
mod stream;

pub use lex::Token;
pub use source::{Error, FsLoader, Loader, MemLoader, SourceFile, SourceMap};
pub use span::{FileId, Position, Span};
pub use stream::{Lexeme, Lexemes};

use logos::Logos;

/// Lex a single string, dropping whitespace.
pub fn lex(s: &str) -> impl Iterator<Item = Token> {
    Token::lexer(s).filter(|token| *token != Token::Space)
}
