//! Lazy token stream over an expanded include graph.

use crate::source::{Piece, SourceMap};
use crate::span::{FileId, Span};
use crate::Token;
use logos::Logos;

/// A token annotated with its span and the comment preceding it.
///
/// Whitespace and comments never appear as lexemes of their own;
/// a comment is attached to the token that follows it so that
/// consumers can use it as documentation for the following statement.
#[derive(Clone, Copy, Debug)]
pub struct Lexeme<'s> {
    pub token: Token<'s>,
    pub span: Span,
    pub comment: Option<&'s str>,
}

struct Cursor<'s> {
    file: FileId,
    piece: usize,
    lexer: Option<(logos::Lexer<'s, Token<'s>>, u32)>,
}

/// Iterator over the lexemes of a [`SourceMap`], with included files
/// spliced in place of their directives.
///
/// The walk over nested includes uses an explicit cursor stack, so the
/// include depth never shows up as call-stack depth.
pub struct Lexemes<'s> {
    sm: &'s SourceMap,
    stack: Vec<Cursor<'s>>,
    comment: Option<&'s str>,
}

impl<'s> Lexemes<'s> {
    pub fn new(sm: &'s SourceMap) -> Self {
        Self {
            sm,
            stack: vec![Cursor {
                file: FileId::ROOT,
                piece: 0,
                lexer: None,
            }],
            comment: None,
        }
    }
}

impl<'s> Iterator for Lexemes<'s> {
    type Item = Lexeme<'s>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let cursor = self.stack.last_mut()?;
            if let Some((lexer, offset)) = &mut cursor.lexer {
                if let Some(token) = lexer.next() {
                    let range = lexer.span();
                    let range = range.start + *offset as usize..range.end + *offset as usize;
                    let span = Span::new(cursor.file, range);
                    match token {
                        Token::Space => continue,
                        Token::Comment(text) => self.comment = Some(text),
                        // includes were already spliced by the source map
                        Token::Include(_) => continue,
                        token => {
                            return Some(Lexeme {
                                token,
                                span,
                                comment: self.comment.take(),
                            })
                        }
                    }
                    continue;
                }
                cursor.lexer = None;
            }

            let file = self.sm.file(cursor.file);
            match file.pieces.get(cursor.piece) {
                None => {
                    self.stack.pop();
                }
                Some(Piece::Text(range)) => {
                    cursor.piece += 1;
                    let text = &file.text[range.start as usize..range.end as usize];
                    cursor.lexer = Some((Token::lexer(text), range.start));
                }
                Some(&Piece::File(sub)) => {
                    cursor.piece += 1;
                    self.stack.push(Cursor {
                        file: sub,
                        piece: 0,
                        lexer: None,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemLoader;

    #[test]
    fn comment_attaches_to_next_token() {
        let loader = MemLoader::default().file("a.mm", "$( doc $) ax1 $a wff ph $.");
        let sm = SourceMap::load("a.mm", &loader).unwrap();
        let first = Lexemes::new(&sm).next().unwrap();
        assert_eq!(first.token, Token::Ident("ax1"));
        assert_eq!(first.comment, Some("doc"));
    }

    #[test]
    fn spans_use_file_offsets() {
        let loader = MemLoader::default().file("a.mm", "ab\ncd");
        let sm = SourceMap::load("a.mm", &loader).unwrap();
        let spans: Vec<_> = Lexemes::new(&sm).map(|l| l.span).collect();
        assert_eq!(sm.text(spans[1]), "cd");
        let pos = sm.position(spans[1]);
        assert_eq!((pos.line, pos.col), (1, 0));
    }
}
