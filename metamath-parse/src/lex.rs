use core::fmt::{self, Display};
use logos::{Lexer, Logos};

/// Token of the Metamath language.
///
/// Math symbols and labels are both lexed as [`Token::Ident`];
/// whether an identifier is a valid label is decided by the consumer.
#[derive(Logos, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Token<'s> {
    #[token("$c")]
    Const,

    #[token("$v")]
    Var,

    #[token("$f")]
    Float,

    #[token("$e")]
    Essential,

    #[token("$d")]
    Disjoint,

    #[token("$a")]
    Axiom,

    #[token("$p")]
    Provable,

    #[token("${")]
    Open,

    #[token("$}")]
    Close,

    #[token("$.")]
    End,

    #[token("$=")]
    Proof,

    /// Include directive `$[ path $]`, carrying the trimmed path.
    #[token("$[", include)]
    Include(&'s str),

    /// Comment `$( ... $)`, carrying the trimmed comment text.
    #[token("$(", comment)]
    Comment(&'s str),

    /// Printable ASCII except `$` and whitespace.
    #[regex(r"[!-#%-~]+")]
    Ident(&'s str),

    #[regex(r"[ \t\r\n\f]+")]
    Space,

    // Logos requires one token variant to handle errors,
    // it can be named anything you wish.
    #[error]
    Error,
}

impl<'s> Display for Token<'s> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        let s = match self {
            Self::Const => "$c",
            Self::Var => "$v",
            Self::Float => "$f",
            Self::Essential => "$e",
            Self::Disjoint => "$d",
            Self::Axiom => "$a",
            Self::Provable => "$p",
            Self::Open => "${",
            Self::Close => "$}",
            Self::End => "$.",
            Self::Proof => "$=",
            Self::Include(p) => return write!(f, "$[ {} $]", p),
            Self::Comment(c) => return write!(f, "$( {} $)", c),
            Self::Ident(s) => s,
            Self::Space => " ",
            Self::Error => return Err(Default::default()),
        };
        s.fmt(f)
    }
}

fn include<'s>(lex: &mut Lexer<'s, Token<'s>>) -> Option<&'s str> {
    let len = lex.remainder().find("$]")?;
    let path = lex.remainder()[..len].trim();
    lex.bump(len + 2); // include len of `$]`
    Some(path)
}

fn comment<'s>(lex: &mut Lexer<'s, Token<'s>>) -> Option<&'s str> {
    // comments do not nest in Metamath
    let len = lex.remainder().find("$)")?;
    let text = lex.remainder()[..len].trim();
    lex.bump(len + 2); // include len of `$)`
    Some(text)
}

#[test]
fn lex_statement() {
    let tokens: Vec<_> = crate::lex("maj $e |- ( ph -> ps ) $.").collect();
    assert_eq!(tokens.len(), 9);
    assert_eq!(tokens[0], Token::Ident("maj"));
    assert_eq!(tokens[1], Token::Essential);
    assert_eq!(tokens[8], Token::End);
}

#[test]
fn lex_comment() {
    let mut tokens = crate::lex("$( Modus ponens. $) ax-mp");
    assert_eq!(tokens.next(), Some(Token::Comment("Modus ponens.")));
    assert_eq!(tokens.next(), Some(Token::Ident("ax-mp")));
    assert_eq!(tokens.next(), None);
}

#[test]
fn lex_include() {
    let mut tokens = crate::lex("$[ set.mm $] $c wff $.");
    assert_eq!(tokens.next(), Some(Token::Include("set.mm")));
    assert_eq!(tokens.next(), Some(Token::Const));
}

#[test]
fn lex_unterminated() {
    let mut tokens = crate::lex("$( runs off the end");
    assert_eq!(tokens.next(), Some(Token::Error));
}
