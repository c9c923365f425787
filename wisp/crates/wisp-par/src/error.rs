//! Parse-phase error kinds (spec §7).

use thiserror::Error;
use wisp_util::Span;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseErrorKind {
    #[error("unmatched closing parenthesis")]
    UnmatchedClosingParen,
    #[error("unbalanced list: reached end of input before a closing parenthesis")]
    UnbalancedList,
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("quote/quasiquote/unquote with nothing following it")]
    EmptyQuote,
    #[error("lexer reported an error token")]
    LexError,
    #[error("arena allocation failed")]
    OutOfMemory,
}

#[derive(Debug, Error, Clone, PartialEq)]
#[error("{kind}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub span: Option<Span>,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, span: Option<Span>) -> Self {
        Self { kind, span }
    }
}

impl From<wisp_util::ArenaError> for ParseError {
    fn from(_: wisp_util::ArenaError) -> Self {
        ParseError::new(ParseErrorKind::OutOfMemory, None)
    }
}

pub type ParseResult<T> = Result<T, ParseError>;
