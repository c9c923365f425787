//! Recursive-descent parser (spec §4.3).
//!
//! The spec describes the algorithm as "a single linear pass produces a
//! flat chain of parse nodes, then a recursive list builder folds chains
//! between parens into `LIST` nodes" — which is exactly what a
//! token-index-driven recursive descent does; there is no separate
//! flattening pass to write out explicitly.

use crate::error::{ParseError, ParseErrorKind, ParseResult};
use crate::expr::{Cons, Expr, Program};
use wisp_lex::{Token, TokenKind};
use wisp_util::{Arena, Symbol};

pub struct Parser<'t, 'a> {
    tokens: Vec<Token>,
    pos: usize,
    source: &'t [u8],
    arena: &'a Arena,
}

/// Parses a full program. `source` must be the same buffer the tokens
/// were produced from. On any error the caller is responsible for
/// resetting or discarding `arena` (spec: "the parser does not leak
/// partial arenas").
pub fn parse<'a>(tokens: &[Token], source: &[u8], arena: &'a Arena) -> ParseResult<Program<'a>> {
    let significant: Vec<Token> =
        tokens.iter().copied().filter(|t| t.kind != TokenKind::Ignore).collect();
    let mut parser = Parser { tokens: significant, pos: 0, source, arena };
    let result = parser.parse_program();
    if let Err(err) = &result {
        log::debug!("parse error: {err}");
    }
    result
}

impl<'t, 'a> Parser<'t, 'a> {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.peek();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn text(&self, tok: Token) -> &'t str {
        std::str::from_utf8(tok.span.slice(self.source))
            .expect("token bytes are always valid ASCII by lexer construction")
    }

    fn parse_program(&mut self) -> ParseResult<Program<'a>> {
        let mut program = Vec::new();
        while let Some(tok) = self.peek() {
            if tok.kind == TokenKind::RParen {
                return Err(ParseError::new(ParseErrorKind::UnmatchedClosingParen, Some(tok.span)));
            }
            program.push(self.parse_expr()?);
        }
        Ok(program)
    }

    fn parse_expr(&mut self) -> ParseResult<&'a Expr<'a>> {
        let tok = self
            .peek()
            .ok_or_else(|| ParseError::new(ParseErrorKind::UnbalancedList, None))?;

        match tok.kind {
            TokenKind::Error => {
                Err(ParseError::new(ParseErrorKind::LexError, Some(tok.span)))
            }
            TokenKind::LParen => self.parse_list(),
            TokenKind::RParen => {
                Err(ParseError::new(ParseErrorKind::UnmatchedClosingParen, Some(tok.span)))
            }
            TokenKind::Quote => self.parse_quoted(tok, Expr::Quoted as fn(&'a Expr<'a>) -> Expr<'a>),
            TokenKind::Backquote => {
                self.parse_quoted(tok, Expr::Quasiquoted as fn(&'a Expr<'a>) -> Expr<'a>)
            }
            TokenKind::Comma => {
                self.parse_quoted(tok, Expr::Unquoted as fn(&'a Expr<'a>) -> Expr<'a>)
            }
            TokenKind::Integer => {
                self.advance();
                self.parse_integer(tok)
            }
            TokenKind::Float => {
                self.advance();
                self.parse_float(tok)
            }
            TokenKind::String => {
                self.advance();
                self.parse_string(tok)
            }
            TokenKind::Identifier => {
                self.advance();
                self.alloc(Expr::Symbol(Symbol::intern(self.text(tok))))
            }
            TokenKind::UninternedSymbol => {
                self.advance();
                self.parse_uninterned(tok)
            }
            TokenKind::Ignore => unreachable!("ignore tokens are filtered before parsing"),
        }
    }

    fn parse_quoted(
        &mut self,
        quote_tok: Token,
        wrap: fn(&'a Expr<'a>) -> Expr<'a>,
    ) -> ParseResult<&'a Expr<'a>> {
        self.advance();
        match self.peek() {
            None => Err(ParseError::new(ParseErrorKind::EmptyQuote, Some(quote_tok.span))),
            Some(t) if t.kind == TokenKind::RParen => {
                Err(ParseError::new(ParseErrorKind::EmptyQuote, Some(quote_tok.span)))
            }
            Some(_) => {
                let inner = self.parse_expr()?;
                self.alloc(wrap(inner))
            }
        }
    }

    fn parse_list(&mut self) -> ParseResult<&'a Expr<'a>> {
        let open = self.advance().expect("caller verified LParen present");
        let mut items: Vec<&'a Expr<'a>> = Vec::new();
        loop {
            match self.peek() {
                None => {
                    return Err(ParseError::new(ParseErrorKind::UnbalancedList, Some(open.span)))
                }
                Some(t) if t.kind == TokenKind::RParen => {
                    self.advance();
                    break;
                }
                Some(t) if t.kind == TokenKind::Error => {
                    return Err(ParseError::new(ParseErrorKind::LexError, Some(t.span)))
                }
                Some(_) => items.push(self.parse_expr()?),
            }
        }

        let mut tail: Option<&'a Cons<'a>> = None;
        for item in items.into_iter().rev() {
            let cell = self.arena.alloc(Cons { car: item, cdr: tail })?;
            tail = Some(cell);
        }
        self.alloc(Expr::List(tail))
    }

    fn parse_integer(&mut self, tok: Token) -> ParseResult<&'a Expr<'a>> {
        let text = self.text(tok);
        let expr = match text.parse::<i64>() {
            Ok(v) => Expr::Int(v),
            Err(_) => Expr::Symbol(Symbol::intern(text)),
        };
        self.alloc(expr)
    }

    fn parse_float(&mut self, tok: Token) -> ParseResult<&'a Expr<'a>> {
        let text = self.text(tok);
        let expr = match text.parse::<f64>() {
            Ok(v) if v.is_finite() => Expr::Float(v),
            _ => Expr::Symbol(Symbol::intern(text)),
        };
        self.alloc(expr)
    }

    fn parse_string(&mut self, tok: Token) -> ParseResult<&'a Expr<'a>> {
        let raw = tok.span.slice(self.source);
        let inner = &raw[1..raw.len() - 1];
        let bytes = self.arena.alloc_slice_copy(inner)?;
        self.alloc(Expr::Str(bytes))
    }

    fn parse_uninterned(&mut self, tok: Token) -> ParseResult<&'a Expr<'a>> {
        let raw = tok.span.slice(self.source);
        let name = &raw[2..];
        let bytes = self.arena.alloc_slice_copy(name)?;
        self.alloc(Expr::UninternedSymbol(bytes))
    }

    fn alloc(&self, expr: Expr<'a>) -> ParseResult<&'a Expr<'a>> {
        Ok(self.arena.alloc(expr)?)
    }
}
