//! The lexer's main scan loop (spec §4.2): dispatches each position to the
//! scanner that owns it, and is the only module that decides how the
//! fixed single-character tokens, whitespace, and comments interleave.

mod comment;
mod identifier;
mod number;
mod string;

use crate::cursor::Cursor;
use crate::token::{Token, TokenKind};
use wisp_util::diagnostic::Diagnostic;
use wisp_util::{Handler, Span};

pub struct LexOutput {
    pub tokens: Vec<Token>,
}

/// Scans `source` into a token stream, routing any lex-phase errors into
/// `handler` as they're found rather than returning them separately — the
/// same handler the parser and driver go on to check and report from.
pub fn lex(source: &[u8], handler: &mut Handler) -> LexOutput {
    let mut cursor = Cursor::new(source);
    let mut tokens = Vec::new();

    while !cursor.is_at_end() {
        let start = cursor.position();
        let byte = cursor.current().expect("checked not at end");

        if byte.is_ascii_whitespace() {
            while matches!(cursor.current(), Some(b) if b.is_ascii_whitespace()) {
                cursor.advance();
            }
            push(&mut tokens, TokenKind::Ignore, start, &cursor);
            continue;
        }

        match byte {
            b';' => {
                comment::scan(&mut cursor);
                push(&mut tokens, TokenKind::Ignore, start, &cursor);
            }
            b'(' => {
                cursor.advance();
                push(&mut tokens, TokenKind::LParen, start, &cursor);
            }
            b')' => {
                cursor.advance();
                push(&mut tokens, TokenKind::RParen, start, &cursor);
            }
            b'\'' => {
                cursor.advance();
                push(&mut tokens, TokenKind::Quote, start, &cursor);
            }
            b'`' => {
                cursor.advance();
                push(&mut tokens, TokenKind::Backquote, start, &cursor);
            }
            b',' => {
                cursor.advance();
                push(&mut tokens, TokenKind::Comma, start, &cursor);
            }
            b'"' => {
                cursor.advance();
                let outcome = string::scan(&mut cursor);
                if outcome.terminated {
                    push(&mut tokens, TokenKind::String, start, &cursor);
                } else {
                    let span = Span::new(start as u32, (cursor.position() - start) as u32);
                    tokens.push(Token::new(TokenKind::Error, span));
                    log::debug!("unterminated string literal at {span:?}");
                    handler.emit(Diagnostic::error("unterminated string literal").with_span(span));
                }
            }
            _ if identifier::looks_like_uninterned_start(&cursor) => {
                if identifier::scan_uninterned(&mut cursor) {
                    push(&mut tokens, TokenKind::UninternedSymbol, start, &cursor);
                } else {
                    let span = Span::new(start as u32, (cursor.position() - start) as u32);
                    tokens.push(Token::new(TokenKind::Error, span));
                    log::debug!("`#:` not followed by an identifier at {span:?}");
                    handler.emit(
                        Diagnostic::error("`#:` not followed by an identifier").with_span(span),
                    );
                }
            }
            _ if number::looks_like_number_start(&cursor) => {
                match number::scan(&mut cursor, start) {
                    number::NumberOutcome::RewindToIdentifier => {
                        identifier::scan(&mut cursor);
                        push(&mut tokens, TokenKind::Identifier, start, &cursor);
                    }
                    outcome => {
                        let kind = number::to_token_kind(&outcome).expect("non-rewind outcome");
                        push(&mut tokens, kind, start, &cursor);
                    }
                }
            }
            _ if identifier::is_identifier_start(byte) => {
                identifier::scan(&mut cursor);
                push(&mut tokens, TokenKind::Identifier, start, &cursor);
            }
            _ => {
                cursor.advance();
                let span = Span::new(start as u32, 1);
                tokens.push(Token::new(TokenKind::Error, span));
                log::debug!("unrecognized byte 0x{byte:02x} at {span:?}");
                handler
                    .emit(Diagnostic::error(format!("unrecognized byte 0x{byte:02x}")).with_span(span));
            }
        }
    }

    LexOutput { tokens }
}

fn push(tokens: &mut Vec<Token>, kind: TokenKind, start: usize, cursor: &Cursor) {
    let len = (cursor.position() - start) as u32;
    tokens.push(Token::new(kind, Span::new(start as u32, len)));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &[u8]) -> Vec<TokenKind> {
        let mut handler = Handler::new();
        lex(src, &mut handler).tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_simple_list() {
        let mut handler = Handler::new();
        let out = lex(b"(+ 1 2)", &mut handler);
        assert!(!handler.has_errors());
        let non_ignore: Vec<_> =
            out.tokens.iter().filter(|t| t.kind != TokenKind::Ignore).map(|t| t.kind).collect();
        assert_eq!(
            non_ignore,
            vec![
                TokenKind::LParen,
                TokenKind::Identifier,
                TokenKind::Integer,
                TokenKind::Integer,
                TokenKind::RParen,
            ]
        );
    }

    #[test]
    fn quote_family_single_char_tokens() {
        assert_eq!(
            kinds(b"'`,x"),
            vec![TokenKind::Quote, TokenKind::Backquote, TokenKind::Comma, TokenKind::Identifier]
        );
    }

    #[test]
    fn line_comment_is_ignored() {
        let mut handler = Handler::new();
        let out = lex(b"; hi\n1", &mut handler);
        let non_ignore: Vec<_> =
            out.tokens.iter().filter(|t| t.kind != TokenKind::Ignore).map(|t| t.kind).collect();
        assert_eq!(non_ignore, vec![TokenKind::Integer]);
    }

    #[test]
    fn unterminated_string_is_error() {
        let mut handler = Handler::new();
        let out = lex(b"\"oops", &mut handler);
        assert_eq!(out.tokens[0].kind, TokenKind::Error);
        assert!(handler.has_errors());
    }

    #[test]
    fn bad_byte_recovers() {
        let mut handler = Handler::new();
        let out = lex(b"1 \x01 2", &mut handler);
        let kinds: Vec<_> = out.tokens.iter().map(|t| t.kind).collect();
        assert!(kinds.contains(&TokenKind::Error));
        assert!(kinds.contains(&TokenKind::Integer));
    }

    #[test]
    fn lex_round_trip_reconstructs_source() {
        let src: &[u8] = b"(define (f x) (* x x)) ; trailing\n'(1 2.5 \"s\" #:g)";
        let mut handler = Handler::new();
        let out = lex(src, &mut handler);
        let mut rebuilt = Vec::new();
        for t in &out.tokens {
            rebuilt.extend_from_slice(t.text(src));
        }
        assert_eq!(rebuilt, src);
    }
}
