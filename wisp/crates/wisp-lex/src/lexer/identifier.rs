//! Identifier / symbol scanning (spec §4.2, §6 grammar's `symbol-char`).

use crate::cursor::Cursor;

const SYMBOL_CHARS: &[u8] =
    b"!@$%^&*-+=<>/?:._\\~";

pub fn is_symbol_char(b: u8) -> bool {
    SYMBOL_CHARS.contains(&b)
}

pub fn is_identifier_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || is_symbol_char(b)
}

pub fn is_identifier_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || is_symbol_char(b)
}

/// Scans a plain identifier. Cursor must be positioned at the first byte
/// of the identifier (already known to satisfy [`is_identifier_start`]).
pub fn scan(cursor: &mut Cursor) {
    cursor.advance();
    while matches!(cursor.current(), Some(b) if is_identifier_continue(b)) {
        cursor.advance();
    }
}

/// `#:` followed by an identifier body produces `UNINTERNED_SYMBOL`.
/// Cursor must be positioned at `#`. Returns whether a valid identifier
/// body followed; on failure the cursor has still consumed `#:` so the
/// caller treats this as a single malformed token (best-effort recovery).
pub fn scan_uninterned(cursor: &mut Cursor) -> bool {
    debug_assert_eq!(cursor.current(), Some(b'#'));
    cursor.advance();
    cursor.advance();
    let has_body = matches!(cursor.current(), Some(b) if is_identifier_start(b));
    if has_body {
        scan(cursor);
    }
    has_body
}

pub fn looks_like_uninterned_start(cursor: &Cursor) -> bool {
    cursor.current() == Some(b'#') && cursor.peek(1) == Some(b':')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_identifier() {
        let mut c = Cursor::new(b"foo-bar? rest");
        assert!(is_identifier_start(c.current().unwrap()));
        scan(&mut c);
        assert_eq!(c.position(), 8);
    }

    #[test]
    fn operator_identifier() {
        let mut c = Cursor::new(b"+");
        scan(&mut c);
        assert_eq!(c.position(), 1);
    }

    #[test]
    fn uninterned_symbol() {
        let mut c = Cursor::new(b"#:gensym1 rest");
        assert!(looks_like_uninterned_start(&c));
        assert!(scan_uninterned(&mut c));
        assert_eq!(c.position(), 9);
    }
}
