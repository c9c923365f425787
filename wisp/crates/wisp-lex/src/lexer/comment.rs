//! Line comment scanning (spec §4.2). `;` begins a comment terminated by
//! newline or end of input. The comment's span becomes an `IGNORE` token
//! so the lex round-trip property (concatenated spans reproduce the
//! source verbatim) holds even across comments.

use crate::cursor::Cursor;

/// Cursor must be positioned at `;`.
pub fn scan(cursor: &mut Cursor) {
    debug_assert_eq!(cursor.current(), Some(b';'));
    while !matches!(cursor.current(), None | Some(b'\n')) {
        cursor.advance();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comment_stops_before_newline() {
        let mut c = Cursor::new(b"; a comment\nnext");
        scan(&mut c);
        assert_eq!(c.position(), 11);
    }

    #[test]
    fn comment_runs_to_eof() {
        let mut c = Cursor::new(b"; no newline here");
        scan(&mut c);
        assert!(c.is_at_end());
    }
}
