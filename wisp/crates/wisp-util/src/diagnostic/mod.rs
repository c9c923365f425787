//! Diagnostics: the `kind + span + source position` triple user-visible
//! failures are rendered from (see the error handling design).
//!
//! This is a single-pass interpreter, not a multi-phase compiler, so this
//! module is deliberately smaller than a compiler's diagnostic builder: one
//! [`Diagnostic`] per failure, collected by a [`Handler`] the driver owns.

use crate::span::Span;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Error,
    Warning,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Error => write!(f, "error"),
            Level::Warning => write!(f, "warning"),
        }
    }
}

/// A single diagnosed problem, optionally anchored to a span in the source
/// buffer.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub level: Level,
    pub message: String,
    pub span: Option<Span>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Self { level: Level::Error, message: message.into(), span: None }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self { level: Level::Warning, message: message.into(), span: None }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Render the diagnostic against the source buffer it refers to, with
    /// a 1-based line/column when a span is present.
    pub fn render(&self, source: &[u8]) -> String {
        match self.span {
            Some(span) => {
                let (line, col) = span.line_col(source);
                format!("{}: {} (at {}:{})", self.level, self.message, line, col)
            }
            None => format!("{}: {}", self.level, self.message),
        }
    }
}

/// Collects diagnostics for a single interpreter run. The driver drains it
/// after lexing/parsing/evaluating and prints whatever accumulated.
#[derive(Default, Debug)]
pub struct Handler {
    diagnostics: Vec<Diagnostic>,
}

impl Handler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.level == Level::Error)
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn drain(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_tracks_errors() {
        let mut h = Handler::new();
        assert!(!h.has_errors());
        h.emit(Diagnostic::warning("just a warning"));
        assert!(!h.has_errors());
        h.emit(Diagnostic::error("boom").with_span(Span::new(0, 1)));
        assert!(h.has_errors());
        assert_eq!(h.diagnostics().len(), 2);
    }

    #[test]
    fn render_includes_position() {
        let d = Diagnostic::error("bad token").with_span(Span::new(3, 1));
        let rendered = d.render(b"ab\nc");
        assert!(rendered.contains("2:1"));
    }
}
