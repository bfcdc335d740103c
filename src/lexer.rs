//! Character-level scanning for the parser. There is no token stream: the
//! parser asks the lexer for the next literal, identifier or symbol at the
//! current position and backtracks through checkpoints.

use crate::{
    ast::Literal,
    diagnostics::{CrawlspaceError, Diagnostic, DiagnosticKind, Result, SourcePosition},
    duration,
};

pub fn is_identifier_char(ch: char) -> bool {
    ch == '_' || ch.is_alphanumeric()
}

/// True unless both sides of the seam are identifier characters.
fn is_boundary(before: Option<char>, after: Option<char>) -> bool {
    !(before.is_some_and(is_identifier_char) && after.is_some_and(is_identifier_char))
}

pub struct Lexer {
    chars: Vec<char>,
    position: SourcePosition,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            position: SourcePosition::start(),
        }
    }

    pub fn checkpoint(&self) -> SourcePosition {
        self.position
    }

    pub fn restore(&mut self, checkpoint: SourcePosition) {
        self.position = checkpoint;
    }

    pub fn is_eof(&self) -> bool {
        self.position.offset >= self.chars.len()
    }

    pub fn peek(&self) -> Option<char> {
        self.peek_at(0)
    }

    pub fn peek_at(&self, lookahead: usize) -> Option<char> {
        self.chars.get(self.position.offset + lookahead).copied()
    }

    pub fn remaining(&self) -> String {
        self.chars[self.position.offset.min(self.chars.len())..]
            .iter()
            .collect()
    }

    pub fn error(&self, message: impl Into<String>) -> CrawlspaceError {
        self.error_at(self.position, message)
    }

    pub fn error_at(
        &self,
        position: SourcePosition,
        message: impl Into<String>,
    ) -> CrawlspaceError {
        Diagnostic::new(DiagnosticKind::Parser, message)
            .with_position(position)
            .into()
    }

    fn starts_with(&self, text: &str) -> bool {
        let mut offset = self.position.offset;
        for expected in text.chars() {
            if self.chars.get(offset) != Some(&expected) {
                return false;
            }
            offset += 1;
        }
        true
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.position.offset += 1;
        if ch == '\n' {
            self.position.line += 1;
            self.position.column = 1;
        } else {
            self.position.column += 1;
        }
        Some(ch)
    }

    fn advance(&mut self, count: usize) {
        for _ in 0..count {
            if self.bump().is_none() {
                break;
            }
        }
    }

    fn take_while<F>(&mut self, mut predicate: F) -> String
    where
        F: FnMut(char) -> bool,
    {
        let mut text = String::new();
        while let Some(ch) = self.peek() {
            if !predicate(ch) {
                break;
            }
            text.push(ch);
            self.bump();
        }
        text
    }

    /// Skips whitespace, `// line` comments and `/* block */` comments. An
    /// unterminated block comment runs to the end of input.
    pub fn skip_trivia(&mut self) {
        loop {
            if self.starts_with("//") {
                self.advance(2);
                while let Some(ch) = self.bump() {
                    if ch == '\n' {
                        break;
                    }
                }
                continue;
            }
            if self.starts_with("/*") {
                self.advance(2);
                while !self.is_eof() && !self.starts_with("*/") {
                    self.bump();
                }
                self.advance(2);
                continue;
            }
            match self.peek() {
                Some(' ' | '\t' | '\r' | '\n') => {
                    self.bump();
                }
                _ => break,
            }
        }
    }

    /// Consumes `symbol` if it appears at the current position on a token
    /// boundary, then skips trailing trivia.
    pub fn eat_symbol(&mut self, symbol: &str) -> bool {
        if !self.starts_with(symbol) {
            return false;
        }
        let width = symbol.chars().count();
        if !is_boundary(symbol.chars().last(), self.peek_at(width)) {
            return false;
        }
        self.advance(width);
        self.skip_trivia();
        true
    }

    pub fn identifier(&mut self) -> Option<String> {
        match self.peek() {
            Some(ch) if is_identifier_char(ch) && !ch.is_ascii_digit() => {}
            _ => return None,
        }
        let name = self.take_while(is_identifier_char);
        self.skip_trivia();
        Some(name)
    }

    pub fn string(&mut self) -> Result<Option<Literal>> {
        if self.peek() != Some('"') {
            return Ok(None);
        }
        let start = self.checkpoint();
        self.bump();
        let mut value = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error_at(start, "unterminated string literal")),
                Some('"') => break,
                Some('\n') => return Err(self.error("unexpected end of line")),
                Some('\\') => match self.bump() {
                    Some(ch @ ('\\' | '"')) => value.push(ch),
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some(other) => {
                        return Err(self.error(format!("unexpected escape code: {other:?}")));
                    }
                    None => return Err(self.error_at(start, "unterminated string literal")),
                },
                Some(ch) => value.push(ch),
            }
        }
        self.skip_trivia();
        Ok(Some(Literal::String(value)))
    }

    /// Scans an integer, float or duration literal.
    pub fn number(&mut self) -> Result<Option<Literal>> {
        if !self.peek().is_some_and(|ch| ch.is_ascii_digit()) {
            return Ok(None);
        }
        let start = self.checkpoint();

        if self.peek() == Some('0') {
            let radix = match self.peek_at(1) {
                Some('x' | 'X') => Some(16),
                Some('o' | 'O') => Some(8),
                Some('b' | 'B') => Some(2),
                _ => None,
            };
            if let Some(radix) = radix {
                self.advance(2);
                let digits = self.take_while(|ch| ch.is_digit(radix) || ch == '_');
                let cleaned: String = digits.chars().filter(|ch| *ch != '_').collect();
                if cleaned.is_empty() {
                    return Err(self.error_at(start, "malformed integer literal"));
                }
                let value = i64::from_str_radix(&cleaned, radix).map_err(|_| {
                    self.error_at(start, format!("integer literal {digits:?} out of range"))
                })?;
                self.skip_trivia();
                return Ok(Some(Literal::Int(value)));
            }
        }

        let mut text = self.take_while(|ch| ch.is_ascii_digit() || ch == '_');
        let mut is_float = false;
        if self.peek() == Some('.') && !self.peek_at(1).is_some_and(continues_member) {
            self.bump();
            text.push('.');
            text.push_str(&self.take_while(|ch| ch.is_ascii_digit() || ch == '_'));
            is_float = true;
        }

        let mut has_exponent = false;
        if matches!(self.peek(), Some('e' | 'E')) {
            let sign = usize::from(matches!(self.peek_at(1), Some('+' | '-')));
            if self.peek_at(1 + sign).is_some_and(|ch| ch.is_ascii_digit()) {
                text.push('e');
                self.bump();
                if sign == 1 {
                    text.extend(self.bump());
                }
                text.push_str(&self.take_while(|ch| ch.is_ascii_digit()));
                is_float = true;
                has_exponent = true;
            }
        }

        if !has_exponent {
            if let Some(unit) = self.duration_suffix() {
                let value = duration::parse(&text, unit).map_err(|msg| self.error_at(start, msg))?;
                self.skip_trivia();
                return Ok(Some(Literal::Duration(value)));
            }
        }

        let cleaned: String = text.chars().filter(|ch| *ch != '_').collect();
        let literal = if is_float {
            let value = cleaned.parse::<f64>().map_err(|err| {
                self.error_at(start, format!("invalid float literal {text:?}: {err}"))
            })?;
            if value.is_infinite() {
                return Err(self.error_at(start, format!("float literal {text:?} out of range")));
            }
            Literal::Float(value)
        } else if let Some(octal) = cleaned.strip_prefix('0').filter(|rest| !rest.is_empty()) {
            if !octal.chars().all(|ch| ch.is_digit(8)) {
                return Err(self.error_at(start, format!("malformed octal literal {text:?}")));
            }
            let value = i64::from_str_radix(octal, 8).map_err(|_| {
                self.error_at(start, format!("integer literal {text:?} out of range"))
            })?;
            Literal::Int(value)
        } else {
            let value = cleaned.parse::<i64>().map_err(|_| {
                self.error_at(start, format!("integer literal {text:?} out of range"))
            })?;
            Literal::Int(value)
        };
        self.skip_trivia();
        Ok(Some(literal))
    }

    fn duration_suffix(&mut self) -> Option<&'static str> {
        for unit in duration::UNIT_SUFFIXES {
            if !self.starts_with(unit) {
                continue;
            }
            let width = unit.chars().count();
            if is_boundary(unit.chars().last(), self.peek_at(width)) {
                self.advance(width);
                return Some(unit);
            }
        }
        None
    }
}

/// A `.` after digits starts a member access, not a fraction, when a name
/// or another `.` follows it.
fn continues_member(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_' || ch == '.'
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn scan_number(source: &str) -> Literal {
        Lexer::new(source)
            .number()
            .expect("scan succeeds")
            .expect("number present")
    }

    #[test]
    fn numbers_pick_their_kind() {
        assert_eq!(scan_number("42"), Literal::Int(42));
        assert_eq!(scan_number("1_000"), Literal::Int(1000));
        assert_eq!(scan_number("0x1f"), Literal::Int(31));
        assert_eq!(scan_number("2.5"), Literal::Float(2.5));
        assert_eq!(scan_number("1e3"), Literal::Float(1000.0));
        assert_eq!(
            scan_number("150ms"),
            Literal::Duration(Duration::from_millis(150))
        );
    }

    #[test]
    fn integers_with_a_leading_zero_are_octal() {
        assert_eq!(scan_number("0755"), Literal::Int(493));
        assert_eq!(scan_number("0"), Literal::Int(0));
        assert_eq!(scan_number("0.5"), Literal::Float(0.5));
        let err = Lexer::new("089").number().unwrap_err();
        assert!(err.to_string().contains("malformed octal literal"), "{err}");
    }

    #[test]
    fn trailing_dot_makes_a_float() {
        assert_eq!(scan_number("1."), Literal::Float(1.0));
        let mut lexer = Lexer::new("1.x");
        assert_eq!(lexer.number().unwrap(), Some(Literal::Int(1)));
        assert_eq!(lexer.remaining(), ".x");
    }

    #[test]
    fn float_overflow_is_reported() {
        let err = Lexer::new("1e400").number().unwrap_err();
        assert!(err.to_string().contains("out of range"), "{err}");
    }

    #[test]
    fn duration_suffix_needs_a_boundary() {
        let mut lexer = Lexer::new("5sec");
        assert_eq!(lexer.number().unwrap(), Some(Literal::Int(5)));
        assert_eq!(lexer.remaining(), "sec");
    }

    #[test]
    fn integer_overflow_is_reported() {
        let err = Lexer::new("99999999999999999999").number().unwrap_err();
        assert!(err.to_string().contains("out of range"), "{err}");
    }

    #[test]
    fn trivia_tracks_lines_and_columns() {
        let mut lexer = Lexer::new("  // note\n /* block\n */ x");
        lexer.skip_trivia();
        let position = lexer.checkpoint();
        assert_eq!((position.line, position.column), (3, 5));
        assert_eq!(lexer.identifier().as_deref(), Some("x"));
        assert!(lexer.is_eof());
    }

    #[test]
    fn symbols_respect_identifier_boundaries() {
        let mut lexer = Lexer::new("<=b");
        assert!(lexer.eat_symbol("<="));
        assert_eq!(lexer.identifier().as_deref(), Some("b"));
    }

    #[test]
    fn strings_decode_escapes_and_reject_newlines() {
        let mut lexer = Lexer::new(r#""a\tb\"c""#);
        assert_eq!(
            lexer.string().unwrap(),
            Some(Literal::String("a\tb\"c".to_string()))
        );
        assert!(Lexer::new("\"abc\ndef\"").string().is_err());
        assert!(Lexer::new("\"abc").string().is_err());
    }
}
