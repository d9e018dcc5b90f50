//! The lexical scanner.
//!
//! A [`Cursor`] walks a preprocessed source buffer byte by byte. Every parse
//! primitive either consumes what it matched, or leaves the cursor exactly
//! where it was; malformed constructs abort with a diagnostic that quotes
//! the offending line.

use bstr::BStr;

use crate::diagnostics::{Error, Scan, SourceContext};

/// A name borrowed from a source buffer. Comparison and hashing are over the
/// raw bytes.
pub(crate) type Name<'a> = &'a BStr;

fn is_identifier_start(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'_'
}

pub(crate) fn is_identifier_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'.'
}

/// Character-level cursor over one source buffer.
#[derive(Debug)]
pub(crate) struct Cursor<'a> {
    bytes: &'a [u8],
    position: usize,
    line: u32,
    path: &'a str,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(path: &'a str, text: &'a str) -> Self {
        Self { bytes: text.as_bytes(), position: 0, line: 1, path }
    }

    /// The byte under the cursor, or NUL at the end of the buffer.
    pub(crate) fn peek(&self) -> u8 {
        self.bytes.get(self.position).copied().unwrap_or(0)
    }

    fn peek_at(&self, offset: usize) -> u8 {
        self.bytes.get(self.position + offset).copied().unwrap_or(0)
    }

    /// Advance by `count` bytes, keeping the line counter honest.
    pub(crate) fn advance(&mut self, count: usize) {
        for _ in 0..count {
            if self.position >= self.bytes.len() {
                break;
            }
            if self.bytes[self.position] == b'\n' {
                self.line += 1;
            }
            self.position += 1;
        }
    }

    pub(crate) fn position(&self) -> usize {
        self.position
    }

    /// Restore an earlier position. Only valid for rewinds that do not cross
    /// a line break, which holds for every single-line construct.
    pub(crate) fn rewind(&mut self, position: usize) {
        debug_assert!(position <= self.position);
        debug_assert!(!self.bytes[position..self.position].contains(&b'\n'));
        self.position = position;
    }

    /// Is the rest of the buffer just whitespace?
    pub(crate) fn is_at_end(&mut self) -> bool {
        while self.peek().is_ascii_whitespace() {
            self.advance(1);
        }

        self.position >= self.bytes.len()
    }

    /// Skip whitespace and separators (`,`, `;`) without crossing a line
    /// break.
    pub(crate) fn skip(&mut self) {
        loop {
            let byte = self.peek();
            let skippable = (byte.is_ascii_whitespace() && byte != b'\n')
                || byte == b','
                || byte == b';';

            if !skippable {
                break;
            }

            self.advance(1);
        }
    }

    /// Skip until the next non-whitespace byte, crossing line breaks.
    pub(crate) fn skip_newline(&mut self) {
        while self.peek().is_ascii_whitespace() {
            self.advance(1);
        }
    }

    /// Skip the rest of the current line.
    pub(crate) fn skip_line(&mut self) {
        while self.peek() != b'\n' && self.position < self.bytes.len() {
            self.advance(1);
        }

        self.skip_newline();
    }

    /// Attempt to consume a string; no effect when it does not match.
    pub(crate) fn consume(&mut self, pattern: &str) -> bool {
        self.skip();

        if self.bytes[self.position..].starts_with(pattern.as_bytes()) {
            self.advance(pattern.len());
            true
        } else {
            false
        }
    }

    /// Attempt to consume a keyword. Unlike [`Self::consume`], the match
    /// must end at a word break (whitespace or end of input), so `add` does
    /// not match `adder`. Leading whitespace is the caller's business.
    pub(crate) fn consume_keyword(&mut self, keyword: &str) -> bool {
        if !self.bytes[self.position..].starts_with(keyword.as_bytes()) {
            return false;
        }

        let next = self.peek_at(keyword.len());
        if next == 0 || next.is_ascii_whitespace() {
            self.advance(keyword.len());
            true
        } else {
            false
        }
    }

    /// Attempt to consume an identifier: `[A-Za-z_][A-Za-z0-9_.]*`.
    pub(crate) fn identifier(&mut self) -> Option<Name<'a>> {
        self.skip();

        if !is_identifier_start(self.peek()) {
            return None;
        }

        let start = self.position;
        let mut length = 1;
        while is_identifier_byte(self.peek_at(length)) {
            length += 1;
        }

        self.advance(length);

        Some(BStr::new(&self.bytes[start..start + length]))
    }

    /// Attempt to consume a label: an identifier followed by `:`.
    pub(crate) fn label(&mut self) -> Option<Name<'a>> {
        self.skip();
        let start = self.position();

        if let Some(name) = self.identifier() {
            if self.consume(":") {
                return Some(name);
            }
        }

        self.rewind(start);
        None
    }

    /// Attempt to consume a run of non-whitespace bytes, as used by the
    /// path operand of `.line`.
    pub(crate) fn path_token(&mut self) -> Option<Name<'a>> {
        self.skip();

        let start = self.position;
        let mut length = 0;
        loop {
            let byte = self.peek_at(length);
            if byte == 0 || byte.is_ascii_whitespace() {
                break;
            }
            length += 1;
        }

        if length == 0 {
            return None;
        }

        self.advance(length);

        Some(BStr::new(&self.bytes[start..start + length]))
    }

    /// Attempt to consume a register: `r0`..`r31`, or `sp`, `bp`, `ra`.
    ///
    /// A trailing identifier character rejects the match, so `r0a` is an
    /// identifier, not register 0.
    pub(crate) fn register(&mut self) -> Option<u8> {
        self.skip();

        for (alias, number) in [("sp", 31u8), ("bp", 30), ("ra", 29)] {
            if self.bytes[self.position..].starts_with(alias.as_bytes())
                && !is_identifier_byte(self.peek_at(alias.len()))
            {
                self.advance(alias.len());
                return Some(number);
            }
        }

        if self.peek() != b'r' {
            return None;
        }

        let mut length = 1;
        let mut value: u32 = 0;
        while self.peek_at(length).is_ascii_digit() {
            value = value * 10 + (self.peek_at(length) - b'0') as u32;
            length += 1;
        }

        if length == 1 || value > 31 || is_identifier_byte(self.peek_at(length)) {
            return None;
        }

        self.advance(length);

        Some(value as u8)
    }

    /// Attempt to consume a control register: `cr0`..`cr11` or a named
    /// alias.
    pub(crate) fn control_register(&mut self) -> Option<u8> {
        self.skip();

        if self.peek() == b'c' && self.peek_at(1) == b'r' && self.peek_at(2).is_ascii_digit() {
            let mut length = 2;
            let mut value: u32 = 0;
            while self.peek_at(length).is_ascii_digit() {
                value = value * 10 + (self.peek_at(length) - b'0') as u32;
                length += 1;
            }

            if value > 11 || is_identifier_byte(self.peek_at(length)) {
                return None;
            }

            self.advance(length);
            return Some(value as u8);
        }

        const NAMES: [(&str, u8); 13] = [
            ("psr", 0),
            ("pid", 1),
            ("isr", 2),
            ("imr", 3),
            ("epc", 4),
            ("flg", 5),
            ("efg", 6),
            ("tlb", 7),
            ("ksp", 8),
            ("cid", 9),
            ("mbi", 10),
            ("mbo", 11),
            ("isp", 12),
        ];

        for (alias, number) in NAMES {
            if self.bytes[self.position..].starts_with(alias.as_bytes())
                && !is_identifier_byte(self.peek_at(alias.len()))
            {
                self.advance(alias.len());
                return Some(number);
            }
        }

        None
    }

    /// Attempt to consume an integer literal: decimal, `0b` binary, `0o`
    /// octal, or `0x` hex, with an optional leading `-`.
    pub(crate) fn literal(&mut self) -> Scan<i64> {
        self.skip();

        let start = self.position();
        let mut negate = false;
        if self.peek() == b'-' {
            negate = true;
            self.advance(1);
            self.skip();
        }

        // Edge case for the zero literal, the only time a leading 0 is
        // allowed on its own.
        let head = self.peek();
        let next = self.peek_at(1);
        if head == b'0'
            && (next == 0 || next.is_ascii_whitespace() || next == b']' || next == b'#')
        {
            self.advance(1);
            return Ok(Some(0));
        }

        let value = if head.is_ascii_digit() && head != b'0' {
            let mut value: i64 = 0;
            while self.peek().is_ascii_digit() {
                value = value.wrapping_mul(10).wrapping_add((self.peek() - b'0') as i64);
                self.advance(1);
            }
            value
        } else if head == b'0' && (next == b'b' || next == b'B') {
            self.advance(2);
            if !self.peek().is_ascii_digit() {
                return Err(self.syntax_error("Invalid binary literal"));
            }
            let mut value: i64 = 0;
            while self.peek().is_ascii_digit() {
                let digit = self.peek() - b'0';
                if digit > 1 {
                    return Err(self.syntax_error("Invalid binary literal"));
                }
                value = value.wrapping_mul(2).wrapping_add(digit as i64);
                self.advance(1);
            }
            value
        } else if head == b'0' && (next == b'o' || next == b'O') {
            self.advance(2);
            if !self.peek().is_ascii_digit() {
                return Err(self.syntax_error("Invalid octal literal"));
            }
            let mut value: i64 = 0;
            while self.peek().is_ascii_digit() {
                let digit = self.peek() - b'0';
                if digit > 7 {
                    return Err(self.syntax_error("Invalid octal literal"));
                }
                value = value.wrapping_mul(8).wrapping_add(digit as i64);
                self.advance(1);
            }
            value
        } else if head == b'0' && (next == b'x' || next == b'X') {
            self.advance(2);
            if !self.peek().is_ascii_alphanumeric() {
                return Err(self.syntax_error("Invalid hex literal"));
            }
            let mut value: i64 = 0;
            while self.peek().is_ascii_alphanumeric() {
                let byte = self.peek();
                let digit = match byte {
                    b'0'..=b'9' => byte - b'0',
                    b'A'..=b'F' => byte - b'A' + 10,
                    b'a'..=b'f' => byte - b'a' + 10,
                    _ => return Err(self.syntax_error("Invalid hex literal")),
                };
                value = value.wrapping_mul(16).wrapping_add(digit as i64);
                self.advance(1);
            }
            value
        } else {
            self.rewind(start);
            return Ok(None);
        };

        Ok(Some(if negate { -value } else { value }))
    }

    /// Build the diagnostic context quoting the current line.
    pub(crate) fn context(&self) -> SourceContext {
        let mut start = self.position.min(self.bytes.len());
        while start > 0 && self.bytes[start - 1] != b'\n' {
            start -= 1;
        }

        let mut end = self.position.min(self.bytes.len());
        while end < self.bytes.len() && self.bytes[end] != b'\n' {
            end += 1;
        }

        let text = String::from_utf8_lossy(&self.bytes[start..end]).trim().to_string();

        SourceContext { path: self.path.to_string(), line: self.line, text }
    }

    pub(crate) fn syntax_error<M>(&self, message: M) -> Error
    where
        M: Into<String>,
    {
        Error::Syntax(self.context(), message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cursor(text: &str) -> Cursor<'_> {
        Cursor::new("test.s", text)
    }

    #[test]
    fn test_skip_separators() {
        let mut cursor = cursor("  , ;\t x");
        cursor.skip();

        assert_eq!(cursor.peek(), b'x');
    }

    #[test]
    fn test_skip_does_not_cross_lines() {
        let mut cursor = cursor("   \n   x");
        cursor.skip();

        assert_eq!(cursor.peek(), b'\n');

        cursor.skip_newline();
        assert_eq!(cursor.peek(), b'x');
    }

    #[test]
    fn test_consume_keyword_needs_word_break() {
        let mut cursor = cursor("adder r1");
        assert!(!cursor.consume_keyword("add"));
        assert_eq!(cursor.position(), 0);

        let mut cursor = super::Cursor::new("test.s", "add r1");
        assert!(cursor.consume_keyword("add"));
    }

    #[test]
    fn test_identifier() {
        let mut cursor = cursor("  _frame.top: rest");
        assert_eq!(cursor.identifier(), Some(BStr::new("_frame.top")));
        assert_eq!(cursor.peek(), b':');

        let mut cursor = super::Cursor::new("test.s", "123abc");
        assert_eq!(cursor.identifier(), None);
    }

    #[test]
    fn test_label() {
        let mut cursor = cursor("loop: add");
        assert_eq!(cursor.label(), Some(BStr::new("loop")));

        // An identifier without a colon is not a label, and the cursor is
        // restored.
        let mut cursor = super::Cursor::new("test.s", "loop add");
        assert_eq!(cursor.label(), None);
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn test_register() {
        assert_eq!(cursor("r0").register(), Some(0));
        assert_eq!(cursor("r31").register(), Some(31));
        assert_eq!(cursor("sp").register(), Some(31));
        assert_eq!(cursor("bp").register(), Some(30));
        assert_eq!(cursor("ra").register(), Some(29));

        // Out of range, bare `r`, or trailing identifier characters.
        assert_eq!(cursor("r32").register(), None);
        assert_eq!(cursor("r").register(), None);
        assert_eq!(cursor("r0a").register(), None);
        assert_eq!(cursor("spill").register(), None);
        assert_eq!(cursor("rax").register(), None);
    }

    #[test]
    fn test_control_register() {
        assert_eq!(cursor("cr0").control_register(), Some(0));
        assert_eq!(cursor("cr11").control_register(), Some(11));
        assert_eq!(cursor("cr12").control_register(), None);
        assert_eq!(cursor("psr").control_register(), Some(0));
        assert_eq!(cursor("epc").control_register(), Some(4));
        assert_eq!(cursor("isp").control_register(), Some(12));
        assert_eq!(cursor("epcx").control_register(), None);
    }

    #[test]
    fn test_literal_bases() {
        assert_eq!(cursor("42").literal().unwrap(), Some(42));
        assert_eq!(cursor("-42").literal().unwrap(), Some(-42));
        assert_eq!(cursor("- 42").literal().unwrap(), Some(-42));
        assert_eq!(cursor("0b1010").literal().unwrap(), Some(10));
        assert_eq!(cursor("0o17").literal().unwrap(), Some(15));
        assert_eq!(cursor("0x1F").literal().unwrap(), Some(31));
        assert_eq!(cursor("0Xff").literal().unwrap(), Some(255));
    }

    #[test]
    fn test_literal_zero_edge() {
        assert_eq!(cursor("0 ").literal().unwrap(), Some(0));
        assert_eq!(cursor("0").literal().unwrap(), Some(0));
        assert_eq!(cursor("0]").literal().unwrap(), Some(0));
        assert_eq!(cursor("0#").literal().unwrap(), Some(0));
    }

    #[test]
    fn test_literal_errors() {
        assert!(cursor("0b2").literal().is_err());
        assert!(cursor("0o9").literal().is_err());
        assert!(cursor("0xZZ").literal().is_err());
        assert!(cursor("0x").literal().is_err());
        assert!(cursor("0b").literal().is_err());
    }

    #[test]
    fn test_literal_not_found_restores_cursor() {
        let mut cursor = cursor("  foo");
        assert_eq!(cursor.literal().unwrap(), None);
        assert_eq!(cursor.identifier(), Some(BStr::new("foo")));
    }

    #[test]
    fn test_context_quotes_trimmed_line() {
        let mut cursor = cursor("first\n   bad line here   \nthird");
        cursor.skip_line();
        cursor.advance(4);

        let context = cursor.context();
        assert_eq!(context.line, 2);
        assert_eq!(context.text, "bad line here");
    }

    #[test]
    fn test_line_counting() {
        let mut cursor = cursor("a\nb\nc");
        assert_eq!(cursor.context().line, 1);
        cursor.skip_line();
        assert_eq!(cursor.context().line, 2);
        cursor.skip_line();
        assert_eq!(cursor.context().line, 3);
    }
}
