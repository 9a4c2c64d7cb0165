//! Byte cursor with line tracking.
//!
//! All structural characters in the grammar are ASCII, so the scanner walks
//! bytes. A non-ASCII character is always consumed whole, which keeps the
//! cursor on a char boundary.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Mark {
    pos: usize,
    line: u32,
}

pub(crate) struct Scanner<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: u32,
}

/// Trivia could not be skipped because a block comment never ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct UnterminatedComment {
    pub(crate) line: u32,
}

impl<'a> Scanner<'a> {
    pub(crate) fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            line: 1,
        }
    }

    pub(crate) fn mark(&self) -> Mark {
        Mark {
            pos: self.pos,
            line: self.line,
        }
    }

    pub(crate) fn reset(&mut self, mark: Mark) {
        self.pos = mark.pos;
        self.line = mark.line;
    }

    pub(crate) fn line(&self) -> u32 {
        self.line
    }

    pub(crate) fn is_eof(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    pub(crate) fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    pub(crate) fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    pub(crate) fn starts_with(&self, s: &str) -> bool {
        self.bytes[self.pos.min(self.bytes.len())..].starts_with(s.as_bytes())
    }

    /// Consume one character and return its first byte.
    pub(crate) fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
        } else if !b.is_ascii() {
            while self.peek().is_some_and(|c| c & 0xC0 == 0x80) {
                self.pos += 1;
            }
        }
        Some(b)
    }

    pub(crate) fn eat(&mut self, b: u8) -> bool {
        if self.peek() == Some(b) {
            self.bump();
            true
        } else {
            false
        }
    }

    pub(crate) fn eat_str(&mut self, s: &str) -> bool {
        if self.starts_with(s) {
            for _ in 0..s.len() {
                self.bump();
            }
            true
        } else {
            false
        }
    }

    pub(crate) fn slice(&self, start: Mark) -> &'a str {
        self.src.get(start.pos..self.pos).unwrap_or_default()
    }

    /// Skip whitespace and comments.
    pub(crate) fn skip_trivia(&mut self) -> Result<(), UnterminatedComment> {
        loop {
            match self.peek() {
                Some(b) if b.is_ascii_whitespace() => {
                    self.bump();
                }
                Some(b'/') if self.peek_at(1) == Some(b'/') => {
                    while let Some(b) = self.peek() {
                        if b == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some(b'/') if self.peek_at(1) == Some(b'*') => {
                    let line = self.line;
                    self.bump();
                    self.bump();
                    loop {
                        if self.is_eof() {
                            return Err(UnterminatedComment { line });
                        }
                        if self.eat_str("*/") {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    /// Consume an identifier (`[A-Za-z_$][A-Za-z0-9_$]*`, plus any non-ASCII
    /// bytes). `allow_dash` admits `-` for element and attribute names.
    pub(crate) fn ident(&mut self, allow_dash: bool) -> Option<&'a str> {
        let start = self.mark();
        match self.peek() {
            Some(b) if is_ident_start(b) => {
                self.bump();
            }
            _ => return None,
        }
        while let Some(b) = self.peek() {
            if is_ident_continue(b) || (allow_dash && b == b'-') {
                self.bump();
            } else {
                break;
            }
        }
        Some(self.slice(start))
    }
}

pub(crate) fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b'$' || b >= 0x80
}

pub(crate) fn is_ident_continue(b: u8) -> bool {
    is_ident_start(b) || b.is_ascii_digit()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trivia_tracks_lines() {
        let mut s = Scanner::new("// a\n/* b\n c */  x");
        s.skip_trivia().unwrap();
        assert_eq!(s.peek(), Some(b'x'));
        assert_eq!(s.line(), 3);
    }

    #[test]
    fn test_unterminated_block_comment() {
        let mut s = Scanner::new("\n/* never closed");
        assert_eq!(s.skip_trivia(), Err(UnterminatedComment { line: 2 }));
    }

    #[test]
    fn test_ident_with_dash() {
        let mut s = Scanner::new("data-id=1");
        assert_eq!(s.ident(true), Some("data-id"));
        let mut s = Scanner::new("data-id=1");
        assert_eq!(s.ident(false), Some("data"));
    }

    #[test]
    fn test_bump_consumes_whole_characters() {
        let mut s = Scanner::new("é\\ü;");
        let start = s.mark();
        assert_eq!(s.bump(), Some(0xC3));
        assert_eq!(s.slice(start), "é");
        assert_eq!(s.bump(), Some(b'\\'));
        let escaped = s.mark();
        s.bump();
        assert_eq!(s.slice(escaped), "ü");
        assert_eq!(s.peek(), Some(b';'));
    }

    #[test]
    fn test_mark_and_reset() {
        let mut s = Scanner::new("ab\ncd");
        let m = s.mark();
        s.bump();
        s.bump();
        s.bump();
        assert_eq!(s.line(), 2);
        s.reset(m);
        assert_eq!(s.line(), 1);
        assert_eq!(s.peek(), Some(b'a'));
    }
}
