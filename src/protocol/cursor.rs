//! Forward-only byte scanner shared by the decoders

/// Remaining-byte view plus a count of consumed bytes.
///
/// No backtracking: branch on `peek()` before consuming.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    data: &'a [u8],
    consumed: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, consumed: 0 }
    }

    /// Next byte without consuming it
    #[inline]
    pub fn peek(&self) -> Option<u8> {
        self.data.first().copied()
    }

    /// Drop the first byte
    #[inline]
    pub fn advance(&mut self) {
        if !self.data.is_empty() {
            self.data = &self.data[1..];
            self.consumed += 1;
        }
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Unconsumed bytes
    #[inline]
    pub fn rest(&self) -> &'a [u8] {
        self.data
    }

    /// Consume and return everything up to (not including) the next space
    pub fn read_token(&mut self) -> &'a [u8] {
        let end = memchr::memchr(b' ', self.data).unwrap_or(self.data.len());
        self.take(end)
    }

    /// Consume and return leading bytes while `pred` holds
    pub fn read_while(&mut self, pred: impl Fn(u8) -> bool) -> &'a [u8] {
        let end = self
            .data
            .iter()
            .position(|&b| !pred(b))
            .unwrap_or(self.data.len());
        self.take(end)
    }

    /// Consume a run of spaces, returning how many were skipped
    pub fn skip_spaces(&mut self) -> usize {
        self.read_while(|b| b == b' ').len()
    }

    /// Consume `b` if it is the next byte
    pub fn eat(&mut self, b: u8) -> bool {
        if self.peek() == Some(b) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn take(&mut self, n: usize) -> &'a [u8] {
        let (head, tail) = self.data.split_at(n);
        self.data = tail;
        self.consumed += n;
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_token() {
        let mut cur = Cursor::new(b"mg /foo v");
        assert_eq!(cur.read_token(), b"mg");
        assert_eq!(cur.consumed(), 2);
        assert_eq!(cur.peek(), Some(b' '));
        cur.advance();
        assert_eq!(cur.read_token(), b"/foo");
        cur.advance();
        assert_eq!(cur.read_token(), b"v");
        assert!(cur.is_empty());
        assert_eq!(cur.consumed(), 9);
        // token at end of input is empty
        assert_eq!(cur.read_token(), b"");
    }

    #[test]
    fn test_advance_on_empty() {
        let mut cur = Cursor::new(b"");
        cur.advance();
        assert_eq!(cur.consumed(), 0);
        assert_eq!(cur.remaining(), 0);
    }

    #[test]
    fn test_skip_spaces_and_eat() {
        let mut cur = Cursor::new(b"   k\r\n");
        assert_eq!(cur.skip_spaces(), 3);
        assert!(!cur.eat(b' '));
        assert!(cur.eat(b'k'));
        assert_eq!(cur.rest(), b"\r\n");
    }
}
