//! Byte-counting writer used by every encoder

use std::io::{self, Write};

/// Wraps the caller's sink and counts what was written to it
pub(crate) struct Sink<'a, W: Write> {
    inner: &'a mut W,
    written: usize,
}

impl<'a, W: Write> Sink<'a, W> {
    pub(crate) fn new(inner: &'a mut W) -> Self {
        Self { inner, written: 0 }
    }

    pub(crate) fn put(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.inner.write_all(bytes)?;
        self.written += bytes.len();
        Ok(())
    }

    pub(crate) fn put_num<I: itoa::Integer>(&mut self, v: I) -> io::Result<()> {
        let mut buf = itoa::Buffer::new();
        self.put(buf.format(v).as_bytes())
    }

    /// `" " <num>`
    pub(crate) fn put_field<I: itoa::Integer>(&mut self, v: I) -> io::Result<()> {
        self.put(b" ")?;
        self.put_num(v)
    }

    pub(crate) fn crlf(&mut self) -> io::Result<()> {
        self.put(b"\r\n")
    }

    pub(crate) fn written(&self) -> usize {
        self.written
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_bytes() {
        let mut out = Vec::new();
        let mut sink = Sink::new(&mut out);
        sink.put(b"VA").unwrap();
        sink.put_field(123u64).unwrap();
        sink.put_field(-7i64).unwrap();
        sink.crlf().unwrap();
        assert_eq!(sink.written(), 11);
        assert_eq!(out, b"VA 123 -7\r\n");
    }
}
