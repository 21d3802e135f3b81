//! Line framing.
//!
//! A record is the byte sequence between two `\n` terminators. The terminator
//! is stripped; every other byte, `\r` included, belongs to the record.

use std::io::{self, BufRead, Write};

/// Streaming line reader yielding raw record bytes.
pub struct LineReader<R> {
    reader: R,
    line_num: usize,
}

impl<R: BufRead> LineReader<R> {
    /// Wrap a buffered reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_num: 0,
        }
    }

    /// Number of lines yielded so far.
    #[must_use]
    pub fn line_num(&self) -> usize {
        self.line_num
    }
}

impl<R: BufRead> Iterator for LineReader<R> {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut line = Vec::new();
        match self.reader.read_until(b'\n', &mut line) {
            Ok(0) => None,
            Ok(_) => {
                if line.last() == Some(&b'\n') {
                    line.pop();
                }
                self.line_num += 1;
                Some(Ok(line))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

/// Write one record followed by its `\n` terminator.
pub fn write_line<W: Write + ?Sized>(writer: &mut W, line: &[u8]) -> io::Result<()> {
    writer.write_all(line)?;
    writer.write_all(b"\n")
}

/// True if the line is empty or whitespace-only.
#[must_use]
pub fn is_blank(line: &[u8]) -> bool {
    line.iter().all(u8::is_ascii_whitespace)
}
