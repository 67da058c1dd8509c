//! Random-access byte source used by the tokenizer

use std::ops::Range;

/// A seekable view over a byte buffer.
///
/// Reads never fail past the end; they return `None` and leave the position
/// untouched, which lets callers turn the condition into an
/// `UnexpectedEof` carrying the right offset.
#[derive(Clone, Debug)]
pub struct ByteSource<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> ByteSource<'a> {
    /// Create a new source positioned at the first byte
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    /// Create a new source positioned at `offset`
    pub fn new_at(data: &'a [u8], offset: usize) -> Self {
        Self { data, offset }
    }

    /// Underlying data
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Total length of the source
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the source holds no bytes
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Current position
    pub fn position(&self) -> usize {
        self.offset
    }

    /// Move to an absolute position. Positions past the end are clamped.
    pub fn seek(&mut self, offset: usize) {
        self.offset = offset.min(self.data.len());
    }

    /// Whether all bytes have been consumed
    pub fn at_end(&self) -> bool {
        self.offset >= self.data.len()
    }

    /// Peek the next byte
    #[inline]
    pub fn peek(&self) -> Option<u8> {
        self.data.get(self.offset).copied()
    }

    /// Peek the byte `n` positions ahead of the current one
    #[inline]
    pub fn peek_at(&self, n: usize) -> Option<u8> {
        self.data.get(self.offset + n).copied()
    }

    /// Read one byte and advance
    #[inline]
    pub fn read_byte(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.offset += 1;
        Some(b)
    }

    /// Read `len` bytes and advance
    pub fn read_bytes(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.offset.checked_add(len)?;
        let bytes = self.data.get(self.offset..end)?;
        self.offset = end;
        Some(bytes)
    }

    /// Slice of the data for the given range
    pub fn range(&self, range: Range<usize>) -> Option<&'a [u8]> {
        self.data.get(range)
    }

    /// Whether the upcoming bytes equal `tag`
    pub fn peek_tag(&self, tag: &[u8]) -> bool {
        self.data
            .get(self.offset..)
            .map_or(false, |rest| rest.starts_with(tag))
    }

    /// Advance while the predicate holds
    pub fn skip_while(&mut self, f: impl Fn(u8) -> bool) {
        while let Some(b) = self.peek() {
            if !f(b) {
                break;
            }
            self.offset += 1;
        }
    }

    /// Find the first occurrence of `needle` at or after the current position
    pub fn find_forward(&self, needle: &[u8]) -> Option<usize> {
        let rest = self.data.get(self.offset..)?;
        find_sequence(rest, needle).map(|idx| self.offset + idx)
    }
}

/// Find byte sequence
pub(crate) fn find_sequence(data: &[u8], sequence: &[u8]) -> Option<usize> {
    if sequence.is_empty() || sequence.len() > data.len() {
        return None;
    }
    data.windows(sequence.len()).position(|w| w == sequence)
}

/// Find byte sequence in reverse
pub(crate) fn find_sequence_backwards(data: &[u8], sequence: &[u8]) -> Option<usize> {
    if sequence.is_empty() || sequence.len() > data.len() {
        return None;
    }
    data.windows(sequence.len()).rposition(|w| w == sequence)
}
