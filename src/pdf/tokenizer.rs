//! Lexical layer over a random-access byte source

use log::{trace, warn};

use crate::error::{PDFError, PDFResult};
use super::object::PDFNumber;
use super::source::ByteSource;

/// PDF whitespace: NUL, TAB, LF, FF, CR, SPACE
#[inline]
/// NUL, TAB, LF, FF, CR and SPACE
pub fn is_whitespace(b: u8) -> bool {
    matches!(b, 0 | 9 | 10 | 12 | 13 | 32)
}

/// PDF delimiter characters
#[inline]
/// Check for `()<>[]{}/%`
pub fn is_delimiter(b: u8) -> bool {
    matches!(b, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}

/// Anything that is neither whitespace nor a delimiter
#[inline]
pub fn is_regular(b: u8) -> bool {
    !is_whitespace(b) && !is_delimiter(b)
}

/// Syntactic token kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Number,
    /// Literal `( )` or hexadecimal `< >` string
    String { hex: bool },
    Name,
    StartArray,
    EndArray,
    StartDict,
    EndDict,
    /// `N G R`
    Ref,
    /// `N G obj`
    Obj,
    EndObj,
    Comment,
    /// Bare keyword such as `stream`, `null`, `true`, `xref`
    Other,
    EndOfFile,
}

/// One syntactic token.
///
/// `bytes` borrows the raw token text without its delimiters: the inside of
/// a string, the name after `/`, the comment after `%`.
#[derive(Debug, Clone, PartialEq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub bytes: &'a [u8],
    /// Position of the token's first byte
    pub offset: u64,
    /// Numeric value for `Number` tokens
    pub number: Option<PDFNumber>,
    /// Object number and generation for `Ref` and `Obj` tokens
    pub reference: Option<(u32, u16)>,
}

impl<'a> Token<'a> {
    fn new(kind: TokenKind, bytes: &'a [u8], offset: usize) -> Self {
        Self {
            kind,
            bytes,
            offset: offset as u64,
            number: None,
            reference: None,
        }
    }

    /// Whether this is a bare keyword equal to `keyword`
    pub fn is_keyword(&self, keyword: &[u8]) -> bool {
        matches!(self.kind, TokenKind::Other | TokenKind::EndObj) && self.bytes == keyword
    }

    /// Integer value of a `Number` token, if it is an integer
    pub fn as_integer(&self) -> Option<i64> {
        match self.number {
            Some(PDFNumber::Integer(i)) => Some(i),
            _ => None,
        }
    }

    fn as_object_number(&self) -> Option<u32> {
        self.as_integer().and_then(|i| u32::try_from(i).ok())
    }
}

/// Tokenizer producing one token per call
#[derive(Debug, Clone)]
pub struct Tokenizer<'a> {
    source: ByteSource<'a>,
}

impl<'a> Tokenizer<'a> {
    /// Create new tokenizer at the start of `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            source: ByteSource::new(data),
        }
    }

    /// Create new tokenizer at `offset`
    pub fn new_at(data: &'a [u8], offset: usize) -> Self {
        Self {
            source: ByteSource::new_at(data, offset),
        }
    }

    /// Current position
    pub fn position(&self) -> usize {
        self.source.position()
    }

    /// Move to an absolute position
    pub fn seek(&mut self, offset: usize) {
        self.source.seek(offset);
    }

    /// Underlying data
    pub fn data(&self) -> &'a [u8] {
        self.source.data()
    }

    /// Mutable access to the byte source, for raw stream payload reads
    pub fn source_mut(&mut self) -> &mut ByteSource<'a> {
        &mut self.source
    }

    fn eof(&self) -> PDFError {
        PDFError::UnexpectedEof {
            offset: self.source.position() as u64,
        }
    }

    /// Skip whitespace
    pub fn skip_whitespace(&mut self) {
        self.source.skip_while(is_whitespace);
    }

    /// Read the next token
    pub fn next_token(&mut self) -> PDFResult<Token<'a>> {
        self.skip_whitespace();
        let start = self.source.position();
        let data = self.source.data();

        let b = match self.source.read_byte() {
            Some(b) => b,
            None => return Ok(Token::new(TokenKind::EndOfFile, &[], start)),
        };

        match b {
            b'[' => Ok(Token::new(TokenKind::StartArray, &data[start..start + 1], start)),
            b']' => Ok(Token::new(TokenKind::EndArray, &data[start..start + 1], start)),
            b'{' | b'}' => Ok(Token::new(TokenKind::Other, &data[start..start + 1], start)),
            b'<' => {
                if self.source.peek() == Some(b'<') {
                    self.source.read_byte();
                    return Ok(Token::new(TokenKind::StartDict, &data[start..start + 2], start));
                }
                self.read_hex_string(start)
            }
            b'>' => {
                if self.source.peek() == Some(b'>') {
                    self.source.read_byte();
                    Ok(Token::new(TokenKind::EndDict, &data[start..start + 2], start))
                } else {
                    Err(PDFError::syntax(start as u64, "unmatched '>'"))
                }
            }
            b'(' => self.read_literal_string(start),
            b')' => Err(PDFError::syntax(start as u64, "unbalanced ')'")),
            b'/' => {
                self.source.skip_while(is_regular);
                let end = self.source.position();
                Ok(Token::new(TokenKind::Name, &data[start + 1..end], start))
            }
            b'%' => {
                self.source.skip_while(|b| b != b'\r' && b != b'\n');
                let end = self.source.position();
                Ok(Token::new(TokenKind::Comment, &data[start + 1..end], start))
            }
            b'0'..=b'9' | b'+' | b'-' | b'.' => {
                self.source.skip_while(is_regular);
                let end = self.source.position();
                let raw = &data[start..end];
                let mut token = Token::new(TokenKind::Number, raw, start);
                token.number = Some(parse_number(raw, start));
                Ok(token)
            }
            _ => {
                self.source.skip_while(is_regular);
                let end = self.source.position();
                Ok(Token::new(TokenKind::Other, &data[start..end], start))
            }
        }
    }

    fn read_hex_string(&mut self, start: usize) -> PDFResult<Token<'a>> {
        let content_start = self.source.position();
        loop {
            let pos = self.source.position();
            match self.source.read_byte() {
                Some(b'>') => {
                    let bytes = &self.source.data()[content_start..pos];
                    return Ok(Token::new(TokenKind::String { hex: true }, bytes, start));
                }
                Some(b) if b.is_ascii_hexdigit() || is_whitespace(b) => {}
                Some(b) => {
                    return Err(PDFError::syntax(
                        pos as u64,
                        format!("invalid character 0x{:02x} in hex string", b),
                    ))
                }
                None => return Err(self.eof()),
            }
        }
    }

    fn read_literal_string(&mut self, start: usize) -> PDFResult<Token<'a>> {
        let content_start = self.source.position();
        let mut depth = 1usize;
        loop {
            let pos = self.source.position();
            match self.source.read_byte() {
                Some(b'\\') => {
                    // escaped byte is passed through untouched
                    if self.source.read_byte().is_none() {
                        return Err(self.eof());
                    }
                }
                Some(b'(') => depth += 1,
                Some(b')') => {
                    depth -= 1;
                    if depth == 0 {
                        let bytes = &self.source.data()[content_start..pos];
                        return Ok(Token::new(TokenKind::String { hex: false }, bytes, start));
                    }
                }
                Some(_) => {}
                None => return Err(self.eof()),
            }
        }
    }

    /// Next token that is not a comment
    fn next_non_comment(&mut self) -> PDFResult<Token<'a>> {
        loop {
            let token = self.next_token()?;
            if token.kind != TokenKind::Comment {
                return Ok(token);
            }
        }
    }

    /// Next token, skipping comments and folding `N G R` / `N G obj` into a
    /// single `Ref` / `Obj` token.
    ///
    /// When the lookahead does not match either pattern the tokenizer is
    /// moved back so the tokens after the first number are read again.
    pub fn next_meaningful_token(&mut self) -> PDFResult<Token<'a>> {
        let first = self.next_non_comment()?;

        if first.is_keyword(b"endobj") {
            let mut token = first;
            token.kind = TokenKind::EndObj;
            return Ok(token);
        }

        let number = match first.as_object_number() {
            Some(n) if first.kind == TokenKind::Number => n,
            _ => return Ok(first),
        };

        let rewind = self.source.position();
        let second = self.next_non_comment()?;
        let generation = match second.as_integer().and_then(|g| u16::try_from(g).ok()) {
            Some(g) if second.kind == TokenKind::Number => g,
            _ => {
                self.source.seek(rewind);
                return Ok(first);
            }
        };

        let third = self.next_non_comment()?;
        let kind = if third.is_keyword(b"R") {
            TokenKind::Ref
        } else if third.is_keyword(b"obj") {
            TokenKind::Obj
        } else {
            self.source.seek(rewind);
            return Ok(first);
        };

        let start = first.offset as usize;
        let end = third.offset as usize + third.bytes.len();
        let mut token = Token::new(kind, &self.source.data()[start..end], start);
        token.reference = Some((number, generation));
        trace!("{:?} {} {} at {}", kind, number, generation, start);
        Ok(token)
    }
}

/// Parse the numeric value of a number token.
///
/// A run of leading minus signs collapses to one sign: an odd count is
/// negative. Trailing garbage after the numeric prefix is ignored.
fn parse_number(raw: &[u8], offset: usize) -> PDFNumber {
    let mut i = 0;
    let mut negative = false;

    let minus_run = raw.iter().take_while(|&&b| b == b'-').count();
    if minus_run > 0 {
        negative = minus_run % 2 == 1;
        i = minus_run;
    } else if raw.first() == Some(&b'+') {
        i = 1;
    }

    let digits_start = i;
    let mut seen_dot = false;
    while i < raw.len() {
        match raw[i] {
            b'0'..=b'9' => {}
            b'.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        i += 1;
    }

    if i < raw.len() {
        warn!("ignoring trailing characters in number at byte {}", offset);
    }

    // always ASCII at this point
    let text = std::str::from_utf8(&raw[digits_start..i]).unwrap_or("");

    if seen_dot {
        let text = if text == "." { "0" } else { text };
        let value = text.parse::<f64>().unwrap_or(0.0);
        PDFNumber::Real(if negative { -value } else { value })
    } else if text.is_empty() {
        PDFNumber::Integer(0)
    } else {
        match text.parse::<i64>() {
            Ok(value) => PDFNumber::Integer(if negative { -value } else { value }),
            Err(_) => {
                let value = text.parse::<f64>().unwrap_or(0.0);
                PDFNumber::Real(if negative { -value } else { value })
            }
        }
    }
}
