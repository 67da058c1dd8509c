//! Object parser: turns tokens into [`PDFObject`] values

use log::{trace, warn};

use crate::error::{PDFError, PDFResult};
use super::source::ByteSource;
use super::tokenizer::{is_whitespace, Token, TokenKind, Tokenizer};
use super::xref::{EntryState, XRefTable};
use super::{Dictionary, Name, ObjectId, PDFObject, PDFString, Stream};

const ENDSTREAM: &[u8] = b"endstream";

/// Parser over a byte buffer.
///
/// References met while parsing are registered in `xref` (creating stub
/// entries for numbers not indexed yet), which keeps one slot per object
/// number for the whole document.
pub struct ObjectParser<'a, 'x> {
    tokenizer: Tokenizer<'a>,
    xref: &'x mut XRefTable,
    /// Position of the header in `data`; xref offsets are relative to it
    base_offset: u64,
}

impl<'a, 'x> ObjectParser<'a, 'x> {
    /// Create new parser at the start of `data`
    pub fn new(data: &'a [u8], xref: &'x mut XRefTable) -> Self {
        Self::new_at(data, 0, xref)
    }

    /// Create new parser at `position`
    pub fn new_at(data: &'a [u8], position: usize, xref: &'x mut XRefTable) -> Self {
        Self {
            tokenizer: Tokenizer::new_at(data, position),
            xref,
            base_offset: 0,
        }
    }

    /// Offset added to xref offsets when resolving an indirect `Length`
    pub fn with_base_offset(mut self, base_offset: u64) -> Self {
        self.base_offset = base_offset;
        self
    }

    pub fn tokenizer(&mut self) -> &mut Tokenizer<'a> {
        &mut self.tokenizer
    }

    /// Current position
    pub fn position(&self) -> usize {
        self.tokenizer.position()
    }

    pub fn seek(&mut self, position: usize) {
        self.tokenizer.seek(position);
    }

    /// Read one object
    pub fn read_object(&mut self) -> PDFResult<PDFObject> {
        let token = self.tokenizer.next_meaningful_token()?;
        self.parse_value(token)
    }

    /// Read `N G obj <value> endobj`, checking the header against `expected`
    pub fn read_indirect_object(&mut self, expected: Option<ObjectId>) -> PDFResult<(ObjectId, PDFObject)> {
        let header = self.tokenizer.next_meaningful_token()?;
        let id = match (header.kind, header.reference) {
            (TokenKind::Obj, Some((number, generation))) => ObjectId::new(number, generation),
            _ => {
                return match expected {
                    Some(expected) => Err(PDFError::ObjectHeaderMismatch {
                        offset: header.offset,
                        expected,
                        found: String::from_utf8_lossy(header.bytes).into_owned(),
                    }),
                    None => Err(PDFError::syntax(header.offset, "expected object header")),
                };
            }
        };
        if let Some(expected) = expected {
            if expected != id {
                return Err(PDFError::ObjectHeaderMismatch {
                    offset: header.offset,
                    expected,
                    found: String::from_utf8_lossy(header.bytes).into_owned(),
                });
            }
        }

        let value = self.read_object()?;

        let position = self.tokenizer.position();
        let end = self.tokenizer.next_meaningful_token()?;
        if end.kind != TokenKind::EndObj {
            warn!("Missing endobj for {} at byte {}", id, end.offset);
            self.tokenizer.seek(position);
        }
        Ok((id, value))
    }

    fn parse_value(&mut self, token: Token<'a>) -> PDFResult<PDFObject> {
        match token.kind {
            TokenKind::Number => match token.number {
                Some(n) => Ok(PDFObject::Number(n)),
                None => Err(PDFError::syntax(token.offset, "invalid number")),
            },
            TokenKind::String { hex: false } => {
                Ok(PDFObject::String(PDFString::from_literal_raw(token.bytes)))
            }
            TokenKind::String { hex: true } => {
                Ok(PDFObject::String(PDFString::from_hex_raw(token.bytes, token.offset)?))
            }
            TokenKind::Name => Ok(PDFObject::Name(Name::from_raw(token.bytes))),
            TokenKind::StartArray => self.parse_array(),
            TokenKind::StartDict => self.parse_dictionary_or_stream(),
            TokenKind::Ref => {
                let (number, generation) = token
                    .reference
                    .ok_or_else(|| PDFError::syntax(token.offset, "invalid reference"))?;
                Ok(PDFObject::Reference(self.xref.stub(number, generation)?))
            }
            TokenKind::Other => match token.bytes {
                b"null" => Ok(PDFObject::Null),
                b"true" => Ok(PDFObject::Boolean(true)),
                b"false" => Ok(PDFObject::Boolean(false)),
                other => Err(PDFError::syntax(
                    token.offset,
                    format!("unexpected keyword '{}'", String::from_utf8_lossy(other)),
                )),
            },
            TokenKind::EndOfFile => Err(PDFError::UnexpectedEof { offset: token.offset }),
            TokenKind::EndArray
            | TokenKind::EndDict
            | TokenKind::Obj
            | TokenKind::EndObj
            | TokenKind::Comment => Err(PDFError::syntax(
                token.offset,
                format!("unexpected '{}'", String::from_utf8_lossy(token.bytes)),
            )),
        }
    }

    fn parse_array(&mut self) -> PDFResult<PDFObject> {
        let mut items = Vec::new();
        loop {
            let token = self.tokenizer.next_meaningful_token()?;
            if token.kind == TokenKind::EndArray {
                return Ok(PDFObject::Array(items));
            }
            items.push(self.parse_value(token)?);
        }
    }

    fn parse_dictionary(&mut self) -> PDFResult<Dictionary> {
        let mut dict = Dictionary::new();
        loop {
            let token = self.tokenizer.next_meaningful_token()?;
            match token.kind {
                TokenKind::EndDict => return Ok(dict),
                TokenKind::Name => {
                    let key = Name::from_raw(token.bytes);
                    let value = self.read_object()?;
                    dict.insert(key, value);
                }
                TokenKind::EndOfFile => {
                    return Err(PDFError::UnexpectedEof { offset: token.offset })
                }
                _ => {
                    return Err(PDFError::syntax(
                        token.offset,
                        format!(
                            "dictionary key must be a name, found '{}'",
                            String::from_utf8_lossy(token.bytes)
                        ),
                    ))
                }
            }
        }
    }

    fn parse_dictionary_or_stream(&mut self) -> PDFResult<PDFObject> {
        let dict = self.parse_dictionary()?;

        let position = self.tokenizer.position();
        if self.next_is_stream_keyword() {
            return self.read_stream(dict).map(PDFObject::Stream);
        }
        self.tokenizer.seek(position);
        Ok(PDFObject::Dictionary(dict))
    }

    fn next_is_stream_keyword(&mut self) -> bool {
        loop {
            match self.tokenizer.next_token() {
                Ok(token) if token.kind == TokenKind::Comment => continue,
                Ok(token) => return token.is_keyword(b"stream"),
                Err(_) => return false,
            }
        }
    }

    /// Read a stream payload; the tokenizer sits right after `stream`
    fn read_stream(&mut self, dict: Dictionary) -> PDFResult<Stream> {
        let data = self.tokenizer.data();
        let source = self.tokenizer.source_mut();

        // exactly one end-of-line marker separates the keyword from the data
        source.skip_while(|b| b == b' ' || b == b'\t');
        match source.peek() {
            Some(b'\r') => {
                source.read_byte();
                if source.peek() == Some(b'\n') {
                    source.read_byte();
                }
            }
            Some(b'\n') => {
                source.read_byte();
            }
            _ => {}
        }
        let start = source.position();

        let declared = self.declared_length(&dict);
        let source = self.tokenizer.source_mut();
        if let Some(length) = declared {
            if let Some(end) = start.checked_add(length).filter(|&end| end <= data.len()) {
                if ends_with_endstream(data, end) {
                    source.seek(end);
                    source.skip_while(is_whitespace);
                    source.read_bytes(ENDSTREAM.len());
                    trace!("Stream of {} bytes at {}", length, start);
                    return Ok(Stream::new(dict, data[start..end].to_vec()));
                }
            }
            warn!(
                "Stream at byte {} is not followed by endstream after its declared length {}",
                start, length
            );
        }

        // recover by scanning for the keyword
        let found = source
            .find_forward(ENDSTREAM)
            .ok_or(PDFError::UnexpectedEof { offset: data.len() as u64 })?;
        let mut end = found;
        if end > start && data[end - 1] == b'\n' {
            end -= 1;
        }
        if end > start && data[end - 1] == b'\r' {
            end -= 1;
        }
        source.seek(found + ENDSTREAM.len());
        trace!("Recovered stream of {} bytes at {}", end - start, start);
        Ok(Stream::new(dict, data[start..end].to_vec()))
    }

    fn declared_length(&mut self, dict: &Dictionary) -> Option<usize> {
        let length = match dict.get("Length")? {
            PDFObject::Number(n) => n.as_i64()?,
            PDFObject::Reference(id) => self.read_indirect_length(*id)?,
            _ => return None,
        };
        usize::try_from(length).ok()
    }

    /// Read an integer object straight from the source without caching it
    fn read_indirect_length(&mut self, id: ObjectId) -> Option<i64> {
        let entry = self.xref.get(id.number)?;
        if let Some(value) = &entry.value {
            return value.as_i64().ok();
        }
        let offset = match entry.state {
            EntryState::Offset(offset) => offset.checked_add(self.base_offset)?,
            _ => return None,
        };
        let data = self.tokenizer.data();
        let mut tokenizer = Tokenizer::new_at(data, usize::try_from(offset).ok()?);
        let header = tokenizer.next_meaningful_token().ok()?;
        if header.kind != TokenKind::Obj || header.reference != Some((id.number, id.generation)) {
            return None;
        }
        tokenizer.next_meaningful_token().ok()?.as_integer()
    }
}

fn ends_with_endstream(data: &[u8], end: usize) -> bool {
    let mut source = ByteSource::new_at(data, end);
    source.skip_while(is_whitespace);
    source.peek_tag(ENDSTREAM)
}

/// Parse a single object from `data`, registering references in `xref`
pub fn parse_object(data: &[u8], xref: &mut XRefTable) -> PDFResult<PDFObject> {
    ObjectParser::new(data, xref).read_object()
}
