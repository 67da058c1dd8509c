//! Object streams: reading packed objects and building new streams

use std::io::Write;

use log::{debug, trace};

use crate::error::{PDFError, PDFResult};
use super::parser::ObjectParser;
use super::tokenizer::Tokenizer;
use super::xref::XRefTable;
use super::{Dictionary, Name, PDFObject, Stream};

/// Default number of objects packed into one object stream
pub const DEFAULT_MAX_OBJECTS_PER_STREAM: usize = 200;

/// Decoded object stream with its header parsed
#[derive(Debug, Clone)]
pub struct ObjectStreamIndex {
    data: Vec<u8>,
    /// `(object number, offset from First)` per index
    entries: Vec<(u32, usize)>,
    first: usize,
}

impl ObjectStreamIndex {
    /// Decode an object stream and read its `N` header pairs
    pub fn parse(stream: &Stream) -> PDFResult<Self> {
        let dict = stream.dict();
        if !dict.has_name("Type", "ObjStm") {
            debug!("Object stream without /Type /ObjStm");
        }
        let count = dict
            .get_integer("N")
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| PDFError::invalid_dict_value("N", "missing or negative"))?;
        let first = dict
            .get_integer("First")
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| PDFError::invalid_dict_value("First", "missing or negative"))?;

        let data = stream.decoded()?;
        if first > data.len() {
            return Err(PDFError::Stream(format!(
                "object stream First {} beyond decoded length {}",
                first,
                data.len()
            )));
        }

        let mut tokenizer = Tokenizer::new(&data[..first]);
        // each header pair takes at least two bytes
        let mut entries = Vec::with_capacity(count.min(first / 2));
        for _ in 0..count {
            let number = tokenizer.next_token()?;
            let offset = tokenizer.next_token()?;
            match (
                number.as_integer().and_then(|n| u32::try_from(n).ok()),
                offset.as_integer().and_then(|n| usize::try_from(n).ok()),
            ) {
                (Some(n), Some(o)) => entries.push((n, o)),
                _ => {
                    return Err(PDFError::Stream(format!(
                        "invalid object stream header at byte {}",
                        number.offset
                    )))
                }
            }
        }
        trace!("Object stream with {} objects", entries.len());

        Ok(Self { data, entries, first })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Object number stored at `index`
    pub fn object_number(&self, index: u32) -> Option<u32> {
        self.entries.get(index as usize).map(|&(n, _)| n)
    }

    /// Parse the object at `index`, which must hold object `number`
    pub fn read_object(&self, index: u32, number: u32, xref: &mut XRefTable) -> PDFResult<PDFObject> {
        let &(stored, offset) = self
            .entries
            .get(index as usize)
            .ok_or_else(|| PDFError::InconsistentXRef {
                number,
                message: format!("object stream has no index {}", index),
            })?;
        if stored != number {
            return Err(PDFError::InconsistentXRef {
                number,
                message: format!("object stream index {} holds object {}", index, stored),
            });
        }
        let position = self.first.saturating_add(offset);
        if position > self.data.len() {
            return Err(PDFError::UnexpectedEof {
                offset: position as u64,
            });
        }
        ObjectParser::new_at(&self.data, position, xref).read_object()
    }
}

/// Collects objects for one object stream
#[derive(Debug)]
pub struct ObjectStreamBuilder {
    number: u32,
    capacity: usize,
    header: Vec<u8>,
    body: Vec<u8>,
    count: usize,
}

impl ObjectStreamBuilder {
    /// Builder for object stream `number` holding at most `capacity` objects
    pub fn new(number: u32, capacity: usize) -> Self {
        Self {
            number,
            capacity: capacity.max(1),
            header: Vec::new(),
            body: Vec::new(),
            count: 0,
        }
    }

    /// Object number of the stream being built
    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Check if the stream reached its capacity
    pub fn is_full(&self) -> bool {
        self.count >= self.capacity
    }

    /// Append an object and return its index within the stream
    pub fn add(&mut self, number: u32, object: &PDFObject) -> u32 {
        let index = self.count as u32;
        let _ = write!(self.header, "{} {} ", number, self.body.len());
        object.write_to(&mut self.body);
        self.body.push(b'\n');
        self.count += 1;
        index
    }

    /// Compressed `ObjStm` stream holding the collected objects
    pub fn finish(self) -> PDFResult<Stream> {
        let mut dict = Dictionary::new();
        dict.set("Type", Name::from("ObjStm"));
        dict.set("N", self.count);
        dict.set("First", self.header.len());

        let mut data = self.header;
        data.extend_from_slice(&self.body);
        let mut stream = Stream::new(dict, data);
        stream.compress()?;
        debug!("Object stream {} packed {} objects", self.number, self.count);
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::ObjectId;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_builder_then_index() {
        let mut builder = ObjectStreamBuilder::new(10, 3);
        let mut dict = Dictionary::new();
        dict.set("Parent", ObjectId::new(2, 0));
        assert_eq!(builder.add(4, &PDFObject::from(dict.clone())), 0);
        assert_eq!(builder.add(5, &PDFObject::string(&b"five"[..])), 1);
        assert!(!builder.is_full());
        assert_eq!(builder.add(6, &PDFObject::from(vec![PDFObject::Null])), 2);
        assert!(builder.is_full());

        let stream = builder.finish().unwrap();
        assert!(stream.dict().has_name("Type", "ObjStm"));
        assert!(stream.dict().has_name("Filter", "FlateDecode"));
        assert_eq!(stream.dict().get_integer("N"), Some(3));

        let index = ObjectStreamIndex::parse(&stream).unwrap();
        let mut xref = XRefTable::new();
        assert_eq!(index.len(), 3);
        assert_eq!(index.object_number(1), Some(5));
        assert_eq!(index.read_object(0, 4, &mut xref).unwrap(), PDFObject::from(dict));
        assert_eq!(
            index.read_object(1, 5, &mut xref).unwrap(),
            PDFObject::string(&b"five"[..])
        );
        assert!(xref.get(2).is_some());
    }

    #[test]
    fn test_wrong_number_at_index() {
        let mut builder = ObjectStreamBuilder::new(10, 200);
        builder.add(4, &PDFObject::Null);
        let index = ObjectStreamIndex::parse(&builder.finish().unwrap()).unwrap();
        let mut xref = XRefTable::new();
        assert!(matches!(
            index.read_object(0, 9, &mut xref),
            Err(PDFError::InconsistentXRef { number: 9, .. })
        ));
        assert!(index.read_object(3, 4, &mut xref).is_err());
    }

    #[test]
    fn test_plain_object_stream() {
        let mut dict = Dictionary::new();
        dict.set("Type", Name::from("ObjStm"));
        dict.set("N", 2i64);
        dict.set("First", 9i64);
        let stream = Stream::new(dict, b"1 0 2 2  7 (ab)".to_vec());
        let index = ObjectStreamIndex::parse(&stream).unwrap();
        let mut xref = XRefTable::new();
        assert_eq!(index.read_object(0, 1, &mut xref).unwrap(), PDFObject::from(7i64));
        assert_eq!(index.read_object(1, 2, &mut xref).unwrap(), PDFObject::string(&b"ab"[..]));
    }

    #[test]
    fn test_oversized_count_is_an_error() {
        let mut dict = Dictionary::new();
        dict.set("Type", Name::from("ObjStm"));
        dict.set("N", 1i64 << 62);
        dict.set("First", 4i64);
        let stream = Stream::new(dict, b"1 0 null".to_vec());
        assert!(matches!(ObjectStreamIndex::parse(&stream), Err(PDFError::Stream(_))));

        let mut dict = Dictionary::new();
        dict.set("N", 1i64 << 62);
        dict.set("First", 0i64);
        assert!(ObjectStreamIndex::parse(&Stream::new(dict, Vec::new())).is_err());
    }
}
