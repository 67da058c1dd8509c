//! Serializing a document: full rewrites and incremental updates

use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use byteorder::{BigEndian, ByteOrder};
use log::{debug, info, trace};

use crate::crypto::encrypt_object;
use crate::error::{PDFError, PDFResult};
use super::document::{is_xref_stream, PDFDocument};
use super::objstm::{ObjectStreamBuilder, DEFAULT_MAX_OBJECTS_PER_STREAM};
use super::xref::{EntryState, FieldWidths, MAX_GENERATION};
use super::{Dictionary, Name, ObjectId, PDFObject, PDFString, Stream};

/// Comment after the header marking the file as binary
const BINARY_MARKER: &[u8] = b"%\xE2\xE3\xCF\xD3\n";

/// Options for saving a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterProperties {
    /// Pack eligible objects into object streams and write an xref stream
    pub full_compression: bool,
    /// Objects per object stream
    pub max_objects_per_stream: usize,
    /// Flate-compress streams that carry no filter
    pub compress_streams: bool,
    /// Drop cached values of unmodified objects once written
    pub release_flushed: bool,
    /// Header version; defaults to the document's
    pub version: Option<String>,
}

impl Default for WriterProperties {
    fn default() -> Self {
        Self {
            full_compression: false,
            max_objects_per_stream: DEFAULT_MAX_OBJECTS_PER_STREAM,
            compress_streams: true,
            release_flushed: false,
            version: None,
        }
    }
}

impl WriterProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_full_compression(mut self, full_compression: bool) -> Self {
        self.full_compression = full_compression;
        self
    }

    pub fn with_max_objects_per_stream(mut self, max: usize) -> Self {
        self.max_objects_per_stream = max.max(1);
        self
    }

    pub fn with_compress_streams(mut self, compress: bool) -> Self {
        self.compress_streams = compress;
        self
    }

    pub fn with_release_flushed(mut self, release: bool) -> Self {
        self.release_flushed = release;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

/// Byte counting wrapper; offsets in the xref come from it
struct CountingWriter<W> {
    inner: W,
    count: u64,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Writes the objects of a document and closes the file with an xref section.
///
/// Flushing an object schedules every object it references that still
/// needs writing; the pending set is drained until it is empty, so cyclic
/// graphs terminate.
pub struct PDFWriter<'d, W: Write> {
    doc: &'d mut PDFDocument,
    out: CountingWriter<W>,
    properties: WriterProperties,
    incremental: bool,
    /// Output position of the header
    base: u64,
    /// Generation and location of everything written (or freed) by this writer
    locations: BTreeMap<u32, (u16, EntryState)>,
    pending: BTreeSet<u32>,
    objstm: Option<ObjectStreamBuilder>,
    /// Next number for writer-owned objects (object and xref streams)
    next_number: u32,
}

impl<'d, W: Write> PDFWriter<'d, W> {
    /// Start a complete file
    pub fn new(doc: &'d mut PDFDocument, out: W, properties: WriterProperties) -> PDFResult<Self> {
        let version = properties
            .version
            .clone()
            .unwrap_or_else(|| doc.version().to_string());
        let mut writer = Self::with_output(doc, out, properties, false);
        write!(writer.out, "%PDF-{}\n", version)?;
        writer.out.write_all(BINARY_MARKER)?;
        Ok(writer)
    }

    /// Start an incremental update: the original bytes are copied unchanged
    pub fn incremental(doc: &'d mut PDFDocument, out: W, properties: WriterProperties) -> PDFResult<Self> {
        if doc.source().is_empty() || doc.startxref().is_none() {
            return Err(PDFError::xref(0, "incremental update needs a loaded document"));
        }
        let base = doc.base_offset();
        let mut writer = Self::with_output(doc, out, properties, true);
        writer.base = base;
        writer.out.write_all(writer.doc.source())?;
        if !matches!(writer.doc.source().last(), Some(b'\n') | Some(b'\r')) {
            writer.out.write_all(b"\n")?;
        }
        Ok(writer)
    }

    fn with_output(doc: &'d mut PDFDocument, out: W, properties: WriterProperties, incremental: bool) -> Self {
        let next_number = doc.xref().size();
        Self {
            doc,
            out: CountingWriter { inner: out, count: 0 },
            properties,
            incremental,
            base: 0,
            locations: BTreeMap::new(),
            pending: BTreeSet::new(),
            objstm: None,
            next_number,
        }
    }

    /// Write `id` and everything it reaches that is not written yet
    pub fn flush(&mut self, id: ObjectId) -> PDFResult<()> {
        if self.needs_write(id.number) {
            self.pending.insert(id.number);
        }
        self.run_pending()
    }

    /// Write every object the output must contain.
    ///
    /// A full write covers all objects of the document; an incremental one
    /// only those changed since load.
    pub fn flush_all(&mut self) -> PDFResult<()> {
        let incremental = self.incremental;
        let numbers: Vec<u32> = self
            .doc
            .xref()
            .iter()
            .filter(|(_, e)| {
                if incremental {
                    e.modified && e.value.is_some()
                } else {
                    e.value.is_some() || e.state.has_location()
                }
            })
            .map(|(n, _)| n)
            .collect();
        for number in numbers {
            if !self.locations.contains_key(&number) {
                self.pending.insert(number);
            }
        }
        self.run_pending()
    }

    fn run_pending(&mut self) -> PDFResult<()> {
        while let Some(number) = self.pending.pop_first() {
            if !self.locations.contains_key(&number) {
                self.write_object(number)?;
            }
        }
        Ok(())
    }

    fn needs_write(&self, number: u32) -> bool {
        if self.locations.contains_key(&number) {
            return false;
        }
        match self.doc.xref().get(number) {
            Some(e) if !e.is_free() => {
                if self.incremental {
                    e.modified && e.value.is_some()
                } else {
                    e.value.is_some() || e.state.has_location()
                }
            }
            _ => false,
        }
    }

    fn allocate_number(&mut self) -> u32 {
        let number = self.next_number;
        self.next_number += 1;
        number
    }

    fn write_object(&mut self, number: u32) -> PDFResult<()> {
        self.doc.load_value(number)?;
        let Some(entry) = self.doc.xref().get(number) else { return Ok(()) };
        let id = ObjectId::new(number, entry.generation);
        let Some(value) = entry.value.clone() else { return Ok(()) };

        if !self.incremental && is_structural(&value) {
            // old object and xref streams are replaced, not copied
            trace!("Dropping structural stream {}", id);
            self.locations
                .insert(number, (id.generation.saturating_add(1), EntryState::Free));
            return Ok(());
        }

        let mut references = Vec::new();
        value.collect_references(&mut references);
        for reference in references {
            if self.needs_write(reference.number) {
                self.pending.insert(reference.number);
            }
        }

        let compressible = self.properties.full_compression
            && id.generation == 0
            && !matches!(value, PDFObject::Stream(_))
            && self.doc.encrypt_id() != Some(id);
        if compressible {
            self.add_to_object_stream(id, &value)?;
        } else {
            self.write_direct(id, value)?;
        }

        if self.properties.release_flushed {
            self.doc.release(number);
        }
        Ok(())
    }

    fn add_to_object_stream(&mut self, id: ObjectId, value: &PDFObject) -> PDFResult<()> {
        let capacity = self.properties.max_objects_per_stream;
        let next_number = &mut self.next_number;
        let builder = self.objstm.get_or_insert_with(|| {
            let number = *next_number;
            *next_number += 1;
            ObjectStreamBuilder::new(number, capacity)
        });
        let index = builder.add(id.number, value);
        let stream = builder.number();
        let full = builder.is_full();
        self.locations
            .insert(id.number, (0, EntryState::Compressed { stream, index }));

        if full {
            self.close_object_stream()?;
        }
        Ok(())
    }

    fn close_object_stream(&mut self) -> PDFResult<()> {
        let Some(builder) = self.objstm.take() else { return Ok(()) };
        if builder.is_empty() {
            return Ok(());
        }
        let id = ObjectId::new(builder.number(), 0);
        let mut object = PDFObject::Stream(builder.finish()?);
        if let Some(crypt) = self.doc.encryption_mut() {
            encrypt_object(&mut object, crypt, id)?;
        }
        self.write_indirect(id, &object)
    }

    fn write_direct(&mut self, id: ObjectId, mut value: PDFObject) -> PDFResult<()> {
        if self.properties.compress_streams {
            if let PDFObject::Stream(stream) = &mut value {
                stream.compress()?;
            }
        }
        let skip_encryption = self.doc.encrypt_id() == Some(id) || is_xref_stream(&value);
        if !skip_encryption {
            if let Some(crypt) = self.doc.encryption_mut() {
                encrypt_object(&mut value, crypt, id)?;
            }
        }
        self.write_indirect(id, &value)
    }

    fn write_indirect(&mut self, id: ObjectId, value: &PDFObject) -> PDFResult<()> {
        let offset = self.out.count - self.base;
        let mut buffer = Vec::new();
        write!(buffer, "{} {} obj\n", id.number, id.generation)?;
        value.write_to(&mut buffer);
        buffer.extend_from_slice(b"\nendobj\n");
        self.out.write_all(&buffer)?;
        trace!("Wrote {} at {}", id, offset);
        self.locations
            .insert(id.number, (id.generation, EntryState::Offset(offset)));
        Ok(())
    }

    /// Close the pending object stream, write the xref section and trailer
    /// and return the underlying writer.
    pub fn finalize(mut self) -> PDFResult<W> {
        self.run_pending()?;
        self.close_object_stream()?;

        if self.incremental {
            let freed: Vec<(u32, u16)> = self
                .doc
                .xref()
                .iter_loaded()
                .filter(|(_, e)| e.is_free() && e.modified)
                .map(|(n, e)| (n, e.generation))
                .collect();
            for (number, generation) in freed {
                self.locations
                    .entry(number)
                    .or_insert((generation, EntryState::Free));
            }
        }

        let use_stream = self.properties.full_compression
            || (self.incremental && self.doc.newest_xref_is_stream());
        let xref_number = if use_stream { Some(self.allocate_number()) } else { None };
        let size = self.next_number.max(self.doc.xref().size());
        let startxref = self.out.count - self.base;

        let mut records = self.collect_records(size);
        if let Some(number) = xref_number {
            records.insert(number, (0, EntryState::Offset(startxref)));
        }
        let records = link_free_entries(records);
        let trailer = self.build_trailer(size, startxref);

        match xref_number {
            Some(number) => self.write_xref_stream(number, trailer, &records)?,
            None => self.write_xref_table(trailer, &records)?,
        }
        write!(self.out, "startxref\n{}\n%%EOF\n", startxref)?;
        self.out.flush()?;

        info!(
            "Wrote {} objects, xref {} at {}",
            self.locations.len(),
            if use_stream { "stream" } else { "table" },
            startxref
        );
        Ok(self.out.inner)
    }

    fn collect_records(&self, size: u32) -> BTreeMap<u32, (u16, EntryState)> {
        if self.incremental {
            let mut records = self.locations.clone();
            if records.values().any(|(_, state)| state.is_free()) {
                records.insert(0, (MAX_GENERATION, EntryState::Free));
            }
            return records;
        }

        let mut records = BTreeMap::new();
        records.insert(0, (MAX_GENERATION, EntryState::Free));
        for number in 1..size {
            let record = match self.locations.get(&number) {
                Some(record) => *record,
                None => {
                    let generation = self
                        .doc
                        .xref()
                        .get(number)
                        .filter(|e| e.is_free())
                        .map_or(0, |e| e.generation);
                    (generation, EntryState::Free)
                }
            };
            records.insert(number, record);
        }
        records
    }

    fn build_trailer(&self, size: u32, startxref: u64) -> Dictionary {
        let source = self.doc.trailer();
        let mut trailer = Dictionary::new();
        trailer.set("Size", size);
        for key in ["Root", "Info", "Encrypt"] {
            if let Some(value) = source.get(key) {
                trailer.set(key, value.clone());
            }
        }

        let mut context = md5::Context::new();
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_nanos());
        context.consume(now.to_le_bytes());
        context.consume(size.to_le_bytes());
        context.consume(startxref.to_le_bytes());
        context.consume(self.doc.version().as_bytes());
        let fresh = PDFObject::String(PDFString::new_hex(context.finalize().0.to_vec()));
        let id = match source.get_array("ID") {
            Some(ids) if ids.len() == 2 && !self.incremental => ids.clone(),
            Some(ids) if ids.len() == 2 => vec![ids[0].clone(), fresh],
            _ => vec![fresh.clone(), fresh],
        };
        trailer.set("ID", id);

        if self.incremental {
            if let Some(prev) = self.doc.startxref() {
                trailer.set("Prev", prev as i64);
            }
        }
        trailer
    }

    fn write_xref_table(&mut self, trailer: Dictionary, records: &[(u32, u16, Record)]) -> PDFResult<()> {
        let mut buffer = b"xref\n".to_vec();
        let mut rest = records;
        for (start, count) in subsections(records.iter().map(|r| r.0)) {
            write!(buffer, "{} {}\n", start, count)?;
            let (section, tail) = rest.split_at(count as usize);
            rest = tail;
            for (_, generation, record) in section {
                match record {
                    Record::InUse(offset) => write!(buffer, "{:010} {:05} n \n", offset, generation)?,
                    Record::Free(next) => write!(buffer, "{:010} {:05} f \n", next, generation)?,
                    Record::Compressed { .. } => {
                        return Err(PDFError::xref(0, "compressed entry in a classic xref table"))
                    }
                }
            }
        }
        buffer.extend_from_slice(b"trailer\n");
        trailer.write_to(&mut buffer);
        buffer.push(b'\n');
        self.out.write_all(&buffer)?;
        debug!("Classic xref table with {} entries", records.len());
        Ok(())
    }

    fn write_xref_stream(&mut self, number: u32, mut dict: Dictionary, records: &[(u32, u16, Record)]) -> PDFResult<()> {
        let max_field2 = records
            .iter()
            .map(|(_, _, r)| match r {
                Record::InUse(offset) | Record::Free(offset) => *offset,
                Record::Compressed { stream, .. } => u64::from(*stream),
            })
            .max()
            .unwrap_or(0);
        let max_field3 = records
            .iter()
            .map(|(_, generation, r)| match r {
                Record::Compressed { index, .. } => *index,
                _ => u32::from(*generation),
            })
            .max()
            .unwrap_or(0);
        let widths = FieldWidths {
            kind: 1,
            field2: if max_field2 > u64::from(u32::MAX) { 8 } else { 4 },
            field3: if max_field3 > 0xFFFF { 4 } else { 2 },
        };

        let mut data = Vec::with_capacity(records.len() * widths.record_len());
        let mut field = [0u8; 8];
        for (_, generation, record) in records {
            let (kind, field2, field3) = match record {
                Record::Free(next) => (0, *next, u64::from(*generation)),
                Record::InUse(offset) => (1, *offset, u64::from(*generation)),
                Record::Compressed { stream, index } => (2, u64::from(*stream), u64::from(*index)),
            };
            data.push(kind);
            BigEndian::write_uint(&mut field[..widths.field2], field2, widths.field2);
            data.extend_from_slice(&field[..widths.field2]);
            BigEndian::write_uint(&mut field[..widths.field3], field3, widths.field3);
            data.extend_from_slice(&field[..widths.field3]);
        }

        let index: Vec<PDFObject> = subsections(records.iter().map(|r| r.0))
            .into_iter()
            .flat_map(|(start, count)| [PDFObject::from(start), PDFObject::from(count)])
            .collect();
        dict.set("Type", Name::from("XRef"));
        dict.set("W", widths.to_array());
        dict.set("Index", index);

        let mut stream = Stream::new(dict, data);
        stream.compress()?;
        debug!("xref stream {} with {} entries", number, records.len());
        self.write_indirect(ObjectId::new(number, 0), &PDFObject::Stream(stream))
    }
}

/// One line of the output xref
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Record {
    /// Next free number in the list
    Free(u64),
    InUse(u64),
    Compressed { stream: u32, index: u32 },
}

/// Chain free entries into the list `0 -> first free -> ... -> 0`
fn link_free_entries(records: BTreeMap<u32, (u16, EntryState)>) -> Vec<(u32, u16, Record)> {
    let free: Vec<u32> = records
        .iter()
        .filter(|(_, (_, state))| state.is_free())
        .map(|(&n, _)| n)
        .collect();

    records
        .into_iter()
        .map(|(number, (generation, state))| {
            let record = match state {
                EntryState::Offset(offset) => Record::InUse(offset),
                EntryState::Compressed { stream, index } => Record::Compressed { stream, index },
                EntryState::Free | EntryState::Pending => {
                    let next = free
                        .get(free.partition_point(|&n| n <= number))
                        .copied()
                        .unwrap_or(0);
                    Record::Free(u64::from(next))
                }
            };
            (number, generation, record)
        })
        .collect()
}

/// Runs of consecutive numbers as `(start, count)`
fn subsections(numbers: impl Iterator<Item = u32>) -> Vec<(u32, u32)> {
    let mut runs: Vec<(u32, u32)> = Vec::new();
    for number in numbers {
        match runs.last_mut() {
            Some((start, count)) if *start + *count == number => *count += 1,
            _ => runs.push((number, 1)),
        }
    }
    runs
}

fn is_structural(object: &PDFObject) -> bool {
    match object {
        PDFObject::Stream(s) => s.dict().has_name("Type", "ObjStm") || s.dict().has_name("Type", "XRef"),
        _ => false,
    }
}
