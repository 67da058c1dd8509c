//! PDF cross-reference table implementation
//!
//! The table is an arena indexed by object number. Every indirect object of a
//! document lives in exactly one slot; references elsewhere in the graph are
//! plain [`ObjectId`] keys into it, so cycles never own each other.

use std::collections::VecDeque;

use byteorder::{BigEndian, ByteOrder};
use log::{debug, trace, warn};

use crate::error::{PDFError, PDFResult};
use super::tokenizer::{TokenKind, Tokenizer};
use super::{ObjectId, PDFObject};

/// Highest generation number; a number freed at this generation is retired
pub const MAX_GENERATION: u16 = 65535;

/// Highest object number accepted from a file
pub const MAX_OBJECT_NUMBER: u32 = 8_388_607;

const INITIAL_CAPACITY: usize = 32;

fn check_number(number: u32) -> PDFResult<()> {
    if number > MAX_OBJECT_NUMBER {
        return Err(PDFError::InconsistentXRef {
            number,
            message: format!("object number above {}", MAX_OBJECT_NUMBER),
        });
    }
    Ok(())
}

/// Where an indirect object's value lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Number is available (or retired)
    Free,
    /// In use with no known location: a forward reference seen before its
    /// xref entry, or an object created in memory and not yet written
    Pending,
    /// In use at a byte offset of the body
    Offset(u64),
    /// In use inside an object stream
    Compressed { stream: u32, index: u32 },
}

impl EntryState {
    pub fn is_free(&self) -> bool {
        matches!(self, EntryState::Free)
    }

    /// Whether the object can be read back from the source bytes
    pub fn has_location(&self) -> bool {
        matches!(self, EntryState::Offset(_) | EntryState::Compressed { .. })
    }
}

/// One slot of the cross-reference table
#[derive(Debug, Clone, PartialEq)]
pub struct XRefEntry {
    pub generation: u16,
    pub state: EntryState,
    /// Cached or in-memory value
    pub value: Option<PDFObject>,
    /// Changed since load; written by incremental saves
    pub modified: bool,
}

impl XRefEntry {
    /// Entry with no cached value
    pub fn new(generation: u16, state: EntryState) -> Self {
        Self {
            generation,
            state,
            value: None,
            modified: false,
        }
    }

    pub fn is_free(&self) -> bool {
        self.state.is_free()
    }
}

/// PDF cross-reference table
#[derive(Debug, Clone)]
pub struct XRefTable {
    entries: Vec<Option<XRefEntry>>,
    free: VecDeque<u32>,
    /// One past the highest object number in use
    size: u32,
}

impl Default for XRefTable {
    fn default() -> Self {
        Self::new()
    }
}

impl XRefTable {
    /// Create new xref table; object 0 is the reserved head of the free list
    pub fn new() -> Self {
        let mut entries = vec![None; INITIAL_CAPACITY];
        entries[0] = Some(XRefEntry::new(MAX_GENERATION, EntryState::Free));
        Self {
            entries,
            free: VecDeque::new(),
            size: 1,
        }
    }

    /// Next unused object number (the trailer `Size`)
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Allocated slots
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    fn ensure_capacity(&mut self, number: u32) {
        let needed = number as usize + 1;
        if needed <= self.entries.len() {
            return;
        }
        let mut capacity = self.entries.len().max(1);
        while capacity < needed {
            capacity *= 2;
        }
        trace!("Growing xref table to {} slots", capacity);
        self.entries.resize(capacity, None);
    }

    fn bump_size(&mut self, number: u32) {
        if number >= self.size {
            self.size = number.saturating_add(1);
        }
    }

    /// Entry for `number`, free or in use
    pub fn get(&self, number: u32) -> Option<&XRefEntry> {
        self.entries.get(number as usize).and_then(Option::as_ref)
    }

    /// Mutable entry for `number`
    pub fn get_mut(&mut self, number: u32) -> Option<&mut XRefEntry> {
        self.entries.get_mut(number as usize).and_then(Option::as_mut)
    }

    /// Reference naming the current holder of `number`
    pub fn id(&self, number: u32) -> Option<ObjectId> {
        self.get(number)
            .filter(|e| !e.is_free())
            .map(|e| ObjectId::new(number, e.generation))
    }

    /// Insert or replace the slot for `number`
    pub fn add_or_update(&mut self, number: u32, entry: XRefEntry) {
        self.ensure_capacity(number);
        if !entry.is_free() {
            self.bump_size(number);
        }
        self.entries[number as usize] = Some(entry);
    }

    /// Reference met while parsing; creates a stub slot if the number is new
    pub fn stub(&mut self, number: u32, generation: u16) -> PDFResult<ObjectId> {
        check_number(number)?;
        if self.get(number).is_none() && number != 0 {
            trace!("Stub entry for {} {} R", number, generation);
            self.add_or_update(number, XRefEntry::new(generation, EntryState::Pending));
        }
        Ok(ObjectId::new(number, generation))
    }

    /// Record an entry read from a cross-reference section.
    ///
    /// Sections are read newest first, so an entry already filled by a newer
    /// section is kept. Returns whether the entry was taken.
    pub fn load_entry(&mut self, number: u32, generation: u16, state: EntryState) -> PDFResult<bool> {
        if number == 0 {
            return Ok(false);
        }
        check_number(number)?;
        if state == EntryState::Offset(0) {
            return Err(PDFError::InconsistentXRef {
                number,
                message: "in-use entry at offset 0".to_string(),
            });
        }
        match self.get(number) {
            Some(existing) if !(existing.state == EntryState::Pending && existing.value.is_none()) => {
                Ok(false)
            }
            _ => {
                self.ensure_capacity(number);
                if !state.is_free() {
                    self.bump_size(number);
                }
                self.entries[number as usize] = Some(XRefEntry::new(generation, state));
                Ok(true)
            }
        }
    }

    /// Raise `size` to at least the trailer's declared value
    pub fn declare_size(&mut self, size: u32) -> PDFResult<()> {
        if size > 0 {
            check_number(size - 1)?;
        }
        if size > self.size {
            self.size = size;
        }
        Ok(())
    }

    /// Register a new in-memory object and return its reference.
    ///
    /// Reuses a freed number (with its bumped generation) when one is queued.
    pub fn create_reference(&mut self, value: PDFObject) -> ObjectId {
        while let Some(number) = self.free.pop_front() {
            let generation = match self.get(number) {
                Some(e) if e.is_free() && e.generation < MAX_GENERATION => e.generation,
                _ => continue,
            };
            self.set_new(number, generation, value);
            return ObjectId::new(number, generation);
        }

        let number = self.size;
        self.set_new(number, 0, value);
        ObjectId::new(number, 0)
    }

    fn set_new(&mut self, number: u32, generation: u16, value: PDFObject) {
        trace!("New object {} {} R", number, generation);
        self.add_or_update(
            number,
            XRefEntry {
                generation,
                state: EntryState::Pending,
                value: Some(value),
                modified: true,
            },
        );
    }

    /// Free the holder of `number`.
    ///
    /// The generation goes up by one; at [`MAX_GENERATION`] the number is
    /// retired instead of queued for reuse.
    pub fn free(&mut self, number: u32) -> bool {
        if number == 0 {
            return false;
        }
        let Some(entry) = self.get_mut(number) else { return false };
        if entry.is_free() {
            return false;
        }
        entry.value = None;
        entry.state = EntryState::Free;
        entry.modified = true;
        entry.generation = entry.generation.saturating_add(1);
        let generation = entry.generation;

        if generation < MAX_GENERATION {
            self.free.push_back(number);
        } else {
            debug!("Object number {} retired", number);
        }
        true
    }

    /// Rebuild the reuse queue from free entries (after loading)
    pub fn rebuild_free_list(&mut self) {
        self.free = self
            .entries
            .iter()
            .enumerate()
            .skip(1)
            .filter_map(|(n, e)| match e {
                Some(e) if e.is_free() && e.generation < MAX_GENERATION => Some(n as u32),
                _ => None,
            })
            .collect();
    }

    /// Numbers queued for reuse, in reuse order
    pub fn free_queue(&self) -> impl Iterator<Item = u32> + '_ {
        self.free.iter().copied()
    }

    /// Free numbers below `size`, ascending (object 0 excluded)
    pub fn free_numbers(&self) -> Vec<u32> {
        (1..self.size)
            .filter(|&n| self.get(n).map_or(true, XRefEntry::is_free))
            .collect()
    }

    /// In-use entries, ascending by number
    pub fn iter(&self) -> impl Iterator<Item = (u32, &XRefEntry)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .take(self.size as usize)
            .filter_map(|(n, e)| e.as_ref().filter(|e| !e.is_free()).map(|e| (n as u32, e)))
    }

    /// Every filled slot except object 0, free ones included
    pub fn iter_loaded(&self) -> impl Iterator<Item = (u32, &XRefEntry)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .skip(1)
            .filter_map(|(n, e)| e.as_ref().map(|e| (n as u32, e)))
    }

    /// Number of in-use entries
    pub fn in_use_count(&self) -> usize {
        self.iter().count()
    }
}

/// Parse a classic `xref` section whose keyword has already been consumed.
///
/// Stops in front of the `trailer` keyword.
pub fn parse_xref_table(tokenizer: &mut Tokenizer<'_>, xref: &mut XRefTable) -> PDFResult<usize> {
    let mut loaded = 0;
    loop {
        let position = tokenizer.position();
        let token = tokenizer.next_token()?;
        if token.is_keyword(b"trailer") {
            tokenizer.seek(position);
            break;
        }
        let start = token
            .as_integer()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| PDFError::xref(token.offset, "expected subsection start or trailer"))?;
        let count_token = tokenizer.next_token()?;
        let count = count_token
            .as_integer()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| PDFError::xref(count_token.offset, "expected subsection count"))?;
        trace!("xref subsection {} {}", start, count);

        for i in 0..count {
            let number = start.saturating_add(i);
            let offset_token = tokenizer.next_token()?;
            let generation_token = tokenizer.next_token()?;
            let kind_token = tokenizer.next_token()?;

            let offset = offset_token
                .as_integer()
                .and_then(|v| u64::try_from(v).ok())
                .ok_or_else(|| PDFError::xref(offset_token.offset, "invalid xref offset"))?;
            let generation = generation_token
                .as_integer()
                .and_then(|v| u16::try_from(v).ok())
                .ok_or_else(|| PDFError::xref(generation_token.offset, "invalid xref generation"))?;

            let state = match (kind_token.kind, kind_token.bytes) {
                (TokenKind::Other, b"n") => EntryState::Offset(offset),
                (TokenKind::Other, b"f") => EntryState::Free,
                _ => return Err(PDFError::xref(kind_token.offset, "invalid xref entry type")),
            };
            if xref.load_entry(number, generation, state)? {
                loaded += 1;
            }
        }
    }
    Ok(loaded)
}

/// Field widths of a cross-reference stream (`W` array)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldWidths {
    pub kind: usize,
    pub field2: usize,
    pub field3: usize,
}

impl FieldWidths {
    /// Parse a `W` array; each width is at most 8 bytes
    pub fn from_array(w: &[PDFObject]) -> PDFResult<Self> {
        let width = |i: usize| -> PDFResult<usize> {
            let value = w
                .get(i)
                .ok_or_else(|| PDFError::invalid_dict_value("W", "expected three widths"))?
                .as_i64()?;
            match usize::try_from(value) {
                Ok(v) if v <= 8 => Ok(v),
                _ => Err(PDFError::invalid_dict_value("W", format!("invalid width {}", value))),
            }
        };
        Ok(Self {
            kind: width(0)?,
            field2: width(1)?,
            field3: width(2)?,
        })
    }

    /// Bytes per record
    pub fn record_len(&self) -> usize {
        self.kind + self.field2 + self.field3
    }

    pub fn to_array(&self) -> PDFObject {
        PDFObject::Array(vec![self.kind.into(), self.field2.into(), self.field3.into()])
    }
}

fn read_field(bytes: &[u8]) -> u64 {
    if bytes.is_empty() {
        0
    } else {
        BigEndian::read_uint(bytes, bytes.len())
    }
}

/// Load the binary records of a decoded cross-reference stream.
///
/// `index` holds `(first, count)` pairs from the `Index` array.
pub fn load_xref_stream_entries(
    data: &[u8],
    widths: FieldWidths,
    index: &[(u32, u32)],
    xref: &mut XRefTable,
) -> PDFResult<usize> {
    let record_len = widths.record_len();
    if record_len == 0 {
        return Err(PDFError::invalid_dict_value("W", "all widths are zero"));
    }
    if data.len() % record_len != 0 {
        warn!(
            "xref stream length {} is not a multiple of record size {}",
            data.len(),
            record_len
        );
    }

    let mut records = data.chunks_exact(record_len);
    let mut loaded = 0;
    for &(first, count) in index {
        for i in 0..count {
            let Some(record) = records.next() else {
                warn!("xref stream ends before its Index is exhausted");
                return Ok(loaded);
            };
            let (kind_bytes, rest) = record.split_at(widths.kind);
            let (field2, field3) = rest.split_at(widths.field2);
            // a zero-width type field defaults to 1
            let kind = if widths.kind == 0 { 1 } else { read_field(kind_bytes) };
            let field2 = read_field(field2);
            let field3 = read_field(field3);

            let number = first.saturating_add(i);
            let (generation, state) = match kind {
                0 => (field3.min(MAX_GENERATION as u64) as u16, EntryState::Free),
                1 => (field3.min(MAX_GENERATION as u64) as u16, EntryState::Offset(field2)),
                2 => (
                    0,
                    EntryState::Compressed {
                        stream: u32::try_from(field2)
                            .map_err(|_| PDFError::xref(0, "object stream number out of range"))?,
                        index: u32::try_from(field3)
                            .map_err(|_| PDFError::xref(0, "object stream index out of range"))?,
                    },
                ),
                other => {
                    trace!("Ignoring xref stream record of type {}", other);
                    continue;
                }
            };
            if xref.load_entry(number, generation, state)? {
                loaded += 1;
            }
        }
    }
    Ok(loaded)
}
