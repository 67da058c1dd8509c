//! Locating the header and `startxref`, and loading the xref chain

use std::collections::HashSet;
use std::fmt;

use log::{debug, trace, warn};

use crate::crypto::Encryption;
use crate::error::{PDFError, PDFResult};
use super::parser::ObjectParser;
use super::source::{find_sequence, find_sequence_backwards};
use super::tokenizer::{TokenKind, Tokenizer};
use super::xref::{load_xref_stream_entries, parse_xref_table, FieldWidths, XRefTable};
use super::{Dictionary, PDFObject};

/// Bytes searched for the header
pub const HEADER_SCAN_LIMIT: usize = 1024;
/// Window used when scanning backwards for `startxref`
pub const STARTXREF_WINDOW: usize = 1024;

const STARTXREF: &[u8] = b"startxref";

/// Trailer keys that describe a single section and are not merged
const SECTION_KEYS: &[&str] = &[
    "Prev", "XRefStm", "Type", "W", "Index", "Length", "Filter", "DecodeParms",
];

/// Options for loading a document
#[derive(Default)]
pub struct ReaderProperties {
    /// Decryptor for encrypted documents
    pub encryption: Option<Box<dyn Encryption>>,
    /// Upper bound on the number of xref sections followed through `Prev`
    pub max_revisions: Option<usize>,
}

impl ReaderProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_encryption(mut self, encryption: Box<dyn Encryption>) -> Self {
        self.encryption = Some(encryption);
        self
    }

    pub fn with_max_revisions(mut self, max_revisions: usize) -> Self {
        self.max_revisions = Some(max_revisions);
        self
    }
}

impl fmt::Debug for ReaderProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderProperties")
            .field("encryption", &self.encryption.is_some())
            .field("max_revisions", &self.max_revisions)
            .finish()
    }
}

/// Location of the `%PDF-` / `%FDF-` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Bytes of leading junk before the header
    pub offset: usize,
    pub version: String,
}

/// Scan the first kilobyte for the file header
pub fn find_header(data: &[u8]) -> PDFResult<Header> {
    let window = &data[..data.len().min(HEADER_SCAN_LIMIT)];
    let offset = [&b"%PDF-"[..], &b"%FDF-"[..]]
        .iter()
        .filter_map(|magic| find_sequence(window, magic))
        .min()
        .ok_or(PDFError::HeaderNotFound)?;

    let version: String = data[offset + 5..]
        .iter()
        .take_while(|b| b.is_ascii_digit() || **b == b'.')
        .map(|&b| b as char)
        .collect();
    if offset > 0 {
        debug!("{} bytes of junk before the header", offset);
    }
    Ok(Header { offset, version })
}

/// Find the offset stored after the last `startxref` keyword.
///
/// Scans backwards in overlapping windows so a keyword split across a
/// window boundary is still found.
pub fn find_startxref(data: &[u8]) -> PDFResult<u64> {
    let mut end = data.len();
    loop {
        let start = end.saturating_sub(STARTXREF_WINDOW);
        if let Some(idx) = find_sequence_backwards(&data[start..end], STARTXREF) {
            let position = start + idx + STARTXREF.len();
            let mut tokenizer = Tokenizer::new_at(data, position);
            let token = tokenizer.next_token()?;
            return token
                .as_integer()
                .and_then(|n| u64::try_from(n).ok())
                .ok_or_else(|| PDFError::xref(token.offset, "invalid startxref offset"));
        }
        if start == 0 {
            return Err(PDFError::StartXRefNotFound);
        }
        end = start + STARTXREF.len();
    }
}

/// Result of walking the xref chain
#[derive(Debug, Clone)]
pub struct XRefChain {
    /// Trailer entries merged newest first
    pub trailer: Dictionary,
    /// Whether the newest section is a cross-reference stream
    pub newest_is_stream: bool,
    /// Number of sections read
    pub sections: usize,
}

/// Load every xref section reachable from `startxref` into `xref`.
///
/// Offsets are relative to the header at `base_offset`.
pub fn load_xref_chain(
    data: &[u8],
    base_offset: u64,
    startxref: u64,
    xref: &mut XRefTable,
    max_revisions: Option<usize>,
) -> PDFResult<XRefChain> {
    let mut chain = XRefChain {
        trailer: Dictionary::new(),
        newest_is_stream: false,
        sections: 0,
    };
    let mut visited = HashSet::new();
    let mut next = Some(startxref);

    while let Some(offset) = next.take() {
        if !visited.insert(offset) {
            warn!("xref chain loops back to offset {}", offset);
            break;
        }
        if max_revisions.map_or(false, |max| chain.sections >= max) {
            debug!("Stopping xref chain after {} sections", chain.sections);
            break;
        }

        let (section_trailer, is_stream) = load_section(data, base_offset, offset, xref, &mut visited)?;
        if chain.sections == 0 {
            if !section_trailer.contains_key("Size") {
                return Err(PDFError::MissingTrailerEntry("Size".to_string()));
            }
            chain.newest_is_stream = is_stream;
        }
        chain.sections += 1;

        next = match section_trailer.get("Prev") {
            Some(prev) => Some(
                prev.as_i64()
                    .ok()
                    .and_then(|p| u64::try_from(p).ok())
                    .ok_or_else(|| PDFError::invalid_dict_value("Prev", "expected an offset"))?,
            ),
            None => None,
        };
        merge_trailer(&mut chain.trailer, &section_trailer);
    }

    if let Some(size) = chain.trailer.get_integer("Size") {
        xref.declare_size(u32::try_from(size.max(0)).unwrap_or(u32::MAX))?;
    }
    xref.rebuild_free_list();
    debug!("Loaded {} xref sections, size {}", chain.sections, xref.size());
    Ok(chain)
}

fn merge_trailer(merged: &mut Dictionary, section: &Dictionary) {
    for (key, value) in section {
        let per_section = key.as_str().map_or(false, |k| SECTION_KEYS.contains(&k));
        if per_section || merged.keys().any(|k| k == key) {
            continue;
        }
        merged.insert(key.clone(), value.clone());
    }
}

fn to_position(data: &[u8], base_offset: u64, offset: u64) -> PDFResult<usize> {
    offset
        .checked_add(base_offset)
        .and_then(|p| usize::try_from(p).ok())
        .filter(|&p| p < data.len())
        .ok_or_else(|| PDFError::xref(offset, "xref offset beyond end of file"))
}

/// Read one xref section and return its trailer.
///
/// `visited` holds every section offset read so far; a hybrid `XRefStm`
/// pointing at one of them is skipped.
fn load_section(
    data: &[u8],
    base_offset: u64,
    offset: u64,
    xref: &mut XRefTable,
    visited: &mut HashSet<u64>,
) -> PDFResult<(Dictionary, bool)> {
    let position = to_position(data, base_offset, offset)?;
    let mut tokenizer = Tokenizer::new_at(data, position);
    let token = tokenizer.next_meaningful_token()?;

    if token.kind == TokenKind::Obj {
        let dict = load_stream_section(data, base_offset, offset, xref)?;
        return Ok((dict, true));
    }
    if !token.is_keyword(b"xref") {
        return Err(PDFError::xref(token.offset, "xref keyword missing"));
    }

    trace!("Classic xref section at {}", offset);
    let mut table = XRefTable::new();
    parse_xref_table(&mut tokenizer, &mut table)?;
    let keyword = tokenizer.next_token()?;
    if !keyword.is_keyword(b"trailer") {
        return Err(PDFError::xref(keyword.offset, "trailer keyword missing"));
    }

    let mut parser =
        ObjectParser::new_at(data, tokenizer.position(), xref).with_base_offset(base_offset);
    let trailer = match parser.read_object()? {
        PDFObject::Dictionary(dict) => dict,
        other => {
            return Err(PDFError::InvalidObjectType {
                expected: "Dictionary",
                found: other.type_name(),
            })
        }
    };

    // hybrid file: the stream section takes priority over this table
    if let Some(stm) = trailer.get_integer("XRefStm") {
        match u64::try_from(stm) {
            Ok(stm) if visited.insert(stm) => {
                load_stream_section(data, base_offset, stm, xref)?;
            }
            Ok(stm) => warn!("XRefStm {} points at a section already read", stm),
            Err(_) => warn!("Ignoring negative XRefStm {}", stm),
        }
    }

    for (number, entry) in table.iter_loaded() {
        xref.load_entry(number, entry.generation, entry.state)?;
    }
    Ok((trailer, false))
}

/// Read a cross-reference stream section and return its dictionary
fn load_stream_section(
    data: &[u8],
    base_offset: u64,
    offset: u64,
    xref: &mut XRefTable,
) -> PDFResult<Dictionary> {
    let position = to_position(data, base_offset, offset)?;
    let mut tokenizer = Tokenizer::new_at(data, position);
    let token = tokenizer.next_meaningful_token()?;
    if token.kind != TokenKind::Obj {
        return Err(PDFError::xref(offset, "expected a cross-reference stream"));
    }

    trace!("xref stream section at {}", offset);
    let mut parser =
        ObjectParser::new_at(data, tokenizer.position(), xref).with_base_offset(base_offset);
    let stream = match parser.read_object()? {
        PDFObject::Stream(stream) if stream.dict().has_name("Type", "XRef") => stream,
        _ => return Err(PDFError::xref(offset, "expected a cross-reference stream")),
    };

    let dict = stream.dict();
    let widths = FieldWidths::from_array(
        dict.get_array("W")
            .ok_or_else(|| PDFError::invalid_dict_value("W", "missing"))?,
    )?;
    let size = dict
        .get_integer("Size")
        .and_then(|s| u32::try_from(s).ok())
        .ok_or_else(|| PDFError::MissingTrailerEntry("Size".to_string()))?;
    let index = match dict.get_array("Index") {
        Some(items) => items
            .chunks(2)
            .map(|pair| match pair {
                [first, count] => Ok((
                    u32::try_from(first.as_i64()?)
                        .map_err(|_| PDFError::invalid_dict_value("Index", "negative"))?,
                    u32::try_from(count.as_i64()?)
                        .map_err(|_| PDFError::invalid_dict_value("Index", "negative"))?,
                )),
                _ => Err(PDFError::invalid_dict_value("Index", "odd number of entries")),
            })
            .collect::<PDFResult<Vec<_>>>()?,
        None => vec![(0, size)],
    };

    let decoded = stream.decoded()?;
    load_xref_stream_entries(&decoded, widths, &index, xref)?;
    Ok(stream.dict().clone())
}
