//! In-memory document: the xref arena, the merged trailer and the source bytes

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::{debug, info, trace};

use crate::crypto::{decrypt_object, Encryption};
use crate::error::{PDFError, PDFResult};
use super::objstm::ObjectStreamIndex;
use super::parser::ObjectParser;
use super::reader::{find_header, find_startxref, load_xref_chain, ReaderProperties};
use super::writer::{PDFWriter, WriterProperties};
use super::xref::{EntryState, XRefTable};
use super::{Dictionary, ObjectId, PDFObject};

/// Version written for documents created in memory
pub const DEFAULT_VERSION: &str = "1.7";

static NULL: PDFObject = PDFObject::Null;

/// A PDF document loaded from bytes or built in memory.
///
/// Objects are resolved lazily through the cross-reference table and cached
/// in their xref slot.
pub struct PDFDocument {
    data: Vec<u8>,
    /// Bytes of junk before the header; xref offsets are relative to it
    base_offset: u64,
    version: String,
    xref: XRefTable,
    trailer: Dictionary,
    encryption: Option<Box<dyn Encryption>>,
    encrypt_id: Option<ObjectId>,
    object_streams: HashMap<u32, ObjectStreamIndex>,
    /// `startxref` of the loaded file, the `Prev` of an incremental update
    startxref: Option<u64>,
    newest_xref_is_stream: bool,
}

impl Default for PDFDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl PDFDocument {
    /// Create an empty document
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            base_offset: 0,
            version: DEFAULT_VERSION.to_string(),
            xref: XRefTable::new(),
            trailer: Dictionary::new(),
            encryption: None,
            encrypt_id: None,
            object_streams: HashMap::new(),
            startxref: None,
            newest_xref_is_stream: false,
        }
    }

    /// Load a document without decryption
    pub fn load(data: Vec<u8>) -> PDFResult<Self> {
        Self::load_with(data, ReaderProperties::default())
    }

    /// Read a file from disk
    pub fn open(path: impl AsRef<Path>) -> PDFResult<Self> {
        let data = std::fs::read(path)?;
        Self::load(data)
    }

    /// Load a document with reader options such as a decryptor
    pub fn load_with(data: Vec<u8>, properties: ReaderProperties) -> PDFResult<Self> {
        let header = find_header(&data)?;
        let startxref = find_startxref(&data)?;
        let base_offset = header.offset as u64;

        let mut xref = XRefTable::new();
        let chain = load_xref_chain(&data, base_offset, startxref, &mut xref, properties.max_revisions)?;

        let encrypt_id = match chain.trailer.get("Encrypt") {
            Some(encrypt) => {
                if properties.encryption.is_none() {
                    return Err(PDFError::MissingDecryptor);
                }
                encrypt.as_reference().ok()
            }
            None => None,
        };

        info!(
            "Loaded PDF {} with {} objects in {} xref sections",
            header.version,
            xref.in_use_count(),
            chain.sections
        );
        Ok(Self {
            data,
            base_offset,
            version: header.version,
            xref,
            trailer: chain.trailer,
            encryption: properties.encryption,
            encrypt_id,
            object_streams: HashMap::new(),
            startxref: Some(startxref),
            newest_xref_is_stream: chain.newest_is_stream,
        })
    }

    /// Header version, e.g. `1.7`
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn set_version(&mut self, version: impl Into<String>) {
        self.version = version.into();
    }

    /// Trailer merged across all loaded revisions
    pub fn trailer(&self) -> &Dictionary {
        &self.trailer
    }

    pub fn trailer_mut(&mut self) -> &mut Dictionary {
        &mut self.trailer
    }

    /// Cross-reference table
    pub fn xref(&self) -> &XRefTable {
        &self.xref
    }

    pub fn xref_mut(&mut self) -> &mut XRefTable {
        &mut self.xref
    }

    /// Catalog reference from the trailer
    pub fn root(&self) -> Option<ObjectId> {
        self.trailer.get_reference("Root")
    }

    /// Document information dictionary reference
    pub fn info(&self) -> Option<ObjectId> {
        self.trailer.get_reference("Info")
    }

    /// Set the trailer `Root` entry
    pub fn register_trailer_root(&mut self, id: ObjectId) {
        self.trailer.set("Root", id);
    }

    /// Set the trailer `Info` entry
    pub fn register_trailer_info(&mut self, id: ObjectId) {
        self.trailer.set("Info", id);
    }

    /// Check if the trailer names an `Encrypt` dictionary
    pub fn is_encrypted(&self) -> bool {
        self.trailer.contains_key("Encrypt")
    }

    /// Encrypt the document on save.
    ///
    /// `dictionary` becomes the indirect `Encrypt` object of the trailer; it is
    /// written as is and never encrypted itself.
    pub fn set_encryption(&mut self, encryption: Box<dyn Encryption>, dictionary: Dictionary) -> ObjectId {
        let id = self.xref.create_reference(dictionary.into());
        self.trailer.set("Encrypt", id);
        self.encrypt_id = Some(id);
        self.encryption = Some(encryption);
        id
    }

    /// Original bytes; empty for documents built in memory
    pub fn source(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn base_offset(&self) -> u64 {
        self.base_offset
    }

    pub(crate) fn startxref(&self) -> Option<u64> {
        self.startxref
    }

    pub(crate) fn newest_xref_is_stream(&self) -> bool {
        self.newest_xref_is_stream
    }

    pub(crate) fn encrypt_id(&self) -> Option<ObjectId> {
        self.encrypt_id
    }

    pub(crate) fn encryption_mut(&mut self) -> Option<&mut (dyn Encryption + 'static)> {
        self.encryption.as_deref_mut()
    }

    /// Register a new indirect object
    pub fn create_reference(&mut self, value: impl Into<PDFObject>) -> ObjectId {
        self.xref.create_reference(value.into())
    }

    /// Resolve a reference.
    ///
    /// Free numbers, stale generations and references with no xref entry
    /// resolve to the null object.
    pub fn resolve(&mut self, id: ObjectId) -> PDFResult<&PDFObject> {
        match self.xref.get(id.number) {
            Some(entry) if !entry.is_free() && entry.generation == id.generation => {}
            _ => return Ok(&NULL),
        }
        self.load_value(id.number)?;
        Ok(self
            .xref
            .get(id.number)
            .and_then(|e| e.value.as_ref())
            .unwrap_or(&NULL))
    }

    /// Follow `object` if it is a reference, otherwise clone it
    pub fn resolve_object(&mut self, object: &PDFObject) -> PDFResult<PDFObject> {
        match object {
            PDFObject::Reference(id) => self.resolve(*id).cloned(),
            other => Ok(other.clone()),
        }
    }

    /// Replace the value of an in-use object
    pub fn set_object(&mut self, id: ObjectId, value: impl Into<PDFObject>) -> PDFResult<()> {
        let entry = self
            .xref
            .get_mut(id.number)
            .filter(|e| !e.is_free() && e.generation == id.generation)
            .ok_or(PDFError::ObjectNotFound(id.number))?;
        entry.value = Some(value.into());
        entry.modified = true;
        self.object_streams.remove(&id.number);
        Ok(())
    }

    /// Free an object; its number is queued for reuse with a higher generation
    pub fn delete_object(&mut self, id: ObjectId) -> bool {
        match self.xref.get(id.number) {
            Some(e) if !e.is_free() && e.generation == id.generation => {}
            _ => return false,
        }
        self.object_streams.remove(&id.number);
        self.xref.free(id.number)
    }

    /// Objects that exist: in-use entries with a value or a location
    pub fn references(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.xref
            .iter()
            .filter(|(_, e)| e.value.is_some() || e.state.has_location())
            .map(|(n, e)| ObjectId::new(n, e.generation))
    }

    /// Number of objects that exist
    pub fn objects_count(&self) -> usize {
        self.references().count()
    }

    /// Drop the cached value of an unmodified object that can be read again
    pub(crate) fn release(&mut self, number: u32) {
        if let Some(entry) = self.xref.get_mut(number) {
            if !entry.modified && entry.state.has_location() {
                entry.value = None;
            }
        }
    }

    pub(crate) fn load_value(&mut self, number: u32) -> PDFResult<()> {
        let Some(entry) = self.xref.get(number) else { return Ok(()) };
        if entry.value.is_some() {
            return Ok(());
        }
        let id = ObjectId::new(number, entry.generation);
        let state = entry.state;
        let value = match state {
            EntryState::Offset(offset) => self.read_at(id, offset)?,
            EntryState::Compressed { stream, index } => self.read_compressed(id, stream, index)?,
            EntryState::Free | EntryState::Pending => return Ok(()),
        };
        if let Some(entry) = self.xref.get_mut(number) {
            entry.value = Some(value);
        }
        Ok(())
    }

    fn read_at(&mut self, id: ObjectId, offset: u64) -> PDFResult<PDFObject> {
        let position = offset
            .checked_add(self.base_offset)
            .and_then(|p| usize::try_from(p).ok())
            .filter(|&p| p < self.data.len())
            .ok_or_else(|| PDFError::InconsistentXRef {
                number: id.number,
                message: format!("offset {} beyond end of file", offset),
            })?;
        trace!("Reading {} at offset {}", id, offset);

        let (_, mut value) = ObjectParser::new_at(&self.data, position, &mut self.xref)
            .with_base_offset(self.base_offset)
            .read_indirect_object(Some(id))?;

        if let Some(crypt) = self.encryption.as_deref_mut() {
            if self.encrypt_id != Some(id) && !is_xref_stream(&value) {
                decrypt_object(&mut value, crypt, id)?;
            }
        }
        Ok(value)
    }

    fn read_compressed(&mut self, id: ObjectId, stream: u32, index: u32) -> PDFResult<PDFObject> {
        if !self.object_streams.contains_key(&stream) {
            let stream_id = match self.xref.get(stream) {
                Some(e) if matches!(e.state, EntryState::Offset(_)) => ObjectId::new(stream, e.generation),
                _ => {
                    return Err(PDFError::InconsistentXRef {
                        number: id.number,
                        message: format!("object stream {} is not stored at an offset", stream),
                    })
                }
            };
            let parsed = match self.resolve(stream_id)? {
                PDFObject::Stream(s) => ObjectStreamIndex::parse(s)?,
                other => {
                    return Err(PDFError::InvalidObjectType {
                        expected: "Stream",
                        found: other.type_name(),
                    })
                }
            };
            debug!("Indexed object stream {} ({} objects)", stream, parsed.len());
            self.object_streams.insert(stream, parsed);
        }

        let objstm = self
            .object_streams
            .get(&stream)
            .ok_or(PDFError::ObjectNotFound(stream))?;
        objstm.read_object(index, id.number, &mut self.xref)
    }

    /// Write a complete new file
    pub fn save<W: Write>(&mut self, out: W, properties: WriterProperties) -> PDFResult<W> {
        let mut writer = PDFWriter::new(self, out, properties)?;
        writer.flush_all()?;
        writer.finalize()
    }

    /// Append an update section holding modified objects to the original bytes
    pub fn save_incremental<W: Write>(&mut self, out: W, properties: WriterProperties) -> PDFResult<W> {
        let mut writer = PDFWriter::incremental(self, out, properties)?;
        writer.flush_all()?;
        writer.finalize()
    }

    /// Write a complete new file to `path`
    pub fn save_to_file(&mut self, path: impl AsRef<Path>, properties: WriterProperties) -> PDFResult<()> {
        let file = BufWriter::new(File::create(path)?);
        let mut file = self.save(file, properties)?;
        file.flush()?;
        Ok(())
    }
}

pub(crate) fn is_xref_stream(object: &PDFObject) -> bool {
    matches!(object, PDFObject::Stream(s) if s.dict().has_name("Type", "XRef"))
}

impl fmt::Debug for PDFDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PDFDocument")
            .field("version", &self.version)
            .field("size", &self.xref.size())
            .field("trailer", &self.trailer)
            .field("encrypted", &self.encryption.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::Name;
    use pretty_assertions::assert_eq;
    use test_log::test;

    #[test]
    fn test_create_and_resolve() {
        let mut doc = PDFDocument::new();
        let id = doc.create_reference(PDFObject::from(42i64));
        assert_eq!(id, ObjectId::new(1, 0));
        assert_eq!(doc.resolve(id).unwrap(), &PDFObject::from(42i64));
        assert_eq!(doc.objects_count(), 1);
    }

    #[test]
    fn test_resolve_missing_and_stale() {
        let mut doc = PDFDocument::new();
        assert!(doc.resolve(ObjectId::new(9, 0)).unwrap().is_null());

        let id = doc.create_reference(PDFObject::from(true));
        assert!(doc.resolve(ObjectId::new(id.number, 3)).unwrap().is_null());
        assert!(doc.delete_object(id));
        assert!(doc.resolve(id).unwrap().is_null());
        assert!(!doc.delete_object(id));
    }

    #[test]
    fn test_set_object() {
        let mut doc = PDFDocument::new();
        let id = doc.create_reference(PDFObject::Null);
        doc.set_object(id, Name::from("Done")).unwrap();
        assert_eq!(doc.resolve(id).unwrap(), &PDFObject::name("Done"));
        assert!(matches!(
            doc.set_object(ObjectId::new(5, 0), 1i64),
            Err(PDFError::ObjectNotFound(5))
        ));
    }

    #[test]
    fn test_trailer_registration() {
        let mut doc = PDFDocument::new();
        let root = doc.create_reference(Dictionary::new());
        doc.register_trailer_root(root);
        assert_eq!(doc.root(), Some(root));
        assert_eq!(doc.info(), None);
    }

    #[test]
    fn test_resolve_object_passthrough() {
        let mut doc = PDFDocument::new();
        let id = doc.create_reference(PDFObject::from(3i64));
        assert_eq!(doc.resolve_object(&id.into()).unwrap(), PDFObject::from(3i64));
        assert_eq!(doc.resolve_object(&PDFObject::from(4i64)).unwrap(), PDFObject::from(4i64));
    }
}
