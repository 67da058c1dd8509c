//! PDF structural engine for Rust
//!
//! Reads and writes the object layer of PDF files: the tokenizer, the object
//! model, the cross-reference index with its free list, incremental loading
//! of xref chains (classic tables, xref streams and object streams) and a
//! writer producing full files or incremental updates. Encryption plugs in
//! through the [`crypto::Encryption`] trait.
//!
//! ```no_run
//! use pdf_kernel::{Dictionary, Name, PDFDocument, WriterProperties};
//!
//! # fn main() -> pdf_kernel::PDFResult<()> {
//! let mut doc = PDFDocument::new();
//! let mut catalog = Dictionary::new();
//! catalog.set("Type", Name::from("Catalog"));
//! let root = doc.create_reference(catalog);
//! doc.register_trailer_root(root);
//!
//! let bytes = doc.save(Vec::new(), WriterProperties::new().with_full_compression(true))?;
//! let reloaded = PDFDocument::load(bytes)?;
//! assert_eq!(reloaded.root(), Some(root));
//! # Ok(())
//! # }
//! ```

pub mod crypto;
pub mod error;
pub mod pdf;

pub use crypto::{CryptMethod, Encryption, StandardCipher};
pub use error::{PDFError, PDFResult};
pub use pdf::{
    Dictionary, EntryState, Name, ObjectId, PDFDocument, PDFNumber, PDFObject, PDFString,
    PDFWriter, ReaderProperties, Stream, WriterProperties, XRefEntry, XRefTable,
};
