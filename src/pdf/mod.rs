//! PDF parsing and serialization module

pub mod dict;
pub mod document;
pub mod filter;
pub mod object;
pub mod objstm;
pub mod parser;
pub mod reader;
pub mod source;
pub mod stream;
pub mod tokenizer;
pub mod writer;
pub mod xref;

pub use dict::Dictionary;
pub use document::PDFDocument;
pub use filter::Filter;
pub use object::{Name, ObjectId, PDFNumber, PDFObject, PDFString};
pub use objstm::DEFAULT_MAX_OBJECTS_PER_STREAM;
pub use parser::{parse_object, ObjectParser};
pub use reader::ReaderProperties;
pub use stream::Stream;
pub use tokenizer::{Token, TokenKind, Tokenizer};
pub use writer::{PDFWriter, WriterProperties};
pub use xref::{EntryState, XRefEntry, XRefTable, MAX_GENERATION, MAX_OBJECT_NUMBER};
