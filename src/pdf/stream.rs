//! PDF stream object implementation

use log::trace;

use crate::error::{PDFError, PDFResult};
use super::{Dictionary, Filter, Name, PDFObject};

/// PDF stream object.
///
/// `data` holds the bytes as they sit between `stream` and `endstream`
/// (still filtered, already decrypted when loaded through a decryptor).
#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
    dictionary: Dictionary,
    data: Vec<u8>,
}

impl Stream {
    /// Create new stream object from its dictionary and raw bytes
    pub fn new(dictionary: Dictionary, data: Vec<u8>) -> Self {
        Self { dictionary, data }
    }

    /// Create an unfiltered stream holding `content`
    pub fn from_content(content: impl Into<Vec<u8>>) -> Self {
        Self::new(Dictionary::new(), content.into())
    }

    /// Stream dictionary
    pub fn dict(&self) -> &Dictionary {
        &self.dictionary
    }

    pub fn dict_mut(&mut self) -> &mut Dictionary {
        &mut self.dictionary
    }

    /// Raw (encoded) stream bytes
    pub fn raw_data(&self) -> &[u8] {
        &self.data
    }

    /// Replace the raw bytes without touching the filter chain
    pub fn set_raw_data(&mut self, data: Vec<u8>) {
        self.data = data;
    }

    /// Replace the content with unfiltered bytes
    pub fn set_content(&mut self, content: Vec<u8>) {
        self.dictionary.remove("Filter");
        self.dictionary.remove("DecodeParms");
        self.data = content;
    }

    /// Check if the stream declares a filter
    pub fn is_filtered(&self) -> bool {
        self.dictionary.contains_key("Filter")
    }

    /// Filter chain declared by the dictionary, in application order
    pub fn filters(&self) -> PDFResult<Vec<Filter>> {
        match self.dictionary.get("Filter") {
            None | Some(PDFObject::Null) => Ok(Vec::new()),
            Some(PDFObject::Name(name)) => Ok(vec![Filter::from_name(name)?]),
            Some(PDFObject::Array(items)) => items
                .iter()
                .map(|item| Filter::from_name(item.as_name()?))
                .collect(),
            Some(other) => Err(PDFError::invalid_dict_value(
                "Filter",
                format!("expected name or array, found {}", other.type_name()),
            )),
        }
    }

    fn decode_params(&self, index: usize) -> Option<&Dictionary> {
        match self.dictionary.get("DecodeParms") {
            Some(PDFObject::Dictionary(d)) if index == 0 => Some(d),
            Some(PDFObject::Array(items)) => match items.get(index) {
                Some(PDFObject::Dictionary(d)) => Some(d),
                _ => None,
            },
            _ => None,
        }
    }

    /// Decoded stream content
    pub fn decoded(&self) -> PDFResult<Vec<u8>> {
        let filters = self.filters()?;
        if filters.is_empty() {
            return Ok(self.data.clone());
        }

        trace!("Decoding stream with {} filters", filters.len());
        let mut data = self.data.clone();
        for (i, filter) in filters.iter().enumerate() {
            data = filter.decode(&data, self.decode_params(i))?;
        }
        Ok(data)
    }

    /// Flate-compress the data if no filter has been applied yet
    pub fn compress(&mut self) -> PDFResult<bool> {
        if self.is_filtered() {
            return Ok(false);
        }
        let encoded = Filter::FlateDecode.encode(&self.data)?;
        trace!("Compressed stream {} -> {} bytes", self.data.len(), encoded.len());
        self.data = encoded;
        self.dictionary.set("Filter", Name::from(Filter::FlateDecode.name()));
        Ok(true)
    }

    /// Write stream to output; `Length` always reflects the bytes written
    pub fn write_to(&self, output: &mut Vec<u8>) {
        let mut dictionary = self.dictionary.clone();
        dictionary.set("Length", self.data.len());
        dictionary.write_to(output);
        output.extend_from_slice(b"\nstream\n");
        output.extend_from_slice(&self.data);
        output.extend_from_slice(b"\nendstream");
    }
}
