//! PDF object types and their serialization

use std::borrow::Borrow;
use std::fmt;
use std::io::Write;

use crate::error::{PDFError, PDFResult};
use super::{Dictionary, Stream};

/// Object number and generation naming an indirect object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId {
    pub number: u32,
    pub generation: u16,
}

impl ObjectId {
    /// Create a reference from number and generation
    pub fn new(number: u32, generation: u16) -> Self {
        Self { number, generation }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} R", self.number, self.generation)
    }
}

/// Numeric value that remembers whether it was written as an integer
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PDFNumber {
    Integer(i64),
    Real(f64),
}

impl PDFNumber {
    /// Value as a float
    pub fn as_f64(&self) -> f64 {
        match *self {
            PDFNumber::Integer(i) => i as f64,
            PDFNumber::Real(r) => r,
        }
    }

    /// Integer value; reals are accepted when they have no fractional part
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            PDFNumber::Integer(i) => Some(i),
            PDFNumber::Real(r) if r.fract() == 0.0 && r.abs() < i64::MAX as f64 => Some(r as i64),
            PDFNumber::Real(_) => None,
        }
    }

    fn write_to(&self, output: &mut Vec<u8>) {
        match *self {
            PDFNumber::Integer(i) => {
                let _ = write!(output, "{}", i);
            }
            PDFNumber::Real(r) => output.extend_from_slice(format_real(r).as_bytes()),
        }
    }
}

/// Real numbers are written in fixed notation with trailing zeros trimmed,
/// keeping one fractional digit so they read back as reals.
fn format_real(value: f64) -> String {
    if !value.is_finite() {
        return "0.0".to_string();
    }
    let mut text = format!("{:.6}", value);
    while text.ends_with('0') {
        text.pop();
    }
    if text.ends_with('.') {
        text.push('0');
    }
    if text == "-0.0" {
        text = "0.0".to_string();
    }
    text
}

/// Name object, stored decoded (`#xx` escapes resolved)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name(Vec<u8>);

impl Name {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Decode the raw token text of a name
    pub fn from_raw(raw: &[u8]) -> Self {
        let mut bytes = Vec::with_capacity(raw.len());
        let mut i = 0;
        while i < raw.len() {
            if raw[i] == b'#' && i + 2 < raw.len() {
                if let Some(b) = hex_pair(raw[i + 1], raw[i + 2]) {
                    bytes.push(b);
                    i += 3;
                    continue;
                }
            }
            bytes.push(raw[i]);
            i += 1;
        }
        Self(bytes)
    }

    /// Decoded name bytes, without the leading slash
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Name as UTF-8, if it is valid
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    /// Serialize with `#xx` escapes
    pub fn write_to(&self, output: &mut Vec<u8>) {
        output.push(b'/');
        for &b in &self.0 {
            if b == b'#' || !(0x21..=0x7e).contains(&b) || super::tokenizer::is_delimiter(b) {
                let _ = write!(output, "#{:02X}", b);
            } else {
                output.push(b);
            }
        }
    }
}

impl Borrow<[u8]> for Name {
    fn borrow(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for Name {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", String::from_utf8_lossy(&self.0))
    }
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

fn hex_pair(hi: u8, lo: u8) -> Option<u8> {
    Some(hex_value(hi)? << 4 | hex_value(lo)?)
}

/// String object.
///
/// `hex` records how the string was written; equality only looks at the bytes.
#[derive(Debug, Clone, Default)]
pub struct PDFString {
    pub bytes: Vec<u8>,
    pub hex: bool,
}

impl PartialEq for PDFString {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl PDFString {
    /// Literal string written with parentheses
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            hex: false,
        }
    }

    /// String written in hex form
    pub fn new_hex(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            hex: true,
        }
    }

    /// Decode the inside of a `( )` literal
    pub fn from_literal_raw(raw: &[u8]) -> Self {
        let mut bytes = Vec::with_capacity(raw.len());
        let mut i = 0;
        while i < raw.len() {
            let b = raw[i];
            i += 1;
            if b != b'\\' {
                bytes.push(b);
                continue;
            }
            let Some(&next) = raw.get(i) else { break };
            i += 1;
            match next {
                b'n' => bytes.push(b'\n'),
                b'r' => bytes.push(b'\r'),
                b't' => bytes.push(b'\t'),
                b'b' => bytes.push(0x08),
                b'f' => bytes.push(0x0c),
                b'0'..=b'7' => {
                    let mut value = (next - b'0') as u32;
                    for _ in 0..2 {
                        match raw.get(i) {
                            Some(&d @ b'0'..=b'7') => {
                                value = value * 8 + (d - b'0') as u32;
                                i += 1;
                            }
                            _ => break,
                        }
                    }
                    bytes.push((value & 0xff) as u8);
                }
                // line continuation
                b'\r' => {
                    if raw.get(i) == Some(&b'\n') {
                        i += 1;
                    }
                }
                b'\n' => {}
                other => bytes.push(other),
            }
        }
        Self { bytes, hex: false }
    }

    /// Decode the inside of a `< >` literal; an odd trailing digit is padded with 0
    pub fn from_hex_raw(raw: &[u8], offset: u64) -> PDFResult<Self> {
        let digits: Vec<u8> = raw
            .iter()
            .copied()
            .filter(|b| !super::tokenizer::is_whitespace(*b))
            .collect();
        let mut bytes = Vec::with_capacity(digits.len() / 2 + 1);
        for pair in digits.chunks(2) {
            let hi = pair[0];
            let lo = pair.get(1).copied().unwrap_or(b'0');
            let b = hex_pair(hi, lo)
                .ok_or_else(|| PDFError::syntax(offset, "invalid hex string"))?;
            bytes.push(b);
        }
        Ok(Self { bytes, hex: true })
    }

    /// Serialize in literal or hex form, re-escaping as needed
    pub fn write_to(&self, output: &mut Vec<u8>) {
        if self.hex {
            output.push(b'<');
            for b in &self.bytes {
                let _ = write!(output, "{:02X}", b);
            }
            output.push(b'>');
            return;
        }

        output.push(b'(');
        for &b in &self.bytes {
            match b {
                b'(' | b')' | b'\\' => {
                    output.push(b'\\');
                    output.push(b);
                }
                b'\r' => output.extend_from_slice(b"\\r"),
                b'\n' => output.extend_from_slice(b"\\n"),
                _ => output.push(b),
            }
        }
        output.push(b')');
    }
}

/// PDF object
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PDFObject {
    #[default]
    Null,
    Boolean(bool),
    Number(PDFNumber),
    Name(Name),
    String(PDFString),
    Array(Vec<PDFObject>),
    Dictionary(Dictionary),
    Stream(Stream),
    /// Non-owning link to an indirect object, resolved through the xref table
    Reference(ObjectId),
}

impl PDFObject {
    /// Create a name object
    pub fn name(name: &str) -> Self {
        PDFObject::Name(Name::from(name))
    }

    /// Create a literal string object
    pub fn string(bytes: impl Into<Vec<u8>>) -> Self {
        PDFObject::String(PDFString::new(bytes))
    }

    /// Create a real number object
    pub fn real(value: f64) -> Self {
        PDFObject::Number(PDFNumber::Real(value))
    }

    /// Variant name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            PDFObject::Null => "Null",
            PDFObject::Boolean(_) => "Boolean",
            PDFObject::Number(_) => "Number",
            PDFObject::Name(_) => "Name",
            PDFObject::String(_) => "String",
            PDFObject::Array(_) => "Array",
            PDFObject::Dictionary(_) => "Dictionary",
            PDFObject::Stream(_) => "Stream",
            PDFObject::Reference(_) => "Reference",
        }
    }

    fn type_error(&self, expected: &'static str) -> PDFError {
        PDFError::InvalidObjectType {
            expected,
            found: self.type_name(),
        }
    }

    /// Check for the null object
    pub fn is_null(&self) -> bool {
        matches!(self, PDFObject::Null)
    }

    /// Boolean value
    pub fn as_bool(&self) -> PDFResult<bool> {
        match self {
            PDFObject::Boolean(b) => Ok(*b),
            _ => Err(self.type_error("Boolean")),
        }
    }

    /// Integer value; reals with no fraction are accepted
    pub fn as_i64(&self) -> PDFResult<i64> {
        match self {
            PDFObject::Number(n) => n.as_i64().ok_or_else(|| self.type_error("Integer")),
            _ => Err(self.type_error("Integer")),
        }
    }

    /// Numeric value as a float
    pub fn as_f64(&self) -> PDFResult<f64> {
        match self {
            PDFObject::Number(n) => Ok(n.as_f64()),
            _ => Err(self.type_error("Number")),
        }
    }

    /// Name value
    pub fn as_name(&self) -> PDFResult<&Name> {
        match self {
            PDFObject::Name(n) => Ok(n),
            _ => Err(self.type_error("Name")),
        }
    }

    /// String value
    pub fn as_string(&self) -> PDFResult<&PDFString> {
        match self {
            PDFObject::String(s) => Ok(s),
            _ => Err(self.type_error("String")),
        }
    }

    /// Array items
    pub fn as_array(&self) -> PDFResult<&Vec<PDFObject>> {
        match self {
            PDFObject::Array(a) => Ok(a),
            _ => Err(self.type_error("Array")),
        }
    }

    /// Mutable array items
    pub fn as_array_mut(&mut self) -> PDFResult<&mut Vec<PDFObject>> {
        match self {
            PDFObject::Array(a) => Ok(a),
            _ => Err(self.type_error("Array")),
        }
    }

    /// Dictionary, or the dictionary of a stream
    pub fn as_dict(&self) -> PDFResult<&Dictionary> {
        match self {
            PDFObject::Dictionary(d) => Ok(d),
            PDFObject::Stream(s) => Ok(s.dict()),
            _ => Err(self.type_error("Dictionary")),
        }
    }

    /// Mutable dictionary, or the dictionary of a stream
    pub fn as_dict_mut(&mut self) -> PDFResult<&mut Dictionary> {
        match self {
            PDFObject::Dictionary(d) => Ok(d),
            PDFObject::Stream(s) => Ok(s.dict_mut()),
            _ => Err(self.type_error("Dictionary")),
        }
    }

    /// Stream value
    pub fn as_stream(&self) -> PDFResult<&Stream> {
        match self {
            PDFObject::Stream(s) => Ok(s),
            _ => Err(self.type_error("Stream")),
        }
    }

    /// Indirect reference
    pub fn as_reference(&self) -> PDFResult<ObjectId> {
        match self {
            PDFObject::Reference(id) => Ok(*id),
            _ => Err(self.type_error("Reference")),
        }
    }

    /// Append every indirect reference reachable without resolving
    pub fn collect_references(&self, out: &mut Vec<ObjectId>) {
        match self {
            PDFObject::Reference(id) => out.push(*id),
            PDFObject::Array(items) => items.iter().for_each(|o| o.collect_references(out)),
            PDFObject::Dictionary(dict) => dict.values().for_each(|o| o.collect_references(out)),
            PDFObject::Stream(stream) => {
                stream.dict().values().for_each(|o| o.collect_references(out))
            }
            _ => {}
        }
    }

    /// Serialize as it appears inside an object body
    pub fn write_to(&self, output: &mut Vec<u8>) {
        match self {
            PDFObject::Null => output.extend_from_slice(b"null"),
            PDFObject::Boolean(true) => output.extend_from_slice(b"true"),
            PDFObject::Boolean(false) => output.extend_from_slice(b"false"),
            PDFObject::Number(n) => n.write_to(output),
            PDFObject::Name(n) => n.write_to(output),
            PDFObject::String(s) => s.write_to(output),
            PDFObject::Array(items) => {
                output.push(b'[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        output.push(b' ');
                    }
                    item.write_to(output);
                }
                output.push(b']');
            }
            PDFObject::Dictionary(dict) => dict.write_to(output),
            PDFObject::Stream(stream) => stream.write_to(output),
            PDFObject::Reference(id) => {
                let _ = write!(output, "{} {} R", id.number, id.generation);
            }
        }
    }

    /// Serialize to a fresh buffer
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut output = Vec::new();
        self.write_to(&mut output);
        output
    }
}

impl From<bool> for PDFObject {
    fn from(b: bool) -> Self {
        PDFObject::Boolean(b)
    }
}

impl From<i64> for PDFObject {
    fn from(i: i64) -> Self {
        PDFObject::Number(PDFNumber::Integer(i))
    }
}

impl From<i32> for PDFObject {
    fn from(i: i32) -> Self {
        PDFObject::Number(PDFNumber::Integer(i as i64))
    }
}

impl From<u32> for PDFObject {
    fn from(i: u32) -> Self {
        PDFObject::Number(PDFNumber::Integer(i as i64))
    }
}

impl From<usize> for PDFObject {
    fn from(i: usize) -> Self {
        PDFObject::Number(PDFNumber::Integer(i as i64))
    }
}

impl From<f64> for PDFObject {
    fn from(r: f64) -> Self {
        PDFObject::Number(PDFNumber::Real(r))
    }
}

impl From<Name> for PDFObject {
    fn from(n: Name) -> Self {
        PDFObject::Name(n)
    }
}

impl From<PDFString> for PDFObject {
    fn from(s: PDFString) -> Self {
        PDFObject::String(s)
    }
}

impl From<Vec<PDFObject>> for PDFObject {
    fn from(items: Vec<PDFObject>) -> Self {
        PDFObject::Array(items)
    }
}

impl From<Dictionary> for PDFObject {
    fn from(d: Dictionary) -> Self {
        PDFObject::Dictionary(d)
    }
}

impl From<Stream> for PDFObject {
    fn from(s: Stream) -> Self {
        PDFObject::Stream(s)
    }
}

impl From<ObjectId> for PDFObject {
    fn from(id: ObjectId) -> Self {
        PDFObject::Reference(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(PDFObject::Null, "null")]
    #[case(PDFObject::from(true), "true")]
    #[case(PDFObject::from(-42i64), "-42")]
    #[case(PDFObject::real(3.0), "3.0")]
    #[case(PDFObject::real(-0.25), "-0.25")]
    #[case(PDFObject::real(1.0 / 3.0), "0.333333")]
    #[case(PDFObject::name("Type"), "/Type")]
    #[case(PDFObject::Name(Name::new(&b"A B#"[..])), "/A#20B#23")]
    #[case(PDFObject::string(&b"a(b)\\c"[..]), "(a\\(b\\)\\\\c)")]
    #[case(PDFObject::String(PDFString::new_hex(vec![0xde, 0xad])), "<DEAD>")]
    #[case(PDFObject::from(ObjectId::new(12, 3)), "12 3 R")]
    #[case(PDFObject::from(vec![PDFObject::from(1i64), PDFObject::name("X")]), "[1 /X]")]
    fn test_serialization(#[case] object: PDFObject, #[case] expected: &str) {
        assert_eq!(String::from_utf8_lossy(&object.to_bytes()), expected);
    }

    #[test]
    fn test_name_decoding() {
        assert_eq!(Name::from_raw(b"A#20B").as_bytes(), b"A B");
        assert_eq!(Name::from_raw(b"Bad#zz").as_bytes(), b"Bad#zz");
        assert_eq!(Name::from_raw(b"Trail#").as_bytes(), b"Trail#");
    }

    #[test]
    fn test_literal_string_escapes() {
        let s = PDFString::from_literal_raw(b"a\\nb\\(c\\)\\101\\\r\nd\\q");
        assert_eq!(s.bytes, b"a\nb(c)A".iter().chain(b"dq").copied().collect::<Vec<u8>>());
    }

    #[test]
    fn test_hex_string_decoding() {
        let s = PDFString::from_hex_raw(b"48 65 6C 6C 6F 7", 0).unwrap();
        assert_eq!(s.bytes, b"Hello\x70");
        assert!(s.hex);
    }

    #[test]
    fn test_string_equality_ignores_form() {
        assert_eq!(PDFString::new(&b"x"[..]), PDFString::new_hex(&b"x"[..]));
    }

    #[test]
    fn test_typed_accessors() {
        let obj = PDFObject::from(7i64);
        assert_eq!(obj.as_i64().unwrap(), 7);
        assert!(matches!(
            obj.as_name(),
            Err(PDFError::InvalidObjectType { expected: "Name", found: "Number" })
        ));
        assert_eq!(PDFObject::real(2.0).as_i64().unwrap(), 2);
    }

    #[test]
    fn test_collect_references() {
        let mut dict = Dictionary::new();
        dict.set("Parent", ObjectId::new(2, 0));
        dict.set("Kids", vec![PDFObject::from(ObjectId::new(3, 0)), PDFObject::Null]);
        let mut refs = Vec::new();
        PDFObject::from(dict).collect_references(&mut refs);
        refs.sort();
        assert_eq!(refs, vec![ObjectId::new(2, 0), ObjectId::new(3, 0)]);
    }
}
