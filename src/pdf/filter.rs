//! Stream filters

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use log::{trace, warn};

use crate::error::{PDFError, PDFResult};
use super::{Dictionary, Name};

/// PDF stream filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    ASCII85Decode,
    ASCIIHexDecode,
    FlateDecode,
    RunLengthDecode,
}

/// Predictor parameters from a `DecodeParms` dictionary
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictorParams {
    pub predictor: u8,
    pub columns: usize,
    pub colors: usize,
    pub bits_per_component: usize,
}

impl PredictorParams {
    /// Read the predictor entries; `None` when no predictor applies
    pub fn from_dict(params: &Dictionary) -> Option<Self> {
        let predictor = params.get_integer("Predictor")?;
        if predictor <= 1 {
            return None;
        }
        let positive = |key: &str, default: i64| {
            usize::try_from(params.get_integer(key).unwrap_or(default).max(1)).unwrap_or(usize::MAX)
        };
        Some(Self {
            predictor: predictor.clamp(0, u8::MAX as i64) as u8,
            columns: positive("Columns", 1),
            colors: positive("Colors", 1),
            bits_per_component: positive("BitsPerComponent", 8),
        })
    }

    fn bits_per_pixel(&self) -> PDFResult<usize> {
        self.colors
            .checked_mul(self.bits_per_component)
            .ok_or_else(|| PDFError::Stream("predictor pixel size overflows".to_string()))
    }

    fn bytes_per_pixel(&self) -> PDFResult<usize> {
        Ok(self.bits_per_pixel()?.div_ceil(8).max(1))
    }

    fn bytes_per_row(&self) -> PDFResult<usize> {
        let bits = self
            .columns
            .checked_mul(self.bits_per_pixel()?)
            .ok_or_else(|| PDFError::Stream(format!("predictor row of {} columns overflows", self.columns)))?;
        Ok(bits.div_ceil(8))
    }
}

impl Filter {
    /// Create filter from name
    pub fn from_name(name: &Name) -> PDFResult<Self> {
        match name.as_bytes() {
            b"ASCII85Decode" | b"A85" => Ok(Filter::ASCII85Decode),
            b"ASCIIHexDecode" | b"AHx" => Ok(Filter::ASCIIHexDecode),
            b"FlateDecode" | b"Fl" => Ok(Filter::FlateDecode),
            b"RunLengthDecode" | b"RL" => Ok(Filter::RunLengthDecode),
            _ => Err(PDFError::Stream(format!("Unsupported filter {}", name))),
        }
    }

    /// Full filter name
    pub fn name(&self) -> &'static str {
        match self {
            Filter::ASCII85Decode => "ASCII85Decode",
            Filter::ASCIIHexDecode => "ASCIIHexDecode",
            Filter::FlateDecode => "FlateDecode",
            Filter::RunLengthDecode => "RunLengthDecode",
        }
    }

    /// Decode data using this filter
    pub fn decode(&self, data: &[u8], params: Option<&Dictionary>) -> PDFResult<Vec<u8>> {
        trace!("Applying filter {}", self.name());
        let result = match self {
            Filter::ASCII85Decode => decode_ascii85(data)?,
            Filter::ASCIIHexDecode => decode_ascii_hex(data)?,
            Filter::FlateDecode => decode_flate(data)?,
            Filter::RunLengthDecode => decode_run_length(data)?,
        };

        match params.and_then(PredictorParams::from_dict) {
            Some(predictor) if *self == Filter::FlateDecode => apply_predictor(&result, &predictor),
            _ => Ok(result),
        }
    }

    /// Encode data using this filter
    pub fn encode(&self, data: &[u8]) -> PDFResult<Vec<u8>> {
        match self {
            Filter::ASCII85Decode => Ok(encode_ascii85(data)),
            Filter::ASCIIHexDecode => Ok(encode_ascii_hex(data)),
            Filter::FlateDecode => encode_flate(data),
            Filter::RunLengthDecode => Ok(encode_run_length(data)),
        }
    }
}

fn decode_flate(data: &[u8]) -> PDFResult<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut output = Vec::with_capacity(data.len() * 2);
    match decoder.read_to_end(&mut output) {
        Ok(_) => Ok(output),
        // Truncated streams are common; keep what was inflated
        Err(e) if !output.is_empty() => {
            warn!("Flate stream ended early: {}", e);
            Ok(output)
        }
        Err(e) => Err(PDFError::Compression(e.to_string())),
    }
}

fn encode_flate(data: &[u8]) -> PDFResult<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| PDFError::Compression(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| PDFError::Compression(e.to_string()))
}

fn decode_ascii_hex(data: &[u8]) -> PDFResult<Vec<u8>> {
    let mut output = Vec::with_capacity(data.len() / 2);
    let mut high: Option<u8> = None;

    for &byte in data {
        let digit = match byte {
            b'0'..=b'9' => byte - b'0',
            b'A'..=b'F' => byte - b'A' + 10,
            b'a'..=b'f' => byte - b'a' + 10,
            b'>' => break,
            b if super::tokenizer::is_whitespace(b) => continue,
            _ => {
                return Err(PDFError::Stream(format!(
                    "Invalid hex character 0x{:02x}",
                    byte
                )))
            }
        };
        match high.take() {
            Some(h) => output.push(h << 4 | digit),
            None => high = Some(digit),
        }
    }

    if let Some(h) = high {
        output.push(h << 4);
    }
    Ok(output)
}

fn encode_ascii_hex(data: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(data.len() * 2 + 1);
    for &byte in data {
        let _ = write!(output, "{:02X}", byte);
    }
    output.push(b'>');
    output
}

fn decode_ascii85(data: &[u8]) -> PDFResult<Vec<u8>> {
    let mut output = Vec::with_capacity(data.len() * 4 / 5);
    let mut group = [0u8; 5];
    let mut count = 0;

    for &byte in data {
        match byte {
            b'~' => break,
            b'z' if count == 0 => output.extend_from_slice(&[0; 4]),
            b'!'..=b'u' => {
                group[count] = byte - b'!';
                count += 1;
                if count == 5 {
                    output.extend_from_slice(&ascii85_value(&group)?.to_be_bytes());
                    count = 0;
                }
            }
            b if super::tokenizer::is_whitespace(b) => {}
            _ => {
                return Err(PDFError::Stream(format!(
                    "Invalid ASCII85 character 0x{:02x}",
                    byte
                )))
            }
        }
    }

    if count == 1 {
        return Err(PDFError::Stream("Truncated ASCII85 group".to_string()));
    }
    if count > 1 {
        for digit in group.iter_mut().skip(count) {
            *digit = 84;
        }
        let value = ascii85_value(&group)?.to_be_bytes();
        output.extend_from_slice(&value[..count - 1]);
    }
    Ok(output)
}

fn ascii85_value(group: &[u8; 5]) -> PDFResult<u32> {
    group
        .iter()
        .try_fold(0u32, |acc, &d| acc.checked_mul(85)?.checked_add(d as u32))
        .ok_or_else(|| PDFError::Stream("ASCII85 group out of range".to_string()))
}

fn encode_ascii85(data: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(data.len() * 5 / 4 + 2);
    for chunk in data.chunks(4) {
        let mut buffer = [0u8; 4];
        buffer[..chunk.len()].copy_from_slice(chunk);
        let mut value = u32::from_be_bytes(buffer);

        if value == 0 && chunk.len() == 4 {
            output.push(b'z');
            continue;
        }

        let mut digits = [0u8; 5];
        for digit in digits.iter_mut().rev() {
            *digit = (value % 85) as u8 + b'!';
            value /= 85;
        }
        output.extend_from_slice(&digits[..chunk.len() + 1]);
    }
    output.extend_from_slice(b"~>");
    output
}

fn decode_run_length(data: &[u8]) -> PDFResult<Vec<u8>> {
    let mut output = Vec::with_capacity(data.len() * 2);
    let mut i = 0;

    while i < data.len() {
        let length = data[i];
        i += 1;
        match length {
            128 => break,
            0..=127 => {
                let count = length as usize + 1;
                let run = data
                    .get(i..i + count)
                    .ok_or_else(|| PDFError::Stream("Invalid run length data".to_string()))?;
                output.extend_from_slice(run);
                i += count;
            }
            _ => {
                let byte = *data
                    .get(i)
                    .ok_or_else(|| PDFError::Stream("Invalid run length data".to_string()))?;
                output.extend(std::iter::repeat(byte).take(257 - length as usize));
                i += 1;
            }
        }
    }
    Ok(output)
}

fn encode_run_length(data: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(data.len() + data.len() / 128 + 1);
    let mut i = 0;

    while i < data.len() {
        let mut run = 1;
        while i + run < data.len() && data[i + run] == data[i] && run < 128 {
            run += 1;
        }
        if run >= 2 {
            output.push((257 - run) as u8);
            output.push(data[i]);
            i += run;
            continue;
        }

        let start = i;
        while i < data.len()
            && i - start < 128
            && !(i + 1 < data.len() && data[i + 1] == data[i])
        {
            i += 1;
        }
        if i == start {
            i += 1;
        }
        output.push((i - start - 1) as u8);
        output.extend_from_slice(&data[start..i]);
    }

    output.push(128);
    output
}

/// Undo a TIFF (2) or PNG (10..=15) predictor
pub fn apply_predictor(data: &[u8], params: &PredictorParams) -> PDFResult<Vec<u8>> {
    let bpp = params.bytes_per_pixel()?;
    // a row never holds more than the whole input
    let row_len = params.bytes_per_row()?.min(data.len());
    if row_len == 0 {
        return Ok(data.to_vec());
    }

    match params.predictor {
        1 => Ok(data.to_vec()),
        2 => {
            if params.bits_per_component != 8 {
                return Err(PDFError::Stream(format!(
                    "TIFF predictor with {} bits per component",
                    params.bits_per_component
                )));
            }
            let mut output = data.to_vec();
            for row in output.chunks_mut(row_len) {
                for i in bpp..row.len() {
                    row[i] = row[i].wrapping_add(row[i - bpp]);
                }
            }
            Ok(output)
        }
        10..=15 => {
            let mut output = Vec::with_capacity(data.len());
            let mut prev = vec![0u8; row_len];
            let mut current = vec![0u8; row_len];

            for row in data.chunks(row_len + 1) {
                let (&filter_type, encoded) = match row.split_first() {
                    Some(split) => split,
                    None => break,
                };
                current.fill(0);
                current[..encoded.len()].copy_from_slice(encoded);

                for i in 0..row_len {
                    let left = if i >= bpp { current[i - bpp] } else { 0 };
                    let up = prev[i];
                    let up_left = if i >= bpp { prev[i - bpp] } else { 0 };
                    let delta = match filter_type {
                        0 => 0,
                        1 => left,
                        2 => up,
                        3 => ((left as u16 + up as u16) / 2) as u8,
                        4 => paeth(left, up, up_left),
                        other => {
                            return Err(PDFError::Stream(format!(
                                "Invalid PNG filter type {}",
                                other
                            )))
                        }
                    };
                    current[i] = current[i].wrapping_add(delta);
                }

                output.extend_from_slice(&current[..encoded.len()]);
                std::mem::swap(&mut prev, &mut current);
            }
            Ok(output)
        }
        other => Err(PDFError::Stream(format!("Invalid predictor {}", other))),
    }
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(Filter::FlateDecode)]
    #[case(Filter::ASCIIHexDecode)]
    #[case(Filter::ASCII85Decode)]
    #[case(Filter::RunLengthDecode)]
    fn test_filter_roundtrip(#[case] filter: Filter) {
        let original = b"aaaaaaabcdefg\x00\x00\x00\x00 Hello PDF world zzzzzzzzzz".to_vec();
        let encoded = filter.encode(&original).unwrap();
        assert_eq!(filter.decode(&encoded, None).unwrap(), original);
    }

    #[test]
    fn test_ascii85_known_value() {
        assert_eq!(decode_ascii85(b"87cURD]i,\"Ebo80~>").unwrap(), b"Hello World!");
    }

    #[test]
    fn test_ascii_hex_odd_digit() {
        assert_eq!(decode_ascii_hex(b"61 62 6>").unwrap(), b"ab\x60");
        assert!(decode_ascii_hex(b"6x").is_err());
    }

    #[test]
    fn test_png_up_predictor() {
        // two rows of 3 bytes, second row uses Up
        let data = [0, 1, 2, 3, 2, 1, 1, 1];
        let params = PredictorParams {
            predictor: 12,
            columns: 3,
            colors: 1,
            bits_per_component: 8,
        };
        assert_eq!(apply_predictor(&data, &params).unwrap(), vec![1, 2, 3, 2, 3, 4]);
    }

    #[test]
    fn test_png_sub_and_paeth_predictor() {
        let params = PredictorParams {
            predictor: 15,
            columns: 2,
            colors: 1,
            bits_per_component: 8,
        };
        let data = [1, 5, 1, 4, 10, 10];
        assert_eq!(apply_predictor(&data, &params).unwrap(), vec![5, 6, 15, 25]);
    }

    #[test]
    fn test_tiff_predictor() {
        let params = PredictorParams {
            predictor: 2,
            columns: 3,
            colors: 1,
            bits_per_component: 8,
        };
        assert_eq!(apply_predictor(&[1, 1, 1, 5, 0, 2], &params).unwrap(), vec![1, 2, 3, 5, 5, 7]);
    }

    #[test]
    fn test_predictor_row_overflow_is_an_error() {
        let encoded = Filter::FlateDecode.encode(&[0, 1, 2, 3]).unwrap();
        let mut params = Dictionary::new();
        params.set("Predictor", 12i64);
        params.set("Columns", i64::MAX);
        assert!(matches!(
            Filter::FlateDecode.decode(&encoded, Some(&params)),
            Err(PDFError::Stream(_))
        ));

        params.set("Columns", 1i64);
        params.set("Colors", i64::MAX);
        params.set("BitsPerComponent", 16i64);
        assert!(matches!(
            Filter::FlateDecode.decode(&encoded, Some(&params)),
            Err(PDFError::Stream(_))
        ));
    }

    #[test]
    fn test_predictor_wide_row_bounded_by_input() {
        let params = PredictorParams {
            predictor: 12,
            columns: usize::MAX / 16,
            colors: 1,
            bits_per_component: 8,
        };
        assert_eq!(apply_predictor(&[0, 7, 9], &params).unwrap(), vec![7, 9]);
    }

    #[test]
    fn test_unknown_filter() {
        assert!(Filter::from_name(&Name::from("DCTDecode")).is_err());
        assert_eq!(Filter::from_name(&Name::from("Fl")).unwrap(), Filter::FlateDecode);
    }
}
