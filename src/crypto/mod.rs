//! Encryption collaborator used by the reader and writer
//!
//! The core never looks at key material. It selects the object key with
//! [`Encryption::set_key_for_object`] and then pushes every string and stream
//! payload of that object through `encrypt` or `decrypt`.

mod aes;
mod engine;
mod rc4;

pub use engine::{CryptMethod, StandardCipher};

use crate::error::PDFResult;
use crate::pdf::{ObjectId, PDFObject};

/// Per-object byte transform applied to string and stream payloads
pub trait Encryption {
    /// Select the key for the object about to be processed
    fn set_key_for_object(&mut self, number: u32, generation: u16);

    fn encrypt(&mut self, data: &[u8]) -> PDFResult<Vec<u8>>;

    fn decrypt(&mut self, data: &[u8]) -> PDFResult<Vec<u8>>;
}

/// Block or stream cipher keyed per call
pub(crate) trait CryptoProvider: Send + Sync {
    fn encrypt(&self, data: &[u8], key: &[u8]) -> PDFResult<Vec<u8>>;
    fn decrypt(&self, data: &[u8], key: &[u8]) -> PDFResult<Vec<u8>>;
}

/// Decrypt every string and stream payload of the object `id`
pub fn decrypt_object(object: &mut PDFObject, crypt: &mut dyn Encryption, id: ObjectId) -> PDFResult<()> {
    crypt.set_key_for_object(id.number, id.generation);
    transform_payloads(object, &mut |data| crypt.decrypt(data), false)
}

/// Encrypt every string and stream payload of the object `id`.
///
/// Encrypted strings are switched to hex form.
pub fn encrypt_object(object: &mut PDFObject, crypt: &mut dyn Encryption, id: ObjectId) -> PDFResult<()> {
    crypt.set_key_for_object(id.number, id.generation);
    transform_payloads(object, &mut |data| crypt.encrypt(data), true)
}

fn transform_payloads(
    object: &mut PDFObject,
    f: &mut dyn FnMut(&[u8]) -> PDFResult<Vec<u8>>,
    to_hex: bool,
) -> PDFResult<()> {
    match object {
        PDFObject::String(s) => {
            s.bytes = f(&s.bytes)?;
            if to_hex {
                s.hex = true;
            }
        }
        PDFObject::Array(items) => {
            for item in items {
                transform_payloads(item, f, to_hex)?;
            }
        }
        PDFObject::Dictionary(dict) => {
            for value in dict.values_mut() {
                transform_payloads(value, f, to_hex)?;
            }
        }
        PDFObject::Stream(stream) => {
            for value in stream.dict_mut().values_mut() {
                transform_payloads(value, f, to_hex)?;
            }
            let data = f(stream.raw_data())?;
            stream.set_raw_data(data);
        }
        _ => {}
    }
    Ok(())
}
