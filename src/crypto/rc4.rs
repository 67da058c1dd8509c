//! RC4 encryption provider implementation

use rc4::consts::{U10, U11, U12, U13, U14, U15, U16, U5, U6, U7, U8, U9};
use rc4::{KeyInit, Rc4, StreamCipher};

use crate::error::{PDFError, PDFResult};
use super::CryptoProvider;

/// RC4 encryption provider for 40 to 128 bit keys
#[derive(Debug)]
pub(crate) struct RC4Provider;

fn apply_keystream<C: KeyInit + StreamCipher>(key: &[u8], data: &mut [u8]) -> PDFResult<()> {
    let mut cipher = C::new_from_slice(key).map_err(|_| PDFError::InvalidKeyLength(key.len()))?;
    cipher.apply_keystream(data);
    Ok(())
}

impl RC4Provider {
    fn process(&self, data: &[u8], key: &[u8]) -> PDFResult<Vec<u8>> {
        let mut output = data.to_vec();
        // the cipher's key size is a type parameter
        match key.len() {
            5 => apply_keystream::<Rc4<U5>>(key, &mut output)?,
            6 => apply_keystream::<Rc4<U6>>(key, &mut output)?,
            7 => apply_keystream::<Rc4<U7>>(key, &mut output)?,
            8 => apply_keystream::<Rc4<U8>>(key, &mut output)?,
            9 => apply_keystream::<Rc4<U9>>(key, &mut output)?,
            10 => apply_keystream::<Rc4<U10>>(key, &mut output)?,
            11 => apply_keystream::<Rc4<U11>>(key, &mut output)?,
            12 => apply_keystream::<Rc4<U12>>(key, &mut output)?,
            13 => apply_keystream::<Rc4<U13>>(key, &mut output)?,
            14 => apply_keystream::<Rc4<U14>>(key, &mut output)?,
            15 => apply_keystream::<Rc4<U15>>(key, &mut output)?,
            16 => apply_keystream::<Rc4<U16>>(key, &mut output)?,
            other => return Err(PDFError::InvalidKeyLength(other)),
        }
        Ok(output)
    }
}

impl CryptoProvider for RC4Provider {
    fn encrypt(&self, data: &[u8], key: &[u8]) -> PDFResult<Vec<u8>> {
        self.process(data, key)
    }

    fn decrypt(&self, data: &[u8], key: &[u8]) -> PDFResult<Vec<u8>> {
        self.process(data, key)
    }
}
