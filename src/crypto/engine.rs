//! Standard security handler object cipher

use log::trace;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{PDFError, PDFResult};
use super::aes::AESProvider;
use super::rc4::RC4Provider;
use super::{CryptoProvider, Encryption};

static RC4: RC4Provider = RC4Provider;
static AES: AESProvider = AESProvider;

/// Cipher used for strings and streams
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptMethod {
    /// RC4 with a 40 to 128 bit file key
    Rc4,
    /// AES-128-CBC (`AESV2`)
    Aes128,
    /// AES-256-CBC (`AESV3`), the file key is used for every object
    Aes256,
}

impl CryptMethod {
    fn provider(&self) -> &'static dyn CryptoProvider {
        match self {
            CryptMethod::Rc4 => &RC4,
            CryptMethod::Aes128 | CryptMethod::Aes256 => &AES,
        }
    }

    fn check_key(&self, key: &[u8]) -> PDFResult<()> {
        let valid = match self {
            CryptMethod::Rc4 => (5..=16).contains(&key.len()),
            CryptMethod::Aes128 => key.len() == 16,
            CryptMethod::Aes256 => key.len() == 32,
        };
        if valid {
            Ok(())
        } else {
            Err(PDFError::InvalidKeyLength(key.len()))
        }
    }
}

/// Per-object cipher of the standard security handler.
///
/// Takes an already derived file key; password handling lives outside the
/// structural engine.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct StandardCipher {
    #[zeroize(skip)]
    method: CryptMethod,
    file_key: Vec<u8>,
    object_key: Vec<u8>,
}

impl StandardCipher {
    /// Create a cipher from the file key
    pub fn new(method: CryptMethod, file_key: &[u8]) -> PDFResult<Self> {
        method.check_key(file_key)?;
        Ok(Self {
            method,
            file_key: file_key.to_vec(),
            object_key: file_key.to_vec(),
        })
    }

    pub fn method(&self) -> CryptMethod {
        self.method
    }

    /// Key for one object: MD5 over the file key, the low three bytes of the
    /// object number, the low two bytes of the generation and, for AES, the
    /// `sAlT` marker, truncated to the file key length plus five.
    pub fn object_key(&self, number: u32, generation: u16) -> Vec<u8> {
        if self.method == CryptMethod::Aes256 {
            return self.file_key.clone();
        }

        let mut context = md5::Context::new();
        context.consume(&self.file_key);
        context.consume(&number.to_le_bytes()[..3]);
        context.consume(generation.to_le_bytes());
        if self.method == CryptMethod::Aes128 {
            context.consume(b"sAlT");
        }
        let digest = context.finalize();

        let len = (self.file_key.len() + 5).min(16);
        digest.0[..len].to_vec()
    }
}

impl Encryption for StandardCipher {
    fn set_key_for_object(&mut self, number: u32, generation: u16) {
        trace!("Object key for {} {}", number, generation);
        self.object_key.zeroize();
        self.object_key = self.object_key(number, generation);
    }

    fn encrypt(&mut self, data: &[u8]) -> PDFResult<Vec<u8>> {
        self.method.provider().encrypt(data, &self.object_key)
    }

    fn decrypt(&mut self, data: &[u8]) -> PDFResult<Vec<u8>> {
        self.method.provider().decrypt(data, &self.object_key)
    }
}

impl std::fmt::Debug for StandardCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StandardCipher")
            .field("method", &self.method)
            .field("key_len", &self.file_key.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(CryptMethod::Rc4, 5, 10)]
    #[case(CryptMethod::Rc4, 16, 16)]
    #[case(CryptMethod::Aes128, 16, 16)]
    #[case(CryptMethod::Aes256, 32, 32)]
    fn test_object_key_length(#[case] method: CryptMethod, #[case] key_len: usize, #[case] expected: usize) {
        let cipher = StandardCipher::new(method, &vec![0x42; key_len]).unwrap();
        assert_eq!(cipher.object_key(1, 0).len(), expected);
    }

    #[test]
    fn test_object_key_matches_md5() {
        let file_key = [1u8, 2, 3, 4, 5];
        let cipher = StandardCipher::new(CryptMethod::Rc4, &file_key).unwrap();
        let mut input = file_key.to_vec();
        input.extend_from_slice(&[0x0c, 0x00, 0x00, 0x02, 0x00]);
        let expected = md5::compute(&input);
        assert_eq!(cipher.object_key(12, 2), expected.0[..10].to_vec());
    }

    #[test]
    fn test_keys_differ_per_object() {
        let cipher = StandardCipher::new(CryptMethod::Aes128, &[9u8; 16]).unwrap();
        assert_ne!(cipher.object_key(1, 0), cipher.object_key(2, 0));
        assert_ne!(cipher.object_key(1, 0), cipher.object_key(1, 1));
    }

    #[rstest]
    #[case(CryptMethod::Rc4, 16)]
    #[case(CryptMethod::Aes128, 16)]
    #[case(CryptMethod::Aes256, 32)]
    fn test_encryption_decryption(#[case] method: CryptMethod, #[case] key_len: usize) {
        let mut cipher = StandardCipher::new(method, &vec![3u8; key_len]).unwrap();
        let data = b"Hello, PDF encryption!";

        cipher.set_key_for_object(4, 0);
        let encrypted = cipher.encrypt(data).unwrap();
        assert_ne!(&encrypted[..], &data[..]);

        cipher.set_key_for_object(4, 0);
        assert_eq!(cipher.decrypt(&encrypted).unwrap(), data);
    }

    #[test]
    fn test_invalid_file_key() {
        assert!(matches!(
            StandardCipher::new(CryptMethod::Aes128, &[0u8; 5]),
            Err(PDFError::InvalidKeyLength(5))
        ));
        assert!(StandardCipher::new(CryptMethod::Rc4, &[0u8; 4]).is_err());
    }
}
