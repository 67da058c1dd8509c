//! AES encryption provider implementation

use ::aes::cipher::block_padding::Pkcs7;
use ::aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use ::aes::{Aes128, Aes256};
use rand::{thread_rng, RngCore};

use crate::error::{PDFError, PDFResult};
use super::CryptoProvider;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

const BLOCK_SIZE: usize = 16;

/// AES-CBC provider; the 16-byte IV is prepended to the ciphertext
#[derive(Debug)]
pub(crate) struct AESProvider;

impl CryptoProvider for AESProvider {
    fn encrypt(&self, data: &[u8], key: &[u8]) -> PDFResult<Vec<u8>> {
        let mut iv = [0u8; BLOCK_SIZE];
        thread_rng().fill_bytes(&mut iv);

        let ciphertext = match key.len() {
            16 => Aes128CbcEnc::new_from_slices(key, &iv)?.encrypt_padded_vec_mut::<Pkcs7>(data),
            32 => Aes256CbcEnc::new_from_slices(key, &iv)?.encrypt_padded_vec_mut::<Pkcs7>(data),
            other => return Err(PDFError::InvalidKeyLength(other)),
        };

        let mut output = Vec::with_capacity(BLOCK_SIZE + ciphertext.len());
        output.extend_from_slice(&iv);
        output.extend_from_slice(&ciphertext);
        Ok(output)
    }

    fn decrypt(&self, data: &[u8], key: &[u8]) -> PDFResult<Vec<u8>> {
        if key.len() != 16 && key.len() != 32 {
            return Err(PDFError::InvalidKeyLength(key.len()));
        }
        if data.len() < BLOCK_SIZE || data.len() % BLOCK_SIZE != 0 {
            return Err(PDFError::invalid_length("AES decryption"));
        }

        let (iv, ciphertext) = data.split_at(BLOCK_SIZE);
        if ciphertext.is_empty() {
            return Ok(Vec::new());
        }

        let plaintext = if key.len() == 16 {
            Aes128CbcDec::new_from_slices(key, iv)?.decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        } else {
            Aes256CbcDec::new_from_slices(key, iv)?.decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        };
        plaintext.map_err(|_| PDFError::crypto("invalid AES padding"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(16)]
    #[case(32)]
    fn test_aes_roundtrip(#[case] key_len: usize) {
        let key = vec![1u8; key_len];
        let data = b"Test AES encryption with CBC mode".to_vec();

        let encrypted = AESProvider.encrypt(&data, &key).unwrap();
        // IV plus data padded to the next block
        assert_eq!(encrypted.len(), 16 + 48);
        assert_ne!(&encrypted[16..], &data[..]);
        assert_eq!(AESProvider.decrypt(&encrypted, &key).unwrap(), data);
    }

    #[test]
    fn test_iv_is_random() {
        let key = [7u8; 16];
        let a = AESProvider.encrypt(b"same", &key).unwrap();
        let b = AESProvider.encrypt(b"same", &key).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_invalid_key_length() {
        assert!(matches!(
            AESProvider.encrypt(&[0u8; 32], &[1u8; 24]),
            Err(PDFError::InvalidKeyLength(24))
        ));
    }

    #[test]
    fn test_invalid_data_length() {
        let key = [1u8; 16];
        assert!(matches!(
            AESProvider.decrypt(&[0u8; 8], &key),
            Err(PDFError::InvalidDataLength { .. })
        ));
        assert!(matches!(
            AESProvider.decrypt(&[0u8; 20], &key),
            Err(PDFError::InvalidDataLength { .. })
        ));
    }

    #[test]
    fn test_wrong_key_fails_padding() {
        let encrypted = AESProvider.encrypt(b"secret text", &[1u8; 16]).unwrap();
        let result = AESProvider.decrypt(&encrypted, &[2u8; 16]);
        // a wrong key almost always breaks the padding
        if let Ok(plain) = result {
            assert_ne!(plain, b"secret text");
        }
    }
}
