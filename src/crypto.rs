//
// Copyright 2020-2022 Signal Messenger, LLC.
// SPDX-License-Identifier: AGPL-3.0-only
//

//! Application of symmetric cryptographic primitives: AES-256-CBC, HMAC-SHA256 and HKDF.

use crate::{Result, SignalProtocolError};

use aes::Aes256;
use block_modes::{block_padding::Pkcs7, BlockMode, Cbc};
use hkdf::Hkdf;
use hmac::{Hmac, Mac, NewMac};
use sha2::Sha256;

/// The required length of the key provided to the AES-256 methods in this module.
pub const AES_KEY_SIZE: usize = 32;

/// The length of the initialization vector used in CBC mode.
pub const AES_IV_SIZE: usize = 16;

/// Encrypt `ptext` using `key` and `iv` with AES-256 in CBC mode, padding with PKCS#7.
pub fn aes_256_cbc_encrypt(
    ptext: &[u8],
    key: &[u8; AES_KEY_SIZE],
    iv: &[u8; AES_IV_SIZE],
) -> Result<Vec<u8>> {
    match Cbc::<Aes256, Pkcs7>::new_var(key, iv) {
        Ok(mode) => Ok(mode.encrypt_vec(ptext)),
        Err(block_modes::InvalidKeyIvLength) => Err(SignalProtocolError::InvalidArgument(format!(
            "bad AES key ({}) or IV ({}) length",
            key.len(),
            iv.len()
        ))),
    }
}

/// Decrypt `ctext` using `key` and `iv` with AES-256 in CBC mode.
///
/// Truncated input and padding failures both surface as [SignalProtocolError::InvalidCiphertext].
pub fn aes_256_cbc_decrypt(
    ctext: &[u8],
    key: &[u8; AES_KEY_SIZE],
    iv: &[u8; AES_IV_SIZE],
) -> Result<Vec<u8>> {
    if ctext.is_empty() || ctext.len() % 16 != 0 {
        return Err(SignalProtocolError::InvalidCiphertext);
    }

    let mode = match Cbc::<Aes256, Pkcs7>::new_var(key, iv) {
        Ok(mode) => mode,
        Err(block_modes::InvalidKeyIvLength) => {
            return Err(SignalProtocolError::InvalidArgument(format!(
                "bad AES key ({}) or IV ({}) length",
                key.len(),
                iv.len()
            )))
        }
    };

    mode.decrypt_vec(ctext)
        .map_err(|_| SignalProtocolError::InvalidCiphertext)
}

/// The statically-known size of the output of [hmac_sha256].
pub const HMAC_OUTPUT_SIZE: usize = 32;

/// Calculate the HMAC-SHA256 code over `input` using `key`.
pub fn hmac_sha256(key: &[u8], input: &[u8]) -> [u8; HMAC_OUTPUT_SIZE] {
    let mut hmac = crate::utils::unwrap::no_hmac_varkey_error(Hmac::<Sha256>::new_varkey(key));
    hmac.update(input);
    hmac.finalize().into_bytes().into()
}

/// RFC 5869 HKDF with HMAC-SHA256.
///
/// An absent salt behaves identically to a 32-zero-byte salt, since HMAC-SHA256 zero-pads its
/// key to the block size.
pub fn hkdf_sha256(ikm: &[u8], salt: Option<&[u8]>, info: &[u8], output_length: usize) -> Vec<u8> {
    let mut okm = vec![0u8; output_length];
    Hkdf::<Sha256>::new(salt, ikm)
        .expand(info, &mut okm)
        .expect("valid output length");
    okm
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrayref::array_ref;

    #[test]
    fn aes_cbc_test() -> Result<()> {
        let key = hex::decode("4e22eb16d964779994222e82192ce9f747da72dc4abe49dfdeeb71d0ffe3796e")
            .expect("valid hex");
        let key = array_ref![&key, 0, 32];
        let iv = hex::decode("6f8a557ddc0a140c878063a6d5f31d3d").expect("valid hex");
        let iv = array_ref![&iv, 0, 16];

        let ptext = hex::decode("30736294a124482a4159").expect("valid hex");

        let ctext = aes_256_cbc_encrypt(&ptext, key, iv)?;
        assert_eq!(hex::encode(&ctext), "dd3f573ab4508b9ed0e45e0baf5608f3");

        let recovered = aes_256_cbc_decrypt(&ctext, key, iv)?;
        assert_eq!(hex::encode(&ptext), hex::encode(&recovered));

        // padding is invalid:
        assert!(aes_256_cbc_decrypt(&recovered, key, iv).is_err());
        assert!(aes_256_cbc_decrypt(&ctext, key, array_ref![&ctext, 0, 16]).is_err());

        // bitflip the IV to cause a change in the recovered text
        let bad_iv = hex::decode("ef8a557ddc0a140c878063a6d5f31d3d").expect("valid hex");
        let recovered = aes_256_cbc_decrypt(&ctext, key, array_ref![&bad_iv, 0, 16])?;
        assert_eq!(hex::encode(recovered), "b0736294a124482a4159");

        Ok(())
    }

    #[test]
    fn hkdf_salt_default_matches_zero_salt() {
        let ikm = [0x42u8; 32];
        let zero_salt = [0u8; 32];
        assert_eq!(
            hkdf_sha256(&ikm, None, b"test", 64),
            hkdf_sha256(&ikm, Some(&zero_salt), b"test", 64)
        );
    }
}
