//
// Copyright 2020-2022 Signal Messenger, LLC.
// SPDX-License-Identifier: AGPL-3.0-only
//

//! X25519 key agreement and XEdDSA signatures over Curve25519.
//!
//! Signatures follow the [XEdDSA] scheme: the Montgomery private scalar doubles as an Ed25519
//! signing key, with the sign bit of the derived Edwards point carried in the top bit of the
//! signature's final byte.
//!
//! [XEdDSA]: https://signal.org/docs/specifications/xeddsa/

use curve25519_dalek::constants::ED25519_BASEPOINT_TABLE;
use curve25519_dalek::edwards::EdwardsPoint;
use curve25519_dalek::montgomery::MontgomeryPoint;
use curve25519_dalek::scalar::Scalar;

use rand::{CryptoRng, Rng};
use sha2::{Digest, Sha512};
use subtle::ConstantTimeEq;

pub const AGREEMENT_LENGTH: usize = 32;
pub const PRIVATE_KEY_LENGTH: usize = 32;
pub const PUBLIC_KEY_LENGTH: usize = 32;
pub const SIGNATURE_LENGTH: usize = 64;

/// Clamp `bytes` into a valid X25519 scalar.
pub(crate) fn clamp_private_key_bytes(mut bytes: [u8; PRIVATE_KEY_LENGTH]) -> [u8; PRIVATE_KEY_LENGTH] {
    bytes[0] &= 0xF8;
    bytes[31] &= 0x7F;
    bytes[31] |= 0x40;
    bytes
}

/// Derive the Montgomery public key for a clamped private key.
pub(crate) fn derive_public_key(private_key: &[u8; PRIVATE_KEY_LENGTH]) -> [u8; PUBLIC_KEY_LENGTH] {
    (&Scalar::from_bits(*private_key) * &ED25519_BASEPOINT_TABLE)
        .to_montgomery()
        .to_bytes()
}

/// A raw Curve25519 keypair. [crate::curve::KeyPair] is the typed wrapper used elsewhere.
#[derive(Clone, Copy)]
pub struct KeyPair {
    private_key: [u8; PRIVATE_KEY_LENGTH],
    public_key: [u8; PUBLIC_KEY_LENGTH],
}

impl KeyPair {
    pub fn new<R: CryptoRng + Rng>(csprng: &mut R) -> Self {
        let mut private_key = [0u8; PRIVATE_KEY_LENGTH];
        csprng.fill_bytes(&mut private_key);
        Self::from(private_key)
    }

    #[inline]
    pub fn private_key(&self) -> &[u8; PRIVATE_KEY_LENGTH] {
        &self.private_key
    }

    #[inline]
    pub fn public_key(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        &self.public_key
    }

    pub fn calculate_agreement(
        &self,
        their_public_key: &[u8; PUBLIC_KEY_LENGTH],
    ) -> [u8; AGREEMENT_LENGTH] {
        (&MontgomeryPoint(*their_public_key) * &Scalar::from_bits(self.private_key)).to_bytes()
    }

    pub fn calculate_signature<R: CryptoRng + Rng>(
        &self,
        csprng: &mut R,
        message: &[u8],
    ) -> [u8; SIGNATURE_LENGTH] {
        let mut random_bytes = [0u8; 64];
        csprng.fill_bytes(&mut random_bytes);

        let a = Scalar::from_bits(self.private_key);
        let ed_public_key_point = &a * &ED25519_BASEPOINT_TABLE;
        let ed_public_key = ed_public_key_point.compress();
        let sign_bit = ed_public_key.as_bytes()[31] & 0b1000_0000_u8;

        // Nonce domain separation prefix per the XEdDSA specification.
        let mut hash_prefix = [0xFFu8; 32];
        hash_prefix[0] = 0xFE;

        let mut nonce_hash = Sha512::new();
        nonce_hash.update(&hash_prefix[..]);
        nonce_hash.update(&self.private_key[..]);
        nonce_hash.update(message);
        nonce_hash.update(&random_bytes[..]);
        let r = Scalar::from_hash(nonce_hash);
        let cap_r = (&r * &ED25519_BASEPOINT_TABLE).compress();

        let mut challenge_hash = Sha512::new();
        challenge_hash.update(cap_r.as_bytes());
        challenge_hash.update(ed_public_key.as_bytes());
        challenge_hash.update(message);
        let h = Scalar::from_hash(challenge_hash);

        let s = (h * a) + r;

        let mut result = [0u8; SIGNATURE_LENGTH];
        result[..32].copy_from_slice(cap_r.as_bytes());
        result[32..].copy_from_slice(s.as_bytes());
        result[SIGNATURE_LENGTH - 1] &= 0b0111_1111_u8;
        result[SIGNATURE_LENGTH - 1] |= sign_bit;
        result
    }

    pub fn verify_signature(
        their_public_key: &[u8; PUBLIC_KEY_LENGTH],
        message: &[u8],
        signature: &[u8; SIGNATURE_LENGTH],
    ) -> bool {
        let sign_bit = (signature[SIGNATURE_LENGTH - 1] & 0b1000_0000_u8) >> 7;
        let ed_public_key_point = match MontgomeryPoint(*their_public_key).to_edwards(sign_bit) {
            Some(point) => point,
            None => return false,
        };
        let cap_a = ed_public_key_point.compress();

        let mut cap_r = [0u8; 32];
        cap_r.copy_from_slice(&signature[..32]);
        let mut s = [0u8; 32];
        s.copy_from_slice(&signature[32..]);
        s[31] &= 0b0111_1111_u8;
        if (s[31] & 0b1110_0000_u8) != 0 {
            return false;
        }

        let mut challenge_hash = Sha512::new();
        challenge_hash.update(&cap_r[..]);
        challenge_hash.update(cap_a.as_bytes());
        challenge_hash.update(message);
        let h = Scalar::from_hash(challenge_hash);

        let cap_r_check = EdwardsPoint::vartime_double_scalar_mul_basepoint(
            &h,
            &(-ed_public_key_point),
            &Scalar::from_bits(s),
        )
        .compress();

        bool::from(cap_r_check.as_bytes().ct_eq(&cap_r))
    }
}

impl From<[u8; PRIVATE_KEY_LENGTH]> for KeyPair {
    fn from(private_key: [u8; PRIVATE_KEY_LENGTH]) -> Self {
        let private_key = clamp_private_key_bytes(private_key);
        let public_key = derive_public_key(&private_key);
        Self {
            private_key,
            public_key,
        }
    }
}
