//
// Copyright 2020-2022 Signal Messenger, LLC.
// SPDX-License-Identifier: AGPL-3.0-only
//

//! Typed wrappers over the Curve25519 primitives in [curve25519].

pub mod curve25519;

pub use curve25519::{AGREEMENT_LENGTH, PRIVATE_KEY_LENGTH, PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH};

use crate::utils::constant_time_cmp;
use crate::{Result, SignalProtocolError};

use std::cmp::Ordering;
use std::convert::TryFrom;
use std::fmt;

use arrayref::array_ref;
use rand::{CryptoRng, Rng};
use subtle::ConstantTimeEq;

/// Encapsulate the variant of key being used.
///
/// Currently the only supported type is a "djb"-style [Self::Curve25519] key, but the wire
/// encoding reserves a leading type octet so that another curve supporting both signatures and
/// Diffie-Hellman agreements could be introduced later.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum KeyType {
    Curve25519,
}

impl KeyType {
    fn value(&self) -> u8 {
        match &self {
            KeyType::Curve25519 => 0x05u8,
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl TryFrom<u8> for KeyType {
    type Error = SignalProtocolError;

    fn try_from(x: u8) -> Result<Self> {
        match x {
            0x05u8 => Ok(KeyType::Curve25519),
            t => Err(SignalProtocolError::BadKeyType(t)),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum PublicKeyData {
    Curve25519PublicKey([u8; PUBLIC_KEY_LENGTH]),
}

impl AsRef<[u8]> for PublicKeyData {
    fn as_ref(&self) -> &[u8] {
        match self {
            PublicKeyData::Curve25519PublicKey(inner) => inner,
        }
    }
}

/// Public key half of a [KeyPair].
#[derive(Clone, Copy, Eq)]
pub struct PublicKey {
    key: PublicKeyData,
}

impl PublicKey {
    fn new(key: PublicKeyData) -> Self {
        Self { key }
    }

    /// Parse the type-prefixed encoding produced by [Self::serialize].
    ///
    /// Trailing data after the key bytes is tolerated, matching other implementations of the
    /// wire protocol.
    pub fn deserialize(value: &[u8]) -> Result<Self> {
        if value.is_empty() {
            return Err(SignalProtocolError::NoKeyTypeIdentifier);
        }
        let key_type = KeyType::try_from(value[0])?;
        match key_type {
            KeyType::Curve25519 => {
                if value.len() < PUBLIC_KEY_LENGTH + 1 {
                    return Err(SignalProtocolError::BadKeyLength(
                        KeyType::Curve25519,
                        value.len(),
                    ));
                }
                Ok(PublicKey {
                    key: PublicKeyData::Curve25519PublicKey(*array_ref![
                        value,
                        1,
                        PUBLIC_KEY_LENGTH
                    ]),
                })
            }
        }
    }

    /// Interpret `bytes` as a raw (unprefixed) Curve25519 public key.
    pub fn from_djb_public_key_bytes(bytes: &[u8]) -> Result<Self> {
        match <[u8; PUBLIC_KEY_LENGTH]>::try_from(bytes) {
            Err(_) => Err(SignalProtocolError::BadKeyLength(
                KeyType::Curve25519,
                bytes.len(),
            )),
            Ok(key) => Ok(PublicKey {
                key: PublicKeyData::Curve25519PublicKey(key),
            }),
        }
    }

    /// The type-prefixed encoding: `0x05 || key`.
    pub fn serialize(&self) -> Box<[u8]> {
        let value_len = self.key.as_ref().len();
        let mut result = Vec::with_capacity(1 + value_len);
        result.push(self.key_type().value());
        result.extend_from_slice(self.key.as_ref());
        result.into_boxed_slice()
    }

    /// The raw key bytes, without the type prefix.
    pub fn public_key_bytes(&self) -> &[u8] {
        self.key.as_ref()
    }

    /// Check an XEdDSA signature over `message` against this key.
    ///
    /// Structurally malformed signatures report `false` rather than an error.
    pub fn verify_signature(&self, message: &[u8], signature: &[u8]) -> Result<bool> {
        if signature.len() != SIGNATURE_LENGTH {
            return Ok(false);
        }
        match self.key {
            PublicKeyData::Curve25519PublicKey(pub_key) => Ok(curve25519::KeyPair::verify_signature(
                &pub_key,
                message,
                array_ref![signature, 0, SIGNATURE_LENGTH],
            )),
        }
    }

    pub fn key_type(&self) -> KeyType {
        match self.key {
            PublicKeyData::Curve25519PublicKey(_) => KeyType::Curve25519,
        }
    }
}

impl TryFrom<&[u8]> for PublicKey {
    type Error = SignalProtocolError;

    fn try_from(value: &[u8]) -> Result<Self> {
        Self::deserialize(value)
    }
}

impl subtle::ConstantTimeEq for PublicKey {
    /// A constant-time comparison as long as the two keys have a matching type.
    ///
    /// If the two keys have different types, the comparison short-circuits, much like comparing
    /// two slices of different lengths.
    fn ct_eq(&self, other: &PublicKey) -> subtle::Choice {
        if self.key_type() != other.key_type() {
            return 0.ct_eq(&1);
        }
        self.public_key_bytes().ct_eq(other.public_key_bytes())
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &PublicKey) -> bool {
        bool::from(self.ct_eq(other))
    }
}

impl Ord for PublicKey {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.key_type() != other.key_type() {
            return self.key_type().cmp(&other.key_type());
        }
        constant_time_cmp(self.public_key_bytes(), other.public_key_bytes())
    }
}

impl PartialOrd for PublicKey {
    fn partial_cmp(&self, other: &PublicKey) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "PublicKey {{ key_type={}, serialize={:?} }}",
            self.key_type(),
            self.serialize()
        )
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum PrivateKeyData {
    Curve25519PrivateKey([u8; PRIVATE_KEY_LENGTH]),
}

/// Private key half of a [KeyPair].
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct PrivateKey {
    key: PrivateKeyData,
}

impl PrivateKey {
    /// Interpret `value` as a Curve25519 private key, clamping it per X25519.
    pub fn deserialize(value: &[u8]) -> Result<Self> {
        if value.len() != PRIVATE_KEY_LENGTH {
            return Err(SignalProtocolError::BadKeyLength(
                KeyType::Curve25519,
                value.len(),
            ));
        }
        let key = curve25519::clamp_private_key_bytes(*array_ref![value, 0, PRIVATE_KEY_LENGTH]);
        Ok(Self {
            key: PrivateKeyData::Curve25519PrivateKey(key),
        })
    }

    pub fn serialize(&self) -> Vec<u8> {
        match self.key {
            PrivateKeyData::Curve25519PrivateKey(v) => v.to_vec(),
        }
    }

    /// Derive the public key matching this private key.
    pub fn public_key(&self) -> PublicKey {
        match self.key {
            PrivateKeyData::Curve25519PrivateKey(private_key) => {
                PublicKey::new(PublicKeyData::Curve25519PublicKey(
                    curve25519::derive_public_key(&private_key),
                ))
            }
        }
    }

    /// Calculate an XEdDSA signature over `message` with this private key.
    pub fn calculate_signature<R: CryptoRng + Rng>(
        &self,
        message: &[u8],
        csprng: &mut R,
    ) -> [u8; SIGNATURE_LENGTH] {
        match self.key {
            PrivateKeyData::Curve25519PrivateKey(k) => {
                curve25519::KeyPair::from(k).calculate_signature(csprng, message)
            }
        }
    }

    /// Calculate a shared secret between this private key and the public key `their_key`.
    pub fn calculate_agreement(&self, their_key: &PublicKey) -> [u8; AGREEMENT_LENGTH] {
        match (self.key, their_key.key) {
            (
                PrivateKeyData::Curve25519PrivateKey(priv_key),
                PublicKeyData::Curve25519PublicKey(pub_key),
            ) => curve25519::KeyPair::from(priv_key).calculate_agreement(&pub_key),
        }
    }

    pub fn key_type(&self) -> KeyType {
        match self.key {
            PrivateKeyData::Curve25519PrivateKey(_) => KeyType::Curve25519,
        }
    }
}

impl TryFrom<&[u8]> for PrivateKey {
    type Error = SignalProtocolError;

    fn try_from(value: &[u8]) -> Result<Self> {
        Self::deserialize(value)
    }
}

/// A matching public and private key.
#[derive(Clone, Copy)]
pub struct KeyPair {
    pub public_key: PublicKey,
    pub private_key: PrivateKey,
}

impl KeyPair {
    /// Create a new keypair from random state.
    pub fn generate<R: Rng + CryptoRng>(csprng: &mut R) -> Self {
        let keypair = curve25519::KeyPair::new(csprng);

        let public_key = PublicKey::new(PublicKeyData::Curve25519PublicKey(*keypair.public_key()));
        let private_key = PrivateKey {
            key: PrivateKeyData::Curve25519PrivateKey(*keypair.private_key()),
        };

        Self {
            public_key,
            private_key,
        }
    }

    /// Instantiate a keypair from known halves.
    pub fn new(public_key: PublicKey, private_key: PrivateKey) -> Self {
        Self {
            public_key,
            private_key,
        }
    }

    /// Instantiate a keypair from serialized public and private keys.
    pub fn from_public_and_private(public_key: &[u8], private_key: &[u8]) -> Result<Self> {
        let public_key = PublicKey::try_from(public_key)?;
        let private_key = PrivateKey::try_from(private_key)?;
        Ok(Self {
            public_key,
            private_key,
        })
    }

    pub fn calculate_signature<R: CryptoRng + Rng>(
        &self,
        message: &[u8],
        csprng: &mut R,
    ) -> [u8; SIGNATURE_LENGTH] {
        self.private_key.calculate_signature(message, csprng)
    }

    pub fn calculate_agreement(&self, their_key: &PublicKey) -> [u8; AGREEMENT_LENGTH] {
        self.private_key.calculate_agreement(their_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn test_large_signatures() -> Result<()> {
        let mut csprng = OsRng;
        let key_pair = KeyPair::generate(&mut csprng);
        let mut message = [0u8; 1024 * 1024];
        let signature = key_pair
            .private_key
            .calculate_signature(&message, &mut csprng);

        assert!(key_pair.public_key.verify_signature(&message, &signature)?);
        message[0] ^= 0x01u8;
        assert!(!key_pair.public_key.verify_signature(&message, &signature)?);
        message[0] ^= 0x01u8;
        let public_key = key_pair.private_key.public_key();
        assert!(public_key.verify_signature(&message, &signature)?);

        Ok(())
    }

    #[test]
    fn test_decode_size() -> Result<()> {
        let mut csprng = OsRng;
        let key_pair = KeyPair::generate(&mut csprng);
        let serialized_public = key_pair.public_key.serialize();

        assert_eq!(
            serialized_public,
            key_pair.private_key.public_key().serialize()
        );
        let empty: [u8; 0] = [];

        let just_right = PublicKey::try_from(&serialized_public[..]);

        assert!(just_right.is_ok());
        assert!(PublicKey::try_from(&serialized_public[1..]).is_err());
        assert!(PublicKey::try_from(&empty[..]).is_err());

        let mut bad_key_type = [0u8; 33];
        bad_key_type[..].copy_from_slice(&serialized_public[..]);
        bad_key_type[0] = 0x01u8;
        assert!(PublicKey::try_from(&bad_key_type[..]).is_err());

        let mut extra_space = [0u8; 34];
        extra_space[..33].copy_from_slice(&serialized_public[..]);
        let extra_space_decode = PublicKey::try_from(&extra_space[..]);
        assert!(extra_space_decode.is_ok());

        assert_eq!(&serialized_public[..], &just_right?.serialize()[..]);
        assert_eq!(&serialized_public[..], &extra_space_decode?.serialize()[..]);
        Ok(())
    }

    #[test]
    fn test_agreement_matches_across_roles() {
        let mut csprng = OsRng;
        let alice = KeyPair::generate(&mut csprng);
        let bob = KeyPair::generate(&mut csprng);

        assert_eq!(
            alice.calculate_agreement(&bob.public_key),
            bob.calculate_agreement(&alice.public_key)
        );
    }
}
