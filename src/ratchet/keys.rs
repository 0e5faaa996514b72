//
// Copyright 2020-2022 Signal Messenger, LLC.
// SPDX-License-Identifier: AGPL-3.0-only
//

//! The three kinds of key evolved by the Double Ratchet.

use crate::proto::storage;
use crate::{crypto, PrivateKey, PublicKey, Result, SignalProtocolError};

use std::convert::TryInto;
use std::fmt;

use arrayref::array_ref;

pub const CIPHER_KEY_LEN: usize = 32;
pub const MAC_KEY_LEN: usize = 32;
pub const IV_LEN: usize = 16;

const CHAIN_KEY_LEN: usize = 32;
const ROOT_KEY_LEN: usize = 32;

/// The per-message keys expanded from one chain-key step: an AES-256 key, an HMAC-SHA256 key
/// and a CBC initialization vector.
#[derive(Copy, Clone, Debug)]
pub struct MessageKeys {
    cipher_key: [u8; CIPHER_KEY_LEN],
    mac_key: [u8; MAC_KEY_LEN],
    iv: [u8; IV_LEN],
    counter: u32,
}

impl MessageKeys {
    pub fn new(
        cipher_key: [u8; CIPHER_KEY_LEN],
        mac_key: [u8; MAC_KEY_LEN],
        iv: [u8; IV_LEN],
        counter: u32,
    ) -> Self {
        MessageKeys {
            cipher_key,
            mac_key,
            iv,
            counter,
        }
    }

    pub(crate) fn derive_keys(input_key_material: &[u8], counter: u32) -> Self {
        let okm = crypto::hkdf_sha256(input_key_material, None, b"WhisperMessageKeys", 80);

        Self::new(
            *array_ref![okm, 0, CIPHER_KEY_LEN],
            *array_ref![okm, CIPHER_KEY_LEN, MAC_KEY_LEN],
            *array_ref![okm, CIPHER_KEY_LEN + MAC_KEY_LEN, IV_LEN],
            counter,
        )
    }

    #[inline]
    pub fn cipher_key(&self) -> &[u8; CIPHER_KEY_LEN] {
        &self.cipher_key
    }

    #[inline]
    pub fn mac_key(&self) -> &[u8; MAC_KEY_LEN] {
        &self.mac_key
    }

    #[inline]
    pub fn iv(&self) -> &[u8; IV_LEN] {
        &self.iv
    }

    #[inline]
    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub(crate) fn into_protobuf(self) -> storage::MessageKey {
        storage::MessageKey {
            index: self.counter,
            cipher_key: self.cipher_key.to_vec(),
            mac_key: self.mac_key.to_vec(),
            iv: self.iv.to_vec(),
        }
    }

    pub(crate) fn from_protobuf(proto: &storage::MessageKey) -> Result<Self> {
        Ok(Self {
            counter: proto.index,
            cipher_key: proto
                .cipher_key
                .as_slice()
                .try_into()
                .map_err(|_| SignalProtocolError::InvalidProtobufEncoding)?,
            mac_key: proto
                .mac_key
                .as_slice()
                .try_into()
                .map_err(|_| SignalProtocolError::InvalidMacKeyLength(proto.mac_key.len()))?,
            iv: proto
                .iv
                .as_slice()
                .try_into()
                .map_err(|_| SignalProtocolError::InvalidProtobufEncoding)?,
        })
    }
}

/// A chain key produces the message key for the current counter and its own successor.
#[derive(Copy, Clone, Debug)]
pub struct ChainKey {
    key: [u8; CHAIN_KEY_LEN],
    index: u32,
}

impl ChainKey {
    const MESSAGE_KEY_SEED: [u8; 1] = [0x01u8];
    const CHAIN_KEY_SEED: [u8; 1] = [0x02u8];

    pub fn new(key: [u8; CHAIN_KEY_LEN], index: u32) -> Self {
        Self { key, index }
    }

    #[inline]
    pub fn key(&self) -> &[u8; CHAIN_KEY_LEN] {
        &self.key
    }

    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    pub(crate) fn next_chain_key(&self) -> Self {
        Self {
            key: self.calculate_base_material(Self::CHAIN_KEY_SEED),
            index: self.index + 1,
        }
    }

    pub(crate) fn message_keys(&self) -> MessageKeys {
        MessageKeys::derive_keys(
            &self.calculate_base_material(Self::MESSAGE_KEY_SEED),
            self.index,
        )
    }

    fn calculate_base_material(&self, seed: [u8; 1]) -> [u8; CHAIN_KEY_LEN] {
        crypto::hmac_sha256(&self.key, &seed)
    }

    pub(crate) fn into_protobuf(self) -> storage::ChainKey {
        storage::ChainKey {
            index: self.index,
            key: self.key.to_vec(),
        }
    }

    pub(crate) fn from_protobuf(proto: &storage::ChainKey) -> Result<Self> {
        Ok(Self {
            key: proto
                .key
                .as_slice()
                .try_into()
                .map_err(|_| SignalProtocolError::InvalidProtobufEncoding)?,
            index: proto.index,
        })
    }
}

/// A root key seeds a new pair of (root key, chain key) at every DH ratchet step.
#[derive(Copy, Clone, Debug)]
pub struct RootKey {
    key: [u8; ROOT_KEY_LEN],
}

impl RootKey {
    pub fn new(key: [u8; ROOT_KEY_LEN]) -> Self {
        Self { key }
    }

    pub fn key(&self) -> &[u8; ROOT_KEY_LEN] {
        &self.key
    }

    pub(crate) fn create_chain(
        &self,
        their_ratchet_key: &PublicKey,
        our_ratchet_key: &PrivateKey,
    ) -> (RootKey, ChainKey) {
        let shared_secret = our_ratchet_key.calculate_agreement(their_ratchet_key);
        let derived = crypto::hkdf_sha256(
            &shared_secret,
            Some(&self.key),
            b"WhisperRatchet",
            ROOT_KEY_LEN + CHAIN_KEY_LEN,
        );

        (
            RootKey {
                key: *array_ref![derived, 0, ROOT_KEY_LEN],
            },
            ChainKey {
                key: *array_ref![derived, ROOT_KEY_LEN, CHAIN_KEY_LEN],
                index: 0,
            },
        )
    }
}

impl fmt::Display for RootKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", hex::encode(self.key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_key_derivation() {
        let seed = [
            0x8au8, 0xb7, 0x2d, 0x6f, 0x4c, 0xc5, 0xac, 0x0d, 0x38, 0x7e, 0xaf, 0x46, 0x33, 0x78,
            0xdd, 0xb2, 0x8e, 0xdd, 0x07, 0x38, 0x5b, 0x1c, 0xb0, 0x12, 0x50, 0xc7, 0x15, 0x98,
            0x2e, 0x7a, 0xd4, 0x8f,
        ];
        let message_key = [
            0xbfu8, 0x51, 0xe9, 0xd7, 0x5e, 0x0e, 0x31, 0x03, 0x10, 0x51, 0xf8, 0x2a, 0x24, 0x91,
            0xff, 0xc0, 0x84, 0xfa, 0x29, 0x8b, 0x77, 0x93, 0xbd, 0x9d, 0xb6, 0x20, 0x05, 0x6f,
            0xeb, 0xf4, 0x52, 0x17,
        ];
        let mac_key = [
            0xc6u8, 0xc7, 0x7d, 0x6a, 0x73, 0xa3, 0x54, 0x33, 0x7a, 0x56, 0x43, 0x5e, 0x34, 0x60,
            0x7d, 0xfe, 0x48, 0xe3, 0xac, 0xe1, 0x4e, 0x77, 0x31, 0x4d, 0xc6, 0xab, 0xc1, 0x72,
            0xe7, 0xa7, 0x03, 0x0b,
        ];
        let next_chain_key = [
            0x28u8, 0xe8, 0xf8, 0xfe, 0xe5, 0x4b, 0x80, 0x1e, 0xef, 0x7c, 0x5c, 0xfb, 0x2f, 0x17,
            0xf3, 0x2c, 0x7b, 0x33, 0x44, 0x85, 0xbb, 0xb7, 0x0f, 0xac, 0x6e, 0xc1, 0x03, 0x42,
            0xa2, 0x46, 0xd1, 0x5d,
        ];

        let chain_key = ChainKey::new(seed, 0);
        assert_eq!(&seed, chain_key.key());
        assert_eq!(&message_key, chain_key.message_keys().cipher_key());
        assert_eq!(&mac_key, chain_key.message_keys().mac_key());
        assert_eq!(&next_chain_key, chain_key.next_chain_key().key());
        assert_eq!(0, chain_key.index());
        assert_eq!(0, chain_key.message_keys().counter());
        assert_eq!(1, chain_key.next_chain_key().index());
        assert_eq!(1, chain_key.next_chain_key().message_keys().counter());
    }
}
