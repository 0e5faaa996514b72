//
// Copyright 2020-2022 Signal Messenger, LLC.
// SPDX-License-Identifier: AGPL-3.0-only
//

use crate::proto::storage::SignedPreKeyRecordStructure;
use crate::utils::unwrap::no_encoding_error;
use crate::{KeyPair, PrivateKey, PublicKey, Result};

use prost::Message;

/// A unique identifier selecting among this client's known signed prekeys.
pub type SignedPreKeyId = u32;

/// A medium-term prekey whose public half carries a signature by the owner's identity key.
#[derive(Debug, Clone)]
pub struct SignedPreKeyRecord {
    signed_pre_key: SignedPreKeyRecordStructure,
}

impl SignedPreKeyRecord {
    pub fn new(id: SignedPreKeyId, timestamp: u64, key: &KeyPair, signature: &[u8]) -> Self {
        Self {
            signed_pre_key: SignedPreKeyRecordStructure {
                id,
                public_key: key.public_key.serialize().into_vec(),
                private_key: key.private_key.serialize(),
                signature: signature.to_vec(),
                timestamp,
            },
        }
    }

    pub fn deserialize(data: &[u8]) -> Result<Self> {
        Ok(Self {
            signed_pre_key: SignedPreKeyRecordStructure::decode(data)?,
        })
    }

    pub fn id(&self) -> SignedPreKeyId {
        self.signed_pre_key.id
    }

    pub fn timestamp(&self) -> u64 {
        self.signed_pre_key.timestamp
    }

    pub fn signature(&self) -> &[u8] {
        &self.signed_pre_key.signature
    }

    pub fn public_key(&self) -> Result<PublicKey> {
        PublicKey::deserialize(&self.signed_pre_key.public_key)
    }

    pub fn private_key(&self) -> Result<PrivateKey> {
        PrivateKey::deserialize(&self.signed_pre_key.private_key)
    }

    pub fn key_pair(&self) -> Result<KeyPair> {
        KeyPair::from_public_and_private(
            &self.signed_pre_key.public_key,
            &self.signed_pre_key.private_key,
        )
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        no_encoding_error(self.signed_pre_key.encode(&mut buf));
        buf
    }
}
