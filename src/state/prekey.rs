//
// Copyright 2020-2022 Signal Messenger, LLC.
// SPDX-License-Identifier: AGPL-3.0-only
//

use crate::proto::storage::PreKeyRecordStructure;
use crate::utils::unwrap::no_encoding_error;
use crate::{KeyPair, PrivateKey, PublicKey, Result};

use prost::Message;

/// A unique identifier selecting among this client's known one-time prekeys.
pub type PreKeyId = u32;

/// A one-time prekey and its identifier, in storable form.
#[derive(Debug, Clone)]
pub struct PreKeyRecord {
    pre_key: PreKeyRecordStructure,
}

impl PreKeyRecord {
    pub fn new(id: PreKeyId, key: &KeyPair) -> Self {
        Self {
            pre_key: PreKeyRecordStructure {
                id,
                public_key: key.public_key.serialize().into_vec(),
                private_key: key.private_key.serialize(),
            },
        }
    }

    pub fn deserialize(data: &[u8]) -> Result<Self> {
        Ok(Self {
            pre_key: PreKeyRecordStructure::decode(data)?,
        })
    }

    pub fn id(&self) -> PreKeyId {
        self.pre_key.id
    }

    pub fn key_pair(&self) -> Result<KeyPair> {
        KeyPair::from_public_and_private(&self.pre_key.public_key, &self.pre_key.private_key)
    }

    pub fn public_key(&self) -> Result<PublicKey> {
        PublicKey::deserialize(&self.pre_key.public_key)
    }

    pub fn private_key(&self) -> Result<PrivateKey> {
        PrivateKey::deserialize(&self.pre_key.private_key)
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        no_encoding_error(self.pre_key.encode(&mut buf));
        buf
    }
}
