//
// Copyright 2020-2022 Signal Messenger, LLC.
// SPDX-License-Identifier: AGPL-3.0-only
//

use async_trait::async_trait;

use crate::state::{PreKeyId, SignedPreKeyId};
use crate::{
    IdentityKey, IdentityKeyPair, PreKeyRecord, ProtocolAddress, Result, SessionRecord,
    SignedPreKeyRecord,
};

/// Whether an identity is being checked on the sending or the receiving path. Stores may apply
/// different trust policies per direction.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Direction {
    Sending,
    Receiving,
}

/// Storage for our own long-term identity and the identities we have seen remote parties use.
#[async_trait(?Send)]
pub trait IdentityKeyStore {
    async fn get_identity_key_pair(&self) -> Result<IdentityKeyPair>;

    async fn get_local_registration_id(&self) -> Result<u32>;

    /// Record `identity` as the key for `address`, returning `true` when it replaced a
    /// different key.
    async fn save_identity(
        &mut self,
        address: &ProtocolAddress,
        identity: &IdentityKey,
    ) -> Result<bool>;

    async fn is_trusted_identity(
        &self,
        address: &ProtocolAddress,
        identity: &IdentityKey,
        direction: Direction,
    ) -> Result<bool>;

    async fn get_identity(&self, address: &ProtocolAddress) -> Result<Option<IdentityKey>>;
}

/// Storage for our one-time prekeys.
#[async_trait(?Send)]
pub trait PreKeyStore {
    /// Fails with [crate::SignalProtocolError::InvalidPreKeyId] when `prekey_id` is unknown.
    async fn get_pre_key(&self, prekey_id: PreKeyId) -> Result<PreKeyRecord>;

    async fn save_pre_key(&mut self, prekey_id: PreKeyId, record: &PreKeyRecord) -> Result<()>;

    async fn remove_pre_key(&mut self, prekey_id: PreKeyId) -> Result<()>;
}

/// Storage for our signed prekeys.
#[async_trait(?Send)]
pub trait SignedPreKeyStore {
    /// Fails with [crate::SignalProtocolError::InvalidSignedPreKeyId] when `signed_prekey_id`
    /// is unknown.
    async fn get_signed_pre_key(&self, signed_prekey_id: SignedPreKeyId)
        -> Result<SignedPreKeyRecord>;

    async fn save_signed_pre_key(
        &mut self,
        signed_prekey_id: SignedPreKeyId,
        record: &SignedPreKeyRecord,
    ) -> Result<()>;
}

/// Storage for session records, keyed by remote address.
#[async_trait(?Send)]
pub trait SessionStore {
    async fn load_session(&self, address: &ProtocolAddress) -> Result<Option<SessionRecord>>;

    async fn store_session(
        &mut self,
        address: &ProtocolAddress,
        record: &SessionRecord,
    ) -> Result<()>;
}

/// The full capability set consumed by [crate::SessionCipher] and [crate::SessionBuilder].
pub trait ProtocolStore: SessionStore + PreKeyStore + SignedPreKeyStore + IdentityKeyStore {}
