//
// Copyright 2020-2022 Signal Messenger, LLC.
// SPDX-License-Identifier: AGPL-3.0-only
//

use rand::{CryptoRng, Rng};

use whisperlink::{
    key_helper, IdentityKeyStore, InMemSignalProtocolStore, PreKeyBundle, PreKeyId, PreKeyStore,
    Result, SignedPreKeyId, SignedPreKeyStore,
};

/// A protocol store for a freshly provisioned client.
pub fn test_store<R: Rng + CryptoRng>(csprng: &mut R) -> InMemSignalProtocolStore {
    let identity = key_helper::generate_identity_key_pair(csprng);
    let registration_id = key_helper::generate_registration_id(csprng);
    InMemSignalProtocolStore::new(identity, registration_id).expect("brand new store")
}

/// Generate prekey material in `store` and return the bundle the owner would publish.
pub async fn publish_bundle<R: Rng + CryptoRng>(
    store: &mut InMemSignalProtocolStore,
    csprng: &mut R,
    pre_key_id: Option<PreKeyId>,
    signed_pre_key_id: SignedPreKeyId,
) -> Result<PreKeyBundle> {
    let identity = store.get_identity_key_pair().await?;

    let signed_pre_key = key_helper::generate_signed_pre_key(csprng, &identity, signed_pre_key_id)?;
    store
        .save_signed_pre_key(signed_pre_key_id, &signed_pre_key)
        .await?;

    let pre_key = match pre_key_id {
        None => None,
        Some(id) => {
            let record = key_helper::generate_pre_key(csprng, id);
            store.save_pre_key(id, &record).await?;
            Some((id, record.public_key()?))
        }
    };

    Ok(PreKeyBundle::new(
        store.get_local_registration_id().await?,
        1,
        pre_key,
        signed_pre_key_id,
        signed_pre_key.public_key()?,
        signed_pre_key.signature().to_vec(),
        *identity.identity_key(),
    ))
}

/// Whether `haystack` contains `needle` as a contiguous subsequence.
pub fn contains_subsequence(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack
        .windows(needle.len())
        .any(|window| window == needle)
}
