//
// Copyright 2020-2022 Signal Messenger, LLC.
// SPDX-License-Identifier: AGPL-3.0-only
//

//! Generators for the key material a client publishes in its prekey bundle.

use crate::consts::limits::MAX_REGISTRATION_ID;
use crate::curve::KeyPair;
use crate::state::{PreKeyId, PreKeyRecord, SignedPreKeyId, SignedPreKeyRecord};
use crate::{IdentityKeyPair, Result};

use std::time::{SystemTime, UNIX_EPOCH};

use rand::{CryptoRng, Rng};

/// One-time prekey ids live in `[1, PRE_KEY_ID_MODULUS]` and wrap around when a batch runs
/// past the end.
const PRE_KEY_ID_MODULUS: u32 = 0xFF_FFFE;

/// Generate a fresh long-term identity.
pub fn generate_identity_key_pair<R: Rng + CryptoRng>(csprng: &mut R) -> IdentityKeyPair {
    IdentityKeyPair::generate(csprng)
}

/// Generate a 14-bit registration id in `[1, 16380]`.
pub fn generate_registration_id<R: Rng + CryptoRng>(csprng: &mut R) -> u32 {
    (csprng.gen::<u32>() % MAX_REGISTRATION_ID) + 1
}

/// Generate a single one-time prekey.
pub fn generate_pre_key<R: Rng + CryptoRng>(csprng: &mut R, pre_key_id: PreKeyId) -> PreKeyRecord {
    PreKeyRecord::new(pre_key_id, &KeyPair::generate(csprng))
}

/// Generate a batch of one-time prekeys with consecutive ids starting at `start`.
pub fn generate_pre_keys<R: Rng + CryptoRng>(
    csprng: &mut R,
    start: PreKeyId,
    count: u32,
) -> Vec<PreKeyRecord> {
    (0..count)
        .map(|i| {
            let id = (start.wrapping_add(i).wrapping_sub(1) % PRE_KEY_ID_MODULUS) + 1;
            generate_pre_key(csprng, id)
        })
        .collect()
}

/// Generate a signed prekey, with the signature computed by `identity_key_pair` over the
/// type-prefixed public key.
pub fn generate_signed_pre_key<R: Rng + CryptoRng>(
    csprng: &mut R,
    identity_key_pair: &IdentityKeyPair,
    signed_pre_key_id: SignedPreKeyId,
) -> Result<SignedPreKeyRecord> {
    let key_pair = KeyPair::generate(csprng);
    let signature = identity_key_pair
        .private_key()
        .calculate_signature(&key_pair.public_key.serialize(), csprng);
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0);

    Ok(SignedPreKeyRecord::new(
        signed_pre_key_id,
        timestamp,
        &key_pair,
        &signature,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::rngs::OsRng;

    #[test]
    fn registration_ids_are_14_bit_and_nonzero() {
        let mut csprng = OsRng;
        for _ in 0..2048 {
            let id = generate_registration_id(&mut csprng);
            assert!(id >= 1);
            assert!(id <= MAX_REGISTRATION_ID);
        }
    }

    #[test]
    fn signed_pre_key_signature_verifies() -> Result<()> {
        let mut csprng = OsRng;
        let identity = generate_identity_key_pair(&mut csprng);
        let signed = generate_signed_pre_key(&mut csprng, &identity, 22)?;

        assert_eq!(signed.id(), 22);
        assert!(identity.public_key().verify_signature(
            &signed.public_key()?.serialize(),
            signed.signature()
        )?);
        Ok(())
    }

    #[test]
    fn pre_key_batches_use_consecutive_ids() {
        let mut csprng = OsRng;
        let batch = generate_pre_keys(&mut csprng, 100, 5);
        let ids: Vec<u32> = batch.iter().map(|record| record.id()).collect();
        assert_eq!(ids, vec![100, 101, 102, 103, 104]);

        let wrapped = generate_pre_keys(&mut csprng, PRE_KEY_ID_MODULUS, 3);
        let ids: Vec<u32> = wrapped.iter().map(|record| record.id()).collect();
        assert_eq!(ids, vec![PRE_KEY_ID_MODULUS, 1, 2]);
    }
}
