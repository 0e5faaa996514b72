//
// Copyright 2020-2022 Signal Messenger, LLC.
// SPDX-License-Identifier: AGPL-3.0-only
//

//! Establishing a session: consuming a remote prekey bundle on the initiating side, and
//! processing an inbound [PreKeySignalMessage] on the responding side.

use crate::job_queue::session_job_queue;
use crate::protocol::PreKeySignalMessage;
use crate::ratchet::{
    self,
    params::{AliceSignalProtocolParameters, BobSignalProtocolParameters},
};
use crate::state::{PreKeyBundle, PreKeyId, SessionRecord};
use crate::storage::traits::{
    Direction, IdentityKeyStore, PreKeyStore, ProtocolStore, SessionStore, SignedPreKeyStore,
};
use crate::{curve, ProtocolAddress, Result, SignalProtocolError};

use std::sync::Arc;

use rand::{CryptoRng, Rng};
use tokio::sync::Mutex;

/// Build a new outgoing session from `bundle`, archive any session currently open with
/// `remote_address`, and persist the result.
///
/// Fails without touching the store when the remote identity is untrusted or the signed
/// prekey signature does not verify.
pub async fn process_prekey_bundle<S, R>(
    remote_address: &ProtocolAddress,
    store: &mut S,
    bundle: &PreKeyBundle,
    mut csprng: &mut R,
) -> Result<()>
where
    S: SessionStore + IdentityKeyStore + ?Sized,
    R: Rng + CryptoRng,
{
    let their_identity_key = bundle.identity_key();

    if !store
        .is_trusted_identity(remote_address, their_identity_key, Direction::Sending)
        .await?
    {
        return Err(SignalProtocolError::UntrustedIdentity(
            remote_address.clone(),
        ));
    }

    if !their_identity_key.public_key().verify_signature(
        &bundle.signed_pre_key_public().serialize(),
        bundle.signed_pre_key_signature(),
    )? {
        return Err(SignalProtocolError::SignatureValidationFailed);
    }

    let mut session_record = store
        .load_session(remote_address)
        .await?
        .unwrap_or_else(SessionRecord::new_fresh);

    let our_base_key_pair = curve::KeyPair::generate(&mut csprng);
    let our_identity_key_pair = store.get_identity_key_pair().await?;

    let parameters = AliceSignalProtocolParameters::new(
        our_identity_key_pair,
        our_base_key_pair,
        *their_identity_key,
        bundle.signed_pre_key_public(),
        bundle.pre_key_public(),
        // The signed prekey doubles as the remote ratchet key for the first sending chain.
        bundle.signed_pre_key_public(),
    );

    let mut session = ratchet::initialize_alice_session(&parameters, csprng)?;

    session.set_unacknowledged_pre_key_message(
        bundle.pre_key_id(),
        bundle.signed_pre_key_id(),
        &our_base_key_pair.public_key,
    );
    session.set_local_registration_id(store.get_local_registration_id().await?);
    session.set_remote_registration_id(bundle.registration_id());
    session.set_alice_base_key(&our_base_key_pair.public_key);

    log::info!(
        "set_unacknowledged_pre_key_message for: {} with preKeyId: {}",
        remote_address,
        bundle
            .pre_key_id()
            .map_or_else(|| "<none>".to_string(), |id| id.to_string())
    );

    store.save_identity(remote_address, their_identity_key).await?;

    session_record.promote_state(session);

    store.store_session(remote_address, &session_record).await?;

    Ok(())
}

/// Install the session described by an inbound [PreKeySignalMessage] into `session_record`,
/// unless one indexed by the same base key already exists (a retransmission).
///
/// Returns the id of the one-time prekey consumed, if any. The caller must only remove that
/// prekey from its store after the wrapped message decrypts successfully.
pub async fn process_prekey<S>(
    message: &PreKeySignalMessage,
    remote_address: &ProtocolAddress,
    session_record: &mut SessionRecord,
    store: &mut S,
) -> Result<Option<PreKeyId>>
where
    S: IdentityKeyStore + PreKeyStore + SignedPreKeyStore + ?Sized,
{
    let their_identity_key = message.identity_key();

    if !store
        .is_trusted_identity(remote_address, their_identity_key, Direction::Receiving)
        .await?
    {
        return Err(SignalProtocolError::UntrustedIdentity(
            remote_address.clone(),
        ));
    }

    let unsigned_pre_key_id = process_prekey_v3(message, session_record, store).await?;

    store.save_identity(remote_address, their_identity_key).await?;

    Ok(unsigned_pre_key_id)
}

async fn process_prekey_v3<S>(
    message: &PreKeySignalMessage,
    session_record: &mut SessionRecord,
    store: &mut S,
) -> Result<Option<PreKeyId>>
where
    S: IdentityKeyStore + PreKeyStore + SignedPreKeyStore + ?Sized,
{
    if session_record.has_session_state(
        message.message_version() as u32,
        &message.base_key().serialize(),
    )? {
        // We've already set up a session for this message, letting the sender retransmit the
        // same prekey message without consuming anything further.
        return Ok(None);
    }

    let our_signed_pre_key_pair = store
        .get_signed_pre_key(message.signed_pre_key_id())
        .await?
        .key_pair()?;

    let our_one_time_pre_key_pair = if let Some(pre_key_id) = message.pre_key_id() {
        Some(store.get_pre_key(pre_key_id).await?.key_pair()?)
    } else {
        log::warn!("processing PreKey message which had no one-time prekey");
        None
    };

    let parameters = BobSignalProtocolParameters::new(
        store.get_identity_key_pair().await?,
        our_signed_pre_key_pair,
        our_one_time_pre_key_pair,
        // Our signed prekey doubles as our initial ratchet key.
        our_signed_pre_key_pair,
        *message.identity_key(),
        *message.base_key(),
    );

    let mut new_session = ratchet::initialize_bob_session(&parameters)?;

    new_session.set_local_registration_id(store.get_local_registration_id().await?);
    new_session.set_remote_registration_id(message.registration_id());
    new_session.set_alice_base_key(message.base_key());

    session_record.promote_state(new_session);

    Ok(message.pre_key_id())
}

/// Facade tying bundle processing for one remote address to the shared store and the
/// process-wide job queue.
pub struct SessionBuilder<S> {
    store: Arc<Mutex<S>>,
    remote_address: ProtocolAddress,
}

impl<S: ProtocolStore> SessionBuilder<S> {
    pub fn new(store: Arc<Mutex<S>>, remote_address: ProtocolAddress) -> Self {
        Self {
            store,
            remote_address,
        }
    }

    pub fn remote_address(&self) -> &ProtocolAddress {
        &self.remote_address
    }

    /// [process_prekey_bundle], serialized with all other operations against this address.
    pub async fn process_pre_key_bundle<R: Rng + CryptoRng>(
        &self,
        bundle: &PreKeyBundle,
        csprng: &mut R,
    ) -> Result<()> {
        let bucket = self.remote_address.to_string();
        session_job_queue()
            .run(&bucket, async {
                let mut store = self.store.lock().await;
                process_prekey_bundle(&self.remote_address, &mut *store, bundle, csprng).await
            })
            .await
    }
}
