//
// Copyright 2020-2022 Signal Messenger, LLC.
// SPDX-License-Identifier: AGPL-3.0-only
//

//! Encrypt and decrypt messages against an established session record.

use crate::consts::limits::MAX_FORWARD_JUMPS;
use crate::curve::{KeyPair, PublicKey};
use crate::job_queue::session_job_queue;
use crate::protocol::{
    CiphertextMessage, CiphertextMessageType, PreKeySignalMessage, SignalMessage,
};
use crate::ratchet::keys::{ChainKey, MessageKeys};
use crate::session;
use crate::state::{SessionRecord, SessionState};
use crate::storage::traits::{Direction, IdentityKeyStore, ProtocolStore, SessionStore};
use crate::{crypto, ProtocolAddress, Result, SignalProtocolError};

use std::convert::TryFrom;
use std::sync::Arc;

use rand::{CryptoRng, Rng};
use tokio::sync::Mutex;

/// Encrypt `ptext` for `remote_address` with the open session's sending chain.
///
/// While the session still carries unacknowledged prekey material, the result is a
/// [PreKeySignalMessage]; afterwards it is a plain [SignalMessage].
pub async fn message_encrypt<S, R>(
    ptext: &[u8],
    remote_address: &ProtocolAddress,
    store: &mut S,
    csprng: &mut R,
) -> Result<CiphertextMessage>
where
    S: SessionStore + IdentityKeyStore + ?Sized,
    R: Rng + CryptoRng,
{
    let mut session_record = store
        .load_session(remote_address)
        .await?
        .ok_or_else(|| SignalProtocolError::SessionNotFound(remote_address.clone()))?;
    let session_state = session_record
        .session_state_mut()
        .ok_or_else(|| SignalProtocolError::SessionNotFound(remote_address.clone()))?;

    let chain_key = session_state.get_sender_chain_key()?;
    let message_keys = chain_key.message_keys();

    let sender_ephemeral = session_state.sender_ratchet_key()?;
    let previous_counter = session_state.previous_counter();
    let session_version = session_state.session_version() as u8;

    let local_identity_key = session_state.local_identity_key()?;
    let their_identity_key = session_state.remote_identity_key()?;

    let ctext = crypto::aes_256_cbc_encrypt(ptext, message_keys.cipher_key(), message_keys.iv())?;

    let message = if let Some(items) = session_state.unacknowledged_pre_key_message_items()? {
        let local_registration_id = session_state.local_registration_id();

        log::info!(
            "Building PreKeySignalMessage for: {} with preKeyId: {}",
            remote_address,
            items
                .pre_key_id()
                .map_or_else(|| "<none>".to_string(), |id| id.to_string())
        );

        let signal_message = SignalMessage::new(
            session_version,
            message_keys.mac_key(),
            sender_ephemeral,
            chain_key.index(),
            previous_counter,
            ctext,
            &local_identity_key,
            &their_identity_key,
        )?;

        CiphertextMessage::PreKeySignalMessage(PreKeySignalMessage::new(
            session_version,
            local_registration_id,
            items.pre_key_id(),
            items.signed_pre_key_id(),
            *items.base_key(),
            local_identity_key,
            signal_message,
        ))
    } else {
        CiphertextMessage::SignalMessage(SignalMessage::new(
            session_version,
            message_keys.mac_key(),
            sender_ephemeral,
            chain_key.index(),
            previous_counter,
            ctext,
            &local_identity_key,
            &their_identity_key,
        )?)
    };

    session_state.set_sender_chain_key(&chain_key.next_chain_key())?;

    // The identity was already checked when the session was built, but the trust policy may
    // have changed since.
    if !store
        .is_trusted_identity(remote_address, &their_identity_key, Direction::Sending)
        .await?
    {
        return Err(SignalProtocolError::UntrustedIdentity(
            remote_address.clone(),
        ));
    }
    store
        .save_identity(remote_address, &their_identity_key)
        .await?;

    store.store_session(remote_address, &session_record).await?;
    Ok(message)
}

/// Decrypt either frame type.
pub async fn message_decrypt<S, R>(
    ciphertext: &CiphertextMessage,
    remote_address: &ProtocolAddress,
    store: &mut S,
    csprng: &mut R,
) -> Result<Vec<u8>>
where
    S: ProtocolStore + ?Sized,
    R: Rng + CryptoRng,
{
    match ciphertext {
        CiphertextMessage::SignalMessage(m) => {
            message_decrypt_signal(m, remote_address, store, csprng).await
        }
        CiphertextMessage::PreKeySignalMessage(m) => {
            message_decrypt_prekey(m, remote_address, store, csprng).await
        }
    }
}

/// Decrypt a [PreKeySignalMessage], building the session it describes when it is not a
/// retransmission.
///
/// The consumed one-time prekey is removed from the store only after the wrapped message
/// decrypts; a failed decrypt leaves the store untouched.
pub async fn message_decrypt_prekey<S, R>(
    ciphertext: &PreKeySignalMessage,
    remote_address: &ProtocolAddress,
    store: &mut S,
    csprng: &mut R,
) -> Result<Vec<u8>>
where
    S: ProtocolStore + ?Sized,
    R: Rng + CryptoRng,
{
    let mut session_record = store
        .load_session(remote_address)
        .await?
        .unwrap_or_else(SessionRecord::new_fresh);

    // Make sure we log the session state if we fail to process the pre-key.
    let pre_key_id_or_err =
        session::process_prekey(ciphertext, remote_address, &mut session_record, store).await;

    let pre_key_id = match pre_key_id_or_err {
        Ok(id) => id,
        Err(e) => {
            log::error!(
                "{} failed to process PreKey message: {}",
                remote_address,
                e
            );
            return Err(e);
        }
    };

    let ptext =
        decrypt_message_with_record(remote_address, &mut session_record, ciphertext.message(), csprng)?;

    store.store_session(remote_address, &session_record).await?;

    if let Some(pre_key_id) = pre_key_id {
        store.remove_pre_key(pre_key_id).await?;
    }

    Ok(ptext)
}

/// Decrypt a [SignalMessage] against the sessions recorded for `remote_address`.
pub async fn message_decrypt_signal<S, R>(
    ciphertext: &SignalMessage,
    remote_address: &ProtocolAddress,
    store: &mut S,
    csprng: &mut R,
) -> Result<Vec<u8>>
where
    S: SessionStore + IdentityKeyStore + ?Sized,
    R: Rng + CryptoRng,
{
    let mut session_record = store
        .load_session(remote_address)
        .await?
        .ok_or_else(|| SignalProtocolError::SessionNotFound(remote_address.clone()))?;

    let ptext =
        decrypt_message_with_record(remote_address, &mut session_record, ciphertext, csprng)?;

    let their_identity_key = session_record
        .session_state()
        .ok_or_else(|| SignalProtocolError::SessionNotFound(remote_address.clone()))?
        .remote_identity_key()?;

    if !store
        .is_trusted_identity(remote_address, &their_identity_key, Direction::Receiving)
        .await?
    {
        return Err(SignalProtocolError::UntrustedIdentity(
            remote_address.clone(),
        ));
    }

    store
        .save_identity(remote_address, &their_identity_key)
        .await?;

    store.store_session(remote_address, &session_record).await?;

    Ok(ptext)
}

/// Try the open session first, then archived sessions newest-first; a success from an
/// archived session promotes it back to open. The terminal attempt's error is surfaced.
fn decrypt_message_with_record<R: Rng + CryptoRng>(
    remote_address: &ProtocolAddress,
    record: &mut SessionRecord,
    ciphertext: &SignalMessage,
    csprng: &mut R,
) -> Result<Vec<u8>> {
    let mut last_error = None;

    if let Some(current_state) = record.session_state() {
        let mut current_state = current_state.clone();
        match decrypt_message_with_state(&mut current_state, ciphertext, csprng) {
            Ok(ptext) => {
                record.set_session_state(current_state);
                return Ok(ptext);
            }
            Err(e) => {
                log::debug!(
                    "{} failed to decrypt with open session: {}",
                    remote_address,
                    e
                );
                last_error = Some(e);
            }
        }
    }

    for idx in 0..record.previous_session_states().len() {
        let mut previous_state = record.previous_session_states()[idx].clone();
        match decrypt_message_with_state(&mut previous_state, ciphertext, csprng) {
            Ok(ptext) => {
                log::info!(
                    "{} decrypted with archived session state, promoting",
                    remote_address
                );
                record.promote_old_session(idx, previous_state)?;
                return Ok(ptext);
            }
            Err(e) => {
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| SignalProtocolError::SessionNotFound(remote_address.clone())))
}

fn decrypt_message_with_state<R: Rng + CryptoRng>(
    state: &mut SessionState,
    ciphertext: &SignalMessage,
    csprng: &mut R,
) -> Result<Vec<u8>> {
    if !state.has_sender_chain() {
        return Err(SignalProtocolError::InvalidMessage(
            "No session available to decrypt",
        ));
    }

    let ciphertext_version = ciphertext.message_version() as u32;
    if ciphertext_version != state.session_version() {
        return Err(SignalProtocolError::UnrecognizedCiphertextVersion(
            ciphertext_version as u8,
        ));
    }

    let their_ephemeral = ciphertext.sender_ratchet_key();
    let counter = ciphertext.counter();
    let chain_key = get_or_create_chain_key(
        state,
        their_ephemeral,
        ciphertext.previous_counter(),
        csprng,
    )?;
    let message_keys = get_or_create_message_keys(state, their_ephemeral, &chain_key, counter)?;

    let their_identity_key = state.remote_identity_key()?;
    let local_identity_key = state.local_identity_key()?;

    if !ciphertext.verify_mac(
        &their_identity_key,
        &local_identity_key,
        message_keys.mac_key(),
    )? {
        return Err(SignalProtocolError::InvalidMac);
    }

    let ptext =
        crypto::aes_256_cbc_decrypt(ciphertext.body(), message_keys.cipher_key(), message_keys.iv())?;

    state.clear_unacknowledged_pre_key_message();

    Ok(ptext)
}

/// Fetch the receiving chain for `their_ephemeral`, performing a DH ratchet step when the
/// remote ratchet key is new: the superseded receiving chain gets its not-yet-consumed keys
/// cached up to `previous_counter`, and a fresh sending chain is derived from a new ephemeral.
fn get_or_create_chain_key<R: Rng + CryptoRng>(
    state: &mut SessionState,
    their_ephemeral: &PublicKey,
    previous_counter: u32,
    csprng: &mut R,
) -> Result<ChainKey> {
    if let Some(chain) = state.get_receiver_chain_key(their_ephemeral)? {
        return Ok(chain);
    }

    log::info!("{} creating new chains", state.sender_ratchet_key_for_logging());

    if let Some((prior_sender, prior_chain_key)) = state.newest_receiver_chain()? {
        fill_message_keys(state, &prior_sender, &prior_chain_key, previous_counter)?;
    }

    let root_key = state.root_key()?;
    let our_ephemeral = state.sender_ratchet_private_key()?;

    let (receiver_root, receiver_chain_key) = root_key.create_chain(their_ephemeral, &our_ephemeral);

    let our_new_ephemeral = KeyPair::generate(csprng);
    let (sender_root, sender_chain_key) =
        receiver_root.create_chain(their_ephemeral, &our_new_ephemeral.private_key);

    state.set_root_key(&sender_root);
    state.add_receiver_chain(their_ephemeral, &receiver_chain_key);

    let current_index = state.get_sender_chain_key()?.index();
    state.set_previous_counter(current_index.saturating_sub(1));
    state.set_sender_chain(&our_new_ephemeral, &sender_chain_key);

    Ok(receiver_chain_key)
}

/// Step `chain_key`'s chain up to and including `counter`, caching each derived message key.
fn fill_message_keys(
    state: &mut SessionState,
    sender: &PublicKey,
    chain_key: &ChainKey,
    counter: u32,
) -> Result<()> {
    if chain_key.index() > counter {
        return Ok(());
    }
    if counter - chain_key.index() > MAX_FORWARD_JUMPS as u32 {
        return Err(SignalProtocolError::ExcessiveForwardJumps(
            counter,
            chain_key.index(),
        ));
    }

    let mut chain_key = *chain_key;
    while chain_key.index() <= counter {
        state.set_message_keys(sender, &chain_key.message_keys())?;
        chain_key = chain_key.next_chain_key();
    }
    state.set_receiver_chain_key(sender, &chain_key)?;
    Ok(())
}

fn get_or_create_message_keys(
    state: &mut SessionState,
    their_ephemeral: &PublicKey,
    chain_key: &ChainKey,
    counter: u32,
) -> Result<MessageKeys> {
    let chain_index = chain_key.index();

    if chain_index > counter {
        // The chain already ran past this counter; the key is either cached or gone.
        return state
            .get_message_keys(their_ephemeral, counter)?
            .ok_or(SignalProtocolError::DuplicatedMessage(chain_index, counter));
    }

    if counter - chain_index > MAX_FORWARD_JUMPS as u32 {
        return Err(SignalProtocolError::ExcessiveForwardJumps(
            counter,
            chain_index,
        ));
    }

    let mut chain_key = *chain_key;
    while chain_key.index() < counter {
        state.set_message_keys(their_ephemeral, &chain_key.message_keys())?;
        chain_key = chain_key.next_chain_key();
    }

    state.set_receiver_chain_key(their_ephemeral, &chain_key.next_chain_key())?;
    Ok(chain_key.message_keys())
}

/// The result of [SessionCipher::encrypt]: the wire frame plus the remote party's
/// registration id for addressing.
pub struct EncryptedMessage {
    message: CiphertextMessage,
    registration_id: u32,
}

impl EncryptedMessage {
    pub fn message_type(&self) -> CiphertextMessageType {
        self.message.message_type()
    }

    pub fn message(&self) -> &CiphertextMessage {
        &self.message
    }

    pub fn body(&self) -> &[u8] {
        self.message.serialize()
    }

    pub fn registration_id(&self) -> u32 {
        self.registration_id
    }
}

/// Facade tying the encrypt/decrypt operations for one remote address to the shared store and
/// the process-wide job queue.
pub struct SessionCipher<S> {
    store: Arc<Mutex<S>>,
    remote_address: ProtocolAddress,
}

impl<S: ProtocolStore> SessionCipher<S> {
    pub fn new(store: Arc<Mutex<S>>, remote_address: ProtocolAddress) -> Self {
        Self {
            store,
            remote_address,
        }
    }

    pub fn remote_address(&self) -> &ProtocolAddress {
        &self.remote_address
    }

    /// [message_encrypt], serialized with all other operations against this address.
    pub async fn encrypt<R: Rng + CryptoRng>(
        &self,
        ptext: &[u8],
        csprng: &mut R,
    ) -> Result<EncryptedMessage> {
        let bucket = self.remote_address.to_string();
        session_job_queue()
            .run(&bucket, async {
                let mut store = self.store.lock().await;
                let message =
                    message_encrypt(ptext, &self.remote_address, &mut *store, csprng).await?;
                let registration_id = store
                    .load_session(&self.remote_address)
                    .await?
                    .ok_or_else(|| {
                        SignalProtocolError::SessionNotFound(self.remote_address.clone())
                    })?
                    .remote_registration_id()?;
                Ok(EncryptedMessage {
                    message,
                    registration_id,
                })
            })
            .await
    }

    /// Parse and decrypt a serialized [SignalMessage].
    pub async fn decrypt_message<R: Rng + CryptoRng>(
        &self,
        body: &[u8],
        csprng: &mut R,
    ) -> Result<Vec<u8>> {
        let message = SignalMessage::try_from(body)?;
        let bucket = self.remote_address.to_string();
        session_job_queue()
            .run(&bucket, async {
                let mut store = self.store.lock().await;
                message_decrypt_signal(&message, &self.remote_address, &mut *store, csprng).await
            })
            .await
    }

    /// Parse and decrypt a serialized [PreKeySignalMessage].
    pub async fn decrypt_pre_key_message<R: Rng + CryptoRng>(
        &self,
        body: &[u8],
        csprng: &mut R,
    ) -> Result<Vec<u8>> {
        let message = PreKeySignalMessage::try_from(body)?;
        let bucket = self.remote_address.to_string();
        session_job_queue()
            .run(&bucket, async {
                let mut store = self.store.lock().await;
                message_decrypt_prekey(&message, &self.remote_address, &mut *store, csprng).await
            })
            .await
    }

    /// The registration id recorded for the remote side of the open session.
    pub async fn remote_registration_id(&self) -> Result<u32> {
        let store = self.store.lock().await;
        store
            .load_session(&self.remote_address)
            .await?
            .ok_or_else(|| SignalProtocolError::SessionNotFound(self.remote_address.clone()))?
            .remote_registration_id()
    }
}
