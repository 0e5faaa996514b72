//
// Copyright 2020-2022 Signal Messenger, LLC.
// SPDX-License-Identifier: AGPL-3.0-only
//

//! One ratchet session and the record that collects a conversation's sessions.

use crate::consts::limits;
use crate::proto::storage;
use crate::ratchet::keys::{ChainKey, MessageKeys, RootKey};
use crate::state::{PreKeyId, SignedPreKeyId};
use crate::utils::unwrap::no_encoding_error;
use crate::{IdentityKey, KeyPair, PrivateKey, PublicKey, Result, SignalProtocolError};

use std::convert::{TryFrom, TryInto};
use std::time::{SystemTime, UNIX_EPOCH};

use prost::Message;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

/// Which side of the conversation generated the base key a session is indexed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseKeyType {
    /// We initiated the session from the remote party's prekey bundle.
    Ours = 1,
    /// The remote party initiated the session with a PreKey message.
    Theirs = 2,
}

impl TryFrom<u32> for BaseKeyType {
    type Error = SignalProtocolError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            1 => Ok(BaseKeyType::Ours),
            2 => Ok(BaseKeyType::Theirs),
            _ => Err(SignalProtocolError::InvalidSessionStructure(
                "unknown base key type",
            )),
        }
    }
}

fn wipe_chain(chain: &mut storage::Chain) {
    if let Some(private) = chain.sender_ratchet_key_private.as_mut() {
        private.zeroize();
    }
    if let Some(chain_key) = chain.chain_key.as_mut() {
        chain_key.key.zeroize();
    }
    for message_key in chain.message_keys.iter_mut() {
        wipe_message_key(message_key);
    }
}

fn wipe_message_key(message_key: &mut storage::MessageKey) {
    message_key.cipher_key.zeroize();
    message_key.mac_key.zeroize();
    message_key.iv.zeroize();
}

fn wipe_session(session: &mut storage::SessionStructure) {
    session.root_key.zeroize();
    if let Some(chain) = session.sender_chain.as_mut() {
        wipe_chain(chain);
    }
    for chain in session.receiver_chains.iter_mut() {
        wipe_chain(chain);
    }
}

fn now_epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

/// The prekey material replayed with every outbound message until the new session is
/// acknowledged, so the remote side can (re)construct it.
#[derive(Debug, Clone)]
pub(crate) struct UnacknowledgedPreKeyMessageItems {
    pre_key_id: Option<PreKeyId>,
    signed_pre_key_id: SignedPreKeyId,
    base_key: PublicKey,
}

impl UnacknowledgedPreKeyMessageItems {
    pub(crate) fn pre_key_id(&self) -> Option<PreKeyId> {
        self.pre_key_id
    }

    pub(crate) fn signed_pre_key_id(&self) -> SignedPreKeyId {
        self.signed_pre_key_id
    }

    pub(crate) fn base_key(&self) -> &PublicKey {
        &self.base_key
    }
}

/// One open or archived Double Ratchet session, backed by its storage protobuf.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct SessionState {
    session: storage::SessionStructure,
}

impl SessionState {
    pub(crate) fn new(session: storage::SessionStructure) -> Self {
        Self { session }
    }

    pub(crate) fn session_version(&self) -> u32 {
        self.session.session_version
    }

    pub(crate) fn alice_base_key(&self) -> Result<&[u8]> {
        if self.session.alice_base_key.is_empty() {
            return Err(SignalProtocolError::InvalidSessionStructure(
                "alice_base_key not yet initialized",
            ));
        }
        Ok(&self.session.alice_base_key)
    }

    pub(crate) fn set_alice_base_key(&mut self, key: &PublicKey) {
        self.session.alice_base_key = key.serialize().into_vec();
    }

    pub(crate) fn base_key_type(&self) -> Result<BaseKeyType> {
        BaseKeyType::try_from(self.session.base_key_type)
    }

    pub(crate) fn remote_identity_key(&self) -> Result<IdentityKey> {
        IdentityKey::try_from(self.session.remote_identity_public.as_slice())
    }

    pub(crate) fn local_identity_key(&self) -> Result<IdentityKey> {
        IdentityKey::try_from(self.session.local_identity_public.as_slice())
    }

    pub(crate) fn previous_counter(&self) -> u32 {
        self.session.previous_counter
    }

    pub(crate) fn set_previous_counter(&mut self, counter: u32) {
        self.session.previous_counter = counter;
    }

    pub(crate) fn root_key(&self) -> Result<RootKey> {
        let key: [u8; 32] = self
            .session
            .root_key
            .as_slice()
            .try_into()
            .map_err(|_| SignalProtocolError::InvalidSessionStructure("invalid root key length"))?;
        Ok(RootKey::new(key))
    }

    pub(crate) fn set_root_key(&mut self, root_key: &RootKey) {
        self.session.root_key.zeroize();
        self.session.root_key = root_key.key().to_vec();
    }

    pub(crate) fn has_sender_chain(&self) -> bool {
        self.session.sender_chain.is_some()
    }

    fn sender_chain(&self) -> Result<&storage::Chain> {
        self.session
            .sender_chain
            .as_ref()
            .ok_or(SignalProtocolError::InvalidSessionStructure(
                "missing sender chain",
            ))
    }

    pub(crate) fn sender_ratchet_key(&self) -> Result<PublicKey> {
        PublicKey::deserialize(&self.sender_chain()?.sender_ratchet_key)
    }

    pub(crate) fn sender_ratchet_key_for_logging(&self) -> String {
        self.sender_ratchet_key()
            .map(|key| hex::encode(key.public_key_bytes()))
            .unwrap_or_else(|_| "<no sender chain>".to_string())
    }

    pub(crate) fn sender_ratchet_private_key(&self) -> Result<PrivateKey> {
        let private = self
            .sender_chain()?
            .sender_ratchet_key_private
            .as_ref()
            .ok_or(SignalProtocolError::InvalidSessionStructure(
                "sender chain has no private ratchet key",
            ))?;
        PrivateKey::deserialize(private)
    }

    fn receiver_chain_position(&self, sender: &PublicKey) -> Option<usize> {
        let sender_bytes = sender.serialize();
        // Comparing serialized forms avoids treating non-canonical curve points as equal.
        self.session
            .receiver_chains
            .iter()
            .position(|chain| chain.sender_ratchet_key[..] == sender_bytes[..])
    }

    pub(crate) fn get_receiver_chain_key(&self, sender: &PublicKey) -> Result<Option<ChainKey>> {
        match self.receiver_chain_position(sender) {
            None => Ok(None),
            Some(position) => {
                let chain_key = self.session.receiver_chains[position]
                    .chain_key
                    .as_ref()
                    .ok_or(SignalProtocolError::InvalidSessionStructure(
                        "receiver chain without a chain key",
                    ))?;
                Ok(Some(ChainKey::from_protobuf(chain_key)?))
            }
        }
    }

    /// The most recently installed receiver chain, i.e. the one fed by the remote ratchet key
    /// we saw last.
    pub(crate) fn newest_receiver_chain(&self) -> Result<Option<(PublicKey, ChainKey)>> {
        let chain = match self.session.receiver_chains.last() {
            None => return Ok(None),
            Some(chain) => chain,
        };
        let sender = PublicKey::deserialize(&chain.sender_ratchet_key)?;
        let chain_key = chain
            .chain_key
            .as_ref()
            .ok_or(SignalProtocolError::InvalidSessionStructure(
                "receiver chain without a chain key",
            ))?;
        Ok(Some((sender, ChainKey::from_protobuf(chain_key)?)))
    }

    pub(crate) fn add_receiver_chain(&mut self, sender: &PublicKey, chain_key: &ChainKey) {
        self.session.receiver_chains.push(storage::Chain {
            sender_ratchet_key: sender.serialize().into_vec(),
            sender_ratchet_key_private: None,
            chain_key: Some(chain_key.into_protobuf()),
            message_keys: vec![],
        });

        if self.session.receiver_chains.len() > limits::MAX_RECEIVER_CHAINS {
            log::info!(
                "Trimming excessive receiver_chain for session with ratchet key {}, chain count: {}",
                self.sender_ratchet_key_for_logging(),
                self.session.receiver_chains.len()
            );
            let mut old_chain = self.session.receiver_chains.remove(0);
            wipe_chain(&mut old_chain);
        }
    }

    pub(crate) fn set_sender_chain(&mut self, sender: &KeyPair, next_chain_key: &ChainKey) {
        if let Some(chain) = self.session.sender_chain.as_mut() {
            wipe_chain(chain);
        }
        self.session.sender_chain = Some(storage::Chain {
            sender_ratchet_key: sender.public_key.serialize().into_vec(),
            sender_ratchet_key_private: Some(sender.private_key.serialize()),
            chain_key: Some(next_chain_key.into_protobuf()),
            message_keys: vec![],
        });
    }

    pub(crate) fn get_sender_chain_key(&self) -> Result<ChainKey> {
        let chain_key = self
            .sender_chain()?
            .chain_key
            .as_ref()
            .ok_or(SignalProtocolError::InvalidSessionStructure(
                "sender chain without a chain key",
            ))?;
        ChainKey::from_protobuf(chain_key)
    }

    pub(crate) fn set_sender_chain_key(&mut self, next_chain_key: &ChainKey) -> Result<()> {
        let chain = self
            .session
            .sender_chain
            .as_mut()
            .ok_or(SignalProtocolError::InvalidSessionStructure(
                "missing sender chain",
            ))?;
        chain.chain_key = Some(next_chain_key.into_protobuf());
        Ok(())
    }

    pub(crate) fn get_message_keys(
        &mut self,
        sender: &PublicKey,
        counter: u32,
    ) -> Result<Option<MessageKeys>> {
        let position = match self.receiver_chain_position(sender) {
            None => return Ok(None),
            Some(position) => position,
        };
        let chain = &mut self.session.receiver_chains[position];
        let key_position = chain
            .message_keys
            .iter()
            .position(|keys| keys.index == counter);
        match key_position {
            None => Ok(None),
            Some(key_position) => {
                let mut proto = chain.message_keys.remove(key_position);
                let keys = MessageKeys::from_protobuf(&proto)?;
                wipe_message_key(&mut proto);
                Ok(Some(keys))
            }
        }
    }

    pub(crate) fn set_message_keys(
        &mut self,
        sender: &PublicKey,
        message_keys: &MessageKeys,
    ) -> Result<()> {
        let position = self.receiver_chain_position(sender).ok_or(
            SignalProtocolError::InvalidSessionStructure("no receiver chain to cache keys on"),
        )?;
        let chain = &mut self.session.receiver_chains[position];
        chain.message_keys.insert(0, message_keys.into_protobuf());

        if chain.message_keys.len() > limits::MAX_MESSAGE_KEYS {
            if let Some(mut old) = chain.message_keys.pop() {
                wipe_message_key(&mut old);
            }
        }
        self.trim_session_message_keys();
        Ok(())
    }

    /// Enforce the session-wide skipped-key cap, evicting oldest-first across chains.
    fn trim_session_message_keys(&mut self) {
        while self.total_message_keys() > limits::MAX_SESSION_MESSAGE_KEYS {
            let oldest = self
                .session
                .receiver_chains
                .iter_mut()
                .find(|chain| !chain.message_keys.is_empty());
            match oldest {
                Some(chain) => {
                    if let Some(mut old) = chain.message_keys.pop() {
                        wipe_message_key(&mut old);
                    }
                }
                None => break,
            }
        }
    }

    fn total_message_keys(&self) -> usize {
        self.session
            .receiver_chains
            .iter()
            .map(|chain| chain.message_keys.len())
            .sum()
    }

    pub(crate) fn set_receiver_chain_key(
        &mut self,
        sender: &PublicKey,
        chain_key: &ChainKey,
    ) -> Result<()> {
        let position = self.receiver_chain_position(sender).ok_or(
            SignalProtocolError::InvalidSessionStructure("no receiver chain to update"),
        )?;
        self.session.receiver_chains[position].chain_key = Some(chain_key.into_protobuf());
        Ok(())
    }

    pub(crate) fn set_unacknowledged_pre_key_message(
        &mut self,
        pre_key_id: Option<PreKeyId>,
        signed_pre_key_id: SignedPreKeyId,
        base_key: &PublicKey,
    ) {
        self.session.pending_pre_key = Some(storage::PendingPreKey {
            pre_key_id: pre_key_id.unwrap_or(0),
            signed_pre_key_id,
            base_key: base_key.serialize().into_vec(),
        });
    }

    pub(crate) fn unacknowledged_pre_key_message_items(
        &self,
    ) -> Result<Option<UnacknowledgedPreKeyMessageItems>> {
        match self.session.pending_pre_key {
            None => Ok(None),
            Some(ref pending) => Ok(Some(UnacknowledgedPreKeyMessageItems {
                pre_key_id: match pending.pre_key_id {
                    0 => None,
                    id => Some(id),
                },
                signed_pre_key_id: pending.signed_pre_key_id,
                base_key: PublicKey::deserialize(&pending.base_key)?,
            })),
        }
    }

    pub(crate) fn clear_unacknowledged_pre_key_message(&mut self) {
        self.session.pending_pre_key = None;
    }

    pub(crate) fn remote_registration_id(&self) -> u32 {
        self.session.remote_registration_id
    }

    pub(crate) fn set_remote_registration_id(&mut self, registration_id: u32) {
        self.session.remote_registration_id = registration_id;
    }

    pub(crate) fn local_registration_id(&self) -> u32 {
        self.session.local_registration_id
    }

    pub(crate) fn set_local_registration_id(&mut self, registration_id: u32) {
        self.session.local_registration_id = registration_id;
    }

    pub(crate) fn closed_at(&self) -> u64 {
        self.session.closed_at
    }

    fn mark_closed(&mut self) {
        self.session.closed_at = now_epoch_millis();
    }

    fn mark_open(&mut self) {
        self.session.closed_at = 0;
    }
}

/// All sessions for one remote address: at most one open, the rest archived newest-first.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionRecord {
    current_session: Option<SessionState>,
    previous_sessions: Vec<SessionState>,
}

impl SessionRecord {
    pub fn new_fresh() -> Self {
        Self {
            current_session: None,
            previous_sessions: Vec::new(),
        }
    }

    pub(crate) fn new(state: SessionState) -> Self {
        Self {
            current_session: Some(state),
            previous_sessions: Vec::new(),
        }
    }

    /// Look up a session by the initiator base key it was established from, open or archived.
    pub(crate) fn has_session_state(&self, version: u32, alice_base_key: &[u8]) -> Result<bool> {
        for state in self
            .current_session
            .iter()
            .chain(self.previous_sessions.iter())
        {
            if state.session_version() == version
                && bool::from(alice_base_key.ct_eq(state.alice_base_key()?))
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn has_current_session_state(&self) -> bool {
        self.current_session.is_some()
    }

    pub(crate) fn session_state(&self) -> Option<&SessionState> {
        self.current_session.as_ref()
    }

    pub(crate) fn session_state_mut(&mut self) -> Option<&mut SessionState> {
        self.current_session.as_mut()
    }

    pub(crate) fn set_session_state(&mut self, session: SessionState) {
        self.current_session = Some(session);
    }

    pub(crate) fn previous_session_states(&self) -> &[SessionState] {
        self.previous_sessions.as_ref()
    }

    /// Reinstate an archived session after it decrypted a late message.
    pub(crate) fn promote_old_session(
        &mut self,
        old_session: usize,
        updated_session: SessionState,
    ) -> Result<()> {
        if old_session >= self.previous_sessions.len() {
            return Err(SignalProtocolError::InvalidState(
                "promote_old_session",
                format!("index {} out of range", old_session),
            ));
        }
        self.previous_sessions.remove(old_session);
        self.promote_state(updated_session);
        Ok(())
    }

    pub(crate) fn promote_state(&mut self, mut new_state: SessionState) {
        self.archive_current_state_inner();
        new_state.mark_open();
        self.current_session = Some(new_state);
    }

    fn archive_current_state_inner(&mut self) {
        if let Some(mut current_session) = self.current_session.take() {
            if self.previous_sessions.len() >= limits::ARCHIVED_STATES_MAX_LENGTH {
                if let Some(mut evicted) = self.previous_sessions.pop() {
                    wipe_session(&mut evicted.session);
                }
            }
            current_session.mark_closed();
            self.previous_sessions.insert(0, current_session);
        } else {
            log::info!("Skipping archive, current session state is fresh");
        }
    }

    pub fn archive_current_state(&mut self) -> Result<()> {
        self.archive_current_state_inner();
        Ok(())
    }

    pub fn remote_registration_id(&self) -> Result<u32> {
        Ok(self
            .session_state()
            .ok_or_else(|| {
                SignalProtocolError::InvalidState(
                    "remote_registration_id",
                    "No current session".into(),
                )
            })?
            .remote_registration_id())
    }

    pub fn local_registration_id(&self) -> Result<u32> {
        Ok(self
            .session_state()
            .ok_or_else(|| {
                SignalProtocolError::InvalidState(
                    "local_registration_id",
                    "No current session".into(),
                )
            })?
            .local_registration_id())
    }

    pub fn session_version(&self) -> Result<u32> {
        Ok(self
            .session_state()
            .ok_or_else(|| {
                SignalProtocolError::InvalidState("session_version", "No current session".into())
            })?
            .session_version())
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let record = storage::RecordStructure {
            current_session: self
                .current_session
                .as_ref()
                .map(|state| state.session.clone()),
            previous_sessions: self
                .previous_sessions
                .iter()
                .map(|state| state.session.clone())
                .collect(),
        };
        let mut buf = Vec::new();
        no_encoding_error(record.encode(&mut buf));
        Ok(buf)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let record = storage::RecordStructure::decode(bytes)?;
        Ok(Self {
            current_session: record.current_session.map(SessionState::new),
            previous_sessions: record
                .previous_sessions
                .into_iter()
                .map(SessionState::new)
                .collect(),
        })
    }
}
