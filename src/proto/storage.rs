//
// Copyright 2020-2022 Signal Messenger, LLC.
// SPDX-License-Identifier: AGPL-3.0-only
//

//! Structs encoding the durable form of sessions, prekeys and identities.

/// A message key skipped over and cached for out-of-order delivery.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MessageKey {
    /// Position in the chain this key was derived at.
    #[prost(uint32, tag = "1")]
    pub index: u32,
    /// 32-byte AES-256 key.
    #[prost(bytes = "vec", tag = "2")]
    pub cipher_key: Vec<u8>,
    /// 32-byte HMAC-SHA256 key.
    #[prost(bytes = "vec", tag = "3")]
    pub mac_key: Vec<u8>,
    /// 16-byte CBC initialization vector.
    #[prost(bytes = "vec", tag = "4")]
    pub iv: Vec<u8>,
}

/// The evolving symmetric half of the Double Ratchet.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ChainKey {
    /// Number of message keys already derived from this chain.
    #[prost(uint32, tag = "1")]
    pub index: u32,
    /// 32-byte chain key.
    #[prost(bytes = "vec", tag = "2")]
    pub key: Vec<u8>,
}

/// One sending or receiving chain of a session.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Chain {
    /// The ratchet key this chain is indexed under, in type-prefixed form.
    #[prost(bytes = "vec", tag = "1")]
    pub sender_ratchet_key: Vec<u8>,
    /// Present only on sending chains, which own the ratchet keypair.
    #[prost(bytes = "vec", optional, tag = "2")]
    pub sender_ratchet_key_private: Option<Vec<u8>>,
    /// The current chain key.
    #[prost(message, optional, tag = "3")]
    pub chain_key: Option<ChainKey>,
    /// Skipped message keys, newest first.
    #[prost(message, repeated, tag = "4")]
    pub message_keys: Vec<MessageKey>,
}

/// Prekey material replayed in the clear with every outbound message until the remote side
/// acknowledges the session.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PendingPreKey {
    /// One-time prekey id, 0 when none was used.
    #[prost(uint32, tag = "1")]
    pub pre_key_id: u32,
    /// The base key we generated for the agreement, in type-prefixed form.
    #[prost(bytes = "vec", tag = "2")]
    pub base_key: Vec<u8>,
    /// Signed prekey id.
    #[prost(uint32, tag = "3")]
    pub signed_pre_key_id: u32,
}

/// One full Double Ratchet session.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SessionStructure {
    /// Protocol version the session was established under.
    #[prost(uint32, tag = "1")]
    pub session_version: u32,
    /// Our identity key, in type-prefixed form.
    #[prost(bytes = "vec", tag = "2")]
    pub local_identity_public: Vec<u8>,
    /// The remote identity key, in type-prefixed form.
    #[prost(bytes = "vec", tag = "3")]
    pub remote_identity_public: Vec<u8>,
    /// 32-byte root key.
    #[prost(bytes = "vec", tag = "4")]
    pub root_key: Vec<u8>,
    /// Number of messages sent in the sending chain before the last DH ratchet step.
    #[prost(uint32, tag = "5")]
    pub previous_counter: u32,
    /// The current sending chain.
    #[prost(message, optional, tag = "6")]
    pub sender_chain: Option<Chain>,
    /// Receiving chains, oldest first.
    #[prost(message, repeated, tag = "7")]
    pub receiver_chains: Vec<Chain>,
    /// Set while the remote side has not yet acknowledged the session.
    #[prost(message, optional, tag = "9")]
    pub pending_pre_key: Option<PendingPreKey>,
    /// The remote party's registration id.
    #[prost(uint32, tag = "10")]
    pub remote_registration_id: u32,
    /// Our registration id.
    #[prost(uint32, tag = "11")]
    pub local_registration_id: u32,
    /// The initiator's base key, indexing this session within its record.
    #[prost(bytes = "vec", tag = "13")]
    pub alice_base_key: Vec<u8>,
    /// Whether the base key above was generated by us; see
    /// [crate::state::BaseKeyType].
    #[prost(uint32, tag = "14")]
    pub base_key_type: u32,
    /// Milliseconds since the epoch when this session was archived; 0 while open. Ordering
    /// among archived sessions follows record position, not this stamp.
    #[prost(uint64, tag = "15")]
    pub closed_at: u64,
}

/// The durable form of a [crate::state::SessionRecord]: the open session plus archived ones,
/// newest first.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RecordStructure {
    /// The open session, if any.
    #[prost(message, optional, tag = "1")]
    pub current_session: Option<SessionStructure>,
    /// Archived sessions, newest first.
    #[prost(message, repeated, tag = "2")]
    pub previous_sessions: Vec<SessionStructure>,
}

/// The durable form of a [crate::state::PreKeyRecord].
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PreKeyRecordStructure {
    /// Prekey id.
    #[prost(uint32, tag = "1")]
    pub id: u32,
    /// Type-prefixed public key.
    #[prost(bytes = "vec", tag = "2")]
    pub public_key: Vec<u8>,
    /// Raw private key.
    #[prost(bytes = "vec", tag = "3")]
    pub private_key: Vec<u8>,
}

/// The durable form of a [crate::state::SignedPreKeyRecord].
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SignedPreKeyRecordStructure {
    /// Signed prekey id.
    #[prost(uint32, tag = "1")]
    pub id: u32,
    /// Type-prefixed public key.
    #[prost(bytes = "vec", tag = "2")]
    pub public_key: Vec<u8>,
    /// Raw private key.
    #[prost(bytes = "vec", tag = "3")]
    pub private_key: Vec<u8>,
    /// XEdDSA signature by the owner's identity key over the type-prefixed public key.
    #[prost(bytes = "vec", tag = "4")]
    pub signature: Vec<u8>,
    /// Milliseconds since the epoch at generation time.
    #[prost(fixed64, tag = "5")]
    pub timestamp: u64,
}

/// The durable form of an [crate::IdentityKeyPair].
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct IdentityKeyPairStructure {
    /// Type-prefixed public key.
    #[prost(bytes = "vec", tag = "1")]
    pub public_key: Vec<u8>,
    /// Raw private key.
    #[prost(bytes = "vec", tag = "2")]
    pub private_key: Vec<u8>,
}
