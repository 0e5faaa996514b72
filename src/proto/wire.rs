//
// Copyright 2020-2022 Signal Messenger, LLC.
// SPDX-License-Identifier: AGPL-3.0-only
//

//! Structs encoding the byte-level layout of messages sent over the wire.
//!
//! Field numbers are part of the v3 wire protocol and must not be changed.

/// The ciphertext frame of an established session, minus its leading version byte and trailing
/// MAC. See [crate::protocol::SignalMessage].
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SignalMessage {
    /// The sender's current ratchet key, in type-prefixed form.
    #[prost(bytes = "vec", optional, tag = "1")]
    pub ratchet_key: Option<Vec<u8>>,
    /// Index of the message key within the sending chain.
    #[prost(uint32, optional, tag = "2")]
    pub counter: Option<u32>,
    /// Number of messages sent in the previous sending chain.
    #[prost(uint32, optional, tag = "3")]
    pub previous_counter: Option<u32>,
    /// The AES-256-CBC ciphertext.
    #[prost(bytes = "vec", optional, tag = "4")]
    pub ciphertext: Option<Vec<u8>>,
}

/// The frame wrapping a [SignalMessage] until the receiver acknowledges the new session. See
/// [crate::protocol::PreKeySignalMessage].
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PreKeySignalMessage {
    /// The sender's registration id.
    #[prost(uint32, optional, tag = "5")]
    pub registration_id: Option<u32>,
    /// Identifies the receiver's one-time prekey consumed, if any.
    #[prost(uint32, optional, tag = "1")]
    pub pre_key_id: Option<u32>,
    /// Identifies the receiver's signed prekey used in the key agreement.
    #[prost(uint32, optional, tag = "6")]
    pub signed_pre_key_id: Option<u32>,
    /// The sender's ephemeral base key, in type-prefixed form.
    #[prost(bytes = "vec", optional, tag = "2")]
    pub base_key: Option<Vec<u8>>,
    /// The sender's long-term identity key, in type-prefixed form.
    #[prost(bytes = "vec", optional, tag = "3")]
    pub identity_key: Option<Vec<u8>>,
    /// A complete serialized [crate::protocol::SignalMessage], version byte and MAC included.
    #[prost(bytes = "vec", optional, tag = "4")]
    pub message: Option<Vec<u8>>,
}
