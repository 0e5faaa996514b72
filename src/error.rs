//
// Copyright 2020-2022 Signal Messenger, LLC.
// SPDX-License-Identifier: AGPL-3.0-only
//

//! The error type returned by every fallible operation in this crate.

use crate::address::ProtocolAddress;
use crate::curve::KeyType;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SignalProtocolError>;

#[derive(Debug, Error)]
pub enum SignalProtocolError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid state for call to {0} to succeed: {1}")]
    InvalidState(&'static str, String),

    #[error("failed to decode protobuf: {0}")]
    ProtobufDecodingError(#[from] prost::DecodeError),
    #[error("protobuf encoding was invalid")]
    InvalidProtobufEncoding,

    #[error("ciphertext serialized bytes were too short <{0}>")]
    CiphertextMessageTooShort(usize),
    #[error("ciphertext version was too old <{0}>")]
    LegacyCiphertextVersion(u8),
    #[error("ciphertext version was unrecognized <{0}>")]
    UnrecognizedCiphertextVersion(u8),
    #[error("invalid ciphertext message")]
    InvalidCiphertext,
    #[error("message MAC did not verify")]
    InvalidMac,
    #[error("MAC key length <{0}> was invalid")]
    InvalidMacKeyLength(usize),

    #[error("no key type identifier")]
    NoKeyTypeIdentifier,
    #[error("bad key type <{0:#04x}>")]
    BadKeyType(u8),
    #[error("bad key length <{1}> for key with type <{0}>")]
    BadKeyLength(KeyType, usize),
    #[error("signature validation failed")]
    SignatureValidationFailed,

    #[error("untrusted identity for address {0}")]
    UntrustedIdentity(ProtocolAddress),
    #[error("invalid prekey identifier")]
    InvalidPreKeyId,
    #[error("invalid signed prekey identifier")]
    InvalidSignedPreKeyId,

    #[error("session with {0} not found")]
    SessionNotFound(ProtocolAddress),
    #[error("invalid session: {0}")]
    InvalidSessionStructure(&'static str),

    #[error("message with old counter {1} (chain is at {0})")]
    DuplicatedMessage(u32, u32),
    #[error("message counter {0} too far ahead of receiver chain at {1}")]
    ExcessiveForwardJumps(u32, u32),
    #[error("invalid message: {0}")]
    InvalidMessage(&'static str),
}
