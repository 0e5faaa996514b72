//
// Copyright 2020-2022 Signal Messenger, LLC.
// SPDX-License-Identifier: AGPL-3.0-only
//

//! Rust implementation of a **[Signal Protocol]**-compatible session layer for asynchronous
//! forward-secret public-key cryptography.
//!
//! In particular, this library implements operations conforming to the following specifications:
//! - the **[X3DH]** key agreement protocol,
//! - the **[Double Ratchet]** messaging protocol.
//!
//! Sessions are bootstrapped from published prekey bundles, so neither party needs to be
//! online at the same time as the other. All state lives behind the storage traits in
//! [storage::traits]; per-address operation ordering is enforced by [job_queue].
//!
//! [Signal Protocol]: https://signal.org/
//! [X3DH]: https://signal.org/docs/specifications/x3dh/
//! [Double Ratchet]: https://signal.org/docs/specifications/doubleratchet/

#![warn(clippy::unwrap_used)]
#![deny(unsafe_code)]

pub mod address;
pub mod consts;
pub mod crypto;
pub mod curve;
pub mod error;
pub mod identity_key;
pub mod job_queue;
pub mod key_helper;
pub mod proto;
pub mod protocol;
pub mod ratchet;
pub mod session;
pub mod session_cipher;
pub mod state;
pub mod storage;
pub mod utils;

pub use error::{Result, SignalProtocolError};

pub use {
    address::{DeviceId, ProtocolAddress},
    consts::CIPHERTEXT_MESSAGE_CURRENT_VERSION,
    curve::{KeyPair, KeyType, PrivateKey, PublicKey},
    identity_key::{IdentityKey, IdentityKeyPair},
    job_queue::{session_job_queue, JobQueue},
    protocol::{
        CiphertextMessage, CiphertextMessageType, PreKeySignalMessage, SignalMessage,
    },
    ratchet::{
        initialize_alice_session_record, initialize_bob_session_record,
        params::{AliceSignalProtocolParameters, BobSignalProtocolParameters},
    },
    session::{process_prekey, process_prekey_bundle, SessionBuilder},
    session_cipher::{
        message_decrypt, message_decrypt_prekey, message_decrypt_signal, message_encrypt,
        EncryptedMessage, SessionCipher,
    },
    state::{
        BaseKeyType, PreKeyBundle, PreKeyId, PreKeyRecord, RegistrationId, SessionRecord,
        SignedPreKeyId, SignedPreKeyRecord,
    },
    storage::{
        inmem::{
            InMemIdentityKeyStore, InMemPreKeyStore, InMemSessionStore,
            InMemSignalProtocolStore, InMemSignedPreKeyStore,
        },
        traits::{
            Direction, IdentityKeyStore, PreKeyStore, ProtocolStore, SessionStore,
            SignedPreKeyStore,
        },
    },
};
