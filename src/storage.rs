//
// Copyright 2020-2022 Signal Messenger, LLC.
// SPDX-License-Identifier: AGPL-3.0-only
//

//! The capability set the protocol requires from its durable store, plus reference in-memory
//! implementations.

pub mod inmem;
pub mod traits;

pub use inmem::{
    InMemIdentityKeyStore, InMemPreKeyStore, InMemSessionStore, InMemSignalProtocolStore,
    InMemSignedPreKeyStore,
};
pub use traits::{
    Direction, IdentityKeyStore, PreKeyStore, ProtocolStore, SessionStore, SignedPreKeyStore,
};
