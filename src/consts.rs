//
// Copyright 2020-2022 Signal Messenger, LLC.
// SPDX-License-Identifier: AGPL-3.0-only
//

//! Magic numbers.

/// Types which must stay static for correctness, and often correlate to fields of structs in
/// [crate::proto].
pub mod types {
    /// The data used to represent the message version in
    /// [super::CIPHERTEXT_MESSAGE_CURRENT_VERSION].
    pub type VersionType = u8;

    /// Type for the incrementing counter used in all [crate::ratchet] chains.
    pub type Counter = u32;
}

/// Each [crate::SignalMessage] has this message version mixed into it when created. Prefer to
/// reference this value over use of the literal version number.
pub const CIPHERTEXT_MESSAGE_CURRENT_VERSION: types::VersionType = 3;

/// Various positive integers bounding the maximum size of other data structures.
pub mod limits {
    /// The maximum distance a message counter may run ahead of its receiver chain before the
    /// message is rejected outright.
    pub const MAX_FORWARD_JUMPS: usize = 2000;
    /// The maximum number of per-message keys retained within one chain to decrypt messages
    /// delivered out of order.
    pub const MAX_MESSAGE_KEYS: usize = 2000;
    /// The maximum number of skipped message keys retained across all chains of a single
    /// session. Oldest keys are evicted first.
    pub const MAX_SESSION_MESSAGE_KEYS: usize = 2000;
    /// The maximum number of superseded receiver chains kept around so that stragglers from a
    /// previous ratchet step can still be decrypted.
    pub const MAX_RECEIVER_CHAINS: usize = 5;
    /// The maximum number of archived sessions retained per [crate::state::SessionRecord].
    pub const ARCHIVED_STATES_MAX_LENGTH: usize = 40;
    /// Registration ids are 14-bit values in `[1, MAX_REGISTRATION_ID]`.
    pub const MAX_REGISTRATION_ID: u32 = 16380;
}
