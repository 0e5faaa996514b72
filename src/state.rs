//
// Copyright 2020-2022 Signal Messenger, LLC.
// SPDX-License-Identifier: AGPL-3.0-only
//

//! Durable state consumed and produced by the protocol: sessions, prekeys and bundles.

pub mod bundle;
pub mod prekey;
pub mod session;
pub mod signed_prekey;

pub use bundle::{PreKeyBundle, RegistrationId};
pub use prekey::{PreKeyId, PreKeyRecord};
pub use session::{BaseKeyType, SessionRecord};
pub use signed_prekey::{SignedPreKeyId, SignedPreKeyRecord};

pub(crate) use session::SessionState;
