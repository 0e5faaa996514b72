//
// Copyright 2020-2022 Signal Messenger, LLC.
// SPDX-License-Identifier: AGPL-3.0-only
//

mod support;

use std::convert::TryFrom;
use std::sync::Arc;

use prost::Message;
use rand::rngs::OsRng;
use tokio::sync::Mutex;

use support::{contains_subsequence, publish_bundle, test_store};
use whisperlink::{
    message_decrypt_prekey, message_decrypt_signal, message_encrypt, process_prekey_bundle,
    proto::storage::RecordStructure, CiphertextMessage, CiphertextMessageType, PreKeySignalMessage,
    PreKeyStore, ProtocolAddress, Result, SessionCipher, SessionStore, SignalMessage,
    SignalProtocolError,
};

fn alice_address() -> ProtocolAddress {
    ProtocolAddress::new("+14151111111".to_string(), 1)
}

fn bob_address() -> ProtocolAddress {
    ProtocolAddress::new("+14152222222".to_string(), 1)
}

#[tokio::test]
async fn first_message_round_trips_and_reply_switches_type() -> Result<()> {
    let mut csprng = OsRng;
    let mut alice_store = test_store(&mut csprng);
    let mut bob_store = test_store(&mut csprng);

    let bob_bundle = publish_bundle(&mut bob_store, &mut csprng, Some(31337), 22).await?;
    process_prekey_bundle(&bob_address(), &mut alice_store, &bob_bundle, &mut csprng).await?;

    let outgoing = message_encrypt(b"hello", &bob_address(), &mut alice_store, &mut csprng).await?;
    assert_eq!(outgoing.message_type(), CiphertextMessageType::PreKey);

    let incoming = PreKeySignalMessage::try_from(outgoing.serialize())?;
    let ptext =
        message_decrypt_prekey(&incoming, &alice_address(), &mut bob_store, &mut csprng).await?;
    assert_eq!(ptext, b"hello");

    // The responder may now reply; the wire type drops to a plain message.
    let reply = message_encrypt(b"hi", &alice_address(), &mut bob_store, &mut csprng).await?;
    assert_eq!(reply.message_type(), CiphertextMessageType::Whisper);

    let reply_message = SignalMessage::try_from(reply.serialize())?;
    let reply_ptext =
        message_decrypt_signal(&reply_message, &bob_address(), &mut alice_store, &mut csprng)
            .await?;
    assert_eq!(reply_ptext, b"hi");

    // Once the initiator has processed a reply, her messages drop the prekey wrapping too.
    let second = message_encrypt(b"again", &bob_address(), &mut alice_store, &mut csprng).await?;
    assert_eq!(second.message_type(), CiphertextMessageType::Whisper);
    let second_message = SignalMessage::try_from(second.serialize())?;
    assert_eq!(
        message_decrypt_signal(&second_message, &alice_address(), &mut bob_store, &mut csprng)
            .await?,
        b"again"
    );

    Ok(())
}

#[tokio::test]
async fn messages_decrypt_in_any_order() -> Result<()> {
    let mut csprng = OsRng;
    let mut alice_store = test_store(&mut csprng);
    let mut bob_store = test_store(&mut csprng);

    let bob_bundle = publish_bundle(&mut bob_store, &mut csprng, Some(1), 2).await?;
    process_prekey_bundle(&bob_address(), &mut alice_store, &bob_bundle, &mut csprng).await?;

    let m1 = message_encrypt(b"m1", &bob_address(), &mut alice_store, &mut csprng).await?;
    let m2 = message_encrypt(b"m2", &bob_address(), &mut alice_store, &mut csprng).await?;
    let m3 = message_encrypt(b"m3", &bob_address(), &mut alice_store, &mut csprng).await?;

    for (ciphertext, expected) in [(&m3, &b"m3"[..]), (&m1, &b"m1"[..]), (&m2, &b"m2"[..])] {
        let incoming = PreKeySignalMessage::try_from(ciphertext.serialize())?;
        let ptext =
            message_decrypt_prekey(&incoming, &alice_address(), &mut bob_store, &mut csprng)
                .await?;
        assert_eq!(ptext, expected);
    }

    Ok(())
}

#[tokio::test]
async fn late_delivery_after_a_large_gap_still_decrypts() -> Result<()> {
    let mut csprng = OsRng;
    let mut alice_store = test_store(&mut csprng);
    let mut bob_store = test_store(&mut csprng);

    let bob_bundle = publish_bundle(&mut bob_store, &mut csprng, Some(1), 2).await?;
    process_prekey_bundle(&bob_address(), &mut alice_store, &bob_bundle, &mut csprng).await?;

    let mut messages = Vec::with_capacity(100);
    for i in 0..100u32 {
        let ptext = format!("message {}", i).into_bytes();
        let ciphertext =
            message_encrypt(&ptext, &bob_address(), &mut alice_store, &mut csprng).await?;
        messages.push((ptext, ciphertext));
    }

    // The last message arrives first; everything before it is derived and cached.
    let (last_ptext, last_ciphertext) = messages.pop().expect("100 messages");
    let incoming = PreKeySignalMessage::try_from(last_ciphertext.serialize())?;
    assert_eq!(
        message_decrypt_prekey(&incoming, &alice_address(), &mut bob_store, &mut csprng).await?,
        last_ptext
    );

    for (ptext, ciphertext) in messages {
        let incoming = PreKeySignalMessage::try_from(ciphertext.serialize())?;
        assert_eq!(
            message_decrypt_prekey(&incoming, &alice_address(), &mut bob_store, &mut csprng)
                .await?,
            ptext
        );
    }

    Ok(())
}

#[tokio::test]
async fn counter_gaps_past_the_window_are_rejected() -> Result<()> {
    let mut csprng = OsRng;
    let mut alice_store = test_store(&mut csprng);
    let mut bob_store = test_store(&mut csprng);

    let bob_bundle = publish_bundle(&mut bob_store, &mut csprng, Some(1), 2).await?;
    process_prekey_bundle(&bob_address(), &mut alice_store, &bob_bundle, &mut csprng).await?;

    let mut last = None;
    for _ in 0..2002u32 {
        last = Some(message_encrypt(b"x", &bob_address(), &mut alice_store, &mut csprng).await?);
    }
    let last = last.expect("messages were sent");

    let incoming = PreKeySignalMessage::try_from(last.serialize())?;
    let result =
        message_decrypt_prekey(&incoming, &alice_address(), &mut bob_store, &mut csprng).await;
    assert!(matches!(
        result,
        Err(SignalProtocolError::ExcessiveForwardJumps(2001, 0))
    ));

    // The failed decrypt consumed nothing: no session was persisted and the one-time prekey
    // is still available.
    assert!(bob_store.load_session(&alice_address()).await?.is_none());
    assert!(bob_store.get_pre_key(1).await.is_ok());

    Ok(())
}

#[tokio::test]
async fn duplicate_delivery_fails_the_second_time() -> Result<()> {
    let mut csprng = OsRng;
    let mut alice_store = test_store(&mut csprng);
    let mut bob_store = test_store(&mut csprng);

    let bob_bundle = publish_bundle(&mut bob_store, &mut csprng, Some(1), 2).await?;
    process_prekey_bundle(&bob_address(), &mut alice_store, &bob_bundle, &mut csprng).await?;

    let ciphertext = message_encrypt(b"once", &bob_address(), &mut alice_store, &mut csprng).await?;
    let incoming = PreKeySignalMessage::try_from(ciphertext.serialize())?;

    assert_eq!(
        message_decrypt_prekey(&incoming, &alice_address(), &mut bob_store, &mut csprng).await?,
        b"once"
    );

    let replay =
        message_decrypt_prekey(&incoming, &alice_address(), &mut bob_store, &mut csprng).await;
    assert!(matches!(
        replay,
        Err(SignalProtocolError::DuplicatedMessage(1, 0))
    ));

    Ok(())
}

#[tokio::test]
async fn tampered_signed_prekey_signature_is_rejected_before_any_state_change() -> Result<()> {
    let mut csprng = OsRng;
    let mut alice_store = test_store(&mut csprng);
    let mut bob_store = test_store(&mut csprng);

    let bob_bundle = publish_bundle(&mut bob_store, &mut csprng, Some(1), 2).await?;

    let mut bad_signature = bob_bundle.signed_pre_key_signature().to_vec();
    bad_signature[0] ^= 0x01;
    let bad_bundle = whisperlink::PreKeyBundle::new(
        bob_bundle.registration_id(),
        bob_bundle.device_id(),
        bob_bundle
            .pre_key_id()
            .and_then(|id| bob_bundle.pre_key_public().map(|key| (id, key))),
        bob_bundle.signed_pre_key_id(),
        bob_bundle.signed_pre_key_public(),
        bad_signature,
        *bob_bundle.identity_key(),
    );

    let result =
        process_prekey_bundle(&bob_address(), &mut alice_store, &bad_bundle, &mut csprng).await;
    assert!(matches!(
        result,
        Err(SignalProtocolError::SignatureValidationFailed)
    ));
    assert!(alice_store.load_session(&bob_address()).await?.is_none());

    Ok(())
}

#[tokio::test]
async fn tampered_mac_is_rejected_and_the_original_still_decrypts() -> Result<()> {
    let mut csprng = OsRng;
    let mut alice_store = test_store(&mut csprng);
    let mut bob_store = test_store(&mut csprng);

    let bob_bundle = publish_bundle(&mut bob_store, &mut csprng, Some(1), 2).await?;
    process_prekey_bundle(&bob_address(), &mut alice_store, &bob_bundle, &mut csprng).await?;

    // Establish the session in both directions first.
    let first = message_encrypt(b"hello", &bob_address(), &mut alice_store, &mut csprng).await?;
    let incoming = PreKeySignalMessage::try_from(first.serialize())?;
    message_decrypt_prekey(&incoming, &alice_address(), &mut bob_store, &mut csprng).await?;

    let ciphertext = message_encrypt(b"x", &alice_address(), &mut bob_store, &mut csprng).await?;
    assert_eq!(ciphertext.message_type(), CiphertextMessageType::Whisper);

    let mut tampered = ciphertext.serialize().to_vec();
    let last = tampered.len() - 1;
    tampered[last] ^= 0x01;
    let tampered = SignalMessage::try_from(tampered.as_ref())?;

    let before = alice_store
        .load_session(&bob_address())
        .await?
        .expect("session exists")
        .serialize()?;

    let result =
        message_decrypt_signal(&tampered, &bob_address(), &mut alice_store, &mut csprng).await;
    assert!(matches!(result, Err(SignalProtocolError::InvalidMac)));

    // The rejected message changed nothing durable.
    let after = alice_store
        .load_session(&bob_address())
        .await?
        .expect("session exists")
        .serialize()?;
    assert_eq!(before, after);

    let untampered = SignalMessage::try_from(ciphertext.serialize())?;
    assert_eq!(
        message_decrypt_signal(&untampered, &bob_address(), &mut alice_store, &mut csprng).await?,
        b"x"
    );

    Ok(())
}

#[tokio::test]
async fn record_serialization_round_trips_with_skipped_keys() -> Result<()> {
    let mut csprng = OsRng;
    let mut alice_store = test_store(&mut csprng);
    let mut bob_store = test_store(&mut csprng);

    let bob_bundle = publish_bundle(&mut bob_store, &mut csprng, Some(1), 2).await?;
    process_prekey_bundle(&bob_address(), &mut alice_store, &bob_bundle, &mut csprng).await?;

    // Skip two messages so the receiving chain caches keys.
    let m1 = message_encrypt(b"m1", &bob_address(), &mut alice_store, &mut csprng).await?;
    let _m2 = message_encrypt(b"m2", &bob_address(), &mut alice_store, &mut csprng).await?;
    let _m3 = message_encrypt(b"m3", &bob_address(), &mut alice_store, &mut csprng).await?;
    let m4 = message_encrypt(b"m4", &bob_address(), &mut alice_store, &mut csprng).await?;

    for ciphertext in [&m4, &m1] {
        let incoming = PreKeySignalMessage::try_from(ciphertext.serialize())?;
        message_decrypt_prekey(&incoming, &alice_address(), &mut bob_store, &mut csprng).await?;
    }

    let record = bob_store
        .load_session(&alice_address())
        .await?
        .expect("session exists");
    let serialized = record.serialize()?;
    let deserialized = whisperlink::SessionRecord::deserialize(&serialized)?;
    assert_eq!(record, deserialized);
    assert_eq!(serialized, deserialized.serialize()?);

    Ok(())
}

#[tokio::test]
async fn consumed_one_time_prekey_is_removed_exactly_once() -> Result<()> {
    let mut csprng = OsRng;
    let mut alice_store = test_store(&mut csprng);
    let mut bob_store = test_store(&mut csprng);

    let bob_bundle = publish_bundle(&mut bob_store, &mut csprng, Some(31337), 2).await?;
    process_prekey_bundle(&bob_address(), &mut alice_store, &bob_bundle, &mut csprng).await?;

    let ciphertext = message_encrypt(b"hello", &bob_address(), &mut alice_store, &mut csprng).await?;
    let incoming = PreKeySignalMessage::try_from(ciphertext.serialize())?;

    assert!(bob_store.get_pre_key(31337).await.is_ok());
    message_decrypt_prekey(&incoming, &alice_address(), &mut bob_store, &mut csprng).await?;
    assert!(matches!(
        bob_store.get_pre_key(31337).await,
        Err(SignalProtocolError::InvalidPreKeyId)
    ));

    // A retransmission reuses the existing session rather than consulting the prekey store,
    // so the missing prekey does not get in the way; the duplicate merely fails as such.
    let replay =
        message_decrypt_prekey(&incoming, &alice_address(), &mut bob_store, &mut csprng).await;
    assert!(matches!(
        replay,
        Err(SignalProtocolError::DuplicatedMessage(_, _))
    ));

    Ok(())
}

#[tokio::test]
async fn ratchet_step_discards_prior_root_key_and_ephemeral() -> Result<()> {
    let mut csprng = OsRng;
    let mut alice_store = test_store(&mut csprng);
    let mut bob_store = test_store(&mut csprng);

    let bob_bundle = publish_bundle(&mut bob_store, &mut csprng, Some(1), 2).await?;
    process_prekey_bundle(&bob_address(), &mut alice_store, &bob_bundle, &mut csprng).await?;

    let first = message_encrypt(b"hello", &bob_address(), &mut alice_store, &mut csprng).await?;

    let before = alice_store
        .load_session(&bob_address())
        .await?
        .expect("session exists")
        .serialize()?;
    let before = RecordStructure::decode(before.as_ref())?;
    let session_before = before.current_session.expect("open session");
    let old_root_key = session_before.root_key.clone();
    let old_sender_chain = session_before.sender_chain.expect("sender chain");
    let old_ratchet_private = old_sender_chain
        .sender_ratchet_key_private
        .expect("sending chains own their ratchet key");

    // Bob's reply carries a fresh ratchet key, stepping Alice's DH ratchet on decrypt.
    let incoming = PreKeySignalMessage::try_from(first.serialize())?;
    message_decrypt_prekey(&incoming, &alice_address(), &mut bob_store, &mut csprng).await?;
    let reply = message_encrypt(b"hi", &alice_address(), &mut bob_store, &mut csprng).await?;
    let reply = SignalMessage::try_from(reply.serialize())?;
    message_decrypt_signal(&reply, &bob_address(), &mut alice_store, &mut csprng).await?;

    let after = alice_store
        .load_session(&bob_address())
        .await?
        .expect("session exists")
        .serialize()?;

    assert!(!contains_subsequence(&after, &old_root_key));
    assert!(!contains_subsequence(&after, &old_ratchet_private));

    Ok(())
}

#[tokio::test]
async fn archived_session_is_promoted_by_a_late_message() -> Result<()> {
    let mut csprng = OsRng;
    let mut alice_store = test_store(&mut csprng);
    let mut bob_store = test_store(&mut csprng);

    // Session one, fully established in both directions.
    let bundle_one = publish_bundle(&mut bob_store, &mut csprng, Some(1), 2).await?;
    process_prekey_bundle(&bob_address(), &mut alice_store, &bundle_one, &mut csprng).await?;
    let first = message_encrypt(b"hello", &bob_address(), &mut alice_store, &mut csprng).await?;
    let incoming = PreKeySignalMessage::try_from(first.serialize())?;
    message_decrypt_prekey(&incoming, &alice_address(), &mut bob_store, &mut csprng).await?;

    // Alice bootstraps a second session, archiving the first on her side.
    let bundle_two = publish_bundle(&mut bob_store, &mut csprng, Some(3), 4).await?;
    process_prekey_bundle(&bob_address(), &mut alice_store, &bundle_two, &mut csprng).await?;

    // Bob, unaware, replies over the first session; Alice can still read it.
    let late = message_encrypt(b"late reply", &alice_address(), &mut bob_store, &mut csprng).await?;
    let late = SignalMessage::try_from(late.serialize())?;
    assert_eq!(
        message_decrypt_signal(&late, &bob_address(), &mut alice_store, &mut csprng).await?,
        b"late reply"
    );

    // And the promoted session keeps working in both directions.
    let followup = message_encrypt(b"still here", &bob_address(), &mut alice_store, &mut csprng).await?;
    match followup.message_type() {
        CiphertextMessageType::Whisper => {
            let msg = SignalMessage::try_from(followup.serialize())?;
            assert_eq!(
                message_decrypt_signal(&msg, &alice_address(), &mut bob_store, &mut csprng).await?,
                b"still here"
            );
        }
        CiphertextMessageType::PreKey => {
            let msg = PreKeySignalMessage::try_from(followup.serialize())?;
            assert_eq!(
                message_decrypt_prekey(&msg, &alice_address(), &mut bob_store, &mut csprng).await?,
                b"still here"
            );
        }
    }

    Ok(())
}

#[tokio::test]
async fn concurrent_encrypts_against_one_address_serialize_cleanly() -> Result<()> {
    let mut csprng = OsRng;
    let mut alice_store = test_store(&mut csprng);
    let mut bob_store = test_store(&mut csprng);

    let bob_bundle = publish_bundle(&mut bob_store, &mut csprng, Some(1), 2).await?;
    process_prekey_bundle(&bob_address(), &mut alice_store, &bob_bundle, &mut csprng).await?;

    let shared_store = Arc::new(Mutex::new(alice_store));
    let cipher_one = SessionCipher::new(shared_store.clone(), bob_address());
    let cipher_two = SessionCipher::new(shared_store.clone(), bob_address());

    let mut csprng_one = OsRng;
    let mut csprng_two = OsRng;
    let (first, second) = tokio::join!(
        cipher_one.encrypt(b"first", &mut csprng_one),
        cipher_two.encrypt(b"second", &mut csprng_two),
    );
    let (first, second) = (first?, second?);

    let counter_of = |encrypted: &whisperlink::EncryptedMessage| -> Result<u32> {
        match encrypted.message() {
            CiphertextMessage::PreKeySignalMessage(m) => Ok(m.message().counter()),
            CiphertextMessage::SignalMessage(m) => Ok(m.counter()),
        }
    };
    let mut counters = vec![counter_of(&first)?, counter_of(&second)?];
    counters.sort_unstable();
    assert_eq!(counters, vec![0, 1]);

    let expected_registration_id = bob_bundle.registration_id();
    assert_eq!(first.registration_id(), expected_registration_id);
    assert_eq!(second.registration_id(), expected_registration_id);

    // Both decrypt on the peer, in either order.
    for (encrypted, expected) in [(&second, &b"second"[..]), (&first, &b"first"[..])] {
        let incoming = PreKeySignalMessage::try_from(encrypted.body())?;
        assert_eq!(
            message_decrypt_prekey(&incoming, &alice_address(), &mut bob_store, &mut csprng)
                .await?,
            expected
        );
    }

    Ok(())
}

#[tokio::test]
async fn cipher_facade_round_trips_through_the_job_queue() -> Result<()> {
    let mut csprng = OsRng;
    let alice_store = test_store(&mut csprng);
    let mut bob_store = test_store(&mut csprng);

    let bob_bundle = publish_bundle(&mut bob_store, &mut csprng, Some(1), 2).await?;

    let alice_store = Arc::new(Mutex::new(alice_store));
    let builder = whisperlink::SessionBuilder::new(alice_store.clone(), bob_address());
    builder.process_pre_key_bundle(&bob_bundle, &mut csprng).await?;

    let alice_cipher = SessionCipher::new(alice_store.clone(), bob_address());
    let encrypted = alice_cipher.encrypt(b"over the facade", &mut csprng).await?;
    assert_eq!(encrypted.message_type(), CiphertextMessageType::PreKey);

    let bob_store = Arc::new(Mutex::new(bob_store));
    let bob_cipher = SessionCipher::new(bob_store.clone(), alice_address());
    assert_eq!(
        bob_cipher
            .decrypt_pre_key_message(encrypted.body(), &mut csprng)
            .await?,
        b"over the facade"
    );

    let reply = bob_cipher.encrypt(b"ack", &mut csprng).await?;
    assert_eq!(reply.message_type(), CiphertextMessageType::Whisper);
    assert_eq!(
        alice_cipher.decrypt_message(reply.body(), &mut csprng).await?,
        b"ack"
    );

    Ok(())
}
