//! Whole-card scenarios across lifecycle, PIN, fields and avatar transfer

use proptest::prelude::*;

use super::applet::PurseApplet;
use super::pin_manager::PinState;
use super::transfer::{AvatarChunk, UploadStatus, AVATAR_CHUNK_MAX};
use crate::apdu::BalanceOp;
use crate::card::CardIdentity;
use crate::config::EngineConfig;
use crate::error::CardError;
use crate::test_support::{applet_with_config, pin, provisioned_applet, test_config};

fn verified_applet() -> PurseApplet {
    let mut applet = provisioned_applet();
    applet.verify_pin(&pin("1234")).unwrap();
    applet
}

fn upload(applet: &mut PurseApplet, avatar: &[u8]) -> UploadStatus {
    let total_len = avatar.len() as u16;
    let mut status = UploadStatus::Pending;
    for (i, part) in avatar.chunks(AVATAR_CHUNK_MAX).enumerate() {
        let offset = i * AVATAR_CHUNK_MAX;
        status = applet
            .upload_avatar_chunk(&AvatarChunk {
                total_len,
                offset: offset as u16,
                bytes: part.to_vec(),
                is_final: offset + part.len() == avatar.len(),
            })
            .unwrap();
    }
    status
}

fn sample_avatar(len: usize) -> Vec<u8> {
    // Never zero, so trailing-zero stripping cannot shorten it
    (0..len).map(|i| (i % 251) as u8 + 1).collect()
}

#[test]
fn test_end_to_end() {
    let mut applet = applet_with_config(EngineConfig::default());
    applet
        .provision(&pin("1234"), CardIdentity::new(b"CARD001").unwrap())
        .unwrap();

    assert_eq!(applet.verify_pin(&pin("1234")), Ok(5));
    applet.update_balance(BalanceOp::TopUp, 50_000).unwrap();
    assert_eq!(applet.balance(), Ok(50_000));

    assert_eq!(
        applet.verify_pin(&pin("0000")),
        Err(CardError::PinMismatch { tries_remaining: 4 })
    );
    for expected in [3, 2, 1] {
        assert_eq!(
            applet.verify_pin(&pin("0000")),
            Err(CardError::PinMismatch { tries_remaining: expected })
        );
    }
    assert_eq!(applet.verify_pin(&pin("0000")), Err(CardError::PinBlocked));
    assert_eq!(applet.verify_pin(&pin("1234")), Err(CardError::PinBlocked));
    assert_eq!(applet.pin_state(), PinState::Locked);
    assert_eq!(applet.balance(), Err(CardError::NotVerified));

    // Admin reset recovers the card with its data intact
    assert_eq!(applet.reset_tries(), Ok(5));
    assert_eq!(applet.verify_pin(&pin("1234")), Ok(5));
    assert_eq!(applet.balance(), Ok(50_000));
}

#[test]
fn test_deactivate_is_lockout() {
    let mut applet = verified_applet();
    applet.deactivate().unwrap();

    assert!(!applet.is_verified());
    assert_eq!(applet.tries_remaining(), Ok(0));
    assert_eq!(applet.pin_state(), PinState::Inactive);
    assert_eq!(applet.verify_pin(&pin("1234")), Err(CardError::Inactive));
    assert_eq!(applet.sign(b"nonce"), Err(CardError::NotVerified));

    assert_eq!(applet.activate(), Ok(5));
    assert_eq!(applet.verify_pin(&pin("1234")), Ok(5));
}

#[test]
fn test_admin_commands_need_provisioning() {
    let mut applet = crate::test_support::test_applet();
    assert_eq!(applet.activate(), Err(CardError::NotInitialized));
    assert_eq!(applet.reset_tries(), Err(CardError::NotInitialized));
    assert_eq!(applet.deactivate(), Err(CardError::NotInitialized));
    assert_eq!(applet.forget_pin(&pin("1111")), Err(CardError::NotInitialized));
    assert_eq!(applet.pin_state(), PinState::NotProvisioned);
}

#[test]
fn test_change_pin_with_wrong_old_pin_costs_a_try() {
    let mut applet = verified_applet();
    assert_eq!(
        applet.change_pin(&pin("9999"), &pin("5678")),
        Err(CardError::PinMismatch { tries_remaining: 4 })
    );
    applet.change_pin(&pin("1234"), &pin("5678")).unwrap();
    assert_eq!(applet.tries_remaining(), Ok(5));

    applet.reset();
    assert_eq!(
        applet.verify_pin(&pin("1234")),
        Err(CardError::PinMismatch { tries_remaining: 4 })
    );
    assert_eq!(applet.verify_pin(&pin("5678")), Ok(5));
}

#[test]
fn test_change_pin_requires_verification() {
    let mut applet = provisioned_applet();
    assert_eq!(
        applet.change_pin(&pin("1234"), &pin("5678")),
        Err(CardError::NotVerified)
    );
    assert_eq!(applet.tries_remaining(), Ok(5));
}

#[test]
fn test_forget_pin_keeps_fields() {
    let mut applet = verified_applet();
    applet.update_balance(BalanceOp::TopUp, 1_234).unwrap();
    applet.set_info(b"Tran Thi B").unwrap();
    let avatar = sample_avatar(900);
    upload(&mut applet, &avatar);

    // Locked out, then the admin replaces the PIN
    applet.reset();
    for _ in 0..5 {
        applet.verify_pin(&pin("0000")).unwrap_err();
    }
    assert_eq!(applet.forget_pin(&pin("2468")), Ok(5));
    assert!(!applet.is_verified());

    assert_eq!(applet.verify_pin(&pin("2468")), Ok(5));
    assert_eq!(applet.balance(), Ok(1_234));
    assert_eq!(applet.info(), Ok(b"Tran Thi B".to_vec()));
    assert_eq!(applet.avatar(), Ok(avatar));
}

#[test]
fn test_balance_guard() {
    let mut applet = verified_applet();
    applet.update_balance(BalanceOp::TopUp, 100).unwrap();
    let before = applet.card_state().encrypted_balance.clone();

    assert_eq!(
        applet.update_balance(BalanceOp::Payment, 101),
        Err(CardError::InsufficientFunds { balance: 100, requested: 101 })
    );
    assert_eq!(applet.card_state().encrypted_balance, before);
    assert_eq!(applet.update_balance(BalanceOp::Payment, 100), Ok(0));
    assert_eq!(applet.balance(), Ok(0));
}

#[test]
fn test_large_avatar_random_access() {
    let mut applet = verified_applet();
    let avatar = sample_avatar(15_000);
    assert_eq!(avatar.chunks(AVATAR_CHUNK_MAX).count(), 75);

    assert_eq!(upload(&mut applet, &avatar), UploadStatus::Committed { ciphertext_len: 15_008 });

    for offset in [0usize, 7_000, 14_999] {
        let slice = applet.avatar_chunk(offset as u16).unwrap();
        let end = (offset + AVATAR_CHUNK_MAX).min(avatar.len());
        assert_eq!(slice.total_len, 15_000);
        assert_eq!(slice.data, avatar[offset..end].to_vec());
    }
    assert!(applet.avatar_chunk(15_000).unwrap().data.is_empty());

    // Walking the offsets rebuilds the original
    let mut rebuilt = Vec::new();
    loop {
        let slice = applet.avatar_chunk(rebuilt.len() as u16).unwrap();
        if slice.data.is_empty() {
            break;
        }
        rebuilt.extend_from_slice(&slice.data);
    }
    assert_eq!(rebuilt, avatar);
    assert_eq!(applet.avatar(), Ok(avatar));
}

#[test]
fn test_avatar_needs_verification() {
    let mut applet = provisioned_applet();
    let chunk = AvatarChunk {
        total_len: 3,
        offset: 0,
        bytes: vec![1, 2, 3],
        is_final: true,
    };
    assert_eq!(applet.upload_avatar_chunk(&chunk), Err(CardError::NotVerified));
    assert_eq!(applet.avatar(), Err(CardError::NotVerified));
    assert_eq!(applet.avatar_chunk(0), Err(CardError::NotVerified));
}

#[test]
fn test_abandoned_upload_keeps_committed_avatar() {
    let mut applet = verified_applet();
    let avatar = sample_avatar(600);
    upload(&mut applet, &avatar);

    let status = applet
        .upload_avatar_chunk(&AvatarChunk {
            total_len: 400,
            offset: 0,
            bytes: vec![0xEE; 200],
            is_final: false,
        })
        .unwrap();
    assert_eq!(status, UploadStatus::Pending);
    assert_eq!(applet.avatar(), Ok(avatar.clone()));

    // A fresh upload overwrites the stale assembly from the start
    let replacement = sample_avatar(250);
    upload(&mut applet, &replacement);
    assert_eq!(applet.avatar(), Ok(replacement));
}

#[test]
fn test_tampered_balance_is_not_detected() {
    let mut applet = verified_applet();
    applet.update_balance(BalanceOp::TopUp, 50_000).unwrap();
    applet.card_state_mut().encrypted_balance[0] ^= 0x80;

    // No integrity tag: the read succeeds with a different value
    let balance = applet.balance().unwrap();
    assert_ne!(balance, 50_000);
}

#[test]
fn test_clear_keeps_keypair() {
    let mut applet = verified_applet();
    let public_key = applet.public_key().unwrap();
    applet.update_balance(BalanceOp::TopUp, 10).unwrap();

    applet.clear();
    assert!(!applet.is_verified());
    assert_eq!(applet.identity().err(), Some(CardError::NotInitialized));
    assert_eq!(applet.balance(), Err(CardError::NotInitialized));
    assert!(applet.card_state().encrypted_master_key.is_empty());
    assert!(applet.card_state().encrypted_balance.is_empty());

    let reprovisioned = applet
        .provision(&pin("4321"), CardIdentity::new(b"CARD002").unwrap())
        .unwrap();
    assert_eq!(reprovisioned, public_key);
    applet.verify_pin(&pin("4321")).unwrap();
    assert_eq!(applet.balance(), Ok(0));
}

#[test]
fn test_provision_generates_keypair_when_absent() {
    let mut applet = PurseApplet::new(crate::card::CardDataStore::in_memory(), test_config());
    assert!(!applet.card_state().has_signing_key());

    applet
        .provision(&pin("1234"), CardIdentity::new(b"CARD009").unwrap())
        .unwrap();
    assert!(applet.card_state().has_signing_key());

    applet.verify_pin(&pin("1234")).unwrap();
    let signature = applet.sign(b"challenge").unwrap();
    assert_eq!(signature.len(), 128);
}

fn wrong_pin() -> impl Strategy<Value = String> {
    "[0-9]{4}".prop_filter("must differ from the real PIN", |p| p != "1234")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn lockout_is_monotonic(max_tries in 1u8..=15, attempts in prop::collection::vec(wrong_pin(), 1..20)) {
        let mut applet = applet_with_config(EngineConfig { max_pin_tries: max_tries, ..test_config() });
        applet.provision(&pin("1234"), CardIdentity::new(b"CARD001").unwrap()).unwrap();

        let mut last = max_tries;
        for attempt in &attempts {
            match applet.verify_pin(&pin(attempt)) {
                Err(CardError::PinMismatch { tries_remaining }) => {
                    prop_assert_eq!(tries_remaining, last - 1);
                    last = tries_remaining;
                }
                Err(CardError::PinBlocked) => last = 0,
                other => prop_assert!(false, "unexpected verify result {:?}", other),
            }
            prop_assert_eq!(applet.tries_remaining(), Ok(last));
        }

        if last == 0 {
            prop_assert_eq!(applet.verify_pin(&pin("1234")), Err(CardError::PinBlocked));
        } else {
            prop_assert_eq!(applet.verify_pin(&pin("1234")), Ok(max_tries));
        }
    }

    #[test]
    fn pin_rotation_keeps_balance(balance in 0i32..=i32::MAX, new_pin in "[0-9]{4}") {
        let mut applet = verified_applet();
        applet.update_balance(BalanceOp::TopUp, balance).unwrap();
        let ciphertext = applet.card_state().encrypted_balance.clone();

        applet.change_pin(&pin("1234"), &pin(&new_pin)).unwrap();
        prop_assert_eq!(&applet.card_state().encrypted_balance, &ciphertext);

        applet.reset();
        prop_assert_eq!(applet.verify_pin(&pin(&new_pin)), Ok(5));
        prop_assert_eq!(applet.balance(), Ok(balance));
    }
}
