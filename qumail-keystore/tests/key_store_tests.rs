//! Integration tests for the quantum key store.

use chrono::Duration;
use qumail_keystore::{FetchOutcome, KeyStatus, KeyStore, KeyStoreConfig, StorageError};

fn test_config() -> KeyStoreConfig {
    KeyStoreConfig::new("test-operator-passphrase")
}

fn open_store() -> KeyStore {
    KeyStore::open_in_memory(test_config()).unwrap()
}

// ── Generation ───────────────────────────────────────────────────

#[test]
fn generate_returns_material_of_requested_length() {
    let store = open_store();
    let record = store
        .generate("alice@example.com", None, "email-otp", Some(128))
        .unwrap();

    assert_eq!(record.key_material.len(), 128);
    assert_eq!(record.key_length, 128);
    assert_eq!(record.holder_id, "alice@example.com");
    assert_eq!(record.status, KeyStatus::Unused);
    assert!(record.active);
    assert_eq!(record.usage_count, 0);
    assert!(record.expires_at.is_some());
}

#[test]
fn generate_defaults_length_from_config() {
    let store = open_store();
    let record = store.generate("alice", None, "email-otp", None).unwrap();
    assert_eq!(record.key_material.len(), 256);
}

#[test]
fn generate_rejects_out_of_range_lengths() {
    let store = open_store();
    assert!(matches!(
        store.generate("alice", None, "email-otp", Some(8)),
        Err(StorageError::Validation(_))
    ));
    assert!(matches!(
        store.generate("alice", None, "email-otp", Some(10_000)),
        Err(StorageError::Validation(_))
    ));
}

#[test]
fn generate_rejects_empty_holder() {
    let store = open_store();
    assert!(matches!(
        store.generate("", None, "email-otp", None),
        Err(StorageError::Validation(_))
    ));
}

#[test]
fn generated_ids_are_unique() {
    let store = open_store();
    let a = store.generate("alice", None, "email-otp", None).unwrap();
    let b = store.generate("alice", None, "email-otp", None).unwrap();
    assert_ne!(a.key_id, b.key_id);
    assert_ne!(a.key_material, b.key_material);
}

#[test]
fn generation_report_is_persisted() {
    let store = open_store();
    let record = store.generate("alice", None, "email-otp", Some(1024)).unwrap();

    let report = store.generation_report(&record.key_id).unwrap().unwrap();
    assert_eq!(report.key_length, 1024);
    assert!(report.error_rate > 0.0);
    assert!(report.randomness.is_some());

    assert!(store.generation_report("no-such-key").unwrap().is_none());
}

// ── Fetch ────────────────────────────────────────────────────────

#[test]
fn fetch_returns_material_and_increments_usage() {
    let store = open_store();
    let generated = store.generate("alice", None, "email-otp", None).unwrap();

    let first = store.fetch(&generated.key_id, "alice").unwrap().found().unwrap();
    assert_eq!(first.key_material, generated.key_material);
    assert_eq!(first.usage_count, 1);

    let second = store.fetch(&generated.key_id, "alice").unwrap().found().unwrap();
    assert_eq!(second.usage_count, 2);
}

#[test]
fn fetch_unknown_key_is_not_found() {
    let store = open_store();
    assert!(matches!(
        store.fetch("no-such-key", "alice").unwrap(),
        FetchOutcome::NotFound
    ));
}

#[test]
fn fetch_is_scoped_to_holder() {
    let store = open_store();
    let record = store.generate("alice", None, "email-otp", None).unwrap();

    // Bob has no copy of Alice's key
    assert!(matches!(
        store.fetch(&record.key_id, "bob").unwrap(),
        FetchOutcome::NotFound
    ));
}

#[test]
fn fetch_still_works_after_mark_used() {
    // A used key must stay fetchable: old mail still needs decrypting.
    let store = open_store();
    let record = store.generate("alice", None, "email-otp", None).unwrap();

    assert!(store.mark_used(&record.key_id, "alice", "alice").unwrap());
    let fetched = store.fetch(&record.key_id, "alice").unwrap().found().unwrap();
    assert_eq!(fetched.status, KeyStatus::Used);
    assert_eq!(fetched.key_material, record.key_material);
}

#[test]
fn expired_key_is_reported_expired_and_retired() {
    let mut config = test_config();
    config.ttl = Duration::seconds(-1); // everything generated is born expired
    let store = KeyStore::open_in_memory(config).unwrap();

    let record = store.generate("alice", None, "email-otp", None).unwrap();
    assert!(matches!(
        store.fetch(&record.key_id, "alice").unwrap(),
        FetchOutcome::Expired
    ));

    // Expiry is sticky: the flipped row keeps reporting Expired
    assert!(matches!(
        store.fetch(&record.key_id, "alice").unwrap(),
        FetchOutcome::Expired
    ));

    let listed = store.list_keys("alice", true, None).unwrap();
    assert_eq!(listed.len(), 1);
    assert!(!listed[0].active);
    assert_eq!(listed[0].status, KeyStatus::Expired);
}

#[test]
fn soft_deleted_key_reads_as_not_found() {
    let store = open_store();
    let record = store.generate("alice", None, "email-otp", None).unwrap();

    assert!(store.delete(&record.key_id, "alice").unwrap());
    assert!(matches!(
        store.fetch(&record.key_id, "alice").unwrap(),
        FetchOutcome::NotFound
    ));

    // Second delete is a no-op
    assert!(!store.delete(&record.key_id, "alice").unwrap());
}

// ── Sharing ──────────────────────────────────────────────────────

#[test]
fn share_copies_material_to_recipient() {
    let store = open_store();
    let record = store
        .generate("alice", Some("bob"), "email-otp", None)
        .unwrap();

    assert!(store.share(&record.key_id, "alice", "bob").unwrap());

    let bobs = store.fetch(&record.key_id, "bob").unwrap().found().unwrap();
    assert_eq!(bobs.key_material, record.key_material);
    assert_eq!(bobs.fingerprint, record.fingerprint);
    assert_eq!(bobs.counterpart_id.as_deref(), Some("alice"));
    assert_eq!(bobs.status, KeyStatus::Unused);
    assert_eq!(bobs.usage_count, 1); // bob's own fetch, not alice's
}

#[test]
fn shared_short_key_round_trips_a_message() {
    // 32-byte key for a short note between two parties
    let mut config = test_config();
    config.min_key_length = 32;
    let store = KeyStore::open_in_memory(config).unwrap();

    let record = store
        .generate("alice", Some("bob"), "email-otp", Some(32))
        .unwrap();
    let ciphertext = qumail_crypto::otp_encrypt(b"hello", &record.key_material).unwrap();

    assert!(store.share(&record.key_id, "alice", "bob").unwrap());
    let bobs = store.fetch(&record.key_id, "bob").unwrap().found().unwrap();
    assert_eq!(
        qumail_crypto::otp_decrypt(&ciphertext, &bobs.key_material).unwrap(),
        b"hello"
    );
}

#[test]
fn share_is_idempotent() {
    let store = open_store();
    let record = store.generate("alice", None, "email-otp", None).unwrap();

    assert!(store.share(&record.key_id, "alice", "bob").unwrap());
    assert!(store.share(&record.key_id, "alice", "bob").unwrap());

    let stats = store.statistics().unwrap();
    assert_eq!(stats.total_keys, 2); // alice's row + exactly one for bob
}

#[test]
fn share_of_missing_or_deleted_key_fails_softly() {
    let store = open_store();
    assert!(!store.share("no-such-key", "alice", "bob").unwrap());

    let record = store.generate("alice", None, "email-otp", None).unwrap();
    store.delete(&record.key_id, "alice").unwrap();
    assert!(!store.share(&record.key_id, "alice", "bob").unwrap());
}

#[test]
fn share_of_expired_key_fails_softly() {
    let mut config = test_config();
    config.ttl = Duration::seconds(-1);
    let store = KeyStore::open_in_memory(config).unwrap();

    let record = store.generate("alice", None, "email-otp", None).unwrap();
    assert!(!store.share(&record.key_id, "alice", "bob").unwrap());
}

#[test]
fn holder_copies_have_independent_state() {
    let store = open_store();
    let record = store.generate("alice", None, "email-otp", None).unwrap();
    store.share(&record.key_id, "alice", "bob").unwrap();

    // Alice retires and deletes her copy; bob's is untouched
    store.mark_used(&record.key_id, "alice", "alice").unwrap();
    store.delete(&record.key_id, "alice").unwrap();

    let bobs = store.fetch(&record.key_id, "bob").unwrap().found().unwrap();
    assert_eq!(bobs.status, KeyStatus::Unused);
    assert!(bobs.active);
}

#[test]
fn concurrent_shares_leave_one_row() {
    let store = open_store();
    let record = store.generate("alice", None, "email-otp", None).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            let key_id = record.key_id.clone();
            std::thread::spawn(move || store.share(&key_id, "alice", "bob").unwrap())
        })
        .collect();
    for handle in handles {
        assert!(handle.join().unwrap());
    }

    assert_eq!(store.statistics().unwrap().total_keys, 2);
}

// ── Retirement ───────────────────────────────────────────────────

#[test]
fn mark_used_is_terminal() {
    let store = open_store();
    let record = store.generate("alice", None, "email-otp", None).unwrap();

    assert!(store.mark_used(&record.key_id, "alice", "bob").unwrap());
    // Already used: the transition is taken at most once
    assert!(!store.mark_used(&record.key_id, "alice", "carol").unwrap());
    assert!(!store.mark_used("no-such-key", "alice", "bob").unwrap());
}

#[test]
fn sweep_expired_retires_only_past_ttl_rows() {
    let mut config = test_config();
    config.ttl = Duration::seconds(-1);
    let expired_store = KeyStore::open_in_memory(config).unwrap();
    expired_store.generate("alice", None, "email-otp", None).unwrap();
    expired_store.generate("bob", None, "email-otp", None).unwrap();
    assert_eq!(expired_store.sweep_expired().unwrap(), 2);
    assert_eq!(expired_store.sweep_expired().unwrap(), 0);

    let fresh_store = open_store();
    fresh_store.generate("alice", None, "email-otp", None).unwrap();
    assert_eq!(fresh_store.sweep_expired().unwrap(), 0);
}

// ── Listing, fingerprints, statistics ────────────────────────────

#[test]
fn list_keys_is_newest_first_and_respects_limit() {
    let store = open_store();
    for _ in 0..3 {
        store.generate("alice", None, "email-otp", None).unwrap();
        // created_at has millisecond resolution; keep orderings distinct
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    store.generate("bob", None, "email-otp", None).unwrap();

    let all = store.list_keys("alice", false, None).unwrap();
    assert_eq!(all.len(), 3);
    assert!(all.windows(2).all(|w| w[0].created_at >= w[1].created_at));

    let limited = store.list_keys("alice", false, Some(2)).unwrap();
    assert_eq!(limited.len(), 2);
    assert_eq!(limited[0].key_id, all[0].key_id);
}

#[test]
fn list_keys_hides_inactive_unless_asked() {
    let store = open_store();
    let record = store.generate("alice", None, "email-otp", None).unwrap();
    store.delete(&record.key_id, "alice").unwrap();

    assert!(store.list_keys("alice", false, None).unwrap().is_empty());
    assert_eq!(store.list_keys("alice", true, None).unwrap().len(), 1);
}

#[test]
fn fingerprint_matches_across_holders() {
    let store = open_store();
    let record = store.generate("alice", None, "email-otp", None).unwrap();
    store.share(&record.key_id, "alice", "bob").unwrap();

    let alice_fp = store.fingerprint(&record.key_id, "alice").unwrap().unwrap();
    let bob_fp = store.fingerprint(&record.key_id, "bob").unwrap().unwrap();
    assert_eq!(alice_fp, bob_fp);
    assert_eq!(alice_fp, record.fingerprint);
    assert_eq!(alice_fp.len(), 64); // SHA-256 hex

    assert!(store.fingerprint("no-such-key", "alice").unwrap().is_none());
}

#[test]
fn statistics_count_by_status() {
    let store = open_store();
    let a = store.generate("alice", None, "email-otp", None).unwrap();
    store.generate("alice", None, "email-otp", None).unwrap();
    store.generate("bob", None, "email-otp", None).unwrap();
    store.mark_used(&a.key_id, "alice", "bob").unwrap();

    let stats = store.statistics().unwrap();
    assert_eq!(stats.total_keys, 3);
    assert_eq!(stats.unused_keys, 2);
    assert_eq!(stats.used_keys, 1);
    assert_eq!(stats.expired_keys, 0);
    assert_eq!(stats.distinct_holders, 2);
}

// ── Content and stamp refs ───────────────────────────────────────

#[test]
fn content_and_stamp_refs_are_recorded() {
    let store = open_store();
    let record = store.generate("alice", None, "email-otp", None).unwrap();

    assert!(store.record_content_ref(&record.key_id, "blob://abc123").unwrap());
    assert!(store.record_stamp_ref(&record.key_id, "stamp://def456").unwrap());
    assert_eq!(
        store.content_refs(&record.key_id).unwrap(),
        vec!["blob://abc123".to_string()]
    );

    // Unknown key: nothing to attach to
    assert!(!store.record_content_ref("no-such-key", "blob://x").unwrap());
    assert!(!store.record_stamp_ref("no-such-key", "stamp://x").unwrap());
}

#[test]
fn refused_content_ref_leaves_no_link_row() {
    let store = open_store();

    assert!(!store.record_content_ref("no-such-key", "blob://orphan").unwrap());
    // The refusal must be total: no outbound_refs row for the unknown key
    assert!(store.content_refs("no-such-key").unwrap().is_empty());
}

// ── Persistence and at-rest encryption ───────────────────────────

#[test]
fn store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keys.db");

    let record = {
        let store = KeyStore::open(&path, test_config()).unwrap();
        store.generate("alice", None, "email-otp", None).unwrap()
    };

    let store = KeyStore::open(&path, test_config()).unwrap();
    let fetched = store.fetch(&record.key_id, "alice").unwrap().found().unwrap();
    assert_eq!(fetched.key_material, record.key_material);
}

#[test]
fn wrong_passphrase_is_rejected_at_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keys.db");

    KeyStore::open(&path, test_config()).unwrap();

    let result = KeyStore::open(&path, KeyStoreConfig::new("wrong-passphrase"));
    assert!(matches!(result, Err(StorageError::InvalidPassphrase)));
}

#[test]
fn invalid_config_is_rejected_at_open() {
    let mut config = test_config();
    config.default_key_length = 10_000; // above max
    assert!(matches!(
        KeyStore::open_in_memory(config),
        Err(StorageError::Validation(_))
    ));

    assert!(matches!(
        KeyStore::open_in_memory(KeyStoreConfig::new("")),
        Err(StorageError::Validation(_))
    ));
}
