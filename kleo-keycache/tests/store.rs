use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use kleo_keycache::compliance::{CompliancePolicy, DeVsCompliance, NoCompliance};
use kleo_keycache::errors::KeyCacheError;
use kleo_keycache::format::{
    compare_keys_for_display, name_and_email_for_summary_line, short_fingerprint,
};
use kleo_keycache::{
    Capabilities, CertificateStore, GroupSource, Key, KeyCache, KeyGroup, KeySource, KeyUsage,
    Protocol, Subkey, UnixTimestamp, Validity,
};

const ALICE_PGP_FP: &str = "A1A1A1A1A1A1A1A1A1A1A1A1A1A1A1A1A1A1A1A1";
const ALICE_PGP_OLD_FP: &str = "A0A0A0A0A0A0A0A0A0A0A0A0A0A0A0A0A0A0A0A0";
const ALICE_CMS_FP: &str = "C1C1C1C1C1C1C1C1C1C1C1C1C1C1C1C1C1C1C1C1";
const BOB_PGP_FP: &str = "B1B1B1B1B1B1B1B1B1B1B1B1B1B1B1B1B1B1B1B1";

fn alice_pgp() -> Key {
    Key::builder(Protocol::OpenPGP, ALICE_PGP_FP)
        .email("Alice", "Alice <alice@example.com>", Validity::Ultimate)
        .capabilities(Capabilities::SIGN | Capabilities::CERTIFY)
        .capabilities(Capabilities::ENCRYPT)
        .has_secret(true)
        .creation_time(UnixTimestamp::new(1_700_000_000))
        .build()
}

fn alice_pgp_old() -> Key {
    Key::builder(Protocol::OpenPGP, ALICE_PGP_OLD_FP)
        .email("Alice", "alice@example.com", Validity::Ultimate)
        .capabilities(Capabilities::SIGN | Capabilities::ENCRYPT)
        .has_secret(true)
        .creation_time(UnixTimestamp::new(1_600_000_000))
        .build()
}

fn alice_cms() -> Key {
    Key::builder(Protocol::CMS, ALICE_CMS_FP)
        .email("", "alice@example.com", Validity::Full)
        .capabilities(Capabilities::SIGN | Capabilities::ENCRYPT)
        .has_secret(true)
        .issuer_name("CN=Example CA")
        .build()
}

fn bob_pgp() -> Key {
    Key::builder(Protocol::OpenPGP, BOB_PGP_FP)
        .email("Bob", "bob@example.com", Validity::Marginal)
        .capabilities(Capabilities::ENCRYPT)
        .build()
}

fn test_cache() -> KeyCache {
    let team = KeyGroup::new(
        "team@example.com",
        vec![alice_pgp(), bob_pgp()],
        GroupSource::ApplicationConfig,
    );
    KeyCache::from_keys(
        vec![alice_pgp(), alice_pgp_old(), alice_cms(), bob_pgp()],
        vec![team],
    )
}

#[test]
fn test_find_by_fingerprint_and_key_id() {
    let cache = test_cache();
    let by_fpr = cache
        .find_by_key_id_or_fingerprint(&ALICE_PGP_FP.to_lowercase())
        .unwrap();
    assert_eq!(by_fpr.fingerprint().as_str(), ALICE_PGP_FP.to_lowercase());

    let by_key_id = cache
        .find_by_key_id_or_fingerprint("0xA1A1A1A1A1A1A1A1")
        .unwrap();
    assert_eq!(by_key_id, by_fpr);

    assert!(cache.find_by_key_id_or_fingerprint("nothex").is_none());
    assert!(cache
        .find_by_key_id_or_fingerprint("FFFFFFFFFFFFFFFF")
        .is_none());
}

#[test]
fn test_find_by_subkey_fingerprint() {
    let cache = test_cache();
    let alice = alice_pgp();
    let subkey_fpr = alice.subkeys()[1].fingerprint.to_string();
    let found = cache.find_by_key_id_or_fingerprint(&subkey_fpr).unwrap();
    assert_eq!(found, alice);
}

#[test]
fn test_best_by_mailbox_prefers_newest_key() {
    let cache = test_cache();
    let best = cache
        .find_best_by_mailbox("ALICE@example.com", Protocol::OpenPGP, KeyUsage::Encrypt)
        .unwrap();
    assert_eq!(best, alice_pgp());
}

#[test]
fn test_best_by_mailbox_prefers_higher_validity() {
    let weak_new = Key::builder(Protocol::OpenPGP, "D1D1D1D1D1D1D1D1D1D1D1D1D1D1D1D1D1D1D1D1")
        .email("Dave", "dave@example.com", Validity::Marginal)
        .capabilities(Capabilities::ENCRYPT)
        .creation_time(UnixTimestamp::new(1_700_000_000))
        .build();
    let strong_old = Key::builder(Protocol::OpenPGP, "D2D2D2D2D2D2D2D2D2D2D2D2D2D2D2D2D2D2D2D2")
        .email("Dave", "dave@example.com", Validity::Full)
        .capabilities(Capabilities::ENCRYPT)
        .creation_time(UnixTimestamp::new(1_600_000_000))
        .build();
    let cache = KeyCache::from_keys(vec![weak_new, strong_old.clone()], Vec::new());
    let best = cache
        .find_best_by_mailbox("dave@example.com", Protocol::Unknown, KeyUsage::Encrypt)
        .unwrap();
    assert_eq!(best, strong_old);
}

#[test]
fn test_best_by_mailbox_filters_protocol_usage_and_secret() {
    let cache = test_cache();
    let cms = cache
        .find_best_by_mailbox("alice@example.com", Protocol::CMS, KeyUsage::Sign)
        .unwrap();
    assert_eq!(cms.protocol(), Protocol::CMS);

    // Bob has no secret key and no signing capability.
    assert!(cache
        .find_best_by_mailbox("bob@example.com", Protocol::OpenPGP, KeyUsage::Sign)
        .is_none());
    assert!(cache
        .find_best_by_mailbox("bob@example.com", Protocol::CMS, KeyUsage::Encrypt)
        .is_none());
    assert!(cache
        .find_best_by_mailbox("not an address", Protocol::OpenPGP, KeyUsage::Encrypt)
        .is_none());
}

#[test]
fn test_best_by_mailbox_skips_bad_keys() {
    let revoked = Key::builder(Protocol::OpenPGP, "E1E1E1E1E1E1E1E1E1E1E1E1E1E1E1E1E1E1E1E1")
        .email("Eve", "eve@example.com", Validity::Full)
        .capabilities(Capabilities::ENCRYPT)
        .revoked(true)
        .build();
    let cache = KeyCache::from_keys(vec![revoked], Vec::new());
    assert!(cache
        .find_best_by_mailbox("eve@example.com", Protocol::OpenPGP, KeyUsage::Encrypt)
        .is_none());
}

#[test]
fn test_find_group_filters() {
    let cache = test_cache();
    let group = cache
        .find_group("team@example.com", Protocol::OpenPGP, KeyUsage::Encrypt)
        .unwrap();
    assert_eq!(group.keys.len(), 2);
    assert_eq!(group.protocol(), Protocol::OpenPGP);
    assert!(cache
        .find_group("team@example.com", Protocol::CMS, KeyUsage::Encrypt)
        .is_none());
    // Bob's key cannot sign.
    assert!(cache
        .find_group("team@example.com", Protocol::Unknown, KeyUsage::Sign)
        .is_none());
    assert!(cache
        .find_group("other@example.com", Protocol::Unknown, KeyUsage::AnyUsage)
        .is_none());
}

struct CountingSource {
    calls: Arc<AtomicUsize>,
    keys: Vec<Key>,
}

impl KeySource for CountingSource {
    fn list_keys(&self) -> Result<Vec<Key>, KeyCacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.keys.clone())
    }

    fn list_groups(&self) -> Result<Vec<KeyGroup>, KeyCacheError> {
        Ok(Vec::new())
    }
}

#[test]
fn test_cache_loads_lazily_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cache = KeyCache::new(CountingSource {
        calls: Arc::clone(&calls),
        keys: vec![bob_pgp()],
    });
    assert!(!cache.is_initialized());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    assert!(cache
        .find_best_by_mailbox("bob@example.com", Protocol::OpenPGP, KeyUsage::Encrypt)
        .is_some());
    assert!(cache.find_by_key_id_or_fingerprint(BOB_PGP_FP).is_some());
    assert!(cache.is_initialized());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    cache.invalidate();
    assert!(!cache.is_initialized());
    let _ = cache.snapshot();
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    cache.refresh().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

struct FailingSource;

impl KeySource for FailingSource {
    fn list_keys(&self) -> Result<Vec<Key>, KeyCacheError> {
        Err(KeyCacheError::ListKeys("gpg not found".into()))
    }

    fn list_groups(&self) -> Result<Vec<KeyGroup>, KeyCacheError> {
        Ok(Vec::new())
    }
}

#[test]
fn test_cache_load_failure_degrades_to_empty() {
    let cache = KeyCache::new(FailingSource);
    assert!(cache.find_by_key_id_or_fingerprint(BOB_PGP_FP).is_none());
    assert!(cache.is_initialized());
    assert!(matches!(cache.refresh(), Err(KeyCacheError::ListKeys(_))));
}

#[test]
fn test_duplicate_keys_are_merged() {
    let bob_with_secret = Key::builder(Protocol::OpenPGP, BOB_PGP_FP)
        .email("Bob", "bob@example.com", Validity::Marginal)
        .capabilities(Capabilities::ENCRYPT)
        .has_secret(true)
        .build();
    let cache = KeyCache::from_keys(
        vec![bob_pgp(), bob_with_secret, bob_pgp(), alice_cms()],
        Vec::new(),
    );

    cache.refresh().unwrap();

    assert_eq!(cache.snapshot().keys().len(), 2);
    let bob = cache
        .find_best_by_mailbox("bob@example.com", Protocol::OpenPGP, KeyUsage::Encrypt)
        .unwrap();
    assert!(bob.has_secret());
    assert_eq!(
        cache
            .find_best_by_mailbox("alice@example.com", Protocol::CMS, KeyUsage::Encrypt)
            .unwrap()
            .fingerprint()
            .as_str(),
        ALICE_CMS_FP.to_lowercase()
    );
}

#[test]
fn test_keys_with_malformed_fingerprints_are_skipped() {
    let broken = Key::builder(Protocol::OpenPGP, "éééééééééa")
        .email("Mallory", "mallory@example.com", Validity::Full)
        .capabilities(Capabilities::ENCRYPT)
        .build();
    let with_broken_subkey = Key::builder(Protocol::OpenPGP, BOB_PGP_FP)
        .email("Bob", "bob@example.com", Validity::Marginal)
        .capabilities(Capabilities::ENCRYPT)
        .subkey(Subkey::new("ééééééééééééééééééa", Capabilities::ENCRYPT))
        .build();
    let cache = KeyCache::from_keys(vec![broken, with_broken_subkey], Vec::new());

    assert!(cache.find_by_key_id_or_fingerprint("abcd").is_none());
    assert!(cache.find_by_key_id_or_fingerprint("éééééééééa").is_none());
    assert!(cache
        .find_best_by_mailbox("mallory@example.com", Protocol::Unknown, KeyUsage::Encrypt)
        .is_none());
    assert!(cache
        .find_best_by_mailbox("bob@example.com", Protocol::OpenPGP, KeyUsage::Encrypt)
        .is_some());
    assert!(cache.find_by_key_id_or_fingerprint(BOB_PGP_FP).is_some());
    assert_eq!(cache.snapshot().keys().len(), 1);
}

#[test]
fn test_short_fingerprint_of_non_ascii_fingerprint() {
    let key = Key::builder(Protocol::OpenPGP, "éééééééééa").build();
    assert_eq!(short_fingerprint(&key), "éééé éééa");
    assert_eq!(short_fingerprint(&bob_pgp()), "b1b1 b1b1");
}

#[test]
fn test_snapshot_is_stable_across_refresh() {
    let cache = test_cache();
    let snapshot = cache.snapshot();
    cache.invalidate();
    assert_eq!(snapshot.keys().len(), 4);
    assert!(snapshot
        .find_best_by_mailbox("bob@example.com", Protocol::OpenPGP, KeyUsage::Encrypt)
        .is_some());
}

#[test]
fn test_de_vs_compliance() {
    let compliant = Key::builder(Protocol::OpenPGP, "F1F1F1F1F1F1F1F1F1F1F1F1F1F1F1F1F1F1F1F1")
        .email("Frank", "frank@example.com", Validity::Full)
        .capabilities(Capabilities::ENCRYPT)
        .de_vs(true)
        .build();
    assert!(DeVsCompliance.is_active());
    assert!(DeVsCompliance.is_compliant(&compliant));
    assert!(!DeVsCompliance.is_compliant(&bob_pgp()));
    assert!(!NoCompliance.is_active());
    assert!(NoCompliance.is_compliant(&bob_pgp()));
}

#[test]
fn test_display_ordering() {
    assert_eq!(
        name_and_email_for_summary_line(&bob_pgp()),
        "Bob <bob@example.com> (b1b1 b1b1)"
    );
    let mut keys = vec![bob_pgp(), alice_cms(), alice_pgp()];
    keys.sort_by(compare_keys_for_display);
    assert_eq!(keys[0], alice_pgp());
    assert_eq!(keys[1], alice_cms());
    assert_eq!(keys[2], bob_pgp());
}

#[test]
fn test_validity_serializes_as_integer() {
    let json = serde_json::to_string(&Validity::Marginal).unwrap();
    assert_eq!(json, "3");
    let validity: Validity = serde_json::from_str("5").unwrap();
    assert_eq!(validity, Validity::Ultimate);
    assert_eq!(Validity::try_from(4_u8).unwrap(), Validity::Full);
    assert!(Validity::try_from(9_u8).is_err());
}
