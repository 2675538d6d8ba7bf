#![allow(dead_code)]

use kleo_keyresolver::kleo_keycache::{
    Capabilities, GroupSource, Key, KeyGroup, KeyIndex, Protocol, UnixTimestamp, Validity,
};
use kleo_keyresolver::{ReviewDecision, ReviewRequest, Reviewer, ResolutionOutcome, Solution};

pub const ALICE_PGP_FP: &str = "A1A1A1A1A1A1A1A1A1A1A1A1A1A1A1A1A1A1A1A1";
pub const ALICE_CMS_FP: &str = "A2A2A2A2A2A2A2A2A2A2A2A2A2A2A2A2A2A2A2A2";
pub const BOB_PGP_FP: &str = "B1B1B1B1B1B1B1B1B1B1B1B1B1B1B1B1B1B1B1B1";
pub const CAROL_PGP_FP: &str = "C1C1C1C1C1C1C1C1C1C1C1C1C1C1C1C1C1C1C1C1";
pub const CAROL_CMS_FP: &str = "C2C2C2C2C2C2C2C2C2C2C2C2C2C2C2C2C2C2C2C2";
pub const DAVE_PGP_FP: &str = "D1D1D1D1D1D1D1D1D1D1D1D1D1D1D1D1D1D1D1D1";
pub const DAVE_CMS_FP: &str = "D2D2D2D2D2D2D2D2D2D2D2D2D2D2D2D2D2D2D2D2";
pub const DAVE_CMS_OLD_FP: &str = "D3D3D3D3D3D3D3D3D3D3D3D3D3D3D3D3D3D3D3D3";
pub const FRANK_PGP_FP: &str = "F1F1F1F1F1F1F1F1F1F1F1F1F1F1F1F1F1F1F1F1";
pub const GINA_CMS_FP: &str = "E2E2E2E2E2E2E2E2E2E2E2E2E2E2E2E2E2E2E2E2";
pub const NOSECRET_PGP_FP: &str = "9191919191919191919191919191919191919191";
pub const EXPIRED_PGP_FP: &str = "8181818181818181818181818181818181818181";

pub fn alice_pgp() -> Key {
    Key::builder(Protocol::OpenPGP, ALICE_PGP_FP)
        .email("Alice", "alice@example.com", Validity::Ultimate)
        .capabilities(Capabilities::SIGN | Capabilities::CERTIFY)
        .capabilities(Capabilities::ENCRYPT)
        .has_secret(true)
        .build()
}

pub fn alice_cms() -> Key {
    Key::builder(Protocol::CMS, ALICE_CMS_FP)
        .email("", "alice@example.com", Validity::Full)
        .capabilities(Capabilities::SIGN | Capabilities::ENCRYPT)
        .has_secret(true)
        .issuer_name("CN=Example CA")
        .build()
}

pub fn bob_pgp() -> Key {
    Key::builder(Protocol::OpenPGP, BOB_PGP_FP)
        .email("Bob", "Bob <bob@example.com>", Validity::Full)
        .capabilities(Capabilities::ENCRYPT)
        .build()
}

pub fn carol_pgp() -> Key {
    Key::builder(Protocol::OpenPGP, CAROL_PGP_FP)
        .email("Carol", "carol@example.com", Validity::Full)
        .capabilities(Capabilities::ENCRYPT)
        .build()
}

pub fn carol_cms() -> Key {
    Key::builder(Protocol::CMS, CAROL_CMS_FP)
        .email("Carol", "carol@example.com", Validity::Full)
        .capabilities(Capabilities::ENCRYPT)
        .build()
}

pub fn dave_pgp() -> Key {
    Key::builder(Protocol::OpenPGP, DAVE_PGP_FP)
        .email("Dave", "dave@example.com", Validity::Full)
        .capabilities(Capabilities::ENCRYPT)
        .build()
}

pub fn dave_cms() -> Key {
    Key::builder(Protocol::CMS, DAVE_CMS_FP)
        .email("Dave", "dave@example.com", Validity::Full)
        .capabilities(Capabilities::ENCRYPT)
        .creation_time(UnixTimestamp::new(1_700_000_000))
        .build()
}

pub fn dave_cms_old() -> Key {
    Key::builder(Protocol::CMS, DAVE_CMS_OLD_FP)
        .email("Dave", "dave@example.com", Validity::Full)
        .capabilities(Capabilities::ENCRYPT)
        .creation_time(UnixTimestamp::new(1_500_000_000))
        .build()
}

/// Only user id is not trusted.
pub fn frank_pgp() -> Key {
    Key::builder(Protocol::OpenPGP, FRANK_PGP_FP)
        .email("Frank", "frank@example.com", Validity::Never)
        .capabilities(Capabilities::ENCRYPT)
        .build()
}

pub fn gina_cms() -> Key {
    Key::builder(Protocol::CMS, GINA_CMS_FP)
        .email("Gina", "gina@example.com", Validity::Full)
        .capabilities(Capabilities::ENCRYPT)
        .build()
}

/// Can sign, but the secret key is missing.
pub fn nosecret_pgp() -> Key {
    Key::builder(Protocol::OpenPGP, NOSECRET_PGP_FP)
        .email("Nobody", "nosecret@example.com", Validity::Ultimate)
        .capabilities(Capabilities::SIGN | Capabilities::ENCRYPT)
        .build()
}

pub fn expired_pgp() -> Key {
    Key::builder(Protocol::OpenPGP, EXPIRED_PGP_FP)
        .email("Old", "old@example.com", Validity::Full)
        .capabilities(Capabilities::ENCRYPT)
        .expired(true)
        .build()
}

pub fn all_keys() -> Vec<Key> {
    vec![
        alice_pgp(),
        alice_cms(),
        bob_pgp(),
        carol_pgp(),
        carol_cms(),
        dave_pgp(),
        dave_cms(),
        dave_cms_old(),
        frank_pgp(),
        gina_cms(),
        nosecret_pgp(),
        expired_pgp(),
    ]
}

pub fn all_groups() -> Vec<KeyGroup> {
    vec![
        KeyGroup::new(
            "team@example.com",
            vec![bob_pgp(), carol_pgp(), expired_pgp()],
            GroupSource::ApplicationConfig,
        ),
        KeyGroup::new(
            "devs@example.com",
            vec![carol_pgp(), bob_pgp()],
            GroupSource::GnuPGConfig,
        ),
        KeyGroup::new(
            "signers@example.com",
            vec![alice_pgp(), nosecret_pgp()],
            GroupSource::ApplicationConfig,
        ),
        KeyGroup::new(
            "owners@example.com",
            vec![alice_pgp()],
            GroupSource::ApplicationConfig,
        ),
    ]
}

pub fn test_store() -> KeyIndex {
    KeyIndex::build(all_keys(), all_groups())
}

pub fn fingerprints(keys: &[Key]) -> Vec<String> {
    keys.iter()
        .map(|key| key.fingerprint().to_string())
        .collect()
}

pub fn fpr(value: &str) -> String {
    value.to_lowercase()
}

/// What a reviewer was shown.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub outcome: ResolutionOutcome,
    pub solution: Solution,
    pub alternative: Solution,
    pub sender: Option<String>,
    pub forced: bool,
}

/// Records requests and answers with a fixed decision.
///
/// `None` accepts the proposed solution.
pub struct RecordingReviewer {
    pub decision: Option<ReviewDecision>,
    pub seen: Vec<SeenRequest>,
}

impl RecordingReviewer {
    pub fn accepting() -> Self {
        Self {
            decision: None,
            seen: Vec::new(),
        }
    }

    pub fn answering(decision: ReviewDecision) -> Self {
        Self {
            decision: Some(decision),
            seen: Vec::new(),
        }
    }
}

impl Reviewer for RecordingReviewer {
    fn review(&mut self, request: &ReviewRequest<'_>) -> ReviewDecision {
        self.seen.push(SeenRequest {
            outcome: request.outcome.clone(),
            solution: request.solution.clone(),
            alternative: request.alternative.clone(),
            sender: request.sender.map(str::to_owned),
            forced: request.forced,
        });
        self.decision
            .clone()
            .unwrap_or_else(|| ReviewDecision::Accept(request.solution.clone()))
    }
}
