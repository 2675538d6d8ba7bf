use kleo_keycache::{Key, UnixTimestamp};
use serde::{Deserialize, Serialize};

use crate::resolver::Solution;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;
const DEFAULT_THRESHOLD_DAYS: u32 = 14;

/// Warning thresholds in days before a certificate expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExpiryCheckerSettings {
    #[serde(default = "default_threshold")]
    own_key_threshold_days: u32,
    #[serde(default = "default_threshold")]
    other_key_threshold_days: u32,
    #[serde(default = "default_threshold")]
    root_cert_threshold_days: u32,
    #[serde(default = "default_threshold")]
    chain_cert_threshold_days: u32,
}

fn default_threshold() -> u32 {
    DEFAULT_THRESHOLD_DAYS
}

impl Default for ExpiryCheckerSettings {
    fn default() -> Self {
        Self::new(
            DEFAULT_THRESHOLD_DAYS,
            DEFAULT_THRESHOLD_DAYS,
            DEFAULT_THRESHOLD_DAYS,
            DEFAULT_THRESHOLD_DAYS,
        )
    }
}

impl ExpiryCheckerSettings {
    pub fn new(own_key: u32, other_key: u32, root_cert: u32, chain_cert: u32) -> Self {
        Self {
            own_key_threshold_days: own_key,
            other_key_threshold_days: other_key,
            root_cert_threshold_days: root_cert,
            chain_cert_threshold_days: chain_cert,
        }
    }

    pub fn own_key_threshold_days(&self) -> u32 {
        self.own_key_threshold_days
    }

    pub fn other_key_threshold_days(&self) -> u32 {
        self.other_key_threshold_days
    }

    pub fn root_cert_threshold_days(&self) -> u32 {
        self.root_cert_threshold_days
    }

    pub fn chain_cert_threshold_days(&self) -> u32 {
        self.chain_cert_threshold_days
    }

    /// The threshold that applies to a certificate in the given role.
    pub fn threshold_days(&self, role: KeyRole) -> u32 {
        match role {
            KeyRole::OwnKey => self.own_key_threshold_days,
            KeyRole::OtherKey => self.other_key_threshold_days,
            KeyRole::RootCertificate => self.root_cert_threshold_days,
            KeyRole::ChainCertificate => self.chain_cert_threshold_days,
        }
    }
}

/// How a certificate is involved in the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyRole {
    OwnKey,
    OtherKey,
    RootCertificate,
    ChainCertificate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExpirationStatus {
    DoesNotExpire,
    Valid,
    ExpiresSoon { days_left: u64 },
    Expired,
}

impl ExpirationStatus {
    /// Indicates if the user should be told about it.
    pub fn needs_attention(&self) -> bool {
        matches!(
            self,
            ExpirationStatus::ExpiresSoon { .. } | ExpirationStatus::Expired
        )
    }
}

/// A certificate of a solution that expires soon or has expired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryNotice {
    pub key: Key,
    pub role: KeyRole,
    pub status: ExpirationStatus,
}

/// Checks certificates against the expiry thresholds.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpiryChecker {
    settings: ExpiryCheckerSettings,
}

impl ExpiryChecker {
    pub fn new(settings: ExpiryCheckerSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ExpiryCheckerSettings {
        &self.settings
    }

    pub fn check_key(&self, key: &Key, role: KeyRole, now: UnixTimestamp) -> ExpirationStatus {
        if key.is_expired() {
            return ExpirationStatus::Expired;
        }
        let expiration = key.expiration_time();
        if expiration.is_zero() {
            return ExpirationStatus::DoesNotExpire;
        }
        if expiration.value() <= now.value() {
            return ExpirationStatus::Expired;
        }
        let seconds_left = expiration.value() - now.value();
        let threshold = u64::from(self.settings.threshold_days(role)) * SECONDS_PER_DAY;
        if seconds_left <= threshold {
            ExpirationStatus::ExpiresSoon {
                days_left: seconds_left / SECONDS_PER_DAY,
            }
        } else {
            ExpirationStatus::Valid
        }
    }

    /// Checks the signing keys as own keys and the encryption keys as other keys.
    ///
    /// Each certificate is reported at most once per role.
    pub fn check_solution(&self, solution: &Solution, now: UnixTimestamp) -> Vec<ExpiryNotice> {
        let signing = solution
            .signing_keys
            .iter()
            .map(|key| (key, KeyRole::OwnKey));
        let encryption = solution
            .encryption_keys
            .keys()
            .map(|key| (key, KeyRole::OtherKey));

        let mut notices: Vec<ExpiryNotice> = Vec::new();
        for (key, role) in signing.chain(encryption) {
            if notices
                .iter()
                .any(|notice| notice.role == role && notice.key.fingerprint() == key.fingerprint())
            {
                continue;
            }
            let status = self.check_key(key, role, now);
            if status.needs_attention() {
                tracing::debug!(fingerprint = %key.fingerprint(), ?status, "certificate expiry");
                notices.push(ExpiryNotice {
                    key: key.clone(),
                    role,
                    status,
                });
            }
        }
        notices
    }
}
