//! Compliance predicates.
//!
//! A compliance mode restricts which keys may be used. The resolver only asks
//! whether a mode is active and whether a given key is compliant with it.

use crate::Key;

/// Name of the German VS-NfD compliance mode.
pub const DE_VS_MODE: &str = "de-vs";

/// A compliance policy consumed by the key resolver.
pub trait CompliancePolicy: Send + Sync {
    /// The active compliance mode, `None` if no mode is configured.
    fn mode(&self) -> Option<&str>;

    /// Indicates if the key may be used under the active mode.
    fn is_compliant(&self, key: &Key) -> bool;

    /// Indicates if compliance checks apply at all.
    fn is_active(&self) -> bool {
        self.mode().is_some()
    }
}

/// No compliance mode. Every key is compliant.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCompliance;

impl CompliancePolicy for NoCompliance {
    fn mode(&self) -> Option<&str> {
        None
    }

    fn is_compliant(&self, _key: &Key) -> bool {
        true
    }
}

/// The `de-vs` compliance mode.
///
/// A key is compliant if it is not bad and all of its usable subkeys are
/// approved for `de-vs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeVsCompliance;

impl CompliancePolicy for DeVsCompliance {
    fn mode(&self) -> Option<&str> {
        Some(DE_VS_MODE)
    }

    fn is_compliant(&self, key: &Key) -> bool {
        if key.is_bad() {
            return false;
        }
        let mut usable = key.subkeys().iter().filter(|subkey| subkey.is_usable()).peekable();
        usable.peek().is_some() && usable.all(|subkey| subkey.is_de_vs)
    }
}
