use std::fmt::{Display, Formatter};

use kleo_keycache::{Key, Protocol};

use super::AddressKeyMap;
use crate::errors::InputError;

const FLAG_SOME_UNRESOLVED: u32 = 1;
const FLAG_OPENPGP_ONLY: u32 = 2;
const FLAG_CMS_ONLY: u32 = 4;
const FLAG_PROTOCOLS_MASK: u32 = FLAG_OPENPGP_ONLY | FLAG_CMS_ONLY;
const FLAG_ERROR: u32 = 0x1000;

/// A set of keys to sign and encrypt one message with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Solution {
    /// A concrete protocol if all keys share it, `Unknown` for a mixed solution.
    pub protocol: Protocol,
    /// At most one signing key per protocol, unless explicitly overridden.
    pub signing_keys: Vec<Key>,
    /// Encryption keys per normalized recipient address.
    pub encryption_keys: AddressKeyMap,
}

impl Solution {
    /// Recipients without any encryption key.
    pub fn unresolved_recipients(&self) -> Vec<String> {
        self.encryption_keys.unresolved()
    }

    /// Indicates if the solution neither signs nor encrypts.
    pub fn is_empty(&self) -> bool {
        self.signing_keys.is_empty() && self.encryption_keys.is_empty()
    }
}

/// The outcome of a resolution run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionOutcome {
    /// Neither signing nor encryption was requested.
    Trivial,
    /// Everything resolved with a single protocol.
    AllResolved(Protocol),
    /// Everything resolved, but recipients need different protocols.
    MixedProtocolsResolved,
    /// Automatic resolution is incomplete or ambiguous and needs a human decision.
    NeedsReview {
        /// Recipients without an `OpenPGP` key.
        unresolved_openpgp: Vec<String>,
        /// Recipients without an S/MIME key.
        unresolved_cms: Vec<String>,
        /// Protocols for which signing was requested but no signing key was found.
        missing_signing_keys: Vec<Protocol>,
    },
}

impl ResolutionOutcome {
    /// Indicates if the result can be used without asking the user.
    pub fn is_resolved(&self) -> bool {
        !matches!(self, ResolutionOutcome::NeedsReview { .. })
    }
}

/// Bit map view of a resolution result.
///
/// The protocol bits describe the preferred solution: only `OpenPGP`,
/// only S/MIME, or both (mixed).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SolutionFlags(u32);

impl Display for SolutionFlags {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl SolutionFlags {
    pub const ALL_RESOLVED: SolutionFlags = SolutionFlags(0);
    pub const SOME_UNRESOLVED: SolutionFlags = SolutionFlags(FLAG_SOME_UNRESOLVED);
    pub const OPENPGP_ONLY: SolutionFlags = SolutionFlags(FLAG_OPENPGP_ONLY);
    pub const CMS_ONLY: SolutionFlags = SolutionFlags(FLAG_CMS_ONLY);
    pub const MIXED_PROTOCOLS: SolutionFlags = SolutionFlags(FLAG_PROTOCOLS_MASK);
    pub const ERROR: SolutionFlags = SolutionFlags(FLAG_ERROR);

    /// Returns the flag bitmap as u32.
    #[must_use]
    pub fn to_u32(&self) -> u32 {
        self.0
    }
    #[must_use]
    pub fn is_all_resolved(&self) -> bool {
        (self.0 & FLAG_SOME_UNRESOLVED) == 0
    }
    #[must_use]
    pub fn is_openpgp_only(&self) -> bool {
        (self.0 & FLAG_PROTOCOLS_MASK) == FLAG_OPENPGP_ONLY
    }
    #[must_use]
    pub fn is_cms_only(&self) -> bool {
        (self.0 & FLAG_PROTOCOLS_MASK) == FLAG_CMS_ONLY
    }
    #[must_use]
    pub fn is_mixed_protocols(&self) -> bool {
        (self.0 & FLAG_PROTOCOLS_MASK) == FLAG_PROTOCOLS_MASK
    }
    #[must_use]
    pub fn has_error(&self) -> bool {
        (self.0 & FLAG_ERROR) > 0
    }
    #[must_use]
    pub fn contains(&self, other: SolutionFlags) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for SolutionFlags {
    type Output = SolutionFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        SolutionFlags(self.0 | rhs.0)
    }
}

/// The result of [`KeyResolverCore::resolve`](super::KeyResolverCore::resolve).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionResult {
    pub outcome: ResolutionOutcome,
    /// The best solution found.
    pub solution: Solution,
    /// A solution with the other protocol, for the user to choose from.
    ///
    /// Empty if there is nothing to contrast with.
    pub alternative: Solution,
    /// Caller-bug diagnostics collected while configuring the resolver.
    pub fatal_errors: Vec<InputError>,
}

impl ResolutionResult {
    pub(crate) fn trivial(fatal_errors: Vec<InputError>) -> Self {
        Self {
            outcome: ResolutionOutcome::Trivial,
            solution: Solution::default(),
            alternative: Solution::default(),
            fatal_errors,
        }
    }

    /// Derives the historical flag set from the outcome.
    pub fn flags(&self) -> SolutionFlags {
        let resolved = if self.outcome.is_resolved() {
            SolutionFlags::ALL_RESOLVED
        } else {
            SolutionFlags::SOME_UNRESOLVED
        };
        let protocols = match self.outcome {
            ResolutionOutcome::Trivial => SolutionFlags::default(),
            ResolutionOutcome::AllResolved(Protocol::OpenPGP) => SolutionFlags::OPENPGP_ONLY,
            ResolutionOutcome::AllResolved(Protocol::CMS) => SolutionFlags::CMS_ONLY,
            ResolutionOutcome::AllResolved(Protocol::Unknown)
            | ResolutionOutcome::MixedProtocolsResolved => SolutionFlags::MIXED_PROTOCOLS,
            ResolutionOutcome::NeedsReview { .. } => match self.solution.protocol {
                Protocol::OpenPGP => SolutionFlags::OPENPGP_ONLY,
                Protocol::CMS => SolutionFlags::CMS_ONLY,
                Protocol::Unknown => SolutionFlags::MIXED_PROTOCOLS,
            },
        };
        let error = if self.fatal_errors.is_empty() {
            SolutionFlags::default()
        } else {
            SolutionFlags::ERROR
        };
        resolved | protocols | error
    }
}
