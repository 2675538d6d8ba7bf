//! Automatic selection of signing and encryption certificates for a message.
//!
//! [`KeyResolverCore`] decides, for a sender and a list of recipients, which
//! `OpenPGP` and/or S/MIME certificates to use. It resolves automatically when
//! the choice is unambiguous and otherwise reports what still needs a human
//! decision. [`KeyResolver`] wraps the engine, expands recipient groups and
//! hands unresolved results to an injectable [`Reviewer`].

pub mod errors;
mod facade;
mod resolver;
pub mod settings;

pub use facade::*;
pub use resolver::*;

/// Re-export of the certificate store crate.
pub use kleo_keycache;
