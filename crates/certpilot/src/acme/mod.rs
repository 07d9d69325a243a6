//! ACME certificate lifecycle
//!
//! Issues and renews certificates with DNS-01 challenges against Let's
//! Encrypt and compatible CAs.
//!
//! # Architecture
//!
//! - [`AccountManager`] - Loads, confirms, or registers the ACME account
//! - [`ChallengeResolver`] - Drives each authorization through its DNS-01 exchange
//! - [`CertificateIssuer`] - Key generation, CSR, finalization, chain download
//! - [`CertificateManager`] - Chains the above and updates the certificate store
//! - [`RenewalScheduler`] - Selects certificates close to expiry and renews them
//! - [`AcmeTransport`] - ACME protocol capability, implemented by
//!   [`InstantAcmeTransport`]
//!
//! # Challenge Flow
//!
//! For every authorization of an order, strictly one at a time:
//!
//! 1. The DNS-01 challenge is located (absent: `ChallengeTypeUnsupported`)
//! 2. `_acme-challenge.<zone>` is upserted with the key authorization digest
//! 3. A fixed propagation delay is awaited
//! 4. The server is asked to validate and polled until the authorization settles
//! 5. The record is deleted, whatever the outcome of step 4
//!
//! Once every authorization is valid the order is finalized with a CSR for
//! a fresh key, the chain is downloaded and written to the work directory,
//! installed, and the store record is advanced.

mod account;
mod challenge;
mod client;
mod error;
mod issuer;
mod lifecycle;
mod scheduler;
mod transport;

pub use account::{
    contact_uris, contacts_changed, parse_account_file, serialize_account_file, Account,
    AccountManager,
};
pub use challenge::{
    dns01_value, ChallengeResolver, ChallengeSettings, ChallengeState, ResolvedAuthorization,
};
pub use client::InstantAcmeTransport;
pub use error::AcmeError;
pub use issuer::{
    build_csr, chain_to_pem, CertificateIssuer, IssuedMaterial, CERT_FILE_NAME, KEY_FILE_NAME,
};
pub use lifecycle::{CertificateManager, CertificateRequest};
pub use scheduler::{select_for_renewal, RenewalScheduler, RenewalSummary, DEFAULT_CHECK_INTERVAL};
pub use transport::{AcmeTransport, Authorization, AuthorizationStatus, Challenge, ChallengeKind};
