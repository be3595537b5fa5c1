//! Flow ledger access for the supreme keeper.
//!
//! Turns the admin account's N keys into N independent submission lanes:
//! - `KeyPool`: exclusive key-slot leases (immediate or waiting)
//! - `KeyRing`: ECDSA P-256 / SHA3-256 signing per slot (secp256k1 / SHA2-256 optional)
//! - `envelope`: canonical RLP transaction encoding
//! - `LedgerClient`: access node seam (`RestLedgerClient`, `MockLedger`)
//! - `Submitter`: lease → sign → send → await seal → release

pub mod client;
pub mod envelope;
pub mod error;
pub mod imports;
pub mod key_pool;
pub mod mock;
pub mod signer;
pub mod submitter;

pub use client::{
    AccountKey, BoxFuture, DynLedgerClient, LedgerClient, RestLedgerClient, TransactionOutcome,
    TransactionStatus,
};
pub use envelope::FlowAddress;
pub use error::{LedgerError, LedgerResult};
pub use imports::ContractAddresses;
pub use key_pool::{KeyLease, KeyPool};
pub use mock::MockLedger;
pub use signer::{KeyError, KeyRing, KeySource, PayloadSigner, SignatureAlgorithm, SignerError};
pub use submitter::{ExternalAuthorizer, SubmitOptions, Submitter, SubmitterConfig, TxKind};
