//! Moneta Core Library
//!
//! Signal ingestion and bank reconciliation engine for a personal expense
//! tracker:
//! - Locale-aware amount normalization for European message formats
//! - Pattern extraction from SMS and notification texts
//! - Idempotency hashing and the ignored-hash registry
//! - Candidate validation with stored warnings
//! - Pluggable transaction stores (SQLite, in-memory)
//! - Bank aggregator client with signed assertions and session management
//! - Sync orchestrator with balance reconciliation and retention sweeps

pub mod amount;
pub mod bank;
pub mod error;
pub mod hashing;
pub mod ingest;
pub mod models;
pub mod patterns;
pub mod resolve;
pub mod store;
pub mod sync;
pub mod validate;

pub use amount::{normalize_token, parse_reliable, DotPolicy};
pub use bank::{BankApi, BankClient, HttpBankApi, MockBankApi};
pub use error::{Error, Result};
pub use ingest::{IngestOutcome, Ingestor, SweepReport};
pub use models::{
    AutoTransaction, CachedBalance, Candidate, ConfirmationKind, Credentials, LocalAccount,
    RemoteAccount, SourceKind, SyncReport, TransactionKind, TransactionStatus,
};
pub use patterns::{Extraction, PatternLibrary, RuleSet};
pub use resolve::{AccountResolver, BrandTable};
pub use store::{MemoryStore, SqliteStore, TransactionStore};
pub use sync::{SyncConfig, SyncContext, SyncEngine};
pub use validate::{validate, ValidatorConfig};
