//! Persistence collaborator contract
//!
//! The engine treats storage as a key-value/object collaborator: accepted
//! transactions keyed by idempotency hash, the ignored-hash registry,
//! explicit account mappings, the ordered bank-session list and cached
//! per-account balances. Implementations must apply each logical write
//! atomically (e.g. the session list is replaced wholesale) so a concurrent
//! reader never observes a partial state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{AutoTransaction, CachedBalance, TransactionStatus};

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Persist a transaction. Fails with `InvalidData` if the hash is
    /// already present; callers are expected to run the duplicate check
    /// immediately before inserting.
    async fn insert_transaction(&self, tx: &AutoTransaction) -> Result<()>;

    /// Look up a transaction by idempotency hash, regardless of status.
    async fn find_by_hash(&self, hash: &str) -> Result<Option<AutoTransaction>>;

    /// All transactions booked against a local account, any status.
    async fn transactions_for_account(&self, account: &str) -> Result<Vec<AutoTransaction>>;

    /// Transactions in a given status, oldest first.
    async fn transactions_with_status(
        &self,
        status: TransactionStatus,
    ) -> Result<Vec<AutoTransaction>>;

    /// Transition a transaction's status. Does not enforce the state
    /// machine; the ingestion layer does.
    async fn update_status(
        &self,
        hash: &str,
        status: TransactionStatus,
        confirmed_at: Option<DateTime<Utc>>,
    ) -> Result<()>;

    /// Replace a transaction's kind and destination (type correction).
    async fn update_kind(
        &self,
        hash: &str,
        kind: crate::models::TransactionKind,
        to_account: Option<String>,
    ) -> Result<()>;

    /// Delete transactions in the given statuses created before the cutoff.
    /// Returns the number removed.
    async fn delete_created_before(
        &self,
        cutoff: DateTime<Utc>,
        statuses: &[TransactionStatus],
    ) -> Result<u32>;

    /// Record a permanently-ignored hash.
    async fn add_ignored_hash(&self, hash: &str, ignored_at: DateTime<Utc>) -> Result<()>;

    /// Registry membership check; the cheap short-circuit before any
    /// transaction lookup.
    async fn is_hash_ignored(&self, hash: &str) -> Result<bool>;

    /// Drop registry entries older than the cutoff. Returns the number
    /// removed.
    async fn prune_ignored_hashes(&self, cutoff: DateTime<Utc>) -> Result<u32>;

    /// Explicit remote -> local account mapping, user-set.
    async fn mapping_for(&self, remote_uid: &str) -> Result<Option<String>>;

    async fn set_mapping(&self, remote_uid: &str, local_account: &str) -> Result<()>;

    /// Live bank session ids, oldest first (last element is the newest).
    async fn session_ids(&self) -> Result<Vec<String>>;

    /// Append a newly authorized session.
    async fn add_session(&self, session_id: &str) -> Result<()>;

    /// Rewrite the session list wholesale after pruning.
    async fn replace_sessions(&self, session_ids: &[String]) -> Result<()>;

    /// Cache the authoritative balance for an account.
    async fn cache_balance(&self, balance: &CachedBalance) -> Result<()>;

    async fn cached_balance(&self, account: &str) -> Result<Option<CachedBalance>>;
}
