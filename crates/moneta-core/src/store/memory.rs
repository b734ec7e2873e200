//! In-memory store for tests and ephemeral embedding

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::models::{AutoTransaction, CachedBalance, TransactionKind, TransactionStatus};

use super::TransactionStore;

#[derive(Default)]
struct Inner {
    transactions: HashMap<String, AutoTransaction>,
    ignored_hashes: HashMap<String, DateTime<Utc>>,
    mappings: HashMap<String, String>,
    sessions: Vec<String>,
    balances: HashMap<String, CachedBalance>,
}

/// Store backed by process memory. Each logical write holds the single
/// mutex for its whole duration, which gives the wholesale-replace
/// atomicity the contract requires.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| Error::InvalidData("Memory store lock poisoned".into()))
    }
}

#[async_trait]
impl TransactionStore for MemoryStore {
    async fn insert_transaction(&self, tx: &AutoTransaction) -> Result<()> {
        let mut inner = self.lock()?;
        if inner.transactions.contains_key(&tx.source_hash) {
            return Err(Error::InvalidData(format!(
                "Transaction hash already stored: {}",
                tx.source_hash
            )));
        }
        inner.transactions.insert(tx.source_hash.clone(), tx.clone());
        Ok(())
    }

    async fn find_by_hash(&self, hash: &str) -> Result<Option<AutoTransaction>> {
        Ok(self.lock()?.transactions.get(hash).cloned())
    }

    async fn transactions_for_account(&self, account: &str) -> Result<Vec<AutoTransaction>> {
        let inner = self.lock()?;
        let mut matches: Vec<AutoTransaction> = inner
            .transactions
            .values()
            .filter(|t| t.account == account || t.to_account.as_deref() == Some(account))
            .cloned()
            .collect();
        matches.sort_by_key(|t| t.created_at);
        Ok(matches)
    }

    async fn transactions_with_status(
        &self,
        status: TransactionStatus,
    ) -> Result<Vec<AutoTransaction>> {
        let inner = self.lock()?;
        let mut matches: Vec<AutoTransaction> = inner
            .transactions
            .values()
            .filter(|t| t.status == status)
            .cloned()
            .collect();
        matches.sort_by_key(|t| t.created_at);
        Ok(matches)
    }

    async fn update_status(
        &self,
        hash: &str,
        status: TransactionStatus,
        confirmed_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut inner = self.lock()?;
        let tx = inner
            .transactions
            .get_mut(hash)
            .ok_or_else(|| Error::NotFound(format!("Transaction {}", hash)))?;
        tx.status = status;
        tx.confirmed_at = confirmed_at;
        Ok(())
    }

    async fn update_kind(
        &self,
        hash: &str,
        kind: TransactionKind,
        to_account: Option<String>,
    ) -> Result<()> {
        let mut inner = self.lock()?;
        let tx = inner
            .transactions
            .get_mut(hash)
            .ok_or_else(|| Error::NotFound(format!("Transaction {}", hash)))?;
        tx.kind = kind;
        tx.to_account = to_account;
        Ok(())
    }

    async fn delete_created_before(
        &self,
        cutoff: DateTime<Utc>,
        statuses: &[TransactionStatus],
    ) -> Result<u32> {
        let mut inner = self.lock()?;
        let before = inner.transactions.len();
        inner
            .transactions
            .retain(|_, t| !(t.created_at < cutoff && statuses.contains(&t.status)));
        Ok((before - inner.transactions.len()) as u32)
    }

    async fn add_ignored_hash(&self, hash: &str, ignored_at: DateTime<Utc>) -> Result<()> {
        self.lock()?.ignored_hashes.insert(hash.to_string(), ignored_at);
        Ok(())
    }

    async fn is_hash_ignored(&self, hash: &str) -> Result<bool> {
        Ok(self.lock()?.ignored_hashes.contains_key(hash))
    }

    async fn prune_ignored_hashes(&self, cutoff: DateTime<Utc>) -> Result<u32> {
        let mut inner = self.lock()?;
        let before = inner.ignored_hashes.len();
        inner.ignored_hashes.retain(|_, ignored_at| *ignored_at >= cutoff);
        Ok((before - inner.ignored_hashes.len()) as u32)
    }

    async fn mapping_for(&self, remote_uid: &str) -> Result<Option<String>> {
        Ok(self.lock()?.mappings.get(remote_uid).cloned())
    }

    async fn set_mapping(&self, remote_uid: &str, local_account: &str) -> Result<()> {
        self.lock()?
            .mappings
            .insert(remote_uid.to_string(), local_account.to_string());
        Ok(())
    }

    async fn session_ids(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.sessions.clone())
    }

    async fn add_session(&self, session_id: &str) -> Result<()> {
        self.lock()?.sessions.push(session_id.to_string());
        Ok(())
    }

    async fn replace_sessions(&self, session_ids: &[String]) -> Result<()> {
        self.lock()?.sessions = session_ids.to_vec();
        Ok(())
    }

    async fn cache_balance(&self, balance: &CachedBalance) -> Result<()> {
        self.lock()?
            .balances
            .insert(balance.account.clone(), balance.clone());
        Ok(())
    }

    async fn cached_balance(&self, account: &str) -> Result<Option<CachedBalance>> {
        Ok(self.lock()?.balances.get(account).cloned())
    }
}
