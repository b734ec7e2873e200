//! SQLite-backed store adapter with connection pooling and migrations

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, Row};
use tracing::info;

use crate::error::{Error, Result};
use crate::models::{
    AutoTransaction, CachedBalance, ConfirmationKind, SourceKind, TransactionKind,
    TransactionStatus,
};

use super::TransactionStore;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Store backed by a pooled SQLite database
#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
    db_path: String,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and run migrations.
    pub fn new(path: &str) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder().max_size(10).build(manager)?;

        let store = Self {
            pool,
            db_path: path.to_string(),
        };
        store.run_migrations()?;

        Ok(store)
    }

    /// Create a throwaway database (for testing)
    ///
    /// Note: Uses a temporary file rather than `:memory:` because each
    /// pooled connection would otherwise see its own empty database.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = format!(
            "{}/moneta_test_{}_{}.db",
            std::env::temp_dir().display(),
            std::process::id(),
            id
        );
        let _ = std::fs::remove_file(&path);

        Self::new(&path)
    }

    pub fn path(&self) -> &str {
        &self.db_path
    }

    fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;

            -- Accepted and pending transactions, keyed by idempotency hash
            CREATE TABLE IF NOT EXISTS transactions (
                source_hash TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                amount REAL NOT NULL,
                description TEXT NOT NULL,
                date TEXT NOT NULL,
                account TEXT NOT NULL,
                to_account TEXT,
                category TEXT,
                source TEXT NOT NULL,
                source_app TEXT,
                bank_transaction_id TEXT,
                status TEXT NOT NULL,
                requires_confirmation INTEGER NOT NULL DEFAULT 0,
                confirmation_kind TEXT,
                linked_transaction_id TEXT,
                validation_warnings TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                confirmed_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_transactions_account ON transactions(account);
            CREATE INDEX IF NOT EXISTS idx_transactions_status ON transactions(status);
            CREATE INDEX IF NOT EXISTS idx_transactions_created ON transactions(created_at);

            -- Permanently-ignored identities, pruned after 90 days
            CREATE TABLE IF NOT EXISTS ignored_hashes (
                hash TEXT PRIMARY KEY,
                ignored_at TEXT NOT NULL
            );

            -- Explicit remote -> local account mappings
            CREATE TABLE IF NOT EXISTS account_mappings (
                remote_uid TEXT PRIMARY KEY,
                local_account TEXT NOT NULL
            );

            -- Live bank sessions, position preserves creation order
            CREATE TABLE IF NOT EXISTS bank_sessions (
                position INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL UNIQUE
            );

            -- Authoritative balances cached for UI display
            CREATE TABLE IF NOT EXISTS cached_balances (
                account TEXT PRIMARY KEY,
                balance REAL NOT NULL,
                synced_at TEXT NOT NULL
            );
            "#,
        )?;

        info!(path = %self.db_path, "sqlite store ready");
        Ok(())
    }
}

fn row_to_transaction(row: &Row<'_>) -> rusqlite::Result<AutoTransaction> {
    let kind: String = row.get("kind")?;
    let source: String = row.get("source")?;
    let status: String = row.get("status")?;
    let date: String = row.get("date")?;
    let confirmation_kind: Option<String> = row.get("confirmation_kind")?;
    let warnings_json: String = row.get("validation_warnings")?;
    let created_at: String = row.get("created_at")?;
    let confirmed_at: Option<String> = row.get("confirmed_at")?;

    Ok(AutoTransaction {
        kind: kind.parse().unwrap_or(TransactionKind::Expense),
        amount: row.get("amount")?,
        description: row.get("description")?,
        date: NaiveDate::parse_from_str(&date, "%Y-%m-%d").unwrap_or_default(),
        account: row.get("account")?,
        to_account: row.get("to_account")?,
        category: row.get("category")?,
        source: source.parse().unwrap_or(SourceKind::Manual),
        source_app: row.get("source_app")?,
        bank_transaction_id: row.get("bank_transaction_id")?,
        source_hash: row.get("source_hash")?,
        status: status.parse().unwrap_or(TransactionStatus::Pending),
        requires_confirmation: row.get::<_, i64>("requires_confirmation")? != 0,
        confirmation_kind: confirmation_kind.and_then(|k| match k.as_str() {
            "standard" => Some(ConfirmationKind::Standard),
            "ambiguous_transfer" => Some(ConfirmationKind::AmbiguousTransfer),
            _ => None,
        }),
        linked_transaction_id: row.get("linked_transaction_id")?,
        validation_warnings: serde_json::from_str(&warnings_json).unwrap_or_default(),
        created_at: parse_timestamp(&created_at),
        confirmed_at: confirmed_at.as_deref().map(parse_timestamp),
    })
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn confirmation_kind_str(kind: Option<ConfirmationKind>) -> Option<&'static str> {
    kind.map(|k| match k {
        ConfirmationKind::Standard => "standard",
        ConfirmationKind::AmbiguousTransfer => "ambiguous_transfer",
    })
}

#[async_trait]
impl TransactionStore for SqliteStore {
    async fn insert_transaction(&self, tx: &AutoTransaction) -> Result<()> {
        let conn = self.conn()?;

        let existing: Option<String> = conn
            .query_row(
                "SELECT source_hash FROM transactions WHERE source_hash = ?",
                params![tx.source_hash],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Err(Error::InvalidData(format!(
                "Transaction hash already stored: {}",
                tx.source_hash
            )));
        }

        conn.execute(
            r#"
            INSERT INTO transactions (
                source_hash, kind, amount, description, date, account, to_account,
                category, source, source_app, bank_transaction_id, status,
                requires_confirmation, confirmation_kind, linked_transaction_id,
                validation_warnings, created_at, confirmed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                tx.source_hash,
                tx.kind.as_str(),
                tx.amount,
                tx.description,
                tx.date.to_string(),
                tx.account,
                tx.to_account,
                tx.category,
                tx.source.as_str(),
                tx.source_app,
                tx.bank_transaction_id,
                tx.status.as_str(),
                tx.requires_confirmation as i64,
                confirmation_kind_str(tx.confirmation_kind),
                tx.linked_transaction_id,
                serde_json::to_string(&tx.validation_warnings)?,
                tx.created_at.to_rfc3339(),
                tx.confirmed_at.map(|t| t.to_rfc3339()),
            ],
        )?;

        Ok(())
    }

    async fn find_by_hash(&self, hash: &str) -> Result<Option<AutoTransaction>> {
        let conn = self.conn()?;
        let tx = conn
            .query_row(
                "SELECT * FROM transactions WHERE source_hash = ?",
                params![hash],
                row_to_transaction,
            )
            .optional()?;
        Ok(tx)
    }

    async fn transactions_for_account(&self, account: &str) -> Result<Vec<AutoTransaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM transactions WHERE account = ?1 OR to_account = ?1 ORDER BY created_at",
        )?;
        let rows = stmt.query_map(params![account], row_to_transaction)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn transactions_with_status(
        &self,
        status: TransactionStatus,
    ) -> Result<Vec<AutoTransaction>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT * FROM transactions WHERE status = ? ORDER BY created_at")?;
        let rows = stmt.query_map(params![status.as_str()], row_to_transaction)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn update_status(
        &self,
        hash: &str,
        status: TransactionStatus,
        confirmed_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE transactions SET status = ?, confirmed_at = ? WHERE source_hash = ?",
            params![
                status.as_str(),
                confirmed_at.map(|t| t.to_rfc3339()),
                hash
            ],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!("Transaction {}", hash)));
        }
        Ok(())
    }

    async fn update_kind(
        &self,
        hash: &str,
        kind: TransactionKind,
        to_account: Option<String>,
    ) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE transactions SET kind = ?, to_account = ? WHERE source_hash = ?",
            params![kind.as_str(), to_account, hash],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!("Transaction {}", hash)));
        }
        Ok(())
    }

    async fn delete_created_before(
        &self,
        cutoff: DateTime<Utc>,
        statuses: &[TransactionStatus],
    ) -> Result<u32> {
        if statuses.is_empty() {
            return Ok(0);
        }
        let conn = self.conn()?;
        let placeholders = vec!["?"; statuses.len()].join(", ");
        let sql = format!(
            "DELETE FROM transactions WHERE created_at < ? AND status IN ({})",
            placeholders
        );
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(cutoff.to_rfc3339())];
        for status in statuses {
            values.push(Box::new(status.as_str()));
        }
        let removed = conn.execute(
            &sql,
            rusqlite::params_from_iter(values.iter().map(|v| v.as_ref())),
        )?;
        Ok(removed as u32)
    }

    async fn add_ignored_hash(&self, hash: &str, ignored_at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO ignored_hashes (hash, ignored_at) VALUES (?, ?)",
            params![hash, ignored_at.to_rfc3339()],
        )?;
        Ok(())
    }

    async fn is_hash_ignored(&self, hash: &str) -> Result<bool> {
        let conn = self.conn()?;
        let found: Option<String> = conn
            .query_row(
                "SELECT hash FROM ignored_hashes WHERE hash = ?",
                params![hash],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    async fn prune_ignored_hashes(&self, cutoff: DateTime<Utc>) -> Result<u32> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM ignored_hashes WHERE ignored_at < ?",
            params![cutoff.to_rfc3339()],
        )?;
        Ok(removed as u32)
    }

    async fn mapping_for(&self, remote_uid: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        let local = conn
            .query_row(
                "SELECT local_account FROM account_mappings WHERE remote_uid = ?",
                params![remote_uid],
                |row| row.get(0),
            )
            .optional()?;
        Ok(local)
    }

    async fn set_mapping(&self, remote_uid: &str, local_account: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO account_mappings (remote_uid, local_account) VALUES (?, ?)",
            params![remote_uid, local_account],
        )?;
        Ok(())
    }

    async fn session_ids(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT session_id FROM bank_sessions ORDER BY position")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn add_session(&self, session_id: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO bank_sessions (session_id) VALUES (?)",
            params![session_id],
        )?;
        Ok(())
    }

    async fn replace_sessions(&self, session_ids: &[String]) -> Result<()> {
        let mut conn = self.conn()?;
        // Single transaction so a concurrent reader never sees a partial list
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM bank_sessions", [])?;
        for session_id in session_ids {
            tx.execute(
                "INSERT INTO bank_sessions (session_id) VALUES (?)",
                params![session_id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    async fn cache_balance(&self, balance: &CachedBalance) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO cached_balances (account, balance, synced_at) VALUES (?, ?, ?)",
            params![
                balance.account,
                balance.balance,
                balance.synced_at.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    async fn cached_balance(&self, account: &str) -> Result<Option<CachedBalance>> {
        let conn = self.conn()?;
        let balance = conn
            .query_row(
                "SELECT account, balance, synced_at FROM cached_balances WHERE account = ?",
                params![account],
                |row| {
                    let synced_at: String = row.get(2)?;
                    Ok(CachedBalance {
                        account: row.get(0)?,
                        balance: row.get(1)?,
                        synced_at: parse_timestamp(&synced_at),
                    })
                },
            )
            .optional()?;
        Ok(balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn tx(hash: &str) -> AutoTransaction {
        AutoTransaction {
            kind: TransactionKind::Expense,
            amount: 42.5,
            description: "Espresso".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 6, 2).unwrap(),
            account: "checking".to_string(),
            to_account: None,
            category: Some("Dining".to_string()),
            source: SourceKind::Bank,
            source_app: None,
            bank_transaction_id: Some("ref-1".to_string()),
            source_hash: hash.to_string(),
            status: TransactionStatus::Pending,
            requires_confirmation: true,
            confirmation_kind: Some(ConfirmationKind::Standard),
            linked_transaction_id: None,
            validation_warnings: vec!["High amount: something".to_string()],
            created_at: Utc::now(),
            confirmed_at: None,
        }
    }

    #[tokio::test]
    async fn test_round_trip() {
        let store = SqliteStore::in_memory().unwrap();
        let original = tx("h1");
        store.insert_transaction(&original).await.unwrap();

        let loaded = store.find_by_hash("h1").await.unwrap().unwrap();
        assert_eq!(loaded.kind, original.kind);
        assert_eq!(loaded.amount, original.amount);
        assert_eq!(loaded.date, original.date);
        assert_eq!(loaded.status, TransactionStatus::Pending);
        assert_eq!(loaded.confirmation_kind, Some(ConfirmationKind::Standard));
        assert_eq!(loaded.validation_warnings, original.validation_warnings);
    }

    #[tokio::test]
    async fn test_reopen_preserves_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("moneta.db");
        let path = path.to_str().unwrap();
        {
            let store = SqliteStore::new(path).unwrap();
            store.insert_transaction(&tx("h1")).await.unwrap();
        }
        let store = SqliteStore::new(path).unwrap();
        assert!(store.find_by_hash("h1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected() {
        let store = SqliteStore::in_memory().unwrap();
        store.insert_transaction(&tx("h1")).await.unwrap();
        assert!(store.insert_transaction(&tx("h1")).await.is_err());
    }

    #[tokio::test]
    async fn test_status_update() {
        let store = SqliteStore::in_memory().unwrap();
        store.insert_transaction(&tx("h1")).await.unwrap();
        let now = Utc::now();
        store
            .update_status("h1", TransactionStatus::Confirmed, Some(now))
            .await
            .unwrap();
        let loaded = store.find_by_hash("h1").await.unwrap().unwrap();
        assert_eq!(loaded.status, TransactionStatus::Confirmed);
        assert!(loaded.confirmed_at.is_some());
    }

    #[tokio::test]
    async fn test_sessions_keep_creation_order() {
        let store = SqliteStore::in_memory().unwrap();
        store.add_session("first").await.unwrap();
        store.add_session("second").await.unwrap();
        store.add_session("third").await.unwrap();
        assert_eq!(
            store.session_ids().await.unwrap(),
            vec!["first", "second", "third"]
        );

        store
            .replace_sessions(&["second".to_string(), "third".to_string()])
            .await
            .unwrap();
        assert_eq!(store.session_ids().await.unwrap(), vec!["second", "third"]);
    }

    #[tokio::test]
    async fn test_balance_cache() {
        let store = SqliteStore::in_memory().unwrap();
        let balance = CachedBalance {
            account: "checking".to_string(),
            balance: 1234.56,
            synced_at: Utc::now(),
        };
        store.cache_balance(&balance).await.unwrap();
        let loaded = store.cached_balance("checking").await.unwrap().unwrap();
        assert_eq!(loaded.balance, 1234.56);
        assert!(store.cached_balance("savings").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mapping_round_trip() {
        let store = SqliteStore::in_memory().unwrap();
        store.set_mapping("uid-1", "checking").await.unwrap();
        assert_eq!(
            store.mapping_for("uid-1").await.unwrap().as_deref(),
            Some("checking")
        );
        assert!(store.mapping_for("uid-2").await.unwrap().is_none());
    }
}
