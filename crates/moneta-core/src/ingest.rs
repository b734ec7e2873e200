//! Ingestion pipeline
//!
//! The single entry point through which every candidate reaches the store.
//! Order matters: the ignored-hash registry is checked first (cheapest, and
//! a user "never again" beats everything), then the stored-transaction
//! lookup, then for id-carrying candidates a second lookup under the content
//! hash, then validation, then persistence. The duplicate check runs
//! immediately before the insert so the window for a racing double entry
//! stays as small as the store allows.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::hashing::{legacy_hash, source_hash};
use crate::models::{
    AutoTransaction, Candidate, ConfirmationKind, SourceKind, TransactionKind, TransactionStatus,
};
use crate::patterns::PatternLibrary;
use crate::store::TransactionStore;
use crate::validate::{validate, ValidatorConfig};

/// Stored transactions still pending or ignored are dropped after this long
const RETENTION_DAYS: i64 = 30;

/// Ignored-hash registry entries expire after this long
const IGNORED_HASH_TTL_DAYS: i64 = 90;

/// What happened to a submitted signal
#[derive(Debug)]
pub enum IngestOutcome {
    /// Persisted as a new pending transaction
    Accepted(AutoTransaction),
    /// Already stored or permanently ignored; nothing written
    Duplicate,
    /// No rule set matched the message; nothing written
    Unrecognized,
}

impl IngestOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }
}

/// Counts from a retention sweep
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub transactions_removed: u32,
    pub ignored_hashes_removed: u32,
}

pub struct Ingestor {
    store: Arc<dyn TransactionStore>,
    patterns: PatternLibrary,
    validator: ValidatorConfig,
}

impl Ingestor {
    /// Ingestor with the built-in pattern library and default thresholds.
    pub fn new(store: Arc<dyn TransactionStore>) -> Result<Self> {
        Ok(Self {
            store,
            patterns: PatternLibrary::builtin()?,
            validator: ValidatorConfig::default(),
        })
    }

    pub fn with_patterns(mut self, patterns: PatternLibrary) -> Self {
        self.patterns = patterns;
        self
    }

    pub fn with_validator(mut self, validator: ValidatorConfig) -> Self {
        self.validator = validator;
        self
    }

    /// Run a raw device message (SMS or notification text) through pattern
    /// extraction and, on a match, through the candidate pipeline.
    ///
    /// `account` is the local account the caller has attributed the message
    /// to; message text alone cannot identify one.
    pub async fn ingest_message(
        &self,
        sender: &str,
        body: &str,
        timestamp_millis: i64,
        source: SourceKind,
        account: &str,
    ) -> Result<IngestOutcome> {
        let Some(extraction) = self.patterns.extract(sender, body, timestamp_millis) else {
            debug!(sender, "no rule set matched, message unrecognized");
            return Ok(IngestOutcome::Unrecognized);
        };

        self.ingest_candidate(Candidate {
            kind: extraction.kind,
            amount: extraction.amount,
            description: extraction.description,
            date: extraction.date,
            account: account.to_string(),
            to_account: extraction.to_account,
            category: None,
            source,
            source_app: Some(sender.to_string()),
            bank_transaction_id: None,
        })
        .await
    }

    /// Deduplicate, validate and persist a candidate as a pending
    /// transaction.
    pub async fn ingest_candidate(&self, candidate: Candidate) -> Result<IngestOutcome> {
        let hash = source_hash(&candidate);

        if self.store.is_hash_ignored(&hash).await? {
            debug!(%hash, "candidate is permanently ignored");
            return Ok(IngestOutcome::Duplicate);
        }
        if self.store.find_by_hash(&hash).await?.is_some() {
            debug!(%hash, "candidate already stored");
            return Ok(IngestOutcome::Duplicate);
        }

        // Id-carrying candidates get a second lookup under the content hash:
        // the same transaction may predate the provider supplying ids
        if candidate
            .bank_transaction_id
            .as_deref()
            .is_some_and(|id| !id.is_empty())
        {
            let legacy = legacy_hash(&candidate);
            if self.store.is_hash_ignored(&legacy).await?
                || self.store.find_by_hash(&legacy).await?.is_some()
            {
                debug!(%hash, %legacy, "candidate matches a legacy content hash");
                return Ok(IngestOutcome::Duplicate);
            }
        }

        let warnings = validate(&candidate, &self.validator);
        let confirmation_kind = if self.is_ambiguous_transfer(&candidate) {
            ConfirmationKind::AmbiguousTransfer
        } else {
            ConfirmationKind::Standard
        };

        let tx = AutoTransaction {
            kind: candidate.kind,
            amount: candidate.amount,
            description: candidate.description,
            date: candidate.date,
            account: candidate.account,
            to_account: candidate.to_account,
            category: candidate.category,
            source: candidate.source,
            source_app: candidate.source_app,
            bank_transaction_id: candidate.bank_transaction_id,
            source_hash: hash,
            status: TransactionStatus::Pending,
            requires_confirmation: true,
            confirmation_kind: Some(confirmation_kind),
            linked_transaction_id: None,
            validation_warnings: warnings,
            created_at: Utc::now(),
            confirmed_at: None,
        };

        self.store.insert_transaction(&tx).await?;
        info!(
            hash = %tx.source_hash,
            kind = %tx.kind,
            amount = tx.amount,
            "transaction ingested"
        );
        Ok(IngestOutcome::Accepted(tx))
    }

    /// An expense whose wording suggests it is really an internal transfer
    /// gets the reclassify-or-confirm prompt instead of the plain one.
    fn is_ambiguous_transfer(&self, candidate: &Candidate) -> bool {
        if candidate.kind != TransactionKind::Expense {
            return false;
        }
        let description = candidate.description.to_lowercase();
        self.validator
            .transfer_keywords
            .iter()
            .any(|k| description.contains(k.as_str()))
    }

    /// Confirm a pending transaction. Confirmed is terminal.
    pub async fn confirm(&self, hash: &str) -> Result<AutoTransaction> {
        let tx = self.require_pending(hash).await?;
        let confirmed_at = Utc::now();
        self.store
            .update_status(hash, TransactionStatus::Confirmed, Some(confirmed_at))
            .await?;
        Ok(AutoTransaction {
            status: TransactionStatus::Confirmed,
            confirmed_at: Some(confirmed_at),
            ..tx
        })
    }

    /// Ignore a pending transaction and record its hash in the registry so
    /// the same signal is dropped on sight next time.
    pub async fn ignore(&self, hash: &str) -> Result<()> {
        self.require_pending(hash).await?;
        self.store
            .update_status(hash, TransactionStatus::Ignored, None)
            .await?;
        self.store.add_ignored_hash(hash, Utc::now()).await?;
        Ok(())
    }

    /// Reclassify a pending transaction (e.g. expense -> transfer) before
    /// confirmation. Transfers require a destination.
    pub async fn correct_kind(
        &self,
        hash: &str,
        kind: TransactionKind,
        to_account: Option<String>,
    ) -> Result<()> {
        self.require_pending(hash).await?;
        if kind == TransactionKind::Transfer && to_account.is_none() {
            return Err(Error::InvalidData(
                "a transfer needs a destination account".to_string(),
            ));
        }
        self.store.update_kind(hash, kind, to_account).await
    }

    async fn require_pending(&self, hash: &str) -> Result<AutoTransaction> {
        let tx = self
            .store
            .find_by_hash(hash)
            .await?
            .ok_or_else(|| Error::NotFound(format!("transaction {}", hash)))?;
        if tx.status != TransactionStatus::Pending {
            return Err(Error::InvalidData(format!(
                "transaction {} is {}, only pending transactions can transition",
                hash, tx.status
            )));
        }
        Ok(tx)
    }

    /// Drop stale pending/ignored transactions and expired registry
    /// entries. Confirmed transactions are never touched.
    pub async fn sweep_retention(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let transactions_removed = self
            .store
            .delete_created_before(
                now - Duration::days(RETENTION_DAYS),
                &[TransactionStatus::Pending, TransactionStatus::Ignored],
            )
            .await?;
        let ignored_hashes_removed = self
            .store
            .prune_ignored_hashes(now - Duration::days(IGNORED_HASH_TTL_DAYS))
            .await?;

        if transactions_removed > 0 || ignored_hashes_removed > 0 {
            info!(
                transactions_removed,
                ignored_hashes_removed, "retention sweep complete"
            );
        }
        Ok(SweepReport {
            transactions_removed,
            ignored_hashes_removed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::NaiveDate;

    const TS: i64 = 1_710_072_000_000;

    fn ingestor() -> Ingestor {
        Ingestor::new(Arc::new(MemoryStore::new())).unwrap()
    }

    fn bank_candidate(amount: f64, description: &str, bank_id: Option<&str>) -> Candidate {
        Candidate {
            kind: TransactionKind::Expense,
            amount,
            description: description.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(),
            account: "checking".to_string(),
            to_account: None,
            category: None,
            source: SourceKind::Bank,
            source_app: None,
            bank_transaction_id: bank_id.map(String::from),
        }
    }

    #[tokio::test]
    async fn test_message_ingested_as_pending() {
        let ingestor = ingestor();
        let outcome = ingestor
            .ingest_message(
                "Revolut",
                "Hai speso 1,00 € presso Amazon",
                TS,
                SourceKind::Sms,
                "checking",
            )
            .await
            .unwrap();

        let IngestOutcome::Accepted(tx) = outcome else {
            panic!("expected acceptance");
        };
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert!(tx.requires_confirmation);
        assert_eq!(tx.amount, 1.0);
        assert_eq!(tx.description, "Amazon");
        assert_eq!(tx.source_app.as_deref(), Some("Revolut"));
    }

    #[tokio::test]
    async fn test_same_message_twice_is_duplicate() {
        let ingestor = ingestor();
        let body = "Hai speso 5,50 € presso Bar Roma";
        let first = ingestor
            .ingest_message("Revolut", body, TS, SourceKind::Sms, "checking")
            .await
            .unwrap();
        assert!(first.is_accepted());

        let second = ingestor
            .ingest_message("Revolut", body, TS, SourceKind::Sms, "checking")
            .await
            .unwrap();
        assert!(matches!(second, IngestOutcome::Duplicate));
    }

    #[tokio::test]
    async fn test_unmatched_message_is_unrecognized() {
        let ingestor = ingestor();
        let outcome = ingestor
            .ingest_message(
                "Revolut",
                "Il tuo codice è 123456",
                TS,
                SourceKind::Sms,
                "checking",
            )
            .await
            .unwrap();
        assert!(matches!(outcome, IngestOutcome::Unrecognized));
    }

    #[tokio::test]
    async fn test_legacy_hash_double_check() {
        let ingestor = ingestor();
        // Stored without a bank id, from an SMS
        let first = ingestor
            .ingest_candidate(bank_candidate(12.5, "Amazon", None))
            .await
            .unwrap();
        assert!(first.is_accepted());

        // Same transaction arrives from the bank feed, now carrying an id:
        // the content-hash lookup catches it
        let second = ingestor
            .ingest_candidate(bank_candidate(12.5, "Amazon", Some("abc123")))
            .await
            .unwrap();
        assert!(matches!(second, IngestOutcome::Duplicate));
    }

    #[tokio::test]
    async fn test_ignore_blocks_reingestion() {
        let ingestor = ingestor();
        let IngestOutcome::Accepted(tx) = ingestor
            .ingest_candidate(bank_candidate(12.5, "Amazon", Some("abc123")))
            .await
            .unwrap()
        else {
            panic!("expected acceptance");
        };

        ingestor.ignore(&tx.source_hash).await.unwrap();

        let again = ingestor
            .ingest_candidate(bank_candidate(12.5, "Amazon", Some("abc123")))
            .await
            .unwrap();
        assert!(matches!(again, IngestOutcome::Duplicate));
    }

    #[tokio::test]
    async fn test_confirm_is_terminal() {
        let ingestor = ingestor();
        let IngestOutcome::Accepted(tx) = ingestor
            .ingest_candidate(bank_candidate(12.5, "Amazon", None))
            .await
            .unwrap()
        else {
            panic!("expected acceptance");
        };

        let confirmed = ingestor.confirm(&tx.source_hash).await.unwrap();
        assert_eq!(confirmed.status, TransactionStatus::Confirmed);
        assert!(confirmed.confirmed_at.is_some());

        assert!(ingestor.confirm(&tx.source_hash).await.is_err());
        assert!(ingestor.ignore(&tx.source_hash).await.is_err());
    }

    #[tokio::test]
    async fn test_ambiguous_transfer_wording_flagged() {
        let ingestor = ingestor();
        let IngestOutcome::Accepted(tx) = ingestor
            .ingest_candidate(bank_candidate(200.0, "Giroconto verso risparmi", None))
            .await
            .unwrap()
        else {
            panic!("expected acceptance");
        };
        assert_eq!(
            tx.confirmation_kind,
            Some(ConfirmationKind::AmbiguousTransfer)
        );
    }

    #[tokio::test]
    async fn test_correct_kind_requires_destination_for_transfer() {
        let ingestor = ingestor();
        let IngestOutcome::Accepted(tx) = ingestor
            .ingest_candidate(bank_candidate(200.0, "Giroconto verso risparmi", None))
            .await
            .unwrap()
        else {
            panic!("expected acceptance");
        };

        assert!(ingestor
            .correct_kind(&tx.source_hash, TransactionKind::Transfer, None)
            .await
            .is_err());
        ingestor
            .correct_kind(
                &tx.source_hash,
                TransactionKind::Transfer,
                Some("savings".to_string()),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_retention_sweep_spares_confirmed() {
        let store = Arc::new(MemoryStore::new());
        let ingestor = Ingestor::new(store.clone()).unwrap();

        let IngestOutcome::Accepted(old_pending) = ingestor
            .ingest_candidate(bank_candidate(10.0, "Old pending", None))
            .await
            .unwrap()
        else {
            panic!("expected acceptance");
        };
        let IngestOutcome::Accepted(old_confirmed) = ingestor
            .ingest_candidate(bank_candidate(20.0, "Old confirmed", None))
            .await
            .unwrap()
        else {
            panic!("expected acceptance");
        };
        ingestor.confirm(&old_confirmed.source_hash).await.unwrap();

        // Both were just created, so sweeping from 40 days in the future
        // catches the pending one only
        let report = ingestor
            .sweep_retention(Utc::now() + Duration::days(40))
            .await
            .unwrap();
        assert_eq!(report.transactions_removed, 1);

        assert!(store
            .find_by_hash(&old_pending.source_hash)
            .await
            .unwrap()
            .is_none());
        assert!(store
            .find_by_hash(&old_confirmed.source_hash)
            .await
            .unwrap()
            .is_some());
    }
}
