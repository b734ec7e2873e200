//! Domain models for Moneta

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Kind of financial event a transaction records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Expense,
    Income,
    Transfer,
    /// Synthetic entry closing the gap between the locally computed balance
    /// and the authoritative bank balance.
    Adjustment,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expense => "expense",
            Self::Income => "income",
            Self::Transfer => "transfer",
            Self::Adjustment => "adjustment",
        }
    }
}

impl std::str::FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "expense" => Ok(Self::Expense),
            "income" => Ok(Self::Income),
            "transfer" => Ok(Self::Transfer),
            "adjustment" => Ok(Self::Adjustment),
            _ => Err(format!("Unknown transaction kind: {}", s)),
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a candidate transaction came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Sms,
    Notification,
    #[default]
    Manual,
    Bank,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sms => "sms",
            Self::Notification => "notification",
            Self::Manual => "manual",
            Self::Bank => "bank",
        }
    }
}

impl std::str::FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sms" => Ok(Self::Sms),
            "notification" => Ok(Self::Notification),
            "manual" => Ok(Self::Manual),
            "bank" => Ok(Self::Bank),
            _ => Err(format!("Unknown source kind: {}", s)),
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Review status of a stored transaction
///
/// Transitions are pending -> confirmed or pending -> ignored only; both
/// targets are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    #[default]
    Pending,
    Confirmed,
    Ignored,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Ignored => "ignored",
        }
    }
}

impl std::str::FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "ignored" => Ok(Self::Ignored),
            _ => Err(format!("Unknown transaction status: {}", s)),
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the UI should ask the user when confirming a pending transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationKind {
    /// Plain accept/ignore confirmation
    Standard,
    /// The wording suggests an internal transfer; the user may reclassify
    /// the candidate from expense to transfer before confirming
    AmbiguousTransfer,
}

/// A parsed-but-not-yet-persisted financial event
///
/// Produced by the pattern extraction engine or the bank transaction mapper,
/// consumed by the ingestion pipeline which assigns the idempotency hash and
/// validation warnings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub kind: TransactionKind,
    /// Always non-negative; the kind carries the direction
    pub amount: f64,
    pub description: String,
    pub date: NaiveDate,
    /// Local account identifier
    pub account: String,
    /// Destination leg, required for transfers
    pub to_account: Option<String>,
    pub category: Option<String>,
    pub source: SourceKind,
    /// Originating app/sender for device signals
    pub source_app: Option<String>,
    /// Provider-assigned id, stable across pending/booked transitions
    pub bank_transaction_id: Option<String>,
}

/// A persisted transaction, keyed by its idempotency hash
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoTransaction {
    pub kind: TransactionKind,
    pub amount: f64,
    pub description: String,
    pub date: NaiveDate,
    pub account: String,
    pub to_account: Option<String>,
    pub category: Option<String>,
    pub source: SourceKind,
    pub source_app: Option<String>,
    pub bank_transaction_id: Option<String>,
    /// Deterministic identity; at most one stored transaction per hash
    pub source_hash: String,
    pub status: TransactionStatus,
    pub requires_confirmation: bool,
    pub confirmation_kind: Option<ConfirmationKind>,
    /// Hash of the other leg of a linked pair (e.g. a matched transfer)
    pub linked_transaction_id: Option<String>,
    pub validation_warnings: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

/// A local account known to the embedding application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalAccount {
    pub id: String,
    pub name: String,
}

/// A bank account as exposed by the aggregator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAccount {
    pub uid: String,
    pub name: String,
    /// Institution name, when the provider reports it
    pub aspsp_name: Option<String>,
}

impl RemoteAccount {
    /// Minimal descriptor for a session that only returned an identifier
    pub fn from_uid(uid: &str) -> Self {
        Self {
            uid: uid.to_string(),
            name: uid.to_string(),
            aspsp_name: None,
        }
    }
}

/// Signing credentials for the bank aggregator, supplied by the UI
/// collaborator and read-only to the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub app_id: String,
    pub client_id: String,
    pub private_key: String,
}

/// Authoritative bank balance cached for UI display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedBalance {
    pub account: String,
    pub balance: f64,
    pub synced_at: DateTime<Utc>,
}

/// Result of a full sync cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub transactions_added: u32,
    pub adjustments_created: u32,
    pub accounts_synced: u32,
    /// Accounts whose transaction or balance fetch failed and was skipped
    pub accounts_skipped: Vec<String>,
}

impl SyncReport {
    /// Zero-effect report, returned when a cycle is suppressed by the
    /// reentrancy guard or the cooldown gate
    pub fn skipped() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_kind_round_trip() {
        for kind in [
            TransactionKind::Expense,
            TransactionKind::Income,
            TransactionKind::Transfer,
            TransactionKind::Adjustment,
        ] {
            assert_eq!(TransactionKind::from_str(kind.as_str()).unwrap(), kind);
        }
        assert!(TransactionKind::from_str("loan").is_err());
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            TransactionStatus::Pending,
            TransactionStatus::Confirmed,
            TransactionStatus::Ignored,
        ] {
            assert_eq!(
                TransactionStatus::from_str(status.as_str()).unwrap(),
                status
            );
        }
    }

    #[test]
    fn test_source_kind_round_trip() {
        for source in [
            SourceKind::Sms,
            SourceKind::Notification,
            SourceKind::Manual,
            SourceKind::Bank,
        ] {
            assert_eq!(SourceKind::from_str(source.as_str()).unwrap(), source);
        }
    }
}
