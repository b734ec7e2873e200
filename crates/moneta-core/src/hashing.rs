//! Idempotency hashing for duplicate suppression
//!
//! Every candidate gets a deterministic identity before persistence. When
//! the provider assigns a transaction id we hash only that, because the id
//! is stable across the pending -> booked transition while amount and date
//! can jitter. Otherwise the hash covers the fields a human would use to
//! recognize the same transaction: amount, date, account and a normalized
//! description.

use chrono::NaiveDate;
use sha2::{Digest, Sha256};

use crate::models::Candidate;

/// Hash for a provider-assigned transaction id.
pub fn bank_hash(bank_transaction_id: &str) -> String {
    digest(&format!("bank-{}", bank_transaction_id))
}

/// Content hash over the recognizable fields.
///
/// Cosmetically different merchant strings may collide after
/// normalization; that is accepted by design, a false duplicate is cheaper
/// than a false double entry.
pub fn content_hash(amount: f64, date: NaiveDate, account: &str, description: &str) -> String {
    digest(&format!(
        "{:.2}-{}-{}-{}",
        amount,
        date,
        account,
        normalize_description(description)
    ))
}

/// Identity for a candidate: the bank-id hash when available, the content
/// hash otherwise.
pub fn source_hash(candidate: &Candidate) -> String {
    match candidate.bank_transaction_id.as_deref() {
        Some(id) if !id.is_empty() => bank_hash(id),
        _ => legacy_hash(candidate),
    }
}

/// Content hash for a candidate, ignoring any bank id.
///
/// Used as a second duplicate lookup for id-carrying candidates: the same
/// real-world transaction may already be stored under the content hash from
/// before the provider started supplying ids.
pub fn legacy_hash(candidate: &Candidate) -> String {
    content_hash(
        candidate.amount,
        candidate.date,
        &candidate.account,
        &candidate.description,
    )
}

/// Lowercase and strip whitespace and non-word characters.
fn normalize_description(description: &str) -> String {
    description
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect()
}

fn digest(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SourceKind, TransactionKind};

    fn candidate(amount: f64, description: &str, bank_id: Option<&str>) -> Candidate {
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

    #[test]
    fn test_bank_id_hash_ignores_content_jitter() {
        // Pending vs booked: amount precision and description cosmetics
        // shift, the provider id does not
        let pending = candidate(12.5, "AMAZON *PENDING", Some("abc123"));
        let booked = candidate(12.50, "Amazon EU Sarl", Some("abc123"));
        assert_eq!(source_hash(&pending), source_hash(&booked));
    }

    #[test]
    fn test_content_hash_is_deterministic() {
        let a = candidate(9.99, "Spotify", None);
        let b = candidate(9.99, "Spotify", None);
        assert_eq!(source_hash(&a), source_hash(&b));
    }

    #[test]
    fn test_content_hash_normalizes_description() {
        let a = candidate(9.99, "  SPOTIFY - P2958 ", None);
        let b = candidate(9.99, "spotify p2958", None);
        assert_eq!(source_hash(&a), source_hash(&b));
    }

    #[test]
    fn test_different_amounts_differ() {
        let a = candidate(9.99, "Spotify", None);
        let b = candidate(10.99, "Spotify", None);
        assert_ne!(source_hash(&a), source_hash(&b));
    }

    #[test]
    fn test_legacy_hash_matches_id_free_identity() {
        let without_id = candidate(12.5, "Amazon", None);
        let with_id = candidate(12.5, "Amazon", Some("abc123"));
        assert_eq!(source_hash(&without_id), legacy_hash(&with_id));
        assert_ne!(source_hash(&with_id), legacy_hash(&with_id));
    }

    #[test]
    fn test_empty_bank_id_falls_back_to_content() {
        let a = candidate(12.5, "Amazon", Some(""));
        let b = candidate(12.5, "Amazon", None);
        assert_eq!(source_hash(&a), source_hash(&b));
    }
}
