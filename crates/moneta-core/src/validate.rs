//! Candidate validation
//!
//! Validation flags suspicious candidates, it never rejects them. The
//! warnings are stored with the transaction so the UI can surface them at
//! confirmation time and audits can see why a transaction was flagged.

use crate::models::{Candidate, TransactionKind};

/// Thresholds and word lists for the validator
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Amounts above this are flagged regardless of category
    pub high_amount: f64,
    /// Categories too vague to trust without a second look
    pub generic_categories: Vec<String>,
    /// Generic-category warning only fires above this amount
    pub generic_min_amount: f64,
    /// Wording that suggests an internal transfer misfiled as an expense
    pub transfer_keywords: Vec<String>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            high_amount: 1000.0,
            generic_categories: vec![
                "other".to_string(),
                "altro".to_string(),
                "misc".to_string(),
                "uncategorized".to_string(),
            ],
            generic_min_amount: 50.0,
            transfer_keywords: vec![
                "transfer".to_string(),
                "giroconto".to_string(),
                "bonifico".to_string(),
                "own account".to_string(),
                "ricarica".to_string(),
            ],
        }
    }
}

/// Produce the ordered warning list for a candidate.
///
/// Pure over the candidate; never mutates amount or kind.
pub fn validate(candidate: &Candidate, config: &ValidatorConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if candidate.amount > config.high_amount {
        warnings.push(format!(
            "High amount: {:.2} exceeds {:.2}",
            candidate.amount, config.high_amount
        ));
    }

    if candidate.amount == 0.0 {
        warnings.push("Zero amount".to_string());
    }

    if let Some(category) = &candidate.category {
        let category_lower = category.to_lowercase();
        if config
            .generic_categories
            .iter()
            .any(|g| g.as_str() == category_lower)
            && candidate.amount > config.generic_min_amount
        {
            warnings.push(format!(
                "Generic category '{}' on an amount over {:.2}",
                category, config.generic_min_amount
            ));
        }
    }

    if candidate.description.trim().len() < 3 {
        warnings.push("Description too short".to_string());
    }

    if candidate.kind == TransactionKind::Expense {
        let description_lower = candidate.description.to_lowercase();
        if let Some(keyword) = config
            .transfer_keywords
            .iter()
            .find(|k| description_lower.contains(k.as_str()))
        {
            warnings.push(format!(
                "Expense wording suggests an internal transfer ('{}')",
                keyword
            ));
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceKind;
    use chrono::NaiveDate;

    fn candidate(kind: TransactionKind, amount: f64, description: &str) -> Candidate {
        Candidate {
            kind,
            amount,
            description: description.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            account: "checking".to_string(),
            to_account: None,
            category: None,
            source: SourceKind::Sms,
            source_app: None,
            bank_transaction_id: None,
        }
    }

    #[test]
    fn test_clean_candidate_has_no_warnings() {
        let c = candidate(TransactionKind::Expense, 12.5, "Groceries at Esselunga");
        assert!(validate(&c, &ValidatorConfig::default()).is_empty());
    }

    #[test]
    fn test_high_amount_flagged() {
        let c = candidate(TransactionKind::Expense, 1500.0, "New laptop");
        let warnings = validate(&c, &ValidatorConfig::default());
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("High amount"));
    }

    #[test]
    fn test_zero_amount_flagged() {
        let c = candidate(TransactionKind::Expense, 0.0, "Something");
        let warnings = validate(&c, &ValidatorConfig::default());
        assert!(warnings.iter().any(|w| w == "Zero amount"));
    }

    #[test]
    fn test_generic_category_over_threshold() {
        let mut c = candidate(TransactionKind::Expense, 75.0, "Card payment");
        c.category = Some("Other".to_string());
        let warnings = validate(&c, &ValidatorConfig::default());
        assert!(warnings.iter().any(|w| w.contains("Generic category")));

        // Below the minor threshold the same category passes
        c.amount = 20.0;
        assert!(validate(&c, &ValidatorConfig::default()).is_empty());
    }

    #[test]
    fn test_short_description_flagged() {
        let c = candidate(TransactionKind::Expense, 10.0, "ab");
        let warnings = validate(&c, &ValidatorConfig::default());
        assert!(warnings.iter().any(|w| w.contains("too short")));
    }

    #[test]
    fn test_transfer_wording_on_expense() {
        let c = candidate(TransactionKind::Expense, 200.0, "Giroconto verso risparmi");
        let warnings = validate(&c, &ValidatorConfig::default());
        assert!(warnings.iter().any(|w| w.contains("internal transfer")));

        // Same wording on an actual transfer is fine
        let c = candidate(TransactionKind::Transfer, 200.0, "Giroconto verso risparmi");
        assert!(validate(&c, &ValidatorConfig::default()).is_empty());
    }

    #[test]
    fn test_warnings_are_ordered() {
        let mut c = candidate(TransactionKind::Expense, 2000.0, "tr");
        c.category = Some("misc".to_string());
        let warnings = validate(&c, &ValidatorConfig::default());
        assert!(warnings[0].contains("High amount"));
        assert!(warnings[1].contains("Generic category"));
        assert!(warnings[2].contains("too short"));
    }
}
