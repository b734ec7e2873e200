//! Pattern extraction engine for device text signals
//!
//! Each provider (bank sender id, notification source app) gets a rule set:
//! an identifier matched as a case-insensitive substring of the sender, and
//! ordered regex families for expense, income and transfer messages. The
//! first rule set whose identifier matches the sender is used; within it the
//! first matching pattern wins. There is no scoring and no fallback across
//! rule sets: an unmatched message is "unrecognized", not an error.
//!
//! Patterns capture named groups: `amount` plus `desc` (counterparty), or
//! `amount` plus `to` for transfers. Amounts go through the locale
//! normalizer; an unreliable amount routes the whole extraction to
//! unrecognized so zero-amount entries never reach the store.

use chrono::{DateTime, NaiveDate};
use regex::Regex;
use tracing::debug;

use crate::amount::{parse_reliable, DotPolicy};
use crate::error::{Error, Result};
use crate::models::TransactionKind;

/// What a rule set pulled out of a message body
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub kind: TransactionKind,
    pub amount: f64,
    pub description: String,
    /// Destination captured by a transfer pattern
    pub to_account: Option<String>,
    pub date: NaiveDate,
}

/// Extraction rules for one provider
#[derive(Debug)]
pub struct RuleSet {
    /// Substring matched case-insensitively against the sender/source field
    identifier: String,
    expense: Vec<Regex>,
    income: Vec<Regex>,
    transfer: Vec<Regex>,
}

impl RuleSet {
    pub fn new(identifier: &str) -> Self {
        Self {
            identifier: identifier.to_lowercase(),
            expense: Vec::new(),
            income: Vec::new(),
            transfer: Vec::new(),
        }
    }

    /// Add an expense pattern; must capture `amount` and `desc`.
    pub fn expense(mut self, pattern: &str) -> Result<Self> {
        self.expense.push(compile(pattern, &["amount", "desc"])?);
        Ok(self)
    }

    /// Add an income pattern; must capture `amount` and `desc`.
    pub fn income(mut self, pattern: &str) -> Result<Self> {
        self.income.push(compile(pattern, &["amount", "desc"])?);
        Ok(self)
    }

    /// Add a transfer pattern; must capture `amount` and `to`.
    pub fn transfer(mut self, pattern: &str) -> Result<Self> {
        self.transfer.push(compile(pattern, &["amount", "to"])?);
        Ok(self)
    }

    fn matches_sender(&self, sender: &str) -> bool {
        sender.to_lowercase().contains(&self.identifier)
    }
}

fn compile(pattern: &str, required_groups: &[&str]) -> Result<Regex> {
    let regex = Regex::new(pattern)?;
    for group in required_groups {
        if !regex.capture_names().flatten().any(|name| name == *group) {
            return Err(Error::Config(format!(
                "Pattern '{}' is missing required capture group '{}'",
                pattern, group
            )));
        }
    }
    Ok(regex)
}

/// Registry of rule sets with open registration
#[derive(Debug, Default)]
pub struct PatternLibrary {
    rule_sets: Vec<RuleSet>,
    dot_policy: DotPolicy,
}

impl PatternLibrary {
    /// Empty library; register rule sets with [`PatternLibrary::register`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Library preloaded with the built-in European provider rule sets.
    pub fn builtin() -> Result<Self> {
        let mut library = Self::new();
        for rule_set in builtin_rule_sets()? {
            library.register(rule_set);
        }
        Ok(library)
    }

    pub fn with_dot_policy(mut self, policy: DotPolicy) -> Self {
        self.dot_policy = policy;
        self
    }

    /// Register a rule set. Later registrations are tried after earlier
    /// ones, so more specific identifiers should be registered first.
    pub fn register(&mut self, rule_set: RuleSet) {
        self.rule_sets.push(rule_set);
    }

    pub fn len(&self) -> usize {
        self.rule_sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rule_sets.is_empty()
    }

    /// Extract a transaction from a raw message.
    ///
    /// `timestamp_millis` is the source-provided epoch timestamp; only its
    /// calendar date is kept. Returns `None` for unrecognized input.
    pub fn extract(&self, sender: &str, body: &str, timestamp_millis: i64) -> Option<Extraction> {
        let rule_set = self.rule_sets.iter().find(|r| r.matches_sender(sender))?;
        let date = DateTime::from_timestamp_millis(timestamp_millis)?.date_naive();

        // Matching order is expense -> income -> transfer
        for (kind, patterns, counterparty_group) in [
            (TransactionKind::Expense, &rule_set.expense, "desc"),
            (TransactionKind::Income, &rule_set.income, "desc"),
            (TransactionKind::Transfer, &rule_set.transfer, "to"),
        ] {
            for pattern in patterns {
                let Some(captures) = pattern.captures(body) else {
                    continue;
                };
                let amount_token = captures.name("amount")?.as_str();
                let Some(amount) = parse_reliable(amount_token, self.dot_policy) else {
                    // Unreliable amount: treat the whole message as
                    // unrecognized rather than minting a zero entry
                    debug!(sender, amount_token, "unreliable amount, dropping extraction");
                    return None;
                };
                let counterparty = captures
                    .name(counterparty_group)
                    .map(|m| m.as_str().trim().to_string())
                    .unwrap_or_default();

                let (description, to_account) = match kind {
                    TransactionKind::Transfer => {
                        (format!("Transfer to {}", counterparty), Some(counterparty))
                    }
                    _ => (counterparty, None),
                };

                return Some(Extraction {
                    kind,
                    amount: amount.abs(),
                    description,
                    to_account,
                    date,
                });
            }
        }

        None
    }
}

/// Rule sets for the providers we ship support for out of the box.
///
/// Kept as data so new providers can be added by registration without
/// touching the engine.
fn builtin_rule_sets() -> Result<Vec<RuleSet>> {
    Ok(vec![
        RuleSet::new("revolut")
            .expense(r"(?i)hai speso\s+(?P<amount>[\d.,]+)\s*€?\s+presso\s+(?P<desc>.+?)\.?\s*$")?
            .expense(r"(?i)pagamento di\s+(?P<amount>[\d.,]+)\s*€?\s+a\s+(?P<desc>.+?)\.?\s*$")?
            .income(r"(?i)hai ricevuto\s+(?P<amount>[\d.,]+)\s*€?\s+da\s+(?P<desc>.+?)\.?\s*$")?
            .transfer(r"(?i)hai trasferito\s+(?P<amount>[\d.,]+)\s*€?\s+a\s+(?P<to>.+?)\.?\s*$")?,
        RuleSet::new("intesa")
            .expense(
                r"(?i)pagamento (?:di|carta) (?:EUR\s*)?(?P<amount>[\d.,]+)(?:\s*EUR)?\s+(?:presso|su)\s+(?P<desc>.+?)\.?\s*$",
            )?
            .expense(r"(?i)addebito (?:di )?(?:EUR\s*)?(?P<amount>[\d.,]+)\s+per\s+(?P<desc>.+?)\.?\s*$")?
            .income(r"(?i)accredito (?:di )?(?:EUR\s*)?(?P<amount>[\d.,]+)\s+da\s+(?P<desc>.+?)\.?\s*$")?
            .transfer(r"(?i)bonifico (?:di )?(?:EUR\s*)?(?P<amount>[\d.,]+)\s+a favore di\s+(?P<to>.+?)\.?\s*$")?,
        RuleSet::new("paypal")
            .expense(r"(?i)hai inviato\s+€?\s*(?P<amount>[\d.,]+)\s*(?:EUR)?\s+a\s+(?P<desc>.+?)\.?\s*$")?
            .expense(r"(?i)you sent\s+\$?€?\s*(?P<amount>[\d.,]+)\s*(?:EUR|USD)?\s+to\s+(?P<desc>.+?)\.?\s*$")?
            .income(r"(?i)hai ricevuto\s+€?\s*(?P<amount>[\d.,]+)\s*(?:EUR)?\s+da\s+(?P<desc>.+?)\.?\s*$")?,
        RuleSet::new("poste")
            .expense(
                r"(?i)pagamento di\s+(?P<amount>[\d.,]+)\s*(?:EUR|€)?\s+(?:effettuato )?presso\s+(?P<desc>.+?)\.?\s*$",
            )?
            .income(r"(?i)accredito di\s+(?P<amount>[\d.,]+)\s*(?:EUR|€)?\s+da\s+(?P<desc>.+?)\.?\s*$")?,
        RuleSet::new("n26")
            .expense(
                r"(?i)(?:hai autorizzato un )?pagamento di\s+(?P<amount>[\d.,]+)\s*€?\s+presso\s+(?P<desc>.+?)\.?\s*$",
            )?
            .income(r"(?i)hai ricevuto\s+(?P<amount>[\d.,]+)\s*€?\s+da\s+(?P<desc>.+?)\.?\s*$")?,
    ])
}
