//! Provider payload shapes
//!
//! The aggregator surfaces several generations of payload field names
//! (camelCase vs snake_case, `transactionAmount` objects vs bare `amount`
//! numbers). Everything is decoded into explicit optional-field structs with
//! serde aliases, and nested numeric values are extracted by walking a fixed
//! set of field-name aliases to a bounded depth.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::amount::{normalize_token, DotPolicy};
use crate::models::RemoteAccount;

/// An institution listed by the aggregator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Aspsp {
    pub name: String,
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AspspList {
    #[serde(default)]
    pub aspsps: Vec<Aspsp>,
}

/// Body for POST /auth
#[derive(Debug, Serialize)]
pub struct AuthorizationRequest {
    pub aspsp: Aspsp,
    pub redirect_url: String,
    pub state: String,
    pub access: AccessScope,
}

#[derive(Debug, Serialize)]
pub struct AccessScope {
    pub valid_until: String,
    pub balances: bool,
    pub transactions: bool,
}

#[derive(Debug, Deserialize)]
pub struct AuthorizationStarted {
    pub url: String,
}

/// Response to POST /sessions
#[derive(Debug, Deserialize)]
pub struct SessionCreated {
    pub session_id: String,
    #[serde(default)]
    pub accounts: Vec<Value>,
}

/// Response to GET /sessions/{id}
///
/// Newer payloads carry full account objects in `accounts_data`; older ones
/// only list identifiers under `accounts`.
#[derive(Debug, Default, Deserialize)]
pub struct SessionDetail {
    #[serde(default)]
    pub accounts_data: Option<Vec<SessionAccount>>,
    #[serde(default)]
    pub accounts: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionAccount {
    #[serde(alias = "account_id", alias = "id")]
    pub uid: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "aspsp_name", alias = "aspspName")]
    pub aspsp: Option<String>,
}

impl SessionDetail {
    /// Full account descriptors, when the payload carries them.
    pub fn full_accounts(&self) -> Vec<RemoteAccount> {
        self.accounts_data
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|a| RemoteAccount {
                uid: a.uid.clone(),
                name: a.name.clone().unwrap_or_else(|| a.uid.clone()),
                aspsp_name: a.aspsp.clone(),
            })
            .collect()
    }

    /// Bare account identifiers, for payloads that only list uids (entries
    /// may be plain strings or objects carrying a uid field).
    pub fn account_uids(&self) -> Vec<String> {
        self.accounts
            .as_deref()
            .unwrap_or_default()
            .iter()
            .filter_map(|v| match v {
                Value::String(uid) => Some(uid.clone()),
                Value::Object(map) => ["uid", "account_id", "id"]
                    .iter()
                    .find_map(|k| map.get(*k))
                    .and_then(|v| v.as_str())
                    .map(String::from),
                _ => None,
            })
            .collect()
    }
}

/// Response to GET /accounts
#[derive(Debug, Deserialize)]
pub struct AccountList {
    #[serde(default)]
    pub accounts: Vec<AccountDetail>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountDetail {
    #[serde(alias = "account_id", alias = "id")]
    pub uid: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "product")]
    pub product_name: Option<String>,
    #[serde(default, alias = "aspsp_name", alias = "aspspName")]
    pub aspsp: Option<String>,
}

impl From<AccountDetail> for RemoteAccount {
    fn from(detail: AccountDetail) -> Self {
        let name = detail
            .name
            .or(detail.product_name)
            .unwrap_or_else(|| detail.uid.clone());
        RemoteAccount {
            uid: detail.uid,
            name,
            aspsp_name: detail.aspsp,
        }
    }
}

/// Response to GET /accounts/{uid}/transactions
#[derive(Debug, Deserialize)]
pub struct TransactionsPage {
    #[serde(default)]
    pub transactions: Vec<BankTransaction>,
}

/// A transaction as reported by the provider
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BankTransaction {
    #[serde(default, alias = "transactionAmount", alias = "transaction_amount")]
    pub amount: Option<Value>,
    #[serde(default, alias = "bookingDate", alias = "booking_date")]
    pub booking_date: Option<String>,
    #[serde(default, alias = "valueDate", alias = "value_date")]
    pub value_date: Option<String>,
    #[serde(
        default,
        alias = "remittanceInformationUnstructured",
        alias = "remittance_information_unstructured"
    )]
    pub description: Option<String>,
    #[serde(default, alias = "entryReference", alias = "entry_reference")]
    pub entry_reference: Option<String>,
    #[serde(default, alias = "transactionId", alias = "transaction_id")]
    pub transaction_id: Option<String>,
    #[serde(default, alias = "endToEndId", alias = "end_to_end_id")]
    pub end_to_end_id: Option<String>,
}

impl BankTransaction {
    /// Signed amount; sign decides expense vs income.
    pub fn signed_amount(&self, policy: DotPolicy) -> Option<f64> {
        self.amount.as_ref().and_then(|v| extract_numeric(v, policy, 0))
    }

    /// Provider-assigned reference, in order of stability.
    pub fn reference_id(&self) -> Option<&str> {
        self.entry_reference
            .as_deref()
            .or(self.transaction_id.as_deref())
            .or(self.end_to_end_id.as_deref())
            .filter(|s| !s.is_empty())
    }

    pub fn date_str(&self) -> Option<&str> {
        self.booking_date.as_deref().or(self.value_date.as_deref())
    }
}

/// Response to GET /accounts/{uid}/balances
#[derive(Debug, Deserialize)]
pub struct BalancesPage {
    #[serde(default)]
    pub balances: Vec<BalanceEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BalanceEntry {
    #[serde(default, alias = "balanceType", alias = "balance_type")]
    pub balance_type: Option<String>,
    #[serde(default, alias = "balanceAmount", alias = "balance_amount", alias = "value")]
    pub amount: Option<Value>,
}

impl BalanceEntry {
    pub fn numeric_amount(&self, policy: DotPolicy) -> Option<f64> {
        self.amount.as_ref().and_then(|v| extract_numeric(v, policy, 0))
    }
}

/// Semantic balance types in preference order. Matching is done by prefix
/// on the lowercased type with separators removed, so `interimAvailable`,
/// `interim_available` and `INTERIM-AVAILABLE` all hit the same slot, and
/// the last slot covers both `information` and `informational`.
pub const BALANCE_TYPE_PRIORITY: [&str; 7] = [
    "interimavailable",
    "closingavailable",
    "interimbooked",
    "closingbooked",
    "expected",
    "openingbooked",
    "information",
];

/// Pick the balance entry to trust: first priority type present, falling
/// back to the first entry at all.
pub fn preferred_balance(entries: &[BalanceEntry]) -> Option<&BalanceEntry> {
    for wanted in BALANCE_TYPE_PRIORITY {
        if let Some(entry) = entries.iter().find(|e| {
            e.balance_type
                .as_deref()
                .map(normalize_balance_type)
                .is_some_and(|t| t.starts_with(wanted))
        }) {
            return Some(entry);
        }
    }
    entries.first()
}

fn normalize_balance_type(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

/// Field names that can hold the actual number inside a nested amount value
const NUMERIC_ALIASES: [&str; 6] = ["amount", "value", "balanceAmount", "balance_amount", "content", "sum"];

/// Maximum nesting the alias walk will follow
const MAX_NUMERIC_DEPTH: u8 = 4;

/// Pull a decimal out of a possibly-nested provider value.
///
/// Accepts bare numbers, numeric strings in either locale, and objects
/// whose amount hides under one of the known aliases, up to a fixed depth.
pub fn extract_numeric(value: &Value, policy: DotPolicy, depth: u8) -> Option<f64> {
    if depth > MAX_NUMERIC_DEPTH {
        return None;
    }
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => normalize_token(s, policy),
        Value::Object(map) => NUMERIC_ALIASES
            .iter()
            .find_map(|k| map.get(*k).and_then(|v| extract_numeric(v, policy, depth + 1))),
        _ => None,
    }
}
