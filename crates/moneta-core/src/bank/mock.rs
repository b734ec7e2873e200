//! Mock aggregator for testing
//!
//! Scriptable fixture client: tests register sessions, per-account
//! transactions and balances up front, then drive the sync orchestrator
//! against it without any network traffic.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::RemoteAccount;

use super::types::{
    Aspsp, AuthorizationRequest, BalanceEntry, BankTransaction, SessionAccount, SessionCreated,
    SessionDetail,
};
use super::BankApi;

#[derive(Default)]
struct State {
    aspsps: Vec<Aspsp>,
    catalogue: Vec<RemoteAccount>,
    sessions: HashMap<String, ScriptedSession>,
    transactions: HashMap<String, Vec<BankTransaction>>,
    balances: HashMap<String, Vec<BalanceEntry>>,
    balance_failures: HashSet<String>,
    latency: Option<Duration>,
}

struct ScriptedSession {
    accounts: Vec<RemoteAccount>,
    expired: bool,
}

/// Mock bank client for testing
///
/// Clones share state, so a clone handed to the orchestrator can still be
/// re-scripted from the test body.
#[derive(Clone, Default)]
pub struct MockBankApi {
    state: Arc<Mutex<State>>,
}

impl MockBankApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(&self) -> &str {
        "mock.bank.test"
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_aspsps(&self, aspsps: Vec<Aspsp>) {
        self.lock().aspsps = aspsps;
    }

    pub fn set_catalogue(&self, accounts: Vec<RemoteAccount>) {
        self.lock().catalogue = accounts;
    }

    pub fn add_session(&self, session_id: &str, accounts: Vec<RemoteAccount>) {
        self.lock().sessions.insert(
            session_id.to_string(),
            ScriptedSession {
                accounts,
                expired: false,
            },
        );
    }

    /// Make `fetch_session` answer 401 for this session from now on.
    pub fn expire_session(&self, session_id: &str) {
        if let Some(session) = self.lock().sessions.get_mut(session_id) {
            session.expired = true;
        }
    }

    pub fn set_transactions(&self, uid: &str, transactions: Vec<BankTransaction>) {
        self.lock().transactions.insert(uid.to_string(), transactions);
    }

    pub fn set_balances(&self, uid: &str, balances: Vec<BalanceEntry>) {
        self.lock().balances.insert(uid.to_string(), balances);
    }

    /// Make `fetch_balances` answer 500 for this account.
    pub fn fail_balances(&self, uid: &str) {
        self.lock().balance_failures.insert(uid.to_string());
    }

    /// Delay session fetches, so a test can hold one caller mid-cycle
    /// while another starts.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = Some(latency);
    }

    async fn apply_latency(&self) {
        let latency = self.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl BankApi for MockBankApi {
    async fn list_aspsps(&self, _token: &str, country: Option<&str>) -> Result<Vec<Aspsp>> {
        let aspsps = self.lock().aspsps.clone();
        Ok(match country {
            Some(country) => aspsps
                .into_iter()
                .filter(|a| a.country.as_deref() == Some(country))
                .collect(),
            None => aspsps,
        })
    }

    async fn start_authorization(
        &self,
        _token: &str,
        request: &AuthorizationRequest,
    ) -> Result<String> {
        Ok(format!(
            "https://mock.bank.test/consent?state={}",
            request.state
        ))
    }

    async fn create_session(&self, _token: &str, code: &str) -> Result<SessionCreated> {
        let session_id = format!("session-{}", code);
        self.lock().sessions.entry(session_id.clone()).or_insert(
            ScriptedSession {
                accounts: Vec::new(),
                expired: false,
            },
        );
        Ok(SessionCreated {
            session_id,
            accounts: Vec::new(),
        })
    }

    async fn fetch_session(&self, _token: &str, session_id: &str) -> Result<SessionDetail> {
        self.apply_latency().await;
        let state = self.lock();
        let session = state
            .sessions
            .get(session_id)
            .ok_or_else(|| Error::NotFound(format!("session {}", session_id)))?;
        if session.expired {
            return Err(Error::Provider {
                status: 401,
                message: "session expired".to_string(),
            });
        }
        Ok(SessionDetail {
            accounts_data: Some(
                session
                    .accounts
                    .iter()
                    .map(|a| SessionAccount {
                        uid: a.uid.clone(),
                        name: Some(a.name.clone()),
                        aspsp: a.aspsp_name.clone(),
                    })
                    .collect(),
            ),
            accounts: None,
        })
    }

    async fn fetch_accounts(&self, _token: &str) -> Result<Vec<RemoteAccount>> {
        Ok(self.lock().catalogue.clone())
    }

    async fn fetch_account(&self, _token: &str, uid: &str) -> Result<RemoteAccount> {
        self.lock()
            .catalogue
            .iter()
            .find(|a| a.uid == uid)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("account {}", uid)))
    }

    async fn fetch_transactions(&self, _token: &str, uid: &str) -> Result<Vec<BankTransaction>> {
        Ok(self.lock().transactions.get(uid).cloned().unwrap_or_default())
    }

    async fn fetch_balances(&self, _token: &str, uid: &str) -> Result<Vec<BalanceEntry>> {
        let state = self.lock();
        if state.balance_failures.contains(uid) {
            return Err(Error::Provider {
                status: 500,
                message: "balance service unavailable".to_string(),
            });
        }
        Ok(state.balances.get(uid).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_session_round_trip() {
        let mock = MockBankApi::new();
        mock.add_session(
            "s1",
            vec![RemoteAccount {
                uid: "uid-1".to_string(),
                name: "Main".to_string(),
                aspsp_name: Some("Revolut".to_string()),
            }],
        );

        let detail = mock.fetch_session("tok", "s1").await.unwrap();
        let accounts = detail.full_accounts();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].uid, "uid-1");
    }

    #[tokio::test]
    async fn test_expired_session_answers_401() {
        let mock = MockBankApi::new();
        mock.add_session("s1", vec![]);
        mock.expire_session("s1");

        let err = mock.fetch_session("tok", "s1").await.unwrap_err();
        assert!(err.is_status(401));
    }

    #[tokio::test]
    async fn test_unknown_account_is_not_found() {
        let mock = MockBankApi::new();
        assert!(mock.fetch_account("tok", "ghost").await.is_err());
        assert!(mock.fetch_transactions("tok", "ghost").await.unwrap().is_empty());
    }
}
