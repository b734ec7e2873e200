//! Bank aggregator client abstraction
//!
//! # Architecture
//!
//! - `BankApi` trait: the operations the sync orchestrator needs
//! - `BankClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Implementations: `HttpBankApi` (production), `MockBankApi` (tests)
//!
//! All methods take a pre-signed bearer token so that signing happens once
//! per cycle in the orchestrator, and a signing failure aborts the cycle
//! before any network traffic.

pub mod assertion;
mod http;
mod mock;
pub mod types;

pub use http::HttpBankApi;
pub use mock::MockBankApi;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::RemoteAccount;

use types::{
    Aspsp, AuthorizationRequest, BalanceEntry, BankTransaction, SessionCreated, SessionDetail,
};

#[async_trait]
pub trait BankApi: Send + Sync {
    /// List the institutions the aggregator can reach.
    async fn list_aspsps(&self, token: &str, country: Option<&str>) -> Result<Vec<Aspsp>>;

    /// Begin an authorization; returns the consent URL to open.
    async fn start_authorization(
        &self,
        token: &str,
        request: &AuthorizationRequest,
    ) -> Result<String>;

    /// Exchange an authorization code for a session.
    async fn create_session(&self, token: &str, code: &str) -> Result<SessionCreated>;

    /// Resolve a session to its accounts.
    async fn fetch_session(&self, token: &str, session_id: &str) -> Result<SessionDetail>;

    /// Global account catalogue, when the provider supports it.
    async fn fetch_accounts(&self, token: &str) -> Result<Vec<RemoteAccount>>;

    /// Individual account fetch, used when a session only returns uids.
    async fn fetch_account(&self, token: &str, uid: &str) -> Result<RemoteAccount>;

    /// Pending and booked transactions for an account. Implementations
    /// retry without the status filter when the provider rejects it.
    async fn fetch_transactions(&self, token: &str, uid: &str) -> Result<Vec<BankTransaction>>;

    async fn fetch_balances(&self, token: &str, uid: &str) -> Result<Vec<BalanceEntry>>;
}

/// Concrete bank client enum
///
/// Provides Clone and compile-time dispatch without Box<dyn> overhead.
#[derive(Clone)]
pub enum BankClient {
    Http(HttpBankApi),
    Mock(MockBankApi),
}

impl BankClient {
    pub fn http(base_url: &str) -> Self {
        BankClient::Http(HttpBankApi::new(base_url))
    }

    pub fn mock() -> Self {
        BankClient::Mock(MockBankApi::new())
    }

    /// Host the signed assertion should name as its audience.
    pub fn audience(&self) -> &str {
        match self {
            BankClient::Http(b) => b.host(),
            BankClient::Mock(b) => b.host(),
        }
    }
}

#[async_trait]
impl BankApi for BankClient {
    async fn list_aspsps(&self, token: &str, country: Option<&str>) -> Result<Vec<Aspsp>> {
        match self {
            BankClient::Http(b) => b.list_aspsps(token, country).await,
            BankClient::Mock(b) => b.list_aspsps(token, country).await,
        }
    }

    async fn start_authorization(
        &self,
        token: &str,
        request: &AuthorizationRequest,
    ) -> Result<String> {
        match self {
            BankClient::Http(b) => b.start_authorization(token, request).await,
            BankClient::Mock(b) => b.start_authorization(token, request).await,
        }
    }

    async fn create_session(&self, token: &str, code: &str) -> Result<SessionCreated> {
        match self {
            BankClient::Http(b) => b.create_session(token, code).await,
            BankClient::Mock(b) => b.create_session(token, code).await,
        }
    }

    async fn fetch_session(&self, token: &str, session_id: &str) -> Result<SessionDetail> {
        match self {
            BankClient::Http(b) => b.fetch_session(token, session_id).await,
            BankClient::Mock(b) => b.fetch_session(token, session_id).await,
        }
    }

    async fn fetch_accounts(&self, token: &str) -> Result<Vec<RemoteAccount>> {
        match self {
            BankClient::Http(b) => b.fetch_accounts(token).await,
            BankClient::Mock(b) => b.fetch_accounts(token).await,
        }
    }

    async fn fetch_account(&self, token: &str, uid: &str) -> Result<RemoteAccount> {
        match self {
            BankClient::Http(b) => b.fetch_account(token, uid).await,
            BankClient::Mock(b) => b.fetch_account(token, uid).await,
        }
    }

    async fn fetch_transactions(&self, token: &str, uid: &str) -> Result<Vec<BankTransaction>> {
        match self {
            BankClient::Http(b) => b.fetch_transactions(token, uid).await,
            BankClient::Mock(b) => b.fetch_transactions(token, uid).await,
        }
    }

    async fn fetch_balances(&self, token: &str, uid: &str) -> Result<Vec<BalanceEntry>> {
        match self {
            BankClient::Http(b) => b.fetch_balances(token, uid).await,
            BankClient::Mock(b) => b.fetch_balances(token, uid).await,
        }
    }
}
