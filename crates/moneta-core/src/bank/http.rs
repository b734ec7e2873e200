//! HTTP implementation of the aggregator client
//!
//! Every outbound call goes through a rate-limit-aware wrapper: HTTP 429 is
//! retried with exponential backoff (1.5s base, up to 3 attempts, doubling
//! each time). Transport-level failures (DNS, TLS, platform security
//! policy) surface as `Error::Transport`, distinct from provider-level
//! rejections which carry the status code and response body.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::RemoteAccount;

use super::types::{
    AccountDetail, AccountList, Aspsp, AspspList, AuthorizationRequest, AuthorizationStarted,
    BalanceEntry, BalancesPage, BankTransaction, SessionCreated, SessionDetail, TransactionsPage,
};
use super::BankApi;

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY_MS: u64 = 1500;

#[derive(Clone)]
pub struct HttpBankApi {
    http_client: Client,
    base_url: String,
    host: String,
}

impl HttpBankApi {
    pub fn new(base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        let host = base_url
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .split('/')
            .next()
            .unwrap_or_default()
            .to_string();
        Self {
            http_client: Client::new(),
            base_url,
            host,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        token: &str,
        body: Option<&Value>,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);

        for attempt in 1..=RETRY_ATTEMPTS {
            let mut request = self
                .http_client
                .request(method.clone(), &url)
                .bearer_auth(token);
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) if e.is_connect() || e.is_timeout() => {
                    return Err(Error::Transport(e.to_string()));
                }
                Err(e) => return Err(Error::Http(e)),
            };

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS && attempt < RETRY_ATTEMPTS {
                warn!(%url, attempt, "rate limited, backing off");
                tokio::time::sleep(delay).await;
                delay *= 2;
                continue;
            }

            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(Error::Provider {
                    status: status.as_u16(),
                    message,
                });
            }

            debug!(%url, %status, "aggregator call ok");
            return Ok(response.json().await?);
        }

        Err(Error::Provider {
            status: 429,
            message: "rate limited after retries".to_string(),
        })
    }
}

#[async_trait]
impl BankApi for HttpBankApi {
    async fn list_aspsps(&self, token: &str, country: Option<&str>) -> Result<Vec<Aspsp>> {
        let path = match country {
            Some(country) => format!("/aspsps?country={}", country),
            None => "/aspsps".to_string(),
        };
        let list: AspspList = self.request_json(Method::GET, &path, token, None).await?;
        Ok(list.aspsps)
    }

    async fn start_authorization(
        &self,
        token: &str,
        request: &AuthorizationRequest,
    ) -> Result<String> {
        let body = serde_json::to_value(request)?;
        let started: AuthorizationStarted = self
            .request_json(Method::POST, "/auth", token, Some(&body))
            .await?;
        Ok(started.url)
    }

    async fn create_session(&self, token: &str, code: &str) -> Result<SessionCreated> {
        let body = serde_json::json!({ "code": code });
        self.request_json(Method::POST, "/sessions", token, Some(&body))
            .await
    }

    async fn fetch_session(&self, token: &str, session_id: &str) -> Result<SessionDetail> {
        self.request_json(
            Method::GET,
            &format!("/sessions/{}", session_id),
            token,
            None,
        )
        .await
    }

    async fn fetch_accounts(&self, token: &str) -> Result<Vec<RemoteAccount>> {
        let list: AccountList = self.request_json(Method::GET, "/accounts", token, None).await?;
        Ok(list.accounts.into_iter().map(RemoteAccount::from).collect())
    }

    async fn fetch_account(&self, token: &str, uid: &str) -> Result<RemoteAccount> {
        let detail: AccountDetail = self
            .request_json(Method::GET, &format!("/accounts/{}", uid), token, None)
            .await?;
        Ok(detail.into())
    }

    async fn fetch_transactions(&self, token: &str, uid: &str) -> Result<Vec<BankTransaction>> {
        // Ask for pending and booked together; some providers reject the
        // filter, in which case an unfiltered fetch is the fallback
        let filtered = self
            .request_json::<TransactionsPage>(
                Method::GET,
                &format!("/accounts/{}/transactions?status=both", uid),
                token,
                None,
            )
            .await;

        match filtered {
            Ok(page) => Ok(page.transactions),
            Err(Error::Provider { status, .. }) if (400..500).contains(&status) && status != 401 => {
                debug!(uid, status, "status filter rejected, refetching unfiltered");
                let page: TransactionsPage = self
                    .request_json(
                        Method::GET,
                        &format!("/accounts/{}/transactions", uid),
                        token,
                        None,
                    )
                    .await?;
                Ok(page.transactions)
            }
            Err(e) => Err(e),
        }
    }

    async fn fetch_balances(&self, token: &str, uid: &str) -> Result<Vec<BalanceEntry>> {
        let page: BalancesPage = self
            .request_json(
                Method::GET,
                &format!("/accounts/{}/balances", uid),
                token,
                None,
            )
            .await?;
        Ok(page.balances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_extraction() {
        let api = HttpBankApi::new("https://api.example.com/v1/");
        assert_eq!(api.host(), "api.example.com");

        let api = HttpBankApi::new("http://localhost:8080");
        assert_eq!(api.host(), "localhost:8080");
    }
}
