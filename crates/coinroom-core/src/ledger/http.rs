//! Hosted-backend ledger over a PostgREST-style HTTP API.
//!
//! - grant:   `POST {base}/rest/v1/rpc/{grant_function}` with `{"user_id", "amount"}`
//! - balance: `GET  {base}/rest/v1/{profiles_table}?id=eq.{user}&select=coins`
//!
//! Both requests carry the API key as `apikey` and as a bearer token.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use url::Url;

use super::Ledger;
use crate::error::LedgerError;
use crate::identity::UserId;
use crate::storage::LedgerConfig;

pub struct HttpLedger {
    client: Client,
    base_url: Url,
    api_key: String,
    grant_function: String,
    profiles_table: String,
}

impl HttpLedger {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        grant_function: impl Into<String>,
        profiles_table: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LedgerError> {
        if base_url.trim().is_empty() {
            return Err(LedgerError::NotConfigured("ledger.base_url is empty".into()));
        }
        let mut base_url = Url::parse(base_url)
            .map_err(|e| LedgerError::NotConfigured(format!("invalid base url: {e}")))?;
        // Url::join replaces the last segment unless the path ends with '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            api_key: api_key.into(),
            grant_function: grant_function.into(),
            profiles_table: profiles_table.into(),
        })
    }

    pub fn from_config(config: &LedgerConfig, api_key: impl Into<String>) -> Result<Self, LedgerError> {
        Self::new(
            &config.base_url,
            api_key,
            config.grant_function.clone(),
            config.profiles_table.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn endpoint(&self, path: &str) -> Result<Url, LedgerError> {
        self.base_url
            .join(path)
            .map_err(|e| LedgerError::NotConfigured(format!("invalid endpoint '{path}': {e}")))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, LedgerError> {
        let resp = request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LedgerError::Remote {
                status: status.as_u16(),
                body,
            });
        }
        let text = resp.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| LedgerError::InvalidResponse(format!("{e}: {text}")))
    }
}

#[async_trait]
impl Ledger for HttpLedger {
    async fn grant_coins(&self, user_id: &UserId, amount: i64) -> Result<i64, LedgerError> {
        let url = self.endpoint(&format!("rest/v1/rpc/{}", self.grant_function))?;
        let body = json!({ "user_id": user_id.as_str(), "amount": amount });
        let value = self.send(self.client.post(url).json(&body)).await?;
        parse_balance(&value)
            .ok_or_else(|| LedgerError::InvalidResponse(format!("no balance in {value}")))
    }

    async fn fetch_balance(&self, user_id: &UserId) -> Result<i64, LedgerError> {
        let mut url = self.endpoint(&format!("rest/v1/{}", self.profiles_table))?;
        url.query_pairs_mut()
            .append_pair("id", &format!("eq.{user_id}"))
            .append_pair("select", "coins");
        let value = self.send(self.client.get(url)).await?;
        match &value {
            Value::Array(rows) if rows.is_empty() => {
                Err(LedgerError::UnknownUser(user_id.to_string()))
            }
            _ => parse_balance(&value)
                .ok_or_else(|| LedgerError::InvalidResponse(format!("no balance in {value}"))),
        }
    }
}

/// Accepts `11`, `{"coins": 11}`, or a one-row array of either.
fn parse_balance(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::Object(map) => map.get("coins").and_then(Value::as_i64),
        Value::Array(rows) => rows.first().and_then(parse_balance),
        _ => None,
    }
}
