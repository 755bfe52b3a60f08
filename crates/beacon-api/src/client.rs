//! HTTP pull client for the incident list and the liveness endpoint.
//!
//! The pull path is the authoritative fallback for the push channel: the
//! resync scheduler calls [`IncidentClient::get_incidents`] on a steady
//! cadence and whenever drift is suspected. Every call takes a
//! [`CancellationToken`] so a newer request can supersede an older one.

use std::time::Duration;

use reqwest::{RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;

const INCIDENTS_PATH: &str = "api/incidents";
const HEALTH_PATH: &str = "api/health";

// ── Query / page types ───────────────────────────────────────────────

/// Server-side filter for the incident list endpoint.
///
/// Values are the wire spellings (`"REPORTED"`, `"CRITICAL"`, ...). Empty
/// sets mean "no restriction" for that dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentQuery {
    pub statuses: Vec<String>,
    pub priorities: Vec<String>,
    pub types: Vec<String>,
    pub include_closed: bool,
    pub page: u32,
    pub limit: u32,
}

impl IncidentQuery {
    /// Render as URL query pairs. Multi-valued sets are comma-joined.
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if !self.statuses.is_empty() {
            pairs.push(("status", self.statuses.join(",")));
        }
        if !self.priorities.is_empty() {
            pairs.push(("priority", self.priorities.join(",")));
        }
        if !self.types.is_empty() {
            pairs.push(("type", self.types.join(",")));
        }
        pairs.push(("includeClosed", self.include_closed.to_string()));
        if self.page > 0 {
            pairs.push(("page", self.page.to_string()));
        }
        if self.limit > 0 {
            pairs.push(("limit", self.limit.to_string()));
        }
        pairs
    }
}

/// One page of the incident list, exactly as the server returns it.
///
/// Records stay as raw JSON here; `beacon-core` owns the domain mapping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentPage {
    #[serde(default)]
    pub data: Vec<serde_json::Value>,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub total_pages: u32,
}

// ── IncidentClient ───────────────────────────────────────────────────

/// Pull-query client. Cheap to clone (the inner `reqwest::Client` is `Arc`ed).
#[derive(Debug, Clone)]
pub struct IncidentClient {
    http: reqwest::Client,
    base_url: Url,
    token: Option<SecretString>,
}

impl IncidentClient {
    /// Build a client with its own connection pool and request timeout.
    pub fn new(base_url: Url, token: Option<SecretString>, timeout: Duration) -> Result<Self, Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(http, base_url, token))
    }

    /// Wrap an existing `reqwest::Client` (used by tests and callers that
    /// share a pool).
    pub fn with_client(http: reqwest::Client, base_url: Url, token: Option<SecretString>) -> Self {
        Self {
            http,
            base_url: with_trailing_slash(base_url),
            token,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Fetch one page of incidents matching `query`.
    ///
    /// Resolves to [`Error::Aborted`] as soon as `cancel` fires, dropping
    /// the in-flight HTTP request.
    pub async fn get_incidents(
        &self,
        query: &IncidentQuery,
        cancel: &CancellationToken,
    ) -> Result<IncidentPage, Error> {
        let url = self.base_url.join(INCIDENTS_PATH)?;
        let request = self.authorized(self.http.get(url)).query(&query.to_pairs());

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(Error::Aborted),
            result = send_json::<IncidentPage>(request) => result,
        }
    }

    /// Short-timeout liveness check against the health endpoint.
    ///
    /// `Ok(false)` means the server answered but reported itself unhealthy;
    /// transport failures and timeouts are returned as errors.
    pub async fn ping(&self, timeout: Duration) -> Result<bool, Error> {
        let url = self.base_url.join(HEALTH_PATH)?;
        let request = self.http.get(url).timeout(timeout);

        let response = tokio::time::timeout(timeout, request.send())
            .await
            .map_err(|_| Error::Timeout {
                timeout_ms: duration_ms(timeout),
            })??;

        Ok(response.status().is_success())
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, Error> {
    let response = request.send().await?;
    let status = response.status();

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(Error::Authentication {
            message: format!("server rejected token (HTTP {})", status.as_u16()),
        });
    }

    let body = response.text().await?;
    if !status.is_success() {
        return Err(Error::Status {
            status: status.as_u16(),
            message: body,
        });
    }

    serde_json::from_str(&body).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body,
    })
}

/// `Url::join` replaces the last path segment unless the base ends in `/`.
fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

pub(crate) fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn query_pairs_join_sets_and_skip_empty() {
        let query = IncidentQuery {
            statuses: vec!["REPORTED".into(), "DISPATCHED".into()],
            priorities: Vec::new(),
            types: vec!["FIRE".into()],
            include_closed: false,
            page: 1,
            limit: 50,
        };

        let pairs = query.to_pairs();
        assert_eq!(
            pairs,
            vec![
                ("status", "REPORTED,DISPATCHED".to_string()),
                ("type", "FIRE".to_string()),
                ("includeClosed", "false".to_string()),
                ("page", "1".to_string()),
                ("limit", "50".to_string()),
            ]
        );
    }

    #[test]
    fn base_url_gains_trailing_slash() {
        let url = with_trailing_slash(Url::parse("https://dispatch.example/v2").unwrap());
        assert_eq!(url.join(INCIDENTS_PATH).unwrap().path(), "/v2/api/incidents");
    }

    #[test]
    fn page_deserializes_camel_case() {
        let page: IncidentPage = serde_json::from_value(serde_json::json!({
            "data": [{ "id": "I1" }],
            "page": 1,
            "limit": 20,
            "total": 1,
            "totalPages": 1
        }))
        .unwrap();
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.total_pages, 1);
    }
}
