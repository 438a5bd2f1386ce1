//! ABCP source system: paginated user listing and the import sweeps built on it

mod importer;

use std::time::Duration;

use serde_json::Value;

use crate::config::{HttpSettings, SourceConfig};
use crate::error::{Error, Result};
use crate::retry::{with_retries, RetryPolicy};
use crate::util::compact_text;

pub use importer::{import_items, import_users, ImportMode, ImportSummary, Paging};

const ENDPOINT: &str = "abcp.users";

/// Read access to the source user listing.
#[allow(async_fn_in_trait)]
pub trait SourceApi {
    /// Fetch one page of raw user objects starting at offset `skip`.
    ///
    /// An empty page means the listing is exhausted.
    async fn fetch_page(&self, skip: u64, limit: u32) -> Result<Vec<Value>>;
}

/// HTTP client for the ABCP `/cp/users` endpoint.
#[derive(Clone)]
pub struct AbcpClient {
    base_url: String,
    user_login: String,
    user_password: String,
    client: reqwest::Client,
    retry: RetryPolicy,
    pacing: Duration,
}

impl std::fmt::Debug for AbcpClient {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("AbcpClient")
            .field("base_url", &self.base_url)
            .field("user_login", &self.user_login)
            .field("user_password", &"[REDACTED]")
            .field("retry", &self.retry)
            .field("pacing", &self.pacing)
            .finish_non_exhaustive()
    }
}

impl AbcpClient {
    pub fn new(source: &SourceConfig, http: &HttpSettings) -> Result<Self> {
        Ok(Self {
            base_url: source.base_url.clone(),
            user_login: source.user_login.clone(),
            user_password: source.user_password.clone(),
            client: reqwest::Client::builder().timeout(http.timeout).build()?,
            retry: RetryPolicy::from_http(http),
            pacing: http.pacing,
        })
    }

    async fn get_once(&self, skip: u64, limit: u32) -> Result<Vec<Value>> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("userlogin", self.user_login.as_str()),
                ("userpsw", self.user_password.as_str()),
            ])
            .query(&[("limit", u64::from(limit)), ("skip", skip)])
            .query(&[("format", "p")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::HttpStatus {
                endpoint: ENDPOINT.to_string(),
                status: status.as_u16(),
                body: compact_text(&body),
            });
        }

        let payload = response.json::<Value>().await?;
        extract_items(payload, ENDPOINT)
    }
}

impl SourceApi for AbcpClient {
    async fn fetch_page(&self, skip: u64, limit: u32) -> Result<Vec<Value>> {
        tracing::debug!(
            skip,
            limit,
            user_login = %self.user_login,
            "ABCP page request"
        );

        let items = with_retries(self.retry, ENDPOINT, move || self.get_once(skip, limit)).await?;

        if !self.pacing.is_zero() {
            tokio::time::sleep(self.pacing).await;
        }
        Ok(items)
    }
}

/// The listing is `{"items": [...]}`; a missing or null `items` is an empty page.
///
/// `origin` names the endpoint or file the payload came from in errors.
pub fn extract_items(payload: Value, origin: &str) -> Result<Vec<Value>> {
    let Value::Object(mut object) = payload else {
        return Err(Error::InvalidResponse {
            endpoint: origin.to_string(),
            message: "expected a JSON object".to_string(),
        });
    };

    match object.remove("items") {
        Some(Value::Array(items)) => Ok(items),
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(other) => Err(Error::InvalidResponse {
            endpoint: origin.to_string(),
            message: format!("items is not an array: {}", compact_text(&other.to_string())),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source_config(base_url: String) -> SourceConfig {
        SourceConfig {
            base_url,
            user_login: "api-user".to_string(),
            user_password: "api-secret".to_string(),
            page_size: 2,
            max_pages: None,
        }
    }

    fn fast_settings() -> HttpSettings {
        HttpSettings {
            timeout: Duration::from_secs(5),
            retries: 2,
            retry_backoff: Duration::from_millis(1),
            pacing: Duration::ZERO,
        }
    }

    #[test]
    fn extract_items_accepts_missing_items() {
        assert!(extract_items(json!({}), ENDPOINT).unwrap().is_empty());
        assert_eq!(
            extract_items(json!({ "items": [{ "userId": 1 }] }), ENDPOINT)
                .unwrap()
                .len(),
            1
        );
        assert!(extract_items(json!([1, 2]), ENDPOINT).is_err());
        assert!(extract_items(json!({ "items": "nope" }), ENDPOINT).is_err());
    }

    #[test]
    fn debug_redacts_password() {
        let client = AbcpClient::new(
            &source_config("https://abcp.example/cp/users".to_string()),
            &fast_settings(),
        )
        .unwrap();
        let debug = format!("{client:?}");
        assert!(!debug.contains("api-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[tokio::test]
    async fn fetch_page_sends_credentials_and_paging() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cp/users"))
            .and(query_param("userlogin", "api-user"))
            .and(query_param("userpsw", "api-secret"))
            .and(query_param("limit", "2"))
            .and(query_param("skip", "4"))
            .and(query_param("format", "p"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{ "userId": "5" }, { "userId": "6" }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = AbcpClient::new(
            &source_config(format!("{}/cp/users", server.uri())),
            &fast_settings(),
        )
        .unwrap();
        let items = client.fetch_page(4, 2).await.unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["userId"], "5");
    }

    #[tokio::test]
    async fn fetch_page_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cp/users"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/cp/users"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": [] })))
            .mount(&server)
            .await;

        let client = AbcpClient::new(
            &source_config(format!("{}/cp/users", server.uri())),
            &fast_settings(),
        )
        .unwrap();

        assert!(client.fetch_page(0, 2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fetch_page_does_not_retry_rejected_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cp/users"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .expect(1)
            .mount(&server)
            .await;

        let client = AbcpClient::new(
            &source_config(format!("{}/cp/users", server.uri())),
            &fast_settings(),
        )
        .unwrap();
        let error = client.fetch_page(0, 2).await.unwrap_err();

        assert!(matches!(error, Error::HttpStatus { status: 403, .. }));
    }
}
