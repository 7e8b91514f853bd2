//! Directory API HTTP client with `nextPageToken` pagination and retry.

use std::time::Duration;

use idsync_core::{collect_all, Page, SyncResult};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::error::{DirectoryError, DirectoryResult};

/// Default directory API root.
pub const DEFAULT_BASE_URL: &str = "https://admin.googleapis.com/admin/directory/v1";

/// Alias addressing the account that owns the credentials.
pub const MY_CUSTOMER: &str = "my_customer";

/// Error body returned by the directory API.
#[derive(Debug, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
}

/// One page of any listing. The items array is named after the resource.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPage<T> {
    #[serde(alias = "users", alias = "groups", alias = "members", default = "Vec::new")]
    pub items: Vec<T>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Connection settings for the directory API.
#[derive(Clone)]
pub struct DirectoryConfig {
    pub base_url: String,
    /// Customer id, or [`MY_CUSTOMER`].
    pub customer_id: String,
    /// Ready OAuth access token.
    pub access_token: String,
    pub page_size: u32,
    pub timeout: Duration,
    pub max_retries: u32,
    /// Initial backoff; doubled after each transient failure.
    pub retry_delay: Duration,
}

impl std::fmt::Debug for DirectoryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryConfig")
            .field("base_url", &self.base_url)
            .field("customer_id", &self.customer_id)
            .field("access_token", &"[REDACTED]")
            .field("page_size", &self.page_size)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .finish()
    }
}

impl DirectoryConfig {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            customer_id: MY_CUSTOMER.to_string(),
            access_token: access_token.into(),
            page_size: 200,
            timeout: Duration::from_secs(30),
            max_retries: 5,
            retry_delay: Duration::from_secs(1),
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a required field is empty or out of range.
    pub fn validate(&self) -> DirectoryResult<()> {
        if self.access_token.trim().is_empty() {
            return Err(DirectoryError::Config(
                "directory access token is required".to_string(),
            ));
        }
        if self.customer_id.trim().is_empty() {
            return Err(DirectoryError::Config(
                "directory customer id is required".to_string(),
            ));
        }
        if !(1..=500).contains(&self.page_size) {
            return Err(DirectoryError::Config(format!(
                "directory page size must be between 1 and 500, got {}",
                self.page_size
            )));
        }
        Url::parse(&self.base_url)?;
        Ok(())
    }
}

/// Directory API client.
#[derive(Debug, Clone)]
pub struct DirectoryClient {
    http_client: reqwest::Client,
    config: DirectoryConfig,
}

impl DirectoryClient {
    /// Creates a new client.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: DirectoryConfig) -> DirectoryResult<Self> {
        config.validate()?;
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DirectoryError::Config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            http_client,
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    /// Build `{base_url}/{path}` with the given query pairs.
    pub(crate) fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> DirectoryResult<Url> {
        let mut url = Url::parse(&format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path
        ))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// Performs a GET request with retry on 429 and 5xx.
    #[instrument(skip(self, url), fields(url = %url))]
    pub async fn get<T: DeserializeOwned>(&self, url: &Url) -> DirectoryResult<T> {
        let mut attempt = 0u32;
        let mut delay = self.config.retry_delay;

        loop {
            let response = self
                .http_client
                .get(url.clone())
                .bearer_auth(&self.config.access_token)
                .send()
                .await?;
            let status = response.status();

            let transient = status == reqwest::StatusCode::TOO_MANY_REQUESTS
                || matches!(
                    status,
                    reqwest::StatusCode::INTERNAL_SERVER_ERROR
                        | reqwest::StatusCode::BAD_GATEWAY
                        | reqwest::StatusCode::SERVICE_UNAVAILABLE
                        | reqwest::StatusCode::GATEWAY_TIMEOUT
                );
            if transient && attempt < self.config.max_retries {
                attempt += 1;
                let wait = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map_or(delay, Duration::from_secs);
                warn!(
                    %status,
                    attempt,
                    max_retries = self.config.max_retries,
                    wait_ms = wait.as_millis() as u64,
                    "Transient directory error, retrying"
                );
                tokio::time::sleep(wait).await;
                delay *= 2;
                continue;
            }

            if status.is_success() {
                let body = response.text().await?;
                return serde_json::from_str(&body).map_err(DirectoryError::from);
            }

            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);

            return Err(match status {
                reqwest::StatusCode::TOO_MANY_REQUESTS => DirectoryError::RateLimited {
                    attempts: attempt + 1,
                },
                reqwest::StatusCode::NOT_FOUND => DirectoryError::NotFound(message),
                reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                    DirectoryError::Auth(message)
                }
                _ => DirectoryError::Api {
                    status: status.as_u16(),
                    message,
                },
            });
        }
    }

    /// Fetch one page of `url`, continuing from `page_token`.
    async fn get_page<T: DeserializeOwned>(
        &self,
        url: &Url,
        page_token: Option<String>,
    ) -> DirectoryResult<Page<T>> {
        let mut url = url.clone();
        if let Some(token) = page_token {
            url.query_pairs_mut().append_pair("pageToken", &token);
        }
        debug!(url = %url, "Fetching page");
        let page: ListPage<T> = self.get(&url).await?;
        Ok(Page {
            items: page.items,
            next_token: page.next_page_token,
        })
    }

    /// Drain every page of a listing.
    pub async fn get_all<T: DeserializeOwned>(
        &self,
        operation: &str,
        url: &Url,
    ) -> SyncResult<Vec<T>> {
        collect_all(operation, move |token| async move {
            self.get_page(url, token)
                .await
                .map_err(|e| e.into_sync_error(operation))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_page_parses_any_resource_name() {
        #[derive(Debug, Deserialize)]
        struct Item {
            id: String,
        }

        let users: ListPage<Item> =
            serde_json::from_str(r#"{"users":[{"id":"1"}],"nextPageToken":"t2"}"#).unwrap();
        assert_eq!(users.items[0].id, "1");
        assert_eq!(users.next_page_token.as_deref(), Some("t2"));

        let members: ListPage<Item> = serde_json::from_str(r#"{"members":[{"id":"9"}]}"#).unwrap();
        assert_eq!(members.items.len(), 1);
        assert!(members.next_page_token.is_none());

        let empty: ListPage<Item> = serde_json::from_str(r#"{"kind":"admin#directory#groups"}"#).unwrap();
        assert!(empty.items.is_empty());
    }

    #[test]
    fn test_api_error_parsing() {
        let error: ApiError =
            serde_json::from_str(r#"{"error":{"code":404,"message":"Resource Not Found: groupKey"}}"#)
                .unwrap();
        assert_eq!(error.error.code, 404);
    }

    #[test]
    fn test_config_validation() {
        assert!(DirectoryConfig::new("token").validate().is_ok());
        assert!(DirectoryConfig::new("").validate().is_err());

        let mut config = DirectoryConfig::new("token");
        config.page_size = 0;
        assert!(config.validate().is_err());

        let mut config = DirectoryConfig::new("token");
        config.base_url = "not a url".into();
        assert!(matches!(config.validate(), Err(DirectoryError::Url(_))));
    }

    #[test]
    fn test_debug_redacts_token() {
        let debug = format!("{:?}", DirectoryConfig::new("secret-token"));
        assert!(!debug.contains("secret-token"));
    }

    #[test]
    fn test_endpoint_encodes_query() {
        let client = DirectoryClient::new(DirectoryConfig::new("token")).unwrap();
        let url = client
            .endpoint("users", &[("customer", MY_CUSTOMER), ("query", "name:'Ada Lovelace'")])
            .unwrap();
        assert_eq!(url.path(), "/admin/directory/v1/users");
        assert!(url.query().unwrap().contains("query=name%3A%27Ada+Lovelace%27"));
    }
}
