//! SCIM 2.0 HTTP client (reqwest-based).
//!
//! [`ScimClient`] speaks RFC 7644 to the target directory and implements
//! [`DirectoryTarget`] on top of it. Every request goes through the configured
//! [`RetryPolicy`].

use std::time::Duration;

use async_trait::async_trait;
use idsync_core::{
    DirectoryTarget, MembershipOp, SyncError, SyncResult, TargetGroup, TargetUser,
};
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, instrument, warn};

use crate::auth::BearerToken;
use crate::error::{ScimClientError, ScimClientResult};
use crate::models::{
    escape_scim_filter_value, ScimGroup, ScimListResponse, ScimPatchRequest, ScimUser,
};
use crate::retry::RetryPolicy;

const SCIM_CONTENT_TYPE: &str = "application/scim+json";

/// SCIM 2.0 HTTP client for the target directory.
#[derive(Debug, Clone)]
pub struct ScimClient {
    /// Base URL without trailing slash (e.g. `https://scim.example.com/scim/v2`).
    base_url: String,
    auth: BearerToken,
    http_client: Client,
    retry: RetryPolicy,
}

impl ScimClient {
    /// Create a client with its own `reqwest::Client`.
    pub fn new(base_url: &str, auth: BearerToken, timeout: Duration) -> ScimClientResult<Self> {
        if auth.is_empty() {
            return Err(ScimClientError::InvalidConfig(
                "SCIM access token is empty".to_string(),
            ));
        }
        let http_client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("idsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                ScimClientError::InvalidConfig(format!("Failed to build HTTP client: {e}"))
            })?;
        Ok(Self::with_http_client(base_url, auth, http_client))
    }

    /// Create a client with a pre-built `reqwest::Client`.
    #[must_use]
    pub fn with_http_client(base_url: &str, auth: BearerToken, http_client: Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
            http_client,
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ── Listing ───────────────────────────────────────────────────────

    /// List users with optional filter and pagination (GET /Users).
    pub async fn list_users(
        &self,
        filter: Option<&str>,
        start_index: Option<i64>,
        count: Option<i64>,
    ) -> ScimClientResult<ScimListResponse<ScimUser>> {
        let url = format!("{}/Users", self.base_url);
        self.retry
            .execute("list_users", || {
                self.get_with_params(&url, filter, start_index, count)
            })
            .await
    }

    /// List groups with optional filter and pagination (GET /Groups).
    pub async fn list_groups(
        &self,
        filter: Option<&str>,
        start_index: Option<i64>,
        count: Option<i64>,
    ) -> ScimClientResult<ScimListResponse<ScimGroup>> {
        let url = format!("{}/Groups", self.base_url);
        self.retry
            .execute("list_groups", || {
                self.get_with_params(&url, filter, start_index, count)
            })
            .await
    }

    async fn resolve_user_id(&self, user: &TargetUser) -> SyncResult<String> {
        match &user.id {
            Some(id) => Ok(id.clone()),
            None => self
                .find_user_by_email(&user.user_name)
                .await?
                .id
                .ok_or_else(|| SyncError::protocol("find_user", "user resource has no id")),
        }
    }

    async fn resolve_group_id(&self, group: &TargetGroup) -> SyncResult<String> {
        match &group.id {
            Some(id) => Ok(id.clone()),
            None => self
                .find_group_by_display_name(&group.display_name)
                .await?
                .id
                .ok_or_else(|| SyncError::protocol("find_group", "group resource has no id")),
        }
    }

    // ── Internal HTTP Methods ─────────────────────────────────────────

    async fn get_with_params<T: DeserializeOwned>(
        &self,
        url: &str,
        filter: Option<&str>,
        start_index: Option<i64>,
        count: Option<i64>,
    ) -> ScimClientResult<T> {
        debug!(url, filter, "SCIM GET");
        let mut query_params: Vec<(&str, String)> = Vec::new();
        if let Some(f) = filter {
            query_params.push(("filter", f.to_string()));
        }
        if let Some(si) = start_index {
            query_params.push(("startIndex", si.to_string()));
        }
        if let Some(c) = count {
            query_params.push(("count", c.to_string()));
        }
        let mut builder = self.http_client.get(url);
        if !query_params.is_empty() {
            builder = builder.query(&query_params);
        }
        let response = self.auth.apply(builder).send().await?;
        self.handle_response(response).await
    }

    async fn send_json<T: DeserializeOwned, B: Serialize>(
        &self,
        method: reqwest::Method,
        url: &str,
        body: &B,
    ) -> ScimClientResult<T> {
        debug!(%method, url, "SCIM request");
        let builder = self
            .http_client
            .request(method, url)
            .header(reqwest::header::CONTENT_TYPE, SCIM_CONTENT_TYPE)
            .json(body);
        let response = self.auth.apply(builder).send().await?;
        self.handle_response(response).await
    }

    /// Send a request whose success response may carry no body.
    async fn send_no_content<B: Serialize>(
        &self,
        method: reqwest::Method,
        url: &str,
        body: Option<&B>,
    ) -> ScimClientResult<()> {
        debug!(%method, url, "SCIM request");
        let mut builder = self.http_client.request(method, url);
        if let Some(body) = body {
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, SCIM_CONTENT_TYPE)
                .json(body);
        }
        let response = self.auth.apply(builder).send().await?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT || status.is_success() {
            Ok(())
        } else {
            self.handle_error_response(response).await
        }
    }

    // ── Response Handling ─────────────────────────────────────────────

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> ScimClientResult<T> {
        if response.status().is_success() {
            let body = response.text().await?;
            serde_json::from_str(&body)
                .map_err(|e| ScimClientError::ParseError(format!("Failed to parse response: {e}")))
        } else {
            self.handle_error_response(response).await
        }
    }

    async fn handle_error_response<T>(&self, response: reqwest::Response) -> ScimClientResult<T> {
        let status = response.status();

        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<no body>".to_string());

        match status {
            StatusCode::NOT_FOUND => Err(ScimClientError::NotFound(body)),
            StatusCode::CONFLICT => Err(ScimClientError::Conflict(body)),
            StatusCode::TOO_MANY_REQUESTS => {
                warn!(retry_after_secs = ?retry_after, "SCIM target rate limited");
                Err(ScimClientError::RateLimited {
                    retry_after_secs: retry_after,
                })
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ScimClientError::AuthError {
                status: status.as_u16(),
                detail: body,
            }),
            _ => {
                let detail = if body.is_empty() {
                    format!("HTTP {status}")
                } else {
                    body
                };
                Err(ScimClientError::ScimError {
                    status: status.as_u16(),
                    detail,
                })
            }
        }
    }
}

/// Collapse a filtered listing into exactly one resource.
fn single_match<T>(
    resources: Vec<T>,
    entity: &'static str,
    key: &str,
) -> SyncResult<T> {
    let matches = resources.len();
    let mut iter = resources.into_iter();
    match (iter.next(), matches) {
        (Some(found), 1) => Ok(found),
        (None, _) => Err(SyncError::NotFound {
            entity,
            key: key.to_string(),
        }),
        _ => Err(SyncError::Ambiguous {
            entity,
            key: key.to_string(),
            matches,
        }),
    }
}

#[async_trait]
impl DirectoryTarget for ScimClient {
    #[instrument(skip(self))]
    async fn find_user_by_email(&self, email: &str) -> SyncResult<TargetUser> {
        let filter = format!("userName eq \"{}\"", escape_scim_filter_value(email));
        let response = self
            .list_users(Some(&filter), None, None)
            .await
            .map_err(|e| e.into_sync_error("find_user_by_email", "user", email))?;
        single_match(response.resources, "user", email).map(TargetUser::from)
    }

    #[instrument(skip(self))]
    async fn find_group_by_display_name(&self, display_name: &str) -> SyncResult<TargetGroup> {
        let filter = format!(
            "displayName eq \"{}\"",
            escape_scim_filter_value(display_name)
        );
        let response = self
            .list_groups(Some(&filter), None, None)
            .await
            .map_err(|e| e.into_sync_error("find_group_by_display_name", "group", display_name))?;
        single_match(response.resources, "group", display_name).map(TargetGroup::from)
    }

    #[instrument(skip(self, user), fields(user = %user.user_name))]
    async fn create_user(&self, user: &TargetUser) -> SyncResult<TargetUser> {
        let url = format!("{}/Users", self.base_url);
        let body = ScimUser {
            id: None,
            ..ScimUser::from(user)
        };
        let created: ScimUser = self
            .retry
            .execute("create_user", || {
                self.send_json(reqwest::Method::POST, &url, &body)
            })
            .await
            .map_err(|e| e.into_sync_error("create_user", "user", &user.user_name))?;
        Ok(created.into())
    }

    #[instrument(skip(self, user), fields(user = %user.user_name))]
    async fn update_user(&self, user: &TargetUser) -> SyncResult<TargetUser> {
        let id = user.id.as_deref().ok_or_else(|| SyncError::NotFound {
            entity: "user",
            key: user.user_name.clone(),
        })?;
        let url = format!("{}/Users/{}", self.base_url, id);
        let body = ScimUser::from(user);
        let updated: ScimUser = self
            .retry
            .execute("update_user", || {
                self.send_json(reqwest::Method::PUT, &url, &body)
            })
            .await
            .map_err(|e| e.into_sync_error("update_user", "user", &user.user_name))?;
        Ok(updated.into())
    }

    #[instrument(skip(self, user), fields(user = %user.user_name))]
    async fn delete_user(&self, user: &TargetUser) -> SyncResult<()> {
        let id = self.resolve_user_id(user).await?;
        let url = format!("{}/Users/{}", self.base_url, id);
        self.retry
            .execute("delete_user", || {
                self.send_no_content::<()>(reqwest::Method::DELETE, &url, None)
            })
            .await
            .map_err(|e| e.into_sync_error("delete_user", "user", &user.user_name))
    }

    #[instrument(skip(self, group), fields(group = %group.display_name))]
    async fn create_group(&self, group: &TargetGroup) -> SyncResult<TargetGroup> {
        let url = format!("{}/Groups", self.base_url);
        let body = ScimGroup {
            id: None,
            ..ScimGroup::from(group)
        };
        let created: ScimGroup = self
            .retry
            .execute("create_group", || {
                self.send_json(reqwest::Method::POST, &url, &body)
            })
            .await
            .map_err(|e| e.into_sync_error("create_group", "group", &group.display_name))?;
        Ok(created.into())
    }

    #[instrument(skip(self, group), fields(group = %group.display_name))]
    async fn update_group(&self, group: &TargetGroup) -> SyncResult<TargetGroup> {
        let id = self.resolve_group_id(group).await?;
        let url = format!("{}/Groups/{}", self.base_url, id);
        let patch = ScimPatchRequest::replace_group_core(group);
        self.retry
            .execute("update_group", || {
                self.send_no_content(reqwest::Method::PATCH, &url, Some(&patch))
            })
            .await
            .map_err(|e| e.into_sync_error("update_group", "group", &group.display_name))?;
        Ok(TargetGroup {
            id: Some(id),
            ..group.clone()
        })
    }

    #[instrument(skip(self, group), fields(group = %group.display_name))]
    async fn delete_group(&self, group: &TargetGroup) -> SyncResult<()> {
        let id = self.resolve_group_id(group).await?;
        let url = format!("{}/Groups/{}", self.base_url, id);
        self.retry
            .execute("delete_group", || {
                self.send_no_content::<()>(reqwest::Method::DELETE, &url, None)
            })
            .await
            .map_err(|e| e.into_sync_error("delete_group", "group", &group.display_name))
    }

    #[instrument(skip(self, member_ids), fields(members = member_ids.len()))]
    async fn patch_group_membership(
        &self,
        group_id: &str,
        op: MembershipOp,
        member_ids: &[String],
    ) -> SyncResult<()> {
        if member_ids.is_empty() {
            return Ok(());
        }
        if member_ids.len() > idsync_core::MAX_MEMBERS_PER_PATCH {
            return Err(SyncError::protocol(
                "patch_group_membership",
                format!(
                    "{} members exceed the per-request limit of {}",
                    member_ids.len(),
                    idsync_core::MAX_MEMBERS_PER_PATCH
                ),
            ));
        }
        let url = format!("{}/Groups/{}", self.base_url, group_id);
        let patch = ScimPatchRequest::members(op, member_ids);
        self.retry
            .execute("patch_group_membership", || {
                self.send_no_content(reqwest::Method::PATCH, &url, Some(&patch))
            })
            .await
            .map_err(|e| e.into_sync_error("patch_group_membership", "group", group_id))
    }
}
