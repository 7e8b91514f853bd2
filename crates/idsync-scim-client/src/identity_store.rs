//! Identity-store HTTP client.
//!
//! The identity store exposes a JSON-over-POST API: every call is a `POST /`
//! with an `X-Amz-Target: AWSIdentityStore.<Operation>` header and a JSON
//! body carrying the store id. Errors come back as a JSON document whose
//! `__type` names the failure class.

use std::time::Duration;

use async_trait::async_trait;
use idsync_core::{
    Email, GroupMembership, IdentityStore, MembershipExistence, Page, SyncResult, TargetGroup,
    TargetUser,
};
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, instrument, warn};

use crate::auth::BearerToken;
use crate::error::{ScimClientError, ScimClientResult};
use crate::retry::RetryPolicy;

const TARGET_PREFIX: &str = "AWSIdentityStore";
const CONTENT_TYPE: &str = "application/x-amz-json-1.1";
/// Page size requested from the list operations.
pub const LIST_PAGE_SIZE: u32 = 50;

// ── Wire shapes ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireName {
    #[serde(default)]
    given_name: Option<String>,
    #[serde(default)]
    family_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireEmail {
    value: String,
    #[serde(default, rename = "Type")]
    email_type: Option<String>,
    #[serde(default)]
    primary: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireExternalId {
    #[serde(default)]
    id: String,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireUser {
    user_id: String,
    user_name: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    name: Option<WireName>,
    #[serde(default)]
    emails: Vec<WireEmail>,
    #[serde(default)]
    external_ids: Vec<WireExternalId>,
    #[serde(default = "default_true")]
    active: bool,
}

impl From<WireUser> for TargetUser {
    fn from(user: WireUser) -> Self {
        let name = user.name.unwrap_or_default();
        Self {
            id: Some(user.user_id),
            external_id: user.external_ids.into_iter().next().map(|e| e.id),
            user_name: user.user_name,
            given_name: name.given_name.unwrap_or_default(),
            family_name: name.family_name.unwrap_or_default(),
            display_name: user.display_name.unwrap_or_default(),
            active: user.active,
            emails: user
                .emails
                .into_iter()
                .map(|e| Email {
                    value: e.value,
                    kind: e.email_type,
                    primary: e.primary,
                })
                .collect(),
            addresses: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireGroup {
    group_id: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    external_ids: Vec<WireExternalId>,
}

impl From<WireGroup> for TargetGroup {
    fn from(group: WireGroup) -> Self {
        Self {
            id: Some(group.group_id),
            external_id: group.external_ids.into_iter().next().map(|e| e.id),
            display_name: group.display_name,
            members: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireMemberId {
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireMembership {
    membership_id: String,
    group_id: String,
    member_id: WireMemberId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListUsersResponse {
    #[serde(default)]
    users: Vec<WireUser>,
    #[serde(default)]
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListGroupsResponse {
    #[serde(default)]
    groups: Vec<WireGroup>,
    #[serde(default)]
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListGroupMembershipsResponse {
    #[serde(default)]
    group_memberships: Vec<WireMembership>,
    #[serde(default)]
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetGroupMembershipIdResponse {
    membership_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MembershipExistenceResult {
    group_id: String,
    member_id: WireMemberId,
    #[serde(default)]
    membership_exists: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct IsMemberInGroupsResponse {
    #[serde(default)]
    results: Vec<MembershipExistenceResult>,
}

#[derive(Debug, Default, Deserialize)]
struct WireError {
    #[serde(default, rename = "__type")]
    error_type: String,
    #[serde(default, alias = "Message")]
    message: String,
}

fn with_next_token(mut body: serde_json::Value, next_token: Option<String>) -> serde_json::Value {
    if let Some(token) = next_token {
        body["NextToken"] = serde_json::Value::String(token);
    }
    body
}

// ── Client ────────────────────────────────────────────────────────────

/// HTTP client for the identity-store API.
#[derive(Debug, Clone)]
pub struct IdentityStoreClient {
    endpoint: String,
    identity_store_id: String,
    auth: BearerToken,
    http_client: Client,
    retry: RetryPolicy,
}

impl IdentityStoreClient {
    pub fn new(
        endpoint: &str,
        identity_store_id: &str,
        auth: BearerToken,
        timeout: Duration,
    ) -> ScimClientResult<Self> {
        if identity_store_id.trim().is_empty() {
            return Err(ScimClientError::InvalidConfig(
                "identity store id is empty".to_string(),
            ));
        }
        let http_client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("idsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                ScimClientError::InvalidConfig(format!("Failed to build HTTP client: {e}"))
            })?;
        Ok(Self::with_http_client(
            endpoint,
            identity_store_id,
            auth,
            http_client,
        ))
    }

    #[must_use]
    pub fn with_http_client(
        endpoint: &str,
        identity_store_id: &str,
        auth: BearerToken,
        http_client: Client,
    ) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            identity_store_id: identity_store_id.to_string(),
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

    /// Invoke one operation with retry.
    async fn call<T: DeserializeOwned, B: Serialize>(
        &self,
        operation: &str,
        body: &B,
    ) -> ScimClientResult<T> {
        self.retry
            .execute(operation, || self.call_once(operation, body))
            .await
    }

    async fn call_once<T: DeserializeOwned, B: Serialize>(
        &self,
        operation: &str,
        body: &B,
    ) -> ScimClientResult<T> {
        debug!(operation, "Identity store request");
        let builder = self
            .http_client
            .post(format!("{}/", self.endpoint))
            .header("X-Amz-Target", format!("{TARGET_PREFIX}.{operation}"))
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .json(body);
        let response = self.auth.apply(builder).send().await?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let text = response.text().await?;

        if status.is_success() {
            let text = if text.trim().is_empty() { "{}" } else { &text };
            return serde_json::from_str(text).map_err(|e| {
                ScimClientError::ParseError(format!("Failed to parse {operation} response: {e}"))
            });
        }

        let error: WireError = serde_json::from_str(&text).unwrap_or_default();
        // `__type` may be namespaced, e.g. "com.amazonaws#ThrottlingException".
        let error_type = error
            .error_type
            .rsplit('#')
            .next()
            .unwrap_or_default()
            .to_string();
        let detail = if error.message.is_empty() {
            text
        } else {
            error.message
        };

        match (status, error_type.as_str()) {
            (_, "ResourceNotFoundException") | (StatusCode::NOT_FOUND, _) => {
                Err(ScimClientError::NotFound(detail))
            }
            (_, "ConflictException") | (StatusCode::CONFLICT, _) => {
                Err(ScimClientError::Conflict(detail))
            }
            (_, "ThrottlingException") | (StatusCode::TOO_MANY_REQUESTS, _) => {
                warn!(operation, retry_after_secs = ?retry_after, "Identity store throttled");
                Err(ScimClientError::RateLimited {
                    retry_after_secs: retry_after,
                })
            }
            (_, "AccessDeniedException")
            | (StatusCode::UNAUTHORIZED, _)
            | (StatusCode::FORBIDDEN, _) => Err(ScimClientError::AuthError {
                status: status.as_u16(),
                detail,
            }),
            _ => Err(ScimClientError::ScimError {
                status: status.as_u16(),
                detail: if error_type.is_empty() {
                    detail
                } else {
                    format!("{error_type}: {detail}")
                },
            }),
        }
    }
}

#[async_trait]
impl IdentityStore for IdentityStoreClient {
    #[instrument(skip(self))]
    async fn list_users(&self, next_token: Option<String>) -> SyncResult<Page<TargetUser>> {
        let body = json!({
            "IdentityStoreId": self.identity_store_id,
            "MaxResults": LIST_PAGE_SIZE,
        });
        let body = with_next_token(body, next_token);
        let response: ListUsersResponse = self
            .call("ListUsers", &body)
            .await
            .map_err(|e| e.into_sync_error("list_users", "user", "*"))?;
        Ok(Page {
            items: response.users.into_iter().map(TargetUser::from).collect(),
            next_token: response.next_token,
        })
    }

    #[instrument(skip(self))]
    async fn list_groups(&self, next_token: Option<String>) -> SyncResult<Page<TargetGroup>> {
        let body = json!({
            "IdentityStoreId": self.identity_store_id,
            "MaxResults": LIST_PAGE_SIZE,
        });
        let body = with_next_token(body, next_token);
        let response: ListGroupsResponse = self
            .call("ListGroups", &body)
            .await
            .map_err(|e| e.into_sync_error("list_groups", "group", "*"))?;
        Ok(Page {
            items: response.groups.into_iter().map(TargetGroup::from).collect(),
            next_token: response.next_token,
        })
    }

    #[instrument(skip(self))]
    async fn list_group_memberships(
        &self,
        group_id: &str,
        next_token: Option<String>,
    ) -> SyncResult<Page<GroupMembership>> {
        let body = json!({
            "IdentityStoreId": self.identity_store_id,
            "GroupId": group_id,
            "MaxResults": LIST_PAGE_SIZE,
        });
        let body = with_next_token(body, next_token);
        let response: ListGroupMembershipsResponse = self
            .call("ListGroupMemberships", &body)
            .await
            .map_err(|e| e.into_sync_error("list_group_memberships", "group", group_id))?;
        // Non-user members (nested groups) carry no user id and are skipped.
        let items = response
            .group_memberships
            .into_iter()
            .filter_map(|m| {
                m.member_id.user_id.map(|user_id| GroupMembership {
                    membership_id: m.membership_id,
                    group_id: m.group_id,
                    user_id,
                })
            })
            .collect();
        Ok(Page {
            items,
            next_token: response.next_token,
        })
    }

    #[instrument(skip(self))]
    async fn get_group_membership_id(&self, group_id: &str, user_id: &str) -> SyncResult<String> {
        let body = json!({
            "IdentityStoreId": self.identity_store_id,
            "GroupId": group_id,
            "MemberId": { "UserId": user_id },
        });
        let response: GetGroupMembershipIdResponse = self
            .call("GetGroupMembershipId", &body)
            .await
            .map_err(|e| {
                let key = format!("{group_id}/{user_id}");
                e.into_sync_error("get_group_membership_id", "membership", &key)
            })?;
        Ok(response.membership_id)
    }

    #[instrument(skip(self))]
    async fn delete_group_membership(&self, membership_id: &str) -> SyncResult<()> {
        let body = json!({
            "IdentityStoreId": self.identity_store_id,
            "MembershipId": membership_id,
        });
        let _: serde_json::Value = self
            .call("DeleteGroupMembership", &body)
            .await
            .map_err(|e| {
                e.into_sync_error("delete_group_membership", "membership", membership_id)
            })?;
        Ok(())
    }

    #[instrument(skip(self, group_ids), fields(groups = group_ids.len()))]
    async fn is_member_in_groups(
        &self,
        user_id: &str,
        group_ids: &[String],
    ) -> SyncResult<Vec<MembershipExistence>> {
        if group_ids.is_empty() {
            return Ok(Vec::new());
        }
        let body = json!({
            "IdentityStoreId": self.identity_store_id,
            "MemberId": { "UserId": user_id },
            "GroupIds": group_ids,
        });
        let response: IsMemberInGroupsResponse = self
            .call("IsMemberInGroups", &body)
            .await
            .map_err(|e| e.into_sync_error("is_member_in_groups", "user", user_id))?;
        Ok(response
            .results
            .into_iter()
            .map(|r| MembershipExistence {
                group_id: r.group_id,
                user_id: r.member_id.user_id.unwrap_or_else(|| user_id.to_string()),
                is_member: r.membership_exists,
            })
            .collect())
    }
}
