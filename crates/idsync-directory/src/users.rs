//! User listing from the source directory.

use idsync_core::{Address, Email, SourceUser, SyncResult};
use serde::Deserialize;
use tracing::{info, instrument};

use crate::client::DirectoryClient;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireUserName {
    #[serde(default)]
    pub given_name: String,
    #[serde(default)]
    pub family_name: String,
    #[serde(default)]
    pub full_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireUserEmail {
    pub address: String,
    #[serde(default, rename = "type")]
    pub email_type: Option<String>,
    #[serde(default)]
    pub primary: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireUserAddress {
    #[serde(default, rename = "type")]
    pub address_type: Option<String>,
    #[serde(default)]
    pub formatted: Option<String>,
    #[serde(default)]
    pub street_address: Option<String>,
    #[serde(default)]
    pub locality: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub primary: bool,
}

/// User resource as returned by the directory API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireUser {
    pub id: String,
    pub primary_email: String,
    #[serde(default)]
    pub name: WireUserName,
    #[serde(default)]
    pub suspended: bool,
    #[serde(default)]
    pub emails: Vec<WireUserEmail>,
    #[serde(default)]
    pub addresses: Vec<WireUserAddress>,
}

impl From<WireUser> for SourceUser {
    fn from(user: WireUser) -> Self {
        Self {
            id: user.id,
            primary_email: user.primary_email,
            given_name: user.name.given_name,
            family_name: user.name.family_name,
            display_name: user.name.full_name,
            suspended: user.suspended,
            emails: user
                .emails
                .into_iter()
                .map(|e| Email {
                    value: e.address,
                    kind: e.email_type,
                    primary: e.primary,
                })
                .collect(),
            addresses: user
                .addresses
                .into_iter()
                .map(|a| Address {
                    kind: a.address_type,
                    formatted: a.formatted,
                    street_address: a.street_address,
                    locality: a.locality,
                    region: a.region,
                    postal_code: a.postal_code,
                    country: a.country,
                    primary: a.primary,
                })
                .collect(),
        }
    }
}

impl DirectoryClient {
    async fn fetch_users(
        &self,
        operation: &str,
        query: Option<&str>,
        show_deleted: bool,
    ) -> SyncResult<Vec<SourceUser>> {
        let page_size = self.config().page_size.to_string();
        let mut params = vec![
            ("customer", self.config().customer_id.as_str()),
            ("maxResults", page_size.as_str()),
            ("projection", "full"),
        ];
        if let Some(query) = query.filter(|q| !q.trim().is_empty()) {
            params.push(("query", query));
        }
        if show_deleted {
            params.push(("showDeleted", "true"));
        }
        let url = self
            .endpoint("users", &params)
            .map_err(|e| e.into_sync_error(operation))?;

        let users: Vec<WireUser> = self.get_all(operation, &url).await?;
        Ok(users.into_iter().map(SourceUser::from).collect())
    }

    /// Fetch active and suspended users matching `query`.
    #[instrument(skip(self))]
    pub async fn fetch_all_users(&self, query: Option<&str>) -> SyncResult<Vec<SourceUser>> {
        let users = self.fetch_users("list_users", query, false).await?;
        info!(count = users.len(), "Fetched source users");
        Ok(users)
    }

    /// Fetch users the directory reports as deleted.
    #[instrument(skip(self))]
    pub async fn fetch_deleted_users(&self) -> SyncResult<Vec<SourceUser>> {
        let users = self.fetch_users("list_deleted_users", None, true).await?;
        info!(count = users.len(), "Fetched deleted source users");
        Ok(users)
    }
}
