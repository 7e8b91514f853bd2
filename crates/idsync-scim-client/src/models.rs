//! SCIM 2.0 wire shapes (RFC 7643 / RFC 7644) and their conversion to the
//! canonical directory types.

use idsync_core::{Address, Email, MembershipOp, TargetGroup, TargetUser};
use serde::{Deserialize, Serialize};

pub const USER_SCHEMA: &str = "urn:ietf:params:scim:schemas:core:2.0:User";
pub const GROUP_SCHEMA: &str = "urn:ietf:params:scim:schemas:core:2.0:Group";
pub const PATCH_OP_SCHEMA: &str = "urn:ietf:params:scim:api:messages:2.0:PatchOp";

fn default_true() -> bool {
    true
}

/// SCIM User name component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScimName {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatted: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScimEmail {
    pub value: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub email_type: Option<String>,
    #[serde(default)]
    pub primary: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScimAddress {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub address_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatted: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub street_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locality: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default)]
    pub primary: bool,
}

/// SCIM User resource (RFC 7643 Section 4.1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScimUser {
    #[serde(default)]
    pub schemas: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub user_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<ScimName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub emails: Vec<ScimEmail>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<ScimAddress>,
}

impl From<&TargetUser> for ScimUser {
    fn from(user: &TargetUser) -> Self {
        Self {
            schemas: vec![USER_SCHEMA.to_string()],
            id: user.id.clone(),
            external_id: user.external_id.clone(),
            user_name: user.user_name.clone(),
            name: Some(ScimName {
                formatted: None,
                family_name: Some(user.family_name.clone()),
                given_name: Some(user.given_name.clone()),
            }),
            display_name: Some(user.display_name.clone()),
            active: user.active,
            emails: user
                .emails
                .iter()
                .map(|e| ScimEmail {
                    value: e.value.clone(),
                    email_type: e.kind.clone(),
                    primary: e.primary,
                })
                .collect(),
            addresses: user
                .addresses
                .iter()
                .map(|a| ScimAddress {
                    address_type: a.kind.clone(),
                    formatted: a.formatted.clone(),
                    street_address: a.street_address.clone(),
                    locality: a.locality.clone(),
                    region: a.region.clone(),
                    postal_code: a.postal_code.clone(),
                    country: a.country.clone(),
                    primary: a.primary,
                })
                .collect(),
        }
    }
}

impl From<ScimUser> for TargetUser {
    fn from(user: ScimUser) -> Self {
        let name = user.name.unwrap_or_default();
        Self {
            id: user.id,
            external_id: user.external_id,
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

/// Member reference inside a SCIM Group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScimGroupMember {
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

/// SCIM Group resource (RFC 7643 Section 4.2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScimGroup {
    #[serde(default)]
    pub schemas: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<ScimGroupMember>,
}

impl From<&TargetGroup> for ScimGroup {
    fn from(group: &TargetGroup) -> Self {
        Self {
            schemas: vec![GROUP_SCHEMA.to_string()],
            id: group.id.clone(),
            external_id: group.external_id.clone(),
            display_name: group.display_name.clone(),
            members: group
                .members
                .iter()
                .map(|id| ScimGroupMember {
                    value: id.clone(),
                    display: None,
                })
                .collect(),
        }
    }
}

impl From<ScimGroup> for TargetGroup {
    fn from(group: ScimGroup) -> Self {
        Self {
            id: group.id,
            external_id: group.external_id,
            display_name: group.display_name,
            members: group.members.into_iter().map(|m| m.value).collect(),
        }
    }
}

/// SCIM ListResponse (RFC 7644 Section 3.4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScimListResponse<T> {
    #[serde(default)]
    pub schemas: Vec<String>,
    #[serde(default)]
    pub total_results: i64,
    #[serde(default = "default_start_index")]
    pub start_index: i64,
    #[serde(default)]
    pub items_per_page: i64,
    #[serde(rename = "Resources", default = "Vec::new")]
    pub resources: Vec<T>,
}

fn default_start_index() -> i64 {
    1
}

impl<T> ScimListResponse<T> {
    /// 1-based index of the next page, or `None` when this is the last one.
    #[must_use]
    pub fn next_start_index(&self) -> Option<i64> {
        let next = self.start_index + self.resources.len() as i64;
        (!self.resources.is_empty() && next <= self.total_results).then_some(next)
    }
}

/// A single PATCH operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScimPatchOp {
    pub op: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

/// PATCH request body (RFC 7644 Section 3.5.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScimPatchRequest {
    pub schemas: Vec<String>,
    #[serde(rename = "Operations")]
    pub operations: Vec<ScimPatchOp>,
}

impl ScimPatchRequest {
    pub fn new(operations: Vec<ScimPatchOp>) -> Self {
        Self {
            schemas: vec![PATCH_OP_SCHEMA.to_string()],
            operations,
        }
    }

    /// One `add` or `remove` operation on `members` carrying every id.
    pub fn members(op: MembershipOp, member_ids: &[String]) -> Self {
        let members: Vec<serde_json::Value> = member_ids
            .iter()
            .map(|id| serde_json::json!({ "value": id }))
            .collect();
        Self::new(vec![ScimPatchOp {
            op: op.as_str().to_string(),
            path: Some("members".to_string()),
            value: Some(serde_json::Value::Array(members)),
        }])
    }

    /// Replace the core attributes of a group.
    pub fn replace_group_core(group: &TargetGroup) -> Self {
        let mut value = serde_json::json!({ "displayName": group.display_name });
        if let Some(external_id) = &group.external_id {
            value["externalId"] = serde_json::Value::String(external_id.clone());
        }
        Self::new(vec![ScimPatchOp {
            op: "replace".to_string(),
            path: None,
            value: Some(value),
        }])
    }
}

/// Escape a value for use inside a SCIM filter string literal.
#[must_use]
pub fn escape_scim_filter_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scim_user_deserialize_defaults_active() {
        let user: ScimUser = serde_json::from_value(json!({
            "id": "u-1",
            "userName": "alice@x.com",
            "name": { "givenName": "Alice", "familyName": "Smith" }
        }))
        .unwrap();

        let target = TargetUser::from(user);
        assert!(target.active);
        assert_eq!(target.given_name, "Alice");
        assert_eq!(target.id.as_deref(), Some("u-1"));
    }

    #[test]
    fn test_scim_user_serializes_camel_case() {
        let user = TargetUser {
            id: None,
            external_id: Some("src-1".into()),
            user_name: "bob@x.com".into(),
            given_name: "Bob".into(),
            family_name: "Jones".into(),
            display_name: "Bob Jones".into(),
            active: false,
            emails: vec![Email::primary("bob@x.com")],
            addresses: vec![],
        };

        let value = serde_json::to_value(ScimUser::from(&user)).unwrap();
        assert_eq!(value["userName"], "bob@x.com");
        assert_eq!(value["externalId"], "src-1");
        assert_eq!(value["active"], false);
        assert_eq!(value["name"]["givenName"], "Bob");
        assert_eq!(value["emails"][0]["type"], "work");
        assert!(value.get("id").is_none());
        assert!(value.get("addresses").is_none());
    }

    #[test]
    fn test_members_patch_shape() {
        let patch = ScimPatchRequest::members(MembershipOp::Remove, &["u1".into(), "u2".into()]);
        let value = serde_json::to_value(&patch).unwrap();
        assert_eq!(value["schemas"][0], PATCH_OP_SCHEMA);
        assert_eq!(value["Operations"][0]["op"], "remove");
        assert_eq!(value["Operations"][0]["path"], "members");
        assert_eq!(value["Operations"][0]["value"][1]["value"], "u2");
    }

    #[test]
    fn test_next_start_index() {
        let page: ScimListResponse<ScimGroup> = serde_json::from_value(json!({
            "totalResults": 3,
            "startIndex": 1,
            "itemsPerPage": 2,
            "Resources": [
                { "id": "g1", "displayName": "A" },
                { "id": "g2", "displayName": "B" }
            ]
        }))
        .unwrap();
        assert_eq!(page.next_start_index(), Some(3));

        let empty: ScimListResponse<ScimGroup> =
            serde_json::from_value(json!({ "totalResults": 0 })).unwrap();
        assert_eq!(empty.next_start_index(), None);
    }

    #[test]
    fn test_escape_filter_value() {
        assert_eq!(escape_scim_filter_value(r#"a"b\c"#), r#"a\"b\\c"#);
    }
}
