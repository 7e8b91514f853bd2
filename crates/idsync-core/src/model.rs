//! Canonical directory value types.
//!
//! These are the only shapes the reconciliation engine sees. Wire formats
//! (SCIM JSON, identity-store JSON, directory-API JSON) are converted into
//! these types inside the adapter crates.

use serde::{Deserialize, Serialize};

/// Normalize an email / user name into a user correlation key.
#[must_use]
pub fn user_key(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Normalize a display name into a group correlation key.
#[must_use]
pub fn group_key(value: &str) -> String {
    value.trim().to_string()
}

/// Email address attached to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub primary: bool,
}

impl Email {
    /// A primary work address.
    pub fn primary(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            kind: Some("work".to_string()),
            primary: true,
        }
    }
}

/// Postal address attached to a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default)]
    pub primary: bool,
}

/// A user as the target directory knows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetUser {
    /// Target-assigned identifier. `None` until the user has been created.
    pub id: Option<String>,
    /// Source identifier, advisory only.
    pub external_id: Option<String>,
    /// Primary email, used as the correlation key.
    pub user_name: String,
    pub given_name: String,
    pub family_name: String,
    pub display_name: String,
    pub active: bool,
    #[serde(default)]
    pub emails: Vec<Email>,
    #[serde(default)]
    pub addresses: Vec<Address>,
}

impl TargetUser {
    /// Correlation key of this user.
    #[must_use]
    pub fn key(&self) -> String {
        user_key(&self.user_name)
    }

    /// Build the target representation of a source user.
    ///
    /// `active` is the inverse of the source's `suspended` flag.
    #[must_use]
    pub fn from_source(source: &SourceUser) -> Self {
        let display_name = if source.display_name.trim().is_empty() {
            format!("{} {}", source.given_name, source.family_name)
                .trim()
                .to_string()
        } else {
            source.display_name.clone()
        };

        let emails = if source.emails.is_empty() {
            vec![Email::primary(source.primary_email.clone())]
        } else {
            source.emails.clone()
        };

        Self {
            id: None,
            external_id: Some(source.id.clone()),
            user_name: source.primary_email.clone(),
            given_name: source.given_name.clone(),
            family_name: source.family_name.clone(),
            display_name,
            active: !source.suspended,
            emails,
            addresses: source.addresses.clone(),
        }
    }

    /// Same user carrying the given target identifier.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// A group as the target directory knows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetGroup {
    pub id: Option<String>,
    /// Source group identifier once correlated.
    pub external_id: Option<String>,
    pub display_name: String,
    /// Target user identifiers.
    #[serde(default)]
    pub members: Vec<String>,
}

impl TargetGroup {
    /// Correlation key of this group.
    #[must_use]
    pub fn key(&self) -> String {
        group_key(&self.display_name)
    }

    /// Build the target representation of a source group.
    #[must_use]
    pub fn from_source(source: &SourceGroup) -> Self {
        Self {
            id: None,
            external_id: Some(source.id.clone()),
            display_name: source.name.clone(),
            members: Vec::new(),
        }
    }

    /// Same group carrying the given target identifier.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// A user read from the source directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceUser {
    pub id: String,
    pub primary_email: String,
    pub given_name: String,
    pub family_name: String,
    #[serde(default)]
    pub display_name: String,
    /// Inverse polarity of [`TargetUser::active`].
    pub suspended: bool,
    #[serde(default)]
    pub emails: Vec<Email>,
    #[serde(default)]
    pub addresses: Vec<Address>,
}

impl SourceUser {
    /// Correlation key of this user.
    #[must_use]
    pub fn key(&self) -> String {
        user_key(&self.primary_email)
    }
}

/// A group read from the source directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceGroup {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl SourceGroup {
    /// Correlation key of this group.
    #[must_use]
    pub fn key(&self) -> String {
        group_key(&self.name)
    }
}

/// Kind of a source group member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberKind {
    User,
    Group,
    Customer,
    #[serde(other)]
    Other,
}

/// A member entry of a source group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMember {
    pub id: String,
    pub email: String,
    pub kind: MemberKind,
    #[serde(default)]
    pub status: Option<String>,
}

impl SourceMember {
    /// Correlation key of the member (user members only).
    #[must_use]
    pub fn key(&self) -> String {
        user_key(&self.email)
    }

    /// Whether the member is a user whose membership is active.
    #[must_use]
    pub fn is_active_user(&self) -> bool {
        self.kind == MemberKind::User
            && self
                .status
                .as_deref()
                .map_or(true, |s| s.eq_ignore_ascii_case("ACTIVE"))
    }
}
