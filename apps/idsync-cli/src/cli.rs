//! Command-line arguments.
//!
//! Every flag has an `IDSYNC_*` environment override. Flags left unset keep
//! the value from the settings file.

use std::path::PathBuf;

use clap::Parser;
use idsync_sync::SyncMethod;

use crate::logging::LogFormat;

/// Synchronize users, groups and memberships from the source directory into
/// the SCIM target.
#[derive(Debug, Parser)]
#[command(name = "idsync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// YAML settings file
    #[arg(short, long, env = "IDSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// How the source snapshot is built: users_groups or groups
    #[arg(long, env = "IDSYNC_SYNC_METHOD")]
    pub sync_method: Option<SyncMethod>,

    /// Log intended changes without applying them
    #[arg(long, env = "IDSYNC_DRY_RUN")]
    pub dry_run: bool,

    /// Record failed operations and keep going instead of aborting
    #[arg(long, env = "IDSYNC_CONTINUE_ON_ERROR")]
    pub continue_on_error: bool,

    /// Comma-separated user emails never touched
    #[arg(long, env = "IDSYNC_IGNORE_USERS", value_delimiter = ',')]
    pub ignore_users: Vec<String>,

    /// Comma-separated group names never touched
    #[arg(long, env = "IDSYNC_IGNORE_GROUPS", value_delimiter = ',')]
    pub ignore_groups: Vec<String>,

    /// Comma-separated group names; when set only these are synced
    #[arg(long, env = "IDSYNC_INCLUDE_GROUPS", value_delimiter = ',')]
    pub include_groups: Vec<String>,

    /// Source query narrowing the user listing
    #[arg(long, env = "IDSYNC_USER_MATCH")]
    pub user_match: Option<String>,

    /// Source query narrowing the group listing
    #[arg(long, env = "IDSYNC_GROUP_MATCH")]
    pub group_match: Option<String>,

    /// Log level or filter directives (RUST_LOG takes precedence)
    #[arg(long, env = "IDSYNC_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Log output format
    #[arg(long, env = "IDSYNC_LOG_FORMAT", value_enum)]
    pub log_format: Option<LogFormat>,

    /// Print the run report as JSON on stdout
    #[arg(long, env = "IDSYNC_PRINT_REPORT")]
    pub print_report: bool,

    /// SCIM endpoint of the target directory
    #[arg(long, env = "IDSYNC_SCIM_ENDPOINT")]
    pub scim_endpoint: Option<String>,

    /// Bearer token for the SCIM endpoint
    #[arg(long, env = "IDSYNC_SCIM_ACCESS_TOKEN", hide_env_values = true)]
    pub scim_access_token: Option<String>,

    /// Identity-store API endpoint
    #[arg(long, env = "IDSYNC_IDENTITY_STORE_ENDPOINT")]
    pub identity_store_endpoint: Option<String>,

    /// Identity-store id
    #[arg(long, env = "IDSYNC_IDENTITY_STORE_ID")]
    pub identity_store_id: Option<String>,

    /// Bearer token for the identity store (defaults to the SCIM token)
    #[arg(long, env = "IDSYNC_IDENTITY_STORE_TOKEN", hide_env_values = true)]
    pub identity_store_token: Option<String>,

    /// Base URL of the source directory API
    #[arg(long, env = "IDSYNC_DIRECTORY_BASE_URL")]
    pub directory_base_url: Option<String>,

    /// Customer id of the source directory
    #[arg(long, env = "IDSYNC_DIRECTORY_CUSTOMER_ID")]
    pub directory_customer_id: Option<String>,

    /// OAuth access token for the source directory
    #[arg(long, env = "IDSYNC_DIRECTORY_ACCESS_TOKEN", hide_env_values = true)]
    pub directory_access_token: Option<String>,
}
