//! Source directory adapter for idsync.
//!
//! Reads users, deleted users, groups and (nested) group members from the
//! directory REST API and exposes them through
//! [`idsync_core::DirectorySource`].

pub mod client;
pub mod error;
pub mod groups;
mod source;
pub mod users;

pub use client::{DirectoryClient, DirectoryConfig, DEFAULT_BASE_URL, MY_CUSTOMER};
pub use error::{DirectoryError, DirectoryResult};
