//! Target-directory adapters for idsync.
//!
//! [`client::ScimClient`] implements [`idsync_core::DirectoryTarget`] over
//! SCIM 2.0 and [`identity_store::IdentityStoreClient`] implements
//! [`idsync_core::IdentityStore`] over the identity-store JSON API.

pub mod auth;
pub mod client;
pub mod error;
pub mod identity_store;
pub mod models;
pub mod retry;

pub use auth::BearerToken;
pub use client::ScimClient;
pub use error::{ScimClientError, ScimClientResult};
pub use identity_store::IdentityStoreClient;
pub use retry::RetryPolicy;
