//! Mock SCIM and identity-store endpoints built on wiremock.

#![allow(dead_code)]

use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use idsync_scim_client::{BearerToken, IdentityStoreClient, RetryPolicy, ScimClient};

pub const TEST_TOKEN: &str = "test-token-123";
pub const STORE_ID: &str = "d-1234567890";

/// A wiremock server preconfigured for the target APIs.
pub struct MockScimServer {
    server: MockServer,
}

impl MockScimServer {
    pub async fn new() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub fn server(&self) -> &MockServer {
        &self.server
    }

    /// A SCIM client that never retries.
    pub fn client(&self) -> ScimClient {
        ScimClient::with_http_client(
            &self.uri(),
            BearerToken::new(TEST_TOKEN),
            reqwest::Client::new(),
        )
        .with_retry_policy(RetryPolicy::none())
    }

    /// A SCIM client retrying immediately.
    pub fn retrying_client(&self, max_retries: u32) -> ScimClient {
        self.client()
            .with_retry_policy(RetryPolicy::new(max_retries, 0))
    }

    pub fn identity_store(&self) -> IdentityStoreClient {
        IdentityStoreClient::with_http_client(
            &self.uri(),
            STORE_ID,
            BearerToken::new(TEST_TOKEN),
            reqwest::Client::new(),
        )
        .with_retry_policy(RetryPolicy::none())
    }

    // =========================================================================
    // SCIM mocks
    // =========================================================================

    /// `GET /Users?filter=userName eq "<email>"` returning the given resources.
    pub async fn mock_user_filter(&self, email: &str, resources: Vec<Value>) {
        Mock::given(method("GET"))
            .and(path("/Users"))
            .and(query_param("filter", format!("userName eq \"{email}\"")))
            .respond_with(ResponseTemplate::new(200).set_body_json(list_response(resources)))
            .mount(&self.server)
            .await;
    }

    /// `GET /Groups?filter=displayName eq "<name>"` returning the given resources.
    pub async fn mock_group_filter(&self, name: &str, resources: Vec<Value>) {
        Mock::given(method("GET"))
            .and(path("/Groups"))
            .and(query_param("filter", format!("displayName eq \"{name}\"")))
            .respond_with(ResponseTemplate::new(200).set_body_json(list_response(resources)))
            .mount(&self.server)
            .await;
    }

    /// `POST /Users` answering with `status` and `body`.
    pub async fn mock_create_user(&self, status: u16, body: Value) {
        Mock::given(method("POST"))
            .and(path("/Users"))
            .and(header("Authorization", format!("Bearer {TEST_TOKEN}").as_str()))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    // =========================================================================
    // Identity store mocks
    // =========================================================================

    /// Answer one identity-store operation whose body contains `matching`.
    pub async fn mock_store_op(&self, operation: &str, matching: Value, status: u16, body: Value) {
        Mock::given(method("POST"))
            .and(path("/"))
            .and(header(
                "X-Amz-Target",
                format!("AWSIdentityStore.{operation}").as_str(),
            ))
            .and(body_partial_json(matching))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&self.server)
            .await;
    }
}

pub fn list_response(resources: Vec<Value>) -> Value {
    json!({
        "schemas": ["urn:ietf:params:scim:api:messages:2.0:ListResponse"],
        "totalResults": resources.len(),
        "startIndex": 1,
        "itemsPerPage": resources.len(),
        "Resources": resources,
    })
}

pub fn scim_user_json(id: &str, email: &str, active: bool) -> Value {
    json!({
        "schemas": ["urn:ietf:params:scim:schemas:core:2.0:User"],
        "id": id,
        "userName": email,
        "name": { "givenName": "Test", "familyName": "User" },
        "displayName": "Test User",
        "active": active,
        "emails": [{ "value": email, "type": "work", "primary": true }]
    })
}

pub fn scim_group_json(id: &str, name: &str) -> Value {
    json!({
        "schemas": ["urn:ietf:params:scim:schemas:core:2.0:Group"],
        "id": id,
        "displayName": name,
        "members": []
    })
}
