//! Integration tests for user-flow attribute schema discovery.
//!
//! Mocks GET /identity/userFlowAttributes and verifies that the discovered
//! mapping table translates correctly in both directions.

use b2c_users::attributes::AttributeMap;
use b2c_users::auth::AccessToken;
use b2c_users::client::GraphClient;
use b2c_users::error::GraphError;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const EXT_CITY: &str = "extension_abc123_City";
const EXT_LOYALTY: &str = "extension_abc123_LoyaltyNumber";

fn tenant_schema() -> serde_json::Value {
    serde_json::json!({
        "@odata.context": "https://graph.microsoft.com/v1.0/$metadata#identity/userFlowAttributes",
        "value": [
            {"id": "givenName", "displayName": "Given Name", "userFlowAttributeType": "builtIn"},
            {"id": "surname", "displayName": "Surname", "userFlowAttributeType": "builtIn"},
            {"id": "jobTitle", "displayName": "Job Title", "userFlowAttributeType": "builtIn"},
            {"id": EXT_CITY, "displayName": "City", "userFlowAttributeType": "custom"},
            {"id": EXT_LOYALTY, "displayName": "LoyaltyNumber", "userFlowAttributeType": "custom"}
        ]
    })
}

fn mock_client(server: &MockServer) -> GraphClient {
    GraphClient::with_base_url(AccessToken::fixed("mock-token"), &server.uri())
}

#[tokio::test]
async fn discover_builds_mapping_from_tenant_schema() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/identity/userFlowAttributes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(tenant_schema()))
        .mount(&server)
        .await;

    let client = mock_client(&server);
    let map = AttributeMap::discover(&client).await.unwrap();

    // Built-ins map to themselves; custom names translate to extension ids.
    assert_eq!(map.resolve("givenName").unwrap(), "givenName");
    assert_eq!(map.resolve("city").unwrap(), EXT_CITY);
    assert_eq!(map.resolve("loyaltynumber").unwrap(), EXT_LOYALTY);

    assert!(map.is_custom(EXT_CITY));
    assert!(!map.is_custom("givenName"));

    // Reverse direction recovers the human name.
    assert_eq!(map.display_name(EXT_CITY), Some("city"));
    assert_eq!(map.display_name("givenName"), Some("givenName"));
}

#[tokio::test]
async fn resolve_rejects_unknown_names_with_the_allowed_set() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/identity/userFlowAttributes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(tenant_schema()))
        .mount(&server)
        .await;

    let map = AttributeMap::discover(&mock_client(&server)).await.unwrap();
    let err = map.resolve("shoesize").unwrap_err();

    assert!(matches!(err, GraphError::UnknownAttribute { .. }));
    let msg = err.to_string();
    assert!(msg.contains("shoesize is not a known attribute"), "got: {msg}");
    assert!(msg.contains("city"), "allowed set should name the custom attributes: {msg}");
    assert!(msg.contains("givenName"), "allowed set should name the built-ins: {msg}");
}

#[tokio::test]
async fn discover_propagates_permission_errors() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/identity/userFlowAttributes"))
        .respond_with(ResponseTemplate::new(403).set_body_string(
            r#"{"error":{"code":"Authorization_RequestDenied","message":"Insufficient privileges to complete the operation."}}"#,
        ))
        .mount(&server)
        .await;

    let err = AttributeMap::discover(&mock_client(&server)).await.unwrap_err();

    match err {
        GraphError::Api { status, body } => {
            assert_eq!(status.as_u16(), 403);
            assert!(body.contains("Authorization_RequestDenied"));
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn discover_is_served_from_cache_on_repeat() {
    let server = MockServer::start().await;

    // The schema endpoint must be hit exactly once for two discoveries on
    // the same client; the second is answered from the GET cache.
    Mock::given(method("GET"))
        .and(path("/identity/userFlowAttributes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(tenant_schema()))
        .expect(1)
        .mount(&server)
        .await;

    let client = mock_client(&server);
    let first = AttributeMap::discover(&client).await.unwrap();
    let second = AttributeMap::discover(&client).await.unwrap();

    assert_eq!(first.resolve("city").unwrap(), second.resolve("city").unwrap());
}
