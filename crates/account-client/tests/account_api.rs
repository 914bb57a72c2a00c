//! Integration tests for the account client
//!
//! These tests run the client against a wiremock server and check the wire
//! format, authentication and error handling.

use account_client::{AccountClient, AccountClientConfig, ClientError};
use savestore::backend::{BackendError, RemoteSession};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> AccountClient {
    AccountClient::new(AccountClientConfig::new(server.uri()).with_token("secret")).unwrap()
}

fn pair(k: &str, v: &str) -> (String, String) {
    (k.to_string(), v.to_string())
}

#[tokio::test]
async fn test_fetch_data() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/player/data"))
        .and(header("Authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [["DataProcoins", "150"], ["DataProlevel", 4], ["other", "x"]]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let data = client_for(&server).fetch_data().await.unwrap().unwrap();

    assert_eq!(
        data,
        vec![pair("DataProcoins", "150"), pair("DataProlevel", "4"), pair("other", "x")]
    );
}

#[tokio::test]
async fn test_fetch_without_saves() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/player/data"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": null})))
        .mount(&server)
        .await;

    assert_eq!(client_for(&server).fetch_data().await.unwrap(), None);
}

#[tokio::test]
async fn test_fetch_with_missing_data_field() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/player/data"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    assert_eq!(client_for(&server).fetch_data().await.unwrap(), None);
}

#[tokio::test]
async fn test_store_data_sends_full_list() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/player/data"))
        .and(header("Authorization", "Bearer secret"))
        .and(body_json(json!({"data": [["DataProcoins", "150"], ["other", "x"]]})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client_for(&server)
        .store_data(&[pair("DataProcoins", "150"), pair("other", "x")])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_error_status() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/player/data"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
        .mount(&server)
        .await;

    match client_for(&server).fetch_data().await {
        Err(ClientError::Status { status, message }) => {
            assert_eq!(status, 401);
            assert_eq!(message, "token expired");
        }
        other => panic!("Expected status error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_body() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/player/data"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    assert!(matches!(client_for(&server).fetch_data().await, Err(ClientError::Json(_))));
}

#[tokio::test]
async fn test_session_trait_maps_errors() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/player/data"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let result = client.set_data(vec![pair("DataProcoins", "1")]).await;
    assert!(matches!(result, Err(BackendError::Remote(_))));

    let anonymous = AccountClient::new(AccountClientConfig::new(server.uri())).unwrap();
    assert!(matches!(anonymous.get_data().await, Err(BackendError::SessionUnavailable)));
}
