use std::sync::Arc;
use std::time::Duration;

use imgtask_core::api::{
    Checksum, ChunkStream, Connector, ExponentialBackoff, ObjectClient, ObjectStore,
    SegmentOptions, SegmentedStore, StoreError, SwiftConfig,
};
use imgtask_plugins::store::{SwiftClient, SwiftConnector};
use mockito::{Matcher, Server};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

const BODY: &str = "small image body";

fn fast_retry() -> ExponentialBackoff {
    ExponentialBackoff::new(Duration::from_millis(1), Duration::from_millis(5), 0)
}

fn keystone_config(server: &Server) -> SwiftConfig {
    SwiftConfig {
        auth_address: server.url(),
        region: Some("RegionOne".into()),
        admin_user: "glance".into(),
        admin_password: "secret".into(),
        admin_tenant_name: "service".into(),
        auth_retries: 2,
        ..Default::default()
    }
}

#[tokio::test]
async fn keystone_endpoint_is_used_for_uploads() {
    let mut server = Server::new_async().await;
    let storage = format!("{}/v1/AUTH_t", server.url());
    let data = BODY.as_bytes().to_vec();

    let token = server
        .mock("POST", "/v2.0/tokens")
        .match_body(Matcher::PartialJson(json!({
            "auth": {
                "tenantName": "service",
                "passwordCredentials": {"username": "glance", "password": "secret"}
            }
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"access": {"token": {"id": "admin-tok", "expires": "2030-01-01T00:00:00Z"}}}).to_string())
        .create_async()
        .await;
    let endpoints = server
        .mock("GET", "/v2.0/tokens/user-tok/endpoints")
        .match_header("x-auth-token", "admin-tok")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({"endpoints": [
                {"type": "object-store", "region": "Other", "publicURL": "http://wrong"},
                {"type": "object-store", "region": "RegionOne", "publicURL": storage}
            ]})
            .to_string(),
        )
        .create_async()
        .await;
    let head_container = server
        .mock("HEAD", "/v1/AUTH_t/c")
        .match_header("x-auth-token", "user-tok")
        .with_status(204)
        .create_async()
        .await;
    let head_object = server
        .mock("HEAD", "/v1/AUTH_t/c/obj")
        .with_status(404)
        .create_async()
        .await;
    let put = server
        .mock("PUT", "/v1/AUTH_t/c/obj")
        .match_header("x-auth-token", "user-tok")
        .match_body(BODY)
        .with_status(201)
        .with_header("etag", &format!("\"{}\"", Checksum::of(&data)))
        .create_async()
        .await;

    let connector = SwiftConnector::with_http(
        keystone_config(&server),
        reqwest::Client::new(),
        fast_retry(),
    )
    .unwrap();
    let store = SegmentedStore::new(Arc::new(connector), SegmentOptions::default());

    let stored = store
        .add(
            "obj",
            ChunkStream::from_bytes(data.clone(), 4),
            data.len() as u64,
            Some("user-tok"),
            "c",
        )
        .await
        .unwrap();

    assert_eq!(stored.location, "swift://c/obj");
    assert_eq!(stored.checksum, Checksum::of(&data));
    assert_eq!(stored.size, data.len() as u64);
    for mock in [token, endpoints, head_container, head_object, put] {
        mock.assert_async().await;
    }
}

#[tokio::test]
async fn token_request_is_retried_on_server_errors() {
    let mut server = Server::new_async().await;
    let token = server
        .mock("POST", "/v2.0/tokens")
        .with_status(503)
        .with_body("unavailable")
        .expect(3)
        .create_async()
        .await;

    let connector = SwiftConnector::with_http(
        keystone_config(&server),
        reqwest::Client::new(),
        fast_retry(),
    )
    .unwrap();
    let err = connector.connect(Some("user-tok")).await.err().unwrap();

    assert!(matches!(err, StoreError::Backend(ref m) if m.contains("503")), "{err}");
    token.assert_async().await;
}

#[tokio::test]
async fn rejected_credentials_are_not_retried() {
    let mut server = Server::new_async().await;
    let token = server
        .mock("POST", "/v2.0/tokens")
        .with_status(401)
        .expect(1)
        .create_async()
        .await;

    let connector = SwiftConnector::with_http(
        keystone_config(&server),
        reqwest::Client::new(),
        fast_retry(),
    )
    .unwrap();
    let err = connector.connect(Some("user-tok")).await.err().unwrap();

    assert!(matches!(err, StoreError::Auth(_)), "{err}");
    token.assert_async().await;
}

#[tokio::test]
async fn keystone_requires_a_user_token() {
    let server = Server::new_async().await;
    let connector = SwiftConnector::with_http(
        keystone_config(&server),
        reqwest::Client::new(),
        fast_retry(),
    )
    .unwrap();
    let err = connector.connect(None).await.err().unwrap();
    assert!(matches!(err, StoreError::Auth(_)));
}

#[tokio::test]
async fn preauth_url_skips_keystone() {
    let mut server = Server::new_async().await;
    let get = server
        .mock("GET", "/v1/AUTH_x/c/obj")
        .with_status(200)
        .with_body("abcdefgh")
        .create_async()
        .await;

    let cfg = SwiftConfig {
        preauth_url: Some(format!("{}/v1/AUTH_x", server.url())),
        ..Default::default()
    };
    let connector = SwiftConnector::with_http(cfg, reqwest::Client::new(), fast_retry()).unwrap();
    let client = connector.connect(None).await.unwrap();

    let (mut stream, len) = client.get_object("c", "obj", 3).await.unwrap();
    assert_eq!(len, 8);
    assert_eq!(stream.read_to_end().await.unwrap().as_ref(), b"abcdefgh");
    get.assert_async().await;
}

#[tokio::test]
async fn missing_object_reads_as_not_found() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/v1/AUTH_x/c/gone")
        .with_status(404)
        .create_async()
        .await;

    let client = SwiftClient::new(
        reqwest::Client::new(),
        &format!("{}/v1/AUTH_x", server.url()),
        Some("tok".into()),
    );
    let err = client.get_object("c", "gone", 16).await.err().unwrap();
    assert_eq!(err.to_string(), "Swift could not find object gone.");
}

#[tokio::test]
async fn etag_mismatch_deletes_the_upload() {
    let mut server = Server::new_async().await;
    server
        .mock("HEAD", "/v1/AUTH_x/c")
        .with_status(204)
        .create_async()
        .await;
    server
        .mock("HEAD", "/v1/AUTH_x/c/obj")
        .with_status(404)
        .create_async()
        .await;
    server
        .mock("PUT", "/v1/AUTH_x/c/obj")
        .with_status(201)
        .with_header("etag", "0123456789abcdef0123456789abcdef")
        .create_async()
        .await;
    let delete = server
        .mock("DELETE", "/v1/AUTH_x/c/obj")
        .with_status(204)
        .expect(1)
        .create_async()
        .await;

    let cfg = SwiftConfig {
        preauth_url: Some(format!("{}/v1/AUTH_x", server.url())),
        ..Default::default()
    };
    let connector = SwiftConnector::with_http(cfg, reqwest::Client::new(), fast_retry()).unwrap();
    let store = SegmentedStore::new(Arc::new(connector), SegmentOptions::default());

    let err = store
        .add("obj", ChunkStream::from_bytes(&b"payload"[..], 4), 7, None, "c")
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Backend(_)));
    delete.assert_async().await;
}

#[tokio::test]
async fn conflicting_put_reads_as_duplicate() {
    let mut server = Server::new_async().await;
    server
        .mock("PUT", "/v1/AUTH_x/c/obj")
        .with_status(409)
        .with_body("object is being written")
        .create_async()
        .await;

    let client = SwiftClient::new(
        reqwest::Client::new(),
        &format!("{}/v1/AUTH_x", server.url()),
        Some("tok".into()),
    );
    let err = client
        .put_object("c", "obj", ChunkStream::from_bytes(&b"abc"[..], 4), Some(3), None)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Duplicate(_)));
}

/// Serves one GET whose body trickles out a byte at a time.
async fn trickling_server(body: &'static [u8], every: Duration) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            request.extend_from_slice(&buf[..n]);
        }
        let head = format!("HTTP/1.1 200 OK\r\ncontent-length: {}\r\n\r\n", body.len());
        socket.write_all(head.as_bytes()).await.unwrap();
        for byte in body {
            tokio::time::sleep(every).await;
            socket.write_all(&[*byte]).await.unwrap();
            socket.flush().await.unwrap();
        }
    });
    format!("http://{addr}/v1")
}

#[tokio::test]
async fn slow_download_outlives_the_read_timeout() {
    let url = trickling_server(b"0123456789", Duration::from_millis(100)).await;
    let cfg = SwiftConfig {
        preauth_url: Some(url),
        timeout_ms: 300,
        ..Default::default()
    };
    let connector = SwiftConnector::new(cfg).unwrap();
    let client = connector.connect(Some("tok")).await.unwrap();

    let (mut stream, len) = client.get_object("c", "o", 4).await.unwrap();
    assert_eq!(len, 10);
    assert_eq!(stream.read_to_end().await.unwrap().as_ref(), b"0123456789");
}
