use anyhow::{ensure, Result};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use tower::ServiceExt;
use zivpn_access::create_router;

mod common;
use common::{credential, today, TestServer};

#[tokio::test]
#[serial_test::serial]
async fn router_builds_from_environment() -> Result<()> {
    // ---
    let dir = tempfile::tempdir()?;
    std::env::set_var("ZIVPN_BACKEND", "memory");
    std::env::set_var("ZIVPN_USERS_FILE", dir.path().join("users.json"));

    let router = create_router().expect("Should be able to create router");
    let response = router
        .oneshot(Request::builder().uri("/health").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    std::env::remove_var("ZIVPN_BACKEND");
    std::env::remove_var("ZIVPN_USERS_FILE");
    Ok(())
}

#[tokio::test]
#[serial_test::serial]
async fn health_endpoint_works() -> Result<()> {
    // ---
    let server = TestServer::new().await;

    let light = server.client.get(server.url("/health")).send().await?;
    assert!(light.status().is_success());
    let body: Value = light.json().await?;
    assert_eq!(body["status"], "ok");

    server.seed(vec![credential("alice", 6000)]).await;
    let full: Value = server
        .client
        .get(server.url("/health?mode=full"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(full["status"], "ok");
    assert_eq!(full["components"]["credentials"], 1);
    Ok(())
}

#[tokio::test]
#[serial_test::serial]
async fn root_endpoint_lists_routes() {
    // ---
    let server = TestServer::new().await;

    let response = server
        .client
        .get(server.url("/"))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 200);

    let body = response.text().await.expect("Failed to read response body");
    assert!(body.contains("/credentials"));
    assert!(body.contains(env!("CARGO_PKG_VERSION")));
}

#[tokio::test]
#[serial_test::serial]
async fn credential_lifecycle() -> Result<()> {
    // ---
    let server = TestServer::new().await;

    // Create
    let response = server
        .client
        .post(server.url("/credentials"))
        .json(&json!({ "username": "alice", "secret": "pw1" }))
        .send()
        .await?;
    assert_eq!(response.status(), 200);
    let created: Value = response.json().await?;
    assert_eq!(created["data"]["user"], "alice");
    assert_eq!(created["data"]["port"], 6000);
    assert_eq!(created["data"]["expires"], "2025-07-15");
    ensure!(created.get("warnings").is_none(), "unexpected warnings: {created}");

    // Update in place, case-insensitively
    let updated: Value = server
        .client
        .post(server.url("/credentials"))
        .json(&json!({ "username": "Alice", "secret": "pw2", "expires": "2026-01-31" }))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(updated["data"]["user"], "alice");
    assert_eq!(updated["data"]["password"], "pw2");
    assert_eq!(updated["data"]["port"], 6000);
    assert_eq!(updated["data"]["expires"], "2026-01-31");
    assert_eq!(server.vpn.current(), Some(vec!["pw2".to_string()]));

    // List
    let listed: Value = server
        .client
        .get(server.url("/credentials"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(listed["data"]["counts"]["total"], 1);
    assert_eq!(listed["data"]["entries"][0]["user"], "alice");
    assert_eq!(listed["data"]["entries"][0]["status"], "Unknown");

    // Delete
    let response = server
        .client
        .delete(server.url("/credentials/alice"))
        .send()
        .await?;
    assert_eq!(response.status(), 200);
    assert_eq!(server.vpn.current(), Some(Vec::<String>::new()));

    let response = server
        .client
        .delete(server.url("/credentials/alice"))
        .send()
        .await?;
    assert_eq!(response.status(), 404);
    let body: Value = response.json().await?;
    assert_eq!(body["error"], "user not found: alice");
    Ok(())
}

#[tokio::test]
#[serial_test::serial]
async fn invalid_input_is_unprocessable() -> Result<()> {
    // ---
    let server = TestServer::new().await;

    let response = server
        .client
        .post(server.url("/credentials"))
        .json(&json!({ "username": "bob", "secret": "pw", "port": 80 }))
        .send()
        .await?;
    assert_eq!(response.status(), 422);
    let body: Value = response.json().await?;
    assert_eq!(body["error"], "port must be between 6000 and 19999");

    let response = server
        .client
        .post(server.url("/credentials"))
        .json(&json!({ "username": "bob", "secret": "pw", "port": 70000 }))
        .send()
        .await?;
    assert_eq!(response.status(), 422);
    let body: Value = response.json().await?;
    assert_eq!(body["error"], "port must be between 6000 and 19999");

    let response = server
        .client
        .post(server.url("/credentials"))
        .json(&json!({ "username": "bob", "secret": "pw", "bound_ip": "not-an-ip" }))
        .send()
        .await?;
    assert_eq!(response.status(), 422);

    let response = server
        .client
        .get(server.url("/credentials?filter=sometimes"))
        .send()
        .await?;
    assert_eq!(response.status(), 422);
    Ok(())
}

#[tokio::test]
#[serial_test::serial]
async fn form_style_port_and_rename_are_accepted() -> Result<()> {
    // ---
    let server = TestServer::new().await;

    let created: Value = server
        .client
        .post(server.url("/credentials"))
        .json(&json!({ "username": "bob", "secret": "pw", "port": "6001" }))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(created["data"]["port"], 6001);

    let renamed: Value = server
        .client
        .post(server.url("/credentials"))
        .json(&json!({ "username": "robert", "secret": "pw", "original_username": "bob" }))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(renamed["data"]["user"], "robert");
    assert_eq!(renamed["data"]["port"], 6001);

    let response = server
        .client
        .delete(server.url("/credentials/bob"))
        .send()
        .await?;
    assert_eq!(response.status(), 404);
    Ok(())
}

#[tokio::test]
#[serial_test::serial]
async fn server_handles_malformed_json() -> Result<()> {
    // ---
    let server = TestServer::new().await;

    let response = server
        .client
        .post(server.url("/credentials"))
        .header("content-type", "application/json")
        .body("{ invalid json }")
        .send()
        .await
        .expect("Failed to send request");

    // Should return 400 Bad Request with the shared error body
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await?;
    ensure!(body["error"].is_string());
    Ok(())
}

#[tokio::test]
#[serial_test::serial]
async fn device_lock_follows_observed_traffic() -> Result<()> {
    // ---
    let server = TestServer::new().await;
    server.seed(vec![credential("alice", 6000)]).await;

    // No traffic yet
    let response = server
        .client
        .post(server.url("/credentials/alice/lock"))
        .json(&json!({ "op": "lock" }))
        .send()
        .await?;
    assert_eq!(response.status(), 409);
    assert!(server.filter.rules().is_empty());

    server.traffic_from("198.51.100.20", 6000);
    let locked: Value = server
        .client
        .post(server.url("/credentials/alice/lock"))
        .json(&json!({ "op": "lock" }))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(locked["data"]["bind_ip"], "198.51.100.20");
    assert_eq!(server.filter.rules().len(), 2);

    let cleared = server
        .client
        .post(server.url("/credentials/alice/lock"))
        .json(&json!({ "op": "clear" }))
        .send()
        .await?;
    assert_eq!(cleared.status(), 200);
    let cleared: Value = cleared.json().await?;
    ensure!(cleared["data"].get("bind_ip").is_none());
    assert!(server.filter.rules().is_empty());

    let response = server
        .client
        .post(server.url("/credentials/alice/lock"))
        .json(&json!({ "op": "unlock" }))
        .send()
        .await?;
    assert_eq!(response.status(), 422);

    let response = server
        .client
        .post(server.url("/credentials/nobody/lock"))
        .json(&json!({ "op": "clear" }))
        .send()
        .await?;
    assert_eq!(response.status(), 404);
    Ok(())
}

#[tokio::test]
#[serial_test::serial]
async fn status_filters_split_online_and_expired() -> Result<()> {
    // ---
    let server = TestServer::new().await;
    let mut expired = credential("carol", 6002);
    expired.expires_at = today().pred_opt();
    server
        .seed(vec![credential("alice", 6000), credential("bob", 6001), expired])
        .await;
    server.network.set_listening([6000, 6001]);
    server.traffic_from("198.51.100.20", 6000);

    let online: Value = server
        .client
        .get(server.url("/credentials?filter=online"))
        .send()
        .await?
        .json()
        .await?;
    let entries = online["data"]["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["user"], "alice");
    assert_eq!(entries[0]["status"], "Online");
    assert_eq!(online["data"]["counts"]["offline"], 1);
    assert_eq!(online["data"]["counts"]["expired"], 1);

    // carol was pruned by the first view; a second view no longer sees her
    let expired: Value = server
        .client
        .get(server.url("/credentials?filter=expired"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(expired["data"]["entries"].as_array().unwrap().len(), 0);
    assert_eq!(server.vpn.current().unwrap().len(), 2);
    Ok(())
}

#[tokio::test]
#[serial_test::serial]
async fn reconcile_endpoint_reports_work_done() -> Result<()> {
    // ---
    let server = TestServer::new().await;
    let mut expired = credential("dave", 6003);
    expired.expires_at = today().pred_opt();
    server.seed(vec![expired]).await;

    let report: Value = server
        .client
        .post(server.url("/reconcile"))
        .send()
        .await?
        .json()
        .await?;

    assert_eq!(report["data"]["pruned"][0]["user"], "dave");
    assert_eq!(report["data"]["rules_removed"], 0);
    Ok(())
}

#[tokio::test]
#[serial_test::serial]
async fn concurrent_creates_get_distinct_ports() {
    // ---
    let server = TestServer::new().await;

    let futures = (0..10).map(|i| {
        server
            .client
            .post(server.url("/credentials"))
            .json(&json!({ "username": format!("user{i}"), "secret": format!("pw{i}") }))
            .send()
    });

    let responses = futures::future::join_all(futures).await;

    let mut ports = BTreeSet::new();
    for response in responses {
        let response = response.expect("Request should succeed");
        assert_eq!(response.status(), 200);
        let body: Value = response.json().await.unwrap();
        ports.insert(body["data"]["port"].as_u64().unwrap());
    }
    assert_eq!(ports.len(), 10);
    assert_eq!(ports.first(), Some(&6000));
    assert_eq!(ports.last(), Some(&6009));
}

#[tokio::test]
#[serial_test::serial]
async fn invalid_routes_return_404() {
    // ---
    let server = TestServer::new().await;

    let response = server
        .client
        .get(server.url("/nonexistent"))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 404);
}
