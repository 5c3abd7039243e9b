use axum::response::IntoResponse;

pub async fn root_handler() -> impl IntoResponse {
    let version = env!("CARGO_PKG_VERSION");
    format!(
        r#"ZIVPN access control
Version: {version}

Available endpoints:
  - GET    /credentials?filter=all|online|expired - Credentials with live status
  - POST   /credentials                           - Add or update a credential
  - DELETE /credentials/{{username}}                - Delete a credential
  - POST   /credentials/{{username}}/lock           - Lock ({{"op":"lock"}}) or clear ({{"op":"clear"}})
  - POST   /reconcile                             - Prune, auto-bind and repair firewall rules now
  - GET    /health                                - Light health check
  - GET    /health?mode=full                      - Full health check (registry and packet filter)
  - GET    /metrics                               - Prometheus metrics
"#
    )
}
