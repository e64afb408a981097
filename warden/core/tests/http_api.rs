// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

#![cfg(unix)]

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;
use warden_core::application::WardenServices;
use warden_core::domain::config::WardenConfigManifest;
use warden_core::presentation::app;

struct TestServer {
    root: TempDir,
    _state: TempDir,
    router: Router,
}

fn server() -> TestServer {
    let root = TempDir::new().unwrap();
    let state = TempDir::new().unwrap();

    let mut config = WardenConfigManifest::default();
    config.spec.sandbox.root = root.path().to_path_buf();
    config.spec.nginx.command = vec![
        "/bin/sh".to_string(),
        "-c".to_string(),
        "echo \"nginx: $*\"".to_string(),
        "nginx".to_string(),
    ];
    config.spec.nginx.system_config = state.path().join("nginx.conf");
    config.spec.acme.home = state.path().join("acme");
    config.spec.logs.operation_log = state.path().join("cert-obtain.log");

    let services = WardenServices::from_config(&config).unwrap();
    TestServer {
        root,
        _state: state,
        router: app(services),
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

async fn get(router: &Router, uri: &str) -> (StatusCode, Vec<u8>) {
    send(
        router,
        Request::builder().uri(uri).body(Body::empty()).unwrap(),
    )
    .await
}

async fn post(router: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let (status, bytes) = send(
        router,
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await;
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn json_body(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap()
}

#[tokio::test]
async fn test_health() {
    let server = server();
    let (status, body) = get(&server.router, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body)["status"], "healthy");
}

#[tokio::test]
async fn test_write_then_read_as_plain_text() {
    let server = server();

    let (status, body) = post(
        &server.router,
        "/api/file/write",
        json!({ "path": "/sites-available/default", "content": "server {}\n" }),
    )
    .await;
    // Parent does not exist yet
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");

    let (status, body) = post(
        &server.router,
        "/api/file/create",
        json!({ "path": "/sites-available", "isDir": true }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));

    let (status, _) = post(
        &server.router,
        "/api/file/write",
        json!({ "path": "/sites-available/default", "content": "server {}\n" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let response = server
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/file/read?path=/sites-available/default")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"server {}\n");
}

#[tokio::test]
async fn test_list_defaults_to_root() {
    let server = server();
    std::fs::write(server.root.path().join("nginx.conf"), "events {}\n").unwrap();
    std::fs::create_dir(server.root.path().join("conf.d")).unwrap();

    let (status, body) = get(&server.router, "/api/files").await;
    assert_eq!(status, StatusCode::OK);

    let entries = json_body(&body);
    let entries = entries.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    let conf_d = entries.iter().find(|e| e["name"] == "conf.d").unwrap();
    assert_eq!(conf_d["isDir"], true);
    let conf = entries.iter().find(|e| e["name"] == "nginx.conf").unwrap();
    assert_eq!(conf["size"], 10);
}

#[tokio::test]
async fn test_error_kinds_map_to_status() {
    let server = server();

    let (status, body) = get(&server.router, "/api/file/read").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&body)["kind"], "invalid_request");

    let (status, body) = get(&server.router, "/api/file/read?path=../../etc/passwd").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json_body(&body)["kind"], "sandbox_violation");

    let (status, body) = get(&server.router, "/api/file/read?path=/absent.conf").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json_body(&body)["kind"], "not_found");

    let (status, body) = send(
        &server.router,
        Request::builder()
            .method("POST")
            .uri("/api/file/delete")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&body)["kind"], "invalid_request");

    let (status, body) = post(&server.router, "/api/file/delete", json!({ "path": "/" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_request");
    assert!(server.root.path().exists());
}

#[tokio::test]
async fn test_rename_and_move() {
    let server = server();
    std::fs::write(server.root.path().join("a.conf"), "a").unwrap();
    std::fs::create_dir(server.root.path().join("archive")).unwrap();

    let (status, _) = post(
        &server.router,
        "/api/file/rename",
        json!({ "oldPath": "/a.conf", "newPath": "/b.conf" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(server.root.path().join("b.conf").exists());

    let (status, body) = post(
        &server.router,
        "/api/file/move",
        json!({ "sourcePath": "/b.conf", "targetPath": "/archive" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["path"].as_str().unwrap().ends_with("b.conf"));
    assert!(server.root.path().join("archive/b.conf").exists());

    let (status, body) = post(
        &server.router,
        "/api/file/move",
        json!({ "sourcePath": "/archive/b.conf", "targetPath": "../outside.conf" }),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "sandbox_violation");
    assert!(server.root.path().join("archive/b.conf").exists());
}

#[tokio::test]
async fn test_symlink_endpoint() {
    let server = server();
    std::fs::create_dir(server.root.path().join("sites-available")).unwrap();
    std::fs::create_dir(server.root.path().join("sites-enabled")).unwrap();
    std::fs::write(server.root.path().join("sites-available/app"), "server {}").unwrap();

    let (status, _) = post(
        &server.router,
        "/api/file/symlink",
        json!({ "linkPath": "/sites-enabled/app", "targetPath": "/sites-available/app" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let link = std::fs::read_link(server.root.path().join("sites-enabled/app")).unwrap();
    assert!(link.is_relative());
    let (status, body) = get(&server.router, "/api/file/read?path=/sites-enabled/app").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"server {}");
}

#[tokio::test]
async fn test_nginx_commands() {
    let server = server();

    let (status, body) = post(&server.router, "/api/nginx/test", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["output"], "nginx: -t\n");

    let (_, body) = post(&server.router, "/api/nginx/reload", json!({})).await;
    assert_eq!(body["output"], "nginx: -s reload\n");
}

#[tokio::test]
async fn test_log_endpoints_are_plain_text() {
    let server = server();
    let access = server.root.path().join("access.log");
    std::fs::write(&access, "one\ntwo\nthree\n").unwrap();
    std::fs::write(
        server.root.path().join("nginx.conf"),
        format!("access_log {} combined;\n", access.display()),
    )
    .unwrap();

    let (status, body) = get(&server.router, "/api/logs/access?lines=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"two\nthree\n");

    let (status, body) = get(&server.router, "/api/logs/cert-obtain").await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(body).unwrap().starts_with("Error reading log:"));

    let (status, body) = get(&server.router, "/api/logs/error?lines=many").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&body)["kind"], "invalid_request");
}

#[tokio::test]
async fn test_certificate_endpoints() {
    let server = server();

    let (status, body) = get(&server.router, "/api/certificates").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body), json!([]));

    let (status, body) = post(
        &server.router,
        "/api/certificates/obtain",
        json!({ "domains": [], "email": "admin@example.com", "challenge": "http-01" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_request");

    std::fs::write(server.root.path().join("nginx.conf"), "events {}\n").unwrap();
    let (status, body) = post(
        &server.router,
        "/api/certificates/delete",
        json!({ "certFile": "/nginx.conf" }),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "sandbox_violation");
    assert!(server.root.path().join("nginx.conf").exists());

    let (status, body) = post(
        &server.router,
        "/api/certificates/delete",
        json!({ "certFile": "/ssl/gone.crt", "keyFile": "/ssl/gone.key" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}
