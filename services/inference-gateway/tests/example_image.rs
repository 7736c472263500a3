mod common;

use axum::http::{header, StatusCode};
use axum::routing::get;
use axum::Router;
use common::{gray_png, spawn_gateway};
use serde_json::Value;

const LIMIT: usize = 1024 * 1024;

async fn spawn_upstream() -> String {
    let app = Router::new()
        .route("/sample.png", get(|| async { ([(header::CONTENT_TYPE, "image/png")], gray_png(42, 16)) }))
        .route("/gone", get(|| async { StatusCode::NOT_FOUND }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{addr}")
}

#[tokio::test]
async fn proxies_upstream_image() {
    let upstream = spawn_upstream().await;
    let gw = spawn_gateway(&format!("{upstream}/sample.png"), LIMIT).await;
    let resp = reqwest::get(gw.url("/example-image")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/png");
    let bytes = resp.bytes().await.unwrap();
    assert_eq!(bytes.as_ref(), gray_png(42, 16).as_slice());
}

#[tokio::test]
async fn upstream_error_status_becomes_500() {
    let upstream = spawn_upstream().await;
    let gw = spawn_gateway(&format!("{upstream}/gone"), LIMIT).await;
    let resp = reqwest::get(gw.url("/example-image")).await.unwrap();
    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().starts_with("Unable to fetch image: "));
}

#[tokio::test]
async fn unreachable_upstream_becomes_500() {
    let port = {
        let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        l.local_addr().unwrap().port()
    };
    let gw = spawn_gateway(&format!("http://127.0.0.1:{port}/sample.png"), LIMIT).await;
    let resp = reqwest::get(gw.url("/example-image")).await.unwrap();
    assert_eq!(resp.status(), 500);
    assert!(resp.json::<Value>().await.unwrap()["error"].as_str().unwrap().contains("Unable to fetch image"));
}
