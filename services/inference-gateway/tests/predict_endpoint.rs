mod common;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use axum::routing::get;
use axum::Router;
use common::{gray_png, serve, spawn_gateway};
use inference_gateway::http::with_service_layers;
use reqwest::multipart::{Form, Part};
use serde_json::Value;

const LIMIT: usize = 16 * 1024 * 1024;
const ORIGIN: &str = "http://ui.local";

fn image_part(bytes: Vec<u8>) -> Part { Part::bytes(bytes).file_name("sample.png").mime_str("image/png").unwrap() }

fn decode_png(b64: &Value) -> image::GrayImage {
    let bytes = STANDARD.decode(b64.as_str().unwrap()).unwrap();
    image::load_from_memory(&bytes).unwrap().to_luma8()
}

#[tokio::test]
async fn gray_image_is_normal() {
    let gw = spawn_gateway("http://127.0.0.1:9/unused", LIMIT).await;
    let form = Form::new().part("file", image_part(gray_png(128, 64))).text("class_name", "bottle");
    let resp = reqwest::Client::new().post(gw.url("/predict")).multipart(form).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["result"], "normal");
    assert_eq!(body["threshold"], 0.05);
    assert!(body["score"].as_f64().unwrap() < 0.05);

    let recon = decode_png(&body["reconstructed_image"]);
    assert_eq!(recon.dimensions(), (64, 64));
    assert!(recon.pixels().all(|p| p.0[0] == 127));
    assert_eq!(decode_png(&body["anomaly_map"]).dimensions(), (64, 64));
}

#[tokio::test]
async fn repeated_requests_are_identical() {
    let gw = spawn_gateway("http://127.0.0.1:9/unused", LIMIT).await;
    let client = reqwest::Client::new();
    let mut bodies = Vec::new();
    for _ in 0..2 {
        let form = Form::new().text("class_name", "cable").part("file", image_part(gray_png(200, 97)));
        bodies.push(client.post(gw.url("/predict")).multipart(form).send().await.unwrap().json::<Value>().await.unwrap());
    }
    assert_eq!(bodies[0], bodies[1]);
    assert_eq!(bodies[0]["result"], "anomaly");
}

#[tokio::test]
async fn missing_fields_are_rejected() {
    let gw = spawn_gateway("http://127.0.0.1:9/unused", LIMIT).await;
    let client = reqwest::Client::new();

    let form = Form::new().text("class_name", "bottle");
    let resp = client.post(gw.url("/predict")).header("Origin", ORIGIN).multipart(form).send().await.unwrap();
    assert_eq!(resp.status(), 400);
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");
    assert_eq!(resp.json::<Value>().await.unwrap(), serde_json::json!({"error": "Missing file or class_name."}));

    let form = Form::new().part("file", image_part(gray_png(0, 8)));
    let resp = client.post(gw.url("/predict")).multipart(form).send().await.unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client.post(gw.url("/predict")).body("plain body").send().await.unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn text_field_named_file_is_not_an_upload() {
    let gw = spawn_gateway("http://127.0.0.1:9/unused", LIMIT).await;
    let form = Form::new().text("file", "just some text").text("class_name", "bottle");
    let resp = reqwest::Client::new().post(gw.url("/predict")).multipart(form).send().await.unwrap();
    assert_eq!(resp.status(), 400);
    assert_eq!(resp.json::<Value>().await.unwrap()["error"], "Missing file or class_name.");
}

#[tokio::test]
async fn unknown_class_is_a_server_error() {
    let gw = spawn_gateway("http://127.0.0.1:9/unused", LIMIT).await;
    let form = Form::new().part("file", image_part(gray_png(128, 64))).text("class_name", "teapot");
    let resp = reqwest::Client::new().post(gw.url("/predict")).header("Origin", ORIGIN).multipart(form).send().await.unwrap();
    assert_eq!(resp.status(), 500);
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Unknown class name: teapot");
}

#[tokio::test]
async fn bad_image_is_reported_before_bad_class() {
    let gw = spawn_gateway("http://127.0.0.1:9/unused", LIMIT).await;
    let form = Form::new().part("file", image_part(b"not an image".to_vec())).text("class_name", "teapot");
    let resp = reqwest::Client::new().post(gw.url("/predict")).multipart(form).send().await.unwrap();
    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert_ne!(body["error"], "Unknown class name: teapot");
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn undecodable_upload_is_a_server_error() {
    let gw = spawn_gateway("http://127.0.0.1:9/unused", LIMIT).await;
    let form = Form::new().part("file", Part::bytes(b"not an image".to_vec()).file_name("upload.bin")).text("class_name", "bottle");
    let resp = reqwest::Client::new().post(gw.url("/predict")).multipart(form).send().await.unwrap();
    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let gw = spawn_gateway("http://127.0.0.1:9/unused", 1024).await;
    let form = Form::new().text("class_name", "bottle").part("file", Part::bytes(vec![7u8; 16 * 1024]).file_name("big.png"));
    let resp = reqwest::Client::new().post(gw.url("/predict")).multipart(form).send().await.unwrap();
    assert_eq!(resp.status(), 413);
    assert!(resp.json::<Value>().await.unwrap()["error"].is_string());
}

#[tokio::test]
async fn cors_and_fallback() {
    let gw = spawn_gateway("http://127.0.0.1:9/unused", LIMIT).await;
    let client = reqwest::Client::new();

    let resp = client.get(gw.url("/classes")).header("Origin", ORIGIN).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["classes"][1]["name"], "cable");
    assert_eq!(body["classes"][1]["index"], 1);

    let resp = client.get(gw.url("/nope")).header("Origin", ORIGIN).send().await.unwrap();
    assert_eq!(resp.status(), 404);
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");
    assert!(resp.json::<Value>().await.unwrap()["error"].is_string());
}

#[tokio::test]
async fn wrong_method_gets_json_405() {
    let gw = spawn_gateway("http://127.0.0.1:9/unused", LIMIT).await;
    let client = reqwest::Client::new();

    let resp = client.get(gw.url("/predict")).header("Origin", ORIGIN).send().await.unwrap();
    assert_eq!(resp.status(), 405);
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");
    assert_eq!(resp.json::<Value>().await.unwrap()["error"], "Method GET not allowed for /predict");

    let resp = client.post(gw.url("/example-image")).send().await.unwrap();
    assert_eq!(resp.status(), 405);
    assert!(resp.json::<Value>().await.unwrap()["error"].is_string());
}

async fn explode() -> &'static str {
    panic!("handler exploded")
}

#[tokio::test]
async fn handler_panic_becomes_json_500() {
    let app = with_service_layers(Router::new().route("/explode", get(explode)), LIMIT);
    let base = serve(app).await;
    let resp = reqwest::Client::new().get(format!("{base}/explode")).header("Origin", ORIGIN).send().await.unwrap();
    assert_eq!(resp.status(), 500);
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Internal server error: handler exploded");
}
