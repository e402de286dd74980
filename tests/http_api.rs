mod common;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt;

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

async fn send_json(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let (status, body) = send(app, req).await;
    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, value)
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

async fn login(app: &Router, username: &str, password: &str) -> String {
    let (status, body) = send_json(
        app,
        json_request(
            "POST",
            "/api/v1/auth/login",
            None,
            json!({ "username": username, "password": password }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    body["token"].as_str().unwrap().to_string()
}

fn relative(url: &str) -> &str {
    url.strip_prefix(common::PUBLIC_URL).unwrap()
}

#[tokio::test]
async fn health_endpoints() {
    let test = common::setup().await;
    let app = pfss::app(test.state.clone(), test.cfg.max_upload_bytes);

    let (status, body) = send_json(&app, get("/healthz", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = send_json(&app, get("/readyz", None)).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["checks"]["sqlite"]["ok"], true);
    assert_eq!(body["checks"]["disk"]["ok"], true);
}

#[tokio::test]
async fn requests_without_a_valid_token_are_rejected() {
    let test = common::setup().await;
    let app = pfss::app(test.state.clone(), test.cfg.max_upload_bytes);

    let (status, body) = send_json(&app, get("/api/v1/buckets", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], 401);
    assert!(body["error"].is_string());

    let (status, _) = send_json(&app, get("/api/v1/buckets", Some("not-a-jwt"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send_json(
        &app,
        json_request(
            "POST",
            "/api/v1/auth/login",
            None,
            json!({ "username": "root", "password": "wrong-password" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid username or password");
}

#[tokio::test]
async fn register_create_bucket_upload_and_download() {
    let test = common::setup().await;
    let app = pfss::app(test.state.clone(), test.cfg.max_upload_bytes);

    let (status, body) = send_json(
        &app,
        json_request(
            "POST",
            "/api/v1/auth/register",
            None,
            json!({ "username": "alice", "password": "password123" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert!(body["user"]["password_hash"].is_null());
    let token = body["token"].as_str().unwrap().to_string();

    let (status, bucket) = send_json(
        &app,
        json_request(
            "POST",
            "/api/v1/buckets",
            Some(&token),
            json!({ "name": "pfss-docs", "description": "shared docs" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", bucket);
    let bucket_id = bucket["id"].as_str().unwrap().to_string();

    let (status, body) = send_json(
        &app,
        json_request("POST", "/api/v1/buckets", Some(&token), json!({ "name": "docs" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 400);

    let boundary = "pfss-test-boundary";
    let multipart = format!(
        "--{b}\r\n\
         Content-Disposition: form-data; name=\"path\"\r\n\r\n\
         /reports/q3.txt\r\n\
         --{b}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"q3.txt\"\r\n\
         Content-Type: text/plain\r\n\r\n\
         revenue up\r\n\
         --{b}--\r\n",
        b = boundary
    );
    let upload = Request::builder()
        .method("POST")
        .uri(format!("/api/v1/buckets/{}/files", bucket_id))
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(Body::from(multipart))
        .unwrap();
    let (status, file) = send_json(&app, upload).await;
    assert_eq!(status, StatusCode::CREATED, "{}", file);
    assert_eq!(file["path"], "/reports/q3.txt");
    assert_eq!(file["size"], 10);
    assert!(file.get("storage_path").is_none());
    let file_id = file["id"].as_str().unwrap().to_string();

    let (status, listing) = send_json(
        &app,
        get(&format!("/api/v1/buckets/{}/files?page=1&page_size=500", bucket_id), Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing["total"], 1);
    assert_eq!(listing["page_size"], 10);

    let (status, detail) =
        send_json(&app, get(&format!("/api/v1/buckets/{}", bucket_id), Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["name"], "pfss-docs");
    assert_eq!(detail["permissions"][0]["access"], "admin");

    let (status, signed) = send_json(
        &app,
        get(&format!("/api/v1/files/{}/download-url", file_id), Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let url = signed["url"].as_str().unwrap().to_string();

    let (status, content) = send(&app, get(relative(&url), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content, b"revenue up");

    let tampered = url.replace("op=download", "op=upload");
    let (status, _) = send_json(&app, get(relative(&tampered), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn signed_upload_then_download() {
    let test = common::setup().await;
    let app = pfss::app(test.state.clone(), test.cfg.max_upload_bytes);
    let token = login(&app, "root", common::ROOT_PASSWORD).await;

    let (_, bucket) = send_json(
        &app,
        json_request("POST", "/api/v1/buckets", Some(&token), json!({ "name": "pfss-root" })),
    )
    .await;
    let (status, record) = send_json(
        &app,
        json_request(
            "POST",
            "/api/v1/files",
            Some(&token),
            json!({
                "bucket_id": bucket["id"],
                "name": "data.csv",
                "path": "/data.csv",
                "content_type": "text/csv",
                "metadata": { "source": "export" }
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", record);
    assert_eq!(record["metadata"]["source"], "export");
    let file_id = record["id"].as_str().unwrap().to_string();

    // No content yet, so there is nothing to download.
    let (status, _) = send_json(
        &app,
        get(&format!("/api/v1/files/{}/download-url", file_id), Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, signed) = send_json(
        &app,
        get(&format!("/api/v1/files/{}/upload-url", file_id), Some(&token)),
    )
    .await;
    let url = signed["url"].as_str().unwrap().to_string();
    let put = Request::builder()
        .method("PUT")
        .uri(relative(&url))
        .header(header::CONTENT_TYPE, "text/csv")
        .body(Body::from("a,b\n1,2\n"))
        .unwrap();
    let (status, stored) = send_json(&app, put).await;
    assert_eq!(status, StatusCode::OK, "{}", stored);
    assert_eq!(stored["size"], 8);

    let (_, signed) = send_json(
        &app,
        get(&format!("/api/v1/files/{}/download-url", file_id), Some(&token)),
    )
    .await;
    let (status, content) = send(&app, get(relative(signed["url"].as_str().unwrap()), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content, b"a,b\n1,2\n");
}
