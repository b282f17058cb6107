use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use tower::ServiceExt;

use tasknest::{app::build_app, state::AppState};

fn test_app() -> Router {
    build_app(AppState::fake())
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn healthz_is_open() {
    let response = test_app()
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn todos_require_a_token() {
    let response = test_app()
        .oneshot(Request::builder().uri("/todos").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let json = body_json(response).await;
    assert_eq!(json["statusCode"], 401);
    assert!(json["message"].is_string());
}

#[tokio::test]
async fn details_reject_a_garbage_bearer_token() {
    let response = test_app()
        .oneshot(
            Request::builder()
                .uri("/users/details")
                .header("Authorization", "Bearer not.a.jwt")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn details_reject_a_garbage_cookie_token() {
    let response = test_app()
        .oneshot(
            Request::builder()
                .uri("/users/details")
                .header("Cookie", "accessToken=not.a.jwt")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_requires_username_or_email() {
    let response = test_app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/users/login")
                .header("Content-Type", "application/json")
                .body(Body::from(r#"{"password": "pw123"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(response).await;
    assert_eq!(json["statusCode"], 400);
}

#[tokio::test]
async fn regenerate_requires_a_refresh_token() {
    let response = test_app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/users/regenerate-access-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn regenerate_rejects_a_forged_refresh_token() {
    let response = test_app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/users/regenerate-access-token")
                .header("Cookie", "refreshToken=forged.token.value")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn register_rejects_missing_fields() {
    let boundary = "test-boundary";
    let body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"username\"\r\n\r\nalice\r\n--{boundary}--\r\n"
    );
    let response = test_app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/users/register")
                .header(
                    "Content-Type",
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(response).await;
    assert_eq!(json["message"], "all fields are required");
}

#[tokio::test]
async fn register_rejects_an_invalid_email() {
    let boundary = "test-boundary";
    let mut body = String::new();
    for (name, value) in [
        ("username", "alice"),
        ("email", "not-an-email"),
        ("fullName", "Alice"),
        ("password", "pw123"),
    ] {
        body.push_str(&format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        ));
    }
    body.push_str(&format!("--{boundary}--\r\n"));

    let response = test_app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/users/register")
                .header(
                    "Content-Type",
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(response).await;
    assert_eq!(json["message"], "invalid email");
}

#[tokio::test]
async fn todo_mutations_require_a_token() {
    for (method, uri) in [
        ("POST", "/todos"),
        ("GET", "/todos/6b7f7f7e-3d4e-4f5a-9b1c-2d3e4f5a6b7c"),
        ("PATCH", "/todos/6b7f7f7e-3d4e-4f5a-9b1c-2d3e4f5a6b7c"),
        ("DELETE", "/todos/6b7f7f7e-3d4e-4f5a-9b1c-2d3e4f5a6b7c"),
    ] {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.status(),
            StatusCode::UNAUTHORIZED,
            "{method} {uri} should be gated"
        );
    }
}
