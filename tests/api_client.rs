mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use carelink::api::{ApiRequest, RefreshState};
use carelink::error::AppError;
use reqwest::StatusCode;
use serde_json::{Value, json};
use tokio::task::JoinSet;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

use common::{client, harness};

struct NoAuthorization;

impl Match for NoAuthorization {
    fn matches(&self, request: &Request) -> bool {
        !request.headers.contains_key("authorization")
    }
}

fn hook_counter(client: carelink::api::ApiClient) -> (carelink::api::ApiClient, Arc<AtomicUsize>) {
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    let client = client.with_session_expired_hook(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    (client, fired)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_stale_requests_share_one_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .and(body_json(json!({ "refreshToken": "refresh-0" })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    "accessToken": "access-1",
                    "refreshToken": "refresh-1",
                    "expiresIn": 3600
                }))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/jobs"))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(8)
        .mount(&server)
        .await;

    let h = harness();
    h.tokens
        .save("access-0", Some("refresh-0"), Some(60.0))
        .expect("seed");
    h.clock.advance(Duration::from_secs(30));
    assert!(h.tokens.is_expired());
    let client = client(&server.uri(), &h.tokens);

    let mut tasks = JoinSet::new();
    for _ in 0..8 {
        let client = client.clone();
        tasks.spawn(async move { client.get_json::<Value>("/jobs").await });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.expect("task").expect("request succeeds");
    }

    assert_eq!(h.tokens.access_token().as_deref(), Some("access-1"));
    assert_eq!(h.tokens.refresh_token().as_deref(), Some("refresh-1"));
    assert_eq!(client.refresh_state(), RefreshState::Idle);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_proactive_refresh_sends_everyone_unauthenticated() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(500)
                .set_body_json(json!({ "message": "boom" }))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/jobs"))
        .and(NoAuthorization)
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(5)
        .mount(&server)
        .await;

    let h = harness();
    h.tokens
        .save("access-0", Some("refresh-0"), Some(60.0))
        .expect("seed");
    h.clock.advance(Duration::from_secs(30));
    let client = client(&server.uri(), &h.tokens);

    let mut tasks = JoinSet::new();
    for _ in 0..5 {
        let client = client.clone();
        tasks.spawn(async move { client.get_json::<Value>("/jobs").await });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.expect("task").expect("request succeeds");
    }

    assert_eq!(h.tokens.access_token(), None);
    assert_eq!(h.tokens.refresh_token(), None);
}

#[tokio::test]
async fn stale_token_without_refresh_token_is_dropped() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/jobs"))
        .and(NoAuthorization)
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness();
    h.tokens.save("access-0", None, Some(60.0)).expect("seed");
    h.clock.advance(Duration::from_secs(60));
    let client = client(&server.uri(), &h.tokens);

    let jobs: Value = client.get_json("/jobs").await.expect("request succeeds");
    assert_eq!(jobs, json!([]));
    assert_eq!(h.tokens.access_token(), None);
}

#[tokio::test]
async fn single_401_is_retried_with_refreshed_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/matches"))
        .and(query_param("status", "active"))
        .and(header("authorization", "Bearer access-0"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "message": "jwt expired" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/matches"))
        .and(query_param("status", "active"))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 3 }])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "accessToken": "access-1", "expiresIn": 3600 })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let h = harness();
    h.tokens
        .save("access-0", Some("refresh-0"), Some(3600.0))
        .expect("seed");
    let (client, fired) = hook_counter(client(&server.uri(), &h.tokens));

    let request = ApiRequest::get("/matches").with_query("status", "active");
    let matches: Value = client.request_json(&request).await.expect("retry succeeds");

    assert_eq!(matches, json!([{ "id": 3 }]));
    assert_eq!(h.tokens.access_token().as_deref(), Some("access-1"));
    assert_eq!(h.tokens.refresh_token().as_deref(), Some("refresh-0"));
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn retried_request_resends_original_body() {
    let server = MockServer::start().await;
    let journal = json!({ "matchId": 3, "note": "walked in the park" });
    Mock::given(method("POST"))
        .and(path("/journals"))
        .and(header("authorization", "Bearer access-0"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/journals"))
        .and(header("authorization", "Bearer access-1"))
        .and(body_json(journal.clone()))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 11 })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "accessToken": "access-1" })))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness();
    h.tokens
        .save("access-0", Some("refresh-0"), None)
        .expect("seed");
    let client = client(&server.uri(), &h.tokens);

    let created: Value = client
        .post_json("/journals", &journal)
        .await
        .expect("retry succeeds");
    assert_eq!(created, json!({ "id": 11 }));
}

#[tokio::test]
async fn second_401_is_propagated_without_another_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jobs"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "message": "account suspended" })),
        )
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "accessToken": "access-1" })))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness();
    h.tokens
        .save("access-0", Some("refresh-0"), Some(3600.0))
        .expect("seed");
    let (client, fired) = hook_counter(client(&server.uri(), &h.tokens));

    let err = client
        .get_json::<Value>("/jobs")
        .await
        .expect_err("second 401 propagates");

    match err {
        AppError::Unauthorized(message) => assert!(message.contains("account suspended")),
        other => panic!("expected unauthorized error, got {other:?}"),
    }
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert_eq!(h.tokens.access_token().as_deref(), Some("access-1"));
}

#[tokio::test]
async fn failed_reactive_refresh_expires_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/reviews"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "message": "jwt expired" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "message": "refresh token revoked" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let h = harness();
    h.tokens
        .save("access-0", Some("refresh-0"), Some(3600.0))
        .expect("seed");
    let (client, fired) = hook_counter(client(&server.uri(), &h.tokens));

    let err = client
        .get_json::<Value>("/reviews")
        .await
        .expect_err("unrecoverable");

    match err {
        AppError::Unauthorized(message) => assert!(message.contains("jwt expired")),
        other => panic!("expected original unauthorized error, got {other:?}"),
    }
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(h.tokens.access_token(), None);
    assert_eq!(h.tokens.refresh_token(), None);
    assert_eq!(client.refresh_state(), RefreshState::Idle);
}

#[tokio::test]
async fn concurrent_401s_share_one_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jobs"))
        .and(header("authorization", "Bearer access-0"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/jobs"))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(6)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "accessToken": "access-1", "expiresIn": 3600 }))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let h = harness();
    h.tokens
        .save("access-0", Some("refresh-0"), Some(3600.0))
        .expect("seed");
    let client = client(&server.uri(), &h.tokens);

    let mut tasks = JoinSet::new();
    for _ in 0..6 {
        let client = client.clone();
        tasks.spawn(async move { client.get_json::<Value>("/jobs").await });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.expect("task").expect("request succeeds");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_refresh_fails_every_waiting_401() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jobs"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "message": "jwt expired" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(500)
                .set_body_json(json!({ "message": "refresh store down" }))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let h = harness();
    h.tokens
        .save("access-0", Some("refresh-0"), Some(3600.0))
        .expect("seed");
    let (client, fired) = hook_counter(client(&server.uri(), &h.tokens));

    let mut tasks = JoinSet::new();
    for _ in 0..6 {
        let client = client.clone();
        tasks.spawn(async move { client.get_json::<Value>("/jobs").await });
    }

    let mut unauthorized = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined.expect("task") {
            Err(AppError::Unauthorized(message)) => {
                assert!(message.contains("jwt expired"));
                unauthorized += 1;
            }
            other => panic!("expected original unauthorized error, got {other:?}"),
        }
    }

    assert_eq!(unauthorized, 6);
    assert_eq!(fired.load(Ordering::SeqCst), 6);
    assert_eq!(h.tokens.access_token(), None);
    assert_eq!(client.refresh_state(), RefreshState::Idle);
}

#[tokio::test]
async fn server_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/insurance"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/bank-account"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({ "message": "forbidden" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let h = harness();
    h.tokens
        .save("access-0", Some("refresh-0"), Some(3600.0))
        .expect("seed");
    let client = client(&server.uri(), &h.tokens);

    let err = client
        .get_json::<Value>("/insurance")
        .await
        .expect_err("503 propagates");
    assert_eq!(err.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
    assert!(err.to_string().contains("maintenance"));

    let err = client
        .get_json::<Value>("/bank-account")
        .await
        .expect_err("403 propagates");
    assert!(matches!(
        err,
        AppError::Api {
            status: StatusCode::FORBIDDEN,
            ..
        }
    ));
    assert_eq!(h.tokens.access_token().as_deref(), Some("access-0"));
}

#[tokio::test]
async fn empty_success_body_decodes_as_null() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/journals/11"))
        .and(header("authorization", "Bearer access-0"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness();
    h.tokens.save("access-0", None, None).expect("seed");
    let client = client(&server.uri(), &h.tokens);

    let request = ApiRequest::new(reqwest::Method::DELETE, "/journals/11");
    let body: Value = client.request_json(&request).await.expect("delete succeeds");
    assert_eq!(body, Value::Null);
}

#[tokio::test]
async fn forced_refresh_failure_reports_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness();
    h.tokens
        .save("access-0", Some("refresh-0"), Some(3600.0))
        .expect("seed");
    let client = client(&server.uri(), &h.tokens);

    let err = client.refresh_now().await.expect_err("refresh fails");
    assert!(matches!(err, AppError::Auth(_)));
    assert_eq!(h.tokens.access_token(), None);
}
