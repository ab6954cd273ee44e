// tests/api_http.rs
//
// HTTP-level tests for the API router without opening sockets.
// The router is driven directly via tower::ServiceExt::oneshot, backed by a
// scripted model and a temp-dir store.
//
// Covered:
// - GET /health
// - POST /api/auth (login / logout) and the cookie gate on write routes
// - POST /api/generate → GET /api/daily → POST /api/mark
// - GET /api/runs
// - GET /api/cron bearer check

mod common;

use std::sync::Arc;

use serde_json::{json, Value as Json};
use shuttle_axum::axum::{
    body::{self, Body},
    http::{header, HeaderMap, Request, StatusCode},
    Router,
};
use tower::ServiceExt as _; // for `oneshot`

use toolpulse::auth::AuthConfig;
use toolpulse::config::PipelineConfig;
use toolpulse::generate::model_client::ScriptedModel;
use toolpulse::generate::now_unix;
use toolpulse::{api, AppState, BatchStore};

use common::{clean_batch, generator, reply_with};

const BODY_LIMIT: usize = 1024 * 1024;
const PASSWORD: &str = "correct horse";
const CRON_SECRET: &str = "cron-s3cret";

struct TestApp {
    router: Router,
    store: BatchStore,
    model: Arc<ScriptedModel>,
    _tmp: tempfile::TempDir,
}

fn test_app(auth: AuthConfig) -> TestApp {
    let tmp = tempfile::tempdir().expect("tempdir");
    let store = BatchStore::new(tmp.path(), 330);
    let model = Arc::new(ScriptedModel::new(vec![reply_with(
        &clean_batch(10),
        "2 hours ago",
    )]));
    let state = AppState::new(
        Arc::new(generator(model.clone())),
        store.clone(),
        auth,
        &PipelineConfig::default(),
    );
    TestApp {
        router: api::router(state, None),
        store,
        model,
        _tmp: tmp,
    }
}

fn open_app() -> TestApp {
    test_app(AuthConfig::default())
}

fn locked_app() -> TestApp {
    test_app(AuthConfig::new(
        Some(PASSWORD.to_string()),
        Some(CRON_SECRET.to_string()),
    ))
}

async fn send(app: &TestApp, req: Request<Body>) -> (StatusCode, HeaderMap, Json) {
    let resp = app.router.clone().oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    let v = serde_json::from_slice(&bytes).unwrap_or(Json::Null);
    (status, headers, v)
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).expect("build GET")
}

fn post_json(uri: &str, payload: Json, cookie: Option<&str>) -> Request<Body> {
    let mut b = Request::post(uri).header("content-type", "application/json");
    if let Some(c) = cookie {
        b = b.header(header::COOKIE, c);
    }
    b.body(Body::from(payload.to_string())).expect("build POST")
}

async fn login(app: &TestApp) -> String {
    let (status, headers, v) =
        send(app, post_json("/api/auth", json!({ "password": PASSWORD }), None)).await;
    assert_eq!(status, StatusCode::OK, "{v}");
    let set = headers
        .get(header::SET_COOKIE)
        .and_then(|h| h.to_str().ok())
        .expect("set-cookie");
    assert!(set.contains("HttpOnly"));
    set.split(';').next().expect("cookie pair").to_string()
}

#[tokio::test]
async fn health_returns_ok() {
    let app = open_app();
    let resp = app.router.clone().oneshot(get("/health")).await.expect("oneshot");
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    assert_eq!(String::from_utf8_lossy(&bytes).trim(), "OK");
}

#[tokio::test]
async fn generate_then_read_and_mark_the_day() {
    let app = open_app();

    let (status, _, v) = send(&app, post_json("/api/generate", json!({}), None)).await;
    assert_eq!(status, StatusCode::OK, "{v}");
    assert_eq!(v["success"], true);
    let tweets = v["data"]["tweets"].as_array().expect("tweets");
    assert_eq!(tweets.len(), 10);
    assert_eq!(tweets[0]["sourceAge"], "2h ago");
    assert_eq!(tweets[0]["posted"], false);
    let date = v["data"]["date"].as_str().expect("date").to_string();

    let (status, _, v) = send(&app, get("/api/daily")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["source"], "cache");
    assert_eq!(v["data"]["date"], date.as_str());

    let (_, _, v) = send(&app, get("/api/daily?list=1")).await;
    assert_eq!(v["dates"], json!([date.clone()]));

    let (status, _, v) = send(
        &app,
        post_json("/api/mark", json!({ "date": date, "index": 3 }), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{v}");
    assert_eq!(v["tweetedStatus"], true);

    let (_, _, v) = send(&app, get(&format!("/api/daily?date={date}"))).await;
    assert_eq!(v["source"], "history");
    assert_eq!(v["data"]["tweets"][3]["posted"], true);
    assert_eq!(v["data"]["tweets"][2]["posted"], false);

    assert_eq!(app.model.calls(), 1);
    assert_eq!(app.store.list_runs(now_unix(), 24).expect("runs").len(), 1);
}

#[tokio::test]
async fn daily_handles_missing_and_invalid_dates() {
    let app = open_app();

    let (status, _, v) = send(&app, get("/api/daily?date=2020-01-01")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["source"], "empty");
    assert!(v["data"].is_null());

    let (status, _, v) = send(&app, get("/api/daily?date=yesterday")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(v["success"], false);
}

#[tokio::test]
async fn mark_validates_its_input() {
    let app = open_app();

    let (status, _, v) = send(&app, post_json("/api/mark", json!({ "index": 0 }), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(v["error"], "Missing date or index");

    let (status, _, _) = send(
        &app,
        post_json("/api/mark", json!({ "date": "2025-10-09", "index": -1 }), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = send(
        &app,
        post_json("/api/mark", json!({ "date": "2025-10-09", "index": 0 }), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = send(&app, post_json("/api/generate", json!({}), None)).await;
    assert_eq!(status, StatusCode::OK);
    let date = app.store.available_dates().expect("dates")[0].clone();
    let (status, _, _) = send(
        &app,
        post_json("/api/mark", json!({ "date": date, "index": 10 }), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn write_routes_require_the_login_cookie() {
    let app = locked_app();

    let (status, _, v) = send(&app, post_json("/api/generate", json!({}), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(v["success"], false);
    assert_eq!(app.model.calls(), 0);

    let (status, _, v) =
        send(&app, post_json("/api/auth", json!({ "password": "guess" }), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(v["error"], "Invalid password");

    let cookie = login(&app).await;
    let (status, _, v) =
        send(&app, post_json("/api/generate", json!({}), Some(&cookie))).await;
    assert_eq!(status, StatusCode::OK, "{v}");
    assert_eq!(app.model.calls(), 1);

    // reading the day stays public
    let (status, _, v) = send(&app, get("/api/daily")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["source"], "cache");

    let (status, _, _) = send(&app, get("/api/runs?list=1")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let logout = Request::delete("/api/auth")
        .body(Body::empty())
        .expect("build DELETE");
    let (status, headers, _) = send(&app, logout).await;
    assert_eq!(status, StatusCode::OK);
    let set = headers
        .get(header::SET_COOKIE)
        .and_then(|h| h.to_str().ok())
        .expect("set-cookie");
    assert!(set.contains("Max-Age=0"));
}

#[tokio::test]
async fn runs_list_and_lookup() {
    let app = open_app();
    let (status, _, _) = send(&app, post_json("/api/generate", json!({}), None)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, v) = send(&app, get("/api/runs?list=1")).await;
    assert_eq!(status, StatusCode::OK, "{v}");
    let runs = v["data"].as_array().expect("runs");
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0]["count"], 10);
    let id = runs[0]["id"].as_str().expect("id").to_string();

    let (status, _, v) = send(&app, get(&format!("/api/runs?id={id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["data"]["posts"].as_array().map(Vec::len), Some(10));

    let (status, _, v) = send(&app, get("/api/runs?id=1-00000000")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(v["error"], "Saved run not found");

    let (status, _, _) = send(&app, get("/api/runs")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cron_checks_the_bearer_secret() {
    let app = locked_app();

    let (status, _, _) = send(&app, get("/api/cron")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let wrong = Request::get("/api/cron")
        .header(header::AUTHORIZATION, "Bearer nope")
        .body(Body::empty())
        .expect("build cron");
    let (status, _, _) = send(&app, wrong).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.model.calls(), 0);

    // an expired day is swept before the new batch is written
    app.store
        .save_daily("2001-01-01", &[])
        .expect("seed old day");
    let ok = Request::get("/api/cron")
        .header(header::AUTHORIZATION, format!("Bearer {CRON_SECRET}"))
        .body(Body::empty())
        .expect("build cron");
    let (status, _, v) = send(&app, ok).await;
    assert_eq!(status, StatusCode::OK, "{v}");
    assert_eq!(v["cleaned"], 1);
    assert_eq!(v["data"]["tweets"].as_array().map(Vec::len), Some(10));

    let dates = app.store.available_dates().expect("dates");
    assert_eq!(dates.len(), 1);
    assert_ne!(dates[0], "2001-01-01");
}
