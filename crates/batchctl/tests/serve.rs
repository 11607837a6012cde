use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use batch_models::{JobIdGenerator, Namespace};
use pipeline::{Driver, ReadAs, Settings};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use warehouse::{Column, MockWarehouse, ResultSet, Volume, DELEGATED_TOKEN_HEADER};

const CSV: &str = "id,text\n1,The cat sat.\n2,It rained.\n";

fn router(mock: &MockWarehouse, read_as: ReadAs) -> axum::Router {
    let settings = Settings::new(
        Namespace::default(),
        Volume::parse("/Volumes/main/tmp/uploads").unwrap(),
        read_as,
    );
    batchctl::serve::build_router(Driver::new(
        Arc::new(mock.clone()),
        settings,
        JobIdGenerator::default(),
    ))
}

async fn call(router: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    let body = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into_owned()))
    };
    (status, body)
}

fn post(uri: &str, body: &str) -> Request<Body> {
    Request::post(uri).body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

async fn submit(router: &axum::Router) -> String {
    let (status, body) = call(
        router,
        post("/jobs?column=text&task=summarization", CSV),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["job_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_submit_and_describe_job() {
    let mock = MockWarehouse::new();
    let router = router(&mock, ReadAs::App);

    let id = submit(&router).await;
    assert_eq!(mock.calls().len(), 3);

    let (status, body) = call(&router, get(&format!("/jobs/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "job_id": id,
            "task": "summarization",
            "column": "text",
            "raw_table": format!("tmp.user_upload_{id}"),
            "processed_table": format!("tmp.user_upload_processed_{id}"),
        })
    );
}

#[tokio::test]
async fn test_input_errors_are_bad_requests() {
    let mock = MockWarehouse::new();
    let router = router(&mock, ReadAs::App);

    for uri in [
        "/jobs?column=missing&task=summarization",
        "/jobs?column=text&task=translation",
        "/jobs?task=summarization",
    ] {
        let (status, body) = call(&router, post(uri, CSV)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}: {body}");
    }

    let (status, _) = call(&router, post("/jobs?column=text&task=summarization", "")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn test_unknown_and_malformed_jobs() {
    let mock = MockWarehouse::new();
    let router = router(&mock, ReadAs::App);

    let (status, body) = call(&router, get("/jobs/0a1b2c3d")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);
    assert_eq!(body["error"], "job 0a1b2c3d was not found");

    let (status, _) = call(&router, get("/jobs/0a1b2c3d/results")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&router, get("/jobs/not-an-id")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn test_remote_failure_is_bad_gateway() {
    let mock = MockWarehouse::new();
    mock.fail_when("ai_query", "model endpoint unavailable");
    let router = router(&mock, ReadAs::App);

    let (status, body) = call(&router, post("/jobs?column=text&task=summarization", CSV)).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("model endpoint unavailable"));
}

#[tokio::test]
async fn test_results_read_as_app() {
    let mock = MockWarehouse::new();
    let router = router(&mock, ReadAs::App);
    let id = submit(&router).await;

    mock.respond_when(
        &format!("user_upload_processed_{id}"),
        ResultSet {
            columns: vec![
                Column {
                    name: "text".to_string(),
                    type_name: Some("STRING".to_string()),
                },
                Column {
                    name: "ai_result".to_string(),
                    type_name: Some("STRING".to_string()),
                },
            ],
            rows: vec![vec![Some("The cat sat.".to_string()), None]],
        },
    );

    let (status, body) = call(&router, get(&format!("/jobs/{id}/results"))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["table"], format!("tmp.user_upload_processed_{id}"));
    assert_eq!(
        body["rows"],
        json!([{"text": "The cat sat.", "ai_result": null}])
    );

    let queries = mock.queries();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].identity(), "app");
}

#[tokio::test]
async fn test_delegated_results_require_the_user_header() {
    let mock = MockWarehouse::new();
    let router = router(&mock, ReadAs::User);
    let id = submit(&router).await;

    let (status, body) = call(&router, get(&format!("/jobs/{id}/results"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED, "{body}");
    assert!(mock.queries().is_empty());

    let request = Request::get(format!("/jobs/{id}/results"))
        .header(DELEGATED_TOKEN_HEADER, "user-token")
        .body(Body::empty())
        .unwrap();
    let (status, _) = call(&router, request).await;
    assert_eq!(status, StatusCode::OK);

    let queries = mock.queries();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].identity(), "user:user-token");
}

#[tokio::test]
async fn test_rejected_user_reads_are_unauthorized() {
    let mock = MockWarehouse::new();
    mock.deny_when("user:tok", "SELECT", "403 Forbidden: missing sql scope");
    let router = router(&mock, ReadAs::User);
    let id = submit(&router).await;

    let request = Request::get(format!("/jobs/{id}/results"))
        .header(DELEGATED_TOKEN_HEADER, "tok")
        .body(Body::empty())
        .unwrap();
    let (status, body) = call(&router, request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED, "{body}");
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("missing sql scope"));
}

#[tokio::test]
async fn test_evaluate_job() {
    let mock = MockWarehouse::new();
    let router = router(&mock, ReadAs::App);
    let id = submit(&router).await;

    let (status, body) = call(&router, post(&format!("/jobs/{id}/evaluate"), "")).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["evaluated_table"], format!("tmp.user_upload_evaluated_{id}"));

    let sql = mock.calls().last().and_then(|c| c.sql().map(str::to_string)).unwrap();
    assert!(sql.contains(&format!("FROM `tmp`.`user_upload_processed_{id}`")));

    // The evaluation is remembered by the job.
    let (_, body) = call(&router, get(&format!("/jobs/{id}"))).await;
    assert_eq!(body["evaluated_table"], format!("tmp.user_upload_evaluated_{id}"));
}

#[tokio::test]
async fn test_concurrent_jobs_are_independent() {
    let mock = MockWarehouse::new();
    let router = router(&mock, ReadAs::App);

    let (first, second) = tokio::join!(submit(&router), submit(&router));
    assert_ne!(first, second);

    for id in [&first, &second] {
        let (status, body) = call(&router, get(&format!("/jobs/{id}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["job_id"], id.as_str());
    }
    assert_eq!(mock.calls().len(), 6);
}

#[tokio::test]
async fn test_healthz() {
    let router = router(&MockWarehouse::new(), ReadAs::App);
    let (status, body) = call(&router, get("/healthz")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("ok".to_string()));
}
