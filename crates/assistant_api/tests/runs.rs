mod support;

use std::sync::Arc;

use assert_matches::assert_matches;
use assistant_api::{ApiError, RequestBody, RunClient, RunFeedback, RunInput, TranscriptShape};
use reqwest::Method;
use serde_json::json;
use support::{Harness, Reply};

fn client(harness: &Harness) -> RunClient {
    RunClient::new(Arc::clone(&harness.gateway))
}

#[tokio::test]
async fn create_run_posts_the_run_body_without_streaming() {
    let harness = Harness::new(Some("tok"));
    harness
        .transport
        .script("/runs", Reply::json(200, json!({"status": "ok"})));

    client(&harness)
        .create_run(RunInput::Resume, "t1", json!({"configurable": {"k": 1}}))
        .await
        .expect("run created");

    let request = &harness.transport.requests()[0];
    assert_eq!(request.method, Method::POST);
    assert_eq!(request.path, "/runs");
    assert!(!request.streaming);
    assert_eq!(
        request.body,
        RequestBody::Json(json!({"input": null, "thread_id": "t1", "config": {"configurable": {"k": 1}}}))
    );
}

#[tokio::test]
async fn create_run_checks_config_and_surfaces_server_errors() {
    let harness = Harness::new(Some("tok"));
    harness
        .transport
        .script("/runs", Reply::json(404, json!({"detail": "Thread not found"})));
    let client = client(&harness);

    let rejected = client
        .create_run(RunInput::message("hi", TranscriptShape::Flat), "t1", json!([]))
        .await;
    assert_matches!(rejected, Err(ApiError::InvalidRequest(_)));
    assert_eq!(harness.transport.count("/runs"), 0);

    let error = client
        .create_run(RunInput::message("hi", TranscriptShape::Flat), "t9", json!({}))
        .await
        .expect_err("unknown thread");
    assert_matches!(error, ApiError::Status { message, .. } if message == "Thread not found");
}

#[tokio::test]
async fn feedback_sends_only_the_fields_that_are_set() {
    let harness = Harness::new(Some("tok"));
    harness
        .transport
        .script("/runs/feedback", Reply::json(200, json!({"status": "ok"})));

    let feedback = RunFeedback::new("r1", "user_score")
        .with_score(1.0)
        .with_comment("spot on");
    client(&harness).feedback(&feedback).await.expect("feedback");

    let request = &harness.transport.requests()[0];
    assert_eq!(request.path, "/runs/feedback");
    assert_eq!(
        request.body,
        RequestBody::Json(json!({"run_id": "r1", "key": "user_score", "score": 1.0, "comment": "spot on"}))
    );
}

#[tokio::test]
async fn feedback_without_a_key_is_rejected_locally() {
    let harness = Harness::new(Some("tok"));

    let error = client(&harness)
        .feedback(&RunFeedback::new("r1", " "))
        .await
        .expect_err("missing key");

    assert_matches!(error, ApiError::InvalidRequest(_));
    assert!(harness.transport.requests().is_empty());
}

#[tokio::test]
async fn feedback_is_retried_once_after_a_refresh() {
    let harness = Harness::new(Some("stale"));
    harness.transport.script("/runs/feedback", Reply::status(401));
    harness
        .transport
        .script("/runs/feedback", Reply::json(200, json!({"status": "ok"})));
    harness
        .transport
        .script("/refresh", Reply::json(200, json!({"access_token": "fresh"})));

    client(&harness)
        .feedback(&RunFeedback::new("r1", "user_score").with_value(json!(true)))
        .await
        .expect("feedback");

    assert_eq!(
        harness.transport.authorizations("/runs/feedback"),
        vec![Some("Bearer stale".to_owned()), Some("Bearer fresh".to_owned())]
    );
}
