mod support;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use assistant_api::{ApiError, CancelSignal, IngestBinding, IngestClient, IngestFile, RequestBody};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use support::{Harness, Reply};

fn client(harness: &Harness) -> IngestClient {
    IngestClient::new(Arc::clone(&harness.gateway)).with_poll_interval(Duration::from_millis(1))
}

fn thread() -> IngestBinding {
    IngestBinding::Thread("t1".to_owned())
}

#[tokio::test]
async fn two_files_upload_then_report_progress_until_done() {
    let harness = Harness::new(Some("tok"));
    harness
        .transport
        .script("/ingest", Reply::json(200, json!({"job_id": "j1", "status": "running"})));
    for (status, progress) in [("running", 0.2), ("running", 0.6), ("done", 1.0)] {
        harness.transport.script(
            "/ingest/j1",
            Reply::json(200, json!({"job_id": "j1", "status": status, "progress": progress})),
        );
    }

    let mut seen = Vec::new();
    let job_id = client(&harness)
        .ingest(
            vec![
                IngestFile::new("a.txt", "alpha"),
                IngestFile::new("b.md", "beta"),
            ],
            &thread(),
            |progress| seen.push(progress),
            None,
        )
        .await
        .expect("ingest");

    assert_eq!(job_id.as_deref(), Some("j1"));
    assert_eq!(seen, vec![0.2, 0.6]);
    assert_eq!(harness.transport.count("/ingest/j1"), 3);

    let upload = &harness.transport.requests()[0];
    let RequestBody::Multipart { files, fields } = &upload.body else {
        panic!("upload should be multipart");
    };
    let names: Vec<&str> = files.iter().map(|file| file.file_name.as_str()).collect();
    assert_eq!(names, vec!["a.txt", "b.md"]);
    assert!(files.iter().all(|file| file.field == "files"));
    assert_eq!(fields[0].0, "config");
    let config: Value = serde_json::from_str(&fields[0].1).expect("config json");
    assert_eq!(config, json!({"configurable": {"thread_id": "t1"}}));
}

#[tokio::test]
async fn missing_job_id_means_nothing_to_ingest() {
    let harness = Harness::new(Some("tok"));
    harness.transport.script("/ingest", Reply::json(200, json!({})));

    let job_id = client(&harness)
        .submit(vec![IngestFile::new("a.txt", "x")], &thread())
        .await
        .expect("submit");

    assert_eq!(job_id, None);
}

#[tokio::test]
async fn empty_file_list_skips_the_request() {
    let harness = Harness::new(Some("tok"));

    let job_id = client(&harness)
        .submit(Vec::new(), &thread())
        .await
        .expect("submit");

    assert_eq!(job_id, None);
    assert!(harness.transport.requests().is_empty());
}

#[tokio::test]
async fn rejected_upload_surfaces_body_or_fallback() {
    let harness = Harness::new(Some("tok"));
    harness.transport.script("/ingest", Reply::text(413, "too large"));
    harness.transport.script("/ingest", Reply::status(500));
    let client = client(&harness);

    let first = client
        .submit(vec![IngestFile::new("a.txt", "x")], &thread())
        .await
        .expect_err("rejected");
    let second = client
        .submit(vec![IngestFile::new("a.txt", "x")], &thread())
        .await
        .expect_err("rejected");

    assert_matches!(first, ApiError::Status { message, .. } if message == "too large");
    assert_matches!(second, ApiError::Status { message, .. } if message == "Failed to upload files");
}

#[tokio::test]
async fn job_error_carries_the_server_message() {
    let harness = Harness::new(Some("tok"));
    harness.transport.script(
        "/ingest/j1",
        Reply::json(200, json!({"job_id": "j1", "status": "error", "error": "bad pdf"})),
    );

    let error = client(&harness)
        .poll("j1", |_| {}, None)
        .await
        .expect_err("job failed");

    assert_matches!(error, ApiError::JobFailed(message) if message == "bad pdf");
}

#[tokio::test]
async fn job_error_without_message_uses_fallback() {
    let harness = Harness::new(Some("tok"));
    harness.transport.script(
        "/ingest/j1",
        Reply::json(200, json!({"job_id": "j1", "status": "error"})),
    );

    let error = client(&harness)
        .poll("j1", |_| {}, None)
        .await
        .expect_err("job failed");

    assert_eq!(error.to_string(), "Ingestion failed");
}

#[tokio::test]
async fn canceled_job_is_a_cancellation() {
    let harness = Harness::new(Some("tok"));
    harness.transport.script(
        "/ingest/j1",
        Reply::json(200, json!({"job_id": "j1", "status": "canceled", "progress": 0.4})),
    );

    let error = client(&harness)
        .poll("j1", |_| {}, None)
        .await
        .expect_err("canceled");

    assert!(error.is_cancelled());
}

#[tokio::test]
async fn unknown_status_keeps_polling() {
    let harness = Harness::new(Some("tok"));
    harness.transport.script(
        "/ingest/j1",
        Reply::json(200, json!({"job_id": "j1", "status": "queued"})),
    );
    harness.transport.script(
        "/ingest/j1",
        Reply::json(200, json!({"job_id": "j1", "status": "done", "progress": 1.0})),
    );

    let mut seen = Vec::new();
    client(&harness)
        .poll("j1", |progress| seen.push(progress), None)
        .await
        .expect("done");

    assert_eq!(seen, vec![0.0]);
}

#[tokio::test]
async fn raised_signal_fails_before_any_request() {
    let harness = Harness::new(Some("tok"));
    let cancel = CancelSignal::new();
    cancel.cancel();

    let error = client(&harness)
        .poll("j1", |_| {}, Some(&cancel))
        .await
        .expect_err("cancelled");

    assert!(error.is_cancelled());
    assert!(harness.transport.requests().is_empty());
}

#[tokio::test]
async fn signal_interrupts_the_wait_between_polls() {
    let harness = Harness::new(Some("tok"));
    harness.transport.script(
        "/ingest/j1",
        Reply::json(200, json!({"job_id": "j1", "status": "running", "progress": 0.1})),
    );
    let client = IngestClient::new(Arc::clone(&harness.gateway))
        .with_poll_interval(Duration::from_secs(60));
    let cancel = CancelSignal::new();

    let poll = client.poll("j1", |_| cancel.cancel(), Some(&cancel));
    let error = tokio::time::timeout(Duration::from_secs(1), poll)
        .await
        .expect("cancel should cut the sleep short")
        .expect_err("cancelled");

    assert!(error.is_cancelled());
    assert_eq!(harness.transport.count("/ingest/j1"), 1);
}

#[tokio::test]
async fn remote_cancel_posts_to_the_job() {
    let harness = Harness::new(Some("tok"));
    harness.transport.script(
        "/ingest/j1/cancel",
        Reply::json(200, json!({"job_id": "j1", "status": "canceled"})),
    );
    harness.transport.script(
        "/ingest/j2/cancel",
        Reply::json(409, json!({"detail": "Ingest job cannot be canceled."})),
    );
    let client = client(&harness);

    client.cancel("j1").await.expect("cancel");
    let error = client.cancel("j2").await.expect_err("conflict");

    assert_matches!(error, ApiError::Status { message, .. } if message == "Ingest job cannot be canceled.");
    assert_eq!(harness.transport.requests()[0].method, reqwest::Method::POST);
}

#[tokio::test]
async fn status_failure_uses_fallback() {
    let harness = Harness::new(Some("tok"));
    harness.transport.script("/ingest/j1", Reply::status(404));

    let error = client(&harness).status("j1").await.expect_err("missing");

    assert_matches!(error, ApiError::Status { message, .. } if message == "Failed to fetch ingest status");
}

#[tokio::test]
async fn files_are_read_from_disk_with_guessed_type() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("notes.txt");
    std::fs::write(&path, "# notes").expect("write");

    let file = IngestFile::from_path(&path).await.expect("read");

    assert_eq!(file.name, "notes.txt");
    assert_eq!(file.mime_type, "text/plain");
    assert_eq!(file.content, b"# notes");
}
