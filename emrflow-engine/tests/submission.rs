//! Tests for submitting jobs and uploading their artifacts.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::FakeClient;
use common::FakeStore;
use common::JOB_RUN;
use emrflow_engine::Error;
use emrflow_engine::State;
use emrflow_engine::Submission;
use emrflow_engine::Submitter;
use emrflow_engine::Tracker;
use emrflow_engine::artifact::Uploader;
use emrflow_engine::artifact::extract_artifacts;
use emrflow_events::Event;
use indexmap::IndexMap;
use tokio::sync::broadcast;

fn submitter(client: &Arc<FakeClient>) -> Submitter {
    let store = Arc::new(FakeStore::default());
    Submitter::new(Tracker::new(client.clone(), store).with_interval(Duration::from_secs(1)))
}

fn submission(wait: bool, show_logs: bool) -> Submission {
    Submission::builder()
        .name("nightly")
        .entry_point("main.py")
        .code_uri("s3://code/project")
        .wait(wait)
        .show_logs(show_logs)
        .build()
}

#[tokio::test(start_paused = true)]
async fn unsuccessful_terminal_states_fail_the_submission() {
    for state in [
        State::Failed,
        State::Cancelling,
        State::Cancelled,
        State::Completed,
    ] {
        let client = Arc::new(
            FakeClient::with_states([State::Running, state]).with_details("executor lost"),
        );

        let err = submitter(&client)
            .submit(&submission(true, false))
            .await
            .unwrap_err();

        match &err {
            Error::JobFailed {
                id,
                state: failed,
                details,
            } => {
                assert_eq!(id, JOB_RUN);
                assert_eq!(*failed, state);
                assert_eq!(details.as_deref(), Some("executor lost"));
            }
            other => panic!("expected a job failure, got {other:?}"),
        }

        let message = err.to_string();
        assert!(message.contains(JOB_RUN), "{message}");
        assert!(message.contains(state.as_str()), "{message}");
        assert!(message.contains("executor lost"), "{message}");
    }
}

#[tokio::test(start_paused = true)]
async fn successful_submissions_return_the_job_run() {
    let client = Arc::new(FakeClient::with_states([State::Pending, State::Success]));
    let (tx, mut rx) = broadcast::channel(16);

    let id = submitter(&client)
        .with_events(tx)
        .submit(&submission(true, false))
        .await
        .unwrap();

    assert_eq!(id, JOB_RUN);
    assert!(matches!(
        rx.try_recv().unwrap(),
        Event::JobSubmitted { .. }
    ));
}

#[tokio::test]
async fn submissions_without_tracking_return_immediately() {
    let client = Arc::new(FakeClient::failing());

    let id = submitter(&client)
        .submit(&submission(false, false))
        .await
        .unwrap();

    assert_eq!(id, JOB_RUN);
    assert_eq!(client.runs(), 1);
    assert_eq!(client.gets.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test]
async fn showing_logs_without_a_log_location_is_rejected_up_front() {
    let client = Arc::new(FakeClient::with_states([State::Success]));

    let err = submitter(&client)
        .submit(&submission(false, true))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Configuration(_)));
    assert_eq!(client.runs(), 0);
}

#[tokio::test]
async fn requests_carry_substituted_paths_and_merged_tags() {
    let client = Arc::new(FakeClient::with_states([State::Success]));

    let mut uploaded = IndexMap::new();
    uploaded.insert(
        String::from("dist/src.zip"),
        String::from("s3://code/project/dist/src.zip"),
    );

    submitter(&client)
        .submit(
            &Submission::builder()
                .name("nightly")
                .entry_point("main.py")
                .code_uri("s3://code/project")
                .spark_submit_parameters(
                    "--conf spark.submit.pyFiles=dist/src.zip --conf spark.jars=s3://jars/x.jar",
                )
                .tags(vec![String::from("t1:v1"), String::from("utility:custom")])
                .uploaded(uploaded)
                .build(),
        )
        .await
        .unwrap();

    let requests = client.requests.lock().unwrap();
    let request = &requests[0];

    assert_eq!(
        request.spark_submit.spark_submit_parameters.as_deref(),
        Some(
            "--conf spark.submit.pyFiles=s3://code/project/dist/src.zip --conf \
             spark.jars=s3://jars/x.jar"
        )
    );
    assert_eq!(request.spark_submit.entry_point, "s3://code/project/main.py");
    assert_eq!(request.tags["t1"], "v1");
    assert_eq!(request.tags["utility"], "emrflow");
    assert_eq!(request.log_uri, None);
    assert_eq!(request.execution_timeout_minutes, None);
}

#[tokio::test]
async fn uploads_local_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("dist")).unwrap();
    std::fs::write(dir.path().join("dist/src.zip"), b"zipped sources").unwrap();
    std::fs::write(dir.path().join("main.py"), b"print('hi')").unwrap();

    let mut artifacts = extract_artifacts(
        "--conf spark.submit.pyFiles=dist/src.zip --conf \
         spark.archives=dist/env.tar.gz#environment --conf spark.jars=s3://jars/x.jar",
    );
    artifacts.push(String::from("main.py"));
    artifacts.push(String::from("main.py"));

    let store = Arc::new(FakeStore::default());
    let mapping = Uploader::new(store.clone())
        .with_max_uploads(2)
        .with_base_dir(dir.path())
        .upload(
            "s3://code/project",
            &artifacts,
            &[String::from("dist/env.tar.gz")],
        )
        .await
        .unwrap();

    assert_eq!(
        mapping.into_iter().collect::<Vec<_>>(),
        [
            (
                String::from("dist/src.zip"),
                String::from("s3://code/project/dist/src.zip")
            ),
            (
                String::from("dist/env.tar.gz"),
                String::from("s3://code/project/dist/env.tar.gz")
            ),
            (
                String::from("main.py"),
                String::from("s3://code/project/main.py")
            ),
        ]
    );

    let mut uploads = store.uploads.lock().unwrap().clone();
    uploads.sort_by(|a, b| a.1.cmp(&b.1));
    assert_eq!(
        uploads,
        [
            (
                dir.path().join("dist/src.zip"),
                String::from("project/dist/src.zip")
            ),
            (dir.path().join("main.py"), String::from("project/main.py")),
        ]
    );
}

#[tokio::test]
async fn missing_artifacts_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.zip").display().to_string();

    let store = Arc::new(FakeStore::default());
    let err = Uploader::new(store.clone())
        .upload("s3://code", &[missing.clone()], &[])
        .await
        .unwrap_err();

    match err {
        Error::Artifact { path, .. } => assert_eq!(path, missing),
        other => panic!("expected an artifact error, got {other:?}"),
    }
    assert!(store.uploads.lock().unwrap().is_empty());
}
