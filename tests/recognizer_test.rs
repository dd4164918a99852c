//! Recognizer process contract, exercised with small shell scripts standing in
//! for the vision pipeline. `$1` is the absolute image path.

#![cfg(unix)]

mod helpers;

use helpers::{await_terminal, completed_payload};
use menu_recognition::models::job::{JobState, JobView};
use menu_recognition::models::menu::RecognitionHints;
use menu_recognition::services::memory::{MemoryCatalog, MemoryJobStore};
use menu_recognition::services::orchestrator::{CreateJob, JobOrchestrator, OrchestratorConfig};
use menu_recognition::services::recognizer::{
    ProcessRecognizer, RecognitionRequest, Recognizer, RecognizerError,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Sets `$stem` to the image's file stem and `$out` to the job's output directory.
const WRITE_PREAMBLE: &str = r#"stem=$(basename "$1"); stem=${stem%.*}; out="$RECOGNITION_OUTPUT_DIR""#;

struct Workspace {
    _root: TempDir,
    image: PathBuf,
    results: PathBuf,
}

fn workspace() -> Workspace {
    let root = tempfile::tempdir().unwrap();
    let image = root.path().join("menu-1.jpg");
    std::fs::write(&image, [0xFF, 0xD8, 0xFF, 0xE0]).unwrap();
    let results = root.path().join("results");
    Workspace {
        _root: root,
        image,
        results,
    }
}

fn script_recognizer(results: &Path, body: &str) -> ProcessRecognizer {
    let script = format!("{WRITE_PREAMBLE}; {body}");
    ProcessRecognizer::new(
        "sh",
        vec!["-c".to_string(), script, "recognizer".to_string()],
        results,
    )
}

fn request(job_id: &str, image: &Path) -> RecognitionRequest {
    RecognitionRequest {
        job_id: job_id.to_string(),
        image_path: image.to_path_buf(),
    }
}

#[tokio::test]
async fn test_reads_artifact_from_job_directory() {
    let ws = workspace();
    let recognizer = script_recognizer(
        &ws.results,
        r#"printf '{"restaurant_name":"Campus Grill","dishes":[{"name":"Rice","price":"8"}]}' > "$out/parsed_${stem}_20250301_120000.json""#,
    );

    let document = recognizer
        .recognize(&request("upload_1_aaaaaaaa", &ws.image))
        .await
        .unwrap();

    assert_eq!(
        document,
        json!({"restaurant_name": "Campus Grill", "dishes": [{"name": "Rice", "price": "8"}]})
    );
    assert!(recognizer.output_dir("upload_1_aaaaaaaa").is_dir());
}

/// Recognizers that ignore the job directory and write next to it, into the
/// shared results directory, are still read.
#[tokio::test]
async fn test_reads_artifact_from_shared_results_directory() {
    let ws = workspace();
    let recognizer = script_recognizer(
        &ws.results,
        r#"printf '{"restaurant_name":"Shared Dir Cafe","dishes":[]}' > "$(dirname "$out")/parsed_${stem}_20250301_120000.json""#,
    );

    let document = recognizer
        .recognize(&request("upload_1_a1a1a1a1", &ws.image))
        .await
        .unwrap();

    assert_eq!(document["restaurant_name"], "Shared Dir Cafe");
    assert!(ws.results.join("parsed_menu-1_20250301_120000.json").is_file());
}

/// The job directory wins over a stale artifact in the shared directory.
#[tokio::test]
async fn test_job_directory_takes_precedence() {
    let ws = workspace();
    std::fs::create_dir_all(&ws.results).unwrap();
    std::fs::write(ws.results.join("parsed_menu-1_20990101_000000.json"), r#"{"from":"shared"}"#)
        .unwrap();
    let recognizer = script_recognizer(
        &ws.results,
        r#"echo '{"from":"job"}' > "$out/parsed_${stem}_20250301_120000.json""#,
    );

    let document = recognizer
        .recognize(&request("upload_1_b2b2b2b2", &ws.image))
        .await
        .unwrap();

    assert_eq!(document, json!({"from": "job"}));
}

#[tokio::test]
async fn test_nonzero_exit_reports_stderr() {
    let ws = workspace();
    let recognizer = script_recognizer(&ws.results, r#"echo "model quota exceeded" >&2; exit 3"#);

    let err = recognizer
        .recognize(&request("upload_1_bbbbbbbb", &ws.image))
        .await
        .unwrap_err();

    match &err {
        RecognizerError::Process { code, message } => {
            assert_eq!(*code, Some(3));
            assert_eq!(message, "model quota exceeded");
        }
        other => panic!("expected process error, got {other:?}"),
    }
    assert_eq!(err.to_string(), "model quota exceeded");
}

#[tokio::test]
async fn test_silent_nonzero_exit_reports_status() {
    let ws = workspace();
    let recognizer = script_recognizer(&ws.results, "exit 2");

    let err = recognizer
        .recognize(&request("upload_1_cccccccc", &ws.image))
        .await
        .unwrap_err();

    assert!(matches!(err, RecognizerError::Process { code: Some(2), .. }));
    assert!(err.to_string().starts_with("recognizer exited with"));
}

#[tokio::test]
async fn test_success_without_artifact_is_an_error() {
    let ws = workspace();
    let recognizer = script_recognizer(&ws.results, "echo done");

    let err = recognizer
        .recognize(&request("upload_1_dddddddd", &ws.image))
        .await
        .unwrap_err();

    assert!(matches!(err, RecognizerError::MissingArtifact));
    assert_eq!(err.to_string(), "No parsed result file found");
}

#[tokio::test]
async fn test_invalid_artifact_json() {
    let ws = workspace();
    let recognizer = script_recognizer(
        &ws.results,
        r#"echo 'not json' > "$out/parsed_${stem}_20250301_120000.json""#,
    );

    let err = recognizer
        .recognize(&request("upload_1_eeeeeeee", &ws.image))
        .await
        .unwrap_err();

    match err {
        RecognizerError::InvalidArtifact { file, .. } => {
            assert_eq!(file, "parsed_menu-1_20250301_120000.json")
        }
        other => panic!("expected invalid artifact, got {other:?}"),
    }
}

#[tokio::test]
async fn test_latest_artifact_wins() {
    let ws = workspace();
    let recognizer = script_recognizer(
        &ws.results,
        r#"echo '{"run":1}' > "$out/parsed_${stem}_20250301_090000.json"; echo '{"run":2}' > "$out/parsed_${stem}_20250301_120000.json""#,
    );

    let document = recognizer
        .recognize(&request("upload_1_ffffffff", &ws.image))
        .await
        .unwrap();

    assert_eq!(document, json!({"run": 2}));
}

#[tokio::test]
async fn test_missing_command_is_a_spawn_error() {
    let ws = workspace();
    let recognizer =
        ProcessRecognizer::new("/nonexistent/menu-recognizer", Vec::new(), &ws.results);

    let err = recognizer
        .recognize(&request("upload_1_abababab", &ws.image))
        .await
        .unwrap_err();

    assert!(matches!(err, RecognizerError::Spawn { .. }), "{err:?}");
}

#[tokio::test]
async fn test_missing_image_is_an_io_error() {
    let ws = workspace();
    let recognizer = script_recognizer(&ws.results, "exit 0");

    let err = recognizer
        .recognize(&request("upload_1_cdcdcdcd", &ws.image.with_file_name("gone.jpg")))
        .await
        .unwrap_err();

    assert!(matches!(err, RecognizerError::Io(_)), "{err:?}");
}

/// Concurrent jobs for images with the same stem never read each other's output.
#[tokio::test]
async fn test_concurrent_jobs_are_isolated() {
    let ws = workspace();
    let recognizer = Arc::new(script_recognizer(
        &ws.results,
        r#"sleep 0.2; printf '{"job":"%s"}' "$RECOGNITION_JOB_ID" > "$out/parsed_${stem}_20250301_120000.json""#,
    ));

    let first = request("upload_1_11111111", &ws.image);
    let second = request("upload_1_22222222", &ws.image);
    let (a, b) = tokio::join!(recognizer.recognize(&first), recognizer.recognize(&second));

    assert_eq!(a.unwrap(), json!({"job": "upload_1_11111111"}));
    assert_eq!(b.unwrap(), json!({"job": "upload_1_22222222"}));
}

fn process_orchestrator(
    recognizer: ProcessRecognizer,
    timeout: Option<Duration>,
) -> (JobOrchestrator, Arc<MemoryCatalog>) {
    let catalog = Arc::new(MemoryCatalog::new());
    let orchestrator = JobOrchestrator::start(
        Arc::new(MemoryJobStore::new()),
        catalog.clone(),
        Arc::new(recognizer),
        OrchestratorConfig {
            recognizer_timeout: timeout,
            ..Default::default()
        },
    );
    (orchestrator, catalog)
}

#[tokio::test]
async fn test_process_recognizer_drives_job_to_completion() {
    let ws = workspace();
    let recognizer = script_recognizer(
        &ws.results,
        r#"printf '{"店名":"第二食堂","菜品":[{"名称":"牛肉面","价格":"15元"}]}' > "$out/parsed_${stem}_20250301_120000.json""#,
    );
    let (orchestrator, catalog) = process_orchestrator(recognizer, None);

    let created = orchestrator
        .create(CreateJob {
            owner_user_id: 3,
            image_path: ws.image.clone(),
            hints: RecognitionHints::default(),
        })
        .await
        .unwrap();

    let view = await_terminal(created, 10).await;
    let payload = completed_payload(&view);
    assert_eq!(payload["restaurant"]["name"], "第二食堂");
    assert_eq!(payload["dishes"][0]["price"], 15.0);

    let snapshot = catalog.snapshot();
    assert_eq!(snapshot.dishes.len(), 1);
    assert_eq!(snapshot.dishes[0].name, "牛肉面");
}

/// A recognizer that outlives the timeout is killed and its job failed.
#[tokio::test]
async fn test_timed_out_process_fails_job() {
    let ws = workspace();
    let recognizer = script_recognizer(&ws.results, "exec sleep 30");
    let (orchestrator, catalog) =
        process_orchestrator(recognizer, Some(Duration::from_millis(300)));

    let created = orchestrator
        .create(CreateJob {
            owner_user_id: 3,
            image_path: ws.image.clone(),
            hints: RecognitionHints::default(),
        })
        .await
        .unwrap();

    let view = await_terminal(created, 5).await;
    assert_eq!(view.state(), JobState::Failed);
    if let JobView::Failed { error } = view {
        assert_eq!(error, "Recognizer timed out after 300ms");
    }
    assert!(catalog.snapshot().restaurants.is_empty());
}
