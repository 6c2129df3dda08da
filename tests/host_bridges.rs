use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use mutation_interpreter::config::HostCapabilities;
use mutation_interpreter::net::{FetchBody, FetchBridge, FetchError, FetchRequest};
use mutation_interpreter::scheduler::Tick;
use mutation_interpreter::{Document, InterpreterConfig, Session};
use serde_json::json;
use tempfile::NamedTempFile;
use tokio::time::Duration;
use url::Url;

#[tokio::test(start_paused = true)]
async fn render_requests_run_in_request_order() {
    let (session, _reports) =
        Session::new(Document::new(), &InterpreterConfig::default()).expect("session");
    let log = Rc::new(RefCell::new(Vec::new()));

    let idle_log = Rc::clone(&log);
    session.request_render_idle(Some(Duration::from_millis(200)), move |tick| {
        idle_log.borrow_mut().push(match tick {
            Tick::Idle(deadline) => format!("idle timeout={}", deadline.did_timeout),
            Tick::Frame(_) => "unexpected frame".to_string(),
        });
    });
    let frame_log = Rc::clone(&log);
    session.request_render_frame(move |tick| {
        frame_log.borrow_mut().push(match tick {
            Tick::Frame(_) => "frame".to_string(),
            Tick::Idle(_) => "unexpected idle".to_string(),
        });
    });
    let cancelled_log = Rc::clone(&log);
    let cancelled = session.request_render_frame(move |_| {
        cancelled_log.borrow_mut().push("cancelled".to_string());
    });
    assert!(session.cancel_render(cancelled));

    // Idle (1ms) fires before the next frame boundary (16ms).
    while session.scheduler().has_pending() {
        session.scheduler().tick().await;
    }
    assert_eq!(
        *log.borrow(),
        vec!["idle timeout=false".to_string(), "frame".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn missing_idle_support_still_runs_callbacks() {
    let config = InterpreterConfig {
        capabilities: HostCapabilities {
            idle_callback: false,
            animation_frame: true,
        },
        ..InterpreterConfig::default()
    };
    let (session, _reports) = Session::new(Document::new(), &config).expect("session");
    let ran = Rc::new(RefCell::new(false));
    let flag = Rc::clone(&ran);
    let handle = session.request_render_idle(None, move |_| *flag.borrow_mut() = true);
    assert!(handle.is_degraded());
    assert_eq!(session.scheduler().tick().await, 1);
    assert!(*ran.borrow());
}

#[tokio::test]
async fn fetch_reads_file_urls() {
    let mut file = tempfile::Builder::new()
        .suffix(".json")
        .tempfile()
        .expect("temp file");
    write!(file, r#"{{"stories":[1,2,3]}}"#).unwrap();
    let url = Url::from_file_path(file.path()).expect("file url");

    let bridge = FetchBridge::new(&InterpreterConfig::default()).expect("bridge");
    let response = bridge
        .fetch(&FetchRequest::get(url.as_str()))
        .await
        .expect("file fetch");
    assert!(response.ok());
    assert_eq!(response.content_type.as_deref(), Some("application/json"));
    assert_eq!(response.body, FetchBody::Json(json!({ "stories": [1, 2, 3] })));
}

#[tokio::test]
async fn fetch_reports_missing_files_and_bad_methods() {
    let bridge = FetchBridge::new(&InterpreterConfig::default()).expect("bridge");
    let dir = tempfile::tempdir().unwrap();
    let missing = Url::from_file_path(dir.path().join("nope.txt")).unwrap();
    let err = bridge
        .fetch(&FetchRequest::get(missing.as_str()))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::File { .. }));

    let err = bridge
        .fetch(&FetchRequest {
            url: "http://localhost/".into(),
            method: "NOT A METHOD".into(),
            ..FetchRequest::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::InvalidMethod(_)));
}

#[tokio::test]
async fn files_without_known_extension_stay_raw() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "hello").unwrap();
    let url = Url::from_file_path(file.path()).unwrap();
    let bridge = FetchBridge::new(&InterpreterConfig::default()).unwrap();
    let response = bridge.fetch(&FetchRequest::get(url.as_str())).await.unwrap();
    // No extension: unknown content type stays raw.
    assert_eq!(response.body, FetchBody::Bytes(b"hello".to_vec()));
}

#[tokio::test]
async fn session_history_follows_base_url() {
    let config = InterpreterConfig {
        base_url: "https://news.example/".into(),
        ..InterpreterConfig::default()
    };
    let (mut session, _reports) = Session::new(Document::new(), &config).expect("session");
    assert_eq!(session.history().location().path, "/");

    session
        .history_mut()
        .push_state(json!({"item": 7}), "item", Some("/item?id=7"))
        .expect("same-origin push");
    let location = session.history().location();
    assert_eq!(location.path, "/item");
    assert_eq!(location.query_pairs(), vec![("id".to_string(), "7".to_string())]);

    session.history_mut().back().expect("initial entry");
    assert_eq!(session.history().location().href, "https://news.example/");
}
