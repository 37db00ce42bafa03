//! Integration tests for the analysis session paths.
//!
//! A tokio `TcpListener` stands in for the worker's messaging side, while
//! the supervisor still spawns a real (inert) child process so the
//! process bookkeeping is exercised end to end.

#![cfg(unix)]

use std::path::PathBuf;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use pkgscope::analysis::{document, AnalysisDocument, AnalysisRequest, Edge, Node};
use pkgscope::config::{ChannelSettings, Settings, WorkerSettings};
use pkgscope::worker::channel::{read_frame, write_frame};
use pkgscope::worker::protocol::{ClientMessage, WorkerMessage};
use pkgscope::worker::{AnalysisClient, AnalysisError};

/// Harmless stand-in for the worker executable; killed when the client
/// shuts down.
const IDLE_WORKER: &str = "/bin/sleep";

fn test_settings(port: u16) -> Settings {
    Settings {
        worker: WorkerSettings {
            path: Some(PathBuf::from(IDLE_WORKER)),
            args: vec!["300".to_string()],
        },
        channel: ChannelSettings {
            host: "127.0.0.1".to_string(),
            port,
            connect_attempts: 20,
            connect_retry_ms: 50,
        },
    }
}

async fn bind_worker() -> (TcpListener, u16) {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

/// Accept one connection and read one `Analyse` frame from it.
async fn accept_analyse(listener: &TcpListener) -> (TcpStream, uuid::Uuid, PathBuf) {
    let (mut stream, _) = listener.accept().await.unwrap();
    let frame = read_frame(&mut stream)
        .await
        .unwrap()
        .expect("request frame");
    match serde_json::from_slice::<ClientMessage>(&frame).unwrap() {
        ClientMessage::Analyse {
            session,
            output_file,
            ..
        } => (stream, session, output_file),
        other => panic!("unexpected message: {other:?}"),
    }
}

fn scratch_output(name: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(name);
    (dir, path)
}

fn sample_document() -> AnalysisDocument {
    AnalysisDocument {
        nodes: vec![
            Node {
                id: "App.Program".to_string(),
                label: Some("Program".to_string()),
            },
            Node {
                id: "Lib.Parser".to_string(),
                label: None,
            },
        ],
        edges: vec![Edge {
            source: "App.Program".to_string(),
            target: "Lib.Parser".to_string(),
        }],
        clusters: Vec::new(),
        failures: Vec::new(),
    }
}

#[tokio::test]
async fn successful_session_returns_the_document_and_scrubs_output() {
    let (listener, port) = bind_worker().await;
    let expected = sample_document();
    let reply_document = expected.clone();

    let worker = tokio::spawn(async move {
        let (mut stream, session, _) = accept_analyse(&listener).await;
        let reply = WorkerMessage::Completed {
            session,
            document: document::encode(&reply_document).unwrap(),
        };
        write_frame(&mut stream, &serde_json::to_vec(&reply).unwrap())
            .await
            .unwrap();
        stream
    });

    let (_dir, output) = scratch_output("analysis.out");
    std::fs::write(&output, b"partial").unwrap();

    let mut client = AnalysisClient::new(test_settings(port));
    let request = AnalysisRequest::new(b"spec".to_vec(), output.clone());
    let result = client
        .analyse(request, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result, expected);
    assert!(!output.exists());

    let _stream = worker.await.unwrap();
}

#[tokio::test]
async fn remote_failure_surfaces_the_worker_message_and_scrubs_output() {
    let (listener, port) = bind_worker().await;

    let worker = tokio::spawn(async move {
        let (mut stream, session, _) = accept_analyse(&listener).await;
        let reply = WorkerMessage::Failed {
            session,
            error: "bad input".to_string(),
        };
        write_frame(&mut stream, &serde_json::to_vec(&reply).unwrap())
            .await
            .unwrap();
        stream
    });

    let (_dir, output) = scratch_output("analysis.out");
    std::fs::write(&output, b"partial").unwrap();

    let mut client = AnalysisClient::new(test_settings(port));
    let request = AnalysisRequest::new(b"spec".to_vec(), output.clone());
    let err = client
        .analyse(request, CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        AnalysisError::Remote(message) => assert_eq!(message, "bad input"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!output.exists());

    let _stream = worker.await.unwrap();
}

#[tokio::test]
async fn cancellation_beats_a_silent_worker() {
    let (listener, port) = bind_worker().await;

    let worker = tokio::spawn(async move {
        // Never reply to the request; the cancel notice must arrive on the
        // same connection. The request itself may be skipped when the
        // token fires before dispatch.
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut analysed: Option<uuid::Uuid> = None;
        loop {
            let frame = read_frame(&mut stream).await.unwrap().expect("frame");
            match serde_json::from_slice::<ClientMessage>(&frame).unwrap() {
                ClientMessage::Analyse { session, .. } => analysed = Some(session),
                ClientMessage::Cancel { session } => {
                    if let Some(submitted) = analysed {
                        assert_eq!(session, submitted);
                    }
                    break;
                }
            }
        }
    });

    let (_dir, output) = scratch_output("analysis.out");
    std::fs::write(&output, b"partial").unwrap();

    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let mut client = AnalysisClient::new(test_settings(port));
    let request = AnalysisRequest::new(b"spec".to_vec(), output.clone());
    let err = tokio::time::timeout(
        Duration::from_secs(5),
        client.analyse(request, token),
    )
    .await
    .expect("cancellation must not hang")
    .unwrap_err();

    assert!(err.is_cancelled(), "unexpected error: {err:?}");
    assert!(!output.exists());

    worker.await.unwrap();
}

#[tokio::test]
async fn oversized_spec_fails_before_any_process_or_channel_work() {
    // A worker path that cannot spawn and a port nobody listens on:
    // reaching either would produce a different error than SpecTooLarge.
    let settings = Settings {
        worker: WorkerSettings {
            path: Some(PathBuf::from("/nonexistent/pkgscope-worker")),
            args: Vec::new(),
        },
        channel: ChannelSettings {
            host: "127.0.0.1".to_string(),
            port: 1,
            connect_attempts: 1,
            connect_retry_ms: 1,
        },
    };

    // Incompressible bytes keep the gzip output above half the frame
    // budget.
    let mut spec = vec![0u8; 3_000_000];
    use rand::RngCore;
    rand::rng().fill_bytes(&mut spec);

    let (_dir, output) = scratch_output("analysis.out");
    let mut client = AnalysisClient::new(settings);
    let request = AnalysisRequest::new(spec, output);
    let err = client
        .analyse(request, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(
        matches!(err, AnalysisError::SpecTooLarge { .. }),
        "unexpected error: {err:?}"
    );
    assert!(client.worker_pid().is_none());
}

#[tokio::test]
async fn sequential_sessions_reuse_the_warm_worker() {
    let (listener, port) = bind_worker().await;

    let worker = tokio::spawn(async move {
        // Both sessions arrive on the one warm connection.
        let (mut stream, _) = listener.accept().await.unwrap();
        for _ in 0..2 {
            let frame = read_frame(&mut stream).await.unwrap().expect("frame");
            match serde_json::from_slice::<ClientMessage>(&frame).unwrap() {
                ClientMessage::Analyse { session, .. } => {
                    let reply = WorkerMessage::Completed {
                        session,
                        document: document::encode(&AnalysisDocument::default()).unwrap(),
                    };
                    write_frame(&mut stream, &serde_json::to_vec(&reply).unwrap())
                        .await
                        .unwrap();
                }
                other => panic!("unexpected message: {other:?}"),
            }
        }
        stream
    });

    let (_dir, output) = scratch_output("analysis.out");
    let mut client = AnalysisClient::new(test_settings(port));

    client
        .analyse(
            AnalysisRequest::new(b"first".to_vec(), output.clone()),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    let first_pid = client.worker_pid().expect("worker after first session");

    client
        .analyse(
            AnalysisRequest::new(b"second".to_vec(), output.clone()),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    let second_pid = client.worker_pid().expect("worker after second session");

    assert_eq!(first_pid, second_pid);

    let _stream = worker.await.unwrap();
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn dropping_the_client_terminates_the_worker() {
    let (listener, port) = bind_worker().await;

    let worker = tokio::spawn(async move {
        let (mut stream, session, _) = accept_analyse(&listener).await;
        let reply = WorkerMessage::Completed {
            session,
            document: document::encode(&AnalysisDocument::default()).unwrap(),
        };
        write_frame(&mut stream, &serde_json::to_vec(&reply).unwrap())
            .await
            .unwrap();
        stream
    });

    let (_dir, output) = scratch_output("analysis.out");
    let mut client = AnalysisClient::new(test_settings(port));
    client
        .analyse(
            AnalysisRequest::new(b"spec".to_vec(), output),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    let pid = client.worker_pid().expect("warm worker");
    drop(client);

    assert_terminated(pid).await;
    let _stream = worker.await.unwrap();
}

/// Poll until the process is gone or left as an unreaped zombie.
#[cfg(target_os = "linux")]
async fn assert_terminated(pid: u32) {
    for _ in 0..50 {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Err(_) => return,
            Ok(stat) => {
                // The field after the parenthesized command name is the
                // process state; 'Z' means already dead, just unreaped.
                let state = stat
                    .rsplit(')')
                    .next()
                    .and_then(|rest| rest.split_whitespace().next())
                    .and_then(|field| field.chars().next());
                if state == Some('Z') {
                    return;
                }
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("worker {pid} still running after client drop");
}
