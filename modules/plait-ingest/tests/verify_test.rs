//! Owner verification against a local stub knot.

use plait_ingest::{Verifier, VerifyError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Serve `body` on every request to `/owner` until the listener drops.
async fn stub_owner_endpoint(body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
            });
        }
    });
    format!("127.0.0.1:{}", addr.port())
}

#[tokio::test]
async fn matching_owner_verifies() {
    let instance = stub_owner_endpoint("did:plc:xyz\n").await;
    let verifier = Verifier::new();
    verifier
        .run_verification(&instance, "did:plc:xyz")
        .await
        .expect("trailing newline is trimmed before comparison");
}

#[tokio::test]
async fn mismatched_owner_reports_both_sides() {
    let instance = stub_owner_endpoint("did:plc:somebody-else\n").await;
    let verifier = Verifier::new();
    let err = verifier
        .run_verification(&instance, "did:plc:xyz")
        .await
        .unwrap_err();
    match err {
        VerifyError::OwnerMismatch { expected, observed } => {
            assert_eq!(expected, "did:plc:xyz");
            assert_eq!(observed, "did:plc:somebody-else");
        }
        other => panic!("expected OwnerMismatch, got {other:?}"),
    }
}

#[tokio::test]
async fn unreachable_instance_is_a_fetch_error() {
    let verifier = Verifier::new();
    // Reserved port with nothing listening.
    let err = verifier
        .run_verification("127.0.0.1:1", "did:plc:xyz")
        .await
        .unwrap_err();
    assert!(matches!(err, VerifyError::Fetch { .. }));
}
