//! Control plane over the Unix socket
//!
//! Starts a daemon-equivalent server from a JSON configuration and drives
//! it with the client the way `netlabelctl` does.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::task::JoinHandle;

use netlabel::audit::{AuditKind, RecordingAuditSink};
use netlabel::config::{build_netlabel_with_audit, load_config_str, LeafConfig, StaticMapping};
use netlabel::error::IpcError;
use netlabel::ipc::{
    decode_message, ErrorCode, IpcClient, IpcCommand, IpcHandler, IpcResponse, IpcServer,
};
use netlabel::label::LabelType;

fn config_json(socket: &Path) -> String {
    format!(
        r#"{{
            "ipc": {{ "socket_path": {socket:?}, "max_message_size": 4096 }},
            "accept_unlabeled": false,
            "dois": [{{ "doi": 7 }}],
            "contexts": ["peer_t"],
            "devices": {{ "eth0": 2 }},
            "domains": [
                {{ "domain": "alice", "type": "unlabeled" }},
                {{ "domain": "bob", "type": "address_select", "addresses": [
                    {{ "address": "10.0.0.0/24", "type": "cipso", "doi": 7 }}
                ] }}
            ],
            "static_labels": [
                {{ "interface": "eth0", "address": "192.168.0.0/16", "secctx": "peer_t" }}
            ]
        }}"#,
        socket = socket.display().to_string()
    )
}

async fn start(socket: &Path) -> (Arc<RecordingAuditSink>, JoinHandle<Result<(), IpcError>>) {
    let config = load_config_str(&config_json(socket)).unwrap();
    let audit = Arc::new(RecordingAuditSink::new());
    let netlabel = build_netlabel_with_audit(&config, audit.clone()).unwrap();
    audit.take();

    let handler = Arc::new(IpcHandler::new(Arc::new(netlabel)));
    let server = IpcServer::new(config.ipc.clone(), handler);
    let handle = tokio::spawn(async move { server.run().await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    (audit, handle)
}

#[tokio::test]
async fn ipc_seeded_tables_are_visible() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("netlabeld.sock");
    let (_audit, handle) = start(&socket).await;
    let client = IpcClient::new(&socket);

    match client.send(IpcCommand::ListDomains).await.unwrap() {
        IpcResponse::DomainList { domains } => {
            let names: Vec<_> = domains.iter().map(|d| d.display_name().to_string()).collect();
            assert_eq!(names.len(), 2);
            assert!(names.contains(&"alice".to_string()));
            assert!(names.contains(&"bob".to_string()));
        }
        other => panic!("Expected DomainList, got {other:?}"),
    }

    match client
        .send(IpcCommand::TestOutbound {
            domain: Some("bob".into()),
            peer: Some("10.0.0.5".parse().unwrap()),
        })
        .await
        .unwrap()
    {
        IpcResponse::OutboundResult(result) => {
            assert_eq!(result.label_type, LabelType::Cipso);
            assert_eq!(result.doi, Some(7));
        }
        other => panic!("Expected OutboundResult, got {other:?}"),
    }

    match client
        .send(IpcCommand::TestInbound {
            ifindex: 2,
            source: "10.0.0.9".parse().unwrap(),
        })
        .await
        .unwrap()
    {
        IpcResponse::Error(err) => assert_eq!(err.code, ErrorCode::NoLabel),
        other => panic!("Expected NoLabel, got {other:?}"),
    }

    handle.abort();
}

#[tokio::test]
async fn ipc_mutations_are_audited_with_peer_identity() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("netlabeld.sock");
    let (audit, handle) = start(&socket).await;
    let client = IpcClient::new(&socket);

    let response = client
        .send(IpcCommand::AddDomainAddress {
            domain: Some("bob".into()),
            address: "fd00::/8".parse().unwrap(),
            leaf: LeafConfig::Unlabeled,
        })
        .await
        .unwrap();
    assert!(!response.is_error(), "{response:?}");

    let response = client
        .send(IpcCommand::AddStatic {
            mapping: StaticMapping {
                interface: Some("eth9".into()),
                address: "10.0.0.0/8".parse().unwrap(),
                secctx: "peer_t".into(),
            },
        })
        .await
        .unwrap();
    match response {
        IpcResponse::Error(err) => assert_eq!(err.code, ErrorCode::NoDevice),
        other => panic!("Expected NoDevice, got {other:?}"),
    }

    let events = audit.take();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].kind, AuditKind::MapAdd);
    assert!(events[0].success);
    assert_eq!(events[1].kind, AuditKind::StaticAdd);
    assert!(!events[1].success);
    for event in &events {
        assert_eq!(event.subject.uid, Some(current_uid()));
        assert_eq!(event.subject.pid, i32::try_from(std::process::id()).ok());
    }

    handle.abort();
}

/// Owner of a freshly created directory is the current user
fn current_uid() -> u32 {
    use std::os::unix::fs::MetadataExt;
    let dir = tempfile::tempdir().unwrap();
    std::fs::metadata(dir.path()).unwrap().uid()
}

#[tokio::test]
async fn ipc_rejects_malformed_and_oversized_frames() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("netlabeld.sock");
    let (_audit, handle) = start(&socket).await;

    let mut stream = UnixStream::connect(&socket).await.unwrap();

    let garbage = b"{\"type\":\"no_such_command\"}";
    stream
        .write_all(&u32::try_from(garbage.len()).unwrap().to_be_bytes())
        .await
        .unwrap();
    stream.write_all(garbage).await.unwrap();
    match read_response(&mut stream).await {
        IpcResponse::Error(err) => assert_eq!(err.code, ErrorCode::InvalidCommand),
        other => panic!("Expected InvalidCommand, got {other:?}"),
    }

    stream.write_all(&100_000u32.to_be_bytes()).await.unwrap();
    match read_response(&mut stream).await {
        IpcResponse::Error(err) => assert_eq!(err.code, ErrorCode::InvalidParameters),
        other => panic!("Expected InvalidParameters, got {other:?}"),
    }

    // The server drops the connection after an oversized frame.
    let mut rest = Vec::new();
    assert_eq!(stream.read_to_end(&mut rest).await.unwrap(), 0);

    handle.abort();
}

#[tokio::test]
async fn ipc_shutdown_stops_server() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("netlabeld.sock");
    let (_audit, handle) = start(&socket).await;

    let client = IpcClient::new(&socket);
    assert!(client.ping().await.unwrap());
    let response = client.send(IpcCommand::Shutdown).await.unwrap();
    assert!(!response.is_error());

    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(client.ping().await.is_err());
}

async fn read_response(stream: &mut UnixStream) -> IpcResponse {
    let mut len = [0u8; 4];
    stream.read_exact(&mut len).await.unwrap();
    let mut body = vec![0u8; u32::from_be_bytes(len) as usize];
    stream.read_exact(&mut body).await.unwrap();
    decode_message(&body).unwrap()
}
