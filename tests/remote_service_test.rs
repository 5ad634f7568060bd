//! Integration tests against an in-process stand-in for the remote
//! optimization server, speaking the real length-delimited frame
//! protocol over TCP.

use std::collections::BTreeMap;

use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use chemopt::algorithms::AlgorithmSettings;
use chemopt::domain::models::{ParameterSpec, ParameterTemplate};
use chemopt::infrastructure::remote::protocol::{self, AlgorithmSpec, RemoteRequest};
use chemopt::infrastructure::remote::{RemoteAlgorithmClient, RemoteError, RemoteSettings};
use chemopt::services::AlgorithmOrchestrator;

/// Serve one connection: for every request frame received, send the
/// next canned reply. Returns the decoded requests once the client
/// hangs up or the replies run out.
async fn spawn_server(replies: Vec<serde_json::Value>) -> (String, JoinHandle<Vec<RemoteRequest>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = tokio::io::BufReader::new(read_half);
        let mut received = Vec::new();
        let mut replies = replies.into_iter();
        while let Some(body) = protocol::read_frame(&mut reader).await.unwrap() {
            received.push(serde_json::from_slice(&body).unwrap());
            match replies.next() {
                Some(reply) => {
                    let frame = protocol::encode(&reply).unwrap();
                    write_half.write_all(&frame).await.unwrap();
                }
                None => break,
            }
        }
        received
    });
    (address, handle)
}

fn settings(address: String) -> RemoteSettings {
    RemoteSettings {
        address,
        reply_timeout_ms: 100,
        max_retries: 5,
    }
}

fn template() -> ParameterTemplate {
    let mut batches = ParameterTemplate::new();
    for batch in ["batch 1", "batch 2"] {
        let mut params = BTreeMap::new();
        params.insert("add_volume".to_string(), ParameterSpec::new("add_volume", 0.5, 2.5));
        params.insert(
            "reflux_time".to_string(),
            ParameterSpec::new("reflux_time", 30.0, 120.0),
        );
        batches.insert(batch.to_string(), params);
    }
    batches
}

#[tokio::test]
async fn handshake_negotiates_a_strategy() {
    let (address, server) =
        spawn_server(vec![json!({"strategy": {"name": "bayesian", "version": 2}})]).await;
    let mut client = RemoteAlgorithmClient::connect(settings(address)).await.unwrap();

    let strategy = client
        .initialize(
            "procedure-hash",
            AlgorithmSpec {
                name: "smbo".to_string(),
                config: serde_json::Value::Null,
            },
        )
        .await
        .unwrap();
    assert_eq!(strategy["name"], "bayesian");

    client.disconnect().await.unwrap();
    let requests = server.await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].hash, "procedure-hash");
    assert_eq!(requests[0].algorithm.as_ref().unwrap().name, "smbo");
}

#[tokio::test]
async fn orchestrator_maps_reply_arrays_onto_batches() {
    let (address, server) = spawn_server(vec![
        json!({"strategy": {"name": "tpe"}}),
        json!({"add_volume": [1.2, 1.4], "reflux_time": [40.0, 50.0]}),
    ])
    .await;
    let client = RemoteAlgorithmClient::connect(settings(address)).await.unwrap();
    let spec = AlgorithmSpec {
        name: "tpe".to_string(),
        config: serde_json::Value::Null,
    };
    let mut orch = AlgorithmOrchestrator::remote(client, spec);
    let template = template();
    orch.initialize(&template, "h").await.unwrap();
    assert_eq!(orch.strategy().unwrap()["name"], "tpe");

    let setup = orch.get_next_setup().await.unwrap();
    assert_eq!(setup["batch 1"]["add_volume"], 1.2);
    assert_eq!(setup["batch 2"]["add_volume"], 1.4);
    assert_eq!(setup["batch 1"]["reflux_time"], 40.0);
    assert_eq!(setup["batch 2"]["reflux_time"], 50.0);

    drop(orch);
    let requests = server.await.unwrap();
    assert_eq!(requests.len(), 2);
    // The suggestion request carries the current setup by name
    let parameters = requests[1].parameters.as_ref().unwrap();
    assert_eq!(parameters["add_volume"].len(), 2);
}

#[tokio::test]
async fn server_exception_retains_the_previous_setup() {
    let (address, _server) = spawn_server(vec![
        json!({"strategy": {"name": "tpe"}}),
        json!({"add_volume": [1.2, 1.4], "reflux_time": [40.0, 50.0]}),
        json!({"exception": "model fit diverged"}),
    ])
    .await;
    let client = RemoteAlgorithmClient::connect(settings(address)).await.unwrap();
    let spec = AlgorithmSpec {
        name: "tpe".to_string(),
        config: serde_json::Value::Null,
    };
    let mut orch = AlgorithmOrchestrator::remote(client, spec);
    let template = template();
    orch.initialize(&template, "h").await.unwrap();

    let first = orch.get_next_setup().await.unwrap();
    let second = orch.get_next_setup().await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn preload_survives_a_server_exception() {
    use chemopt::domain::ports::algorithm::FULL_HISTORY;

    let (address, server) = spawn_server(vec![
        json!({"strategy": {"name": "tpe"}}),
        json!({"exception": "model fit diverged"}),
        json!({"add_volume": [1.2, 1.4], "reflux_time": [40.0, 50.0]}),
    ])
    .await;
    let client = RemoteAlgorithmClient::connect(settings(address)).await.unwrap();
    let spec = AlgorithmSpec {
        name: "tpe".to_string(),
        config: serde_json::Value::Null,
    };
    let mut orch = AlgorithmOrchestrator::remote(client, spec);
    let template = template();
    orch.initialize(&template, "h").await.unwrap();
    orch.mark_preload();

    // The failed attempt keeps the previous setup, the retry succeeds
    let first = orch.get_next_setup().await.unwrap();
    assert_eq!(first["batch 1"]["add_volume"], 0.5);
    let second = orch.get_next_setup().await.unwrap();
    assert_eq!(second["batch 1"]["add_volume"], 1.2);

    drop(orch);
    let requests = server.await.unwrap();
    assert_eq!(requests.len(), 3);
    // Both the failed round-trip and the retry ask for a full-history
    // recalibration
    assert_eq!(requests[1].n_batches, FULL_HISTORY);
    assert_eq!(requests[2].n_batches, FULL_HISTORY);
}

#[tokio::test]
async fn silent_server_times_out_loudly() {
    // Accept the connection but never reply
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        drop(stream);
    });

    let mut client = RemoteAlgorithmClient::connect(RemoteSettings {
        address,
        reply_timeout_ms: 20,
        max_retries: 3,
    })
    .await
    .unwrap();

    let request = RemoteRequest {
        hash: "h".to_string(),
        parameters: None,
        result: None,
        target: None,
        batch_size: 1,
        n_batches: 1,
        algorithm: None,
    };
    let err = client.request(&request).await.unwrap_err();
    assert!(matches!(err, RemoteError::Timeout { attempts: 3, wait_ms: 20 }));
    server.abort();
}

#[tokio::test]
async fn connect_to_a_dead_port_fails_with_the_address() {
    // Bind and immediately drop to get a port nobody is listening on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    drop(listener);

    let err = RemoteAlgorithmClient::connect(settings(address.clone()))
        .await
        .err()
        .unwrap();
    match err {
        RemoteError::Connect { address: a, .. } => assert_eq!(a, address),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn local_mode_never_opens_a_socket() {
    let settings = AlgorithmSettings {
        name: "random".to_string(),
        seed: Some(11),
        ..Default::default()
    };
    let mut orch = AlgorithmOrchestrator::local(settings);
    orch.initialize(&template(), "h").await.unwrap();
    assert!(orch.get_next_setup().await.is_ok());
}
