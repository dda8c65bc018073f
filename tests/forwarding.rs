//! End-to-end forwarding tests: a hand-fed flow stream through the HTTP
//! reader, the forwarder and the hyper transport, to live mock backends.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use httap::config::{validate_config, HeaderRuleConfig, HttpLimitsConfig, WiretapConfig};
use httap::forward::{Dispatcher, FlowIdentity, FlowSession, Forwarder, HyperTransport};
use httap::lifecycle::Shutdown;
use httap::reassembly::FlowStream;
use tokio::sync::mpsc;

mod common;

/// Feeds `wire` through one flow session and waits for every copy.
async fn replay(config: WiretapConfig, wire: &[&'static [u8]]) {
    let validated = validate_config(&config).unwrap();
    let shutdown = Shutdown::new();
    let dispatcher = Arc::new(Dispatcher::new(
        HyperTransport::new(&config.transport),
        validated.forward.repeat_delay,
        false,
        shutdown.clone(),
    ));
    let forwarder = Arc::new(Forwarder::new(Arc::new(validated.forward), dispatcher));

    let (tx, stream) = FlowStream::channel();
    for chunk in wire {
        tx.send(Bytes::from_static(chunk)).unwrap();
    }
    drop(tx);

    let identity = FlowIdentity::new(
        "10.0.0.7:51234".parse().unwrap(),
        "127.0.0.1:80".parse().unwrap(),
    );
    FlowSession::new(identity, stream, &HttpLimitsConfig::default(), forwarder)
        .consume()
        .await;
    assert!(shutdown.drain(Duration::from_secs(10)).await);
}

fn drain<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> Vec<T> {
    let mut out = Vec::new();
    while let Ok(item) = rx.try_recv() {
        out.push(item);
    }
    out
}

#[tokio::test]
async fn chunked_request_is_rewritten_and_multiplied() {
    let (backend, mut received) = common::start_recording_backend(200).await;

    let mut config = WiretapConfig::default();
    config.forward.destinations = vec![backend.to_string()];
    config.forward.multiply = 2.0;
    config.forward.repeat_delay_ms = 20;
    config.forward.headers = vec![
        HeaderRuleConfig {
            name: "X-Shadow".into(),
            value: "1".into(),
        },
        HeaderRuleConfig {
            name: "Cookie".into(),
            value: String::new(),
        },
    ];

    replay(
        config,
        &[
            b"POST /orders?id=7 HTTP/1.1\r\nHost: shop.example\r\nCookie: s=1\r\n",
            b"Transfer-Encoding: chunked\r\n\r\n3\r\nhel\r\n2\r\nlo\r\n0\r\n\r\n",
        ],
    )
    .await;

    let requests = drain(&mut received);
    assert_eq!(requests.len(), 2);
    for request in &requests {
        assert_eq!(request.method, "POST");
        assert_eq!(request.path, "/orders?id=7");
        assert_eq!(request.header("host"), Some("shop.example"));
        assert_eq!(request.header("x-shadow"), Some("1"));
        assert_eq!(request.header("cookie"), None);
        assert_eq!(request.header("transfer-encoding"), None);
        assert_eq!(request.header("content-length"), Some("5"));
        assert_eq!(request.body, b"hello");
    }
}

#[tokio::test]
async fn failing_destination_does_not_block_others() {
    let (live, mut received) = common::start_recording_backend(503).await;
    let dead = common::closed_port().await;

    let mut config = WiretapConfig::default();
    config.forward.destinations = vec![dead.to_string(), live.to_string()];

    replay(
        config,
        &[b"GET /a HTTP/1.1\r\nHost: x\r\n\r\nGET /b HTTP/1.1\r\nHost: x\r\n\r\n"],
    )
    .await;

    let paths: Vec<String> = drain(&mut received).into_iter().map(|r| r.path).collect();
    assert_eq!(paths.len(), 2);
    assert!(paths.contains(&"/a".to_string()));
    assert!(paths.contains(&"/b".to_string()));
}

#[tokio::test]
async fn filtered_methods_keep_the_stream_aligned() {
    let (backend, mut received) = common::start_recording_backend(200).await;

    let mut config = WiretapConfig::default();
    config.forward.destinations = vec![backend.to_string()];
    config.forward.methods = vec!["get".into()];

    replay(
        config,
        &[
            b"POST /skip HTTP/1.1\r\nHost: x\r\nContent-Length: 14\r\n\r\n",
            b"GET /fake HTTP",
            b"GET /kept HTTP/1.1\r\nHost: x\r\n\r\n",
        ],
    )
    .await;

    let requests = drain(&mut received);
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "GET");
    assert_eq!(requests[0].path, "/kept");
}
