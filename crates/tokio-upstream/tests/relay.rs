use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_upstream::{
    BackendAddress, BackendConnection, BodyType, ConnectionPool, ErrorKind, HttpState, Relay,
    RelayOutcome, RequestContext,
};

/// RUST_LOG でリレーのログを確認できるようにする
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// バックエンドの応答を小分けに書き込み、中継結果とクライアントが受け取ったバイト列を返す
async fn relay_split(
    relay: &Relay,
    request: RequestContext,
    parts: &[&[u8]],
) -> (RelayOutcome, Vec<u8>) {
    init_tracing();
    let (mut backend_tx, mut backend_rx) = tokio::io::duplex(4096);
    let parts: Vec<Vec<u8>> = parts.iter().map(|p| p.to_vec()).collect();
    let writer = tokio::spawn(async move {
        for part in parts {
            backend_tx.write_all(&part).await.unwrap();
            tokio::task::yield_now().await;
        }
        backend_tx
    });

    let mut client = Vec::new();
    let mut response = relay.new_response(request);
    let outcome = relay
        .relay_response(&mut backend_rx, &mut client, &mut response)
        .await
        .unwrap();
    drop(writer.await.unwrap());
    (outcome, client)
}

#[tokio::test]
async fn chunked_body_is_forwarded_raw() {
    let relay = Relay::new().read_buffer_size(5);
    let head = b"HTTP/1.1 200 OK\r\nDate: Sun, 06 Nov 1994 08:49:37 GMT\r\n\
                 Transfer-Encoding: chunked\r\n\r\n";
    let body = b"5\r\nhello\r\n6;ext=1\r\n world\r\n0\r\nX-Checksum: abc\r\n\r\n";
    let (outcome, client) =
        relay_split(&relay, RequestContext::default(), &[head, &body[..9], &body[9..]]).await;

    assert_eq!(outcome.status_code, 200);
    assert_eq!(outcome.body_type, BodyType::Chunked);
    assert_eq!(outcome.body_bytes, 11);
    assert!(outcome.reusable);

    let mut expected = head.to_vec();
    expected.extend_from_slice(body);
    assert_eq!(client, expected);
}

#[tokio::test]
async fn missing_date_header_is_added() {
    let relay = Relay::new();
    let (outcome, client) = relay_split(
        &relay,
        RequestContext::default(),
        &[b"HTTP/1.1 204 No Content\r\n\r\n"],
    )
    .await;
    assert_eq!(outcome.body_type, BodyType::NoBody);
    let text = String::from_utf8(client).unwrap();
    assert!(text.starts_with("HTTP/1.1 204 No Content\r\n"));
    assert!(text.contains("\r\nDate: "));
    assert!(text.ends_with("GMT\r\n\r\n"));
}

#[tokio::test]
async fn secure_headers_are_not_forwarded() {
    let relay = Relay::new();
    let (outcome, client) = relay_split(
        &relay,
        RequestContext::default(),
        &[b"HTTP/1.1 200 OK\r\n!~Backend-Internal: 1\r\nContent-Length: 2\r\n\r\nok"],
    )
    .await;
    assert_eq!(outcome.body_bytes, 2);
    let text = String::from_utf8(client).unwrap();
    assert!(!text.contains("Backend-Internal"));
    assert!(text.ends_with("\r\n\r\nok"));
}

#[tokio::test]
async fn continue_is_forwarded_once() {
    let relay = Relay::new();
    let (outcome, client) = relay_split(
        &relay,
        RequestContext::default(),
        &[
            b"HTTP/1.1 100 Continue\r\n\r\n",
            b"HTTP/1.1 100 Continue\r\n\r\n",
            b"HTTP/1.1 200 OK\r\nDate: Sun, 06 Nov 1994 08:49:37 GMT\r\n\
              Content-Length: 3\r\n\r\nabc",
        ],
    )
    .await;
    assert_eq!(outcome.status_code, 200);
    assert!(outcome.reusable);

    let text = String::from_utf8(client).unwrap();
    assert_eq!(text.matches("100 Continue").count(), 1);
    assert!(text.starts_with("HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 200 OK\r\n"));
    assert!(text.ends_with("abc"));
}

#[tokio::test]
async fn head_response_ignores_content_length() {
    let relay = Relay::new();
    let request = RequestContext {
        head_request: true,
        ..Default::default()
    };
    let (outcome, client) = relay_split(
        &relay,
        request,
        &[b"HTTP/1.1 200 OK\r\nDate: Sun, 06 Nov 1994 08:49:37 GMT\r\nContent-Length: 100\r\n\r\n"],
    )
    .await;
    assert_eq!(outcome.body_type, BodyType::NoBody);
    assert_eq!(outcome.body_bytes, 0);
    assert!(outcome.reusable);
    assert!(client.ends_with(b"Content-Length: 100\r\n\r\n"));
}

#[tokio::test]
async fn early_hints_then_final_response() {
    let relay = Relay::new();
    let (outcome, client) = relay_split(
        &relay,
        RequestContext::default(),
        &[b"HTTP/1.1 103 Early Hints\r\nLink: </style.css>; rel=preload\r\n\r\n\
            HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nhi"],
    )
    .await;
    assert_eq!(outcome.status_code, 200);
    assert_eq!(outcome.body_type, BodyType::ContentLength);
    assert_eq!(outcome.body_bytes, 2);
    assert!(outcome.leftover.is_empty());
    assert!(outcome.reusable);

    let text = String::from_utf8(client).unwrap();
    assert!(text.starts_with("HTTP/1.1 103 Early Hints\r\nLink: </style.css>; rel=preload\r\n"));
    assert!(text.contains("HTTP/1.1 200 OK\r\nContent-Length: 2\r\n"));
    assert!(text.ends_with("\r\n\r\nhi"));
}

#[tokio::test]
async fn interim_responses_keep_request_context() {
    let relay = Relay::new();
    let request = RequestContext {
        head_request: true,
        ..Default::default()
    };
    let (outcome, client) = relay_split(
        &relay,
        request,
        &[
            b"HTTP/1.1 100 Continue\r\n\r\n",
            b"HTTP/1.1 102 Processing\r\n\r\n",
            b"HTTP/1.1 100 Continue\r\n\r\n",
            b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\n",
        ],
    )
    .await;
    // HEAD への応答なので Content-Length があってもボディはない
    assert_eq!(outcome.status_code, 200);
    assert_eq!(outcome.body_type, BodyType::NoBody);
    assert!(outcome.reusable);

    let text = String::from_utf8(client).unwrap();
    assert_eq!(text.matches("100 Continue").count(), 1);
    assert_eq!(text.matches("102 Processing").count(), 1);
}

#[tokio::test]
async fn upgrade_returns_tunnel_bytes() {
    let relay = Relay::new();
    let (outcome, client) = relay_split(
        &relay,
        RequestContext::default(),
        &[b"HTTP/1.1 101 Switching Protocols\r\n\
            Upgrade: websocket\r\nConnection: Upgrade\r\n\r\n\x81\x02hi"],
    )
    .await;
    assert_eq!(outcome.status_code, 101);
    assert_eq!(outcome.body_type, BodyType::Upgrade);
    assert!(!outcome.reusable);
    assert_eq!(outcome.leftover, b"\x81\x02hi".to_vec());
    assert!(String::from_utf8_lossy(&client).starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
}

#[tokio::test]
async fn pipelined_bytes_make_connection_unusable() {
    let relay = Relay::new();
    let (outcome, _) = relay_split(
        &relay,
        RequestContext::default(),
        &[b"HTTP/1.1 200 OK\r\nContent-Length: 1\r\n\r\nxHTTP/1.1"],
    )
    .await;
    assert_eq!(outcome.leftover, b"HTTP/1.1".to_vec());
    assert!(!outcome.reusable);
}

#[tokio::test]
async fn conflicting_framing_is_reported() {
    let relay = Relay::new();
    let (mut backend_tx, mut backend_rx) = tokio::io::duplex(256);
    backend_tx
        .write_all(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nContent-Length: 4\r\n\r\n")
        .await
        .unwrap();

    let mut client = Vec::new();
    let mut response = relay.new_response(RequestContext::default());
    let err = relay
        .relay_response(&mut backend_rx, &mut client, &mut response)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert_eq!(err.annotation("parse_error"), Some("CONFLICTING_FRAMING"));
    assert_eq!(response.http_state(), HttpState::Error);
    assert!(!response.can_keep_alive());
    assert!(client.is_empty());
}

#[tokio::test]
async fn keep_alive_connection_round_trip() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = BackendAddress::Tcp(listener.local_addr().unwrap().to_string());

    // 2 つのリクエストに同じ接続で応答するバックエンド
    let backend = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 1024];
        for body in ["first", "second"] {
            let mut request = Vec::new();
            while !request.ends_with(b"\r\n\r\n") {
                let n = stream.read(&mut buf).await.unwrap();
                assert!(n > 0);
                request.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n{}",
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
        }
    });

    let pool = ConnectionPool::new(4);
    let relay = Relay::new().read_timeout(Some(Duration::from_secs(5)));

    for expected in ["first", "second"] {
        let mut conn = match pool.checkout() {
            Some(conn) => conn,
            None => BackendConnection::connect(&address, Duration::from_secs(5))
                .await
                .unwrap(),
        };
        conn.write_all(b"GET / HTTP/1.1\r\nHost: app\r\n\r\n")
            .await
            .unwrap();

        let mut client = Vec::new();
        let mut response = relay.new_response(RequestContext::default());
        let outcome = relay
            .relay_response(&mut conn, &mut client, &mut response)
            .await
            .unwrap();
        assert!(outcome.reusable);
        assert!(client.ends_with(expected.as_bytes()));
        assert!(pool.checkin(conn, &response));
        assert_eq!(pool.idle_count(), 1);
    }

    backend.await.unwrap();
}
