use echo_server::classify::{Route, classify};
use echo_server::common::RecordingObserver;
use echo_server::http::{InboundRequest, RequestReader};
use echo_server::{DuplexEchoResponder, EventSequencer};
use futures_util::{SinkExt, StreamExt};
use proptest::prelude::*;
use std::net::SocketAddr;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::Role;

fn addr() -> SocketAddr {
    "127.0.0.1:40000".parse().unwrap()
}

fn parse(raw: &str) -> InboundRequest {
    InboundRequest::parse(raw.as_bytes(), addr()).unwrap()
}

fn message() -> impl Strategy<Value = Message> {
    prop_oneof![
        "[a-zA-Z0-9 ]{0,64}".prop_map(Message::Text),
        prop::collection::vec(any::<u8>(), 0..256).prop_map(Message::Binary),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Property: every data line survives encoding and ids keep increasing
    #[test]
    fn event_data_lines_round_trip(lines in prop::collection::vec("[^\r\n]{0,40}", 1..6)) {
        let data = lines.join("\n");
        let mut sequencer = EventSequencer::new();
        let first = sequencer.next_event("request", data.clone());
        let second = sequencer.next_event("time", "now");
        prop_assert!(second.id > first.id);

        let encoded = first.encode();
        prop_assert!(encoded.starts_with("event: request\n"));
        let suffix = format!("id: {}\n\n", first.id);
        prop_assert!(encoded.ends_with(&suffix));

        let decoded: Vec<&str> = encoded
            .lines()
            .filter_map(|line| line.strip_prefix("data: "))
            .collect();
        prop_assert_eq!(decoded.join("\n"), data);
    }

    /// Property: without an upgrade only the reserved paths leave the plain route
    #[test]
    fn plain_route_for_ordinary_paths(path in "/[a-z0-9]{1,16}(/[a-z0-9]{0,8})?") {
        let route = classify(&parse(&format!("GET {path} HTTP/1.1\r\nHost: x\r\n\r\n")));
        prop_assert_eq!(route, Route::Plain);
    }

    /// Property: a valid upgrade selects the duplex route whatever the path
    #[test]
    fn valid_upgrade_wins_on_any_path(path in "/[a-z0-9.]{0,16}") {
        let raw = format!(
            "GET {path} HTTP/1.1\r\nHost: x\r\nConnection: keep-alive, Upgrade\r\n\
             Upgrade: websocket\r\nSec-WebSocket-Version: 13\r\n\
             Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n"
        );
        prop_assert!(matches!(classify(&parse(&raw)), Route::Duplex(_)));
    }

    /// Property: pipelined requests parse the same however the bytes are split
    #[test]
    fn pipelined_requests_survive_any_split(split in 1usize..80, body in "[a-z]{0,20}") {
        let raw = format!(
            "POST /a HTTP/1.1\r\nHost: x\r\nContent-Length: {}\r\n\r\n{body}GET /b HTTP/1.1\r\nHost: x\r\n\r\n",
            body.len()
        );
        let split = split.min(raw.len() - 1);
        let (head, tail) = raw.as_bytes().split_at(split);

        tokio_test::block_on(async {
            let mut io = tokio_test::io::Builder::new().read(head).read(tail).build();
            let mut reader = RequestReader::new(64 * 1024, 1024);

            let first = reader.read_request(&mut io, addr()).await
                .map_err(|e| TestCaseError::fail(format!("first request: {e}")))?
                .ok_or_else(|| TestCaseError::fail("missing first request"))?;
            prop_assert_eq!(first.path(), "/a");
            prop_assert_eq!(&first.body[..], body.as_bytes());

            let second = reader.read_request(&mut io, addr()).await
                .map_err(|e| TestCaseError::fail(format!("second request: {e}")))?
                .ok_or_else(|| TestCaseError::fail("missing second request"))?;
            prop_assert_eq!(second.path(), "/b");
            Ok(())
        })?;
    }

    /// Property: the duplex channel echoes every message in order with its kind
    #[test]
    fn duplex_echo_preserves_order(messages in prop::collection::vec(message(), 1..16)) {
        tokio_test::block_on(async {
            let (client, server) = tokio::io::duplex(64 * 1024);
            let handle = tokio::spawn(async move {
                let ws = WebSocketStream::from_raw_socket(server, Role::Server, None).await;
                DuplexEchoResponder::new(1 << 20)
                    .echo(ws, String::new(), addr(), &RecordingObserver::default())
                    .await
            });
            let mut client = WebSocketStream::from_raw_socket(client, Role::Client, None).await;

            let greeting = client.next().await
                .ok_or_else(|| TestCaseError::fail("missing greeting"))?
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert_eq!(greeting, Message::Text(String::new()));

            for sent in &messages {
                client.send(sent.clone()).await
                    .map_err(|e| TestCaseError::fail(e.to_string()))?;
                let echoed = client.next().await
                    .ok_or_else(|| TestCaseError::fail("channel closed early"))?
                    .map_err(|e| TestCaseError::fail(e.to_string()))?;
                prop_assert_eq!(&echoed, sent);
            }

            client.close(None).await.map_err(|e| TestCaseError::fail(e.to_string()))?;
            handle.await
                .map_err(|e| TestCaseError::fail(e.to_string()))?
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            Ok(())
        })?;
    }
}
