//! One-shot echo with random fault injection

use crate::fault::CoinFlip;
use crate::http::{InboundRequest, Response};
use crate::observer::EchoObserver;
use serde::Serialize;
use std::io;
use tokio::io::AsyncWrite;

/// Canned document every echo starts from
#[derive(Debug, Serialize)]
struct Canned<'a> {
    access_token: &'static str,
    gtins: [&'static str; 1],
    #[serde(rename = "changesUntil")]
    changes_until: &'static str,
    request: RequestEcho<'a>,
}

#[derive(Debug, Serialize)]
struct RequestEcho<'a> {
    method: &'a str,
    path: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    query: Option<&'a str>,
    version: String,
    remote_addr: String,
    headers: Vec<(&'a str, String)>,
    body: String,
}

/// Textual rendering of a request, reproduced verbatim to the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoPayload(String);

impl EchoPayload {
    pub fn render(request: &InboundRequest) -> Self {
        let document = Canned {
            access_token: "fake-token",
            gtins: ["999"],
            changes_until: "2020-12-12T00:00:11.111Z",
            request: RequestEcho {
                method: request.method.as_str(),
                path: request.path(),
                query: request.uri.query(),
                version: format!("{:?}", request.version),
                remote_addr: request.remote_addr.to_string(),
                headers: request
                    .ordered_headers()
                    .into_iter()
                    .map(|(name, value)| {
                        (
                            name.as_str(),
                            String::from_utf8_lossy(value.as_bytes()).into_owned(),
                        )
                    })
                    .collect(),
                body: String::from_utf8_lossy(&request.body).into_owned(),
            },
        };
        // Serializing borrowed strings into a String cannot fail.
        Self(serde_json::to_string_pretty(&document).unwrap_or_default())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Answers with the echo payload and a coin-flipped status
pub struct PlainEchoResponder<'a> {
    coin: &'a dyn CoinFlip,
}

impl<'a> PlainEchoResponder<'a> {
    pub fn new(coin: &'a dyn CoinFlip) -> Self {
        Self { coin }
    }

    /// The response for `request`: 200 or 403 with equal probability
    pub fn response(&self, request: &InboundRequest) -> Response {
        let status = if self.coin.flip() {
            http::StatusCode::FORBIDDEN
        } else {
            http::StatusCode::OK
        };
        Response::new(
            status,
            "application/json",
            EchoPayload::render(request).into_string(),
        )
    }

    pub async fn respond<W>(
        &self,
        w: &mut W,
        request: &InboundRequest,
        observer: &dyn EchoObserver,
    ) -> io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let response = self.response(request);
        observer.plain_response(request.remote_addr, response.status);
        response
            .write_to(w, request.version, request.keep_alive())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::test_utils::{Observed, RecordingObserver};
    use crate::fault::{FixedCoin, SeededCoin};
    use http::StatusCode;

    fn request() -> InboundRequest {
        let raw = b"PUT /orders?id=7 HTTP/1.1\r\nHost: echo\r\nX-Trace: a\r\nX-Trace: b\r\nContent-Length: 4\r\n\r\nabcd";
        InboundRequest::parse(raw, "10.0.0.1:3000".parse().unwrap()).unwrap()
    }

    #[test]
    fn test_payload_contents() {
        let payload = EchoPayload::render(&request());
        let value: serde_json::Value = serde_json::from_str(payload.as_str()).unwrap();

        assert_eq!(value["access_token"], "fake-token");
        assert_eq!(value["gtins"][0], "999");
        assert_eq!(value["request"]["method"], "PUT");
        assert_eq!(value["request"]["path"], "/orders");
        assert_eq!(value["request"]["query"], "id=7");
        assert_eq!(value["request"]["remote_addr"], "10.0.0.1:3000");
        assert_eq!(value["request"]["body"], "abcd");
        assert_eq!(value["request"]["headers"][1], serde_json::json!(["x-trace", "a"]));
        assert_eq!(value["request"]["headers"][2], serde_json::json!(["x-trace", "b"]));
        assert!(payload.as_str().contains('\n'));
    }

    #[test]
    fn test_payload_headers_in_arrival_order() {
        let raw = b"GET / HTTP/1.1\r\nA: 1\r\nB: 2\r\nA: 3\r\n\r\n";
        let request = InboundRequest::parse(raw, "10.0.0.1:3000".parse().unwrap()).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(EchoPayload::render(&request).as_str()).unwrap();

        assert_eq!(
            value["request"]["headers"],
            serde_json::json!([["a", "1"], ["b", "2"], ["a", "3"]])
        );
    }

    #[test]
    fn test_status_follows_coin() {
        let forbidden = FixedCoin(true);
        let ok = FixedCoin(false);
        assert_eq!(
            PlainEchoResponder::new(&forbidden).response(&request()).status,
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            PlainEchoResponder::new(&ok).response(&request()).status,
            StatusCode::OK
        );
    }

    #[test]
    fn test_body_is_identical_for_both_statuses() {
        let a = PlainEchoResponder::new(&FixedCoin(true)).response(&request());
        let b = PlainEchoResponder::new(&FixedCoin(false)).response(&request());
        assert_eq!(a.body, b.body);
        assert_eq!(a.headers.get("content-type").unwrap(), "application/json");
    }

    #[test]
    fn test_forbidden_fraction_over_many_trials() {
        let coin = SeededCoin::new(2024);
        let responder = PlainEchoResponder::new(&coin);
        let request = request();
        let trials = 2_000;
        let forbidden = (0..trials)
            .filter(|_| responder.response(&request).status == StatusCode::FORBIDDEN)
            .count() as i64;
        // 5 standard deviations of binomial(2000, 0.5) is about 112.
        assert!((forbidden - 1_000).abs() <= 112, "forbidden = {forbidden}");
    }

    #[tokio::test]
    async fn test_respond_writes_json_response() {
        let observer = RecordingObserver::default();
        let mut out = Vec::new();
        PlainEchoResponder::new(&FixedCoin(false))
            .respond(&mut out, &request(), &observer)
            .await
            .unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("content-type: application/json\r\n"));
        assert!(text.contains(EchoPayload::render(&request()).as_str()));
        assert_eq!(observer.events(), vec![Observed::Plain(StatusCode::OK)]);
    }
}
