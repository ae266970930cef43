//! Poe adapter behind a `Relay`, against a mocked bot endpoint.

use std::sync::Arc;

use bot_relay::vendors::poe::{self, PoeAdapter, PoeConfig};
use bot_relay::{Attachment, InboundRequest, Relay, RelayError, Status};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const API_KEY: &str = "test-poe-key";

fn relay_for(server: &MockServer) -> Relay {
    let adapter = PoeAdapter::new(PoeConfig::new(API_KEY).base_url(server.uri()))
        .expect("adapter");
    Relay::builder()
        .register_upstream(Arc::new(adapter))
        .build()
        .expect("relay")
}

fn sse(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/event-stream")
}

#[tokio::test]
async fn relays_typed_bot_events_as_cumulative_progress() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bot/Helper-Bot"))
        .and(header("Authorization", format!("Bearer {API_KEY}")))
        .and(header("Accept", "text/event-stream"))
        .and(body_partial_json(serde_json::json!({
            "version": "1.0",
            "type": "query",
            "user_id": "",
        })))
        .respond_with(sse(concat!(
            "event: meta\n",
            "data: {\"content_type\":\"text/markdown\",\"attachments\":[{\"url\":\"https://x/a.png\",\"mimeType\":\"image/png\"}]}\n\n",
            ": ping\n\n",
            "event: text\n",
            "data: {\"text\":\"Hel\"}\n\n",
            "event: text\n",
            "data: {\"text\":\"lo\"}\n\n",
            "event: done\n",
            "data: {}\n\n",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let exchange = relay_for(&server)
        .open(&poe::upstream_id(), InboundRequest::new("Helper-Bot", "do X"))
        .await
        .expect("exchange opens");
    let message_id = exchange.message_id().to_string();
    assert!(message_id.starts_with("msg-"));
    assert!(exchange.conversation_id().starts_with("conv-"));

    let events = exchange.collect_events().await;
    let summary: Vec<_> = events
        .iter()
        .map(|e| (e.status, e.content.as_str()))
        .collect();
    assert_eq!(
        summary,
        [
            (Status::Incomplete, "Hel"),
            (Status::Incomplete, "Hello"),
            (Status::Complete, "Hello"),
        ]
    );
    let expected = vec![Attachment::new("https://x/a.png", "image/png")];
    assert!(events.iter().all(|e| e.attachments == expected));
    assert!(events.iter().all(|e| e.message_id == message_id));
    assert!(events.iter().all(|e| e.sender_id == "Helper-Bot"));
}

#[tokio::test]
async fn forwards_the_supplied_conversation_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bot/Helper-Bot"))
        .and(body_partial_json(serde_json::json!({
            "conversation_id": "conv-existing",
        })))
        .respond_with(sse("event: text\ndata: {\"text\":\"ok\"}\n\n"))
        .expect(1)
        .mount(&server)
        .await;

    let exchange = relay_for(&server)
        .open(
            &poe::upstream_id(),
            InboundRequest::new("Helper-Bot", "hi").conversation_id("conv-existing"),
        )
        .await
        .expect("exchange opens");
    assert_eq!(exchange.conversation_id(), "conv-existing");

    let events = exchange.collect_events().await;
    let last = events.last().expect("events");
    assert_eq!(last.status, Status::Complete);
    assert_eq!(last.content, "ok");
}

#[tokio::test]
async fn upstream_rejection_is_a_structured_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bot/Helper-Bot"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&server)
        .await;

    let err = relay_for(&server)
        .open(&poe::upstream_id(), InboundRequest::new("Helper-Bot", "hi"))
        .await
        .err()
        .expect("open fails");

    assert_eq!(err.http_status(), 401);
    match err {
        RelayError::Upstream(upstream) => {
            assert_eq!(upstream.message(), "Poe API 401: invalid api key");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn bot_error_event_ends_the_exchange() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bot/Helper-Bot"))
        .respond_with(sse(concat!(
            "event: text\n",
            "data: {\"text\":\"partial\"}\n\n",
            "event: error\n",
            "data: {\"message\":\"bot crashed\"}\n\n",
            "event: text\n",
            "data: {\"text\":\" ignored\"}\n\n",
        )))
        .mount(&server)
        .await;

    let events = relay_for(&server)
        .open(&poe::upstream_id(), InboundRequest::new("Helper-Bot", "hi"))
        .await
        .expect("exchange opens")
        .collect_events()
        .await;

    assert_eq!(events.len(), 2);
    let last = &events[1];
    assert_eq!(last.status, Status::Error);
    assert_eq!(last.content, "partial");
    assert_eq!(last.status_text.as_deref(), Some("bot crashed"));
}

#[tokio::test]
async fn missing_message_never_reaches_the_bot() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = relay_for(&server)
        .open(&poe::upstream_id(), InboundRequest::new("Helper-Bot", "  "))
        .await
        .err()
        .expect("input rejected");
    assert!(matches!(err, RelayError::Input(_)));
}
