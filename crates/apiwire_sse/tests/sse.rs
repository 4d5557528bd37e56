use apiwire::{CodecError, JsonShape, UnionRegistry, Variant};
use apiwire_sse::{SseDecoder, SseError};
use assert_matches::assert_matches;
use serde::{Deserialize, Deserializer};

#[derive(Debug, PartialEq, Deserialize)]
struct MessageUpdated {
    properties: MessageProperties,
}

#[derive(Debug, PartialEq, Deserialize)]
struct MessageProperties {
    id: String,
    delta: String,
}

#[derive(Debug, PartialEq, Deserialize)]
struct SessionIdle {
    properties: SessionProperties,
}

#[derive(Debug, PartialEq, Deserialize)]
struct SessionProperties {
    #[serde(rename = "sessionID")]
    session_id: String,
}

#[derive(Debug, PartialEq, Deserialize)]
struct UnknownEvent {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, PartialEq)]
enum Event {
    MessageUpdated(MessageUpdated),
    SessionIdle(SessionIdle),
    Unknown(UnknownEvent),
}

impl From<MessageUpdated> for Event {
    fn from(event: MessageUpdated) -> Self {
        Self::MessageUpdated(event)
    }
}

impl From<SessionIdle> for Event {
    fn from(event: SessionIdle) -> Self {
        Self::SessionIdle(event)
    }
}

impl From<UnknownEvent> for Event {
    fn from(event: UnknownEvent) -> Self {
        Self::Unknown(event)
    }
}

impl<'de> Deserialize<'de> for Event {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        apiwire::union::deserialize(deserializer)
    }
}

fn register_events() {
    UnionRegistry::global()
        .register::<Event>(
            Some("type"),
            vec![
                Variant::tagged::<MessageUpdated>(JsonShape::Object, "message.updated"),
                Variant::tagged::<SessionIdle>(JsonShape::Object, "session.idle"),
                Variant::fallback::<UnknownEvent>(JsonShape::Object),
            ],
        )
        .expect("register events");
}

#[test]
fn sse_frames_resolve_registered_event_variants() {
    register_events();
    let payload = concat!(
        "data: {\"type\":\"message.updated\",\"properties\":{\"id\":\"msg_1\",\"delta\":\"hel\"}}\n\n",
        "data: [DONE]\n\n",
        "data: {\"type\":\"session.idle\",\"properties\":{\"sessionID\":\"ses_1\"}}\n\n"
    );

    let events: Vec<Event> = SseDecoder::<Event>::parse_frames(payload)
        .into_iter()
        .map(|event| event.expect("decode"))
        .collect();
    assert_eq!(events.len(), 2);

    if let Event::MessageUpdated(updated) = &events[0] {
        assert_eq!(updated.properties.id, "msg_1");
        assert_eq!(updated.properties.delta, "hel");
    } else {
        panic!("first event should be message.updated");
    }
    assert!(matches!(events[1], Event::SessionIdle(_)));
}

#[test]
fn unknown_event_types_use_the_fallback_variant() {
    register_events();
    let events = SseDecoder::<Event>::parse_frames("data: {\"type\":\"server.heartbeat\"}\n\n");
    assert_eq!(events.len(), 1);
    assert_matches!(
        &events[0],
        Ok(Event::Unknown(UnknownEvent { kind })) if kind == "server.heartbeat"
    );
}

#[test]
fn malformed_payload_yields_an_error_in_its_slot() {
    register_events();
    let payload = concat!(
        "data: {broken-json\n\n",
        "data: {\"type\":\"session.idle\",\"properties\":{\"sessionID\":\"ses_2\"}}\n\n"
    );

    let events = SseDecoder::<Event>::parse_frames(payload);
    assert_eq!(events.len(), 2);
    assert_matches!(
        &events[0],
        Err(SseError::Decode {
            index: 0,
            source: CodecError::Malformed { .. }
        })
    );
    assert_matches!(&events[1], Ok(Event::SessionIdle(_)));
}

#[test]
fn variant_failures_keep_the_codec_error() {
    register_events();
    let events = SseDecoder::<Event>::parse_frames(
        "data: {\"type\":\"message.updated\",\"properties\":{}}\n\n",
    );
    let error = events
        .into_iter()
        .next()
        .expect("one event")
        .expect_err("missing properties");
    assert_matches!(error.codec_error(), Some(CodecError::Malformed { .. }));
}

#[test]
fn split_frames_decode_incrementally() {
    register_events();
    let mut decoder = SseDecoder::<Event>::for_content_type("text/event-stream; charset=utf-8")
        .expect("event stream");
    assert!(decoder
        .feed(b"data: {\"type\":\"session.idle\",\"properties\":")
        .is_empty());
    assert!(!decoder.is_empty_buffer());

    let mut events = decoder.feed(b"{\"sessionID\":\"ses_3\"}}\r\n\r\n");
    assert_eq!(events.len(), 1);
    assert_matches!(events.pop(), Some(Ok(Event::SessionIdle(_))));
    assert!(decoder.is_empty_buffer());
}

#[test]
fn comment_and_empty_data_frames_are_skipped() {
    register_events();
    let payload = concat!(
        ": keep-alive\n\n",
        "event: ping\ndata:\n\n",
        "id: 4\ndata: {\"type\":\"session.idle\",\"properties\":{\"sessionID\":\"ses_4\"}}\n\n"
    );
    let events = SseDecoder::<Event>::parse_frames(payload);
    assert_eq!(events.len(), 1);
    assert_matches!(&events[0], Ok(Event::SessionIdle(_)));
}

#[test]
fn other_content_types_are_rejected() {
    assert_matches!(
        SseDecoder::<Event>::for_content_type("application/json"),
        Err(SseError::UnsupportedContentType(ref content_type)) if content_type == "application/json"
    );
}
