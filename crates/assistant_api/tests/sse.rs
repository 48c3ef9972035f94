use assistant_api::{SseStreamParser, StreamEvent, TokenUsage};

#[test]
fn sse_parser_decodes_every_run_event() {
    let payload = concat!(
        "event: metadata\r\ndata: {\"run_id\":\"r1\"}\r\n\r\n",
        "event: data\r\ndata: [{\"id\":\"a1\",\"type\":\"ai\",\"content\":\"hi\"}]\r\n\r\n",
        "event: usage\r\ndata: {\"input_tokens\":2,\"output_tokens\":3}\r\n\r\n",
        "event: error\r\ndata: {\"status_code\":500,\"message\":\"boom\"}\r\n\r\n",
        "event: end\r\n\r\n"
    );

    let events = SseStreamParser::parse_frames(payload);
    assert_eq!(events.len(), 5);

    if let StreamEvent::Metadata(metadata) = &events[0] {
        assert_eq!(metadata.run_id, "r1");
    } else {
        panic!("first event should be metadata");
    }

    if let StreamEvent::Data(transcript) = &events[1] {
        assert_eq!(transcript.messages()[0].text(), "hi");
    } else {
        panic!("second event should be data");
    }

    assert_eq!(events[2], StreamEvent::Usage(TokenUsage::new(2, 3)));
    assert!(matches!(&events[3], StreamEvent::Error(Some(body)) if body.message.as_deref() == Some("boom")));
    assert_eq!(events[4], StreamEvent::Close);
}

#[test]
fn sse_parser_ignores_comments_unknown_and_malformed() {
    let payload = concat!(
        ": ping\n\n",
        "event: heartbeat\ndata: {}\n\n",
        "event: data\ndata: {broken-json\n\n",
        "event: metadata\ndata: {\"run_id\":\"r2\"}\n\n"
    );

    let events = SseStreamParser::parse_frames(payload);
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], StreamEvent::Metadata(metadata) if metadata.run_id == "r2"));
}

#[test]
fn sse_parser_handles_split_frames_incrementally() {
    let mut parser = SseStreamParser::default();
    assert!(parser.feed(b"event: metadata\r").is_empty());
    assert!(parser.feed(b"\ndata: {\"run_id\":").is_empty());
    let events = parser.feed(b"\"r3\"}\r\n\r\n");

    assert_eq!(events.len(), 1);
    assert!(parser.is_empty_buffer());
}

#[test]
fn bodiless_error_event_is_still_an_error() {
    let events = SseStreamParser::parse_frames("event: error\ndata:\n\n");
    assert_eq!(events, vec![StreamEvent::Error(None)]);
}

#[test]
fn wrapped_transcript_fragments_keep_extra_fields() {
    let events = SseStreamParser::parse_frames(
        "event: data\ndata: {\"messages\":[{\"id\":\"a1\",\"type\":\"ai\",\"content\":\"x\"}],\"step\":3}\n\n",
    );

    let StreamEvent::Data(transcript) = &events[0] else {
        panic!("expected data event");
    };
    let encoded = serde_json::to_value(transcript).expect("encode");
    assert_eq!(encoded["step"], 3);
    assert_eq!(encoded["messages"][0]["id"], "a1");
}
