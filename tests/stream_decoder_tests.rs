use parlance::api::SseParser;
use parlance::decoder::{ContentEvent, StreamDecoder};
use parlance::pricing::PricingTable;
use parlance::types::ContentBlock;
use tokio::sync::mpsc;

fn drain(mut rx: mpsc::UnboundedReceiver<ContentEvent>) -> Vec<ContentEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[test]
fn test_fragmented_frames_reassemble_into_text() {
    let pricing = PricingTable::default();
    let (tx, rx) = mpsc::unbounded_channel();
    let mut parser = SseParser::new();
    let mut decoder = StreamDecoder::new("claude-sonnet-4-5", &pricing, Some(&tx));

    let chunks: [&[u8]; 4] = [
        b"data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\ndata: {\"type\":\"content",
        b"_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hello \"}}\n\n",
        b"data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"world\"}}\n\ndata: {\"type\":\"content_block_stop\",\"index\":0}\n\n",
        b"data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"output_tokens\":3}}\n\ndata: {\"type\":\"message_stop\"}\n\n",
    ];
    for chunk in chunks {
        for event in parser.push(chunk) {
            decoder.handle(event);
        }
    }

    let outcome = decoder.finish();
    assert!(outcome.completed);
    assert_eq!(outcome.text, "Hello world");
    assert_eq!(outcome.stop_reason.as_deref(), Some("end_turn"));

    drop(tx);
    let events = drain(rx);
    let streamed: String = events
        .iter()
        .filter_map(|event| match event {
            ContentEvent::TextDelta(text) => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(streamed, outcome.text);
}

#[test]
fn test_thinking_deltas_stay_inside_begin_end_brackets() {
    let pricing = PricingTable::default();
    let (tx, rx) = mpsc::unbounded_channel();
    let mut parser = SseParser::new();
    let mut decoder = StreamDecoder::new("claude-sonnet-4-5", &pricing, Some(&tx));

    let raw = concat!(
        "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"thinking\",\"thinking\":\"\"}}\n\n",
        "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"thinking_delta\",\"thinking\":\"step one\"}}\n\n",
        "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"signature_delta\",\"signature\":\"sig\"}}\n\n",
        "data: {\"type\":\"content_block_stop\",\"index\":0}\n\n",
        "data: {\"type\":\"content_block_start\",\"index\":1,\"content_block\":{\"type\":\"text\",\"text\":\"answer\"}}\n\n",
        "data: {\"type\":\"content_block_stop\",\"index\":1}\n\n",
        "data: {\"type\":\"message_stop\"}\n\n",
    );
    for event in parser.push(raw.as_bytes()) {
        decoder.handle(event);
    }
    let outcome = decoder.finish();

    drop(tx);
    let events = drain(rx);
    let mut open = false;
    for event in &events {
        match event {
            ContentEvent::ThinkingBegin => open = true,
            ContentEvent::ThinkingEnd => open = false,
            ContentEvent::ThinkingDelta(_) => assert!(open, "thinking delta outside brackets"),
            _ => {}
        }
    }
    assert!(!open, "thinking section left open");

    assert_eq!(
        outcome.blocks,
        vec![
            ContentBlock::Thinking {
                thinking: "step one".to_string(),
                signature: "sig".to_string(),
            },
            ContentBlock::Text {
                text: "answer".to_string()
            },
        ]
    );
}

#[test]
fn test_unsigned_thinking_never_reaches_replay_history() {
    let pricing = PricingTable::default();
    let mut parser = SseParser::new();
    let mut decoder = StreamDecoder::new("claude-sonnet-4-5", &pricing, None);

    let raw = concat!(
        "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"thinking\",\"thinking\":\"\"}}\n\n",
        "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"thinking_delta\",\"thinking\":\"draft\"}}\n\n",
        "data: {\"type\":\"content_block_stop\",\"index\":0}\n\n",
        "data: {\"type\":\"content_block_start\",\"index\":1,\"content_block\":{\"type\":\"text\",\"text\":\"final\"}}\n\n",
        "data: {\"type\":\"content_block_stop\",\"index\":1}\n\n",
        "data: {\"type\":\"message_stop\"}\n\n",
    );
    for event in parser.push(raw.as_bytes()) {
        decoder.handle(event);
    }
    let outcome = decoder.finish();

    assert_eq!(
        outcome.blocks,
        vec![ContentBlock::Text {
            text: "final".to_string()
        }]
    );
}

#[test]
fn test_done_sentinel_stops_the_parser() {
    let mut parser = SseParser::new();
    let events = parser.push(
        b"data: {\"type\":\"message_stop\"}\n\ndata: [DONE]\n\ndata: {\"type\":\"ping\"}\n\n",
    );
    assert_eq!(events.len(), 1);
    assert!(parser.is_done());
}
