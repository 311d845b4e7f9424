//! Property-based tests for stream framing.
//!
//! The event sequence must not depend on where the transport happens to cut
//! the byte stream: mid-line, mid-prefix or in the middle of a multi-byte
//! character.

use proptest::prelude::*;

use quill_llm::{FrameParser, StreamEvent};

fn wire(fragments: &[String]) -> Vec<u8> {
    let mut out = String::new();
    for text in fragments {
        let payload = serde_json::json!({ "content": text });
        out.push_str(&format!("data: {payload}\n"));
    }
    out.push_str("data: {\"done\": true}\n");
    out.into_bytes()
}

fn run(bytes: &[u8], cuts: &[usize]) -> Vec<StreamEvent> {
    let mut points: Vec<usize> = cuts.iter().map(|c| c % (bytes.len() + 1)).collect();
    points.sort_unstable();
    points.dedup();

    let mut parser = FrameParser::new();
    let mut events = Vec::new();
    let mut last = 0;
    for point in points.into_iter().chain(std::iter::once(bytes.len())) {
        events.extend(parser.push(&bytes[last..point]));
        last = point;
    }
    events.extend(parser.finish());
    events
}

proptest! {
    #[test]
    fn framing_is_independent_of_chunk_boundaries(
        fragments in prop::collection::vec(any::<String>(), 0..8),
        cuts in prop::collection::vec(any::<usize>(), 0..16),
    ) {
        let bytes = wire(&fragments);
        let whole = run(&bytes, &[]);
        let split = run(&bytes, &cuts);
        prop_assert_eq!(&whole, &split);

        let expected: Vec<StreamEvent> = fragments
            .iter()
            .filter(|t| !t.is_empty())
            .cloned()
            .map(StreamEvent::Fragment)
            .chain(std::iter::once(StreamEvent::Done))
            .collect();
        prop_assert_eq!(split, expected);
    }

    #[test]
    fn exactly_one_terminal_event(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let mut parser = FrameParser::new();
        let mut events = parser.push(&bytes);
        events.extend(parser.finish());
        let terminals = events.iter().filter(|e| e.is_terminal()).count();
        prop_assert_eq!(terminals, 1);
        prop_assert!(events.last().is_some_and(StreamEvent::is_terminal));
    }
}
