//! Byte pump behavior: partial accepts, output chunking, and
//! fragmentation invariance.
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::accepted;
use proptest::prelude::*;
use tether_engine::EngineTransport;

#[test]
fn input_retries_partial_accepts() {
    let peer = accepted("pump");
    peer.transport.script_accept_caps([3, 0]);

    peer.connection.input(b"hello world");
    // First push took 3 bytes, second took none; the rest is buffered.
    assert_eq!(peer.transport.pushed_bytes(), b"hel");

    // Any later input call flushes the buffer once capacity is back.
    peer.connection.input(&[]);
    assert_eq!(peer.transport.pushed_bytes(), b"hello world");
}

#[test]
fn input_is_ordered_across_calls() {
    let peer = accepted("pump");
    peer.connection.input(b"one ");
    peer.connection.input(b"two ");
    peer.connection.input(b"three");
    assert_eq!(peer.transport.pushed_bytes(), b"one two three");
}

#[test]
fn output_is_chunked_and_fully_drained() {
    let peer = accepted("pump");
    let payload: Vec<u8> = (0..25_600u32).map(|i| i as u8).collect();
    peer.transport.queue_output(&payload);

    peer.connection.process();

    assert_eq!(peer.sink.bytes(), payload);
    assert_eq!(peer.sink.write_sizes(), vec![10 * 1024, 10 * 1024, 5 * 1024]);
    assert_eq!(peer.transport.outbound_len(), 0);
}

#[test]
fn output_stops_at_end_of_stream() {
    let peer = accepted("pump");
    peer.transport.queue_output(b"tail");
    peer.transport.close_head();

    peer.connection.process();

    // Queued bytes still drain; after that the transport reports end and
    // the pass stops without error.
    assert_eq!(peer.sink.bytes(), b"tail");
    assert_eq!(peer.transport.outbound_len(), 0);
}

#[test]
fn output_without_a_sink_stays_pending() {
    let peer = accepted("pump");
    peer.connection.eof(None);

    peer.transport.queue_output(b"late frames");
    peer.connection.process();

    // Nothing to write into; the bytes wait on the transport instead of
    // being discarded.
    assert_eq!(peer.transport.outbound_len(), b"late frames".len());
    assert!(peer.sink.bytes().is_empty());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// However the inbound stream is fragmented, and however stingy the
    /// transport is about accepting, the transport ends up with exactly
    /// the original byte sequence.
    #[test]
    fn any_fragmentation_reassembles(
        payload in proptest::collection::vec(any::<u8>(), 0..256),
        cuts in proptest::collection::vec(1usize..48, 0..6),
        caps in proptest::collection::vec(0usize..24, 0..6),
    ) {
        let peer = accepted("frag");
        peer.transport.script_accept_caps(caps.iter().copied());

        let mut rest: &[u8] = &payload;
        for cut in &cuts {
            let take = (*cut).min(rest.len());
            let (head, tail) = rest.split_at(take);
            peer.connection.input(head);
            rest = tail;
        }
        peer.connection.input(rest);
        // Flush through any remaining scripted accept limits.
        for _ in 0..caps.len() + 1 {
            peer.connection.input(&[]);
        }

        prop_assert_eq!(peer.transport.pushed_bytes(), payload);
    }
}
