//! Property-based tests for the ask stream

use super::testing::{Recorded, RecordingHandler, Script, ScriptedTransport};
use super::*;
use proptest::prelude::*;
use std::sync::Arc;

// ============================================================================
// Generators
// ============================================================================

/// Wire block for one frame; payload text includes multibyte characters
fn arb_block() -> impl Strategy<Value = String> {
    let text = "[a-z 법령é]{0,12}";
    prop_oneof![
        text.prop_map(|t| format!("event: prep\ndata: {t}\n\n")),
        text.prop_map(|t| {
            let payload = serde_json::json!({ "delta": { "content": t } });
            format!("event: chunk\ndata: {payload}\n\n")
        }),
        Just("event: sources\ndata: [{\"law\":\"Civil Act\",\"article\":\"750\"}]\n\n".to_string()),
        text.prop_map(|t| format!("event: error\ndata: {t}\n\n")),
        text.prop_map(|t| format!("event: usage\ndata: {t}\n\n")),
        Just("\n\n".to_string()),
        Just(": keep-alive\n\n".to_string()),
        Just("event: done\ndata: {}\n\n".to_string()),
    ]
}

fn arb_wire() -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(arb_block(), 0..12).prop_map(|blocks| blocks.concat().into_bytes())
}

/// Cut points anywhere in the byte string, including inside characters
fn split_at(bytes: &[u8], mut cuts: Vec<usize>) -> Vec<Vec<u8>> {
    cuts.iter_mut().for_each(|c| *c %= bytes.len() + 1);
    cuts.sort_unstable();
    cuts.dedup();

    let mut pieces = Vec::new();
    let mut start = 0;
    for cut in cuts {
        pieces.push(bytes[start..cut].to_vec());
        start = cut;
    }
    pieces.push(bytes[start..].to_vec());
    pieces
}

fn run_session(script: Script) -> Vec<Recorded> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    runtime.block_on(async {
        let transport = Arc::new(ScriptedTransport::new());
        transport.queue(script);
        let client = AskStreamClient::new(transport);
        let handler = RecordingHandler::new();
        let log = handler.log();
        client.open("conv-1", "q", handler).join().await;
        let calls = log.lock().unwrap().clone();
        calls
    })
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    // Frames do not depend on how the network chunks the body
    #[test]
    fn prop_chunking_does_not_change_frames(
        wire in arb_wire(),
        cuts in proptest::collection::vec(any::<usize>(), 0..16),
    ) {
        let whole: Vec<Frame> = FrameDecoder::new().push_bytes(&wire).collect();

        let mut decoder = FrameDecoder::new();
        let mut pieced = Vec::new();
        for piece in split_at(&wire, cuts) {
            pieced.extend(decoder.push_bytes(&piece));
        }

        prop_assert_eq!(whole, pieced);
        prop_assert_eq!(decoder.buffered_len(), 0);
    }

    // A session finalizes exactly once, and nothing follows the finalization
    #[test]
    fn prop_exactly_one_done(
        wire in arb_wire(),
        cuts in proptest::collection::vec(any::<usize>(), 0..8),
        read_error in any::<bool>(),
    ) {
        let mut script = split_at(&wire, cuts)
            .iter()
            .fold(Script::ok(), |s, piece| s.chunk_bytes(piece));
        if read_error {
            script = script.fail_with("reset");
        }

        let calls = run_session(script);
        let done_at: Vec<usize> = calls
            .iter()
            .enumerate()
            .filter(|(_, c)| matches!(c, Recorded::Done(_)))
            .map(|(i, _)| i)
            .collect();

        prop_assert_eq!(done_at.len(), 1);
        prop_assert_eq!(done_at[0], calls.len() - 1);
    }

    // The finish reason is `stop` exactly when the body contained a done frame
    #[test]
    fn prop_finish_reason_matches_wire(wire in arb_wire()) {
        let has_done = String::from_utf8_lossy(&wire).contains("event: done");
        let calls = run_session(Script::ok().chunk_bytes(&wire));
        let Some(Recorded::Done(meta)) = calls.last() else {
            panic!("session did not finalize");
        };
        prop_assert_eq!(meta.is_partial(), !has_done);
    }
}
