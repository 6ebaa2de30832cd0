//! Typed stream events and the dispatcher that produces them

use super::decoder::Frame;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Legal source cited by an answer
///
/// `law`, `article` and `url` are the fields the UI knows how to show.
/// Anything else the backend attaches is kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Source {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub law: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub article: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Source {
    /// Build from one element of a `sources` array. Non-objects are dropped;
    /// known fields that are not strings stay in `extra` untouched.
    fn from_value(value: Value) -> Option<Self> {
        let Value::Object(mut extra) = value else {
            return None;
        };
        let law = take_string(&mut extra, "law");
        let article = take_string(&mut extra, "article");
        let url = take_string(&mut extra, "url");
        Some(Self {
            law,
            article,
            url,
            extra,
        })
    }

    /// One-line rendering for terminal output
    pub fn label(&self) -> String {
        [&self.law, &self.article, &self.url]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn take_string(map: &mut Map<String, Value>, key: &str) -> Option<String> {
    if !matches!(map.get(key), Some(Value::String(_))) {
        return None;
    }
    match map.remove(key) {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}

/// Event decoded from one frame
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Preparation status text shown before the answer starts
    Prep(String),
    Sources(Vec<Source>),
    /// Non-empty piece of answer text
    Chunk(String),
    /// Server-side completion, with whatever metadata object it sent
    Done(Option<Map<String, Value>>),
    Error(String),
}

impl StreamEvent {
    /// Map a frame to an event. Unknown event types yield `None`.
    pub fn from_frame(frame: &Frame) -> Option<Self> {
        match frame.event_type.as_str() {
            "prep" => Some(StreamEvent::Prep(frame.data.clone())),
            "sources" => Some(StreamEvent::Sources(parse_sources(&frame.data))),
            "chunk" => parse_chunk_delta(&frame.data).map(StreamEvent::Chunk),
            "done" => Some(StreamEvent::Done(parse_done_meta(&frame.data))),
            "error" => Some(StreamEvent::Error(if frame.data.is_empty() {
                "error".to_string()
            } else {
                frame.data.clone()
            })),
            other => {
                tracing::trace!(event_type = %other, "Ignoring unknown stream event");
                None
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// `delta.content` of a chunk payload; malformed payloads count as empty
fn parse_chunk_delta(data: &str) -> Option<String> {
    match serde_json::from_str::<ChunkPayload>(data) {
        Ok(payload) => payload
            .delta
            .and_then(|d| d.content)
            .filter(|text| !text.is_empty()),
        Err(e) => {
            tracing::debug!(error = %e, "Dropping malformed chunk payload");
            None
        }
    }
}

fn parse_sources(data: &str) -> Vec<Source> {
    match serde_json::from_str::<Value>(data) {
        Ok(Value::Array(items)) => items.into_iter().filter_map(Source::from_value).collect(),
        Ok(_) => Vec::new(),
        Err(e) => {
            tracing::debug!(error = %e, "Sources payload is not JSON");
            Vec::new()
        }
    }
}

fn parse_done_meta(data: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(data) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Why a session reached its terminal state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    /// A `done` frame arrived
    Stop,
    /// The body ended before any `done` frame
    StreamEnded,
    /// Transport failure or error while reading the body
    Exception,
}

impl FinishReason {
    pub fn as_str(self) -> &'static str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::StreamEnded => "stream-ended",
            FinishReason::Exception => "exception",
        }
    }
}

/// Terminal metadata passed to `on_done`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DoneMeta {
    pub finish_reason: FinishReason,
    /// Metadata object sent with the `done` frame, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<Map<String, Value>>,
}

impl DoneMeta {
    pub fn stop(server: Option<Map<String, Value>>) -> Self {
        Self {
            finish_reason: FinishReason::Stop,
            server,
        }
    }

    pub fn stream_ended() -> Self {
        Self {
            finish_reason: FinishReason::StreamEnded,
            server: None,
        }
    }

    pub fn exception() -> Self {
        Self {
            finish_reason: FinishReason::Exception,
            server: None,
        }
    }

    /// Anything other than a server `done` is incomplete output
    pub fn is_partial(&self) -> bool {
        self.finish_reason != FinishReason::Stop
    }
}

/// Callbacks for one stream session. Every method is optional.
pub trait StreamHandler: Send + 'static {
    fn on_prep(&mut self, _text: String) {}

    fn on_sources(&mut self, _sources: Vec<Source>) {}

    fn on_chunk(&mut self, _delta: String) {}

    fn on_done(&mut self, _meta: DoneMeta) {}

    fn on_error(&mut self, _message: String) {}
}

/// Invoke the handler matching an event.
///
/// The session controller intercepts `Done` itself so that finalization
/// happens once per session; this function has no such guard.
pub fn dispatch<H: StreamHandler + ?Sized>(handler: &mut H, event: StreamEvent) {
    match event {
        StreamEvent::Prep(text) => handler.on_prep(text),
        StreamEvent::Sources(sources) => handler.on_sources(sources),
        StreamEvent::Chunk(delta) => handler.on_chunk(delta),
        StreamEvent::Error(message) => handler.on_error(message),
        StreamEvent::Done(meta) => handler.on_done(DoneMeta::stop(meta)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frame(event_type: &str, data: &str) -> Frame {
        Frame {
            event_type: event_type.to_string(),
            data: data.to_string(),
        }
    }

    #[test]
    fn test_chunk_extracts_delta_content() {
        let event = StreamEvent::from_frame(&frame("chunk", r#"{"delta":{"content":"Hi"}}"#));
        assert_eq!(event, Some(StreamEvent::Chunk("Hi".to_string())));
    }

    #[test]
    fn test_chunk_without_content_is_dropped() {
        assert_eq!(StreamEvent::from_frame(&frame("chunk", r#"{"delta":{}}"#)), None);
        assert_eq!(StreamEvent::from_frame(&frame("chunk", r#"{"delta":{"content":""}}"#)), None);
        assert_eq!(StreamEvent::from_frame(&frame("chunk", "{}")), None);
    }

    #[test]
    fn test_malformed_chunk_is_swallowed() {
        assert_eq!(StreamEvent::from_frame(&frame("chunk", "{not json")), None);
        assert_eq!(StreamEvent::from_frame(&frame("chunk", r#"{"delta":"str"}"#)), None);
    }

    #[test]
    fn test_prep_is_verbatim() {
        let event = StreamEvent::from_frame(&frame("prep", "  searching {laws}  "));
        assert_eq!(event, Some(StreamEvent::Prep("  searching {laws}  ".to_string())));
    }

    #[test]
    fn test_sources_not_json_is_empty_list() {
        let event = StreamEvent::from_frame(&frame("sources", "not-json"));
        assert_eq!(event, Some(StreamEvent::Sources(vec![])));
    }

    #[test]
    fn test_sources_non_list_is_empty_list() {
        let event = StreamEvent::from_frame(&frame("sources", r#"{"law":"x"}"#));
        assert_eq!(event, Some(StreamEvent::Sources(vec![])));
    }

    #[test]
    fn test_sources_keep_known_and_extra_fields() {
        let data = json!([
            {"law": "Civil Act", "article": "750", "url": "https://law.example/750", "score": 0.9},
            {"law": "Labor Act", "article": 3},
            "not an object"
        ])
        .to_string();
        let Some(StreamEvent::Sources(sources)) = StreamEvent::from_frame(&frame("sources", &data))
        else {
            panic!("expected sources");
        };

        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].law.as_deref(), Some("Civil Act"));
        assert_eq!(sources[0].article.as_deref(), Some("750"));
        assert_eq!(sources[0].extra.get("score"), Some(&json!(0.9)));
        assert_eq!(sources[0].label(), "Civil Act 750 https://law.example/750");
        // Numeric article is not a string field, kept verbatim in extra
        assert_eq!(sources[1].article, None);
        assert_eq!(sources[1].extra.get("article"), Some(&json!(3)));
    }

    #[test]
    fn test_done_meta_is_best_effort() {
        assert_eq!(
            StreamEvent::from_frame(&frame("done", "")),
            Some(StreamEvent::Done(None))
        );
        assert_eq!(
            StreamEvent::from_frame(&frame("done", "nope")),
            Some(StreamEvent::Done(None))
        );
        let Some(StreamEvent::Done(Some(meta))) =
            StreamEvent::from_frame(&frame("done", r#"{"usage":{"total":3}}"#))
        else {
            panic!("expected done with meta");
        };
        assert!(meta.contains_key("usage"));
    }

    #[test]
    fn test_error_falls_back_to_literal() {
        assert_eq!(
            StreamEvent::from_frame(&frame("error", "")),
            Some(StreamEvent::Error("error".to_string()))
        );
        assert_eq!(
            StreamEvent::from_frame(&frame("error", "upstream timeout")),
            Some(StreamEvent::Error("upstream timeout".to_string()))
        );
    }

    #[test]
    fn test_unknown_event_ignored() {
        assert_eq!(StreamEvent::from_frame(&frame("message", "hello")), None);
        assert_eq!(StreamEvent::from_frame(&frame("usage", "{}")), None);
    }

    #[test]
    fn test_finish_reason_wire_names() {
        assert_eq!(serde_json::to_value(FinishReason::StreamEnded).unwrap(), json!("stream-ended"));
        assert_eq!(FinishReason::Exception.as_str(), "exception");
        assert!(!DoneMeta::stop(None).is_partial());
        assert!(DoneMeta::stream_ended().is_partial());
        assert!(DoneMeta::exception().is_partial());
    }

    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
    }

    impl StreamHandler for Recorder {
        fn on_chunk(&mut self, delta: String) {
            self.calls.push(format!("chunk:{delta}"));
        }

        fn on_error(&mut self, message: String) {
            self.calls.push(format!("error:{message}"));
        }
    }

    #[test]
    fn test_dispatch_uses_default_noops() {
        let mut recorder = Recorder::default();
        dispatch(&mut recorder, StreamEvent::Prep("p".to_string()));
        dispatch(&mut recorder, StreamEvent::Chunk("a".to_string()));
        dispatch(&mut recorder, StreamEvent::Sources(vec![]));
        dispatch(&mut recorder, StreamEvent::Error("e".to_string()));
        assert_eq!(recorder.calls, vec!["chunk:a", "error:e"]);
    }
}
