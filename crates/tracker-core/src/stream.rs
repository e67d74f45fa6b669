//! Agent stream-JSON protocol.
//!
//! The external agent emits one JSON object per stdout line. The orchestrator
//! is a tolerant reader: it appends every raw line to the log, transcribes
//! the text content of `assistant` messages, and finalizes on the terminal
//! `result` line. Tool use, tool results, and system messages are logged but
//! not interpreted; malformed lines are ignored.

use serde_json::Value;

/// One parsed line of agent output.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamLine {
    /// `{"type":"system","subtype":"init",...}` -- carries the session id.
    SystemInit { session_id: String },
    /// `{"type":"assistant","message":{"content":[...]}}` -- the transcript
    /// source. `text` holds the concatenated text blocks of this message.
    Assistant { text: String },
    /// Terminal `{"type":"result",...}` line.
    Result {
        session_id: String,
        is_error: bool,
    },
    /// Recognized JSON with a `type` we do not transcribe.
    Other { msg_type: String },
    /// Not JSON, or JSON without a string `type` field.
    Malformed,
}

/// Parse a single stdout line from the agent.
pub fn parse_line(line: &str) -> StreamLine {
    let Ok(raw) = serde_json::from_str::<Value>(line) else {
        return StreamLine::Malformed;
    };
    let Some(msg_type) = raw.get("type").and_then(Value::as_str) else {
        return StreamLine::Malformed;
    };

    match msg_type {
        "system" => parse_system(&raw),
        "assistant" => StreamLine::Assistant {
            text: assistant_text(&raw),
        },
        "result" => StreamLine::Result {
            session_id: raw
                .get("session_id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            is_error: raw.get("subtype").and_then(Value::as_str) == Some("error"),
        },
        other => StreamLine::Other {
            msg_type: other.to_string(),
        },
    }
}

fn parse_system(raw: &Value) -> StreamLine {
    if raw.get("subtype").and_then(Value::as_str) == Some("init") {
        StreamLine::SystemInit {
            session_id: raw
                .get("session_id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        }
    } else {
        StreamLine::Other {
            msg_type: "system".to_string(),
        }
    }
}

/// Concatenate the `.text` fields of content items of type `text`.
fn assistant_text(raw: &Value) -> String {
    let content = raw
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_array);

    let Some(blocks) = content else {
        return String::new();
    };

    let mut out = String::new();
    for block in blocks {
        if block.get("type").and_then(Value::as_str) == Some("text") {
            if let Some(text) = block.get("text").and_then(Value::as_str) {
                out.push_str(text);
            }
        }
    }
    out
}

/// Incrementally assembles the plain-text transcript of a run.
#[derive(Debug, Default)]
pub struct TranscriptBuilder {
    parts: Vec<String>,
    session_id: Option<String>,
    finished: bool,
}

impl TranscriptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one stdout line; returns the parsed shape for callers that need
    /// to react (e.g. stop tailing on `Result`).
    pub fn feed(&mut self, line: &str) -> StreamLine {
        let parsed = parse_line(line);
        match &parsed {
            StreamLine::SystemInit { session_id } if !session_id.is_empty() => {
                self.session_id.get_or_insert_with(|| session_id.clone());
            }
            StreamLine::Assistant { text } if !text.is_empty() => {
                self.parts.push(text.clone());
            }
            StreamLine::Result { session_id, .. } => {
                if !session_id.is_empty() {
                    self.session_id.get_or_insert_with(|| session_id.clone());
                }
                self.finished = true;
            }
            _ => {}
        }
        parsed
    }

    /// True once the terminal result line has been seen.
    pub const fn finished(&self) -> bool {
        self.finished
    }

    /// Session id reported by the agent, if any line carried one.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// The assembled transcript: assistant messages joined by blank lines.
    pub fn transcript(&self) -> String {
        self.parts.join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_system_init() {
        let line = r#"{"type":"system","subtype":"init","session_id":"abc","model":"m","cwd":"/"}"#;
        assert_eq!(
            parse_line(line),
            StreamLine::SystemInit {
                session_id: "abc".to_string()
            }
        );
    }

    #[test]
    fn assistant_text_concatenates_text_blocks_only() {
        let line = r#"{"type":"assistant","message":{"content":[
            {"type":"text","text":"Hello "},
            {"type":"tool_use","id":"t1","name":"Bash","input":{}},
            {"type":"text","text":"world"}
        ]}}"#;
        assert_eq!(
            parse_line(line),
            StreamLine::Assistant {
                text: "Hello world".to_string()
            }
        );
    }

    #[test]
    fn result_line_finalizes() {
        let line = r#"{"type":"result","subtype":"success","session_id":"s1","duration_ms":10}"#;
        assert_eq!(
            parse_line(line),
            StreamLine::Result {
                session_id: "s1".to_string(),
                is_error: false
            }
        );
    }

    #[test]
    fn error_result_flagged() {
        let line = r#"{"type":"result","subtype":"error","session_id":"s1"}"#;
        assert!(matches!(
            parse_line(line),
            StreamLine::Result { is_error: true, .. }
        ));
    }

    #[test]
    fn tool_shapes_are_logged_not_transcribed() {
        let line = r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"t1","content":"ok"}]}}"#;
        assert_eq!(
            parse_line(line),
            StreamLine::Other {
                msg_type: "user".to_string()
            }
        );
    }

    #[test]
    fn malformed_lines_are_ignored_defensively() {
        assert_eq!(parse_line("not json at all"), StreamLine::Malformed);
        assert_eq!(parse_line(r#"{"no_type":true}"#), StreamLine::Malformed);
        assert_eq!(parse_line(""), StreamLine::Malformed);
    }

    #[test]
    fn builder_assembles_transcript_in_order() {
        let mut builder = TranscriptBuilder::new();
        builder.feed(r#"{"type":"system","subtype":"init","session_id":"s9"}"#);
        builder.feed(r#"{"type":"assistant","message":{"content":[{"type":"text","text":"first"}]}}"#);
        builder.feed("garbage line");
        builder.feed(r#"{"type":"assistant","message":{"content":[{"type":"text","text":"second"}]}}"#);
        builder.feed(r#"{"type":"result","subtype":"success","session_id":"s9"}"#);

        assert!(builder.finished());
        assert_eq!(builder.session_id(), Some("s9"));
        assert_eq!(builder.transcript(), "first\n\nsecond");
    }

    #[test]
    fn builder_keeps_first_session_id() {
        let mut builder = TranscriptBuilder::new();
        builder.feed(r#"{"type":"system","subtype":"init","session_id":"first"}"#);
        builder.feed(r#"{"type":"result","subtype":"success","session_id":"other"}"#);
        assert_eq!(builder.session_id(), Some("first"));
    }
}
