use futures_util::StreamExt;
use memchr::memchr;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::api::{ChatRequest, StreamPayload};
use crate::utils::url::construct_api_url;

pub const CHAT_ENDPOINT: &str = "chat";

/// What the stream task reports back to the state owner, tagged with the
/// stream id it belongs to.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamMessage {
    Token(String),
    /// The backend put an `error` field in the stream.
    ServerError(String),
    /// Connect failure, non-2xx status, or a read error mid-body.
    Failed(String),
    /// The backend sent an explicit `done` payload.
    Done,
    /// The body ended without a `done` payload.
    End,
}

/// A single event decoded from one stream line.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    Token(String),
    Done,
    Error(String),
}

/// Splits an incoming byte stream into complete, trimmed, non-empty lines.
///
/// Bytes are held until a newline arrives, so multi-byte UTF-8 sequences that
/// straddle two reads decode correctly.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = memchr(b'\n', &self.buffer[start..]) {
            let end = start + offset;
            if let Some(line) = decode_line(&self.buffer[start..end]) {
                lines.push(line);
            }
            start = end + 1;
        }
        self.buffer.drain(..start);
        lines
    }

    /// Flush whatever is left once the body ends without a trailing newline.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        decode_line(&rest)
    }
}

fn decode_line(bytes: &[u8]) -> Option<String> {
    match std::str::from_utf8(bytes) {
        Ok(text) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Err(e) => {
            warn!("Skipping stream line with invalid UTF-8: {e}");
            None
        }
    }
}

fn extract_data_payload(line: &str) -> &str {
    line.strip_prefix("data:")
        .map(str::trim_start)
        .unwrap_or(line)
        .trim()
}

/// Decode one line into zero or more events. Malformed lines yield nothing.
pub fn parse_stream_line(line: &str) -> Vec<StreamEvent> {
    let payload = extract_data_payload(line);
    if payload.is_empty() {
        return Vec::new();
    }
    if payload == "[DONE]" {
        return vec![StreamEvent::Done];
    }

    match serde_json::from_str::<StreamPayload>(payload) {
        Ok(parsed) => payload_events(parsed),
        Err(e) => {
            debug!(error = %e, line = payload, "Skipping malformed stream line");
            Vec::new()
        }
    }
}

fn payload_events(payload: StreamPayload) -> Vec<StreamEvent> {
    if let Some(error) = payload.error {
        return vec![StreamEvent::Error(error)];
    }

    let mut events = Vec::with_capacity(2);
    if let Some(token) = payload.token {
        events.push(StreamEvent::Token(token));
    }
    if payload.done.unwrap_or(false) {
        events.push(StreamEvent::Done);
    }
    events
}

fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            ["error", "erro"].iter().find_map(|key| match value.get(key) {
                Some(serde_json::Value::String(s)) => Some(s.to_string()),
                Some(serde_json::Value::Object(map)) => map
                    .get("message")
                    .and_then(|message| message.as_str().map(str::to_owned)),
                _ => None,
            })
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        });

    summary.map(|text| {
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        collapsed.trim().to_string()
    })
}

pub fn format_api_error(error_text: &str) -> String {
    let trimmed = error_text.trim();

    if trimmed.is_empty() {
        return "API Error:\n```\n<empty>\n```".to_string();
    }

    if let Ok(json_value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if json_value.is_object() || json_value.is_array() {
            if let Ok(pretty_json) = serde_json::to_string_pretty(&json_value) {
                if let Some(summary) = extract_error_summary(&json_value) {
                    if !summary.is_empty() {
                        return format!("API Error: {}\n```json\n{}\n```", summary, pretty_json);
                    }
                }
                return format!("API Error:\n```json\n{}\n```", pretty_json);
            }
        }
    }

    if trimmed.starts_with('<') && trimmed.ends_with('>') {
        format!("API Error:\n```xml\n{}\n```", trimmed)
    } else {
        format!("API Error:\n```\n{}\n```", trimmed)
    }
}

fn format_http_error(status: reqwest::StatusCode, body: &str) -> String {
    if body.trim().is_empty() {
        format_api_error(&format!("HTTP {status}"))
    } else {
        format_api_error(body)
    }
}

pub struct StreamParams {
    pub client: reqwest::Client,
    pub base_url: String,
    pub request: ChatRequest,
    pub cancel_token: tokio_util::sync::CancellationToken,
    pub stream_id: u64,
}

pub type StreamSender = mpsc::UnboundedSender<(StreamMessage, u64)>;
pub type StreamReceiver = mpsc::UnboundedReceiver<(StreamMessage, u64)>;

#[derive(Clone)]
pub struct ChatStreamService {
    tx: StreamSender,
}

impl ChatStreamService {
    pub fn new() -> (Self, StreamReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn spawn_stream(&self, params: StreamParams) -> tokio::task::JoinHandle<()> {
        let tx = self.tx.clone();
        tokio::spawn(run_stream(params, tx))
    }

    #[cfg(test)]
    pub fn send_for_test(&self, message: StreamMessage, stream_id: u64) {
        let _ = self.tx.send((message, stream_id));
    }
}

/// Drive a single chat request to completion or cancellation. Exactly one of
/// `Done`, `End`, `ServerError` or `Failed` is sent unless the token fires
/// first, in which case nothing further is sent.
pub async fn run_stream(params: StreamParams, tx: StreamSender) {
    let StreamParams {
        client,
        base_url,
        request,
        cancel_token,
        stream_id,
    } = params;

    tokio::select! {
        _ = stream_response(&client, &base_url, &request, stream_id, &tx) => {}
        _ = cancel_token.cancelled() => {
            debug!(stream_id, "Chat stream cancelled");
        }
    }
}

async fn stream_response(
    client: &reqwest::Client,
    base_url: &str,
    request: &ChatRequest,
    stream_id: u64,
    tx: &StreamSender,
) {
    let chat_url = construct_api_url(base_url, CHAT_ENDPOINT);
    debug!(stream_id, url = %chat_url, has_file = request.file_content.is_some(), "Starting chat stream");

    let response = match client.post(&chat_url).json(request).send().await {
        Ok(response) => response,
        Err(e) => {
            warn!(stream_id, error = %e, "Chat request failed");
            let _ = tx.send((StreamMessage::Failed(format_api_error(&e.to_string())), stream_id));
            return;
        }
    };

    let status = response.status();
    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "<no body>".to_string());
        warn!(stream_id, %status, "Chat backend returned an error status");
        let _ = tx.send((
            StreamMessage::Failed(format_http_error(status, &error_text)),
            stream_id,
        ));
        return;
    }

    let mut stream = response.bytes_stream();
    let mut lines = LineBuffer::new();

    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) => {
                for line in lines.push(&bytes) {
                    if dispatch_line(&line, tx, stream_id) {
                        return;
                    }
                }
            }
            Err(e) => {
                warn!(stream_id, error = %e, "Chat stream read failed");
                let _ = tx.send((StreamMessage::Failed(format_api_error(&e.to_string())), stream_id));
                return;
            }
        }
    }

    if let Some(line) = lines.finish() {
        if dispatch_line(&line, tx, stream_id) {
            return;
        }
    }

    debug!(stream_id, "Chat stream ended without a done payload");
    let _ = tx.send((StreamMessage::End, stream_id));
}

/// Forward the events of one line. Returns true once the stream is finished.
fn dispatch_line(line: &str, tx: &StreamSender, stream_id: u64) -> bool {
    for event in parse_stream_line(line) {
        match event {
            StreamEvent::Token(token) => {
                let _ = tx.send((StreamMessage::Token(token), stream_id));
            }
            StreamEvent::Done => {
                let _ = tx.send((StreamMessage::Done, stream_id));
                return true;
            }
            StreamEvent::Error(message) => {
                let _ = tx.send((StreamMessage::ServerError(format_api_error(&message)), stream_id));
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::{spawn_mock_server, test_client, MockResponse};
    use tokio_util::sync::CancellationToken;

    fn collect_tokens(chunks: &[&[u8]]) -> (String, bool) {
        let mut buffer = LineBuffer::new();
        let mut text = String::new();
        let mut done = false;
        let mut lines: Vec<String> = Vec::new();
        for chunk in chunks {
            lines.extend(buffer.push(chunk));
        }
        lines.extend(buffer.finish());
        for line in lines {
            for event in parse_stream_line(&line) {
                match event {
                    StreamEvent::Token(token) => text.push_str(&token),
                    StreamEvent::Done => done = true,
                    StreamEvent::Error(_) => panic!("unexpected error event"),
                }
            }
        }
        (text, done)
    }

    #[test]
    fn parse_stream_line_handles_prefix_variants() {
        assert_eq!(
            parse_stream_line(r#"data: {"token":"Olá"}"#),
            vec![StreamEvent::Token("Olá".into())]
        );
        assert_eq!(
            parse_stream_line(r#"data:{"token":"mundo"}"#),
            vec![StreamEvent::Token("mundo".into())]
        );
        assert_eq!(
            parse_stream_line(r#"{"token":"bare"}"#),
            vec![StreamEvent::Token("bare".into())]
        );
        assert_eq!(parse_stream_line(r#"data: {"done":true}"#), vec![StreamEvent::Done]);
        assert_eq!(parse_stream_line("data: [DONE]"), vec![StreamEvent::Done]);
    }

    #[test]
    fn parse_stream_line_skips_malformed_and_blank_lines() {
        assert!(parse_stream_line("data: {\"token\":").is_empty());
        assert!(parse_stream_line("data: ").is_empty());
        assert!(parse_stream_line("event: ping").is_empty());
        assert!(parse_stream_line(r#"data: {"done":false}"#).is_empty());
    }

    #[test]
    fn error_field_wins_over_token() {
        assert_eq!(
            parse_stream_line(r#"data: {"token":"x","error":"model crashed"}"#),
            vec![StreamEvent::Error("model crashed".into())]
        );
    }

    #[test]
    fn token_and_done_in_one_payload_emit_both_in_order() {
        assert_eq!(
            parse_stream_line(r#"data: {"token":"fim","done":true}"#),
            vec![StreamEvent::Token("fim".into()), StreamEvent::Done]
        );
    }

    #[test]
    fn empty_token_is_a_no_op_in_the_concatenation() {
        let body = b"data: {\"token\":\"a\"}\ndata: {\"token\":\"\"}\ndata: {\"token\":\"b\"}\n";
        let (text, done) = collect_tokens(&[body]);
        assert_eq!(text, "ab");
        assert!(!done);
    }

    #[test]
    fn several_objects_in_one_chunk_are_processed_in_order() {
        let body = b"data: {\"token\":\"1\"}\n\ndata: {\"token\":\"2\"}\ndata: {\"token\":\"3\"}\ndata: {\"done\":true}\n";
        let (text, done) = collect_tokens(&[body]);
        assert_eq!(text, "123");
        assert!(done);
    }

    #[test]
    fn concatenation_is_independent_of_chunk_boundaries() {
        let tokens = ["Olá", ", ", "", "mundo ", "ção", "🦀", "!\n"];
        let mut body = String::new();
        for token in tokens {
            body.push_str("data: ");
            body.push_str(&serde_json::json!({ "token": token }).to_string());
            body.push('\n');
        }
        body.push_str("data: {\"done\":true}\n");
        let bytes = body.as_bytes();
        let expected: String = tokens.concat();

        for split in 0..=bytes.len() {
            let (head, tail) = bytes.split_at(split);
            let (text, done) = collect_tokens(&[head, tail]);
            assert_eq!(text, expected, "split at {split}");
            assert!(done);
        }

        for width in [1usize, 2, 3, 5, 7] {
            let chunks: Vec<&[u8]> = bytes.chunks(width).collect();
            let (text, _) = collect_tokens(&chunks);
            assert_eq!(text, expected, "chunk width {width}");
        }
    }

    #[test]
    fn multibyte_characters_split_across_reads_decode() {
        let line = "data: {\"token\":\"ação\"}\n".as_bytes();
        let cut = line
            .iter()
            .position(|b| *b >= 0x80)
            .expect("has multibyte")
            + 1;
        let mut buffer = LineBuffer::new();
        assert!(buffer.push(&line[..cut]).is_empty());
        let lines = buffer.push(&line[cut..]);
        assert_eq!(lines, vec!["data: {\"token\":\"ação\"}".to_string()]);
        assert_eq!(buffer.finish(), None);
    }

    #[test]
    fn invalid_utf8_line_is_skipped_without_losing_neighbours() {
        let mut buffer = LineBuffer::new();
        let mut bytes = b"data: {\"token\":\"a\"}\n".to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe, b'\n']);
        bytes.extend_from_slice(b"data: {\"token\":\"b\"}\n");
        let lines = buffer.push(&bytes);
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn trailing_line_without_newline_is_flushed() {
        let (text, done) = collect_tokens(&[b"data: {\"token\":\"x\"}\ndata: {\"done\":true}"]);
        assert_eq!(text, "x");
        assert!(done);
    }

    #[test]
    fn format_api_error_prettifies_json_with_summary() {
        let raw = r#"{"error":{"message":"model overloaded","type":"server_error"}}"#;
        let expected = r#"API Error: model overloaded
```json
{
  "error": {
    "message": "model overloaded",
    "type": "server_error"
  }
}
```"#;
        assert_eq!(format_api_error(raw), expected);
    }

    #[test]
    fn format_api_error_reads_legacy_erro_field() {
        let formatted = format_api_error(r#"{"erro":"Pergunta não pode estar vazia"}"#);
        assert!(formatted.starts_with("API Error: Pergunta não pode estar vazia\n```json"));
    }

    #[test]
    fn format_api_error_handles_xml_and_plaintext() {
        assert_eq!(
            format_api_error("<error>bad</error>"),
            "API Error:\n```xml\n<error>bad</error>\n```"
        );
        assert_eq!(
            format_api_error("model crashed"),
            "API Error:\n```\nmodel crashed\n```"
        );
        assert_eq!(format_api_error("   "), "API Error:\n```\n<empty>\n```");
    }

    async fn drain(rx: &mut StreamReceiver) -> Vec<StreamMessage> {
        let mut messages = Vec::new();
        while let Some((message, _)) = rx.recv().await {
            let terminal = !matches!(message, StreamMessage::Token(_));
            messages.push(message);
            if terminal {
                break;
            }
        }
        messages
    }

    fn params(base_url: String, stream_id: u64, cancel_token: CancellationToken) -> StreamParams {
        StreamParams {
            client: test_client(),
            base_url,
            request: ChatRequest {
                pergunta: "O que é Rust?".into(),
                file_content: Some("fn main() {}".into()),
            },
            cancel_token,
            stream_id,
        }
    }

    #[tokio::test]
    async fn streams_tokens_over_http_until_done() {
        let response = MockResponse::streaming(vec![
            b"data: {\"token\":\"Rust \"}\n".to_vec(),
            b"data: {\"token\":\"\xc3".to_vec(),
            b"\xa9 \"}\ndata: {\"token\":\"demais\"}\n".to_vec(),
            b"data: {\"done\":true}\n".to_vec(),
        ]);
        let server = spawn_mock_server(vec![response]).await;
        let (service, mut rx) = ChatStreamService::new();

        service
            .spawn_stream(params(server.base_url.clone(), 4, CancellationToken::new()))
            .await
            .expect("stream task");

        let messages = drain(&mut rx).await;
        assert_eq!(
            messages,
            vec![
                StreamMessage::Token("Rust ".into()),
                StreamMessage::Token("é ".into()),
                StreamMessage::Token("demais".into()),
                StreamMessage::Done,
            ]
        );
        assert!(rx.try_recv().is_err());

        let requests = server.requests().await;
        assert_eq!(requests.len(), 1);
        assert!(requests[0].request_line.starts_with("POST /chat "));
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["pergunta"], "O que é Rust?");
        assert_eq!(body["file_content"], "fn main() {}");
    }

    #[tokio::test]
    async fn body_end_without_done_reports_end() {
        let response = MockResponse::streaming(vec![b"data: {\"token\":\"parcial\"}\n".to_vec()]);
        let server = spawn_mock_server(vec![response]).await;
        let (service, mut rx) = ChatStreamService::new();

        service
            .spawn_stream(params(server.base_url.clone(), 1, CancellationToken::new()))
            .await
            .expect("stream task");

        assert_eq!(
            drain(&mut rx).await,
            vec![StreamMessage::Token("parcial".into()), StreamMessage::End]
        );
    }

    #[tokio::test]
    async fn server_error_payload_stops_the_stream() {
        let response = MockResponse::streaming(vec![
            b"data: {\"token\":\"a\"}\ndata: {\"error\":\"ollama offline\"}\ndata: {\"token\":\"ignored\"}\n"
                .to_vec(),
        ]);
        let server = spawn_mock_server(vec![response]).await;
        let (service, mut rx) = ChatStreamService::new();

        service
            .spawn_stream(params(server.base_url.clone(), 2, CancellationToken::new()))
            .await
            .expect("stream task");

        assert_eq!(
            drain(&mut rx).await,
            vec![
                StreamMessage::Token("a".into()),
                StreamMessage::ServerError("API Error:\n```\nollama offline\n```".into()),
            ]
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn non_success_status_is_reported_as_failure() {
        let response = MockResponse::json(500, r#"{"erro":"boom"}"#);
        let server = spawn_mock_server(vec![response]).await;
        let (service, mut rx) = ChatStreamService::new();

        service
            .spawn_stream(params(server.base_url.clone(), 3, CancellationToken::new()))
            .await
            .expect("stream task");

        let messages = drain(&mut rx).await;
        assert_eq!(messages.len(), 1);
        match &messages[0] {
            StreamMessage::Failed(text) => assert!(text.starts_with("API Error: boom")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_backend_is_reported_as_failure() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (service, mut rx) = ChatStreamService::new();
        service
            .spawn_stream(params(format!("http://{addr}"), 9, CancellationToken::new()))
            .await
            .expect("stream task");

        let (message, stream_id) = rx.recv().await.expect("failure message");
        assert_eq!(stream_id, 9);
        assert!(matches!(message, StreamMessage::Failed(_)));
    }

    #[tokio::test]
    async fn cancelled_stream_sends_nothing_further() {
        let response = MockResponse::streaming(vec![b"data: {\"token\":\"late\"}\n".to_vec()])
            .with_initial_delay(std::time::Duration::from_millis(300));
        let server = spawn_mock_server(vec![response]).await;
        let (service, mut rx) = ChatStreamService::new();
        let token = CancellationToken::new();

        let handle = service.spawn_stream(params(server.base_url.clone(), 5, token.clone()));
        token.cancel();
        handle.await.expect("stream task");

        assert!(rx.try_recv().is_err());
    }
}
