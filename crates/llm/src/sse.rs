//! SSE decoding for streaming chat completions.
//!
//! The upstream body arrives as arbitrary byte chunks; events are
//! delimited by a blank line and carry their payload on `data:` lines.
//! [`SseBuffer`] reassembles complete events across chunk boundaries,
//! [`delta_stream`] turns a response into a stream of content deltas.

use scriberr_domain::stream::BoxStream;
use scriberr_domain::{Error, Result};

/// Streaming inactivity timeout: if the provider sends nothing for this
/// long the stream fails rather than hanging a client forever.
const INACTIVITY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(120);

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event reassembly
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Accumulates raw bytes and hands back complete `data:` payloads.
/// Multiple `data:` lines within one event are joined with newlines per
/// the SSE spec; comment and field lines we don't use are dropped.
#[derive(Default)]
pub struct SseBuffer {
    pending: String,
}

impl SseBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning every payload completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.push_str(&String::from_utf8_lossy(chunk));

        let mut payloads = Vec::new();
        while let Some(boundary) = self.pending.find("\n\n") {
            let event: String = self.pending.drain(..boundary + 2).collect();
            if let Some(payload) = Self::extract_data(&event) {
                payloads.push(payload);
            }
        }
        payloads
    }

    /// Flush whatever remains as a final event (providers sometimes omit
    /// the trailing blank line before closing the connection).
    pub fn finish(mut self) -> Option<String> {
        if self.pending.trim().is_empty() {
            return None;
        }
        let event = std::mem::take(&mut self.pending);
        Self::extract_data(&event)
    }

    fn extract_data(event: &str) -> Option<String> {
        let data_lines: Vec<&str> = event
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(str::trim)
            .filter(|payload| !payload.is_empty())
            .collect();
        if data_lines.is_empty() {
            None
        } else {
            Some(data_lines.join("\n"))
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Delta stream
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Convert an SSE response into a stream of content deltas.
///
/// The stream ends at the `[DONE]` sentinel or connection close, and
/// yields at most one `Err` (transport failure, provider error chunk, or
/// inactivity timeout) before terminating.
pub fn delta_stream(response: reqwest::Response) -> BoxStream<'static, Result<String>> {
    let stream = async_stream::stream! {
        let mut response = response;
        let mut buffer = SseBuffer::new();

        'read: loop {
            let chunk = match tokio::time::timeout(INACTIVITY_TIMEOUT, response.chunk()).await {
                Err(_) => {
                    yield Err(Error::Upstream(format!(
                        "no data from provider for {}s",
                        INACTIVITY_TIMEOUT.as_secs()
                    )));
                    return;
                }
                Ok(Err(e)) => {
                    yield Err(Error::Upstream(e.to_string()));
                    return;
                }
                Ok(Ok(None)) => break 'read,
                Ok(Ok(Some(bytes))) => bytes,
            };

            for payload in buffer.feed(&chunk) {
                if payload == "[DONE]" {
                    return;
                }
                if let Some(item) = crate::parse_delta(&payload) {
                    let failed = item.is_err();
                    yield item;
                    if failed {
                        return;
                    }
                }
            }
        }

        if let Some(payload) = buffer.finish() {
            if payload != "[DONE]" {
                if let Some(item) = crate::parse_delta(&payload) {
                    yield item;
                }
            }
        }
    };

    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_returns_complete_payloads() {
        let mut buf = SseBuffer::new();
        let payloads = buf.feed(b"data: one\n\ndata: two\n\n");
        assert_eq!(payloads, vec!["one", "two"]);
    }

    #[test]
    fn partial_event_waits_for_more_bytes() {
        let mut buf = SseBuffer::new();
        assert!(buf.feed(b"data: par").is_empty());
        let payloads = buf.feed(b"tial\n\n");
        assert_eq!(payloads, vec!["partial"]);
    }

    #[test]
    fn event_split_mid_delimiter() {
        let mut buf = SseBuffer::new();
        assert!(buf.feed(b"data: x\n").is_empty());
        assert_eq!(buf.feed(b"\n"), vec!["x"]);
    }

    #[test]
    fn multiple_data_lines_join_with_newline() {
        let mut buf = SseBuffer::new();
        let payloads = buf.feed(b"data: line1\ndata: line2\n\n");
        assert_eq!(payloads, vec!["line1\nline2"]);
    }

    #[test]
    fn non_data_fields_are_dropped() {
        let mut buf = SseBuffer::new();
        let payloads = buf.feed(b"event: delta\nid: 7\nretry: 100\ndata: payload\n\n");
        assert_eq!(payloads, vec!["payload"]);
        assert!(buf.feed(b": comment only\n\n").is_empty());
    }

    #[test]
    fn finish_flushes_unterminated_event() {
        let mut buf = SseBuffer::new();
        assert!(buf.feed(b"data: tail").is_empty());
        assert_eq!(buf.finish().as_deref(), Some("tail"));
        assert!(SseBuffer::new().finish().is_none());
    }

    #[test]
    fn done_sentinel_passes_through_for_caller() {
        let mut buf = SseBuffer::new();
        assert_eq!(buf.feed(b"data: [DONE]\n\n"), vec!["[DONE]"]);
    }
}
