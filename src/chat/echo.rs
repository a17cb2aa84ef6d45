//! Prompt-echo filter
//!
//! Instruction-tuned models streamed without prompt stripping repeat the
//! whole prompt before answering. [`EchoFilter`] holds output back until the
//! end-of-instruction marker shows up, drops everything through the marker
//! and one separating space, then forwards the rest unchanged.
//!
//! If the marker never appears the held-back text is dropped and nothing is
//! forwarded.

use async_stream::stream;
use futures::StreamExt;

use crate::backend::TextStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EchoState {
    /// Accumulating until the marker is seen
    Searching,
    /// Marker ended a chunk; the next chunk may start with the separator
    SkipSeparator,
    Forwarding,
}

/// Stateful scan over raw generation chunks
#[derive(Debug)]
pub struct EchoFilter {
    marker: String,
    buffer: String,
    /// Where the next marker search starts; earlier text cannot begin a match
    search_from: usize,
    state: EchoState,
}

impl EchoFilter {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
            buffer: String::new(),
            search_from: 0,
            state: EchoState::Searching,
        }
    }

    /// Feed one raw chunk; returns the text to forward, if any
    pub fn push(&mut self, chunk: &str) -> Option<String> {
        match self.state {
            EchoState::Forwarding => non_empty(chunk.to_string()),
            EchoState::SkipSeparator => {
                if chunk.is_empty() {
                    return None;
                }
                self.state = EchoState::Forwarding;
                non_empty(strip_separator(chunk).to_string())
            }
            EchoState::Searching => {
                self.buffer.push_str(chunk);
                self.search()
            }
        }
    }

    /// End of the raw stream
    pub fn finish(self) {
        if self.state == EchoState::Searching && !self.buffer.is_empty() {
            tracing::warn!(
                "Marker {:?} never appeared; dropping {} bytes of generated output",
                self.marker,
                self.buffer.len()
            );
        }
    }

    fn search(&mut self) -> Option<String> {
        let Some(found) = self.buffer[self.search_from..].find(&self.marker) else {
            // a marker split across chunks can only start in the last marker.len()-1 bytes
            let mut next = self
                .buffer
                .len()
                .saturating_sub(self.marker.len().saturating_sub(1));
            while !self.buffer.is_char_boundary(next) {
                next -= 1;
            }
            self.search_from = next.max(self.search_from);
            return None;
        };

        let end = self.search_from + found + self.marker.len();
        let rest = self.buffer.split_off(end);
        self.buffer.clear();

        if rest.is_empty() {
            self.state = EchoState::SkipSeparator;
            return None;
        }
        self.state = EchoState::Forwarding;
        non_empty(strip_separator(&rest).to_string())
    }
}

fn strip_separator(text: &str) -> &str {
    text.strip_prefix(' ').unwrap_or(text)
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Run `raw` through an [`EchoFilter`] for `marker`.
///
/// Upstream errors are passed through as they arrive.
pub fn filter_stream(raw: TextStream, marker: String) -> TextStream {
    stream! {
        let mut filter = EchoFilter::new(marker);
        let mut raw = raw;
        while let Some(item) = raw.next().await {
            match item {
                Ok(chunk) => {
                    if let Some(text) = filter.push(&chunk) {
                        yield Ok(text);
                    }
                }
                Err(e) => yield Err(e),
            }
        }
        filter.finish();
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BlendError, Result};
    use futures::stream;

    fn run(marker: &str, chunks: &[&str]) -> Vec<String> {
        let mut filter = EchoFilter::new(marker);
        let out = chunks.iter().filter_map(|c| filter.push(c)).collect();
        filter.finish();
        out
    }

    #[test]
    fn test_strips_instruction_block() {
        let out = run("[/INST]", &["<<SYS>>sys<<SYS>>[/INST]", " Hello", " world"]);
        assert_eq!(out.concat(), "Hello world");
        assert_eq!(out, vec!["Hello", " world"]);
    }

    #[test]
    fn test_marker_never_found_yields_nothing() {
        let out = run("[/INST]", &["just some", " text", " without a marker"]);
        assert!(out.is_empty());
    }

    #[test]
    fn test_marker_split_across_chunks() {
        let out = run("[/INST]", &["prompt [/I", "NS", "T] Hi", " there"]);
        assert_eq!(out.concat(), "Hi there");
    }

    #[test]
    fn test_remainder_in_marker_chunk() {
        let out = run("[/INST]", &["[INST]q[/INST] Answer", " continues"]);
        assert_eq!(out, vec!["Answer", " continues"]);
    }

    #[test]
    fn test_only_one_separator_space_dropped() {
        let out = run("[/INST]", &["[/INST]", "  indented"]);
        assert_eq!(out.concat(), " indented");
    }

    #[test]
    fn test_no_separator_after_marker() {
        let out = run("[/INST]", &["[/INST]", "Hello"]);
        assert_eq!(out.concat(), "Hello");
    }

    #[test]
    fn test_empty_chunks_are_not_forwarded() {
        let out = run("[/INST]", &["", "[/INST]", "", " ", "a", ""]);
        assert_eq!(out, vec!["a"]);
    }

    #[test]
    fn test_multibyte_text_before_marker() {
        let out = run("ünd", &["grüße ü", "nd mehr"]);
        assert_eq!(out.concat(), "mehr");
    }

    #[test]
    fn test_later_markers_are_forwarded() {
        let out = run("[/INST]", &["x[/INST] a [/INST] b"]);
        assert_eq!(out.concat(), "a [/INST] b");
    }

    #[tokio::test]
    async fn test_filter_stream() {
        let raw: TextStream = stream::iter(vec![
            Ok("<<SYS>>sys<<SYS>>[/INST]".to_string()),
            Ok(" Hello".to_string()),
            Ok(" world".to_string()),
        ])
        .boxed();

        let out: Vec<String> = filter_stream(raw, "[/INST]".to_string())
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(out.concat(), "Hello world");
    }

    #[tokio::test]
    async fn test_filter_stream_passes_errors_through() {
        let raw: TextStream = stream::iter(vec![
            Ok("[/INST] partial".to_string()),
            Err(BlendError::backend("generation aborted")),
        ])
        .boxed();

        let out: Vec<Result<String>> = filter_stream(raw, "[/INST]".to_string()).collect().await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_ref().unwrap(), "partial");
        assert!(matches!(out[1], Err(BlendError::BackendFailure(_))));
    }
}
