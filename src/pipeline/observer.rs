//! Checkpoint hook for the request pipeline.
//!
//! The processor reports each stage transition to a [`PipelineObserver`].
//! Production uses [`TracingObserver`]; tests record events instead.

use std::time::Duration;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::pipeline::types::ExtractionTier;

/// Which endpoint a request came through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Classify,
    GenerateResponse,
}

impl RequestKind {
    pub fn label(self) -> &'static str {
        match self {
            RequestKind::Classify => "classify",
            RequestKind::GenerateResponse => "generate_response",
        }
    }
}

/// A stage transition inside one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    /// Raw bytes arrived.
    Received { bytes: usize, preview: String },
    /// Fields were pulled out of the payload.
    Extracted {
        degraded: Vec<(&'static str, ExtractionTier)>,
    },
    /// Required fields are present.
    Validated,
    /// The body was normalized for prompting.
    Normalized { body_chars_before: usize, body_chars_after: usize },
    /// The model collaborator is being called.
    Delegated,
    /// The request finished successfully.
    Completed { elapsed: Duration, output_chars: usize },
    /// The request failed with the given error kind and message.
    Failed { kind: &'static str, message: String },
}

/// Receives pipeline checkpoints.
pub trait PipelineObserver: Send + Sync {
    fn on_event(&self, request_id: Uuid, kind: RequestKind, event: &PipelineEvent);
}

/// Writes checkpoints as structured `tracing` events.
///
/// Degraded extraction is logged at `warn` so malformed upstream payloads
/// stay visible in production logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn on_event(&self, request_id: Uuid, kind: RequestKind, event: &PipelineEvent) {
        let request = kind.label();
        match event {
            PipelineEvent::Received { bytes, preview } => {
                info!(%request_id, request, bytes, "Request received");
                debug!(%request_id, request, preview = %preview, "Raw payload");
            }
            PipelineEvent::Extracted { degraded } if !degraded.is_empty() => {
                let fields = degraded
                    .iter()
                    .map(|(name, tier)| format!("{name}={}", tier.label()))
                    .collect::<Vec<_>>()
                    .join(", ");
                warn!(%request_id, request, fields = %fields, "Recovered fields from malformed payload");
            }
            PipelineEvent::Extracted { .. } => {
                debug!(%request_id, request, "Payload parsed as strict JSON");
            }
            PipelineEvent::Validated => {
                debug!(%request_id, request, "Required fields present");
            }
            PipelineEvent::Normalized {
                body_chars_before,
                body_chars_after,
            } => {
                debug!(
                    %request_id,
                    request,
                    body_chars_before,
                    body_chars_after,
                    "Body normalized"
                );
            }
            PipelineEvent::Delegated => {
                debug!(%request_id, request, "Calling model");
            }
            PipelineEvent::Completed {
                elapsed,
                output_chars,
            } => {
                info!(
                    %request_id,
                    request,
                    elapsed_ms = elapsed.as_millis() as u64,
                    output_chars,
                    "Request completed"
                );
            }
            PipelineEvent::Failed { kind, message } if *kind == "upstream_model" => {
                error!(%request_id, request, kind, error = %message, "Request failed");
            }
            PipelineEvent::Failed { kind, message } => {
                warn!(%request_id, request, kind, error = %message, "Request rejected");
            }
        }
    }
}

/// Leading `max_chars` characters of `text`, with `...` when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// Like [`preview`], but only decodes the leading bytes of `raw`.
///
/// A UTF-8 character is at most 4 bytes, so `4 * max_chars` bytes always
/// cover the preview. Invalid sequences become U+FFFD.
pub fn preview_bytes(raw: &[u8], max_chars: usize) -> String {
    let cut = raw.len().min(max_chars.saturating_mul(4));
    let head = String::from_utf8_lossy(&raw[..cut]);
    let mut out = preview(&head, max_chars);
    if cut < raw.len() && !out.ends_with("...") {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_truncates_on_char_boundary() {
        assert_eq!(preview("héllo wörld", 5), "héllo...");
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("exact", 5), "exact");
        assert_eq!(preview("", 3), "");
    }

    #[test]
    fn preview_bytes_decodes_only_the_head() {
        assert_eq!(preview_bytes(b"short", 10), "short");
        assert_eq!(preview_bytes("héllo wörld".as_bytes(), 5), "héllo...");
        assert_eq!(preview_bytes(&[b'o', b'k', 0xff], 10), "ok\u{fffd}");

        let big = vec![b'x'; 1024 * 1024];
        let out = preview_bytes(&big, 500);
        assert_eq!(out.chars().count(), 503);
        assert!(out.ends_with("..."));

        // Exactly `max_chars` characters decoded, more bytes left over.
        assert_eq!(preview_bytes("ééé".as_bytes(), 1), "é...");
    }

    #[test]
    fn tracing_observer_handles_every_event() {
        let observer = TracingObserver;
        let id = Uuid::new_v4();
        let events = [
            PipelineEvent::Received {
                bytes: 10,
                preview: "{}".into(),
            },
            PipelineEvent::Extracted { degraded: vec![] },
            PipelineEvent::Extracted {
                degraded: vec![("body", ExtractionTier::BodyRecovery)],
            },
            PipelineEvent::Validated,
            PipelineEvent::Normalized {
                body_chars_before: 40,
                body_chars_after: 12,
            },
            PipelineEvent::Delegated,
            PipelineEvent::Completed {
                elapsed: Duration::from_millis(5),
                output_chars: 7,
            },
            PipelineEvent::Failed {
                kind: "validation",
                message: "missing body".into(),
            },
        ];
        for event in &events {
            observer.on_event(id, RequestKind::Classify, event);
        }
    }
}
