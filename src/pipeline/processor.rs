//! Email processor, the request pipeline behind both POST endpoints.
//!
//! Flow per request:
//! 1. Extract fields from the raw payload (tolerates malformed JSON)
//! 2. Validate required fields
//! 3. Normalize the body (HTML → plain text)
//! 4. Delegate to the model collaborator (single attempt, bounded by a timeout)
//! 5. Trim and return the model output
//!
//! No state is shared between requests; the processor only holds the
//! injected collaborator and observer.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::warn;
use uuid::Uuid;

use crate::error::{LlmError, PipelineError};
use crate::llm::EmailModel;
use crate::pipeline::extract;
use crate::pipeline::normalize::normalize;
use crate::pipeline::observer::{
    PipelineEvent, PipelineObserver, RequestKind, TracingObserver, preview, preview_bytes,
};
use crate::pipeline::types::{
    Category, CategoryOutput, EmailRecord, ExtractedFields, ResponseOutput, ResponseRecord,
};

/// Default timeout for one model call.
pub const DEFAULT_MODEL_TIMEOUT: Duration = Duration::from_secs(30);

/// Characters of raw payload kept in logs.
const LOG_PREVIEW_CHARS: usize = 500;

/// Characters of raw payload echoed back in validation errors.
const ERROR_PREVIEW_CHARS: usize = 200;

/// Runs classification and reply drafting for raw request payloads.
pub struct EmailProcessor {
    model: Arc<dyn EmailModel>,
    observer: Arc<dyn PipelineObserver>,
    model_timeout: Duration,
}

impl EmailProcessor {
    /// Create a processor that logs through `tracing`.
    pub fn new(model: Arc<dyn EmailModel>) -> Self {
        Self {
            model,
            observer: Arc::new(TracingObserver),
            model_timeout: DEFAULT_MODEL_TIMEOUT,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = timeout;
        self
    }

    /// Classify a raw `{subject, body}` payload.
    pub async fn classify(&self, raw: &[u8]) -> Result<CategoryOutput, PipelineError> {
        let request_id = Uuid::new_v4();
        let kind = RequestKind::Classify;
        let started = Instant::now();

        let result = self.run_classify(request_id, raw).await;
        self.finish(request_id, kind, started, &result, |out| out.category.chars().count());
        result
    }

    /// Draft a reply for a raw `{subject, body, category}` payload.
    pub async fn generate_response(&self, raw: &[u8]) -> Result<ResponseOutput, PipelineError> {
        let request_id = Uuid::new_v4();
        let kind = RequestKind::GenerateResponse;
        let started = Instant::now();

        let result = self.run_generate(request_id, raw).await;
        self.finish(request_id, kind, started, &result, |out| {
            out.response_text.chars().count()
        });
        result
    }

    async fn run_classify(
        &self,
        request_id: Uuid,
        raw: &[u8],
    ) -> Result<CategoryOutput, PipelineError> {
        let kind = RequestKind::Classify;
        let (fields, text) = self.receive(request_id, kind, raw)?;

        let record = validate_email(&fields, text)?;
        self.emit(request_id, kind, PipelineEvent::Validated);

        let body = self.normalize_body(request_id, kind, &record.body);

        self.emit(request_id, kind, PipelineEvent::Delegated);
        let label = self
            .call_model(self.model.classify(&record.subject, &body))
            .await?;

        if Category::parse(&label).is_none() {
            warn!(%request_id, label = %label, "Model returned a label outside the category set");
        }

        Ok(CategoryOutput { category: label })
    }

    async fn run_generate(
        &self,
        request_id: Uuid,
        raw: &[u8],
    ) -> Result<ResponseOutput, PipelineError> {
        let kind = RequestKind::GenerateResponse;
        let (fields, text) = self.receive(request_id, kind, raw)?;

        let record = validate_response(&fields, text)?;
        self.emit(request_id, kind, PipelineEvent::Validated);

        let body = self.normalize_body(request_id, kind, &record.body);

        self.emit(request_id, kind, PipelineEvent::Delegated);
        let response_text = self
            .call_model(
                self.model
                    .draft_reply(&record.subject, &body, &record.category),
            )
            .await?;

        Ok(ResponseOutput { response_text })
    }

    /// Received → Extracted.
    fn receive<'a>(
        &self,
        request_id: Uuid,
        kind: RequestKind,
        raw: &'a [u8],
    ) -> Result<(ExtractedFields, &'a str), PipelineError> {
        self.emit(
            request_id,
            kind,
            PipelineEvent::Received {
                bytes: raw.len(),
                preview: preview_bytes(raw, LOG_PREVIEW_CHARS),
            },
        );

        let text = extract::decode(raw)?;
        let fields = extract::extract_str(text);
        self.emit(
            request_id,
            kind,
            PipelineEvent::Extracted {
                degraded: fields.degraded(),
            },
        );

        Ok((fields, text))
    }

    fn normalize_body(&self, request_id: Uuid, kind: RequestKind, body: &str) -> String {
        let normalized = normalize(body);
        self.emit(
            request_id,
            kind,
            PipelineEvent::Normalized {
                body_chars_before: body.chars().count(),
                body_chars_after: normalized.chars().count(),
            },
        );
        normalized
    }

    /// Delegated → output. One attempt, no retries.
    async fn call_model<F>(&self, call: F) -> Result<String, PipelineError>
    where
        F: Future<Output = Result<String, LlmError>>,
    {
        let output = tokio::time::timeout(self.model_timeout, call)
            .await
            .map_err(|_| PipelineError::ModelTimeout(self.model_timeout))??;

        let trimmed = output.trim();
        if trimmed.is_empty() {
            return Err(PipelineError::EmptyModelResponse);
        }
        Ok(trimmed.to_string())
    }

    fn finish<T>(
        &self,
        request_id: Uuid,
        kind: RequestKind,
        started: Instant,
        result: &Result<T, PipelineError>,
        output_chars: impl Fn(&T) -> usize,
    ) {
        let event = match result {
            Ok(out) => PipelineEvent::Completed {
                elapsed: started.elapsed(),
                output_chars: output_chars(out),
            },
            Err(e) => PipelineEvent::Failed {
                kind: e.kind(),
                message: e.to_string(),
            },
        };
        self.emit(request_id, kind, event);
    }

    fn emit(&self, request_id: Uuid, kind: RequestKind, event: PipelineEvent) {
        self.observer.on_event(request_id, kind, &event);
    }
}

/// Extracted → Validated for `/classify_email/`.
pub fn validate_email(fields: &ExtractedFields, raw: &str) -> Result<EmailRecord, PipelineError> {
    let mut missing = Vec::new();
    if fields.subject.is_none() {
        missing.push("subject");
    }
    if fields.body.is_none() {
        missing.push("body");
    }

    match (fields.subject(), fields.body()) {
        (Some(subject), Some(body)) => Ok(EmailRecord {
            subject: subject.to_string(),
            body: body.to_string(),
        }),
        _ => Err(PipelineError::Validation {
            missing,
            received: preview(raw, ERROR_PREVIEW_CHARS),
        }),
    }
}

/// Extracted → Validated for `/generate_response/`. The category must be non-blank.
pub fn validate_response(
    fields: &ExtractedFields,
    raw: &str,
) -> Result<ResponseRecord, PipelineError> {
    let category = fields
        .category()
        .map(str::trim)
        .filter(|c| !c.is_empty());

    let email = validate_email(fields, raw);
    match (email, category) {
        (Ok(email), Some(category)) => Ok(ResponseRecord {
            subject: email.subject,
            body: email.body,
            category: category.to_string(),
        }),
        (Ok(_), None) => Err(PipelineError::Validation {
            missing: vec!["category"],
            received: preview(raw, ERROR_PREVIEW_CHARS),
        }),
        (Err(PipelineError::Validation { mut missing, received }), category) => {
            if category.is_none() {
                missing.push("category");
            }
            Err(PipelineError::Validation { missing, received })
        }
        (Err(e), _) => Err(e),
    }
}
