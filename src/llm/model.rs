//! The model collaborator: email classification and reply drafting.
//!
//! The request pipeline only ever sees the [`EmailModel`] capability. The
//! production implementation, [`LlmEmailModel`], turns each call into one
//! completion request against an [`LlmProvider`]; tests substitute a stub.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::costs;
use crate::error::LlmError;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::pipeline::types::Category;

/// Max tokens for classification (the answer is a single label).
const CLASSIFY_MAX_TOKENS: u32 = 16;

/// Temperature for classification.
const CLASSIFY_TEMPERATURE: f32 = 0.0;

/// Max tokens for a drafted reply.
const DRAFT_MAX_TOKENS: u32 = 1024;

/// Temperature for drafting.
const DRAFT_TEMPERATURE: f32 = 0.4;

/// Classify-and-draft capability injected into the request pipeline.
#[async_trait]
pub trait EmailModel: Send + Sync {
    /// Return a single category label for the email. No other text.
    async fn classify(&self, subject: &str, body: &str) -> Result<String, LlmError>;

    /// Draft a reply body (no greeting, no sign-off) conditioned on the category.
    async fn draft_reply(
        &self,
        subject: &str,
        body: &str,
        category: &str,
    ) -> Result<String, LlmError>;
}

/// `EmailModel` backed by a hosted LLM.
pub struct LlmEmailModel {
    llm: Arc<dyn LlmProvider>,
}

impl LlmEmailModel {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    async fn run(&self, call: &'static str, request: CompletionRequest) -> Result<String, LlmError> {
        let response = self.llm.complete(request).await?;

        let cost = costs::estimate(
            self.llm.cost_per_token(),
            response.input_tokens,
            response.output_tokens,
        );
        debug!(
            call,
            model = self.llm.model_name(),
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            cost_usd = %cost,
            "Model call complete"
        );

        Ok(response.content)
    }
}

#[async_trait]
impl EmailModel for LlmEmailModel {
    async fn classify(&self, subject: &str, body: &str) -> Result<String, LlmError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(build_classify_system_prompt()),
            ChatMessage::user(build_classify_user_prompt(subject, body)),
        ])
        .with_temperature(CLASSIFY_TEMPERATURE)
        .with_max_tokens(CLASSIFY_MAX_TOKENS);

        self.run("classify", request).await
    }

    async fn draft_reply(
        &self,
        subject: &str,
        body: &str,
        category: &str,
    ) -> Result<String, LlmError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(build_draft_system_prompt()),
            ChatMessage::user(build_draft_user_prompt(subject, body, category)),
        ])
        .with_temperature(DRAFT_TEMPERATURE)
        .with_max_tokens(DRAFT_MAX_TOKENS);

        self.run("draft_reply", request).await
    }
}

// ── Prompt construction ─────────────────────────────────────────────

fn build_classify_system_prompt() -> String {
    let mut prompt = String::from(
        "You are an assistant that classifies incoming customer emails.\n\
         Classify the email into exactly one of these categories:\n",
    );
    for category in Category::ALL {
        prompt.push_str(&format!("- {}\n", category.label()));
    }
    prompt.push_str(
        "\nUse \"Other\" only when the email fits none of the other categories.\n\
         Respond with ONLY the category name. No explanation, no punctuation, no other text.",
    );
    prompt
}

fn build_classify_user_prompt(subject: &str, body: &str) -> String {
    format!("Subject: {subject}\n\nBody: {body}")
}

fn build_draft_system_prompt() -> String {
    "You are a friendly, helpful assistant that drafts replies to customer emails.\n\
     Write a professional, polite reply suited to the email's category.\n\
     Keep it concise, clear and direct.\n\
     Do not include generic greetings or sign-offs (no \"Dear ...\", no \"Sincerely\").\n\
     Write only the body of the message."
        .to_string()
}

fn build_draft_user_prompt(subject: &str, body: &str, category: &str) -> String {
    format!(
        "Original email subject: {subject}\n\nOriginal email body: {body}\n\nCategory: {category}"
    )
}
