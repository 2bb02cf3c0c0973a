//! Email Assist: email classification and reply drafting over HTTP.

pub mod api;
pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
