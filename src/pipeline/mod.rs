//! Email processing pipeline.
//!
//! Every request to the classification and reply endpoints flows through:
//! 1. `extract::extract()`: tiered field recovery from raw bytes
//! 2. `processor::validate_*()`: required-field checks (no model call on failure)
//! 3. `normalize::normalize()`: HTML body → plain text
//! 4. `EmailModel`: one classify or draft-reply call, bounded by a timeout
//!
//! Each stage transition is reported to a `PipelineObserver`.

pub mod extract;
pub mod normalize;
pub mod observer;
pub mod processor;
pub mod types;
