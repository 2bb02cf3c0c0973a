//! Pipeline types: extracted fields, validated records, categories, outputs.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The fixed set of categories the classifier is asked to choose from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Technical Support")]
    TechnicalSupport,
    Sales,
    Billing,
    General,
    Returns,
    Other,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::TechnicalSupport,
        Category::Sales,
        Category::Billing,
        Category::General,
        Category::Returns,
        Category::Other,
    ];

    /// The label as it appears in prompts and responses.
    pub fn label(self) -> &'static str {
        match self {
            Category::TechnicalSupport => "Technical Support",
            Category::Sales => "Sales",
            Category::Billing => "Billing",
            Category::General => "General",
            Category::Returns => "Returns",
            Category::Other => "Other",
        }
    }

    /// Match a label case-insensitively, ignoring surrounding whitespace.
    pub fn parse(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.label().eq_ignore_ascii_case(label))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Strategy level that recovered a field from the raw payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionTier {
    /// The payload parsed as a JSON object.
    Strict,
    /// `"key": "value"` scan whose value ends at a structural terminator.
    Pattern,
    /// Markup-aware body recovery for bodies whose inner quotes broke the scan.
    BodyRecovery,
    /// Value taken up to the first unescaped quote, possibly truncated.
    Lenient,
}

impl ExtractionTier {
    pub fn label(self) -> &'static str {
        match self {
            ExtractionTier::Strict => "strict",
            ExtractionTier::Pattern => "pattern",
            ExtractionTier::BodyRecovery => "body_recovery",
            ExtractionTier::Lenient => "lenient",
        }
    }

    /// Anything past the strict parse is a degraded path worth logging.
    pub fn is_degraded(self) -> bool {
        self != ExtractionTier::Strict
    }
}

/// A recovered field value together with the tier that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSource {
    pub value: String,
    pub tier: ExtractionTier,
}

/// Output of the field extractor. `None` means no tier found the field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedFields {
    pub subject: Option<FieldSource>,
    pub body: Option<FieldSource>,
    pub category: Option<FieldSource>,
}

impl ExtractedFields {
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_ref().map(|f| f.value.as_str())
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_ref().map(|f| f.value.as_str())
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_ref().map(|f| f.value.as_str())
    }

    /// Fields recovered through a degraded tier, as `(name, tier)`.
    pub fn degraded(&self) -> Vec<(&'static str, ExtractionTier)> {
        [
            ("subject", &self.subject),
            ("body", &self.body),
            ("category", &self.category),
        ]
        .into_iter()
        .filter_map(|(name, field)| field.as_ref().map(|f| (name, f.tier)))
        .filter(|(_, tier)| tier.is_degraded())
        .collect()
    }
}

/// A validated email, ready for normalization and classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailRecord {
    pub subject: String,
    pub body: String,
}

/// A validated email plus the category that conditions the reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseRecord {
    pub subject: String,
    pub body: String,
    /// Trimmed, never empty.
    pub category: String,
}

/// `/classify_email/` success payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryOutput {
    pub category: String,
}

/// `/generate_response/` success payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseOutput {
    pub response_text: String,
}

/// `GET /` liveness payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LivenessOutput {
    pub message: String,
}
