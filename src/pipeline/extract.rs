//! Field extraction from possibly-malformed JSON payloads.
//!
//! The upstream automation that posts emails here serializes HTML bodies
//! without escaping their inner double quotes, so payloads like
//! `{"subject": "Hi", "body": "<div dir="ltr">Hello</div>"}` are common.
//! Each field is recovered by walking an explicit list of tiers, first
//! success wins:
//!
//! 1. [`ExtractionTier::Strict`]: `serde_json` parse of the whole payload.
//! 2. [`ExtractionTier::Pattern`]: `"key": "value"` scan; the value ends at
//!    the first unescaped quote, which must be followed by `,`, `}` or the
//!    end of input.
//! 3. [`ExtractionTier::BodyRecovery`]: body only, and only when the body
//!    carries markup (an HTML tag or a quoted attribute). Takes everything
//!    between the body marker and the most plausible closing quote.
//! 4. [`ExtractionTier::Lenient`]: the value up to the first unescaped quote,
//!    with no terminator check. May be truncated.
//!
//! Tier 3 is a heuristic. It can pick the wrong closing quote when the HTML
//! itself contains something that looks like a field boundary; that case
//! yields a wrong-but-non-empty body rather than an error.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::error::PipelineError;
use crate::pipeline::normalize::TAG_SHAPE;
use crate::pipeline::types::{ExtractedFields, ExtractionTier, FieldSource};

/// Fields the extractor knows how to recover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Subject,
    Body,
    Category,
}

impl Field {
    pub fn key(self) -> &'static str {
        match self {
            Field::Subject => "subject",
            Field::Body => "body",
            Field::Category => "category",
        }
    }

    /// Tiers attempted for this field, in order.
    pub fn tiers(self) -> &'static [ExtractionTier] {
        match self {
            Field::Body => &[
                ExtractionTier::Strict,
                ExtractionTier::Pattern,
                ExtractionTier::BodyRecovery,
                ExtractionTier::Lenient,
            ],
            Field::Subject | Field::Category => &[
                ExtractionTier::Strict,
                ExtractionTier::Pattern,
                ExtractionTier::Lenient,
            ],
        }
    }

    fn patterns(self) -> &'static FieldPatterns {
        match self {
            Field::Subject => &SUBJECT_PATTERNS,
            Field::Body => &BODY_PATTERNS,
            Field::Category => &CATEGORY_PATTERNS,
        }
    }
}

/// Compiled scans for one key.
struct FieldPatterns {
    /// Value followed by a structural terminator.
    terminated: Regex,
    /// Value up to the first unescaped quote.
    lenient: Regex,
}

impl FieldPatterns {
    /// Body values may span lines; other fields stop at a raw newline.
    fn new(key: &str, multiline: bool) -> Self {
        let value = if multiline {
            r#"(?s)((?:[^"\\]|\\.)*)"#
        } else {
            r#"((?:[^"\\\n]|\\.)*)"#
        };
        let prefix = format!(r#""{}"\s*:\s*""#, regex::escape(key));
        Self {
            terminated: Regex::new(&format!(r#"{prefix}{value}"\s*(?:,|\}}|$)"#))
                .expect("valid terminated field regex"),
            lenient: Regex::new(&format!(r#"{prefix}{value}""#)).expect("valid lenient field regex"),
        }
    }
}

static SUBJECT_PATTERNS: LazyLock<FieldPatterns> =
    LazyLock::new(|| FieldPatterns::new("subject", false));

static BODY_PATTERNS: LazyLock<FieldPatterns> = LazyLock::new(|| FieldPatterns::new("body", true));

static CATEGORY_PATTERNS: LazyLock<FieldPatterns> =
    LazyLock::new(|| FieldPatterns::new("category", false));

/// A tag carrying a double-quoted attribute, e.g. `<div dir="ltr">`.
static MARKUP_EVIDENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<[A-Za-z][^<>]*\s[A-Za-z_:][-A-Za-z0-9_:.]*\s*=\s*""#)
        .expect("valid markup evidence regex")
});

static BODY_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""body"\s*:\s*""#).expect("valid body marker regex"));

/// Closing quote followed by another known field.
static NEXT_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""\s*,\s*"(?:subject|body|category)"\s*:"#).expect("valid next field regex")
});

/// Closing quote followed only by the end of the object.
static OBJECT_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""\s*\}\s*$"#).expect("valid object end regex"));

/// Decode raw request bytes as UTF-8, dropping a leading byte order mark.
pub fn decode(raw: &[u8]) -> Result<&str, PipelineError> {
    let text = std::str::from_utf8(raw)?;
    Ok(text.strip_prefix('\u{feff}').unwrap_or(text))
}

/// Recover subject, body and category from raw request bytes.
///
/// Fails only when the bytes are not UTF-8. Anything else yields a
/// best-effort result where unrecoverable fields are `None`.
pub fn extract(raw: &[u8]) -> Result<ExtractedFields, PipelineError> {
    Ok(extract_str(decode(raw)?))
}

/// Recover fields from already-decoded text.
pub fn extract_str(text: &str) -> ExtractedFields {
    let strict = parse_strict(text);
    let strict = strict.as_ref();

    ExtractedFields {
        subject: extract_field(text, strict, Field::Subject),
        body: extract_field(text, strict, Field::Body),
        category: extract_field(text, strict, Field::Category),
    }
}

/// Walk a field's tiers until one yields a value.
pub fn extract_field(
    text: &str,
    strict: Option<&Map<String, Value>>,
    field: Field,
) -> Option<FieldSource> {
    field.tiers().iter().find_map(|&tier| {
        run_tier(tier, text, strict, field).map(|value| FieldSource { value, tier })
    })
}

fn run_tier(
    tier: ExtractionTier,
    text: &str,
    strict: Option<&Map<String, Value>>,
    field: Field,
) -> Option<String> {
    match tier {
        ExtractionTier::Strict => strict.and_then(|map| strict_value(map, field.key())),
        ExtractionTier::Pattern => scan(&field.patterns().terminated, text),
        ExtractionTier::BodyRecovery => recover_body(text),
        ExtractionTier::Lenient => scan(&field.patterns().lenient, text),
    }
}

/// Tier 1: the payload must be a JSON object.
pub fn parse_strict(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Strings verbatim; numbers and booleans as their JSON text; anything else absent.
fn strict_value(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Tiers 2 and 4: first match of the given scan, JSON-unescaped.
fn scan(pattern: &Regex, text: &str) -> Option<String> {
    let captures = pattern.captures(text)?;
    let span = captures.get(1)?.as_str();
    Some(decode_json_string(span))
}

/// Tier 3: body whose unescaped inner quotes broke the pattern scan.
///
/// Only runs when the text after the body marker carries markup: a complete
/// tag such as `<p>`, or an opening tag with a quoted attribute.
pub fn recover_body(text: &str) -> Option<String> {
    let start = BODY_MARKER.find(text)?.end();
    let rest = &text[start..];

    if !MARKUP_EVIDENCE.is_match(rest) && !TAG_SHAPE.is_match(rest) {
        return None;
    }

    let end = NEXT_FIELD
        .find(rest)
        .or_else(|| OBJECT_END.find(rest))?
        .start();

    Some(unescape_lenient(&rest[..end]))
}

/// Decode the inside of a JSON string literal, falling back to
/// [`unescape_lenient`] when it is not valid JSON (raw newlines, bad escapes).
pub fn decode_json_string(span: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{span}\""))
        .unwrap_or_else(|_| unescape_lenient(span))
}

/// Undo the common JSON escapes. Unknown escapes are kept verbatim.
pub fn unescape_lenient(span: &str) -> String {
    let mut out = String::with_capacity(span.len());
    let mut chars = span.chars();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('"') => out.push('"'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some('/') => out.push('/'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::normalize::normalize;

    fn value(field: &Option<FieldSource>) -> Option<&str> {
        field.as_ref().map(|f| f.value.as_str())
    }

    fn tier(field: &Option<FieldSource>) -> Option<ExtractionTier> {
        field.as_ref().map(|f| f.tier)
    }

    // ── Tier 1: strict ───────────────────────────────────────────────

    #[test]
    fn well_formed_json_recovered_exactly() {
        let raw = br#"{"subject": "Refund request", "body": "<p>I want a refund for order 123</p>"}"#;
        let fields = extract(raw).unwrap();
        assert_eq!(value(&fields.subject), Some("Refund request"));
        assert_eq!(value(&fields.body), Some("<p>I want a refund for order 123</p>"));
        assert_eq!(tier(&fields.subject), Some(ExtractionTier::Strict));
        assert_eq!(tier(&fields.body), Some(ExtractionTier::Strict));
        assert!(fields.category.is_none());
    }

    #[test]
    fn strict_preserves_escapes_and_unicode() {
        let raw = "{\"subject\": \"Caf\\u00e9 \\\"order\\\"\", \"body\": \"line1\\nline2\\ttab\"}";
        let fields = extract(raw.as_bytes()).unwrap();
        assert_eq!(value(&fields.subject), Some("Café \"order\""));
        assert_eq!(value(&fields.body), Some("line1\nline2\ttab"));
    }

    #[test]
    fn strict_coerces_scalars() {
        let raw = br#"{"subject": 12345, "body": true, "category": null}"#;
        let fields = extract(raw).unwrap();
        assert_eq!(value(&fields.subject), Some("12345"));
        assert_eq!(value(&fields.body), Some("true"));
        assert!(fields.category.is_none());
    }

    #[test]
    fn strict_empty_strings_are_present() {
        let fields = extract(br#"{"subject": "", "body": ""}"#).unwrap();
        assert_eq!(value(&fields.subject), Some(""));
        assert_eq!(value(&fields.body), Some(""));
    }

    #[test]
    fn missing_body_is_absent() {
        let fields = extract(br#"{"subject": "Hello"}"#).unwrap();
        assert_eq!(value(&fields.subject), Some("Hello"));
        assert!(fields.body.is_none());
    }

    #[test]
    fn non_object_json_falls_through() {
        let fields = extract(br#"["subject", "body"]"#).unwrap();
        assert!(fields.subject.is_none());
        assert!(fields.body.is_none());
    }

    #[test]
    fn byte_order_mark_ignored() {
        let mut raw = "\u{feff}".as_bytes().to_vec();
        raw.extend_from_slice(br#"{"subject": "s", "body": "b"}"#);
        let fields = extract(&raw).unwrap();
        assert_eq!(tier(&fields.subject), Some(ExtractionTier::Strict));
    }

    #[test]
    fn invalid_utf8_is_decode_error() {
        let raw = [b'{', b'"', 0xff, 0xfe, b'"', b'}'];
        let err = extract(&raw).unwrap_err();
        assert!(matches!(err, PipelineError::Decode(_)));
    }

    #[test]
    fn empty_payload_yields_nothing() {
        let fields = extract(b"").unwrap();
        assert_eq!(fields, ExtractedFields::default());
    }

    // ── Tier 2: pattern ──────────────────────────────────────────────

    #[test]
    fn pattern_recovers_fields_around_a_broken_one() {
        // Trailing comma breaks strict parsing; every field is still well-delimited.
        let raw = br#"{"subject": "Invoice", "body": "Charged \"twice\"", "category": "Billing",}"#;
        let fields = extract(raw).unwrap();
        assert_eq!(value(&fields.subject), Some("Invoice"));
        assert_eq!(value(&fields.body), Some("Charged \"twice\""));
        assert_eq!(value(&fields.category), Some("Billing"));
        assert_eq!(tier(&fields.body), Some(ExtractionTier::Pattern));
    }

    #[test]
    fn pattern_body_spans_raw_newlines() {
        let raw = "{\"subject\": \"Hi\", \"body\": \"<p>first\nsecond</p>\"\n}";
        let fields = extract(raw.as_bytes()).unwrap();
        assert_eq!(value(&fields.body), Some("<p>first\nsecond</p>"));
        assert_eq!(tier(&fields.body), Some(ExtractionTier::Pattern));
    }

    #[test]
    fn pattern_tolerates_whitespace_around_colon() {
        let raw = "{\"subject\" :  \"Spaced\" ,\n \"body\":\"x\" \n,}";
        let fields = extract(raw.as_bytes()).unwrap();
        assert_eq!(value(&fields.subject), Some("Spaced"));
        assert_eq!(value(&fields.body), Some("x"));
    }

    #[test]
    fn pattern_fills_field_missing_from_strict_object() {
        // Valid JSON whose body sits in a nested object.
        let raw = br#"{"subject": "Hi", "message": {"body": "nested text"}}"#;
        let fields = extract(raw).unwrap();
        assert_eq!(tier(&fields.subject), Some(ExtractionTier::Strict));
        assert_eq!(value(&fields.body), Some("nested text"));
        assert_eq!(tier(&fields.body), Some(ExtractionTier::Pattern));
    }

    // ── Tier 3: body recovery ────────────────────────────────────────

    #[test]
    fn unescaped_html_body_recovered() {
        let raw = "{\n  \"subject\": \"Order problem\",\n  \"body\": \"<div dir=\"ltr\">My order <b>123</b> arrived broken.</div>\"\n}";
        let fields = extract(raw.as_bytes()).unwrap();

        assert_eq!(value(&fields.subject), Some("Order problem"));
        assert_eq!(tier(&fields.subject), Some(ExtractionTier::Pattern));
        assert_eq!(tier(&fields.body), Some(ExtractionTier::BodyRecovery));
        assert_eq!(
            value(&fields.body),
            Some("<div dir=\"ltr\">My order <b>123</b> arrived broken.</div>")
        );
        assert_eq!(
            normalize(fields.body().unwrap()),
            "My order 123 arrived broken."
        );
    }

    #[test]
    fn body_recovery_stops_at_following_field() {
        let raw = r#"{"body": "<div dir="ltr">Please send an invoice copy</div>", "subject": "Invoice", "category": "Billing"}"#;
        let fields = extract(raw.as_bytes()).unwrap();
        assert_eq!(
            value(&fields.body),
            Some(r#"<div dir="ltr">Please send an invoice copy</div>"#)
        );
        assert_eq!(value(&fields.subject), Some("Invoice"));
        assert_eq!(value(&fields.category), Some("Billing"));
    }

    #[test]
    fn body_recovery_unescapes_mixed_escapes() {
        let raw = "{\"subject\": \"s\", \"body\": \"<div dir=\"ltr\">Hi\\nthere \\\"friend\\\"\\r</div>\"}";
        let body = extract(raw.as_bytes()).unwrap().body.unwrap();
        assert_eq!(body.tier, ExtractionTier::BodyRecovery);
        assert_eq!(body.value, "<div dir=\"ltr\">Hi\nthere \"friend\"\r</div>");
    }

    #[test]
    fn gmail_multipart_body_recovered() {
        let raw = r#"{
  "subject": "Login issue",
  "body": "<div dir="ltr"><div class="gmail_default" style="font-family:arial">I cannot log in since the update.</div><div><br></div><div>Regards</div></div>
"
}"#;
        let fields = extract(raw.as_bytes()).unwrap();
        assert_eq!(tier(&fields.body), Some(ExtractionTier::BodyRecovery));
        assert_eq!(
            normalize(fields.body().unwrap()),
            "I cannot log in since the update. Regards"
        );
    }

    #[test]
    fn attribute_free_html_with_inner_quotes_recovered() {
        let raw = r#"{"subject": "Quote", "body": "<p>He said "hello" to me about my order</p>"}"#;
        let fields = extract(raw.as_bytes()).unwrap();
        let body = fields.body.as_ref().unwrap();
        assert_eq!(body.tier, ExtractionTier::BodyRecovery);
        assert_eq!(body.value, r#"<p>He said "hello" to me about my order</p>"#);
        assert_eq!(
            normalize(&body.value),
            r#"He said "hello" to me about my order"#
        );
        assert_eq!(value(&fields.subject), Some("Quote"));
    }

    #[test]
    fn markup_outside_body_does_not_trigger_recovery() {
        let raw = r#"{"subject": "<b>Sale</b>", "body": "He said "hi" there"}"#;
        let body = extract(raw.as_bytes()).unwrap().body.unwrap();
        assert_eq!(body.tier, ExtractionTier::Lenient);
    }

    #[test]
    fn body_recovery_requires_markup_evidence() {
        // Broken quotes in plain text: no tier 3, lenient scan truncates instead.
        let raw = r#"{"subject": "Quote", "body": "He said "hello" to me"}"#;
        let body = extract(raw.as_bytes()).unwrap().body.unwrap();
        assert_eq!(body.tier, ExtractionTier::Lenient);
        assert_eq!(body.value, "He said ");
    }

    #[test]
    fn body_recovery_without_terminator_degrades_to_lenient() {
        // Truncated payload: no closing brace, so no plausible end for tier 3.
        let raw = r#"{"subject": "Cut", "body": "<div dir="ltr">Partial"#;
        let body = extract(raw.as_bytes()).unwrap().body.unwrap();
        assert_eq!(body.tier, ExtractionTier::Lenient);
        assert_eq!(body.value, "<div dir=");
    }

    #[test]
    fn recovery_ambiguity_is_non_fatal() {
        // The HTML contains a look-alike field boundary; the recovered body is
        // cut short there but still non-empty.
        let raw = r#"{"subject": "Tricky", "body": "<p class="x">Before", "category": "quoted" after</p>"}"#;
        let fields = extract(raw.as_bytes()).unwrap();
        let body = fields.body.unwrap();
        assert_eq!(body.tier, ExtractionTier::BodyRecovery);
        assert!(!body.value.is_empty());
        assert!(normalize(&body.value).contains("Before"));
    }

    // ── Tier 4 and helpers ───────────────────────────────────────────

    #[test]
    fn subject_with_inner_quotes_is_truncated_not_lost() {
        let raw = r#"{"subject": "Re: "urgent" issue", "body": "ok"}"#;
        let fields = extract(raw.as_bytes()).unwrap();
        assert_eq!(value(&fields.subject), Some("Re: "));
        assert_eq!(tier(&fields.subject), Some(ExtractionTier::Lenient));
        assert_eq!(value(&fields.body), Some("ok"));
    }

    #[test]
    fn garbage_yields_absent_fields() {
        let fields = extract(b"this is not json at all").unwrap();
        assert_eq!(fields, ExtractedFields::default());
    }

    #[test]
    fn decode_json_string_falls_back_on_raw_control_chars() {
        assert_eq!(decode_json_string(r"caf\u00e9"), "café");
        assert_eq!(decode_json_string("a\nb \\\"c\\\""), "a\nb \"c\"");
    }

    #[test]
    fn unescape_lenient_table() {
        assert_eq!(unescape_lenient(r#"\"q\" \n \r \t \\ \/"#), "\"q\" \n \r \t \\ /");
        assert_eq!(unescape_lenient(r"keep \x and trailing \"), r"keep \x and trailing \");
    }

    #[test]
    fn field_tiers_order() {
        assert_eq!(
            Field::Body.tiers(),
            &[
                ExtractionTier::Strict,
                ExtractionTier::Pattern,
                ExtractionTier::BodyRecovery,
                ExtractionTier::Lenient
            ]
        );
        assert!(!Field::Subject.tiers().contains(&ExtractionTier::BodyRecovery));
    }
}
