//! Field-level error signaling between write endpoints and the client
//!
//! When a write is rejected for a business reason, the handler picks one
//! catalog code and serializes the rejection as a compact ASCII payload:
//!
//! ```text
//! field/code/k1!v1,k2!v2
//! ```
//!
//! The payload travels as the body of a response with status
//! [`REJECTION_STATUS`], reserved for business-rule rejections and
//! distinct from generic validation failures and infrastructure errors.
//!
//! The receiving side parses the payload into [`FieldError`] at the
//! boundary (all logic past that point is typed, never substring-based),
//! resolves the code against a [`Catalog`] — an unknown code falls back
//! to the generic entry instead of failing — and interprets each value
//! with a fixed-order heuristic: ISO-8601 timestamp, then one-or-two
//! digit integer, then plain text.

use chrono::{DateTime, FixedOffset};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;
use tracing::warn;

/// HTTP status carrying a field-error payload
pub const REJECTION_STATUS: u16 = 403;

/// ISO-8601 timestamp with milliseconds and offset, the shape write
/// endpoints serialize dates in
static TIMESTAMP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d{4}-[01]\d-[0-3]\dT[0-2]\d:[0-5]\d:[0-5]\d\.\d+([+-][0-2]\d:[0-5]\d|Z)")
        .expect("timestamp pattern")
});

/// Bare one-or-two digit integer. A genuinely short text value also
/// matches; the heuristic commits to the numeric reading.
static SMALL_INT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,2}$").expect("integer pattern"));

/// Symbolic error codes, mirroring the client-side message ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorCode {
    /// Value must be a string
    String,
    /// Value must be a number
    Number,
    /// Value must be a valid date
    Date,
    Required,
    MaxString,
    MinNumber,
    MaxNumber,
    MinDate,
    MaxDate,
    /// Timestamps in the future are rejected
    FutureDate,
    /// Write attempted without a signed-in user
    UserNew,
    /// Write attempted against another user's document
    UserOld,
    /// Fallback for codes this build does not know
    Unknown,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::String => "string",
            ErrorCode::Number => "number",
            ErrorCode::Date => "date",
            ErrorCode::Required => "required",
            ErrorCode::MaxString => "max.string",
            ErrorCode::MinNumber => "min.number",
            ErrorCode::MaxNumber => "max.number",
            ErrorCode::MinDate => "min.date",
            ErrorCode::MaxDate => "max.date",
            ErrorCode::FutureDate => "future.date",
            ErrorCode::UserNew => "user.new",
            ErrorCode::UserOld => "user.old",
            ErrorCode::Unknown => "unknownError",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "string" => Some(ErrorCode::String),
            "number" => Some(ErrorCode::Number),
            "date" => Some(ErrorCode::Date),
            "required" => Some(ErrorCode::Required),
            "max.string" => Some(ErrorCode::MaxString),
            "min.number" => Some(ErrorCode::MinNumber),
            "max.number" => Some(ErrorCode::MaxNumber),
            "min.date" => Some(ErrorCode::MinDate),
            "max.date" => Some(ErrorCode::MaxDate),
            "future.date" => Some(ErrorCode::FutureDate),
            "user.new" => Some(ErrorCode::UserNew),
            "user.old" => Some(ErrorCode::UserOld),
            "unknownError" => Some(ErrorCode::Unknown),
            _ => None,
        }
    }
}

/// Payload parts may not contain the structural delimiters.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("reserved delimiter in payload part: {0:?}")]
    ReservedDelimiter(String),
}

/// A structured rejection produced by a write endpoint.
///
/// Constructed synchronously inside the handler when validation fails,
/// consumed exactly once by the client right after the failed request,
/// never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldError {
    /// Name of the offending input
    pub field: String,
    pub code: ErrorCode,
    /// Interpolation values for the code's message template
    pub values: Vec<(String, String)>,
}

impl FieldError {
    pub fn new(field: impl Into<String>, code: ErrorCode) -> Self {
        Self {
            field: field.into(),
            code,
            values: Vec::new(),
        }
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.push((key.into(), value.into()));
        self
    }

    /// Serialize to the wire form `field/code/k1!v1,k2!v2`.
    pub fn encode(&self) -> Result<String, EncodeError> {
        check_part(&self.field)?;
        for (key, value) in &self.values {
            check_part(key)?;
            check_part(value)?;
        }

        let values = self
            .values
            .iter()
            .map(|(key, value)| format!("{key}!{value}"))
            .collect::<Vec<_>>()
            .join(",");

        Ok(format!("{}/{}/{}", self.field, self.code.as_str(), values))
    }

    /// Parse a wire payload. Never fails: a malformed or unknown code
    /// degrades to [`ErrorCode::Unknown`] so the client can still show
    /// a message.
    pub fn decode(payload: &str) -> Self {
        let mut parts = payload.splitn(3, '/');
        let field = parts.next().unwrap_or_default().to_string();

        let raw_code = parts.next().unwrap_or_default();
        let code = ErrorCode::from_str(raw_code).unwrap_or_else(|| {
            warn!(code = raw_code, "unknown field error code, using fallback");
            ErrorCode::Unknown
        });

        let values = parts
            .next()
            .unwrap_or_default()
            .split(',')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let mut kv = pair.splitn(2, '!');
                (
                    kv.next().unwrap_or_default().to_string(),
                    kv.next().unwrap_or_default().to_string(),
                )
            })
            .collect();

        Self {
            field,
            code,
            values,
        }
    }

    /// Resolve the catalog entry and interpolate the values into a
    /// message ready to attach to the offending input.
    pub fn localize(&self, catalog: &Catalog, localizer: &dyn Localizer) -> LocalizedError {
        let mut message = catalog.template(self.code).to_string();

        for (key, raw) in &self.values {
            let rendered = match interpret(raw) {
                ErrorValue::Timestamp(ts) => localizer.format_timestamp(&ts),
                ErrorValue::Number(n) => localizer.format_number(n),
                ErrorValue::Text(text) => text,
            };
            message = message.replace(&format!("{{{key}}}"), &rendered);
        }

        LocalizedError {
            field: self.field.clone(),
            message,
        }
    }
}

fn check_part(part: &str) -> Result<(), EncodeError> {
    if part.contains(['/', ',', '!']) {
        return Err(EncodeError::ReservedDelimiter(part.to_string()));
    }
    Ok(())
}

/// An interpolation value after the interpretation heuristic has run.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorValue {
    Timestamp(DateTime<FixedOffset>),
    Number(i64),
    Text(String),
}

/// Interpret a raw value, in fixed order: timestamp, small integer,
/// plain text.
///
/// The timestamp pattern is unanchored, so a value that merely contains
/// a timestamp matches it; such a value fails the strict parse and is
/// deliberately passed through as text instead of rendering as an
/// invalid date.
pub fn interpret(raw: &str) -> ErrorValue {
    if TIMESTAMP_RE.is_match(raw) {
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return ErrorValue::Timestamp(ts);
        }
    }
    if SMALL_INT_RE.is_match(raw) {
        if let Ok(n) = raw.parse() {
            return ErrorValue::Number(n);
        }
    }
    ErrorValue::Text(raw.to_string())
}

/// A rendered, localized field error for the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocalizedError {
    pub field: String,
    pub message: String,
}

/// Caller-supplied rendering conventions for dates and numbers.
pub trait Localizer {
    fn format_timestamp(&self, ts: &DateTime<FixedOffset>) -> String;
    fn format_number(&self, n: i64) -> String;
}

/// Plain conventions: RFC 3339 dates, unlocalized digits.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainLocalizer;

impl Localizer for PlainLocalizer {
    fn format_timestamp(&self, ts: &DateTime<FixedOffset>) -> String {
        ts.to_rfc3339()
    }

    fn format_number(&self, n: i64) -> String {
        n.to_string()
    }
}

/// Mapping from error codes to localizable message templates.
///
/// `{name}` placeholders are replaced by interpolation values at render
/// time. The default catalog carries the application's Swedish copy.
#[derive(Debug, Clone)]
pub struct Catalog {
    templates: HashMap<ErrorCode, String>,
}

impl Catalog {
    /// Template for `code`, falling back to the generic entry.
    pub fn template(&self, code: ErrorCode) -> &str {
        self.templates
            .get(&code)
            .or_else(|| self.templates.get(&ErrorCode::Unknown))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Replace the template for one code.
    pub fn set(&mut self, code: ErrorCode, template: impl Into<String>) {
        self.templates.insert(code, template.into());
    }
}

impl Default for Catalog {
    fn default() -> Self {
        let mut templates = HashMap::new();
        templates.insert(ErrorCode::String, "Måste vara en textsträng".to_string());
        templates.insert(ErrorCode::Number, "Måste vara en siffra".to_string());
        templates.insert(ErrorCode::Date, "Måste vara ett giltigt datum".to_string());
        templates.insert(ErrorCode::Required, "Obligatoriskt fält".to_string());
        templates.insert(ErrorCode::MaxString, "Maxlängd är {max}".to_string());
        templates.insert(
            ErrorCode::MinNumber,
            "Lägsta tillåtna värde är {min}".to_string(),
        );
        templates.insert(
            ErrorCode::MaxNumber,
            "Högsta tillåtna värde är {max}".to_string(),
        );
        templates.insert(
            ErrorCode::MinDate,
            "Lägsta tillåtna datum är {date}".to_string(),
        );
        templates.insert(
            ErrorCode::MaxDate,
            "Högsta tillåtna datum är {date}".to_string(),
        );
        templates.insert(
            ErrorCode::FutureDate,
            "Du får ej ange en tid i framtiden".to_string(),
        );
        templates.insert(ErrorCode::UserNew, "Du måste vara inloggad".to_string());
        templates.insert(ErrorCode::UserOld, "Du får inte byta användare".to_string());
        templates.insert(ErrorCode::Unknown, "Något är fel med fältet".to_string());
        Self { templates }
    }
}
