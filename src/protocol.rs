//! Log submission protocol: payload decoding and entry rendering.
//!
//! A frame is a single UTF-8 JSON object with optional `logLevel` and
//! `logMessage` string fields. Decoding applies defaults and never produces
//! partially-populated output. Rendering substitutes the record into the
//! configured template together with a render-time timestamp and a fresh
//! correlation identifier; it cannot fail because templates are validated
//! at startup.

use chrono::{FixedOffset, SecondsFormat, Utc};
use serde_json::Value;
use uuid::Uuid;

/// Level applied when the payload carries none (or an empty one)
const DEFAULT_LEVEL: &str = "INFO";

/// Message applied when the payload carries none
const DEFAULT_MESSAGE: &str = "No message provided";

/// Response sent when a client exceeds its rate limit
pub const RESPONSE_RATE_LIMITED: &str = "Rate limit exceeded. Please slow down.";

/// Build the success response echoing the formatted entry.
pub fn response_logged(entry: &str) -> String {
    format!("Logged: {entry}")
}

/// A decoded log submission. Immutable after construction; the timestamp
/// and correlation id are generated at render time, not carried here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: String,
    pub message: String,
    pub client: String,
}

/// A frame that could not be decoded
#[derive(Debug)]
pub enum DecodeError {
    /// Not valid JSON (or not valid UTF-8)
    Json(serde_json::Error),
    /// Valid JSON, but not an object
    NotAnObject,
    /// A known field carried a non-string, non-null value
    WrongFieldType(&'static str),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::Json(e) => write!(f, "malformed log payload: {e}"),
            DecodeError::NotAnObject => write!(f, "log payload is not a JSON object"),
            DecodeError::WrongFieldType(field) => {
                write!(f, "field '{field}' must be a string")
            }
        }
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DecodeError::Json(e) => Some(e),
            _ => None,
        }
    }
}

/// Read an optional string field from the payload; `null` counts as absent.
fn string_field(
    object: &serde_json::Map<String, Value>,
    name: &'static str,
) -> Result<Option<String>, DecodeError> {
    match object.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(DecodeError::WrongFieldType(name)),
    }
}

/// Decode a raw frame into a [`LogRecord`], applying field defaults.
///
/// The payload must be a JSON object; arrays, strings and other top-level
/// values are decode errors. The level defaults when absent or empty; the
/// message defaults only when absent. Unknown fields are ignored.
pub fn decode(frame: &[u8], client: &str) -> Result<LogRecord, DecodeError> {
    let value: Value = serde_json::from_slice(frame).map_err(DecodeError::Json)?;
    let object = value.as_object().ok_or(DecodeError::NotAnObject)?;

    let level = match string_field(object, "logLevel")? {
        Some(level) if !level.is_empty() => level,
        _ => DEFAULT_LEVEL.to_string(),
    };
    let message = string_field(object, "logMessage")?
        .unwrap_or_else(|| DEFAULT_MESSAGE.to_string());

    Ok(LogRecord {
        level,
        message,
        client: client.to_string(),
    })
}

/// Named values a template may reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Timestamp,
    Client,
    Level,
    Message,
    CorrelationId,
}

impl Field {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "timestamp" => Some(Field::Timestamp),
            "client" => Some(Field::Client),
            "level" => Some(Field::Level),
            "message" => Some(Field::Message),
            "correlationId" => Some(Field::CorrelationId),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Field),
}

/// A log-line template, parsed and validated at startup.
///
/// Placeholders are `{timestamp}`, `{client}`, `{level}`, `{message}` and
/// `{correlationId}`; `{{` and `}}` escape literal braces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

/// Template validation errors, reported at startup
#[derive(Debug, PartialEq, Eq)]
pub enum TemplateError {
    UnknownPlaceholder(String),
    UnmatchedBrace,
}

impl std::fmt::Display for TemplateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemplateError::UnknownPlaceholder(name) => {
                write!(f, "unknown placeholder '{{{name}}}'")
            }
            TemplateError::UnmatchedBrace => write!(f, "unmatched '{{' or '}}'"),
        }
    }
}

impl std::error::Error for TemplateError {}

impl Template {
    /// Parse and validate a template string.
    pub fn parse(input: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = input.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' => {
                    if chars.peek() == Some(&'{') {
                        chars.next();
                        literal.push('{');
                        continue;
                    }
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(c) => name.push(c),
                            None => return Err(TemplateError::UnmatchedBrace),
                        }
                    }
                    let field = Field::from_name(&name)
                        .ok_or(TemplateError::UnknownPlaceholder(name))?;
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field(field));
                }
                '}' => {
                    if chars.peek() == Some(&'}') {
                        chars.next();
                        literal.push('}');
                    } else {
                        return Err(TemplateError::UnmatchedBrace);
                    }
                }
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Template { segments })
    }

    /// Render a record into a formatted entry.
    ///
    /// The timestamp is taken at call time in the configured offset and the
    /// correlation id is freshly generated, so two renders of the same
    /// record differ in exactly those two values.
    pub fn render(&self, record: &LogRecord, offset: &FixedOffset) -> String {
        let timestamp = Utc::now()
            .with_timezone(offset)
            .to_rfc3339_opts(SecondsFormat::Micros, false);
        self.render_with(record, &timestamp, &Uuid::new_v4().to_string())
    }

    fn render_with(&self, record: &LogRecord, timestamp: &str, correlation_id: &str) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(Field::Timestamp) => out.push_str(timestamp),
                Segment::Field(Field::Client) => out.push_str(&record.client),
                Segment::Field(Field::Level) => out.push_str(&record.level),
                Segment::Field(Field::Message) => out.push_str(&record.message),
                Segment::Field(Field::CorrelationId) => out.push_str(correlation_id),
            }
        }
        out
    }
}
